use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use youtrack_export::{
    Error, ExportConfig, ExportOptions, ExportResult, ExportService, IssueFilter, JsonExportStore,
    ResolutionFilter, Result, RetryPolicy, YouTrackClient, YouTrackConfig,
};

/// YouTrackのIssueをプロジェクトごとのローカルファイルにエクスポートするCLI
#[derive(Debug, Parser)]
#[command(name = "youtrack-export", version, about = "Export YouTrack issues to local files")]
struct Cli {
    /// YouTrack base URL (e.g. https://example.youtrack.cloud)
    #[arg(long, env = "YOUTRACK_URL")]
    url: Option<String>,

    /// Permanent API token
    #[arg(long, env = "YOUTRACK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Project keys to export (default: all active projects)
    #[arg(long = "projects", value_name = "KEY", num_args = 1..)]
    projects: Vec<String>,

    /// Export only unresolved issues
    #[arg(long, conflicts_with = "resolved_only")]
    unresolved_only: bool,

    /// Export only resolved issues
    #[arg(long)]
    resolved_only: bool,

    /// Additional raw YouTrack query, ANDed with the other filters
    #[arg(long)]
    query: Option<String>,

    /// Output directory
    #[arg(long, default_value = "exports")]
    output_dir: PathBuf,

    /// Skip issue comments
    #[arg(long)]
    no_comments: bool,

    /// Skip attachment downloads
    #[arg(long)]
    no_attachments: bool,

    /// Compress issue files with gzip
    #[arg(long)]
    compress: bool,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Issues per page when listing
    #[arg(long, default_value_t = 50)]
    page_size: u32,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress log output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List projects visible to the token and exit
    ListProjects,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "youtrack_export=error"
    } else {
        match verbose {
            0 => "youtrack_export=info",
            1 => "youtrack_export=debug",
            _ => "youtrack_export=trace",
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>12} [{bar:40}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn print_summary(result: &ExportResult) {
    println!();
    println!("Export finished in {:.1}s", result.duration_seconds());

    let mut names: Vec<&String> = result.project_stats.keys().collect();
    names.sort();
    for name in names {
        let stats = &result.project_stats[name];
        println!(
            "  {}: {} issues exported ({} resolved, {} unresolved), {} attachments, {} skipped, {} failed",
            stats.project_name,
            stats.exported_count,
            stats.resolved_count,
            stats.unresolved_count,
            stats.attachment_count,
            stats.skipped_issues.len(),
            stats.failed_count
        );
    }

    println!(
        "Total: {} issues, {} attachments, {} skipped, {} failed",
        result.exported_count, result.attachment_count, result.skipped_count, result.failed_count
    );

    if !result.error_messages.is_empty() {
        eprintln!();
        eprintln!("Errors:");
        for message in &result.error_messages {
            eprintln!("  - {}", message);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let url = cli.url.ok_or_else(|| {
        Error::ConfigurationMissing(
            "YouTrack URL not set (use --url or YOUTRACK_URL)".to_string(),
        )
    })?;
    let token = cli.token.ok_or_else(|| {
        Error::ConfigurationMissing(
            "API token not set (use --token or YOUTRACK_TOKEN)".to_string(),
        )
    })?;

    let config = YouTrackConfig::new(url, token)?;
    let client = YouTrackClient::with_timeout(config, Duration::from_secs(cli.timeout_secs))?
        .with_retry(RetryPolicy::new());

    // 最初に接続と認証を確認する（失敗時はファイルを一切作らない）
    let user = client.current_user().await?;
    tracing::info!(user = %user.display_name(), "authenticated");

    let available = client.list_projects().await?;

    if let Some(Command::ListProjects) = cli.command {
        println!("{:<12} {:<30} {}", "KEY", "NAME", "STATE");
        for project in &available {
            println!(
                "{:<12} {:<30} {}",
                project.key(),
                project.name,
                if project.is_active() { "active" } else { "archived" }
            );
        }
        return Ok(0);
    }

    let resolution = if cli.unresolved_only {
        ResolutionFilter::UnresolvedOnly
    } else if cli.resolved_only {
        ResolutionFilter::ResolvedOnly
    } else {
        ResolutionFilter::All
    };

    let mut filter = IssueFilter::new().resolution(resolution);
    if let Some(query) = &cli.query {
        filter = filter.query(query.clone());
    }

    let options = ExportOptions::new()
        .projects(cli.projects)
        .filter(filter)
        .output_dir(cli.output_dir)
        .include_comments(!cli.no_comments)
        .include_attachments(!cli.no_attachments)
        .compress(cli.compress)
        .page_size(cli.page_size);
    options.validate()?;

    let targets = options.resolve_projects(&available)?;
    if targets.is_empty() {
        println!("No projects to export.");
        return Ok(0);
    }

    let mut store =
        JsonExportStore::new(options.output_dir.clone()).with_compression(options.compress);

    let export_config = ExportConfig::new()
        .page_size(options.page_size)
        .include_comments(options.include_comments)
        .include_attachments(options.include_attachments);
    let mut service = ExportService::new(export_config);

    let show_progress = !cli.quiet;
    let mut bar: Option<(String, ProgressBar)> = None;

    let result = service
        .run_with_progress(&client, &mut store, &targets, &options.filter, |project, done, total| {
            if !show_progress {
                return;
            }
            let needs_new = match &bar {
                Some((name, _)) => name != &project.name,
                None => true,
            };
            if needs_new {
                if let Some((_, pb)) = bar.take() {
                    pb.finish();
                }
                let pb = ProgressBar::new(total).with_style(progress_style());
                pb.set_prefix(project.name.clone());
                bar = Some((project.name.clone(), pb));
            }
            if let Some((_, pb)) = &bar {
                pb.set_length(total);
                pb.set_position(done);
            }
        })
        .await;

    if let Some((_, pb)) = bar.take() {
        pb.finish();
    }

    let result = result?;
    print_summary(&result);
    Ok(result.exit_code())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
