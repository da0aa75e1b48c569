use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::YouTrackClient;
use crate::error::{Error, Result};
use crate::filter::IssueFilter;
use crate::models::Project;
use crate::writer::{ExportMetadata, ExportStore};

/// エクスポート処理の設定
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Issue一覧取得のページサイズ
    pub page_size: u32,
    /// 件数ポーリングの最大試行回数
    pub poll_max_attempts: u32,
    /// 件数ポーリングの待機時間
    pub poll_delay: Duration,
    /// コメントをエクスポートに含めるかどうか
    pub include_comments: bool,
    /// 添付ファイルをダウンロードするかどうか
    pub include_attachments: bool,
}

impl ExportConfig {
    /// デフォルト設定で新しいExportConfigを作成
    pub fn new() -> Self {
        Self {
            page_size: 50,
            poll_max_attempts: 10,
            poll_delay: Duration::from_secs(2),
            include_comments: true,
            include_attachments: true,
        }
    }

    /// ページサイズを設定
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// 件数ポーリングの最大試行回数を設定
    pub fn poll_max_attempts(mut self, attempts: u32) -> Self {
        self.poll_max_attempts = attempts.max(1);
        self
    }

    /// 件数ポーリングの待機時間を設定
    pub fn poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// コメントを含めるかどうかを設定
    pub fn include_comments(mut self, include: bool) -> Self {
        self.include_comments = include;
        self
    }

    /// 添付ファイルを含めるかどうかを設定
    pub fn include_attachments(mut self, include: bool) -> Self {
        self.include_attachments = include;
        self
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// プロジェクト別のエクスポート統計
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectExportStats {
    /// プロジェクト名
    pub project_name: String,
    /// エクスポートされたIssue数
    pub exported_count: usize,
    /// 解決済みIssue数
    pub resolved_count: usize,
    /// 未解決Issue数
    pub unresolved_count: usize,
    /// ダウンロードした添付ファイル数
    pub attachment_count: usize,
    /// スキップされたIssue（一覧と詳細取得の間に消えたもの）
    pub skipped_issues: Vec<String>,
    /// スキップされた添付ファイル数
    pub skipped_attachment_count: usize,
    /// 項目単位の失敗数（リトライ尽きのネットワークエラーなど）
    pub failed_count: usize,
    /// ネットワーク起因のエラー数
    pub network_failure_count: usize,
    /// 書き込み起因のエラー数
    pub write_failure_count: usize,
    /// エラーメッセージ一覧
    pub error_messages: Vec<String>,
    /// 処理終了時刻
    pub finished_at: DateTime<Utc>,
}

impl ProjectExportStats {
    /// 新しいプロジェクト統計を作成
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            exported_count: 0,
            resolved_count: 0,
            unresolved_count: 0,
            attachment_count: 0,
            skipped_issues: Vec::new(),
            skipped_attachment_count: 0,
            failed_count: 0,
            network_failure_count: 0,
            write_failure_count: 0,
            error_messages: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    /// ネットワーク起因の失敗を記録
    pub fn record_network_failure(&mut self, message: String) {
        self.failed_count += 1;
        self.network_failure_count += 1;
        self.error_messages.push(message);
    }

    /// 書き込み起因の失敗を記録
    pub fn record_write_failure(&mut self, message: String) {
        self.write_failure_count += 1;
        self.error_messages.push(message);
    }

    /// エクスポートメタデータに変換
    pub fn to_metadata(&self) -> ExportMetadata {
        ExportMetadata::from_counts(
            self.resolved_count,
            self.unresolved_count,
            self.attachment_count,
            self.skipped_issues.clone(),
        )
    }
}

/// エクスポート実行全体の結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    /// 開始時刻
    pub start_time: DateTime<Utc>,
    /// 終了時刻
    pub end_time: DateTime<Utc>,
    /// エクスポートされたIssue総数
    pub exported_count: usize,
    /// スキップされたIssue総数
    pub skipped_count: usize,
    /// 失敗した項目総数
    pub failed_count: usize,
    /// ダウンロードした添付ファイル総数
    pub attachment_count: usize,
    /// ネットワーク起因のエラー総数
    pub network_failure_count: usize,
    /// 書き込み起因のエラー総数
    pub write_failure_count: usize,
    /// プロジェクト別統計
    pub project_stats: HashMap<String, ProjectExportStats>,
    /// エラーメッセージ一覧
    pub error_messages: Vec<String>,
    /// エクスポートが成功したかどうか（スキップのみなら成功扱い）
    pub is_success: bool,
}

impl ExportResult {
    /// 新しいエクスポート結果を作成
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            end_time: now,
            exported_count: 0,
            skipped_count: 0,
            failed_count: 0,
            attachment_count: 0,
            network_failure_count: 0,
            write_failure_count: 0,
            project_stats: HashMap::new(),
            error_messages: Vec::new(),
            is_success: false,
        }
    }

    /// プロジェクト統計を集計に取り込む
    pub fn record_project(&mut self, stats: ProjectExportStats) {
        self.exported_count += stats.exported_count;
        self.skipped_count += stats.skipped_issues.len();
        self.failed_count += stats.failed_count;
        self.attachment_count += stats.attachment_count;
        self.network_failure_count += stats.network_failure_count;
        self.write_failure_count += stats.write_failure_count;
        self.error_messages.extend(stats.error_messages.clone());
        self.project_stats.insert(stats.project_name.clone(), stats);
    }

    /// エラーを追加
    pub fn add_error(&mut self, message: String) {
        self.error_messages.push(message);
    }

    /// エクスポート終了を記録
    pub fn finish(&mut self) {
        self.end_time = Utc::now();
        self.is_success = self.error_messages.is_empty() && self.failed_count == 0;
    }

    /// 処理時間を取得（秒）
    pub fn duration_seconds(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    /// CLIのプロセス終了コードを決定
    ///
    /// 書き込みエラーがあれば3、ネットワーク起因の失敗があれば2、
    /// それ以外（スキップのみを含む）は0。
    pub fn exit_code(&self) -> i32 {
        if self.write_failure_count > 0 {
            3
        } else if self.network_failure_count > 0 || self.failed_count > 0 {
            2
        } else {
            0
        }
    }
}

impl Default for ExportResult {
    fn default() -> Self {
        Self::new()
    }
}

/// エクスポート処理の状態
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ExportState {
    /// 待機中
    Idle,
    /// 実行中
    Running,
    /// 完了
    Completed,
    /// エラー発生
    Error(String),
}

impl ExportState {
    pub fn is_running(&self) -> bool {
        matches!(self, ExportState::Running)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ExportState::Error(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ExportState::Completed)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ExportState::Idle)
    }
}

impl Default for ExportState {
    fn default() -> Self {
        ExportState::Idle
    }
}

/// エクスポートサービス
///
/// プロジェクトごとに、フィルターを適用したIssue列挙・詳細取得・
/// 添付ダウンロード・ファイル書き出しを順に実行する（設計上シーケンシャル）。
pub struct ExportService {
    config: ExportConfig,
    state: ExportState,
}

impl ExportService {
    /// 新しいエクスポートサービスを作成
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            state: ExportState::Idle,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// 現在の状態を取得
    pub fn current_state(&self) -> &ExportState {
        &self.state
    }

    /// エクスポートが開始可能かどうか
    pub fn can_export(&self) -> bool {
        !self.state.is_running()
    }

    /// 選択されたプロジェクトをすべてエクスポート
    pub async fn run<S>(
        &mut self,
        client: &YouTrackClient,
        store: &mut S,
        projects: &[Project],
        filter: &IssueFilter,
    ) -> Result<ExportResult>
    where
        S: ExportStore + ?Sized,
    {
        self.run_with_progress(client, store, projects, filter, |_, _, _| {})
            .await
    }

    /// 進捗コールバック付きで全プロジェクトをエクスポート
    ///
    /// コールバックは（プロジェクト、処理済み件数、総件数）で呼ばれる。
    /// 認証エラーは即座に実行全体を中断する。プロジェクト単位・項目単位の
    /// エラーは結果に記録して処理を続行する。
    pub async fn run_with_progress<S, F>(
        &mut self,
        client: &YouTrackClient,
        store: &mut S,
        projects: &[Project],
        filter: &IssueFilter,
        mut on_progress: F,
    ) -> Result<ExportResult>
    where
        S: ExportStore + ?Sized,
        F: FnMut(&Project, u64, u64),
    {
        if !self.can_export() {
            return Err(Error::InvalidInput(
                "エクスポートが既に実行中です".to_string(),
            ));
        }

        self.state = ExportState::Running;
        let mut result = ExportResult::new();

        for project in projects {
            tracing::info!(project = %project.name, "exporting project");

            match self
                .export_project(client, store, project, filter, |done, total| {
                    on_progress(project, done, total)
                })
                .await
            {
                Ok(stats) => result.record_project(stats),
                Err(e) => {
                    // 認証エラーなど実行全体を止めるエラー
                    result.add_error(format!("プロジェクト {} で中断: {}", project.name, e));
                    result.finish();
                    self.state = ExportState::Error(e.to_string());
                    return Err(e);
                }
            }
        }

        result.finish();
        self.state = if result.is_success {
            ExportState::Completed
        } else {
            ExportState::Error(format!(
                "エクスポート中に {} 件のエラーが発生しました",
                result.error_messages.len()
            ))
        };

        Ok(result)
    }

    /// 単一プロジェクトをエクスポート
    ///
    /// 戻り値の`Err`は実行全体を中断すべきエラー（認証エラー）のみ。
    /// それ以外のエラーは統計に記録して`Ok`で返す。
    pub async fn export_project<S, F>(
        &self,
        client: &YouTrackClient,
        store: &mut S,
        project: &Project,
        filter: &IssueFilter,
        mut on_progress: F,
    ) -> Result<ProjectExportStats>
    where
        S: ExportStore + ?Sized,
        F: FnMut(u64, u64),
    {
        let mut stats = ProjectExportStats::new(project.name.clone());
        let query = filter.to_query(project.key());

        // 件数が集計されるまでポーリング
        let total = match self.poll_issue_count(client, &query).await {
            Ok(total) => total,
            Err(e @ Error::AuthenticationFailed(_)) => return Err(e),
            Err(e) => {
                stats.record_network_failure(format!(
                    "プロジェクト {} の件数取得エラー: {}",
                    project.name, e
                ));
                stats.finished_at = Utc::now();
                return Ok(stats);
            }
        };

        if let Err(e) = store.initialize(project).await {
            stats.record_write_failure(format!(
                "プロジェクト {} の出力先初期化エラー: {}",
                project.name, e
            ));
            stats.finished_at = Utc::now();
            return Ok(stats);
        }

        on_progress(0, total);

        let mut done = 0u64;
        let mut skip = 0u32;
        let mut aborted = false;

        'pages: while !aborted && done < total {
            let page = match client.list_issues(&query, skip, self.config.page_size).await {
                Ok(page) => page,
                Err(e @ Error::AuthenticationFailed(_)) => return Err(e),
                Err(e) => {
                    stats.record_network_failure(format!(
                        "プロジェクト {} のIssue一覧取得エラー: {}",
                        project.name, e
                    ));
                    break;
                }
            };

            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            skip += page_len as u32;

            for summary in &page {
                done += 1;

                // 一覧と詳細取得の間にIssueが消えることがある
                let mut issue = match client.get_issue(&summary.id).await {
                    Ok(issue) => issue,
                    Err(Error::NotFound(_)) => {
                        tracing::warn!(issue = %summary.id_readable, "issue vanished, skipping");
                        stats.skipped_issues.push(summary.id_readable.clone());
                        on_progress(done, total);
                        continue;
                    }
                    Err(e @ Error::AuthenticationFailed(_)) => return Err(e),
                    Err(e) => {
                        stats.record_network_failure(format!(
                            "Issue {} の詳細取得エラー: {}",
                            summary.id_readable, e
                        ));
                        on_progress(done, total);
                        continue;
                    }
                };

                // サーバー側クエリの結果を信用しすぎない
                if !filter.matches(&issue) {
                    on_progress(done, total);
                    continue;
                }

                if !self.config.include_comments {
                    issue.comments.clear();
                }

                if issue.is_resolved() {
                    stats.resolved_count += 1;
                } else {
                    stats.unresolved_count += 1;
                }

                if let Err(e) = store.write_issue(project, &issue).await {
                    // 書き込みエラーはこのプロジェクトを中断（他プロジェクトは続行）
                    stats.record_write_failure(format!(
                        "Issue {} の書き込みエラー: {}",
                        issue.id_readable, e
                    ));
                    aborted = true;
                    break 'pages;
                }
                stats.exported_count += 1;

                if self.config.include_attachments {
                    for attachment in &issue.attachments {
                        match client.download_attachment(attachment).await {
                            Ok(bytes) => {
                                if let Err(e) = store
                                    .write_attachment(project, &issue, attachment, &bytes)
                                    .await
                                {
                                    stats.record_write_failure(format!(
                                        "添付 {} の書き込みエラー: {}",
                                        attachment.name, e
                                    ));
                                    aborted = true;
                                    break 'pages;
                                }
                                stats.attachment_count += 1;
                            }
                            Err(Error::NotFound(_)) => {
                                tracing::warn!(
                                    attachment = %attachment.name,
                                    issue = %issue.id_readable,
                                    "attachment vanished, skipping"
                                );
                                stats.skipped_attachment_count += 1;
                            }
                            Err(e @ Error::AuthenticationFailed(_)) => return Err(e),
                            Err(e) => {
                                stats.record_network_failure(format!(
                                    "Issue {} の添付 {} のダウンロードエラー: {}",
                                    issue.id_readable, attachment.name, e
                                ));
                            }
                        }
                    }
                }

                on_progress(done, total);
            }

            // ページサイズに満たないページで終端
            if page_len < self.config.page_size as usize {
                break;
            }
        }

        // 中断されたプロジェクトでも書けた分のメタデータは残す
        let metadata = stats.to_metadata();
        if let Err(e) = store.write_metadata(project, &metadata).await {
            stats.record_write_failure(format!(
                "プロジェクト {} のメタデータ書き込みエラー: {}",
                project.name, e
            ));
        }

        stats.finished_at = Utc::now();
        Ok(stats)
    }

    /// 件数が有効になるまでポーリング
    ///
    /// YouTrackは集計中`-1`を返す。試行回数を使い切ったらエラー。
    async fn poll_issue_count(&self, client: &YouTrackClient, query: &str) -> Result<u64> {
        for attempt in 1..=self.config.poll_max_attempts {
            let count = client.count_issues(query).await?;
            if count >= 0 {
                return Ok(count as u64);
            }

            tracing::debug!(attempt, "issue count not ready yet");
            if attempt < self.config.poll_max_attempts {
                tokio::time::sleep(self.config.poll_delay).await;
            }
        }

        Err(Error::Unexpected(
            "API did not return a valid issues count".to_string(),
        ))
    }
}
