use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::{Compression, write::GzEncoder};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, create_dir_all};
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::models::{Attachment, Issue, Project};

/// 添付ファイル名の語幹の最大文字数
const ATTACHMENT_STEM_MAX_CHARS: usize = 100;

/// プロジェクト単位のエクスポートメタデータ
///
/// 各プロジェクトのディレクトリ直下の`metadata.json`に書き出す。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// エクスポート実行時刻
    pub export_date: DateTime<Utc>,
    /// エクスポートされたIssue総数
    pub total_issues: usize,
    /// 解決済みIssue数
    pub resolved_count: usize,
    /// 未解決Issue数
    pub unresolved_count: usize,
    /// 解決率（小数第4位で丸め、0件のときは0）
    pub resolution_rate: f64,
    /// ダウンロードした添付ファイル数
    pub total_attachments: usize,
    /// スキップされたIssue（一覧と詳細取得の間に消えたものなど）
    pub skipped_issues: Vec<String>,
}

impl ExportMetadata {
    /// 件数からメタデータを作成
    pub fn from_counts(
        resolved_count: usize,
        unresolved_count: usize,
        total_attachments: usize,
        skipped_issues: Vec<String>,
    ) -> Self {
        let total_issues = resolved_count + unresolved_count;
        let rate = if total_issues == 0 {
            0.0
        } else {
            resolved_count as f64 / total_issues as f64
        };

        Self {
            export_date: Utc::now(),
            total_issues,
            resolved_count,
            unresolved_count,
            resolution_rate: (rate * 10_000.0).round() / 10_000.0,
            total_attachments,
            skipped_issues,
        }
    }
}

/// エクスポート先ストアの抽象化トレイト
#[async_trait]
pub trait ExportStore: Send + Sync {
    /// プロジェクトのエクスポート先を初期化
    ///
    /// 再実行時は前回のIssueデータを破棄する（明示的な再エクスポート）。
    async fn initialize(&mut self, project: &Project) -> Result<()>;

    /// Issueをひとつ書き出し、書き込んだパスを返す
    async fn write_issue(&mut self, project: &Project, issue: &Issue) -> Result<PathBuf>;

    /// 添付ファイルの本体を書き出し、書き込んだパスを返す
    async fn write_attachment(
        &mut self,
        project: &Project,
        issue: &Issue,
        attachment: &Attachment,
        bytes: &[u8],
    ) -> Result<PathBuf>;

    /// プロジェクトのメタデータを書き出し
    async fn write_metadata(&mut self, project: &Project, metadata: &ExportMetadata)
    -> Result<()>;
}

/// JSON形式のファイルストア（gzip圧縮対応）
///
/// レイアウト:
/// ```text
/// <output_dir>/<project>/issues/<ID-READABLE>.json
/// <output_dir>/<project>/attachments/<ID-READABLE>/<attachment_id>_<name>
/// <output_dir>/<project>/metadata.json
/// ```
pub struct JsonExportStore {
    /// エクスポートルートディレクトリ
    output_dir: PathBuf,
    /// Issueファイルをgzip圧縮するかどうか
    use_compression: bool,
}

impl JsonExportStore {
    /// 新しいストアを作成（圧縮なし）
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            use_compression: false,
        }
    }

    /// 圧縮設定を変更
    pub fn with_compression(mut self, use_compression: bool) -> Self {
        self.use_compression = use_compression;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn project_dir(&self, project: &Project) -> PathBuf {
        self.output_dir.join(project.folder_name())
    }

    fn issues_dir(&self, project: &Project) -> PathBuf {
        self.project_dir(project).join("issues")
    }

    fn attachments_dir(&self, project: &Project, issue: &Issue) -> PathBuf {
        self.project_dir(project)
            .join("attachments")
            .join(&issue.id_readable)
    }

    fn issue_file_path(&self, project: &Project, issue: &Issue) -> PathBuf {
        let filename = if self.use_compression {
            format!("{}.json.gz", issue.id_readable)
        } else {
            format!("{}.json", issue.id_readable)
        };
        self.issues_dir(project).join(filename)
    }

    /// データをJSONファイルに書き込み（圧縮対応）
    async fn write_json_file<T>(&self, path: &Path, data: &T, compress: bool) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let json_data = serde_json::to_vec_pretty(data)
            .map_err(|e| Error::SerializationError(format!("JSON serialization failed: {}", e)))?;

        let final_data = if compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json_data).map_err(Error::IoError)?;
            encoder.finish().map_err(Error::IoError)?
        } else {
            json_data
        };

        let mut file = File::create(path).await.map_err(Error::IoError)?;
        file.write_all(&final_data).await.map_err(Error::IoError)?;
        file.flush().await.map_err(Error::IoError)?;

        Ok(())
    }
}

#[async_trait]
impl ExportStore for JsonExportStore {
    async fn initialize(&mut self, project: &Project) -> Result<()> {
        let issues_dir = self.issues_dir(project);

        // 前回のIssueデータを破棄してから作り直す。ディレクトリ作成は冪等
        match tokio::fs::remove_dir_all(&issues_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::IoError(e)),
        }

        create_dir_all(&issues_dir).await.map_err(Error::IoError)?;
        Ok(())
    }

    async fn write_issue(&mut self, project: &Project, issue: &Issue) -> Result<PathBuf> {
        let path = self.issue_file_path(project, issue);
        create_dir_all(self.issues_dir(project))
            .await
            .map_err(Error::IoError)?;
        self.write_json_file(&path, issue, self.use_compression)
            .await?;
        Ok(path)
    }

    async fn write_attachment(
        &mut self,
        project: &Project,
        issue: &Issue,
        attachment: &Attachment,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.attachments_dir(project, issue);
        create_dir_all(&dir).await.map_err(Error::IoError)?;

        let path = dir.join(attachment_file_name(attachment));
        let mut file = File::create(&path).await.map_err(Error::IoError)?;
        file.write_all(bytes).await.map_err(Error::IoError)?;
        file.flush().await.map_err(Error::IoError)?;

        Ok(path)
    }

    async fn write_metadata(
        &mut self,
        project: &Project,
        metadata: &ExportMetadata,
    ) -> Result<()> {
        let dir = self.project_dir(project);
        create_dir_all(&dir).await.map_err(Error::IoError)?;

        // メタデータは常に平文のJSON
        let path = dir.join("metadata.json");
        self.write_json_file(&path, metadata, false).await
    }
}

/// 添付ファイルの出力ファイル名を組み立て
///
/// 添付IDを前置して衝突を防ぎ、語幹は100文字に切り詰める。
fn attachment_file_name(attachment: &Attachment) -> String {
    let name = if attachment.name.is_empty() {
        "attachment"
    } else {
        &attachment.name
    };

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("attachment");
    let stem: String = sanitize_component(stem)
        .chars()
        .take(ATTACHMENT_STEM_MAX_CHARS)
        .collect();

    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{}_{}.{}", attachment.id, stem, sanitize_component(ext)),
        None => format!("{}_{}", attachment.id, stem),
    }
}

/// パスとして危険な文字を`_`に置き換え
fn sanitize_component(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
