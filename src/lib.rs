//! YouTrack REST APIからIssueをローカルファイルにエクスポートするライブラリ
//!
//! プロジェクト一覧の取得、フィルター付きIssue検索、コメント・添付ファイルを
//! 含む詳細取得、プロジェクトごとのディレクトリへのJSON書き出しを提供する。

pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod models;
pub mod retry;
pub mod writer;

pub use client::{YouTrackClient, YouTrackConfig};
pub use config::ExportOptions;
pub use error::{Error, Result};
pub use export::{ExportConfig, ExportResult, ExportService, ExportState, ProjectExportStats};
pub use filter::{IssueFilter, ResolutionFilter};
pub use models::{Attachment, Comment, CustomField, Issue, Project, User};
pub use retry::RetryPolicy;
pub use writer::{ExportMetadata, ExportStore, JsonExportStore};
