use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::filter::IssueFilter;
use crate::models::Project;

/// エクスポート実行のオプション
///
/// CLIの引数から組み立てられ、対象プロジェクトの解決と
/// 実行時パラメータの検証を担う。
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// 対象プロジェクトのキー（空なら全アクティブプロジェクト）
    pub projects: Vec<String>,
    /// Issue検索フィルター
    pub filter: IssueFilter,
    /// 出力先ディレクトリ
    pub output_dir: PathBuf,
    /// コメントを含めるかどうか
    pub include_comments: bool,
    /// 添付ファイルを含めるかどうか
    pub include_attachments: bool,
    /// Issueファイルをgzip圧縮するかどうか
    pub compress: bool,
    /// Issue一覧取得のページサイズ
    pub page_size: u32,
}

impl ExportOptions {
    /// デフォルト設定で新しいオプションを作成
    pub fn new() -> Self {
        Self {
            projects: Vec::new(),
            filter: IssueFilter::default(),
            output_dir: PathBuf::from("exports"),
            include_comments: true,
            include_attachments: true,
            compress: false,
            page_size: 50,
        }
    }

    /// 対象プロジェクトのキーを設定
    pub fn projects(mut self, projects: Vec<String>) -> Self {
        self.projects = projects;
        self
    }

    /// フィルターを設定
    pub fn filter(mut self, filter: IssueFilter) -> Self {
        self.filter = filter;
        self
    }

    /// 出力先ディレクトリを設定
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
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

    /// gzip圧縮を設定
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// ページサイズを設定
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// オプションの妥当性を検証
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidInput(
                "ページサイズは1以上である必要があります".to_string(),
            ));
        }
        Ok(())
    }

    /// 対象プロジェクトをサーバーのプロジェクト一覧から解決
    ///
    /// キー未指定の場合は全アクティブプロジェクトを返す。指定されたキーは
    /// shortName・name・idのいずれかと大文字小文字を無視して照合し、
    /// 一致しないキーがあればエラー。
    pub fn resolve_projects(&self, available: &[Project]) -> Result<Vec<Project>> {
        if self.projects.is_empty() {
            return Ok(available.iter().filter(|p| p.is_active()).cloned().collect());
        }

        let mut resolved = Vec::with_capacity(self.projects.len());
        for key in &self.projects {
            let found = available.iter().find(|p| {
                p.short_name
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case(key))
                    || p.name.eq_ignore_ascii_case(key)
                    || p.id.eq_ignore_ascii_case(key)
            });

            match found {
                Some(project) => resolved.push(project.clone()),
                None => {
                    return Err(Error::InvalidInput(format!(
                        "プロジェクトが見つかりません: {}",
                        key
                    )));
                }
            }
        }

        Ok(resolved)
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::new()
    }
}
