use serde::{Deserialize, Serialize};

use crate::models::Issue;

/// 解決状態によるフィルタリング
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionFilter {
    /// すべてのIssue
    All,
    /// 未解決のIssueのみ
    UnresolvedOnly,
    /// 解決済みのIssueのみ
    ResolvedOnly,
}

impl Default for ResolutionFilter {
    fn default() -> Self {
        ResolutionFilter::All
    }
}

/// Issue検索フィルター
///
/// 解決状態の述語と任意の生クエリ文字列を合成する。両方が指定された場合は
/// AND条件になる（YouTrackのクエリ言語では空白区切りがANDを意味する）。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueFilter {
    /// 解決状態の述語
    pub resolution: ResolutionFilter,
    /// 追加の生クエリ（YouTrackクエリ言語）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl IssueFilter {
    /// 新しいフィルターを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 解決状態の述語を設定
    pub fn resolution(mut self, resolution: ResolutionFilter) -> Self {
        self.resolution = resolution;
        self
    }

    /// 生クエリを設定
    pub fn query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = if query.trim().is_empty() {
            None
        } else {
            Some(query)
        };
        self
    }

    /// 指定プロジェクトに対するYouTrackクエリ文字列を合成
    pub fn to_query(&self, project_key: &str) -> String {
        let mut parts = vec![format!("project: {{{}}}", project_key)];

        match self.resolution {
            ResolutionFilter::All => {}
            ResolutionFilter::UnresolvedOnly => parts.push("#Unresolved".to_string()),
            ResolutionFilter::ResolvedOnly => parts.push("#Resolved".to_string()),
        }

        if let Some(query) = &self.query {
            parts.push(format!("({})", query.trim()));
        }

        parts.join(" ")
    }

    /// 解決状態の述語をローカルで再検査
    ///
    /// サーバー側のクエリ結果がずれてもグルーピング不変条件が守られるよう、
    /// 書き込み前にもう一度判定する。生クエリ部分はサーバーにしか評価できない
    /// ため対象外。
    pub fn matches(&self, issue: &Issue) -> bool {
        match self.resolution {
            ResolutionFilter::All => true,
            ResolutionFilter::UnresolvedOnly => !issue.is_resolved(),
            ResolutionFilter::ResolvedOnly => issue.is_resolved(),
        }
    }
}
