use serde::{Deserialize, Serialize};

use super::User;

/// Issueのコメント
///
/// コメントは必ずひとつのIssueに属し、Issueのペイロードにネストされて取得される。
/// 取得後に変更されることはない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    /// 作成時刻（エポックミリ秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}
