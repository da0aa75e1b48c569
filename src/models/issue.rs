use serde::{Deserialize, Serialize};

use super::{Attachment, Comment, User};

/// YouTrackのIssue
///
/// コメントと添付メタデータはIssueのペイロードにネストされて取得されるため、
/// エクスポートされたIssueファイルに孤児が混ざることはない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    /// 人間可読なID（例: DEMO-1）。出力ファイル名にもこれを使う
    #[serde(rename = "idReadable")]
    #[serde(default)]
    pub id_readable: String,
    #[serde(default)]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 解決時刻（エポックミリ秒）。Noneなら未解決
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter: Option<User>,
    /// カスタムフィールドはプロジェクトごとにスキーマが異なる動的型のため、
    /// 名前と値（serde_json::Value）のペアのまま保持する
    #[serde(rename = "customFields")]
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// 動的型のカスタムフィールド
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomField {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "$type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Issue {
    /// 解決済みかどうか
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// 名前でカスタムフィールドの値を取得
    pub fn custom_field(&self, name: &str) -> Option<&serde_json::Value> {
        self.custom_fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_deserialization() {
        let json_data = json!({
            "id": "2-1",
            "idReadable": "DEMO-1",
            "summary": "Login button does nothing",
            "description": "Steps to reproduce...",
            "resolved": null,
            "reporter": { "id": "1-2", "login": "jane.doe" },
            "customFields": [
                {
                    "name": "Priority",
                    "$type": "SingleEnumIssueCustomField",
                    "value": { "name": "Critical" }
                },
                {
                    "name": "Estimation",
                    "$type": "PeriodIssueCustomField",
                    "value": null
                }
            ],
            "comments": [
                { "id": "4-1", "text": "Confirmed on staging.", "created": 1704067200000i64 }
            ],
            "attachments": [
                { "id": "5-1", "name": "screenshot.png", "url": "/attachments/5-1" }
            ]
        });

        let issue: Issue = serde_json::from_value(json_data).unwrap();

        assert_eq!(issue.id, "2-1");
        assert_eq!(issue.id_readable, "DEMO-1");
        assert_eq!(issue.summary, "Login button does nothing");
        assert!(!issue.is_resolved());
        assert_eq!(issue.custom_fields.len(), 2);
        assert_eq!(issue.comments.len(), 1);
        assert_eq!(issue.attachments.len(), 1);
    }

    #[test]
    fn test_issue_is_resolved() {
        let resolved: Issue = serde_json::from_value(json!({
            "id": "2-2",
            "idReadable": "DEMO-2",
            "summary": "Fixed issue",
            "resolved": 1710000000000i64
        }))
        .unwrap();

        assert!(resolved.is_resolved());
        assert_eq!(resolved.resolved, Some(1710000000000));
    }

    #[test]
    fn test_issue_custom_field_lookup() {
        let issue: Issue = serde_json::from_value(json!({
            "id": "2-1",
            "idReadable": "DEMO-1",
            "summary": "Test",
            "customFields": [
                { "name": "Priority", "value": { "name": "Major" } }
            ]
        }))
        .unwrap();

        let priority = issue.custom_field("Priority").unwrap();
        assert_eq!(priority["name"], "Major");
        assert!(issue.custom_field("Sprint").is_none());
    }

    #[test]
    fn test_issue_minimal_payload_defaults() {
        // ページングの一覧取得では軽量フィールドのみ要求するため、
        // ネストしたコレクションは空で埋まる
        let issue: Issue = serde_json::from_value(json!({
            "id": "2-3",
            "idReadable": "DEMO-3",
            "summary": "Light issue"
        }))
        .unwrap();

        assert!(issue.custom_fields.is_empty());
        assert!(issue.comments.is_empty());
        assert!(issue.attachments.is_empty());
        assert!(issue.description.is_none());
    }
}
