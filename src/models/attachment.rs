use serde::{Deserialize, Serialize};

/// Issueの添付ファイルのメタデータ
///
/// `url`はインスタンス相対のダウンロードパス。バイナリ本体は
/// `YouTrackClient::download_attachment`で遅延取得する。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(rename = "mimeType")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}
