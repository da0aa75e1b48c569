use serde::{Deserialize, Serialize};

/// YouTrackプロジェクト
///
/// エクスポートではプロジェクトは出力ディレクトリのグルーピングキーとして使う。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "shortName")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Project {
    /// アーカイブされていない（エクスポート可能な）プロジェクトかどうか
    pub fn is_active(&self) -> bool {
        !self.archived.unwrap_or(false)
    }

    /// クエリの`project:`句に使うキーを取得（shortName > id）
    pub fn key(&self) -> &str {
        self.short_name.as_deref().unwrap_or(&self.id)
    }

    /// エクスポート先ディレクトリ名を取得
    ///
    /// プロジェクト名をスラグ化する。名前が空になる場合はidにフォールバック。
    pub fn folder_name(&self) -> String {
        let slug = slugify(&self.name);
        if slug.is_empty() {
            slugify(&self.id)
        } else {
            slug
        }
    }
}

/// 文字列をディレクトリ名として安全なスラグに変換
///
/// 英数字以外の連続はひとつの`-`に潰し、先頭・末尾の`-`は落とす。
fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_was_dash = true; // 先頭のダッシュを抑止

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }

    slug.trim_end_matches('-').to_string()
}
