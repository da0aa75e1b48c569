use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, header};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};
use crate::models::{Attachment, Issue, Project, User};
use crate::retry::RetryPolicy;

/// プロジェクト一覧取得のページサイズ
const PROJECT_PAGE_SIZE: usize = 100;

/// プロジェクト一覧で要求するフィールド
const PROJECT_FIELDS: &str = "id,name,shortName,archived,description";

/// 接続確認・ユーザー情報で要求するフィールド
const USER_FIELDS: &str = "id,login,name,email";

/// ページングの一覧取得で要求する軽量フィールド
const ISSUE_LIST_FIELDS: &str = "id,idReadable,summary,resolved";

/// Issue詳細で要求するフィールド（カスタムフィールド・コメント・添付メタデータ込み）
const ISSUE_DETAIL_FIELDS: &str = "id,idReadable,summary,description,resolved,\
reporter(id,login,name,email),customFields(name,value(name)),\
comments(id,text,created,author(id,login,name,email)),\
attachments(id,name,size,mimeType,url)";

/// YouTrack接続設定
#[derive(Debug, Clone)]
pub struct YouTrackConfig {
    pub base_url: String,
    pub token: String,
}

impl YouTrackConfig {
    /// 新しい接続設定を作成
    ///
    /// URLを検証し、末尾のスラッシュは取り除く。
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let token = token.into();

        let _ = Url::parse(&base_url)
            .map_err(|_| Error::InvalidConfiguration("Invalid base URL".to_string()))?;

        if token.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "API token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// 環境変数（.env込み）から接続設定を作成
    pub fn from_env() -> Result<Self> {
        use std::env;

        dotenv::dotenv().ok();

        let base_url = env::var("YOUTRACK_URL").map_err(|_| {
            Error::ConfigurationMissing("YOUTRACK_URL not found in environment".to_string())
        })?;

        let token = env::var("YOUTRACK_TOKEN").map_err(|_| {
            Error::ConfigurationMissing("YOUTRACK_TOKEN not found in environment".to_string())
        })?;

        Self::new(base_url, token)
    }
}

/// YouTrack REST APIクライアント
///
/// 認証トークンはデフォルトヘッダーに焼き込む。呼び出し間で保持する状態は
/// それだけで、すべての操作はネットワーク呼び出しのみを副作用とする。
#[derive(Debug, Clone)]
pub struct YouTrackClient {
    client: Client,
    config: Arc<YouTrackConfig>,
    retry: RetryPolicy,
}

impl YouTrackClient {
    /// 新しいクライアントを作成（リクエストタイムアウトは30秒）
    pub fn new(config: YouTrackConfig) -> Result<Self> {
        Self::with_timeout(config, Duration::from_secs(30))
    }

    /// リクエストタイムアウトを指定してクライアントを作成
    pub fn with_timeout(config: YouTrackConfig, timeout: Duration) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.token))
                .map_err(|_| Error::InvalidConfiguration("Invalid auth header".to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Unexpected(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
            retry: RetryPolicy::new(),
        })
    }

    /// リトライポリシーを設定
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &YouTrackConfig {
        &self.config
    }

    /// 接続確認を兼ねて現在のユーザーを取得
    pub async fn current_user(&self) -> Result<User> {
        let url = format!("{}/api/users/me?fields={}", self.config.base_url, USER_FIELDS);
        self.get_json(&url).await
    }

    /// 全プロジェクトを取得（ページングは内部で処理）
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        let mut skip = 0usize;

        loop {
            let url = format!(
                "{}/api/admin/projects?fields={}&$top={}&$skip={}",
                self.config.base_url, PROJECT_FIELDS, PROJECT_PAGE_SIZE, skip
            );
            let page: Vec<Project> = self.get_json(&url).await?;
            let page_len = page.len();
            projects.extend(page);

            // ページサイズに満たないページで終端
            if page_len < PROJECT_PAGE_SIZE {
                break;
            }
            skip += page_len;
        }

        Ok(projects)
    }

    /// クエリに一致するIssue件数を取得
    ///
    /// YouTrackは集計が終わるまで`-1`を返すため、呼び出し側でポーリングする。
    pub async fn count_issues(&self, query: &str) -> Result<i64> {
        let url = format!(
            "{}/api/issuesGetter/count?fields=count",
            self.config.base_url
        );
        let body = serde_json::json!({ "query": query });
        let response: IssueCountResponse = self.post_json(&url, &body).await?;
        Ok(response.count)
    }

    /// クエリに一致するIssueを1ページ分取得（軽量フィールドのみ）
    ///
    /// ページングは呼び出し側が`skip`を進めて繰り返す。ストリームは再開
    /// 不能で、新しい呼び出しは先頭から取り直しになる。
    pub async fn list_issues(&self, query: &str, skip: u32, top: u32) -> Result<Vec<Issue>> {
        let url = format!(
            "{}/api/issues?query={}&fields={}&$top={}&$skip={}",
            self.config.base_url,
            urlencoding::encode(query),
            ISSUE_LIST_FIELDS,
            top,
            skip
        );
        self.get_json(&url).await
    }

    /// Issueの詳細（カスタムフィールド・コメント・添付メタデータ）を取得
    ///
    /// 一覧取得と詳細取得の間にIssueが消えた場合は`NotFound`を返す。
    pub async fn get_issue(&self, issue_id: &str) -> Result<Issue> {
        let url = format!(
            "{}/api/issues/{}?fields={}",
            self.config.base_url, issue_id, ISSUE_DETAIL_FIELDS
        );
        self.get_json(&url).await
    }

    /// 添付ファイルの本体を取得
    pub async fn download_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        let path = attachment.url.as_deref().ok_or_else(|| {
            Error::InvalidInput(format!("attachment {} has no download url", attachment.id))
        })?;

        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.config.base_url, path)
        };

        self.get_bytes(&url).await
    }

    /// GETリクエスト（リトライ込み）
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut attempt = 1;
        loop {
            match self.fetch_json(url).await {
                Ok(value) => return Ok(value),
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    tracing::warn!(attempt, error = %e, "transient request failure, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// POSTリクエスト（リトライ込み、読み取り専用のエンドポイントにのみ使う）
    async fn post_json<T, B>(&self, url: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: serde::Serialize,
    {
        let mut attempt = 1;
        loop {
            match self.send_post(url, body).await {
                Ok(value) => return Ok(value),
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    tracing::warn!(attempt, error = %e, "transient request failure, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// バイナリのGETリクエスト（リトライ込み）
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 1;
        loop {
            match self.fetch_bytes(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    tracing::warn!(attempt, error = %e, "transient request failure, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().await?;
        let response = Self::check_status(response).await?;
        let data = response.json::<T>().await?;
        Ok(data)
    }

    async fn send_post<T, B>(&self, url: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: serde::Serialize,
    {
        let response = self.client.post(url).json(body).send().await?;
        let response = Self::check_status(response).await?;
        let data = response.json::<T>().await?;
        Ok(data)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// HTTPステータスをエラー型にマッピング
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(match status.as_u16() {
            401 | 403 => Error::AuthenticationFailed(message),
            404 => Error::NotFound(message),
            429 => Error::RateLimitExceeded,
            code => Error::ApiError {
                status: code,
                message,
            },
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct IssueCountResponse {
    count: i64,
}
