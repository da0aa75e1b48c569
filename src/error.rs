use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// 一時的なエラー（リトライ対象）かどうかを判定
    ///
    /// 接続エラー・タイムアウト・レート制限・サーバー側エラー（5xx）のみ
    /// リトライ対象。認証エラーや404はリトライしても結果が変わらない。
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RequestFailed(e) => e.is_connect() || e.is_timeout(),
            Error::RateLimitExceeded => true,
            Error::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// CLIのプロセス終了コードへのマッピング
    ///
    /// 0: 成功 / 1: 認証エラー / 2: ネットワークエラー / 3: 書き込みエラー
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::AuthenticationFailed(_) => 1,
            Error::IoError(_) | Error::SerializationError(_) => 3,
            _ => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
