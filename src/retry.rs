use std::time::Duration;

use crate::Error;

/// 一時的な失敗に対するリトライポリシー
///
/// 指数バックオフ（base_delay * 2^(attempt-1)）で待機する。
/// リトライ対象かどうかの判定は`Error::is_transient`に従う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大試行回数（初回を含む）
    pub max_attempts: u32,
    /// 初回リトライまでの待機時間
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// デフォルト設定で新しいリトライポリシーを作成
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }

    /// 最大試行回数を設定
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// 初回待機時間を設定
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// attempt回目（1始まり）の失敗後に待機する時間を計算
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }

    /// attempt回目（1始まり）の失敗後にリトライすべきかどうか
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::new();

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_retry_policy_builder() {
        let policy = RetryPolicy::new()
            .max_attempts(5)
            .base_delay(Duration::from_millis(100));

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_max_attempts_is_at_least_one() {
        let policy = RetryPolicy::new().max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_delay_for_exponential_backoff() {
        let policy = RetryPolicy::new().base_delay(Duration::from_millis(100));

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_should_retry_transient_error() {
        let policy = RetryPolicy::new().max_attempts(3);
        let error = Error::ApiError {
            status: 502,
            message: "Bad Gateway".to_string(),
        };

        assert!(policy.should_retry(&error, 1));
        assert!(policy.should_retry(&error, 2));
        // 最大試行回数に達したらリトライしない
        assert!(!policy.should_retry(&error, 3));
    }

    #[test]
    fn test_should_not_retry_permanent_error() {
        let policy = RetryPolicy::new();
        let error = Error::NotFound("issue 2-1".to_string());

        assert!(!policy.should_retry(&error, 1));
    }
}
