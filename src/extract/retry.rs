use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::error::FailureKind;

/// Which failures earn another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryScope {
    /// Only malformed responses (parse or validation failures).
    ResponseOnly,
    /// Every failure, oracle errors included.
    AnyFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before retry `n` (0-based) is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    pub scope: RetryScope,
}

impl RetryPolicy {
    /// Per-response retries for classification and unit scale.
    pub fn response(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base,
            scope: RetryScope::ResponseOnly,
        }
    }

    /// Whole-stage retries: any failure reruns the stage immediately.
    pub fn stage(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base: Duration::ZERO,
            scope: RetryScope::AnyFailure,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    fn should_retry(&self, kind: &FailureKind) -> bool {
        match self.scope {
            RetryScope::ResponseOnly => kind.is_retryable(),
            RetryScope::AnyFailure => true,
        }
    }
}

/// The last failure once a policy gave up.
#[derive(Debug, Clone, PartialEq)]
pub struct Exhausted {
    pub attempts: u32,
    pub last: FailureKind,
}

/// Run `attempt` until it succeeds, fails in a way the policy won't retry,
/// or the attempt budget runs out.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut attempt: F) -> Result<T, Exhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FailureKind>>,
{
    let max = policy.max_attempts.max(1);
    let mut n = 0;
    loop {
        let kind = match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(kind) => kind,
        };
        n += 1;

        if n >= max || !policy.should_retry(&kind) {
            warn!(what, attempts = n, error = %kind, "Giving up");
            return Err(Exhausted {
                attempts: n,
                last: kind,
            });
        }

        let delay = policy.delay(n - 1);
        warn!(what, attempt = n, error = %kind, delay_ms = delay.as_millis() as u64, "Attempt failed, retrying");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
