use crate::core::error::FetchError;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const USER_AGENT: &str = "ratehub/1.0";

/// Linear backoff policy applied around a whole fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of runs, including the first one.
    pub max_attempts: usize,
    /// Base delay; the wait after failed attempt `n` is `delay * n`.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn backoff(&self, attempt: usize) -> Duration {
        self.delay * attempt as u32
    }
}

/// Retries an async operation with linearly increasing delays
///
/// # Parameters
/// - `policy`: Attempt limit and base delay
/// - `label`: Name used in log lines
/// - `operation`: Closure returning a future
///
/// # Returns
/// Either the successful result or the error of the last attempt, unchanged
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                warn!(
                    source = label,
                    error = %err,
                    "Attempt {}/{} failed",
                    attempt,
                    max_attempts
                );
                if attempt >= max_attempts {
                    warn!(source = label, "All {} attempts failed", max_attempts);
                    return Err(err);
                }
                tokio::time::sleep(policy.backoff(attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// Wraps a fallible future with start/finish log lines and its elapsed time.
pub async fn with_logging<Fut, T, E>(action: &str, fut: Fut) -> (Result<T, E>, Duration)
where
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    info!(action, "Starting");
    let started = Instant::now();
    let result = fut.await;
    let elapsed = started.elapsed();
    match &result {
        Ok(_) => info!(action, elapsed_ms = elapsed.as_millis() as u64, "Finished"),
        Err(e) => warn!(
            action,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %e,
            "Failed"
        ),
    }
    (result, elapsed)
}

pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Maps a transport error onto the fetch error taxonomy.
pub fn classify(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else if err.is_decode() {
        FetchError::Parse(err.to_string())
    } else if let Some(status) = err.status() {
        FetchError::HttpStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    } else {
        FetchError::Connection(err.to_string())
    }
}

/// Performs a GET and decodes a JSON body, rejecting non-2xx responses.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<T, FetchError> {
    let started = Instant::now();
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify(e, timeout))?;

    let status = response.status();
    debug!(
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Received response"
    );
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        });
    }

    let text = response.text().await.map_err(|e| classify(e, timeout))?;
    serde_json::from_str(&text).map_err(|e| FetchError::Parse(e.to_string()))
}

/// Hides a credential embedded in a URL before it reaches the logs.
pub fn redact(url: &str, secret: &str) -> String {
    if secret.is_empty() {
        url.to_string()
    } else {
        url.replace(secret, "***")
    }
}
