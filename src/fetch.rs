use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, USER_AGENT};
use url::Url;

use crate::error::{ChapterError, FetchError};
use crate::model::RawPage;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Retrieves pages and binary assets. Implementations own their retry
/// policy; callers treat any error as final.
pub trait Fetcher {
    fn fetch(&mut self, url: &str) -> Result<RawPage, FetchError>;
    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Sleep `attempt * retry_backoff` between failed attempts.
    pub retry_backoff: Duration,
    /// Minimum spacing between consecutive requests.
    pub min_interval: Duration,
    /// Unit of the exponential penalty after consecutive failures.
    pub failure_backoff_unit: Duration,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(5),
            min_interval: Duration::from_millis(50),
            failure_backoff_unit: Duration::from_secs(1),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

pub fn validate_url(raw: &str) -> Result<Url, ChapterError> {
    let invalid = |reason: String| ChapterError::InvalidUrl {
        url: raw.to_owned(),
        reason,
    };
    let url = Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_owned()));
    }
    Ok(url)
}

/// Spaces requests out and backs off exponentially after consecutive
/// failures; a success clears the penalty.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    backoff_unit: Duration,
    recent: VecDeque<Instant>,
    failures: u32,
}

impl RateLimiter {
    const MAX_PENALTY_UNITS: u64 = 300;
    const HISTORY: usize = 10;

    pub fn new(min_interval: Duration, backoff_unit: Duration) -> Self {
        Self {
            min_interval,
            backoff_unit,
            recent: VecDeque::with_capacity(Self::HISTORY),
            failures: 0,
        }
    }

    /// How long the next request must wait, measured at `now`.
    pub fn delay_at(&self, now: Instant) -> Duration {
        let mut wait = match self.recent.back() {
            Some(last) => self.min_interval.saturating_sub(now.duration_since(*last)),
            None => Duration::ZERO,
        };
        if self.failures > 0 {
            let units = (1_u64 << self.failures.min(16)) - 1;
            wait += self.backoff_unit * units.min(Self::MAX_PENALTY_UNITS) as u32;
        }
        wait
    }

    pub fn wait(&mut self) {
        let delay = self.delay_at(Instant::now());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.recent.len() == Self::HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back(Instant::now());
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }
}

struct AttemptFailure {
    status: Option<u16>,
    message: String,
    retryable: bool,
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    settings: FetchSettings,
    limiter: RateLimiter,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;
        let limiter = RateLimiter::new(settings.min_interval, settings.failure_backoff_unit);
        Ok(Self {
            client,
            settings,
            limiter,
        })
    }

    /// Clear the failure penalty so an optional request (the cover) does not
    /// slow down the chapters that follow it.
    pub fn reset_backoff(&mut self) {
        self.limiter.record_success();
    }

    #[cfg(test)]
    pub(crate) fn pending_delay(&self) -> Duration {
        self.limiter.delay_at(Instant::now())
    }

    fn with_retry<T>(
        &mut self,
        url: &str,
        mut attempt_once: impl FnMut(&reqwest::blocking::Client, &str) -> Result<T, AttemptFailure>,
    ) -> Result<T, FetchError> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            self.limiter.wait();

            let failure = match attempt_once(&self.client, url) {
                Ok(value) => {
                    self.limiter.record_success();
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            self.limiter.record_failure();
            tracing::warn!(
                url,
                attempt = attempts,
                status = ?failure.status,
                error = %failure.message,
                "fetch attempt failed"
            );

            if !failure.retryable || attempts >= max_attempts {
                return Err(FetchError {
                    url: url.to_owned(),
                    status: failure.status,
                    attempts,
                    retries_exhausted: failure.retryable,
                    message: failure.message,
                });
            }

            std::thread::sleep(self.settings.retry_backoff * attempts);
        }
    }

    fn send(
        client: &reqwest::blocking::Client,
        url: &str,
        user_agent: &str,
        accept: &str,
    ) -> Result<reqwest::blocking::Response, AttemptFailure> {
        let response = client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, accept)
            .send()
            .map_err(|err| AttemptFailure {
                status: None,
                message: format!("{err:#}"),
                retryable: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure {
                status: Some(status.as_u16()),
                message: format!("unexpected status {status}"),
                retryable: is_retryable_status(status),
            });
        }
        Ok(response)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

impl Fetcher for HttpFetcher {
    fn fetch(&mut self, url: &str) -> Result<RawPage, FetchError> {
        let user_agent = self.settings.user_agent.clone();
        self.with_retry(url, |client, url| {
            let response = Self::send(
                client,
                url,
                &user_agent,
                "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
            )?;
            let final_url = response.url().to_string();
            let html = response.text().map_err(|err| AttemptFailure {
                status: None,
                message: format!("read body: {err:#}"),
                retryable: true,
            })?;
            if html.trim().is_empty() {
                return Err(AttemptFailure {
                    status: None,
                    message: "empty response body".to_owned(),
                    retryable: true,
                });
            }
            Ok(RawPage {
                html,
                url: final_url,
                retrieved_at: Utc::now(),
            })
        })
    }

    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
        let user_agent = self.settings.user_agent.clone();
        self.with_retry(url, |client, url| {
            let response = Self::send(client, url, &user_agent, "image/*,*/*;q=0.8")?;
            let bytes = response.bytes().map_err(|err| AttemptFailure {
                status: None,
                message: format!("read body: {err:#}"),
                retryable: true,
            })?;
            if bytes.is_empty() {
                return Err(AttemptFailure {
                    status: None,
                    message: "empty response body".to_owned(),
                    retryable: true,
                });
            }
            Ok(bytes.to_vec())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_url_accepts_http_and_https_only() {
        assert!(validate_url("https://example.com/novel/chapter-1").is_ok());
        assert!(validate_url("http://127.0.0.1:8080/x").is_ok());
        assert!(matches!(
            validate_url("ftp://example.com/x"),
            Err(ChapterError::InvalidUrl { .. })
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(ChapterError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn limiter_spaces_requests() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100), Duration::from_secs(1));
        let start = Instant::now();
        assert_eq!(limiter.delay_at(start), Duration::ZERO);
        limiter.recent.push_back(start);
        assert_eq!(
            limiter.delay_at(start + Duration::from_millis(30)),
            Duration::from_millis(70)
        );
        assert_eq!(
            limiter.delay_at(start + Duration::from_millis(500)),
            Duration::ZERO
        );
    }

    #[test]
    fn limiter_backs_off_exponentially_and_resets() {
        let mut limiter = RateLimiter::new(Duration::ZERO, Duration::from_secs(1));
        let now = Instant::now();
        limiter.record_failure();
        assert_eq!(limiter.delay_at(now), Duration::from_secs(1));
        limiter.record_failure();
        limiter.record_failure();
        assert_eq!(limiter.delay_at(now), Duration::from_secs(7));
        for _ in 0..20 {
            limiter.record_failure();
        }
        assert_eq!(limiter.delay_at(now), Duration::from_secs(300));
        limiter.record_success();
        assert_eq!(limiter.delay_at(now), Duration::ZERO);
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
