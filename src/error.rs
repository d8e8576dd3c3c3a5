use thiserror::Error;

/// Failure of a single chapter. Never aborts the batch on its own.
#[derive(Debug, Error)]
pub enum ChapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("content container not found (selector `{selector}`)")]
    ContentNotFound { selector: String },

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Error)]
#[error("fetch {url} failed after {attempts} attempt(s){}: {message}", status_suffix(.status))]
pub struct FetchError {
    pub url: String,
    pub status: Option<u16>,
    pub attempts: u32,
    pub retries_exhausted: bool,
    pub message: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!(" (HTTP {status})"),
        None => String::new(),
    }
}
