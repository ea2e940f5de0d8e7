//! Built-in configuration defaults

/// GitHub REST endpoint used by the remote backend.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// GitHub release asset upload endpoint.
pub const GITHUB_UPLOADS_URL: &str = "https://uploads.github.com";

/// Per-request timeout for remote backend calls, in seconds.
pub const HTTP_TIMEOUT_SECONDS: u64 = 600;

pub(super) fn github_api_url() -> String {
    GITHUB_API_URL.to_string()
}

pub(super) fn github_uploads_url() -> String {
    GITHUB_UPLOADS_URL.to_string()
}

pub(super) fn http_timeout_seconds() -> u64 {
    HTTP_TIMEOUT_SECONDS
}
