use std::time::Duration;

pub const DOCUMENT_UPLOAD_PATH: &str = "/api/documents/post_document/";
pub const AUTH_SCHEME: &str = "Token";

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub const LIVENESS_ROUTE: &str = "/health/liveness";
pub const READINESS_ROUTE: &str = "/health/readiness";
pub const METRICS_ROUTE: &str = "/metrics";

/// Upload endpoint for a base URL, tolerating a trailing slash.
pub fn upload_url(base_url: &str) -> String {
    format!("{}{DOCUMENT_UPLOAD_PATH}", base_url.trim_end_matches('/'))
}

pub fn authorization_header(token: &str) -> String {
    format!("{AUTH_SCHEME} {token}")
}
