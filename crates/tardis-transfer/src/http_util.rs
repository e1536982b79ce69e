use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tardis_types::{Result, TardisError};

/// Extract and parse the Content-Length header from an HTTP response.
pub fn extract_content_length(resp: &ureq::Response, context: &str) -> Result<u64> {
    let value = resp.header("Content-Length").ok_or_else(|| {
        TardisError::Provider(format!("{context}: response missing Content-Length header"))
    })?;
    value.trim().parse::<u64>().map_err(|_| {
        TardisError::Provider(format!("{context}: invalid Content-Length header '{value}'"))
    })
}

/// Map a ureq failure onto the error taxonomy. Status responses keep their
/// code so callers can tell "not understood" (400) from other failures.
pub fn map_ureq_error(context: &str, err: ureq::Error) -> TardisError {
    match err {
        ureq::Error::Status(status, _) => TardisError::HttpStatus {
            context: context.to_string(),
            status,
        },
        ureq::Error::Transport(t) => TardisError::Transfer(format!("{context}: {t}")),
    }
}

/// Value of an `Authorization: Basic` header.
pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

/// Append the metadata query to an object URL.
pub fn metadata_url(url: &str) -> String {
    if url.contains('?') {
        format!("{url}&metadata")
    } else {
        format!("{url}?metadata")
    }
}
