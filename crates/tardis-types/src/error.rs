use thiserror::Error;

pub type Result<T> = std::result::Result<T, TardisError>;

#[derive(Debug, Error)]
pub enum TardisError {
    /// A migration request that violates policy: non-local file, unverified
    /// file, or a target identical to the current location.
    #[error("migration error: {0}")]
    Migration(String),

    /// A URL that does not belong to the destination, a missing header, or a
    /// malformed response.
    #[error("provider error: {0}")]
    Provider(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("{context}: HTTP status {status}")]
    HttpStatus { context: String, status: u16 },

    #[error("transfer error: {0}")]
    Transfer(String),

    #[error("{attribute} mismatch: local {local}, remote {remote}")]
    ChecksumMismatch {
        attribute: &'static str,
        local: String,
        remote: String,
    },

    #[error("archiving error: {0}")]
    Archiving(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The original failure, plus a cleanup step that also failed. The
    /// original error is always the one reported first.
    #[error("{source} (cleanup also failed: {cleanup})")]
    CleanupFailed {
        source: Box<TardisError>,
        cleanup: Box<TardisError>,
    },
}

impl TardisError {
    /// The triggering error, looking through any attached cleanup failures.
    pub fn root(&self) -> &TardisError {
        match self {
            TardisError::CleanupFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Attach a failed cleanup to this error without masking it.
    pub fn with_cleanup_failure(self, cleanup: TardisError) -> Self {
        TardisError::CleanupFailed {
            source: Box::new(self),
            cleanup: Box::new(cleanup),
        }
    }

    /// True when the remote side cannot answer the question at all, as
    /// opposed to answering it wrongly.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.root(),
            TardisError::NotImplemented(_) | TardisError::HttpStatus { status: 400, .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self.root() {
            TardisError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_failure_keeps_original_first() {
        let err = TardisError::Transfer("PUT failed".into())
            .with_cleanup_failure(TardisError::Transfer("DELETE failed".into()));
        let msg = err.to_string();
        assert!(msg.starts_with("transfer error: PUT failed"), "{msg}");
        assert!(msg.contains("DELETE failed"));
        assert!(matches!(err.root(), TardisError::Transfer(m) if m == "PUT failed"));
    }

    #[test]
    fn unavailable_covers_not_implemented_and_400() {
        assert!(TardisError::NotImplemented("metadata".into()).is_unavailable());
        let bad_request = TardisError::HttpStatus {
            context: "GET x".into(),
            status: 400,
        };
        assert!(bad_request.is_unavailable());
        assert_eq!(bad_request.status(), Some(400));
        let not_found = TardisError::HttpStatus {
            context: "GET x".into(),
            status: 404,
        };
        assert!(!not_found.is_unavailable());
        assert!(!TardisError::Transfer("reset".into()).is_unavailable());
    }
}
