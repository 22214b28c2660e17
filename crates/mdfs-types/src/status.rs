use std::fmt;

use crate::status_code::{self, StatusCode, status_code_t};

/// A status value carrying a numeric code and an optional message.
///
/// `#[must_use]` so callers cannot silently drop an error status.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Status {
    code: status_code_t,
    message: Option<String>,
}

impl Status {
    /// Create a status with just a code.
    pub fn new(code: status_code_t) -> Self {
        Self { code, message: None }
    }

    /// Create a status with a code and a descriptive message.
    pub fn with_message(code: status_code_t, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(msg.into()),
        }
    }

    /// The numeric status code.
    pub fn code(&self) -> status_code_t {
        self.code
    }

    /// The symbolic name of the code, e.g. `"Scrub::AlreadyQueued"`.
    pub fn code_name(&self) -> &'static str {
        status_code::to_string(self.code)
    }

    /// The optional message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether this status represents success.
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::OK
    }

    /// Whether this status carries the given code.
    pub fn is_code(&self, code: status_code_t) -> bool {
        self.code == code
    }

    /// Human-readable description like `"Meta::NotFound(3000) entry missing"`.
    pub fn describe(&self) -> String {
        match &self.message {
            Some(msg) => format!("{}({}) {}", self.code_name(), self.code, msg),
            None => format!("{}({})", self.code_name(), self.code),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl std::error::Error for Status {}

impl From<status_code_t> for Status {
    fn from(code: status_code_t) -> Self {
        Self::new(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_code::{MetaCode, ScrubCode};

    #[test]
    fn test_status_ok() {
        let s = Status::new(StatusCode::OK);
        assert!(s.is_ok());
        assert_eq!(s.code(), 0);
        assert!(s.message().is_none());
        assert_eq!(s.describe(), "OK(0)");
    }

    #[test]
    fn test_status_with_message() {
        let s = Status::with_message(MetaCode::NOT_FOUND, "entry missing");
        assert!(!s.is_ok());
        assert!(s.is_code(MetaCode::NOT_FOUND));
        assert_eq!(s.message(), Some("entry missing"));
        assert_eq!(s.describe(), "Meta::NotFound(3000) entry missing");
    }

    #[test]
    fn test_status_display() {
        let s = Status::new(ScrubCode::FETCH_FAILED);
        assert_eq!(format!("{}", s), "Scrub::FetchFailed(9002)");
    }

    #[test]
    fn test_status_from_code() {
        let s: Status = ScrubCode::ALREADY_QUEUED.into();
        assert_eq!(s.code(), 9000);
        assert_eq!(s.code_name(), "Scrub::AlreadyQueued");
    }

    #[test]
    fn test_status_is_error() {
        let s = Status::new(StatusCode::UNKNOWN);
        let e: &dyn std::error::Error = &s;
        assert!(e.to_string().contains("Unknown"));
    }
}
