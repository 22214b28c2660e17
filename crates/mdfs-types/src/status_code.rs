/// Numeric status code carried by [`crate::Status`].
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// Common status codes (0-999).
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const NOT_IMPLEMENTED: status_code_t = 1;
    pub const INVALID_ARG: status_code_t = 2;
    pub const INVALID_CONFIG: status_code_t = 3;
    pub const INTERRUPTED: status_code_t = 4;
    pub const IO_ERROR: status_code_t = 5;
    pub const FOUND_BUG: status_code_t = 998;
    pub const UNKNOWN: status_code_t = 999;
}

/// Metadata cache status codes (3xxx), surfaced at the namespace cache interface.
pub mod MetaCode {
    use super::status_code_t;

    pub const NOT_FOUND: status_code_t = 3000;
    pub const NOT_DIRECTORY: status_code_t = 3001;
    pub const NOT_FILE: status_code_t = 3002;
    pub const INCONSISTENT: status_code_t = 3003;
    pub const FRAGMENT_NOT_RESIDENT: status_code_t = 3004;
    pub const FETCH_IO: status_code_t = 3005;
}

/// Scrub scheduler status codes (9xxx).
pub mod ScrubCode {
    use super::status_code_t;

    pub const ALREADY_QUEUED: status_code_t = 9000;
    pub const NOT_QUEUED: status_code_t = 9001;
    pub const FETCH_FAILED: status_code_t = 9002;
    pub const CACHE_INCONSISTENT: status_code_t = 9003;
    pub const FOUND_BUG: status_code_t = 9999;
}

/// Classification of status code ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCodeType {
    Invalid,
    Common,
    Meta,
    Scrub,
}

/// Determine the category of a status code.
pub fn type_of(code: status_code_t) -> StatusCodeType {
    match code {
        0..=999 => StatusCodeType::Common,
        3000..=3999 => StatusCodeType::Meta,
        9000..=9999 => StatusCodeType::Scrub,
        _ => StatusCodeType::Invalid,
    }
}

/// Convert a status code to its human-readable name.
pub fn to_string(code: status_code_t) -> &'static str {
    match code {
        // Common
        StatusCode::OK => "OK",
        StatusCode::NOT_IMPLEMENTED => "NotImplemented",
        StatusCode::INVALID_ARG => "InvalidArg",
        StatusCode::INVALID_CONFIG => "InvalidConfig",
        StatusCode::INTERRUPTED => "Interrupted",
        StatusCode::IO_ERROR => "IOError",
        StatusCode::FOUND_BUG => "FoundBug",
        StatusCode::UNKNOWN => "Unknown",

        // Meta
        MetaCode::NOT_FOUND => "Meta::NotFound",
        MetaCode::NOT_DIRECTORY => "Meta::NotDirectory",
        MetaCode::NOT_FILE => "Meta::NotFile",
        MetaCode::INCONSISTENT => "Meta::Inconsistent",
        MetaCode::FRAGMENT_NOT_RESIDENT => "Meta::FragmentNotResident",
        MetaCode::FETCH_IO => "Meta::FetchIO",

        // Scrub
        ScrubCode::ALREADY_QUEUED => "Scrub::AlreadyQueued",
        ScrubCode::NOT_QUEUED => "Scrub::NotQueued",
        ScrubCode::FETCH_FAILED => "Scrub::FetchFailed",
        ScrubCode::CACHE_INCONSISTENT => "Scrub::CacheInconsistent",
        ScrubCode::FOUND_BUG => "Scrub::FoundBug",

        _ => "UnknownStatusCode",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_values() {
        assert_eq!(StatusCode::OK, 0);
        assert_eq!(StatusCode::UNKNOWN, 999);
        assert_eq!(MetaCode::NOT_FOUND, 3000);
        assert_eq!(ScrubCode::ALREADY_QUEUED, 9000);
        assert_eq!(ScrubCode::FOUND_BUG, 9999);
    }

    #[test]
    fn test_type_of() {
        assert_eq!(type_of(StatusCode::OK), StatusCodeType::Common);
        assert_eq!(type_of(MetaCode::INCONSISTENT), StatusCodeType::Meta);
        assert_eq!(type_of(ScrubCode::FETCH_FAILED), StatusCodeType::Scrub);
        assert_eq!(type_of(5000), StatusCodeType::Invalid);
        assert_eq!(type_of(65535), StatusCodeType::Invalid);
    }

    #[test]
    fn test_to_string() {
        assert_eq!(to_string(StatusCode::OK), "OK");
        assert_eq!(to_string(MetaCode::NOT_FOUND), "Meta::NotFound");
        assert_eq!(to_string(ScrubCode::ALREADY_QUEUED), "Scrub::AlreadyQueued");
        assert_eq!(to_string(1234), "UnknownStatusCode");
    }
}
