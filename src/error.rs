use std::fmt::{self, Debug, Display};

pub const CONFIGURATION: i32 = 1;
pub const DATABASE: i32 = 2;
pub const UPSTREAM_UNAVAILABLE: i32 = 3;
pub const UPSTREAM_REJECTED: i32 = 4;
pub const UNEXPECTED: i32 = 5;

pub const VALIDATION: i32 = 100;
pub const INSUFFICIENT_DATA: i32 = 101;
pub const NO_ROUTE_FOUND: i32 = 102;
pub const ALREADY_FINALIZED: i32 = 103;
pub const NOT_FOUND: i32 = 104;
pub const POINTS_CHANGED: i32 = 105;

#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl Error {
    /// Codes below 100 are failures of the service or its dependencies rather
    /// than of the caller's request.
    pub fn is_internal(&self) -> bool {
        (1..=99).contains(&self.code)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        database_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        reqwest_error(err)
    }
}

pub fn configuration_error(message: impl Into<String>) -> Error {
    Error {
        code: CONFIGURATION,
        message: message.into(),
    }
}

pub fn database_error<T: Debug>(err: T) -> Error {
    tracing::error!("database error: {:?}", err);

    Error {
        code: DATABASE,
        message: "database error".into(),
    }
}

pub fn reqwest_error(err: reqwest::Error) -> Error {
    if err.is_decode() {
        tracing::warn!("undecodable routing response: {}", err);
        return upstream_rejected_error("INVALID_RESPONSE");
    }

    tracing::warn!("routing service unreachable: {}", err);
    upstream_unavailable_error()
}

pub fn upstream_unavailable_error() -> Error {
    Error {
        code: UPSTREAM_UNAVAILABLE,
        message: "upstream unavailable".into(),
    }
}

pub fn upstream_rejected_error(status: impl Into<String>) -> Error {
    Error {
        code: UPSTREAM_REJECTED,
        message: status.into(),
    }
}

pub fn unexpected_error<T: Debug>(err: T) -> Error {
    tracing::error!("unexpected error: {:?}", err);

    Error {
        code: UNEXPECTED,
        message: "unexpected error".into(),
    }
}

pub fn validation_error(message: impl Into<String>) -> Error {
    Error {
        code: VALIDATION,
        message: message.into(),
    }
}

pub fn insufficient_data_error() -> Error {
    Error {
        code: INSUFFICIENT_DATA,
        message: "not enough location data to calculate distance".into(),
    }
}

pub fn no_route_found_error() -> Error {
    Error {
        code: NO_ROUTE_FOUND,
        message: "no route found".into(),
    }
}

pub fn already_finalized_error() -> Error {
    Error {
        code: ALREADY_FINALIZED,
        message: "ride already finalized".into(),
    }
}

pub fn not_found_error() -> Error {
    Error {
        code: NOT_FOUND,
        message: "not found".into(),
    }
}

/// The ride received points after its distance was estimated. Retryable.
pub fn points_changed_error() -> Error {
    Error {
        code: POINTS_CHANGED,
        message: "ride points changed while ending the ride".into(),
    }
}

#[test]
fn internal_codes_test() {
    assert!(upstream_unavailable_error().is_internal());
    assert!(upstream_rejected_error("REQUEST_DENIED").is_internal());
    assert!(!validation_error("bad latitude").is_internal());
    assert!(!already_finalized_error().is_internal());
}

#[test]
fn rejected_error_carries_status_test() {
    let err = upstream_rejected_error("OVER_QUERY_LIMIT");

    assert_eq!(err.code, UPSTREAM_REJECTED);
    assert_eq!(err.message, "OVER_QUERY_LIMIT");
    assert_eq!(err.to_string(), "error 4: OVER_QUERY_LIMIT");
}
