use std::fmt::{self, Debug};
use std::io;

use uuid::Uuid;

/// Failures of the fragment aggregator.
///
/// `InvalidFragment` is only fatal when it concerns the sole fragment of a
/// call; otherwise the fragment is dropped and the error is reported in
/// `UnifiedRoute::warnings`.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("no fragments to aggregate")]
    EmptyFragments,

    #[error("trip id mismatch: expected {expected}, found {found}")]
    TripIdMismatch { expected: Uuid, found: Uuid },

    #[error("invalid fragment {id}: {reason}")]
    InvalidFragment { id: String, reason: String },

    #[error("every fragment is invalid")]
    AllFragmentsInvalid,
}

#[derive(Debug)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl Error {
    /// Network and upstream failures, which may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self.code {
            3 | 4 => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        reqwest_error(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        io_error(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        serialization_error(err)
    }
}

impl From<AggregationError> for Error {
    fn from(err: AggregationError) -> Self {
        aggregation_error(err)
    }
}

pub fn invalid_input_error() -> Error {
    Error {
        code: 101,
        message: "invalid input".into(),
    }
}

pub fn invalid_config_error(reason: &str) -> Error {
    Error {
        code: 102,
        message: format!("invalid configuration: {}", reason),
    }
}

pub fn aggregation_error(err: AggregationError) -> Error {
    Error {
        code: 103,
        message: format!("route aggregation failed: {}", err),
    }
}

pub fn not_found_error(what: &str) -> Error {
    Error {
        code: 104,
        message: format!("not found: {}", what),
    }
}

pub fn io_error(err: io::Error) -> Error {
    Error {
        code: 2,
        message: format!("io error: {}", err),
    }
}

pub fn reqwest_error(err: reqwest::Error) -> Error {
    Error {
        code: 3,
        message: format!("reqwest error: {}", err),
    }
}

pub fn upstream_error() -> Error {
    Error {
        code: 4,
        message: "upstream error".into(),
    }
}

pub fn serialization_error<T: Debug>(err: T) -> Error {
    Error {
        code: 6,
        message: format!("serialization error: {:?}", err),
    }
}

#[test]
fn aggregation_errors_keep_their_kind_in_the_message() {
    let expected = Uuid::new_v4();
    let found = Uuid::new_v4();

    let err: Error = AggregationError::TripIdMismatch { expected, found }.into();

    assert_eq!(err.code, 103);
    assert!(err.message.contains(&expected.to_string()));
    assert!(err.message.contains(&found.to_string()));
    assert!(!err.is_transient());
}

#[test]
fn only_network_and_upstream_errors_are_transient() {
    assert!(upstream_error().is_transient());
    assert!(!invalid_input_error().is_transient());
    assert!(!io_error(io::Error::new(io::ErrorKind::Other, "disk")).is_transient());
}
