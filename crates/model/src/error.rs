use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The service is rate limited (HTTP 429).
    RateLimited,
    /// The account ran out of credits (HTTP 402).
    QuotaExhausted,
    /// The request was refused before any data was streamed.
    Rejected,
    /// The stream broke after it had started.
    Interrupted,
    /// The stream stayed silent for too long.
    TimedOut,
    /// A non-streaming body did not have the expected shape.
    SchemaMismatch,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::QuotaExhausted => "quota exhausted",
            ErrorKind::Rejected => "request rejected",
            ErrorKind::Interrupted => "stream interrupted",
            ErrorKind::TimedOut => "timed out",
            ErrorKind::SchemaMismatch => "schema mismatch",
        };
        f.write_str(s)
    }
}
