use std::fmt::{self, Display, Formatter};

use zyquence_model::ErrorKind;

/// A user-visible message about a failed or degraded response.
///
/// The variants are distinct so a user can tell whether to retry now,
/// wait, or accept the partial output they already have.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Notice {
    /// The service asked us to slow down.
    RateLimited,
    /// The account ran out of credits.
    QuotaExhausted,
    /// The request was refused for another reason.
    RequestFailed(String),
    /// The service never started answering.
    NoResponse,
    /// The response broke off. Whatever arrived is kept.
    Interrupted,
    /// The service went silent for too long.
    TimedOut,
    /// The user stopped the response.
    Cancelled,
}

impl Notice {
    /// Picks the notice for a failure of the given kind.
    pub fn from_kind(kind: ErrorKind, message: &str) -> Self {
        match kind {
            ErrorKind::RateLimited => Self::RateLimited,
            ErrorKind::QuotaExhausted => Self::QuotaExhausted,
            ErrorKind::Interrupted => Self::Interrupted,
            ErrorKind::TimedOut => Self::TimedOut,
            ErrorKind::Rejected | ErrorKind::SchemaMismatch => {
                Self::RequestFailed(message.to_owned())
            }
        }
    }

    /// Returns `true` if retrying right away is reasonable.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed(_)
                | Self::NoResponse
                | Self::Interrupted
                | Self::TimedOut
        )
    }
}

impl Display for Notice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => {
                f.write_str("Too many requests. Wait a moment, then try again.")
            }
            Self::QuotaExhausted => f.write_str(
                "You are out of AI credits. Add credits to keep chatting.",
            ),
            Self::RequestFailed(message) => {
                write!(f, "The request failed: {message}. You can retry now.")
            }
            Self::NoResponse => f.write_str(
                "The assistant did not answer in time. You can retry now.",
            ),
            Self::Interrupted => f.write_str(
                "The response was cut off. What arrived so far is kept.",
            ),
            Self::TimedOut => f.write_str(
                "The assistant stopped responding. What arrived so far is kept.",
            ),
            Self::Cancelled => f.write_str("Response stopped."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_texts_are_distinct() {
        let notices = [
            Notice::RateLimited,
            Notice::QuotaExhausted,
            Notice::RequestFailed("HTTP 500".to_owned()),
            Notice::NoResponse,
            Notice::Interrupted,
            Notice::TimedOut,
            Notice::Cancelled,
        ];
        let texts: std::collections::HashSet<_> =
            notices.iter().map(ToString::to_string).collect();
        assert_eq!(texts.len(), notices.len());
        assert!(notices[2].to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_from_kind() {
        assert_eq!(
            Notice::from_kind(ErrorKind::RateLimited, ""),
            Notice::RateLimited
        );
        assert_eq!(
            Notice::from_kind(ErrorKind::QuotaExhausted, ""),
            Notice::QuotaExhausted
        );
        assert_eq!(
            Notice::from_kind(ErrorKind::Rejected, "bad request"),
            Notice::RequestFailed("bad request".to_owned())
        );
        assert!(!Notice::RateLimited.is_retryable());
        assert!(!Notice::Cancelled.is_retryable());
        assert!(Notice::NoResponse.is_retryable());
        assert!(Notice::Interrupted.is_retryable());
    }
}
