//! Fleet visualization errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the workspace.
pub type Result<T> = anyhow::Result<T, Error>;

/// Domain level error type returned by the engine.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Error {
    /// The position feed could not be reached or returned an unusable payload.
    #[error("code: feed_unavailable, description: {0}")]
    FeedUnavailable(String),

    /// The routing service failed to compute a route.
    #[error("code: route_failed, description: {0}")]
    RouteFailed(String),

    /// A snapshot entry failed validation and was dropped.
    #[error("code: invalid_entity, description: {0}")]
    InvalidEntity(String),

    /// A payload could not be decoded.
    #[error("code: invalid_format, description: {0}")]
    InvalidFormat(String),

    /// An upstream dependency answered with a failure status.
    #[error("code: bad_gateway, description: {0}")]
    BadGateway(String),

    /// The requested resource could not be found.
    #[error("code: not_found, description: {0}")]
    NotFound(String),

    /// A snapshot older than the last applied one arrived.
    #[error("code: outdated, description: {0}")]
    Outdated(String),

    /// The map surface has not been initialized yet.
    #[error("code: surface_not_ready")]
    SurfaceNotReady,

    /// A non recoverable internal error occurred.
    #[error("code: internal, description: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the stable error code associated with the variant.
    #[must_use]
    pub const fn code(&self) -> &str {
        match self {
            Self::FeedUnavailable(_) => "feed_unavailable",
            Self::RouteFailed(_) => "route_failed",
            Self::InvalidEntity(_) => "invalid_entity",
            Self::InvalidFormat(_) => "invalid_format",
            Self::BadGateway(_) => "bad_gateway",
            Self::NotFound(_) => "not_found",
            Self::Outdated(_) => "outdated",
            Self::SurfaceNotReady => "surface_not_ready",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Whether the condition is expected to clear up on a later attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::FeedUnavailable(_) | Self::RouteFailed(_) | Self::BadGateway(_)
                | Self::SurfaceNotReady
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        let chain = err.chain().map(ToString::to_string).collect::<Vec<_>>().join(" -> ");

        // if type is Error, return it with the newly added context
        if let Some(inner) = err.downcast_ref::<Self>() {
            tracing::debug!("Error: {err}, caused by: {inner}");

            return match inner {
                Self::FeedUnavailable(_) => Self::FeedUnavailable(chain),
                Self::RouteFailed(_) => Self::RouteFailed(chain),
                Self::InvalidEntity(_) => Self::InvalidEntity(chain),
                Self::InvalidFormat(_) => Self::InvalidFormat(chain),
                Self::BadGateway(_) => Self::BadGateway(chain),
                Self::NotFound(_) => Self::NotFound(chain),
                Self::Outdated(_) => Self::Outdated(chain),
                Self::Internal(_) => Self::Internal(chain),
                Self::SurfaceNotReady => Self::SurfaceNotReady,
            };
        }

        // otherwise, return an Internal error
        Self::Internal(chain)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

#[macro_export]
macro_rules! bad_gateway {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::BadGateway(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::BadGateway(format!($err))
    };
}

#[macro_export]
macro_rules! not_found {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::NotFound(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::NotFound(format!($err))
    };
}

#[macro_export]
macro_rules! route_failed {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::RouteFailed(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::RouteFailed(format!($err))
    };
}

#[cfg(test)]
mod tests {
    use anyhow::{Context, Result, anyhow};
    use serde_json::Value;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Registry, fmt};

    use super::Error;

    #[test]
    fn error_display() {
        let err = Error::FeedUnavailable("connection reset".to_string());
        assert_eq!(format!("{err}",), "code: feed_unavailable, description: connection reset");
        assert_eq!(err.code(), "feed_unavailable");
    }

    #[test]
    fn with_context() {
        Registry::default().with(EnvFilter::new("debug")).with(fmt::layer()).try_init().ok();

        let context_error = || -> Result<(), Error> {
            Err(Error::RouteFailed("no route".to_string()))
                .context("computing route")
                .context("refreshing traffic")?;
            Ok(())
        };

        let result = context_error();
        assert_eq!(
            result.unwrap_err(),
            Error::RouteFailed(
                "refreshing traffic -> computing route -> code: route_failed, description: no route"
                    .to_string()
            )
        );
    }

    #[test]
    fn untyped_failure_is_internal() {
        let result = Err::<(), anyhow::Error>(anyhow!("socket closed")).context("polling vehicles");
        let err: Error = result.unwrap_err().into();

        assert_eq!(err.to_string(), "code: internal, description: polling vehicles -> socket closed");
        assert!(!err.is_transient());
    }

    #[test]
    fn truncated_payload() {
        let result: Result<Value, anyhow::Error> =
            serde_json::from_str(r#"{"entities": []"#).context("decoding feed response");
        let err: Error = result.unwrap_err().into();

        assert_eq!(
            err.to_string(),
            "code: internal, description: decoding feed response -> EOF while parsing an object at line 1 column 15"
        );
    }

    #[test]
    fn transient_errors() {
        assert!(Error::FeedUnavailable(String::new()).is_transient());
        assert!(Error::SurfaceNotReady.is_transient());
        assert!(!Error::InvalidEntity(String::new()).is_transient());
    }

    #[test]
    fn macros() {
        let err = crate::bad_gateway!("status {}", 503);
        assert_eq!(err, Error::BadGateway("status 503".to_string()));
        let err = crate::route_failed!("ZERO_RESULTS");
        assert_eq!(err.code(), "route_failed");
    }
}
