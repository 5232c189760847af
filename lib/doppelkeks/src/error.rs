use http::StatusCode;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of the token codec itself
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token has a bad length (expected {expected} bytes, got {actual})")]
    BadLength { expected: usize, actual: usize },

    #[error("Token is not valid hex")]
    Encoding,

    #[error("Token authenticator mismatch")]
    Mismatch,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed request body")]
    Body(#[source] BoxError),

    #[error("Invalid CSRF configuration")]
    Config(#[source] BoxError),

    #[error("Register the CSRF check after a body parsing layer")]
    BodyNotParsed,

    #[error("Invalid CSRF token")]
    InvalidToken(#[source] TokenError),

    #[error("No CSRF token found. Add the `_csrf` field to the request body or set the `x-csrf-token` header")]
    MissingToken,

    #[error("Referer header does not match the request origin")]
    ReferrerMismatch,

    #[error("Referer header is missing")]
    ReferrerMissing,

    #[error("CSRF tokens do not match")]
    TokenMismatch,
}

impl Error {
    #[track_caller]
    pub(crate) fn body(err: impl Into<BoxError>) -> Self {
        Self::Body(err.into())
    }

    #[track_caller]
    pub(crate) fn config(err: impl Into<BoxError>) -> Self {
        Self::Config(err.into())
    }

    /// Status code an HTTP layer should answer with
    ///
    /// Integration mistakes are server errors, everything else is the client's fault.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Body(..) => StatusCode::BAD_REQUEST,
            Self::Config(..) | Self::BodyNotParsed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidToken(..)
            | Self::MissingToken
            | Self::ReferrerMismatch
            | Self::ReferrerMissing
            | Self::TokenMismatch => StatusCode::FORBIDDEN,
        }
    }
}

impl From<TokenError> for Error {
    #[inline]
    fn from(value: TokenError) -> Self {
        Self::InvalidToken(value)
    }
}

#[cfg(test)]
mod test {
    use super::{Error, TokenError};
    use http::StatusCode;

    #[test]
    fn integration_errors_are_server_errors() {
        assert_eq!(
            Error::BodyNotParsed.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::config("short secret").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn config_cause_is_only_in_source() {
        let error = Error::config("short secret");
        assert_eq!(error.to_string(), "Invalid CSRF configuration");
        assert_eq!(
            std::error::Error::source(&error).map(ToString::to_string),
            Some("short secret".into())
        );
    }

    #[test]
    fn malformed_body_is_bad_request() {
        assert_eq!(Error::body("eof").status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn client_errors_are_forbidden() {
        for error in [
            Error::InvalidToken(TokenError::Mismatch),
            Error::MissingToken,
            Error::ReferrerMismatch,
            Error::ReferrerMissing,
            Error::TokenMismatch,
        ] {
            assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
        }
    }
}
