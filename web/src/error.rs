use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use identity_auth::Error as AuthError;

use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// A login step failed. The detail is logged, never returned to the client.
    Auth(AuthError),
    Web(WebErrorKind),
}

#[derive(Debug, PartialEq)]
pub enum WebErrorKind {
    /// Malformed request parameters.
    Input,
    /// Unknown or unconfigured provider.
    NotFound,
    /// The provider reported that the user did not authorize the login.
    LoginDenied,
    Internal,
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::Auth(err) => write!(fmt, "{err}"),
            Error::Web(kind) => write!(fmt, "{kind:?}"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Auth(err) => {
                if err.is_provider_side() {
                    warn!("Login failed at the provider: {err}");
                } else {
                    info!("Login rejected: {err}");
                }
                (StatusCode::UNAUTHORIZED, "LOGIN FAILED").into_response()
            }
            Error::Web(kind) => match kind {
                WebErrorKind::Input => (StatusCode::BAD_REQUEST, "BAD REQUEST").into_response(),
                WebErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT FOUND").into_response(),
                WebErrorKind::LoginDenied => {
                    (StatusCode::UNAUTHORIZED, "LOGIN FAILED").into_response()
                }
                WebErrorKind::Internal => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
                }
            },
        }
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Auth(err)
    }
}
