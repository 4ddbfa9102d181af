use actix_web::http::StatusCode;
use std::fmt;

/// Used to create HTTP responses with the given text and status code.
#[derive(Debug, Clone, Copy)]
pub struct ExternalError {
    /// What kind of failure this was. Callers branch on this, never on the text.
    pub cause: Cause,
    /// Error text that will describe the problem to the user, e.g. as a toast.
    pub text: &'static str,
}

/// The kind of failure, as seen by users and by callers of the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// No session, an expired session, or a session that may not do this.
    Unauthorized,
    /// The referenced user, post, save record or file doesn't exist.
    NotFound,
    /// The write collides with existing state, e.g. an email already registered.
    Conflict,
    /// The hosted backend couldn't be reached, or the transport failed midway.
    Network,
    /// A field the user supplied failed validation.
    Validation,
    ServerError,
}

impl Cause {
    /// Classify an HTTP status returned by the hosted backend.
    pub fn from_backend_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 | 422 => Self::Validation,
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            409 => Self::Conflict,
            502 | 503 | 504 => Self::Network,
            _ => Self::ServerError,
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        // Make fmt::Display the same as fmt::Debug, i.e. each variant's name.
        write!(f, "{:?}", self)
    }
}

impl Into<StatusCode> for Cause {
    /// Causes can be mapped to HTTP status codes. ExternalError doesn't use status codes directly,
    /// because some components (e.g. the facade) shouldn't need to know about HTTP codes.
    fn into(self) -> StatusCode {
        match self {
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Conflict => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Network => StatusCode::BAD_GATEWAY,
        }
    }
}

impl fmt::Display for ExternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}: {}", self.cause, self.text)
    }
}

impl ExternalError {
    pub const fn new(cause: Cause, text: &'static str) -> Self {
        Self { cause, text }
    }
}

impl From<Cause> for ExternalError {
    /// A generic message for each cause, for when the caller has nothing more specific to say.
    fn from(cause: Cause) -> Self {
        let text = match cause {
            Cause::Unauthorized => "You are not signed in",
            Cause::NotFound => "Not found",
            Cause::Conflict => "That already exists",
            Cause::Network => "Couldn't reach the backend, try again later",
            Cause::Validation => "The request was invalid",
            Cause::ServerError => "Something went wrong",
        };
        Self { cause, text }
    }
}

impl Default for ExternalError {
    // Default to ServerError and the generic toast message.
    fn default() -> Self {
        Self {
            cause: Cause::ServerError,
            text: "Something went wrong",
        }
    }
}
