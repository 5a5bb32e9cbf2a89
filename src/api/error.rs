use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::fmt;
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ConnectionError(String),
    Timeout(String),
    ApiError(String),
    NotFound(String),
    InvalidResponse(String, String),
    /// A polling cycle of the device with this serial number (or `gateway`) failed.
    UpdateFailed(String, String),
    FormatError,
    InternalError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConnectionError(s) => write!(f, "connection error: {}", s),
            Error::Timeout(s) => write!(f, "timeout: {}", s),
            Error::ApiError(s) => write!(f, "API error: {}", s),
            Error::NotFound(s) => write!(f, "not found: {}", s),
            Error::InvalidResponse(body, reason) => {
                write!(f, "invalid response ({}): {}", reason, body)
            }
            Error::UpdateFailed(target, reason) => {
                write!(f, "Error fetching data for {}: {}", target, reason)
            }
            Error::FormatError => write!(f, "format error"),
            Error::InternalError => write!(f, "internal error"),
        }
    }
}

impl std::error::Error for Error {}

fn html(status: Status, title: &str, body: String) -> response::Result<'static> {
    let error = format!(
        "<html><body><h3>{}</h3><code>{}</code></body></html>",
        title, body
    );
    Response::build()
        .status(status)
        .sized_body(error.len(), Cursor::new(error))
        .header(ContentType::new("text", "html"))
        .ok()
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        match self {
            Error::NotFound(s) => html(Status::NotFound, "404 Not Found", s),
            Error::Timeout(s) => html(
                Status::GatewayTimeout,
                "504 Gateway Timeout",
                format!("Zap gateway did not respond in time: {}", s),
            ),
            Error::ConnectionError(_) | Error::ApiError(_) | Error::UpdateFailed(_, _) => html(
                Status::ServiceUnavailable,
                "503 Service Unavailable",
                self.to_string(),
            ),
            _ => html(
                Status::InternalServerError,
                "Unknown exception",
                format!("{:?}", self),
            ),
        }
    }
}
