//! Minimal HTTP/1.x handling for the status page.
//!
//! Only the request line is parsed; headers are skipped. Every response
//! closes the connection, so a slot never has to track keep-alive state.

use core::fmt::{self, Write as _};

use heapless::String;
use winnow::ascii::line_ending;
use winnow::prelude::*;
use winnow::token::{literal, take_till, take_while};

pub mod slot;

pub use slot::{HttpSlot, HttpSlots, SlotEvent, SlotPhase, SlotSocket};

/// Room for the status line and fixed headers.
pub const HEAD_CAPACITY: usize = 192;

/// Request method, reduced to what the server distinguishes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Method {
    Get,
    Head,
    Other,
}

impl Method {
    fn from_token(token: &[u8]) -> Self {
        match token {
            b"GET" => Method::Get,
            b"HEAD" => Method::Head,
            _ => Method::Other,
        }
    }
}

/// First line of a request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RequestLine<'a> {
    pub method: Method,
    pub target: &'a [u8],
}

/// Errors produced while handling a request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HttpError {
    /// The request line did not match `METHOD SP target SP HTTP/1.x CRLF`.
    MalformedRequestLine,
    /// The response head did not fit in [`HEAD_CAPACITY`].
    HeadOverflow,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::MalformedRequestLine => write!(f, "malformed request line"),
            HttpError::HeadOverflow => write!(f, "response head exceeds {HEAD_CAPACITY} bytes"),
        }
    }
}

/// Response status codes the server emits.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    HeaderFieldsTooLarge,
}

impl Status {
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::HeaderFieldsTooLarge => 431,
        }
    }

    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::HeaderFieldsTooLarge => "Request Header Fields Too Large",
        }
    }
}

/// Where a request target points.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Route {
    StatusPage,
    NotFound,
}

/// Response payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Body {
    /// The rendered status page.
    Document,
    /// A fixed plain-text message.
    Text(&'static [u8]),
}

/// Response chosen for a request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Response {
    pub status: Status,
    pub body: Body,
    /// HEAD requests get the head only.
    pub head_only: bool,
}

impl Response {
    const fn document(head_only: bool) -> Self {
        Self {
            status: Status::Ok,
            body: Body::Document,
            head_only,
        }
    }

    /// Plain-text response carrying the status reason as body.
    #[must_use]
    pub const fn error(status: Status) -> Self {
        Self {
            status,
            body: Body::Text(status.reason().as_bytes()),
            head_only: false,
        }
    }

    const fn content_type(&self) -> &'static str {
        match self.body {
            Body::Document => "text/html; charset=utf-8",
            Body::Text(_) => "text/plain",
        }
    }
}

/// Parses the request line at the start of `input`.
///
/// # Errors
///
/// Returns [`HttpError::MalformedRequestLine`] when the line is incomplete or
/// does not follow HTTP/1.x syntax.
pub fn parse_request_line(input: &[u8]) -> Result<RequestLine<'_>, HttpError> {
    let mut stream = input;
    request_line
        .parse_next(&mut stream)
        .map_err(|_| HttpError::MalformedRequestLine)
}

fn request_line<'i>(input: &mut &'i [u8]) -> ModalResult<RequestLine<'i>> {
    let method = take_while(1.., |b: u8| b.is_ascii_uppercase()).parse_next(input)?;
    b' '.parse_next(input)?;
    let target = take_till(1.., |b: u8| matches!(b, b' ' | b'\r' | b'\n')).parse_next(input)?;
    b' '.parse_next(input)?;
    literal("HTTP/1.").parse_next(input)?;
    take_while(1, |b: u8| b.is_ascii_digit()).parse_next(input)?;
    line_ending.parse_next(input)?;

    Ok(RequestLine {
        method: Method::from_token(method),
        target,
    })
}

/// Maps a request target to a route, ignoring any query string.
#[must_use]
pub fn route(target: &[u8]) -> Route {
    let path = target.split(|b| *b == b'?').next().unwrap_or(target);
    match path {
        b"/" | b"/index.html" => Route::StatusPage,
        _ => Route::NotFound,
    }
}

/// Chooses the response for a complete request head.
#[must_use]
pub fn respond(request: &[u8]) -> Response {
    let Ok(line) = parse_request_line(request) else {
        return Response::error(Status::BadRequest);
    };

    let head_only = match line.method {
        Method::Get => false,
        Method::Head => true,
        Method::Other => return Response::error(Status::MethodNotAllowed),
    };

    match route(line.target) {
        Route::StatusPage => Response::document(head_only),
        Route::NotFound => Response {
            head_only,
            ..Response::error(Status::NotFound)
        },
    }
}

/// Formats the status line and headers for `response`.
///
/// # Errors
///
/// Returns [`HttpError::HeadOverflow`] if the head does not fit.
pub fn write_head(
    response: &Response,
    content_length: usize,
) -> Result<String<HEAD_CAPACITY>, HttpError> {
    let mut head = String::new();
    write!(
        head,
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        response.status.code(),
        response.status.reason(),
        response.content_type(),
        content_length,
    )
    .map_err(|_| HttpError::HeadOverflow)?;
    Ok(head)
}

/// Returns `true` once `buffer` holds a complete request head.
#[must_use]
pub fn head_complete(buffer: &[u8]) -> bool {
    buffer.windows(4).any(|window| window == b"\r\n\r\n")
}
