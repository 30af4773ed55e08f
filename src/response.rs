//! The tagged-variant [`Response`] type: every shape of payload a handler is
//! permitted to hand to a [`crate::task::Task`]. There is no "raw bytes"
//! variant — that is the whole point of the dispatcher contract (see
//! `crate::dispatcher`).

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;

use crate::safehtml::{FuncMap, SafeHtml, Template};

/// An arbitrary JSON-serialisable payload, held as the original value
/// (behind a closure over `serde_json::to_writer`) rather than pre-converted
/// to a `serde_json::Value`. This matters for the non-finite-number edge
/// case (§8, property 10): converting to `Value` first would silently
/// launder `+Inf`/`NaN` into `null`, masking the encode failure the
/// dispatcher is required to surface after writing the sentinel.
pub struct JsonPayload {
    encode: Box<dyn Fn(&mut Vec<u8>) -> serde_json::Result<()> + Send + Sync>,
}

impl JsonPayload {
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        JsonPayload {
            encode: Box::new(move |buf| serde_json::to_writer(buf, &value)),
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) -> serde_json::Result<()> {
        (self.encode)(buf)
    }
}

/// A response a handler hands to the task. Exhaustively matched by
/// [`crate::dispatcher::Dispatcher`].
pub enum Response {
    /// A pre-rendered, already-safe HTML body.
    SafeHtml(SafeHtml),

    /// A safe template, executed with `data` and `funcs` at dispatch time.
    Template {
        template: Arc<dyn Template>,
        data: String,
        funcs: FuncMap,
    },

    /// An arbitrary JSON-serialisable payload, wrapped on the wire with the
    /// anti-hijacking sentinel.
    Json(JsonPayload),

    /// No body; Content-Type is empty.
    NoContent,

    /// `status` MUST be in `[400, 600)`.
    Error { status: StatusCode, reason: String },

    /// `status` MUST be in `[300, 400)`.
    Redirect { url: String, status: StatusCode },
}

impl Response {
    /// Wraps an already-safe HTML body. There is no overload or conversion
    /// that accepts a raw `&str`/`String` here — the unsafe-raw-string
    /// rejection (§8 property 8 / scenario S6) is a type error, not a
    /// runtime check:
    ///
    /// ```compile_fail
    /// use safeweb::Response;
    /// let resp = Response::safe_html("<script>alert(1)</script>");
    /// ```
    pub fn safe_html(html: SafeHtml) -> Self {
        Response::SafeHtml(html)
    }

    pub fn template(template: Arc<dyn Template>, data: impl Into<String>, funcs: FuncMap) -> Self {
        Response::Template {
            template,
            data: data.into(),
            funcs,
        }
    }

    pub fn json<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Response::Json(JsonPayload::new(value))
    }

    /// Builds an `Error` response. Panics if `status` is outside `[400,
    /// 600)` — this mirrors the task's own validation of the `Response`
    /// variant invariants and is checked again by the dispatcher.
    pub fn error(status: StatusCode, reason: impl Into<String>) -> Self {
        assert!(
            (400..600).contains(&status.as_u16()),
            "Response::Error status must be in [400, 600), got {status}"
        );
        Response::Error {
            status,
            reason: reason.into(),
        }
    }

    /// Builds a `Redirect` response. Panics if `status` is outside `[300,
    /// 400)`.
    pub fn redirect(url: impl Into<String>, status: StatusCode) -> Self {
        assert!(
            (300..400).contains(&status.as_u16()),
            "Response::Redirect status must be in [300, 400), got {status}"
        );
        Response::Redirect {
            url: url.into(),
            status,
        }
    }

    /// A short, stable tag for logging and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::SafeHtml(_) => "safe_html",
            Response::Template { .. } => "template",
            Response::Json(_) => "json",
            Response::NoContent => "no_content",
            Response::Error { .. } => "error",
            Response::Redirect { .. } => "redirect",
        }
    }
}
