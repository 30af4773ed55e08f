//! The byte-writing seam between a [`crate::task::Task`] and its concrete
//! transport. Grounded in the write-once, panic-on-misuse state machine of
//! `tk-http`'s `ResponseWriter` (status/headers/body, each writable at most
//! once in the right order) and the channel-backed body writer
//! (`ChannelWriter` over `hyper::Body::wrap_stream`) the teacher uses to
//! stream its `/metrics` response.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};

/// Write side of one HTTP response. Implementations are not expected to be
/// reusable across requests; [`crate::task::Task`] enforces the
/// write-once/headers-before-body ordering above this trait, but a `Sink`
/// implementation is free to assert it too.
#[async_trait]
pub trait Sink: Send + std::any::Any {
    /// Writes the status line. Called exactly once by the task, before any
    /// header or body write.
    fn write_status(&mut self, status: StatusCode);

    /// Appends a header. Called only before the first body write.
    fn write_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Appends a chunk of body bytes. May be called zero or more times,
    /// always after `write_status` and any header writes. `async` so a
    /// streaming implementation can await its transport's readiness instead
    /// of risking a dropped chunk under backpressure.
    async fn write_body(&mut self, chunk: Bytes);

    /// Signals that the status line and all headers are final; called
    /// exactly once, after the last `write_header` and before the first
    /// `write_body` (if any — a response with no body still gets this
    /// call). A streaming sink uses this to hand the response head to its
    /// transport before the body, which may arrive in further chunks or
    /// not at all, is known.
    fn headers_ready(&mut self) {}

    /// Downcasting hook for tests and tooling that need to inspect a
    /// concrete sink (e.g. [`BufferedSink`]) behind a `Box<dyn Sink>`.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// An in-memory [`Sink`] used by tests and by tooling that wants to inspect
/// a rendered response without a live connection.
#[derive(Default)]
pub struct BufferedSink {
    status: Option<StatusCode>,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Vec<u8>,
    body_started: bool,
}

impl BufferedSink {
    pub fn new() -> Self {
        BufferedSink::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).expect("body is not valid utf-8")
    }
}

#[async_trait]
impl Sink for BufferedSink {
    fn write_status(&mut self, status: StatusCode) {
        assert!(
            !self.body_started,
            "write_status called after the body has started"
        );
        self.status = Some(status);
    }

    fn write_header(&mut self, name: HeaderName, value: HeaderValue) {
        assert!(
            !self.body_started,
            "write_header called after the body has started (headers-before-body invariant)"
        );
        self.headers.push((name, value));
    }

    async fn write_body(&mut self, chunk: Bytes) {
        self.body_started = true;
        self.body.extend_from_slice(&chunk);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A [`Sink`] backed by a `hyper::Body` channel, used by the real server
/// wiring (`crate::server`). Status and headers are buffered until
/// [`Sink::headers_ready`], which hands them to the server wiring over a
/// `oneshot` channel, because `hyper`'s response is built once up front,
/// whereas this trait's contract allows incremental header writes that a
/// streaming body then follows.
pub struct HyperSink {
    status: StatusCode,
    headers: http::HeaderMap,
    sender: Option<hyper::body::Sender>,
    parts_tx: Option<tokio::sync::oneshot::Sender<(StatusCode, http::HeaderMap)>>,
    parts_sent: bool,
}

impl HyperSink {
    /// `sender` streams the body; `parts_tx` carries the finished status
    /// line and headers to whatever is building the `hyper::Response` (see
    /// `crate::server`), since `hyper` needs both known up front while this
    /// trait allows them to be written incrementally ahead of the body.
    pub fn new(
        sender: hyper::body::Sender,
        parts_tx: tokio::sync::oneshot::Sender<(StatusCode, http::HeaderMap)>,
    ) -> Self {
        HyperSink {
            status: StatusCode::OK,
            headers: http::HeaderMap::new(),
            sender: Some(sender),
            parts_tx: Some(parts_tx),
            parts_sent: false,
        }
    }
}

#[async_trait]
impl Sink for HyperSink {
    fn write_status(&mut self, status: StatusCode) {
        assert!(!self.parts_sent, "write_status called after body started");
        self.status = status;
    }

    fn write_header(&mut self, name: HeaderName, value: HeaderValue) {
        assert!(!self.parts_sent, "write_header called after body started");
        self.headers.append(name, value);
    }

    fn headers_ready(&mut self) {
        assert!(!self.parts_sent, "headers_ready called twice");
        self.parts_sent = true;
        if let Some(tx) = self.parts_tx.take() {
            // The receiving half is dropped once the response future (see
            // `crate::server`) has already given up on this request; there
            // is nothing left to hand the head to in that case.
            let _ = tx.send((self.status, std::mem::take(&mut self.headers)));
        }
    }

    async fn write_body(&mut self, chunk: Bytes) {
        if let Some(sender) = self.sender.as_mut() {
            // `send_data` awaits the channel's readiness, unlike
            // `try_send_data`, which can silently drop a chunk under
            // ordinary backpressure rather than only on client disconnect.
            // The receiving end (the hyper connection) may still have gone
            // away entirely; there is nothing useful to do with that beyond
            // not panicking, mirroring the teacher's `ChannelWriter::flush0`
            // treatment of a dropped receiver.
            let _ = sender.send_data(chunk).await;
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
