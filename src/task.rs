//! The per-request response-lifecycle controller. This is the heart of the
//! framework: write-once enforcement, Commit/OnError ordering, and the
//! panic-to-500 trap. Grounded in `tk-http`'s `ResponseWriter` (panics on
//! out-of-order writes; `is_started`/`is_complete` track progress) and the
//! teacher's `request_span` (the request-scoped wrapper that converts
//! handler errors into responses at a single, well-known point).

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use http::{HeaderValue, StatusCode};

use crate::dispatcher::Dispatcher;
use crate::error::FrameworkError;
use crate::header::Headers;
use crate::interceptor::{Chain, Interceptor};
use crate::request::IncomingRequest;
use crate::response::Response;
use crate::sink::Sink;

/// The per-request coordinator. Created once per HTTP request and mutated
/// only by its own methods; see the module docs for the invariants this
/// enforces.
pub struct Task {
    sink: Box<dyn Sink>,
    headers: Headers,
    dispatcher: Arc<dyn Dispatcher>,
    interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
    written: bool,
    written_error: bool,
    /// Set for the duration of a Commit or OnError pass. A write entry point
    /// invoked while this is set is a programmer error (resolved open
    /// question: commit re-entry is forbidden, not silently recursed or
    /// skipped).
    in_response_phase: bool,
    /// Becomes true once the first body byte (or the empty-body
    /// finalization of a 204/redirect) has been handed to the sink. Headers
    /// are mutable only while this is false — a finer-grained guard than
    /// `written`, since Commit interceptors run after `written` flips true
    /// but must still be able to mutate headers.
    body_started: bool,
    /// 0 means unset; `write`/`no_content` default to 200/204 respectively.
    pending_code: u16,
}

impl Task {
    pub fn new(
        sink: Box<dyn Sink>,
        dispatcher: Arc<dyn Dispatcher>,
        interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
    ) -> Self {
        Task {
            sink,
            headers: Headers::new(),
            dispatcher,
            interceptors,
            written: false,
            written_error: false,
            in_response_phase: false,
            body_started: false,
            pending_code: 0,
        }
    }

    pub fn written(&self) -> bool {
        self.written
    }

    pub fn written_error(&self) -> bool {
        self.written_error
    }

    /// Mutable access to the header collection. Safe to call only while
    /// `!body_started`; panics otherwise, matching "headers are mutable
    /// only while `written = false`" generalized to the finer `body_started`
    /// boundary Commit interceptors depend on.
    pub fn header(&mut self) -> &mut Headers {
        assert!(
            !self.body_started,
            "header() called after the response body has started"
        );
        &mut self.headers
    }

    pub fn header_ref(&self) -> &Headers {
        &self.headers
    }

    pub fn set_cookie(&mut self, name: &str, value: HeaderValue) -> Result<(), FrameworkError> {
        self.header().set_cookie(name, value)
    }

    /// No-op if already written; silently ignores a code outside `[100,
    /// 600)` rather than honouring it (resolved open question #2).
    pub fn set_code(&mut self, code: u16) {
        if self.written || !(100..600).contains(&code) {
            return;
        }
        self.pending_code = code;
    }

    /// Writes `resp`. Panics (a programmer error, caught by the surrounding
    /// `process_request` trap) if the task was already written, if called
    /// re-entrantly from within Commit/OnError, or if the dispatcher refuses
    /// `resp`'s shape. Returns an error only for the recoverable case: the
    /// dispatcher accepted the shape but failed while encoding/executing it
    /// (template execution failure, JSON encode failure).
    pub async fn write(&mut self, resp: Response) -> Result<(), FrameworkError> {
        self.write_with_forced_status(resp, None).await
    }

    /// Sets status 204 and an empty body, after running Commit. Used both
    /// as an explicit write entry point and internally by the chain runner
    /// when a handler declines to write.
    pub async fn no_content(&mut self) {
        self.write_with_forced_status(Response::NoContent, Some(StatusCode::NO_CONTENT))
            .await
            .expect("Response::NoContent never fails to dispatch");
    }

    async fn write_with_forced_status(
        &mut self,
        resp: Response,
        forced_status: Option<StatusCode>,
    ) -> Result<(), FrameworkError> {
        assert!(
            !self.in_response_phase,
            "write entry point called re-entrantly from Commit or OnError"
        );
        assert!(
            !self.written,
            "write-once invariant violated: a write entry point was called twice"
        );
        self.written = true;

        self.run_commit().await;

        let content_type = self.dispatcher.content_type(&resp).unwrap_or_else(|e| {
            panic!(
                "dispatcher refused a response of kind {:?}: {e}",
                resp.kind()
            )
        });
        if let Some(ct) = content_type {
            self.headers
                .set(http::header::CONTENT_TYPE, HeaderValue::from_static(ct))
                .expect("Content-Type cannot have been claimed before the first write");
        }

        // `Error`/`Redirect` carry their own status (and, for `Redirect`, the
        // `Location` header); every other variant defers to `set_code`.
        let own_status = match &resp {
            Response::Error { status, .. } => Some(*status),
            Response::Redirect { url, status } => {
                let value = HeaderValue::from_str(url)
                    .unwrap_or_else(|_| HeaderValue::from_static("/"));
                let _ = self.headers.set(http::header::LOCATION, value);
                Some(*status)
            }
            _ => None,
        };

        let status = forced_status.or(own_status).unwrap_or_else(|| {
            StatusCode::from_u16(self.pending_code).unwrap_or(StatusCode::OK)
        });
        self.flush(status);

        let result = self.dispatcher.write(self.sink.as_mut(), resp).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "dispatcher failed while writing the response body");
        }
        result.map_err(FrameworkError::from)
    }

    /// Sets both `written` and `written_error`, runs OnError in reverse, and
    /// emits a plain-text body using `code`'s canonical reason phrase.
    /// Panics if `written_error` is already set (a second `write_error`
    /// call), if a prior `write`/`no_content`/`redirect` already wrote a
    /// response, or if called re-entrantly from OnError itself.
    pub async fn write_error(&mut self, code: StatusCode) {
        assert!(
            !self.in_response_phase,
            "write_error called re-entrantly from Commit or OnError"
        );
        assert!(
            !self.written_error,
            "write_error invariant violated: called twice"
        );
        assert!(
            !self.written,
            "write-once invariant violated: write_error called after a prior write succeeded"
        );
        self.written = true;
        self.written_error = true;

        self.run_on_error().await;

        let reason = code.canonical_reason().unwrap_or("Unknown Error");
        // Best-effort: a claimed Content-Type header must not abort the
        // last-resort error path.
        let _ = self
            .headers
            .set(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
        self.flush(code);
        self.sink
            .write_body(Bytes::copy_from_slice(reason.as_bytes()))
            .await;
    }

    /// Delegates to the standard HTTP redirect primitive: sets `Location`
    /// and a small text body. Unlike `write`/`no_content`, this does not run
    /// Commit — matching the spec's write-entry-point table, which lists no
    /// Commit effect for `Redirect`, mirroring the source framework calling
    /// the platform's redirect helper directly rather than routing through
    /// the response pipeline. Still `async`, like every other write entry
    /// point, since it awaits the sink's body write.
    pub async fn redirect(
        &mut self,
        _req: &IncomingRequest,
        url: impl Into<String>,
        code: StatusCode,
    ) {
        assert!(
            !self.written,
            "write-once invariant violated: redirect called after a write"
        );
        let status = code.as_u16();
        assert!(
            (300..400).contains(&status),
            "redirect status must be in [300, 400), got {code}"
        );
        self.written = true;

        let url = url.into();
        let value = HeaderValue::from_str(&url)
            .unwrap_or_else(|_| HeaderValue::from_static("/"));
        let _ = self.headers.set(http::header::LOCATION, value);
        self.flush(code);
        let escaped = crate::safehtml::SafeHtml::html_escaped(&url);
        let body = format!("<a href=\"{escaped}\">{escaped}</a>.\n");
        self.sink.write_body(Bytes::from(body.into_bytes())).await;
    }

    async fn run_commit(&mut self) {
        self.in_response_phase = true;
        let interceptors = self.interceptors.clone();
        for interceptor in interceptors.iter().rev() {
            interceptor.commit(self).await;
        }
        self.in_response_phase = false;
    }

    async fn run_on_error(&mut self) {
        self.in_response_phase = true;
        let interceptors = self.interceptors.clone();
        for interceptor in interceptors.iter().rev() {
            interceptor.on_error(self).await;
        }
        self.in_response_phase = false;
    }

    fn flush(&mut self, status: StatusCode) {
        self.sink.write_status(status);
        for (name, value) in self.headers.iter() {
            self.sink.write_header(name.clone(), value.clone());
        }
        self.sink.headers_ready();
        self.body_started = true;
    }
}

/// Runs `chain` against `task`/`req`, installing the panic trap described in
/// §4.1: any uncaught fault below is converted into a `write_error(500)`,
/// and a second fault inside `OnError` is swallowed rather than propagated.
pub async fn process_request(chain: &Chain, task: &mut Task, req: &IncomingRequest) {
    let outcome = AssertUnwindSafe(chain.run(task, req)).catch_unwind().await;
    if let Err(panic) = outcome {
        tracing::error!(detail = %panic_message(&panic), "panic while handling request; recovering as 500");
        if !task.written_error() {
            let recovery = AssertUnwindSafe(task.write_error(StatusCode::INTERNAL_SERVER_ERROR))
                .catch_unwind()
                .await;
            if recovery.is_err() {
                tracing::error!("a second panic occurred while running OnError; giving up");
            }
        }
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::Handler;
    use crate::sink::BufferedSink;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn new_task(interceptors: Vec<Arc<dyn Interceptor>>) -> Task {
        let dispatcher = Arc::new(crate::dispatcher::DefaultDispatcher::new());
        Task::new(Box::new(BufferedSink::new()), dispatcher, Arc::new(interceptors))
    }

    fn sink_of(task: &Task) -> &BufferedSink {
        task.sink.as_any().downcast_ref::<BufferedSink>().unwrap()
    }

    #[tokio::test]
    async fn write_once_second_write_panics() {
        let mut task = new_task(vec![]);
        task.write(Response::NoContent).await.unwrap();
        let result = AssertUnwindSafe(task.write(Response::NoContent))
            .catch_unwind()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn write_error_after_successful_write_panics() {
        let mut task = new_task(vec![]);
        task.write(Response::NoContent).await.unwrap();
        let result = AssertUnwindSafe(task.write_error(StatusCode::INTERNAL_SERVER_ERROR))
            .catch_unwind()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn error_response_emits_its_own_status() {
        let mut task = new_task(vec![]);
        task.write(Response::error(StatusCode::NOT_FOUND, "missing"))
            .await
            .unwrap();
        assert_eq!(sink_of(&task).status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(sink_of(&task).body(), b"missing");
    }

    #[tokio::test]
    async fn redirect_response_emits_its_own_status_and_location() {
        let mut task = new_task(vec![]);
        task.write(Response::redirect("https://example.com", StatusCode::FOUND))
            .await
            .unwrap();
        assert_eq!(sink_of(&task).status(), Some(StatusCode::FOUND));
        assert_eq!(
            sink_of(&task).header(&http::header::LOCATION).unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn default_status_codes() {
        let mut task = new_task(vec![]);
        task.write(Response::SafeHtml(crate::safehtml::SafeHtml::trusted("ok")))
            .await
            .unwrap();
        assert_eq!(sink_of(&task).status(), Some(StatusCode::OK));

        let mut task = new_task(vec![]);
        task.no_content().await;
        assert_eq!(sink_of(&task).status(), Some(StatusCode::NO_CONTENT));

        let mut task = new_task(vec![]);
        task.write_error(StatusCode::IM_A_TEAPOT).await;
        assert_eq!(sink_of(&task).status(), Some(StatusCode::IM_A_TEAPOT));
        assert_eq!(sink_of(&task).body(), b"I'm a teapot");
    }

    struct RecordingInterceptor {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Interceptor for RecordingInterceptor {
        async fn before(&self, _task: &mut Task, _req: &IncomingRequest) {
            self.log.lock().unwrap().push(format!("before:{}", self.name));
        }
        async fn commit(&self, _task: &mut Task) {
            self.log.lock().unwrap().push(format!("commit:{}", self.name));
        }
    }

    struct NoopHandler;
    #[async_trait]
    impl Handler for NoopHandler {
        async fn serve(&self, _task: &mut Task, _req: &IncomingRequest) {}
    }

    #[tokio::test]
    async fn commit_runs_in_reverse_of_before() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let interceptors: Vec<Arc<dyn Interceptor>> = vec!["A", "B", "C"]
            .into_iter()
            .map(|name| {
                Arc::new(RecordingInterceptor {
                    name,
                    log: log.clone(),
                }) as Arc<dyn Interceptor>
            })
            .collect();
        let chain = Chain::new(interceptors.clone(), Arc::new(NoopHandler));
        let dispatcher = Arc::new(crate::dispatcher::DefaultDispatcher::new());
        let mut task = Task::new(
            Box::new(BufferedSink::new()),
            dispatcher,
            Arc::new(interceptors),
        );
        let req = IncomingRequest::new(
            http::Method::GET,
            "/".parse().unwrap(),
            http::HeaderMap::new(),
        );
        chain.run(&mut task, &req).await;

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec!["before:A", "before:B", "before:C", "commit:C", "commit:B", "commit:A"]
        );
    }

    struct WritingInterceptor {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Interceptor for WritingInterceptor {
        async fn before(&self, task: &mut Task, _req: &IncomingRequest) {
            self.log.lock().unwrap().push(format!("before:{}", self.name));
            task.no_content().await;
        }
    }

    #[tokio::test]
    async fn before_interceptor_writing_halts_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new(RecordingInterceptor {
            name: "A",
            log: log.clone(),
        });
        let b = Arc::new(WritingInterceptor {
            name: "B",
            log: log.clone(),
        });
        let c = Arc::new(RecordingInterceptor {
            name: "C",
            log: log.clone(),
        });
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![a, b, c];
        let chain = Chain::new(interceptors.clone(), Arc::new(NoopHandler));
        let dispatcher = Arc::new(crate::dispatcher::DefaultDispatcher::new());
        let mut task = Task::new(
            Box::new(BufferedSink::new()),
            dispatcher,
            Arc::new(interceptors),
        );
        let req = IncomingRequest::new(
            http::Method::GET,
            "/".parse().unwrap(),
            http::HeaderMap::new(),
        );
        chain.run(&mut task, &req).await;

        let entries = log.lock().unwrap().clone();
        assert!(entries.contains(&"before:A".to_string()));
        assert!(entries.contains(&"before:B".to_string()));
        assert!(!entries.contains(&"before:C".to_string()));
        assert!(task.written());
    }

    #[tokio::test]
    async fn redirect_rejects_non_redirect_status() {
        let mut task = new_task(vec![]);
        let req = IncomingRequest::new(
            http::Method::GET,
            "/".parse().unwrap(),
            http::HeaderMap::new(),
        );
        let result = AssertUnwindSafe(task.redirect(&req, "https://example.com", StatusCode::OK))
            .catch_unwind()
            .await;
        assert!(result.is_err());
    }
}
