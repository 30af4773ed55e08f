//! Binds a listener and drives inbound connections through a
//! [`Chain`]/[`ReportCollector`] pair. Grounded in the teacher binary's
//! `tcp_listener::bind(...)` + `hyper::Server::from_tcp(...).serve(...)
//! .with_graceful_shutdown(...)` sequence, with `routerify`'s two-route
//! dispatch (`/metrics` vs. everything else) replaced by a plain path
//! comparison since full routing remains out of scope.

use std::convert::Infallible;
use std::net::TcpListener;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::interceptor::{Chain, Handler, Interceptor};
use crate::report::ReportCollector;
use crate::request::IncomingRequest;
use crate::sink::HyperSink;
use crate::task::{self, Task};

/// Everything one running server needs, shared across every connection.
pub struct App {
    chain: Chain,
    interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
    dispatcher: Arc<dyn Dispatcher>,
    report_path: String,
    reports: ReportCollector,
    next_request_id: AtomicU64,
}

impl App {
    pub fn new(
        interceptors: Vec<Arc<dyn Interceptor>>,
        handler: Arc<dyn Handler>,
        dispatcher: Arc<dyn Dispatcher>,
        report_path: impl Into<String>,
        reports: ReportCollector,
    ) -> Self {
        let shared = Arc::new(interceptors.clone());
        App {
            chain: Chain::new(interceptors, handler),
            interceptors: shared,
            dispatcher,
            report_path: report_path.into(),
            reports,
            next_request_id: AtomicU64::new(0),
        }
    }

    async fn handle(self: Arc<Self>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let (parts, body) = req.into_parts();
        if parts.uri.path() == self.report_path {
            let req = Request::from_parts(parts, body);
            return Ok(self.reports.handle(req).await);
        }
        // Body reading is out of this crate's scope; drop it without
        // buffering so the connection can still be reused once drained.
        drop(body);

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        let span = tracing::info_span!("request", %method, %path, request_id);
        let log_quietly = method == Method::GET;

        let incoming = IncomingRequest::from_hyper_parts(&parts);
        let (body_tx, body_rx) = Body::channel();
        let (parts_tx, parts_rx) = oneshot::channel();
        let sink = HyperSink::new(body_tx, parts_tx);
        let mut request_task = Task::new(Box::new(sink), self.dispatcher.clone(), self.interceptors.clone());

        let app = self.clone();
        let handler_span = span.clone();
        tokio::spawn(
            async move {
                if log_quietly {
                    tracing::debug!("handling request");
                } else {
                    tracing::info!("handling request");
                }
                task::process_request(&app.chain, &mut request_task, &incoming).await;
            }
            .instrument(handler_span),
        );

        async move {
            match parts_rx.await {
                Ok((status, headers)) => {
                    if log_quietly && status.is_success() {
                        tracing::debug!(%status, "request handled");
                    } else {
                        tracing::info!(%status, "request handled");
                    }
                    let mut builder = Response::builder().status(status);
                    if let Some(h) = builder.headers_mut() {
                        *h = headers;
                    }
                    Ok(builder
                        .body(body_rx)
                        .unwrap_or_else(|_| empty(StatusCode::INTERNAL_SERVER_ERROR)))
                }
                // The task panicked before ever reaching `flush` (impossible
                // given the panic trap in `process_request`, but a response
                // must still be produced if it somehow did).
                Err(_) => {
                    tracing::warn!("request dropped without a response");
                    Ok(empty(StatusCode::INTERNAL_SERVER_ERROR))
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn empty(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .expect("status is a well-formed constant")
}

/// Binds `config.listen` and serves `app` until Ctrl-C, mirroring the
/// teacher's `shutdown_watcher` + `with_graceful_shutdown` sequence.
pub async fn serve(config: ServerConfig, app: App) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.listen)?;
    listener.set_nonblocking(true)?;

    let app = Arc::new(app);
    let make_service = make_service_fn(move |_conn| {
        let app = app.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| app.clone().handle(req))) }
    });

    tracing::info!(addr = %config.listen, "starting server");
    Server::from_tcp(listener)?
        .serve(make_service)
        .with_graceful_shutdown(shutdown_watcher())
        .await?;
    Ok(())
}

async fn shutdown_watcher() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
}
