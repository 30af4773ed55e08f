//! The reference binary: wires up a [`safeweb::server::App`] with the
//! default dispatcher, no interceptors beyond what a caller configures, and
//! a report collector that logs every decoded report. Mirrors the teacher
//! binary's shape: parse `cli()`, build state, bind, serve until Ctrl-C.

use std::sync::Arc;

use async_trait::async_trait;
use safeweb::config::ServerConfig;
use safeweb::interceptor::Handler;
use safeweb::report::ReportCollector;
use safeweb::server::App;
use safeweb::{DefaultDispatcher, IncomingRequest, Response, SafeHtml, Task};

struct HelloHandler;

#[async_trait]
impl Handler for HelloHandler {
    async fn serve(&self, task: &mut Task, _req: &IncomingRequest) {
        task.write(Response::safe_html(SafeHtml::trusted("<h1>safeweb</h1>")))
            .await
            .expect("SafeHtml always dispatches");
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let config = ServerConfig::parse();
    safeweb::logging::init("info");

    let reports = ReportCollector::new()
        .with_csp_handler(|report| {
            tracing::warn!(blocked_url = %report.blocked_url, directive = %report.violated_directive, "csp violation report");
        })
        .with_generic_handler(|report| {
            tracing::info!(report_type = %report.report_type, url = %report.url, "reporting-endpoint report");
        })
        .with_max_body_bytes(config.max_report_bytes);

    let app = App::new(
        vec![],
        Arc::new(HelloHandler),
        Arc::new(DefaultDispatcher::new()),
        config.report_path.clone(),
        reports,
    );

    safeweb::server::serve(config, app).await
}
