//! The report collector's HTTP surface: a POST-only endpoint accepting
//! either `application/csp-report` (a single, possibly CSP2-wrapped report)
//! or `application/reports+json` (an array of generic reports). Grounded in
//! `actix_web_csp`'s `CspReportingMiddleware` (method/path gate, bounded
//! body read, `Arc<dyn Fn>` callback) generalized to both W3C dialects.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use hyper::body::HttpBody;
use hyper::{Body, Method, Request, Response, StatusCode};

use super::csp::{coerce_string, coerce_u64};
use super::{CspReport, Report, ReportBody};

/// Default cap on a report body, matching the order of magnitude
/// `actix_web_csp`'s `DEFAULT_MAX_REPORT_SIZE` uses for the same purpose.
pub const DEFAULT_MAX_REPORT_BYTES: usize = 64 * 1024;

pub type CspCallback = Arc<dyn Fn(CspReport) + Send + Sync>;
pub type GenericCallback = Arc<dyn Fn(Report) + Send + Sync>;

/// The collector endpoint. Stateless beyond its registered callbacks and
/// size cap; safe to share across requests behind an `Arc`, same as
/// [`crate::dispatcher::Dispatcher`].
#[derive(Clone, Default)]
pub struct ReportCollector {
    csp_handler: Option<CspCallback>,
    generic_handler: Option<GenericCallback>,
    max_body_bytes: Option<usize>,
}

impl ReportCollector {
    pub fn new() -> Self {
        ReportCollector::default()
    }

    pub fn with_csp_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(CspReport) + Send + Sync + 'static,
    {
        self.csp_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_generic_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Report) + Send + Sync + 'static,
    {
        self.generic_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = Some(max);
        self
    }

    fn max_bytes(&self) -> usize {
        self.max_body_bytes.unwrap_or(DEFAULT_MAX_REPORT_BYTES)
    }

    /// Runs the protocol state machine of §4.4 against one request.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        if req.method() != Method::POST {
            return plain_response(StatusCode::METHOD_NOT_ALLOWED, "reports must be submitted via POST");
        }

        let content_type = req
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_ascii_lowercase());

        let body = match read_bounded(req.into_body(), self.max_bytes()).await {
            Ok(bytes) => bytes,
            Err(BodyReadError::TooLarge) => {
                return plain_response(StatusCode::PAYLOAD_TOO_LARGE, "report body too large")
            }
            Err(BodyReadError::Io) => {
                return plain_response(StatusCode::BAD_REQUEST, "failed to read report body")
            }
        };

        match content_type.as_deref() {
            Some("application/csp-report") if self.csp_handler.is_some() => {
                self.handle_csp(&body)
            }
            Some("application/reports+json") if self.generic_handler.is_some() => {
                self.handle_generic(&body)
            }
            _ => plain_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported or unregistered report content type",
            ),
        }
    }

    fn handle_csp(&self, body: &[u8]) -> Response<Body> {
        let value: serde_json::Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(_) => return plain_response(StatusCode::BAD_REQUEST, "malformed JSON"),
        };
        let Some(top) = value.as_object() else {
            return plain_response(StatusCode::BAD_REQUEST, "expected a JSON object");
        };
        // CSP2 wraps the report under "csp-report"; the deprecated CSP3
        // single-report form does not. Both use the hyphenated field names.
        let report_obj = top
            .get("csp-report")
            .and_then(serde_json::Value::as_object)
            .unwrap_or(top);
        let report = CspReport::from_hyphenated_object(report_obj);
        if let Some(handler) = &self.csp_handler {
            handler(report);
        }
        empty_response(StatusCode::NO_CONTENT)
    }

    fn handle_generic(&self, body: &[u8]) -> Response<Body> {
        let value: serde_json::Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(_) => return plain_response(StatusCode::BAD_REQUEST, "malformed JSON"),
        };
        let Some(array) = value.as_array() else {
            return plain_response(StatusCode::BAD_REQUEST, "expected a JSON array");
        };

        let mut saw_malformed = false;
        for item in array {
            let Some(obj) = item.as_object() else {
                saw_malformed = true;
                continue;
            };
            let Some(body_obj) = obj.get("body").and_then(serde_json::Value::as_object) else {
                saw_malformed = true;
                continue;
            };

            let report_type = coerce_string(obj.get("type"));
            let body = if report_type == "csp-violation" {
                ReportBody::Csp(CspReport::from_camel_case_object(body_obj))
            } else {
                ReportBody::Generic(body_obj.clone())
            };
            let report = Report {
                report_type,
                age: coerce_u64(obj.get("age")),
                url: coerce_string(obj.get("url")),
                user_agent: coerce_string(obj.get("user_agent")),
                body,
            };
            if let Some(handler) = &self.generic_handler {
                handler(report);
            }
        }

        if saw_malformed {
            // Well-formed reports were already delivered above; the overall
            // response still reports failure, per §4.4 step 4.
            plain_response(StatusCode::BAD_REQUEST, "one or more reports were malformed")
        } else {
            empty_response(StatusCode::NO_CONTENT)
        }
    }
}

enum BodyReadError {
    TooLarge,
    Io,
}

/// Reads `body` fully, bounded by `max_bytes`. Drains any remaining chunks
/// before returning on the oversized path, matching the resource-release
/// invariant that the body reader must be drained on every exit path.
async fn read_bounded(mut body: Body, max_bytes: usize) -> Result<Bytes, BodyReadError> {
    let mut buf = BytesMut::new();
    let mut too_large = false;
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|_| BodyReadError::Io)?;
        if !too_large {
            if buf.len() + chunk.len() > max_bytes {
                too_large = true;
            } else {
                buf.extend_from_slice(&chunk);
            }
        }
    }
    if too_large {
        Err(BodyReadError::TooLarge)
    } else {
        Ok(buf.freeze())
    }
}

fn plain_response(status: StatusCode, reason: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(reason.to_string()))
        .expect("status/header/body are all well-formed constants")
}

fn empty_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .expect("status is a well-formed constant")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn post(content_type: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .header(http::header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn s7_csp2_report_yields_204_and_callback() {
        let received: Arc<Mutex<Vec<CspReport>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let collector = ReportCollector::new().with_csp_handler(move |r| {
            received_clone.lock().unwrap().push(r);
        });

        let req = post(
            "application/csp-report",
            r#"{"csp-report":{"blocked-uri":"http://a","lineno":5}}"#,
        );
        let resp = collector.handle(req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let reports = received.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].blocked_url, "http://a");
        assert_eq!(reports[0].line_number, 5);
    }

    #[tokio::test]
    async fn s8_wrong_method_is_rejected_without_callback() {
        let called = Arc::new(Mutex::new(false));
        let called_clone = called.clone();
        let collector = ReportCollector::new().with_csp_handler(move |_| {
            *called_clone.lock().unwrap() = true;
        });

        let req = Request::builder()
            .method(Method::GET)
            .header(http::header::CONTENT_TYPE, "application/csp-report")
            .body(Body::empty())
            .unwrap();
        let resp = collector.handle(req).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(!*called.lock().unwrap());
    }

    #[tokio::test]
    async fn csp3_generic_array_round_trip() {
        let received: Arc<Mutex<Vec<Report>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let collector = ReportCollector::new().with_generic_handler(move |r| {
            received_clone.lock().unwrap().push(r);
        });

        let req = post(
            "application/reports+json",
            r#"[{"type":"csp-violation","age":3,"url":"https://x","user_agent":"ua","body":{"blockedURL":"x","effectiveDirective":"d"}}]"#,
        );
        let resp = collector.handle(req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let reports = received.lock().unwrap();
        assert_eq!(reports.len(), 1);
        match &reports[0].body {
            ReportBody::Csp(csp) => {
                assert_eq!(csp.blocked_url, "x");
                assert_eq!(csp.effective_directive, "d");
                assert_eq!(csp.violated_directive, "d");
            }
            ReportBody::Generic(_) => panic!("expected a CSP body"),
        }
    }

    #[tokio::test]
    async fn malformed_report_in_array_yields_400_after_delivering_rest() {
        let received: Arc<Mutex<Vec<Report>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let collector = ReportCollector::new().with_generic_handler(move |r| {
            received_clone.lock().unwrap().push(r);
        });

        let req = post(
            "application/reports+json",
            r#"[{"type":"deprecation","age":1,"url":"https://x","user_agent":"ua","body":{"id":"x"}}, "not-an-object"]"#,
        );
        let resp = collector.handle(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsupported_content_type_is_415() {
        let collector = ReportCollector::new().with_csp_handler(|_| {});
        let req = post("text/plain", "{}");
        let resp = collector.handle(req).await;
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let collector = ReportCollector::new()
            .with_csp_handler(|_| {})
            .with_max_body_bytes(8);
        let req = post("application/csp-report", r#"{"csp-report":{"blocked-uri":"x"}}"#);
        let resp = collector.handle(req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
