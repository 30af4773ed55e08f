//! The dispatcher contract: the sole place a [`Response`] is turned into
//! bytes. Grounded in the teacher's `ApiError::into_response` /
//! `HttpErrorBody::to_response` pattern (a closed match over known response
//! shapes, always producing a body the caller already knows the
//! Content-Type for) generalized from "errors only" to every `Response`
//! variant.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::DispatchError;
use crate::response::Response;
use crate::sink::Sink;

/// The anti-JSON-hijacking sentinel prepended to every JSON response. Bit
/// exact; tests pin this.
pub const JSON_SENTINEL: &[u8] = b")]}',\n";

/// Content-Type produced for each response shape. `NoContent` has no
/// Content-Type at all (see [`Dispatcher::content_type`]).
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Stateless collaborator, shared across every task in the process. MUST be
/// safe for concurrent invocation with independent tasks/responses.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Returns the Content-Type this dispatcher will produce for `resp`, or
    /// an error if `resp` is not of a recognised safe shape. The task calls
    /// this before writing any byte and refuses to emit a body if it
    /// errors.
    fn content_type(&self, resp: &Response) -> Result<Option<&'static str>, DispatchError>;

    /// Emits `resp`'s encoded bytes to `sink`. `sink` has already had its
    /// status and Content-Type header written by the task.
    async fn write(&self, sink: &mut dyn Sink, resp: Response) -> Result<(), DispatchError>;
}

/// The dispatcher every production deployment of this framework uses. Exists
/// as a named type (rather than requiring callers to write their own) so the
/// "safe by default" promise does not depend on every integrator getting a
/// `Dispatcher` impl right; swapping it out is an escape hatch, not the
/// common path.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDispatcher;

impl DefaultDispatcher {
    pub fn new() -> Self {
        DefaultDispatcher
    }
}

#[async_trait]
impl Dispatcher for DefaultDispatcher {
    fn content_type(&self, resp: &Response) -> Result<Option<&'static str>, DispatchError> {
        match resp {
            Response::SafeHtml(_) => Ok(Some(HTML_CONTENT_TYPE)),
            Response::Template { template, funcs, .. } => {
                check_func_map(template.declared_funcs(), funcs)?;
                Ok(Some(HTML_CONTENT_TYPE))
            }
            Response::Json(_) => Ok(Some(JSON_CONTENT_TYPE)),
            Response::NoContent => Ok(None),
            Response::Error { .. } => Ok(Some("text/plain; charset=utf-8")),
            Response::Redirect { .. } => Ok(Some("text/html; charset=utf-8")),
        }
    }

    async fn write(&self, sink: &mut dyn Sink, resp: Response) -> Result<(), DispatchError> {
        match resp {
            Response::SafeHtml(html) => {
                sink.write_body(Bytes::from(html.into_bytes())).await;
                Ok(())
            }
            Response::Template { template, data, funcs } => {
                check_func_map(template.declared_funcs(), &funcs)?;
                let rendered = template.execute(&data, &funcs)?;
                sink.write_body(Bytes::from(rendered.into_bytes())).await;
                Ok(())
            }
            Response::Json(payload) => {
                // The sentinel MUST be observable even if encoding fails
                // below: write it first, unconditionally.
                sink.write_body(Bytes::from_static(JSON_SENTINEL)).await;
                let mut encoded = Vec::new();
                payload
                    .encode_into(&mut encoded)
                    .map_err(|e| DispatchError::new(e.to_string()))?;
                encoded.push(b'\n');
                sink.write_body(Bytes::from(encoded)).await;
                Ok(())
            }
            Response::NoContent => Ok(()),
            Response::Error { reason, .. } => {
                sink.write_body(Bytes::from(reason.into_bytes())).await;
                Ok(())
            }
            Response::Redirect { url, .. } => {
                let body = format!(
                    "<a href=\"{}\">{}</a>.\n",
                    html_attr_escape(&url),
                    html_attr_escape(&url)
                );
                sink.write_body(Bytes::from(body.into_bytes())).await;
                Ok(())
            }
        }
    }
}

fn check_func_map(
    declared: &[&str],
    funcs: &crate::safehtml::FuncMap,
) -> Result<(), DispatchError> {
    if declared.len() != funcs.len() {
        return Err(DispatchError::new(format!(
            "template declares {} function(s) but {} were bound",
            declared.len(),
            funcs.len()
        )));
    }
    for name in declared {
        if funcs.get(name).is_none() {
            return Err(DispatchError::new(format!(
                "template function {name:?} not bound"
            )));
        }
    }
    for bound in funcs.names() {
        if !declared.contains(&bound) {
            return Err(DispatchError::new(format!(
                "bound function {bound:?} is not declared by the template"
            )));
        }
    }
    Ok(())
}

fn html_attr_escape(s: &str) -> String {
    crate::safehtml::SafeHtml::html_escaped(s).as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safehtml::{FuncMap, LiteralTemplate, SafeHtml};
    use crate::sink::BufferedSink;
    use std::sync::Arc;

    fn write_sync(resp: Response) -> BufferedSink {
        let dispatcher = DefaultDispatcher::new();
        let mut sink = BufferedSink::new();
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(dispatcher.write(&mut sink, resp))
            .unwrap();
        sink
    }

    #[test]
    fn safe_html_writes_escaped_bytes() {
        let sink = write_sync(Response::SafeHtml(SafeHtml::html_escaped(
            "<h1>Hello World!</h1>",
        )));
        assert_eq!(sink.body_str(), "&lt;h1&gt;Hello World!&lt;/h1&gt;");
    }

    #[test]
    fn json_sentinel_is_bit_exact() {
        let sink = write_sync(Response::json(serde_json::json!({"field": "myField"})));
        assert_eq!(sink.body(), b")]}',\n{\"field\":\"myField\"}\n");
    }

    #[test]
    fn json_encode_failure_leaves_sentinel_only() {
        #[derive(serde::Serialize)]
        struct NonFinite {
            value: f64,
        }

        let dispatcher = DefaultDispatcher::new();
        let mut sink = BufferedSink::new();
        let resp = Response::json(NonFinite {
            value: f64::INFINITY,
        });
        let result = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(dispatcher.write(&mut sink, resp));
        assert!(result.is_err());
        assert_eq!(sink.body(), JSON_SENTINEL);
    }

    #[test]
    fn template_substitutes_token_and_data() {
        let template = Arc::new(LiteralTemplate::new(
            "<form><input type=\"hidden\" name=\"token\" value=\"{{Token}}\">{{.}}</form>",
            vec!["Token"],
        ));
        let funcs = FuncMap::new().insert("Token", || "Token-secret".to_string());
        let sink = write_sync(Response::template(template, "Content", funcs));
        assert_eq!(
            sink.body_str(),
            "<form><input type=\"hidden\" name=\"token\" value=\"Token-secret\">Content</form>"
        );
    }

    #[test]
    fn template_substitutes_nonce() {
        let template = Arc::new(LiteralTemplate::new(
            "<script nonce=\"{{Nonce}}\" type=\"application/javascript\">alert(\"script\")</script><h1>{{.}}</h1>",
            vec!["Nonce"],
        ));
        let funcs = FuncMap::new().insert("Nonce", || "Nonce-secret".to_string());
        let sink = write_sync(Response::template(template, "Content", funcs));
        assert_eq!(
            sink.body_str(),
            "<script nonce=\"Nonce-secret\" type=\"application/javascript\">alert(\"script\")</script><h1>Content</h1>"
        );
    }

    #[test]
    fn template_rejects_unbound_function() {
        let template = Arc::new(LiteralTemplate::new("{{Token}}", vec!["Token"]));
        let result = DefaultDispatcher::new().content_type(&Response::template(
            template,
            "x",
            FuncMap::new(),
        ));
        assert!(result.is_err());
    }

    #[test]
    fn no_content_has_no_content_type() {
        let dispatcher = DefaultDispatcher::new();
        assert_eq!(dispatcher.content_type(&Response::NoContent).unwrap(), None);
    }
}
