//! A typed, read-only view of the inbound request, handed to interceptors
//! and handlers. Deliberately thin: routing/mux and body-reading policy live
//! outside this crate's scope, so this only exposes what the task machinery
//! and interceptors need to make ordering and header decisions.

use http::{HeaderMap, Method, Uri};

pub struct IncomingRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl IncomingRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        IncomingRequest {
            method,
            uri,
            headers,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Builds a view from a live `hyper::Request`'s parts, leaving the body
    /// for the caller to read separately (draining it is the server
    /// wiring's responsibility, per the resource-release invariant).
    pub fn from_hyper_parts(parts: &http::request::Parts) -> Self {
        IncomingRequest {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        }
    }
}
