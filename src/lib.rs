//! A safe HTTP request-handling framework: a write-once response lifecycle
//! ([`task`]), a closed set of response shapes turned into bytes by a single
//! trusted [`dispatcher`], an ordered [`interceptor`] chain, and a decoder
//! for the two W3C reporting-endpoint dialects ([`report`]).

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod header;
pub mod interceptor;
pub mod logging;
pub mod report;
pub mod request;
pub mod response;
pub mod safehtml;
pub mod server;
pub mod sink;
pub mod task;

pub use dispatcher::{DefaultDispatcher, Dispatcher};
pub use error::{DispatchError, FrameworkError};
pub use header::Headers;
pub use interceptor::{Chain, Handler, Interceptor};
pub use request::IncomingRequest;
pub use response::Response;
pub use safehtml::SafeHtml;
pub use sink::Sink;
pub use task::Task;
