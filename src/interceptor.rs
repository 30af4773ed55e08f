//! The interceptor chain runner. Grounded in the `InterceptorChain` /
//! `Stage` pattern (`soulbase-interceptors`): an ordered `Vec<Box<dyn
//! Stage>>` walked directly rather than through a global dispatch table, with
//! an explicit short-circuit outcome.

use std::sync::Arc;

use async_trait::async_trait;

use crate::request::IncomingRequest;
use crate::task::Task;

/// A three-phase hook wrapping the handler. Process-wide and stateless per
/// request: any per-request scratch data an interceptor needs is threaded
/// via the [`Task`], not instance fields, so the same `Interceptor` instance
/// can run concurrently for independent requests.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Runs before the handler, in forward registration order. May write a
    /// response itself, in which case the handler and any later `Before`
    /// interceptors are skipped.
    async fn before(&self, _task: &mut Task, _req: &IncomingRequest) {}

    /// Runs after a response has been produced (by the handler or an
    /// earlier-running `Before`), in reverse registration order. May mutate
    /// headers. Deliberately not given the request: this phase is coupled
    /// to the response being produced, not to the request traversal, per
    /// the task's own `run_commit`. Must not itself call a write entry
    /// point on `task` — see the task's `in_response_phase` guard.
    async fn commit(&self, _task: &mut Task) {}

    /// Runs when the task enters the error branch, in reverse registration
    /// order. Must not write. Also request-decoupled, for the same reason
    /// as `commit`.
    async fn on_error(&self, _task: &mut Task) {}
}

/// The handler contract: produces a response via `task`'s write entry
/// points, or returns without writing to signal "synthesise 204".
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, task: &mut Task, req: &IncomingRequest);
}

/// An ordered, process-wide list of interceptors plus the handler they wrap.
/// Passed by (shared) reference into each task; never mutated after
/// construction.
pub struct Chain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    handler: Arc<dyn Handler>,
}

impl Chain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>, handler: Arc<dyn Handler>) -> Self {
        Chain {
            interceptors,
            handler,
        }
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    /// Drives `Before` (forward) then, if nothing wrote, the handler. Commit
    /// and OnError are driven from the task's own write entry points (see
    /// `crate::task`), since they are coupled to a response being produced,
    /// not to the request traversal itself.
    pub async fn run(&self, task: &mut Task, req: &IncomingRequest) {
        for interceptor in &self.interceptors {
            interceptor.before(task, req).await;
            if task.written() {
                return;
            }
        }

        self.handler.serve(task, req).await;
        if !task.written() {
            task.no_content().await;
        }
    }
}
