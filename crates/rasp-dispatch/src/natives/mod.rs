//! Host-provided facilities exposed to plugins.
//!
//! [`Natives`] bundles the lexer, outbound requests, the background request
//! queue and the stack provider behind one handle that plugins can capture.

pub mod queue;
pub mod request;
pub mod stack;

use std::sync::Arc;

use crate::config::RequestQueueConfig;
use crate::error::Result;
use crate::tokenize::{self, SpanLexer, Token};

pub use queue::RequestQueue;
pub use request::{
    HttpTransport, RequestBody, RequestConfig, RequestError, RequestErrorKind, Response, Transport,
};
pub use stack::{NoStack, StackProvider};

/// Engine identifier reported to plugins.
pub const ENGINE: &str = "native";

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[derive(Clone)]
pub struct Natives {
    lexer: Option<Arc<dyn SpanLexer>>,
    transport: Arc<dyn Transport>,
    queue: Option<Arc<RequestQueue>>,
    stack: Arc<dyn StackProvider>,
}

impl Natives {
    pub fn new() -> Self {
        Self {
            lexer: None,
            transport: Arc::new(HttpTransport::new()),
            queue: None,
            stack: Arc::new(NoStack),
        }
    }

    pub fn with_lexer(mut self, lexer: Arc<dyn SpanLexer>) -> Self {
        self.lexer = Some(lexer);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_stack_provider(mut self, stack: Arc<dyn StackProvider>) -> Self {
        self.stack = stack;
        self
    }

    /// Start a background request queue over the current transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_request_queue(mut self, config: &RequestQueueConfig) -> Result<Self> {
        let queue = RequestQueue::new(Arc::clone(&self.transport), config)?;
        self.queue = Some(Arc::new(queue));
        Ok(self)
    }

    pub fn version(&self) -> &'static str {
        version()
    }

    pub fn engine(&self) -> &'static str {
        ENGINE
    }

    pub fn sql_tokenize(&self, query: &str) -> Vec<Token> {
        tokenize::sql_tokenize(query, self.lexer.as_deref())
    }

    pub fn cmd_tokenize(&self, command: &str) -> Vec<Token> {
        tokenize::cmd_tokenize(command, self.lexer.as_deref())
    }

    pub async fn request(
        &self,
        config: &RequestConfig,
    ) -> std::result::Result<Response, RequestError> {
        self.transport.send(config).await
    }

    /// Queue a request without waiting for it. Returns `false` when there is
    /// no queue, or it is full or terminated.
    pub fn request_async(&self, config: RequestConfig) -> bool {
        match &self.queue {
            Some(queue) => queue.post(config),
            None => {
                tracing::debug!(url = %config.url, "no request queue configured; dropping request");
                false
            }
        }
    }

    pub fn request_queue(&self) -> Option<&Arc<RequestQueue>> {
        self.queue.as_ref()
    }

    pub fn get_stack(&self) -> Vec<String> {
        self.stack.get_stack()
    }
}

impl Default for Natives {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Natives {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Natives")
            .field("lexer", &self.lexer.is_some())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifies_engine_and_version() {
        let natives = Natives::new();
        assert_eq!(natives.engine(), "native");
        assert_eq!(natives.version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn tokenizers_need_a_lexer() {
        let natives = Natives::new();
        assert!(natives.sql_tokenize("select 1").is_empty());

        let lexer: Arc<dyn SpanLexer> = Arc::new(|text: &str, _: &str| vec![0, text.len()]);
        let natives = natives.with_lexer(lexer);
        let tokens = natives.cmd_tokenize("whoami");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "whoami");
    }

    #[test]
    fn request_async_without_queue_is_rejected() {
        assert!(!Natives::new().request_async(RequestConfig::new("http://127.0.0.1/")));
    }

    #[test]
    fn stack_provider_is_pluggable() {
        let natives = Natives::new().with_stack_provider(Arc::new(|| vec!["frame".to_string()]));
        assert_eq!(natives.get_stack(), vec!["frame"]);
        assert!(Natives::new().get_stack().is_empty());
    }
}
