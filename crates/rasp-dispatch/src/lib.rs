#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

//! # rasp-dispatch - Check Point Dispatch for Runtime Inspection Agents
//!
//! An instrumented host fires named check points (`sql`, `command`, `ssrf`,
//! ...) with a parameter object and a request context. Plugins bind detection
//! functions to those check points; the dispatcher invokes every binding in
//! registration order and normalizes what each returns into a [`Verdict`].
//!
//! - [`CheckpointCatalog`]: the fixed set of known check point names
//! - [`PluginRegistry`]: plugins and their per-check-point bindings
//! - [`Dispatcher`]: `check`, `resolve` and `evaluate`
//! - [`Natives`]: tokenizers, outbound requests and stack capture for plugins
//!
//! ## Quick Start
//!
//! ```rust
//! use rasp_dispatch::{Action, CheckContext, DispatchConfig, Dispatcher, RawVerdict};
//! use serde_json::json;
//!
//! let dispatcher = Dispatcher::from_config(&DispatchConfig::default()).unwrap();
//!
//! let plugin = dispatcher.registry().construct("sqli").unwrap();
//! plugin
//!     .register_fn("sql", |params, _ctx| {
//!         let query = params["query"].as_str().unwrap_or_default();
//!         if query.contains("sleep(") {
//!             return Ok(RawVerdict::new()
//!                 .with_action(Action::Block)
//!                 .with_message("time-based injection")
//!                 .with_confidence(90.0)
//!                 .into());
//!         }
//!         Ok(None::<RawVerdict>.into())
//!     })
//!     .unwrap();
//!
//! let evaluations = dispatcher
//!     .check("sql", &json!({ "query": "select sleep(5)" }), &CheckContext::new())
//!     .unwrap();
//! let verdict = evaluations[0].as_ready().unwrap();
//! assert!(verdict.is_block());
//! assert_eq!(verdict.name, "sqli");
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use rasp_dispatch::DispatchConfig;
//!
//! let yaml = r#"
//! checkpoints: [sql, command]
//! max_pending_depth: 2
//! resolve_timeout_ms: 100
//! "#;
//!
//! let config = DispatchConfig::from_yaml(yaml).unwrap();
//! assert_eq!(config.checkpoints.len(), 2);
//! ```

pub mod catalog;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod natives;
pub mod normalize;
pub mod plugin;
pub mod registry;
pub mod tokenize;
pub mod verdict;

pub use catalog::CheckpointCatalog;
pub use config::{DispatchConfig, RequestQueueConfig, DEFAULT_CHECKPOINTS};
pub use context::CheckContext;
pub use dispatch::{Dispatcher, ENGINE_NAME, TIMEOUT_MESSAGE};
pub use error::{ConfigFieldError, ConfigValidationError, Error, Result};
pub use natives::{
    HttpTransport, Natives, RequestBody, RequestConfig, RequestError, RequestErrorKind,
    RequestQueue, Response, StackProvider, Transport,
};
pub use plugin::{Binding, Detector, Plugin, PluginHandle};
pub use registry::PluginRegistry;
pub use tokenize::{SpanLexer, Token};
pub use verdict::{Action, Evaluation, Outcome, PluginError, RawVerdict, Verdict};
