//! Dispatcher - evaluates every binding of a firing check point.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::CheckpointCatalog;
use crate::config::{duration_ms, DispatchConfig};
use crate::context::CheckContext;
use crate::error::{Error, Result};
use crate::normalize::{normalize, Normalized};
use crate::registry::PluginRegistry;
use crate::verdict::{Evaluation, Verdict};

/// Message of the verdict synthesized for a pending verdict that missed its deadline.
pub const TIMEOUT_MESSAGE: &str = "plugin execution timeout";

/// Verdict name used when a failure cannot be attributed to a plugin.
pub const ENGINE_NAME: &str = "engine";

/// Evaluates check points against the bindings of a [`PluginRegistry`].
///
/// `check` never mutates dispatcher state; the only shared state is the
/// registry, which is read through a snapshot per call.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    max_pending_depth: u8,
    resolve_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<PluginRegistry>, config: &DispatchConfig) -> Self {
        Self {
            registry,
            max_pending_depth: config.max_pending_depth.max(1),
            resolve_timeout: config.resolve_timeout(),
        }
    }

    /// Build a fresh registry from `config` and a dispatcher over it.
    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(CheckpointCatalog::from_config(config)?);
        let registry = Arc::new(PluginRegistry::new(catalog));
        Ok(Self::new(registry, config))
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Invoke every binding of `checkpoint` in registration order.
    ///
    /// Verdicts that are ready come back as [`Evaluation::Ready`], verdicts
    /// still waiting on a plugin future as [`Evaluation::Pending`]; dropped
    /// outcomes leave no entry. The output order follows registration order.
    ///
    /// A detection function returning `Err` aborts the call: bindings after it
    /// are not invoked and the error is returned as
    /// [`Error::PluginEvaluation`].
    pub fn check(
        &self,
        checkpoint: &str,
        params: &Value,
        context: &CheckContext,
    ) -> Result<Vec<Evaluation>> {
        let bindings = self
            .registry
            .bindings(checkpoint)
            .ok_or_else(|| Error::UnknownCheckpoint(checkpoint.to_string()))?;

        let mut out: Vec<Evaluation> = Vec::with_capacity(bindings.len());

        for binding in &bindings {
            let plugin = binding.plugin();

            let outcome = binding
                .detector()
                .detect(params, context)
                .map_err(|err| {
                    warn!(
                        plugin = plugin.name(),
                        checkpoint,
                        error = %err,
                        "Detection function failed; aborting check"
                    );
                    Error::PluginEvaluation {
                        plugin: plugin.name().to_string(),
                        checkpoint: checkpoint.to_string(),
                        message: err.message,
                    }
                })?;

            match normalize(outcome, plugin, self.max_pending_depth) {
                Normalized::Dropped => {
                    debug!(plugin = plugin.name(), checkpoint, "No opinion");
                }
                Normalized::Ready(verdict) => {
                    debug!(
                        plugin = plugin.name(),
                        checkpoint,
                        action = %verdict.action,
                        confidence = verdict.confidence,
                        "Verdict ready"
                    );
                    out.push(Evaluation::Ready(verdict));
                }
                Normalized::Pending(verdict) => {
                    debug!(plugin = plugin.name(), checkpoint, "Verdict pending");
                    out.push(Evaluation::Pending {
                        plugin: plugin.name().to_string(),
                        verdict,
                    });
                }
            }
        }

        Ok(out)
    }

    /// Wait for every pending entry, keeping registration order.
    ///
    /// Entries that resolve to nothing are dropped. With a resolve timeout
    /// configured, entries still pending at the deadline become `exception`
    /// verdicts; without one, a future that never completes stalls this call.
    pub async fn resolve(&self, evaluations: Vec<Evaluation>) -> Vec<Verdict> {
        let deadline = self.resolve_timeout;

        let futs = evaluations.into_iter().map(|evaluation| async move {
            match evaluation {
                Evaluation::Ready(verdict) => Some(verdict),
                Evaluation::Pending { plugin, verdict } => match deadline {
                    None => verdict.await,
                    Some(limit) => match tokio::time::timeout(limit, verdict).await {
                        Ok(resolved) => resolved,
                        Err(_) => {
                            warn!(
                                plugin = %plugin,
                                timeout_ms = duration_ms(limit),
                                "Pending verdict timed out"
                            );
                            Some(Verdict::exception(plugin, TIMEOUT_MESSAGE))
                        }
                    },
                },
            }
        });

        join_all(futs).await.into_iter().flatten().collect()
    }

    /// `check` followed by `resolve`, always producing a verdict list.
    ///
    /// A dispatch error becomes a single `exception` verdict, attributed to the
    /// failing plugin or to [`ENGINE_NAME`] when no plugin was involved.
    pub async fn evaluate(
        &self,
        checkpoint: &str,
        params: &Value,
        context: &CheckContext,
    ) -> Vec<Verdict> {
        match self.check(checkpoint, params, context) {
            Ok(evaluations) => self.resolve(evaluations).await,
            Err(Error::PluginEvaluation {
                plugin, message, ..
            }) => vec![Verdict::exception(plugin, message)],
            Err(err) => vec![Verdict::exception(ENGINE_NAME, err.to_string())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::{Action, Outcome, PluginError, RawVerdict};
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        Dispatcher::from_config(&DispatchConfig::default()).unwrap()
    }

    #[test]
    fn unknown_checkpoint_fails() {
        let d = dispatcher();
        let err = d
            .check("not_a_real_checkpoint", &json!({}), &CheckContext::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownCheckpoint(name) if name == "not_a_real_checkpoint"));
    }

    #[test]
    fn known_checkpoint_without_bindings_is_empty() {
        let d = dispatcher();
        let out = d.check("sql", &json!({}), &CheckContext::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn block_and_ignore_scenario() {
        let d = dispatcher();
        let a = d.registry().construct("A").unwrap();
        a.register_fn("sql", |_, _| {
            Ok(RawVerdict::new()
                .with_action(Action::Block)
                .with_confidence(90.0)
                .into())
        })
        .unwrap();
        let b = d.registry().construct("B").unwrap();
        b.register_fn("sql", |_, _| Ok(Outcome::ignore())).unwrap();

        let out = d.check("sql", &json!({}), &CheckContext::new()).unwrap();
        assert_eq!(out.len(), 1);
        let v = out[0].as_ready().unwrap();
        assert_eq!(
            v,
            &Verdict {
                action: Action::Block,
                message: String::new(),
                name: "A".to_string(),
                confidence: 90.0,
                details: None,
            }
        );
    }

    #[test]
    fn sync_fault_aborts_remaining_bindings() {
        let d = dispatcher();
        let p = d.registry().construct("p").unwrap();
        p.register_fn("command", |_, _| Ok(RawVerdict::new().into()))
            .unwrap();
        p.register_fn("command", |_, _| Err(PluginError::new("bad plugin")))
            .unwrap();
        p.register_fn("command", |_, _| panic!("must not be invoked"))
            .unwrap();

        let err = d
            .check("command", &json!({}), &CheckContext::new())
            .unwrap_err();
        match err {
            Error::PluginEvaluation {
                plugin,
                checkpoint,
                message,
            } => {
                assert_eq!(plugin, "p");
                assert_eq!(checkpoint, "command");
                assert_eq!(message, "bad plugin");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn evaluate_turns_sync_fault_into_exception() {
        let d = dispatcher();
        let p = d.registry().construct("faulty").unwrap();
        p.register_fn("sql", |_, _| Err(PluginError::new("oops")))
            .unwrap();

        let out = d.evaluate("sql", &json!({}), &CheckContext::new()).await;
        assert_eq!(out, vec![Verdict::exception("faulty", "oops")]);
    }

    #[tokio::test]
    async fn evaluate_unknown_checkpoint_is_engine_exception() {
        let d = dispatcher();
        let out = d
            .evaluate("nope", &json!({}), &CheckContext::new())
            .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action, Action::Exception);
        assert_eq!(out[0].name, ENGINE_NAME);
    }

    #[tokio::test]
    async fn resolve_times_out_pending_verdicts() {
        let config = DispatchConfig {
            resolve_timeout_ms: Some(20),
            ..DispatchConfig::default()
        };
        let d = Dispatcher::from_config(&config).unwrap();
        let p = d.registry().construct("slow").unwrap();
        p.register_fn("ssrf", |_, _| {
            Ok(Outcome::pending(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Outcome::NoOpinion)
            }))
        })
        .unwrap();

        let out = d.evaluate("ssrf", &json!({}), &CheckContext::new()).await;
        assert_eq!(out, vec![Verdict::exception("slow", TIMEOUT_MESSAGE)]);
    }
}
