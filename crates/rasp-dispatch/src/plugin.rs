//! Plugins, detection functions and check point bindings.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::context::CheckContext;
use crate::error::Result;
use crate::registry::PluginRegistry;
use crate::verdict::{Outcome, PluginError};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// A detection function bound to a check point.
///
/// Returning `Err` is a synchronous fault: it aborts the dispatch that invoked
/// the detector. Failures that should only be reported belong inside a
/// [`Outcome::Pending`] future, where they become `exception` verdicts.
pub trait Detector: Send + Sync {
    fn detect(
        &self,
        params: &Value,
        context: &CheckContext,
    ) -> std::result::Result<Outcome, PluginError>;
}

impl<F> Detector for F
where
    F: Fn(&Value, &CheckContext) -> std::result::Result<Outcome, PluginError> + Send + Sync,
{
    fn detect(
        &self,
        params: &Value,
        context: &CheckContext,
    ) -> std::result::Result<Outcome, PluginError> {
        self(params, context)
    }
}

/// A named unit of detection logic.
///
/// Each construction gets a fresh `instance` id, so a plugin replaced under the
/// same name remains distinguishable from its successor.
#[derive(Debug, PartialEq, Eq)]
pub struct Plugin {
    name: String,
    instance: u64,
}

impl Plugin {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }
}

/// One detection function attached to one check point, attributed to one plugin.
#[derive(Clone)]
pub struct Binding {
    detector: Arc<dyn Detector>,
    plugin: Arc<Plugin>,
}

impl Binding {
    pub(crate) fn new(detector: Arc<dyn Detector>, plugin: Arc<Plugin>) -> Self {
        Self { detector, plugin }
    }

    pub fn plugin(&self) -> &Arc<Plugin> {
        &self.plugin
    }

    pub(crate) fn detector(&self) -> &dyn Detector {
        self.detector.as_ref()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("plugin", &self.plugin.name)
            .field("instance", &self.plugin.instance)
            .finish()
    }
}

/// Handle returned by [`PluginRegistry::construct`], used to register detection functions.
pub struct PluginHandle<'r> {
    registry: &'r PluginRegistry,
    plugin: Arc<Plugin>,
}

impl<'r> PluginHandle<'r> {
    pub(crate) fn new(registry: &'r PluginRegistry, plugin: Arc<Plugin>) -> Self {
        Self { registry, plugin }
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn plugin(&self) -> &Arc<Plugin> {
        &self.plugin
    }

    /// Append `detector` to the bindings of `checkpoint`.
    ///
    /// An empty check point name is an `InvalidArgument` error. A name outside
    /// the catalog only logs a warning and creates no binding.
    pub fn register<D>(&self, checkpoint: &str, detector: D) -> Result<()>
    where
        D: Detector + 'static,
    {
        self.registry
            .bind(&self.plugin, checkpoint, Arc::new(detector))
    }

    /// [`register`](Self::register) for closures, with argument types inferred.
    pub fn register_fn<F>(&self, checkpoint: &str, f: F) -> Result<()>
    where
        F: Fn(&Value, &CheckContext) -> std::result::Result<Outcome, PluginError>
            + Send
            + Sync
            + 'static,
    {
        self.register(checkpoint, f)
    }

    /// Log a line prefixed with the plugin name.
    pub fn log(&self, message: impl fmt::Display) {
        tracing::info!(plugin = %self.plugin.name, "[{}] {}", self.plugin.name, message);
    }
}

impl fmt::Debug for PluginHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("plugin", &self.plugin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_are_unique() {
        let a = Plugin::new("a");
        let b = Plugin::new("a");
        assert_eq!(a.name(), b.name());
        assert_ne!(a.instance(), b.instance());
        assert_ne!(a, b);
    }

    #[test]
    fn closures_are_detectors() {
        let detector = |params: &Value, _ctx: &CheckContext| {
            Ok::<_, PluginError>(Outcome::from_value(params.clone()))
        };
        let outcome = detector
            .detect(&serde_json::json!({ "action": "block" }), &CheckContext::new())
            .unwrap();
        assert!(matches!(outcome, Outcome::Verdict(_)));
    }
}
