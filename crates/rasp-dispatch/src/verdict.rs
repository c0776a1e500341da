//! Verdicts and the outcomes detection functions return.

use std::fmt;
use std::str::FromStr;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the enforcement layer should do about a verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// No opinion; never reaches the output.
    Ignore,
    /// Record the finding, let the operation proceed.
    Log,
    /// Stop the operation.
    Block,
    /// The plugin itself failed.
    Exception,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Log => "log",
            Self::Block => "block",
            Self::Exception => "exception",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(Self::Ignore),
            "log" => Ok(Self::Log),
            "block" => Ok(Self::Block),
            "exception" => Ok(Self::Exception),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// A normalized verdict, every field filled in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub action: Action,
    pub message: String,
    /// Originating plugin name.
    pub name: String,
    pub confidence: f64,
    /// Extra fields the plugin attached to its result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Verdict {
    /// Verdict reporting a plugin failure.
    pub fn exception(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: Action::Exception,
            message: message.into(),
            name: name.into(),
            confidence: 0.0,
            details: None,
        }
    }

    pub fn is_block(&self) -> bool {
        self.action == Action::Block
    }
}

/// The partial verdict a detection function returns. Missing fields get defaults
/// during normalization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawVerdict {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RawVerdict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Read a loosely-typed JSON result.
    ///
    /// Returns `None` for anything that is not an object. Known keys are read
    /// leniently: an unrecognized `action` is treated as missing, a non-string
    /// `message` keeps its JSON text, and a `confidence` that is not numeric is
    /// treated as missing. Every other key is kept in `details`.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut obj) = value else {
            return None;
        };

        let action = obj
            .remove("action")
            .and_then(|v| v.as_str().and_then(|s| s.parse::<Action>().ok()));

        let message = match obj.remove("message") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        };

        let name = match obj.remove("name") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        let confidence = match obj.remove("confidence") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        let details = if obj.is_empty() {
            None
        } else {
            Some(Value::Object(obj))
        };

        Some(Self {
            action,
            message,
            name,
            confidence,
            details,
        })
    }

    /// Fill in defaults, attributing the verdict to `plugin` when no name was given.
    pub fn complete(self, plugin: &str) -> Verdict {
        Verdict {
            action: self.action.unwrap_or(Action::Log),
            message: self.message.unwrap_or_default(),
            name: self
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| plugin.to_string()),
            confidence: self
                .confidence
                .filter(|c| c.is_finite())
                .unwrap_or(0.0),
            details: self.details.filter(|d| !is_empty_object(d)),
        }
    }
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}

/// A failure reported by a plugin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct PluginError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// JSON representation used as the message of `exception` verdicts.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }
}

impl From<String> for PluginError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for PluginError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Future returned by a detection function that finishes its work asynchronously.
pub type PendingOutcome = BoxFuture<'static, Result<Outcome, PluginError>>;

/// What a detection function returns.
pub enum Outcome {
    /// No opinion; dropped.
    NoOpinion,
    /// A (possibly partial) verdict available now.
    Verdict(RawVerdict),
    /// A verdict that will be available later.
    Pending(PendingOutcome),
}

impl Outcome {
    pub fn verdict(raw: RawVerdict) -> Self {
        Self::Verdict(raw)
    }

    pub fn ignore() -> Self {
        Self::Verdict(RawVerdict::new().with_action(Action::Ignore))
    }

    pub fn pending<F>(fut: F) -> Self
    where
        F: std::future::Future<Output = Result<Outcome, PluginError>> + Send + 'static,
    {
        Self::Pending(Box::pin(fut))
    }

    /// Objects become verdicts, everything else is no opinion.
    pub fn from_value(value: Value) -> Self {
        match RawVerdict::from_value(value) {
            Some(raw) => Self::Verdict(raw),
            None => Self::NoOpinion,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl From<RawVerdict> for Outcome {
    fn from(raw: RawVerdict) -> Self {
        Self::Verdict(raw)
    }
}

impl From<Option<RawVerdict>> for Outcome {
    fn from(raw: Option<RawVerdict>) -> Self {
        raw.map_or(Self::NoOpinion, Self::Verdict)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOpinion => f.write_str("NoOpinion"),
            Self::Verdict(raw) => f.debug_tuple("Verdict").field(raw).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Future resolving to the normalized verdict of a pending outcome, or `None` when dropped.
pub type PendingVerdict = BoxFuture<'static, Option<Verdict>>;

/// One entry of a dispatch result.
pub enum Evaluation {
    Ready(Verdict),
    /// Still waiting on the plugin's future.
    Pending {
        plugin: String,
        verdict: PendingVerdict,
    },
}

impl Evaluation {
    pub fn as_ready(&self) -> Option<&Verdict> {
        match self {
            Self::Ready(v) => Some(v),
            Self::Pending { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Name of the plugin the entry is attributed to.
    pub fn plugin(&self) -> &str {
        match self {
            Self::Ready(v) => &v.name,
            Self::Pending { plugin, .. } => plugin,
        }
    }

    /// Wait for the verdict.
    pub async fn into_verdict(self) -> Option<Verdict> {
        match self {
            Self::Ready(v) => Some(v),
            Self::Pending { verdict, .. } => verdict.await,
        }
    }
}

impl fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Self::Pending { plugin, .. } => f
                .debug_struct("Pending")
                .field("plugin", plugin)
                .finish_non_exhaustive(),
        }
    }
}
