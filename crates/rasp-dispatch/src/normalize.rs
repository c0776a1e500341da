//! Turns whatever a detection function returned into a canonical verdict.

use tracing::warn;

use crate::plugin::Plugin;
use crate::verdict::{Action, Outcome, PendingOutcome, PendingVerdict, RawVerdict, Verdict};

/// Result of normalizing one outcome.
pub enum Normalized {
    /// No opinion or an explicit `ignore`.
    Dropped,
    Ready(Verdict),
    Pending(PendingVerdict),
}

impl std::fmt::Debug for Normalized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dropped => f.write_str("Dropped"),
            Self::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Normalize `outcome` on behalf of `plugin`.
///
/// Pending outcomes are not awaited here; the returned future performs the
/// normalization once the plugin's future completes. A rejected future becomes
/// an `exception` verdict, and so does a chain of pending outcomes nested more
/// than `max_depth` levels deep.
pub fn normalize(outcome: Outcome, plugin: &Plugin, max_depth: u8) -> Normalized {
    match outcome {
        Outcome::NoOpinion => Normalized::Dropped,
        Outcome::Verdict(raw) => match complete(raw, plugin.name()) {
            Some(verdict) => Normalized::Ready(verdict),
            None => Normalized::Dropped,
        },
        Outcome::Pending(fut) => Normalized::Pending(resolve_pending(
            fut,
            plugin.name().to_string(),
            1,
            max_depth.max(1),
        )),
    }
}

fn complete(raw: RawVerdict, plugin: &str) -> Option<Verdict> {
    if raw.action == Some(Action::Ignore) {
        return None;
    }
    Some(raw.complete(plugin))
}

fn resolve_pending(
    fut: PendingOutcome,
    plugin: String,
    depth: u8,
    max_depth: u8,
) -> PendingVerdict {
    Box::pin(async move {
        match fut.await {
            Ok(Outcome::NoOpinion) => None,
            Ok(Outcome::Verdict(raw)) => complete(raw, &plugin),
            Ok(Outcome::Pending(next)) => {
                if depth >= max_depth {
                    warn!(
                        plugin = %plugin,
                        depth,
                        "Pending verdict nested too deeply"
                    );
                    return Some(Verdict::exception(
                        plugin,
                        format!("pending verdict nested deeper than {} level(s)", max_depth),
                    ));
                }
                resolve_pending(next, plugin, depth + 1, max_depth).await
            }
            Err(err) => {
                warn!(plugin = %plugin, error = %err, "Pending detection failed");
                let message = err.to_json_string();
                Some(Verdict::exception(plugin, message))
            }
        }
    })
}
