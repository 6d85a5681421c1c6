//! Agent configuration and per-recalculation options.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::Deserialize;
use tabulon_model::ValueKind;

use crate::error::EvalError;
use crate::protocol::ProtocolSource;

/// Settings fixed for the lifetime of a [`ReportAgent`](crate::ReportAgent).
///
/// Loadable from JSON; unknown keys are rejected.
///
/// ```json
/// { "max_passes": 4, "extra_kinds": [{ "custom": "money" }] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Upper bound on passes per recalculation, at least one. `None` reruns
    /// until no disabled input holds a value.
    pub max_passes: Option<NonZeroUsize>,
    /// Value kinds to build built-in protocol tables for, on top of the
    /// default set.
    pub extra_kinds: Vec<ValueKind>,
}

impl AgentConfig {
    pub fn from_json(json: &str) -> Result<Self, EvalError> {
        serde_json::from_str(json).map_err(|e| EvalError::Config {
            message: e.to_string(),
        })
    }

    pub fn with_max_passes(mut self, max_passes: NonZeroUsize) -> Self {
        self.max_passes = Some(max_passes);
        self
    }

    pub fn with_extra_kind(mut self, kind: ValueKind) -> Self {
        self.extra_kinds.push(kind);
        self
    }
}

/// Options for a single recalculation.
///
/// `extra_sources` are consulted before the built-in protocol tables, in
/// order, so a host can add operation kinds or override built-in ones.
#[derive(Clone, Default)]
pub struct RecalcOptions {
    pub extra_sources: Vec<Arc<dyn ProtocolSource>>,
    pub extra_kinds: Vec<ValueKind>,
}

impl RecalcOptions {
    pub fn new() -> Self {
        RecalcOptions::default()
    }

    pub fn with_source(mut self, source: Arc<dyn ProtocolSource>) -> Self {
        self.extra_sources.push(source);
        self
    }

    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.extra_kinds.push(kind);
        self
    }
}

impl fmt::Debug for RecalcOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecalcOptions")
            .field("extra_sources", &self.extra_sources.len())
            .field("extra_kinds", &self.extra_kinds)
            .finish()
    }
}
