//! Tabulon report evaluator -- recalculates reports built with
//! `tabulon-model`.
//!
//! Operations are evaluated through protocols looked up by operation kind
//! and result kind, so host applications can add their own operation kinds
//! or replace built-in ones. A recalculation runs in three phases (operation
//! execution, validation, availability), evaluates cells lazily and at most
//! once per pass, and reruns while the availability phase disables inputs
//! that still hold a value.
//!
//! Every evaluation path exists twice: a blocking one and an async one that
//! gives the same results.

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod index;
pub mod numeric;
pub mod protocol;
pub mod rules;
#[cfg(feature = "shared")]
pub mod shared;

pub use agent::{RecalcSummary, ReportAgent};
pub use config::{AgentConfig, RecalcOptions};
pub use context::{EvalContext, Phase};
pub use error::EvalError;
pub use index::Resolved;
pub use protocol::{
    Protocol, ProtocolChain, ProtocolFactory, ProtocolFactoryBuilder, ProtocolKey,
    ProtocolSource, RegistrationPolicy,
};
#[cfg(feature = "shared")]
pub use shared::SharedReportAgent;
