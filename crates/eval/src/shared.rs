//! Shared handle to a report agent.
//!
//! [`ReportAgent::recalc`] takes `&mut self`, which already keeps two
//! recalculations of the same agent from overlapping. Callers that need to
//! hand one agent to several tasks wrap it in a [`SharedReportAgent`]: every
//! mutation goes through one async mutex, so a second caller waits until
//! the running recalculation has finished.

use std::sync::Arc;

use tabulon_model::{CellLocator, ReportValue, Value};
use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard};

use crate::agent::{RecalcSummary, ReportAgent};
use crate::config::RecalcOptions;
use crate::error::EvalError;

#[derive(Debug, Clone)]
pub struct SharedReportAgent {
    inner: Arc<Mutex<ReportAgent>>,
}

impl SharedReportAgent {
    pub fn new(agent: ReportAgent) -> Self {
        SharedReportAgent {
            inner: Arc::new(Mutex::new(agent)),
        }
    }

    /// Exclusive access, for reads or a batch of updates.
    pub async fn lock(&self) -> MutexGuard<'_, ReportAgent> {
        self.inner.lock().await
    }

    pub async fn recalc(
        &self,
        at: OffsetDateTime,
        options: &RecalcOptions,
    ) -> Result<RecalcSummary, EvalError> {
        let mut agent = self.inner.lock().await;
        agent.recalc_async(at, options).await
    }

    pub async fn set_input_value<T: ReportValue>(
        &self,
        locator: &CellLocator,
        value: Option<T>,
        at: OffsetDateTime,
    ) -> Result<(), EvalError> {
        self.inner.lock().await.set_input_value(locator, value, at)
    }

    pub async fn set_input(
        &self,
        locator: &CellLocator,
        value: Option<Value>,
        at: OffsetDateTime,
    ) -> Result<(), EvalError> {
        self.inner.lock().await.set_input(locator, value, at)
    }
}
