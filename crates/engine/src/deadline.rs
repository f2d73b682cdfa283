//! Whole-request deadline shared by every backend call

use contextforge_common::errors::{AppError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Point in time after which outstanding backend calls are abandoned
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
    budget_ms: u64,
}

impl Deadline {
    /// Deadline starting now; `None` never expires
    pub fn after(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(t) => Self {
                at: Some(Instant::now() + t),
                budget_ms: t.as_millis() as u64,
            },
            None => Self::none(),
        }
    }

    pub fn none() -> Self {
        Self {
            at: None,
            budget_ms: 0,
        }
    }

    /// Run `fut`, failing with `AppError::Timeout` if the deadline passes first
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.at {
            None => fut.await,
            Some(at) => match tokio::time::timeout_at(at, fut).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: self.budget_ms,
                }),
            },
        }
    }
}
