use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Evaluation, ScreenError};

/// Persists screening results, one row per ticker. A later write for the same
/// ticker replaces the earlier one.
#[async_trait]
pub trait ResultWriter: Send + Sync {
    async fn write(
        &self,
        evaluation: &Evaluation,
        updated_at: DateTime<Utc>,
    ) -> Result<(), ScreenError>;

    /// Write a whole batch, returning how many rows were written.
    async fn write_all(
        &self,
        evaluations: &[Evaluation],
        updated_at: DateTime<Utc>,
    ) -> Result<usize, ScreenError> {
        for evaluation in evaluations {
            self.write(evaluation, updated_at).await?;
        }
        Ok(evaluations.len())
    }
}
