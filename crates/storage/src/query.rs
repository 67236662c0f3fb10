use std::sync::Arc;

use metronome_core::{PlannedQuery, Points, QueryParams, StreamName};

use crate::backend::PartitionStore;
use crate::error::StoreError;

/// Filtered and aggregated reads over a logical stream.
///
/// Parameters are validated into a [`PlannedQuery`] before the backend is
/// touched, so bad input never reaches storage and is never logged as an
/// operational failure.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn PartitionStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn PartitionStore>) -> Self {
        Self { store }
    }

    /// Number of samples, or of groups when `date_trunc` is set, matching the
    /// filter. Pagination fields are ignored.
    pub async fn count(&self, stream: &StreamName, params: &QueryParams) -> Result<u64, StoreError> {
        let plan = PlannedQuery::from_params(params)?;
        self.store.count(stream, &plan).await
    }

    pub async fn find(&self, stream: &StreamName, params: &QueryParams) -> Result<Points, StoreError> {
        let plan = PlannedQuery::from_params(params)?;
        self.store.find(stream, &plan).await
    }
}
