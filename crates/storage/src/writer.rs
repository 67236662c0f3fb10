use std::sync::Arc;

use metronome_core::{Sample, StreamName};

use crate::backend::PartitionStore;
use crate::error::StoreError;

/// Appends samples to provisioned partitions.
///
/// The writer never creates partitions: a sample whose day has not been
/// provisioned fails with [`StoreError::NoPartition`].
#[derive(Clone)]
pub struct SampleWriter {
    store: Arc<dyn PartitionStore>,
}

impl SampleWriter {
    pub fn new(store: Arc<dyn PartitionStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, stream: &StreamName, sample: Sample) -> Result<(), StoreError> {
        self.store.insert_samples(stream, std::slice::from_ref(&sample)).await
    }

    /// Append a batch atomically: either every sample is written or none is.
    pub async fn record_batch(&self, stream: &StreamName, samples: &[Sample]) -> Result<(), StoreError> {
        self.store.insert_samples(stream, samples).await
    }
}
