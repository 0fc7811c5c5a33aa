use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and chat activity.
#[derive(Default)]
pub struct ChatMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    turns_answered: AtomicU64,
    turns_failed: AtomicU64,
    medical_routes: AtomicU64,
}

impl ChatMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingestion run and the number of chunks it wrote to the index.
    pub fn record_ingestion(&self, documents: u64, chunks: u64) {
        self.documents_ingested
            .fetch_add(documents, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunks, Ordering::Relaxed);
    }

    /// Record a finished chat turn; `failed` turns were answered with the apology.
    pub fn record_turn(&self, medical: bool, failed: bool) {
        if failed {
            self.turns_failed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.turns_answered.fetch_add(1, Ordering::Relaxed);
        }
        if medical {
            self.medical_routes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            turns_answered: self.turns_answered.load(Ordering::Relaxed),
            turns_failed: self.turns_failed.load(Ordering::Relaxed),
            medical_routes: self.medical_routes.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// PDF documents ingested since startup.
    pub documents_ingested: u64,
    /// Chunks written to the vector index since startup.
    pub chunks_indexed: u64,
    /// Turns answered by a model.
    pub turns_answered: u64,
    /// Turns that ended in the apology message.
    pub turns_failed: u64,
    /// Turns routed to the medical model.
    pub medical_routes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_ingestion_runs() {
        let metrics = ChatMetrics::new();
        metrics.record_ingestion(2, 40);
        metrics.record_ingestion(1, 3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 3);
        assert_eq!(snapshot.chunks_indexed, 43);
    }

    #[test]
    fn records_turn_outcomes() {
        let metrics = ChatMetrics::new();
        metrics.record_turn(true, false);
        metrics.record_turn(false, true);
        metrics.record_turn(false, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.turns_answered, 2);
        assert_eq!(snapshot.turns_failed, 1);
        assert_eq!(snapshot.medical_routes, 1);
    }

    #[test]
    fn fresh_snapshot_is_zeroed() {
        assert_eq!(ChatMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
