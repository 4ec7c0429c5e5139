//! Process-wide record of every distinct label observed since startup.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Append-only set of detected labels, shared by all stream sessions and
/// single-shot requests. The set never shrinks and never holds duplicates;
/// it is rebuilt empty on every process start.
#[derive(Clone, Default)]
pub struct DetectionLog {
    inner: Arc<RwLock<HashSet<String>>>,
}

impl DetectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `labels` into the shared set.
    ///
    /// Safe under concurrent writers; a poisoned lock is recovered so a
    /// panicked writer cannot make the log unreachable.
    pub fn add_labels<I>(&self, labels: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.extend(labels);
    }

    /// Independent copy of the current contents.
    pub fn snapshot(&self) -> HashSet<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn add_labels_is_idempotent() {
        let log = DetectionLog::new();
        log.add_labels(["cat".to_string()]);
        log.add_labels(["cat".to_string()]);
        assert_eq!(log.snapshot().len(), 1);
    }

    #[test]
    fn snapshot_is_independent_of_later_writes() {
        let log = DetectionLog::new();
        log.add_labels(["cat".to_string()]);
        let snapshot = log.snapshot();
        log.add_labels(["dog".to_string()]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.snapshot().len(), 2);
    }

    #[test]
    fn concurrent_overlapping_writers_produce_the_union() {
        let log = DetectionLog::new();

        let mut handles = Vec::new();
        for writer in 0..8 {
            let log = log.clone();
            handles.push(thread::spawn(move || {
                for round in 0..100 {
                    // Overlapping sets: "shared" appears in every write.
                    log.add_labels([
                        "shared".to_string(),
                        format!("writer-{writer}"),
                        format!("round-{}", round % 10),
                    ]);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 1 + 8 + 10);
        assert!(snapshot.contains("shared"));
        for writer in 0..8 {
            assert!(snapshot.contains(&format!("writer-{writer}")));
        }
    }
}
