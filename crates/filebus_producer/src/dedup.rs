use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory set of file names with a handling sequence currently in flight.
///
/// Admission is the only serialization point between concurrent notifications:
/// a name is admitted exactly once until its [`Admission`] is dropped. Nothing
/// persists across restarts.
#[derive(Debug, Default)]
pub struct DedupGuard {
    inflight: Mutex<HashSet<String>>,
}

impl DedupGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attempts to admit a file name. Returns `None` when a handling sequence
    /// for the same name is already in flight.
    pub fn admit(self: &Arc<Self>, file_name: &str) -> Option<Admission> {
        let mut inflight = self.lock();
        if inflight.insert(file_name.to_string()) {
            Some(Admission {
                guard: Arc::clone(self),
                file_name: file_name.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_inflight(&self, file_name: &str) -> bool {
        self.lock().contains(file_name)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds the guard entry for one handling sequence. Dropping it releases the
/// entry unconditionally, on success and on every failure path alike, so the
/// same name can be retried on a later notification.
#[derive(Debug)]
pub struct Admission {
    guard: Arc<DedupGuard>,
    file_name: String,
}

impl Admission {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.guard.lock().remove(&self.file_name);
    }
}
