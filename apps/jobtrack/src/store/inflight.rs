use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::TrackerError;

/// Keys of mutations currently awaiting the service.
#[derive(Default)]
pub(crate) struct InFlight {
    keys: Arc<Mutex<HashSet<String>>>,
}

/// Releases its key when dropped, whatever the outcome of the call.
pub(crate) struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

fn lock(keys: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InFlight {
    /// Claims `key`, or fails with `InFlight(description)` if it is taken.
    pub(crate) fn acquire(&self, key: String, description: &str) -> Result<InFlightGuard, TrackerError> {
        if !lock(&self.keys).insert(key.clone()) {
            return Err(TrackerError::InFlight(description.to_string()));
        }
        Ok(InFlightGuard {
            keys: Arc::clone(&self.keys),
            key,
        })
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.keys).len()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.keys).remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_fails_until_release() {
        let in_flight = InFlight::default();
        let guard = in_flight.acquire("update:1".into(), "Update job").unwrap();
        assert!(matches!(
            in_flight.acquire("update:1".into(), "Update job"),
            Err(TrackerError::InFlight(_))
        ));
        assert!(in_flight.acquire("update:2".into(), "Update job").is_ok());

        drop(guard);
        assert_eq!(in_flight.len(), 0);
        assert!(in_flight.acquire("update:1".into(), "Update job").is_ok());
    }
}
