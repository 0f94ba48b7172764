//! Storage Adapters
//!
//! Implementations of the `SharedStore` trait, and the probe that picks one
//! at construction.

mod cookie;
mod structured;

pub use cookie::CookieStore;
pub use structured::StructuredStore;

use crate::ports::outbound::SharedStore;
use std::sync::Arc;
use tracing::debug;

/// Check that `store` accepts a benign write/clear cycle on `probe_key`.
#[must_use]
pub fn probe(store: &dyn SharedStore, probe_key: &str) -> bool {
    let result = store
        .write(probe_key, probe_key)
        .and_then(|()| store.clear(probe_key));
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!(
                backend = %store.backend_kind(),
                error = %e,
                "Storage probe failed"
            );
            false
        }
    }
}

/// Pick the preferred store when present and working, otherwise the
/// fallback. The choice is never reported as an error.
pub fn select_backend(
    preferred: Option<Arc<dyn SharedStore>>,
    fallback: Arc<dyn SharedStore>,
    probe_key: &str,
) -> Arc<dyn SharedStore> {
    match preferred {
        Some(store) if probe(store.as_ref(), probe_key) => store,
        Some(_) => {
            debug!(backend = %fallback.backend_kind(), "Preferred storage unusable, falling back");
            fallback
        }
        None => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outbound::BackendKind;

    #[test]
    fn test_probe_leaves_no_trace() {
        let store = StructuredStore::new();
        assert!(probe(&store, "1700000000000"));
        assert_eq!(store.read("1700000000000").unwrap(), None);
    }

    #[test]
    fn test_probe_fails_on_disabled_store() {
        let store = StructuredStore::new();
        store.set_available(false);
        assert!(!probe(&store, "probe"));
    }

    #[test]
    fn test_probe_fails_on_zero_quota() {
        let store = StructuredStore::with_quota(0);
        assert!(!probe(&store, "probe"));
    }

    #[test]
    fn test_select_prefers_structured() {
        let chosen = select_backend(
            Some(Arc::new(StructuredStore::new())),
            Arc::new(CookieStore::in_memory()),
            "probe",
        );
        assert_eq!(chosen.backend_kind(), BackendKind::Structured);
    }

    #[test]
    fn test_select_falls_back_when_unavailable() {
        let preferred = StructuredStore::new();
        preferred.set_available(false);

        let chosen = select_backend(
            Some(Arc::new(preferred)),
            Arc::new(CookieStore::in_memory()),
            "probe",
        );
        assert_eq!(chosen.backend_kind(), BackendKind::CookieJar);
    }

    #[test]
    fn test_select_without_preferred() {
        let chosen = select_backend(None, Arc::new(CookieStore::in_memory()), "probe");
        assert_eq!(chosen.backend_kind(), BackendKind::CookieJar);
        assert!(!chosen.supports_change_notification());
    }
}
