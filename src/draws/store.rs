//! Draw storage seam.
//!
//! Entries are written once per sweep by `prepare_draws` and then only read. The
//! readiness marker is cleared before the precompute pass touches anything and set
//! again when every entry is in place; readers that find no marker (or a marker for
//! the other family) fall back instead of reading a half-built store.

use std::collections::HashMap;
use std::sync::RwLock;

use nalgebra::DMatrix;

use crate::domain::StochasticFamily;
use crate::draws::{DrawKey, Namespace};
use crate::error::AppError;

pub trait DrawStore: Send + Sync {
    /// `Ok(None)` for a missing entry; `Err` only when an entry exists but cannot be read.
    fn get(&self, key: &DrawKey) -> Result<Option<DMatrix<f64>>, AppError>;

    fn put(&self, key: &DrawKey, draws: &DMatrix<f64>) -> Result<(), AppError>;

    /// Remove every entry of a namespace.
    fn purge(&self, namespace: Namespace) -> Result<(), AppError>;

    fn ready_family(&self) -> Result<Option<StochasticFamily>, AppError>;

    fn set_ready(&self, family: Option<StochasticFamily>) -> Result<(), AppError>;

    /// Human-readable location for reports.
    fn describe(&self) -> String;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryDrawStore {
    entries: RwLock<HashMap<DrawKey, DMatrix<f64>>>,
    ready: RwLock<Option<StochasticFamily>>,
}

impl MemoryDrawStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> AppError {
    AppError::config("In-memory draw store lock was poisoned by a panicking writer.")
}

impl DrawStore for MemoryDrawStore {
    fn get(&self, key: &DrawKey) -> Result<Option<DMatrix<f64>>, AppError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &DrawKey, draws: &DMatrix<f64>) -> Result<(), AppError> {
        ensure_finite(key, draws)?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(*key, draws.clone());
        Ok(())
    }

    fn purge(&self, namespace: Namespace) -> Result<(), AppError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.retain(|key, _| key.namespace() != namespace);
        Ok(())
    }

    fn ready_family(&self) -> Result<Option<StochasticFamily>, AppError> {
        Ok(*self.ready.read().map_err(|_| poisoned())?)
    }

    fn set_ready(&self, family: Option<StochasticFamily>) -> Result<(), AppError> {
        *self.ready.write().map_err(|_| poisoned())? = family;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory ({} entries)", self.len())
    }
}

pub(crate) fn ensure_finite(key: &DrawKey, draws: &DMatrix<f64>) -> Result<(), AppError> {
    if draws.iter().any(|v| !v.is_finite()) {
        return Err(AppError::numeric(format!(
            "Refusing to store non-finite draws under {key}."
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip_and_purge() {
        let store = MemoryDrawStore::new();
        let changes = DrawKey::changes(4);
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(store.get(&changes).unwrap().is_none());

        store.put(&changes, &m).unwrap();
        assert_eq!(store.get(&changes).unwrap(), Some(m.clone()));

        let reg = DrawKey::regulator(100, 2, &Default::default()).unwrap();
        store.put(&reg, &m).unwrap();
        store.purge(Namespace::Changes).unwrap();
        assert!(store.get(&changes).unwrap().is_none());
        assert!(store.get(&reg).unwrap().is_some());
    }

    #[test]
    fn readiness_marker() {
        let store = MemoryDrawStore::new();
        assert_eq!(store.ready_family().unwrap(), None);
        store.set_ready(Some(StochasticFamily::Regulator)).unwrap();
        assert_eq!(store.ready_family().unwrap(), Some(StochasticFamily::Regulator));
        store.set_ready(None).unwrap();
        assert_eq!(store.ready_family().unwrap(), None);
    }

    #[test]
    fn non_finite_draws_are_rejected() {
        let store = MemoryDrawStore::new();
        let m = DMatrix::from_row_slice(1, 2, &[1.0, f64::NAN]);
        assert_eq!(store.put(&DrawKey::changes(1), &m).unwrap_err().exit_code(), 4);
    }
}
