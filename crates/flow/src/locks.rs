// Archivo: locks.rs
// Propósito: cerrojos por solicitud. `route`, `decide` y `cancel` sobre una
// misma solicitud se serializan; solicitudes distintas no se bloquean entre sí.
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::errors::{Result, WorkflowError};

#[derive(Default)]
pub struct RequestLocks {
    inner: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutex asociado a `request_id` (se crea la primera vez).
    pub fn handle(&self, request_id: &Uuid) -> Arc<Mutex<()>> {
        self.inner.entry(*request_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Número de solicitudes con cerrojo creado.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Libera la entrada de una solicitud terminal. Un hilo que aún tenga el
    /// `Arc` sigue usando su copia.
    pub fn forget(&self, request_id: &Uuid) {
        self.inner.remove(request_id);
    }
}

/// Toma el mutex; un cerrojo envenenado se reporta como `Storage`.
pub fn acquire(handle: &Mutex<()>) -> Result<MutexGuard<'_, ()>> {
    handle.lock().map_err(|e| WorkflowError::Storage(format!("cerrojo de solicitud envenenado: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_request_shares_one_mutex() {
        let locks = RequestLocks::new();
        let id = Uuid::new_v4();
        let a = locks.handle(&id);
        let b = locks.handle(&id);
        assert!(Arc::ptr_eq(&a, &b));
        let other = locks.handle(&Uuid::new_v4());
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(locks.len(), 2);
        locks.forget(&id);
        assert_eq!(locks.len(), 1);
    }
}
