// Archivo: stubs.rs
// Propósito: implementación en memoria de `WorkflowRepository` para pruebas y
// wiring rápido. No es durable.
use crate::domain::{Page, PersistResult, Request, StepStatusRecord, Transition, WorkItem};
use crate::errors::{Result, WorkflowError};
use crate::filter::{RequestQuery, WorkItemQuery};
use crate::repository::{active_after_commit, RequestSnapshot, WorkflowRepository};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Repositorio en memoria. Las tablas se bloquean siempre en el mismo orden
/// (solicitudes, items, registros) para que `commit` sea atómico frente a
/// lectores concurrentes.
pub struct InMemoryWorkflowRepository {
    /// Solicitudes indexadas por id.
    requests: Mutex<HashMap<Uuid, Request>>,
    /// Items de trabajo indexados por id.
    work_items: Mutex<HashMap<Uuid, WorkItem>>,
    /// Registros de estado por solicitud, en orden de inserción.
    records: Mutex<HashMap<Uuid, Vec<StepStatusRecord>>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self { requests: Mutex::new(HashMap::new()),
               work_items: Mutex::new(HashMap::new()),
               records: Mutex::new(HashMap::new()) }
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `WorkflowError::Storage`.
    fn lock<'a, T>(&'a self, m: &'a Mutex<T>) -> std::result::Result<MutexGuard<'a, T>, WorkflowError> {
        m.lock().map_err(|e| WorkflowError::Storage(format!("mutex poisoned: {:?}", e)))
    }
}

impl Default for InMemoryWorkflowRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn items_of(items: &HashMap<Uuid, WorkItem>, request_id: &Uuid) -> Vec<WorkItem> {
    let mut out: Vec<WorkItem> = items.values().filter(|w| &w.request_id == request_id).cloned().collect();
    out.sort_by(|a, b| a.step_index.cmp(&b.step_index).then_with(|| a.created_at.cmp(&b.created_at)));
    out
}

fn newest_first_requests(list: &mut [Request]) {
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

fn newest_first_items(list: &mut [WorkItem]) {
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    fn create_request(&self, request: &Request, first_item: &WorkItem) -> Result<()> {
        let mut requests = self.lock(&self.requests)?;
        let mut items = self.lock(&self.work_items)?;
        if requests.contains_key(&request.id) {
            return Err(WorkflowError::Conflict(format!("la solicitud {} ya existe", request.id)));
        }
        if first_item.request_id != request.id {
            return Err(WorkflowError::InternalInconsistency(format!("el item {} no pertenece a la solicitud {}",
                                                                    first_item.id, request.id)));
        }
        requests.insert(request.id, request.clone());
        items.insert(first_item.id, first_item.clone());
        Ok(())
    }

    fn get_request(&self, request_id: &Uuid) -> Result<Request> {
        let requests = self.lock(&self.requests)?;
        requests.get(request_id)
                .cloned()
                .ok_or(WorkflowError::NotFound(format!("solicitud {}", request_id)))
    }

    fn get_work_item(&self, work_item_id: &Uuid) -> Result<WorkItem> {
        let items = self.lock(&self.work_items)?;
        items.get(work_item_id)
             .cloned()
             .ok_or(WorkflowError::NotFound(format!("item de trabajo {}", work_item_id)))
    }

    fn work_items_for(&self, request_id: &Uuid) -> Result<Vec<WorkItem>> {
        let items = self.lock(&self.work_items)?;
        Ok(items_of(&items, request_id))
    }

    fn records_for(&self, request_id: &Uuid) -> Result<Vec<StepStatusRecord>> {
        let records = self.lock(&self.records)?;
        Ok(records.get(request_id).cloned().unwrap_or_default())
    }

    /// Toma los tres cerrojos en el mismo orden que `commit`.
    fn request_snapshot(&self, request_id: &Uuid) -> Result<RequestSnapshot> {
        let requests = self.lock(&self.requests)?;
        let items = self.lock(&self.work_items)?;
        let records = self.lock(&self.records)?;
        let request = requests.get(request_id)
                              .cloned()
                              .ok_or(WorkflowError::NotFound(format!("solicitud {}", request_id)))?;
        Ok(RequestSnapshot { request,
                             items: items_of(&items, request_id),
                             records: records.get(request_id).cloned().unwrap_or_default() })
    }

    /// Aplica la transición con control optimista por `expected_version`.
    fn commit(&self, transition: &Transition, expected_version: i64) -> Result<PersistResult> {
        let mut requests = self.lock(&self.requests)?;
        let mut items = self.lock(&self.work_items)?;
        let mut records = self.lock(&self.records)?;

        let request_id = transition.request.id;
        let stored = requests.get(&request_id)
                             .ok_or(WorkflowError::NotFound(format!("solicitud {}", request_id)))?;
        if stored.version != expected_version {
            return Ok(PersistResult::Conflict);
        }

        for updated in &transition.updated_items {
            match items.get(&updated.id) {
                Some(w) if w.request_id == request_id => {}
                _ => {
                    return Err(WorkflowError::InternalInconsistency(format!("el item {} no pertenece a la solicitud {}",
                                                                            updated.id, request_id)))
                }
            }
        }
        let active = active_after_commit(items.values().filter(|w| w.request_id == request_id), transition);
        if active > 1 {
            return Err(WorkflowError::InternalInconsistency(format!("la solicitud {} quedaría con {} pasos activos",
                                                                    request_id, active)));
        }

        let new_version = expected_version + 1;
        let mut request = transition.request.clone();
        request.version = new_version;
        requests.insert(request_id, request);
        for updated in &transition.updated_items {
            items.insert(updated.id, updated.clone());
        }
        if let Some(opened) = &transition.opened_item {
            items.insert(opened.id, opened.clone());
        }
        if let Some(record) = &transition.record {
            records.entry(request_id).or_default().push(record.clone());
        }
        Ok(PersistResult::Ok { new_version })
    }

    fn list_requests(&self, query: &RequestQuery) -> Result<Page<Request>> {
        let requests = self.lock(&self.requests)?;
        let items = self.lock(&self.work_items)?;
        let mut active: HashMap<Uuid, &WorkItem> = HashMap::new();
        for w in items.values().filter(|w| w.is_active()) {
            active.insert(w.request_id, w);
        }
        let mut matched: Vec<Request> = requests.values()
                                                .filter(|r| query.matches(r, active.get(&r.id).copied()))
                                                .cloned()
                                                .collect();
        newest_first_requests(&mut matched);
        Ok(Page::slice(matched, query.page.page, query.page.limit))
    }

    fn list_work_items(&self, query: &WorkItemQuery) -> Result<Page<WorkItem>> {
        let items = self.lock(&self.work_items)?;
        let mut matched: Vec<WorkItem> = items.values().filter(|w| query.matches(w)).cloned().collect();
        newest_first_items(&mut matched);
        Ok(Page::slice(matched, query.page.page, query.page.limit))
    }
}
