// Archivo: repository.rs
// Propósito: definir el trait `WorkflowRepository`, el contrato que deben
// cumplir las persistencias (en memoria, Diesel/SQLite, Diesel/Postgres).
use crate::domain::{Page, PersistResult, Request, StepStatusRecord, Transition, WorkItem};
use crate::errors::Result;
use crate::filter::{RequestQuery, WorkItemQuery};
use uuid::Uuid;

/// Lectura coherente de una solicitud: cabecera, items y registros tomados
/// del mismo estado confirmado.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSnapshot {
    pub request: Request,
    /// Ordenados por `step_index` (y creación).
    pub items: Vec<WorkItem>,
    /// En orden de inserción.
    pub records: Vec<StepStatusRecord>,
}

impl RequestSnapshot {
    pub fn item(&self, work_item_id: &Uuid) -> Option<&WorkItem> {
        self.items.iter().find(|w| &w.id == work_item_id)
    }
}

/// Contrato de persistencia de solicitudes, items de trabajo y registros de
/// estado.
///
/// Las escrituras son atómicas: una solicitud nueva se guarda junto con su
/// primer item, y una `Transition` se aplica completa o no se aplica.
pub trait WorkflowRepository: Send + Sync {
    /// Inserta una solicitud recién enviada y su primer item activo.
    fn create_request(&self, request: &Request, first_item: &WorkItem) -> Result<()>;

    /// Obtiene una solicitud; `NotFound` si no existe.
    fn get_request(&self, request_id: &Uuid) -> Result<Request>;

    /// Obtiene un item de trabajo; `NotFound` si no existe.
    fn get_work_item(&self, work_item_id: &Uuid) -> Result<WorkItem>;

    /// Items de la solicitud ordenados por `step_index` (y creación).
    fn work_items_for(&self, request_id: &Uuid) -> Result<Vec<WorkItem>>;

    /// Registros de estado de la solicitud en orden de inserción.
    fn records_for(&self, request_id: &Uuid) -> Result<Vec<StepStatusRecord>>;

    /// Solicitud, items y registros leídos sin que ninguna `commit` pueda
    /// intercalarse entre las tres lecturas. `NotFound` si no existe.
    fn request_snapshot(&self, request_id: &Uuid) -> Result<RequestSnapshot>;

    /// Aplica la transición si la versión almacenada de la solicitud es
    /// `expected_version`. Devuelve `PersistResult::Conflict` en caso
    /// contrario. Si tras aplicarla quedaran dos items activos para la
    /// solicitud, falla con `InternalInconsistency` sin escribir nada.
    fn commit(&self, transition: &Transition, expected_version: i64) -> Result<PersistResult>;

    /// Listado paginado de solicitudes, más recientes primero.
    fn list_requests(&self, query: &RequestQuery) -> Result<Page<Request>>;

    /// Listado paginado de items de trabajo, más recientes primero.
    fn list_work_items(&self, query: &WorkItemQuery) -> Result<Page<WorkItem>>;
}

/// Cuenta los items activos que tendría la solicitud tras aplicar
/// `transition` sobre `existing` (los items almacenados de esa solicitud).
pub fn active_after_commit<'a, I>(existing: I, transition: &Transition) -> usize
    where I: IntoIterator<Item = &'a WorkItem>
{
    let stored = existing.into_iter()
                         .map(|w| transition.updated_items.iter().find(|u| u.id == w.id).unwrap_or(w))
                         .filter(|w| w.is_active())
                         .count();
    stored + transition.opened_item.iter().filter(|w| w.is_active()).count()
}
