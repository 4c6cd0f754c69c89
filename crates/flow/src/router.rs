// Archivo: router.rs
// Propósito: Work-Item Router. Mantiene la invariante de un único paso activo
// por solicitud y gestiona la asignación coordinador -> procesador.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::actor::{Actor, Role};
use crate::domain::{PersistResult, Request, RequestStatus, Transition, WorkItem, WorkItemStatus};
use crate::errors::{Result, WorkflowError};
use crate::repository::WorkflowRepository;

/// Abre el paso apuntado por `request.current_step_index`.
///
/// `still_active` son los items de la solicitud que seguirán activos después
/// de la transición en curso (en `decide`, los activos distintos del item que
/// se resuelve); si no está vacío falla con `InternalInconsistency`. `commit`
/// vuelve a comprobar la invariante contra el estado almacenado. Si no quedan
/// pasos, marca la solicitud como `Completed` y devuelve `None`.
pub fn open_next_step(request: &mut Request, still_active: &[&WorkItem], now: DateTime<Utc>) -> Result<Option<WorkItem>> {
    if let Some(active) = still_active.first() {
        let msg = format!("open_next_step sobre la solicitud {} con el item {} todavía activo (paso {})",
                          request.id, active.id, active.step_index);
        log::error!("{}", msg);
        return Err(WorkflowError::InternalInconsistency(msg));
    }
    if request.is_terminal() {
        return Err(WorkflowError::InvalidState(format!("la solicitud {} ya está en estado {}",
                                                       request.id, request.overall_status)));
    }
    let opened = request.current_step().map(|step| WorkItem::open(request, step, now));
    if opened.is_none() {
        request.overall_status = RequestStatus::Completed;
        request.updated_at = now;
        log::info!("solicitud {} completada", request.id);
    }
    Ok(opened)
}

/// Devuelve el único item activo de la lista, `None` si no hay ninguno e
/// `InternalInconsistency` si hay más de uno.
pub fn single_active(request_id: &Uuid, items: &[WorkItem]) -> Result<Option<WorkItem>> {
    let mut active = items.iter().filter(|w| w.is_active());
    let first = active.next().cloned();
    if let Some(second) = active.next() {
        let msg = format!("la solicitud {} tiene más de un item activo ({} y {})",
                          request_id,
                          first.as_ref().map(|w| w.id.to_string()).unwrap_or_default(),
                          second.id);
        log::error!("{}", msg);
        return Err(WorkflowError::InternalInconsistency(msg));
    }
    Ok(first)
}

/// Router de items de trabajo.
pub struct WorkItemRouter<R>
    where R: WorkflowRepository
{
    repo: Arc<R>,
}

impl<R> WorkItemRouter<R> where R: WorkflowRepository
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Asigna el item `work_item_id` (en estado `Open`) al actor
    /// `assignee_id`. Sólo un coordinador puede asignar. No resuelve el paso:
    /// lo deja en `Routed` a la espera de la decisión del asignado.
    ///
    /// El llamador debe serializar las escrituras sobre la solicitud.
    pub fn route(&self, work_item_id: &Uuid, coordinator: &Actor, assignee_id: &str) -> Result<WorkItem> {
        coordinator.require(Role::Coordinator)?;
        if assignee_id.trim().is_empty() {
            return Err(WorkflowError::Validation("el actor asignado no puede estar vacío".into()));
        }
        let request_id = self.repo.get_work_item(work_item_id)?.request_id;
        let snapshot = self.repo.request_snapshot(&request_id)?;
        let item = snapshot.item(work_item_id)
                           .cloned()
                           .ok_or_else(|| WorkflowError::NotFound(format!("item de trabajo {}", work_item_id)))?;
        let request = snapshot.request;
        if request.is_terminal() {
            return Err(WorkflowError::InvalidState(format!("la solicitud {} ya está en estado {}",
                                                           request.id, request.overall_status)));
        }
        if item.status != WorkItemStatus::Open {
            return Err(WorkflowError::InvalidState(format!("el item {} está en estado {} y no puede asignarse",
                                                           item.id, item.status)));
        }

        let now = Utc::now();
        let mut routed = item;
        routed.assigned_actor_id = Some(assignee_id.to_string());
        routed.status = WorkItemStatus::Routed;
        routed.routed_by = Some(coordinator.id.clone());
        routed.routed_at = Some(now);

        let expected_version = request.version;
        let mut next = request;
        next.updated_at = now;
        let transition = Transition { request: next,
                                      updated_items: vec![routed.clone()],
                                      opened_item: None,
                                      record: None };
        match self.repo.commit(&transition, expected_version)? {
            PersistResult::Ok { new_version } => {
                log::info!("item {} (solicitud {}, paso {}) asignado a {} por {} [v{}]",
                           routed.id,
                           routed.request_id,
                           routed.step_index,
                           assignee_id,
                           coordinator.id,
                           new_version);
                Ok(routed)
            }
            PersistResult::Conflict => {
                log::warn!("conflicto al asignar el item {} (solicitud {})", routed.id, routed.request_id);
                Err(WorkflowError::Conflict(format!("la solicitud {} cambió durante la asignación", routed.request_id)))
            }
        }
    }
}
