// Archivo: projection.rs
// Propósito: Status Projection. Lado de lectura puro: estado actual e
// historial de una solicitud y listados paginados por rol. No guarda caché;
// cada consulta relee el estado confirmado.
use chrono::{DateTime, Utc};
use onestop_forms::StepRole;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::actor::{Actor, Role};
use crate::config::EngineConfig;
use crate::domain::{Decision, Page, Request, StepStatusRecord, WorkItem, WorkItemStatus};
use crate::errors::{Result, WorkflowError};
use crate::filter::{PageRequest, RequestFilter, RequestQuery, WorkItemFilter, WorkItemQuery};
use crate::repository::{RequestSnapshot, WorkflowRepository};
use crate::router::single_active;

/// Paso activo de una solicitud: quién lo tiene y desde cuándo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentStep {
    pub work_item_id: Uuid,
    pub step_index: u32,
    pub step_name: Option<String>,
    pub assigned_role: StepRole,
    pub assigned_actor_id: Option<String>,
    pub status: WorkItemStatus,
    pub since: DateTime<Utc>,
}

/// Vista "estado de mi solicitud".
///
/// `timeline` contiene un registro por paso resuelto y, si la solicitud sigue
/// en curso, una entrada final con decisión `None` para el paso activo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStatusView {
    pub request: Request,
    pub current: Option<CurrentStep>,
    pub timeline: Vec<StepStatusRecord>,
}

pub struct StatusProjection<R>
    where R: WorkflowRepository
{
    repo: Arc<R>,
    config: EngineConfig,
}

impl<R> StatusProjection<R> where R: WorkflowRepository
{
    pub fn new(repo: Arc<R>, config: EngineConfig) -> Self {
        Self { repo, config }
    }

    /// Estado actual e historial de `request_id`. Un lector que sólo es
    /// solicitante únicamente puede ver sus propias solicitudes.
    pub fn request_status(&self, request_id: &Uuid, viewer: &Actor) -> Result<RequestStatusView> {
        let RequestSnapshot { request, items, records } = self.repo.request_snapshot(request_id)?;
        let staff = viewer.has_role(Role::Admin) || viewer.has_role(Role::Coordinator) || viewer.has_role(Role::Processor);
        if !staff && viewer.id != request.submitter_id {
            return Err(WorkflowError::Forbidden(format!("el actor {} no puede ver la solicitud {}", viewer.id, request.id)));
        }
        let active = single_active(&request.id, &items)?;
        let mut timeline = records;
        let current = active.map(|w| {
                                let since = w.routed_at.unwrap_or(w.created_at);
                                timeline.push(StepStatusRecord { id: w.id,
                                                                 request_id: w.request_id,
                                                                 work_item_id: w.id,
                                                                 step_index: w.step_index,
                                                                 actor_role: w.assigned_role,
                                                                 actor_id: w.assigned_actor_id.clone(),
                                                                 decision: Decision::None,
                                                                 timestamp: since });
                                CurrentStep { work_item_id: w.id,
                                              step_index: w.step_index,
                                              step_name: request.process
                                                                .get(w.step_index as usize)
                                                                .and_then(|s| s.name.clone()),
                                              assigned_role: w.assigned_role,
                                              assigned_actor_id: w.assigned_actor_id,
                                              status: w.status,
                                              since }
                            });
        log::debug!("estado de la solicitud {} leído por {}", request.id, viewer.id);
        Ok(RequestStatusView { request, current, timeline })
    }

    /// Listado de solicitudes para el panel de `as_role`.
    ///
    /// - Solicitante: sólo las propias.
    /// - Coordinador: paso activo de rol coordinador, o de rol procesador aún
    ///   sin asignar.
    /// - Procesador: paso activo asignado a él.
    /// - Administrador: todas.
    pub fn list_requests(&self,
                         viewer: &Actor,
                         as_role: Role,
                         filter: &RequestFilter,
                         page: PageRequest)
                         -> Result<Page<Request>> {
        viewer.require(as_role)?;
        page.validate(&self.config)?;
        let mut query = RequestQuery { submitter_id: filter.submitter_id.clone(),
                                       status: filter.status,
                                       template_id: filter.template_id,
                                       coordinator_queue: false,
                                       active_actor_id: filter.assigned_actor_id.clone(),
                                       page };
        match as_role {
            Role::Submitter => {
                if !narrow(&mut query.submitter_id, &viewer.id) {
                    return Ok(Page::empty(page.page, page.limit));
                }
            }
            Role::Coordinator => query.coordinator_queue = true,
            Role::Processor => {
                if !narrow(&mut query.active_actor_id, &viewer.id) {
                    return Ok(Page::empty(page.page, page.limit));
                }
            }
            Role::Admin => {}
        }
        let out = self.repo.list_requests(&query)?;
        log::debug!("{} solicitudes para {} como {}", out.total, viewer.id, as_role);
        Ok(out)
    }

    /// Listado de items de trabajo para los paneles del personal.
    pub fn list_work_items(&self,
                           viewer: &Actor,
                           as_role: Role,
                           filter: &WorkItemFilter,
                           page: PageRequest)
                           -> Result<Page<WorkItem>> {
        viewer.require(as_role)?;
        page.validate(&self.config)?;
        let mut query = WorkItemQuery { coordinator_queue: false,
                                        assigned_role: filter.assigned_role,
                                        assigned_actor_id: filter.assigned_actor_id.clone(),
                                        status: filter.status,
                                        template_id: filter.template_id,
                                        page };
        match as_role {
            Role::Coordinator => query.coordinator_queue = true,
            Role::Processor => {
                if !narrow(&mut query.assigned_actor_id, &viewer.id) {
                    return Ok(Page::empty(page.page, page.limit));
                }
            }
            Role::Admin => {}
            Role::Submitter => {
                return Err(WorkflowError::Forbidden("los solicitantes no tienen panel de items de trabajo".into()))
            }
        }
        self.repo.list_work_items(&query)
    }
}

/// Restringe `slot` a `me`. Devuelve `false` si el filtro pedía otro valor
/// (el resultado sería vacío).
fn narrow(slot: &mut Option<String>, me: &str) -> bool {
    match slot {
        Some(v) if v != me => false,
        _ => {
            *slot = Some(me.to_string());
            true
        }
    }
}
