// Archivo: engine.rs
// Propósito: Step Decision Engine. Aplica la decisión de un rol sobre el item
// activo, recalcula el estado de la solicitud y avanza o termina el flujo.
//
// Los pasos de una decisión (resolver el item, registrar el estado, cambiar
// la solicitud y abrir el siguiente paso) se confirman como una sola
// `Transition`.
use chrono::Utc;
use onestop_forms::StepRole;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::actor::{Actor, Role};
use crate::config::EngineConfig;
use crate::domain::{Decision, PersistResult, Request, RequestStatus, StepStatusRecord, Transition, Verdict, WorkItem,
                    WorkItemStatus};
use crate::errors::{Result, WorkflowError};
use crate::repository::{RequestSnapshot, WorkflowRepository};
use crate::router::{open_next_step, single_active};

/// Resultado de una decisión confirmada.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub request: Request,
    pub resolved: WorkItem,
    pub opened: Option<WorkItem>,
    pub record: StepStatusRecord,
}

/// Comprueba que `actor` puede decidir `item`.
///
/// - Item `Routed`: sólo el actor asignado.
/// - Item `Open` de rol coordinador: cualquier coordinador.
/// - Item `Open` de rol procesador: nadie hasta que se asigne.
pub fn authorize_decision(item: &WorkItem, actor: &Actor) -> Result<()> {
    match (item.status, item.assigned_role) {
        (WorkItemStatus::Routed, _) => {
            if item.assigned_actor_id.as_deref() == Some(actor.id.as_str()) {
                Ok(())
            } else {
                Err(WorkflowError::Forbidden(format!("el item {} está asignado a {}, no a {}",
                                                     item.id,
                                                     item.assigned_actor_id.as_deref().unwrap_or("-"),
                                                     actor.id)))
            }
        }
        (WorkItemStatus::Open, StepRole::Coordinator) => actor.require(Role::Coordinator),
        (WorkItemStatus::Open, StepRole::Processor) => {
            Err(WorkflowError::Forbidden(format!("el item {} debe asignarse a un procesador antes de decidir", item.id)))
        }
        (WorkItemStatus::Resolved, _) => Err(WorkflowError::InvalidState(format!("el item {} ya está resuelto", item.id))),
    }
}

/// Valida y normaliza las URLs adjuntas (http/https, sin duplicados).
pub fn normalize_attachments(attachments: &[String], max: usize) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for raw in attachments {
        let parsed = url::Url::parse(raw.trim()).map_err(|e| {
                                                     WorkflowError::Validation(format!("adjunto inválido '{}': {}", raw, e))
                                                 })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(WorkflowError::Validation(format!("adjunto con esquema no admitido: {}", raw)));
        }
        out.insert(parsed.to_string());
    }
    if out.len() > max {
        return Err(WorkflowError::Validation(format!("demasiados adjuntos: {} (máximo {})", out.len(), max)));
    }
    Ok(out)
}

/// Motor de decisiones sobre pasos.
pub struct StepDecisionEngine<R>
    where R: WorkflowRepository
{
    repo: Arc<R>,
    config: EngineConfig,
}

impl<R> StepDecisionEngine<R> where R: WorkflowRepository
{
    pub fn new(repo: Arc<R>, config: EngineConfig) -> Self {
        Self { repo, config }
    }

    /// Aplica `verdict` sobre el item `work_item_id` en nombre de `actor`.
    ///
    /// El llamador debe serializar las escrituras sobre la solicitud. Si otro
    /// proceso decidió el item antes, devuelve `InvalidState`; si confirmó
    /// otra transición entre la lectura y la escritura, `Conflict`.
    pub fn decide(&self,
                  work_item_id: &Uuid,
                  actor: &Actor,
                  verdict: Verdict,
                  attachments: &[String])
                  -> Result<DecisionOutcome> {
        // El item sólo aporta la solicitud; el estado se comprueba sobre una
        // lectura coherente de la solicitud completa.
        let request_id = self.repo.get_work_item(work_item_id)?.request_id;
        let snapshot = self.repo.request_snapshot(&request_id)?;
        let item = match snapshot.item(work_item_id) {
            Some(w) => w.clone(),
            None => {
                let msg = format!("el item {} no figura entre los items de la solicitud {}", work_item_id, request_id);
                log::error!("{}", msg);
                return Err(WorkflowError::InternalInconsistency(msg));
            }
        };
        let RequestSnapshot { request, items, .. } = snapshot;
        if item.status == WorkItemStatus::Resolved {
            return Err(WorkflowError::InvalidState(format!("el item {} ya fue decidido ({})", item.id, item.decision)));
        }
        if request.is_terminal() {
            return Err(WorkflowError::InvalidState(format!("la solicitud {} ya está en estado {}",
                                                           request.id, request.overall_status)));
        }
        authorize_decision(&item, actor)?;
        let attachments = normalize_attachments(attachments, self.config.max_attachments)?;

        match single_active(&request.id, &items)? {
            Some(active) if active.id == item.id => {}
            other => {
                let msg = format!("el item {} no es el paso activo de la solicitud {} (activo: {:?})",
                                  item.id,
                                  request.id,
                                  other.map(|w| w.id));
                log::error!("{}", msg);
                return Err(WorkflowError::InternalInconsistency(msg));
            }
        }
        if item.step_index != request.current_step_index {
            let msg = format!("el item {} es del paso {} pero la solicitud {} está en el paso {}",
                              item.id, item.step_index, request.id, request.current_step_index);
            log::error!("{}", msg);
            return Err(WorkflowError::InternalInconsistency(msg));
        }

        let now = Utc::now();
        let mut resolved = item;
        resolved.status = WorkItemStatus::Resolved;
        resolved.decision = verdict.into();
        resolved.decided_by = Some(actor.id.clone());
        resolved.decided_at = Some(now);
        resolved.attachments = attachments;
        let record = StepStatusRecord::resolved(&resolved, now);

        let expected_version = request.version;
        let mut next = request;
        next.updated_at = now;
        let opened = match verdict {
            Verdict::Rejected => {
                next.overall_status = RequestStatus::Rejected;
                None
            }
            Verdict::Approved => {
                next.current_step_index += 1;
                if next.has_more_steps() {
                    next.overall_status = RequestStatus::Processing;
                }
                let still_active: Vec<&WorkItem> =
                    items.iter().filter(|w| w.is_active() && w.id != resolved.id).collect();
                open_next_step(&mut next, &still_active, now)?
            }
        };

        let transition = Transition { request: next,
                                      updated_items: vec![resolved.clone()],
                                      opened_item: opened.clone(),
                                      record: Some(record.clone()) };
        match self.repo.commit(&transition, expected_version)? {
            PersistResult::Ok { new_version } => {
                let mut request = transition.request;
                request.version = new_version;
                log::info!("item {} (solicitud {}, paso {}) decidido {} por {}; solicitud {} [v{}]",
                           resolved.id,
                           request.id,
                           resolved.step_index,
                           resolved.decision,
                           actor.id,
                           request.overall_status,
                           new_version);
                Ok(DecisionOutcome { request, resolved, opened, record })
            }
            PersistResult::Conflict => {
                log::warn!("conflicto al decidir el item {} (solicitud {})", resolved.id, resolved.request_id);
                Err(WorkflowError::Conflict(format!("la solicitud {} cambió durante la decisión", resolved.request_id)))
            }
        }
    }

    /// Cancela la solicitud abandonando su paso activo. Permitido al
    /// solicitante dueño y a un administrador mientras la solicitud no sea
    /// terminal.
    pub fn cancel(&self, request_id: &Uuid, actor: &Actor) -> Result<Request> {
        let RequestSnapshot { request, items, .. } = self.repo.request_snapshot(request_id)?;
        let is_owner = actor.has_role(Role::Submitter) && actor.id == request.submitter_id;
        if !is_owner && !actor.has_role(Role::Admin) {
            return Err(WorkflowError::Forbidden(format!("el actor {} no puede cancelar la solicitud {}",
                                                        actor.id, request.id)));
        }
        if request.is_terminal() {
            return Err(WorkflowError::InvalidState(format!("la solicitud {} ya está en estado {}",
                                                           request.id, request.overall_status)));
        }
        let active = match single_active(&request.id, &items)? {
            Some(w) => w,
            None => {
                let msg = format!("la solicitud {} no es terminal pero no tiene paso activo", request.id);
                log::error!("{}", msg);
                return Err(WorkflowError::InternalInconsistency(msg));
            }
        };

        let now = Utc::now();
        let mut abandoned = active;
        abandoned.status = WorkItemStatus::Resolved;
        abandoned.decision = Decision::None;
        abandoned.decided_by = Some(actor.id.clone());
        abandoned.decided_at = Some(now);
        let record = StepStatusRecord::resolved(&abandoned, now);

        let expected_version = request.version;
        let mut next = request;
        next.overall_status = RequestStatus::Cancelled;
        next.updated_at = now;
        let transition = Transition { request: next,
                                      updated_items: vec![abandoned],
                                      opened_item: None,
                                      record: Some(record) };
        match self.repo.commit(&transition, expected_version)? {
            PersistResult::Ok { new_version } => {
                let mut request = transition.request;
                request.version = new_version;
                log::info!("solicitud {} cancelada por {} [v{}]", request.id, actor.id, new_version);
                Ok(request)
            }
            PersistResult::Conflict => {
                log::warn!("conflicto al cancelar la solicitud {}", request_id);
                Err(WorkflowError::Conflict(format!("la solicitud {} cambió durante la cancelación", request_id)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachments_are_deduplicated_and_checked() {
        let urls = vec!["https://files.example.org/a.pdf".to_string(),
                        "https://files.example.org/a.pdf".to_string(),
                        "http://files.example.org/b.png".to_string()];
        let out = normalize_attachments(&urls, 5).unwrap();
        assert_eq!(out.len(), 2);
        assert!(normalize_attachments(&["file:///etc/passwd".to_string()], 5).is_err());
        assert!(normalize_attachments(&["not a url".to_string()], 5).is_err());
        assert!(normalize_attachments(&urls, 1).is_err());
    }
}
