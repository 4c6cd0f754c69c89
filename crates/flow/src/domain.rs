// Archivo: domain.rs
// Propósito: tipos del ciclo de vida de una solicitud (Don), de sus items de
// trabajo (DonThaoTac) y del registro de auditoría por paso.
use chrono::{DateTime, Utc};
use onestop_forms::{FieldData, StepDefinition, StepRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::WorkflowError;

/// Estado global de una solicitud. `Completed`, `Rejected` y `Cancelled`
/// son terminales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Rejected | RequestStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Processing => "PROCESSING",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(RequestStatus::Pending),
            "PROCESSING" => Ok(RequestStatus::Processing),
            "COMPLETED" => Ok(RequestStatus::Completed),
            "REJECTED" => Ok(RequestStatus::Rejected),
            "CANCELLED" => Ok(RequestStatus::Cancelled),
            other => Err(WorkflowError::Validation(format!("estado de solicitud desconocido: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkItemStatus {
    Open,
    Routed,
    Resolved,
}

impl WorkItemStatus {
    /// `Open` y `Routed` cuentan como paso activo.
    pub fn is_active(&self) -> bool {
        !matches!(self, WorkItemStatus::Resolved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemStatus::Open => "OPEN",
            WorkItemStatus::Routed => "ROUTED",
            WorkItemStatus::Resolved => "RESOLVED",
        }
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkItemStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => Ok(WorkItemStatus::Open),
            "ROUTED" => Ok(WorkItemStatus::Routed),
            "RESOLVED" => Ok(WorkItemStatus::Resolved),
            other => Err(WorkflowError::Validation(format!("estado de item desconocido: {}", other))),
        }
    }
}

/// Decisión registrada sobre un item. `None` mientras está pendiente o si
/// fue abandonado por cancelación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    None,
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::None => "NONE",
            Decision::Approved => "APPROVED",
            Decision::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NONE" => Ok(Decision::None),
            "APPROVED" => Ok(Decision::Approved),
            "REJECTED" => Ok(Decision::Rejected),
            other => Err(WorkflowError::Validation(format!("decisión desconocida: {}", other))),
        }
    }
}

/// Veredicto que un actor puede aplicar sobre un paso activo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl From<Verdict> for Decision {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Approved => Decision::Approved,
            Verdict::Rejected => Decision::Rejected,
        }
    }
}

/// Solicitud enviada contra una plantilla.
///
/// El proceso se copia al enviar (`process`): las ediciones posteriores de la
/// plantilla no alteran solicitudes en curso. `version` crece en cada
/// transición confirmada y sirve para el control optimista.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub template_id: Uuid,
    pub template_name: String,
    pub template_revision: String,
    pub submitter_id: String,
    pub field_data: FieldData,
    pub process: Vec<StepDefinition>,
    pub overall_status: RequestStatus,
    pub current_step_index: u32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn is_terminal(&self) -> bool {
        self.overall_status.is_terminal()
    }

    /// Paso del proceso apuntado por `current_step_index`, si queda alguno.
    pub fn current_step(&self) -> Option<&StepDefinition> {
        self.process.get(self.current_step_index as usize)
    }

    pub fn has_more_steps(&self) -> bool {
        (self.current_step_index as usize) < self.process.len()
    }
}

/// Unidad de trabajo: un paso activo o resuelto de una solicitud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub request_id: Uuid,
    pub template_id: Uuid,
    pub step_index: u32,
    pub assigned_role: StepRole,
    pub assigned_actor_id: Option<String>,
    pub status: WorkItemStatus,
    pub decision: Decision,
    pub attachments: BTreeSet<String>,
    pub routed_by: Option<String>,
    pub routed_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    /// Crea un item `Open` para el paso indicado de la solicitud.
    pub fn open(request: &Request, step: &StepDefinition, now: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4(),
               request_id: request.id,
               template_id: request.template_id,
               step_index: step.step_index,
               assigned_role: step.actor_role,
               assigned_actor_id: None,
               status: WorkItemStatus::Open,
               decision: Decision::None,
               attachments: BTreeSet::new(),
               routed_by: None,
               routed_at: None,
               decided_by: None,
               decided_at: None,
               created_at: now }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Entrada del historial de estados de una solicitud (TrangThaiBuoc).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStatusRecord {
    pub id: Uuid,
    pub request_id: Uuid,
    pub work_item_id: Uuid,
    pub step_index: u32,
    pub actor_role: StepRole,
    pub actor_id: Option<String>,
    pub decision: Decision,
    pub timestamp: DateTime<Utc>,
}

impl StepStatusRecord {
    /// Registro del item ya resuelto.
    pub fn resolved(item: &WorkItem, at: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4(),
               request_id: item.request_id,
               work_item_id: item.id,
               step_index: item.step_index,
               actor_role: item.assigned_role,
               actor_id: item.decided_by.clone(),
               decision: item.decision,
               timestamp: at }
    }
}

/// Conjunto de cambios que se confirma de forma atómica.
///
/// `request` es el estado nuevo; la persistencia lo aplica sólo si la
/// versión almacenada sigue siendo la esperada.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub request: Request,
    pub updated_items: Vec<WorkItem>,
    pub opened_item: Option<WorkItem>,
    pub record: Option<StepStatusRecord>,
}

/// Resultado de confirmar una transición.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistResult {
    Ok { new_version: i64 },
    Conflict,
}

/// Página de resultados (`{ result, total }` de los listados).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub result: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn empty(page: u32, limit: u32) -> Self {
        Self { result: Vec::new(), total: 0, page, limit }
    }

    /// Recorta `items` (ya filtrados y ordenados) a la página pedida.
    pub fn slice(items: Vec<T>, page: u32, limit: u32) -> Self {
        let total = items.len() as u64;
        let offset = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        let result = items.into_iter().skip(offset).take(limit as usize).collect();
        Self { result, total, page, limit }
    }
}
