// Archivo: filter.rs
// Propósito: configuración explícita de filtros y paginación de los
// listados, y las consultas ya resueltas por rol que recibe la persistencia.
use onestop_forms::StepRole;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{Request, RequestStatus, WorkItem, WorkItemStatus};
use crate::errors::{Result, WorkflowError};

/// Filtro de solicitudes. Cada clave es opcional e independiente.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub template_id: Option<Uuid>,
    pub assigned_actor_id: Option<String>,
    pub submitter_id: Option<String>,
}

impl RequestFilter {
    /// Filtro por defecto del panel de administración.
    pub fn admin_default() -> Self {
        Self { status: Some(RequestStatus::Processing), ..Default::default() }
    }

    /// Filtro por defecto de los paneles de coordinador y procesador.
    pub fn staff_default() -> Self {
        Self { status: Some(RequestStatus::Pending), ..Default::default() }
    }

    /// Construye el filtro a partir de un mapa `condition`. Claves
    /// reconocidas: `status`, `templateId`, `assignedActorId`, `submitterId`.
    /// Cualquier otra clave o un valor mal tipado es `Validation`.
    pub fn from_condition(condition: &Map<String, JsonValue>) -> Result<Self> {
        let mut f = RequestFilter::default();
        for (key, value) in condition {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "status" => f.status = Some(as_str(key, value)?.parse()?),
                "templateId" => f.template_id = Some(parse_uuid(key, value)?),
                "assignedActorId" => f.assigned_actor_id = Some(as_str(key, value)?.to_string()),
                "submitterId" => f.submitter_id = Some(as_str(key, value)?.to_string()),
                other => return Err(WorkflowError::Validation(format!("clave de filtro desconocida: {}", other))),
            }
        }
        Ok(f)
    }
}

/// Filtro de items de trabajo para los paneles del personal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkItemFilter {
    pub status: Option<WorkItemStatus>,
    pub template_id: Option<Uuid>,
    pub assigned_actor_id: Option<String>,
    pub assigned_role: Option<StepRole>,
}

impl WorkItemFilter {
    /// Igual que `RequestFilter::from_condition`, con claves `status`,
    /// `templateId`, `assignedActorId` y `assignedRole`.
    pub fn from_condition(condition: &Map<String, JsonValue>) -> Result<Self> {
        let mut f = WorkItemFilter::default();
        for (key, value) in condition {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "status" => f.status = Some(as_str(key, value)?.parse()?),
                "templateId" => f.template_id = Some(parse_uuid(key, value)?),
                "assignedActorId" => f.assigned_actor_id = Some(as_str(key, value)?.to_string()),
                "assignedRole" => f.assigned_role = Some(as_str(key, value)?.parse()?),
                other => return Err(WorkflowError::Validation(format!("clave de filtro desconocida: {}", other))),
            }
        }
        Ok(f)
    }
}

fn as_str<'a>(key: &str, value: &'a JsonValue) -> Result<&'a str> {
    value.as_str()
         .ok_or_else(|| WorkflowError::Validation(format!("'{}' debe ser texto", key)))
}

fn parse_uuid(key: &str, value: &JsonValue) -> Result<Uuid> {
    Uuid::parse_str(as_str(key, value)?).map_err(|e| WorkflowError::Validation(format!("'{}' no es un UUID: {}", key, e)))
}

/// Parámetros de paginación: `page` empieza en 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn validate(&self, config: &EngineConfig) -> Result<()> {
        if self.page < 1 {
            return Err(WorkflowError::Validation("page empieza en 1".into()));
        }
        if self.limit == 0 || self.limit > config.max_page_size {
            return Err(WorkflowError::Validation(format!("limit debe estar entre 1 y {}", config.max_page_size)));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.limit as u64
    }
}

/// Consulta de solicitudes ya resuelta según el rol del lector.
///
/// `coordinator_queue` restringe a solicitudes cuyo item activo es de rol
/// coordinador, o de rol procesador aún sin asignar. `active_actor_id`
/// restringe al item activo asignado a ese actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestQuery {
    pub submitter_id: Option<String>,
    pub status: Option<RequestStatus>,
    pub template_id: Option<Uuid>,
    pub coordinator_queue: bool,
    pub active_actor_id: Option<String>,
    pub page: PageRequest,
}

impl RequestQuery {
    pub fn matches(&self, request: &Request, active: Option<&WorkItem>) -> bool {
        if let Some(s) = &self.submitter_id {
            if &request.submitter_id != s {
                return false;
            }
        }
        if let Some(status) = self.status {
            if request.overall_status != status {
                return false;
            }
        }
        if let Some(t) = self.template_id {
            if request.template_id != t {
                return false;
            }
        }
        if self.coordinator_queue && !active.map(in_coordinator_queue).unwrap_or(false) {
            return false;
        }
        if let Some(actor) = &self.active_actor_id {
            if active.and_then(|w| w.assigned_actor_id.as_ref()) != Some(actor) {
                return false;
            }
        }
        true
    }
}

/// Items visibles en la cola del coordinador.
pub fn in_coordinator_queue(item: &WorkItem) -> bool {
    match item.assigned_role {
        StepRole::Coordinator => true,
        StepRole::Processor => item.status == WorkItemStatus::Open,
    }
}

/// Consulta de items de trabajo ya resuelta según el rol del lector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItemQuery {
    pub coordinator_queue: bool,
    pub assigned_role: Option<StepRole>,
    pub assigned_actor_id: Option<String>,
    pub status: Option<WorkItemStatus>,
    pub template_id: Option<Uuid>,
    pub page: PageRequest,
}

impl WorkItemQuery {
    pub fn matches(&self, item: &WorkItem) -> bool {
        if self.coordinator_queue && !in_coordinator_queue(item) {
            return false;
        }
        if let Some(role) = self.assigned_role {
            if item.assigned_role != role {
                return false;
            }
        }
        if let Some(actor) = &self.assigned_actor_id {
            if item.assigned_actor_id.as_ref() != Some(actor) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        if let Some(t) = self.template_id {
            if item.template_id != t {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn condition_with_known_keys() {
        let id = Uuid::new_v4();
        let cond = json!({"status": "processing", "templateId": id.to_string(), "submitterId": "sv01", "assignedActorId": null});
        let f = RequestFilter::from_condition(cond.as_object().unwrap()).unwrap();
        assert_eq!(f.status, Some(RequestStatus::Processing));
        assert_eq!(f.template_id, Some(id));
        assert_eq!(f.submitter_id.as_deref(), Some("sv01"));
        assert_eq!(f.assigned_actor_id, None);
    }

    #[test]
    fn condition_rejects_unknown_or_mistyped_keys() {
        let unknown = json!({"thongTinDichVu._id": "x"});
        assert!(matches!(RequestFilter::from_condition(unknown.as_object().unwrap()),
                         Err(WorkflowError::Validation(_))));
        let bad_uuid = json!({"templateId": "not-a-uuid"});
        assert!(RequestFilter::from_condition(bad_uuid.as_object().unwrap()).is_err());
        let bad_status = json!({"status": 3});
        assert!(RequestFilter::from_condition(bad_status.as_object().unwrap()).is_err());
        let item_role = json!({"assignedRole": "processor", "status": "open"});
        let wf = WorkItemFilter::from_condition(item_role.as_object().unwrap()).unwrap();
        assert_eq!(wf.assigned_role, Some(StepRole::Processor));
        assert_eq!(wf.status, Some(WorkItemStatus::Open));
    }

    #[test]
    fn page_request_bounds() {
        let cfg = EngineConfig::default();
        assert!(PageRequest::new(0, 10).validate(&cfg).is_err());
        assert!(PageRequest::new(1, 0).validate(&cfg).is_err());
        assert!(PageRequest::new(1, cfg.max_page_size + 1).validate(&cfg).is_err());
        let p = PageRequest::new(3, 10);
        assert!(p.validate(&cfg).is_ok());
        assert_eq!(p.offset(), 20);
    }
}
