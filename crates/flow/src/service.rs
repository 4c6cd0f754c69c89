// Archivo: service.rs
// Propósito: `OneStopService`, la capa orquestadora que expone las
// operaciones de alto nivel (enviar, asignar, decidir, cancelar, consultar y
// gestionar plantillas). Está pensada para ser invocada desde handlers HTTP,
// desde la CLI o desde workers.
use chrono::Utc;
use onestop_forms::{validate_field_data, FieldData, FormTemplate, TemplateFilter, TemplateStore, TemplateSummary};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

use crate::actor::{Actor, Role};
use crate::config::EngineConfig;
use crate::domain::{Page, Request, RequestStatus, Verdict, WorkItem};
use crate::engine::{DecisionOutcome, StepDecisionEngine};
use crate::errors::{Result, WorkflowError};
use crate::filter::{PageRequest, RequestFilter, WorkItemFilter};
use crate::locks::{acquire, RequestLocks};
use crate::projection::{RequestStatusView, StatusProjection};
use crate::repository::WorkflowRepository;
use crate::router::{open_next_step, WorkItemRouter};

/// Envío de una solicitud contra una plantilla.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub template_id: Uuid,
    pub field_data: FieldData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteWorkItem {
    pub work_item_id: Uuid,
    pub assignee_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideWorkItem {
    pub work_item_id: Uuid,
    pub decision: Verdict,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub request_id: Uuid,
}

/// Listado paginado. `page` empieza en 1; sin `limit` se usa el tamaño por
/// defecto de la configuración. `condition` admite las claves de
/// `RequestFilter::from_condition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequests {
    pub as_role: Role,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub condition: Map<String, JsonValue>,
}

/// Igual que `ListRequests`, con las claves de `WorkItemFilter::from_condition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListWorkItems {
    pub as_role: Role,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub condition: Map<String, JsonValue>,
}

/// Servicio de alto nivel del flujo de ventanilla única.
///
/// Orquesta el repositorio de solicitudes, el almacén de plantillas, el
/// router, el motor de decisiones y la proyección de estado. Las escrituras
/// sobre una misma solicitud se serializan con un cerrojo por solicitud; el
/// repositorio aplica además un control optimista por versión.
pub struct OneStopService<R, T>
    where R: WorkflowRepository,
          T: TemplateStore
{
    repo: Arc<R>,
    templates: Arc<T>,
    config: EngineConfig,
    router: WorkItemRouter<R>,
    engine: StepDecisionEngine<R>,
    projection: StatusProjection<R>,
    locks: RequestLocks,
}

impl<R, T> OneStopService<R, T>
    where R: WorkflowRepository,
          T: TemplateStore
{
    /// Crea el servicio inyectando el repositorio, el almacén de plantillas y
    /// la configuración (que se valida aquí).
    pub fn new(repo: Arc<R>, templates: Arc<T>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { router: WorkItemRouter::new(repo.clone()),
                  engine: StepDecisionEngine::new(repo.clone(), config.clone()),
                  projection: StatusProjection::new(repo.clone(), config.clone()),
                  locks: RequestLocks::new(),
                  repo,
                  templates,
                  config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    // ----- solicitudes -----

    /// Envía una solicitud: valida los datos contra la plantilla, copia su
    /// proceso y abre el paso 0 en la misma escritura.
    pub fn submit_request(&self, actor: &Actor, payload: SubmitRequest) -> Result<Request> {
        actor.require(Role::Submitter)?;
        let template = self.templates.get_template(&payload.template_id)?;
        validate_field_data(&template.field_config, &payload.field_data)?;

        let now = Utc::now();
        let mut request = Request { id: Uuid::new_v4(),
                                    template_id: template.id,
                                    template_name: template.name.clone(),
                                    template_revision: template.revision(),
                                    submitter_id: actor.id.clone(),
                                    field_data: payload.field_data,
                                    process: template.process,
                                    overall_status: RequestStatus::Pending,
                                    current_step_index: 0,
                                    version: 0,
                                    created_at: now,
                                    updated_at: now };
        let first = match open_next_step(&mut request, &[], now)? {
            Some(item) => item,
            None => {
                return Err(WorkflowError::Validation(format!("la plantilla {} no tiene pasos", request.template_id)))
            }
        };
        self.repo.create_request(&request, &first)?;
        log::info!("solicitud {} enviada por {} (plantilla '{}', {} pasos); paso 0 abierto para {}",
                   request.id,
                   request.submitter_id,
                   request.template_name,
                   request.process.len(),
                   first.assigned_role);
        Ok(request)
    }

    /// Asigna un item abierto a un actor. Sólo coordinadores.
    pub fn route_work_item(&self, actor: &Actor, payload: RouteWorkItem) -> Result<WorkItem> {
        let request_id = self.repo.get_work_item(&payload.work_item_id)?.request_id;
        let handle = self.locks.handle(&request_id);
        let _guard = acquire(&handle)?;
        self.router.route(&payload.work_item_id, actor, &payload.assignee_id)
    }

    /// Decide el item activo y avanza o termina la solicitud.
    pub fn decide_work_item(&self, actor: &Actor, payload: DecideWorkItem) -> Result<DecisionOutcome> {
        let request_id = self.repo.get_work_item(&payload.work_item_id)?.request_id;
        let handle = self.locks.handle(&request_id);
        let outcome = {
            let _guard = acquire(&handle)?;
            self.engine.decide(&payload.work_item_id, actor, payload.decision, &payload.attachments)?
        };
        if outcome.request.is_terminal() {
            self.locks.forget(&request_id);
        }
        Ok(outcome)
    }

    /// Cancela una solicitud en curso (solicitante dueño o administrador).
    pub fn cancel_request(&self, actor: &Actor, payload: CancelRequest) -> Result<Request> {
        let handle = self.locks.handle(&payload.request_id);
        let request = {
            let _guard = acquire(&handle)?;
            self.engine.cancel(&payload.request_id, actor)?
        };
        self.locks.forget(&payload.request_id);
        Ok(request)
    }

    pub fn get_request_status(&self, actor: &Actor, request_id: &Uuid) -> Result<RequestStatusView> {
        self.projection.request_status(request_id, actor)
    }

    pub fn list_requests(&self, actor: &Actor, payload: &ListRequests) -> Result<Page<Request>> {
        let filter = RequestFilter::from_condition(&payload.condition)?;
        let page = self.page_of(payload.page, payload.limit);
        self.projection.list_requests(actor, payload.as_role, &filter, page)
    }

    pub fn list_work_items(&self, actor: &Actor, payload: &ListWorkItems) -> Result<Page<WorkItem>> {
        let filter = WorkItemFilter::from_condition(&payload.condition)?;
        let page = self.page_of(payload.page, payload.limit);
        self.projection.list_work_items(actor, payload.as_role, &filter, page)
    }

    fn page_of(&self, page: Option<u32>, limit: Option<u32>) -> PageRequest {
        PageRequest::new(page.unwrap_or(1), limit.unwrap_or(self.config.default_page_size))
    }

    // ----- plantillas -----

    pub fn get_template(&self, template_id: &Uuid) -> Result<FormTemplate> {
        Ok(self.templates.get_template(template_id)?)
    }

    pub fn list_templates(&self, filter: &TemplateFilter) -> Result<Vec<TemplateSummary>> {
        Ok(self.templates.list_templates(filter)?)
    }

    /// Listado paginado del panel de administración.
    pub fn list_templates_page(&self,
                               actor: &Actor,
                               filter: &TemplateFilter,
                               page: Option<u32>,
                               limit: Option<u32>)
                               -> Result<Page<TemplateSummary>> {
        actor.require(Role::Admin)?;
        let page = self.page_of(page, limit);
        page.validate(&self.config)?;
        let all = self.templates.list_templates(filter)?;
        Ok(Page::slice(all, page.page, page.limit))
    }

    pub fn create_template(&self, actor: &Actor, template: FormTemplate) -> Result<Uuid> {
        actor.require(Role::Admin)?;
        let id = self.templates.create_template(template)?;
        log::info!("plantilla {} creada por {}", id, actor.id);
        Ok(id)
    }

    /// Reemplaza una plantilla. Las solicitudes ya enviadas conservan su
    /// copia del proceso.
    pub fn update_template(&self, actor: &Actor, template_id: &Uuid, template: FormTemplate) -> Result<FormTemplate> {
        actor.require(Role::Admin)?;
        let updated = self.templates.update_template(template_id, template)?;
        log::info!("plantilla {} actualizada por {} (revisión {})", template_id, actor.id, updated.revision());
        Ok(updated)
    }

    pub fn delete_template(&self, actor: &Actor, template_id: &Uuid) -> Result<()> {
        actor.require(Role::Admin)?;
        self.templates.delete_template(template_id)?;
        log::info!("plantilla {} eliminada por {}", template_id, actor.id);
        Ok(())
    }
}
