use flow::{Actor, DecisionOutcome, EngineConfig, InMemoryWorkflowRepository, OneStopService, Page, PersistResult,
           Request, RequestQuery, RequestSnapshot, RequestStatus, StatusProjection, StepDecisionEngine,
           StepStatusRecord, SubmitRequest, Transition, Verdict, WorkItem, WorkItemQuery, WorkItemRouter,
           WorkItemStatus, WorkflowError, WorkflowRepository};
use onestop_forms::{FieldData, FieldDefinition, FormTemplate, InMemoryTemplateStore, StepDefinition, StepRole};
use serde_json::json;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Punto de la operación en el que otro proceso confirma su transición.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum At {
  /// Justo después de leer el item de trabajo.
  GetWorkItem,
  /// Justo después de la lectura coherente de la solicitud.
  Snapshot,
  /// Después de cualquier lectura de solicitud, items o registros.
  AnyRead,
}

/// Repositorio que delega en otro y ejecuta una escritura ajena en `at`,
/// como haría un segundo proceso sobre la misma base de datos.
struct Interleaved {
  inner: Arc<InMemoryWorkflowRepository>,
  at: At,
  hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Interleaved {
  fn new(inner: Arc<InMemoryWorkflowRepository>, at: At, hook: impl FnOnce() + Send + 'static) -> Self {
    Self { inner, at, hook: Mutex::new(Some(Box::new(hook))) }
  }

  fn fire(&self, point: At) {
    let hit = match self.at {
      At::AnyRead => point != At::GetWorkItem,
      at => at == point,
    };
    if !hit {
      return;
    }
    let hook = self.hook.lock().unwrap().take();
    if let Some(h) = hook {
      h();
    }
  }

  fn fired(&self) -> bool {
    self.hook.lock().unwrap().is_none()
  }
}

impl WorkflowRepository for Interleaved {
  fn create_request(&self, request: &Request, first_item: &WorkItem) -> flow::Result<()> {
    self.inner.create_request(request, first_item)
  }

  fn get_request(&self, request_id: &Uuid) -> flow::Result<Request> {
    let out = self.inner.get_request(request_id);
    self.fire(At::AnyRead);
    out
  }

  fn get_work_item(&self, work_item_id: &Uuid) -> flow::Result<WorkItem> {
    let out = self.inner.get_work_item(work_item_id);
    self.fire(At::GetWorkItem);
    out
  }

  fn work_items_for(&self, request_id: &Uuid) -> flow::Result<Vec<WorkItem>> {
    let out = self.inner.work_items_for(request_id);
    self.fire(At::AnyRead);
    out
  }

  fn records_for(&self, request_id: &Uuid) -> flow::Result<Vec<StepStatusRecord>> {
    let out = self.inner.records_for(request_id);
    self.fire(At::AnyRead);
    out
  }

  fn request_snapshot(&self, request_id: &Uuid) -> flow::Result<RequestSnapshot> {
    let out = self.inner.request_snapshot(request_id);
    self.fire(At::Snapshot);
    out
  }

  fn commit(&self, transition: &Transition, expected_version: i64) -> flow::Result<PersistResult> {
    self.inner.commit(transition, expected_version)
  }

  fn list_requests(&self, query: &RequestQuery) -> flow::Result<Page<Request>> {
    self.inner.list_requests(query)
  }

  fn list_work_items(&self, query: &WorkItemQuery) -> flow::Result<Page<WorkItem>> {
    self.inner.list_work_items(query)
  }
}

/// Solicitud de dos pasos (coordinador y procesador) ya enviada.
fn submitted() -> (Arc<InMemoryWorkflowRepository>, Request, WorkItem) {
  let inner = Arc::new(InMemoryWorkflowRepository::new());
  let svc = OneStopService::new(inner.clone(), Arc::new(InMemoryTemplateStore::new()), EngineConfig::default())
    .expect("service");
  let t = FormTemplate::new("Đơn miễn học phí",
                            None,
                            vec![FieldDefinition::text("student_id", "MSSV", true)],
                            vec![StepDefinition::new(0, StepRole::Coordinator),
                                 StepDefinition::new(1, StepRole::Processor)])
          .expect("template");
  let tid = svc.create_template(&Actor::admin("admin"), t).expect("create template");
  let mut d = FieldData::new();
  d.insert("student_id".into(), json!("20205678"));
  let req = svc.submit_request(&Actor::submitter("alice"), SubmitRequest { template_id: tid, field_data: d })
               .expect("submit");
  let first = inner.work_items_for(&req.id).expect("items").remove(0);
  (inner, req, first)
}

/// Decisión de otro proceso: su propio motor, sin el cerrojo del servicio.
fn elsewhere(inner: &Arc<InMemoryWorkflowRepository>,
             item_id: Uuid,
             verdict: Verdict)
             -> impl FnOnce() + Send + 'static {
  let other = StepDecisionEngine::new(inner.clone(), EngineConfig::default());
  move || {
    let _: DecisionOutcome =
      other.decide(&item_id, &Actor::coordinator("coord-2"), verdict, &[]).expect("other process decides");
  }
}

#[test]
fn status_view_comes_from_a_single_committed_state() {
  let (inner, req, first) = submitted();
  let repo = Arc::new(Interleaved::new(inner.clone(), At::AnyRead, elsewhere(&inner, first.id, Verdict::Approved)));
  let projection = StatusProjection::new(repo.clone(), EngineConfig::default());

  let view = projection.request_status(&req.id, &Actor::submitter("alice")).expect("status");
  assert!(repo.fired(), "the concurrent approval must land during the read");
  // cabecera, paso actual e historial del mismo estado (antes de la aprobación)
  let current = view.current.expect("current step");
  assert_eq!(view.request.current_step_index, current.step_index);
  assert_eq!(view.request.overall_status, RequestStatus::Pending);
  assert_eq!(view.timeline.len(), 1);
  assert_eq!(current.work_item_id, first.id);

  // la siguiente lectura ve el estado nuevo, también completo
  let view = projection.request_status(&req.id, &Actor::submitter("alice")).expect("status");
  let current = view.current.expect("current step");
  assert_eq!(view.request.overall_status, RequestStatus::Processing);
  assert_eq!((view.request.current_step_index, current.step_index), (1, 1));
  assert_eq!(view.timeline.len(), 2);
}

#[test]
fn item_decided_by_another_process_is_invalid_state() {
  let (inner, req, first) = submitted();
  let repo = Arc::new(Interleaved::new(inner.clone(), At::GetWorkItem, elsewhere(&inner, first.id, Verdict::Approved)));
  let engine = StepDecisionEngine::new(repo.clone(), EngineConfig::default());

  let err = engine.decide(&first.id, &Actor::coordinator("coord-1"), Verdict::Rejected, &[]).unwrap_err();
  assert!(repo.fired());
  assert!(matches!(err, WorkflowError::InvalidState(_)), "got {:?}", err);
  let stored = inner.get_request(&req.id).unwrap();
  assert_eq!(stored.overall_status, RequestStatus::Processing);
  assert_eq!(inner.records_for(&req.id).unwrap().len(), 1);
}

#[test]
fn commit_after_a_concurrent_decision_is_a_conflict() {
  let (inner, req, first) = submitted();
  let repo = Arc::new(Interleaved::new(inner.clone(), At::Snapshot, elsewhere(&inner, first.id, Verdict::Approved)));
  let engine = StepDecisionEngine::new(repo.clone(), EngineConfig::default());

  let err = engine.decide(&first.id, &Actor::coordinator("coord-1"), Verdict::Rejected, &[]).unwrap_err();
  assert!(matches!(err, WorkflowError::Conflict(_)), "got {:?}", err);
  let items = inner.work_items_for(&req.id).unwrap();
  assert_eq!(items.iter().filter(|w| w.is_active()).count(), 1);
  assert_eq!(inner.get_request(&req.id).unwrap().version, 1);
}

#[test]
fn cancel_racing_a_rejection_is_a_conflict_then_invalid_state() {
  let (inner, req, first) = submitted();
  let repo = Arc::new(Interleaved::new(inner.clone(), At::Snapshot, elsewhere(&inner, first.id, Verdict::Rejected)));
  let engine = StepDecisionEngine::new(repo.clone(), EngineConfig::default());
  let alice = Actor::submitter("alice");

  let err = engine.cancel(&req.id, &alice).unwrap_err();
  assert!(matches!(err, WorkflowError::Conflict(_)), "got {:?}", err);
  assert_eq!(inner.get_request(&req.id).unwrap().overall_status, RequestStatus::Rejected);

  let err = engine.cancel(&req.id, &alice).unwrap_err();
  assert!(matches!(err, WorkflowError::InvalidState(_)), "got {:?}", err);
}

#[test]
fn routing_an_item_resolved_elsewhere_is_invalid_state() {
  let (inner, req, first) = submitted();
  let repo = Arc::new(Interleaved::new(inner.clone(), At::GetWorkItem, elsewhere(&inner, first.id, Verdict::Approved)));
  let router = WorkItemRouter::new(repo.clone());

  let err = router.route(&first.id, &Actor::coordinator("coord-1"), "proc-x").unwrap_err();
  assert!(matches!(err, WorkflowError::InvalidState(_)), "got {:?}", err);
  let stored = inner.get_work_item(&first.id).unwrap();
  assert_eq!(stored.status, WorkItemStatus::Resolved);
  assert_eq!(stored.assigned_actor_id, None);
  assert_eq!(inner.get_request(&req.id).unwrap().current_step_index, 1);
}
