use flow::{Actor, DecideWorkItem, EngineConfig, InMemoryWorkflowRepository, OneStopService, RequestStatus,
           SubmitRequest, Verdict, WorkflowError, WorkflowRepository};
use onestop_forms::{FieldData, FieldDefinition, FormTemplate, InMemoryTemplateStore, StepDefinition, StepRole};
use serde_json::json;
use std::sync::{Arc, Barrier};

fn setup() -> (OneStopService<InMemoryWorkflowRepository, InMemoryTemplateStore>, uuid::Uuid) {
  let svc = OneStopService::new(Arc::new(InMemoryWorkflowRepository::new()),
                                Arc::new(InMemoryTemplateStore::new()),
                                EngineConfig::default()).expect("service");
  let t = FormTemplate::new("Giấy xác nhận",
                            None,
                            vec![FieldDefinition::text("student_id", "MSSV", true)],
                            vec![StepDefinition::new(0, StepRole::Coordinator), StepDefinition::new(1, StepRole::Processor)])
          .expect("template");
  let tid = svc.create_template(&Actor::admin("admin"), t).expect("create");
  (svc, tid)
}

fn submit(svc: &OneStopService<InMemoryWorkflowRepository, InMemoryTemplateStore>, tid: uuid::Uuid) -> flow::Request {
  let mut d = FieldData::new();
  d.insert("student_id".into(), json!("20201234"));
  svc.submit_request(&Actor::submitter("alice"), SubmitRequest { template_id: tid, field_data: d }).expect("submit")
}

// Dos decisiones simultáneas sobre el mismo item abierto: gana exactamente una.
#[test]
fn concurrent_decisions_on_same_item_have_one_winner() {
  let (svc, tid) = setup();
  let req = submit(&svc, tid);
  let item = svc.repository().work_items_for(&req.id).unwrap().remove(0);
  let barrier = Barrier::new(2);

  let decide = |who: &str, verdict: Verdict| {
    barrier.wait();
    svc.decide_work_item(&Actor::coordinator(who),
                         DecideWorkItem { work_item_id: item.id, decision: verdict, attachments: vec![] })
  };
  let results: Vec<flow::Result<flow::DecisionOutcome>> = std::thread::scope(|s| {
    let a = s.spawn(|| decide("coord-1", Verdict::Approved));
    let b = s.spawn(|| decide("coord-2", Verdict::Rejected));
    vec![a.join().expect("thread a"), b.join().expect("thread b")]
  });

  let ok: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
  assert_eq!(ok.len(), 1, "results: {:?}", results);
  for r in results.iter().filter(|r| r.is_err()) {
    match r {
      Err(WorkflowError::InvalidState(_)) | Err(WorkflowError::Conflict(_)) => {}
      other => panic!("unexpected loser result: {:?}", other),
    }
  }

  let records = svc.repository().records_for(&req.id).unwrap();
  assert_eq!(records.len(), 1);
  let active = svc.repository().work_items_for(&req.id).unwrap().into_iter().filter(|w| w.is_active()).count();
  let stored = svc.repository().get_request(&req.id).unwrap();
  match stored.overall_status {
    RequestStatus::Rejected => assert_eq!(active, 0),
    RequestStatus::Processing => assert_eq!(active, 1),
    other => panic!("unexpected status {}", other),
  }
}

// Muchas solicitudes decididas en paralelo no se bloquean entre sí y cada
// una mantiene un único paso activo.
#[test]
fn independent_requests_progress_in_parallel() {
  let (svc, tid) = setup();
  let requests: Vec<_> = (0..8).map(|_| submit(&svc, tid)).collect();

  std::thread::scope(|s| {
    for req in &requests {
      let svc = &svc;
      s.spawn(move || {
        let item = svc.repository().work_items_for(&req.id).unwrap().remove(0);
        svc.decide_work_item(&Actor::coordinator("coord"),
                             DecideWorkItem { work_item_id: item.id, decision: Verdict::Approved, attachments: vec![] })
           .expect("decide");
      });
    }
  });

  for req in &requests {
    let items = svc.repository().work_items_for(&req.id).unwrap();
    assert_eq!(items.iter().filter(|w| w.is_active()).count(), 1);
    assert_eq!(svc.repository().get_request(&req.id).unwrap().overall_status, RequestStatus::Processing);
  }
}
