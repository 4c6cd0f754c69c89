use chrono::Utc;
use flow::{open_next_step, Decision, InMemoryWorkflowRepository, PageRequest, PersistResult, Request, RequestQuery,
           RequestStatus, StepStatusRecord, Transition, WorkItem, WorkItemQuery, WorkItemStatus, WorkflowError,
           WorkflowRepository};
use onestop_forms::{FieldData, StepDefinition, StepRole};
use uuid::Uuid;

fn new_request(submitter: &str) -> (Request, WorkItem) {
  let now = Utc::now();
  let mut request = Request { id: Uuid::new_v4(),
                              template_id: Uuid::new_v4(),
                              template_name: "Đơn phúc khảo".into(),
                              template_revision: "r1".into(),
                              submitter_id: submitter.into(),
                              field_data: FieldData::new(),
                              process: vec![StepDefinition::new(0, StepRole::Coordinator),
                                            StepDefinition::new(1, StepRole::Processor)],
                              overall_status: RequestStatus::Pending,
                              current_step_index: 0,
                              version: 0,
                              created_at: now,
                              updated_at: now };
  let first = open_next_step(&mut request, &[], now).expect("open").expect("first step");
  (request, first)
}

fn page_all() -> PageRequest {
  PageRequest::new(1, 50)
}

#[test]
fn stale_version_is_a_conflict_and_writes_nothing() {
  let repo = InMemoryWorkflowRepository::new();
  let (request, first) = new_request("alice");
  repo.create_request(&request, &first).unwrap();

  let mut routed = first.clone();
  routed.status = WorkItemStatus::Routed;
  routed.assigned_actor_id = Some("p1".into());
  let t = Transition { request: request.clone(), updated_items: vec![routed.clone()], opened_item: None, record: None };
  match repo.commit(&t, 0).unwrap() {
    PersistResult::Ok { new_version } => assert_eq!(new_version, 1),
    PersistResult::Conflict => panic!("unexpected conflict"),
  }

  // misma versión de partida: ya no es válida
  let mut other = first.clone();
  other.assigned_actor_id = Some("p2".into());
  let stale = Transition { request: request.clone(), updated_items: vec![other], opened_item: None, record: None };
  assert_eq!(repo.commit(&stale, 0).unwrap(), PersistResult::Conflict);
  assert_eq!(repo.get_work_item(&first.id).unwrap().assigned_actor_id.as_deref(), Some("p1"));
  assert_eq!(repo.get_request(&request.id).unwrap().version, 1);
}

#[test]
fn second_active_item_is_an_internal_inconsistency() {
  let repo = InMemoryWorkflowRepository::new();
  let (request, first) = new_request("alice");
  repo.create_request(&request, &first).unwrap();

  let mut next = request.clone();
  next.current_step_index = 1;
  let step = next.process[1].clone();
  let extra = WorkItem::open(&next, &step, Utc::now());
  let t = Transition { request: next, updated_items: vec![], opened_item: Some(extra.clone()), record: None };
  let err = repo.commit(&t, 0).unwrap_err();
  assert!(matches!(err, WorkflowError::InternalInconsistency(_)));
  assert!(matches!(repo.get_work_item(&extra.id).unwrap_err(), WorkflowError::NotFound(_)));
  assert_eq!(repo.get_request(&request.id).unwrap().version, 0);
}

#[test]
fn open_next_step_refuses_when_a_step_is_still_active() {
  let (mut request, first) = new_request("alice");
  let err = open_next_step(&mut request, &[&first], Utc::now()).unwrap_err();
  assert!(matches!(err, WorkflowError::InternalInconsistency(_)));
}

#[test]
fn resolving_last_step_completes_request() {
  let (mut request, _) = new_request("alice");
  request.current_step_index = 2;
  let opened = open_next_step(&mut request, &[], Utc::now()).unwrap();
  assert!(opened.is_none());
  assert_eq!(request.overall_status, RequestStatus::Completed);
}

#[test]
fn records_keep_insertion_order() {
  let repo = InMemoryWorkflowRepository::new();
  let (request, first) = new_request("alice");
  repo.create_request(&request, &first).unwrap();

  let now = Utc::now();
  let mut resolved = first.clone();
  resolved.status = WorkItemStatus::Resolved;
  resolved.decision = Decision::Approved;
  resolved.decided_by = Some("c1".into());
  let mut next = request.clone();
  next.current_step_index = 1;
  next.overall_status = RequestStatus::Processing;
  let opened = open_next_step(&mut next, &[], now).unwrap();
  let t = Transition { request: next,
                       updated_items: vec![resolved.clone()],
                       opened_item: opened,
                       record: Some(StepStatusRecord::resolved(&resolved, now)) };
  assert_eq!(repo.commit(&t, 0).unwrap(), PersistResult::Ok { new_version: 1 });

  let records = repo.records_for(&request.id).unwrap();
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].actor_id.as_deref(), Some("c1"));
  let items = repo.work_items_for(&request.id).unwrap();
  assert_eq!(items.iter().map(|w| w.step_index).collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn listings_are_newest_first_and_paginated() {
  let repo = InMemoryWorkflowRepository::new();
  let mut ids = Vec::new();
  for i in 0..5 {
    let (mut request, mut first) = new_request(if i % 2 == 0 { "alice" } else { "bob" });
    let at = Utc::now() + chrono::Duration::seconds(i);
    request.created_at = at;
    first.created_at = at;
    repo.create_request(&request, &first).unwrap();
    ids.push(request.id);
  }

  let query = RequestQuery { submitter_id: None,
                             status: None,
                             template_id: None,
                             coordinator_queue: false,
                             active_actor_id: None,
                             page: PageRequest::new(1, 2) };
  let page = repo.list_requests(&query).unwrap();
  assert_eq!(page.total, 5);
  assert_eq!(page.result.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);

  let last = repo.list_requests(&RequestQuery { page: PageRequest::new(3, 2), ..query.clone() }).unwrap();
  assert_eq!(last.result.len(), 1);
  assert_eq!(last.result[0].id, ids[0]);

  let alice = repo.list_requests(&RequestQuery { submitter_id: Some("alice".into()), page: page_all(), ..query.clone() })
                  .unwrap();
  assert_eq!(alice.total, 3);

  let items = repo.list_work_items(&WorkItemQuery { coordinator_queue: true,
                                                    assigned_role: None,
                                                    assigned_actor_id: None,
                                                    status: Some(WorkItemStatus::Open),
                                                    template_id: None,
                                                    page: page_all() })
                  .unwrap();
  assert_eq!(items.total, 5);
}
