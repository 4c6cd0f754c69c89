use flow::{Actor, DecideWorkItem, EngineConfig, InMemoryWorkflowRepository, ListRequests, ListWorkItems,
           OneStopService, RequestStatus, Role, RouteWorkItem, SubmitRequest, Verdict, WorkflowError,
           WorkflowRepository};
use onestop_forms::{FieldData, FieldDefinition, FormTemplate, InMemoryTemplateStore, StepDefinition, StepRole,
                    TemplateFilter};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

type Service = OneStopService<InMemoryWorkflowRepository, InMemoryTemplateStore>;

struct Fixture {
  svc: Service,
  template_id: Uuid,
  /// Solicitud en el paso del coordinador.
  at_coordinator: Uuid,
  /// Solicitud en el paso del procesador, aún sin asignar.
  unrouted: Uuid,
  /// Solicitud asignada a `proc-x`.
  routed_to_x: Uuid,
  /// Solicitud rechazada.
  rejected: Uuid,
}

fn fixture() -> Fixture {
  let svc = OneStopService::new(Arc::new(InMemoryWorkflowRepository::new()),
                                Arc::new(InMemoryTemplateStore::new()),
                                EngineConfig::default()).expect("service");
  let admin = Actor::admin("admin");
  let t = FormTemplate::new("Đơn xin chuyển ngành",
                            Some("Phòng đào tạo".into()),
                            vec![FieldDefinition::text("reason", "Lý do", true)],
                            vec![StepDefinition::new(0, StepRole::Coordinator), StepDefinition::new(1, StepRole::Processor)])
          .expect("template");
  let template_id = svc.create_template(&admin, t).expect("create");
  let coord = Actor::coordinator("coord-1");

  let submit = |who: &str| {
    let mut d = FieldData::new();
    d.insert("reason".into(), json!("..."));
    svc.submit_request(&Actor::submitter(who), SubmitRequest { template_id, field_data: d }).expect("submit")
  };
  let at_coordinator = submit("alice").id;
  let unrouted = submit("alice").id;
  let routed_to_x = submit("bob").id;
  let rejected = submit("bob").id;

  let first = |svc: &Service, id: &Uuid| svc.repository().work_items_for(id).unwrap().remove(0).id;
  let approve = |id: Uuid, verdict: Verdict| {
    svc.decide_work_item(&coord, DecideWorkItem { work_item_id: id, decision: verdict, attachments: vec![] })
       .expect("decide")
  };
  approve(first(&svc, &unrouted), Verdict::Approved);
  let opened = approve(first(&svc, &routed_to_x), Verdict::Approved).opened.expect("opened");
  svc.route_work_item(&coord, RouteWorkItem { work_item_id: opened.id, assignee_id: "proc-x".into() })
     .expect("route");
  approve(first(&svc, &rejected), Verdict::Rejected);

  Fixture { svc, template_id, at_coordinator, unrouted, routed_to_x, rejected }
}

fn list(svc: &Service, actor: &Actor, as_role: Role, condition: Value) -> flow::Result<Vec<Uuid>> {
  let condition: Map<String, Value> = condition.as_object().cloned().unwrap_or_default();
  let page = svc.list_requests(actor, &ListRequests { as_role, page: None, limit: None, condition })?;
  let mut ids: Vec<Uuid> = page.result.into_iter().map(|r| r.id).collect();
  ids.sort();
  Ok(ids)
}

fn sorted(mut ids: Vec<Uuid>) -> Vec<Uuid> {
  ids.sort();
  ids
}

#[test]
fn submitter_sees_only_own_requests() {
  let f = fixture();
  let alice = Actor::submitter("alice");
  assert_eq!(list(&f.svc, &alice, Role::Submitter, json!({})).unwrap(),
             sorted(vec![f.at_coordinator, f.unrouted]));
  // pedir las de otro no amplía el alcance
  assert!(list(&f.svc, &alice, Role::Submitter, json!({"submitterId": "bob"})).unwrap().is_empty());
}

#[test]
fn coordinator_queue_holds_coordinator_steps_and_unrouted_processor_steps() {
  let f = fixture();
  let coord = Actor::coordinator("coord-2");
  assert_eq!(list(&f.svc, &coord, Role::Coordinator, json!({})).unwrap(),
             sorted(vec![f.at_coordinator, f.unrouted]));
  assert_eq!(list(&f.svc, &coord, Role::Coordinator, json!({"status": "PENDING"})).unwrap(),
             vec![f.at_coordinator]);
}

#[test]
fn processor_sees_items_routed_to_them() {
  let f = fixture();
  assert_eq!(list(&f.svc, &Actor::processor("proc-x"), Role::Processor, json!({})).unwrap(),
             vec![f.routed_to_x]);
  assert!(list(&f.svc, &Actor::processor("proc-y"), Role::Processor, json!({})).unwrap().is_empty());
}

#[test]
fn admin_sees_everything_and_filters_by_status() {
  let f = fixture();
  let admin = Actor::admin("admin");
  assert_eq!(list(&f.svc, &admin, Role::Admin, json!({})).unwrap().len(), 4);
  assert_eq!(list(&f.svc, &admin, Role::Admin, json!({"status": "REJECTED"})).unwrap(), vec![f.rejected]);
  assert_eq!(list(&f.svc, &admin, Role::Admin, json!({"status": "PROCESSING"})).unwrap(),
             sorted(vec![f.unrouted, f.routed_to_x]));
  assert_eq!(list(&f.svc, &admin, Role::Admin, json!({"templateId": Uuid::new_v4().to_string()})).unwrap(),
             Vec::<Uuid>::new());
  assert_eq!(list(&f.svc, &admin, Role::Admin, json!({"templateId": f.template_id.to_string()})).unwrap().len(), 4);
}

#[test]
fn role_must_be_held_and_parameters_are_validated() {
  let f = fixture();
  let alice = Actor::submitter("alice");
  assert!(matches!(list(&f.svc, &alice, Role::Admin, json!({})).unwrap_err(), WorkflowError::Forbidden(_)));
  assert!(matches!(list(&f.svc, &alice, Role::Submitter, json!({"colour": "red"})).unwrap_err(),
                   WorkflowError::Validation(_)));
  assert!(matches!(list(&f.svc, &alice, Role::Submitter, json!({"status": 3})).unwrap_err(),
                   WorkflowError::Validation(_)));

  for (page, limit) in [(Some(0), None), (None, Some(0)), (None, Some(101))] {
    let err = f.svc
               .list_requests(&alice, &ListRequests { as_role: Role::Submitter, page, limit, condition: Map::new() })
               .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)), "page={:?} limit={:?}", page, limit);
  }
}

#[test]
fn pagination_reports_total() {
  let f = fixture();
  let page = f.svc
              .list_requests(&Actor::admin("admin"),
                             &ListRequests { as_role: Role::Admin, page: Some(2), limit: Some(3), condition: Map::new() })
              .unwrap();
  assert_eq!(page.total, 4);
  assert_eq!(page.result.len(), 1);
  assert_eq!(page.page, 2);
}

#[test]
fn work_item_dashboards() {
  let f = fixture();
  let q = |as_role: Role, condition: Value| ListWorkItems { as_role,
                                                            page: None,
                                                            limit: None,
                                                            condition: condition.as_object().cloned().unwrap_or_default() };
  let x = f.svc.list_work_items(&Actor::processor("proc-x"), &q(Role::Processor, json!({}))).unwrap();
  assert_eq!(x.total, 1);
  assert_eq!(x.result[0].request_id, f.routed_to_x);

  let open = f.svc
              .list_work_items(&Actor::coordinator("c"), &q(Role::Coordinator, json!({"status": "OPEN"})))
              .unwrap();
  assert_eq!(open.total, 2);

  let all = f.svc.list_work_items(&Actor::admin("a"), &q(Role::Admin, json!({}))).unwrap();
  assert_eq!(all.total, 6);

  let err = f.svc.list_work_items(&Actor::submitter("alice"), &q(Role::Submitter, json!({}))).unwrap_err();
  assert!(matches!(err, WorkflowError::Forbidden(_)));
}

#[test]
fn templates_listing_by_role_and_page() {
  let f = fixture();
  let for_processors = f.svc
                        .list_templates(&TemplateFilter { involves_role: Some(StepRole::Processor), ..Default::default() })
                        .unwrap();
  assert_eq!(for_processors.len(), 1);
  let page = f.svc.list_templates_page(&Actor::admin("a"), &TemplateFilter::default(), None, None).unwrap();
  assert_eq!(page.total, 1);
  assert!(matches!(f.svc.list_templates_page(&Actor::coordinator("c"), &TemplateFilter::default(), None, None)
                    .unwrap_err(),
                   WorkflowError::Forbidden(_)));
}

#[test]
fn status_defaults_for_dashboards() {
  assert_eq!(flow::RequestFilter::admin_default().status, Some(RequestStatus::Processing));
  assert_eq!(flow::RequestFilter::staff_default().status, Some(RequestStatus::Pending));
}
