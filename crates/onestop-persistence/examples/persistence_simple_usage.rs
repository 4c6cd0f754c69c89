use flow::{Actor, DecideWorkItem, EngineConfig, ListRequests, OneStopService, Role, RouteWorkItem, SubmitRequest,
           Verdict, WorkflowRepository};
use onestop_forms::{FieldData, FieldDefinition, FormTemplate, StepDefinition, StepRole};
use onestop_persistence::open_from_env;
use serde_json::json;

fn main() {
  // El ejemplo usa ONESTOP_DB_URL (o DATABASE_URL). Para una demo local:
  //   export ONESTOP_DB_URL="file:memdb1?mode=memory&cache=shared"
  // Con la feature `pg` se conecta a la URL de Postgres definida en el
  // entorno.
  dotenvy::dotenv().ok();
  let (repo, templates) = open_from_env().expect("no se pudo inicializar la base de datos");
  let service = OneStopService::new(repo.clone(), templates, EngineConfig::default()).expect("servicio");

  let admin = Actor::admin("admin-1");
  let citizen = Actor::submitter("citizen-1");
  let coordinator = Actor::coordinator("coord-1");
  let officer = Actor::processor("officer-7");

  // Plantilla: coordinador -> procesador -> coordinador
  let template = FormTemplate::new("Licencia de obra",
                                   Some("Trámite de ejemplo".into()),
                                   vec![FieldDefinition::text("address", "Dirección", true)],
                                   vec![StepDefinition::new(0, StepRole::Coordinator).with_name("Recepción"),
                                        StepDefinition::new(1, StepRole::Processor).with_name("Inspección"),
                                        StepDefinition::new(2, StepRole::Coordinator).with_name("Firma")])
    .expect("plantilla");
  let template_id = service.create_template(&admin, template).expect("create template");
  println!("created template {}", template_id);

  // Enviar 3 solicitudes
  let mut ids = Vec::new();
  for i in 1..=3 {
    let mut field_data = FieldData::new();
    field_data.insert("address".into(), json!(format!("Calle {} nº {}", i, i * 10)));
    let request = service.submit_request(&citizen, SubmitRequest { template_id, field_data }).expect("submit");
    ids.push(request.id);
  }
  println!("submitted {} requests", ids.len());

  // Avanzar la primera hasta el final
  let first = ids[0];
  for step in 0..3 {
    let items = repo.work_items_for(&first).expect("items");
    let active = items.iter().find(|w| w.is_active()).expect("active item").clone();
    let decider = if active.assigned_role == StepRole::Processor {
      service.route_work_item(&coordinator,
                              RouteWorkItem { work_item_id: active.id, assignee_id: officer.id.clone() })
             .expect("route");
      &officer
    } else {
      &coordinator
    };
    let outcome = service.decide_work_item(decider,
                                           DecideWorkItem { work_item_id: active.id,
                                                            decision: Verdict::Approved,
                                                            attachments: vec![format!("https://files.example.org/{}-{}.pdf",
                                                                                      first, step)] })
                         .expect("decide");
    println!("step {} -> request {} [{}] v{}",
             step, outcome.request.id, outcome.request.overall_status, outcome.request.version);
  }

  // Rechazar la segunda en el paso 0
  let second = repo.work_items_for(&ids[1]).expect("items")[0].clone();
  let outcome = service.decide_work_item(&coordinator,
                                         DecideWorkItem { work_item_id: second.id,
                                                          decision: Verdict::Rejected,
                                                          attachments: vec![] })
                       .expect("reject");
  println!("request {} [{}]", outcome.request.id, outcome.request.overall_status);

  // Estado de la primera
  let view = service.get_request_status(&citizen, &first).expect("status");
  println!("timeline of {}: {} records", first, view.timeline.len());
  for r in &view.timeline {
    println!("record: step={} role={} actor={:?} decision={} at={}",
             r.step_index, r.actor_role, r.actor_id, r.decision, r.timestamp);
  }

  // Dump de solicitudes
  let page = service.list_requests(&admin,
                                   &ListRequests { as_role: Role::Admin,
                                                   page: Some(1),
                                                   limit: Some(50),
                                                   condition: Default::default() })
                   .expect("list");
  println!("requests dump: {} rows", page.total);
  for r in &page.result {
    println!("request: id={} status={} step={} version={}",
             r.id, r.overall_status, r.current_step_index, r.version);
  }
}
