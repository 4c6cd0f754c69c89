use flow::errors::WorkflowError;
use flow::{Actor, DecideWorkItem, EngineConfig, InMemoryWorkflowRepository, OneStopService, RouteWorkItem,
           SubmitRequest, Verdict, WorkflowRepository};
use onestop_forms::{FieldData, FieldDefinition, FieldKind, FormTemplate, InMemoryTemplateStore, StepDefinition,
                    StepRole};
use serde_json::json;
use std::sync::Arc;

fn main() -> Result<(), WorkflowError> {
    // Repositorios en memoria y servicio
    let repo = Arc::new(InMemoryWorkflowRepository::new());
    let templates = Arc::new(InMemoryTemplateStore::new());
    let service = OneStopService::new(repo.clone(), templates, EngineConfig::default())?;

    // Plantilla de dos pasos: revisión del coordinador y resolución del procesador
    let admin = Actor::admin("admin");
    let template = FormTemplate::new("Solicitud de certificado",
                                     Some("Secretaría".into()),
                                     vec![FieldDefinition::text("full_name", "Nombre completo", true),
                                          FieldDefinition::new("copies", "Copias", FieldKind::Number, false)],
                                     vec![StepDefinition::new(0, StepRole::Coordinator).with_name("Revisión"),
                                          StepDefinition::new(1, StepRole::Processor).with_name("Emisión")])?;
    let template_id = service.create_template(&admin, template)?;
    println!("created template {}\n", template_id);

    // Enviar una solicitud
    let alice = Actor::submitter("alice");
    let mut data = FieldData::new();
    data.insert("full_name".into(), json!("Alice Example"));
    data.insert("copies".into(), json!(2));
    let request = service.submit_request(&alice, SubmitRequest { template_id, field_data: data })?;
    println!("submitted request {} [{}]", request.id, request.overall_status);

    // El coordinador aprueba el primer paso
    let coord = Actor::coordinator("coord-1");
    let first = repo.work_items_for(&request.id)?.remove(0);
    let outcome = service.decide_work_item(&coord,
                                           DecideWorkItem { work_item_id: first.id,
                                                            decision: Verdict::Approved,
                                                            attachments: vec![] })?;
    println!("step 0 decided -> {}", outcome.request.overall_status);

    // ... y asigna el paso del procesador
    if let Some(opened) = outcome.opened {
        service.route_work_item(&coord, RouteWorkItem { work_item_id: opened.id, assignee_id: "proc-x".into() })?;
        let done = service.decide_work_item(&Actor::processor("proc-x"),
                                            DecideWorkItem { work_item_id: opened.id,
                                                             decision: Verdict::Approved,
                                                             attachments: vec!["https://files.example.org/cert.pdf".into()] })?;
        println!("step 1 decided -> {}\n", done.request.overall_status);
    }

    // Historial visto por el solicitante
    let status = service.get_request_status(&alice, &request.id)?;
    for record in &status.timeline {
        println!("  paso {} {} por {:?} ({})", record.step_index, record.decision, record.actor_id, record.timestamp);
    }
    Ok(())
}
