use flow::{Actor, CancelRequest, DecideWorkItem, EngineConfig, ListRequests, ListWorkItems, OneStopService, Role,
           RouteWorkItem, SubmitRequest, Verdict, WorkflowError};
use onestop_forms::{FieldData, FieldDefinition, FieldKind, FormTemplate, StepDefinition, StepRole, TemplateFilter};
use onestop_persistence::{DieselTemplateStore, DieselWorkflowRepository};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use std::error::Error;
use std::io::{self, Write};
use uuid::Uuid;

type Service = OneStopService<DieselWorkflowRepository, DieselTemplateStore>;

/// Pequeño menú interactivo sobre el servicio de ventanilla única usando la
/// persistencia de `onestop-persistence`.
///
/// Opciones soportadas:
/// 1) Cambiar de actor (id y roles)
/// 2) Ver plantillas
/// 3) Crear plantilla
/// 4) Enviar solicitud
/// 5) Listar solicitudes
/// 6) Listar items de trabajo
/// 7) Asignar item a un procesador
/// 8) Decidir item
/// 9) Cancelar solicitud
/// 10) Ver estado de una solicitud
/// 11) Salir
fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    // Inicializar repos (aplica migraciones embebidas si procede)
    let (repo, templates) = onestop_persistence::open_from_env()?;
    let config = EngineConfig::from_env()?;
    log::info!("onestop-cli: página por defecto {}, máximo {}, adjuntos {}",
               config.default_page_size,
               config.max_page_size,
               config.max_attachments);
    let service: Service = OneStopService::new(repo, templates, config)?;

    let mut actor = Actor::admin("admin");
    loop {
        println!("\n== One-stop CLI ({} {:?}) ==", actor.id, actor.roles);
        println!("1) Cambiar de actor");
        println!("2) Ver plantillas");
        println!("3) Crear plantilla");
        println!("4) Enviar solicitud");
        println!("5) Listar solicitudes");
        println!("6) Listar items de trabajo");
        println!("7) Asignar item a un procesador");
        println!("8) Decidir item");
        println!("9) Cancelar solicitud");
        println!("10) Ver estado de una solicitud");
        println!("11) Salir");
        let choice = prompt("Elige una opción: ")?;
        match choice.trim() {
            "1" => match read_actor() {
                Ok(a) => actor = a,
                Err(e) => eprintln!("Actor inválido: {}", e),
            },
            "2" => match service.list_templates(&TemplateFilter::default()) {
                Ok(list) => {
                    println!("\nID                                   | PASOS | CAMPOS | NOMBRE");
                    println!("-----------------------------------------------------------------------------------");
                    for t in list {
                        println!("{} | {:5} | {:6} | {}", t.id, t.step_count, t.field_count, t.name);
                    }
                }
                Err(e) => report("Error listando plantillas", &e),
            },
            "3" => match read_template() {
                Ok(t) => match service.create_template(&actor, t) {
                    Ok(id) => println!("Plantilla creada: {}", id),
                    Err(e) => report("Error creando plantilla", &e),
                },
                Err(e) => eprintln!("Plantilla inválida: {}", e),
            },
            "4" => {
                let Some(template_id) = read_uuid("Plantilla (UUID): ")? else { continue };
                let template = match service.get_template(&template_id) {
                    Ok(t) => t,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                };
                let mut field_data = FieldData::new();
                for field in &template.field_config {
                    let raw = prompt(&format!("{} ({}){}: ", field.label, field.id, if field.required { " *" } else { "" }))?;
                    if !raw.trim().is_empty() {
                        field_data.insert(field.id.clone(), parse_value(raw.trim()));
                    }
                }
                match service.submit_request(&actor, SubmitRequest { template_id, field_data }) {
                    Ok(r) => println!("Solicitud enviada: {} [{}]", r.id, r.overall_status),
                    Err(e) => report("Error enviando solicitud", &e),
                }
            }
            "5" => {
                let Some(as_role) = read_role()? else { continue };
                let condition = read_condition()?;
                let page = read_page()?;
                match service.list_requests(&actor, &ListRequests { as_role, page, limit: None, condition }) {
                    Ok(p) => {
                        println!("\n{} solicitudes (página {})", p.total, p.page);
                        for r in p.result {
                            println!("{} | {:10} | paso {} | {} | {}",
                                     r.id, r.overall_status, r.current_step_index, r.submitter_id, r.template_name);
                        }
                    }
                    Err(e) => report("Error listando solicitudes", &e),
                }
            }
            "6" => {
                let Some(as_role) = read_role()? else { continue };
                let condition = read_condition()?;
                let page = read_page()?;
                match service.list_work_items(&actor, &ListWorkItems { as_role, page, limit: None, condition }) {
                    Ok(p) => {
                        println!("\n{} items (página {})", p.total, p.page);
                        for w in p.result {
                            println!("{} | solicitud {} | paso {} | {} | {} | {}",
                                     w.id,
                                     w.request_id,
                                     w.step_index,
                                     w.assigned_role,
                                     w.status,
                                     w.assigned_actor_id.unwrap_or_else(|| "-".into()));
                        }
                    }
                    Err(e) => report("Error listando items", &e),
                }
            }
            "7" => {
                let Some(work_item_id) = read_uuid("Item (UUID): ")? else { continue };
                let assignee_id = prompt("Procesador (id): ")?;
                match service.route_work_item(&actor,
                                              RouteWorkItem { work_item_id, assignee_id: assignee_id.trim().to_string() })
                {
                    Ok(w) => println!("Item {} asignado a {}", w.id, w.assigned_actor_id.unwrap_or_default()),
                    Err(e) => report("Error asignando item", &e),
                }
            }
            "8" => {
                let Some(work_item_id) = read_uuid("Item (UUID): ")? else { continue };
                let decision = match prompt("Decisión (a = aprobar, r = rechazar): ")?.trim() {
                    "a" | "A" => Verdict::Approved,
                    "r" | "R" => Verdict::Rejected,
                    other => {
                        eprintln!("Decisión inválida: {}", other);
                        continue;
                    }
                };
                let raw = prompt("Adjuntos (URLs separadas por coma, enter para ninguno): ")?;
                let attachments = split_list(&raw);
                match service.decide_work_item(&actor, DecideWorkItem { work_item_id, decision, attachments }) {
                    Ok(out) => {
                        println!("Item decidido; solicitud {} [{}]", out.request.id, out.request.overall_status);
                        if let Some(next) = out.opened {
                            println!("Siguiente paso abierto: {} (paso {}, {})", next.id, next.step_index, next.assigned_role);
                        }
                    }
                    Err(e) => report("Error decidiendo item", &e),
                }
            }
            "9" => {
                let Some(request_id) = read_uuid("Solicitud (UUID): ")? else { continue };
                let confirm = prompt(&format!("Confirma cancelación de {}? escribir 'yes' para confirmar: ", request_id))?;
                if confirm.trim().to_lowercase() == "yes" {
                    match service.cancel_request(&actor, CancelRequest { request_id }) {
                        Ok(r) => println!("Solicitud {} [{}]", r.id, r.overall_status),
                        Err(e) => report("Error cancelando solicitud", &e),
                    }
                } else {
                    println!("Cancelación abortada");
                }
            }
            "10" => {
                let Some(request_id) = read_uuid("Solicitud (UUID): ")? else { continue };
                match service.get_request_status(&actor, &request_id) {
                    Ok(view) => {
                        println!("\n{} [{}] plantilla '{}'",
                                 view.request.id, view.request.overall_status, view.request.template_name);
                        if let Some(c) = &view.current {
                            println!("Paso actual: {} ({}) {} -> {}",
                                     c.step_index,
                                     c.step_name.as_deref().unwrap_or("-"),
                                     c.status,
                                     c.assigned_actor_id.as_deref().unwrap_or(c.assigned_role.as_str()));
                        }
                        for r in &view.timeline {
                            println!("  {} | paso {} | {} | {} | {}",
                                     r.timestamp,
                                     r.step_index,
                                     r.actor_role,
                                     r.actor_id.as_deref().unwrap_or("-"),
                                     r.decision);
                        }
                    }
                    Err(e) => report("Error leyendo estado", &e),
                }
            }
            "11" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
            }
        }
    }

    Ok(())
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}

/// Los fallos tipados se muestran al usuario; el resto (almacenamiento,
/// invariantes rotas) también se registra.
fn report(what: &str, e: &WorkflowError) {
    if !e.is_recoverable() {
        log::error!("{}: {:?}", what, e);
    }
    eprintln!("{}: {}", what, e);
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn read_uuid(msg: &str) -> io::Result<Option<Uuid>> {
    let raw = prompt(msg)?;
    match Uuid::parse_str(raw.trim()) {
        Ok(u) => Ok(Some(u)),
        Err(_) => {
            eprintln!("UUID inválido");
            Ok(None)
        }
    }
}

fn read_role() -> io::Result<Option<Role>> {
    let raw = prompt("Ver como (submitter/coordinator/processor/admin): ")?;
    match raw.trim().parse::<Role>() {
        Ok(r) => Ok(Some(r)),
        Err(e) => {
            eprintln!("{}", e);
            Ok(None)
        }
    }
}

fn read_page() -> io::Result<Option<u32>> {
    let raw = prompt("Página (enter para 1): ")?;
    Ok(raw.trim().parse().ok())
}

/// Lee pares `clave=valor` separados por coma (por ejemplo
/// `status=PENDING,templateId=...`).
fn read_condition() -> io::Result<Map<String, JsonValue>> {
    let raw = prompt("Filtro (clave=valor, separados por coma; enter para ninguno): ")?;
    let mut condition = Map::new();
    for pair in split_list(&raw) {
        if let Some((k, v)) = pair.split_once('=') {
            condition.insert(k.trim().to_string(), JsonValue::String(v.trim().to_string()));
        }
    }
    Ok(condition)
}

fn parse_value(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn read_actor() -> Result<Actor, Box<dyn Error>> {
    let id = prompt("Id del actor: ")?;
    let roles = prompt("Roles (separados por coma): ")?;
    let roles = split_list(&roles).iter().map(|r| r.parse::<Role>()).collect::<Result<BTreeSet<_>, _>>()?;
    if id.trim().is_empty() || roles.is_empty() {
        return Err("se necesita id y al menos un rol".into());
    }
    Ok(Actor::new(id.trim(), roles))
}

/// Campos como `id:tipo[:req]` (tipo = text|number|date|attachment|choice/a/b)
/// y pasos como lista de roles en orden.
fn read_template() -> Result<FormTemplate, Box<dyn Error>> {
    let name = prompt("Nombre: ")?;
    let note = prompt("Nota (enter para vacía): ")?;
    let fields_raw = prompt("Campos (id:tipo[:req], separados por coma): ")?;
    let steps_raw = prompt("Pasos (coordinator/processor en orden, separados por coma): ")?;

    let mut fields = Vec::new();
    for raw_field in split_list(&fields_raw) {
        let parts: Vec<&str> = raw_field.split(':').collect();
        let id = parts[0].trim();
        let kind = match parts.get(1).map(|k| k.trim()).unwrap_or("text") {
            "number" => FieldKind::Number,
            "date" => FieldKind::Date,
            "attachment" => FieldKind::Attachment,
            k if k.starts_with("choice/") => {
                FieldKind::Choice { options: k.split('/').skip(1).map(|o| o.to_string()).collect() }
            }
            _ => FieldKind::Text,
        };
        let required = parts.get(2).map(|r| r.trim() == "req").unwrap_or(false);
        fields.push(FieldDefinition::new(id, id, kind, required));
    }
    let mut process = Vec::new();
    for (i, role) in split_list(&steps_raw).iter().enumerate() {
        process.push(StepDefinition::new(u32::try_from(i)?, role.parse::<StepRole>()?));
    }
    let note = if note.trim().is_empty() { None } else { Some(note.trim().to_string()) };
    Ok(FormTemplate::new(name.trim(), note, fields, process)?)
}
