// Implementación Diesel de `WorkflowRepository`: solicitudes, items de trabajo
// y registros de estado. Una `Transition` se aplica dentro de una única
// transacción guardada por la versión de la solicitud.
use crate::db::{self, DbBackend, DbConn, DbPool, PooledConn};
use crate::errors::{map_db_err, PersistenceError};
use crate::schema::{self, requests, step_records, work_items};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use flow::errors::Result;
use flow::{active_after_commit, Decision, Page, PersistResult, Request, RequestQuery, RequestSnapshot, RequestStatus,
           StepStatusRecord, Transition, WorkItem, WorkItemQuery, WorkItemStatus, WorkflowError, WorkflowRepository};
use onestop_forms::StepRole;
use std::sync::Arc;
use uuid::Uuid;

/// Repo Diesel que implementa `WorkflowRepository`.
pub struct DieselWorkflowRepository {
  pool: Arc<DbPool>,
}

impl DieselWorkflowRepository {
  /// Abre (o crea) la base de datos en `database_url` y aplica migraciones.
  pub fn new(database_url: &str) -> std::result::Result<Self, PersistenceError> {
    Ok(Self::from_pool(db::connect(database_url)?))
  }

  /// Reutiliza un pool ya migrado (por ejemplo el del almacén de plantillas).
  pub fn from_pool(pool: Arc<DbPool>) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &Arc<DbPool> {
    &self.pool
  }

  fn conn(&self) -> Result<PooledConn> {
    self.pool.get().map_err(|e| WorkflowError::Storage(format!("pool: {}", e)))
  }
}

// Filas Diesel. Las marcas de tiempo se guardan en milisegundos desde epoch y
// los campos estructurados como JSON en texto.
#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = schema::requests)]
struct RequestRow {
  pub id: String,
  pub template_id: String,
  pub template_name: String,
  pub template_revision: String,
  pub submitter_id: String,
  pub field_data: String,
  pub process: String,
  pub overall_status: String,
  pub current_step_index: i32,
  pub version: i64,
  pub created_at_ts: i64,
  pub updated_at_ts: i64,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = schema::work_items)]
struct WorkItemRow {
  pub id: String,
  pub request_id: String,
  pub template_id: String,
  pub step_index: i32,
  pub assigned_role: String,
  pub assigned_actor_id: Option<String>,
  pub status: String,
  pub decision: String,
  pub attachments: String,
  pub routed_by: Option<String>,
  pub routed_at_ts: Option<i64>,
  pub decided_by: Option<String>,
  pub decided_at_ts: Option<i64>,
  pub created_at_ts: i64,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = schema::step_records)]
struct RecordRow {
  pub id: String,
  pub request_id: String,
  pub work_item_id: String,
  pub seq: i64,
  pub step_index: i32,
  pub actor_role: String,
  pub actor_id: Option<String>,
  pub decision: String,
  pub timestamp_ts: i64,
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> WorkflowError {
  WorkflowError::Storage(format!("{} inválido en la base de datos: {}", what, detail))
}

fn parse_id(s: &str) -> Result<Uuid> {
  Uuid::parse_str(s).map_err(|e| corrupt("uuid", e))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
  DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| corrupt("timestamp", ms))
}

fn step_to_db(index: u32) -> Result<i32> {
  i32::try_from(index).map_err(|_| WorkflowError::Validation(format!("índice de paso fuera de rango: {}", index)))
}

fn step_from_db(index: i32) -> Result<u32> {
  u32::try_from(index).map_err(|_| corrupt("índice de paso", index))
}

fn parse_role(s: &str) -> Result<StepRole> {
  s.parse::<StepRole>().map_err(|e| corrupt("rol", e))
}

impl RequestRow {
  fn from_domain(r: &Request) -> Result<Self> {
    Ok(Self { id: r.id.to_string(),
              template_id: r.template_id.to_string(),
              template_name: r.template_name.clone(),
              template_revision: r.template_revision.clone(),
              submitter_id: r.submitter_id.clone(),
              field_data: serde_json::to_string(&r.field_data)?,
              process: serde_json::to_string(&r.process)?,
              overall_status: r.overall_status.as_str().to_string(),
              current_step_index: step_to_db(r.current_step_index)?,
              version: r.version,
              created_at_ts: r.created_at.timestamp_millis(),
              updated_at_ts: r.updated_at.timestamp_millis() })
  }

  fn into_domain(self) -> Result<Request> {
    Ok(Request { id: parse_id(&self.id)?,
                 template_id: parse_id(&self.template_id)?,
                 template_name: self.template_name,
                 template_revision: self.template_revision,
                 submitter_id: self.submitter_id,
                 field_data: serde_json::from_str(&self.field_data)?,
                 process: serde_json::from_str(&self.process)?,
                 overall_status: self.overall_status.parse::<RequestStatus>().map_err(|e| corrupt("estado", e))?,
                 current_step_index: step_from_db(self.current_step_index)?,
                 version: self.version,
                 created_at: from_millis(self.created_at_ts)?,
                 updated_at: from_millis(self.updated_at_ts)? })
  }
}

impl WorkItemRow {
  fn from_domain(w: &WorkItem) -> Result<Self> {
    Ok(Self { id: w.id.to_string(),
              request_id: w.request_id.to_string(),
              template_id: w.template_id.to_string(),
              step_index: step_to_db(w.step_index)?,
              assigned_role: w.assigned_role.as_str().to_string(),
              assigned_actor_id: w.assigned_actor_id.clone(),
              status: w.status.as_str().to_string(),
              decision: w.decision.as_str().to_string(),
              attachments: serde_json::to_string(&w.attachments)?,
              routed_by: w.routed_by.clone(),
              routed_at_ts: w.routed_at.map(|t| t.timestamp_millis()),
              decided_by: w.decided_by.clone(),
              decided_at_ts: w.decided_at.map(|t| t.timestamp_millis()),
              created_at_ts: w.created_at.timestamp_millis() })
  }

  fn into_domain(self) -> Result<WorkItem> {
    Ok(WorkItem { id: parse_id(&self.id)?,
                  request_id: parse_id(&self.request_id)?,
                  template_id: parse_id(&self.template_id)?,
                  step_index: step_from_db(self.step_index)?,
                  assigned_role: parse_role(&self.assigned_role)?,
                  assigned_actor_id: self.assigned_actor_id,
                  status: self.status.parse::<WorkItemStatus>().map_err(|e| corrupt("estado de item", e))?,
                  decision: self.decision.parse::<Decision>().map_err(|e| corrupt("decisión", e))?,
                  attachments: serde_json::from_str(&self.attachments)?,
                  routed_by: self.routed_by,
                  routed_at: self.routed_at_ts.map(from_millis).transpose()?,
                  decided_by: self.decided_by,
                  decided_at: self.decided_at_ts.map(from_millis).transpose()?,
                  created_at: from_millis(self.created_at_ts)? })
  }
}

impl RecordRow {
  fn from_domain(r: &StepStatusRecord, seq: i64) -> Result<Self> {
    Ok(Self { id: r.id.to_string(),
              request_id: r.request_id.to_string(),
              work_item_id: r.work_item_id.to_string(),
              seq,
              step_index: step_to_db(r.step_index)?,
              actor_role: r.actor_role.as_str().to_string(),
              actor_id: r.actor_id.clone(),
              decision: r.decision.as_str().to_string(),
              timestamp_ts: r.timestamp.timestamp_millis() })
  }

  fn into_domain(self) -> Result<StepStatusRecord> {
    Ok(StepStatusRecord { id: parse_id(&self.id)?,
                          request_id: parse_id(&self.request_id)?,
                          work_item_id: parse_id(&self.work_item_id)?,
                          step_index: step_from_db(self.step_index)?,
                          actor_role: parse_role(&self.actor_role)?,
                          actor_id: self.actor_id,
                          decision: self.decision.parse::<Decision>().map_err(|e| corrupt("decisión", e))?,
                          timestamp: from_millis(self.timestamp_ts)? })
  }
}

/// Error interno de la transacción de `commit`: Diesel o una regla del flujo
/// (que obliga a deshacer).
enum TxError {
  Db(DieselError),
  Workflow(WorkflowError),
}

impl From<DieselError> for TxError {
  fn from(e: DieselError) -> Self {
    TxError::Db(e)
  }
}

impl From<WorkflowError> for TxError {
  fn from(e: WorkflowError) -> Self {
    TxError::Workflow(e)
  }
}

/// Transacción de escritura. En SQLite se toma el cerrojo de escritura al
/// empezar (`BEGIN IMMEDIATE`) para no fallar al pasar de lectura a escritura.
#[cfg(not(feature = "pg"))]
fn write_tx<T, E, F>(conn: &mut DbConn, f: F) -> std::result::Result<T, E>
  where F: FnOnce(&mut DbConn) -> std::result::Result<T, E>,
        E: From<DieselError>
{
  conn.immediate_transaction(f)
}

#[cfg(feature = "pg")]
fn write_tx<T, E, F>(conn: &mut DbConn, f: F) -> std::result::Result<T, E>
  where F: FnOnce(&mut DbConn) -> std::result::Result<T, E>,
        E: From<DieselError>
{
  conn.transaction(f)
}

/// Transacción de sólo lectura: todas las consultas ven el mismo estado
/// confirmado. En SQLite (WAL) la instantánea se fija en la primera lectura.
#[cfg(not(feature = "pg"))]
fn read_tx<T, F>(conn: &mut DbConn, f: F) -> std::result::Result<T, DieselError>
  where F: FnOnce(&mut DbConn) -> std::result::Result<T, DieselError>
{
  conn.transaction(f)
}

#[cfg(feature = "pg")]
fn read_tx<T, F>(conn: &mut DbConn, f: F) -> std::result::Result<T, DieselError>
  where F: FnOnce(&mut DbConn) -> std::result::Result<T, DieselError>
{
  conn.build_transaction().read_only().repeatable_read().run(f)
}

const ACTIVE: [&str; 2] = ["OPEN", "ROUTED"];

fn filtered_requests(query: &RequestQuery) -> requests::BoxedQuery<'static, DbBackend> {
  let mut q = requests::table.into_boxed::<DbBackend>();
  if let Some(s) = &query.submitter_id {
    q = q.filter(requests::submitter_id.eq(s.clone()));
  }
  if let Some(status) = query.status {
    q = q.filter(requests::overall_status.eq(status.as_str()));
  }
  if let Some(t) = query.template_id {
    q = q.filter(requests::template_id.eq(t.to_string()));
  }
  if query.coordinator_queue {
    let queue = work_items::table.filter(work_items::assigned_role
                                                   .eq(StepRole::Coordinator.as_str())
                                                   .and(work_items::status.eq_any(ACTIVE.to_vec()))
                                                   .or(work_items::assigned_role
                                                                 .eq(StepRole::Processor.as_str())
                                                                 .and(work_items::status.eq(WorkItemStatus::Open.as_str()))))
                                 .select(work_items::request_id);
    q = q.filter(requests::id.eq_any(queue));
  }
  if let Some(actor) = &query.active_actor_id {
    let mine = work_items::table.filter(work_items::assigned_actor_id.eq(actor.clone()))
                                .filter(work_items::status.eq_any(ACTIVE.to_vec()))
                                .select(work_items::request_id);
    q = q.filter(requests::id.eq_any(mine));
  }
  q
}

fn filtered_work_items(query: &WorkItemQuery) -> work_items::BoxedQuery<'static, DbBackend> {
  let mut q = work_items::table.into_boxed::<DbBackend>();
  if query.coordinator_queue {
    q = q.filter(work_items::assigned_role
                           .eq(StepRole::Coordinator.as_str())
                           .or(work_items::assigned_role
                                         .eq(StepRole::Processor.as_str())
                                         .and(work_items::status.eq(WorkItemStatus::Open.as_str()))));
  }
  if let Some(role) = query.assigned_role {
    q = q.filter(work_items::assigned_role.eq(role.as_str()));
  }
  if let Some(actor) = &query.assigned_actor_id {
    q = q.filter(work_items::assigned_actor_id.eq(actor.clone()));
  }
  if let Some(status) = query.status {
    q = q.filter(work_items::status.eq(status.as_str()));
  }
  if let Some(t) = query.template_id {
    q = q.filter(work_items::template_id.eq(t.to_string()));
  }
  q
}

fn to_u64(n: i64) -> u64 {
  u64::try_from(n).unwrap_or(0)
}

fn offset_of(offset: u64) -> i64 {
  i64::try_from(offset).unwrap_or(i64::MAX)
}

impl WorkflowRepository for DieselWorkflowRepository {
  fn create_request(&self, request: &Request, first_item: &WorkItem) -> Result<()> {
    if first_item.request_id != request.id {
      return Err(WorkflowError::InternalInconsistency(format!("el item {} no pertenece a la solicitud {}",
                                                              first_item.id, request.id)));
    }
    let req_row = RequestRow::from_domain(request)?;
    let item_row = WorkItemRow::from_domain(first_item)?;
    let mut conn = self.conn()?;
    let res = write_tx(&mut conn, |conn| {
      diesel::insert_into(requests::table).values(&req_row).execute(conn)?;
      diesel::insert_into(work_items::table).values(&item_row).execute(conn)?;
      Ok::<_, DieselError>(())
    });
    match res {
      Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
        Err(WorkflowError::Conflict(format!("la solicitud {} ya existe", request.id)))
      }
      other => map_db_err(other),
    }
  }

  fn get_request(&self, request_id: &Uuid) -> Result<Request> {
    let mut conn = self.conn()?;
    let row = map_db_err(requests::table.find(request_id.to_string()).first::<RequestRow>(&mut conn).optional())?;
    row.ok_or(WorkflowError::NotFound(format!("solicitud {}", request_id)))?.into_domain()
  }

  fn get_work_item(&self, work_item_id: &Uuid) -> Result<WorkItem> {
    let mut conn = self.conn()?;
    let row = map_db_err(work_items::table.find(work_item_id.to_string()).first::<WorkItemRow>(&mut conn).optional())?;
    row.ok_or(WorkflowError::NotFound(format!("item de trabajo {}", work_item_id)))?.into_domain()
  }

  fn work_items_for(&self, request_id: &Uuid) -> Result<Vec<WorkItem>> {
    let mut conn = self.conn()?;
    let rows = map_db_err(work_items::table.filter(work_items::request_id.eq(request_id.to_string()))
                                           .order((work_items::step_index.asc(), work_items::created_at_ts.asc()))
                                           .load::<WorkItemRow>(&mut conn))?;
    rows.into_iter().map(WorkItemRow::into_domain).collect()
  }

  fn records_for(&self, request_id: &Uuid) -> Result<Vec<StepStatusRecord>> {
    let mut conn = self.conn()?;
    let rows = map_db_err(step_records::table.filter(step_records::request_id.eq(request_id.to_string()))
                                             .order(step_records::seq.asc())
                                             .load::<RecordRow>(&mut conn))?;
    rows.into_iter().map(RecordRow::into_domain).collect()
  }

  fn request_snapshot(&self, request_id: &Uuid) -> Result<RequestSnapshot> {
    let id = request_id.to_string();
    let mut conn = self.conn()?;
    let rows = map_db_err(read_tx(&mut conn, |conn| {
                 let request = requests::table.find(&id).first::<RequestRow>(conn).optional()?;
                 let items = work_items::table.filter(work_items::request_id.eq(&id))
                                              .order((work_items::step_index.asc(), work_items::created_at_ts.asc()))
                                              .load::<WorkItemRow>(conn)?;
                 let records = step_records::table.filter(step_records::request_id.eq(&id))
                                                  .order(step_records::seq.asc())
                                                  .load::<RecordRow>(conn)?;
                 Ok((request, items, records))
               }))?;
    let (request, items, records) = rows;
    let request = request.ok_or(WorkflowError::NotFound(format!("solicitud {}", request_id)))?.into_domain()?;
    Ok(RequestSnapshot { request,
                         items: items.into_iter().map(WorkItemRow::into_domain).collect::<Result<Vec<_>>>()?,
                         records: records.into_iter().map(RecordRow::into_domain).collect::<Result<Vec<_>>>()? })
  }

  fn commit(&self, transition: &Transition, expected_version: i64) -> Result<PersistResult> {
    let request_row = RequestRow::from_domain(&transition.request)?;
    let updated_rows = transition.updated_items.iter().map(WorkItemRow::from_domain).collect::<Result<Vec<_>>>()?;
    let opened_row = transition.opened_item.as_ref().map(WorkItemRow::from_domain).transpose()?;
    let request_id = request_row.id.clone();
    let mut conn = self.conn()?;

    let res = write_tx(&mut conn, |conn| -> std::result::Result<PersistResult, TxError> {
      let stored = requests::table.find(&request_id).select(requests::version).first::<i64>(conn).optional()?;
      match stored {
        None => return Err(WorkflowError::NotFound(format!("solicitud {}", request_id)).into()),
        Some(v) if v != expected_version => return Ok(PersistResult::Conflict),
        Some(_) => {}
      }

      let existing = work_items::table.filter(work_items::request_id.eq(&request_id))
                                      .load::<WorkItemRow>(conn)?
                                      .into_iter()
                                      .map(WorkItemRow::into_domain)
                                      .collect::<Result<Vec<_>>>()?;
      for updated in &transition.updated_items {
        if !existing.iter().any(|w| w.id == updated.id) {
          return Err(WorkflowError::InternalInconsistency(format!("el item {} no pertenece a la solicitud {}",
                                                                  updated.id, request_id)).into());
        }
      }
      let active = active_after_commit(existing.iter(), transition);
      if active > 1 {
        return Err(WorkflowError::InternalInconsistency(format!("la solicitud {} quedaría con {} pasos activos",
                                                                request_id, active)).into());
      }

      let new_version = expected_version + 1;
      let n = diesel::update(requests::table.filter(requests::id.eq(&request_id))
                                            .filter(requests::version.eq(expected_version)))
              .set((requests::overall_status.eq(&request_row.overall_status),
                    requests::current_step_index.eq(request_row.current_step_index),
                    requests::version.eq(new_version),
                    requests::updated_at_ts.eq(request_row.updated_at_ts)))
              .execute(conn)?;
      if n == 0 {
        return Ok(PersistResult::Conflict);
      }
      for row in &updated_rows {
        diesel::update(work_items::table.find(&row.id)).set((work_items::assigned_actor_id.eq(&row.assigned_actor_id),
                                                              work_items::status.eq(&row.status),
                                                              work_items::decision.eq(&row.decision),
                                                              work_items::attachments.eq(&row.attachments),
                                                              work_items::routed_by.eq(&row.routed_by),
                                                              work_items::routed_at_ts.eq(row.routed_at_ts),
                                                              work_items::decided_by.eq(&row.decided_by),
                                                              work_items::decided_at_ts.eq(row.decided_at_ts)))
                                                        .execute(conn)?;
      }
      if let Some(row) = &opened_row {
        diesel::insert_into(work_items::table).values(row).execute(conn)?;
      }
      if let Some(record) = &transition.record {
        let seq = step_records::table.filter(step_records::request_id.eq(&request_id))
                                     .count()
                                     .get_result::<i64>(conn)?
                  + 1;
        let row = RecordRow::from_domain(record, seq)?;
        diesel::insert_into(step_records::table).values(&row).execute(conn)?;
      }
      Ok(PersistResult::Ok { new_version })
    });

    match res {
      Ok(r) => Ok(r),
      Err(TxError::Db(e)) => Err(WorkflowError::Storage(format!("db: {}", e))),
      Err(TxError::Workflow(e)) => {
        if let WorkflowError::InternalInconsistency(msg) = &e {
          log::error!("commit rechazado: {}", msg);
        }
        Err(e)
      }
    }
  }

  fn list_requests(&self, query: &RequestQuery) -> Result<Page<Request>> {
    let mut conn = self.conn()?;
    let (total, rows) = map_db_err(read_tx(&mut conn, |conn| {
                          let total = filtered_requests(query).count().get_result::<i64>(conn)?;
                          let rows = filtered_requests(query).order((requests::created_at_ts.desc(), requests::id.asc()))
                                                             .limit(i64::from(query.page.limit))
                                                             .offset(offset_of(query.page.offset()))
                                                             .load::<RequestRow>(conn)?;
                          Ok((total, rows))
                        }))?;
    let result = rows.into_iter().map(RequestRow::into_domain).collect::<Result<Vec<_>>>()?;
    log::debug!("list_requests: {} de {}", result.len(), total);
    Ok(Page { result, total: to_u64(total), page: query.page.page, limit: query.page.limit })
  }

  fn list_work_items(&self, query: &WorkItemQuery) -> Result<Page<WorkItem>> {
    let mut conn = self.conn()?;
    let (total, rows) = map_db_err(read_tx(&mut conn, |conn| {
                          let total = filtered_work_items(query).count().get_result::<i64>(conn)?;
                          let rows = filtered_work_items(query).order((work_items::created_at_ts.desc(),
                                                                       work_items::id.asc()))
                                                               .limit(i64::from(query.page.limit))
                                                               .offset(offset_of(query.page.offset()))
                                                               .load::<WorkItemRow>(conn)?;
                          Ok((total, rows))
                        }))?;
    let result = rows.into_iter().map(WorkItemRow::into_domain).collect::<Result<Vec<_>>>()?;
    Ok(Page { result, total: to_u64(total), page: query.page.page, limit: query.page.limit })
  }
}
