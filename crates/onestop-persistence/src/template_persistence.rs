// Implementación Diesel de `TemplateStore` (tabla form_templates).
use crate::db::{self, DbPool, PooledConn};
use crate::errors::PersistenceError;
use crate::schema::{self, form_templates};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use onestop_forms::{sort_summaries, FormError, FormTemplate, TemplateFilter, TemplateStore, TemplateSummary};
use std::sync::Arc;
use uuid::Uuid;

pub struct DieselTemplateStore {
  pool: Arc<DbPool>,
}

impl DieselTemplateStore {
  pub fn new(database_url: &str) -> Result<Self, PersistenceError> {
    Ok(Self::from_pool(db::connect(database_url)?))
  }

  pub fn from_pool(pool: Arc<DbPool>) -> Self {
    Self { pool }
  }

  fn conn(&self) -> Result<PooledConn, FormError> {
    self.pool.get().map_err(|e| FormError::StorageError(format!("pool: {}", e)))
  }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = schema::form_templates)]
struct TemplateRow {
  pub id: String,
  pub name: String,
  pub note: Option<String>,
  pub field_config: String,
  pub process: String,
  pub created_at_ts: i64,
}

fn map_db_err<T>(res: Result<T, diesel::result::Error>) -> Result<T, FormError> {
  res.map_err(|e| FormError::StorageError(format!("db: {}", e)))
}

impl TemplateRow {
  fn from_domain(t: &FormTemplate) -> Result<Self, FormError> {
    Ok(Self { id: t.id.to_string(),
              name: t.name.clone(),
              note: t.note.clone(),
              field_config: serde_json::to_string(&t.field_config)?,
              process: serde_json::to_string(&t.process)?,
              created_at_ts: t.created_at.timestamp_millis() })
  }

  fn into_domain(self) -> Result<FormTemplate, FormError> {
    let id = Uuid::parse_str(&self.id).map_err(|e| FormError::StorageError(format!("uuid inválido: {}", e)))?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(self.created_at_ts)
      .ok_or_else(|| FormError::StorageError(format!("timestamp inválido: {}", self.created_at_ts)))?;
    Ok(FormTemplate { id,
                      name: self.name,
                      note: self.note,
                      field_config: serde_json::from_str(&self.field_config)?,
                      process: serde_json::from_str(&self.process)?,
                      created_at })
  }
}

impl TemplateStore for DieselTemplateStore {
  fn get_template(&self, id: &Uuid) -> Result<FormTemplate, FormError> {
    let mut conn = self.conn()?;
    let row = map_db_err(form_templates::table.find(id.to_string()).first::<TemplateRow>(&mut conn).optional())?;
    row.ok_or(FormError::NotFound(format!("plantilla {}", id)))?.into_domain()
  }

  fn list_templates(&self, filter: &TemplateFilter) -> Result<Vec<TemplateSummary>, FormError> {
    let mut conn = self.conn()?;
    let rows = map_db_err(form_templates::table.load::<TemplateRow>(&mut conn))?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
      let t = row.into_domain()?;
      if filter.matches(&t) {
        out.push(t.summary());
      }
    }
    sort_summaries(&mut out);
    Ok(out)
  }

  fn create_template(&self, template: FormTemplate) -> Result<Uuid, FormError> {
    template.validate()?;
    let row = TemplateRow::from_domain(&template)?;
    let mut conn = self.conn()?;
    match diesel::insert_into(form_templates::table).values(&row).execute(&mut conn) {
      Ok(_) => {}
      Err(diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _)) => {
        return Err(FormError::ValidationError(format!("La plantilla {} ya existe", template.id)));
      }
      Err(e) => return map_db_err(Err(e)),
    }
    log::info!("plantilla creada: {}", template.id);
    Ok(template.id)
  }

  fn update_template(&self, id: &Uuid, mut template: FormTemplate) -> Result<FormTemplate, FormError> {
    template.validate()?;
    let existing = self.get_template(id)?;
    template.id = *id;
    template.created_at = existing.created_at;
    let row = TemplateRow::from_domain(&template)?;
    let mut conn = self.conn()?;
    let n = map_db_err(diesel::update(form_templates::table.find(&row.id)).set((form_templates::name.eq(&row.name),
                                                                                 form_templates::note.eq(&row.note),
                                                                                 form_templates::field_config
                                                                                                 .eq(&row.field_config),
                                                                                 form_templates::process.eq(&row.process)))
                                                                           .execute(&mut conn))?;
    if n == 0 {
      return Err(FormError::NotFound(format!("plantilla {}", id)));
    }
    log::info!("plantilla actualizada: {} (revisión {})", id, template.revision());
    Ok(template)
  }

  fn delete_template(&self, id: &Uuid) -> Result<(), FormError> {
    let mut conn = self.conn()?;
    let n = map_db_err(diesel::delete(form_templates::table.find(id.to_string())).execute(&mut conn))?;
    if n == 0 {
      return Err(FormError::NotFound(format!("plantilla {}", id)));
    }
    log::info!("plantilla eliminada: {}", id);
    Ok(())
  }
}
