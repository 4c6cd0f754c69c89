//! Persistencia Diesel del servicio de ventanilla única.
//! Expone el módulo `schema`, el pool con migraciones embebidas y los
//! repositorios que implementan `flow::WorkflowRepository` y
//! `onestop_forms::TemplateStore`. SQLite por defecto; Postgres con la
//! feature `pg`.

mod db;
mod errors;
pub mod schema;
mod template_persistence;
mod workflow_persistence;

pub use db::{connect, connect_from_env, database_url_from_env, DbConn, DbPool, ENV_DB_URL, MIGRATIONS};
pub use errors::PersistenceError;
pub use template_persistence::DieselTemplateStore;
pub use workflow_persistence::DieselWorkflowRepository;

use std::sync::Arc;

/// Abre la base de datos del entorno una sola vez y devuelve ambos
/// repositorios compartiendo el pool.
pub fn open_from_env() -> Result<(Arc<DieselWorkflowRepository>, Arc<DieselTemplateStore>), PersistenceError> {
  let pool = connect_from_env()?;
  Ok((Arc::new(DieselWorkflowRepository::from_pool(pool.clone())), Arc::new(DieselTemplateStore::from_pool(pool))))
}
