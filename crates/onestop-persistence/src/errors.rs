// Errores de infraestructura (pool, migraciones, configuración). Se convierten
// en el `Storage` de cada crate consumidor.
use flow::WorkflowError;
use onestop_forms::FormError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
  #[error("pool: {0}")]
  Pool(String),
  #[error("migraciones: {0}")]
  Migration(String),
  #[error("configuración: {0}")]
  Config(String),
  #[error("db: {0}")]
  Database(#[from] diesel::result::Error),
  #[error("datos corruptos: {0}")]
  Corrupt(String),
}

impl From<r2d2::Error> for PersistenceError {
  fn from(e: r2d2::Error) -> Self {
    PersistenceError::Pool(e.to_string())
  }
}

impl From<PersistenceError> for WorkflowError {
  fn from(e: PersistenceError) -> Self {
    WorkflowError::Storage(e.to_string())
  }
}

impl From<PersistenceError> for FormError {
  fn from(e: PersistenceError) -> Self {
    FormError::StorageError(e.to_string())
  }
}

pub(crate) fn map_db_err<T>(res: std::result::Result<T, diesel::result::Error>) -> Result<T, WorkflowError> {
  res.map_err(|e| WorkflowError::Storage(format!("db: {}", e)))
}
