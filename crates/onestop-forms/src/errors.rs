// errors.rs
use thiserror::Error;

/// Errores del almacén de plantillas y de la validación de formularios.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
  #[error("Error de validación: {0}")]
  ValidationError(String),
  #[error("No encontrado: {0}")]
  NotFound(String),
  #[error("Error de almacenamiento: {0}")]
  StorageError(String),
  #[error("Error de serialización: {0}")]
  SerializationError(String),
}

impl From<serde_json::Error> for FormError {
  fn from(e: serde_json::Error) -> Self {
    Self::SerializationError(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, FormError>;
