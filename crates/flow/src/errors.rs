// Archivo: errors.rs
// Propósito: definir los errores del ciclo de vida de solicitudes y el alias
// Result<T> usado por las APIs del crate.
use onestop_forms::FormError;
use thiserror::Error;

/// Errores del motor de solicitudes.
///
/// - `NotFound`, `Validation`, `InvalidState`, `Forbidden` y `Conflict` son
///   recuperables: se devuelven al llamador y el motor no reintenta.
/// - `InternalInconsistency` indica una invariante rota (por ejemplo dos
///   pasos activos para una misma solicitud). Se registra y la operación
///   falla sin cambios.
/// - `Storage` y `Serialization` provienen de la persistencia.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Plantilla, solicitud o item de trabajo inexistente.
    #[error("No encontrado: {0}")]
    NotFound(String),
    /// Datos enviados que no cumplen la configuración de la plantilla o
    /// parámetros de consulta inválidos.
    #[error("Error de validación: {0}")]
    Validation(String),
    /// Operación incompatible con el estado actual (doble decisión,
    /// asignación tras resolver, decidir sobre una solicitud cancelada...).
    #[error("Estado inválido: {0}")]
    InvalidState(String),
    /// El actor no tiene el rol o la asignación requerida.
    #[error("Prohibido: {0}")]
    Forbidden(String),
    /// Dos escritores compitieron por la misma solicitud; éste perdió.
    #[error("Conflicto: {0}")]
    Conflict(String),
    /// Invariante violada. Nunca esperado en operación correcta.
    #[error("Inconsistencia interna: {0}")]
    InternalInconsistency(String),
    /// Error genérico de almacenamiento (BD, pool, mutex envenenado).
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
    #[error("Error de serialización: {0}")]
    Serialization(String),
}

impl WorkflowError {
    /// `true` para los fallos tipados que el llamador puede tratar (reintentar,
    /// refrescar la vista, corregir el formulario).
    pub fn is_recoverable(&self) -> bool {
        matches!(self,
                 WorkflowError::NotFound(_)
                 | WorkflowError::Validation(_)
                 | WorkflowError::InvalidState(_)
                 | WorkflowError::Forbidden(_)
                 | WorkflowError::Conflict(_))
    }
}

impl From<FormError> for WorkflowError {
    fn from(e: FormError) -> Self {
        match e {
            FormError::NotFound(m) => WorkflowError::NotFound(m),
            FormError::ValidationError(m) => WorkflowError::Validation(m),
            FormError::StorageError(m) => WorkflowError::Storage(m),
            FormError::SerializationError(m) => WorkflowError::Serialization(m),
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(e: serde_json::Error) -> Self {
        WorkflowError::Serialization(e.to_string())
    }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, WorkflowError>;
