//! onestop-forms: plantillas de formularios (BieuMau) del servicio de
//! ventanilla única.
//!
//! Define la configuración de campos, el proceso ordenado de pasos de
//! aprobación, la validación de los datos enviados y el contrato
//! `TemplateStore` con una implementación en memoria.
mod errors;
mod field;
mod template;
mod template_store;

pub use errors::{FormError, Result};
pub use field::{validate_field_config, validate_field_data, FieldData, FieldDefinition, FieldKind};
pub use template::{validate_process, FormTemplate, StepDefinition, StepRole, TemplateSummary};
pub use template_store::{sort_summaries, InMemoryTemplateStore, TemplateFilter, TemplateStore};
