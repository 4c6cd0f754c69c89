// template.rs
use crate::field::{validate_field_config, FieldDefinition};
use crate::FormError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Rol responsable de un paso del proceso de aprobación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRole {
  /// Chuyên viên điều phối: recibe el paso y puede resolverlo o asignarlo.
  Coordinator,
  /// Chuyên viên xử lý: resuelve el paso una vez asignado.
  Processor,
}

impl StepRole {
  pub fn as_str(&self) -> &'static str {
    match self {
      StepRole::Coordinator => "coordinator",
      StepRole::Processor => "processor",
    }
  }
}

impl fmt::Display for StepRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StepRole {
  type Err = FormError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "coordinator" => Ok(StepRole::Coordinator),
      "processor" => Ok(StepRole::Processor),
      other => Err(FormError::ValidationError(format!("Rol de paso desconocido: {}", other))),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
  pub step_index: u32,
  pub actor_role: StepRole,
  #[serde(default)]
  pub name: Option<String>,
  /// Pista opcional para el coordinador (por ejemplo la unidad a la que
  /// suele asignarse el paso).
  #[serde(default)]
  pub routing_hint: Option<String>,
}

impl StepDefinition {
  pub fn new(step_index: u32, actor_role: StepRole) -> Self {
    Self { step_index, actor_role, name: None, routing_hint: None }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_routing_hint(mut self, hint: impl Into<String>) -> Self {
    self.routing_hint = Some(hint.into());
    self
  }
}

/// Comprueba el proceso: al menos un paso e índices contiguos desde 0.
pub fn validate_process(process: &[StepDefinition]) -> Result<(), FormError> {
  if process.is_empty() {
    return Err(FormError::ValidationError("El proceso debe tener al menos un paso".to_string()));
  }
  for (expected, step) in process.iter().enumerate() {
    if step.step_index as usize != expected {
      return Err(FormError::ValidationError(format!("Índice de paso inválido: se esperaba {} y llegó {}",
                                                    expected, step.step_index)));
    }
  }
  Ok(())
}

/// Plantilla de formulario (BieuMau): campos + pasos de aprobación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormTemplate {
  pub id: Uuid,
  pub name: String,
  #[serde(default)]
  pub note: Option<String>,
  pub field_config: Vec<FieldDefinition>,
  pub process: Vec<StepDefinition>,
  pub created_at: DateTime<Utc>,
}

impl FormTemplate {
  /// Construye y valida una plantilla nueva con id generado.
  pub fn new(name: impl Into<String>,
             note: Option<String>,
             field_config: Vec<FieldDefinition>,
             process: Vec<StepDefinition>)
             -> Result<Self, FormError> {
    let t = Self { id: Uuid::new_v4(), name: name.into(), note, field_config, process, created_at: Utc::now() };
    t.validate()?;
    Ok(t)
  }

  pub fn validate(&self) -> Result<(), FormError> {
    if self.name.trim().is_empty() {
      return Err(FormError::ValidationError("El nombre de la plantilla no puede estar vacío".to_string()));
    }
    validate_field_config(&self.field_config)?;
    validate_process(&self.process)
  }

  pub fn step(&self, index: u32) -> Option<&StepDefinition> {
    self.process.get(index as usize)
  }

  pub fn involves_role(&self, role: StepRole) -> bool {
    self.process.iter().any(|s| s.actor_role == role)
  }

  /// Hash de contenido (campos + proceso). Dos plantillas con la misma
  /// configuración comparten revisión aunque cambie el nombre.
  pub fn revision(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&self.field_config).unwrap_or_default());
    hasher.update(b"|");
    hasher.update(serde_json::to_vec(&self.process).unwrap_or_default());
    format!("{:x}", hasher.finalize())
  }

  pub fn summary(&self) -> TemplateSummary {
    TemplateSummary { id: self.id,
                      name: self.name.clone(),
                      note: self.note.clone(),
                      field_count: self.field_config.len(),
                      step_count: self.process.len(),
                      created_at: self.created_at }
  }
}

/// Vista ligera usada por los listados.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSummary {
  pub id: Uuid,
  pub name: String,
  pub note: Option<String>,
  pub field_count: usize,
  pub step_count: usize,
  pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn process() -> Vec<StepDefinition> {
    vec![StepDefinition::new(0, StepRole::Coordinator), StepDefinition::new(1, StepRole::Processor)]
  }

  #[test]
  fn rejects_empty_process() {
    let err = FormTemplate::new("Giấy xác nhận", None, vec![], vec![]).unwrap_err();
    assert!(matches!(err, FormError::ValidationError(_)));
  }

  #[test]
  fn rejects_gaps_and_unordered_steps() {
    let gap = vec![StepDefinition::new(0, StepRole::Coordinator), StepDefinition::new(2, StepRole::Processor)];
    assert!(FormTemplate::new("t", None, vec![], gap).is_err());
    let starts_at_one = vec![StepDefinition::new(1, StepRole::Coordinator)];
    assert!(FormTemplate::new("t", None, vec![], starts_at_one).is_err());
  }

  #[test]
  fn revision_tracks_process_not_name() {
    let a = FormTemplate::new("a", None, vec![], process()).unwrap();
    let mut b = a.clone();
    b.name = "b".into();
    assert_eq!(a.revision(), b.revision());
    b.process.push(StepDefinition::new(2, StepRole::Processor));
    assert_ne!(a.revision(), b.revision());
  }

  #[test]
  fn step_role_parses_case_insensitively() {
    assert_eq!("Coordinator".parse::<StepRole>().unwrap(), StepRole::Coordinator);
    assert_eq!(StepRole::Processor.to_string(), "processor");
    assert!("admin".parse::<StepRole>().is_err());
  }
}
