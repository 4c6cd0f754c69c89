// field.rs
use crate::FormError;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Datos capturados en un formulario: id de campo -> valor, en el orden en
/// que el solicitante los envió.
pub type FieldData = IndexMap<String, JsonValue>;

/// Tipo de un campo del formulario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
  Text,
  Number,
  /// Fecha ISO `YYYY-MM-DD`.
  Date,
  Choice {
    options: Vec<String>,
  },
  /// URL (o lista de URLs) de un archivo ya subido.
  Attachment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
  pub id: String,
  pub label: String,
  pub kind: FieldKind,
  #[serde(default)]
  pub required: bool,
}

impl FieldDefinition {
  pub fn new(id: impl Into<String>, label: impl Into<String>, kind: FieldKind, required: bool) -> Self {
    Self { id: id.into(), label: label.into(), kind, required }
  }

  pub fn text(id: impl Into<String>, label: impl Into<String>, required: bool) -> Self {
    Self::new(id, label, FieldKind::Text, required)
  }

  /// Valida un valor presente contra el tipo del campo.
  fn check_value(&self, value: &JsonValue) -> Result<(), FormError> {
    let ok = match &self.kind {
      FieldKind::Text => value.is_string(),
      FieldKind::Number => value.is_number() || value.as_str().map(|s| s.trim().parse::<f64>().is_ok()).unwrap_or(false),
      FieldKind::Date => value.as_str().map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()).unwrap_or(false),
      FieldKind::Choice { options } => value.as_str().map(|s| options.iter().any(|o| o == s)).unwrap_or(false),
      FieldKind::Attachment => match value {
        JsonValue::String(s) => is_url(s),
        JsonValue::Array(items) => items.iter().all(|v| v.as_str().map(is_url).unwrap_or(false)),
        _ => false,
      },
    };
    if ok {
      Ok(())
    } else {
      Err(FormError::ValidationError(format!("Valor inválido para el campo '{}' ({:?})", self.id, self.kind)))
    }
  }
}

fn is_url(s: &str) -> bool {
  url::Url::parse(s).map(|u| u.scheme() == "http" || u.scheme() == "https").unwrap_or(false)
}

fn is_blank(value: &JsonValue) -> bool {
  match value {
    JsonValue::Null => true,
    JsonValue::String(s) => s.trim().is_empty(),
    JsonValue::Array(a) => a.is_empty(),
    _ => false,
  }
}

/// Comprueba que la configuración de campos sea coherente: ids no vacíos,
/// únicos, y listas de opciones no vacías.
pub fn validate_field_config(fields: &[FieldDefinition]) -> Result<(), FormError> {
  let mut seen = HashSet::new();
  for f in fields {
    if f.id.trim().is_empty() {
      return Err(FormError::ValidationError("El id de un campo no puede estar vacío".to_string()));
    }
    if !seen.insert(f.id.as_str()) {
      return Err(FormError::ValidationError(format!("Campo duplicado: {}", f.id)));
    }
    if let FieldKind::Choice { options } = &f.kind {
      if options.is_empty() {
        return Err(FormError::ValidationError(format!("El campo '{}' no tiene opciones", f.id)));
      }
    }
  }
  Ok(())
}

/// Valida los datos enviados contra la configuración de campos.
///
/// Falla con `ValidationError` si hay una clave desconocida, si falta un
/// campo obligatorio (o llega vacío) o si un valor no corresponde a su tipo.
pub fn validate_field_data(fields: &[FieldDefinition], data: &FieldData) -> Result<(), FormError> {
  for key in data.keys() {
    if !fields.iter().any(|f| &f.id == key) {
      return Err(FormError::ValidationError(format!("Campo desconocido: {}", key)));
    }
  }
  for f in fields {
    match data.get(&f.id) {
      Some(v) if is_blank(v) => {
        if f.required {
          return Err(FormError::ValidationError(format!("Falta el campo obligatorio: {}", f.id)));
        }
      }
      Some(v) => f.check_value(v)?,
      None if f.required => {
        return Err(FormError::ValidationError(format!("Falta el campo obligatorio: {}", f.id)));
      }
      None => {}
    }
  }
  Ok(())
}
