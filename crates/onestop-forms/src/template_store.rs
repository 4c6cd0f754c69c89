use crate::template::{FormTemplate, StepRole, TemplateSummary};
use crate::FormError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Filtro de listados de plantillas. Cada criterio es opcional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFilter {
    /// Coincidencia parcial, sin distinguir mayúsculas, sobre el nombre.
    pub name_contains: Option<String>,
    /// Sólo plantillas cuyo proceso tiene algún paso para este rol.
    pub involves_role: Option<StepRole>,
}

impl TemplateFilter {
    pub fn matches(&self, template: &FormTemplate) -> bool {
        if let Some(needle) = &self.name_contains {
            if !template.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(role) = self.involves_role {
            if !template.involves_role(role) {
                return false;
            }
        }
        true
    }
}

/// Almacén de plantillas (datos de referencia de sólo lectura para el motor).
pub trait TemplateStore: Send + Sync {
    /// Obtiene una plantilla; `NotFound` si no existe.
    fn get_template(&self, id: &Uuid) -> Result<FormTemplate, FormError>;

    /// Lista resúmenes de plantillas que cumplen el filtro, ordenados por
    /// fecha de creación (más recientes primero).
    fn list_templates(&self, filter: &TemplateFilter) -> Result<Vec<TemplateSummary>, FormError>;

    /// Inserta una plantilla nueva tras validarla. Devuelve su id.
    fn create_template(&self, template: FormTemplate) -> Result<Uuid, FormError>;

    /// Reemplaza la plantilla `id`. No altera solicitudes en curso: éstas
    /// guardan su propia copia del proceso.
    fn update_template(&self, id: &Uuid, template: FormTemplate) -> Result<FormTemplate, FormError>;

    /// Elimina la plantilla `id`; `NotFound` si no existe.
    fn delete_template(&self, id: &Uuid) -> Result<(), FormError>;
}

/// Implementación en memoria para tests y desarrollo.
pub struct InMemoryTemplateStore {
    templates: Arc<Mutex<HashMap<Uuid, FormTemplate>>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self { templates: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn lock_map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, FormTemplate>>, FormError> {
        self.templates
            .lock()
            .map_err(|e| FormError::StorageError(format!("Mutex 'templates' poisoned: {}", e)))
    }
}

impl Default for InMemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordena resúmenes de más reciente a más antiguo (id como desempate).
pub fn sort_summaries(list: &mut [TemplateSummary]) {
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

impl TemplateStore for InMemoryTemplateStore {
    fn get_template(&self, id: &Uuid) -> Result<FormTemplate, FormError> {
        let templates = self.lock_map()?;
        templates.get(id).cloned().ok_or(FormError::NotFound(format!("plantilla {}", id)))
    }

    fn list_templates(&self, filter: &TemplateFilter) -> Result<Vec<TemplateSummary>, FormError> {
        let templates = self.lock_map()?;
        let mut out: Vec<TemplateSummary> =
            templates.values().filter(|t| filter.matches(t)).map(FormTemplate::summary).collect();
        sort_summaries(&mut out);
        Ok(out)
    }

    fn create_template(&self, template: FormTemplate) -> Result<Uuid, FormError> {
        template.validate()?;
        let mut templates = self.lock_map()?;
        if templates.contains_key(&template.id) {
            return Err(FormError::ValidationError(format!("La plantilla {} ya existe", template.id)));
        }
        let id = template.id;
        templates.insert(id, template);
        log::info!("plantilla creada: {}", id);
        Ok(id)
    }

    fn update_template(&self, id: &Uuid, mut template: FormTemplate) -> Result<FormTemplate, FormError> {
        template.validate()?;
        let mut templates = self.lock_map()?;
        let existing = templates.get(id).ok_or(FormError::NotFound(format!("plantilla {}", id)))?;
        template.id = *id;
        template.created_at = existing.created_at;
        templates.insert(*id, template.clone());
        log::info!("plantilla actualizada: {} (revisión {})", id, template.revision());
        Ok(template)
    }

    fn delete_template(&self, id: &Uuid) -> Result<(), FormError> {
        let mut templates = self.lock_map()?;
        templates.remove(id).ok_or(FormError::NotFound(format!("plantilla {}", id)))?;
        log::info!("plantilla eliminada: {}", id);
        Ok(())
    }
}
