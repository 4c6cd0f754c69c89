// Archivo: config.rs
// Propósito: configuración del motor (paginación y adjuntos), con valores por
// defecto y lectura opcional desde el entorno (`.env` vía dotenvy).
use crate::errors::{Result, WorkflowError};

pub const ENV_DEFAULT_PAGE_SIZE: &str = "ONESTOP_DEFAULT_PAGE_SIZE";
pub const ENV_MAX_PAGE_SIZE: &str = "ONESTOP_MAX_PAGE_SIZE";
pub const ENV_MAX_ATTACHMENTS: &str = "ONESTOP_MAX_ATTACHMENTS";

/// Configuración del motor de solicitudes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Tamaño de página cuando el llamador no indica `limit`.
    pub default_page_size: u32,
    /// Límite superior aceptado para `limit`.
    pub max_page_size: u32,
    /// Máximo de URLs adjuntas por decisión.
    pub max_attachments: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { default_page_size: 10, max_page_size: 100, max_attachments: 20 }
    }
}

impl EngineConfig {
    /// Lee la configuración del entorno. Variables ausentes conservan el
    /// valor por defecto; valores no numéricos o incoherentes son
    /// `Validation`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut cfg = EngineConfig::default();
        if let Some(v) = read_var(ENV_DEFAULT_PAGE_SIZE)? {
            cfg.default_page_size = v;
        }
        if let Some(v) = read_var(ENV_MAX_PAGE_SIZE)? {
            cfg.max_page_size = v;
        }
        if let Some(v) = read_var(ENV_MAX_ATTACHMENTS)? {
            cfg.max_attachments = v as usize;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 || self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(WorkflowError::Validation(format!("tamaños de página incoherentes: por defecto {} / máximo {}",
                                                         self.default_page_size, self.max_page_size)));
        }
        Ok(())
    }
}

fn read_var(name: &str) -> Result<Option<u32>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim()
                      .parse::<u32>()
                      .map(Some)
                      .map_err(|e| WorkflowError::Validation(format!("{}={} inválido: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_default_larger_than_max() {
        let cfg = EngineConfig { default_page_size: 50, max_page_size: 20, max_attachments: 1 };
        assert!(matches!(cfg.validate(), Err(WorkflowError::Validation(_))));
    }
}
