//! Crate `flow`: ciclo de vida de solicitudes de ventanilla única.
//!
//! Una solicitud se envía contra una plantilla (`onestop_forms`), copia su
//! proceso de pasos y avanza paso a paso: el router abre el item de trabajo
//! del paso actual, un coordinador puede asignarlo a un procesador y el
//! motor de decisiones aprueba (avanza) o rechaza (termina). La proyección
//! de estado expone el paso actual, el historial y los listados por rol.
//!
//! Diseño resumido:
//! - Un único item activo (`Open`/`Routed`) por solicitud no terminal;
//!   ninguno si es terminal.
//! - Cada cambio se confirma como una `Transition` atómica guardada por la
//!   versión de la solicitud (`PersistResult::Conflict`).
//! - Las escrituras sobre una misma solicitud se serializan en
//!   `OneStopService` con un cerrojo por solicitud.
//!
//! Ejemplo rápido:
//! ```rust
//! use flow::{Actor, EngineConfig, InMemoryWorkflowRepository, OneStopService};
//! use onestop_forms::InMemoryTemplateStore;
//! use std::sync::Arc;
//! let repo = Arc::new(InMemoryWorkflowRepository::new());
//! let templates = Arc::new(InMemoryTemplateStore::new());
//! let service = OneStopService::new(repo, templates, EngineConfig::default()).unwrap();
//! let _ = service.list_templates(&Default::default());
//! let _admin = Actor::admin("admin-1");
//! ```
pub mod actor;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod filter;
pub mod locks;
pub mod projection;
pub mod repository;
pub mod router;
pub mod service;
pub mod stubs;

pub use actor::*;
pub use config::*;
pub use domain::*;
pub use engine::*;
pub use errors::*;
pub use filter::*;
pub use locks::*;
pub use projection::*;
pub use repository::*;
pub use router::*;
pub use service::*;
pub use stubs::*;
