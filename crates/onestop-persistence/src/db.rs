// Pool de conexiones, selección de backend y migraciones embebidas.
#[cfg(not(feature = "pg"))]
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::Arc;

use crate::errors::PersistenceError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

pub const ENV_DB_URL: &str = "ONESTOP_DB_URL";

#[cfg(feature = "pg")]
pub type DbConn = PgConnection;
#[cfg(not(feature = "pg"))]
pub type DbConn = SqliteConnection;
#[cfg(feature = "pg")]
pub(crate) type DbBackend = diesel::pg::Pg;
#[cfg(not(feature = "pg"))]
pub(crate) type DbBackend = diesel::sqlite::Sqlite;

pub type DbPool = Pool<ConnectionManager<DbConn>>;
pub(crate) type PooledConn = PooledConnection<ConnectionManager<DbConn>>;

/// Ajustes por conexión de SQLite: WAL y espera ante bloqueos, para que
/// varios hilos puedan escribir sin `database is locked` inmediato.
#[cfg(not(feature = "pg"))]
#[derive(Debug, Clone, Copy)]
struct SqliteOptions {
  busy_timeout_ms: u32,
}

#[cfg(not(feature = "pg"))]
impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqliteOptions {
  fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
    conn.batch_execute(&format!("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
                                self.busy_timeout_ms))
        .map_err(diesel::r2d2::Error::QueryError)
  }
}

/// Construye el pool y aplica las migraciones pendientes.
pub fn connect(database_url: &str) -> Result<Arc<DbPool>, PersistenceError> {
  let manager = ConnectionManager::<DbConn>::new(database_url);
  let builder = Pool::builder().max_size(4);
  #[cfg(not(feature = "pg"))]
  let builder = builder.connection_customizer(Box::new(SqliteOptions { busy_timeout_ms: 5000 }));
  let pool = builder.build(manager)?;
  let mut conn = pool.get()?;
  conn.run_pending_migrations(MIGRATIONS).map_err(|e| PersistenceError::Migration(e.to_string()))?;
  log::info!("base de datos lista ({} conexiones máx.)", pool.max_size());
  Ok(Arc::new(pool))
}

/// URL de la base de datos: `ONESTOP_DB_URL` o, en su defecto, `DATABASE_URL`
/// (se carga `.env` si existe).
pub fn database_url_from_env() -> Result<String, PersistenceError> {
  dotenvy::dotenv().ok();
  let url = std::env::var(ENV_DB_URL).or_else(|_| std::env::var("DATABASE_URL"))
                                     .map_err(|_| PersistenceError::Config("ONESTOP_DB_URL / DATABASE_URL no definida".into()))?;
  check_backend(&url)?;
  Ok(url)
}

#[cfg(feature = "pg")]
fn check_backend(url: &str) -> Result<(), PersistenceError> {
  if url.starts_with("postgres://") || url.starts_with("postgresql://") || url.contains('@') {
    Ok(())
  } else {
    Err(PersistenceError::Config("la URL no parece de Postgres".into()))
  }
}

#[cfg(not(feature = "pg"))]
fn check_backend(url: &str) -> Result<(), PersistenceError> {
  if url.starts_with("postgres://") || url.starts_with("postgresql://") {
    return Err(PersistenceError::Config("onestop-persistence se compiló sin la feature 'pg'; activa 'pg' para usar \
                                         Postgres"
                                                  .into()));
  }
  Ok(())
}

pub fn connect_from_env() -> Result<Arc<DbPool>, PersistenceError> {
  connect(&database_url_from_env()?)
}
