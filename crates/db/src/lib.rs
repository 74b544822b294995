//! `db` crate — the stage state store.
//!
//! Holds the [`StageInstanceState`] record type, the [`StageStateStore`]
//! contract the tracker writes through, and two adapters: an in-memory map
//! for tests and local runs, and a Postgres implementation backed by sqlx.
//! No tracking logic lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::InMemoryStageStateStore;
pub use models::{NewStageState, StageInstanceState, VariableSnapshot};
pub use pool::DbPool;
pub use repository::PgStageStateStore;
pub use store::StageStateStore;
