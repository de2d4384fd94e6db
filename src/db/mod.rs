//! Database module: models, schema and storage functions.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows, plus create/patch inputs
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: pool setup and shared helpers
//! - `clinic.rs`, `staff.rs`, `commerce.rs`, `messaging.rs`, `social.rs`:
//!   storage functions grouped by area

pub mod models;
pub mod schema;
pub mod sqlite;

mod clinic;
mod commerce;
mod messaging;
mod social;
mod staff;

pub use models::*;
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, Storage};
