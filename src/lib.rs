pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod service;
pub mod social;

pub use error::VetdeskError;
pub use router::{AppState, vetdesk_router};
