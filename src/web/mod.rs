//! HTTP API over the entity services.

pub mod entities;
pub mod error;
pub mod extract;
pub mod lookups;
pub mod middleware;
pub mod projection;
pub mod routes;
pub mod status;

pub use routes::*;
