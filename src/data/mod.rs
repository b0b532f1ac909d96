//! Entities and the data sources that store them.

pub mod companies;
pub mod memory;
pub mod postgres;
pub mod source;
pub mod user_companies;
pub mod users;

pub use memory::MemorySource;
pub use postgres::{PgEntity, PgSource};
pub use source::{Entity, EntitySource, IncludeApplier, SourceError, UpdateOutcome};
