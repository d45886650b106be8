//! Order lifecycle: models, persistence, and the service enforcing the state machine

pub mod model;
mod pg_store;
mod release;
pub mod service;
mod store;
mod sweeper;

pub use model::*;
pub use pg_store::PgOrderStore;
pub use release::{FundsReleaser, SimulatedReleaser};
pub use service::{OrderService, OrderSettings};
pub use store::{MemoryOrderStore, OrderStore};
pub use sweeper::expiry_sweeper;

