//! Ally applications: users asking to become liquidity providers

mod model;
mod service;
mod store;

pub use model::{
    AllyApplication, ApplicationStatus, ListApplicationsQuery, RejectApplicationRequest,
    SubmitApplicationRequest,
};
pub use service::ApplicationService;
pub use store::{ApplicationStore, MemoryApplicationStore, PgApplicationStore};
