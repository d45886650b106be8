//! User profiles and role grants

mod model;
mod service;
mod store;

pub use model::{ActivateRoleRequest, UpdateProfileRequest, User, UserProfile};
pub use service::UserService;
pub use store::{MemoryUserStore, PgUserStore, UserStore};
