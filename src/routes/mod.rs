//! Route definitions for the Kibo API

mod orders;
mod quote;
mod users;

pub use orders::order_routes;
pub use quote::quote_routes;
pub use users::{application_routes, user_routes};
