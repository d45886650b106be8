//! API handlers for the Kibo backend

mod applications;
mod extract;
mod health;
mod multipart;
mod orders;
mod quote;
mod users;

pub use applications::*;
pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use health::{health_check, root, HealthResponse};
pub use multipart::MultipartForm;
pub use orders::*;
pub use quote::get_quote;
pub use users::*;
