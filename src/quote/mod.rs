//! Fiat to crypto rate quotes

mod model;
mod service;

pub use model::{Quote, QuoteRequest, MAX_QUOTE_AMOUNT, MIN_QUOTE_AMOUNT};
pub use service::{QuoteError, QuoteService};
