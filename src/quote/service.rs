//! Quote fetcher backed by the peer-market listing search

use chrono::Utc;
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use std::time::Duration;
use thiserror::Error;

use super::model::{ListingSearch, ListingSearchResponse, Quote, QuoteRequest, CRYPTO_DECIMALS};
use crate::error::ApiError;

const SEARCH_PATH: &str = "/bapi/c2c/v2/friendly/c2c/adv/search";

#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("{0}")]
    Validation(String),

    #[error("No listings available for {asset}/{fiat}")]
    NoListings { asset: String, fiat: String },

    #[error("Price source returned status {0}")]
    UpstreamStatus(u16),

    #[error("Price source returned unusable rate {0}")]
    UnusableRate(Decimal),

    #[error("Price source request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<QuoteError> for ApiError {
    fn from(err: QuoteError) -> Self {
        match err {
            QuoteError::Validation(msg) => ApiError::Validation(msg),
            e @ QuoteError::NoListings { .. } => ApiError::NoQuoteAvailable(e.to_string()),
            e => ApiError::ExternalService(e.to_string()),
        }
    }
}

/// Quote service
#[derive(Clone)]
pub struct QuoteService {
    client: Client,
    base_url: String,
}

impl QuoteService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, QuoteError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Convert a fiat amount at the best currently advertised rate
    pub async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        request.validate().map_err(QuoteError::Validation)?;

        let asset = request.crypto_currency.as_str();
        let fiat = request.fiat_currency.as_str();

        let body = ListingSearch {
            asset,
            fiat,
            trade_type: "SELL",
            page: 1,
            rows: 10,
            pay_types: Vec::new(),
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, SEARCH_PATH))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Price source rejected quote request");
            return Err(QuoteError::UpstreamStatus(response.status().as_u16()));
        }

        let listings: ListingSearchResponse = response.json().await?;
        let rate = listings.best_price().ok_or_else(|| QuoteError::NoListings {
            asset: asset.to_string(),
            fiat: fiat.to_string(),
        })?;

        let crypto_amount = request
            .fiat_amount
            .checked_div(rate)
            .ok_or(QuoteError::UnusableRate(rate))?
            .round_dp_with_strategy(CRYPTO_DECIMALS, RoundingStrategy::MidpointNearestEven);

        tracing::debug!(
            fiat_amount = %request.fiat_amount,
            %rate,
            %crypto_amount,
            "Quote computed"
        );

        Ok(Quote {
            fiat_amount: request.fiat_amount,
            fiat_currency: request.fiat_currency,
            crypto_amount,
            crypto_currency: request.crypto_currency,
            network: request.network,
            rate,
            quoted_at: Utc::now(),
        })
    }
}
