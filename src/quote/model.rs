//! Quote request/response types and the listing wire format

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orders::{CryptoCurrency, FiatCurrency, Network};

/// Smallest fiat amount a quote is given for
pub const MIN_QUOTE_AMOUNT: Decimal = Decimal::from_parts(10, 0, 0, false, 0);
/// Largest fiat amount a quote is given for
pub const MAX_QUOTE_AMOUNT: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
/// Decimal places kept on the converted crypto amount
pub const CRYPTO_DECIMALS: u32 = 6;

/// Query parameters for GET /quote
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub fiat_amount: Decimal,
    pub fiat_currency: FiatCurrency,
    pub crypto_currency: CryptoCurrency,
    pub network: Option<Network>,
}

impl QuoteRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.fiat_amount < MIN_QUOTE_AMOUNT {
            return Err(format!("Minimum amount is {}", MIN_QUOTE_AMOUNT));
        }
        if self.fiat_amount > MAX_QUOTE_AMOUNT {
            return Err(format!("Maximum amount is {}", MAX_QUOTE_AMOUNT));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Quote {
    pub fiat_amount: Decimal,
    pub fiat_currency: FiatCurrency,
    pub crypto_amount: Decimal,
    pub crypto_currency: CryptoCurrency,
    pub network: Option<Network>,
    /// Fiat per one unit of crypto
    pub rate: Decimal,
    pub quoted_at: DateTime<Utc>,
}

/// Body posted to the peer-market listing search
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListingSearch<'a> {
    pub asset: &'a str,
    pub fiat: &'a str,
    pub trade_type: &'a str,
    pub page: u32,
    pub rows: u32,
    pub pay_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingSearchResponse {
    #[serde(default)]
    pub data: Option<Vec<Listing>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Listing {
    pub adv: Advertisement,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Advertisement {
    pub price: Decimal,
}

impl ListingSearchResponse {
    /// Lowest advertised price, if any listing exists
    pub fn best_price(&self) -> Option<Decimal> {
        self.data
            .as_ref()?
            .iter()
            .map(|listing| listing.adv.price)
            .filter(|price| *price > Decimal::ZERO)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: i64) -> QuoteRequest {
        QuoteRequest {
            fiat_amount: Decimal::new(amount, 0),
            fiat_currency: FiatCurrency::Mxn,
            crypto_currency: CryptoCurrency::Usdt,
            network: None,
        }
    }

    #[test]
    fn test_amount_bounds() {
        assert_eq!(request(9).validate().unwrap_err(), "Minimum amount is 10");
        assert_eq!(
            request(10_001).validate().unwrap_err(),
            "Maximum amount is 10000"
        );
        assert!(request(10).validate().is_ok());
        assert!(request(10_000).validate().is_ok());
    }

    #[test]
    fn test_best_price_is_minimum() {
        let response: ListingSearchResponse = serde_json::from_str(
            r#"{"code":"000000","data":[
                {"adv":{"price":"17.60"}},
                {"adv":{"price":"17.45"}},
                {"adv":{"price":"17.90"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(response.best_price(), Some(Decimal::new(1745, 2)));

        let empty: ListingSearchResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert_eq!(empty.best_price(), None);

        let missing: ListingSearchResponse = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert_eq!(missing.best_price(), None);
    }

    #[test]
    fn test_search_body_shape() {
        let body = serde_json::to_value(ListingSearch {
            asset: "USDT",
            fiat: "MXN",
            trade_type: "SELL",
            page: 1,
            rows: 10,
            pay_types: vec![],
        })
        .unwrap();
        assert_eq!(body["tradeType"], "SELL");
        assert_eq!(body["payTypes"], serde_json::json!([]));
    }
}
