//! Order models and data structures for the Kibo backend

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::models::Pagination;

/// Order model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub ally_id: Option<String>,
    pub fiat_amount: Decimal,
    pub fiat_currency: FiatCurrency,
    pub crypto_amount: Decimal,
    pub crypto_currency: CryptoCurrency,
    pub network: Option<Network>,
    pub status: OrderStatus,
    pub recipient: Option<String>,
    pub description: Option<String>,
    pub qr_image_url: Option<String>,
    pub proof_image_url: Option<String>,
    pub bank_transaction_id: Option<String>,
    pub proof_notes: Option<String>,
    pub release_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub taken_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Seconds left in the current window, never negative
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Apply a patch in place, as the store does on a successful transition
    pub fn apply(&mut self, patch: &OrderPatch) {
        self.status = patch.status;
        self.updated_at = patch.updated_at;
        if let Some(ally_id) = &patch.ally_id {
            self.ally_id = Some(ally_id.clone());
        }
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(taken_at) = patch.taken_at {
            self.taken_at = Some(taken_at);
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        if let Some(cancelled_at) = patch.cancelled_at {
            self.cancelled_at = Some(cancelled_at);
        }
        if let Some(url) = &patch.proof_image_url {
            self.proof_image_url = Some(url.clone());
        }
        if let Some(id) = &patch.bank_transaction_id {
            self.bank_transaction_id = Some(id.clone());
        }
        if let Some(notes) = &patch.proof_notes {
            self.proof_notes = Some(notes.clone());
        }
        if let Some(hash) = &patch.release_tx_hash {
            self.release_tx_hash = Some(hash.clone());
        }
    }
}

/// Order lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment, // Created, waiting for the user's payment to land
    Available,      // Claimable by allies
    Taken,          // Claimed by one ally, completion window running
    Completed,      // Proof uploaded and funds released
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::PendingPayment,
        OrderStatus::Available,
        OrderStatus::Taken,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Available => "AVAILABLE",
            OrderStatus::Taken => "TAKEN",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// The transition graph. Terminal states have no outgoing edges.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Available)
                | (PendingPayment, Cancelled)
                | (Available, Taken)
                | (Available, Cancelled)
                | (Available, Refunded)
                | (Taken, Completed)
                | (Taken, Refunded)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown order status: {}", s))
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "fiat_currency", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FiatCurrency {
    Mxn,
    Usd,
}

impl FiatCurrency {
    pub fn as_str(&self) -> &'static str {
        match self {
            FiatCurrency::Mxn => "MXN",
            FiatCurrency::Usd => "USD",
        }
    }
}

impl FromStr for FiatCurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MXN" => Ok(FiatCurrency::Mxn),
            "USD" => Ok(FiatCurrency::Usd),
            other => Err(format!("Unsupported fiat currency: {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "crypto_currency", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum CryptoCurrency {
    Usdt,
    Usdc,
}

impl CryptoCurrency {
    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoCurrency::Usdt => "USDT",
            CryptoCurrency::Usdc => "USDC",
        }
    }
}

impl FromStr for CryptoCurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USDT" => Ok(CryptoCurrency::Usdt),
            "USDC" => Ok(CryptoCurrency::Usdc),
            other => Err(format!("Unsupported crypto currency: {}", other)),
        }
    }
}

/// Settlement network for the crypto leg
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "settlement_network", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Network {
    Ethereum,
    Polygon,
    Arbitrum,
    Base,
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ETHEREUM" => Ok(Network::Ethereum),
            "POLYGON" => Ok(Network::Polygon),
            "ARBITRUM" => Ok(Network::Arbitrum),
            "BASE" => Ok(Network::Base),
            other => Err(format!("Unsupported network: {}", other)),
        }
    }
}

/// Validated input for creating an order; the QR image travels separately
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub fiat_amount: Decimal,
    pub fiat_currency: FiatCurrency,
    pub crypto_amount: Decimal,
    pub crypto_currency: CryptoCurrency,
    pub network: Option<Network>,
    pub recipient: Option<String>,
    pub description: Option<String>,
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), String> {
        if self.fiat_amount <= Decimal::ZERO {
            return Err("fiat_amount must be greater than 0".to_string());
        }
        if self.crypto_amount <= Decimal::ZERO {
            return Err("crypto_amount must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Sparse field update applied together with a status change
#[derive(Debug, Clone)]
pub struct OrderPatch {
    pub status: OrderStatus,
    pub updated_at: DateTime<Utc>,
    pub ally_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub taken_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub proof_image_url: Option<String>,
    pub bank_transaction_id: Option<String>,
    pub proof_notes: Option<String>,
    pub release_tx_hash: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            updated_at: now,
            ally_id: None,
            expires_at: None,
            taken_at: None,
            completed_at: None,
            cancelled_at: None,
            proof_image_url: None,
            bank_transaction_id: None,
            proof_notes: None,
            release_tx_hash: None,
        }
    }
}

/// Precondition for an atomic status update
#[derive(Debug, Clone, Copy)]
pub struct StatusGuard {
    pub from: OrderStatus,
    /// When set, the order's window must still be open at this instant
    pub unexpired_at: Option<DateTime<Utc>>,
    /// When set, no completion proof may be attached yet
    pub without_proof: bool,
}

impl StatusGuard {
    pub fn expecting(status: OrderStatus) -> Self {
        Self {
            from: status,
            unexpired_at: None,
            without_proof: false,
        }
    }

    pub fn unexpired_at(mut self, now: DateTime<Utc>) -> Self {
        self.unexpired_at = Some(now);
        self
    }

    /// Only match while no proof has been claimed
    pub fn without_proof(mut self) -> Self {
        self.without_proof = true;
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        order.status == self.from
            && self
                .unexpired_at
                .map_or(true, |now| !order.is_expired(now))
            && (!self.without_proof || order.proof_image_url.is_none())
    }
}

/// Whose orders a listing covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderScope {
    Owner(String),
    Ally(String),
    All,
}

impl OrderScope {
    pub fn includes(&self, order: &Order) -> bool {
        match self {
            OrderScope::Owner(user_id) => &order.user_id == user_id,
            OrderScope::Ally(ally_id) => order.ally_id.as_deref() == Some(ally_id.as_str()),
            OrderScope::All => true,
        }
    }
}

/// Free-text search, classified once at the edge
#[derive(Debug, Clone, PartialEq)]
pub enum SearchTerm {
    /// Equality against fiat or crypto amount
    Amount(Decimal),
    /// Case-insensitive substring of status or currency codes
    Text(String),
}

impl SearchTerm {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match Decimal::from_str(trimmed) {
            Ok(amount) => Some(SearchTerm::Amount(amount)),
            Err(_) => Some(SearchTerm::Text(trimmed.to_string())),
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        match self {
            SearchTerm::Amount(amount) => {
                order.fiat_amount == *amount || order.crypto_amount == *amount
            }
            SearchTerm::Text(text) => {
                let needle = text.to_lowercase();
                [
                    order.status.as_str(),
                    order.fiat_currency.as_str(),
                    order.crypto_currency.as_str(),
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            }
        }
    }
}

/// Store-level filter for caller-scoped listings
#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub scope: OrderScope,
    pub status: Option<OrderStatus>,
    pub search: Option<SearchTerm>,
    pub limit: i64,
    pub offset: i64,
}

/// Sort key for the available-orders board
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AvailableSort {
    #[default]
    CreatedAt,
    ExpiresAt,
    Amount,
}

impl AvailableSort {
    pub fn column(&self) -> &'static str {
        match self {
            AvailableSort::CreatedAt => "created_at",
            AvailableSort::ExpiresAt => "expires_at",
            AvailableSort::Amount => "fiat_amount",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Store-level filter for the available-orders board
#[derive(Debug, Clone)]
pub struct AvailableFilter {
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub sort_by: AvailableSort,
    pub sort_order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

/// Query parameters for GET /orders
#[derive(Debug, Deserialize, Default)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query parameters for GET /orders/available
#[derive(Debug, Deserialize, Default, Validate)]
pub struct AvailableOrdersQuery {
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub sort_by: Option<AvailableSort>,
    pub sort_order: Option<SortOrder>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

/// Extra fields supplied with a completion proof
#[derive(Debug, Clone, Default)]
pub struct ProofSubmission {
    pub bank_transaction_id: Option<String>,
    pub notes: Option<String>,
}

/// A page of orders plus pagination metadata
#[derive(Debug, Serialize, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

/// Single-order view with the derived countdown
#[derive(Debug, Serialize, Clone)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub seconds_remaining: i64,
}

/// Fixture shared by the order and realtime unit tests
#[cfg(test)]
pub(crate) fn sample_order(status: OrderStatus) -> Order {
    let now = Utc::now();
    Order {
        id: Uuid::new_v4(),
        user_id: "did:privy:owner".to_string(),
        ally_id: None,
        fiat_amount: Decimal::new(100, 0),
        fiat_currency: FiatCurrency::Mxn,
        crypto_amount: Decimal::new(606, 2),
        crypto_currency: CryptoCurrency::Usdt,
        network: Some(Network::Polygon),
        status,
        recipient: None,
        description: None,
        qr_image_url: None,
        proof_image_url: None,
        bank_transaction_id: None,
        proof_notes: None,
        release_tx_hash: None,
        created_at: now,
        updated_at: now,
        expires_at: now + chrono::Duration::minutes(10),
        taken_at: None,
        completed_at: None,
        cancelled_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_forward_transitions() {
        use OrderStatus::*;
        assert!(PendingPayment.can_transition_to(Available));
        assert!(Available.can_transition_to(Taken));
        assert!(Taken.can_transition_to(Completed));
        assert!(!PendingPayment.can_transition_to(Taken));
        assert!(!Available.can_transition_to(Completed));
        assert!(!Taken.can_transition_to(Available));
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        for terminal in [
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ] {
            assert!(terminal.is_terminal());
            for next in OrderStatus::ALL {
                assert!(
                    !terminal.can_transition_to(next),
                    "{} -> {} must be rejected",
                    terminal,
                    next
                );
            }
        }
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&OrderStatus::PendingPayment).unwrap();
        assert_eq!(json, "\"PENDING_PAYMENT\"");
        assert_eq!("taken".parse::<OrderStatus>().unwrap(), OrderStatus::Taken);
    }

    #[test]
    fn test_seconds_remaining_never_negative() {
        let mut order = sample_order(OrderStatus::Available);
        let now = Utc::now();
        order.expires_at = now - Duration::seconds(30);
        assert_eq!(order.seconds_remaining(now), 0);

        order.expires_at = now + Duration::seconds(90);
        assert_eq!(order.seconds_remaining(now), 90);
    }

    #[test]
    fn test_search_term_classification() {
        assert_eq!(
            SearchTerm::parse("6.06"),
            Some(SearchTerm::Amount(Decimal::new(606, 2)))
        );
        assert_eq!(
            SearchTerm::parse(" usdt "),
            Some(SearchTerm::Text("usdt".to_string()))
        );
        assert_eq!(SearchTerm::parse("   "), None);
    }

    #[test]
    fn test_search_term_matching() {
        let order = sample_order(OrderStatus::Available);
        assert!(SearchTerm::parse("100").unwrap().matches(&order));
        assert!(SearchTerm::parse("6.06").unwrap().matches(&order));
        assert!(!SearchTerm::parse("7").unwrap().matches(&order));
        assert!(SearchTerm::parse("avail").unwrap().matches(&order));
        assert!(SearchTerm::parse("mxn").unwrap().matches(&order));
        assert!(!SearchTerm::parse("usdc").unwrap().matches(&order));
    }

    #[test]
    fn test_status_guard() {
        let now = Utc::now();
        let mut order = sample_order(OrderStatus::Available);
        let guard = StatusGuard::expecting(OrderStatus::Available).unexpired_at(now);
        assert!(guard.matches(&order));

        order.expires_at = now - Duration::seconds(1);
        assert!(!guard.matches(&order));
        assert!(StatusGuard::expecting(OrderStatus::Available).matches(&order));
    }

    #[test]
    fn test_guard_without_proof() {
        let mut order = sample_order(OrderStatus::Taken);
        let guard = StatusGuard::expecting(OrderStatus::Taken).without_proof();
        assert!(guard.matches(&order));

        order.proof_image_url = Some("memory://proofs/abc.png".to_string());
        assert!(!guard.matches(&order));
        assert!(StatusGuard::expecting(OrderStatus::Taken).matches(&order));
    }

    #[test]
    fn test_new_order_validation() {
        let mut new_order = NewOrder {
            fiat_amount: Decimal::new(100, 0),
            fiat_currency: FiatCurrency::Mxn,
            crypto_amount: Decimal::new(606, 2),
            crypto_currency: CryptoCurrency::Usdt,
            network: None,
            recipient: None,
            description: None,
        };
        assert!(new_order.validate().is_ok());

        new_order.crypto_amount = Decimal::ZERO;
        assert!(new_order.validate().is_err());
    }

    #[test]
    fn test_order_json_uses_plain_decimal_strings() {
        let order = sample_order(OrderStatus::PendingPayment);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["fiat_amount"], "100");
        assert_eq!(json["crypto_amount"], "6.06");
        assert_eq!(json["status"], "PENDING_PAYMENT");
    }
}
