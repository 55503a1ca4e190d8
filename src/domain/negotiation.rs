use crate::domain::amount::MonetaryAmount;
use crate::domain::grant::PendingGrant;
use crate::domain::payment::{IncomingPaymentRef, Quote};
use crate::domain::wallet::WalletEndpoint;
use crate::error::{NegotiationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use url::Url;

/// Opaque identifier correlating a started negotiation with its resumption.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NegotiationId(String);

impl NegotiationId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(NegotiationError::InvalidNegotiationId(id));
        }
        Ok(Self(id))
    }

    /// A fresh random id for callers that do not bring their own.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NegotiationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything needed to finish a negotiation once the user has consented.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNegotiation {
    pub id: NegotiationId,
    pub sender: WalletEndpoint,
    pub receiver: WalletEndpoint,
    pub requested_amount: MonetaryAmount,
    pub incoming_payment: IncomingPaymentRef,
    pub quote: Quote,
    pub grant: PendingGrant,
    pub created_at: Instant,
}

impl PendingNegotiation {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

/// Returned by a successful start: where to send the user, and how to continue.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedNegotiation {
    pub negotiation_id: NegotiationId,
    pub interaction_url: Url,
    pub continue_uri: Url,
    pub continue_token: String,
    pub quote: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPayment {
    pub negotiation_id: NegotiationId,
    pub payment_id: Url,
    pub debit_amount: MonetaryAmount,
    pub sent_amount: MonetaryAmount,
    pub received_amount: MonetaryAmount,
}

/// A read-only view of a negotiation waiting on consent.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiationStatus {
    pub negotiation_id: NegotiationId,
    pub requested_amount: MonetaryAmount,
    pub quote: Quote,
    pub interaction_url: Option<Url>,
    pub age: Duration,
}
