use crate::domain::amount::MonetaryAmount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

/// An incoming payment created at the receiver's resource server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingPaymentRef {
    pub id: Url,
    pub wallet_address: Url,
    pub incoming_amount: MonetaryAmount,
}

/// Exchange terms committed to by the sender's resource server.
///
/// Once created a quote is never recomputed; the outgoing payment references it
/// by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: Url,
    pub wallet_address: Url,
    pub receiver: Url,
    pub debit_amount: MonetaryAmount,
    pub receive_amount: MonetaryAmount,
    pub exchange_rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingPaymentRef {
    pub id: Url,
    pub wallet_address: Url,
    pub quote_id: Url,
    pub debit_amount: MonetaryAmount,
    pub sent_amount: MonetaryAmount,
    pub receive_amount: MonetaryAmount,
}
