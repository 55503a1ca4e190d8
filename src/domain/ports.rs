use super::amount::MonetaryAmount;
use super::grant::{AccessRequest, GrantHandle, InteractRequest};
use super::negotiation::{NegotiationId, PendingNegotiation};
use super::payment::{IncomingPaymentRef, OutgoingPaymentRef, Quote};
use super::wallet::WalletEndpoint;
use crate::error::{ProtocolError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Signed access to remote authorization and resource servers.
///
/// Implementations own request signing and wire formats; callers only sequence
/// these operations.
#[async_trait]
pub trait PaymentProtocolClient: Send + Sync {
    async fn resolve_endpoint(&self, url: &Url) -> ProtocolResult<WalletEndpoint>;

    /// Requests a grant. Without `interact` the server is expected to finalize
    /// immediately; with it the handle comes back pending.
    async fn request_grant(
        &self,
        auth_server: &Url,
        access: &AccessRequest,
        interact: Option<&InteractRequest>,
    ) -> ProtocolResult<GrantHandle>;

    async fn continue_grant(
        &self,
        continue_uri: &Url,
        continue_token: &str,
        interact_ref: &str,
    ) -> ProtocolResult<GrantHandle>;

    async fn create_incoming_payment(
        &self,
        resource_server: &Url,
        access_token: &str,
        wallet_id: &Url,
        incoming_amount: &MonetaryAmount,
    ) -> ProtocolResult<IncomingPaymentRef>;

    async fn create_quote(
        &self,
        resource_server: &Url,
        access_token: &str,
        wallet_id: &Url,
        receiver: &Url,
        method: &str,
    ) -> ProtocolResult<Quote>;

    async fn create_outgoing_payment(
        &self,
        resource_server: &Url,
        access_token: &str,
        wallet_id: &Url,
        quote_id: &Url,
    ) -> ProtocolResult<OutgoingPaymentRef>;
}

/// Correlation map from negotiation id to the state parked across consent.
///
/// Every operation treats entries older than the store's retention window as
/// absent.
#[async_trait]
pub trait NegotiationStore: Send + Sync {
    /// Claims an id for a start in progress. Fails with `DuplicateNegotiation`
    /// if the id is reserved or pending.
    async fn reserve(&self, id: &NegotiationId) -> Result<()>;

    /// Drops a reservation that never became a pending negotiation.
    async fn release(&self, id: &NegotiationId) -> Result<()>;

    /// Stores a snapshot, filling the reservation for its id if there is one.
    async fn put(&self, pending: PendingNegotiation) -> Result<()>;

    /// Atomically reads and removes a pending negotiation.
    async fn take(&self, id: &NegotiationId) -> Result<PendingNegotiation>;

    async fn peek(&self, id: &NegotiationId) -> Result<Option<PendingNegotiation>>;

    /// Removes every expired entry and returns how many were dropped.
    async fn evict_expired(&self) -> Result<usize>;

    async fn len(&self) -> Result<usize>;

    /// The clock entries are stamped and expired against. Snapshots passed to
    /// `put` must take `created_at` from here.
    fn now(&self) -> Instant;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub type PaymentClientBox = Box<dyn PaymentProtocolClient>;
pub type NegotiationStoreRef = Arc<dyn NegotiationStore>;
pub type ClockRef = Arc<dyn Clock>;
