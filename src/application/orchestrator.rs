use crate::config::NegotiatorConfig;
use crate::domain::amount::MonetaryAmount;
use crate::domain::grant::{AccessRequest, InteractRequest};
use crate::domain::negotiation::{
    CompletedPayment, NegotiationId, NegotiationStatus, PendingNegotiation, StartedNegotiation,
};
use crate::domain::ports::{NegotiationStoreRef, PaymentClientBox};
use crate::domain::wallet::{WalletAddress, WalletEndpoint};
use crate::error::{NegotiationError, ProtocolError, Result, Stage};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Drives a payment negotiation from grant requests through interactive consent
/// to the outgoing payment.
///
/// A negotiation runs in two halves. [`start`](Self::start) resolves both wallets,
/// creates the incoming payment and quote, and requests the interactive
/// outgoing-payment grant, parking the result in the store. [`resume`](Self::resume)
/// takes it back out once the user has consented and creates the payment.
///
/// Remote resources created before a failing step are left in place: the
/// protocol has no way to cancel an incoming payment or quote, so a failed
/// start may leave an orphaned incoming payment at the receiver.
pub struct NegotiationOrchestrator {
    client: PaymentClientBox,
    store: NegotiationStoreRef,
    config: NegotiatorConfig,
}

impl NegotiationOrchestrator {
    /// Creates a new `NegotiationOrchestrator`.
    ///
    /// # Arguments
    ///
    /// * `client` - Signed access to the remote authorization and resource servers.
    /// * `store` - Where negotiations wait for consent. Owned by this orchestrator;
    ///   its clock and retention window decide when a negotiation is abandoned.
    /// * `config` - Callback, payment method and policy settings.
    pub fn new(client: PaymentClientBox, store: NegotiationStoreRef, config: NegotiatorConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Starts a negotiation and suspends it pending user consent.
    ///
    /// The id is reserved before any remote call, so a duplicate is rejected
    /// without side effects. On failure the reservation is released and nothing
    /// is left in the store.
    #[instrument(skip(self, sender_ref, receiver_ref), fields(negotiation = %id))]
    pub async fn start(
        &self,
        id: NegotiationId,
        sender_ref: &str,
        receiver_ref: &str,
        amount: Decimal,
    ) -> Result<StartedNegotiation> {
        if amount <= Decimal::ZERO {
            return Err(NegotiationError::InvalidAmount(format!(
                "{amount} must be positive"
            )));
        }
        let sender_address = parse_address(sender_ref, Stage::ResolveSender)?;
        let receiver_address = parse_address(receiver_ref, Stage::ResolveReceiver)?;

        self.store.reserve(&id).await?;
        match self
            .run_start(&id, &sender_address, &receiver_address, amount)
            .await
        {
            Ok(started) => Ok(started),
            Err(err) => {
                warn!(error = %err, stage = ?err.stage(), "negotiation start failed");
                self.store.release(&id).await?;
                Err(err)
            }
        }
    }

    async fn run_start(
        &self,
        id: &NegotiationId,
        sender_address: &WalletAddress,
        receiver_address: &WalletAddress,
        amount: Decimal,
    ) -> Result<StartedNegotiation> {
        let sender = self.resolve(sender_address, Stage::ResolveSender).await?;
        let receiver = self.resolve(receiver_address, Stage::ResolveReceiver).await?;
        info!(sender = %sender.id, receiver = %receiver.id, "resolved wallets");

        self.config.asset_policy.assert_compatible(&sender, &receiver)?;

        let requested_amount =
            MonetaryAmount::from_human(amount, &receiver.asset_code, receiver.asset_scale)?;
        if requested_amount.value == 0 {
            return Err(NegotiationError::InvalidAmount(format!(
                "{amount} is below one minor unit of {}",
                receiver.asset_code
            )));
        }

        let incoming_token = self
            .finalized_grant(
                &receiver,
                &AccessRequest::incoming_payment(),
                Stage::IncomingPaymentGrant,
            )
            .await?;

        let incoming_payment = self
            .client
            .create_incoming_payment(
                &receiver.resource_server,
                &incoming_token,
                &receiver.id,
                &requested_amount,
            )
            .await
            .map_err(|source| resource_failed(Stage::IncomingPayment, source))?;
        info!(incoming_payment = %incoming_payment.id, amount = %requested_amount, "created incoming payment");

        let quote_token = self
            .finalized_grant(&sender, &AccessRequest::quote(), Stage::QuoteGrant)
            .await?;
        let quote = self
            .client
            .create_quote(
                &sender.resource_server,
                &quote_token,
                &sender.id,
                &incoming_payment.id,
                &self.config.payment_method,
            )
            .await
            .map_err(|source| resource_failed(Stage::Quote, source))?;
        info!(
            quote = %quote.id,
            debit = %quote.debit_amount,
            receive = %quote.receive_amount,
            "created quote"
        );

        let finish_uri = self
            .config
            .finish_uri(id.as_str())
            .map_err(|e| NegotiationError::GrantRequestFailed {
                stage: Stage::OutgoingPaymentGrant,
                source: ProtocolError::Malformed(format!("finish URI: {e}")),
            })?;
        let access = AccessRequest::outgoing_payment(sender.id.clone(), quote.debit_amount.clone());
        let interact = InteractRequest::redirect(finish_uri, id.as_str());
        let grant = self
            .client
            .request_grant(&sender.auth_server, &access, Some(&interact))
            .await
            .map_err(|source| NegotiationError::GrantRequestFailed {
                stage: Stage::OutgoingPaymentGrant,
                source,
            })?;
        let grant = grant
            .into_pending()
            .ok_or(NegotiationError::InteractionUrlMissing)?;
        let interaction_url = grant
            .redirect
            .clone()
            .ok_or(NegotiationError::InteractionUrlMissing)?;

        let started = StartedNegotiation {
            negotiation_id: id.clone(),
            interaction_url,
            continue_uri: grant.continue_uri.clone(),
            continue_token: grant.continue_token.clone(),
            quote: quote.clone(),
        };
        self.store
            .put(PendingNegotiation {
                id: id.clone(),
                sender,
                receiver,
                requested_amount,
                incoming_payment,
                quote,
                grant,
                created_at: self.store.now(),
            })
            .await?;
        info!(interaction_url = %started.interaction_url, "awaiting consent");
        Ok(started)
    }

    /// Finishes a negotiation after the user has consented.
    ///
    /// The pending entry is claimed atomically, so a negotiation can complete at
    /// most once. If the grant cannot be continued the entry is put back and the
    /// user may retry consent; once the outgoing payment has been attempted the
    /// negotiation is spent either way.
    #[instrument(skip(self, interact_ref), fields(negotiation = %id))]
    pub async fn resume(&self, id: NegotiationId, interact_ref: &str) -> Result<CompletedPayment> {
        let pending = self.store.take(&id).await?;

        let token = match self.continue_grant(&pending, interact_ref).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "grant continuation failed, keeping negotiation");
                if let Err(restore) = self.store.put(pending).await {
                    warn!(error = %restore, "could not restore negotiation");
                }
                return Err(err);
            }
        };

        let payment = self
            .client
            .create_outgoing_payment(
                &pending.sender.resource_server,
                &token,
                &pending.sender.id,
                &pending.quote.id,
            )
            .await
            .map_err(|source| {
                let err = resource_failed(Stage::OutgoingPayment, source);
                warn!(error = %err, "outgoing payment failed");
                err
            })?;
        info!(payment = %payment.id, sent = %payment.sent_amount, "negotiation completed");

        Ok(CompletedPayment {
            negotiation_id: id,
            payment_id: payment.id,
            debit_amount: payment.debit_amount,
            sent_amount: payment.sent_amount,
            received_amount: payment.receive_amount,
        })
    }

    /// Looks up a negotiation waiting on consent without consuming it.
    pub async fn status(&self, id: &NegotiationId) -> Result<NegotiationStatus> {
        let pending = self
            .store
            .peek(id)
            .await?
            .ok_or_else(|| NegotiationError::NegotiationNotFound(id.clone()))?;
        Ok(NegotiationStatus {
            negotiation_id: pending.id.clone(),
            age: pending.age(self.store.now()),
            requested_amount: pending.requested_amount,
            quote: pending.quote,
            interaction_url: pending.grant.redirect,
        })
    }

    /// Spawns a task evicting abandoned negotiations every `period`.
    ///
    /// Must be called from within a tokio runtime. Abort the handle to stop it.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        // `interval` panics on a zero period.
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.evict_expired().await {
                    Ok(0) => {}
                    Ok(evicted) => info!(evicted, "evicted abandoned negotiations"),
                    Err(err) => warn!(error = %err, "negotiation sweep failed"),
                }
            }
        })
    }

    async fn resolve(&self, address: &WalletAddress, stage: Stage) -> Result<WalletEndpoint> {
        self.client
            .resolve_endpoint(address.url())
            .await
            .map_err(|source| NegotiationError::EndpointResolutionFailed {
                stage,
                wallet: address.to_string(),
                source,
            })
    }

    /// Requests a non-interactive grant at `wallet`'s authorization server and
    /// returns its access token.
    async fn finalized_grant(
        &self,
        wallet: &WalletEndpoint,
        access: &AccessRequest,
        stage: Stage,
    ) -> Result<String> {
        let grant = self
            .client
            .request_grant(&wallet.auth_server, access, None)
            .await
            .map_err(|source| NegotiationError::GrantRequestFailed { stage, source })?;
        let token = grant
            .into_access_token()
            .ok_or(NegotiationError::GrantNotFinalized { stage })?;
        Ok(token.value)
    }

    async fn continue_grant(&self, pending: &PendingNegotiation, interact_ref: &str) -> Result<String> {
        let stage = Stage::GrantContinuation;
        let grant = self
            .client
            .continue_grant(
                &pending.grant.continue_uri,
                &pending.grant.continue_token,
                interact_ref,
            )
            .await
            .map_err(|source| NegotiationError::GrantRequestFailed { stage, source })?;
        let token = grant
            .into_access_token()
            .ok_or(NegotiationError::GrantNotFinalized { stage })?;
        Ok(token.value)
    }
}

fn parse_address(reference: &str, stage: Stage) -> Result<WalletAddress> {
    WalletAddress::parse(reference).map_err(|e| NegotiationError::EndpointResolutionFailed {
        stage,
        wallet: reference.to_string(),
        source: ProtocolError::Malformed(e.to_string()),
    })
}

fn resource_failed(stage: Stage, source: ProtocolError) -> NegotiationError {
    NegotiationError::ResourceCreationFailed { stage, source }
}
