use crate::domain::amount::MonetaryAmount;
use crate::domain::grant::{
    AccessRequest, AccessToken, AccessType, GrantHandle, InteractRequest, PendingGrant,
};
use crate::domain::payment::{IncomingPaymentRef, OutgoingPaymentRef, Quote};
use crate::domain::ports::{PaymentProtocolClient, ProtocolResult};
use crate::domain::wallet::WalletEndpoint;
use crate::error::ProtocolError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::trace;
use url::Url;

/// The remote operations the sandbox serves, used for call records and fault
/// injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ResolveEndpoint,
    RequestGrant,
    ContinueGrant,
    CreateIncomingPayment,
    CreateQuote,
    CreateOutgoingPayment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedCall {
    pub operation: Operation,
    pub target: Url,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone)]
struct InteractiveGrant {
    access: AccessRequest,
    auth_server: Url,
    continue_uri: Url,
    nonce: Option<String>,
}

#[derive(Default)]
struct SandboxState {
    wallets: HashMap<Url, WalletEndpoint>,
    rates: HashMap<(String, String), Decimal>,
    tokens: HashMap<String, AccessRequest>,
    grants: HashMap<String, InteractiveGrant>,
    consents: HashMap<String, String>,
    incoming: HashMap<Url, IncomingPaymentRef>,
    quotes: HashMap<Url, Quote>,
    paid_quotes: HashSet<Url>,
    outgoing: Vec<OutgoingPaymentRef>,
    failures: HashMap<Operation, ProtocolError>,
    withheld: HashSet<AccessType>,
    omit_interaction_url: bool,
    finalize_without_consent: bool,
    auto_consent: bool,
    calls: Vec<RecordedCall>,
    next_id: u64,
}

impl SandboxState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(
        &mut self,
        operation: Operation,
        target: &Url,
        detail: serde_json::Value,
    ) -> ProtocolResult<()> {
        trace!(?operation, %target, "sandbox call");
        self.calls.push(RecordedCall {
            operation,
            target: target.clone(),
            detail,
        });
        match self.failures.get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn issue_token(&mut self, auth_server: &Url, access: AccessRequest) -> ProtocolResult<GrantHandle> {
        let n = self.next_id();
        let value = format!("token-{n}");
        let manage = join(auth_server, &format!("token/{n}"))?;
        self.tokens.insert(value.clone(), access);
        Ok(GrantHandle::Finalized(AccessToken { value, manage }))
    }

    fn authorize(&self, token: &str, access_type: AccessType) -> ProtocolResult<&AccessRequest> {
        let access = self.tokens.get(token).ok_or_else(|| ProtocolError::Rejected {
            status: 401,
            message: "invalid access token".to_string(),
        })?;
        if access.access_type != access_type {
            return Err(ProtocolError::Rejected {
                status: 403,
                message: format!("token does not grant {access_type:?} access"),
            });
        }
        Ok(access)
    }

    fn wallet_at(&self, resource_server: &Url, wallet_id: &Url) -> ProtocolResult<&WalletEndpoint> {
        let wallet = self
            .wallets
            .get(wallet_id)
            .ok_or_else(|| ProtocolError::NotFound(wallet_id.to_string()))?;
        if &wallet.resource_server != resource_server {
            return Err(ProtocolError::Rejected {
                status: 400,
                message: format!("{wallet_id} is not served by {resource_server}"),
            });
        }
        Ok(wallet)
    }

    fn rate(&self, from: &str, to: &str) -> ProtocolResult<Option<Decimal>> {
        if from == to {
            return Ok(None);
        }
        self.rates
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .map(Some)
            .ok_or_else(|| ProtocolError::Rejected {
                status: 422,
                message: format!("no exchange rate from {from} to {to}"),
            })
    }
}

fn join(base: &Url, path: &str) -> ProtocolResult<Url> {
    base.join(path)
        .map_err(|e| ProtocolError::Malformed(format!("{base} + {path}: {e}")))
}

/// Derives the endpoint a sandbox wallet publishes: resources at the wallet's
/// origin, authorization under `/auth/`.
pub fn sandbox_endpoint(
    id: Url,
    asset_code: impl Into<String>,
    asset_scale: u8,
) -> ProtocolResult<WalletEndpoint> {
    Ok(WalletEndpoint {
        auth_server: join(&id, "/auth/")?,
        resource_server: join(&id, "/")?,
        id,
        asset_code: asset_code.into(),
        asset_scale,
    })
}

/// An in-process stand-in for remote authorization and resource servers.
///
/// Grants, tokens, quotes and payments behave like a cooperative wallet
/// provider; faults can be injected per operation. Clones share state, so a
/// test can keep a handle after boxing one for the orchestrator.
#[derive(Clone, Default)]
pub struct SandboxPaymentClient {
    state: Arc<Mutex<SandboxState>>,
}

impl SandboxPaymentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_wallet(&self, endpoint: WalletEndpoint) {
        let mut state = self.state.lock().await;
        state.wallets.insert(endpoint.id.clone(), endpoint);
    }

    /// One unit of `from` buys `rate` units of `to`.
    pub async fn set_rate(&self, from: &str, to: &str, rate: Decimal) {
        let mut state = self.state.lock().await;
        state.rates.insert((from.to_string(), to.to_string()), rate);
    }

    /// Accept any non-empty interaction reference on continuation.
    pub async fn set_auto_consent(&self, enabled: bool) {
        self.state.lock().await.auto_consent = enabled;
    }

    /// Simulates the user approving the grant whose finish nonce is `nonce`.
    pub async fn approve_interaction(&self, nonce: &str, interact_ref: &str) {
        let mut state = self.state.lock().await;
        state
            .consents
            .insert(nonce.to_string(), interact_ref.to_string());
    }

    pub async fn fail_on(&self, operation: Operation, error: ProtocolError) {
        self.state.lock().await.failures.insert(operation, error);
    }

    /// Non-interactive grants for `access_type` come back pending.
    pub async fn withhold_finalization(&self, access_type: AccessType) {
        self.state.lock().await.withheld.insert(access_type);
    }

    pub async fn omit_interaction_url(&self) {
        self.state.lock().await.omit_interaction_url = true;
    }

    /// Interactive grants finalize immediately instead of waiting on consent.
    pub async fn finalize_without_consent(&self) {
        self.state.lock().await.finalize_without_consent = true;
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn calls_of(&self, operation: Operation) -> Vec<RecordedCall> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    pub async fn calls_json(&self) -> serde_json::Result<String> {
        let state = self.state.lock().await;
        serde_json::to_string_pretty(&state.calls)
    }

    pub async fn incoming_payments(&self) -> Vec<IncomingPaymentRef> {
        self.state.lock().await.incoming.values().cloned().collect()
    }

    pub async fn outgoing_payments(&self) -> Vec<OutgoingPaymentRef> {
        self.state.lock().await.outgoing.clone()
    }
}

#[async_trait]
impl PaymentProtocolClient for SandboxPaymentClient {
    async fn resolve_endpoint(&self, url: &Url) -> ProtocolResult<WalletEndpoint> {
        let mut state = self.state.lock().await;
        state.record(Operation::ResolveEndpoint, url, json!({ "url": url }))?;
        state
            .wallets
            .get(url)
            .cloned()
            .ok_or_else(|| ProtocolError::NotFound(url.to_string()))
    }

    async fn request_grant(
        &self,
        auth_server: &Url,
        access: &AccessRequest,
        interact: Option<&InteractRequest>,
    ) -> ProtocolResult<GrantHandle> {
        let mut state = self.state.lock().await;
        state.record(
            Operation::RequestGrant,
            auth_server,
            json!({ "access": access, "interact": interact }),
        )?;

        if let Some(identifier) = &access.identifier {
            let managed = state
                .wallets
                .get(identifier)
                .is_some_and(|wallet| &wallet.auth_server == auth_server);
            if !managed {
                return Err(ProtocolError::Rejected {
                    status: 400,
                    message: format!("{identifier} is not managed by {auth_server}"),
                });
            }
        }

        let must_wait = match interact {
            Some(_) => !state.finalize_without_consent,
            None => state.withheld.contains(&access.access_type),
        };
        if !must_wait {
            return state.issue_token(auth_server, access.clone());
        }

        let n = state.next_id();
        let continue_uri = join(auth_server, &format!("continue/{n}"))?;
        let redirect = match interact {
            Some(_) if !state.omit_interaction_url => Some(join(auth_server, &format!("interact/{n}"))?),
            _ => None,
        };
        let nonce = interact.map(|i| i.finish.nonce.clone());
        let continue_token = format!("continue-{n}");
        state.grants.insert(
            continue_token.clone(),
            InteractiveGrant {
                access: access.clone(),
                auth_server: auth_server.clone(),
                continue_uri: continue_uri.clone(),
                nonce: nonce.clone(),
            },
        );
        Ok(GrantHandle::Pending(PendingGrant {
            redirect,
            continue_uri,
            continue_token,
            finish_nonce: nonce,
        }))
    }

    async fn continue_grant(
        &self,
        continue_uri: &Url,
        continue_token: &str,
        interact_ref: &str,
    ) -> ProtocolResult<GrantHandle> {
        let mut state = self.state.lock().await;
        state.record(
            Operation::ContinueGrant,
            continue_uri,
            json!({ "interact_ref": interact_ref }),
        )?;

        let grant = state
            .grants
            .get(continue_token)
            .cloned()
            .ok_or_else(|| ProtocolError::Rejected {
                status: 401,
                message: "unknown continuation token".to_string(),
            })?;
        if &grant.continue_uri != continue_uri {
            return Err(ProtocolError::Rejected {
                status: 400,
                message: "continuation token does not belong to this grant".to_string(),
            });
        }

        let approved = match grant.nonce.as_ref().and_then(|n| state.consents.get(n)) {
            Some(expected) if expected == interact_ref => true,
            Some(_) => {
                return Err(ProtocolError::Rejected {
                    status: 400,
                    message: "interaction reference mismatch".to_string(),
                });
            }
            None => state.auto_consent && !interact_ref.is_empty(),
        };
        if !approved {
            return Ok(GrantHandle::Pending(PendingGrant {
                redirect: None,
                continue_uri: grant.continue_uri,
                continue_token: continue_token.to_string(),
                finish_nonce: grant.nonce,
            }));
        }

        state.grants.remove(continue_token);
        state.issue_token(&grant.auth_server, grant.access)
    }

    async fn create_incoming_payment(
        &self,
        resource_server: &Url,
        access_token: &str,
        wallet_id: &Url,
        incoming_amount: &MonetaryAmount,
    ) -> ProtocolResult<IncomingPaymentRef> {
        let mut state = self.state.lock().await;
        state.record(
            Operation::CreateIncomingPayment,
            resource_server,
            json!({ "walletAddress": wallet_id, "incomingAmount": incoming_amount }),
        )?;
        state.authorize(access_token, AccessType::IncomingPayment)?;

        let wallet = state.wallet_at(resource_server, wallet_id)?;
        if wallet.asset_code != incoming_amount.asset_code
            || wallet.asset_scale != incoming_amount.asset_scale
        {
            return Err(ProtocolError::Rejected {
                status: 400,
                message: format!(
                    "{wallet_id} holds {} at scale {}",
                    wallet.asset_code, wallet.asset_scale
                ),
            });
        }

        let n = state.next_id();
        let payment = IncomingPaymentRef {
            id: join(resource_server, &format!("incoming-payments/{n}"))?,
            wallet_address: wallet_id.clone(),
            incoming_amount: incoming_amount.clone(),
        };
        state.incoming.insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    async fn create_quote(
        &self,
        resource_server: &Url,
        access_token: &str,
        wallet_id: &Url,
        receiver: &Url,
        method: &str,
    ) -> ProtocolResult<Quote> {
        let mut state = self.state.lock().await;
        state.record(
            Operation::CreateQuote,
            resource_server,
            json!({ "walletAddress": wallet_id, "receiver": receiver, "method": method }),
        )?;
        state.authorize(access_token, AccessType::Quote)?;

        if method != "ilp" {
            return Err(ProtocolError::Rejected {
                status: 400,
                message: format!("unsupported payment method {method}"),
            });
        }
        let sender = state.wallet_at(resource_server, wallet_id)?.clone();
        let incoming = state
            .incoming
            .get(receiver)
            .cloned()
            .ok_or_else(|| ProtocolError::NotFound(receiver.to_string()))?;

        let receive_amount = incoming.incoming_amount;
        let rate = state.rate(&sender.asset_code, &receive_amount.asset_code)?;
        let receive_major = receive_amount.to_decimal();
        let debit_major = match rate {
            Some(rate) if rate.is_zero() => {
                return Err(ProtocolError::Rejected {
                    status: 422,
                    message: "exchange rate is zero".to_string(),
                });
            }
            Some(rate) => receive_major.checked_div(rate).ok_or_else(|| ProtocolError::Rejected {
                status: 422,
                message: format!("cannot convert {receive_amount} at rate {rate}"),
            })?,
            None => receive_major,
        };
        let debit_value = 10u64
            .checked_pow(u32::from(sender.asset_scale))
            .and_then(|factor| debit_major.checked_mul(Decimal::from(factor)))
            .map(|scaled| scaled.ceil())
            .and_then(|scaled| scaled.to_u64())
            .ok_or_else(|| ProtocolError::Rejected {
                status: 422,
                message: "debit amount out of range".to_string(),
            })?;

        let n = state.next_id();
        let quote = Quote {
            id: join(resource_server, &format!("quotes/{n}"))?,
            wallet_address: wallet_id.clone(),
            receiver: receiver.clone(),
            debit_amount: MonetaryAmount::new(sender.asset_code, sender.asset_scale, debit_value),
            receive_amount,
            exchange_rate: rate,
        };
        state.quotes.insert(quote.id.clone(), quote.clone());
        Ok(quote)
    }

    async fn create_outgoing_payment(
        &self,
        resource_server: &Url,
        access_token: &str,
        wallet_id: &Url,
        quote_id: &Url,
    ) -> ProtocolResult<OutgoingPaymentRef> {
        let mut state = self.state.lock().await;
        state.record(
            Operation::CreateOutgoingPayment,
            resource_server,
            json!({ "walletAddress": wallet_id, "quoteId": quote_id }),
        )?;
        let access = state
            .authorize(access_token, AccessType::OutgoingPayment)?
            .clone();
        state.wallet_at(resource_server, wallet_id)?;

        if access.identifier.as_ref() != Some(wallet_id) {
            return Err(ProtocolError::Rejected {
                status: 403,
                message: format!("token is not valid for {wallet_id}"),
            });
        }
        let quote = state
            .quotes
            .get(quote_id)
            .cloned()
            .ok_or_else(|| ProtocolError::NotFound(quote_id.to_string()))?;
        if &quote.wallet_address != wallet_id {
            return Err(ProtocolError::Rejected {
                status: 403,
                message: "quote belongs to another wallet".to_string(),
            });
        }
        let within_limit = access
            .debit_limit
            .as_ref()
            .is_none_or(|limit| limit.value >= quote.debit_amount.value);
        if !within_limit {
            return Err(ProtocolError::Rejected {
                status: 403,
                message: "debit amount exceeds grant limit".to_string(),
            });
        }
        if !state.paid_quotes.insert(quote_id.clone()) {
            return Err(ProtocolError::Rejected {
                status: 409,
                message: "quote already used".to_string(),
            });
        }

        let n = state.next_id();
        let payment = OutgoingPaymentRef {
            id: join(resource_server, &format!("outgoing-payments/{n}"))?,
            wallet_address: wallet_id.clone(),
            quote_id: quote_id.clone(),
            debit_amount: quote.debit_amount.clone(),
            sent_amount: quote.debit_amount,
            receive_amount: quote.receive_amount,
        };
        state.outgoing.push(payment.clone());
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::grant::InteractRequest;
    use rust_decimal_macros::dec;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    async fn sandbox_with_wallets() -> (SandboxPaymentClient, WalletEndpoint, WalletEndpoint) {
        let sandbox = SandboxPaymentClient::new();
        let alice = sandbox_endpoint(url("https://alpha.example/alice"), "USD", 2).unwrap();
        let bob = sandbox_endpoint(url("https://beta.example/bob"), "EUR", 2).unwrap();
        sandbox.register_wallet(alice.clone()).await;
        sandbox.register_wallet(bob.clone()).await;
        (sandbox, alice, bob)
    }

    #[test]
    fn test_sandbox_endpoint_layout() {
        let endpoint = sandbox_endpoint(url("https://alpha.example/alice"), "USD", 2).unwrap();
        assert_eq!(endpoint.resource_server.as_str(), "https://alpha.example/");
        assert_eq!(endpoint.auth_server.as_str(), "https://alpha.example/auth/");
    }

    #[tokio::test]
    async fn test_quote_converts_with_rate_and_rounds_debit_up() {
        let (sandbox, alice, bob) = sandbox_with_wallets().await;
        sandbox.set_rate("USD", "EUR", dec!(0.9)).await;

        let grant = sandbox
            .request_grant(&bob.auth_server, &AccessRequest::incoming_payment(), None)
            .await
            .unwrap();
        let token = grant.into_access_token().unwrap();
        let incoming = sandbox
            .create_incoming_payment(
                &bob.resource_server,
                &token.value,
                &bob.id,
                &MonetaryAmount::new("EUR", 2, 1000),
            )
            .await
            .unwrap();

        let grant = sandbox
            .request_grant(&alice.auth_server, &AccessRequest::quote(), None)
            .await
            .unwrap();
        let token = grant.into_access_token().unwrap();
        let quote = sandbox
            .create_quote(&alice.resource_server, &token.value, &alice.id, &incoming.id, "ilp")
            .await
            .unwrap();

        assert_eq!(quote.receive_amount.value, 1000);
        assert_eq!(quote.debit_amount, MonetaryAmount::new("USD", 2, 1112));
        assert_eq!(quote.exchange_rate, Some(dec!(0.9)));
    }

    #[tokio::test]
    async fn test_quote_with_extreme_rate_is_rejected() {
        let (sandbox, alice, bob) = sandbox_with_wallets().await;
        sandbox
            .set_rate("USD", "EUR", dec!(0.0000000000000000000000000001))
            .await;

        let token = sandbox
            .request_grant(&bob.auth_server, &AccessRequest::incoming_payment(), None)
            .await
            .unwrap()
            .into_access_token()
            .unwrap();
        let incoming = sandbox
            .create_incoming_payment(
                &bob.resource_server,
                &token.value,
                &bob.id,
                &MonetaryAmount::new("EUR", 2, 1000),
            )
            .await
            .unwrap();
        let token = sandbox
            .request_grant(&alice.auth_server, &AccessRequest::quote(), None)
            .await
            .unwrap()
            .into_access_token()
            .unwrap();

        let result = sandbox
            .create_quote(&alice.resource_server, &token.value, &alice.id, &incoming.id, "ilp")
            .await;
        assert!(matches!(result, Err(ProtocolError::Rejected { status: 422, .. })));
    }

    #[tokio::test]
    async fn test_tokens_are_scoped_to_their_access_type() {
        let (sandbox, alice, _) = sandbox_with_wallets().await;
        let token = sandbox
            .request_grant(&alice.auth_server, &AccessRequest::quote(), None)
            .await
            .unwrap()
            .into_access_token()
            .unwrap();

        let result = sandbox
            .create_incoming_payment(
                &alice.resource_server,
                &token.value,
                &alice.id,
                &MonetaryAmount::new("USD", 2, 100),
            )
            .await;
        assert!(matches!(result, Err(ProtocolError::Rejected { status: 403, .. })));
    }

    #[tokio::test]
    async fn test_interactive_grant_waits_for_matching_consent() {
        let (sandbox, alice, _) = sandbox_with_wallets().await;
        let access =
            AccessRequest::outgoing_payment(alice.id.clone(), MonetaryAmount::new("USD", 2, 500));
        let interact = InteractRequest::redirect(url("http://127.0.0.1:5000/callback/tx-9"), "tx-9");

        let pending = sandbox
            .request_grant(&alice.auth_server, &access, Some(&interact))
            .await
            .unwrap()
            .into_pending()
            .unwrap();
        assert!(pending.redirect.is_some());

        // No consent yet: still pending.
        let handle = sandbox
            .continue_grant(&pending.continue_uri, &pending.continue_token, "ref-1")
            .await
            .unwrap();
        assert!(!handle.is_finalized());

        sandbox.approve_interaction("tx-9", "ref-1").await;
        let wrong = sandbox
            .continue_grant(&pending.continue_uri, &pending.continue_token, "ref-2")
            .await;
        assert!(matches!(wrong, Err(ProtocolError::Rejected { status: 400, .. })));

        let handle = sandbox
            .continue_grant(&pending.continue_uri, &pending.continue_token, "ref-1")
            .await
            .unwrap();
        assert!(handle.is_finalized());
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded_and_returned() {
        let (sandbox, alice, _) = sandbox_with_wallets().await;
        sandbox
            .fail_on(
                Operation::ResolveEndpoint,
                ProtocolError::Transport("timeout".to_string()),
            )
            .await;

        let result = sandbox.resolve_endpoint(&alice.id).await;
        assert_eq!(result, Err(ProtocolError::Transport("timeout".to_string())));
        assert_eq!(sandbox.calls_of(Operation::ResolveEndpoint).await.len(), 1);

        let log = sandbox.calls_json().await.unwrap();
        assert!(log.contains("resolve_endpoint"));
    }
}
