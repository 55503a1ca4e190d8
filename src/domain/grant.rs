use crate::domain::amount::MonetaryAmount;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    IncomingPayment,
    Quote,
    OutgoingPayment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Complete,
}

/// What a grant request asks the authorization server for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub access_type: AccessType,
    pub actions: Vec<Action>,
    /// Wallet the access is restricted to, when the server requires one.
    pub identifier: Option<Url>,
    /// Upper bound on what may be debited with the resulting token.
    pub debit_limit: Option<MonetaryAmount>,
}

impl AccessRequest {
    pub fn incoming_payment() -> Self {
        Self {
            access_type: AccessType::IncomingPayment,
            actions: vec![Action::Create, Action::Read, Action::Complete],
            identifier: None,
            debit_limit: None,
        }
    }

    pub fn quote() -> Self {
        Self {
            access_type: AccessType::Quote,
            actions: vec![Action::Create, Action::Read],
            identifier: None,
            debit_limit: None,
        }
    }

    pub fn outgoing_payment(wallet: Url, debit_limit: MonetaryAmount) -> Self {
        Self {
            access_type: AccessType::OutgoingPayment,
            actions: vec![Action::Create, Action::Read],
            identifier: Some(wallet),
            debit_limit: Some(debit_limit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractStart {
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishMethod {
    Redirect,
}

/// Where the authorization server sends the user once consent is given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractFinish {
    pub method: FinishMethod,
    pub uri: Url,
    pub nonce: String,
}

/// Declares that a grant needs interactive human consent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractRequest {
    pub start: Vec<InteractStart>,
    pub finish: InteractFinish,
}

impl InteractRequest {
    pub fn redirect(finish_uri: Url, nonce: impl Into<String>) -> Self {
        Self {
            start: vec![InteractStart::Redirect],
            finish: InteractFinish {
                method: FinishMethod::Redirect,
                uri: finish_uri,
                nonce: nonce.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub manage: Url,
}

/// A grant still waiting on the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGrant {
    /// Where to send the user for consent. Servers may omit it.
    pub redirect: Option<Url>,
    pub continue_uri: Url,
    pub continue_token: String,
    pub finish_nonce: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum GrantHandle {
    Finalized(AccessToken),
    Pending(PendingGrant),
}

impl GrantHandle {
    pub fn is_finalized(&self) -> bool {
        matches!(self, GrantHandle::Finalized(_))
    }

    pub fn into_access_token(self) -> Option<AccessToken> {
        match self {
            GrantHandle::Finalized(token) => Some(token),
            GrantHandle::Pending(_) => None,
        }
    }

    pub fn into_pending(self) -> Option<PendingGrant> {
        match self {
            GrantHandle::Pending(pending) => Some(pending),
            GrantHandle::Finalized(_) => None,
        }
    }
}
