use crate::domain::negotiation::NegotiationId;
use std::fmt;
use thiserror::Error;

/// The protocol step at which a negotiation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ResolveSender,
    ResolveReceiver,
    IncomingPaymentGrant,
    IncomingPayment,
    QuoteGrant,
    Quote,
    OutgoingPaymentGrant,
    GrantContinuation,
    OutgoingPayment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolveSender => "resolve sender wallet",
            Stage::ResolveReceiver => "resolve receiver wallet",
            Stage::IncomingPaymentGrant => "incoming payment grant",
            Stage::IncomingPayment => "incoming payment",
            Stage::QuoteGrant => "quote grant",
            Stage::Quote => "quote",
            Stage::OutgoingPaymentGrant => "outgoing payment grant",
            Stage::GrantContinuation => "grant continuation",
            Stage::OutgoingPayment => "outgoing payment",
        };
        f.write_str(name)
    }
}

/// Failure reported by a `PaymentProtocolClient`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid negotiation id: {0:?}")]
    InvalidNegotiationId(String),
    #[error("Could not resolve wallet {wallet} ({stage})")]
    EndpointResolutionFailed {
        stage: Stage,
        wallet: String,
        #[source]
        source: ProtocolError,
    },
    #[error("Grant was not finalized at {stage}")]
    GrantNotFinalized { stage: Stage },
    #[error("Outgoing payment grant did not return an interaction URL")]
    InteractionUrlMissing,
    #[error("Grant request failed at {stage}")]
    GrantRequestFailed {
        stage: Stage,
        #[source]
        source: ProtocolError,
    },
    #[error("Resource creation failed at {stage}")]
    ResourceCreationFailed {
        stage: Stage,
        #[source]
        source: ProtocolError,
    },
    #[error("Incompatible assets: sender uses {sender}, receiver uses {receiver}")]
    IncompatibleAssets { sender: String, receiver: String },
    #[error("Negotiation {0} already exists")]
    DuplicateNegotiation(NegotiationId),
    #[error("Negotiation {0} not found or expired")]
    NegotiationNotFound(NegotiationId),
    #[error("Command is missing the {0} column")]
    MissingField(&'static str),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl NegotiationError {
    /// The protocol step this error is attributed to, when it came from a remote call.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::EndpointResolutionFailed { stage, .. }
            | Self::GrantNotFinalized { stage }
            | Self::GrantRequestFailed { stage, .. }
            | Self::ResourceCreationFailed { stage, .. } => Some(*stage),
            Self::InteractionUrlMissing => Some(Stage::OutgoingPaymentGrant),
            _ => None,
        }
    }

    /// Whether starting over under a fresh negotiation id can reasonably succeed.
    ///
    /// Input errors and policy rejections will fail identically on a retry; remote
    /// failures and lost negotiations may not.
    pub fn is_retryable_with_new_id(&self) -> bool {
        match self {
            Self::InvalidAmount(_)
            | Self::InvalidNegotiationId(_)
            | Self::IncompatibleAssets { .. }
            | Self::MissingField(_)
            | Self::CsvError(_)
            | Self::IoError(_) => false,
            Self::EndpointResolutionFailed { source, .. } => {
                !matches!(source, ProtocolError::NotFound(_) | ProtocolError::Malformed(_))
            }
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, NegotiationError>;
