use crate::domain::negotiation::{CompletedPayment, NegotiationStatus, StartedNegotiation};
use crate::error::{NegotiationError, Result};
use crate::interfaces::csv::command_reader::CommandType;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Waiting on the user's consent.
    Pending,
    Completed,
    Failed,
}

/// One output row per processed command.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct OutcomeRecord {
    pub negotiation: String,
    pub op: CommandType,
    pub status: OutcomeStatus,
    pub interaction_url: Option<String>,
    pub payment_id: Option<String>,
    pub debit: Option<String>,
    pub receive: Option<String>,
    pub error: Option<String>,
}

impl OutcomeRecord {
    fn empty(negotiation: String, op: CommandType, status: OutcomeStatus) -> Self {
        Self {
            negotiation,
            op,
            status,
            interaction_url: None,
            payment_id: None,
            debit: None,
            receive: None,
            error: None,
        }
    }

    pub fn started(started: &StartedNegotiation) -> Self {
        Self {
            interaction_url: Some(started.interaction_url.to_string()),
            debit: Some(started.quote.debit_amount.to_string()),
            receive: Some(started.quote.receive_amount.to_string()),
            ..Self::empty(
                started.negotiation_id.to_string(),
                CommandType::Start,
                OutcomeStatus::Pending,
            )
        }
    }

    pub fn completed(payment: &CompletedPayment) -> Self {
        Self {
            payment_id: Some(payment.payment_id.to_string()),
            debit: Some(payment.debit_amount.to_string()),
            receive: Some(payment.received_amount.to_string()),
            ..Self::empty(
                payment.negotiation_id.to_string(),
                CommandType::Resume,
                OutcomeStatus::Completed,
            )
        }
    }

    pub fn status(status: &NegotiationStatus) -> Self {
        Self {
            interaction_url: status.interaction_url.as_ref().map(|url| url.to_string()),
            debit: Some(status.quote.debit_amount.to_string()),
            receive: Some(status.quote.receive_amount.to_string()),
            ..Self::empty(
                status.negotiation_id.to_string(),
                CommandType::Status,
                OutcomeStatus::Pending,
            )
        }
    }

    pub fn failed(negotiation: impl Into<String>, op: CommandType, error: &NegotiationError) -> Self {
        let message = match std::error::Error::source(error) {
            Some(source) => format!("{error}: {source}"),
            None => error.to_string(),
        };
        Self {
            error: Some(message),
            ..Self::empty(negotiation.into(), op, OutcomeStatus::Failed)
        }
    }
}

/// Writes outcome rows as CSV with a header.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_outcome(&mut self, outcome: &OutcomeRecord) -> Result<()> {
        self.writer.serialize(outcome)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
