use crate::application::orchestrator::NegotiationOrchestrator;
use crate::domain::negotiation::NegotiationId;
use crate::error::{NegotiationError, Result};
use crate::interfaces::csv::command_reader::{Command, CommandType};
use crate::interfaces::csv::outcome_writer::OutcomeRecord;

/// Maps command rows onto orchestrator calls.
pub struct BatchRunner<'a> {
    orchestrator: &'a NegotiationOrchestrator,
    default_sender: Option<String>,
}

impl<'a> BatchRunner<'a> {
    /// `default_sender` is used for start rows that leave the sender column empty.
    pub fn new(orchestrator: &'a NegotiationOrchestrator, default_sender: Option<String>) -> Self {
        Self {
            orchestrator,
            default_sender,
        }
    }

    /// Runs one command. Failures become failed rows rather than errors.
    pub async fn execute(&self, command: Command) -> OutcomeRecord {
        let op = command.op;
        let label = command.negotiation.clone().unwrap_or_default();
        match self.dispatch(command).await {
            Ok(outcome) => outcome,
            Err(err) => OutcomeRecord::failed(label, op, &err),
        }
    }

    async fn dispatch(&self, command: Command) -> Result<OutcomeRecord> {
        match command.op {
            CommandType::Start => {
                let id = match command.negotiation {
                    Some(id) => NegotiationId::new(id)?,
                    None => NegotiationId::generate(),
                };
                let sender = command
                    .sender
                    .or_else(|| self.default_sender.clone())
                    .ok_or(NegotiationError::MissingField("sender"))?;
                let receiver = command
                    .receiver
                    .ok_or(NegotiationError::MissingField("receiver"))?;
                let amount = command
                    .amount
                    .ok_or(NegotiationError::MissingField("amount"))?;
                let started = self
                    .orchestrator
                    .start(id, &sender, &receiver, amount)
                    .await?;
                Ok(OutcomeRecord::started(&started))
            }
            CommandType::Resume => {
                let id = required_id(command.negotiation)?;
                let interact_ref = command
                    .interact_ref
                    .ok_or(NegotiationError::MissingField("interact_ref"))?;
                let completed = self.orchestrator.resume(id, &interact_ref).await?;
                Ok(OutcomeRecord::completed(&completed))
            }
            CommandType::Status => {
                let id = required_id(command.negotiation)?;
                let status = self.orchestrator.status(&id).await?;
                Ok(OutcomeRecord::status(&status))
            }
        }
    }
}

fn required_id(negotiation: Option<String>) -> Result<NegotiationId> {
    negotiation
        .ok_or(NegotiationError::MissingField("negotiation"))
        .and_then(NegotiationId::new)
}
