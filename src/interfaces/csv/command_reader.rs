use crate::error::{NegotiationError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Start,
    Resume,
    Status,
}

/// One row of a command file. Which columns are required depends on `op`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    pub op: CommandType,
    pub negotiation: Option<String>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub amount: Option<Decimal>,
    pub interact_ref: Option<String>,
}

/// Reads negotiation commands from a CSV source.
///
/// Expects the header `op, negotiation, sender, receiver, amount, interact_ref`.
/// Whitespace is trimmed and short records are accepted, so a resume row can
/// stop after its interaction reference.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes commands; a malformed row yields an error and reading
    /// continues with the next one.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(NegotiationError::from))
    }
}
