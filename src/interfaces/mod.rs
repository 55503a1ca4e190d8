//! Inbound adapters: batch CSV input/output and the command dispatcher.

pub mod batch;
pub mod csv;
