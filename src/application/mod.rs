//! Application layer sequencing the negotiation protocol.
//!
//! This module defines the `NegotiationOrchestrator`, the single state machine
//! behind both halves of a negotiation: start (up to the consent redirect) and
//! resume (after the user returns). Transports call into it with plain values.

pub mod orchestrator;
