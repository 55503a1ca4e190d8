//! Negotiates interactively authorized payments between two wallets.
//!
//! A negotiation requests grants and creates an incoming payment and a quote,
//! suspends while the sender's user consents to the outgoing payment, and is
//! later resumed by its negotiation id to create that payment. See
//! [`application::orchestrator::NegotiationOrchestrator`].

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
