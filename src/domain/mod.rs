//! Domain types and the ports the application layer talks through.

pub mod amount;
pub mod grant;
pub mod negotiation;
pub mod payment;
pub mod ports;
pub mod wallet;
