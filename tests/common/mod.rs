#![allow(dead_code)]

use paynego::application::orchestrator::NegotiationOrchestrator;
use paynego::config::{DEFAULT_FINISH_URI_BASE, DEFAULT_RETENTION, NegotiatorConfig};
use paynego::domain::negotiation::NegotiationId;
use paynego::infrastructure::clock::ManualClock;
use paynego::infrastructure::in_memory::InMemoryNegotiationStore;
use paynego::infrastructure::sandbox::{SandboxPaymentClient, sandbox_endpoint};
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const ALICE: &str = "https://alpha.example/alice";
pub const BOB: &str = "https://beta.example/bob";
pub const CAROL: &str = "https://gamma.example/carol";

/// An orchestrator wired to a sandbox with three wallets: alice and bob hold
/// USD, carol holds EUR.
pub struct Harness {
    pub sandbox: SandboxPaymentClient,
    pub store: InMemoryNegotiationStore,
    pub clock: ManualClock,
    pub orchestrator: NegotiationOrchestrator,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(config()).await
    }

    pub async fn with_config(config: NegotiatorConfig) -> Self {
        Self::build(config, DEFAULT_RETENTION).await
    }

    pub async fn with_retention(retention: Duration) -> Self {
        Self::build(config(), retention).await
    }

    async fn build(config: NegotiatorConfig, retention: Duration) -> Self {
        let sandbox = SandboxPaymentClient::new();
        for (wallet, asset_code) in [(ALICE, "USD"), (BOB, "USD"), (CAROL, "EUR")] {
            let endpoint = sandbox_endpoint(Url::parse(wallet).unwrap(), asset_code, 2).unwrap();
            sandbox.register_wallet(endpoint).await;
        }

        let clock = ManualClock::new();
        let store = InMemoryNegotiationStore::with_clock(retention, Arc::new(clock.clone()));
        let orchestrator =
            NegotiationOrchestrator::new(Box::new(sandbox.clone()), Arc::new(store.clone()), config);

        Self {
            sandbox,
            store,
            clock,
            orchestrator,
        }
    }

    /// Plays the user approving the consent request for `negotiation`.
    pub async fn consent(&self, negotiation: &str, interact_ref: &str) {
        self.sandbox.approve_interaction(negotiation, interact_ref).await;
    }
}

pub fn config() -> NegotiatorConfig {
    NegotiatorConfig::new(Url::parse(DEFAULT_FINISH_URI_BASE).unwrap())
}

pub fn id(value: &str) -> NegotiationId {
    NegotiationId::new(value).unwrap()
}

pub fn write_wallets(path: &Path) -> Result<(), Error> {
    let mut file = File::create(path)?;
    writeln!(file, "url, asset_code, asset_scale")?;
    writeln!(file, "{ALICE}, USD, 2")?;
    writeln!(file, "{BOB}, USD, 2")?;
    writeln!(file, "{CAROL}, EUR, 2")?;
    Ok(())
}
