use clap::Parser;
use miette::{IntoDiagnostic, Result, miette};
use paynego::application::orchestrator::NegotiationOrchestrator;
use paynego::config::{
    DEFAULT_FINISH_URI_BASE, DEFAULT_PAYMENT_METHOD, DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL,
    NegotiatorConfig,
};
use paynego::domain::amount::AssetPolicy;
use paynego::infrastructure::in_memory::InMemoryNegotiationStore;
use paynego::infrastructure::sandbox::{SandboxPaymentClient, sandbox_endpoint};
use paynego::interfaces::batch::BatchRunner;
use paynego::interfaces::csv::command_reader::CommandReader;
use paynego::interfaces::csv::outcome_writer::OutcomeWriter;
use paynego::interfaces::csv::wallet_reader::WalletReader;
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Commands CSV file (op, negotiation, sender, receiver, amount, interact_ref)
    commands: PathBuf,

    /// Sandbox wallet directory CSV (url, asset_code, asset_scale)
    #[arg(long, env = "PAYNEGO_WALLETS")]
    wallets: PathBuf,

    /// Exchange rate between sandbox assets as FROM/TO=RATE. Repeatable.
    #[arg(long = "rate", env = "PAYNEGO_RATES", value_delimiter = ',', value_parser = parse_rate)]
    rates: Vec<ExchangeRate>,

    /// Sender wallet for start rows that leave the sender column empty
    #[arg(long, env = "PAYNEGO_SENDER")]
    sender: Option<String>,

    /// Consent finish callback; the negotiation id is appended
    #[arg(long, env = "PAYNEGO_FINISH_URI_BASE", default_value = DEFAULT_FINISH_URI_BASE)]
    finish_uri_base: Url,

    /// Seconds a negotiation may wait for consent before it is abandoned
    #[arg(long, env = "PAYNEGO_RETENTION_SECS", default_value_t = DEFAULT_RETENTION.as_secs())]
    retention_secs: u64,

    #[arg(long, env = "PAYNEGO_SWEEP_INTERVAL_SECS", default_value_t = DEFAULT_SWEEP_INTERVAL.as_secs())]
    sweep_interval_secs: u64,

    #[arg(long, env = "PAYNEGO_PAYMENT_METHOD", default_value = DEFAULT_PAYMENT_METHOD)]
    payment_method: String,

    /// passthrough (quote converts between assets) or same-asset
    #[arg(long, env = "PAYNEGO_ASSET_POLICY", default_value = "passthrough")]
    asset_policy: AssetPolicy,

    /// Write the sandbox's recorded protocol calls to this file as JSON
    #[arg(long, env = "PAYNEGO_CALL_LOG")]
    call_log: Option<PathBuf>,
}

#[derive(Clone, Debug)]
struct ExchangeRate {
    from: String,
    to: String,
    rate: Decimal,
}

fn parse_rate(input: &str) -> std::result::Result<ExchangeRate, String> {
    let (pair, rate) = input
        .split_once('=')
        .ok_or_else(|| format!("expected FROM/TO=RATE, got {input}"))?;
    let (from, to) = pair
        .split_once('/')
        .ok_or_else(|| format!("expected FROM/TO=RATE, got {input}"))?;
    let rate = rate
        .trim()
        .parse::<Decimal>()
        .map_err(|e| format!("invalid rate {rate}: {e}"))?;
    Ok(ExchangeRate {
        from: from.trim().to_string(),
        to: to.trim().to_string(),
        rate,
    })
}

impl Cli {
    fn config(&self) -> NegotiatorConfig {
        NegotiatorConfig {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
            payment_method: self.payment_method.clone(),
            asset_policy: self.asset_policy,
            ..NegotiatorConfig::new(self.finish_uri_base.clone())
        }
    }
}

async fn build_sandbox(cli: &Cli) -> Result<SandboxPaymentClient> {
    let sandbox = SandboxPaymentClient::new();
    let file = File::open(&cli.wallets).into_diagnostic()?;
    for record in WalletReader::new(file).wallets() {
        let record = record.into_diagnostic()?;
        let endpoint = sandbox_endpoint(record.url, record.asset_code, record.asset_scale)
            .into_diagnostic()?;
        sandbox.register_wallet(endpoint).await;
    }
    for rate in &cli.rates {
        if rate.rate <= Decimal::ZERO {
            return Err(miette!("rate {}/{} must be positive", rate.from, rate.to));
        }
        sandbox.set_rate(&rate.from, &rate.to, rate.rate).await;
    }
    // Batch runs have no user to click through consent.
    sandbox.set_auto_consent(true).await;
    Ok(sandbox)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    let sandbox = build_sandbox(&cli).await?;

    let retention = Duration::from_secs(cli.retention_secs);
    let store = Arc::new(InMemoryNegotiationStore::new(retention));
    let sweep_interval = config.sweep_interval;
    let orchestrator = NegotiationOrchestrator::new(Box::new(sandbox.clone()), store, config);
    let sweeper = orchestrator.spawn_sweeper(sweep_interval);

    let runner = BatchRunner::new(&orchestrator, cli.sender.clone());
    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());

    let file = File::open(&cli.commands).into_diagnostic()?;
    let mut processed = 0usize;
    for command in CommandReader::new(file).commands() {
        match command {
            Ok(command) => {
                let outcome = runner.execute(command).await;
                writer.write_outcome(&outcome).into_diagnostic()?;
                processed += 1;
            }
            Err(e) => {
                warn!(error = %e, "Error reading command");
            }
        }
    }
    writer.flush().into_diagnostic()?;
    sweeper.abort();
    info!(processed, "batch finished");

    if let Some(path) = &cli.call_log {
        let log = sandbox.calls_json().await.into_diagnostic()?;
        std::fs::write(path, log).into_diagnostic()?;
    }

    Ok(())
}
