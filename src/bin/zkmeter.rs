//! zkmeter CLI
//!
//! Runs the metering pipeline end to end against an in-process escrow ledger
//! and manages pipeline configuration files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rust_decimal::Decimal;

use zkmeter::core::config::MeteringConfig;
use zkmeter::core::usage::{now_millis, PayerId, ProviderId};
use zkmeter::ledger::{EscrowLedger, TransactionLog};
use zkmeter::metering::BatchAccumulator;
use zkmeter::monitoring::metrics::PipelineMetrics;
use zkmeter::settlement::{GatewayVerifier, SettlementCoordinator, SettlementOutcome};
use zkmeter::utils::crypto::KeyPair;
use zkmeter::zkp::{NativeProofSystem, ProofGenerator, ProofVerifier};

/// zkmeter - batched API metering with proof-backed settlement
#[derive(Parser)]
#[command(name = "zkmeter")]
#[command(version = zkmeter::VERSION)]
#[command(about = "Metering and settlement pipeline for pay-per-use APIs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, env = "ZKMETER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive simulated payers through the full pipeline
    Demo {
        /// Number of payers
        #[arg(short, long, default_value = "3")]
        payers: usize,

        /// API calls per payer
        #[arg(short = 'n', long, default_value = "10")]
        calls: usize,

        /// Escrow deposit per payer, in cents
        #[arg(short, long, default_value = "500")]
        funding: u64,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration to a file
    Init {
        /// Destination file
        #[arg(default_value = "zkmeter.json")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let term = Term::stdout();

    if let Err(e) = run_command(&cli, &term).await {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run_command(cli: &Cli, term: &Term) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Demo { payers, calls, funding } => {
            cmd_demo(cli, *payers, *calls, *funding, term).await
        }
        Commands::Config(ConfigCommands::Show) => cmd_config_show(cli, term),
        Commands::Config(ConfigCommands::Init { path, force }) => cmd_config_init(path, *force, term),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<MeteringConfig> {
    let config = match &cli.config {
        Some(path) => MeteringConfig::load(path)?.apply_env()?,
        None => MeteringConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMAND HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_config_show(cli: &Cli, term: &Term) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    term.write_line(&serde_json::to_string_pretty(&config)?)?;
    Ok(())
}

fn cmd_config_init(path: &Path, force: bool, term: &Term) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration already exists: {}. Use --force to overwrite.",
            path.display()
        );
    }
    MeteringConfig::default().save(path)?;
    term.write_line(&format!(
        "{} Configuration written to {}",
        style("✓").green(),
        path.display()
    ))?;
    Ok(())
}

async fn cmd_demo(
    cli: &Cli,
    payers: usize,
    calls: usize,
    funding: u64,
    term: &Term,
) -> anyhow::Result<()> {
    let mut config = load_config(cli)?;
    // Settlement is driven explicitly below
    config.auto_settle = false;

    let system = Arc::new(NativeProofSystem::new());
    let identity = KeyPair::generate();
    let coordinator_key = KeyPair::generate();
    let ledger = Arc::new(EscrowLedger::with_verifier(*identity.public_key()));
    let log = Arc::new(match &config.transaction_log_path {
        Some(path) => TransactionLog::with_file(path)?,
        None => TransactionLog::new(),
    });

    let gateway = Arc::new(GatewayVerifier::new(
        ProofVerifier::new(system.clone(), config.batch_capacity),
        ledger.clone(),
        log.clone(),
        identity,
        &config,
    ));
    gateway.authorize(*coordinator_key.public_key())?;

    let metrics = Arc::new(PipelineMetrics::new());
    let coordinator = Arc::new(
        SettlementCoordinator::new(
            config.clone(),
            Arc::new(BatchAccumulator::new(config.batch_capacity)),
            ProofGenerator::new(system, config.prover_workers),
            gateway,
            metrics.clone(),
        )
        .with_signer(coordinator_key),
    );

    term.write_line(&format!(
        "{} {} payers, {} calls each, batch capacity {}",
        style("→").cyan(),
        payers,
        calls,
        config.batch_capacity
    ))?;

    let payer_ids: Vec<PayerId> = (0..payers).map(|i| PayerId::new(format!("payer-{}", i))).collect();
    for payer in &payer_ids {
        ledger.deposit(payer, funding)?;
    }

    let progress = ProgressBar::new((payers * calls) as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    progress.set_message("recording usage");

    let mut rng = rand::thread_rng();
    for call in 0..calls {
        for payer in &payer_ids {
            let units = rng.gen_range(1..=50u64);
            let value = Decimal::new(rng.gen_range(-5_000_000..5_000_000i64), 4);
            coordinator.record_usage(payer, value, units, &format!("call-{}", call))?;
            progress.inc(1);
        }
    }
    progress.finish_with_message("usage recorded");

    let mut outcomes = coordinator.subscribe();
    let spinner = ProgressBar::new_spinner();
    spinner.set_message("proving and settling");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    let results = coordinator.settle_all().await;
    spinner.finish_and_clear();

    while let Ok(outcome) = outcomes.try_recv() {
        match outcome {
            SettlementOutcome::Settled { payer, receipt, .. } => term.write_line(&format!(
                "{} {} paid {} for {} calls (batch {}, block {})",
                style("✓").green(),
                style(payer).yellow(),
                style(receipt.amount).green(),
                receipt.num_calls,
                receipt.batch_id.short(),
                receipt.block_ref
            ))?,
            SettlementOutcome::Failed { payer, message, .. } => term.write_line(&format!(
                "{} {} {}",
                style("✗").red(),
                style(payer).yellow(),
                message
            ))?,
        }
    }
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();

    term.write_line(&format!("\n{} Pending batches", style("ℹ").blue()))?;
    for payer in &payer_ids {
        if let Some(snapshot) = coordinator.accumulator().status(payer)? {
            term.write_line(&format!(
                "  {}: {}/{} entries, {} units waiting",
                payer, snapshot.size, snapshot.capacity, snapshot.claimed_so_far
            ))?;
        }
    }

    term.write_line(&format!("\n{} Payer statistics", style("ℹ").blue()))?;
    let mut stats: Vec<_> = metrics.all_payer_stats().into_iter().collect();
    stats.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    for (payer, s) in stats {
        term.write_line(&format!(
            "  {}: {} payments, {} paid for {} calls",
            payer, s.payment_count, s.total_paid, s.calls_settled
        ))?;
    }

    term.write_line(&format!("\n{} Ledger events", style("ℹ").blue()))?;
    for record in ledger.events() {
        term.write_line(&format!(
            "  #{:<4} {:<18} {}",
            record.block_number,
            record.event.name(),
            record.tx_hash.short()
        ))?;
    }

    let provider = ProviderId::new(config.provider_id.clone());
    term.write_line(&format!(
        "\n{} Provider {} earned {} across {} settlements ({} failed)",
        style("→").cyan(),
        provider,
        style(ledger.earnings_of(&provider)).green().bold(),
        log.len(),
        failed
    ))?;
    term.write_line(&serde_json::to_string_pretty(&metrics.snapshot())?)?;
    tracing::debug!(finished_at = now_millis(), "Demo complete");
    Ok(())
}
