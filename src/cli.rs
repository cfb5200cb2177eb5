use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::domain::Namespace;
use crate::ports::LedgerRepository;
use crate::subsystem::PaymentSubsystem;

#[derive(Parser)]
#[command(name = "paystack-reconciler")]
#[command(about = "Paystack payment reconciliation service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Ledger entry commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Show a ledger entry by reference
    Show {
        #[arg(value_name = "REFERENCE")]
        reference: String,
    },

    /// Ask the gateway for the charge status and reconcile the entry
    Reconcile {
        #[arg(value_name = "REFERENCE")]
        reference: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_show(ledger: &dyn LedgerRepository, reference: &str) -> anyhow::Result<()> {
    let Some(entry) = ledger.find_by_reference(reference).await? else {
        tracing::warn!("Ledger entry {} not found", reference);
        anyhow::bail!("Ledger entry {} not found", reference)
    };

    println!("Reference:  {}", entry.reference);
    println!("Namespace:  {}", entry.namespace);
    println!("Status:     {}", entry.status);
    println!("Amount:     {}", entry.amount);
    println!("Email:      {}", entry.email);
    println!("Orders:     {}", entry.order_ids.len());
    for order_id in &entry.order_ids {
        println!("  - {}", order_id);
    }
    println!("Created:    {}", entry.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated:    {}", entry.updated_at.format("%Y-%m-%d %H:%M:%S"));

    Ok(())
}

/// Operator-triggered poll. Goes through the same engine as the verify
/// endpoint, chosen by the reference's prefix.
pub async fn handle_tx_reconcile(
    subsystems: &[std::sync::Arc<PaymentSubsystem>],
    reference: &str,
) -> anyhow::Result<()> {
    let namespace = Namespace::classify(reference);
    let subsystem = subsystems
        .iter()
        .find(|s| s.namespace == namespace)
        .ok_or_else(|| anyhow::anyhow!("No subsystem mounted for namespace {}", namespace))?;
    let outcome = subsystem.poll(reference).await?;

    tracing::info!(
        reference = %reference,
        status = %outcome.entry.status,
        settled = outcome.settled,
        "Manual reconciliation finished"
    );
    println!(
        "✓ {} is {}{}",
        reference,
        outcome.entry.status,
        if outcome.settled { " (settled now)" } else { "" }
    );

    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Gateway URL: {}", config.gateway.base_url);
    println!("  Gateway Secret Key: {}", config.gateway.secret_key);
    println!("  Callback URL: {}", config.gateway.callback_url);
    println!(
        "  Receipt Service: {}",
        config.receipt_service_url.as_deref().unwrap_or("(log only)")
    );

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
