use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use paystack_reconciler::{
    adapters::Stores,
    cli::{self, Cli, Commands, DbCommands, TxCommands},
    config::{Config, LogFormat},
    create_app, cors_layer, db,
    gateway::{PaymentGateway, PaystackClient},
    services::{
        run_receipt_worker, HttpReceiptNotifier, LogReceiptNotifier, QueuedReceiptDispatcher,
        ReceiptNotifier,
    },
    startup, AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Config) => {
            cli::handle_config_validate(&config)?;
            let pool = db::create_pool(&config).await?;
            let report = startup::validate_environment(&config, &pool).await?;
            report.print();
            if !report.is_valid() {
                anyhow::bail!("Configuration validation failed");
            }
            Ok(())
        }
        Some(Commands::Tx(TxCommands::Show { reference })) => {
            let pool = db::create_pool(&config).await?;
            let stores = Stores::postgres(pool);
            cli::handle_tx_show(stores.ledger.as_ref(), &reference).await
        }
        Some(Commands::Tx(TxCommands::Reconcile { reference })) => {
            let pool = db::create_pool(&config).await?;
            let (dispatcher, receiver) = QueuedReceiptDispatcher::new();
            let state = build_state(&config, Stores::postgres(pool), dispatcher)?;

            let result = cli::handle_tx_reconcile(&state.subsystems, &reference).await;

            // Flush any receipt queued by this run before exiting.
            drop(state);
            run_receipt_worker(receiver, notifier(&config)).await;
            result
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn notifier(config: &Config) -> Arc<dyn ReceiptNotifier> {
    match &config.receipt_service_url {
        Some(url) => Arc::new(HttpReceiptNotifier::new(url.clone())),
        None => Arc::new(LogReceiptNotifier),
    }
}

fn build_state(
    config: &Config,
    stores: Stores,
    dispatcher: QueuedReceiptDispatcher,
) -> anyhow::Result<AppState> {
    let gateway: Arc<dyn PaymentGateway> = Arc::new(PaystackClient::new(&config.gateway)?);
    tracing::info!("Paystack client initialized with URL: {}", config.gateway.base_url);

    Ok(AppState::new(
        stores,
        gateway,
        Arc::new(dispatcher),
        &config.gateway,
    ))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let (dispatcher, receiver) = QueuedReceiptDispatcher::new();
    let worker = tokio::spawn(run_receipt_worker(receiver, notifier(&config)));

    let state = build_state(&config, Stores::postgres(pool), dispatcher)?;
    let mut app = create_app(state);
    if let Some(origins) = &config.cors_allowed_origins {
        app = app.layer(cors_layer(origins));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last dispatcher; the worker drains and exits.
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Receipt worker terminated abnormally");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
