//! answer-ledger - JSON-lines event loop over the answer ledger
//!
//! Reads one `InboundEvent` per stdin line and writes one `OutboundMessage`
//! per event to stdout. Logs go to stderr.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use answer_agent::AnswerAgent;
use answer_ledger::{
    cli::Args, notify::Outbound, ChannelNotifier, InboundEvent, LedgerService, LedgerStore,
    OutboundMessage, SqliteLedger, SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "answer_ledger={level},answer_agent={level},info",
            level = args.log_level
        )
        .into()
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(
            args.log_json
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!args.log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    let config = match args.ledger_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if args.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let store: Arc<dyn LedgerStore> = match SqliteLedger::open(&args.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Ledger store unavailable: {}", e);
            std::process::exit(1);
        }
    };

    info!("======================================");
    info!("  Answer Ledger");
    info!("======================================");
    info!("Database: {:?}", args.db_path);
    info!("Free limit: {}/day", config.free_daily_limit);
    info!("Fair-use cap: {}/day", config.fair_use_daily_cap);
    info!("Credit pack: {} answers", config.credit_pack_size);
    info!("Subscription: {} days", config.subscription_days);
    info!(
        "Intervals: free {}ms, premium {}ms",
        config.free_interval_ms, config.premium_interval_ms
    );
    info!("======================================");

    let (notifier, mut notifications) = ChannelNotifier::channel(256);
    let mut service = LedgerService::new(store, Arc::new(SystemClock), config, Arc::new(notifier));

    match AnswerAgent::from_config(args.agent_config()) {
        Ok(agent) => service = service.with_agent(Arc::new(agent)),
        Err(e) => warn!("Answer agent unavailable, answers will be refused: {}", e),
    }
    if let Some(admin) = args.admin_id() {
        service = service.with_admin(admin);
    }
    if let Some(username) = &args.bot_username {
        service = service.with_bot_username(username.clone());
    }
    let service = Arc::new(service);

    // Single writer keeps output lines whole
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(256);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = out_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(mut line) => {
                    line.push('\n');
                    if let Err(e) = stdout.write_all(line.as_bytes()).await {
                        error!("Failed to write output: {}", e);
                        break;
                    }
                    let _ = stdout.flush().await;
                }
                Err(e) => error!("Failed to serialize output: {}", e),
            }
        }
    });

    let notify_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(Outbound {
            user_id,
            notification,
        }) = notifications.recv().await
        {
            let message = OutboundMessage::Notification {
                user_id,
                message: notification.message(),
                notification,
            };
            if notify_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: InboundEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed event");
                continue;
            }
        };
        debug!(line = line_no, user_id = %event.user_id(), "Event received");

        let service = service.clone();
        let out_tx = out_tx.clone();
        tasks.spawn(async move {
            let message = service.handle(event).await;
            let _ = out_tx.send(message).await;
        });

        // Reap finished tasks so the set does not grow with the input
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!("Event task failed: {}", e);
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Event task failed: {}", e);
        }
    }

    // The service holds the notifier; dropping it closes the channel
    drop(service);
    let _ = forwarder.await;
    drop(out_tx);
    let _ = writer.await;

    info!("Input closed, {} lines processed", line_no);
    Ok(())
}
