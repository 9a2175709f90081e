//! arycar CLI: operator interface to the work-order lifecycle.

use std::sync::Arc;

use arycar::config::Config;
use arycar::config::secrets::redact_url;
use arycar::db::Db;
use arycar::engine::Engine;
use arycar::error::Error;
use arycar::model::{
    BlobRef, MediaType, NewMedia, NewWorkOrder, ServiceId, Status, UserId, WorkOrderFilter,
    WorkOrderId,
};
use arycar::notify::{MockNotifier, NotificationChannel, Notifier};
use arycar::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "arycar", about = "Car-wash work orders")]
struct Cli {
    /// Staff user performing the action
    #[arg(long, global = true, default_value_t = Uuid::nil())]
    actor: Uuid,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Work order operations
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Media evidence operations
    Media {
        #[command(subcommand)]
        action: MediaAction,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Open a new work order
    Create {
        /// License plate (Mercosul or legacy)
        #[arg(long)]
        plate: String,
        /// Customer phone number
        #[arg(long)]
        phone: String,
        /// Customer name
        #[arg(long)]
        name: Option<String>,
        /// Service as UUID[:QTY]; repeat for several
        #[arg(long = "service", required = true, value_parser = parse_service)]
        services: Vec<(ServiceId, u32)>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List work orders, newest first
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<Status>,
        /// Plate or code fragment
        #[arg(long)]
        search: Option<String>,
        /// Maximum orders to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show a work order with its timeline
    Show {
        /// Work order ID or code (e.g. OS-000042)
        id: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a work order to another status
    Transition {
        /// Work order ID or code
        id: String,
        /// Target status (e.g. in-progress, ready, delivered, cancelled)
        status: Status,
    },
    /// Replace the notes (empty text clears them)
    Notes {
        /// Work order ID or code
        id: String,
        text: String,
    },
}

#[derive(Subcommand)]
enum MediaAction {
    /// Record an uploaded media file against a work order
    Attach {
        /// Work order ID or code
        id: String,
        /// Media type (e.g. entry-video-external)
        #[arg(long = "type")]
        media_type: MediaType,
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        mime: String,
        /// Size in bytes
        #[arg(long)]
        size: u64,
        #[arg(long)]
        caption: Option<String>,
    },
}

fn parse_service(raw: &str) -> Result<(ServiceId, u32), String> {
    let (id, qty) = match raw.split_once(':') {
        Some((id, qty)) => (id, qty.parse::<u32>().map_err(|e| e.to_string())?),
        None => (raw, 1),
    };
    let id = id.parse::<ServiceId>().map_err(|e| e.to_string())?;
    Ok((id, qty))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<Error>() {
            Some(err) => eprintln!("error [{}]: {}", err.kind(), err.user_message()),
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "arycar".to_string(),
        log_level: config.log_level.clone(),
    })?;

    info!(database = %redact_url(&config.database_url), "connecting");
    let db = Db::connect(config.database_url.expose_secret()).await?;

    if let Command::Migrate = cli.command {
        db.migrate().await?;
        println!("Migrations applied.");
        return Ok(());
    }

    let actor = UserId(cli.actor);
    let engine = Engine::new(Arc::new(db), notifier_for(config.notification_channel)?);

    let result = match cli.command {
        Command::Migrate => Ok(()),
        Command::Order { action } => match action {
            OrderAction::Create {
                plate,
                phone,
                name,
                services,
                notes,
            } => cmd_order_create(&engine, actor, plate, phone, name, services, notes).await,
            OrderAction::List {
                status,
                search,
                limit,
            } => cmd_order_list(&engine, status, search, limit).await,
            OrderAction::Show { id, json } => cmd_order_show(&engine, &id, json).await,
            OrderAction::Transition { id, status } => {
                let id = resolve_id(&engine, &id).await?;
                let order = engine.request_transition(id, status, actor).await?;
                println!("{}: {}", order.code, order.status);
                Ok(())
            }
            OrderAction::Notes { id, text } => {
                let id = resolve_id(&engine, &id).await?;
                let order = engine.update_notes(id, &text, actor).await?;
                let what = if order.notes.is_some() { "updated" } else { "cleared" };
                println!("{}: notes {what}", order.code);
                Ok(())
            }
        },
        Command::Media { action } => match action {
            MediaAction::Attach {
                id,
                media_type,
                bucket,
                key,
                mime,
                size,
                caption,
            } => {
                let id = resolve_id(&engine, &id).await?;
                let mut new = NewMedia::new(media_type, BlobRef::new(bucket, key), mime, size);
                if let Some(caption) = caption {
                    new = new.caption(caption);
                }
                let media = engine.attach_media(id, new, actor).await?;
                println!("Attached: {} ({})", media.id, media.media_type);
                Ok(())
            }
        },
    };

    // Status notifications run detached; let them finish before exiting.
    engine.shutdown().await;
    result
}

/// Only the mock channel ships with the core.
fn notifier_for(channel: NotificationChannel) -> anyhow::Result<Arc<dyn Notifier>> {
    match channel {
        NotificationChannel::Mock => Ok(Arc::new(MockNotifier::new())),
        other => anyhow::bail!("notification channel {other:?} has no provider configured"),
    }
}

/// Accept a full UUID or an order code.
async fn resolve_id(engine: &Engine, raw: &str) -> anyhow::Result<WorkOrderId> {
    if let Ok(uuid) = Uuid::parse_str(raw) {
        return Ok(WorkOrderId(uuid));
    }

    let matches = engine
        .list(&WorkOrderFilter {
            search: Some(raw.to_string()),
            ..Default::default()
        })
        .await?;
    matches
        .into_iter()
        .find(|o| o.code.eq_ignore_ascii_case(raw.trim()))
        .map(|o| o.id)
        .ok_or_else(|| Error::NotFound(format!("work order {raw}")).into())
}

async fn cmd_order_create(
    engine: &Engine,
    actor: UserId,
    plate: String,
    phone: String,
    name: Option<String>,
    services: Vec<(ServiceId, u32)>,
    notes: Option<String>,
) -> anyhow::Result<()> {
    let mut new = NewWorkOrder::new(plate, phone);
    if let Some(name) = name {
        new = new.customer_name(name);
    }
    for (service_id, quantity) in services {
        new = new.service(service_id, quantity);
    }
    if let Some(notes) = notes {
        new = new.notes(notes);
    }

    let order = engine.create_work_order(new, actor).await?;
    println!("Created: {} {} (status: {})", order.code, order.id, order.status);
    Ok(())
}

async fn cmd_order_list(
    engine: &Engine,
    status: Option<Status>,
    search: Option<String>,
    limit: usize,
) -> anyhow::Result<()> {
    let orders = engine
        .list(&WorkOrderFilter {
            status,
            search,
            limit: Some(limit),
        })
        .await?;

    if orders.is_empty() {
        println!("No work orders found.");
        return Ok(());
    }

    println!("{:<10}  {:<8}  {:<12}  CREATED", "CODE", "ID", "STATUS");
    println!("{}", "-".repeat(60));

    for order in &orders {
        let short_id = &order.id.to_string()[..8];
        println!(
            "{:<10}  {:<8}  {:<12}  {}",
            order.code,
            short_id,
            order.status.as_str(),
            order.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} order(s)", orders.len());
    Ok(())
}

async fn cmd_order_show(engine: &Engine, raw: &str, json: bool) -> anyhow::Result<()> {
    let id = resolve_id(engine, raw).await?;
    let detail = engine.detail(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let order = &detail.order;
    println!("Code:       {}", order.code);
    println!("ID:         {}", order.id);
    println!("Status:     {}", order.status);
    println!("Plate:      {}", detail.vehicle.plate);
    println!(
        "Customer:   {} ({})",
        detail.customer.name.as_deref().unwrap_or("-"),
        detail.customer.phone
    );
    println!("Notes:      {}", order.notes.as_deref().unwrap_or("-"));
    println!("Created:    {}", order.created_at);
    for status in [
        Status::InProgress,
        Status::Ready,
        Status::Delivered,
        Status::Cancelled,
    ] {
        if let Some(at) = order.milestone(status) {
            println!("{:<11} {at}", format!("{status}:"));
        }
    }

    println!("---");
    for service in &detail.services {
        println!("Service:    {} x{}", service.service_id, service.quantity);
    }
    for media in &detail.media {
        println!(
            "Media:      {} {}/{} ({} bytes)",
            media.media_type, media.blob.bucket, media.blob.object_key, media.size_bytes
        );
    }

    println!("---");
    for event in &detail.events {
        println!(
            "{}  {:<15}  {}",
            event.created_at.format("%Y-%m-%d %H:%M:%S"),
            event.event_type.as_str(),
            event.message.as_deref().unwrap_or("")
        );
    }

    println!("\nAllowed next:");
    for allowed in engine.allowed_transitions(id).await? {
        if allowed.allowed {
            println!("  {}", allowed.to);
        } else {
            let missing: Vec<&str> = allowed.missing_media.iter().map(|m| m.as_str()).collect();
            println!("  {} (missing: {})", allowed.to, missing.join(", "));
        }
    }

    Ok(())
}
