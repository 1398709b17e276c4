use tracing::info;

use crate::app::{AppContext, Result};
use crate::daemon::Engine;
use crate::domain::Source;
use crate::scheduler::TickReport;

pub async fn run(ctx: &AppContext) -> Result<()> {
    let removed = ctx.service().cleanup_orphan_sources()?;
    if removed > 0 {
        println!("Removed {} sources without subscribers", removed);
    }

    let engine = Engine::new(ctx.scheduler());
    let handle = engine.start()?;
    println!("Engine running, press Ctrl-C to stop");

    shutdown_signal().await?;
    info!("Shutdown requested");
    handle.stop().await;
    Ok(())
}

pub async fn subscribe(ctx: &AppContext, user: i64, url: &str) -> Result<()> {
    let (source, subscription) = ctx.service().subscribe(user, url).await?;
    println!(
        "Subscribed {} to {} (subscription {})",
        user,
        source.display_title(),
        subscription.id
    );
    Ok(())
}

pub fn unsubscribe(ctx: &AppContext, user: i64, url: &str) -> Result<()> {
    let removed_source = ctx.service().unsubscribe(user, url)?;
    println!("Unsubscribed {} from {}", user, url);
    if removed_source {
        println!("No subscribers left, source removed");
    }
    Ok(())
}

pub fn list(ctx: &AppContext, user: i64) -> Result<()> {
    let subscriptions = ctx.service().subscriptions(user)?;
    if subscriptions.is_empty() {
        println!("No subscriptions for {}", user);
        return Ok(());
    }

    let threshold = ctx.config.engine.error_threshold;
    for (subscription, source) in subscriptions {
        println!(
            "{:>6}  {:<8} every {}m  {}",
            subscription.id,
            source_state(&source, threshold),
            subscription.interval_minutes,
            source.display_title()
        );
        println!("        {}", source.url);
        if !subscription.tag.is_empty() {
            println!("        tags: {}", subscription.tag);
        }
    }
    Ok(())
}

pub async fn tick(ctx: &AppContext) -> Result<()> {
    let report = ctx.scheduler().tick().await;
    print_report(&report);
    Ok(())
}

fn source_state(source: &Source, threshold: u32) -> String {
    if source.is_suspended(threshold) {
        "paused".to_string()
    } else if source.error_count > 0 {
        format!("errors:{}", source.error_count)
    } else {
        "ok".to_string()
    }
}

fn print_report(report: &TickReport) {
    println!(
        "{} due, {} fetched, {} failed, {} still running",
        report.due, report.fetched, report.failed, report.in_flight
    );
    println!("{} new items, {} sources suspended", report.new_items, report.suspended);

    let delivery = &report.delivery;
    println!(
        "Delivered {} (chat {}, webhook {}, transfer {}), {} duplicates, {} failed",
        delivery.delivered(),
        delivery.chat_sent,
        delivery.webhook_sent,
        delivery.transfer_sent,
        delivery.duplicates,
        delivery.failed
    );
    if delivery.deactivated > 0 {
        println!("{} subscriptions removed for blocked recipients", delivery.deactivated);
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
