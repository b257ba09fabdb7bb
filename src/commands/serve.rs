use anyhow::{Context, Result};
use tokio::sync::watch;

use castwave::app::Services;
use castwave::config::Config;
use castwave::queue::JobFamily;
use castwave::scheduler::TriggerEvent;

/// Run both worker pools and the scheduler until Ctrl-C
pub async fn serve(config: Config, print_metrics: bool) -> Result<()> {
    let services = Services::from_config(config).context("Failed to build services")?;

    println!("Starting castwave");
    println!("=================");
    println!("  Default provider: {}", services.gateway.default_provider());
    for family in JobFamily::all() {
        println!(
            "  {family} workers: {}",
            services.config.queue.family(family).workers
        );
    }
    println!("  Triggers: {}", services.scheduler.trigger_names().join(", "));
    println!();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = services.spawn_workers(shutdown_rx.clone());
    handles.extend(services.scheduler.start(shutdown_rx)?);

    let mut events = services.scheduler.subscribe();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                TriggerEvent::Completed {
                    trigger,
                    summary,
                    elapsed_ms,
                } => {
                    tracing::info!(trigger = %trigger, elapsed_ms, "{summary}");
                }
                TriggerEvent::Failed { trigger, error } => {
                    tracing::warn!(trigger = %trigger, error = %error, "Trigger run failed");
                }
                TriggerEvent::Skipped { trigger, .. } => {
                    tracing::debug!(trigger = %trigger, "Trigger run skipped");
                }
                TriggerEvent::Started { .. } => {}
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    println!("Shutting down...");

    shutdown_tx.send(true).ok();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Task ended abnormally");
        }
    }
    event_log.abort();

    for family in JobFamily::all() {
        let stats = services.queue.stats(family).await?;
        println!(
            "  {family}: queued {}, running {}, completed {}, dead {}",
            stats.queued, stats.running, stats.completed, stats.dead
        );
    }

    if print_metrics {
        match castwave::metrics::gather() {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::warn!(error = %e, "Failed to gather metrics"),
        }
    }

    Ok(())
}
