use anyhow::{Context, Result};

use castwave::config::Config;
use castwave::curation::CurationScope;
use castwave::feed::FeedItem;
use castwave::models::ShowType;
use castwave::queue::JobFamily;
use castwave::shows::ShowRequest;

use super::{one_shot_services, seed_and_process, SourceArgs};

pub async fn ingest(
    config: Config,
    sources: SourceArgs,
    show: Option<String>,
    feed: bool,
    limit: usize,
) -> Result<()> {
    let show_type = show
        .as_deref()
        .map(|s| ShowType::parse(s).with_context(|| format!("Unknown show type '{s}'")))
        .transpose()?;

    let services = one_shot_services(config)?;
    println!("Ingesting content for '{}'", sources.owner);
    println!("=========================");
    seed_and_process(&services, &sources).await?;

    if let Some(show_type) = show_type {
        println!();
        println!("Requesting {} show...", show_type.label());
        let show_id = services
            .shows
            .request(ShowRequest::auto(Some(sources.owner.clone()), show_type))
            .await?;
        services.drain(JobFamily::ShowGeneration).await?;

        let show = services.shows.get(show_id).await?;
        println!("  Status: {}", show.status);
        println!("  Title: {}", show.title);
        println!("  Duration: {}s", show.duration_secs);
        println!("  Sources: {}", show.content_ids.len());
        if !show.music_track_ids.is_empty() {
            println!("  Tracks: {}", show.music_track_ids.join(", "));
        }
        if let Some(audio) = &show.audio_ref {
            println!("  Audio: {audio}");
        }
        if let Some(error) = &show.error {
            println!("  Error: {error}");
        }
        if let Some(script) = &show.script {
            println!();
            println!("{script}");
        }
    }

    if feed {
        println!();
        let page = services.feed.build_page(&sources.owner, limit, 0).await?;
        println!("Feed ({} of {} items)", page.entries.len(), page.total);
        println!("{:-<40}", "");
        for entry in &page.entries {
            let label = match &entry.item {
                FeedItem::Show(show) => format!("show/{}", show.show_type),
                other => other.kind().to_string(),
            };
            println!("{:>7.2}  {:<16} {}", entry.score, label, entry.item.title());
        }
    }

    Ok(())
}

pub async fn refresh(config: Config, sources: SourceArgs, user: Option<String>) -> Result<()> {
    let services = one_shot_services(config)?;
    seed_and_process(&services, &sources).await?;

    let scope = match user {
        Some(id) => CurationScope::User(id),
        None => CurationScope::Global,
    };
    println!();
    println!("Running curation pass ({scope})...");
    services.curation.recompute_trending().await?;
    let report = services.curation.refresh(scope).await?;
    let shows = services.drain(JobFamily::ShowGeneration).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("Shows generated: {}  failed: {}", shows.completed, shows.dead);
    Ok(())
}

pub fn check_config(config: &Config) {
    println!("Configuration OK");
    println!("{:-<40}", "");
    println!("Default provider: {}", config.gateway.default_provider);
    println!(
        "Fallback provider: {}",
        config.gateway.fallback_provider.as_deref().unwrap_or("none")
    );
    let providers: Vec<&str> = config.gateway.providers.keys().map(String::as_str).collect();
    println!("Providers: {}", providers.join(", "));
    println!("Embedding dimensions: {}", config.gateway.embedding_dimensions);
    for family in JobFamily::all() {
        let section = config.queue.family(family);
        println!(
            "Queue {family}: {} workers, {} attempts",
            section.workers, section.max_attempts
        );
    }
    let show_types: Vec<&str> = config.curation.show_types.iter().map(|t| t.as_str()).collect();
    println!("Curated show types: {}", show_types.join(", "));
    println!("Retention: {} days", config.scheduler.retention_days);
    match &config.storage.queue_db_path {
        Some(path) => println!("Queue database: {}", path.display()),
        None => println!("Queue database: in-memory"),
    }
}
