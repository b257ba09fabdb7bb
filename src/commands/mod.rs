pub mod ingest;
pub mod serve;

// Re-export command functions for convenience
pub use ingest::{check_config, ingest, refresh};
pub use serve::serve;

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use castwave::app::Services;
use castwave::config::Config;
use castwave::models::{NewContent, UserProfile};
use castwave::queue::{JobFamily, MemoryJobStore};

/// Content and listeners seeded into a one-shot run
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Owner of the submitted content
    #[arg(short, long, default_value = "local")]
    pub owner: String,

    /// File to upload (pdf, docx, pptx, txt, html, audio, video)
    #[arg(short, long = "file")]
    pub files: Vec<PathBuf>,

    /// Web page to scrape
    #[arg(short, long = "url")]
    pub urls: Vec<String>,

    /// Text to paste
    #[arg(short, long = "text")]
    pub texts: Vec<String>,

    /// JSON file with an array of listener profiles
    #[arg(long)]
    pub profiles: Option<PathBuf>,
}

/// Services for a one-shot command. Entities live in memory for the run,
/// so the job queue does too.
pub(crate) fn one_shot_services(config: Config) -> Result<Services> {
    Services::builder(config)
        .job_store(Arc::new(MemoryJobStore::new()))
        .build()
        .context("Failed to build services")
}

/// Load profiles, submit every source and process the content queue
pub(crate) async fn seed_and_process(services: &Services, sources: &SourceArgs) -> Result<Vec<Uuid>> {
    if let Some(path) = &sources.profiles {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profiles: {}", path.display()))?;
        let profiles: Vec<UserProfile> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse profiles: {}", path.display()))?;
        for profile in &profiles {
            services.repos.users.upsert_user(profile).await?;
        }
        println!("Loaded {} listener profiles", profiles.len());
    }
    if services.repos.users.get_user(&sources.owner).await?.is_none() {
        services
            .repos
            .users
            .upsert_user(&UserProfile::new(sources.owner.clone()))
            .await?;
    }

    let mut submissions = Vec::new();
    for file in &sources.files {
        submissions.push(NewContent::upload(
            sources.owner.clone(),
            file.display().to_string(),
        ));
    }
    for url in &sources.urls {
        submissions.push(NewContent::url(sources.owner.clone(), url.clone()));
    }
    for text in &sources.texts {
        submissions.push(NewContent::paste(sources.owner.clone(), text.clone()));
    }

    let mut ids = Vec::with_capacity(submissions.len());
    for new in submissions {
        match services.contents.submit(new).await {
            Ok(id) => ids.push(id),
            Err(e) => println!("  Rejected: {e}"),
        }
    }
    if ids.is_empty() {
        return Ok(ids);
    }

    println!("Processing {} submissions...", ids.len());
    let stats = services.drain(JobFamily::ContentProcessing).await?;
    println!(
        "  Completed: {}  Retried: {}  Failed: {}",
        stats.completed, stats.retried, stats.dead
    );

    for id in &ids {
        let content = services.contents.get(*id).await?;
        println!("  [{}] {} ({})", content.status, content.title, content.id);
        if let Some(error) = &content.error {
            println!("      error: {error}");
        }
        if !content.topics.is_empty() {
            let topics: Vec<&str> = content.topics.iter().map(String::as_str).collect();
            println!("      topics: {}", topics.join(", "));
        }
    }
    Ok(ids)
}
