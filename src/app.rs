//! Composition root
//!
//! [`Services`] builds every long-lived service once from a [`Config`] and
//! shares them as `Arc`s. Collaborators (gateway, job store, repositories,
//! music source, extraction tools, audio sink) can be swapped through
//! [`ServicesBuilder`], which is how tests run the full pipeline offline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::curation::CurationEngine;
use crate::error::Result;
use crate::feed::FeedRanker;
use crate::gateway::AiGateway;
use crate::ingestion::{
    AnalysisLimits, CommandDocumentExtractor, ContentAnalyzer, ContentExtractor,
    ContentJobHandler, ContentService, DocumentExtractor, FfprobeMediaProbe, IngestionPipeline,
    MediaProbe, PageFetcher,
};
use crate::queue::{
    JobFamily, JobQueue, JobStore, MemoryJobStore, SqliteJobStore, WorkerPool, WorkerStatsSnapshot,
};
use crate::scheduler::Scheduler;
use crate::shows::{MusicSource, ShowGenerator, ShowJobHandler, ShowService, StaticMusicCatalog};
use crate::storage::{AudioSink, FsAudioSink, Repositories};
use crate::utils::retry::Backoff;

pub struct Services {
    pub config: Config,
    pub repos: Repositories,
    pub gateway: Arc<AiGateway>,
    pub queue: Arc<JobQueue>,
    pub contents: Arc<ContentService>,
    pub pipeline: Arc<IngestionPipeline>,
    pub shows: Arc<ShowService>,
    pub generator: Arc<ShowGenerator>,
    pub curation: Arc<CurationEngine>,
    pub feed: Arc<FeedRanker>,
    pub scheduler: Arc<Scheduler>,
    content_pool: Arc<WorkerPool>,
    show_pool: Arc<WorkerPool>,
}

impl Services {
    pub fn builder(config: Config) -> ServicesBuilder {
        ServicesBuilder::new(config)
    }

    /// Services with every collaborator built from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn worker_pool(&self, family: JobFamily) -> &Arc<WorkerPool> {
        match family {
            JobFamily::ContentProcessing => &self.content_pool,
            JobFamily::ShowGeneration => &self.show_pool,
        }
    }

    /// Process one family's jobs until none are queued or running
    pub async fn drain(&self, family: JobFamily) -> Result<WorkerStatsSnapshot> {
        Ok(self.worker_pool(family).run_until_idle().await?)
    }

    /// Spawn both worker pools; they stop when `shutdown` flips to true
    pub fn spawn_workers(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = self.content_pool.spawn(shutdown.clone());
        handles.extend(self.show_pool.spawn(shutdown));
        handles
    }
}

#[derive(Default)]
struct Overrides {
    gateway: Option<Arc<AiGateway>>,
    job_store: Option<Arc<dyn JobStore>>,
    repos: Option<Repositories>,
    music: Option<Arc<dyn MusicSource>>,
    documents: Option<Arc<dyn DocumentExtractor>>,
    probe: Option<Arc<dyn MediaProbe>>,
    audio: Option<Option<Arc<dyn AudioSink>>>,
    feed_seed: Option<u64>,
}

pub struct ServicesBuilder {
    config: Config,
    overrides: Overrides,
}

impl ServicesBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            overrides: Overrides::default(),
        }
    }

    pub fn gateway(mut self, gateway: Arc<AiGateway>) -> Self {
        self.overrides.gateway = Some(gateway);
        self
    }

    pub fn job_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.overrides.job_store = Some(store);
        self
    }

    pub fn repositories(mut self, repos: Repositories) -> Self {
        self.overrides.repos = Some(repos);
        self
    }

    pub fn music(mut self, music: Arc<dyn MusicSource>) -> Self {
        self.overrides.music = Some(music);
        self
    }

    pub fn documents(mut self, documents: Arc<dyn DocumentExtractor>) -> Self {
        self.overrides.documents = Some(documents);
        self
    }

    pub fn media_probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.overrides.probe = Some(probe);
        self
    }

    /// `None` disables audio output
    pub fn audio_sink(mut self, sink: Option<Arc<dyn AudioSink>>) -> Self {
        self.overrides.audio = Some(sink);
        self
    }

    pub fn feed_seed(mut self, seed: u64) -> Self {
        self.overrides.feed_seed = Some(seed);
        self
    }

    fn open_job_store(config: &Config) -> Result<Arc<dyn JobStore>> {
        Ok(match &config.storage.queue_db_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Arc::new(SqliteJobStore::open(path)?)
            }
            None => Arc::new(MemoryJobStore::new()),
        })
    }

    pub fn build(self) -> Result<Services> {
        let Self { config, overrides } = self;

        let gateway = match overrides.gateway {
            Some(gateway) => gateway,
            None => Arc::new(AiGateway::from_config(&config.gateway)?),
        };
        let store = match overrides.job_store {
            Some(store) => store,
            None => Self::open_job_store(&config)?,
        };
        let repos = overrides.repos.unwrap_or_else(Repositories::in_memory);

        let mut queue = JobQueue::new(store);
        for family in JobFamily::all() {
            queue = queue.with_policy(family, config.queue.family(family).policy());
        }
        let queue = Arc::new(queue);

        // Ingestion
        let ingestion = &config.ingestion;
        let documents = overrides.documents.unwrap_or_else(|| {
            Arc::new(CommandDocumentExtractor::new(
                ingestion.pdftotext_path.clone(),
                ingestion.unzip_path.clone(),
            ))
        });
        let probe = overrides
            .probe
            .unwrap_or_else(|| Arc::new(FfprobeMediaProbe::new(ingestion.ffprobe_path.clone())));
        let pages = Arc::new(
            PageFetcher::new(
                Duration::from_secs(ingestion.page_timeout_secs),
                ingestion.page_requests_per_second,
            )?
            .with_retry(Backoff::new(ingestion.page_retries, 500, 5_000))
            .with_max_body_bytes(ingestion.max_page_bytes),
        );
        let mut extractor = ContentExtractor::new(Arc::clone(&gateway), pages, documents, probe);
        if let Some(root) = &ingestion.upload_root {
            extractor = extractor.with_upload_root(root.clone());
        }
        let analyzer = Arc::new(ContentAnalyzer::new(Arc::clone(&gateway)).with_limits(
            AnalysisLimits {
                max_input_chars: ingestion.max_input_chars,
                ..AnalysisLimits::default()
            },
        ));
        let contents = Arc::new(ContentService::new(
            Arc::clone(&repos.contents),
            Arc::clone(&queue),
        ));
        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&repos.contents),
            extractor,
            Arc::clone(&analyzer),
        ));

        // Shows
        let music = overrides
            .music
            .unwrap_or_else(|| Arc::new(StaticMusicCatalog::default()));
        let audio = overrides.audio.unwrap_or_else(|| {
            config
                .shows
                .audio_dir
                .as_ref()
                .map(|dir| Arc::new(FsAudioSink::new(dir.clone())) as Arc<dyn AudioSink>)
        });
        let shows = Arc::new(ShowService::new(repos.clone(), Arc::clone(&queue)));
        let generator = Arc::new(ShowGenerator::new(
            repos.clone(),
            Arc::clone(&gateway),
            music,
            audio,
        )?);

        // Curation, feed, scheduler
        let curation = Arc::new(CurationEngine::new(
            repos.clone(),
            analyzer,
            Arc::clone(&shows),
            config.curation.clone(),
        ));
        let mut feed = FeedRanker::new(repos.clone(), config.feed.clone());
        if let Some(seed) = overrides.feed_seed {
            feed = feed.with_seed(seed);
        }
        let scheduler = Arc::new(Scheduler::for_curation(
            Arc::clone(&curation),
            &config.scheduler,
        )?);

        let poll_interval = config.queue.poll_interval();
        let content_pool = Arc::new(
            WorkerPool::new(
                JobFamily::ContentProcessing,
                Arc::clone(&queue),
                Arc::new(ContentJobHandler::new(Arc::clone(&pipeline))),
            )
            .with_workers(config.queue.content_processing.workers)
            .with_poll_interval(poll_interval),
        );
        let show_pool = Arc::new(
            WorkerPool::new(
                JobFamily::ShowGeneration,
                Arc::clone(&queue),
                Arc::new(ShowJobHandler::new(Arc::clone(&generator))),
            )
            .with_workers(config.queue.show_generation.workers)
            .with_poll_interval(poll_interval),
        );

        info!(
            default_provider = gateway.default_provider(),
            providers = ?gateway.provider_ids(),
            "Services ready"
        );

        Ok(Services {
            config,
            repos,
            gateway,
            queue,
            contents,
            pipeline,
            shows,
            generator,
            curation,
            feed: Arc::new(feed),
            scheduler,
            content_pool,
            show_pool,
        })
    }
}
