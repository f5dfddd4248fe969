use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use firecrawl_client::FirecrawlClient;
use mapbox_client::MapboxClient;
use scamwatch_common::Config;
use scamwatch_pipeline::scheduler::{self, order_jobs, BatchCursor};
use scamwatch_pipeline::{
    BatchScheduler, BatchSettings, EnrichmentEngine, GeocodeNormalizer, LlmClassifier,
    RateLimiter, RedditClient, SourceClient, TimeBudget, UrlIngestor, WorkMatrix,
};
use scamwatch_store::{PgStore, ReportStore, ResetScope};

#[derive(Parser)]
#[command(name = "scamwatch", about = "Travel scam ingestion and enrichment pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,
    /// Fetch one batch of (channel, term) work units
    Fetch {
        #[arg(long, default_value_t = 0)]
        batch: usize,
        /// Continue a stopped batch at this unit index
        #[arg(long)]
        resume_index: Option<usize>,
        #[arg(long, default_value_t = 5)]
        batch_size: usize,
        #[arg(long, default_value_t = 25)]
        limit: u32,
        /// Also fetch comment trees for newly inserted posts
        #[arg(long)]
        comments: bool,
    },
    /// Fetch batches until the matrix is exhausted or time runs out
    FetchAll {
        #[arg(long, default_value_t = 0)]
        from_batch: usize,
        #[arg(long)]
        resume_index: Option<usize>,
        #[arg(long, default_value_t = 5)]
        batch_size: usize,
        #[arg(long, default_value_t = 25)]
        limit: u32,
        #[arg(long)]
        comments: bool,
    },
    /// Classify, geocode and aggregate unprocessed reports
    Enrich {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Analyze stored comments for secondary incidents
    Comments {
        #[arg(long, default_value_t = 200)]
        limit: i64,
    },
    /// Mark every pending or processing fetch job as failed
    StopJobs,
    /// List the fetch job ledger
    Jobs,
    /// Return reports to the unprocessed state
    Reset {
        #[arg(long, conflicts_with_all = ["all", "stalled"])]
        country: Option<String>,
        #[arg(long, conflicts_with = "stalled")]
        all: bool,
        /// Only reports stuck at the attempt cutoff
        #[arg(long)]
        stalled: bool,
    },
    /// List reports stuck at the attempt cutoff
    Stalled {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Delete every location rollup
    ResetStats,
    /// Scrape and ingest one thread URL
    IngestUrl { url: String },
    /// Crawl from a URL and ingest every thread page found
    Crawl {
        url: String,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new("scamwatch=info,scamwatch_pipeline=info,scamwatch_store=info")
    })?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let config = Config::pipeline_from_env()?;
    config.log_redacted();
    let budget = TimeBudget::new(config.time_ceiling());

    let pg = Arc::new(
        PgStore::connect(&config.database_url)
            .await
            .context("Failed to connect to Postgres")?
            .with_loss_averaging(config.loss_averaging),
    );
    let store: Arc<dyn ReportStore> = pg.clone();

    match cli.command {
        Command::Migrate => {
            pg.migrate().await?;
            info!("Migrations complete");
        }
        Command::Fetch {
            batch,
            resume_index,
            batch_size,
            limit,
            comments,
        } => {
            let scheduler = batch_scheduler(&config, store)?;
            let settings = batch_settings(batch_size, limit, comments);
            let outcome = scheduler
                .resume_batch(batch, resume_index.unwrap_or(0), &settings, &budget)
                .await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::FetchAll {
            from_batch,
            resume_index,
            batch_size,
            limit,
            comments,
        } => {
            let scheduler = batch_scheduler(&config, store)?;
            let settings = batch_settings(batch_size, limit, comments);
            let start = match resume_index {
                Some(index) => BatchCursor::Resume {
                    batch: from_batch,
                    index,
                },
                None => BatchCursor::Next { batch: from_batch },
            };
            let outcome = scheduler.run_all(start, &settings, &budget).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Enrich { limit } => {
            let summary = enrichment_engine(&config, store)?
                .process_pending(limit, &budget)
                .await?;
            println!("{summary:#?}");
        }
        Command::Comments { limit } => {
            let summary = enrichment_engine(&config, store)?
                .analyze_comments(limit, &budget)
                .await?;
            println!("{summary:#?}");
        }
        Command::StopJobs => {
            let stopped = scheduler::stop_all_jobs(store.as_ref()).await?;
            println!("Stopped {stopped} job(s)");
        }
        Command::Jobs => {
            for job in order_jobs(store.list_fetch_jobs().await?) {
                println!(
                    "{:<12} {:<16} {:<20} posts={:<5} {}",
                    job.status.as_str(),
                    job.channel,
                    job.search_term,
                    job.posts_processed,
                    job.last_error.unwrap_or_default()
                );
            }
        }
        Command::Reset {
            country,
            all,
            stalled,
        } => {
            let scope = match (country, all, stalled) {
                (Some(country), _, _) => ResetScope::Country(country),
                (None, true, _) => ResetScope::All,
                (None, false, true) => ResetScope::Stalled {
                    max_attempts: config.max_processing_attempts,
                },
                (None, false, false) => bail!("reset needs --country, --all or --stalled"),
            };
            let reset = store.reset_for_reprocessing(&scope).await?;
            info!(reset, scope = ?scope, "Reports reset for reprocessing");
            println!("Reset {reset} report(s)");
        }
        Command::Stalled { limit } => {
            let stalled = store
                .stalled_reports(config.max_processing_attempts, limit)
                .await?;
            for report in &stalled {
                println!(
                    "{} {} attempts={} last_error={}",
                    report.id,
                    report.post.external_id,
                    report.processing_attempts,
                    report.processing_errors.last().map(String::as_str).unwrap_or("")
                );
            }
            println!("{} stalled report(s)", stalled.len());
        }
        Command::ResetStats => {
            let deleted = store.reset_location_stats().await?;
            println!("Deleted {deleted} location stat row(s)");
        }
        Command::IngestUrl { url } => {
            let thread = url_ingestor(&config, store)?.ingest_url(&url).await?;
            println!(
                "{} inserted={} comments={}",
                thread.external_id, thread.inserted, thread.comments_inserted
            );
        }
        Command::Crawl { url, limit } => {
            let summary = url_ingestor(&config, store)?.crawl(&url, limit).await?;
            println!("{summary:#?}");
        }
    }

    budget.log_status();
    Ok(())
}

fn batch_settings(batch_size: usize, limit: u32, comments: bool) -> BatchSettings {
    BatchSettings {
        batch_size,
        per_term_limit: limit,
        with_comments: comments,
        ..Default::default()
    }
}

fn batch_scheduler(config: &Config, store: Arc<dyn ReportStore>) -> Result<BatchScheduler> {
    let limiter = RateLimiter::new(config.request_delay, config.throttle_cooldown);
    let reddit = RedditClient::new(&config.reddit_user_agent, limiter)?;
    let source = SourceClient::new(Arc::new(reddit), store.clone());
    let matrix = WorkMatrix::new(config.channels.clone(), config.search_terms.clone());
    Ok(BatchScheduler::new(matrix, source, store))
}

fn enrichment_engine(config: &Config, store: Arc<dyn ReportStore>) -> Result<EnrichmentEngine> {
    let ai = OpenAi::new(&config.ai_base_url, &config.ai_api_key, &config.ai_model)?
        .with_timeout(config.classify_timeout);
    let classifier = Arc::new(LlmClassifier::new(ai));
    let geocoder = GeocodeNormalizer::with_memory_cache(Arc::new(MapboxClient::new(
        &config.mapbox_access_token,
    )));
    Ok(
        EnrichmentEngine::new(store, classifier, geocoder, config.max_processing_attempts)
            .with_step_reserve(config.classify_timeout * 2),
    )
}

fn url_ingestor(config: &Config, store: Arc<dyn ReportStore>) -> Result<UrlIngestor> {
    let Some(key) = config.firecrawl_api_key.as_deref() else {
        bail!("FIRECRAWL_API_KEY is required for URL and crawl ingestion");
    };
    Ok(UrlIngestor::new(Arc::new(FirecrawlClient::new(key)), store))
}
