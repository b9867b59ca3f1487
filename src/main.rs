mod api;
mod batch;
mod config;
mod dispatch;
mod error;
mod extract;
mod fetch;
mod input;
mod outreach;
mod record;
mod render;
mod rules;
mod stats;
mod storage;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::batch::{BatchRunner, SharedProgress};
use crate::config::ScraperConfig;
use crate::dispatch::HybridDispatcher;
use crate::extract::Extractor;
use crate::fetch::HttpFetcher;
use crate::outreach::OutreachPreview;
use crate::render::ChromeRenderer;
use crate::stats::CompletenessReport;
use crate::storage::ResultStore;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::start_scrape,
        api::scrape_status,
        api::list_results,
        api::stats,
        api::email_preview
    ),
    components(
        schemas(
            api::ScrapeRequest,
            api::ScrapeResponse,
            api::ErrorResponse,
            api::EmailPreviewRequest,
            outreach::OutreachPreview,
            outreach::EmailPreview,
            batch::ScrapeProgress,
            record::ClubRecord,
            record::ClubFields,
            record::ClubType,
            record::MembershipStatus,
            record::CourtSurface,
            record::ScrapeStatus,
            stats::CompletenessReport,
            stats::FieldCoverage,
            stats::IncompleteClub
        )
    ),
    tags(
        (name = "scraper", description = "Batch scraping control"),
        (name = "results", description = "Scraped records and completeness")
    )
)]
struct ApiDoc;

#[derive(Parser)]
#[command(name = "club-crawler", version, about = "Tennis club facts from club websites")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every club in the input list
    Scrape {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        max_clubs: Option<usize>,
        /// Render JS-heavy pages with headless Chrome
        #[arg(long)]
        render: bool,
    },
    /// Print the completeness report for stored results
    Analyze {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Draft outreach emails for clubs with missing data
    Outreach {
        #[arg(long)]
        output: Option<PathBuf>,
        /// Missing-field count that qualifies a club that has an email
        #[arg(long, default_value_t = outreach::DEFAULT_THRESHOLD)]
        threshold: usize,
    },
    /// Scrape a single URL and show why it was (or was not) rendered
    Diagnose {
        url: String,
        #[arg(long)]
        render: bool,
    },
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let mut config = ScraperConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Scrape {
            input,
            output,
            max_clubs,
            render,
        } => {
            if let Some(input) = input {
                config.input_path = input;
            }
            if let Some(output) = output {
                config.output_path = output;
            }
            config.render_fallback |= render;
            scrape(config, max_clubs).await
        }
        Command::Analyze { output } => {
            if let Some(output) = output {
                config.output_path = output;
            }
            analyze(&config).await
        }
        Command::Outreach { output, threshold } => {
            if let Some(output) = output {
                config.output_path = output;
            }
            draft_outreach(&config, threshold).await
        }
        Command::Diagnose { url, render } => {
            config.render_fallback |= render;
            diagnose(&config, &url).await
        }
        Command::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
    }
}

fn build_dispatcher(config: &ScraperConfig) -> anyhow::Result<HybridDispatcher> {
    let fetcher = HttpFetcher::new(config.static_timeout).context("building http client")?;
    let renderer = ChromeRenderer::new(config.render_timeout, config.render_settle);
    let extractor = Extractor::standard().context("compiling extraction rules")?;

    Ok(HybridDispatcher::new(
        Arc::new(fetcher),
        Some(Arc::new(renderer)),
        Arc::new(extractor),
        config.dispatch_config(),
    ))
}

async fn scrape(config: ScraperConfig, max_clubs: Option<usize>) -> anyhow::Result<()> {
    let entries = input::load_clubs(&config.input_path).await?;
    let clubs = input::prepare(entries, max_clubs);
    println!("🎾 Scraping {} clubs", clubs.len());

    let dispatcher = Arc::new(build_dispatcher(&config)?);
    let store = ResultStore::new(config.output_path.clone());
    let summary = BatchRunner::new(dispatcher, store.clone(), config.politeness_delay)
        .run(&clubs, None)
        .await?;

    println!(
        "✅ Done: {} clubs ({} success, {} partial JS, {} failed), saved to {}",
        summary.total,
        summary.success,
        summary.partial_js,
        summary.failed,
        store.path().display()
    );
    Ok(())
}

async fn analyze(config: &ScraperConfig) -> anyhow::Result<()> {
    let records = ResultStore::new(config.output_path.clone())
        .load()
        .await
        .with_context(|| format!("reading {}", config.output_path.display()))?;
    let report = CompletenessReport::from_records(&records);
    print!("{}", report.render_table());
    Ok(())
}

async fn draft_outreach(config: &ScraperConfig, threshold: usize) -> anyhow::Result<()> {
    let records = ResultStore::new(config.output_path.clone())
        .load()
        .await
        .with_context(|| format!("reading {}", config.output_path.display()))?;
    let preview = OutreachPreview::from_records(&records, threshold);

    println!(
        "📧 {} clubs need follow-up ({} with an email address)",
        preview.total_clubs, preview.with_email
    );
    for draft in &preview.preview {
        println!();
        println!("To: {}", draft.email.as_deref().unwrap_or("(no email found)"));
        println!("Club: {}", draft.club_name);
        println!("{}", draft.email_body);
    }
    Ok(())
}

async fn diagnose(config: &ScraperConfig, url: &str) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(config)?;
    let outcome = dispatcher
        .dispatch_with(url, url, config.render_fallback)
        .await;

    match &outcome.signal {
        Some(signal) => println!("⚠️ JS-heavy signal: {signal}"),
        None => println!("✅ Static HTML looks complete"),
    }
    println!("Rendered: {}", outcome.rendered);
    println!("Status:   {}", outcome.record.scrape_status());
    for (field, value) in outcome.record.fields.entries() {
        println!("  {field:<18} {value}");
    }
    Ok(())
}

async fn serve(config: ScraperConfig) -> anyhow::Result<()> {
    let dispatcher = Arc::new(build_dispatcher(&config)?);
    let port = config.port;
    let state = Arc::new(api::AppState {
        store: ResultStore::new(config.output_path.clone()),
        config,
        dispatcher,
        progress: SharedProgress::default(),
    });

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/scrape", post(api::start_scrape))
        .route("/api/scrape/status", get(api::scrape_status))
        .route("/api/results", get(api::list_results))
        .route("/api/stats", get(api::stats))
        .route("/api/email-preview", post(api::email_preview))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
