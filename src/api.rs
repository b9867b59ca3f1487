use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::batch::{BatchRunner, ScrapeProgress, SharedProgress};
use crate::config::ScraperConfig;
use crate::dispatch::HybridDispatcher;
use crate::input::{self, ClubEntry};
use crate::outreach::{OutreachPreview, DEFAULT_THRESHOLD};
use crate::record::ClubRecord;
use crate::stats::CompletenessReport;
use crate::storage::ResultStore;

pub struct AppState {
    pub config: ScraperConfig,
    pub dispatcher: Arc<HybridDispatcher>,
    pub store: ResultStore,
    pub progress: SharedProgress,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapeRequest {
    /// Only scrape the first N clubs of the list.
    pub max_clubs: Option<usize>,
    /// Overrides `CRAWLER_RENDER_FALLBACK` for this batch.
    pub render_fallback: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub run_id: Uuid,
    pub total_clubs: usize,
    pub message: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailPreviewRequest {
    /// Missing-field count that qualifies a club with an email. Defaults to 3.
    pub threshold: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

#[utoipa::path(
    post,
    path = "/api/scrape",
    request_body = ScrapeRequest,
    responses(
        (status = 202, description = "Batch started", body = ScrapeResponse),
        (status = 409, description = "A batch is already running", body = ErrorResponse),
        (status = 500, description = "Club list could not be read", body = ErrorResponse)
    ),
    tag = "scraper"
)]
pub async fn start_scrape(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<ScrapeRequest>>,
) -> Result<(StatusCode, Json<ScrapeResponse>), ApiError> {
    let Json(request) = payload.unwrap_or_default();

    let entries = input::load_clubs(&state.config.input_path)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    let clubs = input::prepare(entries, request.max_clubs);
    let render_fallback = request
        .render_fallback
        .unwrap_or(state.config.render_fallback);

    let run_id = Uuid::new_v4();
    {
        let mut progress = state.progress.write().await;
        if progress.is_running {
            return Err(api_error(StatusCode::CONFLICT, "Scraping already in progress"));
        }
        *progress = ScrapeProgress {
            is_running: true,
            run_id: Some(run_id),
            total_clubs: clubs.len(),
            ..ScrapeProgress::default()
        };
    }

    info!(%run_id, clubs = clubs.len(), render_fallback, "scrape batch requested");
    let total_clubs = clubs.len();
    tokio::spawn(supervise_batch(state.clone(), clubs, render_fallback));

    Ok((
        StatusCode::ACCEPTED,
        Json(ScrapeResponse {
            run_id,
            total_clubs,
            message: "Scraping started".to_string(),
        }),
    ))
}

/// Runs the batch on its own task so the running flag is cleared even when
/// the batch panics.
async fn supervise_batch(state: Arc<AppState>, clubs: Vec<ClubEntry>, render_fallback: bool) {
    let batch = tokio::spawn(run_batch(state.clone(), clubs, render_fallback));
    if let Err(e) = batch.await {
        error!(error = %e, "scrape batch crashed");
    }

    let mut progress = state.progress.write().await;
    progress.is_running = false;
    progress.current_name = None;
}

async fn run_batch(state: Arc<AppState>, clubs: Vec<ClubEntry>, render_fallback: bool) {
    let runner = BatchRunner::new(
        state.dispatcher.clone(),
        state.store.clone(),
        state.config.politeness_delay,
    )
    .with_render_fallback(render_fallback);

    match runner.run(&clubs, Some(&state.progress)).await {
        Ok(summary) => info!(
            success = summary.success,
            partial_js = summary.partial_js,
            failed = summary.failed,
            "scrape batch complete"
        ),
        Err(e) => error!(error = %e, "scrape batch aborted"),
    }
}

#[utoipa::path(
    get,
    path = "/api/scrape/status",
    responses((status = 200, description = "Progress of the current or last batch", body = ScrapeProgress)),
    tag = "scraper"
)]
pub async fn scrape_status(State(state): State<Arc<AppState>>) -> Json<ScrapeProgress> {
    Json(state.progress.read().await.clone())
}

#[utoipa::path(
    get,
    path = "/api/results",
    responses(
        (status = 200, description = "Stored club records", body = [ClubRecord]),
        (status = 500, description = "Result store unreadable", body = ErrorResponse)
    ),
    tag = "results"
)]
pub async fn list_results(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ClubRecord>>, ApiError> {
    state
        .store
        .load()
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

#[utoipa::path(
    get,
    path = "/api/stats",
    responses(
        (status = 200, description = "Completeness report", body = CompletenessReport),
        (status = 500, description = "Result store unreadable", body = ErrorResponse)
    ),
    tag = "results"
)]
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<CompletenessReport>, ApiError> {
    let records = state
        .store
        .load()
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(CompletenessReport::from_records(&records)))
}

#[utoipa::path(
    post,
    path = "/api/email-preview",
    request_body = EmailPreviewRequest,
    responses(
        (status = 200, description = "Draft outreach emails for incomplete clubs", body = OutreachPreview),
        (status = 500, description = "Result store unreadable", body = ErrorResponse)
    ),
    tag = "results"
)]
pub async fn email_preview(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<EmailPreviewRequest>>,
) -> Result<Json<OutreachPreview>, ApiError> {
    let Json(request) = payload.unwrap_or_default();
    let records = state
        .store
        .load()
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let threshold = request.threshold.unwrap_or(DEFAULT_THRESHOLD);
    Ok(Json(OutreachPreview::from_records(&records, threshold)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{FakeFetcher, FakeRenderer};
    use crate::error::FetchError;
    use crate::extract::Extractor;
    use crate::fetch::{FetchedPage, PageFetcher};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::time::Duration;

    struct CrashingFetcher;

    #[async_trait]
    impl PageFetcher for CrashingFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedPage, FetchError> {
            panic!("fetcher crashed");
        }
    }

    async fn state_with(clubs: &str, politeness_delay: Duration) -> Arc<AppState> {
        let fetcher = FakeFetcher::default()
            .page("https://a.ca", "<p>8 courts. Contact info@a.ca</p>")
            .page("https://b.ca", "<p>Located in Toronto, M4E 3W2</p>");
        state_with_fetcher(clubs, politeness_delay, Arc::new(fetcher)).await
    }

    async fn state_with_fetcher(
        clubs: &str,
        politeness_delay: Duration,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Arc<AppState> {
        let dir: PathBuf = std::env::temp_dir().join(format!("club-api-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let input_path = dir.join("clubs.json");
        tokio::fs::write(&input_path, clubs).await.unwrap();

        let config = ScraperConfig {
            input_path,
            output_path: dir.join("scraped_data.json"),
            politeness_delay,
            ..ScraperConfig::default()
        };
        let dispatcher = HybridDispatcher::new(
            fetcher,
            Some(Arc::new(FakeRenderer::failing())),
            Arc::new(Extractor::standard().unwrap()),
            config.dispatch_config(),
        );

        Arc::new(AppState {
            store: ResultStore::new(config.output_path.clone()),
            config,
            dispatcher: Arc::new(dispatcher),
            progress: SharedProgress::default(),
        })
    }

    const CLUBS: &str = r#"[
        {"name": "A", "websiteUrl": "https://a.ca"},
        {"name": "B", "websiteUrl": "https://b.ca"},
        {"name": "A", "websiteUrl": "https://dup.ca"}
    ]"#;

    async fn wait_until_idle(state: &Arc<AppState>) {
        for _ in 0..200 {
            if !state.progress.read().await.is_running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("batch did not finish");
    }

    #[tokio::test]
    async fn batch_runs_in_background_and_fills_store() {
        let state = state_with(CLUBS, Duration::ZERO).await;

        let (code, Json(resp)) = start_scrape(State(state.clone()), None).await.unwrap();
        assert_eq!(code, StatusCode::ACCEPTED);
        assert_eq!(resp.total_clubs, 2);

        wait_until_idle(&state).await;
        let Json(progress) = scrape_status(State(state.clone())).await;
        assert_eq!(progress.run_id, Some(resp.run_id));
        assert_eq!((progress.successful, progress.failed, progress.progress), (2, 0, 100));

        let Json(records) = list_results(State(state.clone())).await.unwrap();
        assert_eq!(records.len(), 2);

        let Json(report) = stats(State(state)).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.emails_found, 1);
        assert_eq!(report.success_rate, 100.0);
    }

    #[tokio::test]
    async fn second_batch_is_rejected_while_running() {
        let state = state_with(CLUBS, Duration::from_millis(300)).await;

        start_scrape(State(state.clone()), None).await.unwrap();
        let (code, Json(err)) = start_scrape(State(state.clone()), None).await.unwrap_err();
        assert_eq!(code, StatusCode::CONFLICT);
        assert!(err.error.contains("already"));

        wait_until_idle(&state).await;
    }

    #[tokio::test]
    async fn crashed_batch_does_not_block_the_next_one() {
        let state = state_with_fetcher(CLUBS, Duration::ZERO, Arc::new(CrashingFetcher)).await;

        let (code, _) = start_scrape(State(state.clone()), None).await.unwrap();
        assert_eq!(code, StatusCode::ACCEPTED);
        wait_until_idle(&state).await;
        assert_eq!(state.progress.read().await.current_name, None);

        let (code, _) = start_scrape(State(state.clone()), None).await.unwrap();
        assert_eq!(code, StatusCode::ACCEPTED);
        wait_until_idle(&state).await;
    }

    #[tokio::test]
    async fn email_preview_drafts_for_incomplete_clubs() {
        let state = state_with(CLUBS, Duration::ZERO).await;
        start_scrape(State(state.clone()), None).await.unwrap();
        wait_until_idle(&state).await;

        let Json(preview) = email_preview(State(state.clone()), None).await.unwrap();
        assert_eq!((preview.total_clubs, preview.with_email), (2, 1));
        assert_eq!(preview.preview[0].club_name, "A");
        assert_eq!(preview.preview[0].email.as_deref(), Some("info@a.ca"));
        assert!(!preview.preview[0].missing_fields.contains(&"courtCount"));
        assert!(preview.preview[1].email_body.contains("  - Contact email"));

        let request = EmailPreviewRequest { threshold: Some(8) };
        let Json(preview) = email_preview(State(state), Some(Json(request))).await.unwrap();
        assert_eq!((preview.total_clubs, preview.with_email), (1, 0));
    }

    #[tokio::test]
    async fn request_limits_clubs() {
        let state = state_with(CLUBS, Duration::ZERO).await;
        let request = ScrapeRequest {
            max_clubs: Some(1),
            render_fallback: Some(false),
        };

        let (_, Json(resp)) = start_scrape(State(state.clone()), Some(Json(request))).await.unwrap();
        assert_eq!(resp.total_clubs, 1);
        wait_until_idle(&state).await;
    }

    #[tokio::test]
    async fn missing_club_list_is_server_error() {
        let state = state_with(CLUBS, Duration::ZERO).await;
        tokio::fs::remove_file(&state.config.input_path).await.unwrap();

        let (code, _) = start_scrape(State(state.clone()), None).await.unwrap_err();
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!state.progress.read().await.is_running);
    }

    #[tokio::test]
    async fn empty_store_reports_nothing() {
        let state = state_with(CLUBS, Duration::ZERO).await;
        let Json(records) = list_results(State(state.clone())).await.unwrap();
        assert!(records.is_empty());
        let Json(report) = stats(State(state)).await.unwrap();
        assert_eq!(report.total, 0);
    }
}
