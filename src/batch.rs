use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dispatch::HybridDispatcher;
use crate::error::StoreError;
use crate::input::ClubEntry;
use crate::record::ScrapeStatus;
use crate::storage::ResultStore;

/// Live view of the running batch, polled by the API.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeProgress {
    pub is_running: bool,
    pub run_id: Option<Uuid>,
    /// 1-based index of the club being scraped.
    pub current_club: usize,
    pub total_clubs: usize,
    pub current_name: Option<String>,
    pub successful: usize,
    pub failed: usize,
    /// Percent complete, 0..=100.
    pub progress: u8,
}

pub type SharedProgress = Arc<RwLock<ScrapeProgress>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub partial_js: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn count(&mut self, status: ScrapeStatus) {
        self.total += 1;
        match status {
            ScrapeStatus::Success => self.success += 1,
            ScrapeStatus::PartialJs => self.partial_js += 1,
            _ => self.failed += 1,
        }
    }
}

/// Scrapes clubs one after another, saving after each.
pub struct BatchRunner {
    dispatcher: Arc<HybridDispatcher>,
    store: ResultStore,
    politeness_delay: Duration,
    render_fallback: bool,
}

impl BatchRunner {
    pub fn new(dispatcher: Arc<HybridDispatcher>, store: ResultStore, politeness_delay: Duration) -> Self {
        let render_fallback = dispatcher.config().render_fallback;
        Self {
            dispatcher,
            store,
            politeness_delay,
            render_fallback,
        }
    }

    pub fn with_render_fallback(mut self, enabled: bool) -> Self {
        self.render_fallback = enabled;
        self
    }

    pub async fn run(
        &self,
        clubs: &[ClubEntry],
        progress: Option<&SharedProgress>,
    ) -> Result<BatchSummary, StoreError> {
        let total = clubs.len();
        let mut summary = BatchSummary::default();
        info!(total, render_fallback = self.render_fallback, "batch started");

        if let Some(progress) = progress {
            let mut p = progress.write().await;
            p.total_clubs = total;
            p.current_club = 0;
            p.successful = 0;
            p.failed = 0;
            p.progress = 0;
        }

        for (idx, club) in clubs.iter().enumerate() {
            if let Some(progress) = progress {
                let mut p = progress.write().await;
                p.current_club = idx + 1;
                p.current_name = Some(club.name.clone());
            }

            let outcome = self
                .dispatcher
                .dispatch_with(&club.name, &club.website_url, self.render_fallback)
                .await;
            let status = outcome.record.scrape_status();
            info!(
                club = %club.name,
                index = idx + 1,
                total,
                %status,
                found = outcome.record.fields.found_count(),
                "club scraped"
            );

            self.store.record(outcome.record).await?;
            summary.count(status);

            if let Some(progress) = progress {
                let mut p = progress.write().await;
                if status.is_success() {
                    p.successful += 1;
                } else {
                    p.failed += 1;
                }
                p.progress = percent(idx + 1, total);
            }

            sleep(self.politeness_delay).await;
        }

        info!(
            total = summary.total,
            success = summary.success,
            partial_js = summary.partial_js,
            failed = summary.failed,
            "batch finished"
        );
        Ok(summary)
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (done * 100 / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{FakeFetcher, FakeRenderer};
    use crate::dispatch::DispatchConfig;
    use crate::extract::Extractor;
    use crate::record::Field;

    fn temp_store() -> ResultStore {
        ResultStore::new(std::env::temp_dir().join(format!("batch-{}.json", Uuid::new_v4())))
    }

    fn runner(fetcher: FakeFetcher, renderer: FakeRenderer, store: ResultStore) -> BatchRunner {
        let dispatcher = HybridDispatcher::new(
            Arc::new(fetcher),
            Some(Arc::new(renderer)),
            Arc::new(Extractor::standard().unwrap()),
            DispatchConfig::default(),
        );
        BatchRunner::new(Arc::new(dispatcher), store, Duration::ZERO)
    }

    #[tokio::test]
    async fn every_club_gets_a_record() {
        let fetcher = FakeFetcher::default()
            .page("https://a.ca", "<p>6 courts</p>")
            .page("https://c.ca", "<p>Located in Toronto, M4E 3W2</p>");
        let store = temp_store();
        let runner = runner(fetcher, FakeRenderer::failing(), store.clone());
        let clubs = vec![
            ClubEntry::new("A", "https://a.ca"),
            ClubEntry::new("B", "https://b.ca"),
            ClubEntry::new("C", "https://c.ca"),
        ];
        let progress = SharedProgress::default();

        let summary = runner.run(&clubs, Some(&progress)).await.unwrap();
        assert_eq!(
            summary,
            BatchSummary {
                total: 3,
                success: 2,
                partial_js: 0,
                failed: 1
            }
        );

        let records = store.load().await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(records[0].fields.court_count, Field::Found(6));
        assert_eq!(records[1].scrape_status(), ScrapeStatus::Failed);

        let p = progress.read().await;
        assert_eq!((p.current_club, p.total_clubs, p.progress), (3, 3, 100));
        assert_eq!((p.successful, p.failed), (2, 1));
        assert_eq!(p.current_name.as_deref(), Some("C"));
    }

    #[tokio::test]
    async fn batch_override_enables_rendering() {
        let fetcher = FakeFetcher::default().page("https://a.ca", "<div id=root></div>");
        let renderer = FakeRenderer::rendering("<p>Located in Toronto, M4E 3W2</p>", "");
        let store = temp_store();
        let runner = runner(fetcher, renderer, store.clone()).with_render_fallback(true);

        let summary = runner.run(&[ClubEntry::new("A", "https://a.ca")], None).await.unwrap();
        assert_eq!(summary.partial_js, 1);

        let records = store.load().await.unwrap();
        assert_eq!(records[0].fields.location, Field::Found("Toronto".into()));
        assert_eq!(records[0].scrape_status(), ScrapeStatus::PartialJs);
    }

    #[test]
    fn percent_is_bounded() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(3, 3), 100);
    }
}
