use scraper::Selector;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::extract::{Extractor, Page};
use crate::fetch::PageFetcher;
use crate::record::{ClubFields, ClubRecord, ScrapeStatus};
use crate::render::{PageRenderer, RenderedPage};

/// Substrings of script `src` or inline bodies that betray a client-side
/// framework. Matched lowercase.
const FRAMEWORK_MARKERS: [&str; 14] = [
    "__next_data__",
    "_next/static",
    "__nuxt__",
    "react-dom",
    "react.production",
    "vue.runtime",
    "vue.global",
    "vue.min.js",
    "ng-version",
    "angular",
    "emberenv",
    "svelte",
    "gatsby",
    "webpackjsonp",
];

/// Why a statically fetched page is considered JS-heavy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JsSignal {
    SparseText { chars: usize },
    FrameworkMarker { marker: &'static str },
    SparseFields { found: usize },
}

impl fmt::Display for JsSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsSignal::SparseText { chars } => write!(f, "sparse text ({chars} chars)"),
            JsSignal::FrameworkMarker { marker } => write!(f, "framework marker `{marker}`"),
            JsSignal::SparseFields { found } => write!(f, "sparse fields ({found} found)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub render_fallback: bool,
    /// Visible-text length (chars) below which a page counts as JS-heavy.
    pub js_text_threshold: usize,
    /// Minimum fields the static pass should find; 0 disables the check.
    pub min_static_fields: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            render_fallback: false,
            js_text_threshold: 200,
            min_static_fields: 0,
        }
    }
}

/// Outcome of one dispatch with the diagnostics behind it.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub record: ClubRecord,
    pub signal: Option<JsSignal>,
    pub rendered: bool,
}

/// Static fetch first, headless render only when the page looks JS-heavy.
pub struct HybridDispatcher {
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn PageRenderer>>,
    extractor: Arc<Extractor>,
    config: DispatchConfig,
}

impl HybridDispatcher {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        renderer: Option<Arc<dyn PageRenderer>>,
        extractor: Arc<Extractor>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            extractor,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Scrapes one club with the configured fallback setting.
    pub async fn dispatch(&self, name: &str, url: &str) -> ClubRecord {
        self.dispatch_with(name, url, self.config.render_fallback)
            .await
            .record
    }

    /// Scrapes one club. Never fails: problems end up in the record status.
    pub async fn dispatch_with(&self, name: &str, url: &str, render_fallback: bool) -> Dispatch {
        let mut record = ClubRecord::new(name, url);
        advance(&mut record, ScrapeStatus::Attempted);

        let fetched = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                warn!(club = name, url, error = %e, "static fetch failed");
                advance(&mut record, ScrapeStatus::Failed);
                return Dispatch {
                    record,
                    signal: None,
                    rendered: false,
                };
            }
        };

        debug!(club = name, final_url = %fetched.final_url, status = fetched.status, "static page fetched");
        let (static_fields, signal) = self.static_pass(&fetched.html);
        record.fields = static_fields;

        let renderer = match (&signal, &self.renderer) {
            (Some(signal), Some(renderer)) if render_fallback => {
                info!(club = name, %signal, "page looks js-heavy, rendering");
                renderer
            }
            (Some(signal), _) => {
                debug!(club = name, %signal, "js-heavy page kept static, fallback disabled");
                advance(&mut record, ScrapeStatus::Success);
                return Dispatch {
                    record,
                    signal: Some(signal.clone()),
                    rendered: false,
                };
            }
            (None, _) => {
                advance(&mut record, ScrapeStatus::Success);
                return Dispatch {
                    record,
                    signal: None,
                    rendered: false,
                };
            }
        };

        let rendered = match renderer.render(url).await {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(club = name, url, error = %e, "render failed, keeping static result");
                advance(&mut record, ScrapeStatus::Success);
                return Dispatch {
                    record,
                    signal,
                    rendered: false,
                };
            }
        };

        debug!(club = name, final_url = %rendered.final_url, "rendered page received");
        let (merged, filled) = std::mem::take(&mut record.fields).merge(self.render_pass(&rendered));
        record.fields = merged;
        if filled > 0 {
            info!(club = name, filled, "rendered pass filled missing fields");
            advance(&mut record, ScrapeStatus::PartialJs);
        } else {
            advance(&mut record, ScrapeStatus::Success);
        }

        Dispatch {
            record,
            signal,
            rendered: true,
        }
    }

    // Parsed documents are not Send, so parsing and extraction stay out of
    // the async body.
    fn static_pass(&self, html: &str) -> (ClubFields, Option<JsSignal>) {
        let page = Page::parse(html);
        let fields = self.extractor.extract(&page);
        let signal = self.js_signal(&page, fields.found_count());
        (fields, signal)
    }

    fn render_pass(&self, rendered: &RenderedPage) -> ClubFields {
        let page = Page::with_text(&rendered.html, &rendered.text);
        self.extractor.extract(&page)
    }

    fn js_signal(&self, page: &Page, found: usize) -> Option<JsSignal> {
        let chars = page.text_len();
        if chars < self.config.js_text_threshold {
            return Some(JsSignal::SparseText { chars });
        }
        if let Some(marker) = framework_marker(page, &self.extractor.rules().scripts) {
            return Some(JsSignal::FrameworkMarker { marker });
        }
        if found < self.config.min_static_fields {
            return Some(JsSignal::SparseFields { found });
        }
        None
    }
}

/// First known framework marker in any script tag, by script order.
pub fn framework_marker(page: &Page, scripts: &Selector) -> Option<&'static str> {
    page.document().select(scripts).find_map(|script| {
        let mut haystack = script.value().attr("src").unwrap_or_default().to_lowercase();
        haystack.push(' ');
        haystack.push_str(&script.text().collect::<String>().to_lowercase());
        FRAMEWORK_MARKERS
            .iter()
            .find(|marker| haystack.contains(*marker))
            .copied()
    })
}

fn advance(record: &mut ClubRecord, next: ScrapeStatus) {
    if let Err(e) = record.transition(next) {
        warn!(club = record.name(), error = %e, "status transition rejected");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::{FetchError, RenderError};
    use crate::fetch::{FetchedPage, PageFetcher};
    use crate::render::{PageRenderer, RenderedPage};

    /// Serves canned HTML per URL; unknown URLs answer 404.
    #[derive(Default)]
    pub struct FakeFetcher {
        pages: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        pub fn page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(url) {
                Some(html) => Ok(FetchedPage {
                    final_url: url.to_string(),
                    status: 200,
                    html: html.clone(),
                }),
                None => Err(FetchError::Status(404)),
            }
        }
    }

    /// Returns the same rendered page for every URL, or fails when empty.
    #[derive(Default)]
    pub struct FakeRenderer {
        page: Option<(String, String)>,
        calls: AtomicUsize,
    }

    impl FakeRenderer {
        pub fn rendering(html: &str, text: &str) -> Self {
            Self {
                page: Some((html.to_string(), text.to_string())),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageRenderer for FakeRenderer {
        async fn render(&self, url: &str) -> Result<RenderedPage, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.page {
                Some((html, text)) => Ok(RenderedPage {
                    final_url: url.to_string(),
                    html: html.clone(),
                    text: text.clone(),
                }),
                None => Err(RenderError::Browser("chrome unavailable".into())),
            }
        }
    }
}
