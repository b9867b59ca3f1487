use scraper::{Html, Node};
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

use crate::error::RuleError;
use crate::record::{ClubFields, ClubType, CourtSurface, Field, MembershipStatus};
use crate::rules::ExtractionRules;

/// Elements whose text never reaches the reader.
const HIDDEN_TAGS: [&str; 5] = ["head", "script", "style", "noscript", "template"];

// ============================================================================
// Parsed page
// ============================================================================

/// A parsed HTML document together with its visible text.
pub struct Page {
    document: Html,
    text: String,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let text = visible_text(&document);
        Self { document, text }
    }

    /// Parses `html` but uses already-rendered `text` (e.g. `innerText`)
    /// when the browser supplied any.
    pub fn with_text(html: &str, text: &str) -> Self {
        let document = Html::parse_document(html);
        let text = if text.trim().is_empty() {
            visible_text(&document)
        } else {
            normalize_whitespace(text)
        };
        Self { document, text }
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Visible text length in characters.
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

fn visible_text(document: &Html) -> String {
    let mut chunks: Vec<&str> = Vec::new();
    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_TAGS.contains(&el.name()))
        });
        if !hidden {
            chunks.push(&**text);
        }
    }
    normalize_whitespace(&chunks.join(" "))
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// Extractor
// ============================================================================

/// Runs every field heuristic against a page.
pub struct Extractor {
    rules: ExtractionRules,
}

impl Extractor {
    pub fn new(rules: ExtractionRules) -> Self {
        Self { rules }
    }

    pub fn standard() -> Result<Self, RuleError> {
        Ok(Self::new(ExtractionRules::standard()?))
    }

    pub fn rules(&self) -> &ExtractionRules {
        &self.rules
    }

    /// Extracts all fields. A failing field degrades to `NotFound` without
    /// affecting the others.
    pub fn extract(&self, page: &Page) -> ClubFields {
        ClubFields {
            location: isolated("location", || self.location(page)),
            email: isolated("email", || self.email(page)),
            club_type: isolated("clubType", || self.club_type(page)),
            membership_status: isolated("membershipStatus", || self.membership_status(page)),
            waitlist_length: isolated("waitlistLength", || self.waitlist_length(page)),
            court_count: isolated("courtCount", || self.court_count(page)),
            court_surface: isolated("courtSurface", || self.court_surface(page)),
            operating_season: isolated("operatingSeason", || self.operating_season(page)),
        }
    }

    /// `mailto:` targets first, then addresses found in the text.
    pub fn email(&self, page: &Page) -> Field<String> {
        self.mailto_email(page)
            .or_else(|| self.rules.email.resolve(&page.text).found())
            .into()
    }

    fn mailto_email(&self, page: &Page) -> Option<String> {
        page.document
            .select(&self.rules.links)
            .filter_map(|link| link.value().attr("href"))
            .find_map(|href| {
                let href = href.trim();
                let target = href
                    .get(..7)
                    .filter(|scheme| scheme.eq_ignore_ascii_case("mailto:"))
                    .and_then(|_| href.get(7..))?;
                let address = target.split(['?', ',']).next()?;
                let decoded = urlencoding::decode(address)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| address.to_string());
                let email = decoded.trim();

                (self.rules.email_shape.is_match(email) && !self.rules.is_ignored_email(email))
                    .then(|| email.to_string())
            })
    }

    /// Contact regions (`address`, `footer`, contact/location blocks) are
    /// searched before the full page text.
    pub fn location(&self, page: &Page) -> Field<String> {
        page.document
            .select(&self.rules.contact_regions)
            .map(|region| normalize_whitespace(&region.text().collect::<Vec<_>>().join(" ")))
            .find_map(|text| self.rules.location.resolve(&text).found())
            .or_else(|| self.rules.location.resolve(&page.text).found())
            .into()
    }

    pub fn club_type(&self, page: &Page) -> Field<ClubType> {
        self.rules.club_type.resolve(&page.text)
    }

    pub fn membership_status(&self, page: &Page) -> Field<MembershipStatus> {
        self.rules.membership.resolve(&page.text)
    }

    pub fn waitlist_length(&self, page: &Page) -> Field<u32> {
        self.rules.waitlist_length.resolve(&page.text)
    }

    pub fn court_count(&self, page: &Page) -> Field<u32> {
        self.rules.court_count.resolve(&page.text)
    }

    pub fn court_surface(&self, page: &Page) -> Field<CourtSurface> {
        self.rules.court_surface.resolve(&page.text)
    }

    pub fn operating_season(&self, page: &Page) -> Field<String> {
        self.rules.season.resolve(&page.text)
    }
}

fn isolated<T>(field: &'static str, extract: impl FnOnce() -> Field<T>) -> Field<T> {
    match panic::catch_unwind(AssertUnwindSafe(extract)) {
        Ok(value) => value,
        Err(_) => {
            warn!(field, "extractor panicked; recording not found");
            Field::NotFound
        }
    }
}
