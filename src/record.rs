use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use utoipa::ToSchema;

use crate::error::StatusError;

/// Literal written in place of any field the extractors could not find.
pub const NOT_FOUND: &str = "not found";

// ============================================================================
// Field sentinel
// ============================================================================

/// A scraped value or the explicit "not found" sentinel.
///
/// Serialized as the bare value or the string `"not found"`, never as null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Found(T),
    NotFound,
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::NotFound
    }
}

impl<T> Field<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Field::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Field::Found(v) => Some(v),
            Field::NotFound => None,
        }
    }

    /// Keeps `self` when found, otherwise takes `fallback`.
    /// The flag reports whether the value came from `fallback`.
    pub fn or_fallback(self, fallback: Field<T>) -> (Field<T>, bool) {
        match (self, fallback) {
            (Field::Found(v), _) => (Field::Found(v), false),
            (Field::NotFound, Field::Found(v)) => (Field::Found(v), true),
            (Field::NotFound, Field::NotFound) => (Field::NotFound, false),
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Field::NotFound, Field::Found)
    }
}

impl<T: fmt::Display> fmt::Display for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Found(v) => v.fmt(f),
            Field::NotFound => f.write_str(NOT_FOUND),
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Found(v) => v.serialize(serializer),
            Field::NotFound => serializer.serialize_str(NOT_FOUND),
        }
    }
}

#[derive(Deserialize)]
enum Sentinel {
    #[serde(rename = "not found")]
    NotFound,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldRepr<T> {
    Sentinel(Sentinel),
    Value(T),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match FieldRepr::<T>::deserialize(deserializer)? {
            FieldRepr::Sentinel(Sentinel::NotFound) => Field::NotFound,
            FieldRepr::Value(v) => Field::Found(v),
        })
    }
}

// ============================================================================
// Field value types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ClubType {
    Private,
    #[serde(rename = "Semi-Private")]
    SemiPrivate,
    Community,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum MembershipStatus {
    Open,
    Waitlist,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum CourtSurface {
    Hard,
    Clay,
    Grass,
    Indoor,
    Mixed,
}

impl fmt::Display for ClubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClubType::Private => "Private",
            ClubType::SemiPrivate => "Semi-Private",
            ClubType::Community => "Community",
            ClubType::Public => "Public",
        })
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for CourtSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lifecycle of one club's scrape. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ScrapeStatus {
    Pending,
    Attempted,
    Success,
    Failed,
    /// Success where at least one field came from the rendered pass.
    #[serde(rename = "PartialJS")]
    PartialJs,
}

impl ScrapeStatus {
    pub fn can_transition_to(self, next: ScrapeStatus) -> bool {
        use ScrapeStatus::*;
        matches!(
            (self, next),
            (Pending, Attempted) | (Attempted, Success) | (Attempted, Failed) | (Attempted, PartialJs)
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, ScrapeStatus::Success | ScrapeStatus::PartialJs)
    }
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeStatus::PartialJs => f.write_str("PartialJS"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Names of the extracted fields, in record order.
pub const FIELD_NAMES: [&str; 8] = [
    "location",
    "email",
    "clubType",
    "membershipStatus",
    "waitlistLength",
    "courtCount",
    "courtSurface",
    "operatingSeason",
];

/// Everything the extractors produce for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClubFields {
    #[schema(value_type = String)]
    pub location: Field<String>,
    #[schema(value_type = String)]
    pub email: Field<String>,
    #[schema(value_type = String)]
    pub club_type: Field<ClubType>,
    #[schema(value_type = String)]
    pub membership_status: Field<MembershipStatus>,
    #[schema(value_type = String)]
    pub waitlist_length: Field<u32>,
    #[schema(value_type = String)]
    pub court_count: Field<u32>,
    #[schema(value_type = String)]
    pub court_surface: Field<CourtSurface>,
    #[schema(value_type = String)]
    pub operating_season: Field<String>,
}

impl ClubFields {
    fn presence(&self) -> [bool; 8] {
        [
            self.location.is_found(),
            self.email.is_found(),
            self.club_type.is_found(),
            self.membership_status.is_found(),
            self.waitlist_length.is_found(),
            self.court_count.is_found(),
            self.court_surface.is_found(),
            self.operating_season.is_found(),
        ]
    }

    /// Field names paired with their display values, in record order.
    pub fn entries(&self) -> [(&'static str, String); 8] {
        [
            (FIELD_NAMES[0], self.location.to_string()),
            (FIELD_NAMES[1], self.email.to_string()),
            (FIELD_NAMES[2], self.club_type.to_string()),
            (FIELD_NAMES[3], self.membership_status.to_string()),
            (FIELD_NAMES[4], self.waitlist_length.to_string()),
            (FIELD_NAMES[5], self.court_count.to_string()),
            (FIELD_NAMES[6], self.court_surface.to_string()),
            (FIELD_NAMES[7], self.operating_season.to_string()),
        ]
    }

    pub fn found_count(&self) -> usize {
        self.presence().iter().filter(|p| **p).count()
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        FIELD_NAMES
            .iter()
            .zip(self.presence())
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn is_found(&self, name: &str) -> bool {
        FIELD_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.presence()[i])
            .unwrap_or(false)
    }

    /// Field-by-field merge that never overwrites a value already in `self`.
    ///
    /// Returns the merged fields and how many of them came from `fallback`.
    pub fn merge(self, fallback: ClubFields) -> (ClubFields, usize) {
        fn take<T>(pair: (Field<T>, bool), filled: &mut usize) -> Field<T> {
            if pair.1 {
                *filled += 1;
            }
            pair.0
        }

        let mut filled = 0;
        let merged = ClubFields {
            location: take(self.location.or_fallback(fallback.location), &mut filled),
            email: take(self.email.or_fallback(fallback.email), &mut filled),
            club_type: take(self.club_type.or_fallback(fallback.club_type), &mut filled),
            membership_status: take(
                self.membership_status.or_fallback(fallback.membership_status),
                &mut filled,
            ),
            waitlist_length: take(self.waitlist_length.or_fallback(fallback.waitlist_length), &mut filled),
            court_count: take(self.court_count.or_fallback(fallback.court_count), &mut filled),
            court_surface: take(self.court_surface.or_fallback(fallback.court_surface), &mut filled),
            operating_season: take(
                self.operating_season.or_fallback(fallback.operating_season),
                &mut filled,
            ),
        };
        (merged, filled)
    }
}

/// One club's scraped facts, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClubRecord {
    name: String,
    pub website_url: String,
    #[serde(flatten)]
    pub fields: ClubFields,
    scrape_status: ScrapeStatus,
    #[schema(value_type = String, format = Date)]
    pub date_scraped: NaiveDate,
}

impl ClubRecord {
    pub fn new(name: impl Into<String>, website_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            website_url: website_url.into(),
            fields: ClubFields::default(),
            scrape_status: ScrapeStatus::Pending,
            date_scraped: Utc::now().date_naive(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scrape_status(&self) -> ScrapeStatus {
        self.scrape_status
    }

    pub fn transition(&mut self, next: ScrapeStatus) -> Result<(), StatusError> {
        if !self.scrape_status.can_transition_to(next) {
            return Err(StatusError {
                from: self.scrape_status,
                to: next,
            });
        }
        self.scrape_status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> ClubFields {
        ClubFields {
            location: Field::Found("Toronto".into()),
            court_count: Field::Found(8),
            ..Default::default()
        }
    }

    #[test]
    fn not_found_serializes_as_sentinel_string() {
        let json = serde_json::to_value(sample_fields()).unwrap();
        assert_eq!(json["location"], "Toronto");
        assert_eq!(json["courtCount"], 8);
        assert_eq!(json["email"], NOT_FOUND);
        assert_eq!(json["clubType"], NOT_FOUND);
        assert!(json.as_object().unwrap().values().all(|v| !v.is_null()));
    }

    #[test]
    fn record_survives_json_round_trip() {
        let mut record = ClubRecord::new("Balmy Beach", "balmybeach.ca");
        record.fields = sample_fields();
        record.fields.club_type = Field::Found(ClubType::SemiPrivate);
        record.transition(ScrapeStatus::Attempted).unwrap();
        record.transition(ScrapeStatus::PartialJs).unwrap();

        let text = serde_json::to_string(&record).unwrap();
        assert!(text.contains("\"scrapeStatus\":\"PartialJS\""));
        assert!(text.contains("\"clubType\":\"Semi-Private\""));

        let back: ClubRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn status_only_moves_forward() {
        let mut record = ClubRecord::new("Club", "");
        assert!(record.transition(ScrapeStatus::Success).is_err());
        record.transition(ScrapeStatus::Attempted).unwrap();
        record.transition(ScrapeStatus::Failed).unwrap();

        let err = record.transition(ScrapeStatus::Success).unwrap_err();
        assert_eq!(err.from, ScrapeStatus::Failed);
        assert_eq!(record.scrape_status(), ScrapeStatus::Failed);
    }

    #[test]
    fn merge_keeps_primary_values() {
        let primary = sample_fields();
        let fallback = ClubFields {
            location: Field::Found("Mississauga".into()),
            email: Field::Found("info@club.ca".into()),
            court_count: Field::Found(3),
            ..Default::default()
        };

        let (merged, filled) = primary.merge(fallback);
        assert_eq!(merged.location, Field::Found("Toronto".into()));
        assert_eq!(merged.court_count, Field::Found(8));
        assert_eq!(merged.email, Field::Found("info@club.ca".into()));
        assert_eq!(filled, 1);
    }

    #[test]
    fn merge_is_not_found_only_when_both_are() {
        let (merged, filled) = ClubFields::default().merge(ClubFields::default());
        assert_eq!(merged, ClubFields::default());
        assert_eq!(filled, 0);
        assert_eq!(merged.missing_fields().len(), FIELD_NAMES.len());
    }

    #[test]
    fn missing_fields_lists_names() {
        let fields = sample_fields();
        let missing = fields.missing_fields();
        assert_eq!(fields.found_count(), 2);
        assert!(!missing.contains(&"location"));
        assert!(missing.contains(&"email"));
        assert!(fields.is_found("courtCount"));
    }

    #[test]
    fn entries_display_sentinel_and_values() {
        let mut fields = sample_fields();
        fields.club_type = Field::Found(ClubType::SemiPrivate);
        let entries = fields.entries();
        assert_eq!(entries[0], ("location", "Toronto".to_string()));
        assert_eq!(entries[1], ("email", NOT_FOUND.to_string()));
        assert_eq!(entries[2], ("clubType", "Semi-Private".to_string()));
        assert_eq!(entries[5], ("courtCount", "8".to_string()));
    }
}
