use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use utoipa::ToSchema;

use crate::record::{ClubRecord, Field, MembershipStatus, FIELD_NAMES};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldCoverage {
    #[schema(value_type = String)]
    pub field: &'static str,
    pub found: usize,
    pub missing: usize,
    /// Percent of records with a value, one decimal.
    pub coverage: f64,
}

/// A club that still needs follow-up, with what is missing.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncompleteClub {
    pub name: String,
    pub email: Option<String>,
    #[schema(value_type = Vec<String>)]
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletenessReport {
    pub total: usize,
    pub status_counts: BTreeMap<String, usize>,
    /// Success and PartialJS over total, percent with one decimal.
    pub success_rate: f64,
    pub fields: Vec<FieldCoverage>,
    pub emails_found: usize,
    pub waitlist_clubs: usize,
    #[schema(value_type = Option<String>, format = Date)]
    pub last_run: Option<NaiveDate>,
    pub incomplete: Vec<IncompleteClub>,
}

impl CompletenessReport {
    pub fn from_records(records: &[ClubRecord]) -> Self {
        let total = records.len();

        let mut status_counts = BTreeMap::new();
        for record in records {
            *status_counts.entry(record.scrape_status().to_string()).or_insert(0) += 1;
        }
        let succeeded = records.iter().filter(|r| r.scrape_status().is_success()).count();

        let fields = FIELD_NAMES
            .iter()
            .map(|&field| {
                let found = records.iter().filter(|r| r.fields.is_found(field)).count();
                FieldCoverage {
                    field,
                    found,
                    missing: total - found,
                    coverage: percent(found, total),
                }
            })
            .collect();

        let incomplete = records
            .iter()
            .filter_map(|r| {
                let missing = r.fields.missing_fields();
                (!missing.is_empty()).then(|| IncompleteClub {
                    name: r.name().to_string(),
                    email: r.fields.email.clone().found(),
                    missing,
                })
            })
            .collect();

        Self {
            total,
            status_counts,
            success_rate: percent(succeeded, total),
            fields,
            emails_found: records.iter().filter(|r| r.fields.email.is_found()).count(),
            waitlist_clubs: records
                .iter()
                .filter(|r| r.fields.membership_status == Field::Found(MembershipStatus::Waitlist))
                .count(),
            last_run: records.iter().map(|r| r.date_scraped).max(),
            incomplete,
        }
    }

    /// Plain-text table for the terminal.
    pub fn render_table(&self) -> String {
        let rule = "=".repeat(70);
        let thin = "-".repeat(70);
        let mut out = String::new();

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Data Analysis Report");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Total clubs: {}", self.total);
        for (status, count) in &self.status_counts {
            let _ = writeln!(out, "  {status:<12} {count}");
        }
        let _ = writeln!(out, "Success rate: {}%", self.success_rate);
        let _ = writeln!(out, "Emails found: {}", self.emails_found);
        let _ = writeln!(out, "Clubs with waitlists: {}", self.waitlist_clubs);
        let _ = writeln!(out, "\nData Completeness:");
        let _ = writeln!(out, "{thin}");
        let _ = writeln!(out, "{:<30} {:<10} {:<10} {:<10}", "Field", "Found", "Missing", "Coverage");
        let _ = writeln!(out, "{thin}");
        for f in &self.fields {
            let _ = writeln!(out, "{:<30} {:<10} {:<10} {}%", f.field, f.found, f.missing, f.coverage);
        }
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Incomplete records: {}", self.incomplete.len());
        out
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}
