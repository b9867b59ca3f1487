use serde::Serialize;
use std::fmt::Write as _;
use utoipa::ToSchema;

use crate::record::ClubRecord;

/// Clubs missing at least this many fields are contacted even when an
/// email was found.
pub const DEFAULT_THRESHOLD: usize = 3;

/// How many drafted emails a preview carries.
pub const PREVIEW_LIMIT: usize = 10;

/// A club whose record is too thin to publish as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct OutreachCandidate {
    pub name: String,
    pub email: Option<String>,
    pub missing: Vec<&'static str>,
}

/// Clubs with no email on record, or with `threshold` or more missing
/// fields, in store order.
pub fn select_candidates(records: &[ClubRecord], threshold: usize) -> Vec<OutreachCandidate> {
    records
        .iter()
        .filter_map(|record| {
            let email = record.fields.email.clone().found();
            let missing = record.fields.missing_fields();
            (email.is_none() || missing.len() >= threshold).then(|| OutreachCandidate {
                name: record.name().to_string(),
                email,
                missing,
            })
        })
        .collect()
}

fn field_label(field: &str) -> &str {
    match field {
        "location" => "Location",
        "email" => "Contact email",
        "clubType" => "Club type (private, public, community)",
        "membershipStatus" => "Membership status",
        "waitlistLength" => "Waitlist length",
        "courtCount" => "Number of courts",
        "courtSurface" => "Court surface",
        "operatingSeason" => "Operating season",
        other => other,
    }
}

/// Plain-text request for the fields a club's website did not show.
pub fn draft_email(club_name: &str, missing: &[&str]) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "Hello {club_name} team,");
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "We are compiling a directory of tennis clubs in the Greater Toronto Area so players can find a club that suits them."
    );
    let _ = writeln!(
        body,
        "Your website did not list everything we were looking for, and we would like the directory entry for {club_name} to be accurate."
    );
    let _ = writeln!(body);
    let _ = writeln!(body, "Missing information:");
    for field in missing {
        let _ = writeln!(body, "  - {}", field_label(field));
    }
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "If you could reply with whether you are accepting members, how long your waitlist is, and how many courts you have (with their surface and season), we will update the listing."
    );
    let _ = writeln!(body);
    let _ = writeln!(body, "Thank you,");
    let _ = write!(body, "GTA Tennis Club Directory");
    body
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailPreview {
    pub club_name: String,
    pub email: Option<String>,
    #[schema(value_type = Vec<String>)]
    pub missing_fields: Vec<&'static str>,
    pub email_body: String,
}

/// Drafted outreach for the first few candidates, with totals.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutreachPreview {
    pub total_clubs: usize,
    pub with_email: usize,
    pub preview: Vec<EmailPreview>,
}

impl OutreachPreview {
    pub fn from_records(records: &[ClubRecord], threshold: usize) -> Self {
        let candidates = select_candidates(records, threshold);
        let with_email = candidates.iter().filter(|c| c.email.is_some()).count();
        let total_clubs = candidates.len();

        let preview = candidates
            .into_iter()
            .take(PREVIEW_LIMIT)
            .map(|c| EmailPreview {
                email_body: draft_email(&c.name, &c.missing),
                club_name: c.name,
                email: c.email,
                missing_fields: c.missing,
            })
            .collect();

        Self {
            total_clubs,
            with_email,
            preview,
        }
    }
}
