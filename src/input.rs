use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// One row of the club list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubEntry {
    pub name: String,
    #[serde(default, alias = "website", alias = "url")]
    pub website_url: String,
}

impl ClubEntry {
    pub fn new(name: impl Into<String>, website_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            website_url: website_url.into(),
        }
    }
}

/// Reads a JSON array of `{ "name", "websiteUrl" }` objects.
pub async fn load_clubs(path: &Path) -> Result<Vec<ClubEntry>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading club list {}", path.display()))?;
    let entries: Vec<ClubEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing club list {}", path.display()))?;
    info!(path = %path.display(), clubs = entries.len(), "club list loaded");
    Ok(entries)
}

/// Trims names and URLs, drops nameless rows, keeps the first row per
/// name and applies the optional limit.
pub fn prepare(entries: Vec<ClubEntry>, max_clubs: Option<usize>) -> Vec<ClubEntry> {
    let mut seen = HashSet::new();
    let mut clubs: Vec<ClubEntry> = entries
        .into_iter()
        .map(|e| ClubEntry::new(e.name.trim(), e.website_url.trim()))
        .filter(|e| !e.name.is_empty())
        .filter(|e| {
            let first = seen.insert(e.name.clone());
            if !first {
                warn!(club = %e.name, "duplicate club skipped");
            }
            first
        })
        .collect();

    if let Some(max) = max_clubs {
        clubs.truncate(max);
    }
    clubs
}
