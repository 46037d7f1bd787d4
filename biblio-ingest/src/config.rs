//! Configuration resolution for biblio-ingest
//!
//! API keys resolve Database → ENV → TOML. The database tier is what the
//! settings endpoint writes; the TOML file keeps a backup copy.

use biblio_common::config::{ApiSourceConfig, TomlConfig};
use biblio_common::Result;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{info, warn};

use crate::models::SourceKind;

/// `BIBLIO_<SOURCE>_API_KEY`
pub fn api_key_env_var(source: SourceKind) -> String {
    format!("BIBLIO_{}_API_KEY", source.as_str())
}

fn toml_source(toml_config: &TomlConfig, source: SourceKind) -> Option<&ApiSourceConfig> {
    match source {
        SourceKind::Scopus => toml_config.sources.scopus.as_ref(),
        SourceKind::OpenAlex => toml_config.sources.open_alex.as_ref(),
        SourceKind::WebOfScience => toml_config.sources.web_of_science.as_ref(),
        SourceKind::OaiPmh | SourceKind::SkgIf => None,
    }
}

fn toml_source_mut(toml_config: &mut TomlConfig, source: SourceKind) -> Option<&mut ApiSourceConfig> {
    match source {
        SourceKind::Scopus => toml_config.sources.scopus.as_mut(),
        SourceKind::OpenAlex => toml_config.sources.open_alex.as_mut(),
        SourceKind::WebOfScience => toml_config.sources.web_of_science.as_mut(),
        SourceKind::OaiPmh | SourceKind::SkgIf => None,
    }
}

/// Resolve a source's API key from the three tiers
///
/// **Priority:** Database → ENV → TOML. `None` when no tier has a usable key;
/// whether that is fatal depends on the source.
pub async fn resolve_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
    source: SourceKind,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_api_key(db, source)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(api_key_env_var(source))
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_source(toml_config, source)
        .and_then(|s| s.api_key.clone())
        .filter(|k| is_valid_key(k));

    let tiers: Vec<&str> = [
        ("database", db_key.is_some()),
        ("environment", env_key.is_some()),
        ("TOML", toml_key.is_some()),
    ]
    .iter()
    .filter(|(_, present)| *present)
    .map(|(tier, _)| *tier)
    .collect();

    if tiers.len() > 1 {
        warn!(
            source = %source,
            "API key found in multiple sources: {}. Using {} (highest priority).",
            tiers.join(", "),
            tiers[0]
        );
    }
    if let Some(tier) = tiers.first() {
        info!(source = %source, "API key loaded from {}", tier);
    }

    Ok(db_key.or(env_key).or(toml_key))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Store a key in the database and back it up to the TOML file
///
/// The TOML write is best effort: the database is authoritative.
pub async fn store_api_key(
    db: &Pool<Sqlite>,
    source: SourceKind,
    key: String,
    toml_path: &Path,
) -> Result<()> {
    crate::db::settings::set_api_key(db, source, key.clone()).await?;

    let mut config = biblio_common::config::load_toml_config(toml_path)?;
    match toml_source_mut(&mut config, source) {
        Some(api) => api.api_key = Some(key),
        None => {
            info!(source = %source, "No TOML section for source, key kept in database only");
            return Ok(());
        }
    }

    match biblio_common::config::write_toml_config(&config, toml_path) {
        Ok(()) => {
            info!(source = %source, "API key synced to TOML: {}", toml_path.display());
            Ok(())
        }
        Err(e) => {
            warn!("TOML write failed (database write succeeded): {}", e);
            Ok(())
        }
    }
}
