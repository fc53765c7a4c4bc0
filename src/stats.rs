//! Bookkeeping overview.
//!
//! A quick summary of what has been ingested: recorded documents, points
//! written, documents with no extractable text, and the last ingest time.
//! Used by `ingestd stats`.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::db;
use crate::models::BookkeepingSummary;
use crate::store::{PgProcessedStore, ProcessedStore};

/// Run the stats command: query the bookkeeping table and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = PgProcessedStore::new(pool.clone());
    let summary = store.summary().await?;

    print!("{}", render_summary(config, &summary, Utc::now()));

    pool.close().await;
    Ok(())
}

fn render_summary(config: &Config, summary: &BookkeepingSummary, now: DateTime<Utc>) -> String {
    let last = match summary.last_processed_at {
        Some(ts) => format_relative(ts, now),
        None => "never".to_string(),
    };

    let mut out = String::new();
    out.push_str("Ingest Bookkeeping Stats\n");
    out.push_str("========================\n\n");
    out.push_str(&format!("  Collection:  {}\n", config.index.collection));
    out.push_str(&format!("  Uploads:     {}\n\n", config.uploads.root.display()));
    out.push_str(&format!("  Documents:   {}\n", summary.files));
    out.push_str(&format!("  Points:      {}\n", summary.points));
    out.push_str(&format!("  No text:     {}\n", summary.empty_files));
    out.push_str(&format!("  Last ingest: {}\n\n", last));
    out
}

/// Format a timestamp relative to `now` (e.g. "3 hours ago").
fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return format_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_iso(ts)
    }
}

fn format_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_format_relative() {
        let now = now();
        assert_eq!(format_relative(now - Duration::seconds(5), now), "just now");
        assert_eq!(format_relative(now - Duration::minutes(1), now), "1 min ago");
        assert_eq!(format_relative(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_relative(now - Duration::days(2), now), "2 days ago");
        assert_eq!(
            format_relative(now - Duration::days(45), now),
            "2026-01-15 12:00"
        );
        assert_eq!(
            format_relative(now + Duration::hours(1), now),
            "2026-03-01 13:00"
        );
    }

    #[test]
    fn test_render_summary() {
        let summary = BookkeepingSummary {
            files: 3,
            points: 42,
            empty_files: 1,
            last_processed_at: None,
        };
        let out = render_summary(&Config::default(), &summary, now());
        assert!(out.contains("Collection:  rag_docs"));
        assert!(out.contains("Documents:   3"));
        assert!(out.contains("Points:      42"));
        assert!(out.contains("No text:     1"));
        assert!(out.contains("Last ingest: never"));
    }
}
