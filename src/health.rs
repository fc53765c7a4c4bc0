//! Reachability of the bookkeeping store and the extraction backend.
//!
//! Shared by `GET /health` and `ingestd health`. The report is always
//! produced; an unreachable dependency turns the overall status into
//! `degraded` instead of failing the check itself.

use serde::Serialize;

use crate::error::IngestResult;
use crate::extract::TextExtractor;
use crate::store::ProcessedStore;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_result(result: IngestResult<()>) -> Self {
        match result {
            Ok(()) => Self {
                healthy: true,
                error: None,
            },
            Err(e) => Self {
                healthy: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReport {
    /// `ok` or `degraded`.
    pub status: &'static str,
    pub bookkeeping: ComponentHealth,
    pub extraction: ComponentHealth,
    pub version: &'static str,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.bookkeeping.healthy && self.extraction.healthy
    }
}

pub async fn check_health(
    store: &dyn ProcessedStore,
    extractor: &dyn TextExtractor,
) -> HealthReport {
    let (bookkeeping, extraction) = tokio::join!(store.ping(), extractor.ping());
    let bookkeeping = ComponentHealth::from_result(bookkeeping);
    let extraction = ComponentHealth::from_result(extraction);
    let status = if bookkeeping.healthy && extraction.healthy {
        "ok"
    } else {
        "degraded"
    };

    HealthReport {
        status,
        bookkeeping,
        extraction,
        version: env!("CARGO_PKG_VERSION"),
    }
}

/// Print the report as a small table.
pub fn print_health(report: &HealthReport, extractor_name: &str) {
    println!("{:<16} {:<10} ERROR", "COMPONENT", "HEALTHY");
    for (name, component) in [
        ("bookkeeping", &report.bookkeeping),
        (extractor_name, &report.extraction),
    ] {
        println!(
            "{:<16} {:<10} {}",
            name,
            component.healthy,
            component.error.as_deref().unwrap_or("-")
        );
    }
    println!();
    println!("status: {}", report.status);
}
