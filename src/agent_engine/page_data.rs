//! Structured extraction and timing samples from the current page.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::driver::{scripts, DocumentDriver};
use crate::errors::WebPilotResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLink {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPageData {
    headings: Vec<String>,
    links: Vec<PageLink>,
    link_count: usize,
    table_count: usize,
    form_count: usize,
    body_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageData {
    pub title: String,
    pub url: String,
    pub headings: Vec<String>,
    pub links: Vec<PageLink>,
    pub link_count: usize,
    pub table_count: usize,
    pub form_count: usize,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub extracted_at: DateTime<Utc>,
}

pub async fn extract(driver: &dyn DocumentDriver) -> WebPilotResult<PageData> {
    let title = driver.title().await?;
    let url = driver.current_url().await?;
    let value = driver.execute_script(scripts::PAGE_DATA, vec![]).await?;
    let raw: RawPageData = if value.is_null() {
        RawPageData::default()
    } else {
        serde_json::from_value(value)?
    };

    let data = PageData {
        title,
        url,
        emails: find_emails(&raw.body_text),
        phones: find_phones(&raw.body_text),
        headings: raw.headings,
        links: raw.links,
        link_count: raw.link_count,
        table_count: raw.table_count,
        form_count: raw.form_count,
        extracted_at: Utc::now(),
    };
    tracing::info!(
        url = %data.url,
        headings = data.headings.len(),
        links = data.link_count,
        emails = data.emails.len(),
        phones = data.phones.len(),
        "page data extracted"
    );
    Ok(data)
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("static pattern")
    })
}

fn phone_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"\+?1?\s*\(?[0-9]{3}\)?[\s.-]?[0-9]{3}[\s.-]?[0-9]{4}").expect("static pattern"),
            Regex::new(r"\+[0-9]{1,3}\s?[0-9]{2,4}\s?[0-9]{3,4}\s?[0-9]{3,4}").expect("static pattern"),
        ]
    })
}

/// Distinct addresses, sorted.
pub fn find_emails(text: &str) -> Vec<String> {
    email_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn find_phones(text: &str) -> Vec<String> {
    phone_patterns()
        .iter()
        .flat_map(|p| p.find_iter(text))
        .map(|m| m.as_str().trim().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ── Performance monitor ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSample {
    pub load_ms: Option<f64>,
    pub dom_ready_ms: Option<f64>,
    pub js_heap_bytes: Option<f64>,
    pub resource_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub samples: usize,
    pub avg_load_ms: Option<f64>,
    pub avg_dom_ready_ms: Option<f64>,
    pub avg_heap_mb: Option<f64>,
    pub max_resources: usize,
}

impl PerformanceSummary {
    pub fn from_samples(samples: &[PerformanceSample]) -> Self {
        fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
            let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            (n > 0).then(|| sum / n as f64)
        }
        Self {
            samples: samples.len(),
            avg_load_ms: mean(samples.iter().filter_map(|s| s.load_ms)),
            avg_dom_ready_ms: mean(samples.iter().filter_map(|s| s.dom_ready_ms)),
            avg_heap_mb: mean(samples.iter().filter_map(|s| s.js_heap_bytes)).map(|b| b / 1_048_576.0),
            max_resources: samples.iter().map(|s| s.resource_count).max().unwrap_or(0),
        }
    }
}

pub async fn sample_performance(driver: &dyn DocumentDriver) -> WebPilotResult<PerformanceSample> {
    let value = driver.execute_script(scripts::PERFORMANCE_SAMPLE, vec![]).await?;
    if value.is_null() {
        return Ok(PerformanceSample::default());
    }
    Ok(serde_json::from_value(value)?)
}

/// Sample every `interval` for `duration`, stopping early when `stop` is set.
/// Non-fatal sampling errors skip the sample.
pub async fn monitor(
    driver: &dyn DocumentDriver,
    duration: Duration,
    interval: Duration,
    stop: &AtomicBool,
) -> WebPilotResult<PerformanceSummary> {
    let started = Instant::now();
    let mut samples = Vec::new();
    loop {
        match sample_performance(driver).await {
            Ok(sample) => samples.push(sample),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::debug!(error = %e, "performance sample skipped"),
        }
        if stop.load(Ordering::SeqCst) || started.elapsed() + interval > duration {
            break;
        }
        tokio::time::sleep(interval).await;
    }
    let summary = PerformanceSummary::from_samples(&samples);
    tracing::info!(samples = summary.samples, avg_load_ms = ?summary.avg_load_ms, "performance monitor finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDriver;

    #[test]
    fn finds_contacts_in_text() {
        let text = "Write to sales@example.com or sales@example.com; support: help.desk@corp.io. \
                    Call (555) 123-4567 or +44 20 7946 0958.";
        assert_eq!(find_emails(text), vec!["help.desk@corp.io", "sales@example.com"]);
        let phones = find_phones(text);
        assert!(phones.contains(&"(555) 123-4567".to_string()), "{phones:?}");
        assert!(phones.iter().any(|p| p.starts_with("+44")), "{phones:?}");
    }

    #[tokio::test]
    async fn extract_reads_page_script_output() {
        let driver = FakeDriver::default();
        driver.set_url("https://example.com/contact");
        driver.script_returns(
            "page_data",
            serde_json::json!({
                "headings": ["Contact"],
                "links": [{ "text": "Home", "href": "https://example.com/" }],
                "link_count": 1,
                "table_count": 2,
                "form_count": 1,
                "body_text": "Reach us at team@example.com"
            }),
        );

        let data = extract(&driver).await.unwrap();
        assert_eq!(data.url, "https://example.com/contact");
        assert_eq!(data.headings, vec!["Contact"]);
        assert_eq!(data.table_count, 2);
        assert_eq!(data.emails, vec!["team@example.com"]);
    }

    #[test]
    fn summary_averages_present_values() {
        let samples = [
            PerformanceSample {
                load_ms: Some(100.0),
                dom_ready_ms: None,
                js_heap_bytes: Some(2_097_152.0),
                resource_count: 4,
            },
            PerformanceSample {
                load_ms: Some(300.0),
                dom_ready_ms: None,
                js_heap_bytes: None,
                resource_count: 9,
            },
        ];
        let summary = PerformanceSummary::from_samples(&samples);
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.avg_load_ms, Some(200.0));
        assert_eq!(summary.avg_dom_ready_ms, None);
        assert_eq!(summary.avg_heap_mb, Some(2.0));
        assert_eq!(summary.max_resources, 9);
    }

    #[tokio::test]
    async fn monitor_takes_one_sample_for_zero_duration() {
        let driver = FakeDriver::default();
        driver.script_returns("performance_sample", serde_json::json!({ "load_ms": 50.0, "resource_count": 3 }));
        let stop = AtomicBool::new(false);
        let summary = monitor(&driver, Duration::ZERO, Duration::from_millis(10), &stop).await.unwrap();
        assert_eq!(summary.samples, 1);
        assert_eq!(summary.avg_load_ms, Some(50.0));
    }
}
