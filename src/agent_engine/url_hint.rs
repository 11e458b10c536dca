//! Start-page resolution for objectives issued on a blank tab.

use std::sync::OnceLock;

use regex::Regex;

const WELL_KNOWN_SITES: [(&str, &str); 17] = [
    ("google", "https://www.google.com"),
    ("youtube", "https://www.youtube.com"),
    ("facebook", "https://www.facebook.com"),
    ("twitter", "https://www.twitter.com"),
    ("instagram", "https://www.instagram.com"),
    ("linkedin", "https://www.linkedin.com"),
    ("github", "https://www.github.com"),
    ("stackoverflow", "https://stackoverflow.com"),
    ("reddit", "https://www.reddit.com"),
    ("amazon", "https://www.amazon.com"),
    ("wikipedia", "https://www.wikipedia.org"),
    ("netflix", "https://www.netflix.com"),
    ("gmail", "https://mail.google.com"),
    ("outlook", "https://outlook.live.com"),
    ("yahoo", "https://www.yahoo.com"),
    ("bing", "https://www.bing.com"),
    ("duckduckgo", "https://duckduckgo.com"),
];

fn explicit_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)https?://[^\s/$.?#][^\s]*").expect("static pattern"),
            Regex::new(r"(?i)www\.[a-z0-9-]+\.[a-z]{2,}(?:/\S*)?").expect("static pattern"),
            Regex::new(r"(?i)\b[a-z0-9-]+\.(?:com|org|net|io|dev|ai|co\.uk|edu|gov)\b(?:/\S*)?").expect("static pattern"),
        ]
    })
}

fn phrase_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?:go to|open|visit|navigate to|search on)\s+([a-z0-9 ]+)").expect("static pattern"),
            Regex::new(r"(?:search|look up|find)\s+(?:on\s+)?([a-z0-9 ]+)").expect("static pattern"),
            Regex::new(r"^([a-z0-9]+)(?:\s|$)").expect("static pattern"),
        ]
    })
}

/// True for tabs that have not loaded anything yet.
pub fn is_blank(url: &str) -> bool {
    let url = url.trim();
    url.is_empty() || url == "about:blank" || url.starts_with("data:,")
}

/// Derive a URL to open from the objective text.
pub fn start_url(objective: &str) -> Option<String> {
    for pattern in explicit_patterns() {
        if let Some(m) = pattern.find(objective) {
            let url = m.as_str().trim_end_matches(&['.', ',', ')', '"', '\''][..]);
            return Some(if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            });
        }
    }

    let lowered = objective.trim().to_lowercase();
    for pattern in phrase_patterns() {
        let Some(site) = pattern.captures(&lowered).and_then(|c| c.get(1)) else {
            continue;
        };
        let site = site.as_str().trim();
        if site.is_empty() {
            continue;
        }
        if let Some((_, url)) = WELL_KNOWN_SITES
            .iter()
            .find(|(name, _)| site.contains(name) || (site.len() > 2 && name.contains(site)))
        {
            return Some(url.to_string());
        }
        if !site.contains(' ') && site.len() > 2 {
            return Some(format!("https://www.{site}.com"));
        }
    }
    None
}
