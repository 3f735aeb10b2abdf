//! Click analytics: filters and reductions over data already in memory.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::ShortUrl;

/// Aggregated statistics for one link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkStats {
    pub code: String,
    pub total_clicks: u64,
    /// Clicks grouped by traffic-source tag, sorted by tag for stable output.
    pub clicks_by_source: Vec<(String, u64)>,
    pub last_click_at: Option<SystemTime>,
}

/// Aggregated statistics across the whole collection.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct OverallStats {
    pub total_links: usize,
    pub active_links: usize,
    pub expired_links: usize,
    pub total_clicks: u64,
}

/// Reduce one link's click sequence into its stats.
pub fn link_stats(link: &ShortUrl) -> LinkStats {
    let mut by_source: HashMap<String, u64> = HashMap::new();
    for click in &link.clicks {
        *by_source.entry(click.source.clone()).or_insert(0) += 1;
    }
    let mut clicks_by_source: Vec<_> = by_source.into_iter().collect();
    clicks_by_source.sort_by(|a, b| a.0.cmp(&b.0));

    LinkStats {
        code: link.short_code.as_str().to_string(),
        total_clicks: link.click_count,
        clicks_by_source,
        last_click_at: link.clicks.last().map(|c| c.clicked_at),
    }
}

/// Reduce the collection into overall counts at the given instant.
pub fn overall_stats(links: &[ShortUrl], now: SystemTime) -> OverallStats {
    let mut stats = OverallStats {
        total_links: links.len(),
        ..Default::default()
    };
    for link in links {
        if link.is_expired(now) {
            stats.expired_links += 1;
        } else {
            stats.active_links += 1;
        }
        stats.total_clicks += link.click_count;
    }
    stats
}
