use std::cmp::Ordering;

use crate::config::Config;
use crate::db::PriceStore;
use crate::error::Result;
use crate::types::{days, now_ns, Source, TrendEntry, WindowedStat};

/// Read-side computations over the price store. Every number it hands out is
/// finite, so callers can render results without checking.
#[derive(Clone)]
pub struct Analytics {
    store: PriceStore,
    stats_window_days: u32,
    trend_window_days: u32,
    trending_limit: usize,
}

impl Analytics {
    pub fn new(store: PriceStore, cfg: &Config) -> Self {
        Self {
            store,
            stats_window_days: cfg.stats_window_days,
            trend_window_days: cfg.trend_window_days,
            trending_limit: cfg.trending_limit,
        }
    }

    /// Source-wide avg/min/max over the trailing window (default 7 days).
    pub async fn aggregate_stats(&self, source: Source, window_days: Option<u32>) -> Result<WindowedStat> {
        let window = days(window_days.unwrap_or(self.stats_window_days));
        self.store.query_windowed_stats(source, window, now_ns()).await
    }

    /// Per-source stats for one item, averages rounded to cents.
    pub async fn item_analysis(&self, item_id: i64) -> Result<Vec<WindowedStat>> {
        let stats = self
            .store
            .item_windowed_stats(item_id, days(self.stats_window_days), now_ns())
            .await?;
        Ok(stats
            .into_iter()
            .map(|s| WindowedStat { average: round_cents(s.average), ..s })
            .collect())
    }

    pub async fn trending(
        &self,
        source: Source,
        limit: Option<usize>,
        window_days: Option<u32>,
    ) -> Result<Vec<TrendEntry>> {
        self.store
            .query_trend(
                source,
                window_days.unwrap_or(self.trend_window_days),
                limit.unwrap_or(self.trending_limit),
                now_ns(),
            )
            .await
    }
}

/// `(latest - prior) / prior * 100`, or exactly 0 when `prior` is zero or the
/// result is not finite.
pub fn percent_change(latest: f64, prior: f64) -> f64 {
    if prior == 0.0 {
        return 0.0;
    }
    let change = (latest - prior) / prior * 100.0;
    if change.is_finite() {
        change
    } else {
        0.0
    }
}

/// Orders by |percent change| descending, ties by market name ascending, then
/// truncates to `limit`.
pub fn rank_trending(mut entries: Vec<TrendEntry>, limit: usize) -> Vec<TrendEntry> {
    entries.sort_by(|a, b| {
        b.percent_change
            .abs()
            .partial_cmp(&a.percent_change.abs())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.market_name.cmp(&b.market_name))
    });
    entries.truncate(limit);
    entries
}

fn round_cents(v: f64) -> f64 {
    let r = (v * 100.0).round() / 100.0;
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NS_PER_DAY;

    fn entry(name: &str, pct: f64) -> TrendEntry {
        TrendEntry {
            item_id: 0,
            market_name: name.to_string(),
            latest_average: 0.0,
            prior_average: 0.0,
            percent_change: pct,
        }
    }

    #[test]
    fn percent_change_basic() {
        assert!((percent_change(11.0, 10.0) - 10.0).abs() < 1e-9);
        assert!((percent_change(5.0, 10.0) + 50.0).abs() < 1e-9);
    }

    #[test]
    fn percent_change_guards_degenerate_inputs() {
        assert_eq!(percent_change(10.0, 0.0), 0.0);
        assert_eq!(percent_change(0.0, 0.0), 0.0);
        assert_eq!(percent_change(10.0, -0.0), 0.0);
        assert_eq!(percent_change(f64::NAN, 10.0), 0.0);
        assert_eq!(percent_change(10.0, f64::NAN), 0.0);
        assert_eq!(percent_change(f64::INFINITY, 10.0), 0.0);
        assert_eq!(percent_change(f64::MAX, f64::MIN_POSITIVE), 0.0);
    }

    #[test]
    fn ranking_uses_magnitude_then_name() {
        let ranked = rank_trending(
            vec![
                entry("b", 5.0),
                entry("a", -30.0),
                entry("d", 12.0),
                entry("c", -12.0),
                entry("e", 0.0),
            ],
            10,
        );
        let names: Vec<&str> = ranked.iter().map(|e| e.market_name.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "d", "b", "e"]);
    }

    #[test]
    fn ranking_truncates() {
        let ranked = rank_trending(vec![entry("a", 1.0), entry("b", 2.0), entry("c", 3.0)], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].market_name, "c");
        assert!(rank_trending(vec![entry("a", 1.0)], 0).is_empty());
    }

    #[test]
    fn cents_rounding() {
        assert_eq!(round_cents(10.456), 10.46);
        assert_eq!(round_cents(f64::NAN), 0.0);
    }

    #[tokio::test]
    async fn engine_defaults_come_from_config() {
        let store = PriceStore::in_memory().await;
        let item = store.register_item("AK-47 | Redline (Field-Tested)").await.unwrap();
        let now = now_ns();
        store.append_price_point(item.id, 10.004, None, Source::Buff, now - NS_PER_DAY).await.unwrap();
        store.append_price_point(item.id, 12.0, None, Source::Buff, now - 10 * NS_PER_DAY).await.unwrap();

        let engine = Analytics::new(store, &Config::default());

        let week = engine.aggregate_stats(Source::Buff, None).await.unwrap();
        assert_eq!(week.max, 10.004);

        let fortnight = engine.aggregate_stats(Source::Buff, Some(14)).await.unwrap();
        assert_eq!(fortnight.max, 12.0);

        let empty = engine.aggregate_stats(Source::Steam, None).await.unwrap();
        assert_eq!(empty, WindowedStat::empty(Source::Steam));

        let analysis = engine.item_analysis(item.id).await.unwrap();
        assert_eq!(analysis.len(), 1);
        assert_eq!(analysis[0].average, 10.0);
    }
}
