use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

use crate::analytics::{percent_change, rank_trending};
use crate::catalog::classify;
use crate::db::models::{ItemRow, PricePointRow, SourceStatRow, TrendRow};
use crate::error::{AppError, Result};
use crate::types::{
    now_ns, window_start_ns, ItemRef, ItemType, Source, TrendEntry, WindowedStat, NS_PER_DAY,
};

/// Append-only price history plus the per-item current-price projection.
///
/// Every call borrows a connection from the pool for exactly one statement, so
/// a failed write never leaves a connection checked out and the two write
/// paths (history, projection) are independent units of work.
#[derive(Clone)]
pub struct PriceStore {
    pool: SqlitePool,
}

impl PriceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the SQLite file and applies migrations.
    pub async fn open(db_path: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    #[cfg(test)]
    pub async fn in_memory() -> Self {
        // One long-lived connection: each in-memory connection is its own database.
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .expect("valid sqlite url")
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        Self::new(pool)
    }

    #[cfg(test)]
    pub fn pool_for_tests(&self) -> SqlitePool {
        self.pool.clone()
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    pub async fn list_tracked_items(&self) -> Result<Vec<ItemRef>> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, market_name FROM items")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, market_name)| ItemRef { id, market_name })
            .collect())
    }

    pub async fn list_items(&self, limit: i64) -> Result<Vec<ItemRow>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT * FROM items ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Items of one category, newest first.
    pub async fn list_items_by_type(
        &self,
        item_type: ItemType,
        limit: i64,
    ) -> Result<Vec<ItemRow>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT * FROM items WHERE item_type = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(item_type.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_item(&self, id: i64) -> Result<Option<ItemRow>> {
        let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Registers a market name for tracking. Category fields come from the
    /// name itself; a name already tracked is a validation error.
    pub async fn register_item(&self, market_name: &str) -> Result<ItemRow> {
        let market_name = market_name.trim();
        if market_name.is_empty() {
            return Err(AppError::Validation("market name must not be empty".to_string()));
        }
        let class = classify(market_name);

        let inserted = sqlx::query(
            r#"
            INSERT INTO items (market_name, item_type, weapon, skin, wear, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(market_name)
        .bind(class.item_type.to_string())
        .bind(&class.weapon)
        .bind(&class.skin)
        .bind(&class.wear)
        .bind(now_ns())
        .execute(&self.pool)
        .await;

        let id = match inserted {
            Ok(res) => res.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::Validation(format!(
                    "{market_name:?} is already tracked"
                )))
            }
            Err(e) => return Err(e.into()),
        };

        self.get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("item {id}")))
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub async fn append_price_point(
        &self,
        item_id: i64,
        price: f64,
        volume: Option<i64>,
        source: Source,
        recorded_at_ns: i64,
    ) -> Result<i64> {
        validate_price(price)?;

        let res = sqlx::query(
            r#"
            INSERT INTO price_history (item_id, price, volume, source, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(item_id)
        .bind(price)
        .bind(volume)
        .bind(source.as_str())
        .bind(recorded_at_ns)
        .execute(&self.pool)
        .await?;

        Ok(res.last_insert_rowid())
    }

    /// Overwrites the latest-known price for `source` on the item. A missing
    /// volume keeps the previously known one.
    pub async fn update_current_price(
        &self,
        item_id: i64,
        source: Source,
        price: f64,
        volume: Option<i64>,
    ) -> Result<()> {
        validate_price(price)?;

        let sql = match source {
            Source::Buff => "UPDATE items SET buff_price = ?, volume = COALESCE(?, volume) WHERE id = ?",
            Source::Steam => "UPDATE items SET steam_price = ?, volume = COALESCE(?, volume) WHERE id = ?",
        };
        let res = sqlx::query(sql)
            .bind(price)
            .bind(volume)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("item {item_id}")));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Points for one item since `since_ns`, newest first.
    pub async fn price_history(
        &self,
        item_id: i64,
        since_ns: i64,
        source: Option<Source>,
    ) -> Result<Vec<PricePointRow>> {
        let rows = sqlx::query_as::<_, PricePointRow>(
            r#"
            SELECT price, volume, source, recorded_at
            FROM price_history
            WHERE item_id = ? AND recorded_at >= ? AND (? IS NULL OR source = ?)
            ORDER BY recorded_at DESC, id DESC
            "#,
        )
        .bind(item_id)
        .bind(since_ns)
        .bind(source.map(|s| s.as_str()))
        .bind(source.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Average/min/max of strictly positive prices for `source` inside the
    /// trailing `window`. No qualifying points yields all zeros.
    pub async fn query_windowed_stats(
        &self,
        source: Source,
        window: Duration,
        now_ns: i64,
    ) -> Result<WindowedStat> {
        let since = window_start_ns(now_ns, window);
        let (average, min, max): (Option<f64>, Option<f64>, Option<f64>) = sqlx::query_as(
            r#"
            SELECT AVG(price), MIN(price), MAX(price)
            FROM price_history
            WHERE source = ? AND recorded_at >= ? AND price > 0
            "#,
        )
        .bind(source.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        if average.is_none() {
            return Ok(WindowedStat::empty(source));
        }
        Ok(WindowedStat {
            source,
            average: finite_or_zero(average),
            min: finite_or_zero(min),
            max: finite_or_zero(max),
        })
    }

    /// Per-source stats for one item. Sources with no positive points in the
    /// window are omitted.
    pub async fn item_windowed_stats(
        &self,
        item_id: i64,
        window: Duration,
        now_ns: i64,
    ) -> Result<Vec<WindowedStat>> {
        let since = window_start_ns(now_ns, window);
        let rows = sqlx::query_as::<_, SourceStatRow>(
            r#"
            SELECT source, AVG(price) AS average, MIN(price) AS min, MAX(price) AS max
            FROM price_history
            WHERE item_id = ? AND recorded_at >= ? AND price > 0
            GROUP BY source
            ORDER BY source
            "#,
        )
        .bind(item_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<WindowedStat> {
                Ok(WindowedStat {
                    source: r.source.parse()?,
                    average: finite_or_zero(r.average),
                    min: finite_or_zero(r.min),
                    max: finite_or_zero(r.max),
                })
            })
            .collect()
    }

    /// Compares each item's average on the UTC day containing `now_ns` against
    /// its average on the UTC day exactly `window_days` earlier. Items missing
    /// either day are left out; a day whose points average zero still counts.
    pub async fn query_trend(
        &self,
        source: Source,
        window_days: u32,
        limit: usize,
        now_ns: i64,
    ) -> Result<Vec<TrendEntry>> {
        let today = now_ns.div_euclid(NS_PER_DAY);
        let out_of_range =
            || AppError::Validation(format!("trend window of {window_days} days is out of range"));
        let (latest_start, latest_end) = day_bounds(today).ok_or_else(out_of_range)?;
        let (prior_start, prior_end) = today
            .checked_sub(i64::from(window_days))
            .and_then(day_bounds)
            .ok_or_else(out_of_range)?;

        let rows = sqlx::query_as::<_, TrendRow>(
            r#"
            WITH latest AS (
                SELECT item_id, AVG(price) AS avg_price
                FROM price_history
                WHERE source = ? AND recorded_at >= ? AND recorded_at < ?
                GROUP BY item_id
            ),
            prior AS (
                SELECT item_id, AVG(price) AS avg_price
                FROM price_history
                WHERE source = ? AND recorded_at >= ? AND recorded_at < ?
                GROUP BY item_id
            )
            SELECT i.id AS item_id, i.market_name,
                   l.avg_price AS latest_avg, p.avg_price AS prior_avg
            FROM latest l
            JOIN prior p ON p.item_id = l.item_id
            JOIN items i ON i.id = l.item_id
            "#,
        )
        .bind(source.as_str())
        .bind(latest_start)
        .bind(latest_end)
        .bind(source.as_str())
        .bind(prior_start)
        .bind(prior_end)
        .fetch_all(&self.pool)
        .await?;

        debug!(source = %source, candidates = rows.len(), "trend comparison rows");

        let entries = rows
            .into_iter()
            .map(|r| TrendEntry {
                item_id: r.item_id,
                market_name: r.market_name,
                percent_change: percent_change(r.latest_avg, r.prior_avg),
                latest_average: r.latest_avg,
                prior_average: r.prior_avg,
            })
            .collect();

        Ok(rank_trending(entries, limit))
    }
}

fn validate_price(price: f64) -> Result<()> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(AppError::Validation(format!("price must be positive and finite, got {price}")))
    }
}

/// `[start, end)` in nanoseconds of UTC day number `day`.
fn day_bounds(day: i64) -> Option<(i64, i64)> {
    let start = day.checked_mul(NS_PER_DAY)?;
    Some((start, start.checked_add(NS_PER_DAY)?))
}

fn finite_or_zero(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{days, NS_PER_SEC};

    const REDLINE: &str = "AK-47 | Redline (Field-Tested)";

    /// Noon UTC on some day, far enough from the epoch for 7-day lookbacks.
    const NOW: i64 = 20_000 * NS_PER_DAY + 12 * 3_600 * NS_PER_SEC;

    async fn raw_point(store: &PriceStore, item_id: i64, price: f64, source: &str, at: i64) {
        sqlx::query("INSERT INTO price_history (item_id, price, source, recorded_at) VALUES (?, ?, ?, ?)")
            .bind(item_id)
            .bind(price)
            .bind(source)
            .bind(at)
            .execute(&store.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn register_classifies_and_rejects_duplicates() {
        let store = PriceStore::in_memory().await;
        let item = store.register_item(REDLINE).await.unwrap();
        assert_eq!(item.weapon, "AK-47");
        assert_eq!(item.wear, "Field-Tested");
        assert_eq!(item.item_type, "weapon");

        let dup = store.register_item(REDLINE).await;
        assert!(matches!(dup, Err(AppError::Validation(_))));

        let listed = store.list_tracked_items().await.unwrap();
        assert_eq!(listed, vec![ItemRef { id: item.id, market_name: REDLINE.to_string() }]);
    }

    #[tokio::test]
    async fn append_rejects_non_positive_and_non_finite() {
        let store = PriceStore::in_memory().await;
        let item = store.register_item(REDLINE).await.unwrap();

        for bad in [0.0, -1.5, f64::NAN, f64::INFINITY] {
            let res = store.append_price_point(item.id, bad, None, Source::Buff, NOW).await;
            assert!(matches!(res, Err(AppError::Validation(_))), "price {bad} accepted");
        }
        let history = store.price_history(item.id, 0, None).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn projection_update_rejects_zero_and_leaves_row_unchanged() {
        let store = PriceStore::in_memory().await;
        let item = store.register_item(REDLINE).await.unwrap();
        store.update_current_price(item.id, Source::Buff, 10.50, Some(3)).await.unwrap();

        let res = store.update_current_price(item.id, Source::Buff, 0.0, None).await;
        assert!(matches!(res, Err(AppError::Validation(_))));

        let row = store.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(row.buff_price, Some(10.50));
        assert_eq!(row.volume, Some(3));
    }

    #[tokio::test]
    async fn projection_is_per_source_and_keeps_volume() {
        let store = PriceStore::in_memory().await;
        let item = store.register_item(REDLINE).await.unwrap();
        store.update_current_price(item.id, Source::Steam, 12.0, Some(40)).await.unwrap();
        store.update_current_price(item.id, Source::Buff, 11.0, None).await.unwrap();

        let row = store.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(row.steam_price, Some(12.0));
        assert_eq!(row.buff_price, Some(11.0));
        assert_eq!(row.volume, Some(40));
    }

    #[tokio::test]
    async fn projection_for_missing_item_is_not_found() {
        let store = PriceStore::in_memory().await;
        let res = store.update_current_price(99, Source::Buff, 1.0, None).await;
        assert!(matches!(res, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn history_filters_by_source_and_orders_newest_first() {
        let store = PriceStore::in_memory().await;
        let item = store.register_item(REDLINE).await.unwrap();
        store.append_price_point(item.id, 10.0, None, Source::Buff, NOW - 10).await.unwrap();
        store.append_price_point(item.id, 11.0, Some(5), Source::Buff, NOW).await.unwrap();
        store.append_price_point(item.id, 12.0, None, Source::Steam, NOW - 5).await.unwrap();

        let buff = store.price_history(item.id, 0, Some(Source::Buff)).await.unwrap();
        let prices: Vec<f64> = buff.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![11.0, 10.0]);
        assert_eq!(buff[0].volume, Some(5));

        let all = store.price_history(item.id, NOW - 5, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn windowed_stats_over_empty_window_are_zero() {
        let store = PriceStore::in_memory().await;
        let stat = store.query_windowed_stats(Source::Buff, days(7), NOW).await.unwrap();
        assert_eq!(stat, WindowedStat::empty(Source::Buff));
    }

    #[tokio::test]
    async fn windowed_stats_ignore_zero_points() {
        let store = PriceStore::in_memory().await;
        let item = store.register_item(REDLINE).await.unwrap();
        raw_point(&store, item.id, 0.0, "buff", NOW - NS_PER_DAY).await;
        raw_point(&store, item.id, 0.0, "buff", NOW - 2 * NS_PER_DAY).await;

        let stat = store.query_windowed_stats(Source::Buff, days(7), NOW).await.unwrap();
        assert_eq!((stat.average, stat.min, stat.max), (0.0, 0.0, 0.0));

        raw_point(&store, item.id, 10.0, "buff", NOW - NS_PER_DAY).await;
        raw_point(&store, item.id, 14.0, "buff", NOW - 3 * NS_PER_DAY).await;
        // Outside the window.
        raw_point(&store, item.id, 100.0, "buff", NOW - 8 * NS_PER_DAY).await;
        // Other source.
        raw_point(&store, item.id, 1.0, "steam", NOW).await;

        let stat = store.query_windowed_stats(Source::Buff, days(7), NOW).await.unwrap();
        assert!((stat.average - 12.0).abs() < 1e-9);
        assert_eq!(stat.min, 10.0);
        assert_eq!(stat.max, 14.0);
    }

    #[tokio::test]
    async fn item_stats_group_by_source() {
        let store = PriceStore::in_memory().await;
        let item = store.register_item(REDLINE).await.unwrap();
        store.append_price_point(item.id, 10.0, None, Source::Buff, NOW).await.unwrap();
        store.append_price_point(item.id, 20.0, None, Source::Buff, NOW).await.unwrap();
        store.append_price_point(item.id, 30.0, None, Source::Steam, NOW).await.unwrap();

        let stats = store.item_windowed_stats(item.id, days(7), NOW).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].source, Source::Buff);
        assert!((stats[0].average - 15.0).abs() < 1e-9);
        assert_eq!(stats[1].source, Source::Steam);
        assert_eq!(stats[1].max, 30.0);
    }

    #[tokio::test]
    async fn item_stats_surface_unknown_source_tags() {
        let store = PriceStore::in_memory().await;
        let item = store.register_item(REDLINE).await.unwrap();
        raw_point(&store, item.id, 5.0, "csfloat", NOW).await;

        let res = store.item_windowed_stats(item.id, days(7), NOW).await;
        assert!(matches!(res, Err(AppError::UnknownSource(_))));
    }

    #[tokio::test]
    async fn trend_compares_exact_days_and_excludes_missing_sides() {
        let store = PriceStore::in_memory().await;
        let rising = store.register_item(REDLINE).await.unwrap();
        let flat_zero = store.register_item("AWP | Asiimov (Field-Tested)").await.unwrap();
        let no_prior = store.register_item("Operation Bravo Case").await.unwrap();
        let off_by_one = store.register_item("M4A4 | Howl (Minimal Wear)").await.unwrap();

        let week_ago = NOW - 7 * NS_PER_DAY;
        raw_point(&store, rising.id, 10.0, "buff", week_ago).await;
        raw_point(&store, rising.id, 11.0, "buff", NOW).await;
        raw_point(&store, rising.id, 13.0, "buff", NOW - 3_600 * NS_PER_SEC).await;

        raw_point(&store, flat_zero.id, 0.0, "buff", week_ago).await;
        raw_point(&store, flat_zero.id, 25.0, "buff", NOW).await;

        raw_point(&store, no_prior.id, 2.0, "buff", NOW).await;

        raw_point(&store, off_by_one.id, 100.0, "buff", NOW - 6 * NS_PER_DAY).await;
        raw_point(&store, off_by_one.id, 120.0, "buff", NOW).await;

        let trend = store.query_trend(Source::Buff, 7, 10, NOW).await.unwrap();
        let names: Vec<&str> = trend.iter().map(|t| t.market_name.as_str()).collect();
        assert_eq!(names, vec![REDLINE, "AWP | Asiimov (Field-Tested)"]);

        assert!((trend[0].percent_change - 20.0).abs() < 1e-9);
        assert_eq!(trend[1].percent_change, 0.0);
        assert_eq!(trend[1].prior_average, 0.0);
    }

    #[tokio::test]
    async fn trend_window_beyond_representable_days_is_rejected() {
        let store = PriceStore::in_memory().await;
        let item = store.register_item(REDLINE).await.unwrap();
        raw_point(&store, item.id, 11.0, "buff", NOW).await;

        let res = store.query_trend(Source::Buff, 200_000, 10, NOW).await;
        assert!(matches!(res, Err(AppError::Validation(_))));

        let res = store.query_trend(Source::Buff, u32::MAX, 10, now_ns()).await;
        assert!(matches!(res, Err(AppError::Validation(_))));

        // Far back but representable: simply nothing to compare.
        let trend = store.query_trend(Source::Buff, 50_000, 10, NOW).await.unwrap();
        assert!(trend.is_empty());
    }

    #[tokio::test]
    async fn items_by_type_are_filtered_newest_first() {
        let store = PriceStore::in_memory().await;
        let ak = store.register_item(REDLINE).await.unwrap();
        store.register_item("★ Karambit | Doppler (Factory New)").await.unwrap();
        let awp = store.register_item("AWP | Asiimov (Field-Tested)").await.unwrap();

        let weapons = store.list_items_by_type(ItemType::Weapon, 100).await.unwrap();
        let ids: Vec<i64> = weapons.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![awp.id, ak.id]);

        let knives = store.list_items_by_type(ItemType::Knife, 100).await.unwrap();
        assert_eq!(knives.len(), 1);
        assert_eq!(knives[0].item_type, "knife");

        let limited = store.list_items_by_type(ItemType::Weapon, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}
