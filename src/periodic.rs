//! Time-cycled families of leaderboards.
//!
//! A periodic leaderboard maps a civil datetime to a cycle key (`y2024-m12`
//! and friends), qualifies it with a base key prefix, and hands out one
//! [`Leaderboard`] per cycle from a bounded per-process cache.

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use lru::LruCache;

use crate::codec::ScoreType;
use crate::connection::Connection;
use crate::error::Result;
use crate::leaderboard::Leaderboard;
use crate::options::LeaderboardOptions;

/// Cached leaderboard instances per periodic leaderboard.
const CACHE_CAPACITY: usize = 100;

/// SCAN page size used for key discovery.
const SCAN_COUNT: u32 = 100;

pub type CycleFn = Box<dyn Fn(NaiveDateTime) -> String + Send + Sync>;
pub type NowFn = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// How a civil datetime maps to a cycle key.
pub enum Cycle {
    Minute,
    Hourly,
    Daily,
    /// ISO-8601 week of the week-based year.
    Weekly,
    Monthly,
    Yearly,
    Custom(CycleFn),
}

impl Cycle {
    pub fn key_for(&self, time: NaiveDateTime) -> String {
        match self {
            Cycle::Yearly => format!("y{}", time.year()),
            Cycle::Monthly => format!("y{}-m{:02}", time.year(), time.month()),
            Cycle::Weekly => format!("w{:04}", time.iso_week().week()),
            Cycle::Daily => {
                format!("y{}-m{:02}-d{:02}", time.year(), time.month(), time.day())
            }
            Cycle::Hourly => format!(
                "y{}-m{:02}-d{:02}-h{:02}",
                time.year(),
                time.month(),
                time.day(),
                time.hour()
            ),
            Cycle::Minute => format!(
                "y{}-m{:02}-d{:02}-h{:02}-m{:02}",
                time.year(),
                time.month(),
                time.day(),
                time.hour(),
                time.minute()
            ),
            Cycle::Custom(cycle) => cycle(time),
        }
    }
}

impl fmt::Debug for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cycle::Minute => "Minute",
            Cycle::Hourly => "Hourly",
            Cycle::Daily => "Daily",
            Cycle::Weekly => "Weekly",
            Cycle::Monthly => "Monthly",
            Cycle::Yearly => "Yearly",
            Cycle::Custom(_) => "Custom(..)",
        };
        f.write_str(name)
    }
}

pub struct PeriodicOptions {
    pub leaderboard: LeaderboardOptions,
    pub cycle: Cycle,
    /// Clock used for `*_now` operations; swap it out in tests.
    pub now: NowFn,
}

impl PeriodicOptions {
    pub fn new(leaderboard: LeaderboardOptions, cycle: Cycle) -> PeriodicOptions {
        PeriodicOptions {
            leaderboard,
            cycle,
            now: Box::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_now(mut self, now: NowFn) -> PeriodicOptions {
        self.now = now;
        self
    }
}

/// A family of leaderboards keyed by time cycle.
///
/// Occupies the store keys `{base_key}:{cycle_key}` and nothing else.
/// Instances are cached per cycle key with least-recently-used eviction;
/// eviction only drops the process-local handle, never store data.
pub struct PeriodicLeaderboard {
    conn: Connection,
    base_key: String,
    score_type: ScoreType,
    options: PeriodicOptions,
    cache: Mutex<LruCache<String, Leaderboard>>,
}

impl PeriodicLeaderboard {
    pub fn new(
        conn: Connection,
        base_key: impl Into<String>,
        score_type: ScoreType,
        options: PeriodicOptions,
    ) -> PeriodicLeaderboard {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap();
        PeriodicLeaderboard {
            conn,
            base_key: base_key.into(),
            score_type,
            options,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cycle key for the given time under the configured cycle.
    pub fn key_for(&self, time: NaiveDateTime) -> String {
        self.options.cycle.key_for(time)
    }

    /// Cycle key for the configured clock's current time.
    pub fn key_now(&self) -> String {
        self.key_for((self.options.now)())
    }

    /// The leaderboard for a cycle key.
    ///
    /// Handles are cached: repeated calls with the same cycle key share one
    /// instance until the cache evicts it as least recently used.
    pub fn leaderboard_for(&self, cycle_key: &str) -> Leaderboard {
        let qualified = format!("{}:{}", self.base_key, cycle_key);

        let mut cache = self.cache.lock().unwrap();
        if let Some(board) = cache.get(&qualified) {
            return board.clone();
        }

        let board = Leaderboard::new(
            self.conn.clone(),
            qualified.clone(),
            self.score_type,
            self.options.leaderboard,
        );
        cache.put(qualified, board.clone());
        board
    }

    /// The leaderboard for the cycle containing `time`; `None` means now.
    pub fn leaderboard_at(&self, time: Option<NaiveDateTime>) -> Leaderboard {
        match time {
            Some(time) => self.leaderboard_for(&self.key_for(time)),
            None => self.leaderboard_now(),
        }
    }

    pub fn leaderboard_now(&self) -> Leaderboard {
        self.leaderboard_for(&self.key_now())
    }

    /// Every cycle key with data in the store.
    ///
    /// Walks the keyspace incrementally with `SCAN {base_key}:*` until the
    /// cursor wraps, deduplicating across pages. Order is unspecified.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/scan/>
    pub async fn existing_keys(&self) -> Result<HashSet<String>> {
        let mut session = self.conn.session().await?;

        let pattern = format!("{}:*", self.base_key);
        let prefix = format!("{}:", self.base_key);

        let mut keys = HashSet::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut session)
                .await?;

            for key in page {
                if let Some(cycle_key) = key.strip_prefix(&prefix) {
                    keys.insert(cycle_key.to_string());
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn predefined_cycle_keys() {
        let time = at(2024, 12, 25, 14, 30, 45);

        assert_eq!(Cycle::Yearly.key_for(time), "y2024");
        assert_eq!(Cycle::Monthly.key_for(time), "y2024-m12");
        assert_eq!(Cycle::Daily.key_for(time), "y2024-m12-d25");
        assert_eq!(Cycle::Hourly.key_for(time), "y2024-m12-d25-h14");
        assert_eq!(Cycle::Minute.key_for(time), "y2024-m12-d25-h14-m30");
    }

    #[test]
    fn weekly_uses_iso_week_of_week_based_year() {
        assert_eq!(Cycle::Weekly.key_for(at(2024, 7, 1, 0, 0, 0)), "w0027");
        // 2024-12-30 belongs to week 1 of ISO year 2025.
        assert_eq!(Cycle::Weekly.key_for(at(2024, 12, 30, 0, 0, 0)), "w0001");
    }

    #[test]
    fn single_digit_fields_are_zero_padded() {
        let time = at(2025, 3, 5, 7, 9, 0);

        assert_eq!(Cycle::Minute.key_for(time), "y2025-m03-d05-h07-m09");
    }

    #[test]
    fn custom_cycle_function() {
        let cycle = Cycle::Custom(Box::new(|time| format!("q{}", (time.month() - 1) / 3 + 1)));

        assert_eq!(cycle.key_for(at(2024, 2, 1, 0, 0, 0)), "q1");
        assert_eq!(cycle.key_for(at(2024, 11, 1, 0, 0, 0)), "q4");
    }

    fn periodic(cycle: Cycle) -> PeriodicLeaderboard {
        // Parsing the URL performs no I/O, so no server is needed here.
        let conn = Connection::open("redis://127.0.0.1:6379/").unwrap();
        PeriodicLeaderboard::new(
            conn,
            "lb:test",
            ScoreType::Int64,
            PeriodicOptions::new(LeaderboardOptions::default(), cycle),
        )
    }

    #[test]
    fn leaderboards_use_qualified_keys() {
        let periodic = periodic(Cycle::Monthly);

        let board = periodic.leaderboard_for("y2024-m12");

        assert_eq!(board.key(), "lb:test:y2024-m12");
    }

    #[test]
    fn cache_reuses_instances_per_cycle_key() {
        let periodic = periodic(Cycle::Daily);

        periodic.leaderboard_for("y2024-m12-d25");
        periodic.leaderboard_for("y2024-m12-d25");

        assert_eq!(periodic.cache.lock().unwrap().len(), 1);
    }

    #[test]
    fn cache_evicts_least_recently_used_beyond_capacity() {
        let periodic = periodic(Cycle::Daily);

        for day in 0..=CACHE_CAPACITY {
            periodic.leaderboard_for(&format!("cycle-{day}"));
        }

        let mut cache = periodic.cache.lock().unwrap();
        assert_eq!(cache.len(), CACHE_CAPACITY);
        // The first inserted key is the eldest and the one discarded.
        assert!(cache.get(&"lb:test:cycle-0".to_string()).is_none());
        assert!(cache.get(&"lb:test:cycle-1".to_string()).is_some());
    }

    #[test]
    fn now_function_drives_current_keys() {
        let conn = Connection::open("redis://127.0.0.1:6379/").unwrap();
        let options = PeriodicOptions::new(LeaderboardOptions::default(), Cycle::Minute)
            .with_now(Box::new(|| at(2024, 12, 25, 14, 30, 45)));
        let periodic = PeriodicLeaderboard::new(conn, "lb:test", ScoreType::Int64, options);

        assert_eq!(periodic.key_now(), "y2024-m12-d25-h14-m30");
        assert_eq!(
            periodic.leaderboard_now().key(),
            "lb:test:y2024-m12-d25-h14-m30"
        );
        assert_eq!(
            periodic.leaderboard_at(None).key(),
            "lb:test:y2024-m12-d25-h14-m30"
        );
        assert_eq!(
            periodic
                .leaderboard_at(Some(at(2023, 1, 2, 3, 4, 5)))
                .key(),
            "lb:test:y2023-m01-d02-h03-m04"
        );
    }
}
