use std::time::Duration;

use tracing::warn;

use crate::codec::{self, Score, ScoreType};
use crate::connection::Connection;
use crate::entry::{Entry, EntryUpdate};
use crate::error::{Error, Result};
use crate::options::{LeaderboardOptions, SortPolicy, UpdatePolicy};
use crate::pipeline::PipelineBatch;
use crate::scripts;

/// Update attempts before a connection-class failure is surfaced.
const UPDATE_ATTEMPTS: u32 = 3;

/// A ranked set of identified members under a single store key.
///
/// The instance owns no state beyond its configuration; all mutable state
/// lives in the store under `key`. Cloning shares the underlying
/// [`Connection`], so clones are interchangeable handles to the same
/// leaderboard.
#[derive(Clone)]
pub struct Leaderboard {
    conn: Connection,
    key: String,
    score_type: ScoreType,
    options: LeaderboardOptions,
}

impl Leaderboard {
    pub fn new(
        conn: Connection,
        key: impl Into<String>,
        score_type: ScoreType,
        options: LeaderboardOptions,
    ) -> Leaderboard {
        Leaderboard {
            conn,
            key: key.into(),
            score_type,
            options,
        }
    }

    /// The store key this leaderboard occupies.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> LeaderboardOptions {
        self.options
    }

    /// 1-based rank of `id` under the sort policy, or `None` if absent.
    pub async fn rank(&self, id: &str) -> Result<Option<u64>> {
        let mut session = self.conn.session().await?;

        let rank: Option<i64> = redis::cmd(self.rank_command())
            .arg(&self.key)
            .arg(id)
            .query_async(&mut session)
            .await?;

        Ok(rank.map(|rank| rank as u64 + 1))
    }

    /// Combined score and rank lookup for one member.
    ///
    /// Absent members yield `Ok(None)`; no rank query is issued for them.
    pub async fn find(&self, id: &str) -> Result<Option<Entry>> {
        let mut session = self.conn.session().await?;

        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(&self.key)
            .arg(id)
            .query_async(&mut session)
            .await?;

        let Some(score) = score else {
            return Ok(None);
        };

        let rank: Option<i64> = redis::cmd(self.rank_command())
            .arg(&self.key)
            .arg(id)
            .query_async(&mut session)
            .await?;

        let Some(rank) = rank else {
            return Ok(None);
        };

        Ok(Some(Entry {
            id: id.to_string(),
            score: codec::decode(self.score_type, score)?,
            rank: rank as u64 + 1,
        }))
    }

    /// The entry holding 1-based `rank`, or `None` for out-of-range ranks.
    ///
    /// Ranks at or below zero resolve to `None` without touching the store.
    pub async fn at(&self, rank: i64) -> Result<Option<Entry>> {
        if rank <= 0 {
            return Ok(None);
        }

        let entries = self.list(rank as u64, rank as u64).await?;
        Ok(entries.into_iter().next())
    }

    /// Apply one update under the options' update policy.
    pub async fn update_one(&self, id: &str, value: impl Into<Score>) -> Result<Option<Score>> {
        self.update_one_with(id, value, self.options.update_policy)
            .await
    }

    /// Apply one update under an explicit policy.
    pub async fn update_one_with(
        &self,
        id: &str,
        value: impl Into<Score>,
        policy: UpdatePolicy,
    ) -> Result<Option<Score>> {
        let entries = [EntryUpdate::new(id, value)];
        let mut results = self.update_with(&entries, policy).await?;
        Ok(results.pop().flatten())
    }

    /// Apply a batch of updates under the options' update policy.
    pub async fn update(&self, entries: &[EntryUpdate]) -> Result<Vec<Option<Score>>> {
        self.update_with(entries, self.options.update_policy).await
    }

    /// Apply a batch of updates under an explicit policy.
    ///
    /// The batch is queued on one pipeline and flushed in a single round
    /// trip; when `limit_top_n` is active a trim command rides the same
    /// pipeline. Each returned position carries the member's stored score
    /// after the update, or `None` when the store's reply for that position
    /// was not numeric.
    ///
    /// Connection-class failures are retried with exponential backoff; each
    /// retry re-reads the cardinality and re-queues the whole batch. The
    /// cardinality read is not atomic with respect to other writers, so the
    /// cap can briefly be exceeded under concurrent load; later updates
    /// converge the state.
    pub async fn update_with(
        &self,
        entries: &[EntryUpdate],
        policy: UpdatePolicy,
    ) -> Result<Vec<Option<Score>>> {
        let mut attempt = 1;

        loop {
            match self.try_update(entries, policy).await {
                Err(err) if err.is_connection() && attempt < UPDATE_ATTEMPTS => {
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    warn!(
                        attempt,
                        max_attempts = UPDATE_ATTEMPTS,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "retrying leaderboard update"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_update(
        &self,
        entries: &[EntryUpdate],
        policy: UpdatePolicy,
    ) -> Result<Vec<Option<Score>>> {
        let mut session = self.conn.session().await?;

        let limit = i64::from(self.options.limit_top_n);
        let mut cardinality: i64 = 0;
        if limit > 0 {
            cardinality = redis::cmd("ZCARD")
                .arg(&self.key)
                .query_async(&mut session)
                .await?;
        }

        let mut batch = PipelineBatch::new();
        match policy {
            UpdatePolicy::Replace => {
                for entry in entries {
                    let mut cmd = redis::cmd("ZADD");
                    cmd.arg(&self.key).arg(codec::encode(entry.value)).arg(&entry.id);
                    batch.push(cmd);
                }
            }
            UpdatePolicy::Aggregate => {
                for entry in entries {
                    let mut cmd = redis::cmd("ZINCRBY");
                    cmd.arg(&self.key).arg(codec::encode(entry.value)).arg(&entry.id);
                    batch.push(cmd);
                }
            }
            UpdatePolicy::Best => {
                let sha = self.conn.script_sha(scripts::BEST).await?;
                for entry in entries {
                    let mut cmd = redis::cmd("EVALSHA");
                    cmd.arg(&sha)
                        .arg(1)
                        .arg(&self.key)
                        .arg(codec::encode(entry.value))
                        .arg(&entry.id)
                        .arg(self.options.sort_policy.direction());
                    batch.push(cmd);
                }
            }
        }

        let incoming = batch.len() as i64;
        if limit > 0 && cardinality + incoming > limit {
            let mut cmd = redis::cmd("ZREMRANGEBYRANK");
            match self.options.sort_policy {
                // Low scores sit at the low ranks of the native ascending
                // order; drop enough of them to land on the cap.
                SortPolicy::HighToLow => {
                    cmd.arg(&self.key).arg(0).arg(cardinality + incoming - limit - 1);
                }
                SortPolicy::LowToHigh => {
                    cmd.arg(&self.key).arg(limit).arg(-1);
                }
            }
            batch.push(cmd);
        }

        let replies = batch.flush(&mut session).await?;

        // The trim reply, if any, trails the per-entry replies and is
        // discarded by the zip.
        entries
            .iter()
            .zip(replies)
            .map(|(entry, reply)| match policy {
                // ZADD replies with an insertion count, not a score; the
                // stored score after an unconditional set is the written
                // value itself.
                UpdatePolicy::Replace => {
                    codec::decode(self.score_type, codec::encode(entry.value)).map(Some)
                }
                _ => match numeric_reply(&reply) {
                    Some(raw) => codec::decode(self.score_type, raw).map(Some),
                    None => Ok(None),
                },
            })
            .collect()
    }

    /// Remove the given members. Absent ids are a no-op.
    pub async fn remove(&self, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut session = self.conn.session().await?;

        redis::cmd("ZREM")
            .arg(&self.key)
            .arg(ids)
            .query_async::<_, ()>(&mut session)
            .await?;

        Ok(())
    }

    /// Drop the leaderboard's key entirely.
    pub async fn clear(&self) -> Result<()> {
        let mut session = self.conn.session().await?;

        redis::cmd("DEL")
            .arg(&self.key)
            .query_async::<_, ()>(&mut session)
            .await?;

        Ok(())
    }

    /// Entries between 1-based ranks `lower` and `upper`, inclusive.
    ///
    /// Bounds below 1 are clamped to 1. Ranks in the result are filled
    /// sequentially from the effective lower bound.
    pub async fn list(&self, lower: u64, upper: u64) -> Result<Vec<Entry>> {
        let lower = lower.max(1);
        let upper = upper.max(1);

        let mut session = self.conn.session().await?;

        let rows: Vec<(String, f64)> = redis::cmd(self.range_command())
            .arg(&self.key)
            .arg(lower - 1)
            .arg(upper - 1)
            .arg("WITHSCORES")
            .query_async(&mut session)
            .await?;

        self.entries_from(lower, rows)
    }

    /// Entries whose scores fall in `[min, max]`, in sort-policy order.
    ///
    /// Backed by a server-side script so the listed window and the rank of
    /// its first member come from one atomic execution.
    pub async fn list_by_score(&self, min: f64, max: f64) -> Result<Vec<Entry>> {
        let sha = self.conn.script_sha(scripts::RANGESCORE).await?;
        let mut session = self.conn.session().await?;

        let reply: redis::Value = redis::cmd("EVALSHA")
            .arg(&sha)
            .arg(1)
            .arg(&self.key)
            .arg(min)
            .arg(max)
            .arg(self.options.sort_policy.direction())
            .query_async(&mut session)
            .await?;

        let (base, pairs) = parse_window_reply(reply)?;
        if base < 0 {
            return Ok(Vec::new());
        }

        self.entries_from(base as u64 + 1, pairs)
    }

    /// The first `n` entries.
    pub async fn top(&self, n: u64) -> Result<Vec<Entry>> {
        self.list(1, n).await
    }

    /// The last `n` entries, worst-ranked first.
    pub async fn bottom(&self, n: u64) -> Result<Vec<Entry>> {
        let mut session = self.conn.session().await?;

        let count: i64 = redis::cmd("ZCARD")
            .arg(&self.key)
            .query_async(&mut session)
            .await?;

        let n = n.max(1) as i64;
        let rows: Vec<(String, f64)> = redis::cmd(self.range_command())
            .arg(&self.key)
            .arg(-n)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async(&mut session)
            .await?;

        let first_rank = (count as u64).saturating_sub(rows.len() as u64) + 1;
        let mut entries = self.entries_from(first_rank, rows)?;
        entries.reverse();
        Ok(entries)
    }

    /// Entries in the rank window around `id`.
    ///
    /// The window spans `distance` ranks on either side of the member.
    /// With `fill_borders` each side is clipped independently at its
    /// border; without it a window clipped at the low border shrinks the
    /// high side as well, staying symmetric around the member. An absent
    /// member yields an empty list.
    pub async fn around(&self, id: &str, distance: u64, fill_borders: bool) -> Result<Vec<Entry>> {
        let sha = self.conn.script_sha(scripts::AROUND).await?;
        let mut session = self.conn.session().await?;

        let reply: redis::Value = redis::cmd("EVALSHA")
            .arg(&sha)
            .arg(1)
            .arg(&self.key)
            .arg(id)
            .arg(distance)
            .arg(if fill_borders { "true" } else { "false" })
            .arg(self.options.sort_policy.direction())
            .query_async(&mut session)
            .await?;

        let (base, pairs) = parse_window_reply(reply)?;
        if base < 0 {
            return Ok(Vec::new());
        }

        self.entries_from(base as u64 + 1, pairs)
    }

    /// Trim the leaderboard to its best `n` members.
    pub async fn keep_top(&self, n: u64) -> Result<()> {
        let sha = self.conn.script_sha(scripts::KEEPTOP).await?;
        let mut session = self.conn.session().await?;

        let _: redis::Value = redis::cmd("EVALSHA")
            .arg(&sha)
            .arg(1)
            .arg(&self.key)
            .arg(n)
            .query_async(&mut session)
            .await?;

        Ok(())
    }

    /// Lazily walk every entry in rank order, `batch_size` entries at a
    /// time.
    ///
    /// The walk is not restartable and not safe against concurrent
    /// mutation of the leaderboard.
    pub fn export_stream(&self, batch_size: u64) -> ExportStream<'_> {
        ExportStream {
            leaderboard: self,
            batch_size: batch_size.max(1),
            cursor: 1,
            done: false,
        }
    }

    /// Number of members under the key.
    pub async fn count(&self) -> Result<u64> {
        let mut session = self.conn.session().await?;

        let count: u64 = redis::cmd("ZCARD")
            .arg(&self.key)
            .query_async(&mut session)
            .await?;

        Ok(count)
    }

    fn rank_command(&self) -> &'static str {
        match self.options.sort_policy {
            SortPolicy::HighToLow => "ZREVRANK",
            SortPolicy::LowToHigh => "ZRANK",
        }
    }

    fn range_command(&self) -> &'static str {
        match self.options.sort_policy {
            SortPolicy::HighToLow => "ZREVRANGE",
            SortPolicy::LowToHigh => "ZRANGE",
        }
    }

    fn entries_from(&self, first_rank: u64, rows: Vec<(String, f64)>) -> Result<Vec<Entry>> {
        rows.into_iter()
            .enumerate()
            .map(|(offset, (id, score))| {
                Ok(Entry {
                    id,
                    score: codec::decode(self.score_type, score)?,
                    rank: first_rank + offset as u64,
                })
            })
            .collect()
    }
}

/// Batched walk over a leaderboard, produced by
/// [`Leaderboard::export_stream`].
pub struct ExportStream<'a> {
    leaderboard: &'a Leaderboard,
    batch_size: u64,
    cursor: u64,
    done: bool,
}

impl ExportStream<'_> {
    /// Fetch the next batch, or `None` once the leaderboard is exhausted.
    ///
    /// A short batch marks the end of the walk; a trailing empty batch is
    /// swallowed rather than yielded.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Entry>>> {
        if self.done {
            return Ok(None);
        }

        let upper = self.cursor + self.batch_size - 1;
        let entries = self.leaderboard.list(self.cursor, upper).await?;

        if (entries.len() as u64) < self.batch_size {
            self.done = true;
            if entries.is_empty() {
                return Ok(None);
            }
        }

        self.cursor += self.batch_size;
        Ok(Some(entries))
    }
}

/// Interpret a script window reply: `(base rank, flat member/score pairs)`.
fn parse_window_reply(reply: redis::Value) -> Result<(i64, Vec<(String, f64)>)> {
    let shape_error = || Error::Protocol("script returned an unexpected reply shape".to_string());

    let redis::Value::Bulk(items) = reply else {
        return Err(shape_error());
    };

    let mut items = items.into_iter();
    let (base, flat) = match (items.next(), items.next()) {
        (Some(redis::Value::Int(base)), Some(redis::Value::Bulk(flat))) => (base, flat),
        _ => return Err(shape_error()),
    };

    if flat.len() % 2 != 0 {
        return Err(shape_error());
    }

    let mut pairs = Vec::with_capacity(flat.len() / 2);
    let mut flat = flat.into_iter();
    while let (Some(id), Some(score)) = (flat.next(), flat.next()) {
        let id = reply_string(id)?;
        let score = reply_string(score)?
            .parse::<f64>()
            .map_err(|_| shape_error())?;
        pairs.push((id, score));
    }

    Ok((base, pairs))
}

fn reply_string(value: redis::Value) -> Result<String> {
    match value {
        redis::Value::Data(bytes) => String::from_utf8(bytes)
            .map_err(|_| Error::Protocol("script returned a non-UTF-8 member".to_string())),
        redis::Value::Status(s) => Ok(s),
        _ => Err(Error::Protocol(
            "script returned an unexpected reply shape".to_string(),
        )),
    }
}

/// The numeric carried by a reply position, if any.
fn numeric_reply(value: &redis::Value) -> Option<f64> {
    match value {
        redis::Value::Int(i) => Some(*i as f64),
        redis::Value::Data(bytes) => std::str::from_utf8(bytes).ok()?.parse().ok(),
        redis::Value::Status(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::Value;

    fn data(s: &str) -> Value {
        Value::Data(s.as_bytes().to_vec())
    }

    #[test]
    fn parse_window_reply_pairs() {
        let reply = Value::Bulk(vec![
            Value::Int(4),
            Value::Bulk(vec![
                data("alice"),
                data("200"),
                data("bob"),
                data("150.5"),
            ]),
        ]);

        let (base, pairs) = parse_window_reply(reply).unwrap();

        assert_eq!(base, 4);
        assert_eq!(
            pairs,
            vec![("alice".to_string(), 200.0), ("bob".to_string(), 150.5)]
        );
    }

    #[test]
    fn parse_window_reply_empty_marker() {
        let reply = Value::Bulk(vec![Value::Int(-1), Value::Bulk(vec![])]);

        let (base, pairs) = parse_window_reply(reply).unwrap();

        assert_eq!(base, -1);
        assert!(pairs.is_empty());
    }

    #[test]
    fn parse_window_reply_rejects_odd_pairs() {
        let reply = Value::Bulk(vec![Value::Int(0), Value::Bulk(vec![data("alice")])]);

        assert!(matches!(
            parse_window_reply(reply),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn parse_window_reply_rejects_wrong_shape() {
        assert!(matches!(
            parse_window_reply(Value::Int(3)),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            parse_window_reply(Value::Bulk(vec![Value::Int(1)])),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            parse_window_reply(Value::Bulk(vec![
                data("nope"),
                Value::Bulk(vec![]),
            ])),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn numeric_reply_variants() {
        assert_eq!(numeric_reply(&Value::Int(42)), Some(42.0));
        assert_eq!(numeric_reply(&data("3.5")), Some(3.5));
        assert_eq!(numeric_reply(&Value::Status("7".to_string())), Some(7.0));
        assert_eq!(numeric_reply(&Value::Nil), None);
        assert_eq!(numeric_reply(&data("not-a-number")), None);
    }
}
