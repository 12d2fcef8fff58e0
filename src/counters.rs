use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;

/// Atomic, time-windowed counter and set primitives over Redis
///
/// Every operation that both reads and writes a key runs as one atomic unit
/// (MULTI/EXEC pipeline or a single command), so two concurrent submissions
/// from the same identity can never both observe a stale under-limit count.
#[derive(Clone)]
pub struct CounterStore {
    conn: ConnectionManager,
}

impl CounterStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        tracing::info!("Connecting to counter store...");
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Counter store connection established");
        Ok(Self { conn })
    }

    /// Record an event and return the count inside the trailing window
    ///
    /// Trims entries older than `now - window`, inserts the current instant,
    /// and counts, all in one MULTI/EXEC block. The returned count includes
    /// the event just recorded.
    pub async fn record_and_count(&self, key: &str, window: Duration) -> Result<u64> {
        let mut conn = self.conn.clone();
        let now = chrono::Utc::now();
        let cutoff = now.timestamp() - window.as_secs() as i64;
        let member = window_member(now.timestamp_micros(), rand::random::<u32>());

        let (_removed, _added, count, _ttl_set): (u64, u64, u64, u64) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(cutoff)
            .cmd("ZADD")
            .arg(key)
            .arg(now.timestamp())
            .arg(&member)
            .cmd("ZCARD")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(window.as_secs())
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }

    /// Atomic check-and-set for duplicate detection
    ///
    /// Returns `true` when the key was already marked within its TTL,
    /// `false` when this call created the mark.
    pub async fn seen_or_mark(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(created.is_none())
    }

    /// Increment a decaying counter, refreshing its TTL
    pub async fn increment_decaying(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.conn.clone();
        let (value, _ttl_set): (i64, u64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    /// Current value of a decaying counter (0 once it has expired)
    pub async fn current(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.get(key).await?;
        Ok(value.unwrap_or(0))
    }

    /// Add a member to a persistent block set
    pub async fn add_to_set(&self, set: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.sadd(set, member).await?;
        Ok(())
    }

    /// Exact-match membership test against a block set
    pub async fn set_contains(&self, set: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.sismember(set, member).await?)
    }

    /// Store a value with a TTL (challenge tokens)
    pub async fn put_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    /// Atomically fetch and delete a value (single-use semantics)
    pub async fn take(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }
}

/// Unique sorted-set member for one recorded event
///
/// The score carries the timestamp for trimming; the member itself must be
/// unique or two events in the same second would collapse into one entry and
/// undercount the window.
fn window_member(now_micros: i64, salt: u32) -> String {
    format!("{}-{:08x}", now_micros, salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_member_unique_per_salt() {
        let a = window_member(1_700_000_000_000_000, 1);
        let b = window_member(1_700_000_000_000_000, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_window_member_format() {
        let member = window_member(1_700_000_000_000_000, 0xdeadbeef);
        assert_eq!(member, "1700000000000000-deadbeef");
    }
}
