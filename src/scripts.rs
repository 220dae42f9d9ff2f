//! Server-side scripts and the digest table used to invoke them.
//!
//! Each script runs atomically on the server against exactly one key. The
//! sources ship with the crate and are registered once per process; after
//! that they are invoked by their server-assigned SHA-1 digest.
//!
//! Ref: <https://redis.io/docs/latest/commands/eval/>

use std::collections::HashMap;

use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{Error, Result};

pub(crate) const BEST: &str = "best";
pub(crate) const RANGESCORE: &str = "rangescore";
pub(crate) const AROUND: &str = "around";
pub(crate) const KEEPTOP: &str = "keeptop";

const NAMES: [&str; 4] = [BEST, RANGESCORE, AROUND, KEEPTOP];

fn source(name: &str) -> &'static str {
    match name {
        BEST => include_str!("scripts/best.lua"),
        RANGESCORE => include_str!("scripts/rangescore.lua"),
        AROUND => include_str!("scripts/around.lua"),
        KEEPTOP => include_str!("scripts/keeptop.lua"),
        name => unreachable!("unknown script {name}"),
    }
}

/// Loads the shipped scripts once and resolves script names to digests.
#[derive(Default)]
pub(crate) struct ScriptHost {
    digests: OnceCell<HashMap<&'static str, String>>,
}

impl ScriptHost {
    /// Register every shipped script with the server and record its digest.
    ///
    /// Idempotent and single-flight: concurrent callers share one load, and
    /// the table is read-only once initialized.
    pub(crate) async fn prepare(&self, session: &mut ConnectionManager) -> Result<()> {
        self.table(session).await.map(|_| ())
    }

    /// Digest for a script name, loading the scripts on first use.
    pub(crate) async fn sha(&self, session: &mut ConnectionManager, name: &str) -> Result<String> {
        let table = self.table(session).await?;

        table
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Protocol(format!("no digest recorded for script {name:?}")))
    }

    async fn table(
        &self,
        session: &mut ConnectionManager,
    ) -> Result<&HashMap<&'static str, String>> {
        self.digests
            .get_or_try_init(move || async move {
                let mut digests = HashMap::new();

                for name in NAMES {
                    let sha: String = redis::cmd("SCRIPT")
                        .arg("LOAD")
                        .arg(source(name))
                        .query_async(session)
                        .await?;

                    debug!(script = name, sha = %sha, "registered script");
                    digests.insert(name, sha);
                }

                Ok(digests)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_ship_with_the_crate() {
        for name in NAMES {
            assert!(!source(name).is_empty());
        }
    }

    #[test]
    fn sources_touch_the_expected_primitives() {
        assert!(source(BEST).contains("ZADD"));
        assert!(source(RANGESCORE).contains("ZRANGEBYSCORE"));
        assert!(source(AROUND).contains("ZCARD"));
        assert!(source(KEEPTOP).contains("ZREMRANGEBYRANK"));
    }
}
