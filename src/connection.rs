use std::sync::Arc;

use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;

use crate::error::Result;
use crate::scripts::ScriptHost;

/// Shared handle to the store backing one or more leaderboards.
///
/// Cloning is cheap; clones share the underlying client, the session it
/// multiplexes commands over, and the script digest table. The first
/// operation dials the server; constructing the handle performs no I/O.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    client: redis::Client,
    session: OnceCell<ConnectionManager>,
    scripts: ScriptHost,
}

impl Connection {
    /// Parse a store URL, e.g. `redis://127.0.0.1:6379/`.
    pub fn open(url: &str) -> Result<Connection> {
        let client = redis::Client::open(url).map_err(crate::Error::from)?;
        Ok(Connection::new(client))
    }

    pub fn new(client: redis::Client) -> Connection {
        Connection {
            inner: Arc::new(Inner {
                client,
                session: OnceCell::new(),
                scripts: ScriptHost::default(),
            }),
        }
    }

    /// Eagerly register the server-side scripts.
    ///
    /// Optional: the first script-backed operation triggers the same load.
    /// Safe to call repeatedly and from concurrent tasks.
    pub async fn prepare(&self) -> Result<()> {
        let mut session = self.session().await?;
        self.inner.scripts.prepare(&mut session).await
    }

    /// Borrow a session for a scoped unit of work.
    ///
    /// The session multiplexes commands over one reconnecting server
    /// connection; each borrow is a cheap clone of that handle.
    pub(crate) async fn session(&self) -> Result<ConnectionManager> {
        let client = &self.inner.client;
        let session = self
            .inner
            .session
            .get_or_try_init(|| async move {
                client
                    .get_connection_manager()
                    .await
                    .map_err(crate::Error::from)
            })
            .await?;

        Ok(session.clone())
    }

    pub(crate) async fn script_sha(&self, name: &str) -> Result<String> {
        let mut session = self.session().await?;
        self.inner.scripts.sha(&mut session, name).await
    }
}
