use redis::aio::ConnectionManager;

use crate::error::Result;

/// A batch of commands issued to the server in one round trip.
///
/// Commands are queued in order and flushed together; nothing is awaited
/// per command. The reply list has one position per queued command, in
/// submission order. A failure of the batch surfaces as a single error.
pub(crate) struct PipelineBatch {
    pipe: redis::Pipeline,
    queued: usize,
}

impl PipelineBatch {
    pub(crate) fn new() -> PipelineBatch {
        PipelineBatch {
            pipe: redis::pipe(),
            queued: 0,
        }
    }

    pub(crate) fn push(&mut self, cmd: redis::Cmd) {
        self.pipe.add_command(cmd);
        self.queued += 1;
    }

    pub(crate) fn len(&self) -> usize {
        self.queued
    }

    pub(crate) async fn flush(self, session: &mut ConnectionManager) -> Result<Vec<redis::Value>> {
        if self.queued == 0 {
            return Ok(Vec::new());
        }

        let values: Vec<redis::Value> = self.pipe.query_async(session).await?;
        Ok(values)
    }
}
