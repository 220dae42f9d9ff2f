use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Transport-layer failure: the server could not be reached, the socket
    /// timed out, or the connection dropped mid-command.
    #[error("connection failure: {0}")]
    Connection(redis::RedisError),

    /// The server replied with something the client cannot interpret: an
    /// unexpected script reply shape, a non-numeric value in a numeric slot,
    /// or a server-side error that is not a transport problem.
    #[error("protocol error; {0}")]
    Protocol(String),

    /// A decoded score does not fit in the leaderboard's declared 32-bit
    /// integer type.
    #[error("score {0} is outside the 32-bit integer range")]
    Overflow(f64),
}

impl Error {
    /// Connection-class failures are the only errors worth retrying.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Error {
        let transport = err.is_io_error()
            || err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal();

        if transport {
            Error::Connection(err)
        } else {
            Error::Protocol(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_classify_as_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = Error::from(redis::RedisError::from(io));

        assert!(err.is_connection());
    }

    #[test]
    fn response_errors_classify_as_protocol() {
        let redis_err = redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "unexpected reply",
        ));
        let err = Error::from(redis_err);

        assert!(!err.is_connection());
        assert!(matches!(err, Error::Protocol(_)));
    }
}
