pub mod codec;
pub mod connection;
pub mod entry;
pub mod error;
pub mod leaderboard;
pub mod options;
pub mod periodic;
mod pipeline;
mod scripts;

pub use codec::{Score, ScoreType};
pub use connection::Connection;
pub use entry::{Entry, EntryUpdate};
pub use error::{Error, Result};
pub use leaderboard::{ExportStream, Leaderboard};
pub use options::{LeaderboardOptions, SortPolicy, UpdatePolicy};
pub use periodic::{Cycle, PeriodicLeaderboard, PeriodicOptions};
