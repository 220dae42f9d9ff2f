use crate::codec::Score;

/// One ranked member of a leaderboard.
///
/// `rank` is 1-based under the leaderboard's sort policy; the store's
/// native 0-based rank is shifted at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: String,
    pub score: Score,
    pub rank: u64,
}

/// A proposed mutation of one member's score.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryUpdate {
    pub id: String,
    pub value: Score,
}

impl EntryUpdate {
    pub fn new(id: impl Into<String>, value: impl Into<Score>) -> EntryUpdate {
        EntryUpdate {
            id: id.into(),
            value: value.into(),
        }
    }
}
