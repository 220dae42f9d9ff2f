/// Global ordering of a leaderboard.
///
/// The member with rank 1 has the greatest score under `HighToLow` and the
/// smallest under `LowToHigh`. Ties share a score and are ordered by the
/// store's lexicographic order on member ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPolicy {
    HighToLow,
    LowToHigh,
}

impl SortPolicy {
    /// Direction token passed to the server-side scripts.
    pub(crate) fn direction(self) -> &'static str {
        match self {
            SortPolicy::HighToLow => "desc",
            SortPolicy::LowToHigh => "asc",
        }
    }
}

/// Per-write mutation semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Unconditionally overwrite the stored score.
    Replace,
    /// Add the value to the stored score, creating the member at the value
    /// if absent.
    Aggregate,
    /// Keep whichever of the stored and new score ranks better under the
    /// leaderboard's sort policy.
    Best,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderboardOptions {
    pub sort_policy: SortPolicy,
    /// Default policy for updates that do not override it per call.
    pub update_policy: UpdatePolicy,
    /// Cap on the number of stored members. Zero or negative means
    /// unlimited.
    pub limit_top_n: i32,
}

impl Default for LeaderboardOptions {
    fn default() -> Self {
        LeaderboardOptions {
            sort_policy: SortPolicy::HighToLow,
            update_policy: UpdatePolicy::Replace,
            limit_top_n: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = LeaderboardOptions::default();

        assert_eq!(options.sort_policy, SortPolicy::HighToLow);
        assert_eq!(options.update_policy, UpdatePolicy::Replace);
        assert_eq!(options.limit_top_n, 0);
    }

    #[test]
    fn script_direction_tokens() {
        assert_eq!(SortPolicy::HighToLow.direction(), "desc");
        assert_eq!(SortPolicy::LowToHigh.direction(), "asc");
    }
}
