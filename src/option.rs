use std::time::Duration;

/// Tuning for a [`crate::merge::MergeRegistry`].
#[derive(Debug, Clone, Default)]
pub struct MergeOption {
    pub(crate) fetch_timeout: Option<Duration>,
}

impl MergeOption {
    /// Bound every fetch (priming and refill) by `fetch_timeout`. A fetch that
    /// runs over retires its source as failed.
    pub fn fetch_timeout(self, fetch_timeout: Duration) -> Self {
        MergeOption {
            fetch_timeout: Some(fetch_timeout),
        }
    }
}
