use serde::Deserialize;

use crate::error::{Error, Result};

/// Per-request and per-run annotation ceilings of one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UploadLimit {
    pub batch_size: usize,
    pub total_cap: usize,
}

impl UploadLimit {
    pub const GITHUB: UploadLimit = UploadLimit::new(50, 1000);
    pub const BITBUCKET_SERVER: UploadLimit = UploadLimit::new(1000, 1000);
    pub const BITBUCKET_CLOUD: UploadLimit = UploadLimit::new(100, 1000);
    pub const REVIEW_COMMENTS: UploadLimit = UploadLimit::new(50, 50);

    pub const fn new(batch_size: usize, total_cap: usize) -> Self {
        Self {
            batch_size,
            total_cap,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::configuration("upload batch_size must be positive"));
        }
        Ok(())
    }
}

/// Keeps at most `total_cap` items and splits them into ordered chunks of
/// at most `batch_size`. Items past the cap are dropped.
pub fn batch<T>(items: Vec<T>, limit: UploadLimit) -> Vec<Vec<T>> {
    let size = limit.batch_size.max(1);
    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(size.min(items.len()));

    for item in items.into_iter().take(limit.total_cap) {
        current.push(item);
        if current.len() == size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
