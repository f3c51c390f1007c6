use std::sync::atomic::{AtomicUsize, Ordering};

/// Ordered list of target URLs with a shared round-robin cursor.
///
/// The cursor is a single atomic counter advanced with `fetch_add`, so
/// concurrent dispatches never observe a duplicated or skipped selection.
#[derive(Debug)]
pub struct TargetList {
    urls: Vec<String>,
    cursor: AtomicUsize,
}

impl TargetList {
    pub fn new(urls: Vec<String>) -> anyhow::Result<Self> {
        if urls.is_empty() {
            anyhow::bail!("target list is empty, provide at least one URL");
        }
        Ok(Self {
            urls,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Select the next target, wrapping modulo the list length.
    pub fn next(&self) -> &str {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        &self.urls[idx % self.urls.len()]
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}
