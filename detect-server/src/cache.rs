//! In-memory result cache
//!
//! Process-lifetime store for processed images, keyed by result id.
//! No TTL, no eviction, no persistence; entries live until the process
//! exits. Constructed once at startup and handed to handlers through
//! application state so tests can run against isolated instances.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::ProcessedImage;

#[derive(Clone, Default)]
pub struct ResultCache {
    inner: Arc<RwLock<HashMap<String, ProcessedImage>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a processed image under its id. Overwriting the same id is
    /// last-writer-wins; ids are freshly generated per request so a
    /// collision is not reachable in practice.
    pub fn put(&self, image: ProcessedImage) -> ProcessedImage {
        self.inner.write().insert(image.id.clone(), image.clone());
        image
    }

    /// Absence is a value here, never an error.
    pub fn get(&self, id: &str) -> Option<ProcessedImage> {
        self.inner.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
