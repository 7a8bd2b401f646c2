use dashmap::DashMap;
use image::DynamicImage;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::{MediaSource, Result};

/// In-memory registry of loaded media sources. Metadata is immutable once
/// registered; reloads replace the whole record.
pub struct MediaLibrary {
    sources: DashMap<String, Arc<MediaSource>>,
}

impl MediaLibrary {
    pub fn new() -> Self {
        Self {
            sources: DashMap::new(),
        }
    }

    pub fn insert(&self, source: MediaSource) {
        self.sources.insert(source.id.clone(), Arc::new(source));
    }

    pub fn get(&self, id: &str) -> Option<Arc<MediaSource>> {
        self.sources.get(id).map(|s| Arc::clone(&s))
    }

    pub fn remove(&self, id: &str) -> Option<Arc<MediaSource>> {
        self.sources.remove(id).map(|(_, s)| s)
    }

    pub fn list(&self) -> Vec<Arc<MediaSource>> {
        let mut all: Vec<Arc<MediaSource>> =
            self.sources.iter().map(|s| Arc::clone(&s)).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

impl Default for MediaLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads pre-extracted frame files with a small LRU of decoded images.
/// Frame files are 1-based and zero-padded: frame index 0 -> `000001.<ext>`.
pub struct FrameStore {
    cache: Mutex<LruCache<(String, u64), Arc<DynamicImage>>>,
}

impl FrameStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn frame_path(media: &MediaSource, index: u64) -> PathBuf {
        media
            .frames_dir
            .join(format!("{:06}.{}", index + 1, media.frame_ext))
    }

    /// Load one frame. A missing file is `Ok(None)` — the caller drops the
    /// frame and keeps pacing. Decode failures are real errors.
    pub fn load(&self, media: &MediaSource, index: u64) -> Result<Option<Arc<DynamicImage>>> {
        let key = (media.id.clone(), index);
        if let Some(hit) = self.cache.lock().unwrap().get(&key) {
            return Ok(Some(Arc::clone(hit)));
        }

        let path = Self::frame_path(media, index);
        if !path.exists() {
            return Ok(None);
        }

        let img = Arc::new(image::open(&path)?);
        self.cache.lock().unwrap().put(key, Arc::clone(&img));
        Ok(Some(img))
    }
}
