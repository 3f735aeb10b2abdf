use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use crate::{ClickData, CoreError, ShortCode, ShortUrl, UrlRepository};

/// Simple in-memory repository for tests and the memory storage mode. Not
/// thread-safe for high concurrency beyond the internal mutex guarding the
/// map.
pub struct InMemoryRepo {
    inner: Mutex<BTreeMap<String, ShortUrl>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    fn key(code: &ShortCode) -> String {
        code.as_str().to_string()
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlRepository for InMemoryRepo {
    fn get(&self, code: &ShortCode) -> Result<Option<ShortUrl>, CoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(map.get(&Self::key(code)).cloned())
    }

    fn insert(&self, url: ShortUrl) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let key = Self::key(&url.short_code);
        if map.contains_key(&key) {
            return Err(CoreError::AlreadyExists);
        }
        map.insert(key, url);
        Ok(())
    }

    fn record_click(&self, code: &ShortCode, click: ClickData) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        match map.get_mut(&Self::key(code)) {
            Some(url) => {
                url.record_click(click);
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }

    fn list(&self, limit: usize) -> Result<Vec<ShortUrl>, CoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(map.values().take(limit).cloned().collect())
    }

    fn delete(&self, code: &ShortCode) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        match map.remove(&Self::key(code)) {
            Some(_) => Ok(()),
            None => Err(CoreError::NotFound),
        }
    }

    fn existing_codes(&self) -> Result<HashSet<String>, CoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(map.keys().cloned().collect())
    }
}
