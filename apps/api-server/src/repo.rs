//! Synced repository: the canonical in-memory short URL collection bound to
//! one storage slot, reconciled against writes from other contexts.
//!
//! The whole collection lives under a single key as one serialized value.
//! Uniqueness is re-checked against the reconciled collection at write time;
//! beyond that, cross-context races resolve last-write-wins at the storage
//! layer.

use std::collections::HashSet;
use std::sync::Arc;

use domain::{ClickData, CoreError, ShortCode, ShortUrl, UrlRepository};
use state_sync::{ChangeHub, SlotStore, SyncError, SyncedState};

/// Storage key for the short URL collection.
pub const LINKS_SLOT_KEY: &str = "linklet.urls";

pub struct SyncedRepo {
    state: SyncedState<Vec<ShortUrl>>,
}

impl SyncedRepo {
    pub fn new(store: Arc<dyn SlotStore>, hub: ChangeHub) -> Result<Self, SyncError> {
        Ok(Self {
            state: SyncedState::new(store, hub, LINKS_SLOT_KEY, Vec::new())?,
        })
    }
}

fn map_sync(e: SyncError) -> CoreError {
    CoreError::Repository(e.to_string())
}

impl UrlRepository for SyncedRepo {
    fn get(&self, code: &ShortCode) -> Result<Option<ShortUrl>, CoreError> {
        Ok(self
            .state
            .read()
            .into_iter()
            .find(|u| u.short_code == *code))
    }

    fn insert(&self, url: ShortUrl) -> Result<(), CoreError> {
        let mut duplicate = false;
        self.state
            .update(|urls| {
                if urls.iter().any(|u| u.short_code == url.short_code) {
                    duplicate = true;
                    return urls.clone();
                }
                let mut next = urls.clone();
                next.push(url.clone());
                next
            })
            .map_err(map_sync)?;
        if duplicate {
            return Err(CoreError::AlreadyExists);
        }
        Ok(())
    }

    fn record_click(&self, code: &ShortCode, click: ClickData) -> Result<(), CoreError> {
        let mut found = false;
        self.state
            .update(|urls| {
                let mut next = urls.clone();
                if let Some(url) = next.iter_mut().find(|u| u.short_code == *code) {
                    found = true;
                    url.record_click(click.clone());
                }
                next
            })
            .map_err(map_sync)?;
        if !found {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<ShortUrl>, CoreError> {
        let mut urls = self.state.read();
        urls.truncate(limit);
        Ok(urls)
    }

    fn delete(&self, code: &ShortCode) -> Result<(), CoreError> {
        let mut found = false;
        self.state
            .update(|urls| {
                let next: Vec<ShortUrl> = urls
                    .iter()
                    .filter(|u| u.short_code != *code)
                    .cloned()
                    .collect();
                found = next.len() != urls.len();
                next
            })
            .map_err(map_sync)?;
        if !found {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    fn existing_codes(&self) -> Result<HashSet<String>, CoreError> {
        Ok(self
            .state
            .read()
            .iter()
            .map(|u| u.short_code.as_str().to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use state_sync::MemorySlotStore;
    use std::time::SystemTime;

    fn mk_url(code: &str) -> ShortUrl {
        ShortUrl::new(
            "https://example.com".to_string(),
            ShortCode::new(code).expect("valid code"),
            format!("https://sho.rt/{code}"),
            30,
            None,
            SystemTime::UNIX_EPOCH,
        )
    }

    fn shared_pair() -> (SyncedRepo, SyncedRepo) {
        let store: Arc<dyn SlotStore> = Arc::new(MemorySlotStore::new());
        let hub = ChangeHub::new();
        let a = SyncedRepo::new(store.clone(), hub.clone()).expect("repo a");
        let b = SyncedRepo::new(store, hub).expect("repo b");
        (a, b)
    }

    #[test]
    fn insert_in_one_context_is_visible_in_the_other() {
        let (a, b) = shared_pair();
        a.insert(mk_url("abc123")).expect("inserted");
        let got = b
            .get(&ShortCode::new("abc123").expect("valid"))
            .expect("get")
            .expect("visible");
        assert_eq!(got.original_url, "https://example.com");
    }

    #[test]
    fn duplicate_insert_across_contexts_is_rejected() {
        let (a, b) = shared_pair();
        a.insert(mk_url("abc123")).expect("inserted");
        let err = b.insert(mk_url("abc123")).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
    }

    #[test]
    fn clicks_recorded_in_one_context_aggregate_in_the_other() {
        let (a, b) = shared_pair();
        let code = ShortCode::new("abc123").expect("valid");
        a.insert(mk_url("abc123")).expect("inserted");
        b.record_click(
            &code,
            ClickData::new(
                SystemTime::UNIX_EPOCH,
                "direct".to_string(),
                "unknown".to_string(),
                None,
                None,
            ),
        )
        .expect("recorded");
        let got = a.get(&code).expect("get").expect("present");
        assert_eq!(got.click_count, 1);
    }

    #[test]
    fn delete_missing_is_not_found() {
        let (a, _b) = shared_pair();
        let err = a
            .delete(&ShortCode::new("missing1").expect("valid"))
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }
}
