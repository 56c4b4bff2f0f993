//! In-memory stand-ins for the API, used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::api::{EntityService, Page, PageQuery};
use crate::auth::Credential;
use crate::domain::DieselError;
use crate::preset::{Preset, PresetId, PresetService};

pub fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[derive(Default)]
pub struct InMemoryPresets {
    inner: Mutex<HashMap<(i64, String), Preset>>,
    next_id: AtomicUsize,
    fetches: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
    fail_fetch: AtomicBool,
    fail_write: AtomicBool,
}

impl InMemoryPresets {
    fn map(&self) -> MutexGuard<'_, HashMap<(i64, String), Preset>> {
        self.inner.lock().expect("mutex poisoned")
    }

    pub fn insert(&self, preset: Preset) {
        self.map()
            .insert((preset.owner_id, preset.entity_name.clone()), preset);
    }

    pub fn remove(&self, entity_name: &str) {
        self.map().retain(|_, p| p.entity_name != entity_name);
    }

    pub fn stored(&self, entity_name: &str) -> Option<Preset> {
        self.map()
            .values()
            .find(|p| p.entity_name == entity_name)
            .cloned()
    }

    pub fn fail_next_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_write(&self) {
        self.fail_write.store(true, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> Result<(), DieselError> {
        if self.fail_write.swap(false, Ordering::SeqCst) {
            return Err(DieselError::Transport("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PresetService for InMemoryPresets {
    async fn fetch_preset(
        &self,
        user_id: i64,
        entity_name: &str,
        _credential: &Credential,
    ) -> Result<Option<Preset>, DieselError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.swap(false, Ordering::SeqCst) {
            return Err(DieselError::Parse("unexpected end of input".into()));
        }
        Ok(self.map().get(&(user_id, entity_name.to_string())).cloned())
    }

    async fn create_preset(
        &self,
        preset: &Preset,
        _credential: &Credential,
    ) -> Result<Preset, DieselError> {
        self.check_write()?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 100;
        let saved = Preset {
            id: Some(PresetId(id)),
            ..preset.clone()
        };
        self.insert(saved.clone());
        Ok(saved)
    }

    async fn update_preset(
        &self,
        id: PresetId,
        preset: &Preset,
        _credential: &Credential,
    ) -> Result<Preset, DieselError> {
        self.check_write()?;
        if !self.map().values().any(|p| p.id == Some(id)) {
            return Err(DieselError::Http {
                status: 404,
                body: format!("preset {} not found", id.0),
            });
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        let saved = Preset {
            id: Some(id),
            ..preset.clone()
        };
        self.insert(saved.clone());
        Ok(saved)
    }
}

/// Holds every preset fetch until [`GatedPresets::open`] is called.
pub struct GatedPresets {
    inner: Arc<InMemoryPresets>,
    gate: Notify,
}

impl GatedPresets {
    pub fn new(inner: Arc<InMemoryPresets>) -> Self {
        Self {
            inner,
            gate: Notify::new(),
        }
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl PresetService for GatedPresets {
    async fn fetch_preset(
        &self,
        user_id: i64,
        entity_name: &str,
        credential: &Credential,
    ) -> Result<Option<Preset>, DieselError> {
        self.gate.notified().await;
        self.inner
            .fetch_preset(user_id, entity_name, credential)
            .await
    }

    async fn create_preset(
        &self,
        preset: &Preset,
        credential: &Credential,
    ) -> Result<Preset, DieselError> {
        self.inner.create_preset(preset, credential).await
    }

    async fn update_preset(
        &self,
        id: PresetId,
        preset: &Preset,
        credential: &Credential,
    ) -> Result<Preset, DieselError> {
        self.inner.update_preset(id, preset, credential).await
    }
}

/// Serves `total` generated rows per resource, `per_page` at a time.
pub struct FakeEntities {
    total: usize,
    lists: AtomicUsize,
    last_query: Mutex<Option<PageQuery>>,
    fail: AtomicBool,
}

impl FakeEntities {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            lists: AtomicUsize::new(0),
            last_query: Mutex::new(None),
            fail: AtomicBool::new(false),
        }
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<PageQuery> {
        self.last_query.lock().expect("mutex poisoned").clone()
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntityService for FakeEntities {
    async fn list(
        &self,
        resource: &str,
        query: &PageQuery,
        _credential: &Credential,
    ) -> Result<Page, DieselError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().expect("mutex poisoned") = Some(query.clone());
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(DieselError::Http {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        let per_page = query.per_page.max(1) as usize;
        let start = (query.page.max(1) as usize - 1) * per_page;
        let rows: Vec<Value> = (start..self.total.min(start + per_page))
            .map(|i| {
                json!({
                    "id": i + 1,
                    "nome": format!("{resource} {}", i + 1),
                    "telefone": "(11) 4000-0000",
                })
            })
            .collect();
        Ok(Page {
            rows,
            current_page: query.page,
            total_pages: self.total.div_ceil(per_page).max(1) as u32,
            total: Some(self.total as u64),
        })
    }
}
