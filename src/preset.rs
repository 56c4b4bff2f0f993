//! Per user column presets.
//!
//! A [`PresetManager`] reconciles the column list stored on the API with the
//! column schema the dashboard currently ships, and mediates every write of
//! that list back to the API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::auth::{Credential, CredentialProvider};
use crate::columns::visible_or_default;
use crate::domain::DieselError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetId(pub i64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PresetId>,
    #[serde(rename = "user_id")]
    pub owner_id: i64,
    pub entity_name: String,
    pub visible_columns: Vec<String>,
}

/// Remote storage of presets. One preset per (user, entity) is kept by the
/// backend.
#[async_trait]
pub trait PresetService: Send + Sync {
    async fn fetch_preset(
        &self,
        user_id: i64,
        entity_name: &str,
        credential: &Credential,
    ) -> Result<Option<Preset>, DieselError>;

    async fn create_preset(
        &self,
        preset: &Preset,
        credential: &Credential,
    ) -> Result<Preset, DieselError>;

    async fn update_preset(
        &self,
        id: PresetId,
        preset: &Preset,
        credential: &Credential,
    ) -> Result<Preset, DieselError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PresetState {
    Unloaded,
    Loading,
    LoadedDefault,
    LoadedWithPreset,
}

#[derive(Debug)]
struct PresetInner {
    state: PresetState,
    entity_name: String,
    default_columns: Vec<String>,
    available_columns: Vec<String>,
    current: Option<Preset>,
    visible: Vec<String>,
}

pub struct PresetManager {
    service: Arc<dyn PresetService>,
    credentials: Arc<dyn CredentialProvider>,
    inner: RwLock<PresetInner>,
    save_guard: Mutex<()>,
}

impl PresetManager {
    pub fn new(service: Arc<dyn PresetService>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            service,
            credentials,
            inner: RwLock::new(PresetInner {
                state: PresetState::Unloaded,
                entity_name: String::new(),
                default_columns: Vec::new(),
                available_columns: Vec::new(),
                current: None,
                visible: Vec::new(),
            }),
            save_guard: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> PresetState {
        self.inner.read().await.state
    }

    pub async fn visible_columns(&self) -> Vec<String> {
        self.inner.read().await.visible.clone()
    }

    /// Resolves the visible columns for `entity_name`.
    ///
    /// Never fails: without a credential, without a stored preset or when the
    /// API cannot be reached the defaults are returned.
    pub async fn load(
        &self,
        entity_name: &str,
        default_columns: &[String],
        available_columns: &[String],
    ) -> Vec<String> {
        {
            let mut inner = self.inner.write().await;
            inner.state = PresetState::Loading;
            inner.entity_name = entity_name.to_string();
            inner.default_columns = default_columns.to_vec();
            inner.available_columns = available_columns.to_vec();
            inner.current = None;
        }

        let fetched = match self.credentials.credential() {
            None => {
                debug!("Not authenticated, using default columns for {entity_name}");
                None
            }
            Some(credential) => match self
                .service
                .fetch_preset(credential.user_id, entity_name, &credential)
                .await
            {
                Ok(preset) => preset,
                Err(e) => {
                    warn!("Could not fetch column preset for {entity_name}: {e}");
                    None
                }
            },
        };

        let mut inner = self.inner.write().await;
        match fetched {
            Some(preset) => {
                inner.visible = visible_or_default(
                    &preset.visible_columns,
                    available_columns,
                    default_columns,
                );
                trace!("Preset {:?} resolved to {:?}", preset, inner.visible);
                inner.current = Some(preset);
                inner.state = PresetState::LoadedWithPreset;
            }
            None => {
                inner.visible = default_columns.to_vec();
                inner.state = PresetState::LoadedDefault;
            }
        }
        inner.visible.clone()
    }

    fn is_loaded(state: PresetState) -> bool {
        matches!(
            state,
            PresetState::LoadedDefault | PresetState::LoadedWithPreset
        )
    }

    /// Persists `columns` as the preset of the loaded entity. The first save
    /// creates the preset, later ones update it. A preset that vanished on
    /// the server is created again.
    pub async fn save(&self, columns: Vec<String>) -> Result<Preset, DieselError> {
        let _guard = self
            .save_guard
            .try_lock()
            .map_err(|_| DieselError::SaveInFlight)?;
        let credential = self
            .credentials
            .credential()
            .ok_or(DieselError::Unauthenticated)?;

        let (existing, record) = {
            let inner = self.inner.read().await;
            if !Self::is_loaded(inner.state) {
                return Err(DieselError::NotLoaded);
            }
            let record = Preset {
                id: None,
                owner_id: credential.user_id,
                entity_name: inner.entity_name.clone(),
                visible_columns: columns,
            };
            (inner.current.as_ref().and_then(|p| p.id), record)
        };

        let saved = match existing {
            Some(id) => {
                debug!("Updating preset {id:?} for {}", record.entity_name);
                match self.service.update_preset(id, &record, &credential).await {
                    Err(e) if e.is_not_found() => {
                        warn!("Preset {id:?} is gone, creating a new one");
                        self.inner.write().await.current = None;
                        self.service.create_preset(&record, &credential).await?
                    }
                    result => result?,
                }
            }
            None => {
                debug!("Creating preset for {}", record.entity_name);
                self.service.create_preset(&record, &credential).await?
            }
        };

        let mut inner = self.inner.write().await;
        inner.visible = visible_or_default(
            &saved.visible_columns,
            &inner.available_columns,
            &inner.default_columns,
        );
        inner.current = Some(saved.clone());
        inner.state = PresetState::LoadedWithPreset;
        info!(
            "Saved {} visible columns for {}",
            inner.visible.len(),
            inner.entity_name
        );
        Ok(saved)
    }

    /// Goes back to the default columns. A stored preset is overwritten when
    /// possible, failures to do so are only logged.
    pub async fn reset_to_default(&self) -> Vec<String> {
        let (defaults, has_preset) = {
            let mut inner = self.inner.write().await;
            if !Self::is_loaded(inner.state) {
                debug!("Ignoring column reset before the preset is loaded");
                return inner.visible.clone();
            }
            inner.visible = inner.default_columns.clone();
            (inner.default_columns.clone(), inner.current.is_some())
        };
        if has_preset && let Err(e) = self.save(defaults.clone()).await {
            warn!("Could not persist column reset: {e}");
        }
        self.visible_columns().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCredentials;
    use crate::testing::{GatedPresets, InMemoryPresets, keys};

    fn manager(service: &Arc<InMemoryPresets>, authenticated: bool) -> PresetManager {
        let credentials = if authenticated {
            StaticCredentials::new(7, "token")
        } else {
            StaticCredentials::default()
        };
        PresetManager::new(service.clone(), Arc::new(credentials))
    }

    fn stored(columns: &[&str]) -> Preset {
        Preset {
            id: Some(PresetId(11)),
            owner_id: 7,
            entity_name: "clientes".into(),
            visible_columns: keys(columns),
        }
    }

    #[tokio::test]
    async fn missing_preset_yields_defaults() {
        let service = Arc::new(InMemoryPresets::default());
        let presets = manager(&service, true);
        assert_eq!(presets.state().await, PresetState::Unloaded);

        let visible = presets
            .load(
                "clientes",
                &keys(&["id", "nome", "actions"]),
                &keys(&["id", "nome", "created_at", "actions"]),
            )
            .await;
        assert_eq!(visible, keys(&["id", "nome", "actions"]));
        assert_eq!(presets.state().await, PresetState::LoadedDefault);
        assert_eq!(service.fetches(), 1);
    }

    #[tokio::test]
    async fn stored_preset_is_filtered_against_schema() {
        let service = Arc::new(InMemoryPresets::default());
        service.insert(stored(&["id", "nome", "telefone"]));
        let presets = manager(&service, true);

        let visible = presets
            .load(
                "clientes",
                &keys(&["id", "actions"]),
                &keys(&["id", "nome", "actions"]),
            )
            .await;
        assert_eq!(visible, keys(&["id", "nome"]));
        assert_eq!(presets.state().await, PresetState::LoadedWithPreset);
    }

    #[tokio::test]
    async fn fully_stale_preset_falls_back_but_is_updated_later() {
        let service = Arc::new(InMemoryPresets::default());
        service.insert(stored(&["telefone"]));
        let presets = manager(&service, true);

        let defaults = keys(&["id", "actions"]);
        let visible = presets
            .load("clientes", &defaults, &keys(&["id", "nome", "actions"]))
            .await;
        assert_eq!(visible, defaults);

        presets.save(keys(&["id", "nome"])).await.unwrap();
        assert_eq!(service.creates(), 0);
        assert_eq!(service.updates(), 1);
    }

    #[tokio::test]
    async fn anonymous_load_makes_no_calls() {
        let service = Arc::new(InMemoryPresets::default());
        let presets = manager(&service, false);
        let defaults = keys(&["id", "nome"]);

        let visible = presets
            .load("clientes", &defaults, &keys(&["id", "nome", "email"]))
            .await;
        assert_eq!(visible, defaults);
        assert_eq!(service.fetches(), 0);
        assert_eq!(presets.state().await, PresetState::LoadedDefault);
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_defaults() {
        let service = Arc::new(InMemoryPresets::default());
        service.insert(stored(&["id", "nome"]));
        service.fail_next_fetch();
        let presets = manager(&service, true);

        let defaults = keys(&["id", "actions"]);
        let visible = presets
            .load("clientes", &defaults, &keys(&["id", "nome", "actions"]))
            .await;
        assert_eq!(visible, defaults);
        assert_eq!(presets.state().await, PresetState::LoadedDefault);
    }

    #[tokio::test]
    async fn first_save_creates_then_updates() {
        let service = Arc::new(InMemoryPresets::default());
        let presets = manager(&service, true);
        let available = keys(&["id", "nome", "email", "actions"]);
        presets
            .load("clientes", &keys(&["id", "nome"]), &available)
            .await;

        let first = presets.save(keys(&["id", "email"])).await.unwrap();
        assert!(first.id.is_some());
        assert_eq!(presets.state().await, PresetState::LoadedWithPreset);

        let second = presets.save(keys(&["nome"])).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(service.creates(), 1);
        assert_eq!(service.updates(), 1);
        assert_eq!(presets.visible_columns().await, keys(&["nome"]));
        assert_eq!(service.stored("clientes").unwrap().visible_columns, keys(&["nome"]));
    }

    #[tokio::test]
    async fn save_requires_credential() {
        let service = Arc::new(InMemoryPresets::default());
        let presets = manager(&service, false);
        presets
            .load("clientes", &keys(&["id"]), &keys(&["id", "nome"]))
            .await;

        let err = presets.save(keys(&["nome"])).await.unwrap_err();
        assert!(matches!(err, DieselError::Unauthenticated));
        assert_eq!(service.creates(), 0);
    }

    #[tokio::test]
    async fn failed_save_keeps_state() {
        let service = Arc::new(InMemoryPresets::default());
        let presets = manager(&service, true);
        presets
            .load("clientes", &keys(&["id", "nome"]), &keys(&["id", "nome", "email"]))
            .await;

        service.fail_next_write();
        let err = presets.save(keys(&["email"])).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(presets.visible_columns().await, keys(&["id", "nome"]));
        assert_eq!(presets.state().await, PresetState::LoadedDefault);
        assert!(presets.inner.read().await.current.is_none());
    }

    #[tokio::test]
    async fn concurrent_save_is_rejected() {
        let service = Arc::new(InMemoryPresets::default());
        let presets = manager(&service, true);
        presets
            .load("clientes", &keys(&["id"]), &keys(&["id", "nome"]))
            .await;

        let _held = presets.save_guard.lock().await;
        let err = presets.save(keys(&["nome"])).await.unwrap_err();
        assert!(matches!(err, DieselError::SaveInFlight));
    }

    #[tokio::test]
    async fn reset_without_preset_stays_local() {
        let service = Arc::new(InMemoryPresets::default());
        let presets = manager(&service, true);
        let defaults = keys(&["id", "nome"]);
        presets
            .load("clientes", &defaults, &keys(&["id", "nome", "email"]))
            .await;

        assert_eq!(presets.reset_to_default().await, defaults);
        assert_eq!(service.creates() + service.updates(), 0);
    }

    #[tokio::test]
    async fn reset_with_preset_persists_and_swallows_failure() {
        let service = Arc::new(InMemoryPresets::default());
        service.insert(stored(&["email"]));
        let presets = manager(&service, true);
        let defaults = keys(&["id", "nome"]);
        presets
            .load("clientes", &defaults, &keys(&["id", "nome", "email"]))
            .await;

        service.fail_next_write();
        assert_eq!(presets.reset_to_default().await, defaults);
        assert_eq!(service.stored("clientes").unwrap().visible_columns, keys(&["email"]));

        assert_eq!(presets.reset_to_default().await, defaults);
        assert_eq!(service.stored("clientes").unwrap().visible_columns, defaults);
    }

    #[tokio::test]
    async fn writes_wait_for_the_load() {
        let service = Arc::new(InMemoryPresets::default());
        service.insert(stored(&["email"]));
        let gated = Arc::new(GatedPresets::new(service.clone()));
        let presets = Arc::new(PresetManager::new(
            gated.clone(),
            Arc::new(StaticCredentials::new(7, "token")),
        ));

        let err = presets.save(keys(&["id"])).await.unwrap_err();
        assert!(matches!(err, DieselError::NotLoaded));

        let loading = {
            let presets = Arc::clone(&presets);
            tokio::spawn(async move {
                presets
                    .load("clientes", &keys(&["id", "nome"]), &keys(&["id", "nome", "email"]))
                    .await
            })
        };
        while presets.state().await != PresetState::Loading {
            tokio::task::yield_now().await;
        }

        let err = presets.save(keys(&["id"])).await.unwrap_err();
        assert!(matches!(err, DieselError::NotLoaded));
        assert!(presets.reset_to_default().await.is_empty());
        assert_eq!(service.creates() + service.updates(), 0);

        gated.open();
        assert_eq!(loading.await.unwrap(), keys(&["email"]));
        presets.save(keys(&["id"])).await.unwrap();
        assert_eq!(service.creates(), 0);
        assert_eq!(service.updates(), 1);
    }

    #[tokio::test]
    async fn vanished_preset_is_created_again() {
        let service = Arc::new(InMemoryPresets::default());
        service.insert(stored(&["email"]));
        let presets = manager(&service, true);
        presets
            .load("clientes", &keys(&["id"]), &keys(&["id", "nome", "email"]))
            .await;

        service.remove("clientes");
        let saved = presets.save(keys(&["nome"])).await.unwrap();
        assert_eq!(saved.id, Some(PresetId(100)));
        assert_eq!(service.creates(), 1);
        assert_eq!(service.updates(), 0);

        presets.save(keys(&["id", "nome"])).await.unwrap();
        assert_eq!(service.updates(), 1);
        assert_eq!(
            service.stored("clientes").unwrap().visible_columns,
            keys(&["id", "nome"])
        );
    }
}
