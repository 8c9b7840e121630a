use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::backend::local::LocalBackend;
use crate::backend::remote::RemoteBackend;
use crate::backend::Backend;
use crate::db::Database;
use crate::models::{BackendKind, Session, Settings};
use crate::services::crypto::CryptoService;

const SESSION_KEY: &str = "session";

/// Process-wide handles. Nothing user-specific lives here: the signed-in
/// user travels as an explicit [`Session`].
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub settings: Arc<Mutex<Settings>>,
    backend: Mutex<Backend>,
    data_dir: PathBuf,
}

impl AppState {
    pub fn new(db: Database, settings: Settings, data_dir: PathBuf) -> Result<Self> {
        let db = Arc::new(Mutex::new(db));
        let backend = build_backend(&db, &settings, &data_dir)?;
        Ok(AppState {
            db,
            settings: Arc::new(Mutex::new(settings)),
            backend: Mutex::new(backend),
            data_dir,
        })
    }

    /// State with an explicitly supplied backend, e.g. a test double.
    pub fn with_backend(db: Arc<Mutex<Database>>, settings: Settings, data_dir: PathBuf, backend: Backend) -> Self {
        AppState {
            db,
            settings: Arc::new(Mutex::new(settings)),
            backend: Mutex::new(backend),
            data_dir,
        }
    }

    pub fn backend(&self) -> Result<Backend> {
        Ok(self
            .backend
            .lock()
            .map_err(|_| anyhow!("Backend lock"))?
            .clone())
    }

    pub fn settings(&self) -> Result<Settings> {
        Ok(self
            .settings
            .lock()
            .map_err(|_| anyhow!("Settings lock"))?
            .clone())
    }

    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        let backend = build_backend(&self.db, &settings, &self.data_dir)?;
        {
            let mut locked = self.settings.lock().map_err(|_| anyhow!("Settings lock"))?;
            *locked = settings;
        }
        let mut guard = self.backend.lock().map_err(|_| anyhow!("Backend lock"))?;
        *guard = backend;
        Ok(())
    }

    pub fn remember_session(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session)?;
        let stored = CryptoService::encrypt_secret(SESSION_KEY, &json)?;
        let db = self.db.lock().map_err(|_| anyhow!("DB lock"))?;
        db.set_setting(SESSION_KEY, &stored)?;
        debug!(user_id = %session.user.id, "session stored");
        Ok(())
    }

    pub fn stored_session(&self) -> Result<Option<Session>> {
        let stored = {
            let db = self.db.lock().map_err(|_| anyhow!("DB lock"))?;
            db.get_setting(SESSION_KEY)?
        };
        let Some(stored) = stored else {
            return Ok(None);
        };
        let json = CryptoService::decrypt_secret(&stored).context("Stored session is unreadable")?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    pub fn forget_session(&self) -> Result<()> {
        let db = self.db.lock().map_err(|_| anyhow!("DB lock"))?;
        if let Some(stored) = db.get_setting(SESSION_KEY)? {
            CryptoService::forget_secret(&stored);
        }
        db.delete_setting(SESSION_KEY)?;
        Ok(())
    }

    /// The remembered session, or an error telling the user to sign in.
    pub fn require_session(&self) -> Result<Session> {
        self.stored_session()?
            .ok_or_else(|| anyhow!("Not signed in. Run `billbook auth sign-in` first."))
    }
}

pub fn load_settings(db: &Database) -> Settings {
    let defaults = Settings::default();
    let backend = db
        .get_setting("backend")
        .ok()
        .flatten()
        .and_then(|value| value.parse().ok())
        .unwrap_or(defaults.backend);
    let remote_url = db.get_setting("remote_url").ok().flatten();
    let remote_api_key = db.get_setting("remote_api_key").ok().flatten();
    let default_company_name = db
        .get_setting("default_company_name")
        .ok()
        .flatten()
        .unwrap_or(defaults.default_company_name);
    let currency_symbol = db
        .get_setting("currency_symbol")
        .ok()
        .flatten()
        .unwrap_or(defaults.currency_symbol);
    Settings {
        backend,
        remote_url,
        remote_api_key,
        default_company_name,
        currency_symbol,
    }
}

fn build_backend(db: &Arc<Mutex<Database>>, settings: &Settings, data_dir: &Path) -> Result<Backend> {
    match settings.backend {
        BackendKind::Local => {
            let storage_root = data_dir.join("storage");
            info!(storage = %storage_root.display(), "using local backend");
            Ok(Backend::local(LocalBackend::new(db.clone(), storage_root)))
        }
        BackendKind::Remote => {
            let url = settings
                .remote_url
                .as_deref()
                .ok_or_else(|| anyhow!("Remote backend URL missing"))?;
            let encrypted = settings
                .remote_api_key
                .as_deref()
                .ok_or_else(|| anyhow!("Remote backend API key missing"))?;
            let api_key = CryptoService::decrypt_secret(encrypted)?;
            info!(url, "using remote backend");
            Ok(Backend::remote(RemoteBackend::new(url, &api_key)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_fall_back_to_defaults() {
        let db = Database::open_in_memory().unwrap();
        let settings = load_settings(&db);
        assert_eq!(settings.backend, BackendKind::Local);
        assert_eq!(settings.default_company_name, "GIGEO Enterprises");
        assert_eq!(settings.currency_symbol, "₹");
    }

    #[test]
    fn stored_settings_override_defaults() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting("backend", "remote").unwrap();
        db.set_setting("remote_url", "https://example.test").unwrap();
        db.set_setting("currency_symbol", "Rs.").unwrap();
        let settings = load_settings(&db);
        assert_eq!(settings.backend, BackendKind::Remote);
        assert_eq!(settings.remote_url.as_deref(), Some("https://example.test"));
        assert_eq!(settings.currency_symbol, "Rs.");
    }

    #[test]
    fn remote_backend_requires_url_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let settings = Settings {
            backend: BackendKind::Remote,
            ..Settings::default()
        };
        assert!(AppState::new(db, settings, dir.path().to_path_buf()).is_err());
    }

    #[tokio::test]
    async fn injected_backend_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let backend = Backend::local(LocalBackend::new(db.clone(), dir.path().join("objects")));
        let state = AppState::with_backend(db, Settings::default(), dir.path().to_path_buf(), backend);

        let auth = state.backend().unwrap().auth;
        auth.sign_up("owner@example.com", "hunter22").await.unwrap();
        let session = auth.sign_in("owner@example.com", "hunter22").await.unwrap();
        assert_eq!(session.user.email, "owner@example.com");
    }

    #[test]
    fn missing_session_asks_user_to_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let state = AppState::new(db, Settings::default(), dir.path().to_path_buf()).unwrap();
        let err = state.require_session().unwrap_err();
        assert!(err.to_string().contains("Not signed in"));
    }
}
