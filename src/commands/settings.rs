use anyhow::{anyhow, Result};
use tracing::info;

use crate::backend::remote::RemoteBackend;
use crate::models::{BackendKind, Settings};
use crate::services::crypto::CryptoService;
use crate::services::state::{load_settings, AppState};

#[derive(Debug, Default)]
pub struct SettingsPayload {
    pub backend: Option<BackendKind>,
    pub remote_url: Option<String>,
    pub remote_api_key: Option<String>,
    pub default_company_name: Option<String>,
    pub currency_symbol: Option<String>,
}

pub fn get_settings(state: &AppState) -> Result<Settings> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock"))?;
    Ok(load_settings(&db))
}

/// Stores the given fields and switches the live backend. A backend that
/// cannot be built leaves the previous backend selection in place.
pub fn save_settings(payload: SettingsPayload, state: &AppState) -> Result<Settings> {
    let previous = get_settings(state)?;
    {
        let db = state.db.lock().map_err(|_| anyhow!("DB lock"))?;

        if let Some(value) = payload.backend {
            db.set_setting("backend", &value.to_string())?;
        }
        if let Some(value) = payload.remote_url.as_deref().map(str::trim) {
            db.set_setting("remote_url", value.trim_end_matches('/'))?;
        }
        if let Some(value) = payload.default_company_name.as_deref().map(str::trim) {
            if !value.is_empty() {
                db.set_setting("default_company_name", value)?;
            }
        }
        if let Some(value) = payload.currency_symbol.as_deref().map(str::trim) {
            if !value.is_empty() {
                db.set_setting("currency_symbol", value)?;
            }
        }
        if let Some(api_key) = payload.remote_api_key.as_deref() {
            if !api_key.trim().is_empty() {
                let encrypted = CryptoService::encrypt_secret("remote_api_key", api_key.trim())?;
                db.set_setting("remote_api_key", &encrypted)?;
            }
        }
    }

    let settings = get_settings(state)?;
    if let Err(err) = state.update_settings(settings.clone()) {
        let db = state.db.lock().map_err(|_| anyhow!("DB lock"))?;
        db.set_setting("backend", &previous.backend.to_string())?;
        return Err(err);
    }
    info!(backend = %settings.backend, "settings saved");
    Ok(settings)
}

/// Whether the remote backend answers with the given URL and key.
pub async fn test_connection(url: &str, api_key: &str) -> Result<bool> {
    let client = RemoteBackend::new(url, api_key);
    client
        .ping()
        .await
        .map_err(|e| anyhow!("Connection failed: {}", e))
}
