use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::info;

use crate::models::{Profile, ProfileUpdate, Session};
use crate::services::state::AppState;
use crate::utils::{non_empty, now};

pub const SIGNATURE_BUCKET: &str = "signatures";

/// The stored profile, or a blank one carrying the configured company name.
pub async fn get_profile(session: &Session, state: &AppState) -> Result<Profile> {
    let backend = state.backend()?;
    if let Some(profile) = backend.profiles.get_profile(session, &session.user.id).await? {
        return Ok(profile);
    }
    let settings = state.settings()?;
    let timestamp = now();
    Ok(Profile {
        id: session.user.id.clone(),
        full_name: None,
        company_name: settings.default_company_name,
        company_address: None,
        gstin: None,
        signature_url: None,
        created_at: timestamp,
        updated_at: timestamp,
    })
}

pub async fn save_profile(update: ProfileUpdate, session: &Session, state: &AppState) -> Result<Profile> {
    let mut profile = get_profile(session, state).await?;
    apply_update(&mut profile, update);
    profile.updated_at = now();

    let backend = state.backend()?;
    let saved = backend.profiles.upsert_profile(session, &profile).await?;
    info!(user_id = %saved.id, "profile saved");
    Ok(saved)
}

/// Uploads a signature image and points the profile at its public URL.
pub async fn upload_signature(path: &Path, session: &Session, state: &AppState) -> Result<Profile> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| anyhow!("Signature file needs an extension"))?;
    let content_type = image_content_type(&extension)
        .ok_or_else(|| anyhow!("Unsupported signature image type: {}", extension))?;
    let bytes = std::fs::read(path).with_context(|| format!("Reading {}", path.display()))?;

    let object_path = signature_object_path(&session.user.id, &extension);
    let backend = state.backend()?;
    backend
        .storage
        .upload(session, SIGNATURE_BUCKET, &object_path, content_type, bytes)
        .await?;
    let url = backend.storage.public_url(SIGNATURE_BUCKET, &object_path);

    save_profile(
        ProfileUpdate {
            signature_url: Some(url),
            ..ProfileUpdate::default()
        },
        session,
        state,
    )
    .await
}

pub fn signature_object_path(user_id: &str, extension: &str) -> String {
    format!("{}/{}.{}", SIGNATURE_BUCKET, user_id, extension)
}

fn image_content_type(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Only the fields present in the update change. An empty company name is ignored.
fn apply_update(profile: &mut Profile, update: ProfileUpdate) {
    if let Some(value) = update.full_name {
        profile.full_name = non_empty(Some(value));
    }
    if let Some(value) = non_empty(update.company_name) {
        profile.company_name = value;
    }
    if let Some(value) = update.company_address {
        profile.company_address = non_empty(Some(value));
    }
    if let Some(value) = update.gstin {
        profile.gstin = non_empty(Some(value));
    }
    if let Some(value) = update.signature_url {
        profile.signature_url = non_empty(Some(value));
    }
}
