use anyhow::{anyhow, Result};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::models::{Session, User};
use crate::services::state::AppState;

pub async fn sign_up(email: &str, password: &str, state: &AppState) -> Result<User> {
    let backend = state.backend()?;
    let user = backend.auth.sign_up(email, password).await?;
    info!(user_id = %user.id, "account created");
    Ok(user)
}

/// Signs in and remembers the session for later invocations. A previously
/// remembered session is ended first.
pub async fn sign_in(email: &str, password: &str, state: &AppState) -> Result<Session> {
    let backend = state.backend()?;
    let previous = state.stored_session().unwrap_or_else(|err| {
        warn!(error = %err, "stored session unreadable");
        None
    });
    let session = backend.auth.sign_in(email, password).await?;
    if let Some(previous) = previous {
        end_session(&backend, &previous).await;
    }
    state.remember_session(&session)?;
    Ok(session)
}

async fn end_session(backend: &Backend, session: &Session) {
    match backend.auth.sign_out(session).await {
        Ok(()) => debug!(user_id = %session.user.id, "previous session ended"),
        Err(err) => warn!(error = %err, "previous session could not be ended"),
    }
}

/// Ends the session on the backend and forgets it locally. The local copy is
/// dropped even when the backend call fails.
pub async fn sign_out(session: &Session, state: &AppState) -> Result<()> {
    let backend = state.backend()?;
    let result = backend.auth.sign_out(session).await;
    state.forget_session()?;
    if let Err(err) = &result {
        warn!(error = %err, "backend sign-out failed");
    }
    Ok(result?)
}

pub async fn current_user(session: &Session, state: &AppState) -> Result<User> {
    let backend = state.backend()?;
    backend
        .auth
        .current_user(session)
        .await?
        .ok_or_else(|| anyhow!("Session expired. Sign in again."))
}
