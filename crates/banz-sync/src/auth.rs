//! # Sessions and Passwords
//!
//! Which store this terminal works for and which employee is operating it.
//!
//! ```text
//! select_store("Banca Socorro") ──► session.store      (no password)
//! login("Ryan", "••••")         ──► session.operator   ("ryan", argon2 verified)
//! logout()                      ──► both cleared
//! current()                     ──► SessionContext { store, operator }
//! ```
//!
//! Both values survive restarts in the local session table. Passwords are
//! only ever stored as argon2 PHC strings.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use std::sync::Arc;
use tracing::{debug, info, warn};

use banz_core::{Employee, SessionContext, Store};
use banz_db::{Database, MirrorKind};

use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::remote::{self, Filter, RemoteStore};

/// Mirror namespace for lists shared by every store.
pub(crate) const SHARED_MIRROR: &str = "*";

// =============================================================================
// Password Hashing
// =============================================================================

/// Hashes a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> SyncResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| SyncError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Checks a password against a PHC string. A malformed hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// =============================================================================
// Session Service
// =============================================================================

#[derive(Clone)]
pub struct SessionService {
    remote: Arc<dyn RemoteStore>,
    db: Database,
    connectivity: Connectivity,
    default_store: Option<String>,
}

impl SessionService {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        db: Database,
        connectivity: Connectivity,
        default_store: Option<String>,
    ) -> Self {
        SessionService {
            remote,
            db,
            connectivity,
            default_store,
        }
    }

    /// Registered stores. Offline, the last list seen online.
    pub async fn stores(&self) -> SyncResult<Vec<Store>> {
        let mirror = self.db.mirror();

        if self.connectivity.is_online().await {
            match remote::find::<Store>(self.remote.as_ref(), &Filter::all()).await {
                Ok(stores) => {
                    if let Err(e) = mirror.set(SHARED_MIRROR, MirrorKind::Stores, &stores).await {
                        warn!(error = %e, "Store list not cached");
                    }
                    return Ok(stores);
                }
                Err(SyncError::RemoteUnavailable) => {
                    debug!("Remote store unreachable, using cached store list");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(mirror.get(SHARED_MIRROR, MirrorKind::Stores).await?)
    }

    /// Makes `name` the working store of this terminal.
    ///
    /// ## Errors
    /// - `NotFound` if no registered store has that name (case-insensitive)
    pub async fn select_store(&self, name: &str) -> SyncResult<Store> {
        let wanted = name.trim().to_lowercase();
        let store = self
            .stores()
            .await?
            .into_iter()
            .find(|s| s.name.to_lowercase() == wanted)
            .ok_or_else(|| SyncError::not_found("store", name))?;

        self.db.session().set_store(&store.name).await?;
        info!(store = %store.name, "Store selected");
        Ok(store)
    }

    /// Logs an employee in. Names are matched lower-cased.
    ///
    /// ## Errors
    /// - `AuthenticationFailed` for an unknown name or a wrong password
    /// - `RemoteUnavailable` when employees can't be read
    pub async fn login(&self, name: &str, password: &str) -> SyncResult<SessionContext> {
        if !self.connectivity.is_online().await {
            return Err(SyncError::RemoteUnavailable);
        }

        let login = name.trim().to_lowercase();
        let employee = remote::find::<Employee>(self.remote.as_ref(), &Filter::all().eq("name", login.as_str()))
            .await?
            .into_iter()
            .next();

        match employee {
            Some(e) if verify_password(password, &e.password_hash) => {
                self.db.session().set_operator(&e.name).await?;
                info!(operator = %e.name, "Operator logged in");
                self.current().await
            }
            _ => {
                warn!(operator = %login, "Login refused");
                Err(SyncError::AuthenticationFailed("wrong name or password".into()))
            }
        }
    }

    /// Forgets the operator and the selected store.
    pub async fn logout(&self) -> SyncResult<()> {
        self.db.session().clear().await?;
        info!("Logged out");
        Ok(())
    }

    /// The working store and operator.
    ///
    /// Falls back to the configured default store when none was selected.
    ///
    /// ## Errors
    /// - `AuthenticationFailed` with no store or no operator
    pub async fn current(&self) -> SyncResult<SessionContext> {
        let stored = self.db.session().get().await?;

        let store = stored
            .store
            .or_else(|| self.default_store.clone())
            .ok_or_else(|| SyncError::AuthenticationFailed("no store selected".into()))?;
        let operator = stored
            .operator
            .ok_or_else(|| SyncError::AuthenticationFailed("not logged in".into()))?;

        Ok(SessionContext::new(store, operator))
    }
}
