//! # Administration
//!
//! Registration of stores and employees, plus the read-only views the
//! administrator uses: the audit log and stock totals across stores.
//!
//! ```text
//! add_store / add_employee          open to any logged-in operator
//! remove_store / remove_employee    require the admin password
//! ```
//!
//! Names are unique case-insensitively. Employee names are stored
//! lower-case so login can match them directly.

use argon2::PasswordHash;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use banz_core::validation::validate_name;
use banz_core::{AuditAction, AuditEntry, Employee, SessionContext, Store, ValidationError};

use crate::audit::{AuditFilter, AuditLogger};
use crate::auth::{hash_password, verify_password};
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::inventory::InventoryService;
use crate::remote::{self, Collection, Filter, RemoteStore};

#[derive(Clone)]
pub struct AdminService {
    remote: Arc<dyn RemoteStore>,
    inventory: InventoryService,
    audit: AuditLogger,
    connectivity: Connectivity,
    admin_hash: Option<String>,
}

impl AdminService {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        inventory: InventoryService,
        audit: AuditLogger,
        connectivity: Connectivity,
        admin_hash: Option<String>,
    ) -> Self {
        AdminService {
            remote,
            inventory,
            audit,
            connectivity,
            admin_hash,
        }
    }

    async fn require_online(&self) -> SyncResult<()> {
        if self.connectivity.is_online().await {
            Ok(())
        } else {
            Err(SyncError::RemoteUnavailable)
        }
    }

    /// Checks the admin password.
    ///
    /// ## Errors
    /// - `AuthenticationFailed` when no admin hash is configured or the
    ///   password doesn't match
    pub fn verify_admin(&self, password: &str) -> SyncResult<()> {
        let hash = self.admin_hash.as_deref().ok_or_else(|| {
            SyncError::AuthenticationFailed("admin password is not configured".into())
        })?;

        if verify_password(password, hash) {
            Ok(())
        } else {
            warn!("Admin password rejected");
            Err(SyncError::AuthenticationFailed("wrong admin password".into()))
        }
    }

    // =========================================================================
    // Stores
    // =========================================================================

    pub async fn list_stores(&self) -> SyncResult<Vec<Store>> {
        let mut stores: Vec<Store> = remote::find(self.remote.as_ref(), &Filter::all()).await?;
        stores.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(stores)
    }

    pub async fn add_store(&self, ctx: &SessionContext, name: &str) -> SyncResult<Store> {
        validate_name("store", name)?;
        self.require_online().await?;

        let name = name.trim();
        let wanted = name.to_lowercase();
        if self
            .list_stores()
            .await?
            .iter()
            .any(|s| s.name.to_lowercase() == wanted)
        {
            return Err(SyncError::duplicate("store", name));
        }

        let store = remote::insert(
            self.remote.as_ref(),
            &Store {
                id: String::new(),
                name: name.to_string(),
            },
        )
        .await?;

        self.audit
            .record(ctx, AuditAction::StoreAdded, &store.name, "")
            .await;
        info!(store = %store.name, "Store registered");
        Ok(store)
    }

    /// Unregisters a store. Its products, sales and closures are kept.
    pub async fn remove_store(&self, ctx: &SessionContext, name: &str, admin_password: &str) -> SyncResult<()> {
        self.verify_admin(admin_password)?;
        self.require_online().await?;

        let wanted = name.trim().to_lowercase();
        let store = self
            .list_stores()
            .await?
            .into_iter()
            .find(|s| s.name.to_lowercase() == wanted)
            .ok_or_else(|| SyncError::not_found("store", name))?;

        self.remote.delete(Collection::Stores, &store.id).await?;
        self.audit
            .record(ctx, AuditAction::StoreRemoved, &store.name, "")
            .await;
        info!(store = %store.name, "Store removed");
        Ok(())
    }

    // =========================================================================
    // Employees
    // =========================================================================

    pub async fn list_employees(&self) -> SyncResult<Vec<Employee>> {
        let mut employees: Vec<Employee> = remote::find(self.remote.as_ref(), &Filter::all()).await?;
        employees.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(employees)
    }

    async fn find_employee(&self, name: &str) -> SyncResult<Option<Employee>> {
        let filter = Filter::all().eq("name", name.trim().to_lowercase());
        Ok(remote::find::<Employee>(self.remote.as_ref(), &filter)
            .await?
            .into_iter()
            .next())
    }

    /// Registers an employee under the lower-cased name.
    pub async fn add_employee(&self, ctx: &SessionContext, name: &str, password: &str) -> SyncResult<Employee> {
        if password.is_empty() {
            return Err(ValidationError::Required {
                field: "password".to_string(),
            }
            .into());
        }
        self.add_employee_hashed(ctx, name, hash_password(password)?)
            .await
    }

    /// Registers an employee whose password was hashed elsewhere (seed
    /// files carry hashes, never passwords).
    pub async fn add_employee_hashed(
        &self,
        ctx: &SessionContext,
        name: &str,
        password_hash: String,
    ) -> SyncResult<Employee> {
        validate_name("employee", name)?;
        PasswordHash::new(&password_hash).map_err(|e| ValidationError::InvalidFormat {
            field: "password_hash".to_string(),
            reason: e.to_string(),
        })?;
        self.require_online().await?;

        let login = name.trim().to_lowercase();
        if self.find_employee(&login).await?.is_some() {
            return Err(SyncError::duplicate("employee", login));
        }

        let employee = remote::insert(
            self.remote.as_ref(),
            &Employee {
                id: String::new(),
                name: login,
                password_hash,
            },
        )
        .await?;

        self.audit
            .record(ctx, AuditAction::EmployeeAdded, &employee.name, "")
            .await;
        info!(employee = %employee.name, "Employee registered");
        Ok(employee)
    }

    pub async fn remove_employee(&self, ctx: &SessionContext, name: &str, admin_password: &str) -> SyncResult<()> {
        self.verify_admin(admin_password)?;
        self.require_online().await?;

        let employee = self
            .find_employee(name)
            .await?
            .ok_or_else(|| SyncError::not_found("employee", name))?;

        self.remote.delete(Collection::Employees, &employee.id).await?;
        self.audit
            .record(ctx, AuditAction::EmployeeRemoved, &employee.name, "")
            .await;
        info!(employee = %employee.name, "Employee removed");
        Ok(())
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub async fn logs(&self, filter: &AuditFilter) -> SyncResult<Vec<AuditEntry>> {
        self.audit.list(filter).await
    }

    /// Units on hand per store.
    pub async fn stock_totals(&self) -> SyncResult<BTreeMap<String, i64>> {
        self.inventory.stock_totals_by_store().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin_harness, harness, seed_product, ADMIN_PASSWORD};

    #[tokio::test]
    async fn test_duplicate_names_are_case_insensitive() {
        let h = harness().await;
        let admin = &h.services.admin;

        admin.add_store(&h.ctx, "Banca Socorro").await.unwrap();
        let err = admin.add_store(&h.ctx, "  banca SOCORRO ").await.unwrap_err();
        assert!(matches!(err, SyncError::Duplicate { .. }));

        let ana = admin.add_employee(&h.ctx, "Ana", "pw").await.unwrap();
        assert_eq!(ana.name, "ana");
        assert_ne!(ana.password_hash, "pw");
        let err = admin.add_employee(&h.ctx, "ANA", "other").await.unwrap_err();
        assert!(matches!(err, SyncError::Duplicate { .. }));

        let err = admin.add_employee(&h.ctx, "bia", "").await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        let err = admin
            .add_employee_hashed(&h.ctx, "bia", "plaintext".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_removal_requires_admin_password() {
        let h = admin_harness().await;
        let admin = &h.services.admin;
        admin.add_store(&h.ctx, "Centro").await.unwrap();
        admin.add_employee(&h.ctx, "ana", "pw").await.unwrap();

        let err = admin.remove_store(&h.ctx, "Centro", "guess").await.unwrap_err();
        assert!(matches!(err, SyncError::AuthenticationFailed(_)));
        assert_eq!(admin.list_stores().await.unwrap().len(), 1);

        admin.remove_store(&h.ctx, "centro", ADMIN_PASSWORD).await.unwrap();
        admin.remove_employee(&h.ctx, "Ana", ADMIN_PASSWORD).await.unwrap();
        assert!(admin.list_stores().await.unwrap().is_empty());
        assert!(admin.list_employees().await.unwrap().is_empty());

        let removed = admin
            .logs(&AuditFilter {
                action: Some(AuditAction::StoreRemoved),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].target, "Centro");
    }

    #[tokio::test]
    async fn test_unconfigured_admin_password_refuses() {
        let h = harness().await;
        let err = h.services.admin.verify_admin("anything").unwrap_err();
        assert!(matches!(err, SyncError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_stock_totals_per_store() {
        let h = harness().await;
        seed_product(h.remote.as_ref(), "Socorro", "Caderno", 10, 600, 900).await;
        seed_product(h.remote.as_ref(), "Socorro", "Caneta", 5, 100, 200).await;
        seed_product(h.remote.as_ref(), "Centro", "Caderno", 2, 600, 900).await;

        let totals = h.services.admin.stock_totals().await.unwrap();
        assert_eq!(totals.get("Socorro"), Some(&15));
        assert_eq!(totals.get("Centro"), Some(&2));
    }
}
