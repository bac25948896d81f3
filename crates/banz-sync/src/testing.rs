//! Shared fixtures for the workflow tests: an in-memory local database,
//! a [`MemoryRemoteStore`] and every service wired to them.

use std::sync::Arc;
use tempfile::TempDir;

use banz_core::reconcile::MatchPolicy;
use banz_core::{LineItem, Money, Payment, PaymentMethod, Product, SaleDraft, SessionContext, Store};
use banz_db::{Database, DbConfig};

use crate::auth::hash_password;
use crate::config::BanzConfig;
use crate::prompt::{AlwaysConfirm, OperatorPrompt};
use crate::remote::{self, Filter, MemoryRemoteStore, RemoteStore};
use crate::BanzServices;

pub(crate) const ADMIN_PASSWORD: &str = "admin-test-password";

pub(crate) struct Harness {
    pub remote: Arc<MemoryRemoteStore>,
    pub db: Database,
    pub services: BanzServices,
    pub ctx: SessionContext,
    _dir: TempDir,
}

async fn build(config: BanzConfig, dir: TempDir, prompt: Arc<dyn OperatorPrompt>) -> Harness {
    let remote = Arc::new(MemoryRemoteStore::new());
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let services = BanzServices::with_remote(config, db.clone(), remote.clone(), prompt);

    Harness {
        remote,
        db,
        services,
        ctx: SessionContext::new("Socorro", "ryan"),
        _dir: dir,
    }
}

fn test_config(dir: &TempDir) -> BanzConfig {
    let mut config = BanzConfig::default();
    config.closeout.export_dir = dir.path().join("backups");
    config
}

pub(crate) async fn harness() -> Harness {
    harness_with_prompt(Arc::new(AlwaysConfirm)).await
}

pub(crate) async fn harness_with_prompt(prompt: Arc<dyn OperatorPrompt>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    build(config, dir, prompt).await
}

pub(crate) async fn harness_with_policy(policy: MatchPolicy) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.sync.legacy_match = policy.legacy;
    config.sync.legacy_window_ms = policy.window_ms;
    build(config, dir, Arc::new(AlwaysConfirm)).await
}

/// Harness whose admin password is [`ADMIN_PASSWORD`].
pub(crate) async fn admin_harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.admin.password_hash = Some(hash_password(ADMIN_PASSWORD).unwrap());
    build(config, dir, Arc::new(AlwaysConfirm)).await
}

pub(crate) async fn seed_store(remote: &dyn RemoteStore, name: &str) -> Store {
    let store = Store {
        id: String::new(),
        name: name.to_string(),
    };
    remote::insert(remote, &store).await.unwrap()
}

pub(crate) async fn seed_product(
    remote: &dyn RemoteStore,
    store: &str,
    name: &str,
    quantity: i64,
    min_cents: i64,
    max_cents: i64,
) -> Product {
    let product = Product {
        id: String::new(),
        name: name.to_string(),
        quantity,
        min_price_cents: min_cents,
        max_price_cents: max_cents,
        store: store.to_string(),
        version: 0,
    };
    remote::insert(remote, &product).await.unwrap()
}

/// Remote stock of a product. The store must be available.
pub(crate) async fn stock(remote: &dyn RemoteStore, store: &str, name: &str) -> i64 {
    let filter = Filter::all().eq("store", store).eq("name", name);
    let products: Vec<Product> = remote::find(remote, &filter).await.unwrap();
    products.first().map(|p| p.quantity).unwrap()
}

pub(crate) fn draft(items: &[(&str, i64)], payments: &[(PaymentMethod, i64)]) -> SaleDraft {
    SaleDraft {
        items: items.iter().map(|(name, qty)| LineItem::new(*name, *qty)).collect(),
        payments: payments
            .iter()
            .map(|(method, cents)| Payment::new(*method, Money::from_cents(*cents)))
            .collect(),
        note: None,
    }
}
