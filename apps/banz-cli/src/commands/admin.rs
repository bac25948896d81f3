//! Administrator commands and initial seeding.
//!
//! ## Seed File
//! ```text
//! {
//!   "stores":    ["Banca Socorro", "Centro"],
//!   "employees": [{"name": "ryan", "passwordHash": "$argon2id$..."}],
//!   "products":  [{"store": "Banca Socorro", "name": "Caderno",
//!                  "quantity": 10, "minPriceCents": 600, "maxPriceCents": 900}]
//! }
//! ```
//!
//! Hashes come from `banz admin hash-password`. Entries that already exist
//! are skipped, so a seed file can be applied twice.

use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

use banz_core::{AuditEntry, ProductDraft, SessionContext};
use banz_sync::{hash_password, AuditFilter, SyncError, SyncResult};

use super::App;
use crate::cli::AdminCommand;
use crate::error::ApiError;

const SEED_OPERATOR: &str = "seed";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SeedFile {
    stores: Vec<String>,
    employees: Vec<SeedEmployee>,
    products: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedEmployee {
    name: String,
    password_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedProduct {
    store: String,
    name: String,
    quantity: i64,
    min_price_cents: i64,
    max_price_cents: i64,
}

#[derive(Debug, Default, serde::Serialize)]
struct SeedReport {
    stores: usize,
    employees: usize,
    products: usize,
    skipped: usize,
}

/// Counts a write, or a skip when the record is already there.
fn tally<T>(result: SyncResult<T>, what: &str, name: &str, added: &mut usize, skipped: &mut usize) -> SyncResult<()> {
    match result {
        Ok(_) => {
            *added += 1;
            Ok(())
        }
        Err(SyncError::Duplicate { .. }) => {
            warn!(what, name, "Already present, skipped");
            *skipped += 1;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub async fn seed(app: &App, file: &Path) -> Result<(), ApiError> {
    let raw = std::fs::read_to_string(file)?;
    let seed: SeedFile = serde_json::from_str(&raw)?;

    let admin = &app.services.admin;
    let inventory = &app.services.inventory;
    let mut report = SeedReport::default();

    for store in &seed.stores {
        let ctx = SessionContext::new(store.as_str(), SEED_OPERATOR);
        let result = admin.add_store(&ctx, store).await;
        tally(result, "store", store, &mut report.stores, &mut report.skipped)?;
    }

    let ctx = SessionContext::new("", SEED_OPERATOR);
    for employee in seed.employees {
        let result = admin
            .add_employee_hashed(&ctx, &employee.name, employee.password_hash)
            .await;
        tally(result, "employee", &employee.name, &mut report.employees, &mut report.skipped)?;
    }

    for product in &seed.products {
        let ctx = SessionContext::new(product.store.as_str(), SEED_OPERATOR);
        let draft = ProductDraft {
            name: product.name.clone(),
            quantity: product.quantity,
            min_price_cents: product.min_price_cents,
            max_price_cents: product.max_price_cents,
        };
        let result = inventory.create_product(&ctx, &draft).await;
        tally(result, "product", &product.name, &mut report.products, &mut report.skipped)?;
    }

    info!(
        stores = report.stores,
        employees = report.employees,
        products = report.products,
        skipped = report.skipped,
        "Seed applied"
    );
    app.out.emit(&report, |r| {
        format!(
            "Seeded {} store(s), {} employee(s), {} product(s); {} already present",
            r.stores, r.employees, r.products, r.skipped
        )
    })
}

fn log_line(entry: &AuditEntry) -> String {
    let mut line = format!(
        "{}  {:<10} {:<12} {:<18} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.store,
        entry.operator,
        entry.action.as_str(),
        entry.target
    );
    if !entry.details.is_empty() {
        line.push_str(&format!("  ({})", entry.details));
    }
    line
}

pub async fn admin(app: &App, cmd: AdminCommand) -> Result<(), ApiError> {
    if let AdminCommand::HashPassword { password } = &cmd {
        let hash = hash_password(password)?;
        return app.out.emit(&json!({"passwordHash": hash}), |_| hash.clone());
    }

    let ctx = app.ctx().await?;
    let admin = &app.services.admin;

    match cmd {
        AdminCommand::StoreAdd { name } => {
            let store = admin.add_store(&ctx, &name).await?;
            app.out.emit(&store, |s| format!("Store {} registered", s.name))
        }
        AdminCommand::StoreRemove { name, admin_password } => {
            admin.remove_store(&ctx, &name, &admin_password).await?;
            app.out
                .emit(&json!({"removed": name}), |_| format!("Store {} removed", name))
        }
        AdminCommand::EmployeeAdd { name, password } => {
            let employee = admin.add_employee(&ctx, &name, &password).await?;
            app.out.emit(
                &json!({"id": employee.id, "name": employee.name}),
                |_| format!("Employee {} registered", employee.name),
            )
        }
        AdminCommand::EmployeeRemove { name, admin_password } => {
            admin.remove_employee(&ctx, &name, &admin_password).await?;
            app.out
                .emit(&json!({"removed": name}), |_| format!("Employee {} removed", name))
        }
        AdminCommand::Logs { store, action, date } => {
            let entries = admin.logs(&AuditFilter { store, action, date }).await?;
            app.out.emit(&entries, |entries| {
                if entries.is_empty() {
                    "No log entries".to_string()
                } else {
                    entries.iter().map(log_line).collect::<Vec<_>>().join("\n")
                }
            })
        }
        AdminCommand::StockTotals => {
            let totals = admin.stock_totals().await?;
            app.out.emit(&totals, |totals| {
                totals
                    .iter()
                    .map(|(store, units)| format!("{:<30} {:>8}", store, units))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        AdminCommand::HashPassword { .. } => Ok(()),
    }
}
