//! # Multi-Write Compensation
//!
//! The remote store has no transactions spanning documents. Workflows that
//! write several documents (a sale plus its stock decrements, a transfer
//! debiting one store and crediting another) record an undo step after
//! every write. If a later write fails, the recorded steps run in reverse.
//!
//! ```text
//! write A ──► record undo(A)
//! write B ──► record undo(B)
//! write C ──✗
//!            compensate: undo(B), undo(A)
//! ```
//!
//! Compensation is best effort: a step that fails is logged and the rest
//! still run.

use tracing::{error, info};

use crate::inventory::InventoryService;
use crate::remote::{Collection, RemoteStore};

/// Undo step for a write that already succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    /// Add `delta` back to a product's quantity.
    AdjustStock {
        store: String,
        product: String,
        delta: i64,
    },
    /// Remove a document that was created.
    DeleteRecord { collection: Collection, id: String },
}

/// Undo log of one workflow.
#[derive(Debug)]
pub struct Saga {
    name: &'static str,
    done: Vec<Compensation>,
}

impl Saga {
    pub fn new(name: &'static str) -> Self {
        Saga {
            name,
            done: Vec::new(),
        }
    }

    pub fn record(&mut self, step: Compensation) {
        self.done.push(step);
    }

    pub fn steps(&self) -> &[Compensation] {
        &self.done
    }

    /// Runs every recorded undo step, newest first.
    pub async fn compensate(self, inventory: &InventoryService, remote: &dyn RemoteStore) {
        if self.done.is_empty() {
            return;
        }
        info!(saga = self.name, steps = self.done.len(), "Compensating partial writes");

        for step in self.done.into_iter().rev() {
            let result = match &step {
                Compensation::AdjustStock {
                    store,
                    product,
                    delta,
                } => inventory.adjust_stock(store, product, *delta).await.map(|_| ()),
                Compensation::DeleteRecord { collection, id } => {
                    remote.delete(*collection, id).await.map(|_| ())
                }
            };

            if let Err(e) = result {
                error!(saga = self.name, step = ?step, error = %e, "Compensation step failed");
            }
        }
    }
}
