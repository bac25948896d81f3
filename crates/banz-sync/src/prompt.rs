//! Operator confirmations.
//!
//! Workflows never talk to a terminal themselves. When a sale needs the
//! operator's consent (stock shortfall, paid below the minimum price) they
//! ask an [`OperatorPrompt`], which the CLI implements on stdin.

use banz_core::validation::StockShortfall;
use banz_core::Money;

/// Yes/no questions asked while recording a sale.
pub trait OperatorPrompt: Send + Sync {
    /// Sell more than the cached stock? Declining cancels the sale.
    fn confirm_stock_override(&self, shortfall: &StockShortfall) -> bool;

    /// Accept a payment below the summed minimum price? The sale is
    /// flagged either way; declining cancels it.
    fn confirm_below_minimum(&self, paid: Money, minimum: Money) -> bool;
}

/// Answers yes to everything (`--yes`, scripted use).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl OperatorPrompt for AlwaysConfirm {
    fn confirm_stock_override(&self, _shortfall: &StockShortfall) -> bool {
        true
    }

    fn confirm_below_minimum(&self, _paid: Money, _minimum: Money) -> bool {
        true
    }
}

/// Answers no to everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineAll;

impl OperatorPrompt for DeclineAll {
    fn confirm_stock_override(&self, _shortfall: &StockShortfall) -> bool {
        false
    }

    fn confirm_below_minimum(&self, _paid: Money, _minimum: Money) -> bool {
        false
    }
}
