//! Confirmation prompts on the terminal.

use std::io::{self, BufRead, Write};

use banz_core::validation::StockShortfall;
use banz_core::Money;
use banz_sync::OperatorPrompt;

/// Asks on stderr, reads the answer from stdin. Anything but `y`/`s`
/// (sim) declines, including end of input.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    fn ask(&self, question: &str) -> bool {
        let mut stderr = io::stderr();
        if write!(stderr, "{} [y/N] ", question).and_then(|_| stderr.flush()).is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_yes(&answer),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "s" | "sim")
}

impl OperatorPrompt for TerminalPrompt {
    fn confirm_stock_override(&self, shortfall: &StockShortfall) -> bool {
        self.ask(&format!(
            "Only {} of {} in stock, selling {}. Sell anyway?",
            shortfall.available, shortfall.product, shortfall.requested
        ))
    }

    fn confirm_below_minimum(&self, paid: Money, minimum: Money) -> bool {
        self.ask(&format!(
            "Paid {} is below the minimum of {}. The sale will be flagged. Continue?",
            paid, minimum
        ))
    }
}
