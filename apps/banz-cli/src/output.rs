//! Result printing: plain text by default, JSON with `--json`.

use serde::Serialize;

use banz_core::{Closure, Product, Sale};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Printer { json }
    }

    /// Prints `value` as JSON, or the text produced by `render`.
    pub fn emit<T: Serialize>(&self, value: &T, render: impl FnOnce(&T) -> String) -> Result<(), ApiError> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            let text = render(value);
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        Ok(())
    }

    pub fn error(&self, err: &ApiError) {
        if self.json {
            match serde_json::to_string(err) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("{}", err),
            }
        } else {
            eprintln!("{}", err);
        }
    }
}

// =============================================================================
// Text Renderers
// =============================================================================

pub fn sale_line(sale: &Sale) -> String {
    let items: Vec<String> = sale
        .items
        .iter()
        .map(|i| format!("{} x{}", i.product_name, i.quantity))
        .collect();
    let payments: Vec<String> = sale
        .payments
        .iter()
        .map(|p| format!("{} {}", p.method, p.amount()))
        .collect();

    let mut line = format!(
        "{}  {}  {}  [{}]  {}",
        sale.id,
        sale.timestamp.format("%Y-%m-%d %H:%M"),
        sale.seller,
        items.join(", "),
        payments.join(" + ")
    );
    if sale.below_minimum_alert {
        line.push_str("  ⚠ below minimum");
    }
    if let Some(note) = sale.note.as_deref().filter(|n| !n.is_empty()) {
        line.push_str(&format!("  \"{}\"", note));
    }
    line
}

pub fn product_line(product: &Product) -> String {
    format!(
        "{:<30} {:>6}  {} - {}",
        product.name,
        product.quantity,
        product.min_price(),
        product.max_price()
    )
}

pub fn closure_summary(closure: &Closure) -> String {
    format!(
        "{}  {}  {} sale(s)  total {}  cash {}  electronic {}  alerts {}",
        closure.id,
        closure.date,
        closure.sales.len(),
        closure.totals.total(),
        closure.totals.cash(),
        closure.totals.electronic(),
        closure.totals.alerts
    )
}

pub fn closure_detail(closure: &Closure) -> String {
    let mut lines = vec![closure_summary(closure)];
    for (product, quantity) in &closure.totals.items {
        lines.push(format!("  {:<30} {:>6}", product, quantity));
    }
    for sale in &closure.sales {
        lines.push(format!("  {}", sale_line(sale)));
    }
    lines.join("\n")
}
