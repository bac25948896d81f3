//! Catalogue, stock entries and transfers.

use serde_json::json;

use banz_core::{LineItem, ProductDraft};
use banz_sync::ProductWrite;

use super::App;
use crate::cli::{ProductArgs, ProductsCommand};
use crate::error::ApiError;
use crate::output::product_line;

impl From<ProductArgs> for ProductDraft {
    fn from(args: ProductArgs) -> Self {
        ProductDraft {
            name: args.name,
            quantity: args.quantity,
            min_price_cents: args.min.cents(),
            max_price_cents: args.max.cents(),
        }
    }
}

fn items_text(items: &[LineItem]) -> String {
    items
        .iter()
        .map(|i| format!("{} x{}", i.product_name, i.quantity))
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn products(app: &App, cmd: ProductsCommand) -> Result<(), ApiError> {
    let ctx = app.ctx().await?;
    let inventory = &app.services.inventory;

    match cmd {
        ProductsCommand::List => {
            let mut list = inventory.products(&ctx.store).await?;
            list.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            app.out.emit(&list, |list| {
                list.iter().map(product_line).collect::<Vec<_>>().join("\n")
            })
        }
        ProductsCommand::Add(args) => {
            let written = inventory.create_product(&ctx, &args.into()).await?;
            let status = match &written {
                ProductWrite::Created(_) => "created",
                ProductWrite::Queued(_) => "queued",
            };
            app.out.emit(
                &json!({"status": status, "product": written.product()}),
                |_| format!("Product {}: {}", status, product_line(written.product())),
            )
        }
        ProductsCommand::Edit { current, product } => {
            let edited = inventory.edit_product(&ctx, &current, &product.into()).await?;
            app.out.emit(&edited, |p| format!("Updated: {}", product_line(p)))
        }
        ProductsCommand::Delete { name } => {
            inventory.delete_product(&ctx, &name).await?;
            app.out
                .emit(&json!({"deleted": name}), |_| format!("Product {} removed", name))
        }
    }
}

pub async fn entry(app: &App, items: Vec<LineItem>, from: Option<String>) -> Result<(), ApiError> {
    let ctx = app.ctx().await?;
    let entry = app.services.inventory.stock_entry(&ctx, &items, from).await?;
    app.out.emit(&entry, |e| {
        format!(
            "Received into {} from {}: {}",
            e.destination,
            e.origin.as_deref().unwrap_or("supplier"),
            items_text(&e.items)
        )
    })
}

pub async fn transfer(app: &App, destination: &str, items: Vec<LineItem>) -> Result<(), ApiError> {
    let ctx = app.ctx().await?;
    let transfer = app.services.inventory.transfer(&ctx, destination, &items).await?;
    app.out.emit(&transfer, |t| {
        format!(
            "Moved from {} to {}: {}",
            t.origin,
            t.destination,
            items_text(&t.items)
        )
    })
}
