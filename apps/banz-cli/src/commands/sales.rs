//! Sale commands.

use serde::Serialize;

use banz_core::{Sale, SaleDraft};
use banz_sync::SubmitOutcome;

use super::App;
use crate::cli::SalesCommand;
use crate::error::ApiError;
use crate::output::sale_line;

#[derive(Serialize)]
struct SaleResult<'a> {
    status: &'static str,
    sale: &'a Sale,
}

pub async fn sell(app: &App, draft: SaleDraft) -> Result<(), ApiError> {
    let ctx = app.ctx().await?;
    let outcome = app.services.sales.submit(&ctx, &draft).await?;

    let status = match &outcome {
        SubmitOutcome::Recorded(_) => "recorded",
        SubmitOutcome::Queued(_) => "queued",
        SubmitOutcome::AlreadyRecorded(_) => "already_recorded",
    };
    let result = SaleResult {
        status,
        sale: outcome.sale(),
    };
    app.out
        .emit(&result, |r| format!("Sale {}: {}", r.status, sale_line(r.sale)))
}

pub async fn sales(app: &App, cmd: SalesCommand) -> Result<(), ApiError> {
    let ctx = app.ctx().await?;
    let sales = &app.services.sales;

    match cmd {
        SalesCommand::List => {
            let list = sales.list_sales(&ctx).await?;
            app.out.emit(&list, |list| {
                if list.is_empty() {
                    "No open sales".to_string()
                } else {
                    list.iter().map(sale_line).collect::<Vec<_>>().join("\n")
                }
            })
        }
        SalesCommand::Delete { id } => {
            sales.delete_sale(&ctx, &id).await?;
            app.out
                .emit(&serde_json::json!({"deleted": id.to_string()}), |_| format!("Deleted {}", id))
        }
        SalesCommand::Edit { id, sale } => {
            let edited = sales.edit_sale(&ctx, &id, &sale.into()).await?;
            app.out.emit(&edited, |s| format!("Edited: {}", sale_line(s)))
        }
    }
}
