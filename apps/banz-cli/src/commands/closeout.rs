//! Closeout, closure edits and backups.

use chrono::NaiveDate;
use serde_json::json;

use banz_core::Closure;

use super::App;
use crate::cli::ClosuresCommand;
use crate::error::ApiError;
use crate::output::{closure_detail, closure_summary};

fn summaries(closures: &[Closure]) -> String {
    if closures.is_empty() {
        return "Nothing to close".to_string();
    }
    closures.iter().map(closure_summary).collect::<Vec<_>>().join("\n")
}

pub async fn close_day(app: &App, today: NaiveDate) -> Result<(), ApiError> {
    let ctx = app.ctx().await?;
    let report = app.services.closeout.close_day(&ctx, today).await?;
    app.out.emit(&report, |r| {
        format!("{}\nBackup: {}", summaries(&r.closures), r.export.display())
    })
}

pub async fn auto_close(app: &App, today: NaiveDate) -> Result<(), ApiError> {
    let ctx = app.ctx().await?;
    let closed = app.services.closeout.auto_close(&ctx, today).await?;
    app.out.emit(&closed, |c| summaries(c))
}

pub async fn export(app: &App, date: NaiveDate) -> Result<(), ApiError> {
    let path = app.services.exporter.export_all(date).await?;
    app.out.emit(&json!({"path": path}), |_| {
        format!("Backup written to {}", path.display())
    })
}

pub async fn closures(app: &App, cmd: ClosuresCommand) -> Result<(), ApiError> {
    let ctx = app.ctx().await?;
    let closeout = &app.services.closeout;

    match cmd {
        ClosuresCommand::List => {
            let list = closeout.list_closures(&ctx).await?;
            app.out.emit(&list, |list| {
                if list.is_empty() {
                    "No closures".to_string()
                } else {
                    list.iter().map(closure_summary).collect::<Vec<_>>().join("\n")
                }
            })
        }
        ClosuresCommand::Show { id } => {
            let closure = closeout.get_closure(&id).await?;
            app.out.emit(&closure, closure_detail)
        }
        ClosuresCommand::Delete { id } => {
            closeout.delete_closure(&ctx, &id).await?;
            app.out
                .emit(&json!({"deleted": id}), |_| format!("Closure {} deleted", id))
        }
        ClosuresCommand::AddSale { closure, sale } => {
            let updated = closeout.add_sale(&ctx, &closure, &sale.into()).await?;
            app.out.emit(&updated, closure_detail)
        }
        ClosuresCommand::EditSale { closure, sale_id, sale } => {
            let updated = closeout
                .edit_sale(&ctx, &closure, &sale_id, &sale.into())
                .await?;
            app.out.emit(&updated, closure_detail)
        }
        ClosuresCommand::RemoveSale { closure, sale_id } => {
            let updated = closeout.remove_sale(&ctx, &closure, &sale_id).await?;
            app.out.emit(&updated, closure_detail)
        }
    }
}
