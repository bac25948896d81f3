//! Store selection and login.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use super::App;
use crate::cli::StoreCommand;
use crate::error::ApiError;

pub async fn store(app: &App, cmd: StoreCommand) -> Result<(), ApiError> {
    let session = &app.services.session;
    match cmd {
        StoreCommand::List => {
            let stores = session.stores().await?;
            app.out.emit(&stores, |stores| {
                stores
                    .iter()
                    .map(|s| s.name.clone())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        StoreCommand::Select { name } => {
            let store = session.select_store(&name).await?;
            app.out.emit(&store, |s| format!("Working for {}", s.name))
        }
    }
}

/// Logs in, then closes any past day left open if configured to.
pub async fn login(app: &App, name: &str, password: &str) -> Result<(), ApiError> {
    let ctx = app.services.session.login(name, password).await?;

    if app.services.config.closeout.auto_close_on_load {
        let today = Utc::now().date_naive();
        match app.services.closeout.auto_close(&ctx, today).await {
            Ok(closed) if !closed.is_empty() => {
                info!(store = %ctx.store, days = closed.len(), "Closed past days on login");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Auto-close on login skipped"),
        }
    }

    app.out
        .emit(&ctx, |c| format!("Logged in as {} at {}", c.operator, c.store))
}

pub async fn logout(app: &App) -> Result<(), ApiError> {
    app.services.session.logout().await?;
    app.out.emit(&json!({"loggedOut": true}), |_| "Logged out".to_string())
}

pub async fn whoami(app: &App) -> Result<(), ApiError> {
    let ctx = app.ctx().await?;
    let mode = app.services.connectivity.mode();
    let online = app.services.connectivity.is_online().await;

    let status = json!({
        "store": ctx.store,
        "operator": ctx.operator,
        "mode": mode.to_string(),
        "online": online,
    });
    app.out.emit(&status, |_| {
        format!(
            "{} at {} ({}, {})",
            ctx.operator,
            ctx.store,
            mode,
            if online { "online" } else { "offline" }
        )
    })
}
