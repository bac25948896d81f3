//! Queue replay, one-shot or continuous.

use std::time::Duration;
use tracing::info;

use banz_sync::{ReconcileAgent, ReplayReport};

use super::App;
use crate::error::ApiError;

fn report_text(report: &ReplayReport) -> String {
    if report.is_empty() {
        return "Nothing to reconcile".to_string();
    }
    let mut text = format!(
        "created {}, already there {}, deleted {}, edited {}, discarded {}, products published {}",
        report.created,
        report.matched,
        report.deleted,
        report.edited,
        report.discarded,
        report.products_created
    );
    for (id, error) in &report.failed {
        text.push_str(&format!("\nstill queued {}: {}", id, error));
    }
    text
}

pub async fn sync(app: &App, watch: Option<u64>) -> Result<(), ApiError> {
    let ctx = app.ctx().await?;

    let Some(secs) = watch else {
        let report = app.services.reconciler.replay_pending(&ctx).await?;
        return app.out.emit(&report, report_text);
    };

    let (agent, handle) = ReconcileAgent::new(
        app.services.reconciler.clone(),
        ctx,
        Duration::from_secs(secs.max(1)),
    );
    let task = tokio::spawn(agent.run());
    info!("Watching for reconnects, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await?;
    if let Err(e) = task.await {
        return Err(ApiError::internal(format!("reconcile agent panicked: {}", e)));
    }

    let status = handle.status().await;
    app.out.emit(&status, |s| {
        format!(
            "{} replay(s), {} snapshot(s){}",
            s.replays,
            s.snapshots,
            s.last_error
                .as_deref()
                .map(|e| format!(", last error: {}", e))
                .unwrap_or_default()
        )
    })
}
