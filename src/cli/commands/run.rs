//! run command - Start the update scheduler

use anyhow::{bail, Context as _, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::config::Config;
use crate::engine::Orchestrator;

/// Start polling, or process a single batch with `once`.
pub fn run(config: &Config, once: bool) -> Result<()> {
    let orchestrator =
        Orchestrator::from_config(config).context("Failed to initialise components")?;

    let rt = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    rt.block_on(async {
        if once {
            let report = orchestrator.run_batch().await;
            if let Some(err) = &report.listing_error {
                bail!("Listing candidate repositories failed: {}", err);
            }
            if report.failed() > 0 {
                bail!(
                    "{} of {} repositories failed",
                    report.failed(),
                    report.processed()
                );
            }
            return Ok(());
        }

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            wait_for_shutdown().await;
            info!("shutdown requested; finishing current batch");
            let _ = tx.send(true);
        });
        orchestrator.run(rx).await;
        Ok(())
    })
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
