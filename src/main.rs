use std::panic;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::RunConfig;
use crate::core::access::StopFlag;
use crate::core::lifecycle::LifecycleController;
use crate::native::monitor::SysinfoMonitor;

mod config;
mod constants;
mod core;
mod native;
mod stubs;


#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    set_panic_hook();

    let args = match config::parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(config::usage_exit_code(e.kind()));
        }
    };
    let config = match RunConfig::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(1);
        }
    };

    let controller = LifecycleController::new(
        config,
        native::platform::probe(),
        Arc::new(SysinfoMonitor::new()),
    );
    tokio::spawn(stop_on_signal(controller.stop_handle()));

    match controller.run().await {
        Ok(report) => {
            tracing::info!(
                run_id = %report.run_id,
                chunks = report.chunks_allocated,
                allocated_mb = report.bytes_allocated / constants::MIB as u64,
                pages_touched = report.pages_touched,
                workers = report.workers_started,
                abandoned = report.shutdown.abandoned,
                elapsed_s = (report.finished_at - report.started_at).num_seconds(),
                "memory released, exiting"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(1)
        }
    }
}

async fn stop_on_signal(stop: StopFlag) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("could not install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("interrupt received, shutting down");
    stop.stop();
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
