use clap::Parser;
use miette::{miette, IntoDiagnostic, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};

use navcast_server::session::SessionController;
use navcast_server::transport::UdpTransport;
use navcast_server::{console, settings, Cli, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    log::info!("navcast {} starting", VERSION);

    let stored = settings::load(args.config.as_deref()).into_diagnostic()?;
    let config = settings::apply_cli(stored, &args);
    if !config.endpoint.is_valid() {
        return Err(miette!("Invalid chartplotter address '{}'", config.endpoint));
    }
    if args.save_config {
        settings::save(&config, args.config.as_deref()).into_diagnostic()?;
    }

    log::info!(
        "Sending to {} (heading {}, timer {})",
        config.endpoint,
        if config.heading_enabled {
            config.heading_mode.to_string()
        } else {
            "off".to_string()
        },
        if config.timer_enabled {
            config.timer_interval.to_string()
        } else {
            "off".to_string()
        }
    );

    let show_errors = config.show_error_history;
    let (controller, handle) = SessionController::new(
        config,
        Arc::new(UdpTransport::new()),
        args.sample_source(),
    );

    Toplevel::new(move |s| async move {
        s.start(SubsystemBuilder::new("Session", |subsys| {
            controller.run(subsys)
        }));

        let status = handle.clone();
        s.start(SubsystemBuilder::new("Status", move |subsys| {
            console::report_status(subsys, status, show_errors)
        }));

        if args.console {
            let commands = handle.clone();
            s.start(SubsystemBuilder::new("Console", move |subsys| {
                console::run(subsys, commands)
            }));
        }

        if !args.idle {
            if let Err(e) = handle.start().await {
                log::error!("Cannot start session: {}", e);
            }
        }
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .into_diagnostic()
}
