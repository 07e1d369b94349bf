//! # Navcast Server
//!
//! Streams a device's position and heading to a chartplotter as NMEA 0183
//! sentences over UDP.
//!
//! This crate is the async shell around [`navcast_core`]: it owns the tokio
//! runtime, the sockets, the timers and the sample sources, and drives the
//! pure encoding and state logic from the core crate.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    navcast-server                       │
//! │  ┌──────────────┐  ┌─────────────┐  ┌────────────────┐  │
//! │  │ SampleSource │  │ Console     │  │ Status logger  │  │
//! │  │ (sim/replay) │  │ (stdin)     │  │ (watch)        │  │
//! │  └──────┬───────┘  └──────┬──────┘  └───────▲────────┘  │
//! │         │ samples         │ commands        │ status    │
//! │         ▼                 ▼                 │           │
//! │  ┌─────────────────────────────────────────────────────┐│
//! │  │           SessionController (single task)           ││
//! │  │  - UpdateThrottler, periodic timer                  ││
//! │  │  - reconnect after 5 s                              ││
//! │  └──────────────────────────┬──────────────────────────┘│
//! │                             ▼                           │
//! │  ┌─────────────────────────────────────────────────────┐│
//! │  │  DatagramChannel (own task) ─▶ UdpTransport         ││
//! │  └─────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`session::SessionController`] - owns all session state
//! - [`session::SessionHandle`] - start/stop/toggle, status, sample sink
//! - [`channel::DatagramChannel`] - one connection attempt and its state
//! - [`transport::UdpTransport`] - socket2/tokio UDP transport
//! - [`sources`] - simulated vessel and JSON-lines replay
//! - [`settings`] - configuration file and command line overrides
//!
//! ## Example: Running a Session
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use navcast_core::SenderConfig;
//! use navcast_server::session::SessionController;
//! use navcast_server::sources::{SimulatedSource, Simulation};
//! use navcast_server::transport::UdpTransport;
//! use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (controller, handle) = SessionController::new(
//!         SenderConfig::default(),
//!         Arc::new(UdpTransport::new()),
//!         Box::new(SimulatedSource::new(Simulation::default())),
//!     );
//!
//!     Toplevel::new(|s| async move {
//!         s.start(SubsystemBuilder::new("Session", |subsys| controller.run(subsys)));
//!         let _ = handle.start().await;
//!     })
//!     .catch_signals()
//!     .handle_shutdown_requests(Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! }
//! ```
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `--host`, `-p, --port` - chartplotter address (default 192.168.1.1:10110)
//! - `-t, --timer` - also send every 1, 3, 5 or 10 seconds
//! - `-r, --replay` - replay a JSON-lines sample file instead of simulating
//! - `-v` - Increase verbosity (use multiple times)

use clap::Parser;
use std::path::PathBuf;

use navcast_core::{HeadingMode, SampleSource, TimerInterval};

pub mod channel;
pub mod console;
pub mod session;
pub mod settings;
pub mod sources;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use sources::{ReplaySource, SimulatedSource, Simulation};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Chartplotter host name or IP address
    #[arg(long)]
    pub host: Option<String>,

    /// Chartplotter UDP port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Heading reference to send, `true` (HDT) or `magnetic` (HDM)
    #[arg(long)]
    pub heading: Option<HeadingMode>,

    /// Do not send heading sentences
    #[arg(long, conflicts_with = "heading")]
    pub no_heading: bool,

    /// Read the magnetic field for true heading and vice versa, as older
    /// senders did
    #[arg(long, default_value_t = false)]
    pub swap_heading_fields: bool,

    /// Also send the last known position every 1s, 3s, 5s or 10s
    #[arg(short, long)]
    pub timer: Option<TimerInterval>,

    /// Only send when a new sample arrives
    #[arg(long, conflicts_with = "timer")]
    pub no_timer: bool,

    /// Log the error history whenever it changes
    #[arg(long, default_value_t = false)]
    pub show_errors: bool,

    /// Configuration file, defaults to the platform configuration directory
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Store the effective configuration before starting
    #[arg(long, default_value_t = false)]
    pub save_config: bool,

    /// Replay samples from a JSON-lines file instead of simulating
    #[arg(short, long)]
    pub replay: Option<PathBuf>,

    /// Start the replay over when it reaches the end
    #[arg(long, requires = "replay")]
    pub loop_replay: bool,

    /// Simulated latitude in degrees, north positive
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub latitude: f64,

    /// Simulated longitude in degrees, east positive
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub longitude: f64,

    /// Simulated speed over ground in m/s
    #[arg(long, default_value_t = 0.0)]
    pub speed: f64,

    /// Simulated course over ground in degrees true
    #[arg(long, default_value_t = 0.0)]
    pub course: f64,

    /// Magnetic variation for the simulated compass, east positive
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub variation: f64,

    /// Wait for a `start` command instead of sending right away
    #[arg(long, default_value_t = false)]
    pub idle: bool,

    /// Accept start/stop/toggle/status commands on stdin
    #[arg(long, default_value_t = false)]
    pub console: bool,
}

impl Cli {
    /// The sample source selected on the command line.
    pub fn sample_source(&self) -> Box<dyn SampleSource> {
        match &self.replay {
            Some(path) => Box::new(ReplaySource::new(path.clone(), self.loop_replay)),
            None => Box::new(SimulatedSource::new(Simulation {
                latitude: self.latitude,
                longitude: self.longitude,
                speed: self.speed,
                course: self.course,
                variation: self.variation,
                ..Default::default()
            })),
        }
    }
}
