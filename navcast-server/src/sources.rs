//! Sample sources for running without real sensors.
//!
//! * [`SimulatedSource`] dead-reckons a vessel from a fixed origin along a
//!   steady course.
//! * [`ReplaySource`] plays back a JSON-lines file of [`Sample`]s, paced by
//!   the recorded timestamps.
//!
//! Both run as a tokio task between `start` and `stop` and push samples into
//! the [`SampleSink`] they were started with.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use navcast_core::{HeadingSample, PositionSample, Sample, SampleSink, SampleSource};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// One running source task.
#[derive(Default)]
struct Running {
    cancel: Option<CancellationToken>,
}

impl Running {
    fn replace(&mut self) -> CancellationToken {
        self.stop();
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        token
    }

    fn stop(&mut self) -> bool {
        match self.cancel.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Simulated vessel
// =============================================================================

/// Parameters of the simulated vessel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Simulation {
    pub latitude: f64,
    pub longitude: f64,
    /// Speed over ground in m/s
    pub speed: f64,
    /// Course over ground in degrees true
    pub course: f64,
    /// Magnetic variation in degrees, east positive
    pub variation: f64,
    pub position_interval: Duration,
    pub heading_interval: Duration,
}

impl Default for Simulation {
    fn default() -> Self {
        Simulation {
            latitude: 0.0,
            longitude: 0.0,
            speed: 0.0,
            course: 0.0,
            variation: 0.0,
            position_interval: Duration::from_secs(1),
            heading_interval: Duration::from_millis(200),
        }
    }
}

impl Simulation {
    /// Where the vessel is after `elapsed` on its steady course.
    pub fn position_after(&self, elapsed: Duration) -> (f64, f64) {
        let distance = self.speed.max(0.0) * elapsed.as_secs_f64();
        let bearing = self.course.to_radians();
        let lat0 = self.latitude.to_radians();

        let lat = (lat0 + distance * bearing.cos() / EARTH_RADIUS_M)
            .to_degrees()
            .clamp(-89.999_999, 89.999_999);
        let dlon = distance * bearing.sin() / (EARTH_RADIUS_M * lat0.cos().max(1e-9));
        let lon = wrap_longitude(self.longitude + dlon.to_degrees());
        (lat, lon)
    }

    fn magnetic_heading(&self) -> f64 {
        (self.course - self.variation).rem_euclid(360.0)
    }
}

fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Stationary or steadily moving vessel.
pub struct SimulatedSource {
    simulation: Simulation,
    running: Running,
}

impl SimulatedSource {
    pub fn new(simulation: Simulation) -> Self {
        SimulatedSource {
            simulation,
            running: Running::default(),
        }
    }
}

impl SampleSource for SimulatedSource {
    fn start(&mut self, sink: Arc<dyn SampleSink>) {
        let token = self.running.replace();
        let sim = self.simulation;
        info!(
            "Simulating vessel at {:.5},{:.5} making {:.1} m/s on {:.0}°",
            sim.latitude, sim.longitude, sim.speed, sim.course
        );
        tokio::spawn(simulate(sim, sink, token));
    }

    fn stop(&mut self) {
        if self.running.stop() {
            debug!("Simulation stopped");
        }
    }
}

async fn simulate(sim: Simulation, sink: Arc<dyn SampleSink>, cancel: CancellationToken) {
    let started = Instant::now();
    let mut positions = interval(sim.position_interval);
    positions.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut headings = interval(sim.heading_interval);
    headings.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = positions.tick() => {
                let (latitude, longitude) = sim.position_after(started.elapsed());
                sink.on_position(PositionSample {
                    timestamp: Utc::now(),
                    latitude,
                    longitude,
                    speed: Some(sim.speed),
                    course: Some(sim.course),
                    altitude: 0.0,
                });
            },

            _ = headings.tick() => {
                sink.on_heading(HeadingSample {
                    timestamp: Utc::now(),
                    magnetic_heading: Some(sim.magnetic_heading()),
                    true_heading: Some(sim.course.rem_euclid(360.0)),
                });
            },
        }
    }
}

// =============================================================================
// JSON-lines replay
// =============================================================================

/// Plays back samples recorded one JSON object per line, for example
///
/// ```text
/// {"type":"position","timestamp":"2025-08-03T12:00:00Z","latitude":48.1173,"longitude":-122.4783,"speed":2.5,"course":84.4}
/// {"type":"heading","timestamp":"2025-08-03T12:00:00.200Z","true_heading":84.0}
/// ```
///
/// Timestamps are shifted so the first sample of each pass is "now".
pub struct ReplaySource {
    path: PathBuf,
    loop_playback: bool,
    running: Running,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, loop_playback: bool) -> Self {
        ReplaySource {
            path: path.into(),
            loop_playback,
            running: Running::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SampleSource for ReplaySource {
    fn start(&mut self, sink: Arc<dyn SampleSink>) {
        let token = self.running.replace();
        info!("Replaying samples from {}", self.path.display());
        tokio::spawn(replay(self.path.clone(), self.loop_playback, sink, token));
    }

    fn stop(&mut self) {
        if self.running.stop() {
            debug!("Replay of {} stopped", self.path.display());
        }
    }
}

/// Parse a JSON-lines recording. Blank lines and `#` comments are skipped,
/// malformed lines are logged and skipped.
pub fn parse_samples(text: &str, origin: &str) -> Vec<Sample> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .filter_map(|(n, line)| match serde_json::from_str::<Sample>(line) {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("{}:{}: skipping sample: {}", origin, n + 1, e);
                None
            }
        })
        .collect()
}

fn restamp(sample: Sample, timestamp: DateTime<Utc>) -> Sample {
    match sample {
        Sample::Position(mut p) => {
            p.timestamp = timestamp;
            Sample::Position(p)
        }
        Sample::Heading(mut h) => {
            h.timestamp = timestamp;
            Sample::Heading(h)
        }
    }
}

async fn replay(
    path: PathBuf,
    loop_playback: bool,
    sink: Arc<dyn SampleSink>,
    cancel: CancellationToken,
) {
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Cannot read replay file {}: {}", path.display(), e);
            return;
        }
    };
    let samples = parse_samples(&text, &path.display().to_string());
    let Some(first) = samples.first().map(Sample::timestamp) else {
        warn!("Replay file {} holds no samples", path.display());
        return;
    };
    debug!("Loaded {} samples from {}", samples.len(), path.display());

    loop {
        let pass_start = Instant::now();
        let wall_start = Utc::now();

        for sample in &samples {
            let offset = (sample.timestamp() - first).to_std().unwrap_or_default();
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(pass_start + offset) => {},
            }

            let stamped = restamp(*sample, wall_start + (sample.timestamp() - first));
            match stamped {
                Sample::Position(p) => sink.on_position(p),
                Sample::Heading(h) => sink.on_heading(h),
            }
        }

        if !loop_playback {
            info!("Replay of {} finished", path.display());
            return;
        }
        debug!("Replay of {} rewinding", path.display());
        // A one-sample file would otherwise spin
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {},
        }
    }
}
