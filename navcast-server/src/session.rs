//! Session controller.
//!
//! The controller is a single tokio task that owns all session state: the
//! status snapshot, the throttler, the periodic timer and the one live
//! datagram channel. Everything that can change that state (commands from
//! the handle, samples from the source, timer ticks, channel events and
//! reconnect notifications) arrives as a message, so there is exactly one
//! writer.
//!
//! ```text
//!  SampleSource ──▶ SessionHandle ──┐
//!  start/stop/toggle ───────────────┤
//!                                   ▼
//!                          ┌──────────────────┐  write   ┌────────────────┐
//!  timer tick ────────────▶│ SessionController │────────▶│ DatagramChannel │
//!  reconnect due ─────────▶│  (single writer)  │◀────────│   (own task)    │
//!                          └──────────────────┘  events  └────────────────┘
//!                                   │
//!                                   ▼ watch
//!                             SessionStatus
//! ```

use chrono::Local;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_graceful_shutdown::SubsystemHandle;

use navcast_core::connection::RECONNECT_DELAY_MS;
use navcast_core::nmea::{self, SentenceFamily};
use navcast_core::{
    ChannelState, ConnectionStatus, Endpoint, HeadingSample, PositionSample, SampleSink,
    SampleSource, SenderConfig, SessionStatus, UpdateThrottler,
};

use crate::channel::{ChannelEvent, DatagramChannel};
use crate::transport::DatagramTransport;

const COMMAND_QUEUE_SIZE: usize = 64;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session controller is not running")]
    Closed,
}

/// Requests accepted by the controller.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Start,
    Stop,
    Toggle,
    /// Replace the configuration; a new endpoint or timer applies at once
    Reconfigure(SenderConfig),
    Position(PositionSample),
    Heading(HeadingSample),
}

/// What a write carried, handed back on completion.
#[derive(Debug, Clone)]
pub enum Delivery {
    Position {
        family: SentenceFamily,
        sample: PositionSample,
    },
    Heading {
        value: f64,
    },
}

enum Internal {
    TimerTick { epoch: u64 },
    ReconnectDue { epoch: u64 },
}

/// Cheap, cloneable access to a running controller.
///
/// The handle is also the [`SampleSink`] given to the sample source.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn start(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Start).await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Stop).await
    }

    pub async fn toggle(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Toggle).await
    }

    pub async fn reconfigure(&self, config: SenderConfig) -> Result<(), SessionError> {
        self.send(SessionCommand::Reconfigure(config)).await
    }

    /// Current status snapshot
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that is notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    fn offer(&self, command: SessionCommand) {
        if let Err(e) = self.commands.try_send(command) {
            log::trace!("Dropping sample: {}", e);
        }
    }
}

impl SampleSink for SessionHandle {
    fn on_position(&self, sample: PositionSample) {
        self.offer(SessionCommand::Position(sample));
    }

    fn on_heading(&self, sample: HeadingSample) {
        self.offer(SessionCommand::Heading(sample));
    }
}

pub struct SessionController {
    config: SenderConfig,
    transport: Arc<dyn DatagramTransport>,
    source: Box<dyn SampleSource>,
    sink: Arc<dyn SampleSink>,
    commands: mpsc::Receiver<SessionCommand>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    events_tx: mpsc::UnboundedSender<ChannelEvent<Delivery>>,
    events_rx: mpsc::UnboundedReceiver<ChannelEvent<Delivery>>,
    status: SessionStatus,
    status_tx: watch::Sender<SessionStatus>,
    throttler: UpdateThrottler,
    channel: Option<DatagramChannel<Delivery>>,
    /// Endpoint of the running session
    endpoint: Endpoint,
    next_generation: u64,
    /// First channel generation opened by the running session
    session_generation: u64,
    /// Bumped on every start and stop; stale timers and reconnects compare it
    epoch: u64,
    /// The user wants the session to run
    should_send: bool,
    heading_active: bool,
    reconnect_pending: bool,
    timer: Option<JoinHandle<()>>,
    last_position: Option<PositionSample>,
    last_heading: Option<HeadingSample>,
    clock: Instant,
}

impl SessionController {
    pub fn new(
        config: SenderConfig,
        transport: Arc<dyn DatagramTransport>,
        source: Box<dyn SampleSource>,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());

        let handle = SessionHandle {
            commands: commands_tx,
            status: status_rx,
        };

        let controller = SessionController {
            endpoint: config.endpoint.clone(),
            config,
            transport,
            source,
            sink: Arc::new(handle.clone()),
            commands,
            internal_tx,
            internal_rx,
            events_tx,
            events_rx,
            status: SessionStatus::default(),
            status_tx,
            throttler: UpdateThrottler::new(),
            channel: None,
            next_generation: 1,
            session_generation: 1,
            epoch: 0,
            should_send: false,
            heading_active: false,
            reconnect_pending: false,
            timer: None,
            last_position: None,
            last_heading: None,
            clock: Instant::now(),
        };
        (controller, handle)
    }

    /// Subsystem entry point; stops the session on shutdown.
    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), SessionError> {
        self.serve(subsys.on_shutdown_requested()).await
    }

    /// Process messages until `shutdown` completes.
    pub async fn serve<F>(mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        log::info!("Session controller running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Session controller shutdown");
                    if self.should_send {
                        self.stop();
                    }
                    return Ok(());
                },

                Some(command) = self.commands.recv() => {
                    self.handle_command(command);
                },

                Some(event) = self.events_rx.recv() => {
                    self.handle_channel_event(event);
                },

                Some(internal) = self.internal_rx.recv() => {
                    self.handle_internal(internal);
                },
            }
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start => self.start(),
            SessionCommand::Stop => self.stop(),
            SessionCommand::Toggle => {
                if self.should_send {
                    self.stop()
                } else {
                    self.start()
                }
            }
            SessionCommand::Reconfigure(config) => self.reconfigure(config),
            SessionCommand::Position(sample) => self.on_position(sample),
            SessionCommand::Heading(sample) => self.on_heading(sample),
        }
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::TimerTick { epoch } if epoch == self.epoch => self.on_timer_tick(),
            Internal::ReconnectDue { epoch } if epoch == self.epoch => self.reconnect(),
            Internal::TimerTick { .. } => {}
            Internal::ReconnectDue { .. } => {
                log::debug!("Ignoring reconnect scheduled by an earlier session");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    fn start(&mut self) {
        if self.should_send {
            log::debug!("Session already started");
            return;
        }
        self.epoch += 1;
        self.should_send = true;
        self.reconnect_pending = false;
        self.status.last_sent = Default::default();
        self.status.errors.clear();
        self.last_position = None;
        self.last_heading = None;
        self.throttler.reset();
        self.endpoint = self.config.endpoint.clone();
        self.session_generation = self.next_generation;

        self.heading_active = self.config.heading_enabled && self.source.heading_available();
        log::info!(
            "Starting session to {} (heading {})",
            self.endpoint,
            if self.heading_active {
                self.config.heading_mode.to_string()
            } else {
                "off".to_string()
            }
        );

        self.open_channel();
        self.source.start(self.sink.clone());
        if self.config.timer_enabled {
            self.start_timer();
        }
        self.publish();
    }

    fn stop(&mut self) {
        if !self.should_send && self.channel.is_none() {
            log::debug!("Session already stopped");
            return;
        }
        log::info!("Stopping session");
        self.epoch += 1;
        self.source.stop();
        if let Some(channel) = self.channel.take() {
            channel.cancel();
        }
        self.stop_timer();
        self.should_send = false;
        self.reconnect_pending = false;
        self.status.is_sending = false;
        self.status.connection_status = ConnectionStatus::Disconnected;
        self.publish();
    }

    fn reconfigure(&mut self, config: SenderConfig) {
        let endpoint_changed = config.endpoint != self.config.endpoint;
        let timer_changed = config.timer_enabled != self.config.timer_enabled
            || config.timer_interval != self.config.timer_interval;
        self.config = config;
        if !self.should_send {
            return;
        }

        self.heading_active = self.config.heading_enabled && self.source.heading_available();
        if endpoint_changed {
            log::info!("Endpoint changed to {}", self.config.endpoint);
            self.endpoint = self.config.endpoint.clone();
            self.replace_channel();
        }
        if timer_changed {
            self.stop_timer();
            if self.config.timer_enabled {
                self.start_timer();
            }
        }
    }

    fn start_timer(&mut self) {
        self.stop_timer();
        let interval = self.config.timer_interval;
        self.throttler.timer_started(interval);

        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        let period = interval.as_duration();
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tx.send(Internal::TimerTick { epoch }).is_err() {
                    break;
                }
            }
        }));
        log::debug!("Periodic send every {}", interval);
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.throttler.timer_stopped();
    }

    // -------------------------------------------------------------------------
    // Channel management
    // -------------------------------------------------------------------------

    fn open_channel(&mut self) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.channel = Some(DatagramChannel::open(
            generation,
            self.endpoint.clone(),
            self.transport.clone(),
            self.events_tx.clone(),
        ));
        self.status.connection_status = ConnectionStatus::Connecting;
    }

    /// Cancel the live channel and open a brand-new one.
    fn replace_channel(&mut self) {
        if let Some(old) = self.channel.take() {
            old.cancel();
        }
        self.open_channel();
        self.publish();
    }

    fn schedule_reconnect(&mut self) {
        if !self.should_send || self.reconnect_pending {
            return;
        }
        self.reconnect_pending = true;
        self.record_error("Attempting to reconnect...");

        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(RECONNECT_DELAY_MS)).await;
            let _ = tx.send(Internal::ReconnectDue { epoch });
        });
    }

    fn reconnect(&mut self) {
        self.reconnect_pending = false;
        if !self.should_send {
            log::debug!("Session stopped, not reconnecting");
            return;
        }
        log::info!("Reconnecting to {}", self.endpoint);
        self.replace_channel();
    }

    fn handle_channel_event(&mut self, event: ChannelEvent<Delivery>) {
        let live = self
            .channel
            .as_ref()
            .is_some_and(|c| c.generation() == event.generation());

        match event {
            ChannelEvent::State { generation, state } => {
                if !live {
                    log::trace!("Ignoring state {} of abandoned channel #{}", state, generation);
                    return;
                }
                self.on_channel_state(state);
            }
            ChannelEvent::Written {
                generation,
                line,
                tag,
                result,
            } => match result {
                Ok(_) if self.should_send && generation >= self.session_generation => {
                    self.on_delivered(&line, tag)
                }
                Ok(_) => log::debug!("Dropping completion from earlier session #{}", generation),
                Err(e) if live => self.record_error(e.to_string()),
                Err(e) => log::debug!("Abandoned channel #{}: {}", generation, e),
            },
        }
        self.publish();
    }

    fn on_channel_state(&mut self, state: ChannelState) {
        log::debug!("{}: channel {}", self.endpoint, state);
        self.status.connection_status = state.connection_status();
        match &state {
            ChannelState::Ready => {
                log::info!("Connected to {}", self.endpoint);
                self.status.is_sending = true;
            }
            ChannelState::Waiting(e) | ChannelState::Failed(e) => {
                log::warn!("{}: {}", self.endpoint, e);
                self.record_error(format!("Connection failed: {}", e.detail()));
                self.schedule_reconnect();
            }
            ChannelState::Idle | ChannelState::Connecting | ChannelState::Cancelled => {}
        }
    }

    fn on_delivered(&mut self, line: &str, delivery: Delivery) {
        match delivery {
            Delivery::Position { family, sample } => {
                self.status.last_sent.record_position(family, line, &sample);
            }
            Delivery::Heading { value } => {
                self.status.last_sent.record_heading(line, value);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Samples
    // -------------------------------------------------------------------------

    fn on_position(&mut self, sample: PositionSample) {
        if !self.status.is_sending {
            return;
        }
        self.last_position = Some(sample);
        match self.throttler.try_position(self.now_ms()) {
            Ok(()) => self.send_position(sample),
            Err(reason) => log::trace!("Position suppressed: {:?}", reason),
        }
    }

    fn on_heading(&mut self, sample: HeadingSample) {
        if !self.status.is_sending {
            return;
        }
        self.last_heading = Some(sample);
        self.send_heading(sample);
    }

    fn on_timer_tick(&mut self) {
        if !self.status.is_sending {
            return;
        }
        if let Some(sample) = self.last_position {
            match self.throttler.try_position(self.now_ms()) {
                Ok(()) => self.send_position(sample),
                Err(reason) => log::trace!("Timer send suppressed: {:?}", reason),
            }
        }
        if let Some(sample) = self.last_heading {
            self.send_heading(sample);
        }
    }

    fn send_position(&mut self, sample: PositionSample) {
        let Some(channel) = &self.channel else {
            return;
        };
        for sentence in nmea::encode_position(&sample) {
            channel.write(
                sentence.to_wire(),
                Delivery::Position {
                    family: sentence.family,
                    sample,
                },
            );
        }
    }

    fn send_heading(&mut self, sample: HeadingSample) {
        if !self.heading_active {
            return;
        }
        let Some(value) =
            sample.value_for(self.config.heading_mode, self.config.swap_heading_fields)
        else {
            log::debug!("No {} heading in sample", self.config.heading_mode);
            return;
        };
        if let Err(reason) = self.throttler.try_heading(self.now_ms()) {
            log::trace!("Heading suppressed: {:?}", reason);
            return;
        }
        if let Some(channel) = &self.channel {
            let sentence = nmea::encode_heading(value, self.config.heading_mode);
            channel.write(sentence.to_wire(), Delivery::Heading { value });
        }
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    fn record_error(&mut self, message: impl AsRef<str>) {
        self.status.errors.push(Local::now().time(), message);
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status.clone());
    }

    fn now_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualSource, MemoryTransport};
    use chrono::{TimeZone, Utc};
    use navcast_core::{ChannelError, HeadingMode, TimerInterval};
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        handle: SessionHandle,
        transport: MemoryTransport,
        source: ManualSource,
        shutdown: CancellationToken,
        task: JoinHandle<Result<(), SessionError>>,
    }

    fn fixture(config: SenderConfig) -> Fixture {
        let transport = MemoryTransport::new();
        let source = ManualSource::new();
        let (controller, handle) = SessionController::new(
            config,
            Arc::new(transport.clone()),
            Box::new(source.clone()),
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(controller.serve(shutdown.clone().cancelled_owned()));
        Fixture {
            handle,
            transport,
            source,
            shutdown,
            task,
        }
    }

    fn config() -> SenderConfig {
        SenderConfig {
            endpoint: Endpoint::new("10.0.0.5", 10110),
            ..Default::default()
        }
    }

    fn position(lat: f64, lon: f64) -> PositionSample {
        PositionSample {
            timestamp: Utc.with_ymd_and_hms(2025, 8, 3, 12, 34, 56).unwrap(),
            latitude: lat,
            longitude: lon,
            speed: Some(0.0),
            course: Some(0.0),
            altitude: 0.0,
        }
    }

    fn heading(magnetic: f64, true_heading: f64) -> HeadingSample {
        HeadingSample {
            timestamp: Utc.with_ymd_and_hms(2025, 8, 3, 12, 34, 56).unwrap(),
            magnetic_heading: Some(magnetic),
            true_heading: Some(true_heading),
        }
    }

    /// Let the controller and channel tasks run without moving the clock.
    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_for(handle: &SessionHandle, f: impl Fn(&SessionStatus) -> bool) -> SessionStatus {
        let mut rx = handle.subscribe();
        let status = rx.wait_for(|s| f(s)).await.expect("controller gone").clone();
        status
    }

    async fn started(config: SenderConfig) -> Fixture {
        let fx = fixture(config);
        fx.handle.start().await.unwrap();
        wait_for(&fx.handle, |s| s.is_sending).await;
        fx
    }

    fn checksum_ok(line: &str) -> bool {
        let line = line.trim_end();
        let (body, hex) = line[1..].split_once('*').unwrap();
        format!("{:02X}", nmea::checksum(body)) == hex
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_connects_and_starts_source() {
        let fx = started(config()).await;
        let status = fx.handle.status();
        assert!(status.is_sending);
        assert_eq!(status.connection_status, ConnectionStatus::Connected);
        assert_eq!(fx.transport.opens(), vec![Endpoint::new("10.0.0.5", 10110)]);
        assert_eq!(fx.source.starts(), 1);

        fx.shutdown.cancel();
        fx.task.await.unwrap().unwrap();
        assert_eq!(fx.source.stops(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_end_to_end() {
        let fx = started(config()).await;
        let sample = position(0.0, 0.0);
        fx.source.push_position(sample);

        let status = wait_for(&fx.handle, |s| s.last_sent.sentences.len() == 3).await;
        assert_eq!(status.last_sent.latitude, Some(0.0));
        assert_eq!(status.last_sent.longitude, Some(0.0));
        assert_eq!(status.last_sent.time, Some(sample.timestamp));

        let sent = fx.transport.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].starts_with("$GPRMC,123456.000,A,0000.000,N,00000.000,E,0.0,0.0,030825,,*"));
        assert!(sent[1].starts_with("$GPGGA,123456.000,0000.000,N,00000.000,E,"));
        assert!(sent[2].starts_with("$GPVTG,0.0,T,0.0,M,0.0,N,0.0,K,*"));
        assert!(sent.iter().all(|l| l.ends_with('\n') && checksum_ok(l)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_before_start_are_ignored() {
        let fx = fixture(config());
        fx.handle.on_position(position(1.0, 1.0));
        settle().await;
        assert!(fx.transport.sent().is_empty());
        assert_eq!(fx.handle.status(), SessionStatus::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_only_after_delivery() {
        let fx = started(config()).await;
        fx.transport.fail_send(ChannelError::Send("Message too long".into()));
        fx.source.push_position(position(10.0, 20.0));

        let status = wait_for(&fx.handle, |s| s.errors.len() == 3).await;
        assert_eq!(status.last_sent.latitude, None);
        assert_eq!(status.last_sent.time, None);
        assert!(status.errors.iter().all(|e| e.ends_with("Send error: Message too long")));
        assert!(status.is_sending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heading_modes() {
        let fx = started(config()).await;
        fx.source.push_heading(heading(10.0, 14.5));
        let status = wait_for(&fx.handle, |s| s.last_sent.heading.is_some()).await;
        assert_eq!(status.last_sent.heading, Some(14.5));
        assert_eq!(fx.transport.sent(), vec!["$GPHDT,14.500,T*05\n".to_string()]);

        let mut magnetic = config();
        magnetic.heading_mode = HeadingMode::Magnetic;
        fx.handle.reconfigure(magnetic).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        fx.source.push_heading(heading(10.0, 14.5));
        wait_for(&fx.handle, |s| s.last_sent.heading == Some(10.0)).await;
        assert_eq!(fx.transport.sent()[1], "$GPHDM,10.000,M*04\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_heading_swap_and_disable() {
        let mut swapped = config();
        swapped.swap_heading_fields = true;
        let fx = started(swapped).await;
        fx.source.push_heading(heading(10.0, 14.5));
        wait_for(&fx.handle, |s| s.last_sent.heading.is_some()).await;
        assert_eq!(fx.transport.sent(), vec!["$GPHDT,10.000,T*04\n".to_string()]);

        let mut disabled = config();
        disabled.heading_enabled = false;
        fx.handle.reconfigure(disabled).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        fx.source.push_heading(heading(20.0, 24.5));
        settle().await;
        assert_eq!(fx.transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heading_throttled() {
        let fx = started(config()).await;
        // 20 ms apart for half a second
        for i in 0..25 {
            fx.source.push_heading(heading(i as f64, i as f64));
            settle().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        settle().await;
        let sent = fx.transport.sent();
        assert!(sent.len() >= 4 && sent.len() <= 5, "sent {} headings", sent.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_busy_window_suppresses_push() {
        let mut timed = config();
        timed.timer_enabled = true;
        timed.timer_interval = TimerInterval::One;
        let t0 = Instant::now();
        let fx = started(timed).await;

        // Push at t0 is sent and opens the 1.1 s busy window
        fx.source.push_position(position(1.0, 2.0));
        settle().await;
        assert_eq!(fx.transport.sent().len(), 3);

        // Tick at 1 s is inside the window, tick at 2 s is not
        tokio::time::sleep_until(t0 + Duration::from_millis(2010)).await;
        settle().await;
        assert_eq!(fx.transport.sent().len(), 6);

        // Push 50 ms after the timer send is suppressed
        tokio::time::sleep_until(t0 + Duration::from_millis(2050)).await;
        fx.source.push_position(position(1.5, 2.5));
        settle().await;
        assert_eq!(fx.transport.sent().len(), 6);

        // Tick at 3 s still busy (until 3.1 s), tick at 4 s resends the latest position
        tokio::time::sleep_until(t0 + Duration::from_millis(4010)).await;
        settle().await;
        let sent = fx.transport.sent();
        assert_eq!(sent.len(), 9);
        assert!(sent[6].contains("0130.000,N"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_channel_reconnects_once_after_delay() {
        let fx = started(config()).await;
        fx.transport.fail_send(ChannelError::Fatal("Socket closed".into()));
        fx.source.push_position(position(1.0, 1.0));
        let failed_at = Instant::now();

        let status = wait_for(&fx.handle, |s| s.connection_status == ConnectionStatus::Failed).await;
        assert!(status.errors.iter().any(|e| e.ends_with("Attempting to reconnect...")));
        assert!(status.errors.iter().any(|e| e.ends_with("Connection failed: Socket closed")));
        assert_eq!(fx.transport.opens().len(), 1);

        fx.transport.clear_failures();
        tokio::time::sleep_until(failed_at + Duration::from_millis(4900)).await;
        settle().await;
        assert_eq!(fx.transport.opens().len(), 1);

        tokio::time::sleep_until(failed_at + Duration::from_millis(5100)).await;
        let status = wait_for(&fx.handle, |s| s.connection_status == ConnectionStatus::Connected).await;
        assert!(status.is_sending);
        assert_eq!(fx.transport.opens().len(), 2);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fx.transport.opens().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_retries_every_five_seconds() {
        let fx = fixture(config());
        fx.transport.fail_open(ChannelError::Waiting("Cannot resolve 'plotter'".into()));
        let t0 = Instant::now();
        fx.handle.start().await.unwrap();

        tokio::time::sleep_until(t0 + Duration::from_millis(15_100)).await;
        settle().await;
        assert_eq!(fx.transport.opens().len(), 4);
        let status = fx.handle.status();
        assert!(!status.is_sending);
        assert_eq!(status.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(status.errors.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reconnect() {
        let fx = started(config()).await;
        fx.transport.fail_send(ChannelError::Fatal("Socket closed".into()));
        fx.source.push_position(position(1.0, 1.0));
        wait_for(&fx.handle, |s| s.connection_status == ConnectionStatus::Failed).await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        fx.handle.stop().await.unwrap();
        let status = wait_for(&fx.handle, |s| !s.is_sending).await;
        assert_eq!(status.connection_status, ConnectionStatus::Disconnected);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(fx.transport.opens().len(), 1);
        assert_eq!(fx.source.stops(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_and_restart_reset_snapshot() {
        let fx = fixture(config());
        fx.handle.toggle().await.unwrap();
        wait_for(&fx.handle, |s| s.is_sending).await;
        fx.source.push_position(position(5.0, 6.0));
        wait_for(&fx.handle, |s| s.last_sent.latitude == Some(5.0)).await;

        fx.handle.toggle().await.unwrap();
        wait_for(&fx.handle, |s| !s.is_sending).await;

        fx.handle.toggle().await.unwrap();
        let status = wait_for(&fx.handle, |s| s.is_sending).await;
        assert_eq!(status.last_sent.latitude, None);
        assert_eq!(fx.transport.opens().len(), 2);
        assert_eq!(fx.source.starts(), 2);
    }

    fn written(generation: u64, latitude: f64) -> ChannelEvent<Delivery> {
        let sample = position(latitude, 0.0);
        let [rmc, _, _] = nmea::encode_position(&sample);
        ChannelEvent::Written {
            generation,
            line: rmc.to_wire(),
            tag: Delivery::Position {
                family: rmc.family,
                sample,
            },
            result: Ok(14),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_from_earlier_session_is_dropped() {
        let (mut controller, _handle) = SessionController::new(
            config(),
            Arc::new(MemoryTransport::new()),
            Box::new(ManualSource::new()),
        );
        controller.start();
        let first = controller.channel.as_ref().unwrap().generation();

        controller.stop();
        controller.handle_channel_event(written(first, 41.0));
        assert_eq!(controller.status.last_sent.latitude, None);

        controller.start();
        controller.handle_channel_event(written(first, 42.0));
        assert_eq!(controller.status.last_sent, Default::default());

        // A channel replaced by a reconnect still belongs to this session
        let second = controller.channel.as_ref().unwrap().generation();
        controller.replace_channel();
        controller.handle_channel_event(written(second, 43.0));
        assert_eq!(controller.status.last_sent.latitude, Some(43.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_heading_field_keeps_rate_window() {
        let fx = started(config()).await;
        fx.source.push_heading(HeadingSample {
            true_heading: None,
            ..heading(10.0, 0.0)
        });
        settle().await;
        fx.source.push_heading(heading(10.0, 14.5));
        wait_for(&fx.handle, |s| s.last_sent.heading == Some(14.5)).await;
        assert_eq!(fx.transport.sent(), vec!["$GPHDT,14.500,T*05\n".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_endpoint_replaces_channel() {
        let fx = started(config()).await;
        let mut moved = config();
        moved.endpoint = Endpoint::new("10.0.0.9", 2000);
        fx.handle.reconfigure(moved).await.unwrap();
        settle().await;
        wait_for(&fx.handle, |s| s.connection_status == ConnectionStatus::Connected).await;
        assert_eq!(
            fx.transport.opens(),
            vec![Endpoint::new("10.0.0.5", 10110), Endpoint::new("10.0.0.9", 2000)]
        );
    }
}
