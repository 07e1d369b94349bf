//! Test doubles for the transport and the sample source.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use navcast_core::{
    ChannelError, Endpoint, HeadingSample, PositionSample, SampleSink, SampleSource,
};

use crate::transport::{DatagramLink, DatagramTransport};

#[derive(Default)]
struct MemoryState {
    opens: Vec<Endpoint>,
    sent: Vec<String>,
    fail_open: Option<ChannelError>,
    fail_send: Option<ChannelError>,
}

/// Records opens and sent lines instead of touching the network.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(&self, error: ChannelError) {
        self.inner.lock().unwrap().fail_open = Some(error);
    }

    pub fn fail_send(&self, error: ChannelError) {
        self.inner.lock().unwrap().fail_send = Some(error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.inner.lock().unwrap();
        state.fail_open = None;
        state.fail_send = None;
    }

    pub fn opens(&self) -> Vec<Endpoint> {
        self.inner.lock().unwrap().opens.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl DatagramTransport for MemoryTransport {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn DatagramLink>, ChannelError> {
        let mut state = self.inner.lock().unwrap();
        state.opens.push(endpoint.clone());
        if let Some(e) = state.fail_open.clone() {
            return Err(e);
        }
        Ok(Box::new(MemoryLink {
            inner: self.inner.clone(),
        }))
    }
}

struct MemoryLink {
    inner: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl DatagramLink for MemoryLink {
    async fn send(&self, payload: &[u8]) -> Result<usize, ChannelError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(e) = state.fail_send.clone() {
            return Err(e);
        }
        state.sent.push(String::from_utf8_lossy(payload).into_owned());
        Ok(payload.len())
    }
}

#[derive(Default)]
struct ManualState {
    sink: Option<Arc<dyn SampleSink>>,
    starts: usize,
    stops: usize,
}

/// Sample source driven by the test.
#[derive(Clone, Default)]
pub struct ManualSource {
    inner: Arc<Mutex<ManualState>>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_position(&self, sample: PositionSample) {
        let sink = self.inner.lock().unwrap().sink.clone();
        if let Some(sink) = sink {
            sink.on_position(sample);
        }
    }

    pub fn push_heading(&self, sample: HeadingSample) {
        let sink = self.inner.lock().unwrap().sink.clone();
        if let Some(sink) = sink {
            sink.on_heading(sample);
        }
    }

    pub fn starts(&self) -> usize {
        self.inner.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.inner.lock().unwrap().stops
    }
}

impl SampleSource for ManualSource {
    fn start(&mut self, sink: Arc<dyn SampleSink>) {
        let mut state = self.inner.lock().unwrap();
        state.sink = Some(sink);
        state.starts += 1;
    }

    fn stop(&mut self) {
        let mut state = self.inner.lock().unwrap();
        state.sink = None;
        state.stops += 1;
    }
}
