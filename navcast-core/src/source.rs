//! Sample source abstraction.
//!
//! The platform location provider is an external collaborator. The session
//! asks it to start and stop; while running it pushes samples into a
//! [`SampleSink`] from whatever thread or task it likes. Sinks must not block.

use std::sync::Arc;

use crate::sample::{HeadingSample, PositionSample};

/// Receiver of raw samples.
pub trait SampleSink: Send + Sync {
    fn on_position(&self, sample: PositionSample);
    fn on_heading(&self, sample: HeadingSample);
}

/// Producer of raw samples.
pub trait SampleSource: Send {
    /// Begin delivering samples to `sink`.
    fn start(&mut self, sink: Arc<dyn SampleSink>);

    /// Stop delivering. Samples already in flight may still arrive.
    fn stop(&mut self);

    /// Whether the device has a compass at all
    fn heading_available(&self) -> bool {
        true
    }
}

/// Blanket implementation so boxed sources can be passed around as sources
impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn start(&mut self, sink: Arc<dyn SampleSink>) {
        (**self).start(sink)
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn heading_available(&self) -> bool {
        (**self).heading_available()
    }
}
