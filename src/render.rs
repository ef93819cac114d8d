//! The renderer side of the double buffer
//!
//! The engine calls [`Renderer::publish`] once per completed capture, with the lock held and
//! the freshly filled side of the display buffer. A renderer must consume or copy it before
//! returning; the next publish may reuse the other side immediately.

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::trace;

use crate::{
    projector::Projection,
    traces::{DisplayBuffer, TraceSpec},
};

/// Trace display color
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Everything published for one trace of a frame
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedTrace<'a> {
    pub spec: &'a TraceSpec,
    /// (x, y) display points, y in [-1, 1]
    pub points: &'a [(f32, f32)],
    /// Focused trigger level in this trace's display units, if it applies
    pub trigger_level: Option<f32>,
    /// Power overlay annotation for dB traces
    pub overlay: Option<&'a str>,
}

pub trait Renderer: Send {
    fn publish(&mut self, traces: &[PublishedTrace<'_>], side: &DisplayBuffer);
}

/// Drops every frame
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn publish(&mut self, _traces: &[PublishedTrace<'_>], _side: &DisplayBuffer) {}
}

/// Owned copy of one trace of a published frame
#[derive(Clone, Debug, PartialEq)]
pub struct FrameTrace {
    pub projection: Projection,
    pub color: Color,
    pub visible: bool,
    pub points: Vec<(f32, f32)>,
    pub trigger_level: Option<f32>,
    pub overlay: Option<String>,
}

/// Owned copy of a whole published frame
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Sequence number of this publish, starting at 0
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub traces: Vec<FrameTrace>,
}

impl Frame {
    pub fn from_published(sequence: u64, traces: &[PublishedTrace<'_>]) -> Self {
        Self {
            sequence,
            captured_at: Utc::now(),
            traces: traces
                .iter()
                .map(|t| FrameTrace {
                    projection: t.spec.projection,
                    color: t.spec.color,
                    visible: t.spec.visible,
                    points: t.points.to_vec(),
                    trigger_level: t.trigger_level,
                    overlay: t.overlay.map(str::to_owned),
                })
                .collect(),
        }
    }
}

/// Copies each frame into a bounded channel for a renderer living on another thread
///
/// Frames are dropped, not queued, when the receiver lags behind.
#[derive(Debug)]
pub struct ChannelRenderer {
    sender: Sender<Frame>,
    sequence: u64,
    dropped: u64,
}

impl ChannelRenderer {
    pub fn new(sender: Sender<Frame>) -> Self {
        Self {
            sender,
            sequence: 0,
            dropped: 0,
        }
    }

    /// A renderer and the receiving end of its channel
    pub fn bounded(capacity: usize) -> (Self, Receiver<Frame>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(tx), rx)
    }

    /// Frames the receiver was too slow to take
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Renderer for ChannelRenderer {
    fn publish(&mut self, traces: &[PublishedTrace<'_>], _side: &DisplayBuffer) {
        let frame = Frame::from_published(self.sequence, traces);
        self.sequence += 1;
        match self.sender.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                self.dropped += 1;
                trace!(sequence = frame.sequence, "renderer lagging, frame dropped");
            }
            // Nobody listening anymore, we don't care
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
