//! The scope engine: sample feed, trigger evaluation, capture and publishing
//!
//! Everything mutable lives in one [`ScopeState`] behind a mutex. The feed path only ever
//! try-locks it and hands the batch back when a reconfiguration holds the lock; control calls
//! block. One completed capture is published per frame to the [`Renderer`] while the lock is
//! held.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::{debug, trace, warn};

use crate::{
    buffer::CaptureBuffer,
    complex::Sample,
    error::{ConfigError, ConfigResult},
    history::{HistoryMemory, HISTORY_DEPTH},
    monitoring::FeedStats,
    render::Renderer,
    traces::{TraceSet, TraceSpec},
    trigger::{Offer, TriggerChain, TriggerSpec},
    DEFAULT_TRACE_LENGTH, MAX_TRACE_LENGTH,
};

/// Horizontal capture and view settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// Points per trace
    pub trace_length: usize,
    /// Zoom divider, the view shows `trace_length / time_base` points
    pub time_base: u32,
    /// Start of the view, in thousandths of the trace length
    pub time_offset_per_mille: u32,
    /// Points recorded before the trigger sample
    pub pre_trigger: usize,
    /// Capture continuously, ignoring the trigger chain
    pub free_run: bool,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            trace_length: DEFAULT_TRACE_LENGTH,
            time_base: 1,
            time_offset_per_mille: 0,
            pre_trigger: 0,
            free_run: true,
        }
    }
}

impl Timing {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.trace_length == 0 || self.trace_length > MAX_TRACE_LENGTH {
            return Err(ConfigError::InvalidTraceLength(self.trace_length));
        }
        if self.time_base == 0 {
            return Err(ConfigError::InvalidTimeBase(self.time_base));
        }
        if self.time_offset_per_mille > 1000 {
            return Err(ConfigError::InvalidTimeOffset(self.time_offset_per_mille));
        }
        if self.pre_trigger >= self.trace_length {
            return Err(ConfigError::PreTriggerTooLong {
                pre_trigger: self.pre_trigger,
                trace_length: self.trace_length,
            });
        }
        Ok(())
    }

    /// First displayed point and number of visible points
    pub fn view(&self) -> (usize, usize) {
        let shift = self.time_offset_per_mille as usize * self.trace_length / 1000;
        let window = (self.trace_length / self.time_base as usize).max(1);
        (shift, window)
    }
}

/// Where the engine stands with respect to the trigger chain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerState {
    /// Looking for the current stage's edge
    Untriggered,
    /// A stage matched and its delay is counting down
    Delay,
    /// Capturing the rest of a frame
    Triggered,
    /// One-shot frame published, waiting to be re-armed
    Held,
}

struct ScopeState {
    timing: Timing,
    traces: TraceSet,
    chain: TriggerChain,
    live: CaptureBuffer,
    history: HistoryMemory,
    /// Trace delay the buffers are sized for, at least the current largest delay
    alloc_delay: usize,
    /// Samples still needed to complete the frame being captured
    capture: Option<usize>,
    last_trigger: Option<u64>,
    one_shot: bool,
    held: bool,
    focused_trace: usize,
    focused_trigger: usize,
    /// 0 is live, k replays the k-th most recent frame
    history_index: usize,
    renderer: Box<dyn Renderer>,
}

// Lengths and delays are capped at MAX_TRACE_LENGTH and MAX_TRACE_DELAY
fn live_capacity(trace_length: usize, alloc_delay: usize) -> usize {
    trace_length.saturating_mul(4).saturating_add(alloc_delay)
}

impl ScopeState {
    fn new(timing: Timing, renderer: Box<dyn Renderer>) -> Self {
        let mut traces = TraceSet::new(timing.trace_length);
        let (shift, window) = timing.view();
        traces.set_view(shift, window);
        Self {
            timing,
            traces,
            chain: TriggerChain::default(),
            live: CaptureBuffer::new(live_capacity(timing.trace_length, 0)),
            history: HistoryMemory::new(HISTORY_DEPTH, timing.trace_length),
            alloc_delay: 0,
            capture: None,
            last_trigger: None,
            one_shot: false,
            held: false,
            focused_trace: 0,
            focused_trigger: 0,
            history_index: 0,
            renderer,
        }
    }

    /// Drop any partial capture and start looking for a trigger again
    fn rearm(&mut self) {
        self.capture = None;
        self.chain.restart();
        self.traces.reset_runtimes();
    }

    fn reallocate(&mut self) {
        let len = self.timing.trace_length;
        debug!(
            trace_length = len,
            max_delay = self.alloc_delay,
            "Reallocating capture and history buffers"
        );
        self.live = CaptureBuffer::new(live_capacity(len, self.alloc_delay));
        self.history.resize(len + self.alloc_delay);
        if self.history_index > 0 {
            self.history_index = 0;
        }
        self.rearm();
    }

    /// Grow the buffers if a trace delay no longer fits
    fn ensure_capacity(&mut self) {
        let max_delay = self.traces.max_delay();
        if max_delay > self.alloc_delay {
            self.alloc_delay = max_delay;
            self.reallocate();
        }
    }

    fn update_trigger_levels(&mut self) {
        let focused = self.chain.get(self.focused_trigger);
        self.traces.update_trigger_levels(focused);
    }

    fn trigger_state(&self) -> TriggerState {
        if self.capture.is_some() {
            TriggerState::Triggered
        } else if self.held {
            TriggerState::Held
        } else if self.chain.in_delay() {
            TriggerState::Delay
        } else {
            TriggerState::Untriggered
        }
    }

    fn apply_timing(&mut self, timing: Timing) {
        let length_changed = timing.trace_length != self.timing.trace_length;
        self.timing = timing;
        if length_changed {
            self.traces.set_trace_length(timing.trace_length);
            self.alloc_delay = self.traces.max_delay();
            self.reallocate();
        }
        let (shift, window) = timing.view();
        self.traces.set_view(shift, window);
        self.rearm();
        self.replay_history();
    }

    /// Run one batch of at most a trace length through trigger and capture
    fn process_chunk(&mut self, chunk: &[Sample], stats: &FeedStats) {
        self.live.write(chunk);
        let base = self.live.cursor() - chunk.len() as u64;
        let mut i = 0;
        while i < chunk.len() {
            if let Some(remaining) = self.capture {
                let n = remaining.min(chunk.len() - i);
                self.traces.process(&chunk[i..i + n], false);
                i += n;
                if remaining == n {
                    self.capture = None;
                    self.complete_frame(chunk.len() - i, stats);
                } else {
                    self.capture = Some(remaining - n);
                }
                continue;
            }
            if self.held {
                break;
            }
            // No trigger is looked at until the whole look-back behind it has been fed
            let ready = self.look_back_start(base);
            if i < ready {
                i = ready.min(chunk.len());
                continue;
            }
            if self.timing.free_run || self.chain.is_empty() {
                if !self.start_capture(base + i as u64, stats) {
                    i += 1;
                }
                continue;
            }
            while i < chunk.len() {
                if self.chain.offer(chunk[i]) == Offer::Fired {
                    if !self.start_capture(base + i as u64, stats) {
                        i += 1;
                    }
                    break;
                }
                i += 1;
            }
        }
    }

    /// Samples of the live buffer needed before a trigger point
    fn look_back(&self) -> usize {
        self.timing.pre_trigger + self.traces.max_delay()
    }

    /// First index of the chunk starting at `base` with a full look-back behind it
    fn look_back_start(&self, base: u64) -> usize {
        let oldest = self.live.cursor() - self.live.fill() as u64;
        (oldest + self.look_back() as u64).saturating_sub(base) as usize
    }

    /// Trigger at absolute stream position `position`: replay the look-back then go live
    fn start_capture(&mut self, position: u64, stats: &FeedStats) -> bool {
        let pre = self.timing.pre_trigger;
        let max_delay = self.traces.max_delay();
        let lead = self.look_back();
        let Some(window) = position
            .checked_sub(lead as u64)
            .and_then(|start| self.live.window(start, position))
        else {
            warn!(position, lead, "Look-back window unavailable");
            return false;
        };
        trace!(position, pre, max_delay, "Triggered");
        stats.trigger();
        self.last_trigger = Some(position);
        self.traces.begin_frame();
        if max_delay > 0 {
            self.traces.process(&window[..max_delay], true);
        }
        if pre > 0 {
            self.traces.process(&window[max_delay..], false);
        }
        self.capture = Some(self.timing.trace_length - pre);
        true
    }

    /// The last point of a frame landed `offset` samples before the live cursor
    fn complete_frame(&mut self, offset: usize, stats: &FeedStats) {
        self.traces.finish_frame();
        if !self.history.store_from(&self.live, offset) {
            debug!("Frame too early in the stream to keep in history");
        }
        self.publish();
        stats.frame();
        self.chain.restart();
        if self.one_shot {
            debug!("One-shot frame captured, holding");
            self.held = true;
        }
    }

    fn publish(&mut self) {
        let published = self.traces.published();
        self.renderer.publish(&published, self.traces.front());
    }

    /// Process and publish the selected history frame again
    fn replay_history(&mut self) {
        if self.history_index == 0 {
            return;
        }
        let len = self.timing.trace_length;
        let max_delay = self.traces.max_delay();
        let Some(frame) = self.history.recall(self.history_index - 1) else {
            return;
        };
        if frame.len() < len + max_delay {
            return;
        }
        let body = frame.len() - len;
        self.traces.reset_runtimes();
        self.traces.begin_frame();
        if max_delay > 0 {
            self.traces.process(&frame[body - max_delay..body], true);
        }
        self.traces.process(&frame[body..], false);
        self.traces.finish_frame();
        self.publish();
    }
}

pub struct ScopeEngine {
    state: Mutex<ScopeState>,
    stats: FeedStats,
}

impl ScopeEngine {
    /// Engine with default timing, a single X trace and an empty trigger chain
    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self {
            state: Mutex::new(ScopeState::new(Timing::default(), renderer)),
            stats: FeedStats::default(),
        }
    }

    pub fn with_timing(timing: Timing, renderer: Box<dyn Renderer>) -> ConfigResult<Self> {
        timing.validate()?;
        Ok(Self {
            state: Mutex::new(ScopeState::new(timing, renderer)),
            stats: FeedStats::default(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a batch of samples
    ///
    /// Returns false, without consuming anything, when the engine is being reconfigured; the
    /// caller should offer the same batch again.
    pub fn feed(&self, samples: &[Sample], _positive_only: bool) -> bool {
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::WouldBlock) => {
                self.stats.deferred();
                return false;
            }
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };
        self.stats.batch(samples.len());
        if state.history_index > 0 || state.held {
            return true;
        }
        let len = state.timing.trace_length;
        for chunk in samples.chunks(len) {
            state.process_chunk(chunk, &self.stats);
        }
        true
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    pub fn timing(&self) -> Timing {
        self.lock().timing
    }

    pub fn trace_length(&self) -> usize {
        self.lock().timing.trace_length
    }

    pub fn set_timing(&self, timing: Timing) -> ConfigResult<()> {
        if let Err(e) = timing.validate() {
            warn!(?timing, "Rejected timing: {}", e);
            return Err(e);
        }
        debug!(?timing, "Applying timing");
        self.lock().apply_timing(timing);
        Ok(())
    }

    pub fn trace_specs(&self) -> Vec<TraceSpec> {
        self.lock().traces.specs().to_vec()
    }

    pub fn trace_count(&self) -> usize {
        self.lock().traces.len()
    }

    /// Append a Y trace, returning its index
    pub fn add_trace(&self, spec: TraceSpec) -> ConfigResult<usize> {
        let mut state = self.lock();
        let index = state.traces.add(spec).map_err(log_rejected)?;
        debug!(index, "Trace added");
        state.ensure_capacity();
        state.rearm();
        state.update_trigger_levels();
        state.replay_history();
        Ok(index)
    }

    pub fn change_trace(&self, index: usize, spec: TraceSpec) -> ConfigResult<()> {
        let mut state = self.lock();
        let vertical = state.traces.change(index, spec).map_err(log_rejected)?;
        debug!(index, vertical, "Trace changed");
        state.ensure_capacity();
        if vertical {
            state.update_trigger_levels();
        }
        state.replay_history();
        Ok(())
    }

    pub fn remove_trace(&self, index: usize) -> ConfigResult<TraceSpec> {
        let mut state = self.lock();
        let spec = state.traces.remove(index).map_err(log_rejected)?;
        debug!(index, "Trace removed");
        if state.focused_trace >= state.traces.len() {
            state.focused_trace = state.traces.len() - 1;
        }
        state.rearm();
        state.update_trigger_levels();
        state.replay_history();
        Ok(spec)
    }

    /// Swap a trace with its neighbour, returning its new index
    pub fn move_trace(&self, index: usize, up: bool) -> ConfigResult<usize> {
        let mut state = self.lock();
        let moved = state.traces.move_trace(index, up).map_err(log_rejected)?;
        debug!(from = index, to = moved, "Trace moved");
        state.update_trigger_levels();
        state.replay_history();
        Ok(moved)
    }

    pub fn focus_trace(&self, index: usize) -> ConfigResult<()> {
        let mut state = self.lock();
        let count = state.traces.len();
        if index >= count {
            return Err(log_rejected(ConfigError::TraceIndexOutOfRange { index, count }));
        }
        state.focused_trace = index;
        Ok(())
    }

    pub fn focused_trace(&self) -> usize {
        self.lock().focused_trace
    }

    pub fn trigger_specs(&self) -> Vec<TriggerSpec> {
        self.lock().chain.specs().cloned().collect()
    }

    pub fn trigger_count(&self) -> usize {
        self.lock().chain.len()
    }

    /// Append a stage to the trigger chain, returning its index
    pub fn add_trigger(&self, spec: TriggerSpec) -> ConfigResult<usize> {
        let mut state = self.lock();
        state.chain.add(spec).map_err(log_rejected)?;
        let index = state.chain.len() - 1;
        debug!(index, "Trigger added");
        state.rearm();
        state.update_trigger_levels();
        Ok(index)
    }

    pub fn change_trigger(&self, index: usize, spec: TriggerSpec) -> ConfigResult<()> {
        let mut state = self.lock();
        state.chain.change(index, spec).map_err(log_rejected)?;
        debug!(index, "Trigger changed");
        state.update_trigger_levels();
        state.replay_history();
        Ok(())
    }

    pub fn remove_trigger(&self, index: usize) -> ConfigResult<TriggerSpec> {
        let mut state = self.lock();
        let spec = state.chain.remove(index).map_err(log_rejected)?;
        debug!(index, "Trigger removed");
        if state.focused_trigger >= state.chain.len() {
            state.focused_trigger = state.chain.len().saturating_sub(1);
        }
        state.rearm();
        state.update_trigger_levels();
        state.replay_history();
        Ok(spec)
    }

    /// Swap a trigger stage with its neighbour, returning its new index
    pub fn move_trigger(&self, index: usize, up: bool) -> ConfigResult<usize> {
        let mut state = self.lock();
        let moved = state.chain.move_stage(index, up).map_err(log_rejected)?;
        debug!(from = index, to = moved, "Trigger moved");
        state.rearm();
        state.update_trigger_levels();
        Ok(moved)
    }

    pub fn focus_trigger(&self, index: usize) -> ConfigResult<()> {
        let mut state = self.lock();
        let count = state.chain.len();
        if index >= count {
            return Err(log_rejected(ConfigError::TriggerIndexOutOfRange { index, count }));
        }
        state.focused_trigger = index;
        state.update_trigger_levels();
        state.replay_history();
        Ok(())
    }

    pub fn focused_trigger(&self) -> usize {
        self.lock().focused_trigger
    }

    /// Focused trigger level in the display units of trace `index`
    ///
    /// `None` when the trace and the trigger don't share a projection, or there is no trigger.
    pub fn trigger_display_level(&self, index: usize) -> Option<f32> {
        self.lock().traces.trigger_level(index)
    }

    pub fn trigger_state(&self) -> TriggerState {
        self.lock().trigger_state()
    }

    /// Absolute stream position of the most recent trigger sample
    pub fn last_trigger_position(&self) -> Option<u64> {
        self.lock().last_trigger
    }

    /// Hold after the next published frame; turning it off releases a held engine
    pub fn set_one_shot(&self, one_shot: bool) {
        let mut state = self.lock();
        debug!(one_shot, "One-shot");
        state.one_shot = one_shot;
        if !one_shot && state.held {
            state.held = false;
            state.rearm();
        }
    }

    /// Release a held one-shot and wait for the next trigger
    pub fn reset_one_shot(&self) {
        let mut state = self.lock();
        debug!("One-shot re-armed");
        state.held = false;
        state.rearm();
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn history_index(&self) -> usize {
        self.lock().history_index
    }

    /// Select what is displayed: 0 is live, `k` freezes on the k-th most recent frame
    pub fn set_history_index(&self, index: usize) -> ConfigResult<()> {
        let mut state = self.lock();
        let depth = state.history.depth();
        if index >= depth || index > state.history.len() {
            return Err(log_rejected(ConfigError::HistoryIndexOutOfRange {
                index,
                depth,
            }));
        }
        if index == state.history_index {
            return Ok(());
        }
        debug!(index, "History index");
        let was_live = state.history_index == 0;
        state.history_index = index;
        if index == 0 {
            state.rearm();
        } else {
            if was_live {
                state.capture = None;
            }
            state.replay_history();
        }
        Ok(())
    }
}

fn log_rejected(e: ConfigError) -> ConfigError {
    warn!("Rejected configuration: {}", e);
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        projector::Projection,
        render::{ChannelRenderer, Frame},
        traces::MAX_TRACE_DELAY,
        trigger::Edge,
    };
    use crossbeam_channel::Receiver;

    fn engine(timing: Timing) -> (ScopeEngine, Receiver<Frame>) {
        let (renderer, rx) = ChannelRenderer::bounded(64);
        let engine = ScopeEngine::with_timing(timing, Box::new(renderer)).unwrap();
        (engine, rx)
    }

    fn real_ramp(from: usize, n: usize) -> Vec<Sample> {
        (from..from + n).map(|i| Sample::new(i as f32, 0.0)).collect()
    }

    fn ys_of(frame: &Frame, trace: usize) -> Vec<f32> {
        frame.traces[trace].points.iter().map(|p| p.1).collect()
    }

    #[test]
    fn test_timing_validation() {
        let timing = Timing {
            trace_length: 10,
            pre_trigger: 10,
            ..Default::default()
        };
        assert_eq!(
            timing.validate(),
            Err(ConfigError::PreTriggerTooLong {
                pre_trigger: 10,
                trace_length: 10
            })
        );
        let timing = Timing {
            time_base: 0,
            ..Default::default()
        };
        assert_eq!(timing.validate(), Err(ConfigError::InvalidTimeBase(0)));
        let timing = Timing {
            trace_length: MAX_TRACE_LENGTH + 1,
            ..Default::default()
        };
        assert_eq!(
            timing.validate(),
            Err(ConfigError::InvalidTraceLength(MAX_TRACE_LENGTH + 1))
        );
        assert!(Timing::default().validate().is_ok());
    }

    #[test]
    fn test_view() {
        let timing = Timing {
            trace_length: 1000,
            time_base: 4,
            time_offset_per_mille: 100,
            ..Default::default()
        };
        assert_eq!(timing.view(), (100, 250));
    }

    #[test]
    fn test_free_run_publishes_every_trace_length() {
        let (engine, rx) = engine(Timing {
            trace_length: 8,
            ..Default::default()
        });
        let samples: Vec<Sample> = (0..24).map(|i| Sample::new(i as f32 / 32.0, 0.0)).collect();
        assert!(engine.feed(&samples, false));
        let frames: Vec<Frame> = rx.try_iter().collect();
        assert_eq!(frames.len(), 3);
        for (n, frame) in frames.iter().enumerate() {
            let expected: Vec<f32> = samples[n * 8..(n + 1) * 8].iter().map(|s| s.re).collect();
            assert_eq!(ys_of(frame, 0), expected);
        }
    }

    #[test]
    fn test_trigger_with_pre_trigger() {
        let (engine, rx) = engine(Timing {
            trace_length: 8,
            pre_trigger: 2,
            free_run: false,
            ..Default::default()
        });
        engine
            .add_trigger(TriggerSpec {
                level: 0.5,
                ..Default::default()
            })
            .unwrap();
        let mut samples = vec![Sample::new(0.1, 0.0); 10];
        samples.extend((0..10).map(|i| Sample::new(0.6 + i as f32 * 0.01, 0.0)));
        engine.feed(&samples, false);
        assert_eq!(engine.last_trigger_position(), Some(10));
        let frame = rx.try_recv().unwrap();
        let ys = ys_of(&frame, 0);
        assert_eq!(ys[..2], [0.1, 0.1]);
        assert_eq!(ys[2], 0.6);
        assert_eq!(engine.trigger_state(), TriggerState::Untriggered);
    }

    #[test]
    fn test_one_shot_holds_until_reset() {
        let (engine, rx) = engine(Timing {
            trace_length: 4,
            ..Default::default()
        });
        engine.set_one_shot(true);
        engine.feed(&real_ramp(0, 16), false);
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(engine.trigger_state(), TriggerState::Held);
        engine.reset_one_shot();
        engine.feed(&real_ramp(16, 16), false);
        assert_eq!(rx.try_iter().count(), 1);
        engine.set_one_shot(false);
        engine.feed(&real_ramp(32, 16), false);
        assert_eq!(rx.try_iter().count(), 4);
    }

    #[test]
    fn test_trace_delay_lags_x_trace() {
        let (engine, rx) = engine(Timing {
            trace_length: 4,
            ..Default::default()
        });
        engine
            .add_trace(TraceSpec {
                delay: 3,
                ..Default::default()
            })
            .unwrap();
        let samples: Vec<Sample> = (0..12).map(|i| Sample::new(i as f32 / 16.0, 0.0)).collect();
        engine.feed(&samples, false);
        let frames: Vec<Frame> = rx.try_iter().collect();
        // Capture starts once three samples are there to delay from
        assert_eq!(frames.len(), 2);
        assert_eq!(ys_of(&frames[0], 0), vec![0.1875, 0.25, 0.3125, 0.375]);
        assert_eq!(ys_of(&frames[0], 1), vec![0.0, 0.0625, 0.125, 0.1875]);
        assert_eq!(ys_of(&frames[1], 0), vec![0.4375, 0.5, 0.5625, 0.625]);
        assert_eq!(ys_of(&frames[1], 1), vec![0.25, 0.3125, 0.375, 0.4375]);
    }

    #[test]
    fn test_no_trigger_before_pre_trigger_is_fed() {
        let (engine, rx) = engine(Timing {
            trace_length: 8,
            pre_trigger: 4,
            free_run: false,
            ..Default::default()
        });
        engine
            .add_trigger(TriggerSpec {
                level: 0.5,
                ..Default::default()
            })
            .unwrap();
        let mut samples = vec![Sample::new(-0.25, 0.0)];
        samples.extend(vec![Sample::new(0.75, 0.0); 7]);
        engine.feed(&samples, false);
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.last_trigger_position(), None);

        let mut samples = vec![Sample::new(-0.25, 0.0); 2];
        samples.extend(vec![Sample::new(0.75, 0.0); 8]);
        engine.feed(&samples, false);
        assert_eq!(engine.last_trigger_position(), Some(10));
        let frame = rx.try_recv().unwrap();
        assert_eq!(ys_of(&frame, 0)[..5], [0.75, 0.75, -0.25, -0.25, 0.75]);
    }

    #[test]
    fn test_trace_length_change_reallocates() {
        let (engine, rx) = engine(Timing {
            trace_length: 4,
            ..Default::default()
        });
        let samples: Vec<Sample> = (0..32).map(|i| Sample::new(i as f32 / 64.0, 0.0)).collect();
        engine.feed(&samples[..6], false);
        assert_eq!(rx.try_iter().count(), 1);

        engine
            .set_timing(Timing {
                trace_length: 8,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(engine.trace_length(), 8);
        assert_eq!(engine.trigger_state(), TriggerState::Untriggered);
        assert_eq!(engine.history_len(), 0);
        engine.feed(&samples[6..22], false);
        let frames: Vec<Frame> = rx.try_iter().collect();
        assert_eq!(frames.len(), 2);
        for (n, frame) in frames.iter().enumerate() {
            let start = 6 + n * 8;
            let expected: Vec<f32> = samples[start..start + 8].iter().map(|s| s.re).collect();
            assert_eq!(ys_of(frame, 0), expected);
        }
    }

    #[test]
    fn test_growing_delay_reallocates() {
        let len = 8;
        let delay = 40;
        let (engine, rx) = engine(Timing {
            trace_length: len,
            ..Default::default()
        });
        engine.add_trace(TraceSpec::default()).unwrap();
        let samples: Vec<Sample> = (0..200).map(|i| Sample::new(i as f32 / 256.0, 0.0)).collect();
        engine.feed(&samples[..20], false);
        rx.try_iter().count();

        engine
            .change_trace(
                1,
                TraceSpec {
                    delay,
                    ..Default::default()
                },
            )
            .unwrap();
        engine.feed(&samples[20..], false);
        let frames: Vec<Frame> = rx.try_iter().collect();
        // 180 samples into a fresh buffer, the first 40 only feed the delay line
        assert_eq!(frames.len(), 17);
        for frame in &frames {
            let x = ys_of(frame, 0);
            let y = ys_of(frame, 1);
            let first = (x[0] * 256.0) as usize;
            assert!(first >= 20 + delay);
            for p in 0..len {
                assert_eq!(y[p], samples[first + p - delay].re);
            }
        }
    }

    #[test]
    fn test_oversized_delay_is_rejected() {
        let (engine, rx) = engine(Timing {
            trace_length: 4,
            ..Default::default()
        });
        let huge = TraceSpec {
            delay: MAX_TRACE_DELAY + 1,
            ..Default::default()
        };
        let err = ConfigError::TraceDelayTooLong {
            delay: MAX_TRACE_DELAY + 1,
            max: MAX_TRACE_DELAY,
        };
        assert_eq!(engine.add_trace(huge.clone()), Err(err.clone()));
        assert_eq!(engine.change_trace(0, huge), Err(err));
        assert_eq!(engine.trace_count(), 1);
        assert_eq!(engine.trace_specs()[0], TraceSpec::default());
        assert!(engine.feed(&real_ramp(0, 4), false));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_trigger_display_level() {
        let (engine, _rx) = engine(Timing::default());
        assert_eq!(engine.trigger_display_level(0), None);
        engine
            .add_trigger(TriggerSpec {
                level: 0.25,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(engine.trigger_display_level(0), Some(0.25));
        engine
            .change_trace(
                0,
                TraceSpec {
                    amp: 2.0,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(engine.trigger_display_level(0), Some(0.5));
        engine
            .change_trigger(
                0,
                TriggerSpec {
                    projection: Projection::Imag,
                    edge: Edge::Falling,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(engine.trigger_display_level(0), None);
    }

    #[test]
    fn test_rejected_config_leaves_state() {
        let (engine, _rx) = engine(Timing::default());
        assert_eq!(
            engine.remove_trace(0),
            Err(ConfigError::CannotRemoveXTrace)
        );
        assert!(engine.change_trigger(3, TriggerSpec::default()).is_err());
        assert!(engine
            .set_timing(Timing {
                time_offset_per_mille: 1001,
                ..Default::default()
            })
            .is_err());
        assert_eq!(engine.trace_count(), 1);
        assert_eq!(engine.trigger_count(), 0);
        assert_eq!(engine.timing(), Timing::default());
    }

    #[test]
    fn test_feed_deferred_while_locked() {
        let (engine, _rx) = engine(Timing {
            trace_length: 4,
            ..Default::default()
        });
        {
            let _guard = engine.lock();
            assert!(!engine.feed(&real_ramp(0, 4), false));
        }
        assert!(engine.feed(&real_ramp(0, 4), false));
        let stats = engine.stats().snapshot();
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.samples, 4);
        assert_eq!(stats.frames, 1);
    }

    #[test]
    fn test_history_replay() {
        let (engine, rx) = engine(Timing {
            trace_length: 4,
            ..Default::default()
        });
        let samples: Vec<Sample> = (0..12).map(|i| Sample::new(i as f32 / 16.0, 0.0)).collect();
        engine.feed(&samples, false);
        assert_eq!(rx.try_iter().count(), 3);
        assert_eq!(engine.history_len(), 3);
        assert!(engine.set_history_index(4).is_err());

        engine.set_history_index(2).unwrap();
        let replayed = rx.try_recv().unwrap();
        assert_eq!(ys_of(&replayed, 0), vec![0.25, 0.3125, 0.375, 0.4375]);

        // Frozen: live samples are ignored, changes replay the frozen frame
        engine.feed(&samples, false);
        assert!(rx.try_recv().is_err());
        engine
            .change_trace(0, TraceSpec { amp: 2.0, ..Default::default() })
            .unwrap();
        assert_eq!(ys_of(&rx.try_recv().unwrap(), 0), vec![0.5, 0.625, 0.75, 0.875]);

        engine.set_history_index(0).unwrap();
        engine.feed(&samples[..4], false);
        assert_eq!(rx.try_iter().count(), 1);
    }
}
