//! Displayable traces and their double buffered output
//!
//! Trace 0 is the X trace and always exists. Each capture fills the back side of the
//! [`DisplayBuffer`] pair; finishing a frame flips it to the front where the renderer reads it.

use crate::{
    complex::Sample,
    error::ConfigError,
    projector::{CacheRole, Projection, ProjectionCache, Projector},
    render::{Color, PublishedTrace},
    trigger::TriggerSpec,
    MAX_TRACE_LENGTH,
};

/// Most traces a set may hold, X trace included
pub const MAX_TRACES: usize = 10;

/// Longest per-trace delay, in samples
pub const MAX_TRACE_DELAY: usize = MAX_TRACE_LENGTH;

#[derive(Clone, Debug, PartialEq)]
pub struct TraceSpec {
    pub projection: Projection,
    /// Amplification factor
    pub amp: f32,
    /// Offset, in display units of the projection
    pub offset: f32,
    /// Delay in samples relative to the X trace
    pub delay: usize,
    pub color: Color,
    pub visible: bool,
}

impl Default for TraceSpec {
    fn default() -> Self {
        Self {
            projection: Projection::Real,
            amp: 1.0,
            offset: 0.0,
            delay: 0,
            color: Color::new(255, 255, 64),
            visible: true,
        }
    }
}

impl TraceSpec {
    /// Map a projected value to the [-1, 1] display range
    pub fn to_display(&self, v: f32) -> f32 {
        let y = match self.projection {
            Projection::MagLin => (v - self.offset) * self.amp - 1.0,
            Projection::MagDb => ((v - 100.0 * self.offset) / 50.0 + 2.0) * self.amp - 1.0,
            _ => (v - self.offset) * self.amp,
        };
        if y.is_nan() {
            0.0
        } else {
            y.clamp(-1.0, 1.0)
        }
    }

    /// Where a trigger's level falls on this trace, if it triggers on the same projection
    pub fn trigger_display_level(&self, trigger: &TriggerSpec) -> Option<f32> {
        (trigger.projection == self.projection)
            .then(|| self.to_display(trigger.projection.native_level(trigger.level)))
    }

    /// True if switching to `other` changes how values land on screen
    pub fn is_vertical_display_change(&self, other: &TraceSpec) -> bool {
        self.projection != other.projection || self.amp != other.amp || self.offset != other.offset
    }

    fn check_delay(&self) -> Result<(), ConfigError> {
        if self.delay > MAX_TRACE_DELAY {
            return Err(ConfigError::TraceDelayTooLong {
                delay: self.delay,
                max: MAX_TRACE_DELAY,
            });
        }
        Ok(())
    }
}

/// Which half of the display double buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Even,
    Odd,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Even => Side::Odd,
            Side::Odd => Side::Even,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::Even => 0,
            Side::Odd => 1,
        }
    }
}

/// One side of the double buffer: `count` traces of `trace_length` (x, y) points
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayBuffer {
    traces: Vec<Vec<(f32, f32)>>,
    trace_length: usize,
}

impl DisplayBuffer {
    pub fn new(count: usize, trace_length: usize) -> Self {
        let mut buffer = Self::default();
        buffer.init(count, trace_length, 0);
        buffer
    }

    /// Reallocate and lay out x coordinates, y at zero
    fn init(&mut self, count: usize, trace_length: usize, shift: usize) {
        self.trace_length = trace_length;
        self.traces.resize_with(count, Vec::new);
        for trace in self.traces.iter_mut() {
            trace.clear();
            trace.extend((0..trace_length).map(|i| (i as f32 - shift as f32, 0.0)));
        }
    }

    pub fn count(&self) -> usize {
        self.traces.len()
    }

    pub fn trace_length(&self) -> usize {
        self.trace_length
    }

    pub fn trace(&self, index: usize) -> Option<&[(f32, f32)]> {
        self.traces.get(index).map(Vec::as_slice)
    }
}

/// Execution state of one trace
#[derive(Clone, Debug, Default)]
pub struct TraceRuntime {
    projector: Projector,
    /// Write cursor into each side
    counts: [usize; 2],
    max_pow: f64,
    sum_pow: f64,
    nb_pow: usize,
    overlay: Option<String>,
}

impl TraceRuntime {
    fn new(spec: &TraceSpec) -> Self {
        Self {
            projector: Projector::new(spec.projection),
            ..Default::default()
        }
    }

    fn reset(&mut self) {
        self.counts = [0, 0];
        self.max_pow = 0.0;
        self.sum_pow = 0.0;
        self.nb_pow = 0;
    }

    fn accumulate_power(&mut self, magsq: f64) {
        if magsq > 0.0 {
            self.max_pow = self.max_pow.max(magsq);
            self.sum_pow += magsq;
            self.nb_pow += 1;
        }
    }

    /// "peak  average  peak-to-average" in dB over the visible window
    fn close_overlay(&mut self) {
        if self.nb_pow == 0 {
            return;
        }
        let avg = 10.0 * (self.sum_pow / self.nb_pow as f64).log10();
        let peak = 10.0 * self.max_pow.log10();
        self.overlay = Some(format!("{:.1}  {:.1}  {:>4.1}", peak, avg, peak - avg));
        self.nb_pow = 0;
    }
}

#[derive(Clone, Debug)]
pub struct TraceSet {
    specs: Vec<TraceSpec>,
    runtimes: Vec<TraceRuntime>,
    trigger_levels: Vec<Option<f32>>,
    sides: [DisplayBuffer; 2],
    /// Side the renderer may read
    front: Side,
    trace_length: usize,
    /// First displayed point, the x origin
    shift: usize,
    /// Visible points from `shift`
    window: usize,
    cache: ProjectionCache,
}

impl TraceSet {
    pub fn new(trace_length: usize) -> Self {
        let x = TraceSpec::default();
        let mut set = Self {
            runtimes: vec![TraceRuntime::new(&x)],
            specs: vec![x],
            trigger_levels: vec![None],
            sides: [DisplayBuffer::default(), DisplayBuffer::default()],
            front: Side::Even,
            trace_length,
            shift: 0,
            window: trace_length,
            cache: ProjectionCache::default(),
        };
        set.init_buffers();
        set
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn specs(&self) -> &[TraceSpec] {
        &self.specs
    }

    pub fn spec(&self, index: usize) -> Option<&TraceSpec> {
        self.specs.get(index)
    }

    pub fn trace_length(&self) -> usize {
        self.trace_length
    }

    fn check_index(&self, index: usize) -> Result<(), ConfigError> {
        if index < self.specs.len() {
            Ok(())
        } else {
            Err(ConfigError::TraceIndexOutOfRange {
                index,
                count: self.specs.len(),
            })
        }
    }

    /// Append a Y trace, returning its index
    pub fn add(&mut self, spec: TraceSpec) -> Result<usize, ConfigError> {
        if self.specs.len() >= MAX_TRACES {
            return Err(ConfigError::TooManyTraces(MAX_TRACES));
        }
        spec.check_delay()?;
        self.runtimes.push(TraceRuntime::new(&spec));
        self.specs.push(spec);
        self.trigger_levels.push(None);
        self.init_buffers();
        self.elect_cache_masters();
        Ok(self.specs.len() - 1)
    }

    /// Replace a trace definition; true if the vertical display mapping changed
    pub fn change(&mut self, index: usize, spec: TraceSpec) -> Result<bool, ConfigError> {
        self.check_index(index)?;
        spec.check_delay()?;
        let vertical = self.specs[index].is_vertical_display_change(&spec);
        self.runtimes[index].projector.set_projection(spec.projection);
        self.specs[index] = spec;
        self.elect_cache_masters();
        Ok(vertical)
    }

    pub fn remove(&mut self, index: usize) -> Result<TraceSpec, ConfigError> {
        self.check_index(index)?;
        if index == 0 {
            return Err(ConfigError::CannotRemoveXTrace);
        }
        self.runtimes.remove(index);
        self.trigger_levels.remove(index);
        let spec = self.specs.remove(index);
        self.init_buffers();
        self.elect_cache_masters();
        Ok(spec)
    }

    /// Swap a trace with its neighbour, wrapping when moving up past the end
    ///
    /// The X slot itself stays; only definitions move through it. Returns the new index.
    pub fn move_trace(&mut self, index: usize, up: bool) -> Result<usize, ConfigError> {
        self.check_index(index)?;
        if !up && index == 0 {
            return Ok(0);
        }
        let other = if up { (index + 1) % self.specs.len() } else { index - 1 };
        self.specs.swap(index, other);
        self.runtimes.swap(index, other);
        self.trigger_levels.swap(index, other);
        self.elect_cache_masters();
        Ok(other)
    }

    /// Largest per-trace delay
    pub fn max_delay(&self) -> usize {
        self.specs.iter().map(|s| s.delay).max().unwrap_or(0)
    }

    pub fn set_trace_length(&mut self, trace_length: usize) {
        self.trace_length = trace_length;
        self.init_buffers();
        self.reset_runtimes();
    }

    /// Horizontal view: first displayed point and number of visible points
    pub fn set_view(&mut self, shift: usize, window: usize) {
        self.shift = shift;
        self.window = window;
        self.init_buffers();
    }

    pub fn reset_runtimes(&mut self) {
        for runtime in self.runtimes.iter_mut() {
            runtime.reset();
        }
    }

    fn init_buffers(&mut self) {
        let count = self.specs.len();
        for side in self.sides.iter_mut() {
            side.init(count, self.trace_length, self.shift);
        }
    }

    /// First trace of each projection shared by several traces computes for the others
    fn elect_cache_masters(&mut self) {
        let mut counts = [0usize; Projection::COUNT];
        for spec in &self.specs {
            counts[spec.projection.index()] += 1;
        }
        let mut seen = [false; Projection::COUNT];
        for (spec, runtime) in self.specs.iter().zip(self.runtimes.iter_mut()) {
            let i = spec.projection.index();
            let role = if counts[i] < 2 {
                CacheRole::Off
            } else if seen[i] {
                CacheRole::Reader
            } else {
                CacheRole::Master
            };
            seen[i] = true;
            runtime.projector.set_role(role);
        }
    }

    /// Recompute where the focused trigger's level lands on every trace
    pub fn update_trigger_levels(&mut self, focused: Option<&TriggerSpec>) {
        for (spec, level) in self.specs.iter().zip(self.trigger_levels.iter_mut()) {
            *level = focused.and_then(|t| spec.trigger_display_level(t));
        }
    }

    pub fn trigger_level(&self, index: usize) -> Option<f32> {
        self.trigger_levels.get(index).copied().flatten()
    }

    pub fn overlay(&self, index: usize) -> Option<&str> {
        self.runtimes.get(index).and_then(|r| r.overlay.as_deref())
    }

    /// Start filling the back side
    pub fn begin_frame(&mut self) {
        let back = self.front.other().index();
        for runtime in self.runtimes.iter_mut() {
            runtime.counts[back] = 0;
            runtime.max_pow = 0.0;
            runtime.sum_pow = 0.0;
            runtime.nb_pow = 0;
        }
    }

    /// Project a contiguous run of samples into the back side
    ///
    /// In a trace-back run a trace only starts recording once no more than its own delay
    /// remains in the run, so each trace lags the X trace by exactly its delay.
    pub fn process(&mut self, samples: &[Sample], traceback: bool) {
        let back = self.front.other().index();
        let side = &mut self.sides[back];
        let len = self.trace_length;
        let shift = self.shift;
        let window_end = shift + self.window;

        for (j, s) in samples.iter().enumerate() {
            let remaining = samples.len() - j;
            for ((spec, runtime), points) in self
                .specs
                .iter()
                .zip(self.runtimes.iter_mut())
                .zip(side.traces.iter_mut())
            {
                let count = runtime.counts[back];
                let active = !(traceback && remaining > spec.delay) && count < len;
                if !active && runtime.projector.role() == CacheRole::Reader {
                    continue;
                }
                // Computing projectors see every sample so the cache and phase state stay current
                let v = runtime.projector.run_cached(*s, &mut self.cache);
                if !active {
                    continue;
                }
                if spec.projection == Projection::MagDb && count >= shift && count < window_end {
                    runtime.accumulate_power(s.norm_sqr() as f64);
                }
                points[count] = (count as f32 - shift as f32, spec.to_display(v));
                runtime.counts[back] = count + 1;
            }
        }
    }

    /// Close the frame and flip it to the front
    pub fn finish_frame(&mut self) {
        for (spec, runtime) in self.specs.iter().zip(self.runtimes.iter_mut()) {
            if spec.projection == Projection::MagDb {
                runtime.close_overlay();
            } else {
                runtime.overlay = None;
            }
        }
        self.front = self.front.other();
    }

    pub fn front_side(&self) -> Side {
        self.front
    }

    pub fn front(&self) -> &DisplayBuffer {
        &self.sides[self.front.index()]
    }

    /// Borrowed view of the front side for the renderer
    pub fn published(&self) -> Vec<PublishedTrace<'_>> {
        let front = self.front();
        self.specs
            .iter()
            .enumerate()
            .map(|(i, spec)| PublishedTrace {
                spec,
                points: front.trace(i).unwrap_or(&[]),
                trigger_level: self.trigger_level(i),
                overlay: self.overlay(i),
            })
            .collect()
    }
}
