//! Trigger condition chain
//!
//! An ordered list of trigger stages, evaluated sample by sample. Only the current stage is
//! looked at; when it matches (after its repeats and delay) the chain moves on to the next
//! stage, and a match of the last stage fires the whole chain.

use tracing::trace;

use crate::{
    complex::Sample,
    error::ConfigError,
    projector::{Projection, Projector},
    render::Color,
};

/// Most stages a chain may hold
pub const MAX_TRIGGERS: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Edge {
    /// prev <= level < cur
    #[default]
    Rising,
    /// prev >= level > cur
    Falling,
    /// Any change of the above-level condition
    Both,
}

impl std::str::FromStr for Edge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rising" | "pos" => Ok(Edge::Rising),
            "falling" | "neg" => Ok(Edge::Falling),
            "both" => Ok(Edge::Both),
            _ => Err(format!("unknown edge '{}'", s)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TriggerSpec {
    pub projection: Projection,
    /// Level in display units, see [`Projection::native_level`]
    pub level: f32,
    pub edge: Edge,
    /// Samples to wait after a match before it counts
    pub delay: u32,
    /// Additional matches needed before the stage is satisfied
    pub repeat: u32,
    /// Samples a condition change must persist before it is accepted
    pub holdoff: u32,
    pub color: Color,
}

impl Default for TriggerSpec {
    fn default() -> Self {
        Self {
            projection: Projection::Real,
            level: 0.0,
            edge: Edge::Rising,
            delay: 0,
            repeat: 0,
            holdoff: 0,
            color: Color::new(0, 255, 0),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TriggerRuntime {
    projector: Projector,
    prev_condition: bool,
    delay_count: u32,
    repeat_count: u32,
    trues: u32,
    falses: u32,
}

impl TriggerRuntime {
    fn new(spec: &TriggerSpec) -> Self {
        Self {
            projector: Projector::new(spec.projection),
            ..Default::default()
        }
    }

    /// Above-level condition for this sample, debounced by the holdoff
    fn condition(&mut self, spec: &TriggerSpec, s: Sample) -> bool {
        let mut condition = self.projector.run(s) > spec.projection.native_level(spec.level);
        if condition {
            if self.trues < spec.holdoff {
                condition = false;
                self.trues += 1;
            } else {
                self.falses = 0;
            }
        } else if self.falses < spec.holdoff {
            condition = true;
            self.falses += 1;
        } else {
            self.trues = 0;
        }
        condition
    }
}

#[derive(Clone, Debug)]
struct TriggerStage {
    spec: TriggerSpec,
    runtime: TriggerRuntime,
}

impl TriggerStage {
    fn new(spec: TriggerSpec) -> Self {
        let runtime = TriggerRuntime::new(&spec);
        Self { spec, runtime }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChainState {
    Untriggered,
    Delay,
}

/// Result of offering one sample to the chain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    /// Sample consumed, chain not fired
    Pending,
    /// The chain fired on this sample; it is the trigger point and was not consumed
    Fired,
}

#[derive(Clone, Debug)]
pub struct TriggerChain {
    stages: Vec<TriggerStage>,
    current: usize,
    state: ChainState,
    /// Next evaluated sample only records the baseline condition
    baseline_pending: bool,
}

impl Default for TriggerChain {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            current: 0,
            state: ChainState::Untriggered,
            baseline_pending: true,
        }
    }
}

impl TriggerChain {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TriggerSpec> {
        self.stages.get(index).map(|s| &s.spec)
    }

    pub fn specs(&self) -> impl Iterator<Item = &TriggerSpec> + '_ {
        self.stages.iter().map(|s| &s.spec)
    }

    /// Index of the stage currently being evaluated
    pub fn current_stage(&self) -> usize {
        self.current
    }

    /// True while counting down a stage's post-match delay
    pub fn in_delay(&self) -> bool {
        self.state == ChainState::Delay
    }

    fn check_index(&self, index: usize) -> Result<(), ConfigError> {
        if index < self.stages.len() {
            Ok(())
        } else {
            Err(ConfigError::TriggerIndexOutOfRange {
                index,
                count: self.stages.len(),
            })
        }
    }

    pub fn add(&mut self, spec: TriggerSpec) -> Result<(), ConfigError> {
        if self.stages.len() >= MAX_TRIGGERS {
            return Err(ConfigError::TooManyTriggers(MAX_TRIGGERS));
        }
        self.stages.push(TriggerStage::new(spec));
        self.restart();
        Ok(())
    }

    pub fn change(&mut self, index: usize, spec: TriggerSpec) -> Result<(), ConfigError> {
        self.check_index(index)?;
        self.stages[index] = TriggerStage::new(spec);
        if index == self.current {
            self.state = ChainState::Untriggered;
            self.baseline_pending = true;
        }
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<TriggerSpec, ConfigError> {
        self.check_index(index)?;
        let stage = self.stages.remove(index);
        self.restart();
        Ok(stage.spec)
    }

    /// Swap a stage with its neighbour, wrapping when moving up past the end
    ///
    /// Returns the new index of the moved stage.
    pub fn move_stage(&mut self, index: usize, up: bool) -> Result<usize, ConfigError> {
        self.check_index(index)?;
        if !up && index == 0 {
            return Ok(0);
        }
        let other = if up { (index + 1) % self.stages.len() } else { index - 1 };
        self.stages.swap(index, other);
        self.restart();
        Ok(other)
    }

    /// Back to the first stage with every runtime counter cleared
    pub fn restart(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.runtime = TriggerRuntime::new(&stage.spec);
        }
        self.current = 0;
        self.state = ChainState::Untriggered;
        self.baseline_pending = true;
    }

    /// Evaluate one sample against the current stage
    pub fn offer(&mut self, s: Sample) -> Offer {
        if self.stages.is_empty() {
            return Offer::Fired;
        }
        if self.state == ChainState::Delay {
            let runtime = &mut self.stages[self.current].runtime;
            if runtime.delay_count > 0 {
                runtime.delay_count -= 1;
                return Offer::Pending;
            }
            self.state = ChainState::Untriggered;
            return self.satisfied();
        }

        let stage = &mut self.stages[self.current];
        let condition = stage.runtime.condition(&stage.spec, s);
        if self.baseline_pending {
            stage.runtime.prev_condition = condition;
            self.baseline_pending = false;
            return Offer::Pending;
        }
        let prev = stage.runtime.prev_condition;
        stage.runtime.prev_condition = condition;
        let matched = match stage.spec.edge {
            Edge::Rising => !prev && condition,
            Edge::Falling => prev && !condition,
            Edge::Both => prev != condition,
        };
        if !matched {
            return Offer::Pending;
        }
        if stage.spec.delay > 0 {
            stage.runtime.delay_count = stage.spec.delay;
            self.state = ChainState::Delay;
            return Offer::Pending;
        }
        self.satisfied()
    }

    /// The current stage matched with its delay elapsed
    fn satisfied(&mut self) -> Offer {
        self.baseline_pending = true;
        if self.advance() {
            Offer::Pending
        } else {
            trace!("trigger chain fired");
            Offer::Fired
        }
    }

    /// Move on to the next stage or count a repeat; false once the chain is complete
    fn advance(&mut self) -> bool {
        let stage = &mut self.stages[self.current];
        if stage.spec.repeat > 0 {
            if stage.runtime.repeat_count < stage.spec.repeat {
                stage.runtime.repeat_count += 1;
                return true;
            }
            stage.runtime.repeat_count = 0;
        }
        if self.current + 1 < self.stages.len() {
            self.current += 1;
            true
        } else {
            self.current = 0;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real(v: f32) -> Sample {
        Sample::new(v, 0.0)
    }

    fn chain_with(specs: &[TriggerSpec]) -> TriggerChain {
        let mut chain = TriggerChain::default();
        for spec in specs {
            chain.add(spec.clone()).unwrap();
        }
        chain
    }

    /// Indices of the samples the chain fired on, restarting evaluation after each fire
    fn fire_points(chain: &mut TriggerChain, values: &[f32]) -> Vec<usize> {
        let mut fired = Vec::new();
        for (i, v) in values.iter().enumerate() {
            if chain.offer(real(*v)) == Offer::Fired {
                fired.push(i);
            }
        }
        fired
    }

    fn triangle() -> Vec<f32> {
        // Up through 0.5 once, down through it once, up again
        vec![0.0, 0.2, 0.4, 0.6, 0.8, 0.6, 0.4, 0.2, 0.4, 0.6, 0.8]
    }

    #[test]
    fn test_rising_only() {
        let mut chain = chain_with(&[TriggerSpec {
            level: 0.5,
            ..Default::default()
        }]);
        assert_eq!(fire_points(&mut chain, &triangle()), vec![3, 9]);
    }

    #[test]
    fn test_falling_only() {
        let mut chain = chain_with(&[TriggerSpec {
            level: 0.5,
            edge: Edge::Falling,
            ..Default::default()
        }]);
        assert_eq!(fire_points(&mut chain, &triangle()), vec![6]);
    }

    #[test]
    fn test_both_edges() {
        let mut chain = chain_with(&[TriggerSpec {
            level: 0.5,
            edge: Edge::Both,
            ..Default::default()
        }]);
        assert_eq!(fire_points(&mut chain, &triangle()), vec![3, 6, 9]);
    }

    #[test]
    fn test_first_sample_is_baseline() {
        let mut chain = chain_with(&[TriggerSpec {
            level: 0.5,
            edge: Edge::Both,
            ..Default::default()
        }]);
        // Starting above level must not count as an edge
        assert_eq!(fire_points(&mut chain, &[0.9, 0.9, 0.9]), Vec::<usize>::new());
    }

    #[test]
    fn test_delay_moves_trigger_point() {
        let mut chain = chain_with(&[TriggerSpec {
            level: 0.5,
            delay: 2,
            ..Default::default()
        }]);
        // Match at 3, skip 4 and 5, fire on 6
        assert_eq!(fire_points(&mut chain, &triangle()), vec![6]);
    }

    #[test]
    fn test_repeat_needs_extra_matches() {
        let mut chain = chain_with(&[TriggerSpec {
            level: 0.5,
            repeat: 1,
            ..Default::default()
        }]);
        assert_eq!(fire_points(&mut chain, &triangle()), vec![9]);
    }

    #[test]
    fn test_two_stage_chain() {
        let mut chain = chain_with(&[
            TriggerSpec {
                level: 0.5,
                ..Default::default()
            },
            TriggerSpec {
                level: 0.5,
                edge: Edge::Falling,
                ..Default::default()
            },
        ]);
        // Rising at 3 arms stage 1 which records baseline at 4 and falls at 6
        let values = triangle();
        assert_eq!(fire_points(&mut chain, &values[..7]), vec![6]);
        assert_eq!(chain.current_stage(), 0);
        // Baseline at 7, the rise at 9 arms stage 1 again
        assert!(fire_points(&mut chain, &values[7..]).is_empty());
        assert_eq!(chain.current_stage(), 1);
    }

    #[test]
    fn test_holdoff_debounces() {
        let mut chain = chain_with(&[TriggerSpec {
            level: 0.5,
            holdoff: 2,
            ..Default::default()
        }]);
        // A single spike above level is swallowed, a sustained one is accepted late
        let values = [0.0, 0.0, 0.0, 0.9, 0.0, 0.0, 0.0, 0.9, 0.9, 0.9, 0.9];
        assert_eq!(fire_points(&mut chain, &values), vec![9]);
    }

    #[test]
    fn test_maglin_level_is_shifted() {
        let mut chain = chain_with(&[TriggerSpec {
            projection: Projection::MagLin,
            level: -0.5,
            ..Default::default()
        }]);
        // Native level is 0.5 in magnitude
        assert_eq!(fire_points(&mut chain, &[0.1, 0.3, -0.7]), vec![2]);
    }

    #[test]
    fn test_empty_chain_fires_immediately() {
        let mut chain = TriggerChain::default();
        assert_eq!(chain.offer(real(0.0)), Offer::Fired);
    }

    #[test]
    fn test_config_errors() {
        let mut chain = TriggerChain::default();
        assert_eq!(
            chain.change(0, TriggerSpec::default()),
            Err(ConfigError::TriggerIndexOutOfRange { index: 0, count: 0 })
        );
        for _ in 0..MAX_TRIGGERS {
            chain.add(TriggerSpec::default()).unwrap();
        }
        assert_eq!(
            chain.add(TriggerSpec::default()),
            Err(ConfigError::TooManyTriggers(MAX_TRIGGERS))
        );
    }

    #[test]
    fn test_move_stage() {
        let mut chain = chain_with(&[
            TriggerSpec {
                level: 0.1,
                ..Default::default()
            },
            TriggerSpec {
                level: 0.2,
                ..Default::default()
            },
        ]);
        assert_eq!(chain.move_stage(0, false).unwrap(), 0);
        assert_eq!(chain.move_stage(0, true).unwrap(), 1);
        assert_eq!(chain.get(0).unwrap().level, 0.2);
        assert_eq!(chain.move_stage(1, true).unwrap(), 0);
        assert_eq!(chain.get(0).unwrap().level, 0.1);
    }
}
