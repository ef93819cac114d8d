//! Test signal sources feeding the scope without SDR hardware

use std::f32::consts::TAU;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::complex::Sample;

/// `n` real samples going linearly from `from` to `to`, both included
pub fn ramp(n: usize, from: f32, to: f32) -> Vec<Sample> {
    if n < 2 {
        return vec![Sample::new(from, 0.0); n];
    }
    let step = (to - from) / (n - 1) as f32;
    (0..n)
        .map(|i| Sample::new(from + step * i as f32, 0.0))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SignalKind {
    /// Sawtooth on the real axis, -1 to 1 over `period` samples
    Ramp { period: usize },
    /// Complex tone, `frequency` in cycles per sample
    Tone { frequency: f32, amplitude: f32 },
    /// Tone switched on for `on` samples out of every `period`
    Burst {
        frequency: f32,
        amplitude: f32,
        on: usize,
        period: usize,
    },
}

impl std::str::FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ramp" => Ok(SignalKind::Ramp { period: 4800 }),
            "tone" => Ok(SignalKind::Tone {
                frequency: 0.01,
                amplitude: 0.8,
            }),
            "burst" => Ok(SignalKind::Burst {
                frequency: 0.02,
                amplitude: 0.8,
                on: 1000,
                period: 6000,
            }),
            _ => Err(format!("unknown signal '{}'", s)),
        }
    }
}

/// Endless signal generator with optional uniform noise on I and Q
#[derive(Clone, Debug)]
pub struct SignalSource {
    kind: SignalKind,
    noise: f32,
    phase: f32,
    count: u64,
    rng: StdRng,
}

impl SignalSource {
    pub fn new(kind: SignalKind, noise: f32, seed: u64) -> Self {
        Self {
            kind,
            noise,
            phase: 0.0,
            count: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_sample(&mut self) -> Sample {
        let n = self.count;
        self.count += 1;
        let clean = match self.kind {
            SignalKind::Ramp { period } => {
                let period = period.max(2) as u64;
                let pos = (n % period) as f32 / (period - 1) as f32;
                Sample::new(2.0 * pos - 1.0, 0.0)
            }
            SignalKind::Tone {
                frequency,
                amplitude,
            } => self.tone(frequency, amplitude),
            SignalKind::Burst {
                frequency,
                amplitude,
                on,
                period,
            } => {
                let s = self.tone(frequency, amplitude);
                if n % (period.max(1) as u64) < on as u64 {
                    s
                } else {
                    Sample::default()
                }
            }
        };
        if self.noise > 0.0 {
            clean
                + Sample::new(
                    self.rng.gen_range(-self.noise..self.noise),
                    self.rng.gen_range(-self.noise..self.noise),
                )
        } else {
            clean
        }
    }

    fn tone(&mut self, frequency: f32, amplitude: f32) -> Sample {
        let s = Sample::from_polar(amplitude, self.phase);
        self.phase = (self.phase + TAU * frequency) % TAU;
        s
    }

    /// Overwrite `out` with the next samples
    pub fn fill(&mut self, out: &mut [Sample]) {
        for s in out.iter_mut() {
            *s = self.next_sample();
        }
    }
}
