//! Complex to real projections
//!
//! Every trace and every trigger stage owns a [`Projector`] turning one I/Q sample into the
//! scalar it displays or compares. When several traces use the same projection, one of them
//! is the cache master for that projection and the others read its value from a shared
//! [`ProjectionCache`] for the current sample.

use std::{f32::consts::PI, fmt};

use crate::{complex::Sample, error::ConfigError};

/// Floor for the squared magnitude so that silence maps to -200 dB instead of -inf
const MAGSQ_FLOOR: f32 = 1e-20;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Projection {
    /// Real part
    #[default]
    Real,
    /// Imaginary part
    Imag,
    /// Linear magnitude
    MagLin,
    /// Squared magnitude in dB
    MagDb,
    /// Phase, normalized to [-1, 1]
    Phase,
    /// Phase derivative (instantaneous frequency), normalized to [-1, 1]
    DPhase,
}

impl Projection {
    pub const COUNT: usize = 6;

    pub const ALL: [Projection; Projection::COUNT] = [
        Projection::Real,
        Projection::Imag,
        Projection::MagLin,
        Projection::MagDb,
        Projection::Phase,
        Projection::DPhase,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Projection::Real => "real",
            Projection::Imag => "imag",
            Projection::MagLin => "mag",
            Projection::MagDb => "magdb",
            Projection::Phase => "phase",
            Projection::DPhase => "dphase",
        }
    }

    /// Map a trigger level given in display units to the projection's native unit
    pub fn native_level(self, level: f32) -> f32 {
        match self {
            Projection::MagLin => level + 1.0,
            Projection::MagDb => 100.0 * (level - 1.0),
            _ => level,
        }
    }
}

impl TryFrom<u32> for Projection {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Projection::ALL
            .get(value as usize)
            .copied()
            .ok_or(ConfigError::UnknownProjection(value))
    }
}

impl std::str::FromStr for Projection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Projection::ALL
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown projection '{}'", s))
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Per-sample results shared by projectors of the same type
#[derive(Clone, Copy, Debug, Default)]
pub struct ProjectionCache {
    values: [f32; Projection::COUNT],
}

impl ProjectionCache {
    pub fn get(&self, projection: Projection) -> f32 {
        self.values[projection.index()]
    }

    fn set(&mut self, projection: Projection, value: f32) {
        self.values[projection.index()] = value;
    }
}

/// How a projector takes part in the shared cache
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheRole {
    /// Computes and never touches the cache
    #[default]
    Off,
    /// Computes and publishes its result for this sample
    Master,
    /// Reads the master's result for this sample
    Reader,
}

#[derive(Clone, Debug, Default)]
pub struct Projector {
    projection: Projection,
    prev_arg: f32,
    role: CacheRole,
}

impl Projector {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            prev_arg: 0.0,
            role: CacheRole::Off,
        }
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    /// Change the projection type, dropping the retained phase
    pub fn set_projection(&mut self, projection: Projection) {
        if self.projection != projection {
            self.projection = projection;
            self.prev_arg = 0.0;
        }
    }

    pub fn role(&self) -> CacheRole {
        self.role
    }

    pub fn set_role(&mut self, role: CacheRole) {
        self.role = role;
    }

    /// Project without any cache
    #[inline]
    pub fn run(&mut self, s: Sample) -> f32 {
        match self.projection {
            Projection::Real => s.re,
            Projection::Imag => s.im,
            Projection::MagLin => s.norm_sqr().sqrt(),
            Projection::MagDb => 10.0 * s.norm_sqr().max(MAGSQ_FLOOR).log10(),
            Projection::Phase => s.im.atan2(s.re) / PI,
            Projection::DPhase => {
                let arg = s.im.atan2(s.re);
                let mut d_phi = (arg - self.prev_arg) / PI;
                self.prev_arg = arg;
                if d_phi < -1.0 {
                    d_phi += 2.0;
                } else if d_phi > 1.0 {
                    d_phi -= 2.0;
                }
                d_phi
            }
        }
    }

    /// Project honouring this projector's cache role
    ///
    /// Masters must run before readers for a given sample; the trace set keeps that order by
    /// electing the first trace of each projection type as master.
    #[inline]
    pub fn run_cached(&mut self, s: Sample, cache: &mut ProjectionCache) -> f32 {
        match self.role {
            CacheRole::Off => self.run(s),
            CacheRole::Reader => cache.get(self.projection),
            CacheRole::Master => {
                let v = self.run(s);
                cache.set(self.projection, v);
                v
            }
        }
    }
}
