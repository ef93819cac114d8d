//! Sample types flowing into the scope

use num_complex::Complex;
use num_traits::AsPrimitive;

/// One normalized I/Q sample, full scale is 1.0
pub type Sample = Complex<f32>;

/// The type of raw 16 bit I/Q words out of most SDR front ends
pub type ComplexShort = Complex<i16>;

/// The type of raw 8 bit I/Q words (RTL-SDR style, already signed)
pub type ComplexByte = Complex<i8>;

/// Full scale of a 16 bit sample
pub const SDR_RX_SCALE: f32 = 32768.0;
/// Full scale of an 8 bit sample
pub const SDR_RX_SCALE_8: f32 = 128.0;

/// Convert one raw word into a normalized sample
#[inline]
pub fn to_sample<T: AsPrimitive<f32>>(raw: Complex<T>, full_scale: f32) -> Sample {
    Sample::new(raw.re.as_() / full_scale, raw.im.as_() / full_scale)
}

/// Normalize a run of raw words into `out`, reusing its allocation
pub fn normalize<T: AsPrimitive<f32>>(raw: &[Complex<T>], full_scale: f32, out: &mut Vec<Sample>) {
    out.clear();
    out.extend(raw.iter().map(|s| to_sample(*s, full_scale)));
}
