//! Argument parsing for running from the command line

use clap::Parser;

use crate::{projector::Projection, signal::SignalKind, trigger::Edge, DEFAULT_TRACE_LENGTH};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Test signal to feed the scope with (ramp, tone or burst)
    #[clap(short, long, default_value = "burst")]
    pub signal: SignalKind,
    /// Peak amplitude of the uniform noise added to the signal
    #[clap(long, default_value_t = 0.02)]
    pub noise: f32,
    /// Points per trace
    #[clap(short = 'l', long, default_value_t = DEFAULT_TRACE_LENGTH as u64)]
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub trace_length: u64,
    /// Share of the trace recorded before the trigger, in percent
    #[clap(long, default_value_t = 10)]
    #[clap(value_parser = clap::value_parser!(u8).range(0..100))]
    pub pre_trigger: u8,
    /// Projection the trigger compares (real, imag, mag, magdb, phase, dphase)
    #[clap(long, default_value = "mag")]
    pub trigger_projection: Projection,
    /// Trigger level, in display units
    #[clap(long, default_value_t = -0.6, allow_hyphen_values = true)]
    pub trigger_level: f32,
    /// Trigger edge (rising, falling or both)
    #[clap(long, default_value = "rising")]
    pub trigger_edge: Edge,
    /// Capture continuously, ignoring the trigger
    #[clap(short, long)]
    pub free_run: bool,
    /// Stop after the first captured frame
    #[clap(short, long)]
    pub one_shot: bool,
    /// Frames to print before exiting, 0 runs until interrupted
    #[clap(short = 'n', long, default_value_t = 10)]
    pub frames: u64,
    /// Samples per FIFO batch
    #[clap(short, long, default_value_t = 1024)]
    pub batch: usize,
    /// Sample FIFO capacity
    #[clap(short, long, default_value_t = 65536)]
    pub capacity: usize,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["iq_scope"]);
        assert_eq!(args.trace_length, DEFAULT_TRACE_LENGTH as u64);
        assert_eq!(args.trigger_projection, Projection::MagLin);
        assert_eq!(args.trigger_edge, Edge::Rising);
        assert!(!args.free_run);
    }

    #[test]
    fn test_trigger_options() {
        let args = Args::parse_from([
            "iq_scope",
            "--signal",
            "ramp",
            "--trigger-projection",
            "real",
            "--trigger-level",
            "-0.25",
            "--trigger-edge",
            "falling",
            "--pre-trigger",
            "50",
        ]);
        assert!(matches!(args.signal, SignalKind::Ramp { .. }));
        assert_eq!(args.trigger_projection, Projection::Real);
        assert_eq!(args.trigger_level, -0.25);
        assert_eq!(args.trigger_edge, Edge::Falling);
        assert_eq!(args.pre_trigger, 50);
        assert!(Args::try_parse_from(["iq_scope", "--pre-trigger", "100"]).is_err());
    }

    #[test]
    fn test_convert_filter() {
        assert_eq!(
            convert_filter(log::LevelFilter::Debug),
            tracing_subscriber::filter::LevelFilter::DEBUG
        );
    }
}
