use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use iq_scope::{
    args::{self, Args},
    capture::{produce, pump},
    render::{ChannelRenderer, Color, Frame},
    signal::SignalSource,
    Projection, Sample, ScopeEngine, Timing, TraceSpec, TriggerSpec,
};
use std::{
    error::Error,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tracing::{info, warn};

fn print_frame(frame: &Frame) {
    println!(
        "frame {} @ {}",
        frame.sequence,
        frame.captured_at.format("%H:%M:%S%.3f")
    );
    for (i, trace) in frame.traces.iter().enumerate() {
        let (lo, hi) = trace
            .points
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p.1), hi.max(p.1)));
        let level = trace
            .trigger_level
            .map(|l| format!("{:+.3}", l))
            .unwrap_or_else(|| "-".to_owned());
        println!(
            "  [{}] {:<6} y {:+.3}..{:+.3}  trigger {}  {}",
            i,
            trace.projection,
            lo,
            hi,
            level,
            trace.overlay.as_deref().unwrap_or("")
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args::convert_filter(args.verbose.log_level_filter()))
        .init();
    info!("Starting IQ scope");

    let trace_length = args.trace_length as usize;
    let timing = Timing {
        trace_length,
        pre_trigger: trace_length * args.pre_trigger as usize / 100,
        free_run: args.free_run,
        ..Default::default()
    };
    let (renderer, frames) = ChannelRenderer::bounded(16);
    let engine = Arc::new(ScopeEngine::with_timing(timing, Box::new(renderer))?);
    engine.add_trigger(TriggerSpec {
        projection: args.trigger_projection,
        level: args.trigger_level,
        edge: args.trigger_edge,
        ..Default::default()
    })?;
    engine.add_trace(TraceSpec {
        projection: Projection::MagDb,
        color: Color::new(64, 192, 255),
        ..Default::default()
    })?;
    engine.set_one_shot(args.one_shot);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::Release))?;
    }

    let (mut producer, consumer) = rtrb::RingBuffer::new(args.capacity);
    let batch = args.batch.max(1);

    info!(signal = ?args.signal, "Spawning signal source");
    let source_running = running.clone();
    let seed = chrono::Utc::now().timestamp() as u64;
    let mut source = SignalSource::new(args.signal, args.noise, seed);
    let source_handle = thread::spawn(move || {
        let mut buf = vec![Sample::default(); batch];
        while source_running.load(Ordering::Acquire) {
            source.fill(&mut buf);
            let mut sent = 0;
            while sent < buf.len() && source_running.load(Ordering::Acquire) {
                sent += produce(&mut producer, &buf[sent..]);
            }
        }
    });

    info!("Spawning FIFO pump");
    let pump_engine = engine.clone();
    let pump_running = running.clone();
    let pump_handle = thread::spawn(move || pump(consumer, &pump_engine, batch, &pump_running));

    let mut printed = 0u64;
    while running.load(Ordering::Acquire) {
        match frames.recv_timeout(Duration::from_millis(500)) {
            Ok(frame) => {
                print_frame(&frame);
                printed += 1;
                if args.one_shot || (args.frames > 0 && printed >= args.frames) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Renderer went away");
                break;
            }
        }
    }

    running.store(false, Ordering::Release);
    source_handle
        .join()
        .map_err(|_| "signal source thread panicked")?;
    let pumped = pump_handle.join().map_err(|_| "FIFO pump thread panicked")?;
    info!(pumped, "{}", engine.stats().snapshot());
    Ok(())
}
