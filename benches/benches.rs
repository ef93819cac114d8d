use criterion::{black_box, criterion_group, criterion_main, Criterion};
use iq_scope::{
    complex::{normalize, ComplexShort, SDR_RX_SCALE},
    projector::Projector,
    signal::{SignalKind, SignalSource},
    NullRenderer, Projection, Sample, ScopeEngine, Timing, TraceSpec, TriggerSpec,
};
use rand::prelude::*;

fn benchmark(c: &mut Criterion) {
    let mut rng = rand::thread_rng();

    let raw: Vec<ComplexShort> = (0..4096)
        .map(|_| ComplexShort::new(rng.gen(), rng.gen()))
        .collect();
    let mut samples = Vec::with_capacity(raw.len());
    normalize(&raw, SDR_RX_SCALE, &mut samples);

    c.bench_function("normalize", |b| {
        let mut out = Vec::with_capacity(raw.len());
        b.iter(|| normalize(black_box(&raw), SDR_RX_SCALE, &mut out))
    });

    for projection in [Projection::MagDb, Projection::DPhase] {
        c.bench_function(&format!("project {}", projection), |b| {
            let mut projector = Projector::new(projection);
            b.iter(|| {
                for s in samples.iter() {
                    black_box(projector.run(*s));
                }
            })
        });
    }

    // Triggered capture with a delayed dB trace on a bursty signal
    let mut source = SignalSource::new(
        SignalKind::Burst {
            frequency: 0.02,
            amplitude: 0.8,
            on: 1000,
            period: 6000,
        },
        0.02,
        0,
    );
    let mut burst = vec![Sample::default(); 4096];
    source.fill(&mut burst);
    let engine = ScopeEngine::with_timing(
        Timing {
            pre_trigger: 480,
            free_run: false,
            ..Default::default()
        },
        Box::new(NullRenderer),
    )
    .unwrap();
    engine
        .add_trigger(TriggerSpec {
            projection: Projection::MagLin,
            level: -0.6,
            ..Default::default()
        })
        .unwrap();
    engine
        .add_trace(TraceSpec {
            projection: Projection::MagDb,
            delay: 100,
            ..Default::default()
        })
        .unwrap();

    c.bench_function("feed 4096", |b| {
        b.iter(|| {
            source.fill(&mut burst);
            engine.feed(black_box(&burst), true)
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
