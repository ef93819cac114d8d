//! This module contains the sample FIFO logic

// The source thread does one thing, as fast as possible: push samples
// into an rtrb ring buffer. The pump on the other end hands them to the
// engine in batches and only commits what the engine actually took, so a
// batch deferred by a reconfiguration stays in the FIFO for the next try.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::{complex::Sample, engine::ScopeEngine};

/// Push as many samples as fit, returning how many did
pub fn produce(producer: &mut rtrb::Producer<Sample>, samples: &[Sample]) -> usize {
    let n = samples.len().min(producer.slots());
    if n == 0 {
        return 0;
    }
    match producer.write_chunk_uninit(n) {
        Ok(chunk) => chunk.fill_from_iter(samples[..n].iter().copied()),
        Err(_) => 0,
    }
}

/// Drain the FIFO into the engine until `running` clears and the FIFO is empty
///
/// Returns the number of samples consumed.
pub fn pump(
    mut consumer: rtrb::Consumer<Sample>,
    engine: &ScopeEngine,
    batch: usize,
    running: &AtomicBool,
) -> u64 {
    let mut total = 0u64;
    loop {
        let n = consumer.slots().min(batch);
        if n == 0 {
            if !running.load(Ordering::Acquire) && consumer.slots() == 0 {
                break;
            }
            // Spin until there's data
            // We could yield, but thats a 15ms penalty because linux
            std::hint::spin_loop();
            continue;
        }
        let chunk = match consumer.read_chunk(n) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("FIFO read failed: {}", e);
                continue;
            }
        };
        let (first, second) = chunk.as_slices();
        let consumed = if !engine.feed(first, true) {
            0
        } else if second.is_empty() || engine.feed(second, true) {
            first.len() + second.len()
        } else {
            first.len()
        };
        chunk.commit(consumed);
        total += consumed as u64;
    }
    debug!(total, "FIFO pump stopped");
    total
}
