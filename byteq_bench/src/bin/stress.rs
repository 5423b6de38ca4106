//! Conservation stress harness.
//!
//! Runs the queue through a matrix of configurations: producers push
//! random-length decimal-ASCII integers terminated by a `"0"` sentinel,
//! consumers (scalar or bulk) decode and sum them. For every configuration
//! the produced and consumed sums must match exactly; any mismatch fails the
//! run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use byteq::{PopError, PushError, Queue, Word};
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Longest decimal payload: 19 digits still fit a u64.
const DIGITS: usize = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Scalar,
    Bulk,
    All,
}

#[derive(Parser)]
#[command(name = "stress")]
#[command(about = "Conservation stress test across queue configurations")]
struct Args {
    /// Values pushed per configuration (split across producers)
    #[arg(short = 'n', long, default_value = "1048576")]
    values: u64,

    /// Slide-forward helper cap (0 = unbounded)
    #[arg(short = 's', long, default_value = "0")]
    slide_limit: usize,

    /// Worker threads per configuration
    #[arg(short = 't', long, default_value = "8")]
    threads: usize,

    /// Consumer mode to exercise
    #[arg(short = 'm', long, value_enum, default_value = "all")]
    mode: Mode,

    /// Pin workers to cores, round-robin from --start-core
    #[arg(long)]
    pin: bool,

    /// First core ID used when pinning
    #[arg(long, default_value = "0")]
    start_core: usize,

    /// Workload seed
    #[arg(long, default_value = "51966")]
    seed: u64,
}

fn pin_to_core(core_id: usize) {
    core_affinity::set_for_current(core_affinity::CoreId { id: core_id });
}

fn push_spin<W: Word, const N: usize, const B: usize>(queue: &Queue<W, N, B>, payload: &[u8]) {
    loop {
        match queue.try_push(payload) {
            Ok(()) => return,
            Err(PushError::Full) => thread::yield_now(),
            Err(e) => panic!("push rejected: {e}"),
        }
    }
}

fn read_val(digits: &[u8]) -> u64 {
    digits.iter().fold(0u64, |acc, &d| {
        acc.wrapping_mul(10).wrapping_add(u64::from(d - b'0'))
    })
}

fn produce<W: Word, const N: usize, const B: usize>(
    queue: &Queue<W, N, B>,
    values: u64,
    seed: u64,
) -> u64 {
    let max_len = DIGITS.min(Queue::<W, N, B>::MAX_SIZE);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = [0u8; DIGITS];
    let mut sum = 0u64;

    for _ in 0..values {
        let len = rng.gen_range(1..=max_len);
        let mut val = 0u64;
        for (i, byte) in buf.iter_mut().enumerate().take(len) {
            let digit: u64 = if i == 0 {
                rng.gen_range(1..=9)
            } else {
                rng.gen_range(0..=9)
            };
            val = val.wrapping_mul(10).wrapping_add(digit);
            *byte = b'0' + digit as u8;
        }
        sum = sum.wrapping_add(val);
        push_spin(queue, &buf[..len]);
    }

    push_spin(queue, b"0");
    sum
}

fn consume<W: Word, const N: usize, const B: usize>(
    queue: &Queue<W, N, B>,
    streams_left: &AtomicUsize,
) -> u64 {
    let mut buf = [0u8; DIGITS];
    let mut sum = 0u64;
    while streams_left.load(Ordering::Relaxed) > 0 {
        match queue.try_pop(&mut buf) {
            Ok(len) => {
                let val = read_val(&buf[..len]);
                if val == 0 {
                    streams_left.fetch_sub(1, Ordering::AcqRel);
                } else {
                    sum = sum.wrapping_add(val);
                }
            }
            Err(PopError::Empty) => std::hint::spin_loop(),
            Err(e) => panic!("pop rejected: {e}"),
        }
    }
    sum
}

fn consume_bulk<W: Word, const N: usize, const B: usize>(
    queue: &Queue<W, N, B>,
    streams_left: &AtomicUsize,
) -> u64 {
    let mut buf = [0u8; DIGITS];
    let mut sum = 0u64;
    while streams_left.load(Ordering::Relaxed) > 0 {
        let mut bulk = queue.pop_bulk();
        if bulk.is_empty() {
            std::hint::spin_loop();
            continue;
        }
        let mut done = 0;
        loop {
            match bulk.pop(&mut buf) {
                Ok(len) => {
                    let val = read_val(&buf[..len]);
                    if val == 0 {
                        done += 1;
                    } else {
                        sum = sum.wrapping_add(val);
                    }
                }
                Err(PopError::Empty) => break,
                Err(e) => panic!("bulk pop rejected: {e}"),
            }
        }
        if done > 0 {
            streams_left.fetch_sub(done, Ordering::AcqRel);
        }
    }
    sum
}

struct RunConfig {
    threads: usize,
    values: u64,
    slide_limit: usize,
    bulk: bool,
    pin: bool,
    start_core: usize,
    seed: u64,
}

/// Returns true when produced and consumed sums match.
fn run<W: Word, const N: usize, const B: usize>(cfg: &RunConfig) -> bool {
    // Bulk consumers drain whole batches, so fewer of them keep up.
    let consumers = (cfg.threads / if cfg.bulk { 3 } else { 2 }).max(1);
    let producers = cfg.threads.saturating_sub(consumers).max(1);

    print!(
        "Sending through <{N}/{B}/{}> {producers}>>>{consumers}{}...",
        W::BITS,
        if cfg.bulk { " bulk" } else { "" },
    );

    let slide_limit = if cfg.slide_limit == 0 {
        usize::MAX
    } else {
        cfg.slide_limit
    };
    let queue: Arc<Queue<W, N, B>> = Arc::new(Queue::with_slide_limit(slide_limit));
    let streams_left = Arc::new(AtomicUsize::new(producers));
    let started = Instant::now();

    let mut core = cfg.start_core;
    let mut next_core = move |pin: bool| {
        let id = core;
        core += 1;
        move || {
            if pin {
                pin_to_core(id);
            }
        }
    };

    let producer_handles: Vec<_> = (0..producers)
        .map(|id| {
            let queue = Arc::clone(&queue);
            let values = cfg.values / producers as u64;
            let seed = cfg.seed ^ (id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            let pin = next_core(cfg.pin);
            thread::spawn(move || {
                pin();
                produce(&queue, values, seed)
            })
        })
        .collect();

    let consumer_handles: Vec<_> = (0..consumers)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let streams_left = Arc::clone(&streams_left);
            let bulk = cfg.bulk;
            let pin = next_core(cfg.pin);
            thread::spawn(move || {
                pin();
                if bulk {
                    consume_bulk(&queue, &streams_left)
                } else {
                    consume(&queue, &streams_left)
                }
            })
        })
        .collect();

    let produced = producer_handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .fold(0u64, u64::wrapping_add);
    let consumed = consumer_handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .fold(0u64, u64::wrapping_add);

    let elapsed = started.elapsed();
    if produced == consumed {
        println!(" OK (transferred sum = {produced}, {elapsed:.2?})");
        true
    } else {
        println!(" FAILURE! (produced sum = {produced}, consumed sum = {consumed})");
        false
    }
}

fn main() {
    let args = Args::parse();
    let mut ok = true;

    let cfg = |bulk: bool, threads: usize| RunConfig {
        threads,
        values: args.values,
        slide_limit: args.slide_limit,
        bulk,
        pin: args.pin,
        start_core: args.start_core,
        seed: args.seed,
    };

    let scalar = args.mode != Mode::Bulk;
    let bulk = args.mode != Mode::Scalar;

    if scalar {
        ok &= run::<u64, 1024, 16384>(&cfg(false, args.threads));
    }
    if bulk {
        ok &= run::<u64, 1024, 16384>(&cfg(true, args.threads));
    }
    if scalar {
        ok &= run::<u64, 1024, 8>(&cfg(false, args.threads));
    }
    if bulk {
        ok &= run::<u64, 4, 256>(&cfg(true, args.threads));
    }
    if scalar {
        ok &= run::<u32, 512, 4096>(&cfg(false, args.threads));
    }
    if bulk {
        ok &= run::<u32, 512, 4096>(&cfg(true, args.threads));
    }
    if scalar {
        ok &= run::<u8, 4, 8>(&cfg(false, 2));
    }
    if bulk {
        ok &= run::<u8, 4, 8>(&cfg(true, 2));
    }

    if !ok {
        std::process::exit(1);
    }
}
