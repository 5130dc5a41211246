//! Example: playing back a recorded command trace
//!
//! Streams a trace through the full pipeline and prints every command the
//! dispatcher issues to the bus. With no trace file given, a synthetic
//! trace is generated.
//!
//! Usage:
//!   cargo run --example playback -- --records 20 --time-offset 50
//!
//! From a recorded trace file:
//!   cargo run --example playback -- --file trace.bin --word-size 8

use clap::Parser;
use memmap2::Mmap;
use rtio_dma::{BufferMemory, CaptureBus, Engine, TraceBuilder};
use std::fs::File;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a recorded trace file (synthesized when omitted)
    #[arg(short, long)]
    file: Option<String>,

    /// Number of records to synthesize
    #[arg(short, long, default_value = "10")]
    records: usize,

    /// Memory bus word size in bytes
    #[arg(short, long, default_value = "8")]
    word_size: usize,

    /// Signed offset added to every record timestamp
    #[arg(short, long, default_value = "0")]
    time_offset: i64,

    /// Step budget before the run is considered stuck
    #[arg(long, default_value = "1000000")]
    max_steps: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let bytes = match &args.file {
        Some(path) => {
            let file = File::open(path)?;
            let mmap = unsafe { Mmap::map(&file)? };
            info!("loaded {} trace bytes from {}", mmap.len(), path);
            mmap.to_vec()
        }
        None => {
            let mut trace = TraceBuilder::new();
            for i in 0..args.records as u64 {
                trace.append(i as u32 % 8, 1000 * i, i as u16, &i.to_le_bytes())?;
            }
            info!("synthesized {} records ({} bytes)", args.records, trace.len());
            trace.finish()
        }
    };

    let memory = BufferMemory::new(bytes, args.word_size)?;
    let mut bus = CaptureBus::new();
    let mut engine = Engine::new(args.word_size)?;

    engine.set_time_offset(args.time_offset);
    engine.set_bus_request(true);
    engine.set_enabled(true);
    let steps = engine.run(&memory, &mut bus, args.max_steps)?;

    info!("playback complete in {} steps", steps);
    for (i, write) in bus.writes().iter().enumerate() {
        println!(
            "#{:<4} t={:<12} ch={:<6} addr={:#06x} data={:02x?}",
            i, write.timestamp, write.channel, write.address, write.data
        );
    }

    Ok(())
}
