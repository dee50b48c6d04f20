use fdguard::codec::{FrameCodec, ID_STATISTICS};
use fdguard::secure::{SecureChannel, DEFAULT_KEY};
use rand::rngs::OsRng;
use std::env;
use std::time::Instant;

const DEFAULT_SAMPLES: u32 = 1000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let samples = match env::args().nth(1) {
        Some(arg) => arg.parse::<u32>()?,
        None => DEFAULT_SAMPLES,
    };

    let codec = FrameCodec::default();
    let mut channel = SecureChannel::new(&DEFAULT_KEY, OsRng);
    let mut total_ns: u128 = 0;

    println!("counter, nanoseconds");
    for counter in 0..samples {
        // Counter in bytes 0-3, the rest left empty
        let mut payload = codec.blank_payload();
        payload[..4].copy_from_slice(&counter.to_le_bytes());

        let started = Instant::now();
        let frame = channel.seal(ID_STATISTICS, &payload)?;
        let elapsed = started.elapsed().as_nanos();
        total_ns += elapsed;

        debug_assert_eq!(frame.len(), codec.payload_len() + 28);
        println!("{}, {}", counter, elapsed);
    }

    if samples > 0 {
        eprintln!("📊 Mean seal time: {} ns over {} frames", total_ns / u128::from(samples), samples);
    }

    Ok(())
}
