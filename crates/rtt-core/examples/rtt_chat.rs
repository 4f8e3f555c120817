//! A sender/receiver loopback with simulated packet loss: every third
//! packet is dropped, and the redundancy still delivers the full text.
//!
//! Run with: cargo run --example rtt_chat -p rtext-rtt-core

use rtext_rtt_core::{RttParameters, RttReceiver, RttSender};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let params = RttParameters {
        cps: 30,
        ..RttParameters::default()
    };
    let (mut sender, mut packets) = RttSender::new(params.clone());
    let mut receiver = RttReceiver::new(params);

    sender.start();
    sender.enqueue("Real-time text,\r\none key at a time.").await?;

    let mut screen = String::new();
    let mut index = 0u32;
    while screen.chars().count() < 34 {
        let Some(wire) = packets.recv().await else { break };
        index += 1;
        if index % 3 == 0 {
            continue; // the network ate this one
        }
        for segment in receiver.process(&wire)? {
            screen.push_str(&segment);
        }
    }

    for line in screen.split('\u{2028}') {
        println!("{}", line);
    }
    let stats = receiver.stats();
    println!(
        "({} packets, {} recovered from redundancy)",
        stats.packets_received, stats.packets_recovered
    );
    Ok(())
}
