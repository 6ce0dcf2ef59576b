use json_conduit::adapt::TypeDescriptor;
use json_conduit::codec::Charset;
use json_conduit::config::PipelineConfig;
use json_conduit::detector::StreamMode;
use json_conduit::pipeline::spawn_decode_from_reader;
use json_conduit::writer::{Framing, StreamWriter};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    sensor: String,
    celsius: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env first so RUST_LOG in .env is seen
    let _ = dotenvy::dotenv();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let config = PipelineConfig::from_env();

    // Producer side: frame readings onto one half of an in-memory pipe,
    // flushing after every item.
    let (producer_side, consumer_side) = tokio::io::duplex(4 * 1024);
    let producer = tokio::spawn(async move {
        let mut writer = StreamWriter::new(producer_side, Framing::Array, Charset::Utf8);
        for i in 0..5 {
            let reading = Reading {
                sensor: format!("probe-{i}"),
                celsius: 20.0 + i as f64 / 2.0,
            };
            writer.write_item(&reading).await?;
        }
        writer.close().await
    });

    // Consumer side: decode elements as their boundaries arrive.
    let mut rx = spawn_decode_from_reader::<_, Reading>(
        consumer_side,
        StreamMode::ArrayStream,
        Charset::Utf8,
        TypeDescriptor::pull_sequence::<Reading>(),
        &config,
    );

    println!("Streaming readings through an in-memory pipe:");
    while let Some(reading) = rx.pull().await? {
        println!("  {} = {:.1}°C", reading.sensor, reading.celsius);
    }
    producer.await??;

    println!("Done.");
    Ok(())
}
