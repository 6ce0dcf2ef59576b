use std::env;

use tracing::debug;

/// Tunables read by the pipeline. Only `streaming_output` and
/// `read_chunk_size` influence codec behavior; `queue_capacity` bounds
/// the parser-to-consumer bridge.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// When false, the boundary adapter materializes whole response
    /// bodies instead of framing item by item.
    pub streaming_output: bool,
    /// Buffer size for transport chunk reads.
    pub read_chunk_size: usize,
    /// Capacity of the ordered bridge between the parser task and the
    /// consumer.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            streaming_output: true,
            read_chunk_size: 8192,
            queue_capacity: 64,
        }
    }
}

impl PipelineConfig {
    /// Load overrides from the environment (and a `.env` file if one is
    /// present), falling back to defaults for anything unset.
    ///
    /// Recognized variables: `JSON_CONDUIT_STREAMING_OUTPUT`,
    /// `JSON_CONDUIT_READ_CHUNK_SIZE`, `JSON_CONDUIT_QUEUE_CAPACITY`.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        if let Some(v) = env_parse::<bool>("JSON_CONDUIT_STREAMING_OUTPUT") {
            config.streaming_output = v;
        }
        if let Some(v) = env_parse::<usize>("JSON_CONDUIT_READ_CHUNK_SIZE") {
            config.read_chunk_size = v.max(1);
        }
        if let Some(v) = env_parse::<usize>("JSON_CONDUIT_QUEUE_CAPACITY") {
            config.queue_capacity = v.max(1);
        }
        debug!(target: "json_conduit::config",
               streaming_output = config.streaming_output,
               read_chunk_size = config.read_chunk_size,
               queue_capacity = config.queue_capacity,
               "pipeline config loaded");
        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|raw| raw.parse().ok())
}
