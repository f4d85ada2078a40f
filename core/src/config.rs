use serde::Deserialize;
use tokio::time::Duration;

// Clamp bounds for caller-supplied values; requests outside these ranges are
// normalized rather than rejected.
const MIN_OPERATION_TIMEOUT_MS: u64 = 1_000;
const MAX_OPERATION_TIMEOUT_MS: u64 = 3_600_000; // 1h
const MIN_DEBUG_TIMEOUT_MS: u64 = 500;
const MAX_DEBUG_TIMEOUT_MS: u64 = 60_000;
const MIN_POLL_INTERVAL_MS: u64 = 10;
const MAX_EXTRACTION_ATTEMPTS: u32 = 50;

/// Tunables for the bridge, deserializable from the host's TOML settings.
///
/// Build and test waits are minutes-scale; debug calls are seconds-scale and
/// expected to return quickly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub build_timeout_ms: u64,
    pub test_timeout_ms: u64,
    pub debug_call_timeout_ms: u64,
    /// Bound on waiting for the per-class operation gate.
    pub lock_wait_ms: u64,
    /// Bound on waiting for same-class activity triggered outside the bridge.
    pub external_activity_max_wait_ms: u64,
    pub external_activity_poll_ms: u64,
    /// Hard cap for each run's captured output.
    pub output_buffer_bytes: usize,
    /// Terminated runs older than this are eligible for pruning.
    pub run_retention_ms: u64,
    pub extraction_max_attempts: u32,
    pub extraction_delay_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            build_timeout_ms: 300_000,
            test_timeout_ms: 600_000,
            debug_call_timeout_ms: 5_000,
            lock_wait_ms: 10_000,
            external_activity_max_wait_ms: 60_000,
            external_activity_poll_ms: 250,
            output_buffer_bytes: 512 * 1024,
            run_retention_ms: 3_600_000,
            extraction_max_attempts: 5,
            extraction_delay_ms: 200,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        let config: Self = toml::from_str(raw)?;
        Ok(config.normalized())
    }

    /// Clamps every field into its supported range.
    pub fn normalized(mut self) -> Self {
        self.build_timeout_ms = self
            .build_timeout_ms
            .clamp(MIN_OPERATION_TIMEOUT_MS, MAX_OPERATION_TIMEOUT_MS);
        self.test_timeout_ms = self
            .test_timeout_ms
            .clamp(MIN_OPERATION_TIMEOUT_MS, MAX_OPERATION_TIMEOUT_MS);
        self.debug_call_timeout_ms = self
            .debug_call_timeout_ms
            .clamp(MIN_DEBUG_TIMEOUT_MS, MAX_DEBUG_TIMEOUT_MS);
        self.lock_wait_ms = self.lock_wait_ms.max(MIN_POLL_INTERVAL_MS);
        self.external_activity_max_wait_ms = self.external_activity_max_wait_ms.max(MIN_POLL_INTERVAL_MS);
        self.external_activity_poll_ms = self.external_activity_poll_ms.max(MIN_POLL_INTERVAL_MS);
        self.extraction_max_attempts = self.extraction_max_attempts.clamp(1, MAX_EXTRACTION_ATTEMPTS);
        self
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    pub fn debug_call_timeout(&self) -> Duration {
        Duration::from_millis(self.debug_call_timeout_ms)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn external_activity_max_wait(&self) -> Duration {
        Duration::from_millis(self.external_activity_max_wait_ms)
    }

    pub fn external_activity_poll(&self) -> Duration {
        Duration::from_millis(self.external_activity_poll_ms)
    }

    pub fn run_retention(&self) -> Duration {
        Duration::from_millis(self.run_retention_ms)
    }

    pub fn extraction_delay(&self) -> Duration {
        Duration::from_millis(self.extraction_delay_ms)
    }
}
