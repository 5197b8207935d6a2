use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub downloads: DownloadsConfig,
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:11235".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Number of byte-range workers per download.
    pub parallelism: usize,
    /// Bytes read from the response body per write.
    pub read_buffer: usize,
    pub proxy_url: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            read_buffer: 32 * 1024,
            proxy_url: None,
            user_agent: None,
            referer: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Minimum interval between frames pushed to one subscriber.
    pub throttle_interval_ms: u64,
    /// Interval at which the speed sampler reads the byte counter.
    pub sample_interval_ms: u64,
    /// Bounded capacity of each subscriber channel.
    pub subscriber_capacity: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            throttle_interval_ms: 100,
            sample_interval_ms: 1500,
            subscriber_capacity: 16,
        }
    }
}

impl AppConfig {
    /// Validate and clamp all config fields to valid ranges.
    /// Returns a list of warning messages for any values that were clamped.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        // downloads.parallelism: 1..=64
        if self.downloads.parallelism < 1 {
            warnings.push(format!(
                "parallelism was {}, clamped to 1",
                self.downloads.parallelism
            ));
            self.downloads.parallelism = 1;
        } else if self.downloads.parallelism > 64 {
            warnings.push(format!(
                "parallelism was {}, clamped to 64",
                self.downloads.parallelism
            ));
            self.downloads.parallelism = 64;
        }

        // downloads.read_buffer: min 1 KiB
        if self.downloads.read_buffer < 1024 {
            warnings.push(format!(
                "read_buffer was {}, clamped to 1024",
                self.downloads.read_buffer
            ));
            self.downloads.read_buffer = 1024;
        }

        // progress.throttle_interval_ms: min 50, keeping subscriber
        // streams at or below their 20 Hz ceiling
        if self.progress.throttle_interval_ms < 50 {
            warnings.push(format!(
                "throttle_interval_ms was {}, clamped to 50",
                self.progress.throttle_interval_ms
            ));
            self.progress.throttle_interval_ms = 50;
        }

        // progress.sample_interval_ms: min 100
        if self.progress.sample_interval_ms < 100 {
            warnings.push(format!(
                "sample_interval_ms was {}, clamped to 100",
                self.progress.sample_interval_ms
            ));
            self.progress.sample_interval_ms = 100;
        }

        // progress.subscriber_capacity: min 1
        if self.progress.subscriber_capacity < 1 {
            warnings.push(format!(
                "subscriber_capacity was {}, clamped to 1",
                self.progress.subscriber_capacity
            ));
            self.progress.subscriber_capacity = 1;
        }

        warnings
    }
}
