// src/config.rs

use crate::error::ConfigError;
use serde::Deserialize;

/// Pipeline configuration. Every field has a default so an empty config
/// file (or none at all) yields a runnable pipeline; `validate` is called
/// before any worker starts and rejects inconsistent options outright.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Display symbol used in logs and observer output.
    pub symbol: String,
    /// Trade-buy bucket size in USD notional.
    pub buy_bucket_usd: f64,
    /// Trade-sell bucket size in USD notional.
    pub sell_bucket_usd: f64,
    /// Cancel bucket size per side in USD notional.
    pub cancel_bucket_usd: f64,
    /// Levels from the top of book eligible for cancel classification.
    pub depth_levels_track: usize,
    /// Levels from the top of book eligible for change notifications.
    pub depth_levels_report: usize,
    /// Price rounding granularity. `<= 0` disables rounding.
    pub tick_size: f64,
    /// Minimum fraction of prior volume a decrease must cancel to count.
    pub cancel_fraction: f64,
    /// Consecutive partial refills before an iceberg event fires.
    pub iceberg_threshold: u32,
    /// Ring capacity in bytes. Must be a power of two.
    pub ring_capacity: usize,
    /// Bound of each typed queue.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            symbol: "BTCUSDT".to_string(),
            buy_bucket_usd: 1_000_000.0,
            sell_bucket_usd: 1_000_000.0,
            cancel_bucket_usd: 500_000.0,
            depth_levels_track: 30,
            depth_levels_report: 20,
            tick_size: 0.01,
            cancel_fraction: 0.3,
            iceberg_threshold: 3,
            ring_capacity: 4096,
            queue_capacity: 1024,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.buy_bucket_usd > 0.0) {
            return Err(ConfigError::invalid("buy_bucket_usd", "must be positive"));
        }
        if !(self.sell_bucket_usd > 0.0) {
            return Err(ConfigError::invalid("sell_bucket_usd", "must be positive"));
        }
        if !(self.cancel_bucket_usd > 0.0) {
            return Err(ConfigError::invalid("cancel_bucket_usd", "must be positive"));
        }
        if !self.tick_size.is_finite() {
            return Err(ConfigError::invalid("tick_size", "must be finite"));
        }
        if !(self.cancel_fraction > 0.0 && self.cancel_fraction < 1.0) {
            return Err(ConfigError::invalid(
                "cancel_fraction",
                format!("{} is outside (0, 1)", self.cancel_fraction),
            ));
        }
        if self.iceberg_threshold == 0 {
            return Err(ConfigError::invalid("iceberg_threshold", "must be >= 1"));
        }
        if self.depth_levels_report > self.depth_levels_track {
            return Err(ConfigError::invalid(
                "depth_levels_report",
                format!(
                    "{} exceeds depth_levels_track {}",
                    self.depth_levels_report, self.depth_levels_track
                ),
            ));
        }
        if self.ring_capacity < 64 || !self.ring_capacity.is_power_of_two() {
            return Err(ConfigError::invalid(
                "ring_capacity",
                format!("{} is not a power of two >= 64", self.ring_capacity),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("queue_capacity", "must be >= 1"));
        }
        Ok(())
    }

    /// Widest depth window any consumer cares about.
    pub fn depth_window(&self) -> usize {
        self.depth_levels_track.max(self.depth_levels_report)
    }
}

/// Load configuration from `bookflow.toml` (optional) with `BOOKFLOW_*`
/// environment overrides, then validate.
pub fn load() -> Result<PipelineConfig, ConfigError> {
    let raw = config::Config::builder()
        .add_source(config::File::with_name("bookflow").required(false))
        .add_source(config::Environment::with_prefix("BOOKFLOW"))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let cfg: PipelineConfig = raw
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_non_power_of_two_ring() {
        let cfg = PipelineConfig {
            ring_capacity: 4095,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "ring_capacity", .. })
        ));
    }

    #[test]
    fn rejects_cancel_fraction_bounds() {
        for bad in [0.0, 1.0, -0.5, 1.5] {
            let cfg = PipelineConfig {
                cancel_fraction: bad,
                ..Default::default()
            };
            assert!(cfg.validate().is_err(), "fraction {bad} should be rejected");
        }
    }

    #[test]
    fn rejects_report_wider_than_track() {
        let cfg = PipelineConfig {
            depth_levels_track: 10,
            depth_levels_report: 20,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_bucket() {
        let cfg = PipelineConfig {
            buy_bucket_usd: 0.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
