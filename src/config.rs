//! Run configuration: dataset constants, sampling, strategy and error policy.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or none) reproduces the standard run. CLI flags are applied on top
//! through [`ConfigOverrides`].

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::classify::margin::MarginMajority;
use crate::classify::threshold::ThresholdMajority;
use crate::classify::Classifier;
use crate::data::model::{Extent, Vec3};
use crate::data::transform::CoordinateTransformer;
use crate::error::CoregError;

/// Default number of records between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub progress_interval: usize,
    pub transform: TransformConfig,
    pub sampling: SamplingConfig,
    pub strategy: StrategyConfig,
    pub policy: PolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            transform: TransformConfig::default(),
            sampling: SamplingConfig::default(),
            strategy: StrategyConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

/// Nanometer → voxel mapping of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// Nanometers per voxel in the report frame.
    pub resolution: Vec3,
    /// Added after scaling to land in the report frame.
    pub offset: Vec3,
    /// Divisor from the report frame to the sampling frame.
    pub sampling_factor: Vec3,
}

impl Default for TransformConfig {
    fn default() -> Self {
        TransformConfig {
            resolution: Vec3::new(4, 4, 40),
            offset: Vec3::new(-3072, -2560, 7900),
            sampling_factor: Vec3::new(2, 2, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingConfig {
    /// Resolution level the cutouts are requested at.
    pub mip: u32,
    /// Upper bound on concurrent sampler calls.
    pub workers: usize,
    /// Records read and classified per window.
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            mip: 5,
            workers: 4,
            batch_size: 256,
            max_retries: 3,
            retry_backoff_ms: 250,
        }
    }
}

impl SamplingConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Threshold,
    Margin,
}

/// Decision rule and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    Threshold {
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default = "default_threshold_box")]
        box_extent: Extent,
    },
    Margin {
        #[serde(default = "default_min_voxel_count")]
        min_voxel_count: u64,
        #[serde(default = "default_margin_multiplier")]
        margin_multiplier: f64,
        #[serde(default = "default_margin_box")]
        box_extent: Extent,
    },
}

fn default_threshold() -> f64 {
    ThresholdMajority::DEFAULT_THRESHOLD
}

fn default_threshold_box() -> Extent {
    ThresholdMajority::DEFAULT_BOX
}

fn default_min_voxel_count() -> u64 {
    MarginMajority::DEFAULT_MIN_VOXEL_COUNT
}

fn default_margin_multiplier() -> f64 {
    MarginMajority::DEFAULT_MARGIN_MULTIPLIER
}

fn default_margin_box() -> Extent {
    MarginMajority::DEFAULT_BOX
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::defaults_for(StrategyKind::Threshold)
    }
}

impl StrategyConfig {
    pub fn defaults_for(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Threshold => StrategyConfig::Threshold {
                threshold: default_threshold(),
                box_extent: default_threshold_box(),
            },
            StrategyKind::Margin => StrategyConfig::Margin {
                min_voxel_count: default_min_voxel_count(),
                margin_multiplier: default_margin_multiplier(),
                box_extent: default_margin_box(),
            },
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyConfig::Threshold { .. } => StrategyKind::Threshold,
            StrategyConfig::Margin { .. } => StrategyKind::Margin,
        }
    }

    pub fn box_extent_mut(&mut self) -> &mut Extent {
        match self {
            StrategyConfig::Threshold { box_extent, .. } => box_extent,
            StrategyConfig::Margin { box_extent, .. } => box_extent,
        }
    }
}

/// What to do with a line whose coordinates cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorPolicy {
    /// Stop the run at the first malformed line.
    #[default]
    Abort,
    /// Log it, count it as skipped, and continue.
    Skip,
}

/// What to do once a cutout fetch has failed past its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorPolicy {
    /// Emit the record as uncategorized and count it as unavailable.
    #[default]
    Uncategorize,
    Abort,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub on_parse_error: ParseErrorPolicy,
    pub on_fetch_error: FetchErrorPolicy,
}

impl Config {
    /// Read a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Config::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Config> {
        let config: Config = toml::from_str(contents).context("invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing config as TOML")
    }

    pub fn validate(&self) -> Result<(), CoregError> {
        let fail = |msg: String| Err(CoregError::Config(msg));
        let t = &self.transform;
        for (name, v) in [("resolution", t.resolution), ("sampling_factor", t.sampling_factor)] {
            if v.x == 0 || v.y == 0 || v.z == 0 {
                return fail(format!("transform.{name} {v} has a zero component"));
            }
        }
        if self.sampling.workers == 0 {
            return fail("sampling.workers must be at least 1".into());
        }
        if self.sampling.batch_size == 0 {
            return fail("sampling.batch_size must be at least 1".into());
        }
        if self.progress_interval == 0 {
            return fail("progress_interval must be at least 1".into());
        }
        self.classifier().map(|_| ())
    }

    pub fn transformer(&self) -> CoordinateTransformer {
        let t = &self.transform;
        CoordinateTransformer::new(t.resolution, t.offset, t.sampling_factor)
    }

    pub fn classifier(&self) -> Result<Classifier, CoregError> {
        Ok(match self.strategy {
            StrategyConfig::Threshold {
                threshold,
                box_extent,
            } => ThresholdMajority::new(threshold, box_extent)?.into(),
            StrategyConfig::Margin {
                min_voxel_count,
                margin_multiplier,
                box_extent,
            } => MarginMajority::new(min_voxel_count, margin_multiplier, box_extent)?.into(),
        })
    }

    /// Apply command-line overrides, then re-validate.
    pub fn apply(&mut self, o: &ConfigOverrides) -> Result<(), CoregError> {
        if let Some(kind) = o.strategy {
            if kind != self.strategy.kind() {
                self.strategy = StrategyConfig::defaults_for(kind);
            }
        }
        if let Some(value) = o.threshold {
            match &mut self.strategy {
                StrategyConfig::Threshold { threshold, .. } => *threshold = value,
                StrategyConfig::Margin { .. } => {
                    return Err(CoregError::Config(
                        "--threshold only applies to the threshold strategy".into(),
                    ));
                }
            }
        }
        if o.min_voxel_count.is_some() || o.margin_multiplier.is_some() {
            match &mut self.strategy {
                StrategyConfig::Margin {
                    min_voxel_count,
                    margin_multiplier,
                    ..
                } => {
                    if let Some(v) = o.min_voxel_count {
                        *min_voxel_count = v;
                    }
                    if let Some(v) = o.margin_multiplier {
                        *margin_multiplier = v;
                    }
                }
                StrategyConfig::Threshold { .. } => {
                    return Err(CoregError::Config(
                        "--min-voxel-count / --margin-multiplier only apply to the margin strategy"
                            .into(),
                    ));
                }
            }
        }
        if let Some(extent) = o.box_extent {
            *self.strategy.box_extent_mut() = extent;
        }
        if let Some(mip) = o.mip {
            self.sampling.mip = mip;
        }
        if let Some(workers) = o.workers {
            self.sampling.workers = workers;
        }
        if let Some(policy) = o.on_parse_error {
            self.policy.on_parse_error = policy;
        }
        if let Some(policy) = o.on_fetch_error {
            self.policy.on_fetch_error = policy;
        }
        self.validate()
    }
}

/// Values given on the command line; `None` leaves the config untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub strategy: Option<StrategyKind>,
    pub threshold: Option<f64>,
    pub min_voxel_count: Option<u64>,
    pub margin_multiplier: Option<f64>,
    pub box_extent: Option<Extent>,
    pub mip: Option<u32>,
    pub workers: Option<usize>,
    pub on_parse_error: Option<ParseErrorPolicy>,
    pub on_fetch_error: Option<FetchErrorPolicy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.transform.resolution, Vec3::new(4, 4, 40));
        assert_eq!(config.transform.offset, Vec3::new(-3072, -2560, 7900));
        assert_eq!(config.sampling.mip, 5);
        assert_eq!(config.progress_interval, 100);
        assert_eq!(config.classifier().unwrap().box_extent(), Extent::new(8, 8, 32));
    }

    #[test]
    fn margin_section_fills_missing_fields() {
        let config = Config::from_toml_str(
            r#"
            [strategy]
            kind = "margin"
            min_voxel_count = 1000
            "#,
        )
        .unwrap();
        assert_eq!(
            config.strategy,
            StrategyConfig::Margin {
                min_voxel_count: 1000,
                margin_multiplier: 1.5,
                box_extent: Extent::new(32, 32, 128),
            }
        );
    }

    #[test]
    fn full_file_parses() {
        let config = Config::from_toml_str(
            r#"
            progress_interval = 10

            [transform]
            resolution = [8, 8, 40]
            offset = [0, 0, 0]

            [sampling]
            mip = 3
            workers = 2

            [strategy]
            kind = "threshold"
            threshold = 0.75
            box_extent = [4, 4, 16]

            [policy]
            on_parse_error = "skip"
            on_fetch_error = "abort"
            "#,
        )
        .unwrap();
        assert_eq!(config.progress_interval, 10);
        assert_eq!(config.transform.sampling_factor, Vec3::new(2, 2, 1));
        assert_eq!(config.sampling.workers, 2);
        assert_eq!(config.sampling.batch_size, 256);
        assert_eq!(config.policy.on_parse_error, ParseErrorPolicy::Skip);
        assert_eq!(config.policy.on_fetch_error, FetchErrorPolicy::Abort);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for bad in [
            "[strategy]\nkind = \"threshold\"\nthreshold = 1.5",
            "[strategy]\nkind = \"margin\"\nmargin_multiplier = 0.5",
            "[strategy]\nkind = \"margin\"\nbox_extent = [32, 0, 128]",
            "[transform]\nresolution = [4, 0, 40]",
            "[sampling]\nworkers = 0",
            "progress_interval = 0",
            "[sampling]\nunknown_key = 1",
        ] {
            assert!(Config::from_toml_str(bad).is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn toml_round_trip() {
        let mut config = Config::default();
        config.strategy = StrategyConfig::defaults_for(StrategyKind::Margin);
        config.policy.on_parse_error = ParseErrorPolicy::Skip;
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn overrides_switch_strategy_and_set_params() {
        let mut config = Config::default();
        config
            .apply(&ConfigOverrides {
                strategy: Some(StrategyKind::Margin),
                min_voxel_count: Some(50),
                box_extent: Some(Extent::new(16, 16, 64)),
                workers: Some(8),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            config.strategy,
            StrategyConfig::Margin {
                min_voxel_count: 50,
                margin_multiplier: 1.5,
                box_extent: Extent::new(16, 16, 64),
            }
        );
        assert_eq!(config.sampling.workers, 8);
    }

    #[test]
    fn overrides_reject_mismatched_parameters() {
        let mut config = Config::default();
        let err = config.apply(&ConfigOverrides {
            margin_multiplier: Some(2.0),
            ..Default::default()
        });
        assert!(matches!(err, Err(CoregError::Config(_))));

        let err = config.apply(&ConfigOverrides {
            threshold: Some(0.0),
            ..Default::default()
        });
        assert!(matches!(err, Err(CoregError::Config(_))));
    }
}
