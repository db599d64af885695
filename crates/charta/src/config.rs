// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::catalog::Role;
pub use crate::column::ProfilingConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::inference::KeywordRule;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub registry: RegistryConfig,
    pub inference: InferenceConfig,
    pub binding: BindingConfig,
    pub insights: InsightConfig,
    pub style: StyleConfig,
    pub profiling: ProfilingConfig,
}

impl EngineConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| {
            ConfigError::ReadFailed {
                path: path.as_ref().display().to_string(),
                source,
            }
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let registry = &self.registry;
        check(registry.idle_ttl > Duration::ZERO, "registry.idle_ttl_secs", || {
            format!("{:?}", registry.idle_ttl)
        })?;
        check(
            registry.sweep_interval > Duration::ZERO,
            "registry.sweep_interval_secs",
            || format!("{:?}", registry.sweep_interval),
        )?;
        check(registry.max_candidates >= 1, "registry.max_candidates", || {
            registry.max_candidates.to_string()
        })?;
        check(
            registry.max_active_requests >= 1,
            "registry.max_active_requests",
            || registry.max_active_requests.to_string(),
        )?;

        let inference = &self.inference;
        check(inference.half_saturation > 0.0, "inference.half_saturation", || {
            inference.half_saturation.to_string()
        })?;
        check(
            inference.fallback_confidence > 0.0 && inference.fallback_confidence <= 1.0,
            "inference.fallback_confidence",
            || inference.fallback_confidence.to_string(),
        )?;
        if let Some(rules) = &inference.rules {
            for rule in rules {
                check(rule.weight >= 0.0, "inference.rules.weight", || {
                    format!("{} for '{}'", rule.weight, rule.pattern)
                })?;
            }
        }

        let insights = &self.insights;
        check(
            (0.0..=1.0).contains(&insights.correlation_threshold),
            "insights.correlation_threshold",
            || insights.correlation_threshold.to_string(),
        )?;
        check(
            insights.significance_level > 0.0 && insights.significance_level < 1.0,
            "insights.significance_level",
            || insights.significance_level.to_string(),
        )?;
        check(insights.trend_min_points >= 3, "insights.trend_min_points", || {
            insights.trend_min_points.to_string()
        })?;
        check(insights.outlier_k > 0.0, "insights.outlier_k", || {
            insights.outlier_k.to_string()
        })?;
        check(insights.iqr_multiplier > 0.0, "insights.iqr_multiplier", || {
            insights.iqr_multiplier.to_string()
        })?;
        check(
            !matches!(insights.distribution_buckets, Some(0)),
            "insights.distribution_buckets",
            || format!("{:?}", insights.distribution_buckets),
        )?;

        let style = &self.style;
        check(style.width > 0 && style.height > 0, "style.width/height", || {
            format!("{}x{}", style.width, style.height)
        })?;
        check(style.max_rows >= 1, "style.max_rows", || style.max_rows.to_string())?;
        check(style.histogram_bins >= 1, "style.histogram_bins", || {
            style.histogram_bins.to_string()
        })?;

        let profiling = &self.profiling;
        check(
            profiling.type_confidence_threshold > 0.0 && profiling.type_confidence_threshold <= 1.0,
            "profiling.type_confidence_threshold",
            || profiling.type_confidence_threshold.to_string(),
        )?;
        Ok(())
    }

    /// Bucket count for distribution insights. Follows `style.histogram_bins` unless
    /// `insights.distribution_buckets` overrides it.
    pub fn distribution_buckets(&self) -> usize {
        self.insights
            .distribution_buckets
            .unwrap_or(self.style.histogram_bins)
    }
}

fn check(ok: bool, field: &str, value: impl FnOnce() -> String) -> ConfigResult<()> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value: value(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    #[serde(rename = "idle_ttl_secs", with = "duration_secs")]
    pub idle_ttl: Duration,
    #[serde(rename = "sweep_interval_secs", with = "duration_secs")]
    pub sweep_interval: Duration,
    pub max_candidates: usize,
    pub max_active_requests: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
            max_candidates: 5,
            max_active_requests: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralWeights {
    pub temporal_line: f64,
    pub temporal_area: f64,
    pub numeric_pair_scatter: f64,
    pub low_cardinality_bar: f64,
    pub low_cardinality_pie: f64,
}

impl Default for StructuralWeights {
    fn default() -> Self {
        Self {
            temporal_line: 0.3,
            temporal_area: 0.2,
            numeric_pair_scatter: 0.3,
            low_cardinality_bar: 0.2,
            low_cardinality_pie: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Keyword table. `None` uses the table shipped with the crate.
    pub rules: Option<Vec<KeywordRule>>,
    pub structural: StructuralWeights,
    pub half_saturation: f64,
    pub low_cardinality_threshold: usize,
    pub fallback_confidence: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            rules: None,
            structural: StructuralWeights::default(),
            half_saturation: 0.5,
            low_cardinality_threshold: 10,
            fallback_confidence: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    pub vocabulary: BTreeMap<Role, Vec<String>>,
    pub fill_optional_roles: bool,
    pub max_color_categories: usize,
}

impl Default for BindingConfig {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|w| w.to_string()).collect::<Vec<_>>();
        let temporal = words(&[
            "date", "time", "month", "year", "day", "week", "quarter", "period", "timestamp",
        ]);
        let measures = words(&[
            "sales", "revenue", "amount", "total", "count", "value", "price", "profit", "cost",
            "quantity", "score",
        ]);
        let groups = words(&[
            "category",
            "region",
            "type",
            "group",
            "segment",
            "class",
            "name",
            "country",
            "department",
            "product",
        ]);
        let mut vocabulary = BTreeMap::new();
        vocabulary.insert(Role::XAxis, temporal);
        vocabulary.insert(Role::YAxis, measures.clone());
        vocabulary.insert(Role::Values, measures.clone());
        vocabulary.insert(Role::Column, measures);
        vocabulary.insert(Role::Category, groups.clone());
        vocabulary.insert(Role::Color, groups.clone());
        vocabulary.insert(Role::Groupby, groups);
        vocabulary.insert(
            Role::Size,
            words(&["size", "volume", "weight", "population"]),
        );
        Self {
            vocabulary,
            fill_optional_roles: true,
            max_color_categories: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    pub correlation_threshold: f64,
    pub trend_min_points: usize,
    pub significance_level: f64,
    pub outlier_k: f64,
    pub skew_threshold: f64,
    pub iqr_multiplier: f64,
    /// `None` uses the histogram chart's bin count.
    pub distribution_buckets: Option<usize>,
    pub decimal_places: usize,
    pub max_outlier_values: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            correlation_threshold: 0.5,
            trend_min_points: 5,
            significance_level: 0.05,
            outlier_k: 3.0,
            skew_threshold: 1.0,
            iqr_multiplier: 1.5,
            distribution_buckets: None,
            decimal_places: 2,
            max_outlier_values: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub width: u32,
    pub height: u32,
    pub theme: String,
    pub max_rows: usize,
    pub histogram_bins: usize,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            theme: "default".to_string(),
            max_rows: 10_000,
            histogram_bins: 30,
        }
    }
}

mod duration_secs {
    use super::*;
    use serde::de::Error;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(D::Error::custom(format!(
                "duration must be a non-negative number of seconds, got {secs}"
            )));
        }
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
