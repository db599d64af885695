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

pub mod stats;

use crate::catalog::Role;
use crate::column::{find_column, parse_timestamp, ColumnMetadata, ProfilingConfig};
use crate::config::{InsightConfig, StyleConfig};
use crate::error::VizError;
use crate::validation::Bindings;
use polars::prelude::{
    ChunkAgg, ChunkFilter, ChunkQuantile, DataFrame, DataType as PolarsType, Float64Chunked,
    PolarsResult, StringChunked,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stats::{Bucket, Moments};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Max,
    Min,
    Mean,
    Median,
    DistinctCount,
    TotalCount,
    Correlation,
    Trend,
    Outliers,
    Distribution,
}

impl InsightKind {
    pub const ALL: [InsightKind; 10] = [
        InsightKind::Max,
        InsightKind::Min,
        InsightKind::Mean,
        InsightKind::Median,
        InsightKind::DistinctCount,
        InsightKind::TotalCount,
        InsightKind::Correlation,
        InsightKind::Trend,
        InsightKind::Outliers,
        InsightKind::Distribution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::Max => "max",
            InsightKind::Min => "min",
            InsightKind::Mean => "mean",
            InsightKind::Median => "median",
            InsightKind::DistinctCount => "distinct_count",
            InsightKind::TotalCount => "total_count",
            InsightKind::Correlation => "correlation",
            InsightKind::Trend => "trend",
            InsightKind::Outliers => "outliers",
            InsightKind::Distribution => "distribution",
        }
    }
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsightKind {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        InsightKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| VizError::UnknownInsightKind {
                name: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSummary {
    pub x: String,
    pub y: String,
    pub coefficient: f64,
    pub strong: bool,
    pub strength: String,
    pub pairs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub axis: Option<String>,
    pub value_column: String,
    pub direction: TrendDirection,
    pub significant: bool,
    pub slope: f64,
    pub r_squared: f64,
    pub p_value: f64,
    pub points: usize,
    pub start_value: f64,
    pub end_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    ZScore,
    Iqr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierSummary {
    pub method: OutlierMethod,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub count: usize,
    pub percentage: f64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSummary {
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub moments: Option<Moments>,
    pub shape: String,
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InsightValue {
    PerColumn(BTreeMap<String, f64>),
    Counts(BTreeMap<String, usize>),
    Correlation(CorrelationSummary),
    Trend(TrendSummary),
    Outliers(BTreeMap<String, OutlierSummary>),
    Distribution(BTreeMap<String, DistributionSummary>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightResult {
    pub kind: InsightKind,
    pub status: InsightStatus,
    pub value: Option<InsightValue>,
    pub narrative: String,
    pub error: Option<String>,
}

impl InsightResult {
    fn ok(kind: InsightKind, value: InsightValue, narrative: String) -> Self {
        Self {
            kind,
            status: InsightStatus::Ok,
            value: Some(value),
            narrative,
            error: None,
        }
    }

    fn failed(kind: InsightKind, error: String) -> Self {
        Self {
            kind,
            status: InsightStatus::Failed,
            value: None,
            narrative: String::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == InsightStatus::Ok
    }
}

type KindOutcome = Result<(InsightValue, String), String>;

/// A bound role with the column data it points at.
struct BoundColumn<'a> {
    role: Role,
    name: &'a str,
    metadata: Option<&'a ColumnMetadata>,
}

impl BoundColumn<'_> {
    fn is_numeric(&self) -> bool {
        self.metadata
            .map(|m| m.inferred_type.is_numeric())
            .unwrap_or(false)
    }

    fn is_temporal(&self) -> bool {
        self.metadata
            .map(|m| m.inferred_type.is_temporal())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct InsightEngine {
    config: InsightConfig,
    distribution_buckets: usize,
    temporal_formats: Vec<String>,
}

impl Default for InsightEngine {
    fn default() -> Self {
        Self::new(InsightConfig::default())
    }
}

impl InsightEngine {
    pub fn new(config: InsightConfig) -> Self {
        let distribution_buckets = config
            .distribution_buckets
            .unwrap_or(StyleConfig::default().histogram_bins);
        Self {
            config,
            distribution_buckets,
            temporal_formats: ProfilingConfig::default().temporal_formats,
        }
    }

    pub fn with_distribution_buckets(mut self, buckets: usize) -> Self {
        self.distribution_buckets = buckets.max(1);
        self
    }

    /// Formats tried, in order, when a temporal axis is stored as text.
    pub fn with_temporal_formats(mut self, formats: Vec<String>) -> Self {
        self.temporal_formats = formats;
        self
    }

    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    /// One result per requested kind, in request order.
    pub fn compute(
        &self,
        kinds: &[InsightKind],
        bindings: &Bindings,
        columns: &[ColumnMetadata],
        data: &DataFrame,
    ) -> Vec<InsightResult> {
        let bound: Vec<BoundColumn<'_>> = bindings
            .iter()
            .map(|(&role, name)| BoundColumn {
                role,
                name: name.as_str(),
                metadata: find_column(columns, name),
            })
            .collect();

        kinds
            .par_iter()
            .map(|&kind| {
                let outcome = self.compute_kind(kind, &bound, data);
                match outcome {
                    Ok((value, narrative)) => InsightResult::ok(kind, value, narrative),
                    Err(error) => {
                        debug!(kind = %kind, error = %error, "Insight failed");
                        InsightResult::failed(kind, error)
                    }
                }
            })
            .collect()
    }

    /// Joins the narratives of the successful results.
    pub fn summarize(&self, results: &[InsightResult]) -> String {
        let parts: Vec<&str> = results
            .iter()
            .filter(|r| r.is_ok() && !r.narrative.is_empty())
            .map(|r| r.narrative.as_str())
            .collect();
        if parts.is_empty() {
            "No insights could be computed for the selected data.".to_string()
        } else {
            parts.join(" ")
        }
    }

    fn compute_kind(&self, kind: InsightKind, bound: &[BoundColumn<'_>], data: &DataFrame) -> KindOutcome {
        debug!(kind = %kind, bound = bound.len(), "Computing insight");
        match kind {
            InsightKind::Max | InsightKind::Min | InsightKind::Mean | InsightKind::Median => {
                self.aggregate(kind, bound, data)
            }
            InsightKind::DistinctCount | InsightKind::TotalCount => self.counts(kind, bound, data),
            InsightKind::Correlation => self.correlation_insight(bound, data),
            InsightKind::Trend => self.trend(bound, data),
            InsightKind::Outliers => self.outliers(bound, data),
            InsightKind::Distribution => self.distribution(bound, data),
        }
    }

    fn numeric_columns<'b>(&self, bound: &'b [BoundColumn<'b>]) -> Vec<&'b str> {
        let mut names: Vec<&str> = Vec::new();
        for column in bound.iter().filter(|c| c.is_numeric()) {
            if !names.contains(&column.name) {
                names.push(column.name);
            }
        }
        names
    }

    fn aggregate(&self, kind: InsightKind, bound: &[BoundColumn<'_>], data: &DataFrame) -> KindOutcome {
        let names = self.numeric_columns(bound);
        if names.is_empty() {
            return Err(format!("{kind} needs at least one numeric column bound to a role"));
        }
        let label = match kind {
            InsightKind::Max => "Maximum",
            InsightKind::Min => "Minimum",
            InsightKind::Mean => "Average",
            _ => "Median",
        };
        let mut values = BTreeMap::new();
        let mut sentences = Vec::new();
        for name in names {
            let column = finite_values(data, name).map_err(|e| read_failure(name, e))?;
            let result = match kind {
                InsightKind::Max => column.max(),
                InsightKind::Min => column.min(),
                InsightKind::Mean => column.mean(),
                _ => column.median(),
            };
            if let Some(result) = result {
                sentences.push(format!("{label} {name} is {}.", self.fmt(result)));
                values.insert(name.to_string(), result);
            }
        }
        if values.is_empty() {
            return Err(format!("{kind} found no numeric values in the bound columns"));
        }
        Ok((InsightValue::PerColumn(values), sentences.join(" ")))
    }

    fn counts(&self, kind: InsightKind, bound: &[BoundColumn<'_>], data: &DataFrame) -> KindOutcome {
        if bound.is_empty() {
            return Err(format!("{kind} needs at least one bound column"));
        }
        let mut counts = BTreeMap::new();
        let mut sentences = Vec::new();
        for column in bound {
            if counts.contains_key(column.name) {
                continue;
            }
            let series = data
                .column(column.name)
                .map_err(|e| read_failure(column.name, e))?
                .as_materialized_series();
            let count = if kind == InsightKind::DistinctCount {
                series
                    .drop_nulls()
                    .n_unique()
                    .map_err(|e| read_failure(column.name, e))?
            } else {
                series.len()
            };
            sentences.push(if kind == InsightKind::DistinctCount {
                format!("{} has {count} unique values.", column.name)
            } else {
                format!("{} has {count} rows.", column.name)
            });
            counts.insert(column.name.to_string(), count);
        }
        Ok((InsightValue::Counts(counts), sentences.join(" ")))
    }

    fn correlation_insight(&self, bound: &[BoundColumn<'_>], data: &DataFrame) -> KindOutcome {
        let numeric: Vec<&BoundColumn<'_>> = bound.iter().filter(|c| c.is_numeric()).collect();
        let [first, second, ..] = numeric.as_slice() else {
            return Err(format!(
                "Correlation needs two numeric columns bound to roles, found {}",
                numeric.len()
            ));
        };
        let mut summary = correlation(data, first.name, second.name)?;
        let r = summary.coefficient;
        summary.strong = r.abs() >= self.config.correlation_threshold;
        let narrative = format!(
            "{} {} correlation between {} and {} (r = {}, {}).",
            if summary.strong { "Strong" } else { "Weak" },
            if r >= 0.0 { "positive" } else { "negative" },
            summary.x,
            summary.y,
            self.fmt(r),
            summary.strength
        );
        Ok((InsightValue::Correlation(summary), narrative))
    }

    fn trend(&self, bound: &[BoundColumn<'_>], data: &DataFrame) -> KindOutcome {
        let axis = bound.iter().find(|c| {
            c.role == Role::XAxis
                && c.metadata
                    .map(|m| m.inferred_type.is_temporal() || m.inferred_type.is_numeric())
                    .unwrap_or(false)
        });
        let axis_name = axis.map(|a| a.name);
        let numeric_axis = axis.is_some_and(|a| a.is_numeric());
        let value = [Role::YAxis, Role::Values, Role::Column, Role::Size]
            .iter()
            .find_map(|role| {
                bound
                    .iter()
                    .find(|c| c.role == *role && c.is_numeric() && Some(c.name) != axis_name)
            })
            .ok_or_else(|| "Trend needs a numeric value column bound to a role".to_string())?;

        let y = optional_values(data, value.name).map_err(|e| read_failure(value.name, e))?;
        let points: Vec<(AxisKey, f64)> = match axis {
            Some(axis) => {
                let keys = self
                    .axis_keys(data, axis)
                    .map_err(|e| read_failure(axis.name, e))?;
                let mut points: Vec<(AxisKey, f64)> = keys
                    .into_iter()
                    .zip(y)
                    .filter_map(|(k, v)| Some((k?, v?)))
                    .collect();
                points.sort_by(|a, b| a.0.cmp_key(&b.0));
                points
            }
            None => y
                .into_iter()
                .flatten()
                .enumerate()
                .map(|(i, v)| (AxisKey::Number(i as f64), v))
                .collect(),
        };

        let min_points = self.config.trend_min_points;
        if points.len() < min_points {
            return Err(format!(
                "Trend needs at least {min_points} points, found {}",
                points.len()
            ));
        }
        // A numeric axis regresses on its own values; time and row order on positions.
        let xs: Vec<f64> = if numeric_axis {
            points
                .iter()
                .map(|(key, _)| match key {
                    AxisKey::Number(x) => *x,
                    AxisKey::Text(_) => f64::NAN,
                })
                .collect()
        } else {
            (0..points.len()).map(|i| i as f64).collect()
        };
        let ordered: Vec<f64> = points.into_iter().map(|(_, v)| v).collect();
        let fit = stats::linear_regression(&xs, &ordered)
            .filter(|fit| fit.slope.is_finite())
            .ok_or_else(|| "Trend regression is undefined for this data".to_string())?;

        let direction = match fit.slope {
            s if s > 1e-12 => TrendDirection::Increasing,
            s if s < -1e-12 => TrendDirection::Decreasing,
            _ => TrendDirection::Stable,
        };
        let significant =
            direction != TrendDirection::Stable && fit.p_value < self.config.significance_level;
        let over = axis_name.map(|a| format!(" over {a}")).unwrap_or_default();
        let unit = match axis_name {
            Some(a) if numeric_axis => format!("unit of {a}"),
            _ => "step".to_string(),
        };
        let narrative = if significant {
            format!(
                "{} shows a significant {} trend{} (slope {} per {}, R² {}, p = {:.4}).",
                value.name,
                direction.as_str(),
                over,
                self.fmt(fit.slope),
                unit,
                self.fmt(fit.r_squared),
                fit.p_value
            )
        } else {
            format!(
                "{} shows no significant trend{} (p = {:.4}).",
                value.name, over, fit.p_value
            )
        };
        let summary = TrendSummary {
            axis: axis_name.map(str::to_string),
            value_column: value.name.to_string(),
            direction,
            significant,
            slope: fit.slope,
            r_squared: fit.r_squared,
            p_value: fit.p_value,
            points: ordered.len(),
            start_value: ordered[0],
            end_value: ordered[ordered.len() - 1],
        };
        Ok((InsightValue::Trend(summary), narrative))
    }

    fn outliers(&self, bound: &[BoundColumn<'_>], data: &DataFrame) -> KindOutcome {
        let names = self.numeric_columns(bound);
        if names.is_empty() {
            return Err("Outlier detection needs a numeric column bound to a role".to_string());
        }
        let mut summaries = BTreeMap::new();
        let mut sentences = Vec::new();
        for name in names {
            let values = finite_values(data, name).map_err(|e| read_failure(name, e))?;
            if values.is_empty() {
                continue;
            }
            let summary = self.outlier_summary(&values);
            sentences.push(match (summary.count, summary.method) {
                (0, _) => format!("{name} has no outliers."),
                (n, OutlierMethod::ZScore) => format!(
                    "{name} has {n} outlier(s) ({}%) beyond {} standard deviations.",
                    self.fmt(summary.percentage),
                    self.config.outlier_k
                ),
                (n, OutlierMethod::Iqr) => format!(
                    "{name} has {n} outlier(s) ({}%) outside {}x the interquartile range.",
                    self.fmt(summary.percentage),
                    self.config.iqr_multiplier
                ),
            });
            summaries.insert(name.to_string(), summary);
        }
        if summaries.is_empty() {
            return Err("Outlier detection found no numeric values".to_string());
        }
        Ok((InsightValue::Outliers(summaries), sentences.join(" ")))
    }

    fn outlier_summary(&self, values: &Float64Chunked) -> OutlierSummary {
        let moments = stats::moments(values);
        let skewed = moments
            .map(|m| m.skewness.abs() > self.config.skew_threshold)
            .unwrap_or(false);
        let (method, lower_bound, upper_bound) = match moments {
            Some(_) if skewed => {
                let q1 = stats::quantile(values, 0.25).unwrap_or(0.0);
                let q3 = stats::quantile(values, 0.75).unwrap_or(0.0);
                let spread = (q3 - q1) * self.config.iqr_multiplier;
                (OutlierMethod::Iqr, q1 - spread, q3 + spread)
            }
            Some(m) => {
                let spread = m.std_dev * self.config.outlier_k;
                (OutlierMethod::ZScore, m.mean - spread, m.mean + spread)
            }
            None => {
                let v = values.get(0).unwrap_or(0.0);
                (OutlierMethod::ZScore, v, v)
            }
        };
        let flagged: Vec<f64> = values
            .into_iter()
            .flatten()
            .filter(|v| *v < lower_bound || *v > upper_bound)
            .collect();
        OutlierSummary {
            method,
            lower_bound,
            upper_bound,
            count: flagged.len(),
            percentage: flagged.len() as f64 * 100.0 / values.len() as f64,
            values: flagged
                .into_iter()
                .take(self.config.max_outlier_values)
                .collect(),
        }
    }

    fn distribution(&self, bound: &[BoundColumn<'_>], data: &DataFrame) -> KindOutcome {
        let names = self.numeric_columns(bound);
        if names.is_empty() {
            return Err("Distribution needs a numeric column bound to a role".to_string());
        }
        let mut summaries = BTreeMap::new();
        let mut sentences = Vec::new();
        for name in names {
            let values = finite_values(data, name).map_err(|e| read_failure(name, e))?;
            let (Some(min), Some(q1), Some(median), Some(q3), Some(max)) = (
                values.min(),
                stats::quantile(&values, 0.25),
                values.median(),
                stats::quantile(&values, 0.75),
                values.max(),
            ) else {
                continue;
            };
            let moments = stats::moments(&values);
            let shape = stats::distribution_shape(moments.as_ref()).to_string();
            sentences.push(format!(
                "{name} is {shape}, ranging from {} to {} with median {}.",
                self.fmt(min),
                self.fmt(max),
                self.fmt(median)
            ));
            summaries.insert(
                name.to_string(),
                DistributionSummary {
                    count: values.len(),
                    min,
                    q1,
                    median,
                    q3,
                    max,
                    moments,
                    shape,
                    buckets: stats::histogram(&values, self.distribution_buckets),
                },
            );
        }
        if summaries.is_empty() {
            return Err("Distribution found no numeric values".to_string());
        }
        Ok((InsightValue::Distribution(summaries), sentences.join(" ")))
    }

    fn fmt(&self, value: f64) -> String {
        format!("{:.*}", self.config.decimal_places, value)
    }

    /// Sort keys for the trend axis. Temporal text parses with the configured formats,
    /// other columns use numeric keys when every present value casts, lexical otherwise.
    fn axis_keys(
        &self,
        data: &DataFrame,
        axis: &BoundColumn<'_>,
    ) -> PolarsResult<Vec<Option<AxisKey>>> {
        let series = data.column(axis.name)?.as_materialized_series();
        if axis.is_temporal() && series.dtype() == &PolarsType::String {
            if let Some(keys) = self.temporal_keys(series.str()?) {
                return Ok(keys);
            }
        }
        let numeric = series.to_physical_repr().cast(&PolarsType::Float64)?;
        if numeric.null_count() == series.null_count() {
            return Ok(numeric
                .f64()?
                .into_iter()
                .map(|v| v.map(AxisKey::Number))
                .collect());
        }
        let text = series.cast(&PolarsType::String)?;
        Ok(text
            .str()?
            .into_iter()
            .map(|v| v.map(|s| AxisKey::Text(s.to_string())))
            .collect())
    }

    /// Timestamps under the format that parses the most values; earlier formats win ties.
    fn temporal_keys(&self, values: &StringChunked) -> Option<Vec<Option<AxisKey>>> {
        let mut best: Option<(usize, Vec<Option<AxisKey>>)> = None;
        for format in &self.temporal_formats {
            let keys: Vec<Option<AxisKey>> = values
                .into_iter()
                .map(|v| v.and_then(|s| parse_timestamp(s.trim(), format)))
                .map(|ts| ts.map(|ts| AxisKey::Number(ts as f64)))
                .collect();
            let parsed = keys.iter().flatten().count();
            if parsed > best.as_ref().map_or(0, |(count, _)| *count) {
                best = Some((parsed, keys));
            }
        }
        best.map(|(_, keys)| keys)
    }
}

/// Pearson correlation over rows where both columns hold finite values.
pub fn correlation(data: &DataFrame, x: &str, y: &str) -> Result<CorrelationSummary, String> {
    let xs = optional_values(data, x).map_err(|e| read_failure(x, e))?;
    let ys = optional_values(data, y).map_err(|e| read_failure(y, e))?;
    let (a, b): (Vec<f64>, Vec<f64>) = xs
        .into_iter()
        .zip(ys)
        .filter_map(|(a, b)| Some((a?, b?)))
        .unzip();
    if a.len() < 2 {
        return Err(format!(
            "Correlation between {x} and {y} needs at least two complete rows, found {}",
            a.len()
        ));
    }
    let coefficient = stats::pearson(&a, &b).ok_or_else(|| {
        format!("Correlation between {x} and {y} is undefined: a column has zero variance")
    })?;
    Ok(CorrelationSummary {
        x: x.to_string(),
        y: y.to_string(),
        coefficient,
        strong: coefficient.abs() >= InsightConfig::default().correlation_threshold,
        strength: stats::correlation_strength(coefficient.abs()).to_string(),
        pairs: a.len(),
    })
}

fn read_failure(column: &str, error: impl fmt::Display) -> String {
    format!("Could not read column '{column}': {error}")
}

fn optional_values(data: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let series = data
        .column(name)?
        .as_materialized_series()
        .cast(&PolarsType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// The column cast to `f64` with nulls and non-finite values removed.
fn finite_values(data: &DataFrame, name: &str) -> PolarsResult<Float64Chunked> {
    let series = data
        .column(name)?
        .as_materialized_series()
        .cast(&PolarsType::Float64)?;
    let values = series.f64()?;
    values.filter(&values.is_finite())
}

enum AxisKey {
    Number(f64),
    Text(String),
}

impl AxisKey {
    fn cmp_key(&self, other: &AxisKey) -> Ordering {
        match (self, other) {
            (AxisKey::Number(a), AxisKey::Number(b)) => a.total_cmp(b),
            (AxisKey::Text(a), AxisKey::Text(b)) => a.cmp(b),
            (AxisKey::Number(_), AxisKey::Text(_)) => Ordering::Less,
            (AxisKey::Text(_), AxisKey::Number(_)) => Ordering::Greater,
        }
    }
}

