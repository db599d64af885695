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

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::{
    ChunkVar, DataFrame, DataType as PolarsType, Float64Chunked, PolarsResult, Series,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Categorical,
    Temporal,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Categorical => "categorical",
            ColumnType::Temporal => "temporal",
            ColumnType::Text => "text",
        }
    }
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Numeric)
    }
    pub fn is_categorical(&self) -> bool {
        matches!(self, ColumnType::Categorical)
    }
    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Temporal)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one column of a table, taken once when a request is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub inferred_type: ColumnType,
    pub distinct_count: usize,
    pub null_count: usize,
    pub sample_values: Vec<String>,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, inferred_type: ColumnType, distinct_count: usize) -> Self {
        Self {
            name: name.into(),
            inferred_type,
            distinct_count,
            null_count: 0,
            sample_values: Vec::new(),
        }
    }
    pub fn with_null_count(mut self, null_count: usize) -> Self {
        self.null_count = null_count;
        self
    }
    pub fn with_sample_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sample_values = values.into_iter().map(Into::into).collect();
        self
    }
    /// A column with at least one non-null value.
    pub fn is_usable(&self) -> bool {
        self.distinct_count > 0
    }
    pub fn numeric_samples(&self) -> Vec<f64> {
        self.sample_values
            .iter()
            .filter_map(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect()
    }
    /// Population variance of the numeric sample values, if at least two parse.
    pub fn sample_variance(&self) -> Option<f64> {
        let values = self.numeric_samples();
        if values.len() < 2 {
            return None;
        }
        Float64Chunked::from_vec(self.name.as_str().into(), values).var(0)
    }
}

impl fmt::Display for ColumnMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} distinct)",
            self.name, self.inferred_type, self.distinct_count
        )
    }
}

pub fn find_column<'a>(columns: &'a [ColumnMetadata], name: &str) -> Option<&'a ColumnMetadata> {
    columns.iter().find(|c| c.name == name)
}

pub fn usable_count(columns: &[ColumnMetadata]) -> usize {
    columns.iter().filter(|c| c.is_usable()).count()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    pub max_sample_values: usize,
    pub type_confidence_threshold: f64,
    pub max_categorical_cardinality: usize,
    pub temporal_formats: Vec<String>,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            max_sample_values: 5,
            type_confidence_threshold: 0.8,
            max_categorical_cardinality: 50,
            temporal_formats: vec![
                "%Y-%m-%d".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%SZ".to_string(),
                "%m/%d/%Y".to_string(),
                "%d/%m/%Y".to_string(),
                "%Y%m%d".to_string(),
            ],
        }
    }
}

/// Derives [`ColumnMetadata`] from a polars frame.
#[derive(Debug, Clone, Default)]
pub struct ColumnProfiler {
    config: ProfilingConfig,
}

impl ColumnProfiler {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_config(config: ProfilingConfig) -> Self {
        Self { config }
    }
    pub fn profile_dataframe(&self, df: &DataFrame) -> PolarsResult<Vec<ColumnMetadata>> {
        df.get_columns()
            .par_iter()
            .map(|column| self.profile_column(column.as_materialized_series()))
            .collect()
    }
    fn profile_column(&self, column: &Series) -> PolarsResult<ColumnMetadata> {
        let series = column.drop_nulls();
        let distinct_count = series.n_unique()?;
        let inferred_type = self.detect_type(column, distinct_count)?;
        let sample = series
            .unique()?
            .head(Some(self.config.max_sample_values))
            .cast(&PolarsType::String)?;
        let sample_values = sample
            .str()?
            .into_iter()
            .flatten()
            .map(String::from)
            .collect();
        Ok(ColumnMetadata {
            name: column.name().to_string(),
            inferred_type,
            distinct_count,
            null_count: column.null_count(),
            sample_values,
        })
    }
    fn detect_type(&self, column: &Series, distinct_count: usize) -> PolarsResult<ColumnType> {
        let non_null = column.len() - column.null_count();
        match column.dtype() {
            PolarsType::Int32
            | PolarsType::Int64
            | PolarsType::UInt32
            | PolarsType::UInt64
            | PolarsType::Float32
            | PolarsType::Float64 => return Ok(ColumnType::Numeric),
            PolarsType::Date | PolarsType::Datetime(_, _) => return Ok(ColumnType::Temporal),
            PolarsType::Boolean => return Ok(ColumnType::Categorical),
            _ => {}
        }
        if non_null == 0 {
            return Ok(ColumnType::Categorical);
        }
        let as_float = column.cast(&PolarsType::Float64)?;
        let numeric_confidence = (as_float.len() - as_float.null_count()) as f64 / non_null as f64;
        if numeric_confidence >= self.config.type_confidence_threshold && distinct_count > 1 {
            return Ok(ColumnType::Numeric);
        }
        let as_text = column.cast(&PolarsType::String)?;
        let values: Vec<&str> = as_text.str()?.into_iter().flatten().collect();
        if self.temporal_confidence(&values) >= self.config.type_confidence_threshold {
            return Ok(ColumnType::Temporal);
        }
        if distinct_count <= self.config.max_categorical_cardinality
            || distinct_count * 2 <= non_null
        {
            Ok(ColumnType::Categorical)
        } else {
            Ok(ColumnType::Text)
        }
    }
    fn temporal_confidence(&self, values: &[&str]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        self.config
            .temporal_formats
            .iter()
            .map(|format| {
                let parsed = values
                    .iter()
                    .filter(|v| parses_as_datetime(v, format))
                    .count();
                parsed as f64 / values.len() as f64
            })
            .fold(0.0, f64::max)
    }
}

fn parses_as_datetime(value: &str, format: &str) -> bool {
    parse_timestamp(value, format).is_some()
}

/// Seconds since the epoch for a date or datetime string in `format`.
pub(crate) fn parse_timestamp(value: &str, format: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(value, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|datetime| datetime.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_profile_detects_types() {
        let df = df!(
            "date" => ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"],
            "region" => ["north", "south", "north", "east"],
            "sales" => [10.0, 12.5, 9.0, 14.0],
        )
        .unwrap();
        let profiles = ColumnProfiler::new().profile_dataframe(&df).unwrap();
        assert_eq!(profiles[0].inferred_type, ColumnType::Temporal);
        assert_eq!(profiles[1].inferred_type, ColumnType::Categorical);
        assert_eq!(profiles[1].distinct_count, 3);
        assert_eq!(profiles[2].inferred_type, ColumnType::Numeric);
        assert!(profiles[2].sample_values.len() <= 5);
    }

    #[test]
    fn test_confidence_threshold_controls_numeric_detection() {
        let df = df!("reading" => ["1", "2", "3", "n/a"]).unwrap();
        let strict = ColumnProfiler::new().profile_dataframe(&df).unwrap();
        assert_eq!(strict[0].inferred_type, ColumnType::Categorical);

        let lenient = ColumnProfiler::with_config(ProfilingConfig {
            type_confidence_threshold: 0.7,
            ..ProfilingConfig::default()
        });
        let profiles = lenient.profile_dataframe(&df).unwrap();
        assert_eq!(profiles[0].inferred_type, ColumnType::Numeric);
    }

    #[test]
    fn test_parse_timestamp_orders_us_dates() {
        let november = parse_timestamp("11/01/2023", "%m/%d/%Y").unwrap();
        let january = parse_timestamp("01/01/2024", "%m/%d/%Y").unwrap();
        assert!(november < january);
        assert!(parse_timestamp("2024-01-01 08:30:00", "%Y-%m-%d %H:%M:%S").is_some());
        assert!(parse_timestamp("13/45/2024", "%m/%d/%Y").is_none());
    }

    #[test]
    fn test_sample_variance() {
        let column = ColumnMetadata::new("x", ColumnType::Numeric, 3)
            .with_sample_values(["1", "2", "3"]);
        let variance = column.sample_variance().unwrap();
        assert!((variance - 2.0 / 3.0).abs() < 1e-12);
        let empty = ColumnMetadata::new("y", ColumnType::Numeric, 0);
        assert!(!empty.is_usable());
        assert!(empty.sample_variance().is_none());
    }
}
