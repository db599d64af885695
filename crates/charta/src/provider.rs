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

//! Collaborators the engine talks to: where rows come from and where charts go.

use crate::catalog::{ChartType, Role};
use crate::column::{ColumnMetadata, ColumnProfiler, ColumnType};
use crate::config::StyleConfig;
use crate::error::{ProviderError, ProviderResult, RenderResult};
use crate::insights::InsightResult;
use crate::validation::Bindings;
use async_trait::async_trait;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn get_columns(&self, table_reference: &str) -> ProviderResult<Vec<ColumnMetadata>>;

    /// Rows of `columns` only, after `filter` has been applied.
    async fn get_rows(
        &self,
        table_reference: &str,
        columns: &[String],
        filter: Option<&RowFilter>,
    ) -> ProviderResult<DataFrame>;
}

#[async_trait]
pub trait RenderSink: Send + Sync {
    /// Produces an artifact and returns a reference to it. Input is already validated.
    async fn render(
        &self,
        spec: &ValidatedChartSpec,
        data: &DataFrame,
        insights: &[InsightResult],
        style: &StyleConfig,
    ) -> RenderResult<String>;
}

/// A chart configuration that passed validation. Only the engine can build one.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedChartSpec {
    request_id: String,
    chart_type: ChartType,
    title: String,
    bindings: Bindings,
    field_types: BTreeMap<Role, ColumnType>,
    summary: String,
}

impl ValidatedChartSpec {
    pub(crate) fn new(
        request_id: String,
        chart_type: ChartType,
        title: String,
        bindings: Bindings,
        field_types: BTreeMap<Role, ColumnType>,
        summary: String,
    ) -> Self {
        Self {
            request_id,
            chart_type,
            title,
            bindings,
            field_types,
            summary,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn chart_type(&self) -> ChartType {
        self.chart_type
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn field_type(&self, role: Role) -> Option<ColumnType> {
        self.field_types.get(&role).copied()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
}

impl FilterOperator {
    pub fn parse(op: &str) -> Option<Self> {
        match op.trim() {
            "=" | "==" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::NotEq),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::GtEq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::LtEq),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Lt => "<",
            Self::LtEq => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Number(n) => write!(f, "{n}"),
            FilterValue::Text(s) => write!(f, "'{s}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl RowFilter {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    pub fn apply(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        let value = match &self.value {
            FilterValue::Number(n) => lit(*n),
            FilterValue::Text(s) => lit(s.clone()),
        };
        let column = col(self.column.as_str());
        let predicate = match self.operator {
            FilterOperator::Eq => column.eq(value),
            FilterOperator::NotEq => column.neq(value),
            FilterOperator::Gt => column.gt(value),
            FilterOperator::GtEq => column.gt_eq(value),
            FilterOperator::Lt => column.lt(value),
            FilterOperator::LtEq => column.lt_eq(value),
        };
        df.lazy().filter(predicate).collect()
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.operator.as_str(), self.value)
    }
}

fn project(
    table_reference: &str,
    df: DataFrame,
    columns: &[String],
    filter: Option<&RowFilter>,
) -> ProviderResult<DataFrame> {
    for name in columns.iter().map(String::as_str).chain(filter.map(|f| f.column.as_str())) {
        if df.column(name).is_err() {
            return Err(ProviderError::ColumnNotFound {
                table: table_reference.to_string(),
                column: name.to_string(),
            });
        }
    }
    let df = match filter {
        Some(filter) => filter.apply(df)?,
        None => df,
    };
    let mut selected: Vec<&str> = Vec::new();
    for name in columns.iter().map(String::as_str) {
        if !selected.contains(&name) {
            selected.push(name);
        }
    }
    Ok(df.select(selected)?)
}

/// Named frames held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDataProvider {
    tables: RwLock<HashMap<String, DataFrame>>,
    profiler: ColumnProfiler,
}

impl InMemoryDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiler(profiler: ColumnProfiler) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            profiler,
        }
    }

    pub async fn insert_table(&self, name: impl Into<String>, df: DataFrame) {
        let name = name.into();
        debug!(table = %name, rows = df.height(), "Registered in-memory table");
        self.tables.write().await.insert(name, df);
    }

    pub async fn remove_table(&self, name: &str) -> Option<DataFrame> {
        self.tables.write().await.remove(name)
    }

    async fn table(&self, table_reference: &str) -> ProviderResult<DataFrame> {
        self.tables
            .read()
            .await
            .get(table_reference)
            .cloned()
            .ok_or_else(|| ProviderError::TableNotFound(table_reference.to_string()))
    }
}

#[async_trait]
impl DataProvider for InMemoryDataProvider {
    async fn get_columns(&self, table_reference: &str) -> ProviderResult<Vec<ColumnMetadata>> {
        let df = self.table(table_reference).await?;
        Ok(self.profiler.profile_dataframe(&df)?)
    }

    async fn get_rows(
        &self,
        table_reference: &str,
        columns: &[String],
        filter: Option<&RowFilter>,
    ) -> ProviderResult<DataFrame> {
        let df = self.table(table_reference).await?;
        project(table_reference, df, columns, filter)
    }
}

/// Reads `<root>/<table_reference>.csv` on a blocking thread.
#[derive(Debug, Clone)]
pub struct CsvDataProvider {
    root: PathBuf,
    profiler: ColumnProfiler,
}

impl CsvDataProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            profiler: ColumnProfiler::new(),
        }
    }

    pub fn with_profiler(mut self, profiler: ColumnProfiler) -> Self {
        self.profiler = profiler;
        self
    }

    fn path_for(&self, table_reference: &str) -> ProviderResult<PathBuf> {
        let stem = table_reference.trim_end_matches(".csv");
        if stem.is_empty() || stem.contains(['/', '\\']) || stem.contains("..") {
            return Err(ProviderError::TableNotFound(table_reference.to_string()));
        }
        let path = self.root.join(format!("{stem}.csv"));
        if !path.is_file() {
            return Err(ProviderError::TableNotFound(table_reference.to_string()));
        }
        Ok(path)
    }

    async fn read(&self, table_reference: &str) -> ProviderResult<DataFrame> {
        let path = self.path_for(table_reference)?;
        tokio::task::spawn_blocking(move || read_csv(&path))
            .await
            .map_err(|e| ProviderError::Backend(format!("CSV reader task failed: {e}")))?
    }
}

fn read_csv(path: &Path) -> ProviderResult<DataFrame> {
    let file = File::open(path)?;
    Ok(CsvReader::new(file).finish()?)
}

#[async_trait]
impl DataProvider for CsvDataProvider {
    async fn get_columns(&self, table_reference: &str) -> ProviderResult<Vec<ColumnMetadata>> {
        let df = self.read(table_reference).await?;
        Ok(self.profiler.profile_dataframe(&df)?)
    }

    async fn get_rows(
        &self,
        table_reference: &str,
        columns: &[String],
        filter: Option<&RowFilter>,
    ) -> ProviderResult<DataFrame> {
        let df = self.read(table_reference).await?;
        project(table_reference, df, columns, filter)
    }
}

const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

/// Writes a Vega-Lite document per request into `output_dir`.
#[derive(Debug, Clone)]
pub struct JsonSpecSink {
    output_dir: PathBuf,
}

impl JsonSpecSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn build_document(
        spec: &ValidatedChartSpec,
        data: &DataFrame,
        insights: &[InsightResult],
        style: &StyleConfig,
    ) -> RenderResult<Value> {
        let rows = data.head(Some(style.max_rows));
        Ok(json!({
            "$schema": VEGA_LITE_SCHEMA,
            "title": spec.title(),
            "description": spec.summary(),
            "width": style.width,
            "height": style.height,
            "data": { "values": rows_to_json(&rows)? },
            "mark": mark_for(spec.chart_type()),
            "encoding": encoding_for(spec, style),
            "usermeta": {
                "request_id": spec.request_id(),
                "theme": style.theme,
                "truncated": data.height() > style.max_rows,
                "insights": insights,
            },
        }))
    }
}

#[async_trait]
impl RenderSink for JsonSpecSink {
    async fn render(
        &self,
        spec: &ValidatedChartSpec,
        data: &DataFrame,
        insights: &[InsightResult],
        style: &StyleConfig,
    ) -> RenderResult<String> {
        let document = Self::build_document(spec, data, insights, style)?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!("{}.json", spec.request_id()));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&document)?).await?;
        info!(
            request_id = spec.request_id(),
            path = %path.display(),
            "Chart specification written"
        );
        Ok(path.display().to_string())
    }
}

fn mark_for(chart_type: ChartType) -> Value {
    match chart_type {
        ChartType::Bar | ChartType::Histogram => json!("bar"),
        ChartType::Line => json!({ "type": "line", "point": true }),
        ChartType::Scatter => json!("point"),
        ChartType::Pie => json!({ "type": "arc" }),
        ChartType::Box => json!("boxplot"),
        ChartType::Heatmap => json!("rect"),
        ChartType::Area => json!("area"),
    }
}

fn vega_type(column_type: Option<ColumnType>) -> &'static str {
    match column_type {
        Some(ColumnType::Numeric) => "quantitative",
        Some(ColumnType::Temporal) => "temporal",
        _ => "nominal",
    }
}

fn channel_for(chart_type: ChartType, role: Role) -> &'static str {
    match (chart_type, role) {
        (ChartType::Pie, Role::Category) => "color",
        (ChartType::Pie, Role::Values) => "theta",
        (ChartType::Heatmap, Role::Values) => "color",
        (ChartType::Histogram, Role::Column) => "x",
        (ChartType::Box, Role::Column) => "y",
        (ChartType::Box, Role::Groupby) => "x",
        (_, Role::XAxis) => "x",
        (_, Role::YAxis) => "y",
        (_, Role::Size) => "size",
        (_, Role::Values) => "y",
        (_, Role::Column) => "x",
        (_, Role::Color) | (_, Role::Category) | (_, Role::Groupby) => "color",
    }
}

fn encoding_for(spec: &ValidatedChartSpec, style: &StyleConfig) -> Value {
    let mut encoding = Map::new();
    for (role, field) in spec.bindings() {
        let channel = channel_for(spec.chart_type(), *role);
        let mut entry = json!({
            "field": field,
            "type": vega_type(spec.field_type(*role)),
            "title": field,
        });
        if spec.chart_type() == ChartType::Histogram && *role == Role::Column {
            entry["bin"] = json!({ "maxbins": style.histogram_bins });
        }
        encoding.insert(channel.to_string(), entry);
    }
    if spec.chart_type() == ChartType::Histogram {
        encoding.insert("y".to_string(), json!({ "aggregate": "count", "type": "quantitative" }));
    }
    Value::Object(encoding)
}

fn rows_to_json(df: &DataFrame) -> RenderResult<Vec<Value>> {
    let mut columns: Vec<(String, Vec<Value>)> = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let series = column.as_materialized_series();
        let values: Vec<Value> = match series.dtype() {
            DataType::Int32
            | DataType::Int64
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64 => series
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()).map(|x| json!(x)).unwrap_or(Value::Null))
                .collect(),
            _ => series
                .cast(&DataType::String)?
                .str()?
                .into_iter()
                .map(|v| v.map(|s| json!(s)).unwrap_or(Value::Null))
                .collect(),
        };
        columns.push((series.name().to_string(), values));
    }
    let rows = (0..df.height())
        .map(|idx| {
            let row: Map<String, Value> = columns
                .iter()
                .map(|(name, values)| (name.clone(), values[idx].clone()))
                .collect();
            Value::Object(row)
        })
        .collect();
    Ok(rows)
}
