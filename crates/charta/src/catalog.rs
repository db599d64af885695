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

use crate::column::{ColumnMetadata, ColumnType};
use crate::error::{ConfigError, ConfigResult, VizError, VizResult};
use crate::insights::InsightKind;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

const BUILTIN_CATALOG: &str = include_str!("../config/chart_catalog.yml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Scatter,
    Pie,
    Histogram,
    Box,
    Heatmap,
    Area,
}

impl ChartType {
    pub const ALL: [ChartType; 8] = [
        ChartType::Bar,
        ChartType::Line,
        ChartType::Scatter,
        ChartType::Pie,
        ChartType::Histogram,
        ChartType::Box,
        ChartType::Heatmap,
        ChartType::Area,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Scatter => "scatter",
            ChartType::Pie => "pie",
            ChartType::Histogram => "histogram",
            ChartType::Box => "box",
            ChartType::Heatmap => "heatmap",
            ChartType::Area => "area",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartType {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        ChartType::ALL
            .into_iter()
            .find(|chart| chart.as_str() == normalized)
            .ok_or_else(|| VizError::InvalidChartType {
                name: s.to_string(),
            })
    }
}

/// A named slot in a chart configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    XAxis,
    YAxis,
    Color,
    Size,
    Category,
    Values,
    Column,
    Groupby,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::XAxis,
        Role::YAxis,
        Role::Color,
        Role::Size,
        Role::Category,
        Role::Values,
        Role::Column,
        Role::Groupby,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::XAxis => "x_axis",
            Role::YAxis => "y_axis",
            Role::Color => "color",
            Role::Size => "size",
            Role::Category => "category",
            Role::Values => "values",
            Role::Column => "column",
            Role::Groupby => "groupby",
        }
    }

    /// Roles that split data into groups rather than carry measured values.
    pub fn is_grouping(&self) -> bool {
        matches!(self, Role::Color | Role::Category | Role::Groupby)
    }

    pub fn is_value(&self) -> bool {
        matches!(
            self,
            Role::YAxis | Role::Values | Role::Column | Role::Size
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let normalized = match normalized.as_str() {
            "x" => "x_axis",
            "y" => "y_axis",
            "group_by" => "groupby",
            other => other,
        };
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| VizError::UnknownRole {
                name: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSpec {
    pub role: Role,
    #[serde(rename = "types")]
    pub allowed_types: Vec<ColumnType>,
    #[serde(default)]
    pub description: String,
}

impl RoleSpec {
    pub fn accepts(&self, column_type: ColumnType) -> bool {
        self.allowed_types.contains(&column_type)
    }

    /// Position of `column_type` in the preference list, lower is better.
    pub fn preference(&self, column_type: ColumnType) -> Option<usize> {
        self.allowed_types.iter().position(|t| *t == column_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartTypeSpec {
    pub name: ChartType,
    #[serde(default)]
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub use_cases: Vec<String>,
    /// Whether one column may be bound to two roles at once.
    #[serde(default)]
    pub exclusive_roles: bool,
    pub required_roles: Vec<RoleSpec>,
    #[serde(default)]
    pub optional_roles: Vec<RoleSpec>,
    #[serde(default)]
    pub supported_insights: Vec<InsightKind>,
}

impl ChartTypeSpec {
    pub fn roles(&self) -> impl Iterator<Item = &RoleSpec> {
        self.required_roles.iter().chain(self.optional_roles.iter())
    }

    pub fn role_spec(&self, role: Role) -> Option<&RoleSpec> {
        self.roles().find(|spec| spec.role == role)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role_spec(role).is_some()
    }

    pub fn is_required(&self, role: Role) -> bool {
        self.required_roles.iter().any(|spec| spec.role == role)
    }

    pub fn allows(&self, role: Role, column_type: ColumnType) -> bool {
        self.role_spec(role)
            .map(|spec| spec.accepts(column_type))
            .unwrap_or(false)
    }

    pub fn required_count(&self) -> usize {
        self.required_roles.len()
    }

    pub fn supports_insight(&self, kind: InsightKind) -> bool {
        self.supported_insights.contains(&kind)
    }

    pub fn title_or_name(&self) -> &str {
        if self.title.is_empty() {
            self.name.as_str()
        } else {
            &self.title
        }
    }

    /// Required roles that no usable column in `columns` can fill.
    pub fn unmet_required_roles(&self, columns: &[ColumnMetadata]) -> usize {
        self.required_roles
            .iter()
            .filter(|spec| {
                !columns
                    .iter()
                    .any(|c| c.is_usable() && spec.accepts(c.inferred_type))
            })
            .count()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    charts: Vec<ChartTypeSpec>,
}

/// Read-only table of chart types. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct ChartTypeCatalog {
    specs: Vec<ChartTypeSpec>,
    by_type: HashMap<ChartType, usize>,
}

impl ChartTypeCatalog {
    pub fn builtin() -> ConfigResult<Self> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

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
        let document: CatalogDocument = serde_yaml::from_str(yaml)?;
        Self::from_specs(document.charts)
    }

    pub fn from_specs(specs: Vec<ChartTypeSpec>) -> ConfigResult<Self> {
        let mut by_type = HashMap::new();
        for (idx, spec) in specs.iter().enumerate() {
            if by_type.insert(spec.name, idx).is_some() {
                return Err(ConfigError::DuplicateChartType {
                    name: spec.name.to_string(),
                });
            }
            Self::check_roles(spec)?;
        }
        Ok(Self { specs, by_type })
    }

    fn check_roles(spec: &ChartTypeSpec) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for role in spec.roles() {
            if !seen.insert(role.role) {
                return Err(ConfigError::OutOfRange {
                    field: format!("charts.{}.roles", spec.name),
                    value: format!("role '{}' declared twice", role.role),
                });
            }
            if role.allowed_types.is_empty() {
                return Err(ConfigError::OutOfRange {
                    field: format!("charts.{}.{}.types", spec.name, role.role),
                    value: "empty".to_string(),
                });
            }
        }
        if spec.required_roles.is_empty() {
            return Err(ConfigError::OutOfRange {
                field: format!("charts.{}.required_roles", spec.name),
                value: "empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn get(&self, chart_type: ChartType) -> Option<&ChartTypeSpec> {
        self.by_type.get(&chart_type).map(|&idx| &self.specs[idx])
    }

    pub fn lookup(&self, name: &str) -> VizResult<&ChartTypeSpec> {
        let chart_type: ChartType = name.parse()?;
        self.get(chart_type)
            .ok_or_else(|| VizError::InvalidChartType {
                name: name.to_string(),
            })
    }

    pub fn spec(&self, chart_type: ChartType) -> VizResult<&ChartTypeSpec> {
        self.get(chart_type)
            .ok_or_else(|| VizError::InvalidChartType {
                name: chart_type.to_string(),
            })
    }

    pub fn list(&self) -> &[ChartTypeSpec] {
        &self.specs
    }

    pub fn chart_types(&self) -> Vec<ChartType> {
        self.specs.iter().map(|spec| spec.name).collect()
    }

    pub fn describe(&self, chart_type: ChartType) -> VizResult<String> {
        let spec = self.spec(chart_type)?;
        let mut text = format!("{}: {}", spec.title_or_name(), spec.description);
        if !spec.use_cases.is_empty() {
            text.push_str(". Good for: ");
            let examples: Vec<&str> = spec.use_cases.iter().take(2).map(String::as_str).collect();
            text.push_str(&examples.join(", "));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_covers_every_chart_type() {
        let catalog = ChartTypeCatalog::builtin().unwrap();
        for chart in ChartType::ALL {
            assert!(catalog.get(chart).is_some(), "missing {chart}");
        }
        assert_eq!(catalog.list().len(), 8);
    }

    #[test]
    fn test_role_parsing_aliases() {
        assert_eq!("x".parse::<Role>().unwrap(), Role::XAxis);
        assert_eq!("Group By".parse::<Role>().unwrap(), Role::Groupby);
        assert!(matches!(
            "depth".parse::<Role>(),
            Err(VizError::UnknownRole { .. })
        ));
    }

    #[test]
    fn test_duplicate_chart_rejected() {
        let yaml = r#"
charts:
  - name: bar
    description: one
    required_roles:
      - role: x_axis
        types: [categorical]
  - name: bar
    description: two
    required_roles:
      - role: x_axis
        types: [categorical]
"#;
        assert!(matches!(
            ChartTypeCatalog::from_yaml_str(yaml),
            Err(ConfigError::DuplicateChartType { .. })
        ));
    }
}
