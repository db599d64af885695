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

use crate::catalog::{ChartTypeSpec, Role, RoleSpec};
use crate::column::{ColumnMetadata, ColumnType};
use crate::config::BindingConfig;
use crate::validation::Bindings;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Ranking key for one column against one role. Field order is comparison order.
#[derive(Debug, Clone, Copy)]
struct ColumnFit {
    vocabulary: u8,
    preference: usize,
    tie_break: f64,
    position: usize,
}

impl ColumnFit {
    fn better_than(&self, other: &ColumnFit) -> Ordering {
        self.vocabulary
            .cmp(&other.vocabulary)
            .then_with(|| other.preference.cmp(&self.preference))
            .then_with(|| self.tie_break.total_cmp(&other.tie_break))
            .then_with(|| other.position.cmp(&self.position))
    }
}

#[derive(Debug, Clone)]
pub struct ColumnBindingResolver {
    vocabulary: BTreeMap<Role, Vec<String>>,
    fill_optional_roles: bool,
    max_color_categories: usize,
}

impl Default for ColumnBindingResolver {
    fn default() -> Self {
        Self::new(&BindingConfig::default())
    }
}

impl ColumnBindingResolver {
    pub fn new(config: &BindingConfig) -> Self {
        let vocabulary = config
            .vocabulary
            .iter()
            .map(|(role, words)| (*role, words.iter().map(|w| w.to_lowercase()).collect()))
            .collect();
        Self {
            vocabulary,
            fill_optional_roles: config.fill_optional_roles,
            max_color_categories: config.max_color_categories,
        }
    }

    /// Bindings for the required roles only.
    pub fn suggest(&self, spec: &ChartTypeSpec, columns: &[ColumnMetadata]) -> Bindings {
        let mut bindings = Bindings::new();
        let mut used = HashSet::new();
        for role_spec in &spec.required_roles {
            if let Some(column) = self.best_column(role_spec, columns, &used) {
                used.insert(column.name.as_str());
                bindings.insert(role_spec.role, column.name.clone());
            }
        }
        bindings
    }

    /// Fills unbound roles around `partial`. Caller bindings are kept as given.
    pub fn resolve_missing(
        &self,
        spec: &ChartTypeSpec,
        columns: &[ColumnMetadata],
        partial: &Bindings,
    ) -> Bindings {
        let mut bindings = partial.clone();
        let mut used: HashSet<&str> = partial.values().map(String::as_str).collect();

        for role_spec in &spec.required_roles {
            if bindings.contains_key(&role_spec.role) {
                continue;
            }
            if let Some(column) = self.best_column(role_spec, columns, &used) {
                debug!(role = %role_spec.role, column = %column.name, "Suggested required binding");
                used.insert(column.name.as_str());
                bindings.insert(role_spec.role, column.name.clone());
            }
        }

        if self.fill_optional_roles {
            for role_spec in &spec.optional_roles {
                if bindings.contains_key(&role_spec.role) {
                    continue;
                }
                let Some(column) = self.best_column(role_spec, columns, &used) else {
                    continue;
                };
                if self.is_strong_fit(role_spec.role, column) {
                    debug!(role = %role_spec.role, column = %column.name, "Suggested optional binding");
                    used.insert(column.name.as_str());
                    bindings.insert(role_spec.role, column.name.clone());
                }
            }
        }
        bindings
    }

    fn best_column<'a>(
        &self,
        role_spec: &RoleSpec,
        columns: &'a [ColumnMetadata],
        used: &HashSet<&str>,
    ) -> Option<&'a ColumnMetadata> {
        columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_usable() && !used.contains(c.name.as_str()))
            .filter_map(|(position, column)| {
                let preference = role_spec.preference(column.inferred_type)?;
                let fit = ColumnFit {
                    vocabulary: self.vocabulary_score(role_spec.role, &column.name),
                    preference,
                    tie_break: tie_break(role_spec.role, column),
                    position,
                };
                Some((fit, column))
            })
            .max_by(|(a, _), (b, _)| a.better_than(b))
            .map(|(_, column)| column)
    }

    /// 2 for an exact name token, 1 for a substring, 0 otherwise.
    fn vocabulary_score(&self, role: Role, column_name: &str) -> u8 {
        let Some(words) = self.vocabulary.get(&role) else {
            return 0;
        };
        let name = column_name.to_lowercase();
        let tokens: Vec<&str> = name
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        words
            .iter()
            .map(|word| {
                if tokens.iter().any(|t| t == word) {
                    2
                } else if name.contains(word.as_str()) {
                    1
                } else {
                    0
                }
            })
            .max()
            .unwrap_or(0)
    }

    fn is_strong_fit(&self, role: Role, column: &ColumnMetadata) -> bool {
        let low_cardinality = column.inferred_type == ColumnType::Categorical
            && column.distinct_count <= self.max_color_categories;
        low_cardinality || self.vocabulary_score(role, &column.name) > 0
    }
}

/// Higher is better: spread for value roles, fewer groups for grouping columns.
fn tie_break(role: Role, column: &ColumnMetadata) -> f64 {
    if role.is_value() || (column.inferred_type.is_numeric() && !role.is_grouping()) {
        column.sample_variance().unwrap_or(f64::NEG_INFINITY)
    } else if column.inferred_type.is_categorical() {
        -(column.distinct_count as f64)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_score_tokens() {
        let resolver = ColumnBindingResolver::default();
        assert_eq!(resolver.vocabulary_score(Role::XAxis, "order_date"), 2);
        assert_eq!(resolver.vocabulary_score(Role::XAxis, "datetime"), 1);
        assert_eq!(resolver.vocabulary_score(Role::XAxis, "region"), 0);
    }
}
