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

use crate::catalog::{ChartType, ChartTypeCatalog};
use crate::column::ColumnMetadata;
use crate::config::{InferenceConfig, StructuralWeights};
use crate::error::{ConfigError, ConfigResult};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

const BUILTIN_RULES: &str = include_str!("../config/inference_rules.yml");
const FALLBACK_RATIONALE: &str = "no strong signal";

/// One row of the keyword table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub pattern: String,
    pub chart_type: ChartType,
    pub weight: f64,
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    rules: Vec<KeywordRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartCandidate {
    pub chart_type: ChartType,
    pub confidence: f64,
    pub rationale: String,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    regex: Regex,
    chart_type: ChartType,
    weight: f64,
}

#[derive(Debug, Default)]
struct Evidence {
    raw: f64,
    reasons: Vec<String>,
}

impl Evidence {
    fn add(&mut self, weight: f64, reason: String) {
        self.raw += weight;
        self.reasons.push(format!("{reason} (+{weight:.2})"));
    }
}

/// Scores catalog chart types against free text and table structure.
#[derive(Debug, Clone)]
pub struct ChartTypeInferencer {
    catalog: Arc<ChartTypeCatalog>,
    rules: Vec<CompiledRule>,
    structural: StructuralWeights,
    half_saturation: f64,
    low_cardinality_threshold: usize,
    fallback_confidence: f64,
    max_candidates: usize,
}

impl ChartTypeInferencer {
    pub fn new(
        catalog: Arc<ChartTypeCatalog>,
        config: &InferenceConfig,
        max_candidates: usize,
    ) -> ConfigResult<Self> {
        let rules = match &config.rules {
            Some(rules) => rules.clone(),
            None => Self::builtin_rules()?,
        };
        let rules = rules
            .into_iter()
            .map(|rule| {
                let regex = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| ConfigError::InvalidPattern {
                        pattern: rule.pattern.clone(),
                        source,
                    })?;
                Ok(CompiledRule {
                    regex,
                    chart_type: rule.chart_type,
                    weight: rule.weight,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self {
            catalog,
            rules,
            structural: config.structural.clone(),
            half_saturation: config.half_saturation,
            low_cardinality_threshold: config.low_cardinality_threshold,
            fallback_confidence: config.fallback_confidence,
            max_candidates: max_candidates.max(1),
        })
    }

    pub fn builtin_rules() -> ConfigResult<Vec<KeywordRule>> {
        let document: RuleDocument = serde_yaml::from_str(BUILTIN_RULES)?;
        Ok(document.rules)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Ranked candidates, never empty.
    pub fn infer(&self, text: &str, columns: &[ColumnMetadata]) -> Vec<ChartCandidate> {
        let mut evidence: BTreeMap<ChartType, Evidence> = BTreeMap::new();
        for rule in &self.rules {
            if self.catalog.get(rule.chart_type).is_none() {
                continue;
            }
            if let Some(found) = rule.regex.find(text) {
                evidence
                    .entry(rule.chart_type)
                    .or_default()
                    .add(rule.weight, format!("keyword '{}'", found.as_str().to_lowercase()));
            }
        }

        if evidence.is_empty() {
            debug!(text_len = text.len(), "No keyword evidence, using fallback candidate");
            return vec![self.fallback()];
        }

        self.add_structural_evidence(&mut evidence, columns);

        let mut candidates: Vec<(ChartCandidate, usize)> = evidence
            .into_iter()
            .map(|(chart_type, evidence)| {
                let confidence =
                    (evidence.raw / (evidence.raw + self.half_saturation)).clamp(0.0, 1.0);
                let unmet = self
                    .catalog
                    .get(chart_type)
                    .map(|spec| spec.unmet_required_roles(columns))
                    .unwrap_or(usize::MAX);
                debug!(
                    chart_type = %chart_type,
                    raw = evidence.raw,
                    confidence = confidence,
                    unmet_roles = unmet,
                    "Scored chart type"
                );
                let candidate = ChartCandidate {
                    chart_type,
                    confidence,
                    rationale: evidence.reasons.join("; "),
                };
                (candidate, unmet)
            })
            .collect();

        candidates.sort_by(|(a, a_unmet), (b, b_unmet)| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a_unmet.cmp(b_unmet))
                .then_with(|| a.chart_type.as_str().cmp(b.chart_type.as_str()))
        });
        candidates.truncate(self.max_candidates);
        candidates.into_iter().map(|(candidate, _)| candidate).collect()
    }

    fn add_structural_evidence(
        &self,
        evidence: &mut BTreeMap<ChartType, Evidence>,
        columns: &[ColumnMetadata],
    ) {
        let usable: Vec<&ColumnMetadata> = columns.iter().filter(|c| c.is_usable()).collect();
        let weights = &self.structural;

        if let Some(temporal) = usable.iter().find(|c| c.inferred_type.is_temporal()) {
            let reason = format!("temporal column '{}'", temporal.name);
            reinforce(evidence, ChartType::Line, weights.temporal_line, &reason);
            reinforce(evidence, ChartType::Area, weights.temporal_area, &reason);
        }

        let numeric = usable.iter().filter(|c| c.inferred_type.is_numeric()).count();
        let categorical = usable
            .iter()
            .filter(|c| c.inferred_type.is_categorical())
            .count();
        if numeric >= 2 && categorical == 0 {
            let reason = format!("{numeric} numeric columns, no categories");
            reinforce(evidence, ChartType::Scatter, weights.numeric_pair_scatter, &reason);
        }

        if let Some(low) = usable.iter().find(|c| {
            c.inferred_type.is_categorical() && c.distinct_count <= self.low_cardinality_threshold
        }) {
            let reason = format!(
                "low-cardinality column '{}' ({} values)",
                low.name, low.distinct_count
            );
            reinforce(evidence, ChartType::Bar, weights.low_cardinality_bar, &reason);
            reinforce(evidence, ChartType::Pie, weights.low_cardinality_pie, &reason);
        }
    }

    fn fallback(&self) -> ChartCandidate {
        ChartCandidate {
            chart_type: ChartType::Bar,
            confidence: self.fallback_confidence,
            rationale: FALLBACK_RATIONALE.to_string(),
        }
    }
}

/// Structural signals only strengthen charts that already have keyword evidence.
fn reinforce(
    evidence: &mut BTreeMap<ChartType, Evidence>,
    chart_type: ChartType,
    weight: f64,
    reason: &str,
) {
    if let Some(entry) = evidence.get_mut(&chart_type) {
        entry.add(weight, reason.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_compile() {
        let catalog = Arc::new(ChartTypeCatalog::builtin().unwrap());
        let inferencer =
            ChartTypeInferencer::new(catalog, &InferenceConfig::default(), 5).unwrap();
        assert!(inferencer.rule_count() > 20);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let catalog = Arc::new(ChartTypeCatalog::builtin().unwrap());
        let config = InferenceConfig {
            rules: Some(vec![KeywordRule {
                pattern: "(unclosed".to_string(),
                chart_type: ChartType::Bar,
                weight: 0.5,
            }]),
            ..InferenceConfig::default()
        };
        assert!(matches!(
            ChartTypeInferencer::new(catalog, &config, 5),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
