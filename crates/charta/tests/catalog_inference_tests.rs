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

use charta::{
    ChartType, ChartTypeCatalog, ChartTypeInferencer, ColumnMetadata, ColumnType,
    InferenceConfig, KeywordRule, Role, VizError,
};
use proptest::prelude::*;
use std::sync::Arc;

fn inferencer() -> ChartTypeInferencer {
    let catalog = Arc::new(ChartTypeCatalog::builtin().unwrap());
    ChartTypeInferencer::new(catalog, &InferenceConfig::default(), 5).unwrap()
}

fn sales_columns() -> Vec<ColumnMetadata> {
    vec![
        ColumnMetadata::new("date", ColumnType::Temporal, 365),
        ColumnMetadata::new("region", ColumnType::Categorical, 4),
        ColumnMetadata::new("sales", ColumnType::Numeric, 300),
    ]
}

#[test]
fn test_builtin_catalog_describes_every_chart() {
    let catalog = ChartTypeCatalog::builtin().unwrap();
    assert_eq!(catalog.list().len(), ChartType::ALL.len());
    for chart_type in ChartType::ALL {
        let spec = catalog.spec(chart_type).unwrap();
        assert!(spec.required_count() >= 1, "{chart_type} has no required roles");
        let text = catalog.describe(chart_type).unwrap();
        assert!(!text.is_empty());
    }
    let pie = catalog.lookup("pie").unwrap();
    assert!(pie.is_required(Role::Category));
    assert!(pie.is_required(Role::Values));
    assert!(!pie.has_role(Role::XAxis));
}

#[test]
fn test_unknown_chart_name_is_rejected() {
    let catalog = ChartTypeCatalog::builtin().unwrap();
    match catalog.lookup("sunburst") {
        Err(VizError::InvalidChartType { name }) => assert_eq!(name, "sunburst"),
        other => panic!("expected InvalidChartType, got {other:?}"),
    }
}

#[test]
fn test_catalog_from_custom_yaml() {
    let yaml = r#"
charts:
  - name: bar
    title: Bar Chart
    description: Compare values across categories
    exclusive_roles: true
    required_roles:
      - { role: x_axis, types: [categorical] }
      - { role: y_axis, types: [numeric] }
"#;
    let catalog = ChartTypeCatalog::from_yaml_str(yaml).unwrap();
    assert_eq!(catalog.chart_types(), vec![ChartType::Bar]);
    assert!(catalog.lookup("line").is_err());
}

#[test]
fn test_trend_scenario_prefers_time_charts() {
    let candidates = inferencer().infer("show sales trend over time by region", &sales_columns());
    let top = &candidates[0];
    assert!(
        matches!(top.chart_type, ChartType::Line | ChartType::Area),
        "top candidate was {}",
        top.chart_type
    );
    assert!(top.confidence > 0.5);
    assert!(top.rationale.contains("trend"));
}

#[test]
fn test_empty_text_uses_fallback() {
    let columns = vec![
        ColumnMetadata::new("a", ColumnType::Numeric, 10),
        ColumnMetadata::new("b", ColumnType::Numeric, 10),
    ];
    let candidates = inferencer().infer("", &columns);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].chart_type, ChartType::Bar);
    assert!(candidates[0].confidence <= 0.2);
}

#[test]
fn test_structure_does_not_create_candidates_alone() {
    // A temporal column alone is not enough to nominate a line chart.
    let candidates = inferencer().infer("what is the share per region", &sales_columns());
    assert_eq!(candidates[0].chart_type, ChartType::Pie);
    assert!(candidates.iter().all(|c| c.chart_type != ChartType::Line));
}

#[test]
fn test_keywords_are_case_insensitive() {
    let candidates = inferencer().infer("DISTRIBUTION of Prices", &sales_columns());
    assert_eq!(candidates[0].chart_type, ChartType::Histogram);
}

#[test]
fn test_custom_rules_replace_builtin_table() {
    let catalog = Arc::new(ChartTypeCatalog::builtin().unwrap());
    let config = InferenceConfig {
        rules: Some(vec![KeywordRule {
            pattern: r"\bdonut\b".to_string(),
            chart_type: ChartType::Pie,
            weight: 2.0,
        }]),
        ..InferenceConfig::default()
    };
    let inferencer = ChartTypeInferencer::new(catalog, &config, 3).unwrap();
    assert_eq!(inferencer.rule_count(), 1);
    let candidates = inferencer.infer("a donut please", &[]);
    assert_eq!(candidates[0].chart_type, ChartType::Pie);
    assert!(candidates[0].confidence > 0.75);
    let fallback = inferencer.infer("show me a trend", &[]);
    assert_eq!(fallback[0].chart_type, ChartType::Bar);
}

#[test]
fn test_candidates_are_truncated() {
    let catalog = Arc::new(ChartTypeCatalog::builtin().unwrap());
    let inferencer = ChartTypeInferencer::new(catalog, &InferenceConfig::default(), 2).unwrap();
    let candidates = inferencer.infer(
        "compare the trend and distribution, with a scatter and pie breakdown",
        &sales_columns(),
    );
    assert_eq!(candidates.len(), 2);
    assert!(candidates[0].confidence >= candidates[1].confidence);
}

proptest! {
    #[test]
    fn prop_inference_never_empty_and_bounded(text in "[a-zA-Z ]{0,60}") {
        let candidates = inferencer().infer(&text, &sales_columns());
        prop_assert!(!candidates.is_empty());
        prop_assert!(candidates.len() <= 5);
        for pair in candidates.windows(2) {
            prop_assert!(pair[0].confidence >= pair[1].confidence);
        }
        for candidate in &candidates {
            prop_assert!((0.0..=1.0).contains(&candidate.confidence));
        }
    }
}
