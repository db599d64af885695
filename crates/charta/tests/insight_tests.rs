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

use charta::insights::{correlation, OutlierMethod, TrendDirection};
use charta::{
    Bindings, ColumnMetadata, ColumnProfiler, ColumnType, InsightConfig, InsightEngine, InsightKind,
    InsightStatus, InsightValue, Role,
};
use polars::prelude::*;
use proptest::prelude::*;

fn engine() -> InsightEngine {
    InsightEngine::new(InsightConfig::default())
}

fn bindings(pairs: &[(Role, &str)]) -> Bindings {
    pairs
        .iter()
        .map(|(role, column)| (*role, column.to_string()))
        .collect()
}

fn sales_frame() -> (DataFrame, Vec<ColumnMetadata>) {
    let df = df!(
        "step" => &[1i64, 2, 3, 4, 5, 6],
        "region" => &["north", "south", "north", "east", "west", "south"],
        "sales" => &[10.0, 12.5, 15.0, 17.0, 21.0, 24.0],
        "cost" => &[5.0, 6.0, 7.5, 8.0, 10.5, 11.0]
    )
    .unwrap();
    let columns = vec![
        ColumnMetadata::new("step", ColumnType::Numeric, 6),
        ColumnMetadata::new("region", ColumnType::Categorical, 4),
        ColumnMetadata::new("sales", ColumnType::Numeric, 6),
        ColumnMetadata::new("cost", ColumnType::Numeric, 6),
    ];
    (df, columns)
}

#[test]
fn test_self_correlation_is_exactly_one() {
    let (df, _) = sales_frame();
    let summary = correlation(&df, "sales", "sales").unwrap();
    assert_eq!(summary.coefficient, 1.0);
    assert!(summary.strong);
    assert_eq!(summary.strength, "very strong");
}

#[test]
fn test_increasing_sequence_trend_is_significant() {
    let df = df!("value" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let columns = vec![ColumnMetadata::new("value", ColumnType::Numeric, 6)];
    let results = engine().compute(
        &[InsightKind::Trend],
        &bindings(&[(Role::YAxis, "value")]),
        &columns,
        &df,
    );
    let Some(InsightValue::Trend(trend)) = &results[0].value else {
        panic!("expected a trend, got {:?}", results[0]);
    };
    assert_eq!(trend.direction, TrendDirection::Increasing);
    assert!(trend.significant);
    assert_eq!(trend.points, 6);
    assert!(results[0].narrative.contains("increasing"));
}

#[test]
fn test_trend_orders_by_axis() {
    let df = df!(
        "step" => &[6i64, 5, 4, 3, 2, 1],
        "value" => &[6.0, 5.0, 4.0, 3.0, 2.0, 1.0]
    )
    .unwrap();
    let columns = vec![
        ColumnMetadata::new("step", ColumnType::Numeric, 6),
        ColumnMetadata::new("value", ColumnType::Numeric, 6),
    ];
    let results = engine().compute(
        &[InsightKind::Trend],
        &bindings(&[(Role::XAxis, "step"), (Role::YAxis, "value")]),
        &columns,
        &df,
    );
    let Some(InsightValue::Trend(trend)) = &results[0].value else {
        panic!("expected a trend");
    };
    assert_eq!(trend.direction, TrendDirection::Increasing);
    assert_eq!(trend.axis.as_deref(), Some("step"));
    assert_eq!(trend.start_value, 1.0);
}

#[test]
fn test_trend_sorts_us_dates_chronologically() {
    let df = df!(
        "date" => &["11/01/2023", "12/01/2023", "01/01/2024", "02/01/2024", "03/01/2024", "04/01/2024"],
        "sales" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
    )
    .unwrap();
    let columns = ColumnProfiler::new().profile_dataframe(&df).unwrap();
    assert_eq!(columns[0].inferred_type, ColumnType::Temporal);

    let results = engine().compute(
        &[InsightKind::Trend],
        &bindings(&[(Role::XAxis, "date"), (Role::YAxis, "sales")]),
        &columns,
        &df,
    );
    let Some(InsightValue::Trend(trend)) = &results[0].value else {
        panic!("expected a trend, got {:?}", results[0]);
    };
    assert_eq!(trend.direction, TrendDirection::Increasing);
    assert!(trend.significant);
    assert_eq!(trend.start_value, 1.0);
    assert_eq!(trend.end_value, 6.0);
}

#[test]
fn test_numeric_axis_trend_regresses_on_axis_values() {
    let df = df!(
        "dose" => &[1.0, 2.0, 4.0, 8.0, 16.0, 32.0],
        "response" => &[3.0, 5.0, 9.0, 17.0, 33.0, 65.0]
    )
    .unwrap();
    let columns = vec![
        ColumnMetadata::new("dose", ColumnType::Numeric, 6),
        ColumnMetadata::new("response", ColumnType::Numeric, 6),
    ];
    let results = engine().compute(
        &[InsightKind::Trend],
        &bindings(&[(Role::XAxis, "dose"), (Role::YAxis, "response")]),
        &columns,
        &df,
    );
    let Some(InsightValue::Trend(trend)) = &results[0].value else {
        panic!("expected a trend, got {:?}", results[0]);
    };
    assert!((trend.slope - 2.0).abs() < 1e-9);
    assert!((trend.r_squared - 1.0).abs() < 1e-9);
    assert!(results[0].narrative.contains("per unit of dose"));
}

#[test]
fn test_trend_needs_enough_points() {
    let df = df!("value" => &[1.0, 2.0, 3.0]).unwrap();
    let columns = vec![ColumnMetadata::new("value", ColumnType::Numeric, 3)];
    let results = engine().compute(
        &[InsightKind::Trend],
        &bindings(&[(Role::YAxis, "value")]),
        &columns,
        &df,
    );
    assert_eq!(results[0].status, InsightStatus::Failed);
}

#[test]
fn test_correlation_with_one_numeric_column_fails_alone() {
    let (df, columns) = sales_frame();
    let bound = bindings(&[(Role::Category, "region"), (Role::Values, "sales")]);
    let results = engine().compute(
        &[InsightKind::Correlation, InsightKind::Max],
        &bound,
        &columns,
        &df,
    );
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, InsightStatus::Failed);
    assert!(!results[0].error.as_deref().unwrap_or("").is_empty());
    assert!(results[1].is_ok());
}

#[test]
fn test_zero_variance_correlation_fails() {
    let df = df!("a" => &[1.0, 2.0, 3.0], "b" => &[4.0, 4.0, 4.0]).unwrap();
    let err = correlation(&df, "a", "b").unwrap_err();
    assert!(err.contains("zero variance"));
}

#[test]
fn test_aggregates_and_counts() {
    let (df, columns) = sales_frame();
    let bound = bindings(&[(Role::XAxis, "region"), (Role::YAxis, "sales")]);
    let results = engine().compute(
        &[
            InsightKind::Max,
            InsightKind::Min,
            InsightKind::Mean,
            InsightKind::Median,
            InsightKind::DistinctCount,
            InsightKind::TotalCount,
        ],
        &bound,
        &columns,
        &df,
    );
    let per_column = |idx: usize| match &results[idx].value {
        Some(InsightValue::PerColumn(values)) => values["sales"],
        other => panic!("unexpected value {other:?}"),
    };
    assert_eq!(per_column(0), 24.0);
    assert_eq!(per_column(1), 10.0);
    assert!((per_column(2) - 16.583_333).abs() < 1e-5);
    assert_eq!(per_column(3), 16.0);
    match &results[4].value {
        Some(InsightValue::Counts(counts)) => {
            assert_eq!(counts["region"], 4);
            assert_eq!(counts["sales"], 6);
        }
        other => panic!("unexpected value {other:?}"),
    }
    match &results[5].value {
        Some(InsightValue::Counts(counts)) => assert_eq!(counts["region"], 6),
        other => panic!("unexpected value {other:?}"),
    }
}

#[test]
fn test_outlier_detection_flags_extreme_value() {
    let mut values = vec![10.0; 30];
    values.extend([11.0, 9.0, 10.5, 9.5]);
    values.push(100.0);
    let df = df!("load" => values.as_slice()).unwrap();
    let columns = vec![ColumnMetadata::new("load", ColumnType::Numeric, 6)];
    let results = engine().compute(
        &[InsightKind::Outliers],
        &bindings(&[(Role::Column, "load")]),
        &columns,
        &df,
    );
    let Some(InsightValue::Outliers(summaries)) = &results[0].value else {
        panic!("expected outliers, got {:?}", results[0]);
    };
    let summary = &summaries["load"];
    assert_eq!(summary.method, OutlierMethod::Iqr);
    assert!(summary.values.contains(&100.0));
}

#[test]
fn test_distribution_summary() {
    let (df, columns) = sales_frame();
    let results = engine().compute(
        &[InsightKind::Distribution],
        &bindings(&[(Role::Column, "sales")]),
        &columns,
        &df,
    );
    let Some(InsightValue::Distribution(summaries)) = &results[0].value else {
        panic!("expected a distribution");
    };
    let sales = &summaries["sales"];
    assert_eq!(sales.count, 6);
    assert_eq!(sales.min, 10.0);
    assert_eq!(sales.max, 24.0);
    assert_eq!(sales.buckets.len(), 30);
}

#[test]
fn test_summary_joins_successful_narratives() {
    let (df, columns) = sales_frame();
    let engine = engine();
    let results = engine.compute(
        &[InsightKind::Max, InsightKind::Correlation],
        &bindings(&[(Role::XAxis, "cost"), (Role::YAxis, "sales")]),
        &columns,
        &df,
    );
    let summary = engine.summarize(&results);
    assert!(summary.contains("Maximum"));
    assert!(summary.contains("correlation"));
}

proptest! {
    #[test]
    fn prop_one_result_per_kind_in_order(indices in prop::collection::vec(0usize..InsightKind::ALL.len(), 0..12)) {
        let kinds: Vec<InsightKind> = indices.iter().map(|&i| InsightKind::ALL[i]).collect();
        let (df, columns) = sales_frame();
        let bound = bindings(&[(Role::XAxis, "step"), (Role::YAxis, "sales"), (Role::Color, "region")]);
        let results = engine().compute(&kinds, &bound, &columns, &df);
        prop_assert_eq!(results.len(), kinds.len());
        for (result, kind) in results.iter().zip(&kinds) {
            prop_assert_eq!(result.kind, *kind);
        }
    }
}
