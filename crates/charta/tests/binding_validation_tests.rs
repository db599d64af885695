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
    BindingConfig, Bindings, ChartConfigValidator, ChartType, ChartTypeCatalog,
    ColumnBindingResolver, ColumnMetadata, ColumnType, IssueCode, Role,
};
use proptest::prelude::*;

fn catalog() -> ChartTypeCatalog {
    ChartTypeCatalog::builtin().unwrap()
}

fn sales_columns() -> Vec<ColumnMetadata> {
    vec![
        ColumnMetadata::new("date", ColumnType::Temporal, 365),
        ColumnMetadata::new("region", ColumnType::Categorical, 4),
        ColumnMetadata::new("sales", ColumnType::Numeric, 300),
    ]
}

fn bindings(pairs: &[(Role, &str)]) -> Bindings {
    pairs
        .iter()
        .map(|(role, column)| (*role, column.to_string()))
        .collect()
}

/// One column per role, typed with the role's first allowed type.
fn compatible_setup(chart_type: ChartType) -> (Bindings, Vec<ColumnMetadata>) {
    let catalog = catalog();
    let spec = catalog.spec(chart_type).unwrap();
    let mut columns = Vec::new();
    let mut bound = Bindings::new();
    for role_spec in &spec.required_roles {
        let name = format!("{}_col", role_spec.role);
        columns.push(ColumnMetadata::new(&name, role_spec.allowed_types[0], 8));
        bound.insert(role_spec.role, name);
    }
    (bound, columns)
}

#[test]
fn test_trend_scenario_bindings() {
    let catalog = catalog();
    let spec = catalog.spec(ChartType::Line).unwrap();
    let resolver = ColumnBindingResolver::default();
    let resolved = resolver.resolve_missing(spec, &sales_columns(), &Bindings::new());
    assert_eq!(resolved.get(&Role::XAxis).map(String::as_str), Some("date"));
    assert_eq!(resolved.get(&Role::YAxis).map(String::as_str), Some("sales"));
    assert_eq!(resolved.get(&Role::Color).map(String::as_str), Some("region"));
}

#[test]
fn test_suggest_covers_required_roles_only() {
    let catalog = catalog();
    let spec = catalog.spec(ChartType::Line).unwrap();
    let suggested = ColumnBindingResolver::default().suggest(spec, &sales_columns());
    assert_eq!(suggested.len(), 2);
    assert!(!suggested.contains_key(&Role::Color));
}

#[test]
fn test_caller_bindings_are_never_overwritten() {
    let catalog = catalog();
    let spec = catalog.spec(ChartType::Bar).unwrap();
    let columns = vec![
        ColumnMetadata::new("region", ColumnType::Categorical, 4),
        ColumnMetadata::new("product", ColumnType::Categorical, 6),
        ColumnMetadata::new("sales", ColumnType::Numeric, 300),
    ];
    let partial = bindings(&[(Role::XAxis, "product")]);
    let resolved = ColumnBindingResolver::default().resolve_missing(spec, &columns, &partial);
    assert_eq!(resolved[&Role::XAxis], "product");
    assert_eq!(resolved[&Role::YAxis], "sales");
    assert_eq!(resolved[&Role::Color], "region");
}

#[test]
fn test_suggestions_do_not_reuse_columns() {
    let catalog = catalog();
    let spec = catalog.spec(ChartType::Scatter).unwrap();
    let columns = vec![ColumnMetadata::new("price", ColumnType::Numeric, 50)];
    let resolved = ColumnBindingResolver::default().resolve_missing(spec, &columns, &Bindings::new());
    assert_eq!(resolved.len(), 1);
}

#[test]
fn test_higher_variance_wins_value_roles() {
    let catalog = catalog();
    let spec = catalog.spec(ChartType::Histogram).unwrap();
    let columns = vec![
        ColumnMetadata::new("flat", ColumnType::Numeric, 3).with_sample_values(["1", "1.1", "0.9"]),
        ColumnMetadata::new("wide", ColumnType::Numeric, 3).with_sample_values(["1", "50", "100"]),
    ];
    let suggested = ColumnBindingResolver::default().suggest(spec, &columns);
    assert_eq!(suggested[&Role::Column], "wide");
}

#[test]
fn test_optional_roles_can_be_disabled() {
    let catalog = catalog();
    let spec = catalog.spec(ChartType::Line).unwrap();
    let resolver = ColumnBindingResolver::new(&BindingConfig {
        fill_optional_roles: false,
        ..BindingConfig::default()
    });
    let resolved = resolver.resolve_missing(spec, &sales_columns(), &Bindings::new());
    assert!(!resolved.contains_key(&Role::Color));
}

#[test]
fn test_every_chart_accepts_compatible_bindings() {
    let catalog = catalog();
    let validator = ChartConfigValidator::new();
    for chart_type in ChartType::ALL {
        let (bound, columns) = compatible_setup(chart_type);
        let spec = catalog.spec(chart_type).unwrap();
        assert!(
            validator.validate(spec, &bound, &columns).is_ok(),
            "{chart_type} rejected compatible bindings"
        );
    }
}

#[test]
fn test_pie_with_numeric_columns_only() {
    let catalog = catalog();
    let spec = catalog.spec(ChartType::Pie).unwrap();
    let columns = vec![
        ColumnMetadata::new("a", ColumnType::Numeric, 10),
        ColumnMetadata::new("b", ColumnType::Numeric, 10),
    ];
    let validator = ChartConfigValidator::new();

    let report = validator
        .validate(spec, &bindings(&[(Role::Category, "a"), (Role::Values, "b")]), &columns)
        .unwrap_err();
    assert!(report
        .issues_for(Role::Category)
        .any(|issue| issue.code == IssueCode::RoleTypeMismatch));

    let report = validator
        .validate(spec, &bindings(&[(Role::Values, "b")]), &columns)
        .unwrap_err();
    assert!(report
        .issues_for(Role::Category)
        .any(|issue| issue.code == IssueCode::MissingRequiredRole));
}

#[test]
fn test_validation_reports_every_issue() {
    let catalog = catalog();
    let spec = catalog.spec(ChartType::Bar).unwrap();
    let columns = sales_columns();
    let bad = bindings(&[
        (Role::XAxis, "sales"),
        (Role::Size, "sales"),
        (Role::Color, "missing"),
    ]);
    let report = ChartConfigValidator::new()
        .validate(spec, &bad, &columns)
        .unwrap_err();
    assert_eq!(report.chart_type, ChartType::Bar);
    assert!(report.has_code(IssueCode::MissingRequiredRole));
    assert!(report.has_code(IssueCode::RoleTypeMismatch));
    assert!(report.has_code(IssueCode::UnsupportedRole));
    assert!(report.has_code(IssueCode::UnknownColumn));
}

#[test]
fn test_exclusive_charts_reject_shared_columns() {
    let catalog = catalog();
    let columns = vec![ColumnMetadata::new("v", ColumnType::Numeric, 20)];
    let shared = bindings(&[(Role::XAxis, "v"), (Role::YAxis, "v")]);
    let validator = ChartConfigValidator::new();

    let line = catalog.spec(ChartType::Line).unwrap();
    let report = validator.validate(line, &shared, &columns).unwrap_err();
    assert!(report.has_code(IssueCode::DuplicateColumnAcrossExclusiveRoles));

    let scatter = catalog.spec(ChartType::Scatter).unwrap();
    assert!(validator.validate(scatter, &shared, &columns).is_ok());
}

#[test]
fn test_empty_column_set() {
    let catalog = catalog();
    let spec = catalog.spec(ChartType::Histogram).unwrap();
    let columns = vec![ColumnMetadata::new("empty", ColumnType::Numeric, 0)];
    let report = ChartConfigValidator::new()
        .validate(spec, &bindings(&[(Role::Column, "empty")]), &columns)
        .unwrap_err();
    assert!(report.has_code(IssueCode::EmptyColumnSet));
}

proptest! {
    #[test]
    fn prop_resolved_bindings_validate(
        chart_index in 0usize..ChartType::ALL.len(),
        distinct in 1usize..40,
    ) {
        let chart_type = ChartType::ALL[chart_index];
        let catalog = catalog();
        let spec = catalog.spec(chart_type).unwrap();
        let columns = vec![
            ColumnMetadata::new("when", ColumnType::Temporal, distinct),
            ColumnMetadata::new("group", ColumnType::Categorical, distinct),
            ColumnMetadata::new("kind", ColumnType::Categorical, distinct),
            ColumnMetadata::new("amount", ColumnType::Numeric, distinct),
            ColumnMetadata::new("weight", ColumnType::Numeric, distinct),
            ColumnMetadata::new("extra", ColumnType::Numeric, distinct),
        ];
        let resolved = ColumnBindingResolver::default()
            .resolve_missing(spec, &columns, &Bindings::new());
        let outcome = ChartConfigValidator::new().validate(spec, &resolved, &columns);
        prop_assert!(outcome.is_ok(), "{} failed: {:?}", chart_type, outcome);
    }
}
