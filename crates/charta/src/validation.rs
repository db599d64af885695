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

use crate::catalog::{ChartType, ChartTypeSpec, Role};
use crate::column::{find_column, usable_count, ColumnMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub type Bindings = BTreeMap<Role, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueCode {
    MissingRequiredRole,
    RoleTypeMismatch,
    UnknownColumn,
    DuplicateColumnAcrossExclusiveRoles,
    EmptyColumnSet,
    UnsupportedRole,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub role: Option<Role>,
    pub column: Option<String>,
    pub message: String,
}

/// Every violated constraint for one chart configuration.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{chart_type} chart has {} configuration issue(s)", .issues.len())]
pub struct ValidationReport {
    pub chart_type: ChartType,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn has_code(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }

    pub fn issues_for(&self, role: Role) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |issue| issue.role == Some(role))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChartConfigValidator;

impl ChartConfigValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(
        &self,
        spec: &ChartTypeSpec,
        bindings: &Bindings,
        columns: &[ColumnMetadata],
    ) -> Result<(), ValidationReport> {
        let mut issues = Vec::new();

        if usable_count(columns) == 0 {
            issues.push(ValidationIssue {
                code: IssueCode::EmptyColumnSet,
                role: None,
                column: None,
                message: "The table has no usable columns".to_string(),
            });
        }

        for required in &spec.required_roles {
            if !bindings.contains_key(&required.role) {
                issues.push(ValidationIssue {
                    code: IssueCode::MissingRequiredRole,
                    role: Some(required.role),
                    column: None,
                    message: format!(
                        "Role '{}' is required for a {} chart ({})",
                        required.role, spec.name, required.description
                    ),
                });
            }
        }

        for (&role, column_name) in bindings {
            let role_spec = spec.role_spec(role);
            if role_spec.is_none() {
                issues.push(ValidationIssue {
                    code: IssueCode::UnsupportedRole,
                    role: Some(role),
                    column: Some(column_name.clone()),
                    message: format!("A {} chart has no '{}' role", spec.name, role),
                });
            }
            let Some(column) = find_column(columns, column_name) else {
                issues.push(ValidationIssue {
                    code: IssueCode::UnknownColumn,
                    role: Some(role),
                    column: Some(column_name.clone()),
                    message: format!("Column '{column_name}' bound to '{role}' does not exist"),
                });
                continue;
            };
            if let Some(role_spec) = role_spec {
                if !role_spec.accepts(column.inferred_type) {
                    let allowed: Vec<&str> =
                        role_spec.allowed_types.iter().map(|t| t.as_str()).collect();
                    issues.push(ValidationIssue {
                        code: IssueCode::RoleTypeMismatch,
                        role: Some(role),
                        column: Some(column_name.clone()),
                        message: format!(
                            "Column '{}' is {} but role '{}' accepts {}",
                            column_name,
                            column.inferred_type,
                            role,
                            allowed.join(" or ")
                        ),
                    });
                }
            }
        }

        if spec.exclusive_roles {
            let mut roles_by_column: BTreeMap<&str, Vec<Role>> = BTreeMap::new();
            for (&role, column_name) in bindings {
                roles_by_column.entry(column_name).or_default().push(role);
            }
            for (column_name, roles) in roles_by_column.into_iter().filter(|(_, r)| r.len() > 1) {
                let names: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
                issues.push(ValidationIssue {
                    code: IssueCode::DuplicateColumnAcrossExclusiveRoles,
                    role: roles.get(1).copied(),
                    column: Some(column_name.to_string()),
                    message: format!(
                        "Column '{}' is bound to {} but a {} chart needs a distinct column per role",
                        column_name,
                        names.join(" and "),
                        spec.name
                    ),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationReport {
                chart_type: spec.name,
                issues,
            })
        }
    }
}
