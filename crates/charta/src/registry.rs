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

use crate::binding::ColumnBindingResolver;
use crate::catalog::{ChartType, ChartTypeCatalog, ChartTypeSpec, Role};
use crate::column::{find_column, usable_count, ColumnMetadata, ColumnType};
use crate::config::{EngineConfig, RegistryConfig, StyleConfig};
use crate::error::{ConfigResult, VizError, VizResult};
use crate::inference::{ChartCandidate, ChartTypeInferencer};
use crate::insights::{InsightEngine, InsightKind, InsightResult};
use crate::logging::{log_error, log_insight_failure, log_request_event, log_transition};
use crate::provider::{DataProvider, RenderSink, RowFilter, ValidatedChartSpec};
use crate::validation::{
    Bindings, ChartConfigValidator, IssueCode, ValidationIssue, ValidationReport,
};
use chrono::{DateTime, TimeDelta, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type RequestId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestStatus {
    Created,
    AwaitingConfiguration,
    Validated,
    Rendered { artifact_reference: String },
    Failed { reason: String },
    Expired,
}

impl RequestStatus {
    pub fn name(&self) -> &'static str {
        match self {
            RequestStatus::Created => "created",
            RequestStatus::AwaitingConfiguration => "awaiting_configuration",
            RequestStatus::Validated => "validated",
            RequestStatus::Rendered { .. } => "rendered",
            RequestStatus::Failed { .. } => "failed",
            RequestStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Rendered { .. } | RequestStatus::Failed { .. } | RequestStatus::Expired
        )
    }

    /// Expiry is reachable from every state except itself.
    pub fn can_transition_to(&self, next: &RequestStatus) -> bool {
        use RequestStatus::*;
        match (self, next) {
            (Expired, _) => false,
            (_, Expired) => true,
            (Created, AwaitingConfiguration) | (Created, Failed { .. }) => true,
            (AwaitingConfiguration, Validated) | (AwaitingConfiguration, Failed { .. }) => true,
            (Validated, AwaitingConfiguration)
            | (Validated, Rendered { .. })
            | (Validated, Failed { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingVisualizationRequest {
    pub request_id: RequestId,
    pub natural_language_text: String,
    pub table_reference: String,
    pub columns: Vec<ColumnMetadata>,
    pub candidate_chart_types: Vec<ChartCandidate>,
    pub selected_chart_type: Option<ChartType>,
    pub role_bindings: Bindings,
    /// Roles the caller bound directly. Suggestions never replace these.
    pub explicit_roles: BTreeSet<Role>,
    pub insight_kinds: Vec<InsightKind>,
    pub filter: Option<RowFilter>,
    pub insights: Vec<InsightResult>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
}

impl PendingVisualizationRequest {
    fn new(text: &str, table_reference: &str, columns: Vec<ColumnMetadata>) -> Self {
        let now = Utc::now();
        Self {
            request_id: format!("req_{}", Uuid::new_v4().simple()),
            natural_language_text: text.to_string(),
            table_reference: table_reference.to_string(),
            columns,
            candidate_chart_types: Vec::new(),
            selected_chart_type: None,
            role_bindings: Bindings::new(),
            explicit_roles: BTreeSet::new(),
            insight_kinds: Vec::new(),
            filter: None,
            insights: Vec::new(),
            status: RequestStatus::Created,
            created_at: now,
            last_touched_at: now,
        }
    }

    /// The selected chart type, else the top inferred candidate.
    pub fn effective_chart_type(&self) -> Option<ChartType> {
        self.selected_chart_type
            .or_else(|| self.candidate_chart_types.first().map(|c| c.chart_type))
    }

    /// Questions the caller still has to answer for the effective chart type.
    pub fn configuration_prompt(&self, catalog: &ChartTypeCatalog) -> String {
        let Some(spec) = self.effective_chart_type().and_then(|t| catalog.get(t)) else {
            return "No chart type selected yet.".to_string();
        };

        let mut lines = vec![format!(
            "Configure the {} ({}).",
            spec.title_or_name(),
            spec.description
        )];
        let describe_role = |role_spec: &crate::catalog::RoleSpec| {
            let types: Vec<&str> = role_spec.allowed_types.iter().map(|t| t.as_str()).collect();
            let bound = match self.role_bindings.get(&role_spec.role) {
                Some(column) => format!(" [bound: {column}]"),
                None => String::new(),
            };
            format!(
                "  - {} ({}): {}{}",
                role_spec.role,
                types.join(" or "),
                role_spec.description,
                bound
            )
        };
        if !spec.required_roles.is_empty() {
            lines.push("Required:".to_string());
            lines.extend(spec.required_roles.iter().map(describe_role));
        }
        if !spec.optional_roles.is_empty() {
            lines.push("Optional:".to_string());
            lines.extend(spec.optional_roles.iter().map(describe_role));
        }
        let available: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.is_usable())
            .map(|c| format!("{} ({})", c.name, c.inferred_type))
            .collect();
        lines.push(format!("Available columns: {}", available.join(", ")));
        lines.join("\n")
    }

    fn touch(&mut self) {
        self.last_touched_at = Utc::now();
    }

    fn transition(&mut self, next: RequestStatus, operation: &str) -> VizResult<()> {
        if !self.status.can_transition_to(&next) {
            return Err(VizError::transition(&self.request_id, &self.status, operation));
        }
        log_transition(&self.request_id, self.status.name(), next.name());
        self.status = next;
        Ok(())
    }

    fn fail(&mut self, reason: String, operation: &str) {
        if let Err(e) = self.transition(RequestStatus::Failed { reason }, operation) {
            log_error("mark request failed", &e);
        }
    }

    /// Distinct bound column names in role order.
    fn bound_columns(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for column in self.role_bindings.values() {
            if !names.contains(column) {
                names.push(column.clone());
            }
        }
        names
    }
}

/// Changes a caller can make in one `configure` call. Roles and insight kinds are
/// names so unknown values surface as errors rather than deserialisation failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigureRequest {
    pub chart_type: Option<String>,
    pub bindings: BTreeMap<String, String>,
    pub insight_kinds: Option<Vec<String>>,
    pub filter: Option<RowFilter>,
}

impl ConfigureRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chart_type(mut self, chart_type: impl Into<String>) -> Self {
        self.chart_type = Some(chart_type.into());
        self
    }

    pub fn bind(mut self, role: impl Into<String>, column: impl Into<String>) -> Self {
        self.bindings.insert(role.into(), column.into());
        self
    }

    pub fn insights<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insight_kinds = Some(kinds.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub request_id: RequestId,
    pub candidate_chart_types: Vec<ChartCandidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigureOutcome {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub chart_type: Option<ChartType>,
    pub current_bindings: Bindings,
    pub candidate_chart_types: Vec<ChartCandidate>,
    /// Bindings removed because the chart type has no such role.
    pub dropped_roles: Vec<Role>,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeOutcome {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub insights: Vec<InsightResult>,
    pub artifact_reference: String,
    pub summary: String,
}

/// Owns every in-flight request. One registry per engine instance.
pub struct RequestRegistry {
    requests: RwLock<HashMap<RequestId, Arc<Mutex<PendingVisualizationRequest>>>>,
    catalog: Arc<ChartTypeCatalog>,
    inferencer: ChartTypeInferencer,
    resolver: ColumnBindingResolver,
    validator: ChartConfigValidator,
    insights: InsightEngine,
    config: RegistryConfig,
    style: StyleConfig,
}

impl RequestRegistry {
    pub fn new(catalog: Arc<ChartTypeCatalog>, config: &EngineConfig) -> ConfigResult<Self> {
        let inferencer = ChartTypeInferencer::new(
            Arc::clone(&catalog),
            &config.inference,
            config.registry.max_candidates,
        )?;
        Ok(Self {
            requests: RwLock::new(HashMap::new()),
            catalog,
            inferencer,
            resolver: ColumnBindingResolver::new(&config.binding),
            validator: ChartConfigValidator::new(),
            insights: InsightEngine::new(config.insights.clone())
                .with_distribution_buckets(config.distribution_buckets())
                .with_temporal_formats(config.profiling.temporal_formats.clone()),
            config: config.registry.clone(),
            style: config.style.clone(),
        })
    }

    pub fn catalog(&self) -> &ChartTypeCatalog {
        &self.catalog
    }

    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.requests.read().await.is_empty()
    }

    pub async fn create(
        &self,
        text: &str,
        table_reference: &str,
        columns: Vec<ColumnMetadata>,
    ) -> VizResult<CreateOutcome> {
        let mut request = PendingVisualizationRequest::new(text, table_reference, columns);
        request.candidate_chart_types = self.inferencer.infer(text, &request.columns);
        if let Some(spec) = request.effective_chart_type().and_then(|t| self.catalog.get(t)) {
            request.role_bindings =
                self.resolver
                    .resolve_missing(spec, &request.columns, &Bindings::new());
        }
        request.transition(RequestStatus::AwaitingConfiguration, "create")?;

        let outcome = CreateOutcome {
            request_id: request.request_id.clone(),
            candidate_chart_types: request.candidate_chart_types.clone(),
        };

        let mut requests = self.requests.write().await;
        if requests.len() >= self.config.max_active_requests {
            warn!(
                limit = self.config.max_active_requests,
                "Rejecting request, registry is full"
            );
            return Err(VizError::Capacity {
                limit: self.config.max_active_requests,
            });
        }
        log_request_event(
            &request.request_id,
            "created",
            json!({
                "table_reference": table_reference,
                "columns": request.columns.len(),
                "top_candidate": request.effective_chart_type().map(|t| t.as_str()),
            }),
        );
        requests.insert(request.request_id.clone(), Arc::new(Mutex::new(request)));
        Ok(outcome)
    }

    /// Snapshot of the request. Does not count as activity for the idle TTL.
    pub async fn get(&self, request_id: &str) -> VizResult<PendingVisualizationRequest> {
        let entry = self.entry(request_id).await?;
        let request = entry.lock().await;
        if request.status == RequestStatus::Expired {
            return Err(VizError::not_found(request_id));
        }
        Ok(request.clone())
    }

    pub async fn configure(
        &self,
        request_id: &str,
        changes: ConfigureRequest,
    ) -> VizResult<ConfigureOutcome> {
        let entry = self.entry(request_id).await?;
        let mut request = entry.lock().await;
        Self::ensure_live(&request, request_id, "configure")?;
        if request.status != RequestStatus::AwaitingConfiguration {
            return Err(VizError::transition(request_id, &request.status, "configure"));
        }

        // Parse everything before touching request state.
        let chart_type = match &changes.chart_type {
            Some(name) => Some(self.catalog.lookup(name)?.name),
            None => None,
        };
        let mut explicit = Bindings::new();
        for (role, column) in &changes.bindings {
            explicit.insert(Role::from_str(role)?, column.clone());
        }
        let insight_kinds = match &changes.insight_kinds {
            Some(names) => Some(
                names
                    .iter()
                    .map(|name| InsightKind::from_str(name))
                    .collect::<VizResult<Vec<_>>>()?,
            ),
            None => None,
        };

        let target = chart_type
            .or_else(|| request.effective_chart_type())
            .unwrap_or(ChartType::Bar);
        let spec = self.catalog.spec(target)?;
        if chart_type.is_some() {
            let available = usable_count(&request.columns);
            if available < spec.required_count() {
                return Err(VizError::InsufficientColumns {
                    chart_type: target.to_string(),
                    required: spec.required_count(),
                    available,
                });
            }
        }
        let unsupported: Vec<ValidationIssue> = explicit
            .iter()
            .filter(|(role, _)| !spec.has_role(**role))
            .map(|(role, column)| ValidationIssue {
                code: IssueCode::UnsupportedRole,
                role: Some(*role),
                column: Some(column.clone()),
                message: format!("{target} charts have no {role} role"),
            })
            .collect();
        if !unsupported.is_empty() {
            return Err(VizError::Validation(ValidationReport {
                chart_type: target,
                issues: unsupported,
            }));
        }

        request.touch();
        if let Some(chart_type) = chart_type {
            request.selected_chart_type = Some(chart_type);
        }
        let dropped = Self::drop_foreign_roles(&mut request, spec);
        for (role, column) in explicit {
            request.explicit_roles.insert(role);
            request.role_bindings.insert(role, column);
        }
        let kept: Bindings = request
            .role_bindings
            .iter()
            .filter(|(role, _)| request.explicit_roles.contains(*role))
            .map(|(role, column)| (*role, column.clone()))
            .collect();
        request.role_bindings = self.resolver.resolve_missing(spec, &request.columns, &kept);

        if let Some(kinds) = insight_kinds {
            for kind in kinds.iter().filter(|k| !spec.supports_insight(**k)) {
                warn!(
                    request_id = request_id,
                    chart_type = %target,
                    kind = %kind,
                    "Insight is not typical for this chart type, computing anyway"
                );
            }
            request.insight_kinds = kinds;
        }
        if let Some(filter) = changes.filter {
            request.filter = Some(filter);
        }

        log_request_event(
            request_id,
            "configured",
            json!({
                "chart_type": target.as_str(),
                "bindings": &request.role_bindings,
                "dropped": &dropped,
            }),
        );
        Ok(ConfigureOutcome {
            request_id: request.request_id.clone(),
            status: request.status.clone(),
            chart_type: Some(target),
            current_bindings: request.role_bindings.clone(),
            candidate_chart_types: request.candidate_chart_types.clone(),
            dropped_roles: dropped,
            prompt: request.configuration_prompt(&self.catalog),
        })
    }

    /// Moves the request to Validated, or returns every issue found.
    pub async fn validate(&self, request_id: &str) -> VizResult<()> {
        let entry = self.entry(request_id).await?;
        let mut request = entry.lock().await;
        Self::ensure_live(&request, request_id, "validate")?;
        match request.status {
            RequestStatus::AwaitingConfiguration | RequestStatus::Validated => {}
            _ => return Err(VizError::transition(request_id, &request.status, "validate")),
        }
        request.touch();

        let spec = self.effective_spec(&request)?;
        self.validator
            .validate(spec, &request.role_bindings, &request.columns)
            .map_err(|report| {
                debug!(
                    request_id = request_id,
                    issues = report.issues.len(),
                    "Validation failed"
                );
                VizError::Validation(report)
            })?;

        if request.status != RequestStatus::Validated {
            request.transition(RequestStatus::Validated, "validate")?;
        }
        Ok(())
    }

    pub async fn reconfigure(&self, request_id: &str) -> VizResult<()> {
        let entry = self.entry(request_id).await?;
        let mut request = entry.lock().await;
        Self::ensure_live(&request, request_id, "reconfigure")?;
        if request.status != RequestStatus::Validated {
            return Err(VizError::transition(request_id, &request.status, "reconfigure"));
        }
        request.touch();
        request.transition(RequestStatus::AwaitingConfiguration, "reconfigure")
    }

    /// Fetches the bound columns, computes insights and renders. The request lock
    /// is held throughout.
    pub async fn finalize(
        &self,
        request_id: &str,
        provider: &dyn DataProvider,
        sink: &dyn RenderSink,
    ) -> VizResult<FinalizeOutcome> {
        let entry = self.entry(request_id).await?;
        let mut request = entry.lock().await;
        self.begin_finalize(&mut request, request_id)?;

        let columns = request.bound_columns();
        let data = match provider
            .get_rows(&request.table_reference, &columns, request.filter.as_ref())
            .await
        {
            Ok(data) => data,
            Err(source) => {
                let error = VizError::Provider {
                    table_reference: request.table_reference.clone(),
                    source,
                };
                log_error("fetch rows", &error);
                request.fail(error.to_string(), "finalize");
                return Err(error);
            }
        };
        self.complete(&mut request, data, sink).await
    }

    /// Finalize with rows the caller already holds.
    pub async fn finalize_with_data(
        &self,
        request_id: &str,
        data: DataFrame,
        sink: &dyn RenderSink,
    ) -> VizResult<FinalizeOutcome> {
        let entry = self.entry(request_id).await?;
        let mut request = entry.lock().await;
        self.begin_finalize(&mut request, request_id)?;
        self.complete(&mut request, data, sink).await
    }

    /// Removes requests idle past the TTL. Requests locked by a call are skipped.
    pub async fn sweep_expired(&self) -> usize {
        let ttl = TimeDelta::from_std(self.config.idle_ttl).unwrap_or(TimeDelta::MAX);
        let now = Utc::now();
        let mut requests = self.requests.write().await;
        let before = requests.len();
        requests.retain(|id, entry| {
            let Ok(mut request) = entry.try_lock() else {
                debug!(request_id = %id, "Skipping busy request during sweep");
                return true;
            };
            if now - request.last_touched_at <= ttl {
                return true;
            }
            if let Err(e) = request.transition(RequestStatus::Expired, "sweep") {
                log_error("expire request", &e);
            }
            false
        });
        before - requests.len()
    }

    /// Runs `sweep_expired` every `sweep_interval` until `token` is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = registry.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Request sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = registry.sweep_expired().await;
                        if removed > 0 {
                            info!(removed = removed, "Expired idle requests");
                        }
                    }
                }
            }
        })
    }

    async fn entry(&self, request_id: &str) -> VizResult<Arc<Mutex<PendingVisualizationRequest>>> {
        self.requests
            .read()
            .await
            .get(request_id)
            .cloned()
            .ok_or_else(|| VizError::not_found(request_id))
    }

    /// The sweep can expire a request between map lookup and lock.
    fn ensure_live(
        request: &PendingVisualizationRequest,
        request_id: &str,
        operation: &str,
    ) -> VizResult<()> {
        match request.status {
            RequestStatus::Expired => Err(VizError::not_found(request_id)),
            _ if request.status.is_terminal() => {
                Err(VizError::transition(request_id, &request.status, operation))
            }
            _ => Ok(()),
        }
    }

    fn effective_spec(&self, request: &PendingVisualizationRequest) -> VizResult<&ChartTypeSpec> {
        let chart_type = request
            .effective_chart_type()
            .ok_or_else(|| VizError::Computation {
                request_id: request.request_id.clone(),
                reason: "request has no chart type".to_string(),
            })?;
        self.catalog.spec(chart_type)
    }

    fn drop_foreign_roles(request: &mut PendingVisualizationRequest, spec: &ChartTypeSpec) -> Vec<Role> {
        let dropped: Vec<Role> = request
            .role_bindings
            .keys()
            .filter(|role| !spec.has_role(**role))
            .copied()
            .collect();
        for role in &dropped {
            if let Some(column) = request.role_bindings.remove(role) {
                if request.explicit_roles.remove(role) {
                    warn!(
                        request_id = %request.request_id,
                        role = %role,
                        column = %column,
                        chart_type = %spec.name,
                        "Dropping binding the chart type does not support"
                    );
                }
            }
        }
        dropped
    }

    fn begin_finalize(
        &self,
        request: &mut PendingVisualizationRequest,
        request_id: &str,
    ) -> VizResult<()> {
        Self::ensure_live(request, request_id, "finalize")?;
        if request.status != RequestStatus::Validated {
            return Err(VizError::transition(request_id, &request.status, "finalize"));
        }
        request.touch();

        // Bindings must still satisfy the chart after validation.
        let spec = match self.effective_spec(request) {
            Ok(spec) => spec,
            Err(e) => {
                request.fail(e.to_string(), "finalize");
                return Err(e);
            }
        };
        if let Err(report) = self
            .validator
            .validate(spec, &request.role_bindings, &request.columns)
        {
            let error = VizError::Computation {
                request_id: request_id.to_string(),
                reason: format!("validated bindings no longer hold: {report}"),
            };
            log_error("finalize", &error);
            request.fail(error.to_string(), "finalize");
            return Err(error);
        }
        Ok(())
    }

    async fn complete(
        &self,
        request: &mut PendingVisualizationRequest,
        data: DataFrame,
        sink: &dyn RenderSink,
    ) -> VizResult<FinalizeOutcome> {
        let request_id = request.request_id.clone();
        let spec = self.effective_spec(request)?;
        let kinds = if request.insight_kinds.is_empty() {
            spec.supported_insights.clone()
        } else {
            request.insight_kinds.clone()
        };

        let engine = self.insights.clone();
        let bindings = request.role_bindings.clone();
        let columns = request.columns.clone();
        let frame = data.clone();
        let insights = match tokio::task::spawn_blocking(move || {
            engine.compute(&kinds, &bindings, &columns, &frame)
        })
        .await
        {
            Ok(insights) => insights,
            Err(join_error) => {
                let error = VizError::Computation {
                    request_id: request_id.clone(),
                    reason: format!("insight task failed: {join_error}"),
                };
                request.fail(error.to_string(), "finalize");
                return Err(error);
            }
        };
        for failed in insights.iter().filter(|r| !r.is_ok()) {
            log_insight_failure(
                &request_id,
                failed.kind.as_str(),
                failed.error.as_deref().unwrap_or("unknown"),
            );
        }
        let summary = self.insights.summarize(&insights);

        let field_types: BTreeMap<Role, ColumnType> = request
            .role_bindings
            .iter()
            .filter_map(|(role, column)| {
                find_column(&request.columns, column).map(|c| (*role, c.inferred_type))
            })
            .collect();
        let title = match request.natural_language_text.trim() {
            "" => spec.title_or_name().to_string(),
            text => text.to_string(),
        };
        let validated = ValidatedChartSpec::new(
            request_id.clone(),
            spec.name,
            title,
            request.role_bindings.clone(),
            field_types,
            summary.clone(),
        );
        request.insights = insights.clone();

        match sink.render(&validated, &data, &insights, &self.style).await {
            Ok(artifact_reference) => {
                request.transition(
                    RequestStatus::Rendered {
                        artifact_reference: artifact_reference.clone(),
                    },
                    "finalize",
                )?;
                log_request_event(
                    &request_id,
                    "rendered",
                    json!({
                        "artifact_reference": &artifact_reference,
                        "rows": data.height(),
                        "insights": insights.len(),
                    }),
                );
                Ok(FinalizeOutcome {
                    request_id,
                    status: request.status.clone(),
                    insights,
                    artifact_reference,
                    summary,
                })
            }
            Err(source) => {
                let error = VizError::Render {
                    request_id: request_id.clone(),
                    source,
                };
                log_error("render chart", &error);
                request.fail(error.to_string(), "finalize");
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered() -> RequestStatus {
        RequestStatus::Rendered {
            artifact_reference: "out.json".to_string(),
        }
    }

    fn failed() -> RequestStatus {
        RequestStatus::Failed {
            reason: "boom".to_string(),
        }
    }

    #[test]
    fn test_forward_transitions() {
        assert!(RequestStatus::Created.can_transition_to(&RequestStatus::AwaitingConfiguration));
        assert!(RequestStatus::AwaitingConfiguration.can_transition_to(&RequestStatus::Validated));
        assert!(RequestStatus::Validated.can_transition_to(&RequestStatus::AwaitingConfiguration));
        assert!(RequestStatus::Validated.can_transition_to(&rendered()));
        assert!(RequestStatus::Validated.can_transition_to(&failed()));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!RequestStatus::AwaitingConfiguration.can_transition_to(&rendered()));
        assert!(!RequestStatus::Created.can_transition_to(&RequestStatus::Validated));
        assert!(!rendered().can_transition_to(&RequestStatus::AwaitingConfiguration));
        assert!(!failed().can_transition_to(&RequestStatus::Validated));
        assert!(!RequestStatus::Expired.can_transition_to(&RequestStatus::Expired));
    }

    #[test]
    fn test_every_live_state_can_expire() {
        for status in [
            RequestStatus::Created,
            RequestStatus::AwaitingConfiguration,
            RequestStatus::Validated,
            rendered(),
            failed(),
        ] {
            assert!(status.can_transition_to(&RequestStatus::Expired), "{status}");
        }
        assert!(rendered().is_terminal());
        assert!(!RequestStatus::Validated.is_terminal());
    }

    #[test]
    fn test_status_serialises_with_state_tag() {
        let value = serde_json::to_value(rendered()).unwrap();
        assert_eq!(value["state"], "rendered");
        assert_eq!(value["artifact_reference"], "out.json");
    }

    #[test]
    fn test_configuration_prompt_lists_roles() {
        let catalog = ChartTypeCatalog::builtin().unwrap();
        let mut request = PendingVisualizationRequest::new(
            "sales by region",
            "sales",
            vec![
                ColumnMetadata::new("region", ColumnType::Categorical, 4),
                ColumnMetadata::new("sales", ColumnType::Numeric, 40),
            ],
        );
        request.selected_chart_type = Some(ChartType::Pie);
        request
            .role_bindings
            .insert(Role::Category, "region".to_string());
        let prompt = request.configuration_prompt(&catalog);
        assert!(prompt.contains("Required:"));
        assert!(prompt.contains("category (categorical)"));
        assert!(prompt.contains("[bound: region]"));
        assert!(prompt.contains("sales (numeric)"));
        assert!(request.request_id.starts_with("req_"));
    }
}
