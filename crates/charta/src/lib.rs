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

pub mod binding;
pub mod catalog;
pub mod column;
pub mod config;
pub mod error;
pub mod inference;
pub mod insights;
pub mod logging;
pub mod provider;
pub mod registry;
pub mod validation;

pub use binding::ColumnBindingResolver;
pub use catalog::{ChartType, ChartTypeCatalog, ChartTypeSpec, Role, RoleSpec};
pub use column::{ColumnMetadata, ColumnProfiler, ColumnType};
pub use config::{
    BindingConfig, EngineConfig, InferenceConfig, InsightConfig, ProfilingConfig,
    RegistryConfig, StyleConfig,
};
pub use error::{
    ConfigError, ErrorSeverity, ProviderError, RenderError, VizError, VizResult,
};
pub use inference::{ChartCandidate, ChartTypeInferencer, KeywordRule};
pub use insights::{InsightEngine, InsightKind, InsightResult, InsightStatus, InsightValue};
pub use provider::{
    CsvDataProvider, DataProvider, FilterOperator, FilterValue, InMemoryDataProvider,
    JsonSpecSink, RenderSink, RowFilter, ValidatedChartSpec,
};
pub use registry::{
    ConfigureOutcome, ConfigureRequest, CreateOutcome, FinalizeOutcome,
    PendingVisualizationRequest, RequestId, RequestRegistry, RequestStatus,
};
pub use validation::{
    Bindings, ChartConfigValidator, IssueCode, ValidationIssue, ValidationReport,
};

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Entry point for the surrounding application. Owns one registry and its sweeper.
pub struct VisualizationEngine {
    registry: Arc<RequestRegistry>,
    provider: Arc<dyn DataProvider>,
    sink: Arc<dyn RenderSink>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl VisualizationEngine {
    /// Builds the engine from the embedded catalog and spawns the idle sweep.
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: EngineConfig,
        provider: Arc<dyn DataProvider>,
        sink: Arc<dyn RenderSink>,
    ) -> VizResult<Self> {
        let catalog = ChartTypeCatalog::builtin()?;
        Self::with_catalog(config, catalog, provider, sink)
    }

    pub fn with_catalog(
        config: EngineConfig,
        catalog: ChartTypeCatalog,
        provider: Arc<dyn DataProvider>,
        sink: Arc<dyn RenderSink>,
    ) -> VizResult<Self> {
        config.validate()?;
        let registry = Arc::new(RequestRegistry::new(Arc::new(catalog), &config)?);
        let shutdown = CancellationToken::new();
        let sweeper = registry.spawn_sweeper(shutdown.child_token());
        info!(
            chart_types = registry.catalog().list().len(),
            idle_ttl_secs = config.registry.idle_ttl.as_secs_f64(),
            "Visualization engine started"
        );
        Ok(Self {
            registry,
            provider,
            sink,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Stops the sweeper and waits for it to exit. In-flight requests are dropped with the engine.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.sweeper.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                logging::log_error("stop sweeper", &e);
            }
        }
        info!("Visualization engine stopped");
    }

    pub fn registry(&self) -> &Arc<RequestRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &ChartTypeCatalog {
        self.registry.catalog()
    }

    pub async fn create_visualization(
        &self,
        text: &str,
        table_reference: &str,
    ) -> VizResult<CreateOutcome> {
        let columns = self
            .provider
            .get_columns(table_reference)
            .await
            .map_err(|source| VizError::Provider {
                table_reference: table_reference.to_string(),
                source,
            })?;
        self.registry.create(text, table_reference, columns).await
    }

    pub async fn configure_chart(
        &self,
        request_id: &str,
        changes: ConfigureRequest,
    ) -> VizResult<ConfigureOutcome> {
        self.registry.configure(request_id, changes).await
    }

    pub async fn validate_chart_config(&self, request_id: &str) -> VizResult<()> {
        self.registry.validate(request_id).await
    }

    pub async fn reconfigure(&self, request_id: &str) -> VizResult<()> {
        self.registry.reconfigure(request_id).await
    }

    pub async fn finalize(&self, request_id: &str) -> VizResult<FinalizeOutcome> {
        self.registry
            .finalize(request_id, self.provider.as_ref(), self.sink.as_ref())
            .await
    }

    pub async fn get_status(&self, request_id: &str) -> VizResult<PendingVisualizationRequest> {
        self.registry.get(request_id).await
    }

    pub fn describe_chart(&self, name: &str) -> VizResult<String> {
        let spec = self.catalog().lookup(name)?;
        self.catalog().describe(spec.name)
    }
}

impl Drop for VisualizationEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
