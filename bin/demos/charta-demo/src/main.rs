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

use anyhow::{anyhow, Context, Result};
use charta::logging::init_tracing;
use charta::{
    ColumnProfiler, ConfigureRequest, CsvDataProvider, DataProvider, EngineConfig,
    InMemoryDataProvider, JsonSpecSink, VisualizationEngine, VizError,
};
use clap::Parser;
use polars::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const SAMPLE_TABLE: &str = "sample_sales";

#[derive(Parser, Debug)]
#[command(name = "charta-demo", about = "Build a chart from a plain-language request")]
struct Cli {
    /// What to visualise.
    #[arg(long, default_value = "show sales trend over time by region")]
    text: String,

    /// Directory of CSV files. Without it a built-in sample table is used.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// CSV file stem inside --data-dir.
    #[arg(long)]
    table: Option<String>,

    /// Force a chart type instead of the top suggestion.
    #[arg(long)]
    chart: Option<String>,

    /// Role binding as role=column. Repeatable.
    #[arg(long = "bind", value_parser = parse_binding)]
    bindings: Vec<(String, String)>,

    /// Comma-separated insight kinds, e.g. trend,max,outliers.
    #[arg(long, value_delimiter = ',')]
    insights: Vec<String>,

    /// Engine configuration YAML.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where chart documents are written.
    #[arg(long, default_value = "charta-output")]
    output: PathBuf,

    #[arg(long)]
    debug: bool,
}

fn parse_binding(raw: &str) -> Result<(String, String), String> {
    let (role, column) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected role=column, got '{raw}'"))?;
    Ok((role.trim().to_string(), column.trim().to_string()))
}

fn sample_frame() -> PolarsResult<DataFrame> {
    df!(
        "date" => [
            "2024-01-01", "2024-02-01", "2024-03-01", "2024-04-01", "2024-05-01", "2024-06-01",
            "2024-07-01", "2024-08-01", "2024-09-01", "2024-10-01", "2024-11-01", "2024-12-01",
        ],
        "region" => [
            "north", "south", "east", "west", "north", "south",
            "east", "west", "north", "south", "east", "west",
        ],
        "sales" => [
            120.0, 135.5, 128.0, 150.2, 162.8, 158.1,
            171.4, 180.0, 176.3, 190.7, 205.2, 230.9,
        ],
        "units" => [12i64, 14, 13, 15, 17, 16, 18, 19, 18, 20, 22, 25]
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    init_tracing(filter).map_err(|e| anyhow!("failed to initialise logging: {e}"))?;
    info!("Starting charta demo");

    let config = match &cli.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let profiler = ColumnProfiler::with_config(config.profiling.clone());
    let (provider, table): (Arc<dyn DataProvider>, String) = match &cli.data_dir {
        Some(dir) => {
            let table = cli
                .table
                .clone()
                .context("--table is required with --data-dir")?;
            (
                Arc::new(CsvDataProvider::new(dir).with_profiler(profiler)),
                table,
            )
        }
        None => {
            let provider = InMemoryDataProvider::with_profiler(profiler);
            provider.insert_table(SAMPLE_TABLE, sample_frame()?).await;
            (Arc::new(provider), SAMPLE_TABLE.to_string())
        }
    };
    let sink = Arc::new(JsonSpecSink::new(&cli.output));
    let engine = VisualizationEngine::start(config, provider, sink)?;

    let result = run(&engine, &cli, &table).await;
    engine.shutdown().await;
    result
}

async fn run(engine: &VisualizationEngine, cli: &Cli, table: &str) -> Result<()> {
    let created = engine.create_visualization(&cli.text, table).await?;
    println!("Request {}", created.request_id);
    for candidate in &created.candidate_chart_types {
        println!(
            "  {:<10} {:.2}  {}",
            candidate.chart_type.as_str(),
            candidate.confidence,
            candidate.rationale
        );
    }

    let mut changes = ConfigureRequest::new();
    changes.chart_type = cli.chart.clone();
    for (role, column) in &cli.bindings {
        changes = changes.bind(role, column);
    }
    if !cli.insights.is_empty() {
        changes = changes.insights(cli.insights.iter().cloned());
    }
    let configured = engine
        .configure_chart(&created.request_id, changes)
        .await?;
    println!("\n{}", configured.prompt);

    match engine.validate_chart_config(&created.request_id).await {
        Ok(()) => {}
        Err(VizError::Validation(report)) => {
            println!("\nThe {} chart is not ready:", report.chart_type);
            for issue in &report.issues {
                println!("  [{}] {}", issue.code, issue.message);
            }
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let outcome = engine.finalize(&created.request_id).await?;
    println!("\n{}", outcome.summary);
    for insight in outcome.insights.iter().filter(|i| !i.is_ok()) {
        println!(
            "  {} unavailable: {}",
            insight.kind,
            insight.error.as_deref().unwrap_or("unknown reason")
        );
    }
    println!("\nChart written to {}", outcome.artifact_reference);
    if cli.debug {
        println!("{}", serde_json::to_string_pretty(&outcome.insights)?);
    }
    Ok(())
}
