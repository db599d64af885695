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

use serde_json::Value;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub fn log_request_event(request_id: &str, event: &str, payload: Value) {
    debug!(
        request_id = request_id,
        event = event,
        payload = %serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string()),
        "Request event"
    );
}

pub fn log_transition(request_id: &str, from: &str, to: &str) {
    info!(
        request_id = request_id,
        from = from,
        to = to,
        "Request status changed"
    );
}

pub fn log_insight_failure(request_id: &str, kind: &str, reason: &str) {
    warn!(
        request_id = request_id,
        kind = kind,
        reason = reason,
        "Insight could not be computed"
    );
}

pub fn log_error(context: &str, error: &dyn std::error::Error) {
    error!(
        context = context,
        error = %error,
        "Engine error"
    );
}

/// Installs a global fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(
    default_filter: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
}
