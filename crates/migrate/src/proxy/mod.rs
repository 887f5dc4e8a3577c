//! Remote Proxy Adapter
//!
//! [`ProxyEngine`] implements [`MigrationEngine`] by posting every call to a
//! remote invocation endpoint. The endpoint side is [`dispatch`], which runs a
//! request against any engine, and [`server::router`], which serves it over HTTP.
//!
//! Wire format:
//!
//! ```text
//! request  { "operation": "apply", "arguments": { "target": "up", "params": {} }, "config": { .. } }
//! response { "ok": true, "body": .. } | { "ok": false, "error": "..", "kind": "TargetNotFound" }
//! ```

pub mod server;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::config::MigrateConfig;
use crate::definitions::{ApplyParams, ApplyReport, MigrationPlan, MigrationRecord, Target};
use crate::engine::MigrationEngine;
use crate::error::{MigrateError, MigrateResult};

/// Header carrying the per-request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Operation names understood by [`dispatch`]
pub mod operations {
    pub const INIT: &str = "init";
    pub const GET_CURRENT_VERSION: &str = "getCurrentVersion";
    pub const GET_OUTSTANDING_VERSIONS: &str = "getOutstandingVersions";
    pub const GET_NAMED_MIGRATIONS: &str = "getNamedMigrations";
    pub const GET_PAST_MIGRATIONS: &str = "getPastMigrations";
    pub const PLAN: &str = "plan";
    pub const APPLY: &str = "apply";
}

/// Request sent to the invocation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub operation: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub config: Value,
}

impl ProxyRequest {
    pub fn new(operation: impl Into<String>, arguments: Value) -> Self {
        Self {
            operation: operation.into(),
            arguments,
            config: Value::Null,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// Response returned by the invocation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error kind name of the remote failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ProxyResponse {
    pub fn success(body: Value) -> Self {
        Self {
            ok: true,
            body: Some(body),
            error: None,
            kind: None,
        }
    }

    pub fn failure(error: &MigrateError) -> Self {
        Self {
            ok: false,
            body: None,
            error: Some(error.to_string()),
            kind: Some(error.kind().to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LimitArguments {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TargetArguments {
    #[serde(alias = "mode")]
    target: Target,
    #[serde(default)]
    params: ApplyParams,
}

fn arguments<T: DeserializeOwned>(operation: &str, value: Value) -> MigrateResult<T> {
    let value = if value.is_null() { json!({}) } else { value };
    serde_json::from_value(value).map_err(|e| {
        MigrateError::proxy(format!("Invalid arguments for {}: {}", operation, e))
    })
}

fn to_body<T: Serialize>(value: &T) -> MigrateResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| MigrateError::proxy(format!("Failed to encode response body: {}", e)))
}

async fn run_operation(engine: &dyn MigrationEngine, request: ProxyRequest) -> MigrateResult<Value> {
    let operation = request.operation.as_str();
    match operation {
        operations::INIT => {
            engine.init().await?;
            Ok(Value::Null)
        }
        operations::GET_CURRENT_VERSION => to_body(&engine.get_current_version().await?),
        operations::GET_OUTSTANDING_VERSIONS => {
            let args: LimitArguments = arguments(operation, request.arguments)?;
            to_body(&engine.get_outstanding_versions(args.limit).await?)
        }
        operations::GET_NAMED_MIGRATIONS => to_body(&engine.get_named_migrations().await?),
        operations::GET_PAST_MIGRATIONS => to_body(&engine.get_past_migrations().await?),
        operations::PLAN => {
            let args: TargetArguments = arguments(operation, request.arguments)?;
            to_body(&engine.plan(&args.target, &args.params).await?)
        }
        operations::APPLY => {
            let args: TargetArguments = arguments(operation, request.arguments)?;
            to_body(&engine.apply(&args.target, &args.params).await?)
        }
        other => Err(MigrateError::proxy(format!("Unknown operation '{}'", other))),
    }
}

/// Run a proxied request against an engine.
///
/// The engine keeps its own configuration; the forwarded `config` is only logged.
pub async fn dispatch(engine: &dyn MigrationEngine, request: ProxyRequest) -> ProxyResponse {
    let operation = request.operation.clone();
    tracing::debug!(operation = %operation, config = %request.config, "dispatching proxied call");

    match run_operation(engine, request).await {
        Ok(body) => ProxyResponse::success(body),
        Err(err) => {
            tracing::warn!(operation = %operation, kind = err.kind(), "proxied call failed: {}", err);
            ProxyResponse::failure(&err)
        }
    }
}

/// Engine forwarding every call to a remote invocation endpoint
pub struct ProxyEngine {
    client: Client,
    endpoint: Url,
    config: Value,
}

impl ProxyEngine {
    /// Build a client from a configuration carrying a proxy endpoint
    pub fn new(config: MigrateConfig) -> MigrateResult<Self> {
        let proxy = config
            .proxy
            .clone()
            .ok_or_else(|| MigrateError::configuration("Proxy endpoint is not configured"))?;

        let client = Client::builder()
            .timeout(proxy.timeout())
            .build()
            .map_err(|e| MigrateError::proxy(format!("Failed to build HTTP client: {}", e)))?;

        // The remote side runs locally; it never sees our proxy settings
        let mut forwarded = config;
        forwarded.proxy = None;
        let forwarded = serde_json::to_value(&forwarded)
            .map_err(|e| MigrateError::configuration(format!("Cannot encode configuration: {}", e)))?;

        Ok(Self {
            client,
            endpoint: proxy.endpoint,
            config: forwarded,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn invoke<T: DeserializeOwned>(&self, operation: &str, arguments: Value) -> MigrateResult<T> {
        let request = ProxyRequest::new(operation, arguments).with_config(self.config.clone());
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(operation, request_id = %request_id, endpoint = %self.endpoint, "invoking remote engine");

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(REQUEST_ID_HEADER, &request_id)
            .json(&request)
            .send()
            .await
            .map_err(|e| MigrateError::proxy(format!("Request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MigrateError::proxy(format!(
                "{} returned status {}: {}",
                self.endpoint,
                status,
                text.trim()
            )));
        }

        let payload: ProxyResponse = response
            .json()
            .await
            .map_err(|e| MigrateError::proxy(format!("Malformed response from {}: {}", self.endpoint, e)))?;

        if !payload.ok {
            let message = payload.error.unwrap_or_else(|| "remote call failed".to_string());
            return Err(MigrateError::proxy(match payload.kind {
                Some(kind) => format!("{} ({})", message, kind),
                None => message,
            }));
        }

        serde_json::from_value(payload.body.unwrap_or(Value::Null)).map_err(|e| {
            MigrateError::proxy(format!("Unexpected body for {}: {}", operation, e))
        })
    }
}

#[async_trait]
impl MigrationEngine for ProxyEngine {
    async fn init(&self) -> MigrateResult<()> {
        let _: Value = self.invoke(operations::INIT, json!({})).await?;
        Ok(())
    }

    async fn get_current_version(&self) -> MigrateResult<String> {
        self.invoke(operations::GET_CURRENT_VERSION, json!({})).await
    }

    async fn get_outstanding_versions(&self, limit: Option<usize>) -> MigrateResult<Vec<String>> {
        self.invoke(operations::GET_OUTSTANDING_VERSIONS, json!({ "limit": limit }))
            .await
    }

    async fn get_named_migrations(&self) -> MigrateResult<Vec<String>> {
        self.invoke(operations::GET_NAMED_MIGRATIONS, json!({})).await
    }

    async fn get_past_migrations(&self) -> MigrateResult<Vec<MigrationRecord>> {
        self.invoke(operations::GET_PAST_MIGRATIONS, json!({})).await
    }

    async fn plan(&self, target: &Target, params: &ApplyParams) -> MigrateResult<MigrationPlan> {
        self.invoke(operations::PLAN, json!({ "target": target, "params": params }))
            .await
    }

    async fn apply(&self, target: &Target, params: &ApplyParams) -> MigrateResult<ApplyReport> {
        self.invoke(operations::APPLY, json!({ "target": target, "params": params }))
            .await
    }
}
