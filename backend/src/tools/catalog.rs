//! Kubernetes tool catalog.
//!
//! The tools validate their arguments and acknowledge the operation; talking
//! to a cluster is left to whoever replaces this catalog.

use kube_mcp_types::Tool;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_replicas() -> u32 {
    1
}

fn default_tail() -> u32 {
    100
}

#[derive(Debug, Deserialize)]
struct GetPodsArgs {
    #[serde(default = "default_namespace")]
    namespace: String,
    selector: Option<String>,
    field_selector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateDeploymentArgs {
    name: String,
    #[serde(default = "default_namespace")]
    namespace: String,
    image: String,
    #[serde(default = "default_replicas")]
    replicas: u32,
    #[serde(default)]
    ports: Vec<u16>,
}

#[derive(Debug, Deserialize)]
struct ScaleDeploymentArgs {
    name: String,
    #[serde(default = "default_namespace")]
    namespace: String,
    replicas: u32,
}

#[derive(Debug, Deserialize)]
struct GetLogsArgs {
    pod_name: String,
    #[serde(default = "default_namespace")]
    namespace: String,
    container: Option<String>,
    #[serde(default = "default_tail")]
    tail: u32,
    #[serde(default)]
    follow: bool,
}

#[derive(Debug, Deserialize)]
struct ApplyManifestArgs {
    manifest: serde_json::Map<String, Value>,
    #[serde(default = "default_namespace")]
    namespace: String,
}

#[derive(Debug, Deserialize)]
struct ExecCommandArgs {
    pod_name: String,
    #[serde(default = "default_namespace")]
    namespace: String,
    command: Vec<String>,
    container: Option<String>,
}

fn parse<T: DeserializeOwned>(tool: &'static str, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|source| ToolError::InvalidArguments { tool, source })
}

/// Run a tool by name and return its acknowledgement text.
pub fn call(name: &str, arguments: Value) -> Result<String, ToolError> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };

    let text = match name {
        "get-pods" => {
            let args: GetPodsArgs = parse("get-pods", arguments)?;
            info!(
                "MCP: Listing pods in {} (selector: {:?}, field selector: {:?})",
                args.namespace, args.selector, args.field_selector
            );
            format!("Listed pods in namespace {}", args.namespace)
        }

        "create-deployment" => {
            let args: CreateDeploymentArgs = parse("create-deployment", arguments)?;
            info!(
                "MCP: Creating deployment {}/{} from {} (ports: {:?})",
                args.namespace, args.name, args.image, args.ports
            );
            format!(
                "Created deployment {} in {} with {} replicas",
                args.name, args.namespace, args.replicas
            )
        }

        "scale-deployment" => {
            let args: ScaleDeploymentArgs = parse("scale-deployment", arguments)?;
            info!(
                "MCP: Scaling deployment {}/{} to {}",
                args.namespace, args.name, args.replicas
            );
            format!("Scaled {} to {} replicas", args.name, args.replicas)
        }

        "get-logs" => {
            let args: GetLogsArgs = parse("get-logs", arguments)?;
            info!(
                "MCP: Reading logs of {}/{} (container: {:?}, follow: {})",
                args.namespace, args.pod_name, args.container, args.follow
            );
            format!(
                "Retrieved logs from {} (last {} lines)",
                args.pod_name, args.tail
            )
        }

        "apply-manifest" => {
            let args: ApplyManifestArgs = parse("apply-manifest", arguments)?;
            let kind = args
                .manifest
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or("untyped");
            info!("MCP: Applying {} manifest to {}", kind, args.namespace);
            format!("Applied manifest to namespace {}", args.namespace)
        }

        "exec-command" => {
            let args: ExecCommandArgs = parse("exec-command", arguments)?;
            info!(
                "MCP: Executing {:?} in {}/{} (container: {:?})",
                args.command, args.namespace, args.pod_name, args.container
            );
            format!("Executed command in pod {}", args.pod_name)
        }

        _ => return Err(ToolError::UnknownTool(name.to_string())),
    };

    Ok(text)
}

/// Tools advertised through `tools/list`.
pub fn tools() -> Vec<Tool> {
    vec![
        Tool::new(
            "get-pods",
            "List pods in a namespace",
            json!({
                "type": "object",
                "properties": {
                    "namespace": { "type": "string", "description": "Kubernetes namespace" },
                    "selector": { "type": "string", "description": "Label selector" },
                    "field_selector": { "type": "string", "description": "Field selector" }
                }
            }),
        ),
        Tool::new(
            "create-deployment",
            "Create a Kubernetes deployment",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Deployment name" },
                    "namespace": { "type": "string", "description": "Target namespace" },
                    "image": { "type": "string", "description": "Container image" },
                    "replicas": { "type": "number", "description": "Number of replicas" },
                    "ports": {
                        "type": "array",
                        "items": { "type": "number" },
                        "description": "Container ports"
                    }
                },
                "required": ["name", "image"]
            }),
        ),
        Tool::new(
            "scale-deployment",
            "Scale a deployment",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Deployment name" },
                    "namespace": { "type": "string", "description": "Namespace" },
                    "replicas": { "type": "number", "description": "Target replica count" }
                },
                "required": ["name", "replicas"]
            }),
        ),
        Tool::new(
            "get-logs",
            "Get pod logs",
            json!({
                "type": "object",
                "properties": {
                    "pod_name": { "type": "string", "description": "Pod name" },
                    "namespace": { "type": "string", "description": "Namespace" },
                    "container": { "type": "string", "description": "Container name" },
                    "tail": { "type": "number", "description": "Number of lines to tail" },
                    "follow": { "type": "boolean", "description": "Follow log output" }
                },
                "required": ["pod_name"]
            }),
        ),
        Tool::new(
            "apply-manifest",
            "Apply a Kubernetes manifest",
            json!({
                "type": "object",
                "properties": {
                    "manifest": { "type": "object", "description": "Kubernetes manifest object" },
                    "namespace": { "type": "string", "description": "Target namespace" }
                },
                "required": ["manifest"]
            }),
        ),
        Tool::new(
            "exec-command",
            "Execute command in a pod",
            json!({
                "type": "object",
                "properties": {
                    "pod_name": { "type": "string", "description": "Pod name" },
                    "namespace": { "type": "string", "description": "Namespace" },
                    "command": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Command to execute"
                    },
                    "container": { "type": "string", "description": "Container name" }
                },
                "required": ["pod_name", "command"]
            }),
        ),
    ]
}
