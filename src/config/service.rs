//! Service configuration as written by the user.
//!
//! These shapes mirror the manifest directly: most fields are optional and
//! several accept shorthand forms. `normalize_service` turns them into a
//! fully-resolved `NormalizedService`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::health::{ContainerHealthArgs, HealthCheckArgs};

/// CPU architecture of the task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Architecture {
    #[default]
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "arm64")]
    Arm64,
}

impl Architecture {
    /// Name used by the task definition's runtime platform.
    pub fn cpu_architecture(&self) -> &'static str {
        match self {
            Architecture::X86_64 => "X86_64",
            Architecture::Arm64 => "ARM64",
        }
    }
}

/// Container image: a pre-built reference or a build context
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ImageArgs {
    /// Pre-built image tag, e.g. "nginx:latest"
    Tag(String),
    Build(BuildArgs),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArgs {
    /// Build context directory (default ".")
    pub context: Option<String>,
    /// Dockerfile path relative to the context (default "Dockerfile")
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    /// Multi-stage build target
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LoggingArgs {
    /// One of the supported retention periods, e.g. "1 month"
    pub retention: Option<String>,
}

/// External file system mount
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VolumeArgs {
    pub efs: EfsArgs,
    /// Mount path inside the container
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EfsArgs {
    pub file_system: String,
    pub access_point: Option<String>,
}

/// Local-run override. Only used in dev mode; inert at deploy time.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DevArgs {
    pub command: Option<String>,
    pub directory: Option<String>,
    pub url: Option<String>,
    pub autostart: Option<bool>,
}

/// Fields that describe a single container.
///
/// They appear once per entry of `containers`, or at the top level of a
/// service as shorthand for a single container named after the service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageArgs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<BTreeMap<String, String>>,
    /// Environment variable name to SSM parameter or Secrets Manager ARN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssm: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingArgs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<VolumeArgs>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<ContainerHealthArgs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev: Option<DevArgs>,
}

impl ContainerFields {
    /// Name of the first field that is set, if any.
    pub fn first_set_field(&self) -> Option<&'static str> {
        [
            ("image", self.image.is_some()),
            ("command", self.command.is_some()),
            ("entrypoint", self.entrypoint.is_some()),
            ("environment", self.environment.is_some()),
            ("ssm", self.ssm.is_some()),
            ("logging", self.logging.is_some()),
            ("volumes", self.volumes.is_some()),
            ("health", self.health.is_some()),
            ("dev", self.dev.is_some()),
        ]
        .into_iter()
        .find(|(_, set)| *set)
        .map(|(name, _)| name)
    }
}

/// One entry of `containers`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ContainerArgs {
    pub name: Option<String>,
    /// Share of the task CPU reserved for this container, e.g. "0.25 vCPU"
    pub cpu: Option<String>,
    /// Share of the task memory reserved for this container, e.g. "0.5 GB"
    pub memory: Option<String>,
    #[serde(flatten)]
    pub fields: ContainerFields,
}

/// Load balancer port mapping
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PortArgs {
    /// Port the load balancer listens on, e.g. "80/http"
    pub listen: String,
    /// Port on the container traffic is forwarded to (defaults to `listen`)
    pub forward: Option<String>,
    /// Port to redirect to instead of forwarding
    pub redirect: Option<String>,
    /// Path pattern for path-based routing (http/https only)
    pub path: Option<String>,
    /// Target container; required when the service has several containers
    pub container: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DomainArgs {
    Name(String),
    Detailed {
        name: String,
        /// Existing certificate ARN
        cert: Option<String>,
    },
}

impl DomainArgs {
    pub fn name(&self) -> &str {
        match self {
            DomainArgs::Name(name) => name,
            DomainArgs::Detailed { name, .. } => name,
        }
    }

    pub fn cert(&self) -> Option<&str> {
        match self {
            DomainArgs::Name(_) => None,
            DomainArgs::Detailed { cert, .. } => cert.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LoadBalancerArgs {
    /// Internet-facing (default) or internal
    pub public: Option<bool>,
    pub domain: Option<DomainArgs>,
    #[serde(default, alias = "rules")]
    pub ports: Vec<PortArgs>,
    /// Health check overrides keyed by forward target, e.g. "80/http"
    #[serde(default)]
    pub health: BTreeMap<String, HealthCheckArgs>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServiceRegistryArgs {
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingArgs {
    pub min: Option<u32>,
    pub max: Option<u32>,
    /// Target average CPU utilization in percent; omitted disables CPU tracking
    pub cpu_utilization: Option<f64>,
    /// Target average memory utilization in percent; omitted disables memory tracking
    pub memory_utilization: Option<f64>,
    /// Target requests per container; requires an http/https load balancer
    pub request_count: Option<u32>,
    pub scale_in_cooldown: Option<String>,
    pub scale_out_cooldown: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CapacityWeight {
    pub weight: u32,
    pub base: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CapacityArgs {
    /// Only "spot" is accepted
    Named(String),
    Weighted {
        fargate: Option<CapacityWeight>,
        spot: Option<CapacityWeight>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

/// Extra IAM permission for the task role
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PermissionArgs {
    #[serde(default)]
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

/// What linking to a named resource grants a service
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LinkGrant {
    #[serde(default)]
    pub permissions: Vec<PermissionArgs>,
    /// Environment variables exposed to every container of the linking service
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Configuration of one service, as passed to `Cluster::add_service`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceArgs {
    pub architecture: Option<Architecture>,
    /// e.g. "0.25 vCPU" (default)
    pub cpu: Option<String>,
    /// e.g. "0.5 GB"; defaults to the smallest memory for the CPU
    pub memory: Option<String>,
    /// Ephemeral storage, "20 GB" to "200 GB"
    pub storage: Option<String>,
    pub capacity: Option<CapacityArgs>,
    pub containers: Option<Vec<ContainerArgs>>,
    #[serde(flatten)]
    pub container: ContainerFields,
    pub load_balancer: Option<LoadBalancerArgs>,
    /// Deprecated spelling of `loadBalancer`
    pub public: Option<LoadBalancerArgs>,
    pub service_registry: Option<ServiceRegistryArgs>,
    pub scaling: Option<ScalingArgs>,
    /// Existing task role name or ARN, used verbatim
    pub task_role: Option<String>,
    /// Existing execution role name or ARN, used verbatim
    pub execution_role: Option<String>,
    #[serde(default)]
    pub link: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionArgs>,
    #[serde(default)]
    pub wait: bool,
}
