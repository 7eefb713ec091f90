//! Service validation and normalization
//!
//! `normalize_service` is the single entry point: it takes the raw
//! `ServiceArgs` a user wrote and returns a `NormalizedService` with every
//! default applied and every shorthand expanded, or the first
//! `ConfigurationError` found. The input is never modified.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::error::ConfigurationError;
use super::health::{ContainerHealthCheck, HealthCheck};
use super::ports::{uniform_family, PortProtocol, ProtocolFamily};
use super::service::{
    Architecture, CapacityArgs, ContainerArgs, ContainerFields, DevArgs, DomainArgs, ImageArgs,
    LoadBalancerArgs, PermissionArgs, PortArgs, ScalingArgs, ServiceArgs, VolumeArgs,
};
use super::sizes::{resolve_size, resolve_storage, Cpu, Memory, Storage};
use super::units::{human_duration, parse_duration_or, retention_days, DEFAULT_RETENTION};

/// Where a container image comes from, after defaults
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImageSource {
    Tag {
        image: String,
    },
    Build {
        context: String,
        dockerfile: String,
        args: BTreeMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedContainer {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Cpu>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<Memory>,
    pub image: ImageSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    pub environment: BTreeMap<String, String>,
    pub ssm: BTreeMap<String, String>,
    pub log_retention: String,
    pub log_retention_days: u32,
    pub volumes: Vec<VolumeArgs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<ContainerHealthCheck>,
    #[serde(skip)]
    pub dev: Option<DevArgs>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PortAction {
    Forward { to: PortProtocol, container: String },
    Redirect { to: PortProtocol },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPort {
    pub listen: PortProtocol,
    pub action: PortAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl NormalizedPort {
    /// Forward target and container, if this port forwards.
    pub fn forward(&self) -> Option<(&PortProtocol, &str)> {
        match &self.action {
            PortAction::Forward { to, container } => Some((to, container.as_str())),
            PortAction::Redirect { .. } => None,
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.action, PortAction::Redirect { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedLoadBalancer {
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainArgs>,
    pub family: ProtocolFamily,
    pub ports: Vec<NormalizedPort>,
    /// Health checks keyed by forward target, e.g. "80/http"
    pub health: BTreeMap<String, HealthCheck>,
}

impl NormalizedLoadBalancer {
    pub fn load_balancer_type(&self) -> &'static str {
        match self.family {
            ProtocolFamily::Application => "application",
            ProtocolFamily::Network => "network",
        }
    }

    /// Unique (container, forward target) pairs in port order.
    pub fn forward_targets(&self) -> Vec<(String, PortProtocol)> {
        let mut seen = HashSet::new();
        self.ports
            .iter()
            .filter_map(|p| p.forward())
            .filter(|(to, container)| seen.insert((container.to_string(), **to)))
            .map(|(to, container)| (container.to_string(), *to))
            .collect()
    }

    pub fn needs_certificate(&self) -> bool {
        self.ports.iter().any(|p| p.listen.protocol.is_secure())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scaling {
    pub min: u32,
    pub max: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_utilization: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_utilization: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_count: Option<u32>,
    #[serde(with = "human_duration")]
    pub scale_in_cooldown: Duration,
    #[serde(with = "human_duration")]
    pub scale_out_cooldown: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityProvider {
    pub provider: &'static str,
    pub weight: u32,
    pub base: u32,
}

/// A fully-resolved service configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedService {
    pub name: String,
    pub architecture: Architecture,
    pub cpu: Cpu,
    pub memory: Memory,
    pub storage: Storage,
    /// Empty means plain on-demand Fargate
    pub capacity: Vec<CapacityProvider>,
    pub containers: Vec<NormalizedContainer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<NormalizedLoadBalancer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_registry_port: Option<u16>,
    pub scaling: Scaling,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_role: Option<String>,
    pub link: Vec<String>,
    pub permissions: Vec<PermissionArgs>,
    pub wait: bool,
}

impl NormalizedService {
    pub fn container(&self, name: &str) -> Option<&NormalizedContainer> {
        self.containers.iter().find(|c| c.name == name)
    }
}

// ============================================================================
// Override resolution
// ============================================================================

/// Resolve a setting that can be given per container, at the service level,
/// or not at all. The per-container value wins over the service-level value,
/// which wins over the built-in default.
pub fn resolve_override<T>(
    container: Option<T>,
    service: Option<T>,
    default: impl FnOnce() -> T,
) -> T {
    match (container, service) {
        (Some(value), _) => value,
        (None, Some(value)) => value,
        (None, None) => default(),
    }
}

/// `resolve_override` for settings without a built-in default.
pub fn resolve_optional<T>(container: Option<T>, service: Option<T>) -> Option<T> {
    resolve_override(container.map(Some), service.map(Some), || None)
}

// ============================================================================
// Pure validation functions
// ============================================================================

/// Names of clusters and services: lowercase letters, digits and hyphens,
/// starting with a letter.
pub fn validate_name(name: &str) -> Result<(), ConfigurationError> {
    let valid = name
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase())
        .unwrap_or(false)
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && name.len() <= 63;
    if valid {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidName(name.to_string()))
    }
}

fn image_source(image: ImageArgs) -> ImageSource {
    match image {
        ImageArgs::Tag(image) => ImageSource::Tag { image },
        ImageArgs::Build(build) => {
            let context = build.context.unwrap_or_else(|| ".".to_string());
            ImageSource::Build {
                context: shellexpand::tilde(&context).into_owned(),
                dockerfile: build.dockerfile.unwrap_or_else(|| "Dockerfile".to_string()),
                args: build.args,
                target: build.target,
            }
        }
    }
}

fn normalize_container(
    name: String,
    cpu: Option<&str>,
    memory: Option<&str>,
    own: &ContainerFields,
    inherited: &ContainerFields,
) -> Result<NormalizedContainer, ConfigurationError> {
    let cpu = cpu.map(Cpu::parse).transpose()?;
    let memory = memory.map(Memory::parse).transpose()?;

    let image = resolve_override(own.image.clone(), inherited.image.clone(), || {
        ImageArgs::Build(Default::default())
    });

    let retention = resolve_override(
        own.logging.as_ref().and_then(|l| l.retention.clone()),
        inherited.logging.as_ref().and_then(|l| l.retention.clone()),
        || DEFAULT_RETENTION.to_string(),
    );
    let log_retention_days = retention_days(&retention)?;

    let health = resolve_optional(own.health.as_ref(), inherited.health.as_ref())
        .map(|args| ContainerHealthCheck::resolve(&name, args))
        .transpose()?;

    let dev = resolve_optional(own.dev.clone(), inherited.dev.clone());
    if dev.is_some() {
        debug!("Container '{}' has dev settings; they are ignored at deploy time", name);
    }

    Ok(NormalizedContainer {
        cpu,
        memory,
        image: image_source(image),
        command: resolve_optional(own.command.clone(), inherited.command.clone()),
        entrypoint: resolve_optional(own.entrypoint.clone(), inherited.entrypoint.clone()),
        environment: resolve_override(
            own.environment.clone(),
            inherited.environment.clone(),
            BTreeMap::new,
        ),
        ssm: resolve_override(own.ssm.clone(), inherited.ssm.clone(), BTreeMap::new),
        log_retention: retention,
        log_retention_days,
        volumes: resolve_override(own.volumes.clone(), inherited.volumes.clone(), Vec::new),
        health,
        dev,
        name,
    })
}

/// Expand the single-container shorthand or validate the `containers` list.
pub fn normalize_containers(
    service: &str,
    args: &ServiceArgs,
) -> Result<Vec<NormalizedContainer>, ConfigurationError> {
    let Some(containers) = &args.containers else {
        let container = normalize_container(
            service.to_string(),
            None,
            None,
            &ContainerFields::default(),
            &args.container,
        )?;
        return Ok(vec![container]);
    };

    if let Some(field) = args.container.first_set_field() {
        return Err(ConfigurationError::ConflictingTopLevelAndContainers(field));
    }
    if containers.is_empty() {
        return Err(ConfigurationError::NoContainers);
    }

    let inherited = ContainerFields::default();
    let mut names = HashSet::new();
    let mut normalized = Vec::with_capacity(containers.len());

    for (index, container) in containers.iter().enumerate() {
        let name = container_name(service, index, containers.len(), container)?;
        if !names.insert(name.clone()) {
            return Err(ConfigurationError::DuplicateContainerName(name));
        }
        normalized.push(normalize_container(
            name,
            container.cpu.as_deref(),
            container.memory.as_deref(),
            &container.fields,
            &inherited,
        )?);
    }

    Ok(normalized)
}

fn container_name(
    service: &str,
    index: usize,
    count: usize,
    container: &ContainerArgs,
) -> Result<String, ConfigurationError> {
    match (&container.name, count) {
        (Some(name), _) if !name.trim().is_empty() => {
            validate_container_name(name)?;
            Ok(name.clone())
        }
        (_, 1) => Ok(service.to_string()),
        _ => Err(ConfigurationError::UnnamedContainer(index)),
    }
}

/// Container names end up in resource names: ASCII letters, digits, `-` and `_`.
pub fn validate_container_name(name: &str) -> Result<(), ConfigurationError> {
    let valid = (1..=255).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidContainerName(name.to_string()))
    }
}

/// Per-container CPU and memory reservations must fit in the task.
pub fn check_container_allocation(
    containers: &[NormalizedContainer],
    cpu: Cpu,
    memory: Memory,
) -> Result<(), ConfigurationError> {
    let cpu_sum: u32 = containers.iter().filter_map(|c| c.cpu).map(|c| c.units()).sum();
    if cpu_sum > cpu.units() {
        return Err(ConfigurationError::OverAllocatedContainerResources {
            resource: "cpu",
            requested: Cpu(cpu_sum).to_string(),
            available: cpu.to_string(),
        });
    }

    let memory_sum: u32 = containers.iter().filter_map(|c| c.memory).map(|m| m.mib()).sum();
    if memory_sum > memory.mib() {
        return Err(ConfigurationError::OverAllocatedContainerResources {
            resource: "memory",
            requested: Memory(memory_sum).to_string(),
            available: memory.to_string(),
        });
    }

    Ok(())
}

struct ParsedPort<'a> {
    args: &'a PortArgs,
    listen: PortProtocol,
    forward: Option<PortProtocol>,
    redirect: Option<PortProtocol>,
}

fn target_container(
    listen: &PortProtocol,
    requested: Option<&str>,
    containers: &[NormalizedContainer],
) -> Result<String, ConfigurationError> {
    match requested {
        Some(name) if containers.iter().any(|c| c.name == name) => Ok(name.to_string()),
        Some(name) => Err(ConfigurationError::UnknownContainerTarget(
            listen.to_string(),
            name.to_string(),
        )),
        None if containers.len() == 1 => Ok(containers[0].name.clone()),
        None => Err(ConfigurationError::AmbiguousContainerTarget(
            listen.to_string(),
            containers.len(),
        )),
    }
}

/// Parse and validate load balancer ports.
///
/// A port with only `listen` forwards to the same port and protocol.
/// Protocol families are checked before anything that depends on containers.
pub fn normalize_ports(
    ports: &[PortArgs],
    containers: &[NormalizedContainer],
) -> Result<(ProtocolFamily, Vec<NormalizedPort>), ConfigurationError> {
    if ports.is_empty() {
        return Err(ConfigurationError::EmptyPortList);
    }

    let parsed = ports
        .iter()
        .map(|args| -> Result<ParsedPort<'_>, ConfigurationError> {
            Ok(ParsedPort {
                args,
                listen: PortProtocol::parse(&args.listen)?,
                forward: args.forward.as_deref().map(PortProtocol::parse).transpose()?,
                redirect: args.redirect.as_deref().map(PortProtocol::parse).transpose()?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let all_protocols: Vec<PortProtocol> = parsed
        .iter()
        .flat_map(|p| std::iter::once(p.listen).chain(p.forward).chain(p.redirect))
        .collect();
    let family = uniform_family(&all_protocols)?.unwrap_or(ProtocolFamily::Application);

    let mut normalized = Vec::with_capacity(parsed.len());
    let mut default_listeners = HashSet::new();
    let mut listen_protocols: HashMap<u16, PortProtocol> = HashMap::new();

    for port in parsed {
        let action = match (port.forward, port.redirect) {
            (Some(_), Some(_)) => {
                return Err(ConfigurationError::RedirectWithForward(port.listen.to_string()))
            }
            (None, Some(to)) => PortAction::Redirect { to },
            (forward, None) => PortAction::Forward {
                to: forward.unwrap_or(port.listen),
                container: target_container(&port.listen, port.args.container.as_deref(), containers)?,
            },
        };

        if port.args.path.is_some() && family == ProtocolFamily::Network {
            return Err(ConfigurationError::PathOnNetworkPort(port.listen.to_string()));
        }
        // one listener per load-balancer port, whatever the protocol
        let protocol = *listen_protocols.entry(port.listen.port).or_insert(port.listen);
        if protocol != port.listen {
            return Err(ConfigurationError::DuplicateListenPort(port.listen.to_string()));
        }
        if port.args.path.is_none() && !default_listeners.insert(port.listen.port) {
            return Err(ConfigurationError::DuplicateListenPort(port.listen.to_string()));
        }

        normalized.push(NormalizedPort {
            listen: port.listen,
            action,
            path: port.args.path.clone(),
        });
    }

    Ok((family, normalized))
}

fn normalize_load_balancer(
    args: &ServiceArgs,
    containers: &[NormalizedContainer],
) -> Result<Option<NormalizedLoadBalancer>, ConfigurationError> {
    let lb: &LoadBalancerArgs = match (&args.load_balancer, &args.public) {
        (Some(_), Some(_)) => return Err(ConfigurationError::ConflictingLoadBalancerForms),
        (Some(lb), None) => lb,
        (None, Some(public)) => {
            tracing::warn!("\"public\" is deprecated; use \"loadBalancer\" instead");
            public
        }
        (None, None) => return Ok(None),
    };

    let (family, ports) = normalize_ports(&lb.ports, containers)?;

    let targets: Vec<PortProtocol> = {
        let mut seen = HashSet::new();
        ports
            .iter()
            .filter_map(|p| p.forward().map(|(to, _)| *to))
            .filter(|to| seen.insert(*to))
            .collect()
    };

    let mut overrides = BTreeMap::new();
    for (key, check) in &lb.health {
        let target = PortProtocol::parse(key)?;
        if !targets.contains(&target) {
            return Err(ConfigurationError::UnknownHealthCheckTarget(key.clone()));
        }
        overrides.insert(target, check);
    }

    let mut health = BTreeMap::new();
    for target in &targets {
        let check = HealthCheck::resolve(target, overrides.get(target).copied())?;
        health.insert(target.to_string(), check);
    }

    Ok(Some(NormalizedLoadBalancer {
        public: lb.public.unwrap_or(true),
        domain: lb.domain.clone(),
        family,
        ports,
        health,
    }))
}

fn check_utilization(metric: &'static str, value: Option<f64>) -> Result<(), ConfigurationError> {
    match value {
        Some(v) if !(v > 0.0 && v <= 100.0) => {
            Err(ConfigurationError::UtilizationOutOfRange { metric, value: v })
        }
        _ => Ok(()),
    }
}

/// Resolve scaling. Without `scaling` the service runs exactly one task.
/// Utilization targets that are omitted stay disabled.
pub fn normalize_scaling(
    args: Option<&ScalingArgs>,
    load_balancer: Option<&NormalizedLoadBalancer>,
) -> Result<Scaling, ConfigurationError> {
    let args = args.cloned().unwrap_or_default();
    let min = args.min.unwrap_or(1);
    let max = args.max.unwrap_or(min.max(1));
    if min > max {
        return Err(ConfigurationError::InvalidScaleRange { min, max });
    }

    check_utilization("cpu", args.cpu_utilization)?;
    check_utilization("memory", args.memory_utilization)?;

    if let Some(count) = args.request_count {
        let application = load_balancer
            .map(|lb| lb.family == ProtocolFamily::Application)
            .unwrap_or(false);
        if !application {
            return Err(ConfigurationError::RequestCountWithoutApplicationLoadBalancer);
        }
        if count == 0 {
            return Err(ConfigurationError::UtilizationOutOfRange {
                metric: "requestCount",
                value: 0.0,
            });
        }
    }

    Ok(Scaling {
        min,
        max,
        cpu_utilization: args.cpu_utilization,
        memory_utilization: args.memory_utilization,
        request_count: args.request_count,
        scale_in_cooldown: parse_duration_or(args.scale_in_cooldown.as_deref(), 300)?,
        scale_out_cooldown: parse_duration_or(args.scale_out_cooldown.as_deref(), 300)?,
    })
}

pub fn normalize_capacity(
    args: Option<&CapacityArgs>,
) -> Result<Vec<CapacityProvider>, ConfigurationError> {
    match args {
        None => Ok(Vec::new()),
        Some(CapacityArgs::Named(name)) if name == "spot" => Ok(vec![CapacityProvider {
            provider: "FARGATE_SPOT",
            weight: 1,
            base: 0,
        }]),
        Some(CapacityArgs::Named(name)) => Err(ConfigurationError::InvalidCapacity(name.clone())),
        Some(CapacityArgs::Weighted { fargate, spot }) => {
            let providers: Vec<CapacityProvider> = [("FARGATE", fargate), ("FARGATE_SPOT", spot)]
                .into_iter()
                .filter_map(|(provider, weight)| {
                    weight.as_ref().map(|w| CapacityProvider {
                        provider,
                        weight: w.weight,
                        base: w.base.unwrap_or(0),
                    })
                })
                .collect();
            if providers.iter().all(|p| p.weight == 0) {
                return Err(ConfigurationError::InvalidCapacity("weights".to_string()));
            }
            Ok(providers)
        }
    }
}

/// Validate and normalize a service configuration.
pub fn normalize_service(
    name: &str,
    args: &ServiceArgs,
) -> Result<NormalizedService, ConfigurationError> {
    validate_name(name)?;

    let (cpu, memory) = resolve_size(args.cpu.as_deref(), args.memory.as_deref())?;
    let storage = resolve_storage(args.storage.as_deref())?;
    let capacity = normalize_capacity(args.capacity.as_ref())?;

    let containers = normalize_containers(name, args)?;
    check_container_allocation(&containers, cpu, memory)?;

    let load_balancer = normalize_load_balancer(args, &containers)?;
    let scaling = normalize_scaling(args.scaling.as_ref(), load_balancer.as_ref())?;

    debug!(
        "Normalized service '{}': {} / {}, {} container(s), load balancer: {}",
        name,
        cpu,
        memory,
        containers.len(),
        load_balancer
            .as_ref()
            .map(|lb| lb.load_balancer_type())
            .unwrap_or("none")
    );

    Ok(NormalizedService {
        name: name.to_string(),
        architecture: args.architecture.unwrap_or_default(),
        cpu,
        memory,
        storage,
        capacity,
        containers,
        load_balancer,
        service_registry_port: args.service_registry.as_ref().map(|r| r.port),
        scaling,
        task_role: args.task_role.clone(),
        execution_role: args.execution_role.clone(),
        link: args.link.clone(),
        permissions: args.permissions.clone(),
        wait: args.wait,
    })
}
