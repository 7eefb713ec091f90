use thiserror::Error;

/// Errors raised while validating and normalizing cluster or service
/// configuration. All of them are reported before any resource is created.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Invalid size '{0}': expected a value such as \"1 vCPU\" or \"4 GB\"")]
    InvalidSize(String),

    #[error("Unsupported CPU '{0}': supported values are {1}")]
    UnsupportedCpu(String, String),

    #[error("Invalid CPU/memory combination: {cpu} does not support {memory} (supported: {supported})")]
    InvalidSizeCombination {
        cpu: String,
        memory: String,
        supported: String,
    },

    #[error("Invalid storage '{0}': must be between 20 GB and 200 GB")]
    InvalidStorage(String),

    #[error("Invalid port '{0}': expected \"{{port}}/{{protocol}}\" with protocol http, https, tcp, udp, tcp_udp or tls")]
    InvalidPort(String),

    #[error("Invalid duration '{0}': expected a value such as \"30 seconds\" or \"5 minutes\"")]
    InvalidDuration(String),

    #[error("Invalid log retention '{0}'")]
    InvalidRetention(String),

    #[error("Invalid capacity '{0}': expected \"spot\" or fargate/spot weights with at least one weight above zero")]
    InvalidCapacity(String),

    #[error("Invalid name '{0}': use lowercase letters, digits and hyphens")]
    InvalidName(String),

    #[error("Ports must be either all application-layer (http/https) or all network-layer (tcp/udp/tcp_udp/tls)")]
    MixedProtocolFamily,

    #[error("Port '{0}' cannot specify both \"forward\" and \"redirect\"")]
    RedirectWithForward(String),

    #[error("Port '{0}' must name a target container because the service has {1} containers")]
    AmbiguousContainerTarget(String, usize),

    #[error("Port '{0}' targets unknown container '{1}'")]
    UnknownContainerTarget(String, String),

    #[error("Port '{0}' sets a path, which is only supported for http/https ports")]
    PathOnNetworkPort(String),

    #[error("Port '{0}' is listed more than once without distinct paths")]
    DuplicateListenPort(String),

    #[error("Load balancer has no ports")]
    EmptyPortList,

    #[error("Health check is configured for '{0}', which is not a forward target of any port")]
    UnknownHealthCheckTarget(String),

    #[error("Containers request {requested} of {resource} but the service only has {available}")]
    OverAllocatedContainerResources {
        resource: &'static str,
        requested: String,
        available: String,
    },

    #[error("Cannot specify both \"containers\" and the top-level \"{0}\" field")]
    ConflictingTopLevelAndContainers(&'static str),

    #[error("\"containers\" must contain at least one container")]
    NoContainers,

    #[error("Duplicate container name '{0}'")]
    DuplicateContainerName(String),

    #[error("Invalid container name '{0}': use 1 to 255 ASCII letters, digits, hyphens or underscores")]
    InvalidContainerName(String),

    #[error("Container at index {0} must be named when multiple containers are specified")]
    UnnamedContainer(usize),

    #[error("Health check for '{target}': {field} of {value} is outside [{min}, {max}]")]
    HealthCheckOutOfRange {
        target: String,
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("Container health check for '{container}': {field} of {value} is outside [{min}, {max}]")]
    ContainerHealthCheckOutOfRange {
        container: String,
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("Container health check for '{0}' needs a non-empty command")]
    EmptyHealthCheckCommand(String),

    #[error("Invalid scaling range: min ({min}) is greater than max ({max})")]
    InvalidScaleRange { min: u32, max: u32 },

    #[error("Scaling {metric} utilization {value} must be greater than 0 and at most 100")]
    UtilizationOutOfRange { metric: &'static str, value: f64 },

    #[error("Scaling on request count requires an http/https load balancer")]
    RequestCountWithoutApplicationLoadBalancer,

    #[error("Cannot specify both \"loadBalancer\" and the deprecated \"public\" field")]
    ConflictingLoadBalancerForms,

    #[error("Cluster network field '{0}' must not be empty")]
    EmptySubnets(&'static str),

    #[error("Service '{0}' sets \"serviceRegistry\" but the cluster has no service discovery namespace")]
    MissingServiceDiscoveryNamespace(String),

    #[error("Service '{service}' would create '{name}', which another resource in this cluster already uses")]
    ResourceNameCollision { service: String, name: String },

    #[error("Link '{0}' is not known to the permission resolver")]
    UnknownLink(String),

    #[error("Transform targets unknown resource kind '{0}'")]
    UnknownTransformTarget(String),
}
