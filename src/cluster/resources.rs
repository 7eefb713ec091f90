//! Resource requests handed to the infrastructure engine

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Kind of cloud resource a request creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Cluster,
    LogGroup,
    ImageBuild,
    Role,
    RolePolicy,
    TaskDefinition,
    SecurityGroup,
    LoadBalancer,
    Certificate,
    TargetGroup,
    Listener,
    ListenerRule,
    ServiceDiscovery,
    Service,
    ScalableTarget,
    ScalingPolicy,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 16] = [
        ResourceKind::Cluster,
        ResourceKind::LogGroup,
        ResourceKind::ImageBuild,
        ResourceKind::Role,
        ResourceKind::RolePolicy,
        ResourceKind::TaskDefinition,
        ResourceKind::SecurityGroup,
        ResourceKind::LoadBalancer,
        ResourceKind::Certificate,
        ResourceKind::TargetGroup,
        ResourceKind::Listener,
        ResourceKind::ListenerRule,
        ResourceKind::ServiceDiscovery,
        ResourceKind::Service,
        ResourceKind::ScalableTarget,
        ResourceKind::ScalingPolicy,
    ];

    /// Key used for this kind in manifests, e.g. `"taskDefinition"`
    pub fn key(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "cluster",
            ResourceKind::LogGroup => "logGroup",
            ResourceKind::ImageBuild => "imageBuild",
            ResourceKind::Role => "role",
            ResourceKind::RolePolicy => "rolePolicy",
            ResourceKind::TaskDefinition => "taskDefinition",
            ResourceKind::SecurityGroup => "securityGroup",
            ResourceKind::LoadBalancer => "loadBalancer",
            ResourceKind::Certificate => "certificate",
            ResourceKind::TargetGroup => "targetGroup",
            ResourceKind::Listener => "listener",
            ResourceKind::ListenerRule => "listenerRule",
            ResourceKind::ServiceDiscovery => "serviceDiscovery",
            ResourceKind::Service => "service",
            ResourceKind::ScalableTarget => "scalableTarget",
            ResourceKind::ScalingPolicy => "scalingPolicy",
        }
    }

    /// Resource type token understood by the engine
    pub fn type_token(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "aws:ecs/cluster:Cluster",
            ResourceKind::LogGroup => "aws:cloudwatch/logGroup:LogGroup",
            ResourceKind::ImageBuild => "docker-build:index:Image",
            ResourceKind::Role => "aws:iam/role:Role",
            ResourceKind::RolePolicy => "aws:iam/rolePolicy:RolePolicy",
            ResourceKind::TaskDefinition => "aws:ecs/taskDefinition:TaskDefinition",
            ResourceKind::SecurityGroup => "aws:ec2/securityGroup:SecurityGroup",
            ResourceKind::LoadBalancer => "aws:lb/loadBalancer:LoadBalancer",
            ResourceKind::Certificate => "aws:acm/certificate:Certificate",
            ResourceKind::TargetGroup => "aws:lb/targetGroup:TargetGroup",
            ResourceKind::Listener => "aws:lb/listener:Listener",
            ResourceKind::ListenerRule => "aws:lb/listenerRule:ListenerRule",
            ResourceKind::ServiceDiscovery => "aws:servicediscovery/service:Service",
            ResourceKind::Service => "aws:ecs/service:Service",
            ResourceKind::ScalableTarget => "aws:appautoscaling/target:Target",
            ResourceKind::ScalingPolicy => "aws:appautoscaling/policy:Policy",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One resource-creation call.
///
/// `name` is the logical name, unique within a cluster. Arguments may refer
/// to outputs of other resources through `reference`, which also records
/// the dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    pub kind: ResourceKind,
    pub name: String,
    pub args: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ResourceRequest {
    pub fn new(kind: ResourceKind, name: impl Into<String>, args: Value) -> Self {
        let mut request = Self {
            kind,
            name: name.into(),
            args,
            depends_on: Vec::new(),
        };
        request.refresh_dependencies();
        request
    }

    /// Add an ordering dependency that is not visible in the arguments.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.depends_on.contains(&name) {
            self.depends_on.push(name);
        }
        self
    }

    /// Re-scan the arguments for references, keeping explicit dependencies.
    pub fn refresh_dependencies(&mut self) {
        let mut found = Vec::new();
        collect_references(&self.args, &mut found);
        for name in found {
            if !self.depends_on.contains(&name) {
                self.depends_on.push(name);
            }
        }
    }
}

/// Reference to an output attribute of another resource
pub fn reference(name: &str, attr: &str) -> Value {
    json!({ "$ref": name, "attr": attr })
}

/// String concatenation resolved by the engine once references are known
pub fn join(parts: Vec<Value>) -> Value {
    json!({ "$join": parts })
}

/// Region of the engine's provider, resolved by the engine
pub fn region() -> Value {
    json!({ "$intrinsic": "region" })
}

fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(name)) = map.get("$ref") {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            for nested in map.values() {
                collect_references(nested, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        _ => {}
    }
}

/// What the engine returns for a created resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub name: String,
    /// Engine identifier (URN, ARN, ...)
    pub id: String,
}

/// Resource requests in creation order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourcePlan {
    pub requests: Vec<ResourceRequest>,
}

impl ResourcePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request and return its logical name for later references.
    pub fn push(&mut self, request: ResourceRequest) -> String {
        let name = request.name.clone();
        self.requests.push(request);
        name
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ResourceRequest> {
        self.requests.iter().find(|r| r.name == name)
    }

    pub fn of_kind(&self, kind: ResourceKind) -> Vec<&ResourceRequest> {
        self.requests.iter().filter(|r| r.kind == kind).collect()
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.requests.iter().filter(|r| r.kind == kind).count()
    }
}

/// Fit a physical resource name into `max_len` characters.
///
/// Names that fit are returned as-is; longer names are truncated and get a
/// short SHA-256 suffix of the full name so they stay unique and stable.
pub fn physical_name(base: &str, max_len: usize) -> String {
    if base.len() <= max_len {
        return base.to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let suffix = &digest[..8];

    let mut keep = max_len.saturating_sub(suffix.len() + 1);
    while !base.is_char_boundary(keep) {
        keep -= 1;
    }
    let prefix = base[..keep].trim_end_matches('-');
    format!("{}-{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_keys_round_trip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(ResourceKind::from_key("bucket"), None);
    }

    #[test]
    fn test_references_become_dependencies() {
        let request = ResourceRequest::new(
            ResourceKind::Listener,
            "web-listener-80",
            json!({
                "loadBalancerArn": reference("web-lb", "arn"),
                "defaultActions": [{"targetGroupArn": reference("web-tg-80", "arn")}],
                "name": join(vec![json!("x-"), reference("web-lb", "name")]),
            }),
        );
        assert_eq!(request.depends_on.len(), 2);
        assert!(request.depends_on.contains(&"web-lb".to_string()));
        assert!(request.depends_on.contains(&"web-tg-80".to_string()));
    }

    #[test]
    fn test_explicit_dependency() {
        let request = ResourceRequest::new(ResourceKind::Service, "web", json!({}))
            .depends_on("web-listener-80")
            .depends_on("web-listener-80");
        assert_eq!(request.depends_on, vec!["web-listener-80".to_string()]);
    }

    #[test]
    fn test_physical_name_short() {
        assert_eq!(physical_name("prod-web", 32), "prod-web");
    }

    #[test]
    fn test_physical_name_truncated() {
        let base = "production-customer-facing-api-load-balancer";
        let name = physical_name(base, 32);
        assert!(name.len() <= 32);
        assert_eq!(name, physical_name(base, 32));
        assert_ne!(name, physical_name("production-customer-facing-api-load-balancer-2", 32));
        assert!(name.starts_with("production-customer-fac"));
    }

    #[test]
    fn test_physical_name_multibyte() {
        let name = physical_name("prod-web-日本語日本語日本語-80http", 32);
        assert!(name.len() <= 32);
        assert!(name.starts_with("prod-web-日本語"));
    }
}
