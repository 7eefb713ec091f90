//! # Cluster and service construction
//!
//! `Cluster::new` creates the ECS cluster resource and `Cluster::add_service`
//! attaches services to it. Neither talks to AWS directly: every resource is
//! requested from a `ResourceProvider`, which is the infrastructure engine
//! in production and a `PlanRecorder` for dry runs.
//!
//! ## Ordering guarantees
//!
//! 1. Configuration is validated and normalized first.
//! 2. The layout version is checked before the cluster resource is requested.
//! 3. A service's whole resource plan is composed before its first resource
//!    is requested, so configuration errors never leave partial services.
//!    Logical names that clash with resources of earlier services are
//!    rejected at this point too.
//! 4. Transforms run on each request immediately before it is handed to the
//!    provider. Cluster-level transforms run before service-level ones.
//!
//! ## Resource layout
//!
//! ```text
//!                     ┌──────────────────┐
//!                     │   ECS cluster    │
//!                     └────────┬─────────┘
//!          ┌───────────────────┼────────────────────┐
//!          ▼                   ▼                    ▼
//!   ┌─────────────┐     ┌─────────────┐      ┌─────────────┐
//!   │  service A  │     │  service B  │      │  service C  │
//!   │ task def    │     │ task def    │      │ task def    │
//!   │ roles, logs │     │ LB, targets │      │ discovery   │
//!   │ scaling     │     │ scaling     │      │ scaling     │
//!   └─────────────┘     └─────────────┘      └─────────────┘
//! ```

pub mod composer;
pub mod permissions;
pub mod provider;
pub mod resources;
pub mod transform;
pub mod version;

pub use composer::{compose_service, ClusterContext, ComposedService, RoleBinding, ServiceLayout};
pub use permissions::{PermissionResolver, PolicyStatement, StaticPermissions};
pub use provider::{PlanRecorder, ProviderError, ResourceProvider};
pub use resources::{ResourceHandle, ResourceKind, ResourcePlan, ResourceRequest};
pub use transform::{merge_patch, TransformFn, Transforms};
pub use version::{check_layout_version, VersioningError, LAYOUT_VERSION};

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::config::validation::validate_name;
use crate::config::{normalize_service, ClusterArgs, ConfigurationError, NormalizedService, ServiceArgs};

/// Errors surfaced by `Cluster` and `Service` construction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Versioning error: {0}")]
    Versioning(#[from] VersioningError),

    /// Engine failures are reported exactly as the engine produced them
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Collaborators a cluster needs from its environment
#[derive(Clone)]
pub struct DeployContext {
    pub provider: Arc<dyn ResourceProvider>,
    pub permissions: Arc<dyn PermissionResolver>,
    /// Layout version recorded for this cluster by an earlier deployment
    pub deployed_version: Option<u32>,
}

impl DeployContext {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            provider,
            permissions: Arc::new(StaticPermissions::default()),
            deployed_version: None,
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionResolver>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_deployed_version(mut self, version: Option<u32>) -> Self {
        self.deployed_version = version;
        self
    }
}

/// Name and engine handle of the cluster resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    pub name: String,
    pub handle: ResourceHandle,
}

pub struct Cluster {
    identity: ClusterIdentity,
    args: ClusterArgs,
    transforms: Transforms,
    context: DeployContext,
    /// Logical names requested so far, cluster resource included
    resource_names: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("identity", &self.identity)
            .field("args", &self.args)
            .field("transforms", &self.transforms)
            .finish()
    }
}

impl Cluster {
    pub fn new(name: &str, args: ClusterArgs, context: DeployContext) -> Result<Self, ClusterError> {
        Self::with_transforms(name, args, Transforms::new(), context)
    }

    /// Create the cluster with transforms that apply to the cluster resource
    /// and to every resource of every service added later.
    pub fn with_transforms(
        name: &str,
        args: ClusterArgs,
        transforms: Transforms,
        context: DeployContext,
    ) -> Result<Self, ClusterError> {
        validate_name(name)?;
        args.validate()?;
        check_layout_version(name, context.deployed_version, args.force_upgrade.as_deref())?;

        let mut request = ResourceRequest::new(
            ResourceKind::Cluster,
            name,
            json!({
                "name": name,
                "settings": [{"name": "containerInsights", "value": "enabled"}],
            }),
        );
        transforms.apply(&mut request);
        let handle = context.provider.create(&request)?;
        info!("Created cluster '{}' ({})", name, handle.id);
        let resource_names = Mutex::new(HashSet::from([handle.name.clone()]));

        Ok(Self {
            identity: ClusterIdentity {
                name: name.to_string(),
                handle,
            },
            args,
            transforms,
            context,
            resource_names,
        })
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    pub fn args(&self) -> &ClusterArgs {
        &self.args
    }

    /// Layout version this cluster is built with
    pub fn layout_version(&self) -> u32 {
        LAYOUT_VERSION
    }

    pub fn add_service(&self, name: &str, args: &ServiceArgs) -> Result<Service, ClusterError> {
        self.add_service_with(name, args, &Transforms::new())
    }

    /// Attach a service, with extra transforms for its resources only.
    pub fn add_service_with(
        &self,
        name: &str,
        args: &ServiceArgs,
        transforms: &Transforms,
    ) -> Result<Service, ClusterError> {
        let config = normalize_service(name, args)?;
        let cluster = ClusterContext {
            name: &self.identity.name,
            cluster_ref: &self.identity.handle.name,
            vpc: &self.args.vpc,
        };
        let composed = compose_service(&cluster, &config, self.context.permissions.as_ref())?;
        self.reserve_names(name, &composed.plan)?;

        let transforms = self.transforms.merged(transforms);
        let mut handles = BTreeMap::new();
        for mut request in composed.plan.requests {
            transforms.apply(&mut request);
            let handle = self.context.provider.create(&request)?;
            handles.insert(handle.name.clone(), handle);
        }

        info!(
            "Added service '{}' to cluster '{}' ({} resources)",
            name,
            self.identity.name,
            handles.len()
        );
        Service::from_layout(config, composed.layout, handles)
    }
}

impl Cluster {
    fn reserve_names(&self, service: &str, plan: &ResourcePlan) -> Result<(), ConfigurationError> {
        let mut names = self
            .resource_names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut planned = HashSet::new();
        for request in &plan.requests {
            if names.contains(&request.name) || !planned.insert(request.name.as_str()) {
                return Err(ConfigurationError::ResourceNameCollision {
                    service: service.to_string(),
                    name: request.name.clone(),
                });
            }
        }
        names.extend(planned.into_iter().map(str::to_string));
        Ok(())
    }
}

/// A service attached to a cluster, with the engine handles of its resources
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub config: NormalizedService,
    pub layout: ServiceLayout,
    pub task_definition: ResourceHandle,
    pub service: ResourceHandle,
    pub load_balancer: Option<ResourceHandle>,
    pub listeners: Vec<ResourceHandle>,
    pub target_groups: Vec<ResourceHandle>,
    pub scalable_target: ResourceHandle,
    pub log_groups: Vec<ResourceHandle>,
    pub service_discovery: Option<ResourceHandle>,
}

fn take(handles: &mut BTreeMap<String, ResourceHandle>, name: &str) -> Result<ResourceHandle, ProviderError> {
    handles
        .remove(name)
        .ok_or_else(|| ProviderError::new(name, "engine returned no handle"))
}

impl Service {
    fn from_layout(
        config: NormalizedService,
        layout: ServiceLayout,
        mut handles: BTreeMap<String, ResourceHandle>,
    ) -> Result<Self, ClusterError> {
        let optional = |handles: &mut BTreeMap<String, ResourceHandle>, name: &Option<String>| {
            name.as_deref().map(|n| take(handles, n)).transpose()
        };

        let task_definition = take(&mut handles, &layout.task_definition)?;
        let service = take(&mut handles, &layout.service)?;
        let scalable_target = take(&mut handles, &layout.scalable_target)?;
        let load_balancer = optional(&mut handles, &layout.load_balancer)?;
        let service_discovery = optional(&mut handles, &layout.service_discovery)?;
        let listeners = layout
            .listeners
            .iter()
            .map(|n| take(&mut handles, n))
            .collect::<Result<Vec<_>, _>>()?;
        let target_groups = layout
            .target_groups
            .values()
            .map(|n| take(&mut handles, n))
            .collect::<Result<Vec<_>, _>>()?;
        let log_groups = layout
            .log_groups
            .values()
            .map(|n| take(&mut handles, n))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            layout,
            task_definition,
            service,
            load_balancer,
            listeners,
            target_groups,
            scalable_target,
            log_groups,
            service_discovery,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Public URL, when the load balancer has a domain
    pub fn url(&self) -> Option<String> {
        let lb = self.config.load_balancer.as_ref()?;
        let domain = lb.domain.as_ref()?;
        let scheme = if lb.needs_certificate() { "https" } else { "http" };
        Some(format!("{}://{}", scheme, domain.name()))
    }

    /// Private DNS name registered in the cluster's namespace
    pub fn hostname(&self) -> Option<&str> {
        self.layout.hostname.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoadBalancerArgs, PortArgs, VpcArgs};

    fn cluster_args() -> ClusterArgs {
        ClusterArgs::new(VpcArgs {
            id: "vpc-1".into(),
            load_balancer_subnets: vec!["subnet-a".into()],
            container_subnets: vec!["subnet-b".into()],
            security_groups: vec![],
            cloudmap_namespace: None,
        })
    }

    struct FailingProvider;

    impl ResourceProvider for FailingProvider {
        fn create(&self, request: &ResourceRequest) -> Result<ResourceHandle, ProviderError> {
            Err(ProviderError::new(&request.name, "quota exceeded"))
        }
    }

    #[test]
    fn test_new_cluster_creates_cluster_resource() {
        let recorder = Arc::new(PlanRecorder::new());
        let cluster = Cluster::new("prod", cluster_args(), DeployContext::new(recorder.clone())).unwrap();
        assert_eq!(cluster.name(), "prod");
        assert_eq!(cluster.identity().handle.kind, ResourceKind::Cluster);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_breaking_version_change_creates_nothing() {
        let recorder = Arc::new(PlanRecorder::new());
        let context = DeployContext::new(recorder.clone()).with_deployed_version(Some(1));
        let result = Cluster::new("prod", cluster_args(), context);
        assert!(matches!(
            result,
            Err(ClusterError::Versioning(VersioningError::BreakingVersionChange { .. }))
        ));
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_force_upgrade() {
        let recorder = Arc::new(PlanRecorder::new());
        let context = DeployContext::new(recorder).with_deployed_version(Some(1));
        let args = cluster_args().with_force_upgrade("v2");
        assert!(Cluster::new("prod", args, context).is_ok());
    }

    #[test]
    fn test_invalid_service_creates_nothing() {
        let recorder = Arc::new(PlanRecorder::new());
        let cluster = Cluster::new("prod", cluster_args(), DeployContext::new(recorder.clone())).unwrap();

        let args = ServiceArgs {
            cpu: Some("1 vCPU".into()),
            memory: Some("20 GB".into()),
            ..Default::default()
        };
        assert!(matches!(
            cluster.add_service("web", &args),
            Err(ClusterError::Configuration(ConfigurationError::InvalidSizeCombination { .. }))
        ));
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_provider_error_passes_through() {
        let context = DeployContext::new(Arc::new(FailingProvider));
        let err = Cluster::new("prod", cluster_args(), context).unwrap_err();
        assert_eq!(err, ClusterError::Provider(ProviderError::new("prod", "quota exceeded")));
        assert_eq!(err.to_string(), "Failed to create prod: quota exceeded");
    }

    #[test]
    fn test_service_handles() {
        let recorder = Arc::new(PlanRecorder::new());
        let cluster = Cluster::new("prod", cluster_args(), DeployContext::new(recorder)).unwrap();

        let args = ServiceArgs {
            load_balancer: Some(LoadBalancerArgs {
                ports: vec![PortArgs {
                    listen: "80/http".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        let service = cluster.add_service("web", &args).unwrap();
        assert_eq!(service.name(), "web");
        assert!(service.load_balancer.is_some());
        assert_eq!(service.listeners.len(), 1);
        assert_eq!(service.target_groups.len(), 1);
        assert_eq!(service.log_groups.len(), 1);
        assert_eq!(service.url(), None);
        assert_eq!(service.hostname(), None);
    }

    #[test]
    fn test_logical_name_collision_rejected_before_create() {
        let recorder = Arc::new(PlanRecorder::new());
        let cluster = Cluster::new("prod", cluster_args(), DeployContext::new(recorder.clone())).unwrap();

        let args = ServiceArgs {
            containers: Some(vec![crate::config::ContainerArgs {
                name: Some("task".into()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        cluster.add_service("web", &args).unwrap();
        let created = recorder.len();

        // "web-logs" + "-task" clashes with "web" + "-logs-task"
        let err = cluster.add_service("web-logs", &ServiceArgs::default()).unwrap_err();
        assert_eq!(
            err,
            ClusterError::Configuration(ConfigurationError::ResourceNameCollision {
                service: "web-logs".into(),
                name: "web-logs-task".into(),
            })
        );
        assert_eq!(recorder.len(), created);
    }

    #[test]
    fn test_same_service_twice_rejected() {
        let recorder = Arc::new(PlanRecorder::new());
        let cluster = Cluster::new("prod", cluster_args(), DeployContext::new(recorder.clone())).unwrap();
        cluster.add_service("web", &ServiceArgs::default()).unwrap();
        assert!(matches!(
            cluster.add_service("web", &ServiceArgs::default()),
            Err(ClusterError::Configuration(ConfigurationError::ResourceNameCollision { .. }))
        ));
    }

    #[test]
    fn test_cluster_transform_reaches_services() {
        let recorder = Arc::new(PlanRecorder::new());
        let transforms = Transforms::new().on(ResourceKind::Service, |_, args| {
            args["enableExecuteCommand"] = json!(true);
        });
        let cluster =
            Cluster::with_transforms("prod", cluster_args(), transforms, DeployContext::new(recorder.clone()))
                .unwrap();
        cluster.add_service("web", &ServiceArgs::default()).unwrap();

        let calls = recorder.calls();
        let service = calls.iter().find(|c| c.kind == ResourceKind::Service).unwrap();
        assert_eq!(service.args["enableExecuteCommand"], json!(true));
    }
}
