//! Integration tests for building clusters and services through the public API
//!
//! Every test runs against a `PlanRecorder`, which records resource calls
//! instead of creating anything and rejects out-of-order dependencies.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use ecsform::cluster::{
    PlanRecorder, ProviderError, ResourceHandle, ResourceKind, ResourceProvider, ResourceRequest,
    StaticPermissions, Transforms, VersioningError,
};
use ecsform::config::{
    ContainerArgs, ImageArgs, LinkGrant, LoadBalancerArgs, NamespaceArgs, PermissionArgs,
    PortArgs, ScalingArgs, ServiceRegistryArgs,
};
use ecsform::{Cluster, ClusterArgs, ClusterError, ConfigurationError, DeployContext, ServiceArgs, VpcArgs};

fn vpc() -> VpcArgs {
    VpcArgs {
        id: "vpc-0a1b2c".to_string(),
        load_balancer_subnets: vec!["subnet-pub-a".to_string(), "subnet-pub-b".to_string()],
        container_subnets: vec!["subnet-priv-a".to_string(), "subnet-priv-b".to_string()],
        security_groups: vec!["sg-tasks".to_string()],
        cloudmap_namespace: Some(NamespaceArgs {
            id: "ns-123".to_string(),
            name: "internal.acme".to_string(),
        }),
    }
}

fn new_cluster(recorder: &Arc<PlanRecorder>) -> Cluster {
    let context = DeployContext::new(recorder.clone());
    Cluster::new("prod", ClusterArgs::new(vpc()), context).expect("cluster should be created")
}

fn image(tag: &str) -> Option<ImageArgs> {
    Some(ImageArgs::Tag(tag.to_string()))
}

fn listen(port: &str) -> PortArgs {
    PortArgs {
        listen: port.to_string(),
        ..Default::default()
    }
}

fn web_service(ports: Vec<PortArgs>) -> ServiceArgs {
    let mut args = ServiceArgs {
        cpu: Some("1 vCPU".to_string()),
        memory: Some("4 GB".to_string()),
        load_balancer: Some(LoadBalancerArgs {
            ports,
            ..Default::default()
        }),
        ..Default::default()
    };
    args.container.image = image("nginx:1.27");
    args
}

/// Provider that fails on one resource kind and records the rest
struct FailOn {
    kind: ResourceKind,
    inner: PlanRecorder,
}

impl ResourceProvider for FailOn {
    fn create(&self, request: &ResourceRequest) -> Result<ResourceHandle, ProviderError> {
        if request.kind == self.kind {
            return Err(ProviderError::new(&request.name, "AccessDenied: not authorized"));
        }
        self.inner.create(request)
    }
}

#[test]
fn test_supported_size_is_accepted() {
    let recorder = Arc::new(PlanRecorder::new());
    let cluster = new_cluster(&recorder);

    let service = cluster
        .add_service("web", &web_service(vec![listen("80/http")]))
        .unwrap();
    assert_eq!(service.config.cpu.to_string(), "1 vCPU");
    assert_eq!(service.config.memory.to_string(), "4 GB");

    let calls = recorder.calls();
    let task = calls.iter().find(|c| c.kind == ResourceKind::TaskDefinition).unwrap();
    assert_eq!(task.args["cpu"], json!("1024"));
    assert_eq!(task.args["memory"], json!("4096"));
}

#[test]
fn test_unsupported_size_creates_no_service_resources() {
    let recorder = Arc::new(PlanRecorder::new());
    let cluster = new_cluster(&recorder);

    let mut args = web_service(vec![listen("80/http")]);
    args.memory = Some("20 GB".to_string());
    let result = cluster.add_service("web", &args);

    assert!(matches!(
        result,
        Err(ClusterError::Configuration(ConfigurationError::InvalidSizeCombination { .. }))
    ));
    assert_eq!(recorder.len(), 1, "only the cluster itself was created");
}

#[test]
fn test_http_and_https_listeners_without_domain() {
    let recorder = Arc::new(PlanRecorder::new());
    let cluster = new_cluster(&recorder);

    let ports = vec![
        listen("80/http"),
        PortArgs {
            listen: "443/https".to_string(),
            forward: Some("80/http".to_string()),
            ..Default::default()
        },
    ];
    let service = cluster.add_service("web", &web_service(ports)).unwrap();

    assert_eq!(service.listeners.len(), 2);
    assert_eq!(service.target_groups.len(), 1);
    let calls = recorder.calls();
    for listener in calls.iter().filter(|c| c.kind == ResourceKind::Listener) {
        assert_eq!(listener.args["defaultActions"][0]["type"], json!("forward"));
    }
}

#[test]
fn test_mixed_protocol_families_rejected() {
    let recorder = Arc::new(PlanRecorder::new());
    let cluster = new_cluster(&recorder);

    let result = cluster.add_service("web", &web_service(vec![listen("80/http"), listen("53/udp")]));
    assert_eq!(
        result.unwrap_err(),
        ClusterError::Configuration(ConfigurationError::MixedProtocolFamily)
    );
    assert_eq!(recorder.len(), 1);
}

#[test]
fn test_container_target_inference() {
    let recorder = Arc::new(PlanRecorder::new());
    let cluster = new_cluster(&recorder);

    let containers = vec![
        ContainerArgs {
            name: Some("app".to_string()),
            fields: ecsform::config::ContainerFields {
                image: image("acme/app:3"),
                ..Default::default()
            },
            ..Default::default()
        },
        ContainerArgs {
            name: Some("envoy".to_string()),
            fields: ecsform::config::ContainerFields {
                image: image("envoyproxy/envoy:v1.30"),
                ..Default::default()
            },
            ..Default::default()
        },
    ];
    let args = ServiceArgs {
        containers: Some(containers),
        load_balancer: Some(LoadBalancerArgs {
            ports: vec![listen("80/http")],
            ..Default::default()
        }),
        ..Default::default()
    };
    assert!(matches!(
        cluster.add_service("mesh", &args),
        Err(ClusterError::Configuration(ConfigurationError::AmbiguousContainerTarget(_, 2)))
    ));

    let mut args = args;
    if let Some(lb) = args.load_balancer.as_mut() {
        lb.ports[0].container = Some("envoy".to_string());
    }
    let service = cluster.add_service("mesh", &args).unwrap();
    assert_eq!(service.layout.target_groups.keys().next().unwrap(), "envoy:80/http");
}

#[test]
fn test_single_container_is_inferred() {
    let recorder = Arc::new(PlanRecorder::new());
    let cluster = new_cluster(&recorder);

    let service = cluster
        .add_service("web", &web_service(vec![listen("8080/http")]))
        .unwrap();
    let port = &service.config.load_balancer.as_ref().unwrap().ports[0];
    let (to, container) = port.forward().unwrap();
    assert_eq!(to.to_string(), "8080/http");
    assert_eq!(container, "web");
}

#[test]
fn test_service_without_load_balancer() {
    let recorder = Arc::new(PlanRecorder::new());
    let cluster = new_cluster(&recorder);

    let mut args = ServiceArgs::default();
    args.container.image = image("acme/worker:7");
    args.scaling = Some(ScalingArgs {
        min: Some(1),
        max: Some(10),
        memory_utilization: Some(75.0),
        ..Default::default()
    });
    let service = cluster.add_service("worker", &args).unwrap();

    assert!(service.load_balancer.is_none());
    assert!(service.listeners.is_empty());
    assert_eq!(service.hostname(), Some("worker.prod.internal.acme"));

    let calls = recorder.calls();
    let policies: Vec<_> = calls.iter().filter(|c| c.kind == ResourceKind::ScalingPolicy).collect();
    assert_eq!(policies.len(), 1);
    assert_eq!(
        policies[0].args["targetTrackingScalingPolicyConfiguration"]["targetValue"],
        json!(75.0)
    );
}

#[test]
fn test_service_registry_srv_record() {
    let recorder = Arc::new(PlanRecorder::new());
    let cluster = new_cluster(&recorder);

    let mut args = ServiceArgs::default();
    args.container.image = image("acme/grpc:1");
    args.service_registry = Some(ServiceRegistryArgs { port: 50051 });
    let service = cluster.add_service("grpc", &args).unwrap();
    assert!(service.service_discovery.is_some());

    let calls = recorder.calls();
    let ecs = calls.iter().find(|c| c.kind == ResourceKind::Service).unwrap();
    assert_eq!(ecs.args["serviceRegistries"]["port"], json!(50051));
    let task = calls.iter().find(|c| c.kind == ResourceKind::TaskDefinition).unwrap();
    assert_eq!(
        task.args["containerDefinitions"][0]["portMappings"][0]["containerPort"],
        json!(50051)
    );
}

#[test]
fn test_link_permissions_flow_into_task_role() {
    let recorder = Arc::new(PlanRecorder::new());
    let grants = BTreeMap::from([(
        "queue".to_string(),
        LinkGrant {
            permissions: vec![PermissionArgs {
                effect: Default::default(),
                actions: vec!["sqs:SendMessage".to_string()],
                resources: vec!["arn:aws:sqs:us-east-1:123:jobs".to_string()],
            }],
            environment: BTreeMap::from([("QUEUE_URL".to_string(), "https://sqs/jobs".to_string())]),
        },
    )]);
    let context = DeployContext::new(recorder.clone())
        .with_permissions(Arc::new(StaticPermissions::new(grants)));
    let cluster = Cluster::new("prod", ClusterArgs::new(vpc()), context).unwrap();

    let mut args = ServiceArgs::default();
    args.container.image = image("acme/api:2");
    args.link = vec!["queue".to_string()];
    cluster.add_service("api", &args).unwrap();

    let calls = recorder.calls();
    let policy = calls.iter().find(|c| c.name == "api-task-policy").unwrap();
    assert_eq!(policy.args["policy"]["Statement"][0]["Action"][0], json!("sqs:SendMessage"));
    let task = calls.iter().find(|c| c.kind == ResourceKind::TaskDefinition).unwrap();
    assert_eq!(
        task.args["containerDefinitions"][0]["environment"][0]["name"],
        json!("QUEUE_URL")
    );
}

#[test]
fn test_provider_failure_propagates_unchanged() {
    let provider = Arc::new(FailOn {
        kind: ResourceKind::LoadBalancer,
        inner: PlanRecorder::new(),
    });
    let cluster = Cluster::new("prod", ClusterArgs::new(vpc()), DeployContext::new(provider)).unwrap();

    let err = cluster
        .add_service("web", &web_service(vec![listen("80/http")]))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to create web-load-balancer: AccessDenied: not authorized"
    );
    assert!(matches!(err, ClusterError::Provider(_)));
}

#[test]
fn test_layout_versioning() {
    let recorder = Arc::new(PlanRecorder::new());
    let old = DeployContext::new(recorder.clone()).with_deployed_version(Some(1));
    let err = Cluster::new("prod", ClusterArgs::new(vpc()), old).unwrap_err();
    assert!(matches!(
        err,
        ClusterError::Versioning(VersioningError::BreakingVersionChange { deployed: 1, current: 2, .. })
    ));
    assert!(recorder.is_empty());

    let forced = DeployContext::new(recorder.clone()).with_deployed_version(Some(1));
    let cluster = Cluster::new("prod", ClusterArgs::new(vpc()).with_force_upgrade("v2"), forced).unwrap();
    assert_eq!(cluster.layout_version(), 2);
}

#[test]
fn test_service_transform_applied_before_create() {
    let recorder = Arc::new(PlanRecorder::new());
    let cluster = new_cluster(&recorder);

    let transforms = Transforms::new().on(ResourceKind::LoadBalancer, |_, args| {
        args["idleTimeout"] = json!(120);
    });
    cluster
        .add_service_with("web", &web_service(vec![listen("80/http")]), &transforms)
        .unwrap();

    let calls = recorder.calls();
    let lb = calls.iter().find(|c| c.kind == ResourceKind::LoadBalancer).unwrap();
    assert_eq!(lb.args["idleTimeout"], json!(120));
}

#[test]
fn test_non_ascii_container_name_rejected() {
    let recorder = Arc::new(PlanRecorder::new());
    let cluster = new_cluster(&recorder);

    let args = ServiceArgs {
        containers: Some(vec![ContainerArgs {
            name: Some("日本語日本語日本語".to_string()),
            fields: ecsform::config::ContainerFields {
                image: image("nginx"),
                ..Default::default()
            },
            ..Default::default()
        }]),
        load_balancer: Some(LoadBalancerArgs {
            ports: vec![listen("80/http")],
            ..Default::default()
        }),
        ..Default::default()
    };
    assert_eq!(
        cluster.add_service("web", &args).unwrap_err(),
        ClusterError::Configuration(ConfigurationError::InvalidContainerName(
            "日本語日本語日本語".to_string()
        ))
    );
    assert_eq!(recorder.len(), 1);
}

#[test]
fn test_oversized_cooldown_rejected() {
    let recorder = Arc::new(PlanRecorder::new());
    let cluster = new_cluster(&recorder);

    let mut args = ServiceArgs::default();
    args.container.image = image("nginx");
    args.scaling = Some(ScalingArgs {
        scale_in_cooldown: Some("1000000000000000000 days".to_string()),
        ..Default::default()
    });
    assert!(matches!(
        cluster.add_service("web", &args),
        Err(ClusterError::Configuration(ConfigurationError::InvalidDuration(_)))
    ));
}
