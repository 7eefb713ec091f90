//! Turns a normalized service into the ordered list of resources that
//! implement it.
//!
//! Composition is pure: it builds the whole plan without calling the engine,
//! so a configuration problem discovered here never leaves a service
//! half-created.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::permissions::{policy_document, PermissionResolver, PolicyStatement};
use super::resources::{join, physical_name, reference, region, ResourceKind, ResourcePlan, ResourceRequest};
use crate::config::{
    ConfigurationError, HealthCheck, ImageSource, NamespaceArgs, NormalizedContainer,
    NormalizedLoadBalancer, NormalizedPort, NormalizedService, PortAction, PortProtocol,
    ProtocolFamily, VpcArgs,
};

/// Load balancer and target group names are limited to 32 characters
const LB_NAME_MAX: usize = 32;

const EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";

/// Cluster-level inputs every service composition needs
#[derive(Debug, Clone)]
pub struct ClusterContext<'a> {
    pub name: &'a str,
    /// Logical name of the cluster resource
    pub cluster_ref: &'a str,
    pub vpc: &'a VpcArgs,
}

impl ClusterContext<'_> {
    pub fn namespace(&self) -> Option<&NamespaceArgs> {
        self.vpc.cloudmap_namespace.as_ref()
    }
}

/// A role used by the task: supplied by the user or created here
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "lowercase")]
pub enum RoleBinding {
    /// Name or ARN, used verbatim
    Supplied(String),
    /// Logical name of the created role
    Created(String),
}

impl RoleBinding {
    fn arn(&self) -> Value {
        match self {
            RoleBinding::Supplied(role) => json!(role),
            RoleBinding::Created(name) => reference(name, "arn"),
        }
    }
}

/// Logical names of the resources composed for one service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLayout {
    pub log_groups: BTreeMap<String, String>,
    pub image_builds: BTreeMap<String, String>,
    pub execution_role: RoleBinding,
    pub task_role: RoleBinding,
    pub role_policies: Vec<String>,
    pub task_definition: String,
    pub security_group: Option<String>,
    pub load_balancer: Option<String>,
    pub certificate: Option<String>,
    /// Keyed by "{container}:{port}/{protocol}"
    pub target_groups: BTreeMap<String, String>,
    pub listeners: Vec<String>,
    pub listener_rules: Vec<String>,
    pub service_discovery: Option<String>,
    /// DNS name the service is reachable at inside the VPC
    pub hostname: Option<String>,
    pub service: String,
    pub scalable_target: String,
    pub scaling_policies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ComposedService {
    pub plan: ResourcePlan,
    pub layout: ServiceLayout,
}

fn target_key(container: &str, to: &PortProtocol) -> String {
    format!("{}:{}", container, to)
}

fn port_slug(port: &PortProtocol) -> String {
    format!("{}{}", port.port, port.protocol.as_str().replace('_', ""))
}

// ============================================================================
// Roles
// ============================================================================

fn assume_role_policy() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"Service": "ecs-tasks.amazonaws.com"},
            "Action": "sts:AssumeRole",
        }],
    })
}

fn secret_resource(value: &str) -> String {
    if value.starts_with("arn:") {
        value.to_string()
    } else {
        format!("arn:aws:ssm:*:*:parameter/{}", value.trim_start_matches('/'))
    }
}

fn compose_execution_role(
    plan: &mut ResourcePlan,
    layout_policies: &mut Vec<String>,
    service: &NormalizedService,
) -> RoleBinding {
    if let Some(role) = &service.execution_role {
        return RoleBinding::Supplied(role.clone());
    }

    let role = plan.push(ResourceRequest::new(
        ResourceKind::Role,
        format!("{}-execution-role", service.name),
        json!({
            "assumeRolePolicy": assume_role_policy(),
            "managedPolicyArns": [EXECUTION_POLICY_ARN],
        }),
    ));

    let mut secrets: Vec<String> = service
        .containers
        .iter()
        .flat_map(|c| c.ssm.values().map(|v| secret_resource(v)))
        .collect();
    secrets.sort();
    secrets.dedup();

    if !secrets.is_empty() {
        let statement = PolicyStatement {
            effect: "Allow",
            action: vec![
                "ssm:GetParameters".to_string(),
                "secretsmanager:GetSecretValue".to_string(),
                "kms:Decrypt".to_string(),
            ],
            resource: secrets,
        };
        layout_policies.push(plan.push(ResourceRequest::new(
            ResourceKind::RolePolicy,
            format!("{}-execution-policy", service.name),
            json!({
                "role": reference(&role, "name"),
                "policy": policy_document(&[statement]),
            }),
        )));
    }

    RoleBinding::Created(role)
}

fn compose_task_role(
    plan: &mut ResourcePlan,
    layout_policies: &mut Vec<String>,
    service: &NormalizedService,
    link_statements: Vec<PolicyStatement>,
) -> RoleBinding {
    if let Some(role) = &service.task_role {
        return RoleBinding::Supplied(role.clone());
    }

    let role = plan.push(ResourceRequest::new(
        ResourceKind::Role,
        format!("{}-task-role", service.name),
        json!({ "assumeRolePolicy": assume_role_policy() }),
    ));

    let statements: Vec<PolicyStatement> = link_statements
        .into_iter()
        .chain(service.permissions.iter().map(PolicyStatement::from))
        .collect();

    if !statements.is_empty() {
        layout_policies.push(plan.push(ResourceRequest::new(
            ResourceKind::RolePolicy,
            format!("{}-task-policy", service.name),
            json!({
                "role": reference(&role, "name"),
                "policy": policy_document(&statements),
            }),
        )));
    }

    RoleBinding::Created(role)
}

// ============================================================================
// Task definition
// ============================================================================

fn volume_name(container: &str, index: usize) -> String {
    format!("{}-volume-{}", container, index)
}

fn container_definition(
    service: &NormalizedService,
    container: &NormalizedContainer,
    image: Value,
    log_group: &str,
    link_environment: &BTreeMap<String, String>,
    port_mappings: Vec<Value>,
) -> Value {
    let mut environment = link_environment.clone();
    environment.extend(container.environment.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut definition = Map::new();
    definition.insert("name".into(), json!(container.name));
    definition.insert("image".into(), image);
    definition.insert("essential".into(), json!(true));
    definition.insert(
        "environment".into(),
        environment
            .iter()
            .map(|(name, value)| json!({"name": name, "value": value}))
            .collect(),
    );
    definition.insert(
        "secrets".into(),
        container
            .ssm
            .iter()
            .map(|(name, from)| json!({"name": name, "valueFrom": from}))
            .collect(),
    );
    definition.insert("portMappings".into(), Value::Array(port_mappings));
    definition.insert(
        "logConfiguration".into(),
        json!({
            "logDriver": "awslogs",
            "options": {
                "awslogs-group": reference(log_group, "name"),
                "awslogs-region": region(),
                "awslogs-stream-prefix": service.name,
            },
        }),
    );
    definition.insert(
        "mountPoints".into(),
        container
            .volumes
            .iter()
            .enumerate()
            .map(|(i, v)| json!({"sourceVolume": volume_name(&container.name, i), "containerPath": v.path}))
            .collect(),
    );

    if let Some(cpu) = container.cpu {
        definition.insert("cpu".into(), json!(cpu.units()));
    }
    if let Some(memory) = container.memory {
        definition.insert("memory".into(), json!(memory.mib()));
    }
    if let Some(command) = &container.command {
        definition.insert("command".into(), json!(command));
    }
    if let Some(entrypoint) = &container.entrypoint {
        definition.insert("entryPoint".into(), json!(entrypoint));
    }
    if let Some(health) = &container.health {
        definition.insert(
            "healthCheck".into(),
            json!({
                "command": health.command,
                "startPeriod": health.start_period.as_secs(),
                "timeout": health.timeout.as_secs(),
                "interval": health.interval.as_secs(),
                "retries": health.retries,
            }),
        );
    }

    Value::Object(definition)
}

fn port_mappings_for(service: &NormalizedService, container: &NormalizedContainer) -> Vec<Value> {
    let mut ports: Vec<PortProtocol> = service
        .load_balancer
        .as_ref()
        .map(|lb| {
            lb.forward_targets()
                .into_iter()
                .filter(|(name, _)| *name == container.name)
                .map(|(_, to)| to)
                .collect()
        })
        .unwrap_or_default();

    // the registry port is served by the first container
    if let Some(port) = service.service_registry_port {
        let is_first = service.containers.first().map(|c| c.name == container.name) == Some(true);
        if is_first && !ports.iter().any(|p| p.port == port) {
            ports.push(PortProtocol::new(port, crate::config::Protocol::Tcp));
        }
    }

    ports
        .iter()
        .flat_map(|p| {
            p.protocol
                .transport_protocols()
                .iter()
                .map(move |proto| json!({"containerPort": p.port, "protocol": proto}))
        })
        .collect()
}

fn task_volumes(service: &NormalizedService) -> Vec<Value> {
    service
        .containers
        .iter()
        .flat_map(|c| {
            c.volumes.iter().enumerate().map(move |(i, volume)| {
                let mut efs = json!({
                    "fileSystemId": volume.efs.file_system,
                    "transitEncryption": "ENABLED",
                });
                if let Some(access_point) = &volume.efs.access_point {
                    efs["authorizationConfig"] = json!({"accessPointId": access_point, "iam": "ENABLED"});
                }
                json!({"name": volume_name(&c.name, i), "efsVolumeConfiguration": efs})
            })
        })
        .collect()
}

// ============================================================================
// Load balancer
// ============================================================================

fn health_check_args(check: &HealthCheck, target: &PortProtocol) -> Value {
    let mut args = json!({
        "enabled": true,
        "protocol": match target.family() {
            ProtocolFamily::Application => target.protocol.listener_protocol(),
            ProtocolFamily::Network => "TCP",
        },
        "interval": check.interval.as_secs(),
        "timeout": check.timeout.as_secs(),
        "healthyThreshold": check.healthy_threshold,
        "unhealthyThreshold": check.unhealthy_threshold,
    });
    if let Some(path) = &check.path {
        args["path"] = json!(path);
    }
    if let Some(codes) = &check.success_codes {
        args["matcher"] = json!(codes);
    }
    args
}

fn port_action(port: &NormalizedPort, target_groups: &BTreeMap<String, String>) -> Value {
    match &port.action {
        PortAction::Forward { to, container } => {
            let group = target_groups
                .get(&target_key(container, to))
                .map(|name| reference(name, "arn"))
                .unwrap_or(Value::Null);
            json!({"type": "forward", "targetGroupArn": group})
        }
        PortAction::Redirect { to } => json!({
            "type": "redirect",
            "redirect": {
                "port": to.port.to_string(),
                "protocol": to.protocol.listener_protocol(),
                "statusCode": "HTTP_301",
            },
        }),
    }
}

fn fixed_forbidden() -> Value {
    json!({
        "type": "fixed-response",
        "fixedResponse": {"contentType": "text/plain", "messageBody": "Forbidden", "statusCode": "403"},
    })
}

struct LoadBalancerLayout {
    security_group: String,
    load_balancer: String,
    certificate: Option<String>,
    target_groups: BTreeMap<String, String>,
    listeners: Vec<String>,
    listener_rules: Vec<String>,
}

fn compose_load_balancer(
    plan: &mut ResourcePlan,
    cluster: &ClusterContext<'_>,
    service: &NormalizedService,
    lb: &NormalizedLoadBalancer,
) -> LoadBalancerLayout {
    let prefix = &service.name;

    let ingress: Vec<Value> = {
        let mut seen = Vec::new();
        for port in &lb.ports {
            for proto in port.listen.protocol.transport_protocols() {
                let rule = json!({
                    "protocol": proto,
                    "fromPort": port.listen.port,
                    "toPort": port.listen.port,
                    "cidrBlocks": ["0.0.0.0/0"],
                });
                if !seen.contains(&rule) {
                    seen.push(rule);
                }
            }
        }
        seen
    };
    let security_group = plan.push(ResourceRequest::new(
        ResourceKind::SecurityGroup,
        format!("{}-lb-security-group", prefix),
        json!({
            "vpcId": cluster.vpc.id,
            "ingress": ingress,
            "egress": [{"protocol": "-1", "fromPort": 0, "toPort": 0, "cidrBlocks": ["0.0.0.0/0"]}],
        }),
    ));

    let load_balancer = plan.push(ResourceRequest::new(
        ResourceKind::LoadBalancer,
        format!("{}-load-balancer", prefix),
        json!({
            "name": physical_name(&format!("{}-{}", cluster.name, prefix), LB_NAME_MAX),
            "loadBalancerType": lb.load_balancer_type(),
            "internal": !lb.public,
            "subnets": cluster.vpc.load_balancer_subnets,
            "securityGroups": [reference(&security_group, "id")],
        }),
    ));

    let mut certificate = None;
    let certificate_arn = if lb.needs_certificate() {
        match &lb.domain {
            Some(domain) => match domain.cert() {
                Some(cert) => Some(json!(cert)),
                None => {
                    let name = plan.push(ResourceRequest::new(
                        ResourceKind::Certificate,
                        format!("{}-certificate", prefix),
                        json!({"domainName": domain.name(), "validationMethod": "DNS"}),
                    ));
                    let arn = reference(&name, "arn");
                    certificate = Some(name);
                    Some(arn)
                }
            },
            None => {
                warn!(
                    "Service '{}' has secure listeners but no domain; no certificate is attached",
                    service.name
                );
                None
            }
        }
    } else {
        None
    };

    let mut target_groups = BTreeMap::new();
    for (container, to) in lb.forward_targets() {
        let key = target_key(&container, &to);
        let mut args = json!({
            "name": physical_name(
                &format!("{}-{}-{}-{}", cluster.name, prefix, container, port_slug(&to)),
                LB_NAME_MAX,
            ),
            "port": to.port,
            "protocol": to.protocol.listener_protocol(),
            "targetType": "ip",
            "vpcId": cluster.vpc.id,
        });
        if let Some(check) = lb.health.get(&to.to_string()) {
            args["healthCheck"] = health_check_args(check, &to);
        }
        let name = plan.push(ResourceRequest::new(
            ResourceKind::TargetGroup,
            format!("{}-target-{}-{}", prefix, container, port_slug(&to)),
            args,
        ));
        target_groups.insert(key, name);
    }

    // one listener per listen port, in first-seen order
    let mut groups: Vec<(PortProtocol, Vec<&NormalizedPort>)> = Vec::new();
    for port in &lb.ports {
        match groups.iter_mut().find(|(listen, _)| *listen == port.listen) {
            Some((_, ports)) => ports.push(port),
            None => groups.push((port.listen, vec![port])),
        }
    }

    let mut listeners = Vec::new();
    let mut listener_rules = Vec::new();
    for (listen, ports) in groups {
        let default_action = ports
            .iter()
            .find(|p| p.path.is_none())
            .map(|p| port_action(p, &target_groups))
            .unwrap_or_else(fixed_forbidden);

        let mut args = json!({
            "loadBalancerArn": reference(&load_balancer, "arn"),
            "port": listen.port,
            "protocol": listen.protocol.listener_protocol(),
            "defaultActions": [default_action],
        });
        if listen.protocol.is_secure() {
            if let Some(arn) = &certificate_arn {
                args["certificateArn"] = arn.clone();
            }
        }
        let listener = plan.push(ResourceRequest::new(
            ResourceKind::Listener,
            format!("{}-listener-{}", prefix, port_slug(&listen)),
            args,
        ));

        for (i, port) in ports.iter().filter(|p| p.path.is_some()).enumerate() {
            let rule = plan.push(ResourceRequest::new(
                ResourceKind::ListenerRule,
                format!("{}-rule-{}-{}", prefix, port_slug(&listen), i + 1),
                json!({
                    "listenerArn": reference(&listener, "arn"),
                    "priority": (i + 1) * 100,
                    "conditions": [{"pathPattern": {"values": [port.path]}}],
                    "actions": [port_action(port, &target_groups)],
                }),
            ));
            listener_rules.push(rule);
        }
        listeners.push(listener);
    }

    LoadBalancerLayout {
        security_group,
        load_balancer,
        certificate,
        target_groups,
        listeners,
        listener_rules,
    }
}

// ============================================================================
// Service discovery, service and scaling
// ============================================================================

fn compose_service_discovery(
    plan: &mut ResourcePlan,
    cluster: &ClusterContext<'_>,
    service: &NormalizedService,
    namespace: &NamespaceArgs,
) -> (String, String) {
    let mut records = vec![json!({"type": "A", "ttl": 60})];
    if service.service_registry_port.is_some() {
        records.push(json!({"type": "SRV", "ttl": 60}));
    }

    let name = plan.push(ResourceRequest::new(
        ResourceKind::ServiceDiscovery,
        format!("{}-discovery", service.name),
        json!({
            "name": format!("{}.{}", service.name, cluster.name),
            "namespaceId": namespace.id,
            "dnsConfig": {
                "namespaceId": namespace.id,
                "routingPolicy": "MULTIVALUE",
                "dnsRecords": records,
            },
            "healthCheckCustomConfig": {"failureThreshold": 1},
        }),
    ));
    let hostname = format!("{}.{}.{}", service.name, cluster.name, namespace.name);
    (name, hostname)
}

fn capacity_args(service: &NormalizedService) -> (&'static str, Value) {
    if service.capacity.is_empty() {
        return ("launchType", json!("FARGATE"));
    }
    let strategies: Vec<Value> = service
        .capacity
        .iter()
        .map(|c| json!({"capacityProvider": c.provider, "weight": c.weight, "base": c.base}))
        .collect();
    ("capacityProviderStrategies", Value::Array(strategies))
}

fn target_tracking(
    service: &NormalizedService,
    target: &str,
    suffix: &str,
    metric: Value,
    value: f64,
) -> ResourceRequest {
    ResourceRequest::new(
        ResourceKind::ScalingPolicy,
        format!("{}-scaling-{}", service.name, suffix),
        json!({
            "policyType": "TargetTrackingScaling",
            "resourceId": reference(target, "resourceId"),
            "scalableDimension": reference(target, "scalableDimension"),
            "serviceNamespace": reference(target, "serviceNamespace"),
            "targetTrackingScalingPolicyConfiguration": {
                "predefinedMetricSpecification": metric,
                "targetValue": value,
                "scaleInCooldown": service.scaling.scale_in_cooldown.as_secs(),
                "scaleOutCooldown": service.scaling.scale_out_cooldown.as_secs(),
            },
        }),
    )
}

/// Compose every resource of `service` in creation order.
///
/// The permission resolver is only consulted for created task roles; link
/// environment variables are applied either way.
pub fn compose_service(
    cluster: &ClusterContext<'_>,
    service: &NormalizedService,
    resolver: &dyn PermissionResolver,
) -> Result<ComposedService, ConfigurationError> {
    if service.service_registry_port.is_some() && cluster.namespace().is_none() {
        return Err(ConfigurationError::MissingServiceDiscoveryNamespace(
            service.name.clone(),
        ));
    }

    let grant = if service.link.is_empty() {
        Default::default()
    } else {
        resolver.resolve(&service.link)?
    };

    let mut plan = ResourcePlan::new();
    let prefix = &service.name;

    let mut log_groups = BTreeMap::new();
    for container in &service.containers {
        let name = plan.push(ResourceRequest::new(
            ResourceKind::LogGroup,
            format!("{}-logs-{}", prefix, container.name),
            json!({
                "name": format!("/ecsform/cluster/{}/{}/{}", cluster.name, prefix, container.name),
                "retentionInDays": container.log_retention_days,
            }),
        ));
        log_groups.insert(container.name.clone(), name);
    }

    let platform = match service.architecture.cpu_architecture() {
        "ARM64" => "linux/arm64",
        _ => "linux/amd64",
    };
    let mut image_builds = BTreeMap::new();
    for container in &service.containers {
        if let ImageSource::Build {
            context,
            dockerfile,
            args,
            target,
        } = &container.image
        {
            let mut build = json!({
                "context": {"location": context},
                "dockerfile": {"location": format!("{}/{}", context.trim_end_matches('/'), dockerfile)},
                "buildArgs": args,
                "platforms": [platform],
                "push": true,
            });
            if let Some(target) = target {
                build["target"] = json!(target);
            }
            let name = plan.push(ResourceRequest::new(
                ResourceKind::ImageBuild,
                format!("{}-image-{}", prefix, container.name),
                build,
            ));
            image_builds.insert(container.name.clone(), name);
        }
    }

    let mut role_policies = Vec::new();
    let execution_role = compose_execution_role(&mut plan, &mut role_policies, service);
    let link_statements = if service.task_role.is_none() {
        grant.permissions.iter().map(PolicyStatement::from).collect()
    } else {
        Vec::new()
    };
    let task_role = compose_task_role(&mut plan, &mut role_policies, service, link_statements);

    let definitions: Vec<Value> = service
        .containers
        .iter()
        .map(|container| {
            let image = match (&container.image, image_builds.get(&container.name)) {
                (_, Some(build)) => reference(build, "ref"),
                (ImageSource::Tag { image }, None) => json!(image),
                (ImageSource::Build { .. }, None) => Value::Null,
            };
            let log_group = log_groups.get(&container.name).map(String::as_str).unwrap_or_default();
            container_definition(
                service,
                container,
                image,
                log_group,
                &grant.environment,
                port_mappings_for(service, container),
            )
        })
        .collect();

    let task_definition = plan.push(ResourceRequest::new(
        ResourceKind::TaskDefinition,
        format!("{}-task", prefix),
        json!({
            "family": format!("{}-{}", cluster.name, prefix),
            "cpu": service.cpu.units().to_string(),
            "memory": service.memory.mib().to_string(),
            "networkMode": "awsvpc",
            "requiresCompatibilities": ["FARGATE"],
            "runtimePlatform": {
                "cpuArchitecture": service.architecture.cpu_architecture(),
                "operatingSystemFamily": "LINUX",
            },
            "ephemeralStorage": {"sizeInGib": service.storage.gib()},
            "executionRoleArn": execution_role.arn(),
            "taskRoleArn": task_role.arn(),
            "volumes": task_volumes(service),
            "containerDefinitions": definitions,
        }),
    ));

    let lb_layout = service
        .load_balancer
        .as_ref()
        .map(|lb| compose_load_balancer(&mut plan, cluster, service, lb));

    let discovery = cluster
        .namespace()
        .map(|namespace| compose_service_discovery(&mut plan, cluster, service, namespace));

    let (capacity_key, capacity_value) = capacity_args(service);
    let mut service_args = json!({
        "name": prefix,
        "cluster": reference(cluster.cluster_ref, "arn"),
        "taskDefinition": reference(&task_definition, "arn"),
        "desiredCount": service.scaling.min,
        "networkConfiguration": {
            "subnets": cluster.vpc.container_subnets,
            "securityGroups": cluster.vpc.security_groups,
            "assignPublicIp": false,
        },
        "waitForSteadyState": service.wait,
    });
    service_args[capacity_key] = capacity_value;

    if let Some(layout) = &lb_layout {
        let attachments: Vec<Value> = layout
            .target_groups
            .iter()
            .filter_map(|(key, group)| {
                let (container, target) = key.split_once(':')?;
                let port = PortProtocol::parse(target).ok()?;
                Some(json!({
                    "targetGroupArn": reference(group, "arn"),
                    "containerName": container,
                    "containerPort": port.port,
                }))
            })
            .collect();
        service_args["loadBalancers"] = Value::Array(attachments);
    }
    if let Some((registry, _)) = &discovery {
        let mut registries = json!({"registryArn": reference(registry, "arn")});
        if let (Some(port), Some(first)) = (service.service_registry_port, service.containers.first()) {
            registries["port"] = json!(port);
            registries["containerName"] = json!(first.name);
        }
        service_args["serviceRegistries"] = registries;
    }

    let mut ecs_service = ResourceRequest::new(ResourceKind::Service, format!("{}-service", prefix), service_args);
    if let Some(layout) = &lb_layout {
        for listener in layout.listeners.iter().chain(&layout.listener_rules) {
            ecs_service = ecs_service.depends_on(listener.clone());
        }
    }
    let ecs_service = plan.push(ecs_service);

    let scalable_target = plan.push(
        ResourceRequest::new(
            ResourceKind::ScalableTarget,
            format!("{}-scaling-target", prefix),
            json!({
                "serviceNamespace": "ecs",
                "scalableDimension": "ecs:service:DesiredCount",
                "resourceId": format!("service/{}/{}", cluster.name, prefix),
                "minCapacity": service.scaling.min,
                "maxCapacity": service.scaling.max,
            }),
        )
        .depends_on(ecs_service.clone()),
    );

    let mut scaling_policies = Vec::new();
    if let Some(value) = service.scaling.cpu_utilization {
        scaling_policies.push(plan.push(target_tracking(
            service,
            &scalable_target,
            "cpu",
            json!({"predefinedMetricType": "ECSServiceAverageCPUUtilization"}),
            value,
        )));
    }
    if let Some(value) = service.scaling.memory_utilization {
        scaling_policies.push(plan.push(target_tracking(
            service,
            &scalable_target,
            "memory",
            json!({"predefinedMetricType": "ECSServiceAverageMemoryUtilization"}),
            value,
        )));
    }
    if let (Some(count), Some(layout)) = (service.scaling.request_count, &lb_layout) {
        if let Some(group) = layout.target_groups.values().next() {
            let label = join(vec![
                reference(&layout.load_balancer, "arnSuffix"),
                json!("/"),
                reference(group, "arnSuffix"),
            ]);
            scaling_policies.push(plan.push(target_tracking(
                service,
                &scalable_target,
                "requests",
                json!({"predefinedMetricType": "ALBRequestCountPerTarget", "resourceLabel": label}),
                f64::from(count),
            )));
        }
    }

    debug!("Composed {} resource(s) for service '{}'", plan.len(), service.name);

    let (service_discovery, hostname) = match discovery {
        Some((name, hostname)) => (Some(name), Some(hostname)),
        None => (None, None),
    };
    let layout = ServiceLayout {
        log_groups,
        image_builds,
        execution_role,
        task_role,
        role_policies,
        task_definition,
        security_group: lb_layout.as_ref().map(|l| l.security_group.clone()),
        load_balancer: lb_layout.as_ref().map(|l| l.load_balancer.clone()),
        certificate: lb_layout.as_ref().and_then(|l| l.certificate.clone()),
        target_groups: lb_layout.as_ref().map(|l| l.target_groups.clone()).unwrap_or_default(),
        listeners: lb_layout.as_ref().map(|l| l.listeners.clone()).unwrap_or_default(),
        listener_rules: lb_layout.map(|l| l.listener_rules).unwrap_or_default(),
        service_discovery,
        hostname,
        service: ecs_service,
        scalable_target,
        scaling_policies,
    };

    Ok(ComposedService { plan, layout })
}
