//! Command implementations for the CLI
//!
//! SBIO pattern: the planning and validation steps are pure; only the
//! `run_*` functions touch the file system.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::{PlanArgs, ValidateArgs};
use crate::cluster::{
    Cluster, ClusterError, DeployContext, PlanRecorder, ResourceRequest, StaticPermissions,
    Transforms, LAYOUT_VERSION,
};
use crate::config::{
    load_manifest_file, normalize_service, ConfigError, ConfigurationError, Manifest,
    NormalizedService,
};
use crate::state::{load_state_from, resolve_state_path, save_state_to, StateError};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid service '{0}': {1}")]
    Service(String, ConfigurationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Normalized services of a manifest
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub cluster: String,
    pub services: Vec<NormalizedService>,
}

/// Per-service summary of a plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub name: String,
    pub resources: usize,
    pub load_balancer: Option<String>,
    pub url: Option<String>,
    pub hostname: Option<String>,
}

/// Resource calls issued for a manifest, in order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    pub cluster: String,
    pub layout_version: u32,
    pub services: Vec<ServiceSummary>,
    pub calls: Vec<ResourceRequest>,
}

// ============================================================================
// Pure business logic
// ============================================================================

/// Normalize every service of a manifest.
pub fn validate_services(manifest: &Manifest) -> CommandResult<ValidationReport> {
    let services = manifest
        .services
        .iter()
        .map(|(name, service)| {
            normalize_service(name, &service.args)
                .map_err(|e| CommandError::Service(name.clone(), e))
        })
        .collect::<CommandResult<Vec<_>>>()?;

    Ok(ValidationReport {
        cluster: manifest.cluster.name.clone(),
        services,
    })
}

/// Run the whole construction against a `PlanRecorder`.
pub fn plan_manifest(manifest: &Manifest, deployed_version: Option<u32>) -> CommandResult<PlanReport> {
    let cluster_transforms = Transforms::from_patches(&manifest.cluster.transform)?;
    let service_transforms = manifest
        .services
        .iter()
        .map(|(name, service)| -> CommandResult<(&str, Transforms)> {
            Ok((name.as_str(), Transforms::from_patches(&service.transform)?))
        })
        .collect::<CommandResult<BTreeMap<_, _>>>()?;

    let recorder = Arc::new(PlanRecorder::new());
    let context = DeployContext::new(recorder.clone())
        .with_permissions(Arc::new(StaticPermissions::new(manifest.links.clone())))
        .with_deployed_version(deployed_version);

    let cluster = Cluster::with_transforms(
        &manifest.cluster.name,
        manifest.cluster.args.clone(),
        cluster_transforms,
        context,
    )?;

    let mut services = Vec::with_capacity(manifest.services.len());
    for (name, service) in &manifest.services {
        let transforms = service_transforms.get(name.as_str()).cloned().unwrap_or_default();
        let before = recorder.len();
        let created = cluster.add_service_with(name, &service.args, &transforms)?;
        services.push(ServiceSummary {
            name: name.clone(),
            resources: recorder.len() - before,
            load_balancer: created
                .config
                .load_balancer
                .as_ref()
                .map(|lb| lb.load_balancer_type().to_string()),
            url: created.url(),
            hostname: created.hostname().map(str::to_string),
        });
    }

    Ok(PlanReport {
        cluster: cluster.name().to_string(),
        layout_version: cluster.layout_version(),
        services,
        calls: recorder.calls(),
    })
}

// ============================================================================
// I/O boundary
// ============================================================================

pub fn run_validate(args: &ValidateArgs) -> CommandResult<String> {
    let manifest = load_manifest_file(&args.file)?;
    let report = validate_services(&manifest)?;
    info!(
        "Manifest {} is valid ({} service(s))",
        args.file.display(),
        report.services.len()
    );

    if args.json {
        Ok(serde_json::to_string_pretty(&report)?)
    } else {
        Ok(super::format_validation(&report))
    }
}

pub fn run_plan(args: &PlanArgs) -> CommandResult<String> {
    let manifest = load_manifest_file(&args.file)?;
    let state_path = resolve_state_path(args.state.as_deref());
    let mut state = load_state_from(&state_path)?;

    let report = plan_manifest(&manifest, state.deployed_version(&manifest.cluster.name))?;

    if args.commit {
        state.record(&manifest.cluster.name, LAYOUT_VERSION, Utc::now());
        save_state_to(&state, &state_path)?;
        info!(
            "Recorded layout v{} for cluster '{}' in {}",
            LAYOUT_VERSION,
            manifest.cluster.name,
            state_path.display()
        );
    }

    if args.json {
        Ok(serde_json::to_string_pretty(&report)?)
    } else {
        Ok(super::format_plan(&report))
    }
}
