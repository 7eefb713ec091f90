pub mod cluster;
pub mod error;
pub mod health;
pub mod manifest;
pub mod ports;
pub mod service;
pub mod sizes;
pub mod units;
pub mod validation;

pub use cluster::{ClusterArgs, NamespaceArgs, VpcArgs};
pub use error::ConfigurationError;
pub use health::{ContainerHealthArgs, ContainerHealthCheck, HealthCheck, HealthCheckArgs};
pub use manifest::{
    parse_manifest, strip_jsonc_comments, validate_manifest, Manifest, ManifestCluster,
    ManifestError, ManifestFormat, ManifestService,
};
pub use ports::{PortProtocol, Protocol, ProtocolFamily};
pub use service::{
    Architecture, BuildArgs, CapacityArgs, CapacityWeight, ContainerArgs, ContainerFields,
    DomainArgs, Effect, ImageArgs, LinkGrant, LoadBalancerArgs, PermissionArgs, PortArgs,
    ScalingArgs, ServiceArgs, ServiceRegistryArgs,
};
pub use sizes::{Cpu, Memory, Storage};
pub use validation::{
    normalize_service, resolve_override, CapacityProvider, ImageSource, NormalizedContainer,
    NormalizedLoadBalancer, NormalizedPort, NormalizedService, PortAction, Scaling,
};

use std::path::Path;
use thiserror::Error;

/// Errors for file I/O operations (separate from pure parsing errors)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Manifest error: {0}")]
    ManifestError(#[from] ManifestError),
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load and validate a manifest file. The format follows the file extension.
pub fn load_manifest_file(path: &Path) -> Result<Manifest, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let manifest = Manifest::parse(&content, ManifestFormat::from_path(path))?;
    tracing::debug!(
        "Loaded manifest {} with {} service(s)",
        path.display(),
        manifest.services.len()
    );
    Ok(manifest)
}
