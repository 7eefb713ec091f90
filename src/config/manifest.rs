use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::cluster::ClusterArgs;
use super::error::ConfigurationError;
use super::service::{LinkGrant, ServiceArgs};
use super::validation::validate_name;

/// Errors that can occur during manifest parsing and validation
#[derive(Error, Debug, PartialEq)]
pub enum ManifestError {
    #[error("Manifest parse error: {0}")]
    ParseError(String),

    #[error("Service '{0}' links to undefined resource '{1}'")]
    UndefinedLink(String, String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Source format of a manifest file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    /// JSON with `//` and `/* */` comments allowed
    Jsonc,
    Yaml,
}

impl ManifestFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => ManifestFormat::Yaml,
            _ => ManifestFormat::Jsonc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ManifestCluster {
    pub name: String,
    #[serde(flatten)]
    pub args: ClusterArgs,
    /// JSON merge patches keyed by resource kind, e.g. "loadBalancer"
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transform: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ManifestService {
    #[serde(flatten)]
    pub args: ServiceArgs,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transform: BTreeMap<String, Value>,
}

/// A cluster and its services, as loaded from a manifest file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Manifest {
    pub cluster: ManifestCluster,
    #[serde(default)]
    pub services: BTreeMap<String, ManifestService>,
    /// Named grants services can `link` to
    #[serde(default)]
    pub links: BTreeMap<String, LinkGrant>,
}

// ============================================================================
// SBIO: Pure parsing functions (no I/O)
// ============================================================================

/// Strip C-style comments from JSONC content.
pub fn strip_jsonc_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => {
                result.push(c);
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
                result.push(c);
            }
            '/' if !in_string && chars.peek() == Some(&'/') => {
                chars.next();
                for nc in chars.by_ref() {
                    if nc == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            '/' if !in_string && chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for nc in chars.by_ref() {
                    if prev == '*' && nc == '/' {
                        break;
                    }
                    // keep line numbers stable for parse errors
                    if nc == '\n' {
                        result.push('\n');
                    }
                    prev = nc;
                }
            }
            _ => result.push(c),
        }
    }

    result
}

/// Parse manifest content without validating it.
pub fn parse_manifest(content: &str, format: ManifestFormat) -> Result<Manifest, ManifestError> {
    match format {
        ManifestFormat::Jsonc => serde_json::from_str(&strip_jsonc_comments(content))
            .map_err(|e| ManifestError::ParseError(e.to_string())),
        ManifestFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| ManifestError::ParseError(e.to_string()))
        }
    }
}

/// Check names, the cluster network and link references.
///
/// Service configurations themselves are checked when they are normalized.
pub fn validate_manifest(manifest: &Manifest) -> Result<(), ManifestError> {
    validate_name(&manifest.cluster.name)?;
    manifest.cluster.args.validate()?;

    for (name, service) in &manifest.services {
        validate_name(name)?;

        let mut seen = HashSet::new();
        for link in &service.args.link {
            if !manifest.links.contains_key(link) {
                return Err(ManifestError::UndefinedLink(name.clone(), link.clone()));
            }
            if !seen.insert(link) {
                tracing::warn!("Service '{}' links to '{}' more than once", name, link);
            }
        }
    }

    Ok(())
}

impl Manifest {
    /// Parse and validate.
    pub fn parse(content: &str, format: ManifestFormat) -> Result<Self, ManifestError> {
        let manifest = parse_manifest(content, format)?;
        validate_manifest(&manifest)?;
        Ok(manifest)
    }

    pub fn service(&self, name: &str) -> Option<&ManifestService> {
        self.services.get(name)
    }
}
