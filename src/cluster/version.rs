use thiserror::Error;

/// Resource layout produced by this version of the composer
pub const LAYOUT_VERSION: u32 = 2;

/// Value of `forceUpgrade` that allows moving to `LAYOUT_VERSION`
pub const FORCE_UPGRADE_TOKEN: &str = "v2";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VersioningError {
    #[error(
        "Cluster '{cluster}' was deployed with layout v{deployed}; moving to v{current} replaces its resources. \
         Set forceUpgrade: \"v{current}\" to proceed"
    )]
    BreakingVersionChange {
        cluster: String,
        deployed: u32,
        current: u32,
    },

    #[error("Cluster '{cluster}' was deployed with layout v{deployed}, newer than this tool supports (v{current})")]
    NewerLayoutDeployed {
        cluster: String,
        deployed: u32,
        current: u32,
    },
}

/// Check that the current layout can be applied over what is deployed.
///
/// `deployed` is `None` for a cluster that has never been deployed.
pub fn check_layout_version(
    cluster: &str,
    deployed: Option<u32>,
    force_upgrade: Option<&str>,
) -> Result<(), VersioningError> {
    match deployed {
        None => Ok(()),
        Some(deployed) if deployed == LAYOUT_VERSION => Ok(()),
        Some(deployed) if deployed > LAYOUT_VERSION => Err(VersioningError::NewerLayoutDeployed {
            cluster: cluster.to_string(),
            deployed,
            current: LAYOUT_VERSION,
        }),
        Some(_) if force_upgrade == Some(FORCE_UPGRADE_TOKEN) => {
            tracing::info!("Upgrading cluster '{}' to layout v{}", cluster, LAYOUT_VERSION);
            Ok(())
        }
        Some(deployed) => Err(VersioningError::BreakingVersionChange {
            cluster: cluster.to_string(),
            deployed,
            current: LAYOUT_VERSION,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_and_current() {
        assert!(check_layout_version("prod", None, None).is_ok());
        assert!(check_layout_version("prod", Some(2), None).is_ok());
    }

    #[test]
    fn test_old_layout_requires_force_upgrade() {
        assert!(matches!(
            check_layout_version("prod", Some(1), None),
            Err(VersioningError::BreakingVersionChange { deployed: 1, .. })
        ));
        assert!(matches!(
            check_layout_version("prod", Some(1), Some("v3")),
            Err(VersioningError::BreakingVersionChange { .. })
        ));
        assert!(check_layout_version("prod", Some(1), Some("v2")).is_ok());
    }

    #[test]
    fn test_newer_layout_rejected() {
        assert!(matches!(
            check_layout_version("prod", Some(3), Some("v2")),
            Err(VersioningError::NewerLayoutDeployed { deployed: 3, .. })
        ));
    }
}
