//! Interface name resolution
//!
//! Turns what a caller asked for (a logical name, a native name, or only key
//! material) into the native interface the orchestrator should target.
//! Matching by key reattaches to a running session; matching by name
//! reattaches to a known interface. The two are kept apart on purpose.

use crate::error::Result;
use crate::names::NameStore;
use crate::platform::Platform;
use crate::vpn::VpnConfiguration;

/// Result of [`resolve`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Logical name, if known
    pub interface_name: Option<String>,
    /// Native name, if known
    pub native_name: Option<String>,
    /// Name to target; `None` means allocate the next free slot
    pub resolved_name: Option<String>,
}

/// Find the live interface whose active key is `public_key`
///
/// Returns the logical and native names. An unmapped interface uses its
/// native name as its logical name.
pub fn find_by_public_key(
    platform: &dyn Platform,
    names: &dyn NameStore,
    public_key: &str,
) -> Result<Option<(String, String)>> {
    for native in platform.interfaces()? {
        if platform.public_key(&native)?.as_deref() == Some(public_key) {
            let name = names.name(&native)?.unwrap_or_else(|| native.clone());
            return Ok(Some((name, native)));
        }
    }
    Ok(None)
}

/// Decide which native interface a start request targets
pub fn resolve(
    platform: &dyn Platform,
    names: &dyn NameStore,
    configuration: &VpnConfiguration,
    interface_name: Option<&str>,
    native_interface_name: Option<&str>,
) -> Result<Resolution> {
    let mut resolution = Resolution {
        interface_name: interface_name.map(str::to_string),
        native_name: native_interface_name.map(str::to_string),
        resolved_name: None,
    };

    match (interface_name, native_interface_name) {
        (None, None) => {
            if let Some((name, native)) =
                find_by_public_key(platform, names, configuration.public_key())?
            {
                log::debug!(
                    "Key {} is already active on {} ({})",
                    configuration.public_key(),
                    name,
                    native
                );
                resolution.interface_name = Some(name);
                resolution.native_name = Some(native);
            }
        }
        (_, Some(_)) => {}
        (Some(name), None) => {
            resolution.native_name = names.native_name(name)?;
        }
    }

    resolution.resolved_name = resolution
        .native_name
        .clone()
        .or_else(|| resolution.interface_name.clone());

    if let Some(resolved) = &resolution.resolved_name {
        if !platform.is_valid_native_interface_name(resolved) {
            log::info!(
                "`{}` is not a valid native interface name, a new slot will be allocated",
                resolved
            );
            resolution.resolved_name = None;
        }
    }

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::MemoryNameStore;
    use crate::platform::MockPlatform;

    const KEY: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";

    fn config() -> VpnConfiguration {
        VpnConfiguration::builder().public_key(KEY).build().unwrap()
    }

    #[test]
    fn test_bare_configuration_matches_active_key() {
        let platform = MockPlatform::new();
        let names = MemoryNameStore::new();
        platform.seed("wg0", Some("other"));
        platform.seed("wg1", Some(KEY));
        names.map("office", "wg1").unwrap();

        let r = resolve(&platform, &names, &config(), None, None).unwrap();
        assert_eq!(r.interface_name.as_deref(), Some("office"));
        assert_eq!(r.native_name.as_deref(), Some("wg1"));
        assert_eq!(r.resolved_name.as_deref(), Some("wg1"));
    }

    #[test]
    fn test_bare_configuration_without_match_allocates() {
        let platform = MockPlatform::new();
        let names = MemoryNameStore::new();
        platform.seed("wg0", Some("other"));

        let r = resolve(&platform, &names, &config(), None, None).unwrap();
        assert_eq!(r, Resolution::default());
    }

    #[test]
    fn test_native_name_is_authoritative() {
        let platform = MockPlatform::new();
        let names = MemoryNameStore::new();
        names.map("office", "wg4").unwrap();

        let r = resolve(&platform, &names, &config(), Some("office"), Some("wg7")).unwrap();
        assert_eq!(r.native_name.as_deref(), Some("wg7"));
        assert_eq!(r.resolved_name.as_deref(), Some("wg7"));
    }

    #[test]
    fn test_logical_name_uses_mapping() {
        let platform = MockPlatform::new();
        let names = MemoryNameStore::new();
        names.map("office", "wg4").unwrap();

        let r = resolve(&platform, &names, &config(), Some("office"), None).unwrap();
        assert_eq!(r.interface_name.as_deref(), Some("office"));
        assert_eq!(r.native_name.as_deref(), Some("wg4"));
        assert_eq!(r.resolved_name.as_deref(), Some("wg4"));
    }

    #[test]
    fn test_unmapped_logical_name_is_resolved_name() {
        let platform = MockPlatform::new();
        let names = MemoryNameStore::new();

        let r = resolve(&platform, &names, &config(), Some("office"), None).unwrap();
        assert_eq!(r.native_name, None);
        assert_eq!(r.resolved_name.as_deref(), Some("office"));
    }

    #[test]
    fn test_invalid_name_forces_allocation() {
        let platform = MockPlatform::new();
        let names = MemoryNameStore::new();

        let r = resolve(&platform, &names, &config(), Some("my home office vpn"), None).unwrap();
        assert_eq!(r.interface_name.as_deref(), Some("my home office vpn"));
        assert_eq!(r.resolved_name, None);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let platform = MockPlatform::new();
        let names = MemoryNameStore::new();
        platform.seed("wg2", Some(KEY));
        names.map("office", "wg2").unwrap();

        let first = resolve(&platform, &names, &config(), None, None).unwrap();
        for _ in 0..5 {
            assert_eq!(resolve(&platform, &names, &config(), None, None).unwrap(), first);
        }
    }
}
