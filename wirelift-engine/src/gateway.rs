//! Default gateway registry
//!
//! The OS has one default route, so which tunnel holds it is a single
//! shared fact. The registry records the designated gateway peer and the
//! current claim together with its owner, and refuses a second claim
//! instead of silently overwriting the first.
//!
//! A persistent registry keeps the claim in a state file so that the
//! process taking an adapter down can undo a switch made by the process
//! that brought it up.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use wirelift_net::GatewaySwitch;

use crate::error::{Error, Result};
use crate::lock::AllocationLock;

/// An active claim on the default gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayClaim {
    /// Native name of the owning interface
    pub owner: String,
    pub switch: GatewaySwitch,
}

#[derive(Debug, Default)]
struct Inner {
    peer: Option<String>,
    claim: Option<GatewayClaim>,
}

/// Shared default gateway state, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct GatewayRegistry {
    inner: Arc<Mutex<Inner>>,
    state: Option<PathBuf>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a designated gateway peer
    pub fn with_peer(peer: Option<String>) -> Self {
        let registry = Self::new();
        registry.lock().peer = peer;
        registry
    }

    /// Registry whose claim lives in `path`, shared by every process using it
    ///
    /// Each claim update happens under an exclusive lock on a sibling
    /// `.lock` file.
    pub fn persistent(path: impl Into<PathBuf>, peer: Option<String>) -> Self {
        let mut registry = Self::with_peer(peer);
        registry.state = Some(path.into());
        registry
    }

    /// State file of a persistent registry
    pub fn state_path(&self) -> Option<&Path> {
        self.state.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` over the current claim, saving it afterwards if it changed
    fn update<T>(&self, f: impl FnOnce(&mut Option<GatewayClaim>) -> Result<T>) -> Result<T> {
        let mut inner = self.lock();
        let path = match &self.state {
            Some(path) => path,
            None => return f(&mut inner.claim),
        };

        let _lock = AllocationLock::acquire(path.with_extension("lock"))?;
        let mut claim = read_claim(path)?;
        let before = claim.clone();
        let result = f(&mut claim)?;
        if claim != before {
            write_claim(path, claim.as_ref())?;
        }
        inner.claim = claim;
        Ok(result)
    }

    /// Public key of the designated gateway peer
    pub fn peer(&self) -> Option<String> {
        self.lock().peer.clone()
    }

    pub fn set_peer(&self, public_key: impl Into<String>) {
        self.lock().peer = Some(public_key.into());
    }

    /// Clear the designated peer, returning it
    pub fn reset_peer(&self) -> Option<String> {
        self.lock().peer.take()
    }

    /// Whether `public_key` is the designated gateway peer
    pub fn is_peer(&self, public_key: &str) -> bool {
        self.lock().peer.as_deref() == Some(public_key)
    }

    /// The current claim, if any
    pub fn claim(&self) -> Result<Option<GatewayClaim>> {
        self.update(|claim| Ok(claim.clone()))
    }

    /// Record `owner` as holding the default gateway
    ///
    /// Re-claiming by the same owner replaces its switch. A claim held by a
    /// different owner is an error.
    pub fn acquire(&self, owner: &str, switch: GatewaySwitch) -> Result<()> {
        self.update(|claim| {
            if let Some(current) = claim {
                if current.owner != owner {
                    return Err(Error::Gateway(format!(
                        "default gateway is already held by {} ({})",
                        current.owner, current.switch.tunnel
                    )));
                }
            }
            *claim = Some(GatewayClaim {
                owner: owner.to_string(),
                switch,
            });
            Ok(())
        })
    }

    /// Release the claim if `owner` holds it, returning the switch to undo
    pub fn release(&self, owner: &str) -> Result<Option<GatewaySwitch>> {
        self.update(|claim| match claim {
            Some(current) if current.owner == owner => Ok(claim.take().map(|c| c.switch)),
            _ => Ok(None),
        })
    }

    /// Whether `owner` holds the default gateway
    pub fn is_held_by(&self, owner: &str) -> Result<bool> {
        self.update(|claim| Ok(claim.as_ref().map(|c| c.owner == owner).unwrap_or(false)))
    }
}

fn read_claim(path: &Path) -> Result<Option<GatewayClaim>> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(toml::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_claim(path: &Path, claim: Option<&GatewayClaim>) -> Result<()> {
    let claim = match claim {
        Some(claim) => claim,
        None => {
            return match std::fs::remove_file(path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(toml::to_string_pretty(claim)?.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    log::debug!("Saved default gateway claim of {} to {}", claim.owner, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirelift_net::Gateway;

    fn switch(iface: &str) -> GatewaySwitch {
        GatewaySwitch::new(
            Gateway::new("eth0", "192.168.1.1".parse().unwrap()),
            Gateway::new(iface, "203.0.113.5".parse().unwrap()),
        )
    }

    #[test]
    fn test_designated_peer() {
        let registry = GatewayRegistry::with_peer(Some("gw".into()));
        assert!(registry.is_peer("gw"));
        assert!(!registry.is_peer("other"));
        registry.set_peer("other");
        assert_eq!(registry.peer().as_deref(), Some("other"));
        assert_eq!(registry.reset_peer().as_deref(), Some("other"));
        assert_eq!(registry.peer(), None);
    }

    #[test]
    fn test_conflicting_claim_fails() {
        let registry = GatewayRegistry::new();
        registry.acquire("wg0", switch("wg0")).unwrap();
        let err = registry.acquire("wg1", switch("wg1")).unwrap_err();
        assert!(matches!(err, Error::Gateway(_)));
        assert!(registry.is_held_by("wg0").unwrap());

        // same owner may refresh its claim
        registry.acquire("wg0", switch("wg0")).unwrap();
    }

    #[test]
    fn test_release_only_by_owner() {
        let registry = GatewayRegistry::new();
        registry.acquire("wg0", switch("wg0")).unwrap();
        assert_eq!(registry.release("wg1").unwrap(), None);
        assert_eq!(registry.release("wg0").unwrap(), Some(switch("wg0")));
        assert_eq!(registry.claim().unwrap(), None);
        registry.acquire("wg1", switch("wg1")).unwrap();
    }

    #[test]
    fn test_clones_share_state() {
        let registry = GatewayRegistry::new();
        let other = registry.clone();
        registry.acquire("wg0", switch("wg0")).unwrap();
        assert!(other.is_held_by("wg0").unwrap());
    }

    #[test]
    fn test_persistent_claim_is_seen_by_other_registries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("gateway.toml");
        let first = GatewayRegistry::persistent(&path, None);
        let second = GatewayRegistry::persistent(&path, None);

        first.acquire("wg0", switch("wg0")).unwrap();
        assert!(path.exists());
        assert!(second.is_held_by("wg0").unwrap());
        assert!(matches!(
            second.acquire("wg1", switch("wg1")),
            Err(Error::Gateway(_))
        ));

        assert_eq!(second.release("wg0").unwrap(), Some(switch("wg0")));
        assert!(!path.exists());
        assert_eq!(first.claim().unwrap(), None);
    }

    #[test]
    fn test_empty_state_file_means_no_claim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "\n").unwrap();
        let registry = GatewayRegistry::persistent(&path, None);
        assert_eq!(registry.claim().unwrap(), None);
        assert_eq!(registry.release("wg0").unwrap(), None);
    }
}
