//! Backend catalog with deterministic candidate ordering.
//!
//! The registry is read-only after construction: a fixed set of
//! [`BackendDescriptor`]s, exactly one of which is the remote fallback
//! (class `Remote`, memory cost 0, always affordable). Candidate listing
//! orders local backends by ascending memory cost among those at or above
//! the requested capability tier, with the remote descriptor always last
//! so every routing pass terminates there.

use serde::{Deserialize, Serialize};

use crate::{MuninnError, Result};

/// Coarse capability ranking used to filter candidates by request
/// complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityTier {
    Low,
    Medium,
    High,
}

/// Where a backend runs. Routing never branches on this beyond catalog
/// ordering; it exists so descriptors, not environment sniffing, carry
/// the local/remote distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendClass {
    Local,
    Remote,
}

/// One selectable inference target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Unique backend id (e.g. "tinyllama").
    pub id: String,
    /// Capability tier this backend can serve.
    pub tier: CapabilityTier,
    /// Resident memory cost when warm, in megabytes. Zero for remote.
    pub memory_cost_mb: u64,
    /// Local process or remote API.
    pub class: BackendClass,
    /// Largest prompt this backend accepts, in characters.
    pub max_prompt_chars: usize,
}

impl BackendDescriptor {
    pub fn new(
        id: impl Into<String>,
        tier: CapabilityTier,
        memory_cost_mb: u64,
        class: BackendClass,
        max_prompt_chars: usize,
    ) -> Self {
        Self {
            id: id.into(),
            tier,
            memory_cost_mb,
            class,
            max_prompt_chars,
        }
    }
}

/// Immutable catalog of backend descriptors.
///
/// Thread-safe by virtue of immutability; share via `Arc`.
pub struct BackendRegistry {
    locals: Vec<BackendDescriptor>,
    remote: BackendDescriptor,
}

impl BackendRegistry {
    /// Build a registry from a descriptor list.
    ///
    /// Validates the catalog invariants: unique ids, exactly one `Remote`
    /// descriptor, and that the remote one costs zero memory.
    pub fn new(descriptors: Vec<BackendDescriptor>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for d in &descriptors {
            if !seen.insert(d.id.clone()) {
                return Err(MuninnError::Configuration(format!(
                    "duplicate backend id: {}",
                    d.id
                )));
            }
        }

        let (remotes, mut locals): (Vec<_>, Vec<_>) = descriptors
            .into_iter()
            .partition(|d| d.class == BackendClass::Remote);

        let mut remotes = remotes.into_iter();
        let remote = match (remotes.next(), remotes.next()) {
            (Some(r), None) => r,
            (None, _) => {
                return Err(MuninnError::Configuration(
                    "catalog must contain exactly one remote backend".to_string(),
                ));
            }
            (Some(_), Some(extra)) => {
                return Err(MuninnError::Configuration(format!(
                    "catalog contains more than one remote backend ('{}' is extra)",
                    extra.id
                )));
            }
        };
        if remote.memory_cost_mb != 0 {
            return Err(MuninnError::Configuration(format!(
                "remote backend '{}' must have zero memory cost, got {} MB",
                remote.id, remote.memory_cost_mb
            )));
        }

        locals.sort_by(|a, b| {
            a.memory_cost_mb
                .cmp(&b.memory_cost_mb)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(Self { locals, remote })
    }

    /// Registry seeded with the stock catalog: three local models of
    /// increasing memory cost plus the cloud fallback.
    pub fn with_default_catalog() -> Self {
        Self::new(vec![
            BackendDescriptor::new(
                "tinyllama",
                CapabilityTier::Low,
                1024,
                BackendClass::Local,
                2048,
            ),
            BackendDescriptor::new(
                "phi3:mini",
                CapabilityTier::Medium,
                2048,
                BackendClass::Local,
                4096,
            ),
            BackendDescriptor::new(
                "biomistral:7b",
                CapabilityTier::High,
                4096,
                BackendClass::Local,
                8192,
            ),
            BackendDescriptor::new(
                "gemini-1.5-flash",
                CapabilityTier::High,
                0,
                BackendClass::Remote,
                30_000,
            ),
        ])
        .expect("default catalog satisfies registry invariants")
    }

    /// Candidates for a request needing at least `min_tier`, in the order
    /// the router must try them: local backends by ascending memory cost,
    /// then the remote fallback.
    ///
    /// The remote descriptor is included regardless of tier so that a
    /// mis-registered catalog (no locals at the requested tier) still
    /// routes somewhere.
    pub fn candidates(&self, min_tier: CapabilityTier) -> Vec<&BackendDescriptor> {
        let mut out: Vec<&BackendDescriptor> = self
            .locals
            .iter()
            .filter(|d| d.tier >= min_tier)
            .collect();
        out.push(&self.remote);
        out
    }

    /// Look up a descriptor by id.
    pub fn get(&self, id: &str) -> Result<&BackendDescriptor> {
        self.locals
            .iter()
            .chain(std::iter::once(&self.remote))
            .find(|d| d.id == id)
            .ok_or_else(|| MuninnError::UnknownBackend(id.to_string()))
    }

    /// The remote fallback descriptor.
    pub fn remote(&self) -> &BackendDescriptor {
        &self.remote
    }

    /// All descriptors, locals first in cost order.
    pub fn all(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.locals.iter().chain(std::iter::once(&self.remote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_orders_by_memory_cost() {
        let registry = BackendRegistry::with_default_catalog();
        let ids: Vec<_> = registry
            .candidates(CapabilityTier::Low)
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["tinyllama", "phi3:mini", "biomistral:7b", "gemini-1.5-flash"]
        );
    }

    #[test]
    fn tier_filter_keeps_remote_last() {
        let registry = BackendRegistry::with_default_catalog();
        let ids: Vec<_> = registry
            .candidates(CapabilityTier::Medium)
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, vec!["phi3:mini", "biomistral:7b", "gemini-1.5-flash"]);
    }

    #[test]
    fn unmatched_tier_falls_through_to_remote() {
        let registry = BackendRegistry::new(vec![
            BackendDescriptor::new("only-low", CapabilityTier::Low, 512, BackendClass::Local, 2048),
            BackendDescriptor::new(
                "cloud",
                CapabilityTier::High,
                0,
                BackendClass::Remote,
                30_000,
            ),
        ])
        .unwrap();

        let ids: Vec<_> = registry
            .candidates(CapabilityTier::High)
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, vec!["cloud"]);
    }

    #[test]
    fn rejects_catalog_without_remote() {
        let result = BackendRegistry::new(vec![BackendDescriptor::new(
            "local-only",
            CapabilityTier::Low,
            512,
            BackendClass::Local,
            2048,
        )]);
        assert!(matches!(result, Err(MuninnError::Configuration(_))));
    }

    #[test]
    fn rejects_two_remotes() {
        let result = BackendRegistry::new(vec![
            BackendDescriptor::new("r1", CapabilityTier::High, 0, BackendClass::Remote, 1000),
            BackendDescriptor::new("r2", CapabilityTier::High, 0, BackendClass::Remote, 1000),
        ]);
        assert!(matches!(result, Err(MuninnError::Configuration(_))));
    }

    #[test]
    fn rejects_costly_remote() {
        let result = BackendRegistry::new(vec![BackendDescriptor::new(
            "r1",
            CapabilityTier::High,
            512,
            BackendClass::Remote,
            1000,
        )]);
        assert!(matches!(result, Err(MuninnError::Configuration(_))));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let result = BackendRegistry::new(vec![
            BackendDescriptor::new("dup", CapabilityTier::Low, 512, BackendClass::Local, 1000),
            BackendDescriptor::new("dup", CapabilityTier::High, 0, BackendClass::Remote, 1000),
        ]);
        assert!(matches!(result, Err(MuninnError::Configuration(_))));
    }

    #[test]
    fn get_finds_local_and_remote() {
        let registry = BackendRegistry::with_default_catalog();
        assert_eq!(registry.get("phi3:mini").unwrap().memory_cost_mb, 2048);
        assert_eq!(
            registry.get("gemini-1.5-flash").unwrap().class,
            BackendClass::Remote
        );
        assert!(matches!(
            registry.get("nope"),
            Err(MuninnError::UnknownBackend(_))
        ));
    }
}
