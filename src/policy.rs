use std::{fmt, fmt::Display};

use crate::version::RuntimeVersion;

pub const LEGACY_RUNTIME_MAX: RuntimeVersion = RuntimeVersion::new(1, 19);
pub const LEGACY_POOL_SIZE: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizeRule {
    pub max_version: RuntimeVersion,
    pub initial_pool_size: u32,
}

impl Display for PoolSizeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<= {} -> {} surfaces",
            self.max_version, self.initial_pool_size
        )
    }
}

/// Pool-size decisions keyed by runtime version range.
///
/// Rules are kept sorted by `max_version`; the first rule whose upper bound
/// covers the probed version wins. Versions above every rule get a dynamic
/// pool (size 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSizePolicy {
    rules: Vec<PoolSizeRule>,
}

impl PoolSizePolicy {
    #[must_use]
    pub fn new(mut rules: Vec<PoolSizeRule>) -> Self {
        rules.sort_by_key(|rule| rule.max_version);
        Self { rules }
    }

    #[must_use]
    pub fn dynamic() -> Self {
        Self { rules: Vec::new() }
    }

    #[must_use]
    pub fn initial_pool_size(&self, version: RuntimeVersion) -> u32 {
        self.rules
            .iter()
            .find(|rule| version <= rule.max_version)
            .map_or(0, |rule| rule.initial_pool_size)
    }

    pub fn rules(&self) -> &[PoolSizeRule] {
        &self.rules
    }
}

impl Default for PoolSizePolicy {
    /// Runtimes up to 1.19 cannot grow the surface pool during decode.
    fn default() -> Self {
        Self::new(vec![PoolSizeRule {
            max_version: LEGACY_RUNTIME_MAX,
            initial_pool_size: LEGACY_POOL_SIZE,
        }])
    }
}
