use std::{fmt, fmt::Display};

use tracing::warn;

use crate::contract::ImplMode;
use crate::version::RuntimeVersion;

pub const DEVICE_ENV: &str = "QSV_HWACCEL_DEVICE";
pub const POOL_SIZE_ENV: &str = "QSV_HWACCEL_POOL_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HwaccelOptions {
    /// Device used when a stream does not name one.
    pub device: Option<String>,
    pub impl_mode: ImplMode,
    /// API version requested from the probe session.
    pub requested_version: RuntimeVersion,
    /// Fixed pool size. Zero leaves the choice to the pool-size policy.
    pub pool_size: u32,
}

impl HwaccelOptions {
    #[must_use]
    pub fn new(impl_mode: ImplMode) -> Self {
        Self {
            impl_mode,
            ..Self::default()
        }
    }

    /// Defaults overridden by `QSV_HWACCEL_DEVICE` and `QSV_HWACCEL_POOL_SIZE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(device) = lookup(DEVICE_ENV).filter(|v| !v.trim().is_empty()) {
            self.device = Some(device.trim().to_string());
        }
        if let Some(raw) = lookup(POOL_SIZE_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(pool_size) => self.pool_size = pool_size,
                Err(err) => warn!(value = %raw, %err, "ignoring {POOL_SIZE_ENV}"),
            }
        }
        self
    }
}

impl Display for HwaccelOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HwaccelOptions(device={:?}, impl_mode={}, requested_version={}, pool_size={})",
            self.device, self.impl_mode, self.requested_version, self.pool_size
        )
    }
}
