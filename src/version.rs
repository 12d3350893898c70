use std::str::FromStr;
use std::{fmt, fmt::Display};

use tracing::{debug, error};

use crate::contract::{HwRuntime, HwaccelError, ImplMode};

/// Runtime API version. Ordered by major, then minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimeVersion {
    pub major: u16,
    pub minor: u16,
}

impl RuntimeVersion {
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl Default for RuntimeVersion {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for RuntimeVersion {
    type Err = HwaccelError;

    fn from_str(v: &str) -> Result<Self, Self::Err> {
        let invalid = || HwaccelError::InvalidInput(format!("invalid runtime version: {v:?}"));
        let (major, minor) = v.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// Opens a throwaway session, asks it for the runtime version and closes it.
pub fn probe_runtime_version(
    runtime: &dyn HwRuntime,
    mode: ImplMode,
    requested: RuntimeVersion,
) -> Result<RuntimeVersion, HwaccelError> {
    let mut session = runtime.open_session(mode, requested).inspect_err(|err| {
        error!(
            runtime = runtime.name(),
            %mode,
            %requested,
            status = err.status(),
            "creating session failed"
        );
    })?;
    let version = session.query_version()?;
    drop(session);
    debug!(runtime = runtime.name(), %version, "probed runtime version");
    Ok(version)
}
