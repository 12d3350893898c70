use std::sync::Arc;
use std::{fmt, fmt::Display};

mod config;
mod contract;
mod device;
mod frames;
mod hwaccel;
#[cfg(all(target_os = "linux", feature = "backend-mfx"))]
mod mfx_backend;
mod policy;
mod stream;
mod system_backend;
mod version;

pub use config::{DEVICE_ENV, HwaccelOptions, POOL_SIZE_ENV};
pub use contract::{
    DeviceBackend, FieldOrder, FramePoolConfig, HwPixelFormat, HwRuntime, HwaccelError, ImplMode,
    MFX_MEMTYPE_VIDEO_MEMORY_DECODER_TARGET, RuntimeSession, StreamParams, SurfaceAllocator,
    SurfaceId, SwPixelFormat,
};
pub use device::DeviceContext;
pub use frames::{FramePool, FramePoolBuilder, HwFrame};
pub use hwaccel::HwaccelContext;
#[cfg(all(target_os = "linux", feature = "backend-mfx"))]
pub use mfx_backend::{DEFAULT_RENDER_NODE, MfxRuntime};
pub use policy::{LEGACY_POOL_SIZE, LEGACY_RUNTIME_MAX, PoolSizePolicy, PoolSizeRule};
pub use stream::{HwaccelHooks, InputStream, QsvHooks};
pub use system_backend::SystemRuntime;
pub use version::{RuntimeVersion, probe_runtime_version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Auto,
    System,
    #[cfg(all(target_os = "linux", feature = "backend-mfx"))]
    Mfx,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::System => f.write_str("system"),
            #[cfg(all(target_os = "linux", feature = "backend-mfx"))]
            Self::Mfx => f.write_str("mfx"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = HwaccelError;

    fn from_str(v: &str) -> Result<Self, Self::Err> {
        match v.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "system" | "host" => Ok(Self::System),
            #[cfg(all(target_os = "linux", feature = "backend-mfx"))]
            "mfx" | "qsv" => Ok(Self::Mfx),
            _ => Err(HwaccelError::InvalidInput(format!(
                "unsupported backend: {v}"
            ))),
        }
    }
}

fn preferred_backend_order() -> Vec<BackendKind> {
    let mut order = Vec::new();
    #[cfg(all(target_os = "linux", feature = "backend-mfx"))]
    order.push(BackendKind::Mfx);
    order.push(BackendKind::System);
    order
}

/// Instantiates the runtime for `kind`. `Auto` takes the first backend in
/// preference order that loads.
pub fn build_runtime(kind: BackendKind) -> Result<Arc<dyn HwRuntime>, HwaccelError> {
    match kind {
        BackendKind::Auto => {
            let mut diagnostics = Vec::new();
            for candidate in preferred_backend_order() {
                match build_runtime(candidate) {
                    Ok(runtime) => return Ok(runtime),
                    Err(err) => {
                        tracing::warn!(backend = %candidate, %err, "backend unavailable");
                        diagnostics.push(format!("{candidate}: {err}"));
                    }
                }
            }
            Err(HwaccelError::BackendUnavailable(format!(
                "auto backend selection failed: {}",
                diagnostics.join("; ")
            )))
        }
        BackendKind::System => Ok(Arc::new(SystemRuntime::default())),
        #[cfg(all(target_os = "linux", feature = "backend-mfx"))]
        BackendKind::Mfx => Ok(Arc::new(MfxRuntime::load()?)),
    }
}

impl HwaccelContext {
    pub fn new(kind: BackendKind, options: HwaccelOptions) -> Result<Self, HwaccelError> {
        Ok(Self::with_runtime(build_runtime(kind)?, options))
    }
}
