use std::sync::Arc;
use std::{fmt, fmt::Display};

use tracing::{debug, error};

use crate::contract::{DeviceBackend, HwRuntime, HwaccelError, SurfaceAllocator};

/// Shared handle to an opened accelerator. Cloning shares the device.
#[derive(Clone)]
pub struct DeviceContext {
    runtime: &'static str,
    backend: Arc<dyn DeviceBackend>,
}

impl DeviceContext {
    pub fn create(runtime: &dyn HwRuntime, device: Option<&str>) -> Result<Self, HwaccelError> {
        let backend = runtime.create_device(device).inspect_err(|err| {
            error!(
                runtime = runtime.name(),
                device = device.unwrap_or("default"),
                status = err.status(),
                "error creating a QSV device"
            );
        })?;
        let ctx = Self {
            runtime: runtime.name(),
            backend,
        };
        debug!(device = %ctx, "created hardware device");
        Ok(ctx)
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    pub fn same_device(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.backend, &other.backend)
    }

    pub(crate) fn alloc_frames(&self) -> Result<Box<dyn SurfaceAllocator>, HwaccelError> {
        self.backend.alloc_frames()
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("runtime", &self.runtime)
            .field("device", &self.backend.describe())
            .finish()
    }
}

impl Display for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.runtime, self.backend.describe())
    }
}
