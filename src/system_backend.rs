use std::sync::Arc;

use crate::contract::{
    DeviceBackend, FramePoolConfig, HwRuntime, HwaccelError, ImplMode, RuntimeSession,
    SurfaceAllocator, SurfaceId,
};
use crate::version::RuntimeVersion;

const MFX_ERR_UNSUPPORTED: i32 = -3;
const MFX_ERR_NOT_INITIALIZED: i32 = -8;

/// Runtime that keeps surfaces in host memory. Always available; it reports
/// a fixed API version and only accepts software or auto sessions.
#[derive(Debug, Clone)]
pub struct SystemRuntime {
    version: RuntimeVersion,
}

impl SystemRuntime {
    #[must_use]
    pub fn with_version(version: RuntimeVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> RuntimeVersion {
        self.version
    }
}

impl Default for SystemRuntime {
    fn default() -> Self {
        Self::with_version(RuntimeVersion::new(2, 0))
    }
}

impl HwRuntime for SystemRuntime {
    fn name(&self) -> &'static str {
        "system"
    }

    fn create_device(&self, device: Option<&str>) -> Result<Arc<dyn DeviceBackend>, HwaccelError> {
        Ok(Arc::new(SystemDevice {
            label: device.unwrap_or("host").to_string(),
        }))
    }

    fn open_session(
        &self,
        mode: ImplMode,
        requested: RuntimeVersion,
    ) -> Result<Box<dyn RuntimeSession>, HwaccelError> {
        if mode == ImplMode::Hardware || requested > self.version {
            return Err(HwaccelError::SessionCreation {
                status: MFX_ERR_UNSUPPORTED,
            });
        }
        Ok(Box::new(SystemSession {
            version: self.version,
        }))
    }
}

struct SystemSession {
    version: RuntimeVersion,
}

impl RuntimeSession for SystemSession {
    fn query_version(&mut self) -> Result<RuntimeVersion, HwaccelError> {
        Ok(self.version)
    }
}

struct SystemDevice {
    label: String,
}

impl DeviceBackend for SystemDevice {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn alloc_frames(&self) -> Result<Box<dyn SurfaceAllocator>, HwaccelError> {
        Ok(Box::new(HostSurfaceAllocator::default()))
    }
}

#[derive(Default)]
struct HostSurfaceAllocator {
    frame_bytes: Option<usize>,
    slots: Vec<Option<Vec<u8>>>,
}

impl SurfaceAllocator for HostSurfaceAllocator {
    fn init(&mut self, config: &FramePoolConfig) -> Result<(), HwaccelError> {
        let frame_bytes = config
            .sw_format
            .frame_bytes(config.width, config.height)
            .ok_or_else(|| {
                HwaccelError::InvalidInput(format!(
                    "{}x{} {} frame does not fit in host memory",
                    config.width, config.height, config.sw_format
                ))
            })?;
        self.frame_bytes = Some(frame_bytes);
        Ok(())
    }

    fn allocate_surface(&mut self) -> Result<SurfaceId, HwaccelError> {
        let frame_bytes = self.frame_bytes.ok_or(HwaccelError::FramePoolInit {
            status: MFX_ERR_NOT_INITIALIZED,
        })?;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(frame_bytes)
            .map_err(|_| HwaccelError::OutOfMemory)?;
        buffer.resize(frame_bytes, 0);

        let index = match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(buffer);
                index
            }
            None => {
                self.slots.push(Some(buffer));
                self.slots.len() - 1
            }
        };
        let id = u32::try_from(index).map_err(|_| HwaccelError::OutOfMemory)?;
        Ok(SurfaceId(id))
    }

    fn release_surface(&mut self, surface: SurfaceId) {
        if let Some(slot) = self.slots.get_mut(surface.0 as usize) {
            *slot = None;
        }
    }
}
