use std::sync::Arc;

use tracing::{debug, error};

use crate::config::HwaccelOptions;
use crate::contract::{
    FramePoolConfig, HwRuntime, HwaccelError, MFX_MEMTYPE_VIDEO_MEMORY_DECODER_TARGET,
};
use crate::device::DeviceContext;
use crate::frames::FramePool;
use crate::policy::PoolSizePolicy;
use crate::stream::{InputStream, QsvHooks};
use crate::version::{RuntimeVersion, probe_runtime_version};

/// Owns the runtime, the lazily created device and the pool-size policy
/// shared by every stream initialized through it.
pub struct HwaccelContext {
    runtime: Arc<dyn HwRuntime>,
    options: HwaccelOptions,
    policy: PoolSizePolicy,
    device: Option<DeviceContext>,
}

impl HwaccelContext {
    pub fn with_runtime(runtime: Arc<dyn HwRuntime>, options: HwaccelOptions) -> Self {
        Self {
            runtime,
            options,
            policy: PoolSizePolicy::default(),
            device: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PoolSizePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn runtime_name(&self) -> &'static str {
        self.runtime.name()
    }

    pub fn options(&self) -> &HwaccelOptions {
        &self.options
    }

    pub fn policy(&self) -> &PoolSizePolicy {
        &self.policy
    }

    pub fn device(&self) -> Option<&DeviceContext> {
        self.device.as_ref()
    }

    /// Returns the shared device, creating it on first use. `requested`
    /// takes precedence over the configured default device.
    pub fn ensure_device(&mut self, requested: Option<&str>) -> Result<DeviceContext, HwaccelError> {
        if let Some(device) = &self.device {
            return Ok(device.clone());
        }
        let name = requested.or(self.options.device.as_deref());
        let device = DeviceContext::create(self.runtime.as_ref(), name)?;
        self.device = Some(device.clone());
        Ok(device)
    }

    pub fn probe_version(&self) -> Result<RuntimeVersion, HwaccelError> {
        probe_runtime_version(
            self.runtime.as_ref(),
            self.options.impl_mode,
            self.options.requested_version,
        )
    }

    /// Frame-pool configuration for `stream` on a runtime reporting `version`.
    pub fn pool_config_for(
        &self,
        stream: &InputStream,
        version: RuntimeVersion,
    ) -> Result<FramePoolConfig, HwaccelError> {
        let (width, coded_height) = (stream.coded_width(), stream.coded_height());
        if width == 0 || coded_height == 0 {
            return Err(HwaccelError::InvalidInput(format!(
                "coded dimensions must be non-zero, got {width}x{coded_height}"
            )));
        }
        let height = if stream.field_order().is_progressive() {
            coded_height
        } else {
            coded_height.checked_mul(2).ok_or_else(|| {
                HwaccelError::InvalidInput(format!(
                    "interlaced height overflows: 2 * {coded_height}"
                ))
            })?
        };
        if stream.sw_format().frame_bytes(width, height).is_none() {
            return Err(HwaccelError::InvalidInput(format!(
                "{width}x{height} {} surfaces are too large to address",
                stream.sw_format()
            )));
        }

        let mut initial_pool_size = self.options.pool_size;
        if initial_pool_size == 0 {
            initial_pool_size = self.policy.initial_pool_size(version);
        }

        Ok(FramePoolConfig {
            width,
            height,
            sw_format: stream.sw_format(),
            initial_pool_size,
            frame_type: MFX_MEMTYPE_VIDEO_MEMORY_DECODER_TARGET,
            ..FramePoolConfig::default()
        })
    }

    /// Prepares `stream` for hardware decoding: device, version probe, frame
    /// pool (only if the stream has none yet) and hook registration. Returns
    /// the runtime version the pool decision was based on.
    pub fn init_stream(&mut self, stream: &mut InputStream) -> Result<RuntimeVersion, HwaccelError> {
        let device = self.ensure_device(stream.hwaccel_device.as_deref())?;
        let version = self.probe_version()?;

        if stream.frame_pool().is_none() {
            let config = self.pool_config_for(stream, version)?;
            let mut builder = FramePool::alloc(&device)?;
            builder.config = config;
            let pool = builder.init().inspect_err(|err| {
                error!(status = err.status(), %err, "error initializing a QSV frame pool");
            })?;
            debug!(
                %version,
                config = %pool.config(),
                "attached frame pool to stream"
            );
            stream.set_frame_pool(pool);
        }

        stream.set_hooks(Arc::new(QsvHooks));
        Ok(version)
    }
}
