use std::sync::Arc;
use std::{fmt, fmt::Display};

use crate::contract::{FieldOrder, HwaccelError, StreamParams, SwPixelFormat};
use crate::frames::{FramePool, HwFrame};

/// Hooks the decode loop calls once hardware acceleration is set up on a
/// stream.
pub trait HwaccelHooks: Send + Sync {
    fn name(&self) -> &'static str;

    fn get_buffer(&self, stream: &InputStream) -> Result<HwFrame, HwaccelError>;

    fn uninit(&self, stream: &mut InputStream);
}

/// Serves decode targets from the stream's own frame pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct QsvHooks;

impl HwaccelHooks for QsvHooks {
    fn name(&self) -> &'static str {
        "qsv"
    }

    fn get_buffer(&self, stream: &InputStream) -> Result<HwFrame, HwaccelError> {
        stream
            .frame_pool()
            .ok_or(HwaccelError::NoFramePool)?
            .acquire()
    }

    fn uninit(&self, stream: &mut InputStream) {
        stream.release_frame_pool();
    }
}

/// Per-stream decode input as seen by the hwaccel layer.
pub struct InputStream {
    params: StreamParams,
    pub hwaccel_device: Option<String>,
    hw_frames: Option<FramePool>,
    hooks: Option<Arc<dyn HwaccelHooks>>,
}

impl InputStream {
    #[must_use]
    pub fn new(params: StreamParams) -> Self {
        Self {
            params,
            hwaccel_device: None,
            hw_frames: None,
            hooks: None,
        }
    }

    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.hwaccel_device = Some(device.into());
        self
    }

    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    pub fn coded_width(&self) -> u32 {
        self.params.coded_width
    }

    pub fn coded_height(&self) -> u32 {
        self.params.coded_height
    }

    pub fn field_order(&self) -> FieldOrder {
        self.params.field_order
    }

    pub fn sw_format(&self) -> SwPixelFormat {
        self.params.sw_format
    }

    pub fn frame_pool(&self) -> Option<&FramePool> {
        self.hw_frames.as_ref()
    }

    pub fn hooks(&self) -> Option<&Arc<dyn HwaccelHooks>> {
        self.hooks.as_ref()
    }

    pub fn set_frame_pool(&mut self, pool: FramePool) {
        self.hw_frames = Some(pool);
    }

    /// Drops this stream's reference to its frame pool, if any.
    pub fn release_frame_pool(&mut self) {
        self.hw_frames = None;
    }

    pub fn set_hooks(&mut self, hooks: Arc<dyn HwaccelHooks>) {
        self.hooks = Some(hooks);
    }

    pub fn get_buffer(&self) -> Result<HwFrame, HwaccelError> {
        match &self.hooks {
            Some(hooks) => hooks.get_buffer(self),
            None => Err(HwaccelError::NotInitialized),
        }
    }

    pub fn uninit(&mut self) {
        if let Some(hooks) = self.hooks.clone() {
            hooks.uninit(self);
        }
    }
}

impl fmt::Debug for InputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputStream")
            .field("params", &self.params)
            .field("hwaccel_device", &self.hwaccel_device)
            .field("hw_frames", &self.hw_frames)
            .field("hooks", &self.hooks.as_ref().map(|hooks| hooks.name()))
            .finish()
    }
}

impl Display for InputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InputStream({}, device={:?}, hwaccel={})",
            self.params,
            self.hwaccel_device,
            self.hooks.as_ref().map_or("none", |hooks| hooks.name())
        )
    }
}
