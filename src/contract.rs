use std::sync::Arc;
use std::{fmt, fmt::Display};

use crate::version::RuntimeVersion;

pub const MFX_MEMTYPE_VIDEO_MEMORY_DECODER_TARGET: u32 = 0x0010;

pub(crate) const EINVAL: i32 = 22;
pub(crate) const EIO: i32 = 5;
pub(crate) const ENOMEM: i32 = 12;
#[cfg(all(target_os = "linux", feature = "backend-mfx"))]
pub(crate) const ENODEV: i32 = 19;
pub(crate) const ENOSYS: i32 = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldOrder {
    #[default]
    Unknown,
    Progressive,
    TopFirst,
    BottomFirst,
    TopBottom,
    BottomTop,
}

impl FieldOrder {
    /// Anything not signalled as progressive is allocated as two fields.
    #[must_use]
    pub fn is_progressive(self) -> bool {
        matches!(self, Self::Progressive)
    }
}

impl Display for FieldOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Progressive => f.write_str("progressive"),
            Self::TopFirst => f.write_str("tt"),
            Self::BottomFirst => f.write_str("bb"),
            Self::TopBottom => f.write_str("tb"),
            Self::BottomTop => f.write_str("bt"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwPixelFormat {
    #[default]
    Nv12,
    P010,
}

impl SwPixelFormat {
    /// Bytes of one 4:2:0 semi-planar frame in host memory, or `None` if
    /// the size does not fit in `usize`.
    #[must_use]
    pub fn frame_bytes(self, width: u32, height: u32) -> Option<usize> {
        let (width, height) = (usize::try_from(width).ok()?, usize::try_from(height).ok()?);
        let luma = width.checked_mul(height)?;
        let chroma = width
            .div_ceil(2)
            .checked_mul(height.div_ceil(2))?
            .checked_mul(2)?;
        let bytes = luma.checked_add(chroma)?;
        match self {
            Self::Nv12 => Some(bytes),
            Self::P010 => bytes.checked_mul(2),
        }
    }
}

impl Display for SwPixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nv12 => f.write_str("nv12"),
            Self::P010 => f.write_str("p010"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HwPixelFormat {
    #[default]
    Qsv,
}

impl Display for HwPixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qsv => f.write_str("qsv"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImplMode {
    #[default]
    Auto,
    Hardware,
    Software,
}

impl Display for ImplMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Hardware => f.write_str("hardware"),
            Self::Software => f.write_str("software"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub coded_width: u32,
    pub coded_height: u32,
    pub field_order: FieldOrder,
    pub sw_format: SwPixelFormat,
}

impl StreamParams {
    #[must_use]
    pub fn new(coded_width: u32, coded_height: u32) -> Self {
        Self {
            coded_width,
            coded_height,
            field_order: FieldOrder::Progressive,
            sw_format: SwPixelFormat::Nv12,
        }
    }

    #[must_use]
    pub fn interlaced(mut self, field_order: FieldOrder) -> Self {
        self.field_order = field_order;
        self
    }

    #[must_use]
    pub fn with_sw_format(mut self, sw_format: SwPixelFormat) -> Self {
        self.sw_format = sw_format;
        self
    }
}

impl Display for StreamParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamParams(coded={}x{}, field_order={}, sw_format={})",
            self.coded_width, self.coded_height, self.field_order, self.sw_format
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePoolConfig {
    pub width: u32,
    pub height: u32,
    pub format: HwPixelFormat,
    pub sw_format: SwPixelFormat,
    pub initial_pool_size: u32,
    pub frame_type: u32,
}

impl FramePoolConfig {
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.initial_pool_size == 0
    }
}

impl Default for FramePoolConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            format: HwPixelFormat::Qsv,
            sw_format: SwPixelFormat::Nv12,
            initial_pool_size: 0,
            frame_type: 0,
        }
    }
}

impl Display for FramePoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FramePoolConfig({}x{}, format={}, sw_format={}, initial_pool_size={}, frame_type={:#06x})",
            self.width,
            self.height,
            self.format,
            self.sw_format,
            self.initial_pool_size,
            self.frame_type
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

impl Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HwaccelError {
    #[error("failed to create hardware device (status {status})")]
    DeviceCreation { status: i32 },
    #[error("failed to create runtime session (status {status})")]
    SessionCreation { status: i32 },
    #[error("failed to query runtime version (status {status})")]
    VersionQuery { status: i32 },
    #[error("out of memory allocating frame pool")]
    OutOfMemory,
    #[error("failed to initialize frame pool (status {status})")]
    FramePoolInit { status: i32 },
    #[error("stream has no hardware frame pool")]
    NoFramePool,
    #[error("stream hardware acceleration is not initialized")]
    NotInitialized,
    #[error("frame pool exhausted ({capacity} surfaces in use)")]
    PoolExhausted { capacity: u32 },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl HwaccelError {
    /// Negative status code for hosts that speak C-style error returns.
    #[must_use]
    pub fn status(&self) -> i32 {
        match self {
            Self::DeviceCreation { status }
            | Self::SessionCreation { status }
            | Self::VersionQuery { status }
            | Self::FramePoolInit { status } => negative_or(*status, -EIO),
            Self::OutOfMemory | Self::PoolExhausted { .. } => -ENOMEM,
            Self::NoFramePool | Self::NotInitialized | Self::InvalidInput(_) => -EINVAL,
            Self::BackendUnavailable(_) => -ENOSYS,
        }
    }
}

fn negative_or(status: i32, fallback: i32) -> i32 {
    if status < 0 { status } else { fallback }
}

/// Entry point of a runtime backend: device creation and session probing.
pub trait HwRuntime: Send + Sync {
    fn name(&self) -> &'static str;

    fn create_device(&self, device: Option<&str>) -> Result<Arc<dyn DeviceBackend>, HwaccelError>;

    fn open_session(
        &self,
        mode: ImplMode,
        requested: RuntimeVersion,
    ) -> Result<Box<dyn RuntimeSession>, HwaccelError>;
}

/// A short-lived runtime session. Dropping it closes the session.
pub trait RuntimeSession {
    fn query_version(&mut self) -> Result<RuntimeVersion, HwaccelError>;
}

pub trait DeviceBackend: Send + Sync {
    fn describe(&self) -> String;

    fn alloc_frames(&self) -> Result<Box<dyn SurfaceAllocator>, HwaccelError>;
}

/// Backend half of a frame pool. `init` is called once with the final
/// configuration before any surface is requested.
pub trait SurfaceAllocator: Send {
    fn init(&mut self, config: &FramePoolConfig) -> Result<(), HwaccelError>;

    fn allocate_surface(&mut self) -> Result<SurfaceId, HwaccelError>;

    fn release_surface(&mut self, surface: SurfaceId);
}
