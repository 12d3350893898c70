// MFX runtime backend (Linux).
//
// Loads the oneVPL / Media SDK dispatcher and libva at runtime. The device is
// a DRM render node wrapped in a VA display; pool surfaces are VA surfaces.

use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::raw::{c_int, c_uint};
use std::ptr;
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use crate::contract::{
    DeviceBackend, EINVAL, EIO, ENODEV, FramePoolConfig, HwRuntime, HwaccelError, ImplMode,
    RuntimeSession, SurfaceAllocator, SurfaceId, SwPixelFormat,
};
use crate::version::RuntimeVersion;

pub const DEFAULT_RENDER_NODE: &str = "/dev/dri/renderD128";

type MfxStatus = i32;
type MfxSession = *mut c_void;
type MfxImpl = i32;

const MFX_ERR_NONE: MfxStatus = 0;
const MFX_IMPL_AUTO: MfxImpl = 0x0000;
const MFX_IMPL_SOFTWARE: MfxImpl = 0x0001;
const MFX_IMPL_HARDWARE_ANY: MfxImpl = 0x0004;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct MfxVersion {
    minor: u16,
    major: u16,
}

type MfxInitFn = unsafe extern "C" fn(MfxImpl, *mut MfxVersion, *mut MfxSession) -> MfxStatus;
type MfxQueryVersionFn = unsafe extern "C" fn(MfxSession, *mut MfxVersion) -> MfxStatus;
type MfxCloseFn = unsafe extern "C" fn(MfxSession) -> MfxStatus;

type VaStatus = c_int;
type VaDisplay = *mut c_void;
type VaSurfaceId = c_uint;

const VA_STATUS_SUCCESS: VaStatus = 0;
const VA_RT_FORMAT_YUV420: c_uint = 0x0000_0001;
const VA_RT_FORMAT_YUV420_10: c_uint = 0x0000_0100;

type VaGetDisplayDrmFn = unsafe extern "C" fn(c_int) -> VaDisplay;
type VaInitializeFn = unsafe extern "C" fn(VaDisplay, *mut c_int, *mut c_int) -> VaStatus;
type VaTerminateFn = unsafe extern "C" fn(VaDisplay) -> VaStatus;
type VaCreateSurfacesFn = unsafe extern "C" fn(
    VaDisplay,
    c_uint,
    c_uint,
    c_uint,
    *mut VaSurfaceId,
    c_uint,
    *mut c_void,
    c_uint,
) -> VaStatus;
type VaDestroySurfacesFn = unsafe extern "C" fn(VaDisplay, *mut VaSurfaceId, c_int) -> VaStatus;

struct MfxLibrary {
    _lib: libloading::Library,
    init: MfxInitFn,
    query_version: MfxQueryVersionFn,
    close: MfxCloseFn,
}

struct VaLibrary {
    _libva: libloading::Library,
    _libva_drm: libloading::Library,
    get_display_drm: VaGetDisplayDrmFn,
    initialize: VaInitializeFn,
    terminate: VaTerminateFn,
    create_surfaces: VaCreateSurfacesFn,
    destroy_surfaces: VaDestroySurfacesFn,
}

static MFX_LIB: OnceLock<Result<MfxLibrary, String>> = OnceLock::new();
static VA_LIB: OnceLock<Result<VaLibrary, String>> = OnceLock::new();

fn open_first(candidates: &[&str]) -> Result<libloading::Library, String> {
    let mut diagnostics = Vec::new();
    for name in candidates {
        match unsafe { libloading::Library::new(name) } {
            Ok(lib) => {
                debug!(library = name, "loaded runtime library");
                return Ok(lib);
            }
            Err(err) => diagnostics.push(format!("{name}: {err}")),
        }
    }
    Err(diagnostics.join("; "))
}

fn symbol<T: Copy>(lib: &libloading::Library, name: &[u8]) -> Result<T, String> {
    unsafe { lib.get::<T>(name) }
        .map(|sym| *sym)
        .map_err(|err| format!("{}: {err}", String::from_utf8_lossy(name)))
}

fn load_mfx() -> Result<&'static MfxLibrary, HwaccelError> {
    MFX_LIB
        .get_or_init(|| {
            let lib = open_first(&["libvpl.so.2", "libmfx.so.1", "libmfxhw64.so.1"])?;
            Ok(MfxLibrary {
                init: symbol(&lib, b"MFXInit\0")?,
                query_version: symbol(&lib, b"MFXQueryVersion\0")?,
                close: symbol(&lib, b"MFXClose\0")?,
                _lib: lib,
            })
        })
        .as_ref()
        .map_err(|err| HwaccelError::BackendUnavailable(format!("mfx dispatcher: {err}")))
}

fn load_va() -> Result<&'static VaLibrary, HwaccelError> {
    VA_LIB
        .get_or_init(|| {
            let libva = open_first(&["libva.so.2"])?;
            let libva_drm = open_first(&["libva-drm.so.2"])?;
            Ok(VaLibrary {
                get_display_drm: symbol(&libva_drm, b"vaGetDisplayDRM\0")?,
                initialize: symbol(&libva, b"vaInitialize\0")?,
                terminate: symbol(&libva, b"vaTerminate\0")?,
                create_surfaces: symbol(&libva, b"vaCreateSurfaces\0")?,
                destroy_surfaces: symbol(&libva, b"vaDestroySurfaces\0")?,
                _libva: libva,
                _libva_drm: libva_drm,
            })
        })
        .as_ref()
        .map_err(|err| HwaccelError::BackendUnavailable(format!("libva: {err}")))
}

fn to_mfx_impl(mode: ImplMode) -> MfxImpl {
    match mode {
        ImplMode::Auto => MFX_IMPL_AUTO,
        ImplMode::Hardware => MFX_IMPL_HARDWARE_ANY,
        ImplMode::Software => MFX_IMPL_SOFTWARE,
    }
}

fn status_from_io(err: &std::io::Error) -> i32 {
    err.raw_os_error().map_or(-EIO, |code| -code.abs())
}

/// Runtime backed by the system's MFX dispatcher and libva.
pub struct MfxRuntime {
    mfx: &'static MfxLibrary,
    va: &'static VaLibrary,
}

impl MfxRuntime {
    pub fn load() -> Result<Self, HwaccelError> {
        let runtime = Self {
            mfx: load_mfx()?,
            va: load_va()?,
        };
        info!("mfx runtime libraries loaded");
        Ok(runtime)
    }
}

impl HwRuntime for MfxRuntime {
    fn name(&self) -> &'static str {
        "mfx"
    }

    fn create_device(&self, device: Option<&str>) -> Result<Arc<dyn DeviceBackend>, HwaccelError> {
        let path = device.unwrap_or(DEFAULT_RENDER_NODE);
        let node = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| {
                warn!(path, %err, "cannot open render node");
                HwaccelError::DeviceCreation {
                    status: status_from_io(&err),
                }
            })?;

        let display = unsafe { (self.va.get_display_drm)(node.as_raw_fd()) };
        if display.is_null() {
            return Err(HwaccelError::DeviceCreation { status: -ENODEV });
        }
        let (mut major, mut minor) = (0, 0);
        let status = unsafe { (self.va.initialize)(display, &mut major, &mut minor) };
        if status != VA_STATUS_SUCCESS {
            unsafe {
                (self.va.terminate)(display);
            }
            return Err(HwaccelError::DeviceCreation {
                status: -status.abs(),
            });
        }
        debug!(path, va_major = major, va_minor = minor, "opened VA display");

        Ok(Arc::new(VaDevice {
            va: self.va,
            display,
            path: path.to_string(),
            _node: node,
        }))
    }

    fn open_session(
        &self,
        mode: ImplMode,
        requested: RuntimeVersion,
    ) -> Result<Box<dyn RuntimeSession>, HwaccelError> {
        let mut version = MfxVersion {
            major: requested.major,
            minor: requested.minor,
        };
        let mut session: MfxSession = ptr::null_mut();
        let status = unsafe { (self.mfx.init)(to_mfx_impl(mode), &mut version, &mut session) };
        if status < MFX_ERR_NONE || session.is_null() {
            return Err(HwaccelError::SessionCreation { status });
        }
        Ok(Box::new(MfxProbeSession {
            mfx: self.mfx,
            session,
        }))
    }
}

struct MfxProbeSession {
    mfx: &'static MfxLibrary,
    session: MfxSession,
}

impl RuntimeSession for MfxProbeSession {
    fn query_version(&mut self) -> Result<RuntimeVersion, HwaccelError> {
        let mut version = MfxVersion::default();
        let status = unsafe { (self.mfx.query_version)(self.session, &mut version) };
        if status < MFX_ERR_NONE {
            return Err(HwaccelError::VersionQuery { status });
        }
        Ok(RuntimeVersion::new(version.major, version.minor))
    }
}

impl Drop for MfxProbeSession {
    fn drop(&mut self) {
        unsafe {
            (self.mfx.close)(self.session);
        }
    }
}

struct VaDevice {
    va: &'static VaLibrary,
    display: VaDisplay,
    path: String,
    _node: File,
}

// The VA display is only touched through libva, which is thread-safe per display.
unsafe impl Send for VaDevice {}
unsafe impl Sync for VaDevice {}

impl DeviceBackend for VaDevice {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn alloc_frames(&self) -> Result<Box<dyn SurfaceAllocator>, HwaccelError> {
        Ok(Box::new(VaSurfaceAllocator {
            va: self.va,
            display: self.display,
            layout: None,
        }))
    }
}

impl Drop for VaDevice {
    fn drop(&mut self) {
        unsafe {
            (self.va.terminate)(self.display);
        }
    }
}

struct VaSurfaceAllocator {
    va: &'static VaLibrary,
    display: VaDisplay,
    layout: Option<(c_uint, c_uint, c_uint)>,
}

// Allocators never outlive their pool, and pools hold the device alive.
unsafe impl Send for VaSurfaceAllocator {}

impl SurfaceAllocator for VaSurfaceAllocator {
    fn init(&mut self, config: &FramePoolConfig) -> Result<(), HwaccelError> {
        let rt_format = match config.sw_format {
            SwPixelFormat::Nv12 => VA_RT_FORMAT_YUV420,
            SwPixelFormat::P010 => VA_RT_FORMAT_YUV420_10,
        };
        self.layout = Some((rt_format, config.width, config.height));
        Ok(())
    }

    fn allocate_surface(&mut self) -> Result<SurfaceId, HwaccelError> {
        let (rt_format, width, height) = self
            .layout
            .ok_or(HwaccelError::FramePoolInit { status: -EINVAL })?;
        let mut surface: VaSurfaceId = 0;
        let status = unsafe {
            (self.va.create_surfaces)(
                self.display,
                rt_format,
                width,
                height,
                &mut surface,
                1,
                ptr::null_mut(),
                0,
            )
        };
        if status != VA_STATUS_SUCCESS {
            warn!(status, width, height, "vaCreateSurfaces failed");
            return Err(HwaccelError::OutOfMemory);
        }
        Ok(SurfaceId(surface))
    }

    fn release_surface(&mut self, surface: SurfaceId) {
        let mut id: VaSurfaceId = surface.0;
        let status = unsafe { (self.va.destroy_surfaces)(self.display, &mut id, 1) };
        if status != VA_STATUS_SUCCESS {
            warn!(status, %surface, "vaDestroySurfaces failed");
        }
    }
}
