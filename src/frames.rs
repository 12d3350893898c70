use std::sync::{Arc, Mutex, MutexGuard};
use std::{fmt, fmt::Display};

use tracing::{debug, error};

use crate::contract::{EINVAL, FramePoolConfig, HwaccelError, SurfaceAllocator, SurfaceId};
use crate::device::DeviceContext;

/// Allocated but not yet initialized frame pool. Fill in `config`, then
/// call [`FramePoolBuilder::init`].
pub struct FramePoolBuilder {
    pub config: FramePoolConfig,
    device: DeviceContext,
    allocator: Box<dyn SurfaceAllocator>,
}

impl FramePoolBuilder {
    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    pub fn init(self) -> Result<FramePool, HwaccelError> {
        let Self {
            config,
            device,
            mut allocator,
        } = self;
        if config.width == 0 || config.height == 0 {
            return Err(HwaccelError::FramePoolInit { status: -EINVAL });
        }
        allocator
            .init(&config)
            .map_err(|err| HwaccelError::FramePoolInit {
                status: err.status(),
            })?;

        let mut state = PoolState {
            allocator,
            free: Vec::with_capacity(config.initial_pool_size as usize),
            allocated: 0,
        };
        for _ in 0..config.initial_pool_size {
            let surface = state.allocator.allocate_surface().map_err(|err| {
                HwaccelError::FramePoolInit {
                    status: err.status(),
                }
            })?;
            state.free.push(surface);
            state.allocated += 1;
        }
        debug!(%config, %device, "initialized frame pool");

        Ok(FramePool {
            shared: Arc::new(PoolShared {
                config,
                device,
                state: Mutex::new(state),
            }),
        })
    }
}

impl fmt::Debug for FramePoolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePoolBuilder")
            .field("config", &self.config)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

struct PoolState {
    allocator: Box<dyn SurfaceAllocator>,
    free: Vec<SurfaceId>,
    allocated: usize,
}

struct PoolShared {
    config: FramePoolConfig,
    device: DeviceContext,
    state: Mutex<PoolState>,
}

impl PoolShared {
    fn recycle(&self, surface: SurfaceId) {
        lock_state(&self.state).free.push(surface);
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        for surface in state.free.drain(..) {
            state.allocator.release_surface(surface);
        }
        debug!(surfaces = state.allocated, "released frame pool");
    }
}

/// Shared reference to an initialized pool of decode-target surfaces.
#[derive(Clone)]
pub struct FramePool {
    shared: Arc<PoolShared>,
}

impl FramePool {
    pub fn alloc(device: &DeviceContext) -> Result<FramePoolBuilder, HwaccelError> {
        let allocator = device.alloc_frames().map_err(|err| {
            error!(%device, %err, "frame pool allocation failed");
            HwaccelError::OutOfMemory
        })?;
        Ok(FramePoolBuilder {
            config: FramePoolConfig::default(),
            device: device.clone(),
            allocator,
        })
    }

    pub fn config(&self) -> &FramePoolConfig {
        &self.shared.config
    }

    pub fn device(&self) -> &DeviceContext {
        &self.shared.device
    }

    /// Hands out a free surface. Fixed-size pools fail once every surface
    /// is in use; dynamic pools grow through the backend.
    pub fn acquire(&self) -> Result<HwFrame, HwaccelError> {
        let mut state = lock_state(&self.shared.state);
        let surface = match state.free.pop() {
            Some(surface) => surface,
            None if self.shared.config.is_dynamic() => {
                let surface = state.allocator.allocate_surface()?;
                state.allocated += 1;
                surface
            }
            None => {
                return Err(HwaccelError::PoolExhausted {
                    capacity: self.shared.config.initial_pool_size,
                });
            }
        };
        drop(state);
        Ok(HwFrame {
            surface,
            pool: Arc::clone(&self.shared),
        })
    }

    pub fn allocated_surfaces(&self) -> usize {
        lock_state(&self.shared.state).allocated
    }

    pub fn free_surfaces(&self) -> usize {
        lock_state(&self.shared.state).free.len()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Owners of this pool: pool handles plus outstanding frames.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("config", &self.shared.config)
            .field("device", &self.shared.device)
            .finish_non_exhaustive()
    }
}

/// A decode-target surface on loan from a [`FramePool`]. The surface goes
/// back to the pool when the frame is dropped.
pub struct HwFrame {
    surface: SurfaceId,
    pool: Arc<PoolShared>,
}

impl HwFrame {
    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn width(&self) -> u32 {
        self.pool.config.width
    }

    pub fn height(&self) -> u32 {
        self.pool.config.height
    }

}

impl Drop for HwFrame {
    fn drop(&mut self) {
        self.pool.recycle(self.surface);
    }
}

impl fmt::Debug for HwFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HwFrame")
            .field("surface", &self.surface)
            .field("width", &self.pool.config.width)
            .field("height", &self.pool.config.height)
            .finish()
    }
}

impl Display for HwFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{} {})",
            self.surface, self.pool.config.width, self.pool.config.height, self.pool.config.format
        )
    }
}

fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
