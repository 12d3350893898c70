use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use qsv_hwaccel::{
    DeviceBackend, FieldOrder, FramePoolConfig, HwRuntime, HwaccelContext, HwaccelError,
    HwaccelHooks, HwaccelOptions, HwFrame, ImplMode, InputStream, PoolSizePolicy, PoolSizeRule,
    RuntimeSession, RuntimeVersion, StreamParams, SurfaceAllocator, SurfaceId, SwPixelFormat,
    SystemRuntime,
};
use rstest::rstest;

#[derive(Debug, Clone, Copy, Default)]
enum Failure {
    #[default]
    None,
    Device,
    Session,
    Query,
    Alloc,
    PoolInit,
}

#[derive(Default)]
struct Counters {
    devices: AtomicUsize,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    pools_allocated: AtomicUsize,
    surfaces: AtomicUsize,
    released: AtomicUsize,
}

struct FakeRuntime {
    version: RuntimeVersion,
    failure: Failure,
    counters: Arc<Counters>,
    last_config: Arc<Mutex<Option<FramePoolConfig>>>,
}

impl FakeRuntime {
    fn new(version: RuntimeVersion, failure: Failure) -> Self {
        Self {
            version,
            failure,
            counters: Arc::new(Counters::default()),
            last_config: Arc::new(Mutex::new(None)),
        }
    }
}

impl HwRuntime for FakeRuntime {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn create_device(&self, _device: Option<&str>) -> Result<Arc<dyn DeviceBackend>, HwaccelError> {
        if matches!(self.failure, Failure::Device) {
            return Err(HwaccelError::DeviceCreation { status: -19 });
        }
        self.counters.devices.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeDevice {
            failure: self.failure,
            counters: Arc::clone(&self.counters),
            last_config: Arc::clone(&self.last_config),
        }))
    }

    fn open_session(
        &self,
        _mode: ImplMode,
        _requested: RuntimeVersion,
    ) -> Result<Box<dyn RuntimeSession>, HwaccelError> {
        if matches!(self.failure, Failure::Session) {
            return Err(HwaccelError::SessionCreation { status: -3 });
        }
        self.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            version: self.version,
            fail_query: matches!(self.failure, Failure::Query),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct FakeSession {
    version: RuntimeVersion,
    fail_query: bool,
    counters: Arc<Counters>,
}

impl RuntimeSession for FakeSession {
    fn query_version(&mut self) -> Result<RuntimeVersion, HwaccelError> {
        if self.fail_query {
            return Err(HwaccelError::VersionQuery { status: -1 });
        }
        Ok(self.version)
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeDevice {
    failure: Failure,
    counters: Arc<Counters>,
    last_config: Arc<Mutex<Option<FramePoolConfig>>>,
}

impl DeviceBackend for FakeDevice {
    fn describe(&self) -> String {
        "fake0".to_string()
    }

    fn alloc_frames(&self) -> Result<Box<dyn SurfaceAllocator>, HwaccelError> {
        if matches!(self.failure, Failure::Alloc) {
            return Err(HwaccelError::OutOfMemory);
        }
        self.counters.pools_allocated.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeAllocator {
            fail_init: matches!(self.failure, Failure::PoolInit),
            next: 0,
            counters: Arc::clone(&self.counters),
            last_config: Arc::clone(&self.last_config),
        }))
    }
}

struct FakeAllocator {
    fail_init: bool,
    next: u32,
    counters: Arc<Counters>,
    last_config: Arc<Mutex<Option<FramePoolConfig>>>,
}

impl SurfaceAllocator for FakeAllocator {
    fn init(&mut self, config: &FramePoolConfig) -> Result<(), HwaccelError> {
        if self.fail_init {
            return Err(HwaccelError::OutOfMemory);
        }
        *self.last_config.lock().unwrap() = Some(config.clone());
        Ok(())
    }

    fn allocate_surface(&mut self) -> Result<SurfaceId, HwaccelError> {
        self.counters.surfaces.fetch_add(1, Ordering::SeqCst);
        self.next += 1;
        Ok(SurfaceId(self.next))
    }

    fn release_surface(&mut self, _surface: SurfaceId) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn fake_context(runtime: FakeRuntime) -> (HwaccelContext, Arc<Counters>) {
    let counters = Arc::clone(&runtime.counters);
    (
        HwaccelContext::with_runtime(Arc::new(runtime), HwaccelOptions::default()),
        counters,
    )
}

#[rstest]
#[case(FieldOrder::Progressive, 1080, 1080)]
#[case(FieldOrder::TopFirst, 540, 1080)]
#[case(FieldOrder::BottomFirst, 288, 576)]
#[case(FieldOrder::TopBottom, 240, 480)]
#[case(FieldOrder::BottomTop, 240, 480)]
#[case(FieldOrder::Unknown, 544, 1088)]
fn pool_height_follows_field_order(
    #[case] field_order: FieldOrder,
    #[case] coded_height: u32,
    #[case] expected_height: u32,
) {
    let mut ctx = HwaccelContext::with_runtime(
        Arc::new(SystemRuntime::default()),
        HwaccelOptions::default(),
    );
    let mut stream = InputStream::new(StreamParams::new(1920, coded_height).interlaced(field_order));
    ctx.init_stream(&mut stream).unwrap();

    let config = stream.frame_pool().unwrap().config();
    assert_eq!(config.width, 1920);
    assert_eq!(config.height, expected_height);
}

#[rstest]
#[case(RuntimeVersion::new(1, 1), 64)]
#[case(RuntimeVersion::new(1, 19), 64)]
#[case(RuntimeVersion::new(1, 20), 0)]
#[case(RuntimeVersion::new(2, 0), 0)]
#[case(RuntimeVersion::new(2, 9), 0)]
fn pool_size_is_pinned_only_for_legacy_runtimes(
    #[case] version: RuntimeVersion,
    #[case] expected: u32,
) {
    for (width, height) in [(352, 288), (1920, 1080), (3840, 2160)] {
        let mut ctx = HwaccelContext::with_runtime(
            Arc::new(SystemRuntime::with_version(version)),
            HwaccelOptions::default(),
        );
        let mut stream = InputStream::new(StreamParams::new(width, height));
        ctx.init_stream(&mut stream).unwrap();
        let pool = stream.frame_pool().unwrap();
        assert_eq!(pool.config().initial_pool_size, expected);
        assert_eq!(pool.allocated_surfaces(), expected as usize);
    }
}

#[test]
fn pool_config_carries_format_and_memory_type() {
    let runtime = FakeRuntime::new(RuntimeVersion::new(2, 0), Failure::None);
    let runtime_config = Arc::clone(&runtime.last_config);
    let (mut ctx, _) = fake_context(runtime);
    let mut stream = InputStream::new(
        StreamParams::new(1280, 720).with_sw_format(SwPixelFormat::P010),
    );
    ctx.init_stream(&mut stream).unwrap();

    let seen = runtime_config.lock().unwrap().clone().unwrap();
    assert_eq!(&seen, stream.frame_pool().unwrap().config());
    assert_eq!(seen.sw_format, SwPixelFormat::P010);
    assert_eq!(seen.frame_type, qsv_hwaccel::MFX_MEMTYPE_VIDEO_MEMORY_DECODER_TARGET);
    assert_eq!(seen.format, qsv_hwaccel::HwPixelFormat::Qsv);
}

#[test]
fn second_init_keeps_the_existing_pool() {
    let (mut ctx, counters) =
        fake_context(FakeRuntime::new(RuntimeVersion::new(1, 19), Failure::None));
    let mut stream = InputStream::new(StreamParams::new(720, 288).interlaced(FieldOrder::TopFirst));

    ctx.init_stream(&mut stream).unwrap();
    let first = stream.frame_pool().unwrap().clone();
    ctx.init_stream(&mut stream).unwrap();
    let second = stream.frame_pool().unwrap();

    assert!(first.ptr_eq(second));
    assert_eq!(second.config().height, 576);
    assert_eq!(counters.pools_allocated.load(Ordering::SeqCst), 1);
    assert_eq!(counters.surfaces.load(Ordering::SeqCst), 64);
    assert_eq!(counters.devices.load(Ordering::SeqCst), 1);
    assert_eq!(counters.sessions_opened.load(Ordering::SeqCst), 2);
    assert_eq!(counters.sessions_closed.load(Ordering::SeqCst), 2);
    assert!(stream.hooks().is_some());
}

#[test]
fn device_is_shared_across_streams() {
    let (mut ctx, counters) =
        fake_context(FakeRuntime::new(RuntimeVersion::new(2, 0), Failure::None));
    let mut a = InputStream::new(StreamParams::new(1920, 1080));
    let mut b = InputStream::new(StreamParams::new(1280, 720)).with_device("/dev/dri/renderD129");
    ctx.init_stream(&mut a).unwrap();
    ctx.init_stream(&mut b).unwrap();

    assert_eq!(counters.devices.load(Ordering::SeqCst), 1);
    assert!(
        a.frame_pool()
            .unwrap()
            .device()
            .same_device(b.frame_pool().unwrap().device())
    );
    assert!(!a.frame_pool().unwrap().ptr_eq(b.frame_pool().unwrap()));
}

#[rstest]
#[case(Failure::Device, -19)]
#[case(Failure::Session, -3)]
#[case(Failure::Query, -1)]
#[case(Failure::Alloc, -12)]
#[case(Failure::PoolInit, -12)]
fn failures_abort_setup_without_side_effects(#[case] failure: Failure, #[case] status: i32) {
    let (mut ctx, counters) = fake_context(FakeRuntime::new(RuntimeVersion::new(2, 0), failure));
    let mut stream = InputStream::new(StreamParams::new(1920, 1080));

    let err = ctx.init_stream(&mut stream).unwrap_err();
    assert_eq!(err.status(), status);
    assert!(stream.frame_pool().is_none());
    assert!(stream.hooks().is_none());
    assert!(matches!(
        stream.get_buffer(),
        Err(HwaccelError::NotInitialized)
    ));

    match failure {
        Failure::Device => {
            assert!(matches!(err, HwaccelError::DeviceCreation { .. }));
            assert!(ctx.device().is_none());
            assert_eq!(counters.sessions_opened.load(Ordering::SeqCst), 0);
            assert_eq!(counters.pools_allocated.load(Ordering::SeqCst), 0);
        }
        Failure::Session | Failure::Query => {
            assert!(ctx.device().is_some());
            assert_eq!(counters.pools_allocated.load(Ordering::SeqCst), 0);
            assert_eq!(
                counters.sessions_opened.load(Ordering::SeqCst),
                counters.sessions_closed.load(Ordering::SeqCst)
            );
        }
        Failure::Alloc => assert!(matches!(err, HwaccelError::OutOfMemory)),
        Failure::PoolInit => {
            assert!(matches!(err, HwaccelError::FramePoolInit { status: -12 }));
            assert_eq!(counters.pools_allocated.load(Ordering::SeqCst), 1);
            assert_eq!(counters.surfaces.load(Ordering::SeqCst), 0);
        }
        Failure::None => unreachable!(),
    }
}

#[test]
fn get_buffer_serves_from_the_stream_pool_until_exhausted() {
    let mut ctx = HwaccelContext::with_runtime(
        Arc::new(SystemRuntime::default()),
        HwaccelOptions {
            pool_size: 3,
            ..HwaccelOptions::default()
        },
    );
    let mut stream = InputStream::new(StreamParams::new(640, 480));
    ctx.init_stream(&mut stream).unwrap();

    let frames = (0..3)
        .map(|_| stream.get_buffer().unwrap())
        .collect::<Vec<HwFrame>>();
    assert!(matches!(
        stream.get_buffer(),
        Err(HwaccelError::PoolExhausted { capacity: 3 })
    ));
    drop(frames);
    assert!(stream.get_buffer().is_ok());
}

#[test]
fn teardown_releases_stream_reference_but_not_live_frames() {
    let (mut ctx, counters) =
        fake_context(FakeRuntime::new(RuntimeVersion::new(1, 19), Failure::None));
    let mut stream = InputStream::new(StreamParams::new(1920, 1080));
    ctx.init_stream(&mut stream).unwrap();

    let frame = stream.get_buffer().unwrap();
    stream.uninit();
    assert!(stream.frame_pool().is_none());
    assert!(matches!(stream.get_buffer(), Err(HwaccelError::NoFramePool)));
    assert_eq!(counters.released.load(Ordering::SeqCst), 0);
    assert_eq!(frame.height(), 1080);

    drop(frame);
    assert_eq!(counters.released.load(Ordering::SeqCst), 64);

    stream.uninit();
    ctx.init_stream(&mut stream).unwrap();
    assert_eq!(counters.pools_allocated.load(Ordering::SeqCst), 2);
}

#[test]
fn custom_policy_table_is_consulted() {
    let policy = PoolSizePolicy::new(vec![PoolSizeRule {
        max_version: RuntimeVersion::new(2, 5),
        initial_pool_size: 8,
    }]);
    let mut ctx = HwaccelContext::with_runtime(
        Arc::new(SystemRuntime::with_version(RuntimeVersion::new(2, 0))),
        HwaccelOptions::default(),
    )
    .with_policy(policy);
    let mut stream = InputStream::new(StreamParams::new(1920, 1080));
    ctx.init_stream(&mut stream).unwrap();
    assert_eq!(stream.frame_pool().unwrap().config().initial_pool_size, 8);
}

struct CountingHooks {
    inner: qsv_hwaccel::QsvHooks,
    served: AtomicUsize,
}

impl HwaccelHooks for CountingHooks {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn get_buffer(&self, stream: &InputStream) -> Result<HwFrame, HwaccelError> {
        self.served.fetch_add(1, Ordering::SeqCst);
        self.inner.get_buffer(stream)
    }

    fn uninit(&self, stream: &mut InputStream) {
        self.inner.uninit(stream);
    }
}

#[test]
fn hooks_are_substitutable() {
    let mut ctx = HwaccelContext::with_runtime(
        Arc::new(SystemRuntime::default()),
        HwaccelOptions::default(),
    );
    let mut stream = InputStream::new(StreamParams::new(320, 240));
    ctx.init_stream(&mut stream).unwrap();

    let hooks = Arc::new(CountingHooks {
        inner: qsv_hwaccel::QsvHooks,
        served: AtomicUsize::new(0),
    });
    stream.set_hooks(hooks.clone());
    let _a = stream.get_buffer().unwrap();
    let _b = stream.get_buffer().unwrap();
    assert_eq!(hooks.served.load(Ordering::SeqCst), 2);
    assert_eq!(stream.hooks().unwrap().name(), "counting");
}
