use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use qsv_hwaccel::{
    BackendKind, FieldOrder, HwaccelContext, HwaccelOptions, ImplMode, InputStream,
    RuntimeVersion, StreamParams, SwPixelFormat, SystemRuntime,
};

#[derive(Parser, Debug)]
#[command(about = "Probe the QSV runtime and show the decode surface pool it would get")]
struct Args {
    #[arg(long, default_value = "auto")]
    backend: String,
    #[arg(long)]
    device: Option<String>,
    #[arg(long, default_value = "auto")]
    impl_mode: String,
    #[arg(long, default_value_t = 1920)]
    width: u32,
    #[arg(long, default_value_t = 1080)]
    height: u32,
    #[arg(long, default_value_t = false)]
    interlaced: bool,
    #[arg(long, default_value = "nv12")]
    sw_format: String,
    #[arg(long, default_value_t = 0)]
    pool_size: u32,
    /// Version reported by the system backend.
    #[arg(long)]
    system_version: Option<String>,
    /// Acquire this many surfaces after init to exercise the pool.
    #[arg(long, default_value_t = 0)]
    acquire: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let backend = args
        .backend
        .parse::<BackendKind>()
        .context("invalid --backend")?;
    let sw_format = parse_sw_format(&args.sw_format)?;

    let mut options = HwaccelOptions::from_env();
    options.impl_mode = parse_impl_mode(&args.impl_mode)?;
    if args.device.is_some() {
        options.device = args.device.clone();
    }
    if args.pool_size > 0 {
        options.pool_size = args.pool_size;
    }

    let mut ctx = match &args.system_version {
        Some(raw) => {
            let version = raw
                .parse::<RuntimeVersion>()
                .context("invalid --system-version")?;
            HwaccelContext::with_runtime(Arc::new(SystemRuntime::with_version(version)), options)
        }
        None => HwaccelContext::new(backend, options).context("failed to load runtime")?,
    };

    let mut params = StreamParams::new(args.width, args.height).with_sw_format(sw_format);
    if args.interlaced {
        params = params.interlaced(FieldOrder::TopFirst);
    }
    let mut stream = InputStream::new(params);

    let version = ctx
        .init_stream(&mut stream)
        .context("hardware frame pool setup failed")?;
    let pool = stream
        .frame_pool()
        .context("stream has no frame pool after init")?;

    let mut frames = Vec::with_capacity(args.acquire);
    for _ in 0..args.acquire {
        frames.push(stream.get_buffer().context("get_buffer failed")?);
    }

    println!("{}", ctx.options());
    println!(
        "runtime={}, version={}, stream={}, device={}, pool={}, allocated={}, in_use={}",
        ctx.runtime_name(),
        version,
        stream.params(),
        pool.device(),
        pool.config(),
        pool.allocated_surfaces(),
        frames.len()
    );

    drop(frames);
    stream.uninit();
    Ok(())
}

fn parse_sw_format(value: &str) -> Result<SwPixelFormat> {
    match value.to_ascii_lowercase().as_str() {
        "nv12" => Ok(SwPixelFormat::Nv12),
        "p010" | "p010le" => Ok(SwPixelFormat::P010),
        _ => bail!("unsupported --sw-format: {value}"),
    }
}

fn parse_impl_mode(value: &str) -> Result<ImplMode> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Ok(ImplMode::Auto),
        "hw" | "hardware" => Ok(ImplMode::Hardware),
        "sw" | "software" => Ok(ImplMode::Software),
        _ => bail!("unsupported --impl-mode: {value}"),
    }
}
