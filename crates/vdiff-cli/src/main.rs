use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vdiff::{
    Backend, BackendSettings, Catalog, DiffResult, ImageCache, ImageOrigin, Pipeline,
    PipelineError, PipelineEvent, RenderConfig, TestState, TestSuite,
};

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    BadArg(String),
    Io(std::io::Error),
    Core(vdiff::Error),
    Pipeline(PipelineError),
    Json(serde_json::Error),
    /// At least one backend did not match the ground truth.
    Mismatch,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::BadArg(msg) => write!(f, "{msg}\n\n{}", usage()),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Core(err) => write!(f, "{err}"),
            CliError::Pipeline(err) => write!(f, "{err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
            CliError::Mismatch => write!(f, "one or more backends differ from the ground truth"),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<vdiff::Error> for CliError {
    fn from(value: vdiff::Error) -> Self {
        Self::Core(value)
    }
}

impl From<PipelineError> for CliError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Command {
    #[default]
    Render,
    Diff,
    Backends,
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    inputs: Vec<String>,
    pretty: bool,
    config: Option<String>,
    view_size: Option<u32>,
    scale: Option<f64>,
    suite: Option<TestSuite>,
    backends: Vec<(Backend, Option<String>)>,
    work_dir: Option<String>,
    fonts_dir: Option<String>,
    timeout_ms: Option<u64>,
    no_cache: bool,
    out_dir: Option<String>,
    out: Option<String>,
}

fn usage() -> &'static str {
    "vdiff-cli\n\
\n\
USAGE:\n\
  vdiff-cli [render] [--config <file.json>] [--view-size <px>] [--scale <n>] [--suite own|official|custom] [--backend <name>[=<tool>]]... [--work-dir <dir>] [--fonts-dir <dir>] [--timeout-ms <ms>] [--no-cache] [--out-dir <dir>] [--pretty] <svg>\n\
  vdiff-cli diff [--out <diff.png>] [--pretty] <reference.png> <candidate.png>\n\
  vdiff-cli backends\n\
\n\
NOTES:\n\
  - render prints a JSON summary; --out-dir also writes <backend>.png and <backend>-diff.png.\n\
  - --backend may be repeated; flags override entries from --config.\n\
  - Exit status is 3 when any backend crashed or differs from the ground truth.\n\
  - Set VDIFF_LOG (e.g. VDIFF_LOG=debug) to see tool output and pipeline progress.\n\
"
}

fn value<'a>(it: &mut impl Iterator<Item = &'a String>) -> Result<&'a String, CliError> {
    it.next().ok_or(CliError::Usage(usage()))
}

fn number<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T, CliError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| CliError::BadArg(format!("invalid value for {flag}: {raw}")))
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "render" if args.inputs.is_empty() => args.command = Command::Render,
            "diff" if args.inputs.is_empty() => args.command = Command::Diff,
            "backends" if args.inputs.is_empty() => args.command = Command::Backends,
            "--pretty" => args.pretty = true,
            "--no-cache" => args.no_cache = true,
            "--config" => args.config = Some(value(&mut it)?.clone()),
            "--view-size" => {
                let size: u32 = number(a, value(&mut it)?)?;
                if size == 0 {
                    return Err(CliError::BadArg("--view-size must be positive".to_string()));
                }
                args.view_size = Some(size);
            }
            "--scale" => {
                let scale: f64 = number(a, value(&mut it)?)?;
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(CliError::BadArg(format!("invalid value for --scale: {scale}")));
                }
                args.scale = Some(scale);
            }
            "--suite" => {
                let raw = value(&mut it)?;
                args.suite = Some(
                    raw.parse::<TestSuite>()
                        .map_err(|()| CliError::BadArg(format!("unknown test suite: {raw}")))?,
                );
            }
            "--backend" => {
                let raw = value(&mut it)?;
                let (name, tool) = match raw.split_once('=') {
                    Some((name, tool)) => (name, Some(tool.to_string())),
                    None => (raw.as_str(), None),
                };
                let backend = name
                    .parse::<Backend>()
                    .map_err(|err| CliError::BadArg(err.to_string()))?;
                args.backends.push((backend, tool));
            }
            "--work-dir" => args.work_dir = Some(value(&mut it)?.clone()),
            "--fonts-dir" => args.fonts_dir = Some(value(&mut it)?.clone()),
            "--timeout-ms" => args.timeout_ms = Some(number(a, value(&mut it)?)?),
            "--out-dir" => args.out_dir = Some(value(&mut it)?.clone()),
            "--out" => args.out = Some(value(&mut it)?.clone()),
            "--" => {
                args.inputs.extend(it.by_ref().cloned());
            }
            other if other.starts_with('-') => {
                return Err(CliError::BadArg(format!("unknown option: {other}")));
            }
            path => args.inputs.push(path.to_string()),
        }
    }

    let expected = match args.command {
        Command::Render => 1,
        Command::Diff => 2,
        Command::Backends => 0,
    };
    if args.inputs.len() != expected {
        return Err(CliError::Usage(usage()));
    }
    Ok(args)
}

fn write_json(value: &impl Serialize, pretty: bool) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    if pretty {
        serde_json::to_writer_pretty(&mut out, value)?;
    } else {
        serde_json::to_writer(&mut out, value)?;
    }
    use std::io::Write as _;
    writeln!(out)?;
    Ok(())
}

fn build_config(args: &Args) -> Result<RenderConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => RenderConfig::load(Path::new(path))?,
        None => RenderConfig::default(),
    };
    if let Some(size) = args.view_size {
        config.view_size = size;
    }
    if let Some(scale) = args.scale {
        config.scale = scale;
    }
    if let Some(suite) = args.suite {
        config.test_suite = suite;
    }
    if let Some(dir) = &args.work_dir {
        config.work_dir = PathBuf::from(dir);
    }
    if let Some(dir) = &args.fonts_dir {
        config.fonts_dir = Some(PathBuf::from(dir));
    }
    if args.timeout_ms.is_some() {
        config.timeout_ms = args.timeout_ms;
    }
    if args.no_cache {
        config.use_cache = false;
    }
    for (backend, tool) in &args.backends {
        match config.backends.iter_mut().find(|s| s.backend == *backend) {
            Some(settings) => {
                settings.enabled = true;
                if tool.is_some() {
                    settings.path = tool.clone();
                }
            }
            None => {
                let mut settings = BackendSettings::new(*backend);
                settings.path = tool.clone();
                config.backends.push(settings);
            }
        }
    }
    if config.enabled_backends().is_empty() {
        return Err(CliError::BadArg("no backends enabled".to_string()));
    }
    Ok(config)
}

#[derive(Serialize)]
struct DiffOut {
    mismatched: u64,
    percent: f64,
    stats: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_mismatch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

impl DiffOut {
    fn new(diff: &DiffResult, image: Option<&Path>) -> Self {
        Self {
            mismatched: diff.mismatched,
            percent: diff.percent,
            stats: diff.stats_text(),
            size_mismatch: diff.size_mismatch_message(),
            image: image.map(|p| p.display().to_string()),
        }
    }
}

#[derive(Serialize)]
struct BackendOut {
    backend: Backend,
    state: TestState,
    origin: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diff: Option<DiffOut>,
}

#[derive(Serialize)]
struct RenderOut {
    svg: String,
    suite: TestSuite,
    size: u32,
    backends: Vec<BackendOut>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

fn run_render(args: &Args) -> Result<(), CliError> {
    let config = build_config(args)?;
    let svg = std::path::absolute(&args.inputs[0])?;

    let cache = if config.cache_enabled() {
        Some(ImageCache::open(&config.work_dir)?)
    } else {
        None
    };
    let mut pipeline = Pipeline::new(Catalog::standard(), cache)?;
    let config = Arc::new(config);

    let mut warnings = Vec::new();
    let mut errors = Vec::new();
    pipeline
        .render(&svg, Arc::clone(&config))
        .for_each_blocking(|event| match event {
            PipelineEvent::ImageReady(img) => {
                tracing::info!(backend = %img.backend, "image ready");
            }
            PipelineEvent::DiffReady(diff) => {
                tracing::info!(backend = %diff.backend, stats = %diff.stats_text(), "diff ready");
            }
            PipelineEvent::Warning(msg) => warnings.push(msg),
            PipelineEvent::Error(err) => errors.push(err),
            PipelineEvent::AllRendered | PipelineEvent::AllDiffed | PipelineEvent::Finished => {}
        });

    let out_dir = args.out_dir.as_deref().map(PathBuf::from);
    if let Some(dir) = &out_dir {
        std::fs::create_dir_all(dir)?;
    }

    let session = pipeline.session();
    let mut backends = Vec::new();
    let truth = session.ground_truth(config.test_suite).map(|img| img.backend);
    let mut all_passed = true;
    for backend in session.backends() {
        let Some(image) = session.image(backend) else {
            continue;
        };
        let diff = session.diff(backend);
        let state = session.state(backend);
        // The ground truth is never diffed, so it has no verdict of its own.
        if backend != Backend::Reference && Some(backend) != truth && state != TestState::Passed {
            all_passed = false;
        }

        let mut image_path = None;
        let mut diff_path = None;
        if let Some(dir) = &out_dir {
            let path = dir.join(format!("{}.png", backend.name()));
            vdiff::canvas::save_png(&image.image, &path)?;
            image_path = Some(path);
            if let Some(diff) = diff {
                let path = dir.join(format!("{}-diff.png", backend.name()));
                vdiff::canvas::save_png(&diff.image, &path)?;
                diff_path = Some(path);
            }
        }

        backends.push(BackendOut {
            backend,
            state,
            origin: match image.origin {
                ImageOrigin::Rendered => "rendered",
                ImageOrigin::Cached => "cached",
                ImageOrigin::Placeholder { .. } => "placeholder",
            },
            error: image.failure().map(str::to_string),
            width: image.image.width(),
            height: image.image.height(),
            image: image_path.map(|p| p.display().to_string()),
            diff: diff.map(|d| DiffOut::new(d, diff_path.as_deref())),
        });
    }

    write_json(
        &RenderOut {
            svg: svg.display().to_string(),
            suite: config.test_suite,
            size: config.target_size(),
            backends,
            warnings,
            errors: errors.iter().map(ToString::to_string).collect(),
        },
        args.pretty,
    )?;
    pipeline.close()?;

    if let Some(err) = errors.into_iter().next() {
        return Err(err.into());
    }
    if !all_passed {
        return Err(CliError::Mismatch);
    }
    Ok(())
}

fn run_diff(args: &Args) -> Result<(), CliError> {
    let reference = vdiff::canvas::load(Path::new(&args.inputs[0]))?;
    let candidate = vdiff::canvas::load(Path::new(&args.inputs[1]))?;

    // The backend tag only labels messages here.
    let result = vdiff::diff(Backend::Resvg, &reference, &candidate);
    let out = args.out.as_deref().map(Path::new);
    if let Some(path) = out {
        vdiff::canvas::save_png(&result.image, path)?;
    }

    write_json(&DiffOut::new(&result, out), args.pretty)?;
    if result.is_exact_match() && result.size_mismatch.is_none() {
        Ok(())
    } else {
        Err(CliError::Mismatch)
    }
}

fn run_backends() -> Result<(), CliError> {
    for backend in Backend::ALL {
        let kind = if backend.is_in_process() {
            "in-process"
        } else {
            "external"
        };
        let cached = if backend.is_cacheable() { ", cached" } else { "" };
        println!("{:<14} {} ({kind}{cached})", backend.name(), backend.title());
    }
    Ok(())
}

fn run(args: Args) -> Result<(), CliError> {
    match args.command {
        Command::Render => run_render(&args),
        Command::Diff => run_diff(&args),
        Command::Backends => run_backends(),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("VDIFF_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(err @ (CliError::Usage(_) | CliError::BadArg(_))) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    init_logging();

    match run(args) {
        Ok(()) => {}
        Err(CliError::Mismatch) => {
            eprintln!("{}", CliError::Mismatch);
            std::process::exit(3);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
