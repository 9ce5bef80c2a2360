//! `evreactor`: CLI entrypoint wiring the config loader, device backend, and
//! async event loop around the reactor core.

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use rx_config::Settings;
use rx_context::Context;
use rx_devices::DevicePattern;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// `evreactor` reacts to evdev input with a declarative binding DSL, the
/// way the reference daemon did: a config defines boolean predicates over
/// key/switch/axis state, each paired with a shell command that runs on a
/// rising edge.
#[derive(Parser, Debug)]
#[command(name = "evreactor", version, about = "Rule-driven evdev reactor")]
struct Args {
    /// Monitor mode: print every input event from matched devices and exit
    /// on Ctrl-C, without loading or evaluating any bindings.
    #[arg(short = 'm', long = "monitor", conflicts_with_all = ["config", "inline", "log_events"])]
    monitor: bool,

    /// Info mode: print per-device name/phys/path diagnostics for matched
    /// devices, then exit without starting the event loop.
    #[arg(short = 'I', long = "info")]
    info: bool,

    /// Echo every input event (typecode and value) before dispatching it.
    #[arg(short = 'l', long = "log-events")]
    log_events: bool,

    /// Suppress non-fatal warnings (device ioctl failures, command-spawn
    /// failures, and the like).
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Glob pattern of `*.cfg` binding files to load. Defaults to the
    /// settings file's `[config].glob`, or `rx_config::DEFAULT_BINDING_GLOB`.
    #[arg(short = 'c', long = "config")]
    config: Option<String>,

    /// Inline binding source, in place of any config file.
    #[arg(short = 'e', long = "eval")]
    inline: Option<String>,

    /// Optional path to a settings TOML file, overriding discovery.
    #[arg(long = "settings")]
    settings: Option<PathBuf>,

    /// Write logs to this file (rolling, one per run) in addition to
    /// stderr. If omitted, logging goes to stderr only.
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,

    /// Device patterns (`name=<glob>`, `phys=<glob>`, `dev=<glob>`, or a
    /// bare device-path glob). No patterns matches every `/dev/input/event*`
    /// node.
    device_patterns: Vec<String>,
}

/// Installs a stderr subscriber leveled from `level` (or `RUST_LOG` if set),
/// clamped to `error` under `-q`, plus an optional non-blocking rolling file
/// writer when `log_file` names one. Matches the teacher's
/// `tracing-appender` + `EnvFilter` pairing; the returned guard must be kept
/// alive for the file writer to flush on shutdown.
fn configure_logging(level: &str, quiet: bool, log_file: Option<&std::path::Path>) -> Option<WorkerGuard> {
    let effective_level = if quiet { "error" } else { level };
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(effective_level))
    };

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "evreactor.log".to_string());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            match tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(writer)
                .try_init()
            {
                Ok(()) => Some(guard),
                Err(_) => None,
            }
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .try_init();
            None
        }
    }
}

fn parse_patterns(raw: &[String]) -> Vec<DevicePattern> {
    raw.iter().map(|p| DevicePattern::parse(p)).collect()
}

/// Opens every device matching `patterns` and prints each event it produces
/// verbatim (no bindings loaded, no evaluation) until the process is
/// killed. Mirrors the reference daemon's `-m` diagnostic mode.
async fn run_monitor(patterns: &[DevicePattern]) -> Result<()> {
    let opened = rx_devices::scan_and_open(patterns, None);
    if opened.is_empty() {
        bail!("monitor mode: no devices matched the given patterns");
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(PathBuf, evdev::InputEvent)>();
    for (path, device) in opened {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut stream = match device.into_event_stream() {
                Ok(s) => s,
                Err(error) => {
                    warn!(path = %path.display(), %error, "failed to open device for monitoring");
                    return;
                }
            };
            while let Ok(ev) = stream.next_event().await {
                if tx.send((path.clone(), ev)).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    println!("monitoring (Ctrl-C to exit)...");
    while let Some((path, ev)) = rx.recv().await {
        let type_name = rx_codes::type_name(ev.event_type().0);
        match rx_codes::code_name(ev.event_type().0, ev.code()) {
            Some(name) => println!("{}: {} {} = {}", path.display(), type_name, name, ev.value()),
            None => println!("{}: {} code={} = {}", path.display(), type_name, ev.code(), ev.value()),
        }
    }
    Ok(())
}

/// Prints name/phys/supported-classes diagnostics for every device matching
/// `patterns`, then returns. Mirrors the reference daemon's `-I` mode.
fn run_info(patterns: &[DevicePattern]) -> Result<()> {
    let mut matched_any = false;
    for (path, device) in evdev::enumerate() {
        if !rx_devices::device_matches(patterns, &path, &device) {
            continue;
        }
        matched_any = true;
        println!("{}", path.display());
        println!("  name: {}", device.name().unwrap_or("?"));
        println!("  phys: {}", device.physical_path().unwrap_or("?"));
        for event_type in device.supported_events().iter() {
            println!("  supports: {}", rx_codes::type_name(event_type.0));
        }
    }
    if !matched_any {
        println!("no devices matched the given patterns");
    }
    Ok(())
}

fn load_bindings(args: &Args, settings: &Settings) -> Result<Vec<rx_parser::ParsedBinding>> {
    if let Some(inline) = &args.inline {
        return Ok(rx_config::load_inline(inline)?);
    }
    let pattern = args.config.clone().unwrap_or_else(|| settings.config.glob.clone());
    let bindings = rx_config::load_glob(&pattern)?;
    if bindings.is_empty() {
        bail!("no bindings loaded from '{pattern}'; refusing to run with an empty rule set");
    }
    Ok(bindings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = rx_config::load_settings(args.settings.as_deref());
    let quiet = args.quiet || settings.daemon.quiet;
    let _log_guard = configure_logging(&settings.daemon.log_level, quiet, args.log_file.as_deref());

    let patterns = parse_patterns(&args.device_patterns);

    if args.info {
        return run_info(&patterns);
    }
    if args.monitor {
        return run_monitor(&patterns).await;
    }

    let parsed = load_bindings(&args, &settings).context("loading bindings")?;
    let mut ctx = Context::init(parsed);
    info!(bindings = ctx.binding_count(), states = ctx.state_count(), "bindings indexed");

    let opened = rx_devices::scan_and_open(&patterns, Some(&mut ctx));
    if opened.is_empty() {
        warn!("no devices matched the given patterns; waiting for hotplug only");
    }

    let hotplug = match rx_devices::HotplugWatcher::watch(std::path::Path::new(rx_devices::DEV_INPUT)) {
        Ok(watcher) => Some(watcher),
        Err(error) => {
            warn!(%error, "could not watch /dev/input for hotplug; running with startup devices only");
            None
        }
    };

    let event_loop = rx_runtime::EventLoop::new(ctx, patterns, args.log_events);
    event_loop.spawn_readers(opened);
    event_loop.run(hotplug).await;
    Ok(())
}
