//! Process log sink and the record plumbing repositories write through.
//!
//! # Responsibility
//! - Install a rotating file sink for the `log` facade, once per process.
//! - Hand repositories a `log::Log` that defaults to that facade.
//!
//! # Invariants
//! - The sink configuration is fixed by the first successful `init_logging`.
//! - Setup failures come back as `Err`; nothing here panics.
//! - Repository records carry table names and ids, never column values.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info, Level, Log, Metadata, Record};
use once_cell::sync::OnceCell;
use std::fmt::Arguments;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "rowmap";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEPT_LOG_FILES: usize = 5;
const PANIC_SUMMARY_CHARS: usize = 160;

static SINK: OnceCell<Sink> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
struct SinkConfig {
    level: &'static str,
    dir: PathBuf,
}

impl SinkConfig {
    fn parse(level: &str, dir: &str) -> Result<Self, String> {
        Ok(Self {
            level: parse_level(level)?,
            dir: parse_log_dir(dir)?,
        })
    }

    /// Accepts `requested` only when it matches the running sink.
    fn accept(&self, requested: &SinkConfig) -> Result<(), String> {
        if self.dir != requested.dir {
            return Err(format!(
                "rowmap logs already go to `{}`, cannot move them to `{}`",
                self.dir.display(),
                requested.dir.display()
            ));
        }
        if self.level != requested.level {
            return Err(format!(
                "rowmap logs already run at `{}`, cannot change to `{}`",
                self.level, requested.level
            ));
        }
        Ok(())
    }
}

struct Sink {
    config: SinkConfig,
    _handle: LoggerHandle,
}

/// Sends `log` records to rotating files named `rowmap*.log` under `log_dir`.
///
/// Repeating the call with the same arguments is a no-op; any other level or
/// directory after the first success is refused.
///
/// # Errors
/// - `level` is not one of trace, debug, info, warn (or warning), error.
/// - `log_dir` is blank, relative, or cannot be created.
/// - The flexi_logger backend fails to start.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let requested = SinkConfig::parse(level, log_dir)?;
    if let Some(sink) = SINK.get() {
        return sink.config.accept(&requested);
    }

    let sink = SINK.get_or_try_init(|| start_sink(requested.clone()))?;
    sink.config.accept(&requested)
}

fn start_sink(config: SinkConfig) -> Result<Sink, String> {
    std::fs::create_dir_all(&config.dir)
        .map_err(|err| format!("cannot create log directory `{}`: {err}", config.dir.display()))?;

    let handle = Logger::try_with_str(config.level)
        .map_err(|err| format!("log level `{}` rejected: {err}", config.level))?
        .log_to_file(
            FileSpec::default()
                .directory(config.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEPT_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("log sink did not start: {err}"))?;

    install_panic_hook();
    info!(
        "event=sink_ready module=logging status=ok crate_version={} level={} dir={}",
        env!("CARGO_PKG_VERSION"),
        config.level,
        config.dir.display()
    );

    Ok(Sink {
        config,
        _handle: handle,
    })
}

/// Level and directory of the running sink, if `init_logging` succeeded.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    SINK.get()
        .map(|sink| (sink.config.level, sink.config.dir.clone()))
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn parse_level(level: &str) -> Result<&'static str, String> {
    let level = level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        _ => Err(format!("unknown log level `{level}`")),
    }
}

fn parse_log_dir(dir: &str) -> Result<PathBuf, String> {
    let dir = dir.trim();
    if dir.is_empty() {
        return Err("log directory is blank".to_string());
    }
    let path = Path::new(dir);
    if path.is_relative() {
        return Err(format!("log directory `{dir}` is not absolute"));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map_or_else(|| "unknown".to_string(), |at| format!("{}:{}", at.file(), at.line()));
        error!(
            "event=panic module=logging status=error location={location} payload={}",
            panic_summary(info)
        );
        previous(info);
    }));
}

// Panic payloads can quote row values: one line, capped.
fn panic_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<non-string payload>".to_string());
    one_line(&payload, PANIC_SUMMARY_CHARS)
}

fn one_line(value: &str, max_chars: usize) -> String {
    let flat = value.replace(['\n', '\r'], " ");
    let mut out: String = flat.chars().take(max_chars).collect();
    if flat.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

/// `log::Log` that forwards to whatever global logger is installed.
///
/// Default logger of every repository; silent until `init_logging` (or any
/// other `log` backend) has been set up.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeLogger;

impl Log for FacadeLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level() && log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            log::logger().log(record);
        }
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

/// Sends one record with string key/values to `logger`.
pub(crate) fn emit(
    logger: &dyn Log,
    level: Level,
    target: &str,
    module_path: &'static str,
    context: &[(&str, &str)],
    args: Arguments<'_>,
) {
    let metadata = Metadata::builder().level(level).target(target).build();
    if !logger.enabled(&metadata) {
        return;
    }
    logger.log(
        &Record::builder()
            .metadata(metadata)
            .args(args)
            .key_values(&context)
            .module_path_static(Some(module_path))
            .build(),
    );
}
