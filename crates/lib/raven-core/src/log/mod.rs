use std::collections::HashSet;

use fern::colors::{Color, ColoredLevelConfig};

pub use log::LevelFilter as LevelFilter;

use crate::filesystem::{self, ProjectFolder};

lazy_static::lazy_static! {
    // the null device traces every recorded command, which drowns everything else out.
    static ref GLOBAL_MUTE_MODULE_NAMES: HashSet<&'static str> = HashSet::from([
        "raven_rhi::backend::null::recorder",
    ]);
}

/// Log configuration.
#[derive(Copy, Clone, Debug)]
pub struct LogConfig {
    pub level: LevelFilter,
    /// Also write every record into log/log.txt under the project root.
    pub write_to_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Debug,
            write_to_file: true,
        }
    }
}

/// Initialize log module.
///
/// Fails if a global logger was already installed (e.g. a second call in the same process).
pub fn init_log(config: LogConfig) -> anyhow::Result<()> {
    if config.write_to_file {
        filesystem::exist_or_create(&ProjectFolder::Log)?;
    }
    setup_logger(config)?;

    glog::trace!("log initialized with level {:?}", config.level);
    Ok(())
}

fn is_muted(target: &str) -> bool {
    GLOBAL_MUTE_MODULE_NAMES.contains(target)
}

fn setup_logger(config: LogConfig) -> anyhow::Result<()> {
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Magenta)
        .info(Color::Cyan)
        .warn(Color::Yellow)
        .error(Color::Red);

    // trace, debug and info go to stdout
    let stdout = fern::Dispatch::new()
        .filter(|meta| meta.level() > log::Level::Warn && !is_muted(meta.target()))
        .chain(std::io::stdout());

    // warn and error go to stderr
    let stderr = fern::Dispatch::new()
        .level(LevelFilter::Warn)
        .filter(|meta| !is_muted(meta.target()))
        .chain(std::io::stderr());

    let console_output = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S%.3f]"),
                record.target(),
                colors.color(record.level()),
                message
            ))
        })
        .chain(stdout)
        .chain(stderr);

    let mut dispatch = fern::Dispatch::new()
        .level(config.level)
        .chain(console_output);

    if config.write_to_file {
        let log_file = filesystem::project_folder_path(&ProjectFolder::Log)?.join("log.txt");

        let file_output = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{}[{}][{}] {}",
                    chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S%.3f]"),
                    record.target(),
                    record.level(),
                    message
                ))
            })
            .chain(std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(log_file)?);

        dispatch = dispatch.chain(file_output);
    }

    dispatch.apply()?;
    Ok(())
}

/// Parse a log level name, case insensitive.
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.to_lowercase().trim() {
        "off" => Some(LevelFilter::Off),
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        _ => None,
    }
}
