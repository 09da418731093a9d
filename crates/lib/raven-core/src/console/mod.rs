use anyhow::anyhow;
use structopt::StructOpt;

use crate::log::{self, LevelFilter};

/// Collect console configuration from the process arguments.
pub fn from_args() -> anyhow::Result<ConsoleVars> {
    ConsoleVarsImpl::from_args().resolve()
}

/// Same as [`from_args`], but from an explicit argument list (the first item is the program name).
pub fn from_iter<I>(args: I) -> anyhow::Result<ConsoleVars>
where
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    ConsoleVarsImpl::from_iter_safe(args)?.resolve()
}

/// Console variables collect from console commands.
#[derive(Clone, Debug)]
pub struct ConsoleVars {
    pub level: LevelFilter,
    /// Number of frames the sandbox runs before exiting.
    pub frames: u32,
    pub frames_in_flight: usize,
    pub enable_aliasing: bool,
    pub cull_unused_passes: bool,
    pub clear_new_resources: bool,
    /// Memory budget of the headless device, in MiB. None means unlimited.
    pub memory_budget_mb: Option<u64>,
    pub log_to_file: bool,
}

#[derive(Debug, StructOpt)]
#[structopt(name = "raven frame graph", about = "Frame graph scheduler and resource allocator sandbox.")]
struct ConsoleVarsImpl {
    /// log level (please choose from off, trace, debug, info, warn, error)
    #[structopt(short, long, default_value = "debug")]
    level: String,

    /// number of frames to run
    #[structopt(short, long, default_value = "8")]
    frames: u32,

    /// number of frames the GPU may still be working on while the CPU records the next one
    #[structopt(long, default_value = "2")]
    frames_in_flight: usize,

    /// never share one physical object between transient resources
    #[structopt(long)]
    no_aliasing: bool,

    /// drop passes that do not contribute to an exported resource
    #[structopt(long)]
    cull: bool,

    /// do not clear newly created resources before their first use
    #[structopt(long)]
    no_clear: bool,

    /// memory budget of the headless device in MiB
    #[structopt(long)]
    memory_budget_mb: Option<u64>,

    /// only log to the console
    #[structopt(long)]
    no_log_file: bool,
}

impl ConsoleVarsImpl {
    fn resolve(self) -> anyhow::Result<ConsoleVars> {
        let level = log::parse_level(&self.level)
            .ok_or_else(|| anyhow!("Unknown log level: {}", self.level))?;

        if self.frames_in_flight == 0 {
            anyhow::bail!("frames-in-flight must be at least 1");
        }

        Ok(ConsoleVars {
            level,
            frames: self.frames,
            frames_in_flight: self.frames_in_flight,
            enable_aliasing: !self.no_aliasing,
            cull_unused_passes: self.cull,
            clear_new_resources: !self.no_clear,
            memory_budget_mb: self.memory_budget_mb,
            log_to_file: !self.no_log_file,
        })
    }
}
