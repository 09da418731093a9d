use std::sync::Arc;

use parking_lot::Mutex;

use crate::pass::PassBuilder;
use crate::pass_context::PassContext;

/// Behavior of a pass.
///
/// `setup` declares what the pass reads and writes, `execute` records its commands once the
/// graph is compiled and every declared resource is bound.
pub trait Executor {
    fn setup(&mut self, _pass: &mut PassBuilder) {}

    fn execute(&mut self, ctx: &mut PassContext) -> anyhow::Result<()>;
}

/// Executors that keep state across frames (e.g. pipelines created on first execute)
/// are shared with the graph through `Arc<Mutex<_>>`.
impl<E: Executor> Executor for Arc<Mutex<E>> {
    fn setup(&mut self, pass: &mut PassBuilder) {
        self.lock().setup(pass);
    }

    fn execute(&mut self, ctx: &mut PassContext) -> anyhow::Result<()> {
        self.lock().execute(ctx)
    }
}

pub type RenderFunc = dyn FnOnce(&mut PassContext) -> anyhow::Result<()>;

pub(crate) enum PassExecutor {
    Object(Box<dyn Executor>),
    Callback(Box<RenderFunc>),
}

impl PassExecutor {
    pub(crate) fn execute(self, ctx: &mut PassContext) -> anyhow::Result<()> {
        match self {
            PassExecutor::Object(mut executor) => executor.execute(ctx),
            PassExecutor::Callback(callback) => callback(ctx),
        }
    }
}
