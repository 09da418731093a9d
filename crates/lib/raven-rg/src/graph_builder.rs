use std::ops::{Deref, DerefMut};

use crate::executor::Executor;
use crate::graph::RenderGraph;
use crate::graph_resource::{Handle, ResourceClass};
use crate::resource::{Resource, ResourceDesc, TypeEqualTo};

const BUILDER_DECLARER: &str = "<builder>";

/// The render graph as seen from `GraphExecutor::prepare()`.
///
/// Frame level declarations (transients shared by several passes, temporal resources, exports)
/// go through here, passes are added through `add_pass()` of the underlying graph.
pub struct RenderGraphBuilder {
    render_graph: RenderGraph,
}

impl Deref for RenderGraphBuilder {
    type Target = RenderGraph;

    fn deref(&self) -> &Self::Target {
        &self.render_graph
    }
}

impl DerefMut for RenderGraphBuilder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.render_graph
    }
}

impl RenderGraphBuilder {
    pub(crate) fn new(render_graph: RenderGraph) -> Self {
        Self { render_graph }
    }

    pub fn frame_index(&self) -> u64 {
        self.render_graph.frame()
    }

    /// Create a resource only alive inside this frame.
    /// Its physical object is pooled by descriptor and may be shared with other transients.
    pub fn create_transient<Desc: ResourceDesc>(
        &mut self,
        name: &str,
        desc: Desc,
    ) -> Handle<<Desc as ResourceDesc>::Resource>
    where
        Desc: TypeEqualTo<Other = <<Desc as ResourceDesc>::Resource as Resource>::Desc>,
    {
        self.render_graph.create_handle(name, desc, ResourceClass::Transient, BUILDER_DECLARER)
    }

    /// Get or create a resource whose content survives across frames.
    ///
    /// The first call creates the resource, later frames get the very same physical object back
    /// as long as `desc` does not change. It is never aliased and abandoned frames leave it alone.
    pub fn get_or_create_temporal<Desc: ResourceDesc>(
        &mut self,
        name: &str,
        desc: Desc,
    ) -> Handle<<Desc as ResourceDesc>::Resource>
    where
        Desc: TypeEqualTo<Other = <<Desc as ResourceDesc>::Resource as Resource>::Desc>,
    {
        self.render_graph.create_handle(name, desc, ResourceClass::Persistent, BUILDER_DECLARER)
    }

    /// Mark the resource as an output of the frame.
    /// With pass culling enabled, only passes contributing to exported resources survive.
    pub fn export<Res: Resource>(&mut self, handle: &Handle<Res>) {
        if handle.frame != self.render_graph.frame() {
            glog::warn!("Export of a handle from frame {} ignored in frame {}", handle.frame, self.render_graph.frame());
            return;
        }

        self.render_graph.mark_exported(handle.resource);
    }

    /// Add a pass driven by `executor`.
    /// [`Executor::setup`] declares the pass resources before the executor is bound to it.
    pub fn add_executor_pass(&mut self, name: &str, mut executor: Box<dyn Executor>) {
        let mut pass = self.render_graph.add_pass(name);
        executor.setup(&mut pass);
        pass.set_executor(executor);
    }

    /// Finish the building, no more declarations can be made afterwards.
    pub(crate) fn build(self) -> RenderGraph {
        self.render_graph
    }
}
