mod graph_builder;
mod graph_executor;
mod graph;
mod compiled_graph;
mod executing_graph;
mod retired_graph;

mod dependency_graph;
mod resource_table;
mod resource;
mod graph_resource;

mod pass;
mod pass_context;

mod executor;
mod allocator;
mod transient_resource_cache;

mod error;

pub use graph::RenderGraph;
pub use graph_builder::RenderGraphBuilder;
pub use graph_executor::{GraphExecutor, RenderGraphConfig, RenderGraphState, FrameStats};
pub use compiled_graph::{CompiledRenderGraph, PlannedTransition, ResourceLifetime};

pub use resource::{Resource, ResourceDesc, ResourceKind, ResourceView, TypeEqualTo, SRV, UAV, RT};
pub use graph_resource::{GraphResourceDesc, GraphResourceHandle, GraphResourceRef, ResourceClass};
pub use graph_resource::Handle as RgHandle;
pub use resource_table::ResourceTable;

pub use pass::PassBuilder;
pub use pass_context::PassContext;
pub use executor::{Executor, RenderFunc};
pub use allocator::AllocatorStats;

pub use error::{ConfigurationError, ConfigurationErrors, RenderGraphError};

extern crate log as glog;
