use std::fmt;

use raven_core::result::CombinableError;
use raven_rhi::backend::RHIError;

use crate::resource::ResourceKind;
use crate::graph_executor::RenderGraphState;

/// Problems found while declaring or compiling one frame's graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Dependency cycle between passes {passes:?} through resources {resources:?}")]
    DependencyCycle {
        passes: Vec<String>,
        resources: Vec<String>,
    },

    #[error("Pass {pass:?} writes {resource:?} from version {found}, but version {expected} is the latest one")]
    VersionConflict {
        pass: String,
        resource: String,
        expected: u32,
        found: u32,
    },

    #[error("Pass {pass:?} declares {resource:?} as {requested}, but it is already declared as {previous} in this frame")]
    DescriptorConflict {
        pass: String,
        resource: String,
        previous: String,
        requested: String,
    },

    #[error("Pass {pass:?} uses {resource:?} as a {found:?}, but it is a {expected:?}")]
    KindMismatch {
        pass: String,
        resource: String,
        expected: ResourceKind,
        found: ResourceKind,
    },

    #[error("Pass {pass:?} uses a stale handle of {resource:?}, the resource was evicted")]
    UnresolvedRead {
        pass: String,
        resource: String,
    },
}

impl ConfigurationError {
    pub fn pass_name(&self) -> Option<&str> {
        match self {
            ConfigurationError::DependencyCycle { .. } => None,
            ConfigurationError::VersionConflict { pass, .. }
            | ConfigurationError::DescriptorConflict { pass, .. }
            | ConfigurationError::KindMismatch { pass, .. }
            | ConfigurationError::UnresolvedRead { pass, .. } => Some(pass),
        }
    }
}

/// Every configuration error of one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationErrors(pub Vec<ConfigurationError>);

impl ConfigurationErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, ConfigurationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<ConfigurationError> for ConfigurationErrors {
    fn from(err: ConfigurationError) -> Self {
        Self(vec![err])
    }
}

impl CombinableError for ConfigurationErrors {
    fn combine(&mut self, mut other: Self) {
        self.0.append(&mut other.0);
    }
}

impl fmt::Display for ConfigurationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} render graph configuration error(s):", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  - {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigurationErrors {}

#[derive(Debug, thiserror::Error)]
pub enum RenderGraphError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationErrors),

    #[error("Render graph is {found:?}, expected {expected:?}")]
    InvalidState {
        expected: RenderGraphState,
        found: RenderGraphState,
    },

    #[error("Render device error: {0}")]
    Device(#[from] RHIError),
}
