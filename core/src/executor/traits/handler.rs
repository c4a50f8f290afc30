use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::BuildError;
use crate::executor::types::{BuildNode, BuildResult};

/// What a handler receives for one node.
pub struct HandlerInput<'a> {
    pub node: &'a BuildNode,
    /// Results of the node's declared prerequisites, keyed by task id.
    pub dependencies: HashMap<String, BuildResult>,
}

impl<'a> HandlerInput<'a> {
    pub fn new(node: &'a BuildNode, dependencies: HashMap<String, BuildResult>) -> Self {
        Self { node, dependencies }
    }

    /// Typed payload of a prerequisite.
    pub fn dependency<T: Any + Send + Sync>(&self, task_id: &str) -> Option<Arc<T>> {
        self.dependencies.get(task_id).and_then(|r| r.data::<T>())
    }

    /// First prerequisite payload of type `T`, in declaration order.
    pub fn find_dependency<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.node
            .requires
            .iter()
            .find_map(|id| self.dependency::<T>(id))
    }
}

/// A pluggable unit of work bound to task nodes by id.
///
/// Handlers classify every failure as retryable or not before returning it.
/// Returning `Ok` with an unsuccessful [`BuildResult`] also fails the node.
#[async_trait]
pub trait BuildHandler: Send + Sync {
    fn id(&self) -> &str;

    async fn handle(
        &self,
        ctx: &ExecutionContext,
        input: HandlerInput<'_>,
    ) -> Result<BuildResult, BuildError>;
}
