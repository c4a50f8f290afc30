use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::executor::traits::BuildHandler;

/// Handler lookup by id.
///
/// The registry is built from an explicit list of built-ins and injected
/// into each execution context. [`HandlerRegistry::clear`] drops everything
/// registered since and restores that built-in set.
pub struct HandlerRegistry {
    builtins: Vec<Arc<dyn BuildHandler>>,
    handlers: RwLock<HashMap<String, Arc<dyn BuildHandler>>>,
}

impl HandlerRegistry {
    pub fn new(builtins: Vec<Arc<dyn BuildHandler>>) -> Self {
        let handlers = index(&builtins);
        Self {
            builtins,
            handlers: RwLock::new(handlers),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn BuildHandler>>> {
        match self.handlers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn BuildHandler>>> {
        match self.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a handler, replacing any previous one with the same id.
    pub fn register(&self, handler: Arc<dyn BuildHandler>) -> Option<Arc<dyn BuildHandler>> {
        let id = handler.id().to_string();
        let previous = self.write().insert(id.clone(), handler);
        if previous.is_some() {
            tracing::debug!(handler = %id, "handler replaced");
        }
        previous
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn BuildHandler>> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Reset to the built-in set.
    pub fn clear(&self) {
        *self.write() = index(&self.builtins);
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

fn index(handlers: &[Arc<dyn BuildHandler>]) -> HashMap<String, Arc<dyn BuildHandler>> {
    handlers
        .iter()
        .map(|h| (h.id().to_string(), Arc::clone(h)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::error::BuildError;
    use crate::executor::traits::HandlerInput;
    use crate::executor::types::BuildResult;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl BuildHandler for Named {
        fn id(&self) -> &str {
            self.0
        }

        async fn handle(
            &self,
            _ctx: &ExecutionContext,
            _input: HandlerInput<'_>,
        ) -> Result<BuildResult, BuildError> {
            Ok(BuildResult::empty())
        }
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = HandlerRegistry::empty();
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn clear_restores_builtins() {
        let registry = HandlerRegistry::new(vec![Arc::new(Named("setup"))]);
        registry.register(Arc::new(Named("extra")));
        assert_eq!(registry.ids(), vec!["extra".to_string(), "setup".to_string()]);

        registry.clear();
        assert_eq!(registry.ids(), vec!["setup".to_string()]);
        assert!(registry.get("extra").is_none());
    }
}
