//! Step handler registry: handler name -> `BoxStepHandler`.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::step::{BoxStepHandler, StepHandler};

/// Registry of step handlers, consulted once when a spec is bound.
#[derive(Debug, Default, Clone)]
pub struct StepRegistry {
    handlers: BTreeMap<String, Arc<BoxStepHandler>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own name, replacing any previous one.
    pub fn register<T: StepHandler + 'static>(&mut self, handler: T) -> &mut Self {
        let boxed = BoxStepHandler::new(handler);
        self.handlers
            .insert(boxed.name().to_string(), Arc::new(boxed));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<BoxStepHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::{StepError, StepInput, StepOutput};

    struct Named(&'static str);

    impl StepHandler for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, _input: &StepInput) -> Result<StepOutput, StepError> {
            Ok(StepOutput::default())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = StepRegistry::new();
        registry.register(Named("b")).register(Named("a"));

        assert!(registry.contains("a"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.get("b").unwrap().name(), "b");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
