//! Per-module enumeration policy

use std::sync::Arc;

use arbor_model::ModuleData;
use parking_lot::RwLock;

/// Policy a module applies to enumerations that reach it through a dependency.
pub trait OrderEnumerationHandler: Send + Sync {
    /// Whether the enumerator may continue past this module into its own
    /// dependencies.
    fn should_process_dependencies_recursively(&self) -> bool {
        true
    }

    /// Whether dependents see this module's test roots on their test classpath.
    fn should_include_tests_from_dependent_modules_to_test_classpath(&self) -> bool {
        true
    }
}

pub trait OrderEnumerationHandlerFactory: Send + Sync {
    fn is_applicable(&self, module: &ModuleData) -> bool;
    fn create_handler(&self, module: &ModuleData) -> Box<dyn OrderEnumerationHandler>;
}

/// Combined answer of every applicable handler for one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModulePolicy {
    pub recurse: bool,
    pub include_tests: bool,
}

impl Default for ModulePolicy {
    fn default() -> Self {
        ModulePolicy {
            recurse: true,
            include_tests: true,
        }
    }
}

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    factories: RwLock<Vec<Arc<dyn OrderEnumerationHandlerFactory>>>,
}

impl HandlerRegistry {
    pub(crate) fn register(&self, factory: Arc<dyn OrderEnumerationHandlerFactory>) {
        self.factories.write().push(factory);
    }

    pub(crate) fn len(&self) -> usize {
        self.factories.read().len()
    }

    /// Ask every applicable handler; all of them must agree.
    pub(crate) fn policy(&self, module: &ModuleData) -> ModulePolicy {
        let factories = self.factories.read().clone();
        let mut policy = ModulePolicy::default();
        for factory in factories.iter().filter(|f| f.is_applicable(module)) {
            let handler = factory.create_handler(module);
            policy.recurse &= handler.should_process_dependencies_recursively();
            policy.include_tests &= handler.should_include_tests_from_dependent_modules_to_test_classpath();
        }
        policy
    }
}
