use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::proxy::ExportProxy;
use crate::{Container, Module, ModuleError, ModuleHandle, ModuleId, Scope};

/// Identifier of the root module every context owns.
pub const ROOT_MODULE_ID: &str = "root";

struct GlobalEntry {
    module: ModuleHandle,
    #[allow(unused)]
    proxy: Arc<ExportProxy>,
}

/// Process-wide wiring state: the root module, its container, and the
/// registry of modules declared global.
///
/// Passed explicitly at module construction instead of living behind a
/// static back-reference; a process-lifetime singleton instance is
/// owned by the application bootstrap layer. The root container is the
/// parent of every module container, which is how global-module exports
/// stay implicitly reachable everywhere without being imported.
pub struct RootContext {
    container: Arc<Container>,
    globals: DashMap<ModuleId, GlobalEntry>,
    root: OnceLock<ModuleHandle>,
}

impl RootContext {
    pub fn new() -> Arc<Self> {
        let id = ModuleId::from(ROOT_MODULE_ID);
        let container = Arc::new(Container::new(id.clone(), Scope::Singleton, None));
        let ctx = Arc::new(Self {
            container: container.clone(),
            globals: DashMap::new(),
            root: OnceLock::new(),
        });
        let root = Module::bootstrap_root(&ctx, id, container);
        let _ = ctx.root.set(root);
        tracing::debug!("Created root context");
        ctx
    }

    /// The root module. Importing it from any other module is an error.
    pub fn root(&self) -> &ModuleHandle {
        self.root.get().expect("Root module is set at construction")
    }

    /// The root container, parent of every module container.
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Registers a module as global: its exports are proxied into the
    /// root container and become resolvable from every module in this
    /// context. Expected to run only during application bootstrap.
    pub fn register_global(&self, module: &ModuleHandle) -> Result<(), ModuleError> {
        if module.id() == self.root().id() {
            return Err(ModuleError::Module(format!(
                "Cannot register {} as global: the identifier is reserved by the root module",
                module.id()
            )));
        }
        if self.globals.contains_key(module.id()) {
            return Err(ModuleError::Module(format!(
                "Global module {} is already registered",
                module.id()
            )));
        }
        let proxy = ExportProxy::install(self.root(), module)?;
        self.globals.insert(
            module.id().clone(),
            GlobalEntry {
                module: module.clone(),
                proxy,
            },
        );
        tracing::debug!(module = %module.id(), "Registered global module");
        Ok(())
    }

    pub fn is_global_module(&self, id: &ModuleId) -> bool {
        self.globals.contains_key(id)
    }

    pub fn global_module(&self, id: &ModuleId) -> Option<ModuleHandle> {
        self.globals.get(id).map(|e| e.module.clone())
    }
}
