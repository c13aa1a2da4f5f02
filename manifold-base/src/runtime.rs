use std::str::FromStr as _;
use std::sync::{Arc, OnceLock};

use manifold::{Module, ModuleHandle, ModuleOptions, RootContext, Scope};
use serde::{Deserialize, Serialize};

use crate::{Config, ConfigSection, StdError};

/// Defaults applied to modules built through a [`Runtime`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Default resolution scope for modules that declare none.
    #[serde(default)]
    pub default_scope: Option<String>,
}

impl ConfigSection for ModulesConfig {
    fn key() -> &'static str {
        "modules"
    }
}

/// Bootstrap owner of a root context.
///
/// The root context is passed explicitly into every module built here;
/// [`Runtime::global`] keeps one process-lifetime instance for
/// applications that want a single shared wiring graph.
pub struct Runtime {
    context: Arc<RootContext>,
    defaults: ModulesConfig,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            context: RootContext::new(),
            defaults: ModulesConfig::default(),
        }
    }

    pub fn with_config(config: &Config) -> Result<Self, StdError> {
        let defaults = config
            .get::<Option<ModulesConfig>>(ModulesConfig::key())?
            .unwrap_or_default();
        Ok(Self {
            context: RootContext::new(),
            defaults,
        })
    }

    /// The process-lifetime runtime instance.
    pub fn global() -> &'static Runtime {
        static INSTANCE: OnceLock<Runtime> = OnceLock::new();
        INSTANCE.get_or_init(Runtime::new)
    }

    pub fn context(&self) -> &Arc<RootContext> {
        &self.context
    }

    pub fn root(&self) -> &ModuleHandle {
        self.context.root()
    }

    /// Builds a module in this runtime's context, applying configured
    /// defaults to options that leave them unset.
    pub async fn build_module(&self, options: ModuleOptions) -> Result<ModuleHandle, StdError> {
        let options = match &self.defaults.default_scope {
            Some(scope) => options.default_scope_if_unset(Scope::from_str(scope)?),
            None => options,
        };
        Ok(Module::build(options, &self.context).await?)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
