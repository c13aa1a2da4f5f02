use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;

use crate::container::downcast_instance;
use crate::definition::{Definition, ModuleUpdateExt as _};
use crate::{
    Container, ExportEntry, Injectable, InstanceRef, Middlewares, ModuleError, ModuleEvent,
    ModuleId, Provider, RequestCache, Resolution, RootContext, Scope, Signal, Token,
};

/// Shared handle to a module. Importers, blueprints, and event payloads
/// all refer to modules through this type.
pub type ModuleHandle = Arc<Module>;

pub type HookFn = Arc<dyn Fn() + Send + Sync>;

/// Optional callbacks bracketing `reset` and `dispose`.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub(crate) before_reset: Option<HookFn>,
    pub(crate) after_reset: Option<HookFn>,
    pub(crate) before_dispose: Option<HookFn>,
    pub(crate) after_dispose: Option<HookFn>,
}

/// Raw export declaration inside [`ModuleOptions`], matched by
/// identifier against providers and imports during construction.
#[derive(Clone, Debug)]
pub enum ExportTarget {
    Provider(Token),
    Module(ModuleId),
}

pub(crate) enum ImportItem {
    Module(ModuleHandle),
    Blueprint(Arc<ModuleBlueprint>),
    Lazy(Box<dyn ResolveModule>),
}

/// In-memory options describing a module: identifier, imports,
/// providers, exports, default scope, global flag, and lifecycle hooks.
pub struct ModuleOptions {
    pub(crate) id: ModuleId,
    pub(crate) imports: Vec<ImportItem>,
    pub(crate) providers: Vec<Provider>,
    pub(crate) exports: Vec<ExportTarget>,
    pub(crate) default_scope: Option<Scope>,
    pub(crate) global: bool,
    pub(crate) hooks: LifecycleHooks,
}

impl ModuleOptions {
    pub fn new(id: impl Into<ModuleId>) -> Self {
        Self {
            id: id.into(),
            imports: Vec::new(),
            providers: Vec::new(),
            exports: Vec::new(),
            default_scope: None,
            global: false,
            hooks: LifecycleHooks::default(),
        }
    }

    pub fn import(mut self, module: ModuleHandle) -> Self {
        self.imports.push(ImportItem::Module(module));
        self
    }

    pub fn import_blueprint(mut self, blueprint: Arc<ModuleBlueprint>) -> Self {
        self.imports.push(ImportItem::Blueprint(blueprint));
        self
    }

    pub fn import_lazy(mut self, resolver: impl ResolveModule + 'static) -> Self {
        self.imports.push(ImportItem::Lazy(Box::new(resolver)));
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn export_provider(mut self, token: impl Into<Token>) -> Self {
        self.exports.push(ExportTarget::Provider(token.into()));
        self
    }

    pub fn export_module(mut self, id: impl Into<ModuleId>) -> Self {
        self.exports.push(ExportTarget::Module(id.into()));
        self
    }

    pub fn default_scope(mut self, scope: Scope) -> Self {
        self.default_scope = Some(scope);
        self
    }

    /// Applies a scope only when none was set explicitly. Used by
    /// configuration layers supplying defaults.
    pub fn default_scope_if_unset(mut self, scope: Scope) -> Self {
        if self.default_scope.is_none() {
            self.default_scope = Some(scope);
        }
        self
    }

    pub fn global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }

    pub fn before_reset(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.before_reset = Some(Arc::new(hook));
        self
    }

    pub fn after_reset(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.after_reset = Some(Arc::new(hook));
        self
    }

    pub fn before_dispose(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.before_dispose = Some(Arc::new(hook));
        self
    }

    pub fn after_dispose(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.after_dispose = Some(Arc::new(hook));
        self
    }
}

/// Asynchronously resolves a module, e.g. for deferred or circular
/// module graphs.
#[async_trait]
pub trait ResolveModule: Send + Sync {
    async fn resolve(&self, ctx: &Arc<RootContext>) -> Result<ModuleHandle, ModuleError>;
}

struct FnResolver<F>(F);

#[async_trait]
impl<F, Fut> ResolveModule for FnResolver<F>
where
    F: Fn(Arc<RootContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ModuleHandle, ModuleError>> + Send + 'static,
{
    async fn resolve(&self, ctx: &Arc<RootContext>) -> Result<ModuleHandle, ModuleError> {
        (self.0)(ctx.clone()).await
    }
}

/// Wraps an async closure into a [`ResolveModule`] implementation.
pub fn resolver_fn<F, Fut>(resolver: F) -> impl ResolveModule
where
    F: Fn(Arc<RootContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ModuleHandle, ModuleError>> + Send + 'static,
{
    FnResolver(resolver)
}

/// Reusable, not-yet-instantiated template of module options.
///
/// Materializes at most once: every importer referencing the same
/// blueprint receives the same module instance. Direct blueprint cycles
/// fail with a module error; break them with lazy imports instead.
pub struct ModuleBlueprint {
    id: ModuleId,
    global: bool,
    options: Mutex<Option<ModuleOptions>>,
    built: Mutex<Option<ModuleHandle>>,
}

impl ModuleBlueprint {
    pub fn new(options: ModuleOptions) -> Arc<Self> {
        Arc::new(Self {
            id: options.id.clone(),
            global: options.global,
            options: Mutex::new(Some(options)),
            built: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn is_materialized(&self) -> bool {
        self.built.lock().unwrap().is_some()
    }

    pub async fn materialize(&self, ctx: &Arc<RootContext>) -> Result<ModuleHandle, ModuleError> {
        ResolveModule::resolve(self, ctx).await
    }
}

#[async_trait]
impl ResolveModule for ModuleBlueprint {
    async fn resolve(&self, ctx: &Arc<RootContext>) -> Result<ModuleHandle, ModuleError> {
        if let Some(module) = self.built.lock().unwrap().clone() {
            return Ok(module);
        }
        let options = self.options.lock().unwrap().take().ok_or_else(|| {
            ModuleError::Module(format!("Blueprint {} is already materializing", self.id))
        })?;
        let module = Module::build(options, ctx).await?;
        *self.built.lock().unwrap() = Some(module.clone());
        Ok(module)
    }
}

/// Result of one resolution returned by [`Module::get_raw`] and
/// [`Module::get_many`].
#[derive(Clone)]
pub enum Resolved {
    One(InstanceRef),
    Many(Vec<InstanceRef>),
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolved::One(_) => f.write_str("One"),
            Resolved::Many(values) => write!(f, "Many({})", values.len()),
        }
    }
}

/// One dependency request inside [`Module::get_many`].
#[derive(Clone, Debug)]
pub struct DependencySpec {
    pub token: Token,
    pub optional: bool,
    pub as_list: bool,
}

impl DependencySpec {
    pub fn new(token: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
            optional: false,
            as_list: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn as_list(mut self) -> Self {
        self.as_list = true;
        self
    }
}

impl From<Token> for DependencySpec {
    fn from(token: Token) -> Self {
        Self::new(token)
    }
}

/// A named DI scope bundling providers, imports, and exports.
///
/// Owns one container adapter, one middleware registry, one event bus,
/// and one export proxy per imported module. Graph mutations go through
/// [`Module::update`]; resolution goes through the `get` family.
pub struct Module {
    id: ModuleId,
    global: bool,
    context: Weak<RootContext>,
    container: Arc<Container>,
    middlewares: Middlewares,
    signal: Signal<ModuleEvent>,
    pub(crate) state: RwLock<Definition>,
    emitting: AtomicBool,
    disposed: AtomicBool,
    hooks: LifecycleHooks,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module").field("id", &self.id).finish()
    }
}

impl Module {
    /// Builds a module from options inside a root context: validates the
    /// identifier, initializes the container against the root container,
    /// installs providers, materializes and adds imports, and registers
    /// the module globally when flagged.
    pub async fn build(
        options: ModuleOptions,
        ctx: &Arc<RootContext>,
    ) -> Result<ModuleHandle, ModuleError> {
        let ModuleOptions {
            id,
            imports,
            providers,
            exports,
            default_scope,
            global,
            hooks,
        } = options;
        if id.is_empty() {
            return Err(ModuleError::MissingIdentifier);
        }
        let default_scope = default_scope.unwrap_or_default();
        let container = Arc::new(Container::new(
            id.clone(),
            default_scope,
            Some(ctx.container().clone()),
        ));
        let module = Arc::new(Module {
            id: id.clone(),
            global,
            context: Arc::downgrade(ctx),
            container,
            middlewares: Middlewares::new(id.clone()),
            signal: Signal::new(),
            state: RwLock::new(Definition::default()),
            emitting: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            hooks,
        });
        tracing::debug!(module = %module.id, "Building module");
        Self::build_initial(&module, imports, providers, exports, ctx).await?;
        if global {
            ctx.register_global(&module)?;
        }
        Ok(module)
    }

    pub(crate) fn bootstrap_root(
        ctx: &Arc<RootContext>,
        id: ModuleId,
        container: Arc<Container>,
    ) -> ModuleHandle {
        Arc::new(Module {
            id: id.clone(),
            global: false,
            context: Arc::downgrade(ctx),
            container,
            middlewares: Middlewares::new(id),
            signal: Signal::new(),
            state: RwLock::new(Definition::default()),
            emitting: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            hooks: LifecycleHooks::default(),
        })
    }

    async fn build_initial(
        module: &ModuleHandle,
        imports: Vec<ImportItem>,
        providers: Vec<Provider>,
        exports: Vec<ExportTarget>,
        ctx: &Arc<RootContext>,
    ) -> Result<(), ModuleError> {
        // Providers first; export targets referencing modules or
        // blueprints wait for the import loop below.
        for provider in providers {
            let exported = exports
                .iter()
                .any(|t| matches!(t, ExportTarget::Provider(token) if token == provider.token()));
            module.update().add_provider(provider, exported)?;
        }
        for item in imports {
            let import = match item {
                ImportItem::Module(import) => import,
                ImportItem::Blueprint(blueprint) => {
                    if blueprint.is_global() {
                        continue;
                    }
                    blueprint.materialize(ctx).await?
                }
                ImportItem::Lazy(resolver) => resolver.resolve(ctx).await?,
            };
            if import.is_global() {
                // Already reachable through the container hierarchy.
                tracing::trace!(module = %module.id, import = %import.id(), "Skipped global import");
                continue;
            }
            let add_to_exports = exports
                .iter()
                .any(|t| matches!(t, ExportTarget::Module(id) if id == import.id()));
            module.update().add_import(import, add_to_exports)?;
        }
        // Export targets matching neither a provider nor an import are
        // tolerated; resolution through them simply finds nothing.
        for target in exports {
            if let ExportTarget::Provider(token) = target {
                let missing = {
                    let state = module.state.read().unwrap();
                    !state.exports.iter().any(|e| e.matches_token(&token))
                };
                if missing {
                    let entry = ExportEntry::Provider(token.clone());
                    module.state.write().unwrap().exports.push(entry.clone());
                    module.emit_event(ModuleEvent::ExportAdded(entry));
                    module.emit_event(ModuleEvent::ProviderExported(token));
                }
            }
        }
        Ok(())
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_live(&self) -> Result<(), ModuleError> {
        if self.is_disposed() {
            return Err(ModuleError::Disposed(self.id.clone()));
        }
        Ok(())
    }

    pub(crate) fn context(&self) -> Option<Arc<RootContext>> {
        self.context.upgrade()
    }

    /// The underlying container adapter.
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// The module's middleware registry.
    pub fn middlewares(&self) -> &Middlewares {
        &self.middlewares
    }

    /// The module's event bus.
    pub fn events(&self) -> &Signal<ModuleEvent> {
        &self.signal
    }

    /// Emits an event unless an emission for this module is already on
    /// the stack. Cascading operations and bubbling through re-export
    /// cycles re-enter this path; the guard keeps them from recursing.
    pub(crate) fn emit_event(&self, event: ModuleEvent) {
        if self.emitting.swap(true, Ordering::SeqCst) {
            tracing::trace!(module = %self.id, event = ?event, "Skipped re-entrant emission");
            return;
        }
        self.signal.emit(event);
        self.emitting.store(false, Ordering::SeqCst);
    }

    pub(crate) fn exports_snapshot(&self) -> Vec<ExportEntry> {
        self.state.read().unwrap().exports.clone()
    }

    pub fn has_provider(&self, token: &Token) -> Result<bool, ModuleError> {
        self.ensure_live()?;
        Ok(self.container.is_bound(token))
    }

    pub fn is_importing_module(&self, id: &ModuleId) -> bool {
        let state = self.state.read().unwrap();
        state.imports.iter().any(|r| r.module.id() == id)
    }

    pub fn is_exporting_module(&self, id: &ModuleId) -> bool {
        let state = self.state.read().unwrap();
        state.exports.iter().any(|e| e.matches_module(id))
    }

    pub fn is_exporting_provider(&self, token: &Token) -> bool {
        let state = self.state.read().unwrap();
        state.exports.iter().any(|e| e.matches_token(token))
    }

    /// Resolves a token through the `before_get` pipeline.
    ///
    /// `Ok(None)` covers both the explicit interception sentinel and an
    /// optional miss; a non-optional miss is a missing-provider error.
    pub fn get_raw(
        &self,
        token: &Token,
        optional: bool,
        as_list: bool,
    ) -> Result<Option<Resolved>, ModuleError> {
        let request = RequestCache::new();
        self.get_raw_with(token, optional, as_list, &request)
    }

    fn get_raw_with(
        &self,
        token: &Token,
        optional: bool,
        as_list: bool,
        request: &RequestCache,
    ) -> Result<Option<Resolved>, ModuleError> {
        self.ensure_live()?;
        let seed = self.container.resolution(token, as_list, request)?;
        let resolver = |t: &Token| -> Resolution {
            self.container
                .resolution(t, false, request)
                .unwrap_or(Resolution::Missing)
        };
        let outcome = self.middlewares.apply_before_get(seed, token, &resolver)?;
        match outcome {
            Resolution::One(value) => Ok(Some(Resolved::One(value))),
            Resolution::Many(values) => Ok(Some(Resolved::Many(values))),
            Resolution::Nothing => Ok(None),
            Resolution::Missing => {
                if optional {
                    Ok(None)
                } else {
                    Err(ModuleError::MissingProvider {
                        module: self.id.clone(),
                        token: token.clone(),
                    })
                }
            }
        }
    }

    pub fn get<T: Send + Sync + 'static>(&self, token: &Token) -> Result<Arc<T>, ModuleError> {
        match self.get_raw(token, false, false)? {
            Some(Resolved::One(value)) => downcast_instance(value, token, &self.id),
            _ => Err(ModuleError::MissingProvider {
                module: self.id.clone(),
                token: token.clone(),
            }),
        }
    }

    pub fn get_optional<T: Send + Sync + 'static>(
        &self,
        token: &Token,
    ) -> Result<Option<Arc<T>>, ModuleError> {
        match self.get_raw(token, true, false)? {
            Some(Resolved::One(value)) => Ok(Some(downcast_instance(value, token, &self.id)?)),
            _ => Ok(None),
        }
    }

    pub fn get_all<T: Send + Sync + 'static>(
        &self,
        token: &Token,
    ) -> Result<Vec<Arc<T>>, ModuleError> {
        match self.get_raw(token, false, true)? {
            Some(Resolved::Many(values)) => values
                .into_iter()
                .map(|v| downcast_instance(v, token, &self.id))
                .collect(),
            Some(Resolved::One(value)) => Ok(vec![downcast_instance(value, token, &self.id)?]),
            None => Err(ModuleError::MissingProvider {
                module: self.id.clone(),
                token: token.clone(),
            }),
        }
    }

    /// Typed sugar for self-bound providers.
    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>, ModuleError> {
        self.get(&Token::of::<T>())
    }

    /// Resolves several dependencies positionally, sharing one
    /// request-scope span across the whole call.
    pub fn get_many(
        &self,
        specs: &[DependencySpec],
    ) -> Result<Vec<Option<Resolved>>, ModuleError> {
        self.ensure_live()?;
        let request = RequestCache::new();
        specs
            .iter()
            .map(|spec| self.get_raw_with(&spec.token, spec.optional, spec.as_list, &request))
            .collect()
    }

    /// Returns the module to a pristine, reusable state: middleware
    /// registry cleared, providers unbound, proxies disposed, all three
    /// definition sets emptied.
    pub fn reset(&self) -> Result<(), ModuleError> {
        self.ensure_live()?;
        if let Some(hook) = &self.hooks.before_reset {
            hook();
        }
        tracing::debug!(module = %self.id, "Resetting module");
        self.middlewares.clear();
        let records = {
            let mut state = self.state.write().unwrap();
            state.providers.clear();
            state.exports.clear();
            std::mem::take(&mut state.imports)
        };
        for record in records {
            record.teardown();
        }
        self.container.unbind_all()?;
        if let Some(hook) = &self.hooks.after_reset {
            hook();
        }
        Ok(())
    }

    /// Terminal teardown: resets, then permanently disposes the
    /// middleware registry, the event bus, and the container. Any
    /// further operation on this module errors as disposed.
    pub fn dispose(&self) -> Result<(), ModuleError> {
        if self.is_disposed() {
            return Ok(());
        }
        if let Some(hook) = &self.hooks.before_dispose {
            hook();
        }
        self.reset()?;
        self.middlewares.dispose();
        self.signal.dispose();
        self.container.dispose();
        self.disposed.store(true, Ordering::Release);
        if let Some(hook) = &self.hooks.after_dispose {
            hook();
        }
        tracing::debug!(module = %self.id, "Disposed module");
        Ok(())
    }
}
