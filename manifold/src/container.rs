use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::provider::ProviderSource;
use crate::{Injectable, InstanceRef, ModuleError, ModuleId, Provider, ResolveRequest, Scope, Token};

/// Identifier of one binding inside a container.
pub type BindingId = u64;

/// Identifier of one registered side effect.
pub type EffectId = u64;

/// Lifecycle hook a side effect is keyed by.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EffectKind {
    Bind,
    Get,
    Rebind,
    Unbind,
}

pub type EffectFn = Arc<dyn Fn(&Token) + Send + Sync>;

#[derive(Clone)]
struct Effect {
    id: EffectId,
    kind: EffectKind,
    owner: Option<ModuleId>,
    callback: EffectFn,
}

#[derive(Clone)]
pub(crate) struct Binding {
    id: BindingId,
    provider: Provider,
}

/// Outcome of a container resolution attempt, threaded through the
/// `before_get` reduce pipeline.
///
/// `Nothing` is the explicit "intercepted to nothing" sentinel a
/// middleware may produce; it is distinct from `Missing`, which feeds
/// the optional/error decision in the facade.
#[derive(Clone)]
pub enum Resolution {
    One(InstanceRef),
    Many(Vec<InstanceRef>),
    Nothing,
    Missing,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::One(_) => f.write_str("One"),
            Resolution::Many(values) => write!(f, "Many({})", values.len()),
            Resolution::Nothing => f.write_str("Nothing"),
            Resolution::Missing => f.write_str("Missing"),
        }
    }
}

/// Cache shared by all nested resolutions of one outer `get`/`get_many`
/// call graph. Holds request-scoped instances, then is discarded.
#[derive(Default)]
pub struct RequestCache(Mutex<HashMap<BindingId, InstanceRef>>);

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, id: BindingId) -> Option<InstanceRef> {
        self.0.lock().unwrap().get(&id).cloned()
    }

    fn insert(&self, id: BindingId, value: InstanceRef) {
        self.0.lock().unwrap().insert(id, value);
    }
}

/// Context handed to class constructors and binding delegates, able to
/// resolve their dependencies from the owning container while staying
/// inside the same request-scope span.
pub struct ResolveContext<'a> {
    container: &'a Container,
    request: &'a RequestCache,
}

impl<'a> ResolveContext<'a> {
    pub(crate) fn new(container: &'a Container, request: &'a RequestCache) -> Self {
        Self { container, request }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.container.module
    }

    pub(crate) fn request(&self) -> &RequestCache {
        self.request
    }

    pub fn get_raw(&self, token: &Token) -> Result<InstanceRef, ModuleError> {
        self.container.get_one(token, self.request)
    }

    pub fn get<T: Send + Sync + 'static>(&self, token: &Token) -> Result<Arc<T>, ModuleError> {
        downcast_instance(self.get_raw(token)?, token, &self.container.module)
    }

    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>, ModuleError> {
        self.get(&Token::of::<T>())
    }

    pub fn get_all_raw(&self, token: &Token) -> Result<Vec<InstanceRef>, ModuleError> {
        self.container.try_get_all(token, self.request)
    }
}

pub(crate) fn downcast_instance<T: Send + Sync + 'static>(
    value: InstanceRef,
    token: &Token,
    module: &ModuleId,
) -> Result<Arc<T>, ModuleError> {
    value.downcast::<T>().map_err(|_| {
        ModuleError::Module(format!(
            "Provider {token} in module {module} has an unexpected value type"
        ))
    })
}

/// Per-module container adapter.
///
/// Owns the token-to-binding table, the scope caches, the side-effect
/// registry, and the snapshot stack. An optional parent container (the
/// root container) is consulted when a token has no local binding, which
/// is how global-module exports stay implicitly reachable everywhere.
pub struct Container {
    module: ModuleId,
    default_scope: Scope,
    parent: Option<Arc<Container>>,
    bindings: DashMap<Token, Vec<Binding>>,
    singletons: DashMap<BindingId, InstanceRef>,
    effects: DashMap<Token, Vec<Effect>>,
    snapshots: Mutex<Vec<Vec<(Token, Vec<Binding>)>>>,
    next_id: AtomicU64,
    disposed: AtomicBool,
}

impl Container {
    pub fn new(module: ModuleId, default_scope: Scope, parent: Option<Arc<Container>>) -> Self {
        Self {
            module,
            default_scope,
            parent,
            bindings: DashMap::new(),
            singletons: DashMap::new(),
            effects: DashMap::new(),
            snapshots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module
    }

    pub fn default_scope(&self) -> Scope {
        self.default_scope
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<(), ModuleError> {
        if self.is_disposed() {
            return Err(ModuleError::Disposed(self.module.clone()));
        }
        Ok(())
    }

    /// Registers a binding for the provider's token. Bindings for the
    /// same token accumulate in insertion order and feed `get_all`.
    pub fn bind(&self, provider: Provider) -> Result<BindingId, ModuleError> {
        self.ensure_live()?;
        let token = provider.token().clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.bindings
            .entry(token.clone())
            .or_default()
            .push(Binding { id, provider });
        tracing::debug!(module = %self.module, token = %token, "Bound provider");
        self.fire(EffectKind::Bind, &token);
        Ok(id)
    }

    pub fn is_bound(&self, token: &Token) -> bool {
        if self.bindings.contains_key(token) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_bound(token),
            None => false,
        }
    }

    pub fn is_current_bound(&self, token: &Token) -> bool {
        self.bindings.contains_key(token)
    }

    /// Resolves the first matching binding, falling back to the parent
    /// container, or errors with a missing-provider naming this module.
    pub fn get_one(
        &self,
        token: &Token,
        request: &RequestCache,
    ) -> Result<InstanceRef, ModuleError> {
        self.try_get_one(token, request)?
            .ok_or_else(|| ModuleError::MissingProvider {
                module: self.module.clone(),
                token: token.clone(),
            })
    }

    pub fn try_get_one(
        &self,
        token: &Token,
        request: &RequestCache,
    ) -> Result<Option<InstanceRef>, ModuleError> {
        self.ensure_live()?;
        let request_meta = ResolveRequest {
            token,
            module: &self.module,
        };
        let binding = match self.bindings.get(token) {
            Some(entry) => entry
                .iter()
                .find(|b| b.provider.matches(&request_meta))
                .cloned(),
            None => None,
        };
        match binding {
            Some(binding) => Ok(Some(self.resolve_binding(&binding, request)?)),
            None => match &self.parent {
                Some(parent) => parent.try_get_one(token, request),
                None => Ok(None),
            },
        }
    }

    /// Resolves every matching local binding; when none exist, the
    /// parent chain is consulted instead, so nearer bindings shadow
    /// farther ones wholesale.
    pub fn try_get_all(
        &self,
        token: &Token,
        request: &RequestCache,
    ) -> Result<Vec<InstanceRef>, ModuleError> {
        self.ensure_live()?;
        let request_meta = ResolveRequest {
            token,
            module: &self.module,
        };
        let matching: Vec<Binding> = match self.bindings.get(token) {
            Some(entry) => entry
                .iter()
                .filter(|b| b.provider.matches(&request_meta))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        if matching.is_empty() {
            return match &self.parent {
                Some(parent) => parent.try_get_all(token, request),
                None => Ok(Vec::new()),
            };
        }
        let mut values = Vec::with_capacity(matching.len());
        for binding in &matching {
            values.push(self.resolve_binding(binding, request)?);
        }
        Ok(values)
    }

    /// The container's own attempt at a token, used to seed the
    /// `before_get` reduce pipeline.
    pub fn resolution(
        &self,
        token: &Token,
        as_list: bool,
        request: &RequestCache,
    ) -> Result<Resolution, ModuleError> {
        if as_list {
            let values = self.try_get_all(token, request)?;
            if values.is_empty() {
                Ok(Resolution::Missing)
            } else {
                Ok(Resolution::Many(values))
            }
        } else {
            match self.try_get_one(token, request)? {
                Some(value) => Ok(Resolution::One(value)),
                None => Ok(Resolution::Missing),
            }
        }
    }

    fn resolve_binding(
        &self,
        binding: &Binding,
        request: &RequestCache,
    ) -> Result<InstanceRef, ModuleError> {
        let scope = binding.provider.resolved_scope(self.default_scope);
        tracing::trace!(
            module = %self.module,
            token = %binding.provider.token(),
            scope = ?scope,
            "Resolving binding"
        );
        let value = match scope {
            Scope::Singleton => {
                let cached = self.singletons.get(&binding.id).map(|v| v.clone());
                match cached {
                    Some(value) => value,
                    None => {
                        let value = self.instantiate(&binding.provider, request)?;
                        self.singletons.insert(binding.id, value.clone());
                        value
                    }
                }
            }
            Scope::Request => match request.get(binding.id) {
                Some(value) => value,
                None => {
                    let value = self.instantiate(&binding.provider, request)?;
                    request.insert(binding.id, value.clone());
                    value
                }
            },
            Scope::Transient => self.instantiate(&binding.provider, request)?,
        };
        self.fire(EffectKind::Get, binding.provider.token());
        Ok(value)
    }

    fn instantiate(
        &self,
        provider: &Provider,
        request: &RequestCache,
    ) -> Result<InstanceRef, ModuleError> {
        match provider.source() {
            ProviderSource::Value(value) => Ok(value.clone()),
            ProviderSource::Class { construct, .. } => {
                construct(&ResolveContext::new(self, request))
            }
            ProviderSource::Factory { factory, deps } => {
                let mut values = Vec::with_capacity(deps.len());
                for dep in deps {
                    values.push(self.get_one(dep, request)?);
                }
                factory(&values)
            }
        }
    }

    /// Removes every binding for the token, fires unbind effects once,
    /// then drops all effect entries for the token so none dangle.
    pub fn unbind(&self, token: &Token) -> Result<bool, ModuleError> {
        self.ensure_live()?;
        let removed = match self.bindings.remove(token) {
            Some((_, bindings)) => bindings,
            None => return Ok(false),
        };
        for binding in &removed {
            self.singletons.remove(&binding.id);
        }
        tracing::debug!(module = %self.module, token = %token, "Unbound provider");
        self.fire(EffectKind::Unbind, token);
        if let Some((_, effects)) = self.effects.remove(token) {
            for effect in effects.iter().filter(|e| e.owner.is_some()) {
                tracing::trace!(
                    module = %self.module,
                    token = %token,
                    owner = ?effect.owner,
                    "Dropped cross-module effect"
                );
            }
        }
        Ok(true)
    }

    pub fn unbind_all(&self) -> Result<(), ModuleError> {
        self.ensure_live()?;
        let tokens: Vec<Token> = self.bindings.iter().map(|e| e.key().clone()).collect();
        for token in &tokens {
            self.unbind(token)?;
        }
        Ok(())
    }

    /// Replaces every binding for the provider's token with a fresh one,
    /// firing rebind effects.
    pub fn rebind(&self, provider: Provider) -> Result<BindingId, ModuleError> {
        self.ensure_live()?;
        let token = provider.token().clone();
        if let Some((_, old)) = self.bindings.remove(&token) {
            for binding in &old {
                self.singletons.remove(&binding.id);
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.bindings
            .entry(token.clone())
            .or_default()
            .push(Binding { id, provider });
        tracing::debug!(module = %self.module, token = %token, "Rebound provider");
        self.fire(EffectKind::Rebind, &token);
        Ok(id)
    }

    /// Removes a single binding without firing effects. Used by export
    /// proxies tearing down their own delegate bindings.
    pub fn remove_binding(&self, token: &Token, id: BindingId) -> bool {
        let mut removed = false;
        let now_empty = match self.bindings.get_mut(token) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|b| b.id != id);
                removed = entry.len() != before;
                entry.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.bindings.remove_if(token, |_, v| v.is_empty());
        }
        if removed {
            self.singletons.remove(&id);
        }
        removed
    }

    /// Pushes a copy of the binding table onto the snapshot stack.
    pub fn snapshot(&self) -> Result<(), ModuleError> {
        self.ensure_live()?;
        let snapshot: Vec<(Token, Vec<Binding>)> = self
            .bindings
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        self.snapshots.lock().unwrap().push(snapshot);
        Ok(())
    }

    /// Restores the most recent snapshot. Returns `false` when the stack
    /// is empty.
    pub fn restore(&self) -> Result<bool, ModuleError> {
        self.ensure_live()?;
        let snapshot = match self.snapshots.lock().unwrap().pop() {
            Some(v) => v,
            None => return Ok(false),
        };
        self.bindings.clear();
        for (token, bindings) in snapshot {
            self.bindings.insert(token, bindings);
        }
        Ok(true)
    }

    pub fn on_bind<F>(&self, token: Token, callback: F) -> EffectId
    where
        F: Fn(&Token) + Send + Sync + 'static,
    {
        self.add_effect(token, EffectKind::Bind, None, callback)
    }

    pub fn on_get<F>(&self, token: Token, callback: F) -> EffectId
    where
        F: Fn(&Token) + Send + Sync + 'static,
    {
        self.add_effect(token, EffectKind::Get, None, callback)
    }

    pub fn on_rebind<F>(&self, token: Token, callback: F) -> EffectId
    where
        F: Fn(&Token) + Send + Sync + 'static,
    {
        self.add_effect(token, EffectKind::Rebind, None, callback)
    }

    pub fn on_unbind<F>(&self, token: Token, callback: F) -> EffectId
    where
        F: Fn(&Token) + Send + Sync + 'static,
    {
        self.add_effect(token, EffectKind::Unbind, None, callback)
    }

    /// Registers a side effect for a token and lifecycle hook. The owner
    /// tag names the module that installed the effect, so cross-module
    /// bookkeeping can be unwound when either side is torn down.
    pub fn add_effect<F>(
        &self,
        token: Token,
        kind: EffectKind,
        owner: Option<ModuleId>,
        callback: F,
    ) -> EffectId
    where
        F: Fn(&Token) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.effects.entry(token).or_default().push(Effect {
            id,
            kind,
            owner,
            callback: Arc::new(callback),
        });
        id
    }

    pub fn remove_effect(&self, token: &Token, id: EffectId) -> bool {
        let mut removed = false;
        let now_empty = match self.effects.get_mut(token) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|e| e.id != id);
                removed = entry.len() != before;
                entry.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.effects.remove_if(token, |_, v| v.is_empty());
        }
        removed
    }

    pub fn effect_count(&self, token: &Token) -> usize {
        self.effects.get(token).map(|e| e.len()).unwrap_or(0)
    }

    fn fire(&self, kind: EffectKind, token: &Token) {
        let callbacks: Vec<EffectFn> = match self.effects.get(token) {
            Some(entry) => entry
                .iter()
                .filter(|e| e.kind == kind)
                .map(|e| e.callback.clone())
                .collect(),
            None => Vec::new(),
        };
        for callback in callbacks {
            callback(token);
        }
    }

    /// Terminally releases all container state.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.bindings.clear();
        self.singletons.clear();
        self.effects.clear();
        self.snapshots.lock().unwrap().clear();
    }
}
