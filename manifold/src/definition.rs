use std::sync::Arc;

use crate::proxy::ExportProxy;
use crate::{
    ExportEntry, ExportTarget, Module, ModuleError, ModuleEvent, ModuleHandle, ModuleId, Provider,
    SubscriptionId, Token,
};

/// The mutable triple of a module: imports, providers, exports. Only
/// reachable through [`Update`] so every mutation performs its side
/// effects (binding, proxying, emission) together with the change.
#[derive(Default)]
pub(crate) struct Definition {
    pub(crate) imports: Vec<ImportRecord>,
    pub(crate) providers: Vec<Provider>,
    pub(crate) exports: Vec<ExportEntry>,
}

pub(crate) struct ImportRecord {
    pub(crate) module: ModuleHandle,
    pub(crate) proxy: Arc<ExportProxy>,
    pub(crate) bubble: SubscriptionId,
}

impl ImportRecord {
    pub(crate) fn teardown(&self) {
        self.module.events().unsubscribe(self.bubble);
        self.proxy.dispose();
    }
}

/// Extension trait exposing the graph-mutation operations on module
/// handles.
pub trait ModuleUpdateExt {
    /// Graph-mutation operations for this module.
    fn update(&self) -> Update<'_>;
}

impl ModuleUpdateExt for Arc<Module> {
    fn update(&self) -> Update<'_> {
        Update::new(self)
    }
}

/// Graph-mutation operations of a module, obtained via
/// [`ModuleUpdateExt::update`].
pub struct Update<'a> {
    module: &'a Arc<Module>,
}

impl<'a> Update<'a> {
    pub(crate) fn new(module: &'a Arc<Module>) -> Self {
        Self { module }
    }

    /// Adds an import, constructing its export proxy and bubbling
    /// subscription. Returns `Ok(false)` when middleware aborted the
    /// addition or the module was already imported. Importing the root
    /// module is an error: every module already reaches it through the
    /// container hierarchy.
    pub fn add_import(
        &self,
        module: ModuleHandle,
        add_to_exports: bool,
    ) -> Result<bool, ModuleError> {
        let owner = self.module;
        owner.ensure_live()?;
        let candidate = match owner.middlewares().apply_add_import(module)? {
            Some(candidate) => candidate,
            None => return Ok(false),
        };
        if let Some(ctx) = owner.context() {
            if Arc::ptr_eq(&candidate, ctx.root()) || candidate.id() == ctx.root().id() {
                return Err(ModuleError::RootImport(candidate.id().clone()));
            }
        }
        if Arc::ptr_eq(&candidate, owner) || candidate.id() == owner.id() {
            return Err(ModuleError::Module(format!(
                "Module {} cannot import itself",
                owner.id()
            )));
        }
        if owner.is_importing_module(candidate.id()) {
            tracing::trace!(module = %owner.id(), import = %candidate.id(), "Already imported");
            return Ok(false);
        }
        tracing::debug!(module = %owner.id(), import = %candidate.id(), "Adding import");
        let proxy = ExportProxy::install(owner, &candidate)?;
        let bubble = {
            let importer = Arc::downgrade(owner);
            let source_id = candidate.id().clone();
            candidate.events().subscribe(move |event: &ModuleEvent| {
                if !event.is_export_kind() {
                    return;
                }
                let owner = match importer.upgrade() {
                    Some(owner) => owner,
                    None => return,
                };
                // Bubble only while the import itself is re-exported, so
                // deep export changes stay invisible past a module that
                // imports without exporting.
                if owner.is_exporting_module(&source_id) {
                    owner.emit_event(event.clone());
                }
            })
        };
        owner.state.write().unwrap().imports.push(ImportRecord {
            module: candidate.clone(),
            proxy,
            bubble,
        });
        if add_to_exports {
            let entry = ExportEntry::Module(candidate.clone());
            owner.state.write().unwrap().exports.push(entry.clone());
            owner.emit_event(ModuleEvent::ExportAdded(entry));
            owner.emit_event(ModuleEvent::ImportAdded(candidate.clone()));
            owner.emit_event(ModuleEvent::ModuleExported(candidate));
        } else {
            owner.emit_event(ModuleEvent::ImportAdded(candidate));
        }
        Ok(true)
    }

    /// Awaits an externally supplied resolver, then delegates to
    /// [`Update::add_import`]. No lock is held across the await; a
    /// mutation interleaved during the window is last-write-wins.
    pub async fn add_import_lazy<F>(
        &self,
        resolver: F,
        add_to_exports: bool,
    ) -> Result<bool, ModuleError>
    where
        F: Future<Output = Result<ModuleHandle, ModuleError>>,
    {
        let module = resolver.await?;
        self.add_import(module, add_to_exports)
    }

    /// Adds a provider and binds it into the container immediately.
    /// Middleware may veto (`Ok(false)`) or substitute the provider.
    pub fn add_provider(
        &self,
        provider: Provider,
        add_to_exports: bool,
    ) -> Result<bool, ModuleError> {
        let owner = self.module;
        owner.ensure_live()?;
        let candidate = match owner.middlewares().apply_add_provider(provider)? {
            Some(candidate) => candidate,
            None => return Ok(false),
        };
        let token = candidate.token().clone();
        owner.container().bind(candidate.clone())?;
        owner.state.write().unwrap().providers.push(candidate);
        tracing::debug!(module = %owner.id(), token = %token, "Added provider");
        owner.emit_event(ModuleEvent::ProviderAdded(token.clone()));
        if add_to_exports {
            let entry = ExportEntry::Provider(token.clone());
            let fresh = {
                let mut state = owner.state.write().unwrap();
                if state.exports.iter().any(|e| e.matches_token(&token)) {
                    false
                } else {
                    state.exports.push(entry.clone());
                    true
                }
            };
            if fresh {
                owner.emit_event(ModuleEvent::ExportAdded(entry));
                owner.emit_event(ModuleEvent::ProviderExported(token));
            }
        }
        Ok(true)
    }

    pub async fn add_provider_lazy<F>(
        &self,
        resolver: F,
        add_to_exports: bool,
    ) -> Result<bool, ModuleError>
    where
        F: Future<Output = Result<Provider, ModuleError>>,
    {
        let provider = resolver.await?;
        self.add_provider(provider, add_to_exports)
    }

    /// Removes an import: unsubscribes bubbling, disposes the export
    /// proxy, emits the removal, then cascades into export removal
    /// (whose `false` for a never-exported module is not a veto).
    /// Returns `Ok(false)` when not imported or vetoed.
    pub fn remove_import(&self, id: &ModuleId) -> Result<bool, ModuleError> {
        let owner = self.module;
        owner.ensure_live()?;
        let imported = owner.is_importing_module(id);
        if !imported {
            tracing::trace!(module = %owner.id(), import = %id, "Not imported");
            return Ok(false);
        }
        if !owner.middlewares().approve_remove_import(id)? {
            tracing::debug!(module = %owner.id(), import = %id, "Import removal vetoed");
            return Ok(false);
        }
        let record = {
            let mut state = owner.state.write().unwrap();
            match state.imports.iter().position(|r| r.module.id() == id) {
                Some(index) => state.imports.remove(index),
                None => return Ok(false),
            }
        };
        record.teardown();
        tracing::debug!(module = %owner.id(), import = %id, "Removed import");
        owner.emit_event(ModuleEvent::ImportRemoved(id.clone()));
        self.remove_from_exports(&ExportTarget::Module(id.clone()))?;
        Ok(true)
    }

    /// Removes a provider: unbinds it (firing unbind effects and the
    /// cross-module cleanup they carry), emits the removal, cascades
    /// into export removal.
    pub fn remove_provider(&self, token: &Token) -> Result<bool, ModuleError> {
        let owner = self.module;
        owner.ensure_live()?;
        let present = {
            let state = owner.state.read().unwrap();
            state.providers.iter().any(|p| p.token() == token)
        };
        if !present {
            tracing::trace!(module = %owner.id(), token = %token, "No such provider");
            return Ok(false);
        }
        if !owner.middlewares().approve_remove_provider(token)? {
            tracing::debug!(module = %owner.id(), token = %token, "Provider removal vetoed");
            return Ok(false);
        }
        owner
            .state
            .write()
            .unwrap()
            .providers
            .retain(|p| p.token() != token);
        owner.container().unbind(token)?;
        tracing::debug!(module = %owner.id(), token = %token, "Removed provider");
        owner.emit_event(ModuleEvent::ProviderRemoved(token.clone()));
        self.remove_from_exports(&ExportTarget::Provider(token.clone()))?;
        Ok(true)
    }

    /// Removes one export entry, emitting the generic removal event and
    /// the module- or provider-specific one. Idempotent: a second call
    /// for the same entry returns `Ok(false)`.
    pub fn remove_from_exports(&self, target: &ExportTarget) -> Result<bool, ModuleError> {
        let owner = self.module;
        owner.ensure_live()?;
        let matches = |entry: &ExportEntry| match target {
            ExportTarget::Provider(token) => entry.matches_token(token),
            ExportTarget::Module(id) => entry.matches_module(id),
        };
        let entry = {
            let state = owner.state.read().unwrap();
            state.exports.iter().find(|e| matches(e)).cloned()
        };
        let entry = match entry {
            Some(entry) => entry,
            None => return Ok(false),
        };
        if !owner.middlewares().approve_remove_export(&entry)? {
            tracing::debug!(module = %owner.id(), "Export removal vetoed");
            return Ok(false);
        }
        owner.state.write().unwrap().exports.retain(|e| !matches(e));
        tracing::debug!(module = %owner.id(), entry = ?entry, "Removed export");
        owner.emit_event(ModuleEvent::ExportRemoved(entry.clone()));
        match entry {
            ExportEntry::Module(module) => {
                owner.emit_event(ModuleEvent::ModuleUnexported(module.id().clone()));
            }
            ExportEntry::Provider(token) => {
                owner.emit_event(ModuleEvent::ProviderUnexported(token));
            }
        }
        Ok(true)
    }
}
