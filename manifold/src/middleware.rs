use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{ExportEntry, ModuleError, ModuleHandle, ModuleId, Provider, Resolution, Token};

/// Verdict of one chain-strategy middleware callback.
pub enum Chain<T> {
    /// Leave the candidate unchanged and continue.
    Keep,
    /// Substitute the candidate for the remaining callbacks.
    Replace(T),
    /// Silently drop the whole operation.
    Abort,
}

pub type AddImportFn = Arc<dyn Fn(&ModuleHandle) -> Chain<ModuleHandle> + Send + Sync>;
pub type AddProviderFn = Arc<dyn Fn(&Provider) -> Chain<Provider> + Send + Sync>;
pub type BeforeGetFn = Arc<
    dyn for<'a> Fn(Resolution, &'a Token, &'a dyn Fn(&Token) -> Resolution) -> Resolution
        + Send
        + Sync,
>;
pub type RemoveImportFn = Arc<dyn Fn(&ModuleId) -> bool + Send + Sync>;
pub type RemoveProviderFn = Arc<dyn Fn(&Token) -> bool + Send + Sync>;
pub type RemoveExportFn = Arc<dyn Fn(&ExportEntry) -> bool + Send + Sync>;
pub type ExportAccessFn = Arc<dyn Fn(&ModuleId, &Token) -> bool + Send + Sync>;

/// Per-module registry of typed interceptors.
///
/// Each interception point keeps its callbacks in registration order and
/// combines them with the strategy the point requires: chain for
/// additions, reduce for `before_get`, boolean-AND for removals and
/// export access. With no callbacks registered every pipeline is the
/// identity.
pub struct Middlewares {
    module: ModuleId,
    disposed: AtomicBool,
    add_import: RwLock<Vec<AddImportFn>>,
    add_provider: RwLock<Vec<AddProviderFn>>,
    get: RwLock<Vec<BeforeGetFn>>,
    remove_import: RwLock<Vec<RemoveImportFn>>,
    remove_provider: RwLock<Vec<RemoveProviderFn>>,
    remove_export: RwLock<Vec<RemoveExportFn>>,
    export_access: RwLock<Vec<ExportAccessFn>>,
}

impl Middlewares {
    pub(crate) fn new(module: ModuleId) -> Self {
        Self {
            module,
            disposed: AtomicBool::new(false),
            add_import: RwLock::new(Vec::new()),
            add_provider: RwLock::new(Vec::new()),
            get: RwLock::new(Vec::new()),
            remove_import: RwLock::new(Vec::new()),
            remove_provider: RwLock::new(Vec::new()),
            remove_export: RwLock::new(Vec::new()),
            export_access: RwLock::new(Vec::new()),
        }
    }

    fn ensure_live(&self) -> Result<(), ModuleError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ModuleError::Disposed(self.module.clone()));
        }
        Ok(())
    }

    pub fn before_add_import<F>(&self, callback: F)
    where
        F: Fn(&ModuleHandle) -> Chain<ModuleHandle> + Send + Sync + 'static,
    {
        self.add_import.write().unwrap().push(Arc::new(callback));
    }

    pub fn before_add_provider<F>(&self, callback: F)
    where
        F: Fn(&Provider) -> Chain<Provider> + Send + Sync + 'static,
    {
        self.add_provider.write().unwrap().push(Arc::new(callback));
    }

    pub fn before_get<F>(&self, callback: F)
    where
        F: Fn(Resolution, &Token, &dyn Fn(&Token) -> Resolution) -> Resolution
            + Send
            + Sync
            + 'static,
    {
        self.get.write().unwrap().push(Arc::new(callback));
    }

    pub fn before_remove_import<F>(&self, callback: F)
    where
        F: Fn(&ModuleId) -> bool + Send + Sync + 'static,
    {
        self.remove_import.write().unwrap().push(Arc::new(callback));
    }

    pub fn before_remove_provider<F>(&self, callback: F)
    where
        F: Fn(&Token) -> bool + Send + Sync + 'static,
    {
        self.remove_provider.write().unwrap().push(Arc::new(callback));
    }

    pub fn before_remove_export<F>(&self, callback: F)
    where
        F: Fn(&ExportEntry) -> bool + Send + Sync + 'static,
    {
        self.remove_export.write().unwrap().push(Arc::new(callback));
    }

    pub fn on_export_access<F>(&self, callback: F)
    where
        F: Fn(&ModuleId, &Token) -> bool + Send + Sync + 'static,
    {
        self.export_access.write().unwrap().push(Arc::new(callback));
    }

    /// Chain strategy: `None` means some callback aborted the addition.
    pub(crate) fn apply_add_import(
        &self,
        candidate: ModuleHandle,
    ) -> Result<Option<ModuleHandle>, ModuleError> {
        self.ensure_live()?;
        let callbacks: Vec<AddImportFn> = self.add_import.read().unwrap().clone();
        let mut current = candidate;
        for callback in callbacks {
            match callback(&current) {
                Chain::Keep => {}
                Chain::Replace(next) => current = next,
                Chain::Abort => {
                    tracing::trace!(module = %self.module, "Import addition aborted by middleware");
                    return Ok(None);
                }
            }
        }
        Ok(Some(current))
    }

    pub(crate) fn apply_add_provider(
        &self,
        candidate: Provider,
    ) -> Result<Option<Provider>, ModuleError> {
        self.ensure_live()?;
        let callbacks: Vec<AddProviderFn> = self.add_provider.read().unwrap().clone();
        let mut current = candidate;
        for callback in callbacks {
            match callback(&current) {
                Chain::Keep => {}
                Chain::Replace(next) => current = next,
                Chain::Abort => {
                    tracing::trace!(module = %self.module, "Provider addition aborted by middleware");
                    return Ok(None);
                }
            }
        }
        Ok(Some(current))
    }

    /// Reduce strategy: every callback sees the running value and may
    /// produce a new one; there is no short-circuit.
    pub(crate) fn apply_before_get(
        &self,
        seed: Resolution,
        token: &Token,
        resolver: &dyn Fn(&Token) -> Resolution,
    ) -> Result<Resolution, ModuleError> {
        self.ensure_live()?;
        let callbacks: Vec<BeforeGetFn> = self.get.read().unwrap().clone();
        let mut current = seed;
        for callback in callbacks {
            current = callback(current, token, resolver);
        }
        Ok(current)
    }

    /// Boolean-AND strategy: all callbacks are evaluated; any `false`
    /// vetoes the operation.
    pub(crate) fn approve_remove_import(&self, id: &ModuleId) -> Result<bool, ModuleError> {
        self.ensure_live()?;
        let callbacks: Vec<RemoveImportFn> = self.remove_import.read().unwrap().clone();
        let mut approved = true;
        for callback in callbacks {
            approved &= callback(id);
        }
        Ok(approved)
    }

    pub(crate) fn approve_remove_provider(&self, token: &Token) -> Result<bool, ModuleError> {
        self.ensure_live()?;
        let callbacks: Vec<RemoveProviderFn> = self.remove_provider.read().unwrap().clone();
        let mut approved = true;
        for callback in callbacks {
            approved &= callback(token);
        }
        Ok(approved)
    }

    pub(crate) fn approve_remove_export(&self, entry: &ExportEntry) -> Result<bool, ModuleError> {
        self.ensure_live()?;
        let callbacks: Vec<RemoveExportFn> = self.remove_export.read().unwrap().clone();
        let mut approved = true;
        for callback in callbacks {
            approved &= callback(entry);
        }
        Ok(approved)
    }

    pub(crate) fn approve_export_access(
        &self,
        importer: &ModuleId,
        token: &Token,
    ) -> Result<bool, ModuleError> {
        self.ensure_live()?;
        let callbacks: Vec<ExportAccessFn> = self.export_access.read().unwrap().clone();
        let mut approved = true;
        for callback in callbacks {
            approved &= callback(importer, token);
        }
        Ok(approved)
    }

    /// Drops every registered callback. Used by `reset`.
    pub(crate) fn clear(&self) {
        self.add_import.write().unwrap().clear();
        self.add_provider.write().unwrap().clear();
        self.get.write().unwrap().clear();
        self.remove_import.write().unwrap().clear();
        self.remove_provider.write().unwrap().clear();
        self.remove_export.write().unwrap().clear();
        self.export_access.write().unwrap().clear();
    }

    pub(crate) fn dispose(&self) {
        self.clear();
        self.disposed.store(true, Ordering::Release);
    }
}
