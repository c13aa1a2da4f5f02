use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use crate::container::{BindingId, EffectId, EffectKind};
use crate::{
    ExportEntry, Module, ModuleError, ModuleEvent, ModuleHandle, ModuleId, Provider,
    SubscriptionId, Token,
};

struct ProxiedProvider {
    binding: BindingId,
    origin: Weak<Module>,
    effect: EffectId,
}

#[derive(Default)]
struct ProxyState {
    proxied: BTreeMap<Token, ProxiedProvider>,
    disposed: bool,
}

/// Per-(importer, imported) binding layer.
///
/// Walks the imported module's export graph and installs a transient
/// delegate binding in the importer's container for every reachable
/// provider, without copying any state. Subscribes to the imported
/// module's event bus to keep the delegate set in sync with live export
/// changes. Holds only weak references to source modules: a disposed
/// exporter makes dependent resolutions fail instead of serving stale
/// data.
pub(crate) struct ExportProxy {
    importer: Weak<Module>,
    source: Weak<Module>,
    state: Mutex<ProxyState>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl ExportProxy {
    pub(crate) fn install(
        importer: &ModuleHandle,
        source: &ModuleHandle,
    ) -> Result<Arc<Self>, ModuleError> {
        let proxy = Arc::new(Self {
            importer: Arc::downgrade(importer),
            source: Arc::downgrade(source),
            state: Mutex::new(ProxyState::default()),
            subscription: Mutex::new(None),
        });
        Self::traverse(&proxy, source)?;
        let subscription = {
            let weak = Arc::downgrade(&proxy);
            source.events().subscribe(move |event: &ModuleEvent| {
                if let Some(proxy) = weak.upgrade() {
                    Self::on_event(&proxy, event);
                }
            })
        };
        *proxy.subscription.lock().unwrap() = Some(subscription);
        Ok(proxy)
    }

    fn traverse(proxy: &Arc<Self>, level: &ModuleHandle) -> Result<(), ModuleError> {
        Self::traverse_level(proxy, level, &mut Vec::new())
    }

    /// Level-order walk of an export set: every provider entry of the
    /// current level is proxied before any nested module is entered, so
    /// a provider on a nearer module wins over one reachable through a
    /// farther nested module. Visited module ids guard against
    /// re-export cycles.
    fn traverse_level(
        proxy: &Arc<Self>,
        level: &ModuleHandle,
        seen: &mut Vec<ModuleId>,
    ) -> Result<(), ModuleError> {
        if seen.contains(level.id()) {
            return Ok(());
        }
        seen.push(level.id().clone());
        let mut deferred = Vec::new();
        for entry in level.exports_snapshot() {
            match entry {
                ExportEntry::Provider(token) => Self::proxy_provider(proxy, level, &token)?,
                ExportEntry::Module(module) => deferred.push(module),
            }
        }
        for module in deferred {
            Self::traverse_level(proxy, &module, seen)?;
        }
        Ok(())
    }

    /// Installs one delegate binding for a token exported by `origin`.
    /// The export-access gate of the exporting module runs here, at
    /// proxy time, and again inside the delegate on every resolution;
    /// a gate change after proxy time blocks the next resolution
    /// without unbinding the delegate.
    fn proxy_provider(
        proxy: &Arc<Self>,
        origin: &ModuleHandle,
        token: &Token,
    ) -> Result<(), ModuleError> {
        let importer = match proxy.importer.upgrade() {
            Some(importer) => importer,
            None => return Ok(()),
        };
        // A re-export cycle can route a module's own exports back to it;
        // a delegate resolving from its own container would never
        // terminate.
        if Arc::ptr_eq(&importer, origin) {
            return Ok(());
        }
        {
            let state = proxy.state.lock().unwrap();
            if state.disposed || state.proxied.contains_key(token) {
                return Ok(());
            }
        }
        if !origin
            .middlewares()
            .approve_export_access(importer.id(), token)?
        {
            tracing::trace!(importer = %importer.id(), token = %token, "Export access denied");
            return Ok(());
        }
        let delegate = {
            let origin_weak = Arc::downgrade(origin);
            let importer_id = importer.id().clone();
            let token = token.clone();
            Provider::delegate(token.clone(), move |ctx| {
                let origin = origin_weak
                    .upgrade()
                    .ok_or_else(|| ModuleError::MissingProvider {
                        module: ctx.module_id().clone(),
                        token: token.clone(),
                    })?;
                origin.ensure_live()?;
                if !origin
                    .middlewares()
                    .approve_export_access(&importer_id, &token)?
                {
                    return Err(ModuleError::MissingProvider {
                        module: origin.id().clone(),
                        token: token.clone(),
                    });
                }
                origin.container().get_one(&token, ctx.request())
            })
        };
        let binding = importer.container().bind(delegate)?;
        // Unbinding the real provider must unproxy the delegate; the
        // effect is tagged with the importer so teardown on either side
        // unwinds the same record.
        let effect = {
            let weak = Arc::downgrade(proxy);
            let token = token.clone();
            origin.container().add_effect(
                token.clone(),
                EffectKind::Unbind,
                Some(importer.id().clone()),
                move |_| {
                    if let Some(proxy) = weak.upgrade() {
                        proxy.unproxy(&token);
                    }
                },
            )
        };
        proxy.state.lock().unwrap().proxied.insert(
            token.clone(),
            ProxiedProvider {
                binding,
                origin: Arc::downgrade(origin),
                effect,
            },
        );
        tracing::debug!(
            importer = %importer.id(),
            origin = %origin.id(),
            token = %token,
            "Proxied exported provider"
        );
        Ok(())
    }

    fn unproxy(&self, token: &Token) -> bool {
        let record = match self.state.lock().unwrap().proxied.remove(token) {
            Some(record) => record,
            None => return false,
        };
        if let Some(importer) = self.importer.upgrade() {
            importer.container().remove_binding(token, record.binding);
        }
        if let Some(origin) = record.origin.upgrade() {
            if !origin.container().is_disposed() {
                origin.container().remove_effect(token, record.effect);
            }
        }
        tracing::debug!(token = %token, "Unproxied exported provider");
        true
    }

    fn unproxy_reachable(&self, module: &ModuleHandle) {
        let mut tokens = Vec::new();
        collect_exported_tokens(module, &mut tokens, &mut Vec::new());
        for token in tokens {
            self.unproxy(&token);
        }
    }

    fn on_event(proxy: &Arc<Self>, event: &ModuleEvent) {
        if proxy.state.lock().unwrap().disposed {
            return;
        }
        let source = match proxy.source.upgrade() {
            Some(source) => source,
            None => return,
        };
        let result = match event {
            ModuleEvent::ExportAdded(ExportEntry::Provider(token)) => {
                Self::proxy_provider(proxy, &source, token)
            }
            ModuleEvent::ExportAdded(ExportEntry::Module(module)) => Self::traverse(proxy, module),
            ModuleEvent::ExportRemoved(ExportEntry::Provider(token)) => {
                proxy.unproxy(token);
                Ok(())
            }
            ModuleEvent::ExportRemoved(ExportEntry::Module(module)) => {
                proxy.unproxy_reachable(module);
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(error) = result {
            tracing::warn!(error = %error, "Failed to resync export proxy");
        }
    }

    /// Unloads every delegate binding from the importer's container,
    /// deregisters the reciprocal unbind effects from live source
    /// containers, and unsubscribes from the source event bus.
    pub(crate) fn dispose(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.disposed {
                return;
            }
            state.disposed = true;
        }
        if let Some(source) = self.source.upgrade() {
            if let Some(subscription) = self.subscription.lock().unwrap().take() {
                source.events().unsubscribe(subscription);
            }
        }
        let records: Vec<(Token, ProxiedProvider)> = {
            let mut state = self.state.lock().unwrap();
            std::mem::take(&mut state.proxied).into_iter().collect()
        };
        let importer = self.importer.upgrade();
        for (token, record) in records {
            if let Some(importer) = &importer {
                importer.container().remove_binding(&token, record.binding);
            }
            if let Some(origin) = record.origin.upgrade() {
                if !origin.container().is_disposed() {
                    origin.container().remove_effect(&token, record.effect);
                }
            }
        }
    }
}

fn collect_exported_tokens(module: &ModuleHandle, out: &mut Vec<Token>, seen: &mut Vec<ModuleId>) {
    if seen.contains(module.id()) {
        return;
    }
    seen.push(module.id().clone());
    for entry in module.exports_snapshot() {
        match entry {
            ExportEntry::Provider(token) => out.push(token),
            ExportEntry::Module(nested) => collect_exported_tokens(&nested, out, seen),
        }
    }
}
