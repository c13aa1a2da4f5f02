use crate::{ModuleHandle, ModuleId, Token};

/// Entry of a module's export set: either a provider token or a whole
/// imported module whose own exports become reachable transitively.
#[derive(Clone)]
pub enum ExportEntry {
    Provider(Token),
    Module(ModuleHandle),
}

impl ExportEntry {
    pub fn matches_token(&self, token: &Token) -> bool {
        matches!(self, ExportEntry::Provider(t) if t == token)
    }

    pub fn matches_module(&self, id: &ModuleId) -> bool {
        matches!(self, ExportEntry::Module(m) if m.id() == id)
    }
}

impl std::fmt::Debug for ExportEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportEntry::Provider(token) => f.debug_tuple("Provider").field(token).finish(),
            ExportEntry::Module(module) => f.debug_tuple("Module").field(module.id()).finish(),
        }
    }
}

/// Typed change notification emitted on a module's event bus.
///
/// Export-kind events bubble across importer chains; import and provider
/// events stay local to the module that emitted them.
#[derive(Clone, Debug)]
pub enum ModuleEvent {
    ImportAdded(ModuleHandle),
    ImportRemoved(ModuleId),
    ProviderAdded(Token),
    ProviderRemoved(Token),
    ExportAdded(ExportEntry),
    ExportRemoved(ExportEntry),
    ModuleExported(ModuleHandle),
    ModuleUnexported(ModuleId),
    ProviderExported(Token),
    ProviderUnexported(Token),
}

impl ModuleEvent {
    /// Whether importers re-emit this event on their own bus.
    pub fn is_export_kind(&self) -> bool {
        matches!(
            self,
            ModuleEvent::ExportAdded(_)
                | ModuleEvent::ExportRemoved(_)
                | ModuleEvent::ModuleExported(_)
                | ModuleEvent::ModuleUnexported(_)
                | ModuleEvent::ProviderExported(_)
                | ModuleEvent::ProviderUnexported(_)
        )
    }
}
