use crate::{ModuleId, Token};

/// Errors raised by module graph and resolution operations.
#[derive(Debug)]
pub enum ModuleError {
    /// A module was constructed without a non-empty identifier.
    MissingIdentifier,
    /// An operation was invoked on a module after `dispose()`.
    Disposed(ModuleId),
    /// A provider token matches none of the supported recipe forms.
    UnknownProvider(Token),
    /// A non-optional `get` found nothing after middleware ran.
    MissingProvider { module: ModuleId, token: Token },
    /// An attempt to import the root module into another module.
    RootImport(ModuleId),
    /// Catch-all for module contract violations.
    Module(String),
}

impl std::fmt::Display for ModuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleError::MissingIdentifier => {
                write!(f, "Module requires a non-empty identifier")
            }
            ModuleError::Disposed(id) => write!(f, "Module {id} is disposed"),
            ModuleError::UnknownProvider(token) => {
                write!(f, "Provider {token} matches no known provider form")
            }
            ModuleError::MissingProvider { module, token } => {
                write!(f, "Module {module} has no provider for {token}")
            }
            ModuleError::RootImport(id) => {
                write!(f, "Module {id} is the root module and cannot be imported")
            }
            ModuleError::Module(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ModuleError {}
