use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;
use std::sync::Arc;

/// Identifier of a module in the graph.
///
/// Cheap to clone and usable as a map key. Constructed from string
/// literals or owned strings.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ModuleId(Cow<'static, str>);

impl ModuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&'static str> for ModuleId {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for ModuleId {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Injection identifier of a provider.
///
/// Providers are bound either under an explicit name or under the
/// `TypeId` of the value they produce. `Token::of::<T>()` is the
/// self-binding form used by [`crate::Provider::class`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Token {
    Named(Cow<'static, str>),
    Typed(TypeId, &'static str),
}

impl Token {
    /// Returns the token under which values of type `T` self-bind.
    pub fn of<T: 'static>() -> Self {
        Self::Typed(TypeId::of::<T>(), type_name::<T>())
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }
}

impl From<&'static str> for Token {
    fn from(value: &'static str) -> Self {
        Self::Named(Cow::Borrowed(value))
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self::Named(Cow::Owned(value))
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Named(name) => f.write_str(name),
            Token::Typed(_, name) => f.write_str(name),
        }
    }
}

/// Shared reference to a resolved provider value.
///
/// Typed access downcasts through [`std::any::Any`], the same storage
/// discipline the container uses for bindings.
pub type InstanceRef = Arc<dyn Any + Send + Sync>;
