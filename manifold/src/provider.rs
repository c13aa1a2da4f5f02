use std::str::FromStr;
use std::sync::Arc;

use crate::{InstanceRef, ModuleError, ModuleId, ResolveContext, Token};

/// Caching discipline applied when a binding is resolved.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Scope {
    /// First resolution is cached for the container's lifetime.
    #[default]
    Singleton,
    /// A new instance on every resolution.
    Transient,
    /// Cached within one outer `get`/`get_many` call graph, shared by all
    /// nested resolutions it triggers, then discarded.
    Request,
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "singleton" => Ok(Scope::Singleton),
            "transient" => Ok(Scope::Transient),
            "request" => Ok(Scope::Request),
            _ => Err(format!("Unknown scope: {value}")),
        }
    }
}

/// Trait for values the container can construct from other bindings.
///
/// The Rust rendition of class providers: `build` receives a resolution
/// context able to fetch the value's own dependencies, and `scope`
/// carries the type-level default scope, which sits between a provider
/// token override and the module default in the priority chain.
pub trait Injectable: Send + Sync + Sized + 'static {
    fn build(ctx: &ResolveContext<'_>) -> Result<Self, ModuleError>;

    fn scope() -> Option<Scope> {
        None
    }
}

pub type ClassFn =
    Arc<dyn Fn(&ResolveContext<'_>) -> Result<InstanceRef, ModuleError> + Send + Sync>;
pub type FactoryFn = Arc<dyn Fn(&[InstanceRef]) -> Result<InstanceRef, ModuleError> + Send + Sync>;
pub type WhenFn = Arc<dyn Fn(&ResolveRequest<'_>) -> bool + Send + Sync>;

/// Metadata a binding predicate may inspect before the binding is used.
pub struct ResolveRequest<'a> {
    pub token: &'a Token,
    pub module: &'a ModuleId,
}

#[derive(Clone)]
pub(crate) enum ProviderSource {
    Class {
        construct: ClassFn,
        type_scope: Option<Scope>,
    },
    Value(InstanceRef),
    Factory {
        factory: FactoryFn,
        deps: Vec<Token>,
    },
}

/// Declarative recipe binding an injection token to a way of producing
/// a value: a constructor-built type, a constant, or a factory with a
/// list of dependency tokens injected into it.
#[derive(Clone)]
pub struct Provider {
    token: Token,
    source: ProviderSource,
    scope: Option<Scope>,
    when: Option<WhenFn>,
}

impl Provider {
    /// Self-binding: `T` under `Token::of::<T>()`, built by `T::build`.
    pub fn class<T: Injectable>() -> Self {
        Self::class_as::<T>(Token::of::<T>())
    }

    /// Binds `T` under an explicit token.
    pub fn class_as<T: Injectable>(token: impl Into<Token>) -> Self {
        let construct: ClassFn =
            Arc::new(|ctx: &ResolveContext<'_>| Ok(Arc::new(T::build(ctx)?) as InstanceRef));
        Self {
            token: token.into(),
            source: ProviderSource::Class {
                construct,
                type_scope: T::scope(),
            },
            scope: None,
            when: None,
        }
    }

    /// Binds a constant value. Always singleton regardless of the scope
    /// priority chain.
    pub fn value<T: Send + Sync + 'static>(token: impl Into<Token>, value: T) -> Self {
        Self {
            token: token.into(),
            source: ProviderSource::Value(Arc::new(value)),
            scope: None,
            when: None,
        }
    }

    /// Binds a factory function receiving the resolved values of `deps`
    /// in order.
    pub fn factory<F>(token: impl Into<Token>, deps: Vec<Token>, factory: F) -> Self
    where
        F: Fn(&[InstanceRef]) -> Result<InstanceRef, ModuleError> + Send + Sync + 'static,
    {
        Self {
            token: token.into(),
            source: ProviderSource::Factory {
                factory: Arc::new(factory),
                deps,
            },
            scope: None,
            when: None,
        }
    }

    /// Assembles a provider from raw recipe slots, as middleware doing
    /// provider substitution does. Exactly one slot must be present.
    pub fn from_parts(
        token: impl Into<Token>,
        class: Option<ClassFn>,
        value: Option<InstanceRef>,
        factory: Option<(FactoryFn, Vec<Token>)>,
    ) -> Result<Self, ModuleError> {
        let token = token.into();
        let present = class.is_some() as usize + value.is_some() as usize + factory.is_some() as usize;
        if present != 1 {
            return Err(ModuleError::UnknownProvider(token));
        }
        let source = if let Some(construct) = class {
            ProviderSource::Class {
                construct,
                type_scope: None,
            }
        } else if let Some(value) = value {
            ProviderSource::Value(value)
        } else {
            let (factory, deps) = factory.unwrap();
            ProviderSource::Factory { factory, deps }
        };
        Ok(Self {
            token,
            source,
            scope: None,
            when: None,
        })
    }

    /// Transient binding resolved by an arbitrary closure. Used by
    /// export proxies for the delegates they install in importer
    /// containers: the closure re-checks access and fetches from the
    /// exporting module's own container on every resolution.
    pub(crate) fn delegate<F>(token: Token, resolve: F) -> Self
    where
        F: Fn(&ResolveContext<'_>) -> Result<InstanceRef, ModuleError> + Send + Sync + 'static,
    {
        Self {
            token,
            source: ProviderSource::Class {
                construct: Arc::new(resolve),
                type_scope: None,
            },
            scope: Some(Scope::Transient),
            when: None,
        }
    }

    /// Overrides the resolution scope for this binding. Takes priority
    /// over the type-level scope and the module default.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Attaches a binding predicate evaluated before the binding is used.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResolveRequest<'_>) -> bool + Send + Sync + 'static,
    {
        self.when = Some(Arc::new(predicate));
        self
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub(crate) fn source(&self) -> &ProviderSource {
        &self.source
    }

    pub(crate) fn matches(&self, request: &ResolveRequest<'_>) -> bool {
        match &self.when {
            Some(predicate) => predicate(request),
            None => true,
        }
    }

    /// Resolves the effective scope: token override, then type-level
    /// scope, then the module default. Value providers are always
    /// singleton.
    pub(crate) fn resolved_scope(&self, module_default: Scope) -> Scope {
        if let ProviderSource::Value(_) = self.source {
            return Scope::Singleton;
        }
        if let Some(scope) = self.scope {
            return scope;
        }
        if let ProviderSource::Class { type_scope, .. } = &self.source {
            if let Some(scope) = type_scope {
                return *scope;
            }
        }
        module_default
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let form = match self.source {
            ProviderSource::Class { .. } => "class",
            ProviderSource::Value(_) => "value",
            ProviderSource::Factory { .. } => "factory",
        };
        f.debug_struct("Provider")
            .field("token", &self.token)
            .field("form", &form)
            .field("scope", &self.scope)
            .finish()
    }
}
