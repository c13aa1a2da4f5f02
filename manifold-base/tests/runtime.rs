use std::sync::Arc;

use manifold::{
    Injectable, ModuleError, ModuleHandle, ModuleOptions, Provider, ResolveContext, ResolveModule,
    RootContext, Token,
};
use manifold_base::{Config, Runtime, async_trait, setup_logging};

struct Session;

impl Injectable for Session {
    fn build(_ctx: &ResolveContext<'_>) -> Result<Self, ModuleError> {
        Ok(Self)
    }
}

struct FixedResolver(ModuleHandle);

#[async_trait]
impl ResolveModule for FixedResolver {
    async fn resolve(&self, _ctx: &Arc<RootContext>) -> Result<ModuleHandle, ModuleError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_runtime_default_scope_from_config() {
    let config = Config::parse(r#"{"modules": {"default_scope": "transient"}}"#).unwrap();
    let runtime = Runtime::with_config(&config).unwrap();
    let module = runtime
        .build_module(ModuleOptions::new("sessions").provider(Provider::class::<Session>()))
        .await
        .unwrap();
    let first = module.resolve::<Session>().unwrap();
    let second = module.resolve::<Session>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_runtime_explicit_scope_wins() {
    let config = Config::parse(r#"{"modules": {"default_scope": "transient"}}"#).unwrap();
    let runtime = Runtime::with_config(&config).unwrap();
    let module = runtime
        .build_module(
            ModuleOptions::new("sessions")
                .default_scope(manifold::Scope::Singleton)
                .provider(Provider::class::<Session>()),
        )
        .await
        .unwrap();
    let first = module.resolve::<Session>().unwrap();
    let second = module.resolve::<Session>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_runtime_invalid_scope() {
    let config = Config::parse(r#"{"modules": {"default_scope": "bogus"}}"#).unwrap();
    let runtime = Runtime::with_config(&config).unwrap();
    assert!(
        runtime
            .build_module(ModuleOptions::new("sessions"))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_runtime_global_is_shared() {
    let first = Runtime::global();
    let second = Runtime::global();
    assert!(Arc::ptr_eq(first.context(), second.context()));
    assert_eq!(first.root().id().as_str(), "root");
}

#[tokio::test]
async fn test_runtime_lazy_import() {
    let runtime = Runtime::new();
    let token = Token::named("deferred_value");
    let base = runtime
        .build_module(
            ModuleOptions::new("base")
                .provider(Provider::value(token.clone(), 12i64))
                .export_provider(token.clone()),
        )
        .await
        .unwrap();
    let app = runtime
        .build_module(ModuleOptions::new("app").import_lazy(FixedResolver(base.clone())))
        .await
        .unwrap();
    assert_eq!(*app.get::<i64>(&token).unwrap(), 12);
}

#[tokio::test]
async fn test_setup_logging() {
    let config = Config::parse(r#"{"logging": {"level": "info", "directives": ["manifold=debug"]}}"#)
        .unwrap();
    // First initialization wins; a second one reports an error instead
    // of panicking.
    let first = setup_logging(&config);
    let second = setup_logging(&config);
    assert!(first.is_ok() || second.is_err());
}
