use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use manifold::{
    Injectable, Module, ModuleBlueprint, ModuleError, ModuleOptions, ModuleUpdateExt as _,
    Provider, ResolveContext, RootContext, Token, resolver_fn,
};

struct Greeter {
    greeting: Arc<String>,
}

impl Injectable for Greeter {
    fn build(ctx: &ResolveContext<'_>) -> Result<Self, ModuleError> {
        Ok(Self {
            greeting: ctx.get(&Token::named("greeting"))?,
        })
    }
}

#[tokio::test]
async fn test_build_and_get() {
    let ctx = RootContext::new();
    let module = Module::build(
        ModuleOptions::new("hello")
            .provider(Provider::value(
                Token::named("greeting"),
                "Hello, World!".to_string(),
            ))
            .provider(Provider::class::<Greeter>()),
        &ctx,
    )
    .await
    .unwrap();
    let greeter = module.resolve::<Greeter>().unwrap();
    assert_eq!(greeter.greeting.as_str(), "Hello, World!");
    assert!(module.has_provider(&Token::named("greeting")).unwrap());
    assert!(!module.has_provider(&Token::named("unknown")).unwrap());
}

#[tokio::test]
async fn test_missing_identifier() {
    let ctx = RootContext::new();
    assert!(matches!(
        Module::build(ModuleOptions::new(""), &ctx).await,
        Err(ModuleError::MissingIdentifier)
    ));
}

#[tokio::test]
async fn test_missing_provider() {
    let ctx = RootContext::new();
    let module = Module::build(ModuleOptions::new("empty"), &ctx)
        .await
        .unwrap();
    assert!(matches!(
        module.get::<String>(&Token::named("unknown")),
        Err(ModuleError::MissingProvider { .. })
    ));
    assert!(
        module
            .get_optional::<String>(&Token::named("unknown"))
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_export_reachability() {
    let ctx = RootContext::new();
    let token = Token::named("payload");
    let base = Module::build(
        ModuleOptions::new("base")
            .provider(Provider::value(token.clone(), 7i64))
            .export_provider(token.clone()),
        &ctx,
    )
    .await
    .unwrap();
    // m1 imports base without re-exporting it: the chain stops there.
    let m1 = Module::build(ModuleOptions::new("m1").import(base.clone()), &ctx)
        .await
        .unwrap();
    let m2 = Module::build(ModuleOptions::new("m2").import(m1.clone()), &ctx)
        .await
        .unwrap();
    assert_eq!(*m1.get::<i64>(&token).unwrap(), 7);
    assert!(m2.get::<i64>(&token).is_err());
    // Re-exporting the import restores transitive resolution.
    let m3 = Module::build(
        ModuleOptions::new("m3")
            .import(base.clone())
            .export_module("base"),
        &ctx,
    )
    .await
    .unwrap();
    let m4 = Module::build(ModuleOptions::new("m4").import(m3.clone()), &ctx)
        .await
        .unwrap();
    assert_eq!(*m4.get::<i64>(&token).unwrap(), 7);
}

#[tokio::test]
async fn test_root_import() {
    let ctx = RootContext::new();
    let module = Module::build(ModuleOptions::new("app"), &ctx).await.unwrap();
    assert!(matches!(
        module.update().add_import(ctx.root().clone(), false),
        Err(ModuleError::RootImport(_))
    ));
}

#[tokio::test]
async fn test_self_import() {
    let ctx = RootContext::new();
    let module = Module::build(ModuleOptions::new("app"), &ctx).await.unwrap();
    assert!(matches!(
        module.update().add_import(module.clone(), false),
        Err(ModuleError::Module(_))
    ));
}

#[tokio::test]
async fn test_global_module() {
    let ctx = RootContext::new();
    let token = Token::named("shared");
    let shared = Module::build(
        ModuleOptions::new("shared")
            .provider(Provider::value(token.clone(), "everywhere".to_string()))
            .export_provider(token.clone())
            .global(true),
        &ctx,
    )
    .await
    .unwrap();
    assert!(ctx.is_global_module(&"shared".into()));
    // Reachable without any import through the container hierarchy.
    let app = Module::build(ModuleOptions::new("app"), &ctx).await.unwrap();
    assert_eq!(app.get::<String>(&token).unwrap().as_str(), "everywhere");
    // Importing a global module again is redundant and skipped.
    let other = Module::build(ModuleOptions::new("other").import(shared.clone()), &ctx)
        .await
        .unwrap();
    assert!(!other.is_importing_module(&"shared".into()));
    // Re-registering the same identifier fails.
    assert!(matches!(
        Module::build(ModuleOptions::new("shared").global(true), &ctx).await,
        Err(ModuleError::Module(_))
    ));
}

#[tokio::test]
async fn test_blueprint_single_instance() {
    let ctx = RootContext::new();
    let token = Token::named("counter_name");
    let blueprint = ModuleBlueprint::new(
        ModuleOptions::new("counters")
            .provider(Provider::value(token.clone(), "hits".to_string()))
            .export_provider(token.clone()),
    );
    assert!(!blueprint.is_materialized());
    let a = Module::build(
        ModuleOptions::new("a").import_blueprint(blueprint.clone()),
        &ctx,
    )
    .await
    .unwrap();
    let b = Module::build(
        ModuleOptions::new("b").import_blueprint(blueprint.clone()),
        &ctx,
    )
    .await
    .unwrap();
    assert!(blueprint.is_materialized());
    let from_a = a.get::<String>(&token).unwrap();
    let from_b = b.get::<String>(&token).unwrap();
    assert!(Arc::ptr_eq(&from_a, &from_b));
}

#[tokio::test]
async fn test_lazy_import_at_build() {
    let ctx = RootContext::new();
    let token = Token::named("lazy_value");
    let base = Module::build(
        ModuleOptions::new("lazy_base")
            .provider(Provider::value(token.clone(), 5i64))
            .export_provider(token.clone()),
        &ctx,
    )
    .await
    .unwrap();
    let deferred = base.clone();
    let app = Module::build(
        ModuleOptions::new("app").import_lazy(resolver_fn(move |_ctx| {
            let module = deferred.clone();
            async move { Ok(module) }
        })),
        &ctx,
    )
    .await
    .unwrap();
    assert_eq!(*app.get::<i64>(&token).unwrap(), 5);
}

#[tokio::test]
async fn test_lazy_import_after_build() {
    let ctx = RootContext::new();
    let token = Token::named("late");
    let base = Module::build(
        ModuleOptions::new("late_base")
            .provider(Provider::value(token.clone(), 1i64))
            .export_provider(token.clone()),
        &ctx,
    )
    .await
    .unwrap();
    let app = Module::build(ModuleOptions::new("app"), &ctx).await.unwrap();
    let deferred = base.clone();
    let added = app
        .update()
        .add_import_lazy(async move { Ok(deferred) }, false)
        .await
        .unwrap();
    assert!(added);
    assert_eq!(*app.get::<i64>(&token).unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_import() {
    let ctx = RootContext::new();
    let base = Module::build(ModuleOptions::new("base"), &ctx).await.unwrap();
    let app = Module::build(ModuleOptions::new("app").import(base.clone()), &ctx)
        .await
        .unwrap();
    assert!(!app.update().add_import(base.clone(), false).unwrap());
}

#[tokio::test]
async fn test_remove_import() {
    let ctx = RootContext::new();
    let token = Token::named("resource");
    let base = Module::build(
        ModuleOptions::new("base")
            .provider(Provider::value(token.clone(), 11i64))
            .export_provider(token.clone()),
        &ctx,
    )
    .await
    .unwrap();
    let app = Module::build(ModuleOptions::new("app").import(base.clone()), &ctx)
        .await
        .unwrap();
    assert!(app.is_importing_module(&"base".into()));
    assert_eq!(*app.get::<i64>(&token).unwrap(), 11);
    assert!(app.update().remove_import(&"base".into()).unwrap());
    assert!(!app.is_importing_module(&"base".into()));
    assert!(app.get::<i64>(&token).is_err());
    // A second removal finds nothing.
    assert!(!app.update().remove_import(&"base".into()).unwrap());
}

#[tokio::test]
async fn test_event_bus() {
    let ctx = RootContext::new();
    let module = Module::build(ModuleOptions::new("observed"), &ctx)
        .await
        .unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let subscription = {
        let seen = seen.clone();
        module.events().subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
    };
    let token = Token::named("observed_value");
    module
        .update()
        .add_provider(Provider::value(token.clone(), 1i64), false)
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(module.events().get().is_some());
    assert!(module.events().unsubscribe(subscription));
    module.update().remove_provider(&token).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    // Immediate invocation replays the last emitted value.
    let replayed = Arc::new(AtomicUsize::new(0));
    {
        let replayed = replayed.clone();
        module.events().subscribe_with(
            move |_| {
                replayed.fetch_add(1, Ordering::SeqCst);
            },
            true,
        );
    }
    assert_eq!(replayed.load(Ordering::SeqCst), 1);
}
