use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use manifold::{
    Chain, ExportTarget, InstanceRef, Module, ModuleError, ModuleOptions, ModuleUpdateExt as _,
    Provider, Resolution, RootContext, Token,
};

#[tokio::test]
async fn test_add_provider_veto() {
    let ctx = RootContext::new();
    let module = Module::build(ModuleOptions::new("guarded"), &ctx)
        .await
        .unwrap();
    module.middlewares().before_add_provider(|provider| {
        if provider.token() == &Token::named("blocked") {
            Chain::Abort
        } else {
            Chain::Keep
        }
    });
    assert!(
        !module
            .update()
            .add_provider(Provider::value(Token::named("blocked"), 1i64), false)
            .unwrap()
    );
    assert!(
        module
            .update()
            .add_provider(Provider::value(Token::named("allowed"), 2i64), false)
            .unwrap()
    );
    assert!(!module.has_provider(&Token::named("blocked")).unwrap());
    assert!(module.has_provider(&Token::named("allowed")).unwrap());
}

#[tokio::test]
async fn test_add_provider_substitution() {
    let ctx = RootContext::new();
    let module = Module::build(ModuleOptions::new("substituted"), &ctx)
        .await
        .unwrap();
    let token = Token::named("value");
    {
        let token = token.clone();
        module.middlewares().before_add_provider(move |provider| {
            if provider.token() == &token {
                Chain::Replace(Provider::value(token.clone(), "replaced".to_string()))
            } else {
                Chain::Keep
            }
        });
    }
    module
        .update()
        .add_provider(Provider::value(token.clone(), "first".to_string()), false)
        .unwrap();
    assert_eq!(module.get::<String>(&token).unwrap().as_str(), "replaced");
}

#[tokio::test]
async fn test_before_get_reduce() {
    let ctx = RootContext::new();
    let token = Token::named("n");
    let module = Module::build(
        ModuleOptions::new("doubled").provider(Provider::value(token.clone(), 10i64)),
        &ctx,
    )
    .await
    .unwrap();
    {
        let target = token.clone();
        module
            .middlewares()
            .before_get(move |value, token, _resolver| {
                if token != &target {
                    return value;
                }
                match value {
                    Resolution::One(v) => {
                        let doubled = v.downcast_ref::<i64>().map(|n| n * 2);
                        match doubled {
                            Some(n) => Resolution::One(Arc::new(n) as InstanceRef),
                            None => Resolution::One(v),
                        }
                    }
                    other => other,
                }
            });
    }
    assert_eq!(*module.get::<i64>(&token).unwrap(), 20);
}

#[tokio::test]
async fn test_before_get_nothing_sentinel() {
    let ctx = RootContext::new();
    let token = Token::named("intercepted");
    let module = Module::build(
        ModuleOptions::new("silenced").provider(Provider::value(token.clone(), 1i64)),
        &ctx,
    )
    .await
    .unwrap();
    module
        .middlewares()
        .before_get(|_value, _token, _resolver| Resolution::Nothing);
    // Explicitly intercepted to nothing: not an error, even non-optional.
    assert!(module.get_raw(&token, false, false).unwrap().is_none());
}

#[tokio::test]
async fn test_before_get_resolver_fallback() {
    let ctx = RootContext::new();
    let primary = Token::named("primary");
    let fallback = Token::named("fallback");
    let module = Module::build(
        ModuleOptions::new("fallbacks").provider(Provider::value(fallback.clone(), 5i64)),
        &ctx,
    )
    .await
    .unwrap();
    {
        let primary = primary.clone();
        let fallback = fallback.clone();
        module
            .middlewares()
            .before_get(move |value, token, resolver| match value {
                Resolution::Missing if token == &primary => resolver(&fallback),
                other => other,
            });
    }
    assert_eq!(*module.get::<i64>(&primary).unwrap(), 5);
}

#[tokio::test]
async fn test_remove_import_veto() {
    let ctx = RootContext::new();
    let base = Module::build(ModuleOptions::new("base"), &ctx).await.unwrap();
    let aux = Module::build(ModuleOptions::new("aux"), &ctx).await.unwrap();
    let app = Module::build(
        ModuleOptions::new("app").import(base.clone()).import(aux.clone()),
        &ctx,
    )
    .await
    .unwrap();
    app.middlewares()
        .before_remove_import(|id| id.as_str() != "base");
    assert!(!app.update().remove_import(&"base".into()).unwrap());
    assert!(app.is_importing_module(&"base".into()));
    assert!(app.update().remove_import(&"aux".into()).unwrap());
    assert!(!app.is_importing_module(&"aux".into()));
}

#[tokio::test]
async fn test_remove_provider_veto() {
    let ctx = RootContext::new();
    let token = Token::named("pinned");
    let module = Module::build(
        ModuleOptions::new("pinning").provider(Provider::value(token.clone(), 1i64)),
        &ctx,
    )
    .await
    .unwrap();
    module.middlewares().before_remove_provider(|_| false);
    assert!(!module.update().remove_provider(&token).unwrap());
    assert!(module.has_provider(&token).unwrap());
}

#[tokio::test]
async fn test_remove_export_veto() {
    let ctx = RootContext::new();
    let token = Token::named("kept");
    let module = Module::build(
        ModuleOptions::new("keeping")
            .provider(Provider::value(token.clone(), 1i64))
            .export_provider(token.clone()),
        &ctx,
    )
    .await
    .unwrap();
    module.middlewares().before_remove_export(|_| false);
    assert!(
        !module
            .update()
            .remove_from_exports(&ExportTarget::Provider(token.clone()))
            .unwrap()
    );
    assert!(module.is_exporting_provider(&token));
}

#[tokio::test]
async fn test_export_access_gate() {
    let ctx = RootContext::new();
    let secret = Token::named("secret");
    let open = Token::named("open");
    let base = Module::build(
        ModuleOptions::new("base")
            .provider(Provider::value(secret.clone(), 1i64))
            .provider(Provider::value(open.clone(), 2i64))
            .export_provider(secret.clone())
            .export_provider(open.clone()),
        &ctx,
    )
    .await
    .unwrap();
    base.middlewares()
        .on_export_access(|_importer, token| token != &Token::named("secret"));
    let app = Module::build(ModuleOptions::new("app").import(base.clone()), &ctx)
        .await
        .unwrap();
    assert_eq!(*app.get::<i64>(&open).unwrap(), 2);
    assert!(app.get::<i64>(&secret).is_err());
    // The owner itself is not restricted.
    assert_eq!(*base.get::<i64>(&secret).unwrap(), 1);
}

#[tokio::test]
async fn test_export_access_revoked_at_resolve() {
    let ctx = RootContext::new();
    let token = Token::named("revocable");
    let base = Module::build(
        ModuleOptions::new("base")
            .provider(Provider::value(token.clone(), 6i64))
            .export_provider(token.clone()),
        &ctx,
    )
    .await
    .unwrap();
    let allow = Arc::new(AtomicBool::new(true));
    {
        let allow = allow.clone();
        base.middlewares()
            .on_export_access(move |_importer, _token| allow.load(Ordering::SeqCst));
    }
    let app = Module::build(ModuleOptions::new("app").import(base.clone()), &ctx)
        .await
        .unwrap();
    assert_eq!(*app.get::<i64>(&token).unwrap(), 6);
    // The gate re-runs on every resolution: revocation blocks the next
    // get without unbinding the delegate.
    allow.store(false, Ordering::SeqCst);
    assert!(app.get::<i64>(&token).is_err());
    allow.store(true, Ordering::SeqCst);
    assert_eq!(*app.get::<i64>(&token).unwrap(), 6);
}

#[tokio::test]
async fn test_operations_on_disposed_module() {
    let ctx = RootContext::new();
    let token = Token::named("gone");
    let module = Module::build(
        ModuleOptions::new("short_lived").provider(Provider::value(token.clone(), 1i64)),
        &ctx,
    )
    .await
    .unwrap();
    module.dispose().unwrap();
    assert!(matches!(
        module
            .update()
            .add_provider(Provider::value(Token::named("more"), 2i64), false),
        Err(ModuleError::Disposed(_))
    ));
    assert!(matches!(
        module.get::<i64>(&token),
        Err(ModuleError::Disposed(_))
    ));
    assert!(matches!(
        module.has_provider(&token),
        Err(ModuleError::Disposed(_))
    ));
}
