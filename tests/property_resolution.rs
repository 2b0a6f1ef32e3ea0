/// Property-based tests for binding resolution
///
/// These tests verify scope and qualifier behavior regardless of how many
/// bindings exist or which of them are singletons.
use anvil_di::{Binding, BindingKey, Class, ClassRegistry, Injector, Scope};
use proptest::prelude::*;
use serde_json::Value;
use std::sync::Arc;

struct Widget;

fn registry() -> Arc<ClassRegistry> {
    let mut registry = ClassRegistry::new();
    registry
        .register(Class::interface("WidgetInterface"))
        .register(Class::new("Widget").implements("WidgetInterface").constructor([], |_| Ok(Widget)));
    Arc::new(registry)
}

proptest! {
    #[test]
    fn scope_decides_identity(scopes in prop::collection::vec(any::<bool>(), 1..8)) {
        let injector = Injector::builder(registry()).build().unwrap();
        for (i, singleton) in scopes.iter().enumerate() {
            let scope = if *singleton { Scope::Singleton } else { Scope::Prototype };
            injector
                .bind(BindingKey::named("WidgetInterface", format!("w{}", i)), Binding::to_class("Widget").in_scope(scope))
                .unwrap();
        }

        for (i, singleton) in scopes.iter().enumerate() {
            let name = format!("w{}", i);
            let a = injector.get_named::<Widget>("WidgetInterface", &name).unwrap();
            let b = injector.get_named::<Widget>("WidgetInterface", &name).unwrap();
            prop_assert_eq!(Arc::ptr_eq(&a, &b), *singleton);
        }

        // Singletons are cached per key, never shared across qualifiers
        let singletons = scopes.iter().filter(|s| **s).count();
        prop_assert_eq!(injector.container().singleton_keys().len(), singletons);
    }
}

proptest! {
    #[test]
    fn qualified_literals_resolve_to_their_own_value(
        values in prop::collection::btree_map("[a-z][a-z0-9_]{0,8}", "\\PC{0,20}", 1..10),
    ) {
        let injector = Injector::builder(registry()).build().unwrap();
        for (name, value) in &values {
            injector.bind(BindingKey::named("", name.clone()), Binding::to_instance(value.clone())).unwrap();
        }

        for (name, value) in &values {
            let resolved = injector.get_named::<Value>("", name).unwrap();
            prop_assert_eq!(resolved.as_str(), Some(value.as_str()));
        }
    }
}

proptest! {
    #[test]
    fn unqualified_scalar_never_resolves_implicitly(name in "[a-z]{1,8}") {
        let injector = Injector::builder(registry()).build().unwrap();
        prop_assert!(injector.get_named::<Value>("", &name).is_err());
        prop_assert!(injector.get_instance("", None).is_err());
    }
}
