//! Setter injection, post-construct hooks and hierarchy merging.

use anvil_di::{
    AnnotationValue, Args, Binder, Class, ClassRegistry, DiError, DiResult, Injector, Module, Param, ParamValue,
    INJECT, NAMED, POST_CONSTRUCT,
};
use serde_json::json;
use std::sync::Arc;

#[derive(Default)]
struct Service {
    greeting: Option<String>,
    retries: i64,
    audit: Option<Arc<Audit>>,
    tracer: Option<Arc<Tracer>>,
    calls: Vec<&'static str>,
}

struct Audit;
struct Tracer;

fn service_methods(class: Class) -> Class {
    class
        .method("set_audit", [Param::typed("audit", "AuditInterface")], |s: &mut Service, args: &Args| {
            s.audit = Some(args.get("audit")?);
            s.calls.push("set_audit");
            Ok(())
        })
        .method("set_tracer", [Param::typed("tracer", "TracerInterface")], |s: &mut Service, args: &Args| {
            s.tracer = Some(args.get("tracer")?);
            s.calls.push("set_tracer");
            Ok(())
        })
        .method("set_greeting", [Param::new("greeting")], |s: &mut Service, args: &Args| {
            s.greeting = Some(args.string("greeting")?);
            s.calls.push("set_greeting");
            Ok(())
        })
        .method("init", [], |s: &mut Service, _: &Args| {
            s.calls.push("init");
            Ok(())
        })
        .method("boot", [], |s: &mut Service, _: &Args| {
            s.calls.push("boot");
            Ok(())
        })
}

fn registry() -> Arc<ClassRegistry> {
    let mut registry = ClassRegistry::new();
    registry
        .register(Class::interface("AuditInterface"))
        .register(Class::interface("TracerInterface"))
        .register(Class::new("Audit").implements("AuditInterface").constructor([], |_| Ok(Audit)))
        .register(
            service_methods(Class::new("Base").constructor([Param::new("retries").default_value(1)], |args: &Args| {
                Ok(Service {
                    retries: args.value("retries")?.as_i64().unwrap_or_default(),
                    ..Service::default()
                })
            }))
            .annotate_method("set_audit", AnnotationValue::new(INJECT))
            .annotate_method("init", AnnotationValue::new(POST_CONSTRUCT)),
        )
        .register(
            service_methods(
                Class::new("Child")
                    .extends("Base")
                    .constructor([Param::new("retries").default_value(7)], |args: &Args| {
                        Ok(Service {
                            retries: args.value("retries")?.as_i64().unwrap_or_default(),
                            ..Service::default()
                        })
                    }),
            )
            .annotate_method("set_tracer", AnnotationValue::new(INJECT).attr("optional", true)),
        )
        .register(
            service_methods(Class::new("Twice").extends("Base").default_constructor::<Service>())
                .annotate_method("boot", AnnotationValue::new(POST_CONSTRUCT)),
        )
        .register(
            service_methods(Class::new("Strict").default_constructor::<Service>())
                .annotate_method("set_tracer", AnnotationValue::new(INJECT)),
        )
        .register(
            service_methods(Class::new("Greeter").default_constructor::<Service>())
                .annotate_method("set_greeting", AnnotationValue::new(INJECT))
                .annotate_method("set_greeting", AnnotationValue::with_value(NAMED, "greeting=salutation")),
        );
    Arc::new(registry)
}

struct AuditModule;

impl Module for AuditModule {
    fn configure(&self, binder: &mut Binder) -> DiResult<()> {
        binder.bind("AuditInterface").to("Audit");
        binder.bind("").annotated_with("salutation").to_instance("hello");
        Ok(())
    }
}

fn injector() -> Injector {
    Injector::builder(registry()).module(&AuditModule).build().unwrap()
}

#[test]
fn test_annotated_setter_then_post_construct() {
    let service = injector().get::<Service>("Base").unwrap();
    assert!(service.audit.is_some());
    assert_eq!(service.calls, vec!["set_audit", "init"]);
    assert_eq!(service.retries, 1);
}

#[test]
fn test_child_inherits_setters_and_hooks() {
    let service = injector().get::<Service>("Child").unwrap();
    // Tracer is unbound and the setter is optional
    assert_eq!(service.calls, vec!["set_audit", "init"]);
    assert!(service.tracer.is_none());
    // Own declared default, not the parent's
    assert_eq!(service.retries, 7);
}

#[test]
fn test_required_setter_without_binding_fails() {
    let err = injector().get_instance("Strict", None).err().unwrap();
    match err {
        DiError::Unbound { context, .. } => assert!(context.contains("Strict"), "context: {}", context),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_second_post_construct_in_hierarchy_rejected() {
    let err = injector().get_instance("Twice", None).err().unwrap();
    assert_eq!(
        err,
        DiError::MultipleAnnotationNotAllowed {
            annotation: POST_CONSTRUCT.into(),
            class: "Twice".into(),
        }
    );
}

#[test]
fn test_named_setter_parameter() {
    let service = injector().get::<Service>("Greeter").unwrap();
    assert_eq!(service.greeting.as_deref(), Some("hello"));
}

#[test]
fn test_explicit_param_inherited_by_child() {
    let injector = injector();
    injector.set_param("Base", "retries", ParamValue::literal(3)).unwrap();
    assert_eq!(injector.get::<Service>("Base").unwrap().retries, 3);
    assert_eq!(injector.get::<Service>("Child").unwrap().retries, 3);
}

#[test]
fn test_explicit_setter_runs_after_annotated_ones() {
    let injector = injector();
    injector
        .add_setter(
            "Base",
            "set_greeting",
            [("greeting".to_string(), ParamValue::literal(json!("hi")))].into(),
        )
        .unwrap();
    let service = injector.get::<Service>("Child").unwrap();
    assert_eq!(service.calls, vec!["set_audit", "set_greeting", "init"]);
    assert_eq!(service.greeting.as_deref(), Some("hi"));
}

#[test]
fn test_global_param_applies_to_root_classes() {
    let injector = injector();
    injector.set_param(anvil_di::GLOBAL, "retries", ParamValue::literal(9)).unwrap();
    assert_eq!(injector.get::<Service>("Base").unwrap().retries, 9);
    assert_eq!(injector.get::<Service>("Child").unwrap().retries, 9);
}

fn unbound_context(err: DiError) -> String {
    match err {
        DiError::Unbound { key, context } => {
            assert_eq!(key, "Missing-*");
            context
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_unbound_reference_names_constructor_parameter() {
    let injector = injector();
    injector.set_param("Base", "retries", ParamValue::reference("Missing")).unwrap();
    let context = unbound_context(injector.get_instance("Base", None).err().unwrap());
    assert_eq!(context, "dependency 'Missing' with name '*' used in Base::new ($retries)");

    let inherited = unbound_context(injector.get_instance("Child", None).err().unwrap());
    assert!(inherited.contains("Child::new ($retries)"), "context: {}", inherited);
}

#[test]
fn test_unbound_reference_names_setter_parameter() {
    let injector = injector();
    injector
        .add_setter(
            "Base",
            "set_greeting",
            [("greeting".to_string(), ParamValue::reference("Missing"))].into(),
        )
        .unwrap();
    let context = unbound_context(injector.get_instance("Base", None).err().unwrap());
    assert!(context.contains("Base::set_greeting ($greeting)"), "context: {}", context);
}
