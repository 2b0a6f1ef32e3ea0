use anvil_di::{
    AnnotationValue, Binder, Class, ClassRegistry, DiError, DiResult, Injector, Module, Param, Scope, PRE_DESTROY,
    SCOPE,
};
use parking_lot::Mutex;
use std::sync::Arc;

type Journal = Arc<Mutex<Vec<String>>>;

struct Resource {
    name: &'static str,
    journal: Journal,
}

impl Resource {
    fn close(&self) -> DiResult<()> {
        self.journal.lock().push(self.name.to_string());
        if self.name == "broken" {
            return Err(DiError::Module("close failed".into()));
        }
        Ok(())
    }
}

fn resource(class: &'static str, deps: &[&str], journal: &Journal) -> Class {
    let journal = journal.clone();
    let params: Vec<Param> = deps.iter().map(|d| Param::typed(d.to_lowercase(), *d)).collect();
    Class::new(class)
        .constructor(params, move |_| {
            Ok(Resource {
                name: class,
                journal: journal.clone(),
            })
        })
        .shared_method("close", |r: &Resource| r.close())
        .annotate_method("close", AnnotationValue::new(PRE_DESTROY))
}

fn registry(journal: &Journal) -> Arc<ClassRegistry> {
    let mut registry = ClassRegistry::new();
    registry
        .register(resource("pool", &[], journal))
        .register(resource("cache", &["pool"], journal))
        .register(resource("broken", &[], journal))
        .register(resource("scratch", &[], journal))
        .register(resource("annotated", &[], journal).annotate(AnnotationValue::with_value(SCOPE, "singleton")));
    Arc::new(registry)
}

struct Singletons;

impl Module for Singletons {
    fn configure(&self, binder: &mut Binder) -> DiResult<()> {
        for class in ["pool", "cache", "broken"] {
            binder.bind(class).to(class).in_scope(Scope::Singleton);
        }
        Ok(())
    }
}

#[test]
fn test_pre_destroy_runs_in_reverse_creation_order() {
    let journal = Journal::default();
    let injector = Injector::builder(registry(&journal)).module(&Singletons).build().unwrap();
    injector.get_instance("cache", None).unwrap();
    injector.get_instance("cache", None).unwrap();

    injector.shutdown().unwrap();
    // pool finished construction first
    assert_eq!(*journal.lock(), vec!["cache", "pool"]);
    assert!(injector.container().singleton_keys().is_empty());
}

#[test]
fn test_prototypes_are_never_disposed() {
    let journal = Journal::default();
    let injector = Injector::builder(registry(&journal)).build().unwrap();
    injector.get_instance("scratch", None).unwrap();
    injector.get_instance("scratch", None).unwrap();
    injector.shutdown().unwrap();
    assert!(journal.lock().is_empty());
}

#[test]
fn test_scope_annotation_makes_singleton() {
    let journal = Journal::default();
    let injector = Injector::builder(registry(&journal)).build().unwrap();
    let a = injector.get_instance("annotated", None).unwrap();
    let b = injector.get_instance("annotated", None).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    injector.shutdown().unwrap();
    assert_eq!(*journal.lock(), vec!["annotated"]);
}

#[test]
fn test_failing_hook_does_not_stop_the_rest() {
    let journal = Journal::default();
    let injector = Injector::builder(registry(&journal)).module(&Singletons).build().unwrap();
    injector.get_instance("pool", None).unwrap();
    injector.get_instance("broken", None).unwrap();
    injector.get_instance("cache", None).unwrap();

    let err = injector.shutdown().err().unwrap();
    assert_eq!(err, DiError::Module("close failed".into()));
    assert_eq!(*journal.lock(), vec!["cache", "broken", "pool"]);
}

#[test]
fn test_shutdown_twice_is_a_no_op() {
    let journal = Journal::default();
    let injector = Injector::builder(registry(&journal)).module(&Singletons).build().unwrap();
    injector.get_instance("pool", None).unwrap();
    injector.shutdown().unwrap();
    injector.shutdown().unwrap();
    assert_eq!(journal.lock().len(), 1);
}
