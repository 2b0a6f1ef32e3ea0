use anvil_di::{
    Binder, Binding, BindingKey, Class, ClassRegistry, DiError, DiResult, Injector, Module, Param, ParamValue, Scope,
    Target,
};
use std::collections::BTreeMap;
use std::sync::Arc;

struct Mailer {
    host: String,
}

struct SmtpMailer;
struct NullMailer;

fn registry() -> Arc<ClassRegistry> {
    let mut registry = ClassRegistry::new();
    registry
        .register(Class::interface("MailerInterface"))
        .register(
            Class::new("Mailer")
                .implements("MailerInterface")
                .constructor([Param::new("host").default_value("localhost")], |args| {
                    Ok(Mailer {
                        host: args.string("host")?,
                    })
                }),
        )
        .register(Class::new("SmtpMailer").implements("MailerInterface").constructor([], |_| Ok(SmtpMailer)))
        .register(Class::new("NullMailer").implements("MailerInterface").constructor([], |_| Ok(NullMailer)));
    Arc::new(registry)
}

struct BaseModule;

impl Module for BaseModule {
    fn configure(&self, binder: &mut Binder) -> DiResult<()> {
        binder.bind("MailerInterface").to("SmtpMailer");
        binder.bind("MailerInterface").annotated_with("null").to("NullMailer");
        Ok(())
    }
}

struct AppModule;

impl Module for AppModule {
    fn configure(&self, binder: &mut Binder) -> DiResult<()> {
        binder.bind("MailerInterface").to("Mailer").in_scope(Scope::Singleton);
        binder.param("Mailer", "host", ParamValue::literal("smtp.example.com"));
        binder.install(&BaseModule)?;
        Ok(())
    }
}

struct FailingModule;

impl Module for FailingModule {
    fn configure(&self, _binder: &mut Binder) -> DiResult<()> {
        Err(DiError::Module("missing credentials".into()))
    }
}

#[test]
fn test_installing_module_keeps_existing_bindings() {
    let mut binder = Binder::new();
    AppModule.configure(&mut binder).unwrap();

    let binding = binder.binding("MailerInterface", None).unwrap();
    assert_eq!(binding.target, Target::Class("Mailer".into()));
    assert_eq!(binding.scope, Some(Scope::Singleton));
    assert!(binder.binding("MailerInterface", Some("null")).is_some());
    assert_eq!(binder.installed().len(), 1);
}

#[test]
fn test_injector_uses_installing_module_binding() {
    let injector = Injector::builder(registry()).module(&AppModule).build().unwrap();
    let mailer = injector.get::<Mailer>("MailerInterface").unwrap();
    assert_eq!(mailer.host, "smtp.example.com");
    assert!(Arc::ptr_eq(&mailer, &injector.get::<Mailer>("MailerInterface").unwrap()));
    assert!(injector.get_named::<NullMailer>("MailerInterface", "null").is_ok());
}

#[test]
fn test_later_module_overrides_earlier() {
    let injector = Injector::builder(registry())
        .module(&AppModule)
        .module(&BaseModule)
        .build()
        .unwrap();
    assert!(injector.get::<SmtpMailer>("MailerInterface").is_ok());
    assert_eq!(injector.module_identity().matches('+').count(), 1);
}

#[test]
fn test_declared_default_without_module_param() {
    let injector = Injector::builder(registry()).build().unwrap();
    let mailer = injector.get::<Mailer>("Mailer").unwrap();
    assert_eq!(mailer.host, "localhost");
}

#[test]
fn test_module_error_propagates() {
    let err = Injector::builder(registry()).module(&FailingModule).build().err().unwrap();
    assert_eq!(err, DiError::Module("missing credentials".into()));
}

#[test]
fn test_locked_injector_rejects_mutations() {
    let injector = Injector::builder(registry()).module(&BaseModule).build().unwrap();
    injector.lock();
    assert!(injector.is_locked());

    let bind = injector.bind(BindingKey::of("MailerInterface"), Binding::to_class("NullMailer"));
    assert!(matches!(bind, Err(DiError::ContainerLocked(_))));
    let param = injector.set_param("Mailer", "host", ParamValue::literal("x"));
    assert!(matches!(param, Err(DiError::ContainerLocked(_))));
    let setter = injector.add_setter("Mailer", "set_host", BTreeMap::new());
    assert!(matches!(setter, Err(DiError::ContainerLocked(_))));

    // Resolution keeps working
    assert!(injector.get::<SmtpMailer>("MailerInterface").is_ok());
}

#[test]
fn test_locked_injector_freezes_config_table() {
    let injector = Injector::builder(registry()).module(&BaseModule).build().unwrap();
    injector.lock();
    let config = injector.config();
    assert!(config.is_locked());

    let param = config.set_param("Mailer", "host", ParamValue::literal("x"));
    assert!(matches!(param, Err(DiError::ContainerLocked(_))));
    assert!(!config.has_param("Mailer", "host"));
    let setter = config.add_setter("Mailer", "set_host", BTreeMap::new());
    assert!(matches!(setter, Err(DiError::ContainerLocked(_))));
    assert!(matches!(config.reset(), Err(DiError::ContainerLocked(_))));

    assert_eq!(injector.get::<Mailer>("Mailer").unwrap().host, "localhost");
}

#[test]
fn test_container_lock_also_freezes_config() {
    let injector = Injector::builder(registry()).module(&BaseModule).build().unwrap();
    injector.container().lock();
    assert!(injector.config().is_locked());
    assert!(injector.set_param("Mailer", "host", ParamValue::literal("x")).is_err());
}

#[test]
fn test_descriptors_list_bindings() {
    let injector = Injector::builder(registry()).module(&BaseModule).build().unwrap();
    let descriptors = injector.descriptors();
    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors.iter().filter(|d| d.is_qualified()).count(), 1);
    assert!(descriptors.iter().all(|d| d.target_kind == "class"));
}
