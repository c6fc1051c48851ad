//! Service declarations: how a service is produced
//!
//! A declaration is a [`ServiceDefinition`] that can hand out an
//! [`InstanceSupplier`] once its dependencies are resolved. The builder asks
//! each declaration for its supplier at most once per build.

use crate::constructor::Constructors;
use crate::definition::{Definition, ServiceDefinition};
use crate::dependency::{ResolvedDependencies, ServiceDependencies, ServiceResolver};
use crate::error::{BoxError, DiError, Result};
use crate::scan::Member;
use crate::types::TypeDescriptor;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased service instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Produces the instance of a realized service
pub type InstanceSupplier = Arc<dyn Fn() -> std::result::Result<Instance, BoxError> + Send + Sync>;

/// Builds an instance from resolved dependencies
pub type Factory =
    Arc<dyn Fn(&ResolvedDependencies) -> std::result::Result<Instance, BoxError> + Send + Sync>;

/// Releases an instance when its registry is closed
pub type Closer = Arc<dyn Fn(&Instance) -> std::result::Result<(), BoxError> + Send + Sync>;

/// A service the builder can materialize
pub trait ServiceDeclaration: ServiceDefinition + Send + Sync {
    /// Resolve dependencies and return the supplier for this service.
    ///
    /// `Ok(None)` means the declaration declines: no service is registered
    /// and requesters see `NotFound`.
    fn create_instance_supplier(
        &self,
        resolver: &mut dyn ServiceResolver,
    ) -> Result<Option<InstanceSupplier>>;

    /// Members that declare further services
    fn members(&self) -> &[Member] {
        &[]
    }

    /// How to release the instance on close
    fn closer(&self) -> Option<Closer> {
        None
    }
}

impl fmt::Debug for dyn ServiceDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::definition::definition_string(self))
    }
}

/// Members and closer shared by the concrete declarations
#[derive(Clone, Default)]
pub(crate) struct Extras {
    pub(crate) members: Vec<Member>,
    pub(crate) closer: Option<Closer>,
}

/// Declaration backed by an explicit dependency list and a factory
pub struct FactoryDeclaration {
    definition: Definition,
    dependencies: ServiceDependencies,
    factory: Factory,
    extras: Extras,
}

impl FactoryDeclaration {
    pub fn new(definition: Definition, dependencies: ServiceDependencies, factory: Factory) -> Self {
        Self {
            definition,
            dependencies,
            factory,
            extras: Extras::default(),
        }
    }

    /// Declaration of a fixed instance
    pub fn instance<T: Send + Sync + 'static>(
        descriptor: TypeDescriptor,
        name: Option<String>,
        priority: i32,
        value: T,
    ) -> Self {
        Self::shared(descriptor, name, priority, Arc::new(value))
    }

    /// Declaration of a fixed, already shared instance
    pub fn shared(
        descriptor: TypeDescriptor,
        name: Option<String>,
        priority: i32,
        instance: Instance,
    ) -> Self {
        let definition = match name {
            Some(name) => Definition::new(descriptor, name, priority),
            None => Definition::unnamed(descriptor, priority),
        };
        Self::new(
            definition,
            ServiceDependencies::new(),
            Arc::new(
                move |_: &ResolvedDependencies| -> std::result::Result<Instance, BoxError> {
                    Ok(instance.clone())
                },
            ),
        )
    }

    /// Attach members declaring further services
    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.extras.members = members;
        self
    }

    /// Attach a closer
    pub fn with_closer(mut self, closer: Closer) -> Self {
        self.extras.closer = Some(closer);
        self
    }

    pub(crate) fn with_extras(mut self, extras: Extras) -> Self {
        self.extras = extras;
        self
    }
}

impl ServiceDefinition for FactoryDeclaration {
    fn descriptor(&self) -> &TypeDescriptor {
        self.definition.descriptor()
    }

    fn name(&self) -> &str {
        self.definition.name()
    }

    fn priority(&self) -> i32 {
        self.definition.priority()
    }
}

impl ServiceDeclaration for FactoryDeclaration {
    fn create_instance_supplier(
        &self,
        resolver: &mut dyn ServiceResolver,
    ) -> Result<Option<InstanceSupplier>> {
        let resolved = self.dependencies.resolve(resolver)?;
        if !resolved.is_resolved() {
            return Err(DiError::UnresolvedDependency {
                service: self.definition.clone(),
                source: Box::new(resolved.into_resolution_error()),
            });
        }

        let factory = self.factory.clone();
        let supplier: InstanceSupplier = Arc::new(move || factory(&resolved));
        Ok(Some(supplier))
    }

    fn members(&self) -> &[Member] {
        &self.extras.members
    }

    fn closer(&self) -> Option<Closer> {
        self.extras.closer.clone()
    }
}

/// Declaration built through the best of a set of constructors
pub struct ConstructedDeclaration {
    definition: Definition,
    constructors: Constructors,
    extras: Extras,
}

impl ConstructedDeclaration {
    /// Unset name and priority fall back to the preferred constructor's.
    pub fn new(
        descriptor: TypeDescriptor,
        name: Option<String>,
        priority: Option<i32>,
        constructors: Constructors,
    ) -> Self {
        let priority = priority
            .or_else(|| constructors.priority())
            .unwrap_or(crate::definition::DEFAULT_PRIORITY);
        let definition = match name.or_else(|| constructors.name().map(str::to_owned)) {
            Some(name) => Definition::new(descriptor, name, priority),
            None => Definition::unnamed(descriptor, priority),
        };
        Self {
            definition,
            constructors,
            extras: Extras::default(),
        }
    }

    /// Attach members declaring further services
    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.extras.members = members;
        self
    }

    /// Attach a closer
    pub fn with_closer(mut self, closer: Closer) -> Self {
        self.extras.closer = Some(closer);
        self
    }

    pub(crate) fn with_extras(mut self, extras: Extras) -> Self {
        self.extras = extras;
        self
    }
}

impl ServiceDefinition for ConstructedDeclaration {
    fn descriptor(&self) -> &TypeDescriptor {
        self.definition.descriptor()
    }

    fn name(&self) -> &str {
        self.definition.name()
    }

    fn priority(&self) -> i32 {
        self.definition.priority()
    }
}

impl ServiceDeclaration for ConstructedDeclaration {
    fn create_instance_supplier(
        &self,
        resolver: &mut dyn ServiceResolver,
    ) -> Result<Option<InstanceSupplier>> {
        let chosen = self.constructors.resolve(&self.definition, resolver)?;
        Ok(Some(chosen.into_supplier()))
    }

    fn members(&self) -> &[Member] {
        &self.extras.members
    }

    fn closer(&self) -> Option<Closer> {
        self.extras.closer.clone()
    }
}

/// Wraps a declaration under a different name, priority or type.
///
/// The usual output of a declaration transformer.
pub struct Redeclared {
    definition: Definition,
    inner: Arc<dyn ServiceDeclaration>,
}

impl Redeclared {
    pub fn new(inner: Arc<dyn ServiceDeclaration>) -> Self {
        Self {
            definition: inner.definition(),
            inner,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.definition.set_name(name);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.definition.set_priority(priority);
        self
    }

    pub fn as_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.definition.set_descriptor(descriptor);
        self
    }

    /// The wrapped declaration
    pub fn inner(&self) -> &Arc<dyn ServiceDeclaration> {
        &self.inner
    }
}

impl ServiceDefinition for Redeclared {
    fn descriptor(&self) -> &TypeDescriptor {
        self.definition.descriptor()
    }

    fn name(&self) -> &str {
        self.definition.name()
    }

    fn priority(&self) -> i32 {
        self.definition.priority()
    }
}

impl ServiceDeclaration for Redeclared {
    fn create_instance_supplier(
        &self,
        resolver: &mut dyn ServiceResolver,
    ) -> Result<Option<InstanceSupplier>> {
        self.inner.create_instance_supplier(resolver)
    }

    fn members(&self) -> &[Member] {
        self.inner.members()
    }

    fn closer(&self) -> Option<Closer> {
        self.inner.closer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DEFAULT_PRIORITY;
    use crate::dependency::ServiceDependency;
    use crate::registry::Services;

    #[test]
    fn test_instance_declaration() {
        let declaration =
            FactoryDeclaration::instance(TypeDescriptor::of::<u8>(), None, DEFAULT_PRIORITY, 3u8);
        assert!(declaration.name().starts_with("u8@"));

        let supplier = declaration
            .create_instance_supplier(&mut Services::new())
            .unwrap()
            .unwrap();
        let first = supplier().unwrap();
        let second = supplier().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first.downcast::<u8>().unwrap(), 3);
    }

    #[test]
    fn test_unresolved_dependency_fails() {
        let declaration = FactoryDeclaration::new(
            Definition::new(TypeDescriptor::of::<String>(), "text", 0),
            ServiceDependencies::new().with(ServiceDependency::required::<u64>()),
            Arc::new(|_: &ResolvedDependencies| -> std::result::Result<Instance, BoxError> {
                Ok(Arc::new(String::new()))
            }),
        );

        let err = declaration
            .create_instance_supplier(&mut Services::new())
            .err()
            .unwrap();
        match err {
            DiError::UnresolvedDependency { service, source } => {
                assert_eq!(service.name(), "text");
                assert!(matches!(*source, DiError::NotFound { .. }));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_constructed_defaults_from_preferred_constructor() {
        use crate::constructor::Constructor;

        let constructors = Constructors::new().with(
            Constructor::new("Unit", ServiceDependencies::new(), |_| Ok(()))
                .preferred()
                .named("unit")
                .priority(-4),
        );
        let declaration =
            ConstructedDeclaration::new(TypeDescriptor::of::<()>(), None, None, constructors.clone());
        assert_eq!(declaration.name(), "unit");
        assert_eq!(declaration.priority(), -4);

        let explicit = ConstructedDeclaration::new(
            TypeDescriptor::of::<()>(),
            Some("mine".into()),
            Some(2),
            constructors,
        );
        assert_eq!(explicit.name(), "mine");
        assert_eq!(explicit.priority(), 2);
    }

    #[test]
    fn test_redeclared_delegates_supplier() {
        let inner: Arc<dyn ServiceDeclaration> = Arc::new(FactoryDeclaration::instance(
            TypeDescriptor::of::<u8>(),
            Some("byte".into()),
            0,
            9u8,
        ));
        let redeclared = Redeclared::new(inner).named("renamed").priority(-1);
        assert_eq!(redeclared.name(), "renamed");
        assert_eq!(ServiceDefinition::priority(&redeclared), -1);

        let supplier = redeclared
            .create_instance_supplier(&mut Services::new())
            .unwrap()
            .unwrap();
        assert_eq!(*supplier().unwrap().downcast::<u8>().unwrap(), 9);
    }
}
