//! Dependency specifications and their resolution
//!
//! A [`ServiceDependency`] names what a declaration needs; resolving it
//! through a [`ServiceResolver`] yields a [`ResolvedServiceDependency`] bound
//! to a concrete [`Service`], absent (for optional dependencies) or failed.

use crate::declaration::Instance;
use crate::error::{DiError, Result};
use crate::service::Service;
use crate::types::TypeDescriptor;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Lookup capability handed to declarations while they build their supplier.
///
/// During a build the resolver may create still-pending declarations on
/// demand; outside a build it is a plain registry query.
pub trait ServiceResolver {
    /// Find the best service for `name` (if any) and `ty`
    fn service(&mut self, name: Option<&str>, ty: &TypeDescriptor) -> Result<Arc<Service>>;
}

/// What a declaration needs: a type, an optional name hint and optionality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDependency {
    descriptor: TypeDescriptor,
    name: Option<String>,
    optional: bool,
}

impl ServiceDependency {
    pub fn new(descriptor: TypeDescriptor, name: Option<String>, optional: bool) -> Self {
        Self {
            descriptor,
            name,
            optional,
        }
    }

    /// Required dependency on `T`
    #[inline]
    pub fn required<T: ?Sized + 'static>() -> Self {
        Self::new(TypeDescriptor::of::<T>(), None, false)
    }

    /// Optional dependency on `T`
    #[inline]
    pub fn optional<T: ?Sized + 'static>() -> Self {
        Self::new(TypeDescriptor::of::<T>(), None, true)
    }

    /// Required dependency on an explicit descriptor
    #[inline]
    pub fn on(descriptor: TypeDescriptor) -> Self {
        Self::new(descriptor, None, false)
    }

    /// Attach a name hint
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark the dependency optional
    pub fn as_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[inline]
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Resolve against `resolver`.
    ///
    /// A named lookup that fails is retried without the name. Only
    /// resolution failures are captured; anything else is returned as `Err`.
    pub fn resolve(&self, resolver: &mut dyn ServiceResolver) -> Result<ResolvedServiceDependency> {
        let first = match resolver.service(self.name(), &self.descriptor) {
            Ok(service) => return Ok(self.bind(Binding::Bound(service))),
            Err(err) if err.is_resolution_failure() => err,
            Err(err) => return Err(err),
        };

        if self.name.is_some() {
            #[cfg(feature = "logging")]
            trace!(
                target: "service_injector",
                dependency = %self.descriptor,
                name = ?self.name,
                "Named lookup failed, retrying without name"
            );

            match resolver.service(None, &self.descriptor) {
                Ok(service) => return Ok(self.bind(Binding::Bound(service))),
                Err(err) if err.is_resolution_failure() => {}
                Err(err) => return Err(err),
            }
        }

        let binding = if self.optional {
            Binding::Absent
        } else {
            Binding::Failed(first)
        };
        Ok(self.bind(binding))
    }

    fn bind(&self, binding: Binding) -> ResolvedServiceDependency {
        ResolvedServiceDependency {
            dependency: self.clone(),
            binding,
        }
    }
}

/// Ordered list of dependencies
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceDependencies {
    items: Vec<ServiceDependency>,
}

impl ServiceDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dependency
    pub fn with(mut self, dependency: ServiceDependency) -> Self {
        self.items.push(dependency);
        self
    }

    pub fn push(&mut self, dependency: ServiceDependency) {
        self.items.push(dependency);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServiceDependency> {
        self.items.iter()
    }

    /// Resolve every dependency in order
    pub fn resolve(&self, resolver: &mut dyn ServiceResolver) -> Result<ResolvedDependencies> {
        let entries = self
            .items
            .iter()
            .map(|dependency| dependency.resolve(resolver))
            .collect::<Result<Vec<_>>>()?;
        Ok(ResolvedDependencies::new(entries))
    }
}

impl FromIterator<ServiceDependency> for ServiceDependencies {
    fn from_iter<I: IntoIterator<Item = ServiceDependency>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ServiceDependencies {
    type Item = &'a ServiceDependency;
    type IntoIter = std::slice::Iter<'a, ServiceDependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Outcome of resolving a single dependency
#[derive(Debug)]
pub enum Binding {
    /// Bound to a service
    Bound(Arc<Service>),
    /// Optional dependency without a match
    Absent,
    /// Required dependency without a match, with the first lookup error
    Failed(DiError),
}

/// A dependency together with its binding
#[derive(Debug)]
pub struct ResolvedServiceDependency {
    dependency: ServiceDependency,
    binding: Binding,
}

impl ResolvedServiceDependency {
    #[inline]
    pub fn dependency(&self) -> &ServiceDependency {
        &self.dependency
    }

    #[inline]
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Bound service, if any
    pub fn service(&self) -> Option<&Arc<Service>> {
        match &self.binding {
            Binding::Bound(service) => Some(service),
            _ => None,
        }
    }

    /// Bound, or optional
    #[inline]
    pub fn is_resolved(&self) -> bool {
        !matches!(self.binding, Binding::Failed(_))
    }

    /// Produce the argument value, creating the bound service if needed
    pub fn argument(&self) -> Result<Argument> {
        match (&self.binding, self.dependency.optional) {
            (Binding::Bound(service), false) => Ok(Argument::Required(service.get()?)),
            (Binding::Bound(service), true) => Ok(Argument::Optional(Some(service.get()?))),
            (Binding::Absent, _) => Ok(Argument::Optional(None)),
            (Binding::Failed(_), _) => Err(DiError::Internal(format!(
                "argument requested for unresolved dependency on {}",
                self.dependency.descriptor
            ))),
        }
    }
}

/// Argument value handed to a factory
#[derive(Clone)]
pub enum Argument {
    Required(Instance),
    Optional(Option<Instance>),
}

impl Argument {
    /// The instance, if present
    pub fn instance(&self) -> Option<&Instance> {
        match self {
            Self::Required(instance) => Some(instance),
            Self::Optional(instance) => instance.as_ref(),
        }
    }
}

/// Resolved dependency list, in declaration order
#[derive(Debug)]
pub struct ResolvedDependencies {
    entries: Vec<ResolvedServiceDependency>,
    resolved: usize,
}

impl ResolvedDependencies {
    fn new(entries: Vec<ResolvedServiceDependency>) -> Self {
        let resolved = entries.iter().filter(|entry| entry.is_resolved()).count();
        Self { entries, resolved }
    }

    /// Every entry is bound or optional
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.resolved == self.entries.len()
    }

    #[inline]
    pub fn resolved_count(&self) -> usize {
        self.resolved
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ResolvedServiceDependency] {
        &self.entries
    }

    /// Argument values for every entry, creating bound services on demand
    pub fn arguments(&self) -> Result<Vec<Argument>> {
        self.entries.iter().map(ResolvedServiceDependency::argument).collect()
    }

    /// Typed value of the required dependency at `index`
    pub fn required<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
        match &self.entry(index)?.binding {
            Binding::Bound(service) => service.get_as::<T>(),
            _ => Err(DiError::Internal(format!(
                "dependency {index} is not bound to a service"
            ))),
        }
    }

    /// Typed value of the optional dependency at `index`
    pub fn optional<T: Send + Sync + 'static>(&self, index: usize) -> Result<Option<Arc<T>>> {
        match &self.entry(index)?.binding {
            Binding::Bound(service) => service.get_as::<T>().map(Some),
            Binding::Absent => Ok(None),
            Binding::Failed(_) => Err(DiError::Internal(format!(
                "dependency {index} is unresolved"
            ))),
        }
    }

    /// First captured resolution error, if any entry failed
    pub fn resolution_error(&self) -> Option<&DiError> {
        self.entries.iter().find_map(|entry| match &entry.binding {
            Binding::Failed(err) => Some(err),
            _ => None,
        })
    }

    /// Take the first captured resolution error
    pub fn into_resolution_error(self) -> DiError {
        self.entries
            .into_iter()
            .find_map(|entry| match entry.binding {
                Binding::Failed(err) => Some(err),
                _ => None,
            })
            .unwrap_or_else(|| DiError::Internal("dependencies are resolved".into()))
    }

    fn entry(&self, index: usize) -> Result<&ResolvedServiceDependency> {
        self.entries.get(index).ok_or_else(|| {
            DiError::Internal(format!(
                "dependency index {index} out of range ({} dependencies)",
                self.entries.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::FactoryDeclaration;
    use crate::definition::ServiceDefinition;
    use crate::registry::Services;

    fn registry() -> Services {
        let services = Services::new();
        services
            .declare(FactoryDeclaration::instance(
                TypeDescriptor::of::<String>(),
                Some("greeting".into()),
                0,
                String::from("hello"),
            ))
            .unwrap();
        services
    }

    /// Resolver that fails every lookup with a cycle
    struct Cyclic;

    impl ServiceResolver for Cyclic {
        fn service(&mut self, _: Option<&str>, _: &TypeDescriptor) -> Result<Arc<Service>> {
            Err(DiError::CircularDependency {
                path: vec!["x".into(), "x".into()],
            })
        }
    }

    #[test]
    fn test_required_binds() {
        let mut services = registry();
        let resolved = ServiceDependency::required::<String>()
            .resolve(&mut services)
            .unwrap();
        assert!(resolved.is_resolved());
        assert_eq!(resolved.service().unwrap().name(), "greeting");
    }

    #[test]
    fn test_wrong_name_falls_back_to_type() {
        let mut services = registry();
        let resolved = ServiceDependency::required::<String>()
            .named("farewell")
            .resolve(&mut services)
            .unwrap();
        assert_eq!(resolved.service().unwrap().name(), "greeting");
    }

    #[test]
    fn test_optional_degrades_to_absent() {
        let mut services = registry();
        let resolved = ServiceDependency::optional::<f64>()
            .resolve(&mut services)
            .unwrap();
        assert!(resolved.is_resolved());
        assert!(resolved.service().is_none());
        assert!(matches!(resolved.argument().unwrap(), Argument::Optional(None)));
    }

    #[test]
    fn test_required_failure_is_captured() {
        let mut services = registry();
        let deps = ServiceDependencies::new()
            .with(ServiceDependency::required::<String>())
            .with(ServiceDependency::required::<f64>());
        let resolved = deps.resolve(&mut services).unwrap();

        assert!(!resolved.is_resolved());
        assert_eq!(resolved.resolved_count(), 1);
        assert!(matches!(resolved.resolution_error(), Some(DiError::NotFound { .. })));
        assert!(matches!(resolved.into_resolution_error(), DiError::NotFound { .. }));
    }

    #[test]
    fn test_terminal_errors_propagate() {
        let result = ServiceDependency::optional::<String>().resolve(&mut Cyclic);
        assert!(matches!(result, Err(DiError::CircularDependency { .. })));
    }

    #[test]
    fn test_typed_accessors() {
        let mut services = registry();
        let deps = ServiceDependencies::new()
            .with(ServiceDependency::required::<String>())
            .with(ServiceDependency::optional::<u8>());
        let resolved = deps.resolve(&mut services).unwrap();

        assert_eq!(*resolved.required::<String>(0).unwrap(), "hello");
        assert!(resolved.optional::<u8>(1).unwrap().is_none());
        assert!(matches!(
            resolved.required::<u64>(0),
            Err(DiError::TypeMismatch { .. })
        ));
        assert!(resolved.required::<String>(5).is_err());
        assert_eq!(resolved.arguments().unwrap().len(), 2);
    }
}
