//! Constructor candidates and their selection
//!
//! A type may offer several ways to build it. When one is marked preferred it
//! is used alone; otherwise every candidate is resolved and the one with the
//! most resolved dependencies that is fully resolved wins.
//!
//! ```rust
//! use service_injector::prelude::*;
//! use std::sync::Arc;
//!
//! struct Greeter {
//!     greeting: Arc<String>,
//! }
//!
//! impl Constructible for Greeter {
//!     fn constructors() -> Constructors {
//!         Constructors::new().with(Constructor::new(
//!             "Greeter(String)",
//!             ServiceDependencies::new().with(ServiceDependency::required::<String>()),
//!             |deps| Ok(Greeter { greeting: deps.required::<String>(0)? }),
//!         ))
//!     }
//! }
//!
//! let services = ServicesBuilder::new()
//!     .declare::<String>().with_instance("hello".to_string()).register()
//!     .declare::<Greeter>().constructed().register()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(*services.get::<Greeter>().unwrap().greeting, "hello");
//! ```

use crate::declaration::{Factory, Instance, InstanceSupplier};
use crate::definition::ServiceDefinition;
use crate::dependency::{ResolvedDependencies, ServiceDependencies, ServiceResolver};
use crate::error::{BoxError, DiError, Result};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Types that know how to construct themselves from resolved dependencies.
///
/// Usually derived with `#[derive(Inject)]`.
pub trait Constructible: Send + Sync + Sized + 'static {
    /// Every way of building `Self`
    fn constructors() -> Constructors;
}

/// One way of building an instance
#[derive(Clone)]
pub struct Constructor {
    label: String,
    dependencies: ServiceDependencies,
    preferred: bool,
    name: Option<String>,
    priority: Option<i32>,
    factory: Factory,
}

impl Constructor {
    /// Create a constructor producing `T` from its resolved dependencies
    pub fn new<T, F>(label: impl Into<String>, dependencies: ServiceDependencies, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedDependencies) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            dependencies,
            preferred: false,
            name: None,
            priority: None,
            factory: Arc::new(
                move |deps: &ResolvedDependencies| -> std::result::Result<Instance, BoxError> {
                    Ok(Arc::new(factory(deps)?))
                },
            ),
        }
    }

    /// Use this constructor alone, bypassing ranking
    pub fn preferred(mut self) -> Self {
        self.preferred = true;
        self
    }

    /// Service name to use when the declaration sets none
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Service priority to use when the declaration sets none
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn dependencies(&self) -> &ServiceDependencies {
        &self.dependencies
    }

    #[inline]
    pub fn is_preferred(&self) -> bool {
        self.preferred
    }

    /// Resolve this candidate's dependencies
    pub fn resolve(&self, resolver: &mut dyn ServiceResolver) -> Result<ResolvedConstructor> {
        Ok(ResolvedConstructor {
            constructor: self.clone(),
            dependencies: self.dependencies.resolve(resolver)?,
        })
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("label", &self.label)
            .field("dependencies", &self.dependencies)
            .field("preferred", &self.preferred)
            .finish_non_exhaustive()
    }
}

/// Candidate set for a type
#[derive(Clone, Debug, Default)]
pub struct Constructors {
    candidates: Vec<Constructor>,
}

impl Constructors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate
    pub fn with(mut self, constructor: Constructor) -> Self {
        self.candidates.push(constructor);
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Constructor> {
        self.candidates.iter()
    }

    /// First preferred candidate
    pub fn preferred(&self) -> Option<&Constructor> {
        self.candidates.iter().find(|c| c.preferred)
    }

    /// Name carried by the preferred candidate
    pub fn name(&self) -> Option<&str> {
        self.preferred().and_then(|c| c.name.as_deref())
    }

    /// Priority carried by the preferred candidate
    pub fn priority(&self) -> Option<i32> {
        self.preferred().and_then(|c| c.priority)
    }

    /// Select the candidate to build `service` with.
    pub fn resolve(
        &self,
        service: &dyn ServiceDefinition,
        resolver: &mut dyn ServiceResolver,
    ) -> Result<ResolvedConstructor> {
        let candidates: Vec<&Constructor> = match self.preferred() {
            Some(preferred) => vec![preferred],
            None => self.candidates.iter().collect(),
        };

        let mut resolved = candidates
            .into_iter()
            .map(|candidate| candidate.resolve(resolver))
            .collect::<Result<Vec<_>>>()?;
        // stable: ties keep declaration order
        resolved.sort_by(|a, b| b.resolved_count().cmp(&a.resolved_count()));

        if let Some(index) = resolved.iter().position(ResolvedConstructor::is_resolved) {
            let chosen = resolved.swap_remove(index);

            #[cfg(feature = "logging")]
            trace!(
                target: "service_injector",
                service = service.name(),
                constructor = chosen.constructor.label(),
                "Selected constructor"
            );

            return Ok(chosen);
        }

        Err(DiError::UnresolvedConstructor {
            service: service.definition(),
            candidates: resolved.iter().map(ResolvedConstructor::report).collect(),
        })
    }
}

impl FromIterator<Constructor> for Constructors {
    fn from_iter<I: IntoIterator<Item = Constructor>>(iter: I) -> Self {
        Self {
            candidates: iter.into_iter().collect(),
        }
    }
}

/// A candidate with its dependencies resolved
#[derive(Debug)]
pub struct ResolvedConstructor {
    constructor: Constructor,
    dependencies: ResolvedDependencies,
}

impl ResolvedConstructor {
    #[inline]
    pub fn constructor(&self) -> &Constructor {
        &self.constructor
    }

    #[inline]
    pub fn dependencies(&self) -> &ResolvedDependencies {
        &self.dependencies
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.dependencies.is_resolved()
    }

    #[inline]
    pub fn resolved_count(&self) -> usize {
        self.dependencies.resolved_count()
    }

    /// Summary used in error reports
    pub fn report(&self) -> CandidateReport {
        CandidateReport {
            label: self.constructor.label.clone(),
            resolved: self.dependencies.resolved_count(),
            total: self.dependencies.len(),
        }
    }

    /// Turn into a supplier that invokes the constructor on every call
    pub fn into_supplier(self) -> InstanceSupplier {
        let Self {
            constructor,
            dependencies,
        } = self;
        let factory = constructor.factory;
        Arc::new(move || factory(&dependencies))
    }
}

/// Label and resolution progress of a rejected candidate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateReport {
    pub label: String,
    pub resolved: usize,
    pub total: usize,
}

impl fmt::Display for CandidateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{} resolved)", self.label, self.resolved, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::FactoryDeclaration;
    use crate::definition::Definition;
    use crate::dependency::ServiceDependency;
    use crate::registry::Services;
    use crate::types::TypeDescriptor;

    #[derive(Debug, PartialEq)]
    struct Built(&'static str);

    fn registry() -> Services {
        let services = Services::new();
        services
            .declare(FactoryDeclaration::instance(
                TypeDescriptor::of::<String>(),
                None,
                0,
                String::from("text"),
            ))
            .unwrap();
        services
            .declare(FactoryDeclaration::instance(TypeDescriptor::of::<u32>(), None, 0, 7u32))
            .unwrap();
        services
    }

    fn service() -> Definition {
        Definition::new(TypeDescriptor::of::<Built>(), "built", 0)
    }

    fn candidate(label: &'static str, deps: ServiceDependencies) -> Constructor {
        Constructor::new(label, deps, move |_| Ok(Built(label)))
    }

    fn build(constructors: &Constructors) -> Result<&'static str> {
        let mut services = registry();
        let chosen = constructors.resolve(&service(), &mut services)?;
        let instance = chosen.into_supplier()().unwrap();
        Ok(instance.downcast::<Built>().unwrap().0)
    }

    #[test]
    fn test_most_resolved_candidate_wins() {
        let constructors = Constructors::new()
            .with(candidate("empty", ServiceDependencies::new()))
            .with(candidate(
                "both",
                ServiceDependencies::new()
                    .with(ServiceDependency::required::<String>())
                    .with(ServiceDependency::required::<u32>()),
            ))
            .with(candidate(
                "string",
                ServiceDependencies::new().with(ServiceDependency::required::<String>()),
            ));
        assert_eq!(build(&constructors).unwrap(), "both");
    }

    #[test]
    fn test_unresolved_candidates_are_skipped() {
        let constructors = Constructors::new()
            .with(candidate(
                "needs-f64",
                ServiceDependencies::new()
                    .with(ServiceDependency::required::<String>())
                    .with(ServiceDependency::required::<f64>()),
            ))
            .with(candidate(
                "string",
                ServiceDependencies::new().with(ServiceDependency::required::<String>()),
            ));
        assert_eq!(build(&constructors).unwrap(), "string");
    }

    #[test]
    fn test_ties_keep_declaration_order() {
        let constructors = Constructors::new()
            .with(candidate(
                "first",
                ServiceDependencies::new().with(ServiceDependency::required::<String>()),
            ))
            .with(candidate(
                "second",
                ServiceDependencies::new().with(ServiceDependency::required::<u32>()),
            ));
        assert_eq!(build(&constructors).unwrap(), "first");
    }

    #[test]
    fn test_preferred_bypasses_ranking() {
        let constructors = Constructors::new()
            .with(candidate(
                "both",
                ServiceDependencies::new()
                    .with(ServiceDependency::required::<String>())
                    .with(ServiceDependency::required::<u32>()),
            ))
            .with(candidate("empty", ServiceDependencies::new()).preferred().named("chosen"));

        assert_eq!(constructors.name(), Some("chosen"));
        assert_eq!(build(&constructors).unwrap(), "empty");
    }

    #[test]
    fn test_unresolvable_preferred_is_not_replaced() {
        let constructors = Constructors::new()
            .with(candidate("empty", ServiceDependencies::new()))
            .with(candidate(
                "needs-f64",
                ServiceDependencies::new().with(ServiceDependency::required::<f64>()),
            )
            .preferred());

        match build(&constructors) {
            Err(DiError::UnresolvedConstructor { candidates, .. }) => {
                assert_eq!(candidates.len(), 1);
                assert_eq!(candidates[0].label, "needs-f64");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_report_lists_every_candidate() {
        let constructors = Constructors::new()
            .with(candidate(
                "a",
                ServiceDependencies::new()
                    .with(ServiceDependency::required::<String>())
                    .with(ServiceDependency::required::<f64>()),
            ))
            .with(candidate(
                "b",
                ServiceDependencies::new().with(ServiceDependency::required::<i8>()),
            ));

        match build(&constructors) {
            Err(DiError::UnresolvedConstructor { candidates, .. }) => {
                assert_eq!(
                    candidates,
                    vec![
                        CandidateReport { label: "a".into(), resolved: 1, total: 2 },
                        CandidateReport { label: "b".into(), resolved: 0, total: 1 },
                    ]
                );
            }
            other => panic!("unexpected: {other:?}"),
        }

        assert!(matches!(
            build(&Constructors::new()),
            Err(DiError::UnresolvedConstructor { .. })
        ));
    }
}
