//! The service registry
//!
//! [`Services`] keeps every realized service in ascending priority order and
//! indexes them by name. Lookups return the best match, or a conflict when
//! the best priority is shared.
//!
//! Registries are normally produced by
//! [`ServicesBuilder::build`](crate::ServicesBuilder::build) and frozen once
//! built; services can still create their instances lazily afterwards.

use crate::declaration::ServiceDeclaration;
use crate::definition::ServiceDefinition;
use crate::dependency::ServiceResolver;
use crate::error::{DiError, Result};
use crate::service::Service;
use crate::types::TypeDescriptor;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Registry of realized services.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct Services {
    inner: Arc<ServicesInner>,
}

pub(crate) struct ServicesInner {
    name: Option<String>,
    /// Ascending priority, insertion order within a priority
    ordered: RwLock<Vec<Arc<Service>>>,
    /// Same order, grouped by name
    by_name: DashMap<Arc<str>, Vec<Arc<Service>>, RandomState>,
    frozen: AtomicBool,
}

impl Services {
    /// Create an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::create(None, None)
    }

    /// Create a registry whose services start as inherited copies of `parent`'s.
    ///
    /// Closing the child never closes the parent's instances.
    pub fn with_parent(parent: &Services) -> Self {
        Self::create(None, Some(parent))
    }

    pub(crate) fn create(name: Option<String>, parent: Option<&Services>) -> Self {
        let services = Self {
            inner: Arc::new(ServicesInner {
                name,
                ordered: RwLock::new(Vec::new()),
                by_name: DashMap::with_capacity_and_hasher_and_shard_amount(
                    0,
                    RandomState::new(),
                    8,
                ),
                frozen: AtomicBool::new(false),
            }),
        };

        if let Some(parent) = parent {
            // the parent is already consistent, no conflict check needed
            let mut ordered = services.write();
            for service in parent.iter() {
                services.insert(&mut ordered, Arc::new(Service::inherit(&service)));
            }
            drop(ordered);

            #[cfg(feature = "logging")]
            debug!(
                target: "service_injector",
                registry = services.name(),
                inherited = services.len(),
                "Created registry from parent"
            );
        }

        services
    }

    /// Name given at build time, if any
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a realized service.
    ///
    /// Fails with `Frozen` once the registry is frozen, and with
    /// `DuplicateRegistration` when an existing service satisfies the new
    /// one's name and type at the same priority.
    pub fn add(&self, service: Service) -> Result<Arc<Service>> {
        if self.is_frozen() {
            return Err(DiError::Frozen);
        }

        let service = Arc::new(service);
        let mut ordered = self.write();
        if let Some(existing) = ordered.iter().find(|s| s.conflicts_with(service.as_ref())) {
            return Err(DiError::DuplicateRegistration {
                existing: existing.definition(),
                new: service.definition(),
            });
        }
        self.insert(&mut ordered, Arc::clone(&service));
        drop(ordered);

        #[cfg(feature = "logging")]
        debug!(
            target: "service_injector",
            service = service.name(),
            priority = service.priority(),
            "Service added"
        );

        Ok(service)
    }

    /// Materialize `declaration` against this registry and add it.
    ///
    /// Returns `None` when the declaration declines.
    pub fn declare(
        &self,
        declaration: impl ServiceDeclaration + 'static,
    ) -> Result<Option<Arc<Service>>> {
        let declaration: Arc<dyn ServiceDeclaration> = Arc::new(declaration);
        let mut resolver = self.clone();
        match declaration.create_instance_supplier(&mut resolver)? {
            Some(supplier) => self.add(Service::new(declaration, supplier)).map(Some),
            None => Ok(None),
        }
    }

    fn insert(&self, ordered: &mut Vec<Arc<Service>>, service: Arc<Service>) {
        let priority = service.priority();
        let index = ordered.partition_point(|s| s.priority() <= priority);
        ordered.insert(index, Arc::clone(&service));

        let mut named = self
            .inner
            .by_name
            .entry(Arc::from(service.name()))
            .or_default();
        let index = named.partition_point(|s| s.priority() <= priority);
        named.insert(index, service);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Best service for `name` (if any) and `ty`.
    ///
    /// Fails with `NotFound` when nothing matches and with `Conflict` when
    /// two or more matches share the best priority.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use service_injector::prelude::*;
    ///
    /// let services = ServicesBuilder::new()
    ///     .declare::<String>().named("a").priority(-10).with_instance("A".to_string()).register()
    ///     .declare::<String>().named("b").with_instance("B".to_string()).register()
    ///     .build()
    ///     .unwrap();
    ///
    /// let best = services.service(None, &TypeDescriptor::of::<String>()).unwrap();
    /// assert_eq!(best.name(), "a");
    /// ```
    pub fn service(&self, name: Option<&str>, ty: &TypeDescriptor) -> Result<Arc<Service>> {
        self.lookup(name, ty)
    }

    fn lookup(&self, name: Option<&str>, ty: &TypeDescriptor) -> Result<Arc<Service>> {
        let candidates: Vec<Arc<Service>> = match name {
            Some(name) => self
                .inner
                .by_name
                .get(name)
                .map(|named| {
                    named
                        .iter()
                        .filter(|s| s.is_assignable_to(ty))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            None => self
                .read()
                .iter()
                .filter(|s| s.is_assignable_to(ty))
                .cloned()
                .collect(),
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "service_injector",
            service = %ty,
            name = ?name,
            candidates = candidates.len(),
            "Service lookup"
        );

        best(name, ty, candidates)
    }

    /// Every service assignable to `ty`, best first
    pub fn services(&self, ty: &TypeDescriptor) -> TypedServices {
        TypedServices {
            descriptor: ty.clone(),
            services: self
                .read()
                .iter()
                .filter(|s| s.is_assignable_to(ty))
                .cloned()
                .collect(),
        }
    }

    /// Instance of the best service of type `T`
    #[inline]
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get_with(None, &TypeDescriptor::of::<T>())
    }

    /// Instance of the best service of type `T` named `name`
    #[inline]
    pub fn get_named<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        self.get_with(Some(name), &TypeDescriptor::of::<T>())
    }

    /// Instance of the best service matching `name` and `ty`, as `T`
    pub fn get_with<T: Send + Sync + 'static>(
        &self,
        name: Option<&str>,
        ty: &TypeDescriptor,
    ) -> Result<Arc<T>> {
        self.service(name, ty)?.get_as::<T>()
    }

    /// Snapshot of all services in priority order
    pub fn iter(&self) -> std::vec::IntoIter<Arc<Service>> {
        self.read().clone().into_iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Service>>> {
        self.inner
            .ordered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Service>>> {
        self.inner
            .ordered
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Reject further registrations.
    #[inline]
    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            target: "service_injector",
            registry = self.name(),
            service_count = self.len(),
            "Registry frozen - no further registrations allowed"
        );
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    /// Close every owned, created, closeable service.
    ///
    /// Failures are logged per service and do not stop the others.
    pub fn close(&self) {
        #[cfg(feature = "logging")]
        debug!(
            target: "service_injector",
            registry = self.name(),
            service_count = self.len(),
            "Closing registry"
        );

        for service in self.iter() {
            service.close();
        }
    }

    /// Query-only handle that does not keep the registry alive
    pub fn expose(&self) -> ExposedServices {
        ExposedServices {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("name", &self.name())
            .field("service_count", &self.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl ServiceResolver for Services {
    fn service(&mut self, name: Option<&str>, ty: &TypeDescriptor) -> Result<Arc<Service>> {
        self.lookup(name, ty)
    }
}

impl IntoIterator for &Services {
    type Item = Arc<Service>;
    type IntoIter = std::vec::IntoIter<Arc<Service>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn best(
    name: Option<&str>,
    ty: &TypeDescriptor,
    candidates: Vec<Arc<Service>>,
) -> Result<Arc<Service>> {
    let Some(first) = candidates.first() else {
        return Err(DiError::not_found(name, ty));
    };

    let top = candidates
        .iter()
        .take_while(|s| s.priority() == first.priority())
        .count();
    if top > 1 {
        return Err(DiError::Conflict {
            name: name.map(str::to_owned),
            descriptor: ty.clone(),
            candidates: candidates[..top].iter().map(|s| s.definition()).collect(),
        });
    }

    Ok(Arc::clone(first))
}

// =============================================================================
// Typed views
// =============================================================================

/// Ordered view of the services assignable to a type
#[derive(Clone, Debug)]
pub struct TypedServices {
    descriptor: TypeDescriptor,
    services: Vec<Arc<Service>>,
}

impl TypedServices {
    /// Type this view was filtered by
    #[inline]
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Narrow further to `ty`
    pub fn services(&self, ty: &TypeDescriptor) -> TypedServices {
        TypedServices {
            descriptor: ty.clone(),
            services: self
                .services
                .iter()
                .filter(|s| s.is_assignable_to(ty))
                .cloned()
                .collect(),
        }
    }

    /// Best service in the view
    #[inline]
    pub fn first(&self) -> Option<&Arc<Service>> {
        self.services.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Service>> {
        self.services.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Instances of every service in the view, as `T`
    pub fn instances<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.services.iter().map(|s| s.get_as::<T>()).collect()
    }
}

impl IntoIterator for TypedServices {
    type Item = Arc<Service>;
    type IntoIter = std::vec::IntoIter<Arc<Service>>;

    fn into_iter(self) -> Self::IntoIter {
        self.services.into_iter()
    }
}

impl<'a> IntoIterator for &'a TypedServices {
    type Item = &'a Arc<Service>;
    type IntoIter = std::slice::Iter<'a, Arc<Service>>;

    fn into_iter(self) -> Self::IntoIter {
        self.services.iter()
    }
}

// =============================================================================
// Exposed handle
// =============================================================================

/// Injectable, query-only view of a registry.
///
/// Every built registry registers one of these for itself, so services can
/// look up others at runtime. The handle cannot close the registry and does
/// not keep it alive.
#[derive(Clone)]
pub struct ExposedServices {
    inner: Weak<ServicesInner>,
}

impl ExposedServices {
    fn upgrade(&self) -> Result<Services> {
        self.inner
            .upgrade()
            .map(|inner| Services { inner })
            .ok_or(DiError::RegistryDropped)
    }

    /// See [`Services::service`]
    pub fn service(&self, name: Option<&str>, ty: &TypeDescriptor) -> Result<Arc<Service>> {
        self.upgrade()?.service(name, ty)
    }

    /// See [`Services::services`]
    pub fn services(&self, ty: &TypeDescriptor) -> Result<TypedServices> {
        Ok(self.upgrade()?.services(ty))
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.upgrade()?.get::<T>()
    }

    pub fn get_named<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        self.upgrade()?.get_named::<T>(name)
    }

    pub fn get_with<T: Send + Sync + 'static>(
        &self,
        name: Option<&str>,
        ty: &TypeDescriptor,
    ) -> Result<Arc<T>> {
        self.upgrade()?.get_with::<T>(name, ty)
    }

    /// Registry name, if it is still alive and has one
    pub fn name(&self) -> Option<String> {
        self.inner.upgrade()?.name.clone()
    }

    /// Is this a view of `services`?
    pub fn is(&self, services: &Services) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Arc::as_ptr(&services.inner))
    }
}

impl std::fmt::Debug for ExposedServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExposedServices")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
