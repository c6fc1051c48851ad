//! Realized services
//!
//! A [`Service`] pairs a declaration with the source of its instance. Owned
//! services create their instance lazily on first access and cache it for
//! the registry's lifetime; inherited services delegate to the parent
//! registry's service and never close it.

use crate::declaration::{Closer, Instance, InstanceSupplier, ServiceDeclaration};
use crate::definition::{ServiceDefinition, definition_string};
use crate::error::{BoxError, DiError, Result};
use crate::types::TypeDescriptor;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, error, trace};

/// Instances that release resources when their registry is closed
pub trait Closeable: Send + Sync + 'static {
    fn close(&self) -> std::result::Result<(), BoxError>;
}

/// A registered service with a lazily created instance
pub struct Service {
    declaration: Arc<dyn ServiceDeclaration>,
    source: Source,
}

enum Source {
    Owned {
        supplier: InstanceSupplier,
        instance: OnceCell<Instance>,
        closer: Option<Closer>,
    },
    Inherited(Arc<Service>),
}

impl Service {
    /// Create an owned service
    pub fn new(declaration: Arc<dyn ServiceDeclaration>, supplier: InstanceSupplier) -> Self {
        let closer = declaration.closer();
        Self {
            declaration,
            source: Source::Owned {
                supplier,
                instance: OnceCell::new(),
                closer,
            },
        }
    }

    /// Wrap a parent registry's service; the instance is shared
    pub(crate) fn inherit(parent: &Arc<Service>) -> Self {
        let origin = match &parent.source {
            Source::Inherited(origin) => Arc::clone(origin),
            Source::Owned { .. } => Arc::clone(parent),
        };
        Self {
            declaration: Arc::clone(&parent.declaration),
            source: Source::Inherited(origin),
        }
    }

    #[inline]
    pub fn declaration(&self) -> &Arc<dyn ServiceDeclaration> {
        &self.declaration
    }

    #[inline]
    pub fn is_inherited(&self) -> bool {
        matches!(self.source, Source::Inherited(_))
    }

    /// Get the instance, creating it on first access.
    ///
    /// Creation is single-flight; a failed creation leaves the service empty
    /// so a later call tries again.
    pub fn get(&self) -> Result<Instance> {
        let (supplier, instance) = match &self.source {
            Source::Inherited(origin) => return origin.get(),
            Source::Owned {
                supplier, instance, ..
            } => (supplier, instance),
        };

        if let Some(existing) = instance.get() {
            #[cfg(feature = "logging")]
            trace!(
                target: "service_injector",
                service = self.name(),
                "Returning cached instance"
            );
            return Ok(Arc::clone(existing));
        }

        instance
            .get_or_try_init(|| {
                #[cfg(feature = "logging")]
                debug!(
                    target: "service_injector",
                    service = self.name(),
                    "Creating instance on first access"
                );

                supplier().map_err(|err| DiError::creation(self, "error creating instance", err))
            })
            .map(Arc::clone)
    }

    /// Get the instance as `T`
    pub fn get_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get()?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(self))
    }

    /// The instance, if already created
    pub fn peek(&self) -> Option<Instance> {
        match &self.source {
            Source::Inherited(origin) => origin.peek(),
            Source::Owned { instance, .. } => instance.get().cloned(),
        }
    }

    /// The instance as `T`, if already created and of that type
    pub fn peek_as<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.peek()?.downcast::<T>().ok()
    }

    /// Release the instance, if created and closeable.
    ///
    /// Failures are logged, never returned. Inherited services are left to
    /// their own registry.
    pub fn close(&self) {
        let Source::Owned {
            instance,
            closer: Some(closer),
            ..
        } = &self.source
        else {
            return;
        };
        let Some(instance) = instance.get() else {
            return;
        };

        #[cfg(feature = "logging")]
        debug!(target: "service_injector", service = self.name(), "Closing service");

        if let Err(_err) = closer(instance) {
            #[cfg(feature = "logging")]
            error!(
                target: "service_injector",
                service = self.name(),
                error = %_err,
                "Error closing service"
            );
        }
    }
}

impl ServiceDefinition for Service {
    #[inline]
    fn descriptor(&self) -> &TypeDescriptor {
        self.declaration.descriptor()
    }

    #[inline]
    fn name(&self) -> &str {
        self.declaration.name()
    }

    #[inline]
    fn priority(&self) -> i32 {
        self.declaration.priority()
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&definition_string(self))
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("definition", &definition_string(self))
            .field("inherited", &self.is_inherited())
            .field("created", &self.peek().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::FactoryDeclaration;
    use crate::definition::Definition;
    use crate::dependency::{ResolvedDependencies, ServiceDependencies};
    use crate::registry::Services;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: Arc<AtomicUsize>) -> Service {
        let declaration: Arc<dyn ServiceDeclaration> = Arc::new(FactoryDeclaration::instance(
            TypeDescriptor::of::<u32>(),
            Some("counter".into()),
            0,
            0u32,
        ));
        let supplier: InstanceSupplier = Arc::new(move || -> std::result::Result<Instance, BoxError> {
            let n = counter.fetch_add(1, Ordering::SeqCst) as u32;
            Ok(Arc::new(n))
        });
        Service::new(declaration, supplier)
    }

    #[test]
    fn test_get_is_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let service = counting(Arc::clone(&counter));

        assert!(service.peek().is_none());
        let first = service.get().unwrap();
        assert!(service.peek().is_some());
        let second = service.get().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_get_creates_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let service = counting(Arc::clone(&counter));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| service.get_as::<u32>().unwrap());
            }
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_creation_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let declaration: Arc<dyn ServiceDeclaration> = Arc::new(FactoryDeclaration::instance(
            TypeDescriptor::of::<u32>(),
            Some("flaky".into()),
            0,
            0u32,
        ));
        let seen = Arc::clone(&attempts);
        let supplier: InstanceSupplier = Arc::new(move || -> std::result::Result<Instance, BoxError> {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("first attempt fails".into())
            } else {
                Ok(Arc::new(1u32))
            }
        });
        let service = Service::new(declaration, supplier);

        match service.get() {
            Err(DiError::ServiceCreation { service, .. }) => assert_eq!(service.name(), "flaky"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(service.peek().is_none());
        assert_eq!(*service.get_as::<u32>().unwrap(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_type_mismatch() {
        let service = counting(Arc::new(AtomicUsize::new(0)));
        assert!(matches!(service.get_as::<String>(), Err(DiError::TypeMismatch { .. })));
        assert!(service.peek_as::<String>().is_none());
        assert!(service.peek_as::<u32>().is_some());
    }

    struct Handle {
        closed: Arc<AtomicUsize>,
    }

    impl Closeable for Handle {
        fn close(&self) -> std::result::Result<(), BoxError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn closeable(closed: Arc<AtomicUsize>) -> Arc<Service> {
        let closer: Closer = Arc::new(|instance: &Instance| match instance.downcast_ref::<Handle>() {
            Some(handle) => handle.close(),
            None => Err("not a handle".into()),
        });
        let declaration = FactoryDeclaration::new(
            Definition::new(TypeDescriptor::of::<Handle>(), "handle", 0),
            ServiceDependencies::new(),
            Arc::new(move |_: &ResolvedDependencies| -> std::result::Result<Instance, BoxError> {
                Ok(Arc::new(Handle {
                    closed: Arc::clone(&closed),
                }))
            }),
        )
        .with_closer(closer);
        let declaration: Arc<dyn ServiceDeclaration> = Arc::new(declaration);
        let supplier = declaration
            .create_instance_supplier(&mut Services::new())
            .unwrap()
            .unwrap();
        Arc::new(Service::new(declaration, supplier))
    }

    #[test]
    fn test_close_only_created_instances() {
        let closed = Arc::new(AtomicUsize::new(0));
        let service = closeable(Arc::clone(&closed));

        service.close();
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        service.get().unwrap();
        service.close();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inherited_shares_instance_but_never_closes() {
        let closed = Arc::new(AtomicUsize::new(0));
        let parent = closeable(Arc::clone(&closed));
        let child = Service::inherit(&parent);
        let grandchild = Service::inherit(&Arc::new(Service::inherit(&parent)));

        assert!(child.is_inherited());
        let from_child = child.get().unwrap();
        assert!(Arc::ptr_eq(&from_child, &parent.peek().unwrap()));
        assert!(Arc::ptr_eq(&from_child, &grandchild.get().unwrap()));

        child.close();
        grandchild.close();
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        parent.close();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
