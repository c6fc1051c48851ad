//! Declaration and instance transformers
//!
//! Transformers are services themselves. A declaration transformer may
//! replace every other declaration before it is resolved (to rename it,
//! change its priority, wrap its supplier...). An instance transformer may
//! replace every other service's instance right after creation.
//!
//! Transformers are applied in ascending priority order and never to
//! themselves. Declare one through
//! [`DeclarationBuilder::with_instance`](crate::DeclarationBuilder::with_instance)
//! of a [`DeclarationTransformer`] or [`InstanceTransformer`]:
//!
//! ```rust
//! use service_injector::prelude::*;
//! use std::sync::Arc;
//!
//! struct Shout;
//!
//! impl ServiceInstanceTransformer for Shout {
//!     fn transform(
//!         &self,
//!         _declaration: &dyn ServiceDeclaration,
//!         instance: Instance,
//!     ) -> std::result::Result<Instance, BoxError> {
//!         match instance.downcast_ref::<String>() {
//!             Some(text) => Ok(Arc::new(text.to_uppercase())),
//!             None => Ok(instance),
//!         }
//!     }
//! }
//!
//! let services = ServicesBuilder::new()
//!     .declare::<InstanceTransformer>().with_instance(InstanceTransformer::new(Shout)).register()
//!     .declare::<String>().with_instance("hello".to_string()).register()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(*services.get::<String>().unwrap(), "HELLO");
//! ```

use crate::declaration::{Instance, InstanceSupplier, ServiceDeclaration};
use crate::definition::ServiceDefinition;
use crate::error::{BoxError, Result};
use crate::registry::Services;
use crate::service::Service;
use crate::types::TypeDescriptor;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Rewrites declarations before they are resolved
pub trait ServiceDeclarationTransformer: Send + Sync {
    fn transform(&self, declaration: Arc<dyn ServiceDeclaration>) -> Arc<dyn ServiceDeclaration>;
}

/// Rewrites instances right after they are created
pub trait ServiceInstanceTransformer: Send + Sync {
    fn transform(
        &self,
        declaration: &dyn ServiceDeclaration,
        instance: Instance,
    ) -> std::result::Result<Instance, BoxError>;
}

/// Service type under which declaration transformers are registered
#[derive(Clone)]
pub struct DeclarationTransformer(Arc<dyn ServiceDeclarationTransformer>);

impl DeclarationTransformer {
    pub fn new(transformer: impl ServiceDeclarationTransformer + 'static) -> Self {
        Self(Arc::new(transformer))
    }

    #[inline]
    pub fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>()
    }
}

impl ServiceDeclarationTransformer for DeclarationTransformer {
    fn transform(&self, declaration: Arc<dyn ServiceDeclaration>) -> Arc<dyn ServiceDeclaration> {
        self.0.transform(declaration)
    }
}

impl fmt::Debug for DeclarationTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeclarationTransformer")
    }
}

/// Service type under which instance transformers are registered
#[derive(Clone)]
pub struct InstanceTransformer(Arc<dyn ServiceInstanceTransformer>);

impl InstanceTransformer {
    pub fn new(transformer: impl ServiceInstanceTransformer + 'static) -> Self {
        Self(Arc::new(transformer))
    }

    #[inline]
    pub fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>()
    }
}

impl ServiceInstanceTransformer for InstanceTransformer {
    fn transform(
        &self,
        declaration: &dyn ServiceDeclaration,
        instance: Instance,
    ) -> std::result::Result<Instance, BoxError> {
        self.0.transform(declaration, instance)
    }
}

impl fmt::Debug for InstanceTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InstanceTransformer")
    }
}

/// Is `service` the realization of `declaration`?
fn is_self(service: &Service, declaration: &dyn ServiceDeclaration) -> bool {
    service.matches(Some(declaration.name()), declaration.descriptor())
        && service.priority() == declaration.priority()
}

/// Transformer services in effect during a build, best first
#[derive(Default)]
pub(crate) struct Transformers {
    declaration: Vec<Arc<Service>>,
    instance: Vec<Arc<Service>>,
}

impl Transformers {
    /// Transformers already present in `services` (inherited from a parent)
    pub(crate) fn existing(services: &Services) -> Self {
        let mut transformers = Self::default();
        transformers.refresh_declaration(services);
        transformers.refresh_instance(services);
        transformers
    }

    /// Pick up every declaration transformer now registered
    pub(crate) fn refresh_declaration(&mut self, services: &Services) {
        self.declaration = services
            .services(&DeclarationTransformer::descriptor())
            .into_iter()
            .collect();
    }

    /// Pick up every instance transformer now registered
    pub(crate) fn refresh_instance(&mut self, services: &Services) {
        self.instance = services
            .services(&InstanceTransformer::descriptor())
            .into_iter()
            .collect();
    }

    pub(crate) fn declaration_count(&self) -> usize {
        self.declaration.len()
    }

    pub(crate) fn instance_count(&self) -> usize {
        self.instance.len()
    }

    /// Run `declaration` through every declaration transformer except itself
    pub(crate) fn transform_declaration(
        &self,
        declaration: Arc<dyn ServiceDeclaration>,
    ) -> Result<Arc<dyn ServiceDeclaration>> {
        let mut current = Arc::clone(&declaration);
        for service in &self.declaration {
            if is_self(service, declaration.as_ref()) {
                continue;
            }

            #[cfg(feature = "logging")]
            trace!(
                target: "service_injector",
                service = declaration.name(),
                transformer = service.name(),
                "Applying declaration transformer"
            );

            let transformer = service.get_as::<DeclarationTransformer>()?;
            current = transformer.transform(current);
        }
        Ok(current)
    }

    /// Wrap `supplier` so the instance transformers in effect now run on
    /// every instance it creates
    pub(crate) fn wrap_supplier(
        &self,
        declaration: &Arc<dyn ServiceDeclaration>,
        supplier: InstanceSupplier,
    ) -> InstanceSupplier {
        let transformers: Vec<Arc<Service>> = self
            .instance
            .iter()
            .filter(|service| !is_self(service, declaration.as_ref()))
            .cloned()
            .collect();
        if transformers.is_empty() {
            return supplier;
        }

        let declaration = Arc::clone(declaration);
        Arc::new(move || -> std::result::Result<Instance, BoxError> {
            let mut instance = supplier()?;
            for service in &transformers {
                let transformer = service.get_as::<InstanceTransformer>()?;
                instance = transformer.transform(declaration.as_ref(), instance)?;
            }
            Ok(instance)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{FactoryDeclaration, Redeclared};

    struct Demote;

    impl ServiceDeclarationTransformer for Demote {
        fn transform(&self, declaration: Arc<dyn ServiceDeclaration>) -> Arc<dyn ServiceDeclaration> {
            let priority = declaration.priority() + 100;
            Arc::new(Redeclared::new(declaration).priority(priority))
        }
    }

    struct Double;

    impl ServiceInstanceTransformer for Double {
        fn transform(
            &self,
            _: &dyn ServiceDeclaration,
            instance: Instance,
        ) -> std::result::Result<Instance, BoxError> {
            match instance.downcast_ref::<u32>() {
                Some(n) => Ok(Arc::new(n * 2)),
                None => Ok(instance),
            }
        }
    }

    fn registry() -> Services {
        let services = Services::new();
        services
            .declare(FactoryDeclaration::instance(
                DeclarationTransformer::descriptor(),
                Some("demote".into()),
                0,
                DeclarationTransformer::new(Demote),
            ))
            .unwrap();
        services
            .declare(FactoryDeclaration::instance(
                InstanceTransformer::descriptor(),
                Some("double".into()),
                0,
                InstanceTransformer::new(Double),
            ))
            .unwrap();
        services
    }

    #[test]
    fn test_existing_transformers_are_collected() {
        let transformers = Transformers::existing(&registry());
        assert_eq!(transformers.declaration_count(), 1);
        assert_eq!(transformers.instance_count(), 1);
    }

    #[test]
    fn test_declaration_transformer_applies_to_others() {
        let transformers = Transformers::existing(&registry());
        let declaration: Arc<dyn ServiceDeclaration> = Arc::new(FactoryDeclaration::instance(
            TypeDescriptor::of::<u32>(),
            Some("n".into()),
            1,
            21u32,
        ));

        let transformed = transformers.transform_declaration(declaration).unwrap();
        assert_eq!(transformed.priority(), 101);
        assert_eq!(transformed.name(), "n");
    }

    #[test]
    fn test_declaration_transformer_skips_itself() {
        let services = registry();
        let transformers = Transformers::existing(&services);
        let own = Arc::clone(
            services
                .service(Some("demote"), &DeclarationTransformer::descriptor())
                .unwrap()
                .declaration(),
        );

        let transformed = transformers.transform_declaration(Arc::clone(&own)).unwrap();
        assert!(Arc::ptr_eq(&transformed, &own));
    }

    #[test]
    fn test_instance_transformer_wraps_supplier() {
        let transformers = Transformers::existing(&registry());
        let declaration: Arc<dyn ServiceDeclaration> = Arc::new(FactoryDeclaration::instance(
            TypeDescriptor::of::<u32>(),
            Some("n".into()),
            0,
            21u32,
        ));
        let supplier: InstanceSupplier =
            Arc::new(|| -> std::result::Result<Instance, BoxError> { Ok(Arc::new(21u32)) });

        let wrapped = transformers.wrap_supplier(&declaration, supplier);
        assert_eq!(*wrapped().unwrap().downcast::<u32>().unwrap(), 42);
    }
}
