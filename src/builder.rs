//! Registry construction
//!
//! [`ServicesBuilder`] collects declarations and resolves them into a frozen
//! [`Services`] registry in one sequential pass:
//!
//! 1. the registry's own [`ExposedServices`] handle is declared
//! 2. declarations are scanned breadth first for nested declarations
//! 3. declaration transformers, then instance transformers are resolved
//! 4. every remaining declaration is resolved in declaration order
//! 5. the registry is frozen
//!
//! Resolving a declaration resolves its dependencies first, creating still
//! pending declarations on demand. Re-entering a declaration that is being
//! resolved is a circular dependency.

use crate::constructor::{Constructible, Constructors};
use crate::declaration::{
    Closer, ConstructedDeclaration, Extras, Factory, FactoryDeclaration, Instance,
    ServiceDeclaration,
};
use crate::definition::{DEFAULT_PRIORITY, Definition, default_name, definition_string};
use crate::dependency::{ResolvedDependencies, ServiceDependencies, ServiceResolver};
use crate::error::{BoxError, DiError, Result};
use crate::registry::{ExposedServices, Services};
use crate::scan::{DeclarationScanner, Member, MemberScanner};
use crate::service::{Closeable, Service};
use crate::transform::{DeclarationTransformer, InstanceTransformer, Transformers};
use crate::types::TypeDescriptor;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Collects declarations and builds a registry from them.
///
/// # Examples
///
/// ```rust
/// use service_injector::prelude::*;
///
/// struct Database {
///     url: String,
/// }
///
/// struct UserRepository {
///     db: Arc<Database>,
/// }
///
/// let services = ServicesBuilder::new()
///     .declare::<UserRepository>()
///     .with_factory(
///         ServiceDependencies::new().with(ServiceDependency::required::<Database>()),
///         |deps| Ok(UserRepository { db: deps.required::<Database>(0)? }),
///     )
///     .register()
///     .declare::<Database>()
///     .with_instance(Database { url: "postgres://localhost".into() })
///     .register()
///     .build()
///     .unwrap();
///
/// let users = services.get::<UserRepository>().unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
/// ```
pub struct ServicesBuilder {
    declarations: Vec<Arc<dyn ServiceDeclaration>>,
    parent: Option<Services>,
    name: Option<String>,
    scanner: Arc<dyn DeclarationScanner>,
}

impl ServicesBuilder {
    /// Create an empty builder using the [`MemberScanner`].
    pub fn new() -> Self {
        #[cfg(feature = "logging")]
        debug!(target: "service_injector", "Creating services builder");

        Self {
            declarations: Vec::new(),
            parent: None,
            name: None,
            scanner: Arc::new(MemberScanner),
        }
    }

    /// Start declaring a service of type `T`.
    pub fn declare<T: Send + Sync + 'static>(self) -> DeclarationBuilder<T> {
        DeclarationBuilder {
            builder: self,
            descriptor: TypeDescriptor::of::<T>(),
            name: None,
            priority: None,
            source: None,
            members: Vec::new(),
            closer: None,
            _marker: PhantomData,
        }
    }

    /// Add a declaration.
    pub fn register(mut self, declaration: Arc<dyn ServiceDeclaration>) -> Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "service_injector",
            service = declaration.name(),
            priority = declaration.priority(),
            "Declaration registered"
        );

        self.declarations.push(declaration);
        self
    }

    /// Inherit every service of `parent`.
    pub fn with_parent(mut self, parent: &Services) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Name of the registry, also used for its [`ExposedServices`] service.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the nested declaration scanner.
    pub fn with_scanner(mut self, scanner: impl DeclarationScanner + 'static) -> Self {
        self.scanner = Arc::new(scanner);
        self
    }

    /// Number of declarations registered so far
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Resolve every declaration and return the frozen registry.
    ///
    /// Fails on the first terminal error: a circular dependency, an
    /// unresolved required dependency, a conflicting registration...
    pub fn build(self) -> Result<Services> {
        let Self {
            declarations,
            parent,
            name,
            scanner,
        } = self;

        let services = Services::create(name.clone(), parent.as_ref());

        let exposed_name = name
            .unwrap_or_else(|| default_name(&TypeDescriptor::new("ExposedServices")));
        let exposed = FactoryDeclaration::instance(
            TypeDescriptor::of::<ExposedServices>(),
            Some(exposed_name),
            DEFAULT_PRIORITY,
            services.expose(),
        );
        let mut all: Vec<Arc<dyn ServiceDeclaration>> = Vec::with_capacity(declarations.len() + 1);
        all.push(Arc::new(exposed));
        all.extend(declarations);

        let mut queue: VecDeque<Arc<dyn ServiceDeclaration>> = all.iter().cloned().collect();
        while let Some(declaration) = queue.pop_front() {
            for nested in scanner.scan(&declaration) {
                queue.push_back(Arc::clone(&nested));
                all.push(nested);
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "service_injector",
            registry = services.name(),
            declarations = all.len(),
            inherited = services.len(),
            "Building registry"
        );

        let mut context = BuildContext {
            transformers: Transformers::existing(&services),
            services,
            pending: all.into(),
            resolving: Vec::new(),
        };
        context.prepare_declaration_transformers()?;
        context.prepare_instance_transformers()?;

        while let Some(next) = context.pending.front().cloned() {
            context.create_service(next)?;
        }

        context.services.freeze();
        Ok(context.services)
    }
}

impl Default for ServicesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Typed declarations
// =============================================================================

enum Source {
    Factory(ServiceDependencies, Factory),
    Constructors(Constructors),
}

/// Declares one service of type `T`; finish with [`register`](Self::register).
///
/// Without an instance source the service is built from an empty
/// constructor set and fails to resolve.
pub struct DeclarationBuilder<T> {
    builder: ServicesBuilder,
    descriptor: TypeDescriptor,
    name: Option<String>,
    priority: Option<i32>,
    source: Option<Source>,
    members: Vec<Member>,
    closer: Option<Closer>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> DeclarationBuilder<T> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Declare under `descriptor` instead of `T`'s own descriptor
    pub fn as_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Use a fixed instance
    pub fn with_instance(self, value: T) -> Self {
        self.with_arc(Arc::new(value))
    }

    /// Use a fixed, already shared instance
    pub fn with_arc(mut self, value: Arc<T>) -> Self {
        let instance: Instance = value;
        let factory: Factory = Arc::new(
            move |_: &ResolvedDependencies| -> std::result::Result<Instance, BoxError> {
                Ok(Arc::clone(&instance))
            },
        );
        self.source = Some(Source::Factory(ServiceDependencies::new(), factory));
        self
    }

    /// Build the instance from `dependencies` on first access
    pub fn with_factory<F>(mut self, dependencies: ServiceDependencies, factory: F) -> Self
    where
        F: Fn(&ResolvedDependencies) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(
            move |deps: &ResolvedDependencies| -> std::result::Result<Instance, BoxError> {
                Ok(Arc::new(factory(deps)?))
            },
        );
        self.source = Some(Source::Factory(dependencies, factory));
        self
    }

    /// Build the instance with the best of `constructors`
    pub fn with_constructors(mut self, constructors: Constructors) -> Self {
        self.source = Some(Source::Constructors(constructors));
        self
    }

    /// Add a member declaring a nested service
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    /// Finish the declaration and return to the services builder
    pub fn register(self) -> ServicesBuilder {
        let Self {
            builder,
            descriptor,
            name,
            priority,
            source,
            members,
            closer,
            ..
        } = self;
        let extras = Extras { members, closer };

        let declaration: Arc<dyn ServiceDeclaration> = match source {
            Some(Source::Factory(dependencies, factory)) => {
                let priority = priority.unwrap_or(DEFAULT_PRIORITY);
                let definition = match name {
                    Some(name) => Definition::new(descriptor, name, priority),
                    None => Definition::unnamed(descriptor, priority),
                };
                Arc::new(FactoryDeclaration::new(definition, dependencies, factory).with_extras(extras))
            }
            Some(Source::Constructors(constructors)) => Arc::new(
                ConstructedDeclaration::new(descriptor, name, priority, constructors)
                    .with_extras(extras),
            ),
            None => Arc::new(
                ConstructedDeclaration::new(descriptor, name, priority, Constructors::new())
                    .with_extras(extras),
            ),
        };

        builder.register(declaration)
    }
}

impl<T: Constructible> DeclarationBuilder<T> {
    /// Build the instance with the best of `T`'s constructors
    pub fn constructed(self) -> Self {
        self.with_constructors(T::constructors())
    }
}

impl<T: Closeable> DeclarationBuilder<T> {
    /// Close the instance when the registry is closed
    pub fn closeable(mut self) -> Self {
        let closer: Closer = Arc::new(
            |instance: &Instance| -> std::result::Result<(), BoxError> {
                match instance.downcast_ref::<T>() {
                    Some(value) => value.close(),
                    None => Err(format!("instance is not a {}", std::any::type_name::<T>()).into()),
                }
            },
        );
        self.closer = Some(closer);
        self
    }
}

// =============================================================================
// Build context
// =============================================================================

/// State of one build: pending work, the resolving stack and the
/// transformers in effect
struct BuildContext {
    services: Services,
    pending: VecDeque<Arc<dyn ServiceDeclaration>>,
    resolving: Vec<Arc<dyn ServiceDeclaration>>,
    transformers: Transformers,
}

fn same_declaration(a: &Arc<dyn ServiceDeclaration>, b: &Arc<dyn ServiceDeclaration>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl BuildContext {
    /// Declaration transformers are resolved before anything else. Each
    /// applies to the ones resolved after it.
    fn prepare_declaration_transformers(&mut self) -> Result<()> {
        let descriptor = DeclarationTransformer::descriptor();
        let declared = self.pending_of(&descriptor);

        #[cfg(feature = "logging")]
        debug!(
            target: "service_injector",
            inherited = self.transformers.declaration_count(),
            declared = declared.len(),
            "Resolving declaration transformers"
        );

        for declaration in declared {
            if self.is_pending(&declaration) {
                self.create_service(declaration)?;
            }
            self.transformers.refresh_declaration(&self.services);
        }
        Ok(())
    }

    /// Instance transformers only see inherited instance transformers while
    /// they are resolved.
    fn prepare_instance_transformers(&mut self) -> Result<()> {
        let descriptor = InstanceTransformer::descriptor();
        let declared = self.pending_of(&descriptor);

        #[cfg(feature = "logging")]
        debug!(
            target: "service_injector",
            inherited = self.transformers.instance_count(),
            declared = declared.len(),
            "Resolving instance transformers"
        );

        for declaration in declared {
            if self.is_pending(&declaration) {
                self.create_service(declaration)?;
            }
        }
        self.transformers.refresh_declaration(&self.services);
        self.transformers.refresh_instance(&self.services);
        Ok(())
    }

    fn pending_of(&self, descriptor: &TypeDescriptor) -> Vec<Arc<dyn ServiceDeclaration>> {
        self.pending
            .iter()
            .filter(|declaration| declaration.is_assignable_to(descriptor))
            .cloned()
            .collect()
    }

    fn is_pending(&self, declaration: &Arc<dyn ServiceDeclaration>) -> bool {
        self.pending.iter().any(|p| same_declaration(p, declaration))
    }

    /// Best pending declaration for a lookup: lowest priority, then
    /// declaration order
    fn pending_match(
        &self,
        name: Option<&str>,
        ty: &TypeDescriptor,
    ) -> Option<Arc<dyn ServiceDeclaration>> {
        self.pending
            .iter()
            .filter(|declaration| declaration.matches(name, ty))
            .min_by_key(|declaration| declaration.priority())
            .cloned()
    }

    /// Path from the first resolving declaration matching the lookup back to
    /// itself
    fn cycle(&self, name: Option<&str>, ty: &TypeDescriptor) -> Option<Vec<String>> {
        let start = self
            .resolving
            .iter()
            .position(|declaration| declaration.matches(name, ty))?;
        let mut path: Vec<String> = self.resolving[start..]
            .iter()
            .map(|declaration| declaration.name().to_owned())
            .collect();
        path.push(self.resolving[start].name().to_owned());
        Some(path)
    }

    fn create_service(
        &mut self,
        declaration: Arc<dyn ServiceDeclaration>,
    ) -> Result<Option<Arc<Service>>> {
        self.resolving.push(Arc::clone(&declaration));
        let result = self.transform_and_create(declaration);
        self.resolving.pop();
        result
    }

    fn transform_and_create(
        &mut self,
        declaration: Arc<dyn ServiceDeclaration>,
    ) -> Result<Option<Arc<Service>>> {
        let index = self
            .pending
            .iter()
            .position(|p| same_declaration(p, &declaration))
            .ok_or_else(|| {
                DiError::Internal(format!(
                    "declaration {} is not pending",
                    definition_string(declaration.as_ref())
                ))
            })?;
        self.pending.remove(index);

        #[cfg(feature = "logging")]
        trace!(
            target: "service_injector",
            service = declaration.name(),
            depth = self.resolving.len(),
            pending = self.pending.len(),
            "Resolving declaration"
        );

        let declaration = self.transformers.transform_declaration(declaration)?;
        let Some(supplier) = declaration.create_instance_supplier(self)? else {
            #[cfg(feature = "logging")]
            debug!(
                target: "service_injector",
                service = declaration.name(),
                "Declaration declined, no service registered"
            );
            return Ok(None);
        };

        let supplier = self.transformers.wrap_supplier(&declaration, supplier);
        self.services.add(Service::new(declaration, supplier)).map(Some)
    }
}

impl ServiceResolver for BuildContext {
    fn service(&mut self, name: Option<&str>, ty: &TypeDescriptor) -> Result<Arc<Service>> {
        match self.services.service(name, ty) {
            Err(err) if err.is_resolution_failure() => {}
            found => return found,
        }

        if let Some(declaration) = self.pending_match(name, ty) {
            return self
                .create_service(declaration)?
                .ok_or_else(|| DiError::not_found(name, ty));
        }

        match self.cycle(name, ty) {
            Some(path) => Err(DiError::CircularDependency { path }),
            None => Err(DiError::not_found(name, ty)),
        }
    }
}
