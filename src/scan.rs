//! Nested declarations
//!
//! A declaration may carry [`Member`]s: factory functions that declare
//! further services, optionally receiving the enclosing service's instance.
//! Before resolving anything the builder asks a [`DeclarationScanner`] for
//! the nested declarations of every declaration, breadth first.
//!
//! ```rust
//! use service_injector::prelude::*;
//!
//! struct Settings {
//!     url: String,
//! }
//!
//! let services = ServicesBuilder::new()
//!     .declare::<Settings>()
//!     .with_instance(Settings { url: "postgres://localhost".into() })
//!     .with_member(Member::instance::<String, _>("url", ServiceDependencies::new(), |args| {
//!         Ok(args.enclosing::<Settings>()?.url.clone())
//!     }))
//!     .register()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(*services.get_named::<String>("url").unwrap(), "postgres://localhost");
//! ```

use crate::constructor::Constructors;
use crate::declaration::{Instance, InstanceSupplier, ServiceDeclaration};
use crate::definition::{DEFAULT_PRIORITY, Definition, ServiceDefinition};
use crate::dependency::{
    ResolvedDependencies, ServiceDependencies, ServiceDependency, ServiceResolver,
};
use crate::error::{BoxError, DiError, Result};
use crate::types::TypeDescriptor;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

type Body<R> = Arc<dyn Fn(&MemberArgs<'_>) -> std::result::Result<R, BoxError> + Send + Sync>;

#[derive(Clone)]
enum MemberBody {
    /// Instance created lazily on first access
    Instance(Body<Instance>),
    /// Evaluated while the builder resolves it; `None` declines
    Optional(Body<Option<Instance>>),
    /// Constructors resolved while the builder resolves it
    Constructed(Body<Option<Constructors>>),
}

/// A factory function nested in a declaration
#[derive(Clone)]
pub struct Member {
    name: String,
    descriptor: TypeDescriptor,
    priority: i32,
    is_static: bool,
    dependencies: ServiceDependencies,
    body: MemberBody,
}

impl Member {
    fn with_body(
        name: impl Into<String>,
        descriptor: TypeDescriptor,
        dependencies: ServiceDependencies,
        body: MemberBody,
    ) -> Self {
        Self {
            name: name.into(),
            descriptor,
            priority: DEFAULT_PRIORITY,
            is_static: false,
            dependencies,
            body,
        }
    }

    /// Member declaring a `T` created on first access
    pub fn instance<T, F>(name: impl Into<String>, dependencies: ServiceDependencies, body: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&MemberArgs<'_>) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        let body: Body<Instance> = Arc::new(
            move |args: &MemberArgs<'_>| -> std::result::Result<Instance, BoxError> {
                Ok(Arc::new(body(args)?))
            },
        );
        Self::with_body(name, TypeDescriptor::of::<T>(), dependencies, MemberBody::Instance(body))
    }

    /// Member that may decline by returning `None`.
    ///
    /// The body runs while the registry is built.
    pub fn optional<T, F>(name: impl Into<String>, dependencies: ServiceDependencies, body: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&MemberArgs<'_>) -> std::result::Result<Option<T>, BoxError> + Send + Sync + 'static,
    {
        let body: Body<Option<Instance>> = Arc::new(
            move |args: &MemberArgs<'_>| -> std::result::Result<Option<Instance>, BoxError> {
                Ok(body(args)?.map(|value| Arc::new(value) as Instance))
            },
        );
        Self::with_body(name, TypeDescriptor::of::<T>(), dependencies, MemberBody::Optional(body))
    }

    /// Member naming the constructors to build a `T` with
    pub fn constructed<T, F>(name: impl Into<String>, dependencies: ServiceDependencies, body: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&MemberArgs<'_>) -> std::result::Result<Constructors, BoxError> + Send + Sync + 'static,
    {
        Self::optional_constructed::<T, _>(name, dependencies, move |args| body(args).map(Some))
    }

    /// Like [`constructed`](Self::constructed), but may decline with `None`
    pub fn optional_constructed<T, F>(
        name: impl Into<String>,
        dependencies: ServiceDependencies,
        body: F,
    ) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&MemberArgs<'_>) -> std::result::Result<Option<Constructors>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self::with_body(
            name,
            TypeDescriptor::of::<T>(),
            dependencies,
            MemberBody::Constructed(Arc::new(body)),
        )
    }

    /// Does not receive the enclosing instance
    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Declare under another type
    pub fn as_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.is_static
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("type", &self.descriptor.to_string())
            .field("priority", &self.priority)
            .field("static", &self.is_static)
            .finish_non_exhaustive()
    }
}

/// Arguments handed to a member body.
///
/// Indices are relative to the member's own dependency list; the enclosing
/// instance is reached through [`enclosing`](Self::enclosing).
pub struct MemberArgs<'a> {
    dependencies: &'a ResolvedDependencies,
    offset: usize,
}

impl MemberArgs<'_> {
    /// Instance of the enclosing service
    pub fn enclosing<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        if self.offset == 0 {
            return Err(DiError::Internal(
                "static members have no enclosing instance".into(),
            ));
        }
        self.dependencies.required::<T>(0)
    }

    pub fn required<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
        self.dependencies.required::<T>(index + self.offset)
    }

    pub fn optional<T: Send + Sync + 'static>(&self, index: usize) -> Result<Option<Arc<T>>> {
        self.dependencies.optional::<T>(index + self.offset)
    }
}

/// Declaration produced for a [`Member`]
pub struct MemberDeclaration {
    definition: Definition,
    enclosing: Definition,
    member: Member,
    supplier: OnceCell<Option<InstanceSupplier>>,
}

impl MemberDeclaration {
    pub fn new(enclosing: Definition, member: Member) -> Self {
        Self {
            definition: Definition::new(
                member.descriptor.clone(),
                member.name.clone(),
                member.priority,
            ),
            enclosing,
            member,
            supplier: OnceCell::new(),
        }
    }

    /// Definition of the declaration this member belongs to
    pub fn enclosing(&self) -> &Definition {
        &self.enclosing
    }

    fn build_supplier(
        &self,
        resolver: &mut dyn ServiceResolver,
    ) -> Result<Option<InstanceSupplier>> {
        let mut dependencies = ServiceDependencies::new();
        if !self.member.is_static {
            dependencies.push(
                ServiceDependency::on(self.enclosing.descriptor().clone())
                    .named(self.enclosing.name()),
            );
        }
        for dependency in &self.member.dependencies {
            dependencies.push(dependency.clone());
        }

        let resolved = dependencies.resolve(resolver)?;
        if !resolved.is_resolved() {
            return Err(DiError::UnresolvedDependency {
                service: self.definition.clone(),
                source: Box::new(resolved.into_resolution_error()),
            });
        }
        let offset = usize::from(!self.member.is_static);

        match &self.member.body {
            MemberBody::Instance(body) => {
                let body = Arc::clone(body);
                let supplier: InstanceSupplier = Arc::new(move || {
                    body(&MemberArgs {
                        dependencies: &resolved,
                        offset,
                    })
                });
                Ok(Some(supplier))
            }
            MemberBody::Optional(body) => {
                let args = MemberArgs {
                    dependencies: &resolved,
                    offset,
                };
                let value = body(&args).map_err(|err| {
                    DiError::creation(&self.definition, "error evaluating optional member", err)
                })?;
                Ok(value.map(|instance| -> InstanceSupplier {
                    Arc::new(move || -> std::result::Result<Instance, BoxError> {
                        Ok(Arc::clone(&instance))
                    })
                }))
            }
            MemberBody::Constructed(body) => {
                let args = MemberArgs {
                    dependencies: &resolved,
                    offset,
                };
                let constructors = body(&args).map_err(|err| {
                    DiError::creation(&self.definition, "error getting service constructors", err)
                })?;
                match constructors {
                    Some(constructors) => {
                        let chosen = constructors.resolve(&self.definition, resolver)?;
                        Ok(Some(chosen.into_supplier()))
                    }
                    None => Ok(None),
                }
            }
        }
    }
}

impl ServiceDefinition for MemberDeclaration {
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

impl ServiceDeclaration for MemberDeclaration {
    fn create_instance_supplier(
        &self,
        resolver: &mut dyn ServiceResolver,
    ) -> Result<Option<InstanceSupplier>> {
        self.supplier
            .get_or_try_init(|| self.build_supplier(resolver))
            .cloned()
    }
}

/// Finds the declarations nested in a declaration
pub trait DeclarationScanner: Send + Sync {
    fn scan(&self, declaration: &Arc<dyn ServiceDeclaration>) -> Vec<Arc<dyn ServiceDeclaration>>;
}

/// Default scanner: one [`MemberDeclaration`] per [`Member`]
#[derive(Clone, Copy, Debug, Default)]
pub struct MemberScanner;

impl DeclarationScanner for MemberScanner {
    fn scan(&self, declaration: &Arc<dyn ServiceDeclaration>) -> Vec<Arc<dyn ServiceDeclaration>> {
        let members = declaration.members();
        if members.is_empty() {
            return Vec::new();
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "service_injector",
            service = declaration.name(),
            members = members.len(),
            "Found member declarations"
        );

        let enclosing = declaration.definition();
        members
            .iter()
            .map(|member| {
                Arc::new(MemberDeclaration::new(enclosing.clone(), member.clone()))
                    as Arc<dyn ServiceDeclaration>
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::FactoryDeclaration;
    use crate::registry::Services;

    struct Config {
        base: u32,
    }

    fn registry() -> (Services, Definition) {
        let services = Services::new();
        let config = services
            .declare(FactoryDeclaration::instance(
                TypeDescriptor::of::<Config>(),
                Some("config".into()),
                0,
                Config { base: 40 },
            ))
            .unwrap()
            .unwrap();
        (services, config.definition())
    }

    #[test]
    fn test_instance_member_receives_enclosing() {
        let (mut services, config) = registry();
        let member = Member::instance::<u32, _>("answer", ServiceDependencies::new(), |args| {
            Ok(args.enclosing::<Config>()?.base + 2)
        });
        let declaration = MemberDeclaration::new(config, member);

        let supplier = declaration
            .create_instance_supplier(&mut services)
            .unwrap()
            .unwrap();
        assert_eq!(*supplier().unwrap().downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_static_member_has_no_enclosing() {
        let (mut services, config) = registry();
        let member = Member::instance::<u32, _>(
            "static",
            ServiceDependencies::new().with(ServiceDependency::required::<Config>()),
            |args| {
                assert!(args.enclosing::<Config>().is_err());
                Ok(args.required::<Config>(0)?.base)
            },
        )
        .as_static();
        let declaration = MemberDeclaration::new(config, member);

        let supplier = declaration
            .create_instance_supplier(&mut services)
            .unwrap()
            .unwrap();
        assert_eq!(*supplier().unwrap().downcast::<u32>().unwrap(), 40);
    }

    #[test]
    fn test_optional_member_declines() {
        let (mut services, config) = registry();
        let member = Member::optional::<u32, _>("nothing", ServiceDependencies::new(), |_| Ok(None));
        let declaration = MemberDeclaration::new(config, member);

        assert!(declaration.create_instance_supplier(&mut services).unwrap().is_none());
    }

    #[test]
    fn test_supplier_is_memoized() {
        let (mut services, config) = registry();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let member = Member::optional::<u32, _>("once", ServiceDependencies::new(), move |_| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Some(1))
        });
        let declaration = MemberDeclaration::new(config, member);

        let first = declaration.create_instance_supplier(&mut services).unwrap().unwrap();
        let second = declaration.create_instance_supplier(&mut services).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_enclosing_fails() {
        let services = Services::new();
        let member = Member::instance::<u32, _>("orphan", ServiceDependencies::new(), |_| Ok(1));
        let declaration = MemberDeclaration::new(
            Definition::new(TypeDescriptor::of::<Config>(), "config", 0),
            member,
        );

        assert!(matches!(
            declaration.create_instance_supplier(&mut services.clone()),
            Err(DiError::UnresolvedDependency { .. })
        ));
    }

    #[test]
    fn test_scanner_maps_members() {
        let declaration: Arc<dyn ServiceDeclaration> = Arc::new(
            FactoryDeclaration::instance(TypeDescriptor::of::<Config>(), None, 0, Config { base: 1 })
                .with_members(vec![
                    Member::instance::<u8, _>("a", ServiceDependencies::new(), |_| Ok(1u8)),
                    Member::instance::<u16, _>("b", ServiceDependencies::new(), |_| Ok(2u16))
                        .priority(3),
                ]),
        );

        let nested = MemberScanner.scan(&declaration);
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].name(), "a");
        assert_eq!(nested[1].priority(), 3);
        assert!(nested[1].is_assignable_to(&TypeDescriptor::of::<u16>()));
        assert!(MemberScanner.scan(&nested[0]).is_empty());
    }
}
