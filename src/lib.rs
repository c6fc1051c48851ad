//! # Service Injector - Runtime Dependency Injection for Rust
//!
//! A registry of services resolved from declarations, with priorities,
//! named services, optional dependencies and constructor selection.
//!
//! ## Features
//!
//! - **Declarations** - Services are declared with a type, a name and a priority
//! - **Priorities** - The lowest priority value wins, equal best priorities conflict
//! - **Constructor selection** - The candidate resolving the most dependencies is used
//! - **Lazy instances** - Created on first access, exactly once, thread-safe
//! - **Nested declarations** - Members of a declaration declare further services
//! - **Transformers** - Rewrite declarations or instances while the registry is built
//! - **Parent registries** - A child registry inherits every parent service
//! - **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use service_injector::prelude::*;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! let services = ServicesBuilder::new()
//!     .declare::<Database>()
//!     .with_instance(Database { url: "postgres://localhost".into() })
//!     .register()
//!     .build()
//!     .unwrap();
//!
//! let db = services.get::<Database>().unwrap();
//! assert_eq!(db.url, "postgres://localhost");
//! ```
//!
//! ## Priorities and names
//!
//! ```rust
//! use service_injector::prelude::*;
//!
//! let services = ServicesBuilder::new()
//!     .declare::<String>().named("fallback").priority(10).with_instance("fallback".into()).register()
//!     .declare::<String>().named("primary").priority(-10).with_instance("primary".into()).register()
//!     .build()
//!     .unwrap();
//!
//! // Lowest priority wins an unqualified lookup
//! assert_eq!(*services.get::<String>().unwrap(), "primary");
//! // A name selects exactly
//! assert_eq!(*services.get_named::<String>("fallback").unwrap(), "fallback");
//! ```
//!
//! ## Parent registries
//!
//! ```rust
//! use service_injector::prelude::*;
//!
//! struct AppConfig;
//! struct RequestContext;
//!
//! let root = ServicesBuilder::new()
//!     .declare::<AppConfig>().with_instance(AppConfig).register()
//!     .build()
//!     .unwrap();
//!
//! let request = ServicesBuilder::new()
//!     .with_parent(&root)
//!     .declare::<RequestContext>().with_instance(RequestContext).register()
//!     .build()
//!     .unwrap();
//!
//! assert!(request.get::<AppConfig>().is_ok());
//! assert!(root.get::<RequestContext>().is_err());
//! ```

mod builder;
mod constructor;
mod declaration;
mod definition;
mod dependency;
mod error;
#[cfg(feature = "logging")]
pub mod logging;
mod registry;
mod scan;
mod service;
mod transform;
mod types;

pub use builder::*;
pub use constructor::*;
pub use declaration::*;
pub use definition::*;
pub use dependency::*;
pub use error::*;
pub use registry::*;
pub use scan::*;
pub use service::*;
pub use transform::*;
pub use types::*;

#[cfg(feature = "derive")]
pub use service_injector_derive::Inject;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BoxError, Closeable, Constructible, Constructor, Constructors, DEFAULT_PRIORITY,
        DeclarationBuilder, DeclarationScanner, DeclarationTransformer, DiError, ExposedServices,
        Instance, InstanceTransformer, LOWEST_PRIORITY, Member, MemberScanner,
        ResolvedDependencies, Result, Service, ServiceDeclaration, ServiceDeclarationTransformer,
        ServiceDefinition, ServiceDependencies, ServiceDependency, ServiceInstanceTransformer,
        Services, ServicesBuilder, TOP_PRIORITY, TypeDescriptor, TypedServices,
    };
    #[cfg(feature = "derive")]
    pub use crate::Inject;
    pub use std::sync::Arc;
}
