//! Error types for service resolution and construction

use crate::constructor::CandidateReport;
use crate::definition::{Definition, ServiceDefinition};
use crate::types::TypeDescriptor;
use std::fmt::Display;
use thiserror::Error;

/// Error type returned by user factories, members and closers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while building or querying a registry
#[derive(Error, Debug)]
pub enum DiError {
    /// No service (or pending declaration) matches the query
    #[error("Service not found: {}", describe(.name, .descriptor))]
    NotFound {
        name: Option<String>,
        descriptor: TypeDescriptor,
    },

    /// Several services share the best priority for the query
    #[error("Conflicting services for {}: [{}]", describe(.name, .descriptor), join(.candidates))]
    Conflict {
        name: Option<String>,
        descriptor: TypeDescriptor,
        candidates: Vec<Definition>,
    },

    /// A service with the same name, type and priority is already registered
    #[error("Service {new} conflicts with registered service {existing}")]
    DuplicateRegistration { existing: Definition, new: Definition },

    /// Circular dependency detected during resolution
    #[error("Circular dependency detected: {}", arrow(.path))]
    CircularDependency { path: Vec<String> },

    /// None of the candidate constructors could be fully resolved
    #[error("No resolvable constructor for {service}, candidates: [{}]", join(.candidates))]
    UnresolvedConstructor {
        service: Definition,
        candidates: Vec<CandidateReport>,
    },

    /// A required dependency of a declaration could not be resolved
    #[error("Unresolved dependency for {service}")]
    UnresolvedDependency {
        service: Definition,
        #[source]
        source: Box<DiError>,
    },

    /// Instance creation failed
    #[error("Failed to create service {service}: {message}")]
    ServiceCreation {
        service: Definition,
        message: String,
        #[source]
        source: BoxError,
    },

    /// The instance is not of the requested Rust type
    #[error("Service {service} is not a {expected}")]
    TypeMismatch {
        service: Definition,
        expected: &'static str,
    },

    /// Registry is frozen and cannot be modified
    #[error("Registry is frozen - cannot register new services")]
    Frozen,

    /// The registry behind an exposed handle was dropped
    #[error("Registry has been dropped")]
    RegistryDropped,

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

impl DiError {
    /// Create a NotFound error for a query
    #[inline]
    pub fn not_found(name: Option<&str>, descriptor: &TypeDescriptor) -> Self {
        Self::NotFound {
            name: name.map(str::to_owned),
            descriptor: descriptor.clone(),
        }
    }

    /// Create a ServiceCreation error for a service
    #[inline]
    pub fn creation(
        service: &dyn ServiceDefinition,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::ServiceCreation {
            service: service.definition(),
            message: message.into(),
            source: source.into(),
        }
    }

    /// Create a TypeMismatch error
    #[inline]
    pub fn type_mismatch<T: ?Sized + 'static>(service: &dyn ServiceDefinition) -> Self {
        Self::TypeMismatch {
            service: service.definition(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Lookup failures a caller may recover from by trying something else.
    ///
    /// Everything else is terminal and aborts the build.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Conflict { .. } | Self::UnresolvedConstructor { .. }
        )
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

fn describe(name: &Option<String>, descriptor: &TypeDescriptor) -> String {
    match name {
        Some(name) => format!("{descriptor} named \"{name}\""),
        None => descriptor.to_string(),
    }
}

fn join<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn arrow(path: &[String]) -> String {
    path.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_resolution_failures() {
        let missing = DiError::not_found(None, &TypeDescriptor::of::<String>());
        assert!(missing.is_resolution_failure());

        let conflict = DiError::Conflict {
            name: None,
            descriptor: TypeDescriptor::of::<String>(),
            candidates: vec![],
        };
        assert!(conflict.is_resolution_failure());

        let cycle = DiError::CircularDependency {
            path: vec!["a".into(), "a".into()],
        };
        assert!(!cycle.is_resolution_failure());
        assert!(!DiError::Frozen.is_resolution_failure());
    }

    #[test]
    fn test_display() {
        let missing = DiError::not_found(Some("primary"), &TypeDescriptor::new("Db"));
        assert_eq!(missing.to_string(), "Service not found: Db named \"primary\"");

        let cycle = DiError::CircularDependency {
            path: vec!["a".into(), "b".into(), "c".into(), "a".into()],
        };
        assert_eq!(cycle.to_string(), "Circular dependency detected: a -> b -> c -> a");

        let conflict = DiError::Conflict {
            name: None,
            descriptor: TypeDescriptor::new("Db"),
            candidates: vec![
                Definition::new(TypeDescriptor::new("Db"), "b", 0),
                Definition::new(TypeDescriptor::new("Db"), "d", 0),
            ],
        };
        assert_eq!(
            conflict.to_string(),
            "Conflicting services for Db: [{name: \"b\", type: \"Db\", priority: 0}, \
             {name: \"d\", type: \"Db\", priority: 0}]"
        );
    }

    #[test]
    fn test_source_chain() {
        let definition = Definition::new(TypeDescriptor::new("Db"), "db", 0);
        let err = DiError::UnresolvedDependency {
            service: definition.clone(),
            source: Box::new(DiError::not_found(None, &TypeDescriptor::new("Pool"))),
        };
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("Service not found: Pool"));

        let err = DiError::creation(&definition, "factory failed", "disk full");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("disk full"));
    }
}
