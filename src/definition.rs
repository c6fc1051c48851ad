//! Service identity: type, name and priority
//!
//! Every declaration, pending work item and realized service answers the same
//! question through [`ServiceDefinition::matches`]: "would I satisfy a request
//! for this (optional) name and type?"

use crate::types::TypeDescriptor;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Highest possible priority; a service declared with it beats all others
pub const TOP_PRIORITY: i32 = i32::MIN;

/// Priority of declarations that do not set one
pub const DEFAULT_PRIORITY: i32 = 0;

/// Lowest possible priority
pub const LOWEST_PRIORITY: i32 = i32::MAX;

/// Name, type and priority of a service.
///
/// Lower priority values win: candidates are always examined in ascending
/// priority order.
pub trait ServiceDefinition {
    /// Declared type of the service
    fn descriptor(&self) -> &TypeDescriptor;

    /// Unique-ish service name
    fn name(&self) -> &str;

    /// Ordering key, lower is better
    fn priority(&self) -> i32;

    /// Can this service stand in for `ty`?
    #[inline]
    fn is_assignable_to(&self, ty: &TypeDescriptor) -> bool {
        self.descriptor().assignable_to(ty)
    }

    /// Does this service satisfy a request for `name` (if any) and `ty`?
    #[inline]
    fn matches(&self, name: Option<&str>, ty: &TypeDescriptor) -> bool {
        name.is_none_or(|name| name == self.name()) && self.is_assignable_to(ty)
    }

    /// Would this service satisfy a request for `other`'s name and type?
    #[inline]
    fn matches_definition(&self, other: &dyn ServiceDefinition) -> bool {
        self.matches(Some(other.name()), other.descriptor())
    }

    /// Registering `other` next to this service would be ambiguous.
    #[inline]
    fn conflicts_with(&self, other: &dyn ServiceDefinition) -> bool {
        self.matches_definition(other) && self.priority() == other.priority()
    }

    /// Snapshot as a plain value
    fn definition(&self) -> Definition {
        Definition::new(self.descriptor().clone(), self.name(), self.priority())
    }
}

/// Plain value implementation of [`ServiceDefinition`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Definition {
    descriptor: TypeDescriptor,
    name: String,
    priority: i32,
}

impl Definition {
    pub fn new(descriptor: TypeDescriptor, name: impl Into<String>, priority: i32) -> Self {
        Self {
            descriptor,
            name: name.into(),
            priority,
        }
    }

    /// Definition with a generated `<type>@<id>` name
    pub fn unnamed(descriptor: TypeDescriptor, priority: i32) -> Self {
        let name = default_name(&descriptor);
        Self::new(descriptor, name, priority)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    pub fn set_descriptor(&mut self, descriptor: TypeDescriptor) {
        self.descriptor = descriptor;
    }
}

impl ServiceDefinition for Definition {
    #[inline]
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn priority(&self) -> i32 {
        self.priority
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&definition_string(self))
    }
}

/// Render a definition as `{name: "n", type: "t", priority: p}`
pub fn definition_string<D: ServiceDefinition + ?Sized>(definition: &D) -> String {
    format!(
        "{{name: \"{}\", type: \"{}\", priority: {}}}",
        definition.name(),
        definition.descriptor(),
        definition.priority()
    )
}

/// Generate a process-unique default name for a declaration of `descriptor`
pub fn default_name(descriptor: &TypeDescriptor) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{descriptor}@{id}")
}
