//! Type descriptors and the assignability relation
//!
//! Service lookups never rely on `TypeId` equality alone: a service declared
//! as `StringSupplier` must satisfy a request for `Supplier<String>`, and a raw
//! request for `Supplier` must see every parameterization. A [`TypeDescriptor`]
//! models this explicitly as a tree: a raw identifier, ordered type arguments
//! and the supertypes the type declares.
//!
//! # Example
//!
//! ```rust
//! use service_injector::TypeDescriptor;
//!
//! let supplier_of_string = TypeDescriptor::new("Supplier").with_arg(TypeDescriptor::of::<String>());
//! let string_supplier = TypeDescriptor::new("StringSupplier").with_supertype(supplier_of_string.clone());
//!
//! assert!(string_supplier.assignable_to(&supplier_of_string));
//! assert!(string_supplier.assignable_to(&TypeDescriptor::new("Supplier")));
//! assert!(!supplier_of_string.assignable_to(&string_supplier));
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Raw identifier of the top type
const ANY: &str = "?";

/// Immutable description of a service type.
///
/// Cloning is cheap (a single `Arc` bump). Equality and hashing consider the
/// raw identifier and type arguments; declared supertypes only take part in
/// [`assignable_to`](Self::assignable_to).
#[derive(Clone)]
pub struct TypeDescriptor {
    inner: Arc<Inner>,
}

#[derive(Clone)]
struct Inner {
    raw: Arc<str>,
    args: Vec<TypeDescriptor>,
    supertypes: Vec<TypeDescriptor>,
}

impl TypeDescriptor {
    /// Create a raw (unparameterized) descriptor.
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                raw: raw.into(),
                args: Vec::new(),
                supertypes: Vec::new(),
            }),
        }
    }

    /// Descriptor of a concrete Rust type, identified by its type name.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(std::any::type_name::<T>())
    }

    /// The top type: every descriptor is assignable to it.
    pub fn any() -> Self {
        Self::new(ANY)
    }

    /// Append a type argument.
    pub fn with_arg(mut self, arg: TypeDescriptor) -> Self {
        Arc::make_mut(&mut self.inner).args.push(arg);
        self
    }

    /// Append several type arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        Arc::make_mut(&mut self.inner).args.extend(args);
        self
    }

    /// Declare a supertype this type can be used as.
    pub fn with_supertype(mut self, supertype: TypeDescriptor) -> Self {
        Arc::make_mut(&mut self.inner).supertypes.push(supertype);
        self
    }

    /// Raw identifier, without type arguments.
    #[inline]
    pub fn raw(&self) -> &str {
        &self.inner.raw
    }

    /// Ordered type arguments.
    #[inline]
    pub fn args(&self) -> &[TypeDescriptor] {
        &self.inner.args
    }

    /// Declared supertypes.
    #[inline]
    pub fn supertypes(&self) -> &[TypeDescriptor] {
        &self.inner.supertypes
    }

    /// True when the descriptor carries no type arguments.
    #[inline]
    pub fn is_raw(&self) -> bool {
        self.inner.args.is_empty()
    }

    /// True for the top type.
    #[inline]
    pub fn is_any(&self) -> bool {
        &*self.inner.raw == ANY && self.is_raw()
    }

    /// Can a value described by `self` satisfy a request for `target`?
    ///
    /// A raw target accepts any parameterization of the same raw type. A
    /// parameterized target requires the same arity and covariant arguments.
    /// Otherwise the declared supertypes are searched.
    pub fn assignable_to(&self, target: &TypeDescriptor) -> bool {
        if target.is_any() || Arc::ptr_eq(&self.inner, &target.inner) {
            return true;
        }

        if self.inner.raw == target.inner.raw {
            if target.is_raw() {
                return true;
            }
            if self.inner.args.len() == target.inner.args.len()
                && self
                    .inner
                    .args
                    .iter()
                    .zip(&target.inner.args)
                    .all(|(arg, wanted)| arg.assignable_to(wanted))
            {
                return true;
            }
        }

        self.inner
            .supertypes
            .iter()
            .any(|supertype| supertype.assignable_to(target))
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.raw == other.inner.raw && self.inner.args == other.inner.args)
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.raw.hash(state);
        self.inner.args.hash(state);
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.raw)?;
        if let Some((first, rest)) = self.inner.args.split_first() {
            write!(f, "<{first}")?;
            for arg in rest {
                write!(f, ", {arg}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supplier() -> TypeDescriptor {
        TypeDescriptor::new("Supplier")
    }

    #[test]
    fn test_of_is_stable() {
        assert_eq!(TypeDescriptor::of::<String>(), TypeDescriptor::of::<String>());
        assert_ne!(TypeDescriptor::of::<String>(), TypeDescriptor::of::<u32>());
        assert!(TypeDescriptor::of::<String>().assignable_to(&TypeDescriptor::of::<String>()));
    }

    #[test]
    fn test_raw_request_matches_any_parameterization() {
        let strings = supplier().with_arg(TypeDescriptor::of::<String>());
        assert!(strings.assignable_to(&supplier()));
        assert!(!supplier().assignable_to(&strings));
    }

    #[test]
    fn test_parameterized_request_checks_arguments() {
        let strings = supplier().with_arg(TypeDescriptor::of::<String>());
        let doubles = supplier().with_arg(TypeDescriptor::of::<f64>());
        assert!(strings.assignable_to(&strings.clone()));
        assert!(!strings.assignable_to(&doubles));

        let pair = TypeDescriptor::new("Pair")
            .with_args([TypeDescriptor::of::<String>(), TypeDescriptor::of::<u8>()]);
        let single = TypeDescriptor::new("Pair").with_arg(TypeDescriptor::of::<String>());
        assert!(!pair.assignable_to(&single));
    }

    #[test]
    fn test_covariant_arguments() {
        let animal = TypeDescriptor::new("Animal");
        let cat = TypeDescriptor::new("Cat").with_supertype(animal.clone());

        let cats = supplier().with_arg(cat);
        let animals = supplier().with_arg(animal);
        assert!(cats.assignable_to(&animals));
        assert!(!animals.assignable_to(&cats));
    }

    #[test]
    fn test_supertypes_are_transitive() {
        let closeable = TypeDescriptor::new("Closeable");
        let stream = TypeDescriptor::new("Stream").with_supertype(closeable.clone());
        let file = TypeDescriptor::new("FileStream").with_supertype(stream.clone());

        assert!(file.assignable_to(&stream));
        assert!(file.assignable_to(&closeable));
        assert!(!closeable.assignable_to(&file));
    }

    #[test]
    fn test_any_accepts_everything() {
        assert!(TypeDescriptor::of::<u64>().assignable_to(&TypeDescriptor::any()));
        assert!(!TypeDescriptor::any().assignable_to(&TypeDescriptor::of::<u64>()));
    }

    #[test]
    fn test_equality_ignores_supertypes() {
        let plain = TypeDescriptor::new("Cat");
        let declared = TypeDescriptor::new("Cat").with_supertype(TypeDescriptor::new("Animal"));
        assert_eq!(plain, declared);
    }

    #[test]
    fn test_display() {
        let map = TypeDescriptor::new("Map").with_args([
            TypeDescriptor::new("String"),
            supplier().with_arg(TypeDescriptor::new("Double")),
        ]);
        assert_eq!(map.to_string(), "Map<String, Supplier<Double>>");
        assert_eq!(supplier().to_string(), "Supplier");
    }
}
