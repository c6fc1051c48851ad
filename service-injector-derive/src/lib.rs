//! Derive macros for service-injector
//!
//! `#[derive(Inject)]` implements `Constructible` for a struct with named
//! fields: one preferred constructor whose dependencies are the struct's
//! `#[inject]` fields. Struct-level name and priority travel on it.
//!
//! ```rust,ignore
//! use service_injector::prelude::*;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct Cache;
//!
//! #[derive(Inject)]
//! #[inject(name = "users", priority = -1)]
//! struct UserService {
//!     #[inject]
//!     db: Arc<Database>,
//!     #[inject(optional)]
//!     cache: Option<Arc<Cache>>,
//!     // Non-injected fields use Default
//!     request_count: u64,
//! }
//!
//! let services = ServicesBuilder::new()
//!     .declare::<Database>().with_instance(Database { url: "postgres://localhost".into() }).register()
//!     .declare::<UserService>().constructed().register()
//!     .build()
//!     .unwrap();
//!
//! let users = services.get_named::<UserService>("users").unwrap();
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Expr, Fields, LitStr, Type, parse_macro_input};

/// Derive `Constructible` from `#[inject]` fields.
///
/// # Field attributes
///
/// - `#[inject]` - Required dependency, the field type must be `Arc<T>`
/// - `#[inject(optional)]` - Optional dependency of type `Option<Arc<T>>`
/// - `#[inject(name = "primary")]` - Look the dependency up by this name
///   instead of the field name
///
/// Injected fields are looked up by their field name first, then by type
/// alone. Other fields use `Default::default()`.
///
/// # Struct attributes
///
/// - `#[inject(name = "...")]` - Name of the declared service
/// - `#[inject(priority = N)]` - Priority of the declared service
#[proc_macro_derive(Inject, attributes(inject))]
pub fn derive_inject(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_inject(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_inject(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Inject can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Inject can only be derived for structs",
            ));
        }
    };

    let service = parse_inject_attr(&input.attrs)?.unwrap_or_default();
    if service.optional {
        return Err(syn::Error::new_spanned(
            input,
            "`optional` only applies to fields",
        ));
    }

    let mut dependencies = Vec::new();
    let mut field_inits = Vec::new();

    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let Some(attr) = parse_inject_attr(&field.attrs)? else {
            field_inits.push(quote! {
                #field_name: ::std::default::Default::default()
            });
            continue;
        };
        if attr.priority.is_some() {
            return Err(syn::Error::new_spanned(
                field,
                "`priority` only applies to the struct",
            ));
        }

        let index = dependencies.len();
        let lookup = attr
            .name
            .map(|name| name.value())
            .unwrap_or_else(|| field_name.to_string());

        if attr.optional {
            let inner = extract_option_arc_inner_type(&field.ty).ok_or_else(|| {
                syn::Error::new_spanned(
                    &field.ty,
                    "Fields marked with #[inject(optional)] must have type Option<Arc<T>>",
                )
            })?;
            dependencies.push(quote! {
                ::service_injector::ServiceDependency::optional::<#inner>().named(#lookup)
            });
            field_inits.push(quote! {
                #field_name: deps.optional::<#inner>(#index)?
            });
        } else {
            let inner = extract_arc_inner_type(&field.ty).ok_or_else(|| {
                syn::Error::new_spanned(
                    &field.ty,
                    "Fields marked with #[inject] must have type Arc<T>",
                )
            })?;
            dependencies.push(quote! {
                ::service_injector::ServiceDependency::required::<#inner>().named(#lookup)
            });
            field_inits.push(quote! {
                #field_name: deps.required::<#inner>(#index)?
            });
        }
    }

    let label = name.to_string();
    let named = service.name.map(|name| quote! { .named(#name) });
    let priority = service.priority.map(|priority| quote! { .priority(#priority) });

    Ok(quote! {
        impl #impl_generics ::service_injector::Constructible for #name #ty_generics #where_clause {
            fn constructors() -> ::service_injector::Constructors {
                let constructor = ::service_injector::Constructor::new::<Self, _>(
                    #label,
                    ::service_injector::ServiceDependencies::new()
                        #(.with(#dependencies))*,
                    |deps: &::service_injector::ResolvedDependencies|
                        -> ::std::result::Result<Self, ::service_injector::BoxError> {
                        let _ = deps;
                        Ok(Self {
                            #(#field_inits),*
                        })
                    },
                )
                .preferred()
                #named
                #priority;
                ::service_injector::Constructors::new().with(constructor)
            }
        }
    })
}

/// Parsed `#[inject(...)]`
#[derive(Default)]
struct InjectAttr {
    optional: bool,
    name: Option<LitStr>,
    priority: Option<Expr>,
}

fn parse_inject_attr(attrs: &[Attribute]) -> syn::Result<Option<InjectAttr>> {
    let Some(attr) = attrs.iter().find(|attr| attr.path().is_ident("inject")) else {
        return Ok(None);
    };

    let mut parsed = InjectAttr::default();
    if attr.meta.require_path_only().is_ok() {
        return Ok(Some(parsed));
    }

    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("optional") {
            parsed.optional = true;
            Ok(())
        } else if meta.path.is_ident("name") {
            parsed.name = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("priority") {
            parsed.priority = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("expected `optional`, `name` or `priority`"))
        }
    })?;
    Ok(Some(parsed))
}

/// Extract T from Arc<T>
fn extract_arc_inner_type(ty: &Type) -> Option<&Type> {
    generic_argument(ty, "Arc")
}

/// Extract T from Option<Arc<T>>
fn extract_option_arc_inner_type(ty: &Type) -> Option<&Type> {
    generic_argument(ty, "Option").and_then(extract_arc_inner_type)
}

fn generic_argument<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        syn::GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}
