//! Vistazo Derive Macros: declared structure for page models and fixtures
//!
//! `#[derive(Injectable)]` writes the `vistazo::Injectable` implementation
//! from field and type attributes, so the classifier, the container and the
//! page binder all read the same declaration.
//!
//! # Field attributes
//!
//! - `#[find_by(id = "q")]` - element located by one locator
//!   (`id`, `css`, `name`, `class_name`, `xpath`, `tag_name`, `link_text`)
//! - `#[find_bys(css = "form", name = "q")]` - nested locators, outermost first
//! - `#[find_all(id = "a", css = ".b")]` - first element matching any locator
//! - `#[cache_lookup]` - remember the element after the first lookup
//! - `#[inject]` / `#[inject(named = "user")]` - filled by the container
//! - `#[vistazo(base)]` - embedded supertype whose declaration is inherited
//!
//! Any other field is built with `Default::default()`.
//!
//! # Type attributes
//!
//! - `#[vistazo(page)]` - UI-bound even without element fields
//! - `#[vistazo(capture(label = "x", of(css = "#main"), wait_for(id = "ready"),
//!   delay_ms = 250, max_deviation = 0.05, baseline = "golden"))]`
//!
//! # Example
//!
//! ```ignore
//! use vistazo::{Element, Injectable, Waiter};
//!
//! #[derive(Injectable)]
//! struct SearchPage {
//!     #[find_by(id = "searchField")]
//!     search_field: Element,
//!     #[find_by(css = "button[type=submit]")]
//!     #[cache_lookup]
//!     submit: Element,
//!     #[inject]
//!     waiter: Option<Waiter>,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::spanned::Spanned;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, GenericArgument, Ident, LitFloat,
    LitInt, LitStr, PathArguments, Type,
};

/// Derive `vistazo::Injectable`.
///
/// See the crate documentation for the recognised attributes.
#[proc_macro_derive(
    Injectable,
    attributes(find_by, find_bys, find_all, cache_lookup, inject, vistazo)
)]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// ============================================================================
// Attribute model
// ============================================================================

/// Locator constructors of `vistazo::Locator`
const LOCATOR_KINDS: [&str; 7] = ["id", "css", "name", "class_name", "xpath", "tag_name", "link_text"];

#[derive(Debug)]
enum LocatorSpec {
    Single(Ident, LitStr),
    Chain(Vec<LocatorSpec>),
    Any(Vec<LocatorSpec>),
}

impl LocatorSpec {
    fn tokens(&self) -> TokenStream2 {
        match self {
            Self::Single(kind, value) => quote!(::vistazo::Locator::#kind(#value)),
            Self::Chain(parts) => {
                let parts = parts.iter().map(Self::tokens);
                quote!(::vistazo::Locator::Chain(::std::vec![#(#parts),*]))
            }
            Self::Any(parts) => {
                let parts = parts.iter().map(Self::tokens);
                quote!(::vistazo::Locator::Any(::std::vec![#(#parts),*]))
            }
        }
    }

    const fn marker(&self) -> &'static str {
        match self {
            Self::Single(..) => "FindBy",
            Self::Chain(_) => "FindBys",
            Self::Any(_) => "FindAll",
        }
    }
}

/// Parse one `kind = "value"` entry of a locator list
fn parse_locator_entry(meta: &ParseNestedMeta<'_>) -> syn::Result<LocatorSpec> {
    let kind = meta
        .path
        .get_ident()
        .filter(|i| LOCATOR_KINDS.contains(&i.to_string().as_str()))
        .cloned()
        .ok_or_else(|| meta.error(format!("expected one of: {}", LOCATOR_KINDS.join(", "))))?;
    let value: LitStr = meta.value()?.parse()?;
    Ok(LocatorSpec::Single(kind, value))
}

/// Parse the locator list nested under a key, as in `of(id = "...")`
fn parse_locators(meta: &ParseNestedMeta<'_>) -> syn::Result<Vec<LocatorSpec>> {
    let mut locators = Vec::new();
    meta.parse_nested_meta(|inner| {
        locators.push(parse_locator_entry(&inner)?);
        Ok(())
    })?;
    Ok(locators)
}

/// Parse the locator list inside an attribute like `#[find_by(...)]`
fn parse_locator_attr(attr: &Attribute) -> syn::Result<Vec<LocatorSpec>> {
    let mut locators = Vec::new();
    attr.parse_nested_meta(|meta| {
        locators.push(parse_locator_entry(&meta)?);
        Ok(())
    })?;
    if locators.is_empty() {
        return Err(syn::Error::new(attr.span(), "at least one locator is required"));
    }
    Ok(locators)
}

fn single_locator(attr: &Attribute, mut locators: Vec<LocatorSpec>) -> syn::Result<LocatorSpec> {
    if locators.len() != 1 {
        return Err(syn::Error::new(
            attr.span(),
            "find_by takes exactly one locator; use find_bys or find_all to combine",
        ));
    }
    Ok(locators.remove(0))
}

#[derive(Debug)]
enum FieldKind {
    Element { locator: LocatorSpec, cache: bool },
    Inject { named: Option<LitStr> },
    Base,
    Plain,
}

fn field_kind(attrs: &[Attribute]) -> syn::Result<FieldKind> {
    let mut locator = None;
    let mut cache = false;
    let mut inject = None;
    let mut base = false;

    for attr in attrs {
        let path = attr.path();
        if path.is_ident("find_by") {
            locator = Some(single_locator(attr, parse_locator_attr(attr)?)?);
        } else if path.is_ident("find_bys") {
            locator = Some(LocatorSpec::Chain(parse_locator_attr(attr)?));
        } else if path.is_ident("find_all") {
            locator = Some(LocatorSpec::Any(parse_locator_attr(attr)?));
        } else if path.is_ident("cache_lookup") {
            cache = true;
        } else if path.is_ident("inject") {
            let mut named = None;
            if !matches!(attr.meta, syn::Meta::Path(_)) {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("named") {
                        named = Some(meta.value()?.parse::<LitStr>()?);
                        Ok(())
                    } else {
                        Err(meta.error("expected `named = \"...\"`"))
                    }
                })?;
            }
            inject = Some(named);
        } else if path.is_ident("vistazo") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("base") {
                    base = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `base` on a field"))
                }
            })?;
        }
    }

    let declared = usize::from(locator.is_some()) + usize::from(inject.is_some()) + usize::from(base);
    if declared > 1 {
        let span = attrs.first().map_or_else(proc_macro2::Span::call_site, Spanned::span);
        return Err(syn::Error::new(
            span,
            "a field is either located, injected or a base, not several",
        ));
    }

    Ok(match (locator, inject) {
        (Some(locator), _) => FieldKind::Element { locator, cache },
        (None, Some(named)) => FieldKind::Inject { named },
        (None, None) if base => FieldKind::Base,
        (None, None) => FieldKind::Plain,
    })
}

#[derive(Debug, Default)]
struct CaptureSpec {
    label: Option<LitStr>,
    of: Option<LocatorSpec>,
    wait_for: Option<LocatorSpec>,
    delay_ms: Option<LitInt>,
    max_deviation: Option<LitFloat>,
    baseline: Option<LitStr>,
}

impl CaptureSpec {
    fn tokens(&self) -> TokenStream2 {
        let mut directive = match &self.of {
            Some(of) => {
                let of = of.tokens();
                quote!(::vistazo::CaptureDirective::element(#of))
            }
            None => quote!(::vistazo::CaptureDirective::whole_page()),
        };
        if let Some(label) = &self.label {
            directive = quote!(#directive.label(#label));
        }
        if let Some(wait_for) = &self.wait_for {
            let wait_for = wait_for.tokens();
            directive = quote!(#directive.wait_for(#wait_for));
        }
        if let Some(delay) = &self.delay_ms {
            directive = quote!(#directive.delay(::std::time::Duration::from_millis(#delay)));
        }
        if let Some(deviation) = &self.max_deviation {
            directive = quote!(#directive.max_deviation(#deviation));
        }
        if let Some(baseline) = &self.baseline {
            directive = quote!(#directive.baseline(#baseline));
        }
        directive
    }
}

fn one_locator(meta: &ParseNestedMeta<'_>) -> syn::Result<LocatorSpec> {
    let mut locators = parse_locators(meta)?;
    if locators.len() != 1 {
        return Err(meta.error("expected exactly one locator"));
    }
    Ok(locators.remove(0))
}

#[derive(Debug, Default)]
struct TypeAttrs {
    page: bool,
    capture: Option<CaptureSpec>,
}

fn type_attrs(attrs: &[Attribute]) -> syn::Result<TypeAttrs> {
    let mut out = TypeAttrs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("vistazo")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("page") {
                out.page = true;
                return Ok(());
            }
            if meta.path.is_ident("capture") {
                let mut capture = CaptureSpec::default();
                if !meta.input.is_empty() && !meta.input.peek(syn::Token![,]) {
                    meta.parse_nested_meta(|item| {
                        if item.path.is_ident("label") {
                            capture.label = Some(item.value()?.parse()?);
                        } else if item.path.is_ident("of") {
                            capture.of = Some(one_locator(&item)?);
                        } else if item.path.is_ident("wait_for") {
                            capture.wait_for = Some(one_locator(&item)?);
                        } else if item.path.is_ident("delay_ms") {
                            capture.delay_ms = Some(item.value()?.parse()?);
                        } else if item.path.is_ident("max_deviation") {
                            capture.max_deviation = Some(item.value()?.parse()?);
                        } else if item.path.is_ident("baseline") {
                            capture.baseline = Some(item.value()?.parse()?);
                        } else {
                            return Err(item.error(
                                "expected label, of, wait_for, delay_ms, max_deviation or baseline",
                            ));
                        }
                        Ok(())
                    })?;
                }
                out.capture = Some(capture);
                return Ok(());
            }
            Err(meta.error("expected `page` or `capture(...)`"))
        })?;
    }
    Ok(out)
}

/// `T` of an `Option<T>`
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

// ============================================================================
// Expansion
// ============================================================================

struct Generated {
    describe: Vec<TokenStream2>,
    construct: Vec<TokenStream2>,
    bind: Vec<TokenStream2>,
    members: Vec<TokenStream2>,
    page_bound: bool,
    extends: bool,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let attrs = type_attrs(&input.attrs)?;

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(input.span(), "Injectable can only be derived for structs"));
    };

    let mut gen = Generated {
        describe: Vec::new(),
        construct: Vec::new(),
        bind: Vec::new(),
        members: Vec::new(),
        page_bound: attrs.page,
        extends: false,
    };
    if attrs.page {
        gen.describe.push(quote!(.marker(::vistazo::Marker::PageFinder)));
    }

    match &data.fields {
        Fields::Named(fields) => {
            for field in &fields.named {
                let ident = field
                    .ident
                    .as_ref()
                    .ok_or_else(|| syn::Error::new(field.span(), "unnamed field"))?;
                expand_field(ident, &field.ty, field_kind(&field.attrs)?, &mut gen);
            }
        }
        Fields::Unit => {}
        Fields::Unnamed(fields) => {
            return Err(syn::Error::new(
                fields.span(),
                "Injectable needs named fields to describe",
            ))
        }
    }

    let Generated {
        describe,
        construct,
        bind,
        members,
        page_bound,
        extends,
    } = gen;

    let body = |inits: &[TokenStream2]| match &data.fields {
        Fields::Unit => quote!(Self),
        _ => quote!(Self { #(#inits),* }),
    };
    let constructed = body(&construct);
    let bound = body(&bind);

    // Without markers of its own the type is page-bound only through its base
    let inherited_guard = (!page_bound).then(|| {
        quote! {
            if !::vistazo::classify(&::vistazo::TypeRef::of::<Self>()) {
                return Err(::vistazo::VistazoError::PageBinding {
                    type_name: ::std::any::type_name::<Self>().to_string(),
                    message: "neither the type nor its base declares page-bound fields".to_string(),
                });
            }
        }
    });
    let bind_page = (page_bound || extends).then(|| {
        quote! {
            fn bind_page(driver: &::vistazo::DriverHandle) -> ::vistazo::VistazoResult<Self> {
                let _ = driver;
                #inherited_guard
                Ok(#bound)
            }
        }
    });
    let capture = attrs.capture.as_ref().map(|spec| {
        let directive = spec.tokens();
        quote! {
            fn capture_directive() -> ::std::option::Option<::vistazo::CaptureDirective> {
                ::std::option::Option::Some(#directive)
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::vistazo::Injectable for #name #ty_generics #where_clause {
            fn describe() -> ::vistazo::TypeDescriptor {
                ::vistazo::TypeDescriptor::new::<Self>()
                    #(#describe)*
            }

            fn construct(injector: &::vistazo::Injector) -> ::vistazo::VistazoResult<Self> {
                let _ = injector;
                Ok(#constructed)
            }

            #bind_page

            fn inject_members(&mut self, injector: &::vistazo::Injector) -> ::vistazo::VistazoResult<()> {
                let _ = injector;
                #(#members)*
                Ok(())
            }

            #capture
        }
    })
}

fn expand_field(ident: &Ident, ty: &Type, kind: FieldKind, gen: &mut Generated) {
    let field_name = ident.to_string();
    match kind {
        FieldKind::Element { locator, cache } => {
            gen.page_bound = true;
            let marker = Ident::new(locator.marker(), ident.span());
            let locator = locator.tokens();
            let cache_marker = cache.then(|| quote!(.marker(::vistazo::Marker::CacheLookup)));
            gen.describe.push(quote! {
                .field(
                    ::vistazo::FieldDescriptor::new(#field_name, ::core::stringify!(#ty))
                        .marker(::vistazo::Marker::#marker)
                        #cache_marker
                )
            });
            gen.construct.push(quote!(#ident: ::vistazo::Element::unbound(#locator)));
            gen.bind.push(quote! {
                #ident: ::vistazo::Element::bound(driver.clone(), #locator).cache_lookup(#cache)
            });
        }
        FieldKind::Inject { named } => {
            let (lookup, optional) = match (&named, option_inner(ty)) {
                (Some(name), Some(inner)) => (quote!(injector.named::<#inner>(#name).ok()), true),
                (Some(name), None) => (quote!(injector.named::<#ty>(#name)?), false),
                (None, Some(inner)) => (quote!(::std::option::Option::Some(injector.get::<#inner>()?)), true),
                (None, None) => (quote!(injector.get::<#ty>()?), false),
            };
            let target = option_inner(ty).unwrap_or(ty);
            gen.describe.push(match named {
                Some(_) => quote! {
                    .field(::vistazo::FieldDescriptor::new(#field_name, ::core::stringify!(#ty)).injectable())
                },
                None => quote! {
                    .field(::vistazo::FieldDescriptor::of::<#target>(#field_name).injectable())
                },
            });
            gen.construct.push(quote!(#ident: #lookup));
            // Page binding leaves injected fields empty until inject_members
            gen.bind.push(if optional {
                quote!(#ident: ::std::option::Option::None)
            } else {
                quote!(#ident: ::std::default::Default::default())
            });
            gen.members.push(quote!(self.#ident = #lookup;));
        }
        FieldKind::Base => {
            gen.extends = true;
            gen.describe.push(quote!(.extends::<#ty>()));
            gen.construct
                .push(quote!(#ident: <#ty as ::vistazo::Injectable>::construct(injector)?));
            gen.bind
                .push(quote!(#ident: <#ty as ::vistazo::Injectable>::bind_page(driver)?));
            gen.members.push(quote! {
                ::vistazo::Injectable::inject_members(&mut self.#ident, injector)?;
            });
        }
        FieldKind::Plain => {
            gen.construct.push(quote!(#ident: ::std::default::Default::default()));
            gen.bind.push(quote!(#ident: ::std::default::Default::default()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn kind_of(field: syn::Field) -> FieldKind {
        field_kind(&field.attrs).unwrap()
    }

    #[test]
    fn test_option_inner() {
        let ty: Type = parse_quote!(Option<Waiter>);
        let inner = option_inner(&ty).unwrap();
        assert_eq!(quote!(#inner).to_string(), "Waiter");
        let plain: Type = parse_quote!(Waiter);
        assert!(option_inner(&plain).is_none());
    }

    #[test]
    fn test_find_by_field() {
        let field: syn::Field = parse_quote! {
            #[find_by(id = "searchField")]
            #[cache_lookup]
            search_field: Element
        };
        match kind_of(field) {
            FieldKind::Element { locator, cache } => {
                assert!(cache);
                assert_eq!(locator.marker(), "FindBy");
                assert_eq!(
                    locator.tokens().to_string(),
                    quote!(::vistazo::Locator::id("searchField")).to_string()
                );
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_find_bys_keeps_order() {
        let field: syn::Field = parse_quote! {
            #[find_bys(css = "form", name = "q")]
            query: Element
        };
        let FieldKind::Element { locator, .. } = kind_of(field) else {
            panic!("expected element");
        };
        assert_eq!(locator.marker(), "FindBys");
        let tokens = locator.tokens().to_string();
        assert!(tokens.find("css").unwrap() < tokens.find("name").unwrap());
    }

    #[test]
    fn test_find_by_rejects_two_locators() {
        let field: syn::Field = parse_quote! {
            #[find_by(id = "a", css = ".b")]
            f: Element
        };
        assert!(field_kind(&field.attrs).is_err());
    }

    #[test]
    fn test_unknown_locator_kind() {
        let field: syn::Field = parse_quote! {
            #[find_by(partial_link = "x")]
            f: Element
        };
        assert!(field_kind(&field.attrs).is_err());
    }

    #[test]
    fn test_inject_variants() {
        let plain: syn::Field = parse_quote!(#[inject] waiter: Waiter);
        assert!(matches!(kind_of(plain), FieldKind::Inject { named: None }));
        let named: syn::Field = parse_quote!(#[inject(named = "baseUrl")] base: BaseUrl);
        match kind_of(named) {
            FieldKind::Inject { named: Some(name) } => assert_eq!(name.value(), "baseUrl"),
            other => panic!("expected named injection, got {other:?}"),
        }
    }

    #[test]
    fn test_conflicting_field_attributes() {
        let field: syn::Field = parse_quote! {
            #[find_by(id = "a")]
            #[inject]
            f: Element
        };
        assert!(field_kind(&field.attrs).is_err());
    }

    #[test]
    fn test_type_attrs_capture() {
        let input: DeriveInput = parse_quote! {
            #[vistazo(page, capture(label = "home", of(css = "#main"), delay_ms = 250, max_deviation = 0.05))]
            struct Home;
        };
        let attrs = type_attrs(&input.attrs).unwrap();
        assert!(attrs.page);
        let capture = attrs.capture.unwrap();
        assert_eq!(capture.label.unwrap().value(), "home");
        assert!(capture.of.is_some());
        assert_eq!(capture.delay_ms.unwrap().base10_parse::<u64>().unwrap(), 250);
    }

    #[test]
    fn test_expand_marks_plain_struct_container_bound() {
        let input: DeriveInput = parse_quote! {
            struct Service {
                #[inject]
                waiter: Option<Waiter>,
                count: u32,
            }
        };
        let out = expand(&input).unwrap().to_string();
        assert!(!out.contains("bind_page"));
        assert!(out.contains("inject_members"));
    }

    #[test]
    fn test_capture_rejects_unknown_locator_kind() {
        let input: DeriveInput = parse_quote! {
            #[vistazo(capture(of(partial_link = "x")))]
            struct Home;
        };
        assert!(type_attrs(&input.attrs).is_err());
    }

    #[test]
    fn test_expand_base_only_checks_inherited_markers() {
        let input: DeriveInput = parse_quote! {
            struct Extended {
                #[vistazo(base)]
                base: Service,
            }
        };
        let out = expand(&input).unwrap().to_string();
        assert!(out.contains("bind_page"));
        assert!(out.contains("classify"));
    }

    #[test]
    fn test_expand_own_locator_binds_unconditionally() {
        let input: DeriveInput = parse_quote! {
            struct Results {
                #[vistazo(base)]
                header: Header,
                #[find_by(css = ".hit")]
                first: Element,
            }
        };
        let out = expand(&input).unwrap().to_string();
        assert!(out.contains("bind_page"));
        assert!(!out.contains("classify"));
    }

    #[test]
    fn test_expand_rejects_enums() {
        let input: DeriveInput = parse_quote!(enum Nope { A });
        assert!(expand(&input).is_err());
    }
}
