//! Declared type structure.
//!
//! Types describe themselves through [`Injectable::describe`]: their markers,
//! fields, constructors and supertype. The orchestrator never inspects values
//! to decide how to build something, only these descriptors.
//!
//! Descriptors are immutable and cached process-wide by [`TypeId`]; the cache
//! is populated once per type and read afterwards.

use crate::capture::CaptureDirective;
use crate::driver::DriverHandle;
use crate::inject::{Injectable, Injector};
use crate::result::{VistazoError, VistazoResult};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Declarative marker on a type or field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Field bound to one located element
    FindBy,
    /// Field bound through a chain of nested locators
    FindBys,
    /// Field bound to the first of several alternative locators
    FindAll,
    /// Located element is cached after the first lookup
    CacheLookup,
    /// Type supplies its own element finder
    PageFinder,
    /// Any marker the orchestrator does not interpret
    Other(&'static str),
}

impl Marker {
    /// Markers that make a type UI-bound
    pub const PAGE_BINDING: [Self; 5] = [
        Self::FindBy,
        Self::FindBys,
        Self::FindAll,
        Self::CacheLookup,
        Self::PageFinder,
    ];

    /// Whether this marker requires page binding
    #[must_use]
    pub const fn is_page_binding(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FindBy => f.write_str("find_by"),
            Self::FindBys => f.write_str("find_bys"),
            Self::FindAll => f.write_str("find_all"),
            Self::CacheLookup => f.write_str("cache_lookup"),
            Self::PageFinder => f.write_str("page_finder"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// A declared field
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name
    pub name: &'static str,
    /// Field type name, for diagnostics
    pub type_name: &'static str,
    /// Handle to the field type, when it is itself injectable
    pub type_ref: Option<TypeRef>,
    /// Filled in by the container's members-only pass
    pub injectable: bool,
    /// Markers on the field
    pub markers: Vec<Marker>,
}

impl FieldDescriptor {
    /// Field of a type the container knows nothing about
    #[must_use]
    pub const fn new(name: &'static str, type_name: &'static str) -> Self {
        Self {
            name,
            type_name,
            type_ref: None,
            injectable: false,
            markers: Vec::new(),
        }
    }

    /// Field of an injectable type
    #[must_use]
    pub fn of<T: Injectable>(name: &'static str) -> Self {
        Self {
            name,
            type_name: std::any::type_name::<T>(),
            type_ref: Some(TypeRef::of::<T>()),
            injectable: false,
            markers: Vec::new(),
        }
    }

    /// Mark the field as container-injected
    #[must_use]
    pub const fn injectable(mut self) -> Self {
        self.injectable = true;
        self
    }

    /// Add a marker
    #[must_use]
    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Whether any marker on this field requires page binding
    #[must_use]
    pub fn has_page_marker(&self) -> bool {
        self.markers.iter().any(Marker::is_page_binding)
    }
}

/// A declared constructor
#[derive(Debug, Clone, Default)]
pub struct ConstructorDescriptor {
    /// Parameter types, in order
    pub params: Vec<TypeRef>,
    /// Used by the container
    pub injectable: bool,
}

impl ConstructorDescriptor {
    /// Constructor used by the container
    #[must_use]
    pub fn injectable(params: Vec<TypeRef>) -> Self {
        Self {
            params,
            injectable: true,
        }
    }
}

/// Declared structure of a type
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    simple_name: String,
    markers: Vec<Marker>,
    fields: Vec<FieldDescriptor>,
    constructors: Vec<ConstructorDescriptor>,
    supertype: Option<TypeRef>,
}

impl TypeDescriptor {
    /// Start describing `T`
    #[must_use]
    pub fn new<T: 'static>() -> Self {
        let type_name = std::any::type_name::<T>();
        Self {
            type_id: TypeId::of::<T>(),
            type_name,
            simple_name: simple_name(type_name).to_string(),
            markers: Vec::new(),
            fields: Vec::new(),
            constructors: Vec::new(),
            supertype: None,
        }
    }

    /// Add a type-level marker
    #[must_use]
    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Declare a field
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare a constructor
    #[must_use]
    pub fn constructor(mut self, constructor: ConstructorDescriptor) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Declare the supertype
    #[must_use]
    pub fn extends<S: Injectable>(self) -> Self {
        self.extends_ref(TypeRef::of::<S>())
    }

    /// Declare the supertype from a handle
    #[must_use]
    pub fn extends_ref(mut self, supertype: TypeRef) -> Self {
        self.supertype = Some(supertype);
        self
    }

    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Unqualified type name, generics stripped
    pub fn simple_name(&self) -> &str {
        &self.simple_name
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    pub const fn supertype(&self) -> Option<TypeRef> {
        self.supertype
    }
}

/// Strip module path and generic arguments from a type name
#[must_use]
pub fn simple_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

type ErasedResult = VistazoResult<Box<dyn Any>>;

/// Copyable handle to an injectable type and its declared capabilities
#[derive(Clone, Copy)]
pub struct TypeRef {
    id: TypeId,
    name: &'static str,
    describe: fn() -> TypeDescriptor,
    construct: fn(&Injector) -> ErasedResult,
    bind: fn(&DriverHandle) -> ErasedResult,
    inject_members: fn(&mut dyn Any, &Injector) -> VistazoResult<()>,
    capture: fn() -> Option<CaptureDirective>,
}

fn construct_erased<T: Injectable>(injector: &Injector) -> ErasedResult {
    T::construct(injector).map(|v| Box::new(v) as Box<dyn Any>)
}

fn bind_erased<T: Injectable>(driver: &DriverHandle) -> ErasedResult {
    T::bind_page(driver).map(|v| Box::new(v) as Box<dyn Any>)
}

fn inject_members_erased<T: Injectable>(
    target: &mut dyn Any,
    injector: &Injector,
) -> VistazoResult<()> {
    target
        .downcast_mut::<T>()
        .ok_or_else(|| {
            VistazoError::construction(
                std::any::type_name::<T>(),
                "members-only injection received a value of another type",
            )
        })?
        .inject_members(injector)
}

impl TypeRef {
    /// Handle for `T`
    #[must_use]
    pub fn of<T: Injectable>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            describe: T::describe,
            construct: construct_erased::<T>,
            bind: bind_erased::<T>,
            inject_members: inject_members_erased::<T>,
            capture: T::capture_directive,
        }
    }

    pub const fn id(&self) -> TypeId {
        self.id
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub fn simple_name(&self) -> &'static str {
        simple_name(self.name)
    }

    /// Cached descriptor
    pub fn descriptor(&self) -> Arc<TypeDescriptor> {
        DescriptorCache::global().descriptor(self)
    }

    /// Container construction
    pub fn construct(&self, injector: &Injector) -> ErasedResult {
        (self.construct)(injector)
    }

    /// Page-binding construction
    pub fn bind_page(&self, driver: &DriverHandle) -> ErasedResult {
        (self.bind)(driver)
    }

    /// Members-only injection over a value of this type
    pub fn inject_members(&self, target: &mut dyn Any, injector: &Injector) -> VistazoResult<()> {
        (self.inject_members)(target, injector)
    }

    /// Capture directive declared by the type
    pub fn capture_directive(&self) -> Option<CaptureDirective> {
        (self.capture)()
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeRef {}

impl std::hash::Hash for TypeRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeRef").field(&self.name).finish()
    }
}

/// Process-wide descriptor cache
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: RwLock<HashMap<TypeId, Arc<TypeDescriptor>>>,
}

impl DescriptorCache {
    /// The shared cache
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<DescriptorCache> = OnceLock::new();
        GLOBAL.get_or_init(Self::default)
    }

    /// Descriptor for a type, describing it on first request
    pub fn descriptor(&self, ty: &TypeRef) -> Arc<TypeDescriptor> {
        if let Some(found) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ty.id)
        {
            return Arc::clone(found);
        }
        let described = Arc::new((ty.describe)());
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(ty.id).or_insert(described))
    }

    /// Whether a type has been described
    pub fn contains(&self, id: TypeId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::inject::Injector;

    struct Plain;

    impl Injectable for Plain {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::new::<Self>().field(FieldDescriptor::new("count", "u32"))
        }

        fn construct(_: &Injector) -> VistazoResult<Self> {
            Ok(Self)
        }
    }

    #[test]
    fn test_simple_name() {
        assert_eq!(simple_name("my_crate::pages::LoginPage"), "LoginPage");
        assert_eq!(simple_name("Option<my_crate::Thing>"), "Option");
        assert_eq!(simple_name("Bare"), "Bare");
    }

    #[test]
    fn test_marker_page_binding() {
        for marker in Marker::PAGE_BINDING {
            assert!(marker.is_page_binding());
        }
        assert!(!Marker::Other("inject").is_page_binding());
    }

    #[test]
    fn test_descriptor_is_cached() {
        let ty = TypeRef::of::<Plain>();
        let first = ty.descriptor();
        let second = ty.descriptor();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(DescriptorCache::global().contains(ty.id()));
        assert_eq!(first.simple_name(), "Plain");
        assert_eq!(first.fields().len(), 1);
    }

    #[test]
    fn test_type_ref_equality_is_identity() {
        assert_eq!(TypeRef::of::<Plain>(), TypeRef::of::<Plain>());
        assert_ne!(TypeRef::of::<Plain>().id(), TypeId::of::<u32>());
    }

    #[test]
    fn test_erased_construction() {
        let injector = Injector::empty();
        let built = TypeRef::of::<Plain>().construct(&injector).unwrap();
        assert!(built.downcast_ref::<Plain>().is_some());
        assert!(TypeRef::of::<Plain>()
            .bind_page(&DriverHandle::new(crate::driver::MockDriver::new()))
            .is_err());
    }
}
