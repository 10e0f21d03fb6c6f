//! A small dependency-injection container.
//!
//! Three operations: build an instance of a type from the registered
//! bindings, register a binding, and run a members-only injection pass over an
//! already constructed value. Bindings are fixed once [`InjectorBuilder::build`]
//! runs.
//!
//! Types take part by implementing [`Injectable`], usually through
//! `#[derive(Injectable)]`.

use crate::capture::CaptureDirective;
use crate::descriptor::{TypeDescriptor, TypeRef};
use crate::driver::DriverHandle;
use crate::result::{VistazoError, VistazoResult};
use std::any::{Any, TypeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Nested constructions deeper than this are reported as a dependency cycle
pub const MAX_DEPTH: usize = 64;

/// A type the orchestrator can describe and build.
///
/// `construct` is the container strategy. `bind_page` is the page-binding
/// strategy; it only needs overriding for UI-bound types. After page binding
/// the container runs `inject_members` so container-managed fields are filled
/// as well.
pub trait Injectable: Sized + 'static {
    /// Declared structure, used for classification
    fn describe() -> TypeDescriptor;

    /// Build through the container
    fn construct(injector: &Injector) -> VistazoResult<Self>;

    /// Build by binding fields to elements on the current page
    fn bind_page(driver: &DriverHandle) -> VistazoResult<Self> {
        let _ = driver;
        Err(VistazoError::PageBinding {
            type_name: std::any::type_name::<Self>().to_string(),
            message: "type declares no page-bound fields".to_string(),
        })
    }

    /// Fill container-managed fields of an existing value
    fn inject_members(&mut self, injector: &Injector) -> VistazoResult<()> {
        let _ = injector;
        Ok(())
    }

    /// Screenshot directive for when this type is used as a fixture
    fn capture_directive() -> Option<CaptureDirective> {
        None
    }
}

type Supplier = Rc<dyn Fn(&Injector) -> VistazoResult<Box<dyn Any>>>;

#[derive(Clone)]
struct Binding {
    type_name: &'static str,
    supplier: Supplier,
}

/// Collects bindings before the injector is built
#[derive(Default)]
pub struct InjectorBuilder {
    bindings: HashMap<TypeId, Binding>,
    named: HashMap<(String, TypeId), Binding>,
}

impl InjectorBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a type to a shared instance, cloned for each request
    pub fn bind_instance<T: Clone + 'static>(&mut self, value: T) -> &mut Self {
        self.bind_with(move |_| Ok(value.clone()))
    }

    /// Bind a type to a supplier
    pub fn bind_with<T, F>(&mut self, supplier: F) -> &mut Self
    where
        T: 'static,
        F: Fn(&Injector) -> VistazoResult<T> + 'static,
    {
        self.bind_erased(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            Rc::new(move |injector| supplier(injector).map(|v| Box::new(v) as Box<dyn Any>)),
        );
        self
    }

    /// Bind a value under a name
    pub fn bind_named<T: Clone + 'static>(&mut self, name: impl Into<String>, value: T) -> &mut Self {
        self.named.insert(
            (name.into(), TypeId::of::<T>()),
            Binding {
                type_name: std::any::type_name::<T>(),
                supplier: Rc::new(move |_| Ok(Box::new(value.clone()) as Box<dyn Any>)),
            },
        );
        self
    }

    pub(crate) fn bind_erased(&mut self, id: TypeId, type_name: &'static str, supplier: Supplier) {
        if self
            .bindings
            .insert(
                id,
                Binding {
                    type_name,
                    supplier,
                },
            )
            .is_some()
        {
            trace!(type_name, "binding replaced");
        }
    }

    /// Whether `T` has an explicit binding
    #[must_use]
    pub fn is_bound<T: 'static>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    /// Freeze the bindings
    #[must_use]
    pub fn build(self) -> Injector {
        Injector {
            bindings: self.bindings,
            named: self.named,
            depth: Cell::new(0),
        }
    }
}

impl fmt::Debug for InjectorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectorBuilder")
            .field("bindings", &self.bindings.len())
            .field("named", &self.named.len())
            .finish()
    }
}

/// Builds values from fixed bindings, falling back to [`Injectable::construct`]
pub struct Injector {
    bindings: HashMap<TypeId, Binding>,
    named: HashMap<(String, TypeId), Binding>,
    depth: Cell<usize>,
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl Injector {
    /// Start building an injector
    #[must_use]
    pub fn builder() -> InjectorBuilder {
        InjectorBuilder::new()
    }

    /// Injector with no bindings
    #[must_use]
    pub fn empty() -> Self {
        InjectorBuilder::new().build()
    }

    /// Build an instance of `T`
    pub fn get<T: Injectable>(&self) -> VistazoResult<T> {
        let value = self.get_ref(&TypeRef::of::<T>())?;
        downcast::<T>(value)
    }

    /// Build an instance of the referenced type, type-erased
    pub fn get_ref(&self, ty: &TypeRef) -> VistazoResult<Box<dyn Any>> {
        let _guard = self.enter(ty.name())?;
        match self.bindings.get(&ty.id()) {
            Some(binding) => {
                trace!(type_name = binding.type_name, "supplying from binding");
                (binding.supplier)(self)
            }
            None if self.is_bound::<DriverHandle>() && crate::classifier::classify(ty) => {
                self.build_by_page_binding(ty)
            }
            None => ty.construct(self),
        }
    }

    /// Bind `ty` to the current page, then inject its remaining members
    pub(crate) fn build_by_page_binding(&self, ty: &TypeRef) -> VistazoResult<Box<dyn Any>> {
        debug!(type_name = ty.name(), "constructing by page binding");
        let driver: DriverHandle = self.get()?;
        let mut value = ty.bind_page(&driver)?;
        ty.inject_members(value.as_mut(), self)?;
        Ok(value)
    }

    /// Value of a type that must have been bound explicitly
    pub fn bound<T: 'static>(&self) -> VistazoResult<T> {
        let _guard = self.enter(std::any::type_name::<T>())?;
        let binding = self.bindings.get(&TypeId::of::<T>()).ok_or_else(|| {
            VistazoError::construction(std::any::type_name::<T>(), "no binding registered")
        })?;
        downcast::<T>((binding.supplier)(self)?)
    }

    /// Value bound under a name
    pub fn named<T: 'static>(&self, name: &str) -> VistazoResult<T> {
        let binding = self
            .named
            .get(&(name.to_string(), TypeId::of::<T>()))
            .ok_or_else(|| VistazoError::MissingNamed {
                name: name.to_string(),
                type_name: std::any::type_name::<T>().to_string(),
            })?;
        downcast::<T>((binding.supplier)(self)?)
    }

    /// Whether a named value is bound
    #[must_use]
    pub fn has_named<T: 'static>(&self, name: &str) -> bool {
        self.named.contains_key(&(name.to_string(), TypeId::of::<T>()))
    }

    /// Members-only injection pass over an existing value
    pub fn inject_members<T: Injectable>(&self, target: &mut T) -> VistazoResult<()> {
        target.inject_members(self)
    }

    /// Whether `T` has an explicit binding
    #[must_use]
    pub fn is_bound<T: 'static>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    fn enter(&self, type_name: &str) -> VistazoResult<DepthGuard<'_>> {
        let depth = self.depth.get() + 1;
        if depth > MAX_DEPTH {
            return Err(VistazoError::DependencyCycle {
                type_name: type_name.to_string(),
            });
        }
        self.depth.set(depth);
        Ok(DepthGuard(&self.depth))
    }
}

fn downcast<T: 'static>(value: Box<dyn Any>) -> VistazoResult<T> {
    value.downcast::<T>().map(|b| *b).map_err(|_| {
        VistazoError::construction(
            std::any::type_name::<T>(),
            "binding supplied a value of another type",
        )
    })
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bound: Vec<&str> = self.bindings.values().map(|b| b.type_name).collect();
        bound.sort_unstable();
        f.debug_struct("Injector")
            .field("bindings", &bound)
            .field("named", &self.named.keys().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

impl Injectable for DriverHandle {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::new::<Self>()
    }

    fn construct(_injector: &Injector) -> VistazoResult<Self> {
        Err(VistazoError::construction(
            "DriverHandle",
            "no browser session is bound for this invocation",
        ))
    }
}
