//! Provider registry: decides, per type, page binding or container construction.
//!
//! Resolution is two-phase. [`ProviderRegistry::resolve_graph`] scans the test
//! method and class and produces a [`ResolutionPlan`]; the plan is then
//! installed into an [`InjectorBuilder`] before anything is constructed.
//! All per-pass state lives in a [`ResolutionContext`] owned by the
//! invocation.

use crate::base_url::{BaseUrl, BASE_URL_BINDING};
use crate::classifier::classify_memoized;
use crate::descriptor::TypeRef;
use crate::harness::{TestClass, TestMethod};
use crate::inject::{Injector, InjectorBuilder};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::debug;

/// How a type gets built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Bind to the page, then inject members
    PageBinding,
    /// Left to the container
    Container,
}

/// Per-invocation resolution state
#[derive(Debug, Default)]
pub struct ResolutionContext {
    seen: HashSet<TypeId>,
    classified: HashMap<TypeId, bool>,
    classifications: usize,
}

impl ResolutionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify once per pass
    pub fn classify(&mut self, ty: &TypeRef) -> bool {
        let (ui_bound, computed) = classify_memoized(ty, &mut self.classified);
        if computed {
            self.classifications += 1;
            debug!(type_name = ty.name(), ui_bound, "classified");
        }
        ui_bound
    }

    /// Number of classifications actually computed
    pub const fn classification_count(&self) -> usize {
        self.classifications
    }

    /// Whether a page provider was installed for the type this pass
    pub fn is_seen(&self, ty: &TypeRef) -> bool {
        self.seen.contains(&ty.id())
    }

    fn mark_seen(&mut self, ty: &TypeRef) -> bool {
        self.seen.insert(ty.id())
    }
}

/// Outcome of a resolution pass
#[derive(Debug, Clone, Default)]
pub struct ResolutionPlan {
    providers: Vec<TypeRef>,
    base_url: Option<BaseUrl>,
}

impl ResolutionPlan {
    /// Types given a page-binding provider, in discovery order
    pub fn providers(&self) -> &[TypeRef] {
        &self.providers
    }

    pub fn strategy_for(&self, ty: &TypeRef) -> Strategy {
        if self.providers.contains(ty) {
            Strategy::PageBinding
        } else {
            Strategy::Container
        }
    }

    pub const fn base_url(&self) -> Option<&BaseUrl> {
        self.base_url.as_ref()
    }

    /// Register the page providers and the named base URL
    pub fn install_into(&self, builder: &mut InjectorBuilder) {
        for ty in &self.providers {
            let ty = *ty;
            builder.bind_erased(
                ty.id(),
                ty.name(),
                Rc::new(move |injector: &Injector| injector.build_by_page_binding(&ty)),
            );
        }
        if let Some(url) = &self.base_url {
            builder.bind_named(BASE_URL_BINDING, url.clone());
        }
    }
}

/// Computes resolution plans
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Scan the method's parameters (with one level of their injectable fields
    /// and injectable constructor parameters), the class's fixtures likewise,
    /// and the class's fields; install a page provider for each UI-bound type.
    pub fn resolve_graph(
        class: &TestClass,
        method: &TestMethod,
        base_url: Option<BaseUrl>,
        ctx: &mut ResolutionContext,
    ) -> ResolutionPlan {
        let mut plan = ResolutionPlan {
            providers: Vec::new(),
            base_url,
        };

        let fixtures = class
            .fixtures()
            .iter()
            .chain(method.fixtures())
            .map(|f| f.type_ref());
        for ty in method.params().iter().copied().chain(fixtures) {
            Self::consider(&ty, ctx, &mut plan);
            let descriptor = ty.descriptor();
            for field in descriptor.fields().iter().filter(|f| f.injectable) {
                if let Some(field_ty) = field.type_ref {
                    Self::consider(&field_ty, ctx, &mut plan);
                }
            }
            for constructor in descriptor.constructors().iter().filter(|c| c.injectable) {
                for param in &constructor.params {
                    Self::consider(param, ctx, &mut plan);
                }
            }
        }

        for (_, field_ty) in class.fields() {
            Self::consider(field_ty, ctx, &mut plan);
        }
        plan
    }

    fn consider(ty: &TypeRef, ctx: &mut ResolutionContext, plan: &mut ResolutionPlan) {
        if ctx.classify(ty) && ctx.mark_seen(ty) {
            debug!(type_name = ty.name(), "construct using page binding");
            plan.providers.push(*ty);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::descriptor::{ConstructorDescriptor, FieldDescriptor, Marker, TypeDescriptor};
    use crate::driver::{DriverHandle, MockDriver};
    use crate::inject::Injectable;
    use crate::result::{VistazoError, VistazoResult};
    use std::cell::Cell;

    thread_local! {
        static BINDS: Cell<usize> = const { Cell::new(0) };
    }

    #[derive(Debug, Default)]
    struct SearchPage {
        bound: bool,
        injected: Option<String>,
    }

    impl Injectable for SearchPage {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::new::<Self>()
                .field(FieldDescriptor::new("search_field", "Element").marker(Marker::FindBy))
                .field(FieldDescriptor::new("user", "String").injectable())
        }

        fn construct(_: &Injector) -> VistazoResult<Self> {
            Ok(Self::default())
        }

        fn bind_page(_: &DriverHandle) -> VistazoResult<Self> {
            BINDS.with(|b| b.set(b.get() + 1));
            Ok(Self {
                bound: true,
                injected: None,
            })
        }

        fn inject_members(&mut self, injector: &Injector) -> VistazoResult<()> {
            if !self.bound {
                return Err(VistazoError::assertion("members injected before binding"));
            }
            self.injected = Some(injector.named("user")?);
            Ok(())
        }
    }

    struct Service;

    impl Injectable for Service {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::new::<Self>()
        }

        fn construct(_: &Injector) -> VistazoResult<Self> {
            Ok(Self)
        }
    }

    struct Holder;

    impl Injectable for Holder {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::new::<Self>()
                .field(FieldDescriptor::of::<SearchPage>("page").injectable())
                .field(FieldDescriptor::of::<Service>("service").injectable())
                .constructor(ConstructorDescriptor::injectable(vec![TypeRef::of::<SearchPage>()]))
        }

        fn construct(_: &Injector) -> VistazoResult<Self> {
            Ok(Self)
        }
    }

    #[test]
    fn test_repeated_type_installs_one_provider() {
        let method = TestMethod::new("test_twice")
            .param::<SearchPage>()
            .param::<SearchPage>()
            .param::<Service>();
        let mut ctx = ResolutionContext::new();
        let plan = ProviderRegistry::resolve_graph(&TestClass::new("T"), &method, None, &mut ctx);
        assert_eq!(plan.providers(), [TypeRef::of::<SearchPage>()]);
        assert_eq!(ctx.classification_count(), 2);
        assert!(ctx.is_seen(&TypeRef::of::<SearchPage>()));
        assert_eq!(plan.strategy_for(&TypeRef::of::<Service>()), Strategy::Container);
    }

    #[test]
    fn test_one_level_of_injectable_fields_and_constructors() {
        let method = TestMethod::new("test_holder").param::<Holder>();
        let mut ctx = ResolutionContext::new();
        let plan = ProviderRegistry::resolve_graph(&TestClass::new("T"), &method, None, &mut ctx);
        assert_eq!(plan.strategy_for(&TypeRef::of::<SearchPage>()), Strategy::PageBinding);
        assert_eq!(plan.providers().len(), 1);
        // Holder, SearchPage, Service
        assert_eq!(ctx.classification_count(), 3);
    }

    #[test]
    fn test_class_fields_are_scanned() {
        let class = TestClass::new("T").field::<SearchPage>("page");
        let mut ctx = ResolutionContext::new();
        let plan = ProviderRegistry::resolve_graph(&class, &TestMethod::new("m"), None, &mut ctx);
        assert_eq!(plan.providers(), [TypeRef::of::<SearchPage>()]);
    }

    #[test]
    fn test_page_provider_binds_then_injects() {
        let method = TestMethod::new("m").param::<SearchPage>();
        let mut ctx = ResolutionContext::new();
        let base = BaseUrl::parse("http://localhost:8123/").unwrap();
        let plan =
            ProviderRegistry::resolve_graph(&TestClass::new("T"), &method, Some(base), &mut ctx);

        let mut builder = Injector::builder();
        builder
            .bind_instance(DriverHandle::new(MockDriver::new()))
            .bind_named("user", "ada".to_string());
        plan.install_into(&mut builder);
        let injector = builder.build();

        BINDS.with(|b| b.set(0));
        let page: SearchPage = injector.get().unwrap();
        assert!(page.bound);
        assert_eq!(page.injected.as_deref(), Some("ada"));
        assert_eq!(BINDS.with(Cell::get), 1);
        assert_eq!(
            injector.named::<BaseUrl>(BASE_URL_BINDING).unwrap().as_str(),
            "http://localhost:8123/"
        );
    }

    #[test]
    fn test_contexts_are_independent() {
        let method = TestMethod::new("m").param::<SearchPage>();
        let class = TestClass::new("T");
        let mut first = ResolutionContext::new();
        let mut second = ResolutionContext::new();
        ProviderRegistry::resolve_graph(&class, &method, None, &mut first);
        let plan = ProviderRegistry::resolve_graph(&class, &method, None, &mut second);
        assert_eq!(plan.providers().len(), 1);
        assert_eq!(second.classification_count(), 1);
    }
}
