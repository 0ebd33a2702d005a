// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
The engine: owner of the type registry, the root context and the configuration.

[`Engine`] is a cheap handle; clones refer to the same engine.
*/

use crate::compiled::CompilationUnit;
use crate::config::EngineConfiguration;
use crate::context::{Context, ContextRc};
use crate::types::{NativeType, TypeRegistry};
use crate::value::Value;
use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};

struct EngineInner {
    registry: RefCell<TypeRegistry>,
    root_context: ContextRc,
    configuration: EngineConfiguration,
    /// Nesting depth of `begin_create` calls currently running on this engine
    creation_depth: Cell<usize>,
    /// Drives asynchronous incubation. Type-erased, the controller lives in the creator crate.
    incubation_controller: RefCell<Option<Rc<dyn Any>>>,
}

#[derive(Clone)]
pub struct Engine(Rc<EngineInner>);

#[derive(Clone, Default)]
pub struct EngineWeak(Weak<EngineInner>);

impl EngineWeak {
    pub fn upgrade(&self) -> Option<Engine> {
        self.0.upgrade().map(Engine)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_configuration(EngineConfiguration::from_env())
    }

    pub fn with_configuration(configuration: EngineConfiguration) -> Self {
        Engine(Rc::new_cyclic(|weak| EngineInner {
            registry: RefCell::new(TypeRegistry::default()),
            root_context: Context::with_engine_weak(None, EngineWeak(weak.clone()), "".into()),
            configuration,
            creation_depth: Cell::new(0),
            incubation_controller: RefCell::new(None),
        }))
    }

    pub fn downgrade(&self) -> EngineWeak {
        EngineWeak(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Engine) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn configuration(&self) -> &EngineConfiguration {
        &self.0.configuration
    }

    /// The context every document context descends from
    pub fn root_context(&self) -> &ContextRc {
        &self.0.root_context
    }

    pub fn registry(&self) -> Ref<'_, TypeRegistry> {
        self.0.registry.borrow()
    }

    pub fn registry_mut(&self) -> RefMut<'_, TypeRegistry> {
        self.0.registry.borrow_mut()
    }

    pub fn register_native_type(&self, ty: Rc<NativeType>) {
        self.registry_mut().register_native(ty);
    }

    pub fn register_composite_type(&self, name: &str, unit: Rc<CompilationUnit>) {
        self.registry_mut().register_composite(name, unit);
    }

    pub fn register_string_converter(
        &self,
        name: &str,
        converter: impl Fn(&str) -> Option<Value> + 'static,
    ) {
        self.registry_mut().register_string_converter(name, converter);
    }

    pub fn creation_depth(&self) -> usize {
        self.0.creation_depth.get()
    }

    /// Enters one level of `begin_create`. The level is left when the guard is dropped.
    pub fn enter_creation(&self) -> CreationDepthGuard {
        self.0.creation_depth.set(self.0.creation_depth.get() + 1);
        CreationDepthGuard(self.clone())
    }

    /// Installs the object driving asynchronous incubation, replacing the previous one
    pub fn set_incubation_controller<T: Any>(&self, controller: Option<Rc<T>>) {
        *self.0.incubation_controller.borrow_mut() = controller.map(|c| c as Rc<dyn Any>);
    }

    pub fn incubation_controller<T: Any>(&self) -> Option<Rc<T>> {
        let controller = self.0.incubation_controller.borrow().clone()?;
        controller.downcast().ok()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("configuration", &self.0.configuration).finish()
    }
}

#[must_use]
pub struct CreationDepthGuard(Engine);

impl Drop for CreationDepthGuard {
    fn drop(&mut self) {
        let depth = &self.0.0.creation_depth;
        depth.set(depth.get().saturating_sub(1));
    }
}

#[test]
fn creation_depth_guard() {
    let engine = Engine::new();
    assert_eq!(engine.creation_depth(), 0);
    {
        let _a = engine.enter_creation();
        let _b = engine.enter_creation();
        assert_eq!(engine.creation_depth(), 2);
    }
    assert_eq!(engine.creation_depth(), 0);
    assert!(engine.root_context().engine().is_some_and(|e| e.ptr_eq(&engine)));

    engine.set_incubation_controller(Some(Rc::new(42u32)));
    assert_eq!(engine.incubation_controller::<u32>().as_deref(), Some(&42));
    assert!(engine.incubation_controller::<String>().is_none());
    engine.set_incubation_controller::<u32>(None);
    assert!(engine.incubation_controller::<u32>().is_none());
}
