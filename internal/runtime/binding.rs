// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Live property bindings.

    A [`Binding`] is attached to one property slot (or one facet of a value type slot) of an
    object. Bindings are created disabled: they are installed on their target while a tree is
    being built and only evaluated once enabled.

    While a binding evaluates, every property read registers the property as a dependency
    of the binding. A later change of a dependency re-evaluates the binding.
*/

use crate::context::ContextRc;
use crate::diagnostics::SourceLocation;
use crate::object::{Object, ObjectRc, ObjectWeak};
use crate::value::Value;
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

scoped_tls_hkt::scoped_thread_local!(static CURRENT_BINDING : for<'a> Option<&'a Binding>);

/// Evaluate a function, but do not register any property dependencies if that function
/// get the value of properties
pub fn evaluate_no_tracking<T>(f: impl FnOnce() -> T) -> T {
    CURRENT_BINDING.set(None, f)
}

/// Return true if there is currently a binding being evaluated so that access to
/// properties register dependencies to that binding.
pub fn is_currently_tracking() -> bool {
    CURRENT_BINDING.is_set() && CURRENT_BINDING.with(|x| x.is_some())
}

/// Registers the property `index` of `object` as a dependency of the binding currently
/// being evaluated, if any.
pub(crate) fn register_dependency(object: &Object, index: usize) {
    if CURRENT_BINDING.is_set() {
        CURRENT_BINDING.with(|cur_binding| {
            if let Some(cur_binding) = cur_binding {
                cur_binding.add_dependency(object, index);
            }
        });
    }
}

pub type BindingEvaluator = Box<dyn Fn() -> Result<Value, String>>;

pub struct Binding {
    target: ObjectWeak,
    property: usize,
    facet: Option<SmolStr>,
    context: ContextRc,
    location: SourceLocation,
    evaluator: BindingEvaluator,
    enabled: Cell<bool>,
    /// Set while the binding evaluates, to detect binding loops
    updating: Cell<bool>,
    removed: Cell<bool>,
    dependencies: RefCell<Vec<(ObjectWeak, usize)>>,
    self_weak: Weak<Binding>,
}

impl Binding {
    pub fn new(
        target: &ObjectRc,
        property: usize,
        facet: Option<SmolStr>,
        context: ContextRc,
        location: SourceLocation,
        evaluator: BindingEvaluator,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            target: Rc::downgrade(target),
            property,
            facet,
            context,
            location,
            evaluator,
            enabled: Cell::new(false),
            updating: Cell::new(false),
            removed: Cell::new(false),
            dependencies: Default::default(),
            self_weak: self_weak.clone(),
        })
    }

    pub fn target(&self) -> Option<ObjectRc> {
        self.target.upgrade()
    }

    pub fn property(&self) -> usize {
        self.property
    }

    pub fn facet(&self) -> Option<&str> {
        self.facet.as_deref()
    }

    pub fn context(&self) -> &ContextRc {
        &self.context
    }

    pub fn location(&self) -> SourceLocation {
        self.location
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.get()
    }

    /// Enabling a binding evaluates it and writes the result to the target
    pub fn set_enabled(&self, enabled: bool) {
        if self.removed.get() || self.enabled.replace(enabled) == enabled {
            return;
        }
        if enabled {
            self.update();
        }
    }

    /// Re-evaluates the binding and writes the result to its target
    pub fn update(&self) {
        if !self.enabled.get() || self.removed.get() {
            return;
        }
        let Some(target) = self.target.upgrade().filter(|t| !t.is_destroyed()) else { return };
        if self.updating.replace(true) {
            log::warn!(
                "{}:{}: Binding loop detected for property \"{}\"",
                self.context.url(),
                self.location,
                self.property_display_name(&target)
            );
            return;
        }
        self.clear_dependencies();
        let result = CURRENT_BINDING.set(Some(self), || (self.evaluator)());
        let result = result.and_then(|value| match &self.facet {
            None => target.write_property(self.property, value).map_err(|e| e.to_string()),
            Some(facet) => {
                target.write_facet(self.property, facet, value).map_err(|e| e.to_string())
            }
        });
        if let Err(message) = result {
            log::warn!("{}:{}: {message}", self.context.url(), self.location);
        }
        self.updating.set(false);
    }

    /// Permanently disconnects the binding from its target and its dependencies
    pub fn remove(&self) {
        self.removed.set(true);
        self.enabled.set(false);
        self.clear_dependencies();
    }

    fn property_display_name(&self, target: &ObjectRc) -> SmolStr {
        let name = target
            .property_cache()
            .property(self.property)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        match &self.facet {
            Some(facet) => smol_str::format_smolstr!("{name}.{facet}"),
            None => name,
        }
    }

    fn add_dependency(&self, object: &Object, index: usize) {
        let mut deps = self.dependencies.borrow_mut();
        if deps.iter().any(|(o, i)| *i == index && std::ptr::eq(o.as_ptr(), object)) {
            return;
        }
        deps.push((object.downgrade(), index));
        drop(deps);
        object.add_observer(index, self.self_weak.clone());
    }

    fn clear_dependencies(&self) {
        let deps = std::mem::take(&mut *self.dependencies.borrow_mut());
        for (object, index) in deps {
            if let Some(object) = object.upgrade() {
                object.remove_observer(index, self);
            }
        }
    }

    /// The number of properties this binding currently depends on
    pub fn dependency_count(&self) -> usize {
        self.dependencies.borrow().len()
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("property", &self.property)
            .field("facet", &self.facet)
            .field("location", &self.location)
            .field("enabled", &self.enabled.get())
            .field("removed", &self.removed.get())
            .finish()
    }
}
