// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
The [`Component`] facade: a compiled document, or an inline `Component { }` of one, that can
be instantiated any number of times.

Creation is split into [`Component::begin_create`], which builds the objects, and
[`Component::complete_create`], which enables their bindings. Between the two, the caller can
set initial property values without them being overwritten by the document's bindings.
*/

use crate::incubator::Incubator;
use crate::interrupt::InstantiationInterrupt;
use crate::object_creator::ObjectCreator;
use i_qmlrt_runtime::builder::UnitBuilder;
use i_qmlrt_runtime::compiled::{CompilationUnit, ObjectIndex};
use i_qmlrt_runtime::context::ContextRc;
use i_qmlrt_runtime::diagnostics::{Diagnostics, SourceLocation};
use i_qmlrt_runtime::engine::{CreationDepthGuard, Engine};
use i_qmlrt_runtime::object::ObjectRc;
use i_qmlrt_runtime::types::{NativeBehavior, TypeEntry};
use i_qmlrt_runtime::value::Value;
use smol_str::SmolStr;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
pub enum ComponentStatus {
    /// No document was set
    #[default]
    Null,
    Ready,
    Loading,
    Error,
}

impl ComponentStatus {
    /// The value of the `status` property of `Component` objects
    pub fn to_int(self) -> i32 {
        match self {
            ComponentStatus::Null => 0,
            ComponentStatus::Ready => 1,
            ComponentStatus::Loading => 2,
            ComponentStatus::Error => 3,
        }
    }
}

/// A creation between `begin_create` and `complete_create`
struct ConstructionState {
    creator: ObjectCreator,
    root: ObjectRc,
    /// Counts this creation in the engine's recursion depth until it completes
    _depth: CreationDepthGuard,
}

struct ComponentInner {
    engine: Engine,
    unit: RefCell<Option<Rc<CompilationUnit>>>,
    /// The `Component { }` object of the unit this component instantiates, if inline
    sub_component: Option<ObjectIndex>,
    /// The context the component was declared in
    creation_context: Option<ContextRc>,
    status: Cell<ComponentStatus>,
    errors: RefCell<Diagnostics>,
    construction: RefCell<Option<ConstructionState>>,
}

impl Drop for ComponentInner {
    fn drop(&mut self) {
        if let Some(mut state) = self.construction.get_mut().take() {
            log::warn!("Component destroyed while its creation was pending completion");
            state.creator.finalize(&InstantiationInterrupt::none());
        }
    }
}

#[derive(Clone)]
pub struct Component(Rc<ComponentInner>);

impl Component {
    fn with(
        engine: &Engine,
        unit: Option<Rc<CompilationUnit>>,
        sub_component: Option<ObjectIndex>,
        creation_context: Option<ContextRc>,
    ) -> Self {
        let status = if unit.is_some() { ComponentStatus::Ready } else { ComponentStatus::Null };
        Component(Rc::new(ComponentInner {
            engine: engine.clone(),
            unit: RefCell::new(unit),
            sub_component,
            creation_context,
            status: Cell::new(status),
            errors: Default::default(),
            construction: Default::default(),
        }))
    }

    /// A component without document
    pub fn new(engine: &Engine) -> Self {
        Self::with(engine, None, None, None)
    }

    pub fn from_unit(engine: &Engine, unit: Rc<CompilationUnit>) -> Self {
        Self::with(engine, Some(unit), None, None)
    }

    /// The inline component `component` of `unit`, declared in `context`
    pub fn inline(
        engine: &Engine,
        unit: Rc<CompilationUnit>,
        component: ObjectIndex,
        context: ContextRc,
    ) -> Self {
        Self::with(engine, Some(unit), Some(component), Some(context))
    }

    /// A component instantiating the registered type `type_name`
    pub fn from_type_name(engine: &Engine, type_name: &str) -> Option<Self> {
        let entry = engine.registry().lookup(type_name)?;
        match entry {
            TypeEntry::Composite(unit) => Some(Self::from_unit(engine, unit)),
            TypeEntry::Native(ty) => {
                let unit = UnitBuilder::new(&format!("type:{}", ty.name())).root(ty.name(), |_| {});
                Some(Self::from_unit(engine, unit))
            }
            TypeEntry::CompositeSingleton(_) => None,
        }
    }

    /// The component behind a `Component` object
    pub fn from_object(object: &ObjectRc) -> Option<Self> {
        object.downcast_behavior::<ComponentBehavior>().map(|b| b.component.clone())
    }

    pub fn engine(&self) -> &Engine {
        &self.0.engine
    }

    /// Sets the document, once it finished loading
    pub fn set_unit(&self, unit: Rc<CompilationUnit>) {
        *self.0.unit.borrow_mut() = Some(unit);
        self.0.errors.borrow_mut().clear();
        self.0.status.set(ComponentStatus::Ready);
    }

    pub fn set_loading(&self) {
        self.0.status.set(ComponentStatus::Loading);
    }

    /// Loading the document failed
    pub fn set_load_errors(&self, mut errors: Diagnostics) {
        self.0.errors.borrow_mut().append(&mut errors);
        self.0.status.set(ComponentStatus::Error);
    }

    pub fn status(&self) -> ComponentStatus {
        if self.0.errors.borrow().has_errors() {
            ComponentStatus::Error
        } else {
            self.0.status.get()
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ComponentStatus::Ready
    }

    pub fn errors(&self) -> Diagnostics {
        self.0.errors.borrow().clone()
    }

    pub fn url(&self) -> SmolStr {
        self.0.unit.borrow().as_ref().map(|u| u.url.clone()).unwrap_or_default()
    }

    pub fn unit(&self) -> Option<Rc<CompilationUnit>> {
        self.0.unit.borrow().clone()
    }

    pub fn sub_component(&self) -> Option<ObjectIndex> {
        self.0.sub_component
    }

    pub fn creation_context(&self) -> Option<&ContextRc> {
        self.0.creation_context.as_ref()
    }

    /// The context instances are created in, unless the caller provides one
    pub(crate) fn default_context(&self) -> ContextRc {
        self.0.creation_context.clone().unwrap_or_else(|| self.0.engine.root_context().clone())
    }

    pub(crate) fn push_error(&self, message: impl Into<String>) {
        let url = self.url();
        self.0.errors.borrow_mut().push_error(message.into(), &url, SourceLocation::default());
    }

    pub(crate) fn append_errors(&self, errors: &mut Diagnostics) {
        self.0.errors.borrow_mut().append(errors);
    }

    /// The document to instantiate in `context`, or why no creation can start there. The
    /// recursion depth only limits creations running on the call stack.
    pub(crate) fn check_creatable(
        &self,
        context: &ContextRc,
        check_depth: bool,
    ) -> Result<Rc<CompilationUnit>, &'static str> {
        let unit =
            self.0.unit.borrow().clone().filter(|_| self.0.status.get() == ComponentStatus::Ready);
        let Some(unit) = unit else { return Err("Component is not ready") };
        if !context.is_valid() {
            return Err("Cannot create a component in an invalid context");
        }
        let max_depth = self.0.engine.configuration().max_recursion_depth;
        if check_depth && self.0.engine.creation_depth() >= max_depth {
            return Err("Component creation is recursing - aborting");
        }
        Ok(unit)
    }

    /// Instantiates the objects of the component without enabling their bindings. Must be
    /// followed by [`Self::complete_create`].
    pub fn begin_create(&self, context: Option<&ContextRc>) -> Option<ObjectRc> {
        if self.0.construction.borrow().is_some() {
            log::warn!(
                "{}: begin_create called while a creation is pending completion",
                self.url()
            );
            return None;
        }
        if self.0.status.get() == ComponentStatus::Ready {
            self.0.errors.borrow_mut().clear();
        }
        let context = context.cloned().unwrap_or_else(|| self.default_context());
        let unit = match self.check_creatable(&context, true) {
            Ok(unit) => unit,
            Err(message) => {
                self.push_error(message);
                return None;
            }
        };

        let depth = self.0.engine.enter_creation();
        let mut creator = ObjectCreator::new(&self.0.engine, unit, Some(context));
        let root = creator.create(self.0.sub_component, None, &InstantiationInterrupt::none());
        let Some(root) = root else {
            self.append_errors(&mut creator.take_errors());
            creator.clear();
            return None;
        };
        *self.0.construction.borrow_mut() =
            Some(ConstructionState { creator, root: root.clone(), _depth: depth });
        Some(root)
    }

    /// Enables the bindings of the objects created by [`Self::begin_create`]
    pub fn complete_create(&self) -> Option<ObjectRc> {
        let mut state = self.0.construction.borrow_mut().take()?;
        state.creator.finalize(&InstantiationInterrupt::none());
        self.append_errors(&mut state.creator.take_errors());
        Some(state.root)
    }

    pub fn create(&self, context: Option<&ContextRc>) -> Option<ObjectRc> {
        self.begin_create(context)?;
        self.complete_create()
    }

    /// Creates an instance, setting `properties` before the bindings are enabled.
    ///
    /// Properties that cannot be set are reported as warnings in [`Self::errors`].
    pub fn create_with_initial_properties(
        &self,
        properties: &[(&str, Value)],
        context: Option<&ContextRc>,
    ) -> Option<ObjectRc> {
        let root = self.begin_create(context)?;
        let url = self.url();
        for (name, value) in properties {
            let result = match root.property_index(name) {
                Some(index) => {
                    root.remove_binding(index);
                    root.write_property(index, value.clone()).map_err(|e| e.to_string())
                }
                None => Err(format!("no property \"{name}\"")),
            };
            if let Err(e) = result {
                self.0.errors.borrow_mut().push_warning(
                    format!("Could not set initial property {name}: {e}"),
                    &url,
                    SourceLocation::default(),
                );
            }
        }
        self.complete_create()
    }

    /// Starts an incubation of this component with `incubator`
    pub fn incubate(&self, incubator: &Incubator, context: Option<&ContextRc>) {
        incubator.start(self, context);
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("url", &self.url())
            .field("sub_component", &self.0.sub_component)
            .field("status", &self.status())
            .finish()
    }
}

/// The native state of `Component` objects
pub struct ComponentBehavior {
    component: Component,
}

impl ComponentBehavior {
    pub fn new(component: Component) -> Self {
        Self { component }
    }

    pub fn component(&self) -> &Component {
        &self.component
    }
}

impl NativeBehavior for ComponentBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn initialize(&self, object: &ObjectRc) {
        let values = [
            ("status", Value::Number(self.component.status().to_int() as f64)),
            ("url", Value::String(self.component.url())),
        ];
        for (name, value) in values {
            if let Some(index) = object.property_index(name) {
                let _ = object.write_property_direct(index, value);
            }
        }
    }

    fn invoke(
        &self,
        object: &ObjectRc,
        method: &str,
        args: &[Value],
    ) -> Option<Result<Value, String>> {
        if method != "createObject" {
            return None;
        }
        let parent = args.first().and_then(Value::as_object);
        let Some(created) = self.component.create(None) else {
            return Some(Err(self.component.errors().to_string_vec().join("\n")));
        };
        // without parent, the component object owns the instance
        parent.as_ref().unwrap_or(object).add_child(&created);
        Some(Ok(Value::from_object(&created)))
    }
}
