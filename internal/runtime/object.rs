// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
Live objects.

An [`Object`] is an instance of a [`NativeType`] together with its property slots, installed
bindings, signal connections and the declarative side record ([`DeclarativeData`]).

Ownership follows the object tree: an object owns its children through strong handles and
only knows its parent through a weak reference. Property values referencing objects are weak.
*/

use crate::binding::{self, Binding};
use crate::compiled::{CompilationUnit, ObjectIndex};
use crate::context::ContextRc;
use crate::property::{
    AliasTarget, PropertyCache, PropertyData, PropertyFlags, PropertyType, SignalRef,
};
use crate::types::{
    Capabilities, NativeBehavior, NativeType, ParserStatus, PropertyValueInterceptor,
    PropertyValueSource,
};
use crate::value::Value;
use smol_str::{SmolStr, ToSmolStr};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};

pub type ObjectRc = Rc<Object>;
pub type ObjectWeak = Weak<Object>;

/// Error returned when writing a property fails
#[derive(Debug, Clone, PartialEq, derive_more::Error, derive_more::Display)]
#[non_exhaustive]
pub enum SetPropertyError {
    #[display("Object was destroyed")]
    ObjectDestroyed,
    #[display("Cannot assign to non-existent property \"{name}\"")]
    NoSuchProperty { name: SmolStr },
    #[display("Invalid property assignment: \"{name}\" is a read-only property")]
    ReadOnly { name: SmolStr },
    #[display("{message}")]
    WrongType { message: String },
}

pub type SignalHandler = Rc<dyn Fn(&[Value])>;
pub type ObjectFunction = Rc<dyn Fn(&[Value]) -> Result<Value, String>>;

/// Bindings installed on one property slot. A slot holds either one binding for the whole
/// value or a set of facet bindings, at most one per facet.
#[derive(Default)]
enum BindingSlot {
    #[default]
    Empty,
    Whole(Rc<Binding>),
    Facets(Vec<Rc<Binding>>),
}

impl BindingSlot {
    fn into_bindings(self) -> Vec<Rc<Binding>> {
        match self {
            BindingSlot::Empty => Vec::new(),
            BindingSlot::Whole(b) => vec![b],
            BindingSlot::Facets(v) => v,
        }
    }
}

/// Bindings of an object that are applied on demand rather than at creation
pub struct DeferredData {
    pub unit: Rc<CompilationUnit>,
    pub object_index: ObjectIndex,
    pub context: ContextRc,
    pub applied: bool,
}

/// The declarative side record of an object
#[derive(Default)]
pub struct DeclarativeData {
    /// The context the object's own bindings are evaluated in
    pub context: Option<ContextRc>,
    /// The context of the document instantiating the object, when the object is the root of
    /// a composite type
    pub outer_context: Option<ContextRc>,
    pub deferred: Vec<DeferredData>,
    pub attached: Vec<(SmolStr, ObjectRc)>,
    /// Slot claimed in the script wrapper table of the creation that built the object
    pub wrapper_slot: Option<usize>,
    /// `context` belongs to this object and goes away with it
    pub own_context: bool,
    /// The first object of a creation, until the creation is finalized or cleared
    pub root_object_in_creation: bool,
    pub functions: Vec<(SmolStr, ObjectFunction)>,
    pub interceptors: Vec<(usize, ObjectWeak)>,
}

pub struct Object {
    native_type: Rc<NativeType>,
    behavior: Box<dyn NativeBehavior>,
    cache: RefCell<Rc<PropertyCache>>,
    values: RefCell<Vec<Value>>,
    observers: RefCell<Vec<Vec<Weak<Binding>>>>,
    bindings: RefCell<Vec<BindingSlot>>,
    /// One bit per property: a binding was installed during creation and is not enabled yet
    pending: RefCell<Vec<bool>>,
    connections: RefCell<Vec<(SignalRef, SignalHandler)>>,
    children: RefCell<Vec<ObjectRc>>,
    parent: RefCell<ObjectWeak>,
    ddata: RefCell<DeclarativeData>,
    destroyed: Cell<bool>,
    self_weak: ObjectWeak,
}

impl Object {
    /// Instantiates `native_type` with the behavior produced by its factory
    pub fn new(native_type: &Rc<NativeType>) -> ObjectRc {
        Self::with_behavior(native_type, native_type.create_behavior())
    }

    pub fn with_behavior(
        native_type: &Rc<NativeType>,
        behavior: Box<dyn NativeBehavior>,
    ) -> ObjectRc {
        let cache = native_type.property_cache();
        let count = cache.property_count();
        let object = Rc::new_cyclic(|self_weak| Object {
            native_type: native_type.clone(),
            behavior,
            values: RefCell::new(
                cache.properties().iter().map(PropertyData::initial_value).collect(),
            ),
            cache: RefCell::new(cache),
            observers: RefCell::new(vec![Vec::new(); count]),
            bindings: RefCell::new(std::iter::repeat_with(Default::default).take(count).collect()),
            pending: RefCell::new(vec![false; count]),
            connections: Default::default(),
            children: Default::default(),
            parent: Default::default(),
            ddata: Default::default(),
            destroyed: Cell::new(false),
            self_weak: self_weak.clone(),
        });
        object.behavior.initialize(&object);
        object
    }

    pub fn native_type(&self) -> &Rc<NativeType> {
        &self.native_type
    }

    pub fn type_name(&self) -> &str {
        self.native_type.name()
    }

    pub fn behavior(&self) -> &dyn NativeBehavior {
        &*self.behavior
    }

    pub fn downcast_behavior<T: 'static>(&self) -> Option<&T> {
        self.behavior.as_any().downcast_ref()
    }

    pub fn downgrade(&self) -> ObjectWeak {
        self.self_weak.clone()
    }

    pub fn as_rc(&self) -> Option<ObjectRc> {
        self.self_weak.upgrade()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub fn is_root_object_in_creation(&self) -> bool {
        self.ddata.borrow().root_object_in_creation
    }

    pub fn parser_status(&self) -> Option<&dyn ParserStatus> {
        if self.native_type.has_capability(Capabilities::PARSER_STATUS) {
            self.behavior.parser_status()
        } else {
            None
        }
    }

    pub fn value_source(&self) -> Option<&dyn PropertyValueSource> {
        if self.native_type.has_capability(Capabilities::PROPERTY_VALUE_SOURCE) {
            self.behavior.value_source()
        } else {
            None
        }
    }

    pub fn interceptor(&self) -> Option<&dyn PropertyValueInterceptor> {
        if self.native_type.has_capability(Capabilities::PROPERTY_VALUE_INTERCEPTOR) {
            self.behavior.interceptor()
        } else {
            None
        }
    }

    // Property cache

    pub fn property_cache(&self) -> Rc<PropertyCache> {
        self.cache.borrow().clone()
    }

    /// Installs a cache extending the current one with more properties
    pub fn install_property_cache(&self, cache: Rc<PropertyCache>) {
        let count = cache.property_count();
        {
            let mut values = self.values.borrow_mut();
            debug_assert!(count >= values.len(), "a property cache can only be extended");
            let start = values.len();
            values.extend(cache.properties()[start..].iter().map(PropertyData::initial_value));
        }
        self.observers.borrow_mut().resize_with(count, Vec::new);
        self.bindings.borrow_mut().resize_with(count, Default::default);
        self.pending.borrow_mut().resize(count, false);
        *self.cache.borrow_mut() = cache;
    }

    /// Adds a `var` property to this object only
    pub fn add_dynamic_property(&self, name: &str, ty: PropertyType) -> usize {
        let mut cache = self.property_cache().derive();
        let mut data = PropertyData::new(name, ty);
        data.flags.insert(PropertyFlags::DYNAMIC);
        let index = cache.add_property(data);
        self.install_property_cache(Rc::new(cache));
        index
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.cache.borrow().property_index(name)
    }

    pub fn signal(&self, name: &str) -> Option<SignalRef> {
        self.cache.borrow().signal(name)
    }

    // Properties

    /// Reads a property, registering it as a dependency of the binding being evaluated
    pub fn read_property(&self, index: usize) -> Value {
        let cache = self.property_cache();
        let Some(data) = cache.property(index) else { return Value::Undefined };
        binding::register_dependency(self, index);
        if let Some(alias) = &data.alias {
            return match self.resolve_alias(alias) {
                Some((target, Some(index))) => target.read_property(index),
                Some((target, None)) => Value::from_object(&target),
                None => Value::Undefined,
            };
        }
        self.values.borrow().get(index).cloned().unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.property_index(name).map(|i| self.read_property(i))
    }

    /// Imperative write, as done by script assignments: removes the binding of the property
    /// first.
    pub fn set_property(&self, index: usize, value: Value) -> Result<(), SetPropertyError> {
        let data = self.property_data(index)?;
        if !data.is_writable() {
            return Err(SetPropertyError::ReadOnly { name: data.name });
        }
        self.remove_binding(index);
        self.write_property(index, value)
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), SetPropertyError> {
        let index = self
            .property_index(name)
            .ok_or_else(|| SetPropertyError::NoSuchProperty { name: name.into() })?;
        self.set_property(index, value.into())
    }

    /// Writes a property through its interceptor, if any, leaving its bindings in place
    pub fn write_property(&self, index: usize, value: Value) -> Result<(), SetPropertyError> {
        if self.is_destroyed() {
            return Err(SetPropertyError::ObjectDestroyed);
        }
        let data = self.property_data(index)?;
        if let Some(alias) = &data.alias {
            let (target, index) = self.resolve_alias_for_write(alias, &data)?;
            return target.write_property(index, value);
        }
        let value =
            data.ty.coerce(value).map_err(|message| SetPropertyError::WrongType { message })?;
        let interceptor = self
            .ddata
            .borrow()
            .interceptors
            .iter()
            .find(|(i, _)| *i == index)
            .and_then(|(_, o)| o.upgrade())
            .filter(|o| !o.is_destroyed());
        if let Some(object) = interceptor
            && let Some(interceptor) = object.interceptor()
        {
            interceptor.write(&object, value);
            return Ok(());
        }
        self.write_property_direct(index, value).map(|_| ())
    }

    /// Stores a value, bypassing interceptors. Returns whether the value changed.
    pub fn write_property_direct(
        &self,
        index: usize,
        value: Value,
    ) -> Result<bool, SetPropertyError> {
        if self.is_destroyed() {
            return Err(SetPropertyError::ObjectDestroyed);
        }
        let data = self.property_data(index)?;
        if let Some(alias) = &data.alias {
            let (target, index) = self.resolve_alias_for_write(alias, &data)?;
            return target.write_property_direct(index, value);
        }
        let value =
            data.ty.coerce(value).map_err(|message| SetPropertyError::WrongType { message })?;
        {
            let mut values = self.values.borrow_mut();
            let Some(slot) = values.get_mut(index) else {
                return Err(SetPropertyError::NoSuchProperty { name: data.name });
            };
            if *slot == value {
                return Ok(false);
            }
            *slot = value;
        }
        self.notify(index);
        Ok(true)
    }

    /// Writes one facet of a value type property, through the interceptor of the property
    pub fn write_facet(
        &self,
        index: usize,
        facet: &str,
        value: Value,
    ) -> Result<(), SetPropertyError> {
        let whole = self.with_facet(index, facet, value)?;
        self.write_property(index, whole)
    }

    pub fn write_facet_direct(
        &self,
        index: usize,
        facet: &str,
        value: Value,
    ) -> Result<(), SetPropertyError> {
        let whole = self.with_facet(index, facet, value)?;
        self.write_property_direct(index, whole).map(|_| ())
    }

    fn with_facet(
        &self,
        index: usize,
        facet: &str,
        value: Value,
    ) -> Result<Value, SetPropertyError> {
        let data = self.property_data(index)?;
        let facet_type = data.ty.facet_type(facet).ok_or_else(|| SetPropertyError::NoSuchProperty {
            name: smol_str::format_smolstr!("{}.{facet}", data.name),
        })?;
        let value =
            facet_type.coerce(value).map_err(|message| SetPropertyError::WrongType { message })?;
        let current = binding::evaluate_no_tracking(|| self.read_property(index));
        crate::property::facet_set(&current, facet, value).ok_or_else(|| {
            SetPropertyError::NoSuchProperty {
                name: smol_str::format_smolstr!("{}.{facet}", data.name),
            }
        })
    }

    fn property_data(&self, index: usize) -> Result<PropertyData, SetPropertyError> {
        self.cache
            .borrow()
            .property(index)
            .cloned()
            .ok_or_else(|| SetPropertyError::NoSuchProperty { name: index.to_smolstr() })
    }

    /// Resolves an alias to its target object and property, through its declaring context
    pub fn resolve_alias(&self, alias: &AliasTarget) -> Option<(ObjectRc, Option<usize>)> {
        let context = self.ddata.borrow().context.clone()?;
        let target = context.id_object(&alias.object_id)?;
        match &alias.property {
            None => Some((target, None)),
            Some(property) => {
                let index = target.property_index(property)?;
                Some((target, Some(index)))
            }
        }
    }

    /// Follows alias chains down to the property actually storing the value
    pub fn resolve_property(&self, index: usize) -> Option<(ObjectRc, usize)> {
        let mut object = self.as_rc()?;
        let mut index = index;
        for _ in 0..16 {
            let alias = object.cache.borrow().property(index)?.alias.clone();
            match alias {
                None => return Some((object, index)),
                Some(alias) => match object.resolve_alias(&alias)? {
                    (target, Some(target_index)) => {
                        object = target;
                        index = target_index;
                    }
                    (_, None) => return None,
                },
            }
        }
        None
    }

    fn resolve_alias_for_write(
        &self,
        alias: &AliasTarget,
        data: &PropertyData,
    ) -> Result<(ObjectRc, usize), SetPropertyError> {
        match self.resolve_alias(alias) {
            Some((target, Some(index))) => Ok((target, index)),
            Some((_, None)) => Err(SetPropertyError::ReadOnly { name: data.name.clone() }),
            None => Err(SetPropertyError::WrongType {
                message: format!("Invalid alias target location: {}", alias.object_id),
            }),
        }
    }

    fn notify(&self, index: usize) {
        let observers = self.observers.borrow().get(index).cloned().unwrap_or_default();
        for observer in observers {
            if let Some(binding) = observer.upgrade() {
                binding.update();
            }
        }
        self.emit(SignalRef::PropertyChanged(index), &[]);
    }

    pub(crate) fn add_observer(&self, index: usize, binding: Weak<Binding>) {
        if let Some(observers) = self.observers.borrow_mut().get_mut(index) {
            observers.retain(|o| o.strong_count() > 0);
            observers.push(binding);
        }
    }

    pub(crate) fn remove_observer(&self, index: usize, binding: &Binding) {
        if let Some(observers) = self.observers.borrow_mut().get_mut(index) {
            observers.retain(|o| !std::ptr::eq(o.as_ptr(), binding));
        }
    }

    // Bindings

    /// Installs a binding on its property, or on its facet, replacing the bindings it
    /// overlaps with
    pub fn set_binding(&self, binding: Rc<Binding>) {
        let index = binding.property();
        let removed = {
            let mut slots = self.bindings.borrow_mut();
            let Some(slot) = slots.get_mut(index) else { return };
            match binding.facet() {
                None => std::mem::replace(slot, BindingSlot::Whole(binding)).into_bindings(),
                Some(facet) => match slot {
                    BindingSlot::Facets(facets) => {
                        let (same, other): (Vec<_>, Vec<_>) = std::mem::take(facets)
                            .into_iter()
                            .partition(|b| b.facet() == Some(facet));
                        *facets = other;
                        facets.push(binding);
                        same
                    }
                    _ => {
                        std::mem::replace(slot, BindingSlot::Facets(vec![binding])).into_bindings()
                    }
                },
            }
        };
        removed.iter().for_each(|b| b.remove());
    }

    /// Removes every binding of the property. Returns whether there was any.
    pub fn remove_binding(&self, index: usize) -> bool {
        let removed = match self.bindings.borrow_mut().get_mut(index) {
            Some(slot) => std::mem::take(slot).into_bindings(),
            None => return false,
        };
        self.set_pending(index, false);
        removed.iter().for_each(|b| b.remove());
        !removed.is_empty()
    }

    /// Removes the bindings of the given facets, and a binding of the whole value
    pub fn remove_facet_bindings(&self, index: usize, facets: &[&str]) -> bool {
        let removed = {
            let mut slots = self.bindings.borrow_mut();
            let Some(slot) = slots.get_mut(index) else { return false };
            match slot {
                BindingSlot::Empty => Vec::new(),
                BindingSlot::Whole(_) => std::mem::take(slot).into_bindings(),
                BindingSlot::Facets(bindings) => {
                    let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(bindings)
                        .into_iter()
                        .partition(|b| b.facet().is_some_and(|f| facets.contains(&f)));
                    if kept.is_empty() {
                        *slot = BindingSlot::Empty;
                    } else {
                        *bindings = kept;
                    }
                    removed
                }
            }
        };
        removed.iter().for_each(|b| b.remove());
        !removed.is_empty()
    }

    /// The binding of the whole property
    pub fn binding(&self, index: usize) -> Option<Rc<Binding>> {
        match self.bindings.borrow().get(index)? {
            BindingSlot::Whole(b) => Some(b.clone()),
            _ => None,
        }
    }

    pub fn facet_binding(&self, index: usize, facet: &str) -> Option<Rc<Binding>> {
        match self.bindings.borrow().get(index)? {
            BindingSlot::Facets(v) => v.iter().find(|b| b.facet() == Some(facet)).cloned(),
            _ => None,
        }
    }

    pub fn has_binding(&self, index: usize) -> bool {
        !matches!(self.bindings.borrow().get(index), None | Some(BindingSlot::Empty))
    }

    /// Number of bindings installed on this object
    pub fn binding_count(&self) -> usize {
        self.bindings
            .borrow()
            .iter()
            .map(|s| match s {
                BindingSlot::Empty => 0,
                BindingSlot::Whole(_) => 1,
                BindingSlot::Facets(v) => v.len(),
            })
            .sum()
    }

    pub fn set_pending(&self, index: usize, pending: bool) {
        if let Some(bit) = self.pending.borrow_mut().get_mut(index) {
            *bit = pending;
        }
    }

    pub fn is_pending(&self, index: usize) -> bool {
        self.pending.borrow().get(index).copied().unwrap_or(false)
    }

    // Signals

    pub fn connect(&self, signal: SignalRef, handler: impl Fn(&[Value]) + 'static) {
        self.connections.borrow_mut().push((signal, Rc::new(handler)));
    }

    pub fn connection_count(&self, signal: SignalRef) -> usize {
        self.connections.borrow().iter().filter(|(s, _)| *s == signal).count()
    }

    pub fn emit(&self, signal: SignalRef, args: &[Value]) {
        if self.is_destroyed() {
            log::debug!("Signal emitted on destroyed {} ignored", self.type_name());
            return;
        }
        let handlers: Vec<SignalHandler> = self
            .connections
            .borrow()
            .iter()
            .filter(|(s, _)| *s == signal)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(args);
        }
    }

    /// Emits the signal `name`. Returns false if there is no such signal.
    pub fn emit_by_name(&self, name: &str, args: &[Value]) -> bool {
        match self.signal(name) {
            Some(signal) => {
                self.emit(signal, args);
                true
            }
            None => false,
        }
    }

    /// Calls a function declared in a document, or a native method
    pub fn invoke(&self, name: &str, args: &[Value]) -> Option<Result<Value, String>> {
        let function = {
            let ddata = self.ddata.borrow();
            ddata.functions.iter().rev().find(|(n, _)| n == name).map(|(_, f)| f.clone())
        };
        if let Some(function) = function {
            return Some(function(args));
        }
        let this = self.as_rc()?;
        self.behavior.invoke(&this, name, args)
    }

    // Object tree

    /// Makes this object the owner of `child`
    pub fn add_child(&self, child: &ObjectRc) {
        if std::ptr::eq(Rc::as_ptr(child), self) {
            return;
        }
        if let Some(old) = child.parent() {
            old.remove_child(child);
        }
        *child.parent.borrow_mut() = self.self_weak.clone();
        self.children.borrow_mut().push(child.clone());
    }

    pub fn remove_child(&self, child: &ObjectRc) -> bool {
        let mut children = self.children.borrow_mut();
        let len = children.len();
        children.retain(|c| !Rc::ptr_eq(c, child));
        let removed = children.len() != len;
        drop(children);
        if removed {
            *child.parent.borrow_mut() = Weak::new();
        }
        removed
    }

    pub fn children(&self) -> Vec<ObjectRc> {
        self.children.borrow().clone()
    }

    pub fn parent(&self) -> Option<ObjectRc> {
        self.parent.borrow().upgrade()
    }

    // Declarative data

    pub fn declarative_data(&self) -> Ref<'_, DeclarativeData> {
        self.ddata.borrow()
    }

    pub fn declarative_data_mut(&self) -> RefMut<'_, DeclarativeData> {
        self.ddata.borrow_mut()
    }

    pub fn context(&self) -> Option<ContextRc> {
        self.ddata.borrow().context.clone()
    }

    /// Routes writes of the property `index` through `interceptor`
    pub fn add_interceptor(&self, index: usize, interceptor: &ObjectRc) {
        let mut ddata = self.ddata.borrow_mut();
        ddata.interceptors.retain(|(i, _)| *i != index);
        ddata.interceptors.push((index, Rc::downgrade(interceptor)));
    }

    /// The attached object of the attaching type for this object, created on first use.
    /// `None` if the type does not provide attached properties.
    pub fn attached_object(&self, attaching: &NativeType) -> Option<ObjectRc> {
        let attached_type = attaching.attached_type()?;
        if let Some(existing) = self.existing_attached_object(attaching.name()) {
            return Some(existing);
        }
        let attached = Object::new(attached_type);
        *attached.parent.borrow_mut() = self.self_weak.clone();
        self.ddata.borrow_mut().attached.push((attaching.name().into(), attached.clone()));
        Some(attached)
    }

    pub fn existing_attached_object(&self, attaching_name: &str) -> Option<ObjectRc> {
        let ddata = self.ddata.borrow();
        ddata.attached.iter().find(|(n, _)| n == attaching_name).map(|(_, o)| o.clone())
    }

    /// Destroys this object and its children. Attached objects receive their `destruction`
    /// signal first. The object stays allocated while handles to it exist, but it is dead.
    pub fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }
        let attached = std::mem::take(&mut self.ddata.borrow_mut().attached);
        for (_, object) in &attached {
            if let Some(signal) = object.signal("destruction") {
                object.emit(signal, &[]);
            }
        }
        self.destroyed.set(true);
        for (_, object) in attached {
            object.destroy();
        }
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children.iter().rev() {
            child.destroy();
        }
        let slots = std::mem::take(&mut *self.bindings.borrow_mut());
        for binding in slots.into_iter().flat_map(BindingSlot::into_bindings) {
            binding.remove();
        }
        self.observers.borrow_mut().iter_mut().for_each(Vec::clear);
        self.connections.borrow_mut().clear();
        let own_context = {
            let mut ddata = self.ddata.borrow_mut();
            ddata.interceptors.clear();
            ddata.functions.clear();
            ddata.deferred.clear();
            ddata.context.clone().filter(|_| ddata.own_context)
        };
        if let Some(context) = own_context {
            context.invalidate();
        }
        let parent = std::mem::take(&mut *self.parent.borrow_mut());
        if let Some(parent) = parent.upgrade() {
            parent.children.borrow_mut().retain(|c| !std::ptr::eq(Rc::as_ptr(c), self));
        }
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.type_name())
            .field("destroyed", &self.destroyed.get())
            .field("children", &self.children.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::diagnostics::SourceLocation;
    use crate::engine::Engine;

    fn item_type() -> Rc<NativeType> {
        NativeType::builder("Item")
            .property("x", PropertyType::Real)
            .property("y", PropertyType::Real)
            .property("pos", PropertyType::Point)
            .read_only_property("count", PropertyType::Int)
            .signal("moved", &[])
            .build()
    }

    fn binding(
        object: &ObjectRc,
        property: usize,
        facet: Option<&str>,
        f: impl Fn() -> Value + 'static,
    ) -> Rc<Binding> {
        let engine = Engine::new();
        let context = Context::new(Some(engine.root_context()), &engine, "file:///test.qml");
        Binding::new(
            object,
            property,
            facet.map(Into::into),
            context,
            SourceLocation::new(1, 1),
            Box::new(move || Ok(f())),
        )
    }

    #[test]
    fn binding_reevaluates_on_dependency_change() {
        let ty = item_type();
        let a = Object::new(&ty);
        let b = Object::new(&ty);
        let x = a.property_index("x").unwrap();
        let a_weak = Rc::downgrade(&a);
        let bind = binding(&b, x, None, move || {
            Value::Number(a_weak.upgrade().map_or(0., |a| a.read_property(0).to_number()) * 2.)
        });
        b.set_binding(bind.clone());
        assert_eq!(b.get("x"), Some(Value::Number(0.)));
        bind.set_enabled(true);
        a.set("x", 4.).unwrap();
        assert_eq!(b.get("x"), Some(Value::Number(8.)));
        assert_eq!(bind.dependency_count(), 1);

        // an imperative write removes the binding
        b.set("x", 1.).unwrap();
        assert!(bind.is_removed());
        a.set("x", 5.).unwrap();
        assert_eq!(b.get("x"), Some(Value::Number(1.)));
    }

    #[test]
    fn facet_bindings_replace_whole_binding() {
        let ty = item_type();
        let o = Object::new(&ty);
        let pos = o.property_index("pos").unwrap();
        let whole = binding(&o, pos, None, || Value::Point(crate::graphics::Point::new(1., 1.)));
        o.set_binding(whole.clone());
        let fx = binding(&o, pos, Some("x"), || Value::Number(3.));
        o.set_binding(fx.clone());
        assert!(whole.is_removed());
        let fx2 = binding(&o, pos, Some("x"), || Value::Number(4.));
        o.set_binding(fx2.clone());
        assert!(fx.is_removed());
        let fy = binding(&o, pos, Some("y"), || Value::Number(5.));
        o.set_binding(fy.clone());
        assert_eq!(o.binding_count(), 2);
        fx2.set_enabled(true);
        fy.set_enabled(true);
        assert_eq!(o.get("pos"), Some(Value::Point(crate::graphics::Point::new(4., 5.))));
        assert!(o.remove_facet_bindings(pos, &["y"]));
        assert!(fy.is_removed());
        assert!(o.facet_binding(pos, "x").is_some());
    }

    #[test]
    fn read_only_and_signals() {
        let ty = item_type();
        let o = Object::new(&ty);
        assert_eq!(o.set("count", 3), Err(SetPropertyError::ReadOnly { name: "count".into() }));
        assert_eq!(o.set("nope", 3), Err(SetPropertyError::NoSuchProperty { name: "nope".into() }));
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        o.connect(o.signal("xChanged").unwrap(), move |_| h.set(h.get() + 1));
        o.set("x", 1.).unwrap();
        o.set("x", 1.).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn destroy_releases_children() {
        let ty = item_type();
        let parent = Object::new(&ty);
        let child = Object::new(&ty);
        parent.add_child(&child);
        let weak = Rc::downgrade(&child);
        drop(child);
        let child_parent = weak.upgrade().and_then(|c| c.parent());
        assert!(child_parent.is_some_and(|p| Rc::ptr_eq(&p, &parent)));
        parent.destroy();
        assert!(weak.upgrade().is_none());
        assert!(parent.is_destroyed());
        assert_eq!(parent.set("x", 1.), Err(SetPropertyError::ObjectDestroyed));
    }

    #[test]
    fn destroy_invalidates_owned_context() {
        let engine = Engine::new();
        let ty = item_type();
        let owner = Object::new(&ty);
        let guest = Object::new(&ty);
        let owned = Context::new(Some(engine.root_context()), &engine, "file:///owned.qml");
        let shared = Context::new(Some(engine.root_context()), &engine, "file:///shared.qml");
        {
            let mut ddata = owner.declarative_data_mut();
            ddata.context = Some(owned.clone());
            ddata.own_context = true;
        }
        guest.declarative_data_mut().context = Some(shared.clone());
        guest.destroy();
        assert!(shared.is_valid());
        owner.destroy();
        assert!(!owned.is_valid());
    }
}
