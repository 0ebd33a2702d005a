// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
The object creator: instantiates the object tree of a compiled unit in two phases.

The creation phase ([`ObjectCreator::create`]) walks the compiled objects depth-first,
instantiates them, registers their ids, writes literal values and installs (disabled)
bindings and signal handlers. Nothing written by the document is evaluated yet.

The finalize phase ([`ObjectCreator::finalize`]) then enables every binding, calls
`component_complete` on the objects with parser status, runs the finalize callbacks and
emits `Component.completed`. Both phases can be interrupted and resumed.

Composite types (types defined by another document) are expanded by a nested creator that
shares the [`SharedState`] of the top-level creation.
*/

use crate::component::{Component, ComponentBehavior};
use crate::eval::{self, EvalScope};
use crate::interrupt::InstantiationInterrupt;
use crate::shared_state::SharedState;
use crate::value_assign;
use i_qmlrt_runtime::binding::{Binding, BindingEvaluator, evaluate_no_tracking};
use i_qmlrt_runtime::compiled::{
    BindingValue, CompilationUnit, CompiledBinding, CompiledObject, ObjectIndex, ScriptIndex,
};
use i_qmlrt_runtime::context::{Context, ContextRc};
use i_qmlrt_runtime::diagnostics::{Diagnostics, SourceLocation};
use i_qmlrt_runtime::engine::Engine;
use i_qmlrt_runtime::object::{DeferredData, Object, ObjectFunction, ObjectRc};
use i_qmlrt_runtime::property::{
    PropertyData, PropertyFlags, PropertyType, SignalData, SignalParameter, SignalRef,
};
use i_qmlrt_runtime::types::{COMPONENT_TYPE_NAME, FinalizeHooks, PropertyRef, TypeEntry};
use i_qmlrt_runtime::value::{ScriptString, Value};
use itertools::Itertools as _;
use smol_str::SmolStr;
use std::rc::Rc;

/// The phases of a creation, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Phase {
    Startup,
    CreatingObjects,
    /// The objects exist, the creation was interrupted before reporting them
    CreatingObjectsPhase2,
    ObjectsCreated,
    Finalizing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingPass {
    Immediate,
    Deferred,
}

/// What the bindings of one compiled object are applied to
#[derive(Clone)]
struct Frame {
    index: ObjectIndex,
    /// Receives the bindings
    instance: ObjectRc,
    /// Unqualified names in scripts resolve against this object
    scope: ObjectRc,
    context: ContextRc,
    /// Set for group bindings on a value type property: the bindings address facets of it
    value_type: Option<usize>,
}

/// The list property being appended to by a run of consecutive object bindings
struct ListRun {
    object: ObjectRc,
    property: usize,
    items: Vec<Value>,
}

impl ListRun {
    fn appends_to(&self, object: &ObjectRc, property: usize) -> bool {
        self.property == property && Rc::ptr_eq(&self.object, object)
    }
}

pub struct ObjectCreator {
    phase: Phase,
    engine: Engine,
    unit: Rc<CompilationUnit>,
    parent_context: Option<ContextRc>,
    context: Option<ContextRc>,
    shared: Rc<SharedState>,
    is_top_level: bool,
    /// Number of creators expanding composite types above this one
    composite_depth: usize,
    errors: Diagnostics,
}

impl ObjectCreator {
    /// A top-level creator for `unit`, creating its objects in a child context of
    /// `parent_context`
    pub fn new(
        engine: &Engine,
        unit: Rc<CompilationUnit>,
        parent_context: Option<ContextRc>,
    ) -> Self {
        let shared = SharedState::new(unit.object_count(), unit.binding_count);
        Self {
            phase: Phase::Startup,
            engine: engine.clone(),
            unit,
            parent_context,
            context: None,
            shared,
            is_top_level: true,
            composite_depth: 0,
            errors: Diagnostics::default(),
        }
    }

    fn new_nested(
        parent: &ObjectCreator,
        unit: Rc<CompilationUnit>,
        parent_context: ContextRc,
    ) -> Self {
        Self {
            phase: Phase::Startup,
            engine: parent.engine.clone(),
            unit,
            parent_context: Some(parent_context),
            context: None,
            shared: parent.shared.clone(),
            is_top_level: false,
            composite_depth: parent.composite_depth + 1,
            errors: Diagnostics::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn errors(&self) -> &Diagnostics {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Diagnostics {
        std::mem::take(&mut self.errors)
    }

    pub fn shared(&self) -> &Rc<SharedState> {
        &self.shared
    }

    /// The context opened by [`Self::create`]
    pub fn context(&self) -> Option<&ContextRc> {
        self.context.as_ref()
    }

    pub fn unit(&self) -> &Rc<CompilationUnit> {
        &self.unit
    }

    fn set_phase(&mut self, phase: Phase) {
        log::debug!("{}: creation phase {} -> {}", self.unit.url, self.phase, phase);
        self.phase = phase;
    }

    fn record_error(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.errors.push_error(message.into(), &self.unit.url, location);
    }

    /// Instantiates the root object of the unit, or of the inline component `sub_component`.
    ///
    /// Returns `None` on failure, with [`Self::errors`] filled, or when `interrupt` asked to
    /// yield once the objects exist. In the latter case, calling `create` again returns the
    /// already built root.
    pub fn create(
        &mut self,
        sub_component: Option<ObjectIndex>,
        parent: Option<&ObjectRc>,
        interrupt: &InstantiationInterrupt,
    ) -> Option<ObjectRc> {
        if self.phase == Phase::CreatingObjectsPhase2 {
            self.set_phase(Phase::ObjectsCreated);
            return self.context.as_ref().and_then(|c| c.context_object());
        }
        debug_assert_eq!(self.phase, Phase::Startup);
        if self.phase != Phase::Startup {
            return None;
        }
        self.set_phase(Phase::CreatingObjects);

        let unit = self.unit.clone();
        let Some(parent_context) = self.parent_context.clone().filter(|c| c.is_valid()) else {
            self.record_error(
                SourceLocation::default(),
                "Cannot create objects without a valid parent context",
            );
            self.set_phase(Phase::Done);
            return None;
        };
        let root = match sub_component {
            None => unit.root_index(),
            Some(component) => match unit.component_root(component) {
                Some(root) => root,
                None => {
                    self.record_error(SourceLocation::default(), "Invalid inline component");
                    self.set_phase(Phase::Done);
                    return None;
                }
            },
        };

        let context = Context::new(Some(&parent_context), &self.engine, unit.url.clone());
        self.shared.claim_root_context(&context);
        if let Some(scope) = unit.id_scope(root) {
            context.set_id_names(scope.ids.iter().map(|(name, _)| name.clone()));
        }
        if sub_component.is_none() {
            context.set_imported_scripts(unit.imported_scripts.clone());
        }
        self.context = Some(context.clone());

        if self.is_top_level {
            self.shared.allocate_wrappers(unit.object_count());
        }
        let instance = self.create_instance(root, parent, &context, true);
        if self.is_top_level {
            self.shared.release_wrappers();
        }

        self.set_phase(Phase::CreatingObjectsPhase2);
        if instance.is_some() && interrupt.should_interrupt() {
            return None;
        }
        self.set_phase(Phase::ObjectsCreated);
        instance
    }

    fn create_instance(
        &mut self,
        index: ObjectIndex,
        parent: Option<&ObjectRc>,
        context: &ContextRc,
        is_context_object: bool,
    ) -> Option<ObjectRc> {
        let unit = self.unit.clone();
        let compiled = unit.object(index);
        log::trace!("{}:{}: instantiating {}", unit.url, compiled.location, compiled.type_name);

        let mut is_composite = false;
        let instance = if compiled.is_component() {
            let Some(ty) = self.engine.registry().native_type(COMPONENT_TYPE_NAME) else {
                self.record_error(compiled.location, "Component is not a type");
                return None;
            };
            let component = Component::inline(&self.engine, unit.clone(), index, context.clone());
            Object::with_behavior(&ty, Box::new(ComponentBehavior::new(component)))
        } else {
            let entry = self.engine.registry().lookup(&compiled.type_name);
            match entry {
                None => {
                    self.record_error(
                        compiled.location,
                        format!("{} is not a type", compiled.type_name),
                    );
                    return None;
                }
                Some(TypeEntry::Native(ty)) => {
                    if let Some(reason) = ty.not_creatable_reason() {
                        self.record_error(compiled.location, reason);
                        return None;
                    }
                    if ty.is_singleton() {
                        self.record_error(
                            compiled.location,
                            format!("Unable to create object of singleton type {}", ty.name()),
                        );
                        return None;
                    }
                    Object::new(&ty)
                }
                Some(TypeEntry::CompositeSingleton(_)) => {
                    self.record_error(
                        compiled.location,
                        format!("Composite Singleton Type {} is not creatable", compiled.type_name),
                    );
                    return None;
                }
                Some(TypeEntry::Composite(sub_unit)) => {
                    if self.composite_depth >= self.engine.configuration().max_composite_nesting {
                        self.record_error(
                            compiled.location,
                            format!("Type {} is instantiated recursively", compiled.type_name),
                        );
                        return None;
                    }
                    let mut sub_creator =
                        ObjectCreator::new_nested(self, sub_unit, context.clone());
                    let instance =
                        sub_creator.create(None, parent, &InstantiationInterrupt::none());
                    self.errors.append(&mut sub_creator.errors);
                    let instance = instance?;
                    is_composite = true;
                    instance
                }
            }
        };

        if !is_composite {
            self.shared.mark_root_object(&instance);
            if let Some(parent) = parent {
                parent.add_child(&instance);
            }
            self.shared.push_created_object(&instance);
        }
        self.link_to_context(&instance, &context, is_context_object);
        if let Some(slot) = compiled.id_index {
            context.set_id_object(slot, &instance);
        }

        if !is_composite && let Some(status) = instance.parser_status() {
            let mut hooks = FinalizeHooks::default();
            status.class_begin(&instance, &mut hooks);
            self.shared.add_finalize_callbacks(hooks.take());
            self.shared.push_parser_status(&instance);
        }

        if is_context_object {
            context.set_context_object(&instance);
        }

        if compiled.has_custom_parser_bindings()
            && let Some(parser) = instance.native_type().custom_parser().cloned()
        {
            let bindings = compiled
                .bindings
                .iter()
                .filter(|b| b.is_custom_parser_binding())
                .collect::<Vec<_>>();
            if let Err(mut errors) = parser.apply_bindings(&instance, &unit, &bindings) {
                self.errors.append(&mut errors);
                return None;
            }
        }

        if compiled.is_component() {
            return Some(instance);
        }

        if !is_composite && let Some(slot) = self.shared.claim_wrapper(&instance) {
            instance.declarative_data_mut().wrapper_slot = Some(slot);
        }

        let frame = Frame {
            index,
            instance: instance.clone(),
            scope: instance.clone(),
            context: context.clone(),
            value_type: None,
        };
        self.populate_instance(&frame).then_some(instance)
    }

    /// Registers `instance` with the context it was created in. The root of a creation owns
    /// its context: a composite root already owns the context of its own document, which
    /// then takes the instantiating context along.
    fn link_to_context(&self, instance: &ObjectRc, context: &ContextRc, is_root: bool) {
        let is_root = is_root || instance.is_root_object_in_creation();
        let mut ddata = instance.declarative_data_mut();
        match ddata.context.clone() {
            Some(own) => {
                if is_root {
                    own.link_context(context);
                }
                ddata.outer_context = Some(context.clone());
            }
            None => {
                ddata.context = Some(context.clone());
                ddata.own_context = is_root;
                drop(ddata);
                context.add_object(instance);
            }
        }
    }

    fn populate_instance(&mut self, frame: &Frame) -> bool {
        let unit = self.unit.clone();
        let compiled = unit.object(frame.index);

        if compiled.has_declarations() {
            install_declarations(compiled, &frame.instance);
        }

        if compiled.has_deferred_bindings() {
            frame.instance.declarative_data_mut().deferred.push(DeferredData {
                unit: unit.clone(),
                object_index: frame.index,
                context: frame.context.clone(),
                applied: false,
            });
        }

        for function in &compiled.functions {
            let this = Rc::downgrade(&frame.instance);
            let context = frame.context.clone();
            let unit = unit.clone();
            let parameters = function.parameters.clone();
            let body = function.body;
            let function_impl: ObjectFunction = Rc::new(move |args: &[Value]| {
                let scope = EvalScope::new(context.clone(), this.upgrade())
                    .with_parameters(&parameters, args);
                eval::eval_expression(&unit.script(body).expression, &scope)
                    .map_err(|e| e.to_string())
            });
            frame
                .instance
                .declarative_data_mut()
                .functions
                .push((function.name.clone(), function_impl));
        }

        self.setup_bindings(frame, BindingPass::Immediate)
    }

    /// Applies the bindings of the compiled object of `frame`. Returns false if any of them
    /// failed.
    fn setup_bindings(&mut self, frame: &Frame, pass: BindingPass) -> bool {
        let unit = self.unit.clone();
        let compiled = unit.object(frame.index);
        let error_count = self.errors.len();

        if pass == BindingPass::Immediate
            && frame.value_type.is_none()
            && let Some(id) = &compiled.id
            && let Some((index, data)) = frame.instance.property_cache().find_property("id")
            && data.is_writable()
            && data.ty == PropertyType::String
        {
            let _ = frame.instance.write_property(index, Value::String(id.clone()));
        }

        if let Some(property) = frame.value_type {
            let facets =
                compiled.bindings.iter().map(|b| b.property_name.as_str()).collect::<Vec<_>>();
            frame.instance.remove_facet_bindings(property, &facets);
        }

        let mut postponed = Vec::new();
        let mut list_run = None;
        for binding in &compiled.bindings {
            if binding.is_custom_parser_binding() {
                continue;
            }
            if binding.is_deferred() != (pass == BindingPass::Deferred) {
                continue;
            }
            if self.targets_alias(frame, binding) {
                postponed.push(binding);
                continue;
            }
            self.set_property_binding(frame, binding, &mut list_run);
        }
        // alias targets may be objects created by the bindings above
        for binding in postponed {
            self.set_property_binding(frame, binding, &mut list_run);
        }

        self.errors.len() == error_count
    }

    fn targets_alias(&self, frame: &Frame, binding: &CompiledBinding) -> bool {
        frame.value_type.is_none()
            && !binding.is_signal_handler()
            && !matches!(binding.value, BindingValue::AttachedProperty(_))
            && frame
                .instance
                .property_cache()
                .find_property(&binding.property_name)
                .is_some_and(|(_, data)| data.is_alias())
    }

    fn set_property_binding(
        &mut self,
        frame: &Frame,
        binding: &CompiledBinding,
        list_run: &mut Option<ListRun>,
    ) {
        if let BindingValue::AttachedProperty(index) = binding.value {
            self.set_attached_bindings(frame, binding, index);
            return;
        }
        if let Some(property) = frame.value_type {
            self.set_facet_binding(frame, property, binding);
            return;
        }
        if binding.is_signal_handler() {
            self.set_signal_handler(frame, binding);
            return;
        }

        let instance = &frame.instance;
        let name = &binding.property_name;
        let cache = instance.property_cache();
        let resolved =
            if name.is_empty() { cache.default_property() } else { cache.find_property(name) };
        let (index, data) = match resolved.map(|(i, d)| (i, d.clone())) {
            Some(resolved) => resolved,
            None => {
                if let BindingValue::Object(object_index) = binding.value
                    && let Some(signal) = cache.handler_signal(name)
                {
                    self.connect_default_method(frame, binding, signal, object_index);
                    return;
                }
                if !name.is_empty() && instance.native_type().is_fully_dynamic() {
                    let index = instance.add_dynamic_property(name, PropertyType::Var);
                    (index, PropertyData::new(name.clone(), PropertyType::Var))
                } else {
                    let message = if name.is_empty() {
                        "Cannot assign to non-existent default property".to_string()
                    } else {
                        format!("Cannot assign to non-existent property \"{name}\"")
                    };
                    self.record_error(binding.location, message);
                    return;
                }
            }
        };
        let declared_here = unit_declares(self.unit.object(frame.index), &data.name);
        let read_only = !data.is_writable() && !declared_here && !data.ty.is_list();

        if let BindingValue::GroupProperty(group_index) = binding.value {
            self.set_group_bindings(frame, binding, index, &data, group_index);
            return;
        }

        if !binding.is_on_assignment() && instance.is_pending(index) {
            instance.remove_binding(index);
        }

        if data.ty == PropertyType::ScriptString {
            self.set_script_string(frame, binding, index);
            return;
        }

        match binding.value {
            BindingValue::Object(object_index) => {
                let created =
                    self.create_instance(object_index, Some(instance), &frame.context, false);
                let Some(created) = created else {
                    return;
                };
                if binding.is_on_assignment() {
                    self.set_on_assignment(frame, binding, index, &created);
                    return;
                }
                if read_only {
                    self.record_error(binding.location, read_only_message(&data.name));
                    return;
                }
                self.assign_object(frame, binding, index, &data, &created, list_run);
            }
            BindingValue::Script(script) => {
                if read_only {
                    self.record_error(binding.location, read_only_message(&data.name));
                    return;
                }
                let evaluator = script_evaluator(&self.unit, script, frame);
                let live = Binding::new(
                    instance,
                    index,
                    None,
                    frame.context.clone(),
                    binding.location,
                    evaluator,
                );
                instance.set_binding(live.clone());
                instance.set_pending(index, true);
                self.shared.push_binding(live);
            }
            _ => {
                if read_only {
                    self.record_error(binding.location, read_only_message(&data.name));
                    return;
                }
                self.set_property_value(frame, binding, index, &data);
            }
        }
    }

    /// Writes a literal to a property
    fn set_property_value(
        &mut self,
        frame: &Frame,
        binding: &CompiledBinding,
        index: usize,
        data: &PropertyData,
    ) {
        if data.ty.is_list() {
            self.record_error(binding.location, "Cannot assign primitives to lists");
            return;
        }
        let target_type = match data.is_alias() {
            true => frame
                .instance
                .resolve_property(index)
                .and_then(|(target, i)| target.property_cache().property(i).map(|d| d.ty.clone()))
                .unwrap_or(PropertyType::Var),
            false => data.ty.clone(),
        };
        let result =
            value_assign::convert_literal(&self.engine, &self.unit.url, &target_type, binding)
                .and_then(|value| {
                    frame.instance.write_property(index, value).map_err(|e| e.to_string())
                });
        if let Err(message) = result {
            self.record_error(binding.location, message);
        }
    }

    fn set_script_string(&mut self, frame: &Frame, binding: &CompiledBinding, index: usize) {
        let (script, script_index, literal) = match &binding.value {
            BindingValue::Script(i) => {
                let script = self.unit.script(*i);
                (script.source.clone(), Some(*i), script.expression.as_literal())
            }
            value if value.is_literal() => {
                (value.literal_source().unwrap_or_default(), None, value.literal())
            }
            _ => {
                self.record_error(binding.location, "Cannot assign object to property");
                return;
            }
        };
        let value = ScriptString {
            script,
            script_index,
            context: Some(Rc::downgrade(&frame.context)),
            scope: Some(Rc::downgrade(&frame.scope)),
            literal: literal.map(Box::new),
            line: binding.location.line,
            column: binding.location.column,
        };
        if let Err(e) = frame.instance.write_property(index, Value::ScriptString(value)) {
            self.record_error(binding.location, e.to_string());
        }
    }

    fn set_signal_handler(&mut self, frame: &Frame, binding: &CompiledBinding) {
        let cache = frame.instance.property_cache();
        let Some(signal) = cache.handler_signal(&binding.property_name) else {
            self.record_error(
                binding.location,
                format!("Cannot assign to non-existent property \"{}\"", binding.property_name),
            );
            return;
        };
        let BindingValue::Script(script) = binding.value else {
            self.record_error(
                binding.location,
                "Cannot assign a value to a signal (expecting a script to be run)",
            );
            return;
        };
        let parameters = cache
            .signal_parameters(signal)
            .iter()
            .map(|p| p.name.clone())
            .collect::<Vec<SmolStr>>();
        let scope = Rc::downgrade(&frame.scope);
        let context = frame.context.clone();
        let unit = self.unit.clone();
        let location = binding.location;
        frame.instance.connect(signal, move |args| {
            let Some(scope_object) = scope.upgrade() else { return };
            let eval_scope = EvalScope::new(context.clone(), Some(scope_object))
                .with_parameters(&parameters, args);
            if let Err(e) = eval::eval_expression(&unit.script(script).expression, &eval_scope) {
                log::warn!("{}:{location}: {e}", unit.url);
            }
        });
    }

    fn set_attached_bindings(
        &mut self,
        frame: &Frame,
        binding: &CompiledBinding,
        index: ObjectIndex,
    ) {
        let attaching = self.engine.registry().native_type(&binding.property_name);
        let Some(attached) = attaching.and_then(|ty| frame.instance.attached_object(&ty)) else {
            self.record_error(binding.location, "Non-existent attached object");
            return;
        };
        if binding.property_name == COMPONENT_TYPE_NAME {
            self.shared.push_component_attached(&attached);
        }
        let sub_frame = Frame {
            index,
            instance: attached,
            scope: frame.scope.clone(),
            context: frame.context.clone(),
            value_type: None,
        };
        self.populate_instance(&sub_frame);
    }

    fn set_group_bindings(
        &mut self,
        frame: &Frame,
        binding: &CompiledBinding,
        index: usize,
        data: &PropertyData,
        group_index: ObjectIndex,
    ) {
        let (owner, owner_index) = match data.is_alias() {
            true => match frame.instance.resolve_property(index) {
                Some(resolved) => resolved,
                None => {
                    self.record_error(
                        binding.location,
                        format!("Invalid alias target location: {}", data.name),
                    );
                    return;
                }
            },
            false => (frame.instance.clone(), index),
        };
        let owner_type = owner.property_cache().property(owner_index).map(|d| d.ty.clone());
        if owner_type.as_ref().is_some_and(PropertyType::is_value_type) {
            let sub_frame = Frame {
                index: group_index,
                instance: owner,
                scope: frame.scope.clone(),
                context: frame.context.clone(),
                value_type: Some(owner_index),
            };
            self.setup_bindings(&sub_frame, BindingPass::Immediate);
            return;
        }
        let target = evaluate_no_tracking(|| owner.read_property(owner_index)).as_object();
        let Some(target) = target else {
            self.record_error(
                binding.location,
                format!("Cannot set properties on {} as it is null", binding.property_name),
            );
            return;
        };
        let sub_frame = Frame {
            index: group_index,
            instance: target,
            scope: frame.scope.clone(),
            context: frame.context.clone(),
            value_type: None,
        };
        self.setup_bindings(&sub_frame, BindingPass::Immediate);
    }

    /// A binding to one facet of the value type property `property`
    fn set_facet_binding(&mut self, frame: &Frame, property: usize, binding: &CompiledBinding) {
        let instance = &frame.instance;
        let Some(data) = instance.property_cache().property(property).cloned() else { return };
        let facet = &binding.property_name;
        let Some(facet_type) = data.ty.facet_type(facet) else {
            self.record_error(
                binding.location,
                format!("Cannot assign to non-existent property \"{facet}\""),
            );
            return;
        };
        match binding.value {
            BindingValue::Script(script) => {
                let evaluator = script_evaluator(&self.unit, script, frame);
                let live = Binding::new(
                    instance,
                    property,
                    Some(facet.clone()),
                    frame.context.clone(),
                    binding.location,
                    evaluator,
                );
                instance.set_binding(live.clone());
                instance.set_pending(property, true);
                self.shared.push_binding(live);
            }
            ref value if value.is_literal() => {
                let result = value_assign::convert_literal(
                    &self.engine,
                    &self.unit.url,
                    &facet_type,
                    binding,
                )
                .and_then(|value| {
                    instance.write_facet(property, facet, value).map_err(|e| e.to_string())
                });
                if let Err(message) = result {
                    self.record_error(binding.location, message);
                }
            }
            _ => self.record_error(binding.location, "Invalid grouped property access"),
        }
    }

    /// `Animation on x { }`: installs `created` as value source or interceptor of the property
    fn set_on_assignment(
        &mut self,
        frame: &Frame,
        binding: &CompiledBinding,
        index: usize,
        created: &ObjectRc,
    ) {
        let Some((target, target_index)) = frame.instance.resolve_property(index) else {
            self.record_error(
                binding.location,
                format!("Invalid alias target location: {}", binding.property_name),
            );
            return;
        };
        let target_ref =
            PropertyRef { object: target.downgrade(), property: target_index, facet: None };
        if let Some(source) = created.value_source() {
            source.set_target(created, target_ref);
        } else if let Some(interceptor) = created.interceptor() {
            interceptor.set_target(created, target_ref);
            target.add_interceptor(target_index, created);
        } else {
            self.record_error(
                binding.location,
                format!(
                    "\"{}\" cannot operate on \"{}\"",
                    created.type_name(),
                    binding.property_name
                ),
            );
        }
    }

    /// `onSignal: Type { }`: connects the signal to the default method of the created object
    fn connect_default_method(
        &mut self,
        frame: &Frame,
        binding: &CompiledBinding,
        signal: SignalRef,
        index: ObjectIndex,
    ) {
        let created = self.create_instance(index, Some(&frame.instance), &frame.context, false);
        let Some(created) = created else { return };
        let Some(method) = created.native_type().default_method().cloned() else {
            self.record_error(
                binding.location,
                format!("Cannot assign object type {} with no default method", created.type_name()),
            );
            return;
        };
        let cache = frame.instance.property_cache();
        let parameters = cache.signal_parameters(signal);
        let compatible = method.parameters.len() <= parameters.len()
            && method
                .parameters
                .iter()
                .zip(parameters)
                .all(|(m, p)| *m == p.ty || matches!(m, PropertyType::Var | PropertyType::Variant));
        if !compatible {
            self.record_error(
                binding.location,
                format!(
                    "Cannot connect mismatched signal/slot {}({}) vs {}({})",
                    cache.signal_name(signal),
                    parameters.iter().map(|p| &p.ty).join(","),
                    method.name,
                    method.parameters.iter().join(","),
                ),
            );
            return;
        }
        let receiver = created.downgrade();
        let url = self.unit.url.clone();
        let location = binding.location;
        frame.instance.connect(signal, move |args| {
            let Some(receiver) = receiver.upgrade().filter(|r| !r.is_destroyed()) else { return };
            if let Some(Err(e)) = receiver.invoke(&method.name, args) {
                log::warn!("{url}:{location}: {e}");
            }
        });
    }

    fn assign_object(
        &mut self,
        frame: &Frame,
        binding: &CompiledBinding,
        index: usize,
        data: &PropertyData,
        created: &ObjectRc,
        list_run: &mut Option<ListRun>,
    ) {
        let value = Value::from_object(created);
        // aliases store nothing themselves, the target property decides how objects are assigned
        let (owner, owner_index, ty) = match data.is_alias() {
            true => match frame.instance.resolve_property(index) {
                Some((target, i)) => {
                    let ty = target
                        .property_cache()
                        .property(i)
                        .map_or(PropertyType::Var, |d| d.ty.clone());
                    (target, i, ty)
                }
                None => (frame.instance.clone(), index, data.ty.clone()),
            },
            false => (frame.instance.clone(), index, data.ty.clone()),
        };
        match &ty {
            PropertyType::List { element_interface, appendable } => {
                if !appendable {
                    self.record_error(binding.location, "Cannot assign object to read only list");
                    return;
                }
                if let Some(interface) = element_interface
                    && !created.native_type().is_a(interface)
                {
                    self.record_error(
                        binding.location,
                        format!("Cannot assign object to list property \"{}\"", data.name),
                    );
                    return;
                }
                if list_run.as_ref().is_none_or(|run| !run.appends_to(&owner, owner_index)) {
                    let items = match evaluate_no_tracking(|| owner.read_property(owner_index)) {
                        Value::List(items) => items,
                        _ => Vec::new(),
                    };
                    *list_run =
                        Some(ListRun { object: owner.clone(), property: owner_index, items });
                }
                let Some(run) = list_run.as_mut() else { return };
                run.items.push(value);
                let items = run.items.clone();
                if let Err(e) = owner.write_property(owner_index, Value::List(items)) {
                    self.record_error(binding.location, e.to_string());
                }
                return;
            }
            PropertyType::Interface(interface) if !created.native_type().is_a(interface) => {
                self.record_error(
                    binding.location,
                    format!("Cannot assign object to interface property \"{}\"", data.name),
                );
                return;
            }
            PropertyType::Object(Some(type_name)) if !created.native_type().is_a(type_name) => {
                self.record_error(
                    binding.location,
                    format!(
                        "Cannot assign object of type \"{}\" to property \"{}\"",
                        created.type_name(),
                        data.name
                    ),
                );
                return;
            }
            PropertyType::Interface(_)
            | PropertyType::Object(_)
            | PropertyType::Var
            | PropertyType::Variant => {}
            _ => {
                self.record_error(binding.location, "Cannot assign object to property");
                return;
            }
        }
        *list_run = None;
        if let Err(e) = frame.instance.write_property(index, value) {
            self.record_error(binding.location, e.to_string());
        }
    }

    /// Enables the bindings and runs the completion callbacks of everything created.
    ///
    /// Returns the context of the creation once done, `None` if interrupted (call again to
    /// resume) or if the creation was torn down meanwhile.
    pub fn finalize(&mut self, interrupt: &InstantiationInterrupt) -> Option<ContextRc> {
        debug_assert!(
            matches!(self.phase, Phase::ObjectsCreated | Phase::Finalizing),
            "{}",
            self.phase
        );
        if !matches!(self.phase, Phase::ObjectsCreated | Phase::Finalizing) {
            return None;
        }
        if self.phase == Phase::ObjectsCreated {
            self.set_phase(Phase::Finalizing);
        }
        let shared = self.shared.clone();
        let clear_count = shared.clear_count();
        let should_stop = || shared.clear_count() != clear_count || interrupt.should_interrupt();

        while let Some(binding) = shared.pop_binding() {
            if !binding.is_removed()
                && let Some(target) = binding.target()
            {
                target.set_pending(binding.property(), false);
            }
            binding.set_enabled(true);
            if should_stop() {
                return None;
            }
        }

        while let Some(object) = shared.pop_parser_status() {
            if let Some(object) = object.upgrade().filter(|o| !o.is_destroyed())
                && let Some(status) = object.parser_status()
            {
                status.component_complete(&object);
            }
            if should_stop() {
                return None;
            }
        }

        while let Some(callback) = shared.pop_finalize_callback() {
            callback();
            if should_stop() {
                return None;
            }
        }

        while let Some(attached) = shared.pop_component_attached() {
            if let Some(attached) = attached.upgrade().filter(|o| !o.is_destroyed()) {
                attached.emit_by_name("completed", &[]);
            }
            if should_stop() {
                return None;
            }
        }

        self.set_phase(Phase::Done);
        if self.is_top_level {
            shared.release_root_object();
        }
        shared.release_created_objects();
        self.context.clone()
    }

    /// Aborts the creation: destroys every object created so far
    pub fn clear(&mut self) {
        if matches!(self.phase, Phase::Done | Phase::Finalizing | Phase::Startup) {
            return;
        }
        log::debug!("{}: creation cleared in phase {}", self.unit.url, self.phase);
        self.shared.clear();
        if let Some(context) = &self.context {
            context.invalidate();
        }
        self.set_phase(Phase::Done);
    }

    /// Applies the deferred bindings `instance` got from this creator's unit. Returns false
    /// if there were none left to apply. Call [`Self::finalize`] afterwards.
    pub fn populate_deferred_properties(&mut self, instance: &ObjectRc) -> bool {
        debug_assert_eq!(self.phase, Phase::Startup);
        let entries = instance
            .declarative_data_mut()
            .deferred
            .iter_mut()
            .filter(|d| !d.applied && Rc::ptr_eq(&d.unit, &self.unit))
            .map(|d| {
                d.applied = true;
                (d.object_index, d.context.clone())
            })
            .collect::<Vec<_>>();
        if entries.is_empty() {
            return false;
        }
        log::debug!("{}: applying deferred bindings of {}", self.unit.url, instance.type_name());
        self.set_phase(Phase::CreatingObjects);
        for (index, context) in entries {
            self.shared.adopt_root_context(&context);
            self.context = Some(context.clone());
            let frame = Frame {
                index,
                instance: instance.clone(),
                scope: instance.clone(),
                context,
                value_type: None,
            };
            self.setup_bindings(&frame, BindingPass::Deferred);
        }
        self.set_phase(Phase::ObjectsCreated);
        true
    }
}

impl std::fmt::Debug for ObjectCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCreator")
            .field("url", &self.unit.url)
            .field("phase", &self.phase)
            .field("top_level", &self.is_top_level)
            .field("errors", &self.errors.len())
            .finish()
    }
}

/// Applies the remaining deferred bindings of `object` and finalizes them
pub fn execute_deferred(engine: &Engine, object: &ObjectRc) -> Result<(), Diagnostics> {
    let pending = object
        .declarative_data()
        .deferred
        .iter()
        .filter(|d| !d.applied)
        .map(|d| (d.unit.clone(), d.context.clone()))
        .unique_by(|(unit, _)| Rc::as_ptr(unit))
        .collect::<Vec<_>>();
    let mut errors = Diagnostics::default();
    for (unit, context) in pending {
        let mut creator = ObjectCreator::new(engine, unit, Some(context));
        if creator.populate_deferred_properties(object) {
            creator.finalize(&InstantiationInterrupt::none());
        }
        errors.append(&mut creator.errors);
    }
    if errors.has_errors() { Err(errors) } else { Ok(()) }
}

/// Extends the property cache of `instance` with the declarations of `compiled`
fn install_declarations(compiled: &CompiledObject, instance: &ObjectRc) {
    let mut cache = instance.property_cache().derive();
    for declaration in &compiled.properties {
        let mut data = match &declaration.alias {
            Some(target) => PropertyData::alias(declaration.name.clone(), target.clone()),
            None => {
                let mut data = PropertyData::new(declaration.name.clone(), declaration.ty.clone());
                data.flags.insert(PropertyFlags::DYNAMIC);
                data
            }
        };
        if declaration.is_default {
            data.flags.insert(PropertyFlags::DEFAULT);
        }
        if declaration.is_readonly {
            data.flags.remove(PropertyFlags::WRITABLE);
        }
        cache.add_property(data);
    }
    for signal in &compiled.signals {
        cache.add_signal(SignalData {
            name: signal.name.clone(),
            parameters: signal
                .parameters
                .iter()
                .map(|(name, ty)| SignalParameter { name: name.clone(), ty: ty.clone() })
                .collect(),
        });
    }
    instance.install_property_cache(Rc::new(cache));
}

fn unit_declares(compiled: &CompiledObject, name: &str) -> bool {
    compiled.properties.iter().any(|p| p.name == name)
}

fn read_only_message(name: &str) -> String {
    format!("Invalid property assignment: \"{name}\" is a read-only property")
}

fn script_evaluator(
    unit: &Rc<CompilationUnit>,
    script: ScriptIndex,
    frame: &Frame,
) -> BindingEvaluator {
    let unit = unit.clone();
    let scope = Rc::downgrade(&frame.scope);
    let context = frame.context.clone();
    Box::new(move || {
        let scope_object =
            scope.upgrade().ok_or_else(|| "Binding scope was destroyed".to_string())?;
        let eval_scope = EvalScope::new(context.clone(), Some(scope_object));
        eval::eval_expression(&unit.script(script).expression, &eval_scope)
            .map_err(|e| e.to_string())
    })
}
