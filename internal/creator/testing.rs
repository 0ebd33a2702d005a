// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

//! Native types for tests. Their lifecycle hooks report to an [`EventLog`].

use crate::component::Component;
use crate::incubator::{Incubator, IncubatorStatus};
use i_qmlrt_runtime::compiled::{CompilationUnit, CompiledBinding};
use i_qmlrt_runtime::config::IncubationMode;
use i_qmlrt_runtime::diagnostics::Diagnostics;
use i_qmlrt_runtime::engine::Engine;
use i_qmlrt_runtime::object::{Object, ObjectRc, ObjectWeak};
use i_qmlrt_runtime::property::{EnumInfo, PropertyType, ValueTypeInfo};
use i_qmlrt_runtime::types::{
    Capabilities, CustomParser, FinalizeHooks, NativeBehavior, NativeType, ParserStatus,
    PropertyRef, PropertyValueInterceptor, PropertyValueSource,
};
use i_qmlrt_runtime::value::Value;
use itertools::Itertools as _;
use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub type EventLog = Rc<RefCell<Vec<String>>>;

fn write(object: &ObjectRc, name: &str, value: Value) {
    if let Some(index) = object.property_index(name) {
        let _ = object.write_property_direct(index, value);
    }
}

fn read(object: &ObjectRc, name: &str) -> Value {
    object.get(name).unwrap_or_default()
}

fn display_name(object: &ObjectRc) -> String {
    read(object, "objectName").to_display_string().into()
}

/// Creates the `Pen` of its `border` group
struct RectangleBehavior {
    pen: Rc<NativeType>,
}

impl NativeBehavior for RectangleBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn initialize(&self, object: &ObjectRc) {
        let pen = Object::new(&self.pen);
        object.add_child(&pen);
        write(object, "border", Value::from_object(&pen));
    }
}

/// A value source writing `to` to its target once complete
struct AnimationBehavior {
    log: EventLog,
    target: RefCell<Option<PropertyRef>>,
}

impl NativeBehavior for AnimationBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn parser_status(&self) -> Option<&dyn ParserStatus> {
        Some(self)
    }

    fn value_source(&self) -> Option<&dyn PropertyValueSource> {
        Some(self)
    }
}

impl ParserStatus for AnimationBehavior {
    fn class_begin(&self, _object: &ObjectRc, _hooks: &mut FinalizeHooks) {}

    fn component_complete(&self, object: &ObjectRc) {
        let Some(target) = self.target.borrow().clone() else { return };
        if let Err(e) = target.write_direct(read(object, "to")) {
            self.log.borrow_mut().push(format!("Animation failed: {e}"));
        }
    }
}

impl PropertyValueSource for AnimationBehavior {
    fn set_target(&self, _object: &ObjectRc, target: PropertyRef) {
        self.log.borrow_mut().push(format!("Animation on {}", target.name()));
        *self.target.borrow_mut() = Some(target);
    }
}

/// An interceptor counting the writes it forwards
#[derive(Default)]
struct BehaviorBehavior {
    target: RefCell<Option<PropertyRef>>,
}

impl NativeBehavior for BehaviorBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn interceptor(&self) -> Option<&dyn PropertyValueInterceptor> {
        Some(self)
    }
}

impl PropertyValueInterceptor for BehaviorBehavior {
    fn set_target(&self, _object: &ObjectRc, target: PropertyRef) {
        *self.target.borrow_mut() = Some(target);
    }

    fn write(&self, object: &ObjectRc, value: Value) {
        let count = read(object, "interceptedCount").to_number();
        write(object, "interceptedCount", Value::Number(count + 1.));
        if let Some(target) = self.target.borrow().as_ref() {
            let _ = target.write_direct(value);
        }
    }
}

/// Consumes its bindings itself: records them and counts them
struct ListModelParser {
    log: EventLog,
}

impl CustomParser for ListModelParser {
    fn apply_bindings(
        &self,
        object: &ObjectRc,
        unit: &Rc<CompilationUnit>,
        bindings: &[&CompiledBinding],
    ) -> Result<(), Diagnostics> {
        let mut diagnostics = Diagnostics::default();
        for binding in bindings {
            if !binding.value.is_literal() {
                diagnostics.push_error(
                    "ListModel: cannot use script for property value".into(),
                    &unit.url,
                    binding.location,
                );
            }
        }
        if diagnostics.has_errors() {
            return Err(diagnostics);
        }
        let names = bindings.iter().map(|b| &b.property_name).join(",");
        self.log.borrow_mut().push(format!("ListModel.apply {names}"));
        write(object, "count", Value::Number(bindings.len() as f64));
        Ok(())
    }
}

/// Instantiates `sourceComponent` once complete
struct LoaderBehavior {
    log: EventLog,
    incubator: RefCell<Option<Incubator>>,
}

impl NativeBehavior for LoaderBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn parser_status(&self) -> Option<&dyn ParserStatus> {
        Some(self)
    }
}

impl ParserStatus for LoaderBehavior {
    fn class_begin(&self, _object: &ObjectRc, _hooks: &mut FinalizeHooks) {}

    fn component_complete(&self, object: &ObjectRc) {
        let Some(component) =
            read(object, "sourceComponent").as_object().and_then(|c| Component::from_object(&c))
        else {
            return;
        };
        let incubator = match read(object, "asynchronous").to_bool() {
            true => Incubator::new(IncubationMode::Asynchronous),
            false => Incubator::for_engine(component.engine()),
        };
        let loader = object.downgrade();
        let weak_incubator = incubator.downgrade();
        let log = self.log.clone();
        incubator.set_status_changed(move |status| {
            let (Some(loader), Some(incubator)) = (loader.upgrade(), weak_incubator.upgrade())
            else {
                return;
            };
            write(&loader, "status", Value::Number(status as i32 as f64));
            match status {
                IncubatorStatus::Ready => {
                    if let Some(item) = incubator.object() {
                        loader.add_child(&item);
                        write(&loader, "item", Value::from_object(&item));
                    }
                    log.borrow_mut().push(format!("Loader {} ready", display_name(&loader)));
                }
                IncubatorStatus::Error => {
                    for error in incubator.errors().iter() {
                        log.borrow_mut().push(format!(
                            "Loader {} error: {}",
                            display_name(&loader),
                            error.message()
                        ));
                    }
                }
                IncubatorStatus::Null | IncubatorStatus::Loading => {}
            }
        });
        *self.incubator.borrow_mut() = Some(incubator.clone());
        component.incubate(&incubator, None);
    }
}

/// Logs its lifecycle, and registers a finalize hook
struct TrackerBehavior {
    log: EventLog,
}

impl NativeBehavior for TrackerBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn parser_status(&self) -> Option<&dyn ParserStatus> {
        Some(self)
    }
}

impl ParserStatus for TrackerBehavior {
    fn class_begin(&self, object: &ObjectRc, hooks: &mut FinalizeHooks) {
        self.log.borrow_mut().push("classBegin".into());
        let log = self.log.clone();
        let object: ObjectWeak = object.downgrade();
        hooks.register(move || {
            if let Some(object) = object.upgrade() {
                log.borrow_mut().push(format!("finalize {}", display_name(&object)));
            }
        });
    }

    fn component_complete(&self, object: &ObjectRc) {
        let value = read(object, "value").to_display_string();
        self.log
            .borrow_mut()
            .push(format!("componentComplete {} value={value}", display_name(object)));
    }
}

/// `click(x)` emits `clicked(x)`
struct ClickerBehavior;

impl NativeBehavior for ClickerBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn invoke(
        &self,
        object: &ObjectRc,
        method: &str,
        args: &[Value],
    ) -> Option<Result<Value, String>> {
        if method != "click" {
            return None;
        }
        let x = args.first().cloned().unwrap_or(Value::Number(1.));
        object.emit_by_name("clicked", &[x]);
        Some(Ok(Value::Undefined))
    }
}

/// The default method `record(real)` sums up what it receives
struct SlottedBehavior {
    log: EventLog,
}

impl NativeBehavior for SlottedBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn invoke(
        &self,
        object: &ObjectRc,
        method: &str,
        args: &[Value],
    ) -> Option<Result<Value, String>> {
        if method != "record" {
            return None;
        }
        let value = args.first().map_or(0., Value::to_number);
        self.log.borrow_mut().push(format!("record {value}"));
        let total = read(object, "total").to_number();
        write(object, "total", Value::Number(total + value));
        Some(Ok(Value::Undefined))
    }
}

/// Registers the test types on `engine`:
///
/// - `Item` (`x`, `y`, `width`, `height`, `visible`, default list `data`),
///   `Rectangle` (`color`, `border` group object of type `Pen`),
///   `Text` (`text`, `font` value type, `elide` enumeration, `pos` point)
/// - `Animation`, a value source with parser status, `Behavior`, an interceptor
/// - `ListModel`, with a custom parser
/// - `Loader`, instantiating its `sourceComponent` through an incubator
/// - `Tracker`, logging its lifecycle, `Deferred`, `Clicker`, `Slotted`
/// - `ValueHolder`, with a property of every kind, `PropertyMap` (fully dynamic),
///   `Settings` (singleton), `Abstract` (uncreatable)
pub fn register_types(engine: &Engine) -> EventLog {
    let log = EventLog::default();
    let qt_object = engine.registry().native_type("QtObject");
    let inherit = |builder: i_qmlrt_runtime::types::NativeTypeBuilder| match &qt_object {
        Some(base) => builder.inherits(base),
        None => builder.property("objectName", PropertyType::String),
    };

    let item = inherit(NativeType::builder("Item"))
        .property("x", PropertyType::Real)
        .property("y", PropertyType::Real)
        .property("width", PropertyType::Real)
        .property("height", PropertyType::Real)
        .property_with_value("visible", PropertyType::Bool, true)
        .property("data", PropertyType::List { element_interface: None, appendable: true })
        .default_property("data")
        .build();

    let pen = inherit(NativeType::builder("Pen"))
        .property_with_value("width", PropertyType::Real, 1.)
        .property("color", PropertyType::Color)
        .build();
    let rectangle = {
        let pen = pen.clone();
        NativeType::builder("Rectangle")
            .inherits(&item)
            .property("color", PropertyType::Color)
            .read_only_property("border", PropertyType::Object(Some("Pen".into())))
            .behavior(move || RectangleBehavior { pen: pen.clone() })
            .build()
    };

    let font = ValueTypeInfo::new(
        "font",
        vec![
            ("family", PropertyType::String),
            ("pixelSize", PropertyType::Int),
            ("bold", PropertyType::Bool),
        ],
    );
    let elide =
        EnumInfo::new("TextElideMode", &[("ElideNone", 0), ("ElideLeft", 1), ("ElideRight", 2)]);
    let text = NativeType::builder("Text")
        .inherits(&item)
        .property("text", PropertyType::String)
        .property("font", PropertyType::ValueType(font))
        .property("elide", PropertyType::Enumeration(elide))
        .property("pos", PropertyType::Point)
        .build();

    let animation = {
        let log = log.clone();
        inherit(NativeType::builder("Animation"))
            .property("to", PropertyType::Real)
            .property("duration", PropertyType::Int)
            .behavior(move || AnimationBehavior { log: log.clone(), target: Default::default() })
            .capability(Capabilities::PARSER_STATUS)
            .capability(Capabilities::PROPERTY_VALUE_SOURCE)
            .build()
    };

    let behavior = inherit(NativeType::builder("Behavior"))
        .property("interceptedCount", PropertyType::Int)
        .behavior(BehaviorBehavior::default)
        .capability(Capabilities::PROPERTY_VALUE_INTERCEPTOR)
        .build();

    let list_model = inherit(NativeType::builder("ListModel"))
        .read_only_property("count", PropertyType::Int)
        .custom_parser(ListModelParser { log: log.clone() })
        .build();

    let loader = {
        let log = log.clone();
        NativeType::builder("Loader")
            .inherits(&item)
            .property("sourceComponent", PropertyType::Object(Some("Component".into())))
            .property("asynchronous", PropertyType::Bool)
            .read_only_property("item", PropertyType::Object(None))
            .read_only_property("status", PropertyType::Int)
            .behavior(move || LoaderBehavior { log: log.clone(), incubator: Default::default() })
            .capability(Capabilities::PARSER_STATUS)
            .build()
    };

    let tracker = {
        let log = log.clone();
        inherit(NativeType::builder("Tracker"))
            .property("id", PropertyType::String)
            .property("value", PropertyType::Real)
            .property("data", PropertyType::List { element_interface: None, appendable: true })
            .default_property("data")
            .behavior(move || TrackerBehavior { log: log.clone() })
            .capability(Capabilities::PARSER_STATUS)
            .build()
    };

    let deferred = NativeType::builder("Deferred")
        .inherits(&item)
        .property("label", PropertyType::String)
        .property("content", PropertyType::Real)
        .build();

    let clicker = inherit(NativeType::builder("Clicker"))
        .implements("Clickable")
        .property("clicks", PropertyType::Int)
        .signal("clicked", &[("x", PropertyType::Int)])
        .signal("named", &[("name", PropertyType::String)])
        .method("click", &[PropertyType::Int])
        .behavior(|| ClickerBehavior)
        .build();

    let slotted = {
        let log = log.clone();
        inherit(NativeType::builder("Slotted"))
            .property("total", PropertyType::Real)
            .method("record", &[PropertyType::Real])
            .default_method("record")
            .behavior(move || SlottedBehavior { log: log.clone() })
            .build()
    };

    let mode = EnumInfo::new("Mode", &[("Off", 0), ("On", 1), ("Auto", 2)]);
    let value_holder = inherit(NativeType::builder("ValueHolder"))
        .property("i", PropertyType::Int)
        .property("r", PropertyType::Real)
        .property("b", PropertyType::Bool)
        .property("s", PropertyType::String)
        .property("u", PropertyType::Url)
        .property("c", PropertyType::Color)
        .property("d", PropertyType::Date)
        .property("t", PropertyType::Time)
        .property("dt", PropertyType::DateTime)
        .property("p", PropertyType::Point)
        .property("sz", PropertyType::Size)
        .property("rc", PropertyType::Rect)
        .property("v2", PropertyType::Vector2D)
        .property("v3", PropertyType::Vector3D)
        .property("v4", PropertyType::Vector4D)
        .property("e", PropertyType::Enumeration(mode))
        .property("money", PropertyType::Custom("Money".into()))
        .property("v", PropertyType::Var)
        .property("script", PropertyType::ScriptString)
        .property(
            "items",
            PropertyType::List { element_interface: Some("Item".into()), appendable: true },
        )
        .property("fixed", PropertyType::List { element_interface: None, appendable: false })
        .property("obj", PropertyType::Object(Some("Item".into())))
        .property("clickable", PropertyType::Interface("Clickable".into()))
        .read_only_property("constant", PropertyType::Int)
        .build();

    let property_map = inherit(NativeType::builder("PropertyMap")).fully_dynamic().build();
    let settings = inherit(NativeType::builder("Settings")).singleton().build();
    let abstract_type = inherit(NativeType::builder("Abstract"))
        .uncreatable("Abstract is an abstract type")
        .build();

    for ty in [
        item,
        pen,
        rectangle,
        text,
        animation,
        behavior,
        list_model,
        loader,
        tracker,
        deferred,
        clicker,
        slotted,
        value_holder,
        property_map,
        settings,
        abstract_type,
    ] {
        engine.register_native_type(ty);
    }
    engine.register_string_converter("Money", |s| {
        let amount = s.strip_prefix('$')?.parse::<f64>().ok()?;
        Some(Value::Number(amount))
    });
    log
}

/// Takes the events logged so far
pub fn take_events(log: &EventLog) -> Vec<String> {
    std::mem::take(&mut *log.borrow_mut())
}

/// Whether nothing but weak references to `objects` remain
pub fn all_dropped(objects: &[Weak<Object>]) -> bool {
    objects.iter().all(|o| o.strong_count() == 0)
}
