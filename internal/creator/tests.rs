// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

use crate::component::{Component, ComponentStatus};
use crate::incubator::{IncubationController, Incubator, IncubatorStatus};
use crate::interrupt::InstantiationInterrupt;
use crate::object_creator::{ObjectCreator, Phase, execute_deferred};
use crate::testing::{self, EventLog, all_dropped, take_events};
use i_qmlrt_runtime::builder::UnitBuilder;
use i_qmlrt_runtime::compiled::CompilationUnit;
use i_qmlrt_runtime::config::{EngineConfiguration, IncubationMode};
use i_qmlrt_runtime::engine::Engine;
use i_qmlrt_runtime::expression::{BinaryOp, Expression};
use i_qmlrt_runtime::graphics::{Point, Rect, Size, Vector2D, Vector3D, Vector4D};
use i_qmlrt_runtime::literals;
use i_qmlrt_runtime::object::ObjectRc;
use i_qmlrt_runtime::property::{PropertyType, facet_get};
use i_qmlrt_runtime::value::{ScriptString, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

fn setup() -> (Engine, EventLog) {
    let engine = Engine::with_configuration(EngineConfiguration::default());
    let log = testing::register_types(&engine);
    (engine, log)
}

fn create(engine: &Engine, unit: Rc<CompilationUnit>) -> ObjectRc {
    let component = Component::from_unit(engine, unit);
    let object = component.create(None);
    assert!(component.errors().is_empty(), "{:?}", component.errors().to_string_vec());
    object.expect("creation failed")
}

/// The messages of the errors a failing creation reports
fn creation_errors(engine: &Engine, unit: Rc<CompilationUnit>) -> Vec<String> {
    let component = Component::from_unit(engine, unit);
    assert!(component.create(None).is_none());
    assert_eq!(component.status(), ComponentStatus::Error);
    component.errors().iter().map(|d| d.message().to_string()).collect()
}

fn get(object: &ObjectRc, name: &str) -> Value {
    object.get(name).unwrap_or_else(|| panic!("{} has no property {name}", object.type_name()))
}

fn by_id(root: &ObjectRc, id: &str) -> ObjectRc {
    root.context().and_then(|c| c.id_object(id)).unwrap_or_else(|| panic!("no object with id {id}"))
}

#[test]
fn bindings_across_ids() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///main.qml").root("Tracker", |root| {
        root.id("root").declare_property("x", PropertyType::Int).number("x", 5.);
        root.child("Tracker", |kid| {
            kid.id("kid")
                .declare_property("y", PropertyType::Int)
                .script("y", Expression::lookup("root").member("x").binary(BinaryOp::Mul, 2));
        });
    });
    let root = create(&engine, unit);
    let kid = by_id(&root, "kid");
    assert_eq!(get(&kid, "y"), Value::Number(10.));
    assert!(kid.parent().is_some_and(|p| Rc::ptr_eq(&p, &root)));
    assert_eq!(get(&root, "data"), Value::List(vec![Value::from_object(&kid)]));

    root.set("x", 7).unwrap();
    assert_eq!(get(&kid, "y"), Value::Number(14.));
}

#[test]
fn later_assignment_replaces_binding() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///override.qml").root("Item", |root| {
        root.script("x", Expression::from(1).binary(BinaryOp::Add, 1))
            .number("x", 5.)
            .number("y", 1.)
            .script("y", Expression::lookup("x").binary(BinaryOp::Mul, 3));
    });
    let root = create(&engine, unit);
    let x = root.property_index("x").unwrap();
    let y = root.property_index("y").unwrap();
    assert_eq!(get(&root, "x"), Value::Number(5.));
    assert!(!root.has_binding(x));
    assert_eq!(get(&root, "y"), Value::Number(15.));
    assert!(root.has_binding(y));
    assert_eq!(root.binding_count(), 1);
    assert!(!root.is_pending(y));
}

#[test]
fn bindings_are_enabled_before_completion() {
    let (engine, log) = setup();
    let unit = UnitBuilder::new("file:///tracker.qml").root("Tracker", |outer| {
        outer
            .id("outer")
            .string("objectName", "outer")
            .script("value", Expression::lookup("inner").member("value").binary(BinaryOp::Add, 1));
        outer.attached("Component", |c| {
            c.handler("onCompleted", Expression::lookup("objectName").assign("done"));
        });
        outer.child("Tracker", |inner| {
            inner.id("inner").string("objectName", "inner").number("value", 41.);
        });
    });
    let root = create(&engine, unit);
    assert_eq!(
        take_events(&log),
        [
            "classBegin",
            "classBegin",
            "componentComplete inner value=41",
            "componentComplete outer value=42",
            "finalize inner",
            "finalize outer",
        ]
    );
    // `Component.onCompleted` runs last
    assert_eq!(get(&root, "objectName"), Value::from("done"));
    assert_eq!(get(&root, "id"), Value::from("outer"));

    by_id(&root, "inner").set("value", 1.).unwrap();
    assert_eq!(get(&root, "value"), Value::Number(2.));
}

#[test]
fn begin_and_complete_create() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///two_phase.qml").root("Item", |root| {
        root.script("x", Expression::from(1).binary(BinaryOp::Add, 1));
    });
    let component = Component::from_unit(&engine, unit);
    let root = component.begin_create(None).unwrap();
    let x = root.property_index("x").unwrap();
    assert_eq!(get(&root, "x"), Value::Number(0.));
    assert!(root.is_pending(x));
    assert_eq!(engine.creation_depth(), 1);

    assert!(component.begin_create(None).is_none());

    let completed = component.complete_create().unwrap();
    assert!(Rc::ptr_eq(&root, &completed));
    assert_eq!(get(&root, "x"), Value::Number(2.));
    assert!(!root.is_pending(x));
    assert_eq!(engine.creation_depth(), 0);
    assert!(component.complete_create().is_none());
}

#[test]
fn root_object_in_creation() {
    let (engine, _) = setup();
    let component = Component::from_unit(&engine, sample_unit());
    let root = component.begin_create(None).unwrap();
    let context = root.context().unwrap();
    let (t, kid) = (by_id(&root, "t"), by_id(&root, "kid"));
    assert!(root.is_root_object_in_creation());
    assert!(!t.is_root_object_in_creation() && !kid.is_root_object_in_creation());
    // the first object consumed the flag of the context
    assert!(!context.is_root_object_in_creation());
    assert!(root.declarative_data().own_context);
    assert!(!t.declarative_data().own_context);
    let registered = context.objects();
    assert_eq!(registered.len(), 3);
    assert!(Rc::ptr_eq(&registered[0], &root) && Rc::ptr_eq(&registered[2], &kid));

    component.complete_create().unwrap();
    assert!(!root.is_root_object_in_creation());
    assert!(context.is_valid());
    root.destroy();
    assert!(!context.is_valid());
}

#[test]
fn cleared_creation_releases_root_object() {
    let (engine, _) = setup();
    let context = Some(engine.root_context().clone());
    let mut creator = ObjectCreator::new(&engine, sample_unit(), context);
    let root = creator.create(None, None, &InstantiationInterrupt::none()).unwrap();
    let shared = creator.shared().clone();
    assert!(shared.root_object_in_creation().is_some_and(|o| Rc::ptr_eq(&o, &root)));
    creator.clear();
    assert!(!root.is_root_object_in_creation());
    assert!(shared.root_object_in_creation().is_none());
    assert!(shared.root_context().is_some_and(|c| !c.is_root_object_in_creation()));
    assert!(!engine.root_context().is_root_object_in_creation());
}

#[test]
fn deferred_objects_are_not_roots_in_creation() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///deferred_object.qml").root("Deferred", |root| {
        root.id("root").object("data", "Item", |_| {}).deferred();
    });
    let root = create(&engine, unit);
    let context = root.context().unwrap();
    assert_eq!(get(&root, "data"), Value::List(Vec::new()));

    execute_deferred(&engine, &root).unwrap();
    let sub = match get(&root, "data") {
        Value::List(items) if items.len() == 1 => items[0].as_object().unwrap(),
        other => panic!("unexpected data {other:?}"),
    };
    assert!(!sub.is_root_object_in_creation());
    assert!(!sub.declarative_data().own_context);
    assert!(sub.context().is_some_and(|c| Rc::ptr_eq(&c, &context)));
    // the adopted context was never flagged, and still is not
    assert!(!context.is_root_object_in_creation());
    assert!(context.is_valid());
}

#[test]
fn wrapper_slots_follow_creation_order() {
    let (engine, _) = setup();
    let button = UnitBuilder::new("file:///Button.qml").root("Item", |root| {
        root.child("Item", |_| {});
    });
    engine.register_composite_type("Button", button);
    let unit = UnitBuilder::new("file:///page.qml").root("Item", |root| {
        root.child("Button", |_| {}).child("Item", |_| {});
    });
    let mut creator = ObjectCreator::new(&engine, unit, Some(engine.root_context().clone()));
    creator.create(None, None, &InstantiationInterrupt::none()).unwrap();
    let shared = creator.shared().clone();
    // one table for the whole creation, gone once the objects exist
    assert_eq!(shared.wrapper_allocations(), 1);
    assert_eq!(shared.wrapper_capacity(), None);
    let created = shared.all_created_objects();
    assert_eq!(created.len(), 4);
    let slots = created.iter().map(|o| o.declarative_data().wrapper_slot).collect::<Vec<_>>();
    assert_eq!(slots, [Some(0), Some(1), Some(2), Some(3)]);
    creator.finalize(&InstantiationInterrupt::none()).unwrap();
}

#[test]
fn composite_root_links_instantiating_context() {
    let (engine, _) = setup();
    let button = UnitBuilder::new("file:///Button.qml").root("Item", |root| {
        root.id("self");
    });
    engine.register_composite_type("Button", button);
    let unit = UnitBuilder::new("file:///page.qml").root("Button", |root| {
        root.id("page").child("Button", |b| {
            b.id("inner");
        });
    });
    let root = create(&engine, unit);
    let own = root.context().unwrap();
    let outer = root.declarative_data().outer_context.clone().unwrap();
    assert_eq!(own.url(), "file:///Button.qml");
    assert_eq!(outer.url(), "file:///page.qml");
    assert!(root.declarative_data().own_context);
    let linked = own.linked_contexts();
    assert_eq!(linked.len(), 1);
    assert!(Rc::ptr_eq(&linked[0], &outer));

    let inner = outer.id_object("inner").unwrap();
    let inner_own = inner.context().unwrap();
    assert!(inner_own.linked_contexts().is_empty());
    assert!(inner.declarative_data().outer_context.as_ref().is_some_and(|c| Rc::ptr_eq(c, &outer)));

    root.destroy();
    assert!(!own.is_valid() && !outer.is_valid() && !inner_own.is_valid());
}

#[test]
fn initial_properties_win_over_bindings() {
    let (engine, log) = setup();
    let unit = UnitBuilder::new("file:///initial.qml").root("Tracker", |root| {
        root.string("objectName", "t")
            .script("value", Expression::from(1).binary(BinaryOp::Add, 1));
    });
    let component = Component::from_unit(&engine, unit);
    let root = component
        .create_with_initial_properties(
            &[("value", Value::Number(5.)), ("missing", Value::Number(1.))],
            None,
        )
        .unwrap();
    assert_eq!(get(&root, "value"), Value::Number(5.));
    assert!(take_events(&log).contains(&"componentComplete t value=5".to_string()));
    assert_eq!(component.status(), ComponentStatus::Ready);
    assert_eq!(
        component.errors().iter().map(|d| d.message().to_string()).collect::<Vec<_>>(),
        ["Could not set initial property missing: no property \"missing\""]
    );
}

fn sample_unit() -> Rc<CompilationUnit> {
    UnitBuilder::new("file:///sample.qml").root("Item", |root| {
        root.id("root")
            .number("width", 10.)
            .script("height", Expression::lookup("width").binary(BinaryOp::Mul, 2));
        root.attached("Component", |c| {
            let kid_x = Expression::lookup("kid").member("x");
            c.handler("onCompleted", Expression::lookup("y").assign(kid_x));
        });
        root.child("Tracker", |t| {
            t.id("t")
                .string("objectName", "t")
                .script(
                    "value",
                    Expression::lookup("root").member("height").binary(BinaryOp::Add, 1),
                );
        });
        root.child("Item", |kid| {
            kid.id("kid").script("x", Expression::lookup("t").member("value"));
        });
    })
}

/// Property values, then binding counts
fn sample_state(root: &ObjectRc) -> Vec<Value> {
    let (t, kid) = (by_id(root, "t"), by_id(root, "kid"));
    let mut state = vec![get(root, "height"), get(root, "y"), get(&t, "value"), get(&kid, "x")];
    state.extend([root, &t, &kid].map(|o| Value::Number(o.binding_count() as f64)));
    state
}

#[test]
fn interrupted_creation_matches_uninterrupted() {
    let (engine, log) = setup();
    let context = engine.root_context().clone();

    let mut creator = ObjectCreator::new(&engine, sample_unit(), Some(context.clone()));
    let uninterrupted = creator.create(None, None, &InstantiationInterrupt::none()).unwrap();
    assert!(creator.finalize(&InstantiationInterrupt::none()).is_some());
    assert_eq!(creator.phase(), Phase::Done);
    let expected_events = take_events(&log);
    assert_eq!(sample_state(&uninterrupted), [20., 21., 21., 21., 1., 1., 1.].map(Value::Number));

    let interrupt = InstantiationInterrupt::flag(Rc::new(Cell::new(true)));
    let mut creator = ObjectCreator::new(&engine, sample_unit(), Some(context));
    assert!(creator.create(None, None, &interrupt).is_none());
    assert_eq!(creator.phase(), Phase::CreatingObjectsPhase2);
    let root = creator.create(None, None, &interrupt).unwrap();
    assert_eq!(creator.phase(), Phase::ObjectsCreated);
    let mut steps = 0;
    while creator.finalize(&interrupt).is_none() {
        steps += 1;
        assert_eq!(creator.phase(), Phase::Finalizing);
    }
    // three bindings, one parser status, one finalize hook and one Component.completed
    assert_eq!(steps, 6);
    assert_eq!(creator.phase(), Phase::Done);
    assert_eq!(sample_state(&root), sample_state(&uninterrupted));
    assert_eq!(take_events(&log), expected_events);
    assert!(creator.errors().is_empty());
}

#[test]
fn clear_destroys_partial_creation() {
    let (engine, log) = setup();
    let interrupt = InstantiationInterrupt::flag(Rc::new(Cell::new(true)));
    let context = Some(engine.root_context().clone());
    let mut creator = ObjectCreator::new(&engine, sample_unit(), context);
    assert!(creator.create(None, None, &interrupt).is_none());
    let created =
        creator.shared().all_created_objects().iter().map(Rc::downgrade).collect::<Vec<_>>();
    assert_eq!(created.len(), 3);
    let context = creator.context().cloned().unwrap();

    creator.clear();
    assert_eq!(creator.phase(), Phase::Done);
    assert!(all_dropped(&created));
    assert!(!context.is_valid());
    assert_eq!(take_events(&log), ["classBegin"]);
}

#[test]
fn failed_creation_is_rolled_back() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///broken.qml").root("Item", |root| {
        root.child("Item", |_| {});
        root.child("DoesNotExist", |_| {});
    });
    let component = Component::from_unit(&engine, unit);
    assert!(component.create(None).is_none());
    assert_eq!(component.status(), ComponentStatus::Error);
    assert_eq!(
        component.errors().to_string_vec(),
        ["file:///broken.qml:4:1: DoesNotExist is not a type"]
    );
    assert_eq!(engine.creation_depth(), 0);
}

#[test]
fn literal_conversions() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///app/main.qml").root("ValueHolder", |o| {
        o.number("i", 42.)
            .number("r", 2.5)
            .boolean("b", true)
            .string("s", "hello")
            .string("u", "images/icon.png")
            .string("c", "#ff0000")
            .string("d", "2024-02-29")
            .string("t", "13:45")
            .string("dt", "2020-01-02T03:04:05")
            .string("p", "3,4")
            .string("sz", "30x40")
            .string("rc", "1,2,30x40")
            .string("v2", "1,2")
            .string("v3", "1,2,3")
            .string("v4", "1,2,3,4")
            .string("e", "Auto")
            .string("money", "$12.5")
            .number("v", 7.)
            .script("script", Expression::lookup("r").binary(BinaryOp::Mul, 2));
    });
    let o = create(&engine, unit);
    assert_eq!(get(&o, "i"), Value::Number(42.));
    assert_eq!(get(&o, "r"), Value::Number(2.5));
    assert_eq!(get(&o, "b"), Value::Bool(true));
    assert_eq!(get(&o, "s"), Value::from("hello"));
    assert_eq!(get(&o, "u"), Value::from("file:///app/images/icon.png"));
    assert_eq!(get(&o, "c"), Value::Color(literals::parse_color("red").unwrap()));
    assert_eq!(get(&o, "d"), Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
    assert_eq!(get(&o, "t"), Value::Time(chrono::NaiveTime::from_hms_opt(13, 45, 0).unwrap()));
    assert_eq!(get(&o, "p"), Value::Point(Point::new(3., 4.)));
    assert_eq!(get(&o, "sz"), Value::Size(Size::new(30., 40.)));
    assert_eq!(get(&o, "rc"), Value::Rect(Rect::new(Point::new(1., 2.), Size::new(30., 40.))));
    assert_eq!(get(&o, "v2"), Value::Vector2D(Vector2D::new(1., 2.)));
    assert_eq!(get(&o, "v3"), Value::Vector3D(Vector3D::new(1., 2., 3.)));
    assert_eq!(get(&o, "v4"), Value::Vector4D(Vector4D::new(1., 2., 3., 4.)));
    assert_eq!(
        get(&o, "dt"),
        Value::DateTime(
            chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap()
        )
    );
    assert_eq!(get(&o, "e"), Value::Number(2.));
    assert_eq!(get(&o, "money"), Value::Number(12.5));
    assert_eq!(get(&o, "v"), Value::Number(7.));

    // script strings are stored, not evaluated
    let Value::ScriptString(ScriptString { script, literal, context, .. }) = get(&o, "script")
    else {
        panic!("script string expected")
    };
    assert_eq!(script, "(r * 2)");
    assert!(literal.is_none());
    assert!(context.and_then(|c| c.upgrade()).is_some());
}

#[test]
fn custom_parser_receives_its_bindings() {
    let (engine, log) = setup();
    let unit = UnitBuilder::new("file:///model.qml").root("Item", |root| {
        root.child("ListModel", |m| {
            m.id("model")
                .string("objectName", "model")
                .number("a", 1.)
                .parsed_by_type()
                .string("b", "two")
                .parsed_by_type();
        });
    });
    let root = create(&engine, unit);
    let model = by_id(&root, "model");
    assert_eq!(take_events(&log), ["ListModel.apply a,b"]);
    assert_eq!(get(&model, "count"), Value::Number(2.));
    assert_eq!(get(&model, "objectName"), Value::from("model"));

    let unit = UnitBuilder::new("file:///model.qml").root("ListModel", |m| {
        m.script("a", Expression::lookup("x")).parsed_by_type();
    });
    assert_eq!(creation_errors(&engine, unit), ["ListModel: cannot use script for property value"]);
}

#[test]
fn deferred_bindings_are_applied_once() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///deferred.qml").root("Deferred", |root| {
        root.number("width", 10.)
            .string("label", "hi")
            .deferred()
            .script("content", Expression::lookup("width").binary(BinaryOp::Mul, 2))
            .deferred();
    });
    let root = create(&engine, unit.clone());
    assert_eq!(get(&root, "label"), Value::from(""));
    assert_eq!(get(&root, "content"), Value::Number(0.));

    execute_deferred(&engine, &root).unwrap();
    assert_eq!(get(&root, "label"), Value::from("hi"));
    assert_eq!(get(&root, "content"), Value::Number(20.));

    root.set("label", "changed").unwrap();
    execute_deferred(&engine, &root).unwrap();
    assert_eq!(get(&root, "label"), Value::from("changed"));
    let mut creator = ObjectCreator::new(&engine, unit, root.context());
    assert!(!creator.populate_deferred_properties(&root));

    root.set("width", 4.).unwrap();
    assert_eq!(get(&root, "content"), Value::Number(8.));
}

#[test]
fn group_properties() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///groups.qml").root("Rectangle", |root| {
        root.group("border", |g| {
            g.number("width", 3.).string("color", "blue");
        });
        root.child("Text", |text| {
            text.id("label").string("text", "Sans").string("elide", "ElideRight");
            text.group("font", |g| {
                g.number("pixelSize", 12.).script("family", Expression::lookup("text"));
            });
            text.group("pos", |g| {
                g.number("x", 5.);
            });
        });
    });
    let root = create(&engine, unit);
    let pen = get(&root, "border").as_object().unwrap();
    assert_eq!(get(&pen, "width"), Value::Number(3.));
    assert_eq!(get(&pen, "color"), Value::Color(literals::parse_color("blue").unwrap()));

    let text = by_id(&root, "label");
    let font = get(&text, "font");
    assert_eq!(facet_get(&font, "pixelSize"), Some(Value::Number(12.)));
    assert_eq!(facet_get(&font, "family"), Some(Value::from("Sans")));
    assert_eq!(get(&text, "pos"), Value::Point(Point::new(5., 0.)));
    assert_eq!(get(&text, "elide"), Value::Number(2.));

    text.set("text", "Serif").unwrap();
    assert_eq!(facet_get(&get(&text, "font"), "family"), Some(Value::from("Serif")));
    assert_eq!(facet_get(&get(&text, "font"), "pixelSize"), Some(Value::Number(12.)));
}

#[test]
fn ids_shadow_scope_properties() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///shadow.qml").root("Item", |root| {
        root.child("Text", |text| {
            text.id("text")
                .string("text", "Sans")
                .declare_property("found", PropertyType::Var)
                .script("found", Expression::lookup("text"))
                .declare_property("content", PropertyType::String)
                .script("content", Expression::lookup("text").member("text"));
        });
    });
    let root = create(&engine, unit);
    let text = by_id(&root, "text");
    assert_eq!(get(&text, "found"), Value::from_object(&text));
    assert_eq!(get(&text, "content"), Value::from("Sans"));
}

#[test]
fn value_sources_and_interceptors() {
    let (engine, log) = setup();
    let unit = UnitBuilder::new("file:///animated.qml").root("Item", |root| {
        root.on("x", "Animation", |a| {
            a.number("to", 100.);
        });
        root.on("y", "Behavior", |b| {
            b.id("behavior");
        });
        root.number("y", 5.);
    });
    let root = create(&engine, unit);
    assert_eq!(take_events(&log), ["Animation on x"]);
    assert_eq!(get(&root, "x"), Value::Number(100.));

    let behavior = by_id(&root, "behavior");
    assert_eq!(get(&root, "y"), Value::Number(5.));
    assert_eq!(get(&behavior, "interceptedCount"), Value::Number(1.));
    root.set("y", 7.).unwrap();
    assert_eq!(get(&root, "y"), Value::Number(7.));
    assert_eq!(get(&behavior, "interceptedCount"), Value::Number(2.));

    let unit = UnitBuilder::new("file:///animated.qml").root("Item", |root| {
        root.on("x", "Item", |_| {});
    });
    assert_eq!(creation_errors(&engine, unit), ["\"Item\" cannot operate on \"x\""]);
}

#[test]
fn component_completed_after_bindings() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///completed.qml").root("Item", |root| {
        root.script("y", Expression::lookup("x").binary(BinaryOp::Add, 1));
        root.attached("Component", |c| {
            c.handler("onCompleted", Expression::lookup("x").assign(42));
        });
    });
    let root = create(&engine, unit);
    assert_eq!(get(&root, "x"), Value::Number(42.));
    assert_eq!(get(&root, "y"), Value::Number(43.));
}

#[test]
fn signal_handlers() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///clicker.qml").root("Clicker", |root| {
        root.handler("onClicked", Expression::lookup("clicks").assign(Expression::lookup("x")))
            .handler("onClicksChanged", Expression::lookup("objectName").assign("changed"))
            .function("double", &["v"], Expression::lookup("v").binary(BinaryOp::Mul, 2));
        root.child("Item", |_| {});
    });
    // Clicker has no default property
    assert_eq!(creation_errors(&engine, unit), ["Cannot assign to non-existent default property"]);

    let unit = UnitBuilder::new("file:///clicker.qml").root("Clicker", |root| {
        root.handler("onClicked", Expression::lookup("clicks").assign(Expression::lookup("x")))
            .handler("onClicksChanged", Expression::lookup("objectName").assign("changed"))
            .function("double", &["v"], Expression::lookup("v").binary(BinaryOp::Mul, 2));
    });
    let root = create(&engine, unit);
    assert_eq!(root.invoke("click", &[Value::Number(7.)]), Some(Ok(Value::Undefined)));
    assert_eq!(get(&root, "clicks"), Value::Number(7.));
    assert_eq!(get(&root, "objectName"), Value::from("changed"));
    assert_eq!(root.invoke("double", &[Value::Number(4.)]), Some(Ok(Value::Number(8.))));
}

#[test]
fn objects_assigned_to_signals() {
    let (engine, log) = setup();
    let unit = UnitBuilder::new("file:///slots.qml").root("Clicker", |root| {
        root.declare_signal("measured", &[("value", PropertyType::Real)]);
        root.object("onMeasured", "Slotted", |s| {
            s.id("slot");
        });
    });
    let root = create(&engine, unit);
    assert!(root.emit_by_name("measured", &[Value::Number(2.5)]));
    assert_eq!(take_events(&log), ["record 2.5"]);
    assert_eq!(get(&by_id(&root, "slot"), "total"), Value::Number(2.5));

    let unit = UnitBuilder::new("file:///slots.qml").root("Clicker", |root| {
        root.object("onNamed", "Slotted", |_| {});
    });
    assert_eq!(
        creation_errors(&engine, unit),
        ["Cannot connect mismatched signal/slot named(string) vs record(real)"]
    );

    let unit = UnitBuilder::new("file:///slots.qml").root("Clicker", |root| {
        root.object("onClicked", "Item", |_| {});
    });
    assert_eq!(
        creation_errors(&engine, unit),
        ["Cannot assign object type Item with no default method"]
    );
}

#[test]
fn aliases() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///alias.qml").root("Item", |root| {
        root.declare_alias("label", "txt", Some("text"))
            .declare_alias("content", "txt", None)
            .string("label", "hello");
        root.child("Text", |t| {
            t.id("txt");
        });
    });
    let root = create(&engine, unit);
    let txt = by_id(&root, "txt");
    assert_eq!(get(&txt, "text"), Value::from("hello"));
    assert_eq!(get(&root, "label"), Value::from("hello"));
    assert_eq!(get(&root, "content").as_object().map(|o| Rc::ptr_eq(&o, &txt)), Some(true));

    root.set("label", "bye").unwrap();
    assert_eq!(get(&txt, "text"), Value::from("bye"));
}

#[test]
fn objects_assigned_through_list_alias_are_appended() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///list_alias.qml").root("Item", |root| {
        root.declare_alias("kids", "inner", Some("data"))
            .object("kids", "Item", |a| {
                a.id("a");
            })
            .object("kids", "Item", |b| {
                b.id("b");
            });
        root.child("Item", |inner| {
            inner.id("inner").child("Item", |c| {
                c.id("c");
            });
        });
    });
    let root = create(&engine, unit);
    let inner = by_id(&root, "inner");
    let expected: Vec<_> =
        ["c", "a", "b"].iter().map(|id| Value::from_object(&by_id(&root, id))).collect();
    assert_eq!(get(&inner, "data"), Value::List(expected.clone()));
    assert_eq!(get(&root, "kids"), Value::List(expected));
    assert_eq!(get(&root, "data"), Value::List(vec![Value::from_object(&inner)]));
}

#[test]
fn fully_dynamic_types() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///map.qml").root("PropertyMap", |root| {
        root.number("foo", 1.)
            .string("bar", "x")
            .script("baz", Expression::lookup("foo").binary(BinaryOp::Add, 1));
    });
    let root = create(&engine, unit);
    assert_eq!(get(&root, "foo"), Value::Number(1.));
    assert_eq!(get(&root, "bar"), Value::from("x"));
    assert_eq!(get(&root, "baz"), Value::Number(2.));
    root.set("foo", 10.).unwrap();
    assert_eq!(get(&root, "baz"), Value::Number(11.));
}

#[test]
fn inline_components_create_objects() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///factory.qml").root("Item", |root| {
        root.id("root")
            .number("width", 10.)
            .declare_property("delegate", PropertyType::Object(Some("Component".into())))
            .component("delegate", "Item", |d| {
                d.script(
                    "width",
                    Expression::lookup("root").member("width").binary(BinaryOp::Add, 1),
                );
            })
            .function(
                "make",
                &[],
                Expression::lookup("delegate")
                    .method_call("createObject", vec![Expression::lookup("root")]),
            );
    });
    let root = create(&engine, unit);
    let delegate = get(&root, "delegate").as_object().unwrap();
    assert_eq!(delegate.type_name(), "Component");
    assert_eq!(get(&delegate, "status"), Value::Number(1.));
    assert_eq!(get(&delegate, "url"), Value::from("file:///factory.qml"));
    let component = Component::from_object(&delegate).unwrap();
    assert!(component.is_ready());
    assert!(component.sub_component().is_some());

    let created = match root.invoke("make", &[]) {
        Some(Ok(value)) => value.as_object().unwrap(),
        other => panic!("unexpected result {other:?}"),
    };
    assert_eq!(get(&created, "width"), Value::Number(11.));
    assert!(created.parent().is_some_and(|p| Rc::ptr_eq(&p, &root)));
    root.set("width", 20.).unwrap();
    assert_eq!(get(&created, "width"), Value::Number(21.));
}

#[test]
fn component_status() {
    let (engine, _) = setup();
    let component = Component::new(&engine);
    assert_eq!(component.status(), ComponentStatus::Null);
    assert!(component.create(None).is_none());
    assert_eq!(
        component.errors().iter().map(|d| d.message()).collect::<Vec<_>>(),
        ["Component is not ready"]
    );
    assert_eq!(component.status(), ComponentStatus::Error);

    component.set_unit(UnitBuilder::new("file:///late.qml").root("Item", |_| {}));
    assert_eq!(component.status(), ComponentStatus::Ready);
    assert!(component.create(None).is_some());

    let component = Component::new(&engine);
    component.set_loading();
    assert_eq!(component.status(), ComponentStatus::Loading);
    assert_eq!(ComponentStatus::Loading.to_int(), 2);

    let item = Component::from_type_name(&engine, "Item").unwrap();
    assert_eq!(item.create(None).map(|o| o.type_name().to_string()), Some("Item".to_string()));
    assert!(Component::from_type_name(&engine, "Nope").is_none());
}

#[test]
fn assignment_errors() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///errors.qml").root("ValueHolder", |o| {
        o.number("nope", 1.)
            .at(7, 3)
            .number("constant", 1.)
            .string("c", "not a color")
            .number("items", 1.)
            .handler("onNope", Expression::from(1))
            .group("obj", |g| {
                g.number("x", 1.);
            })
            .attached("Item", |a| {
                a.number("x", 1.);
            })
            .object("clickable", "Item", |_| {})
            .object("obj", "Pen", |_| {})
            .object("fixed", "Item", |_| {})
            .object("items", "Pen", |_| {})
            .object("r", "Item", |_| {})
            .child("Item", |_| {});
    });
    let component = Component::from_unit(&engine, unit.clone());
    assert!(component.create(None).is_none());
    assert_eq!(
        component.errors().to_string_vec().first().map(String::as_str),
        Some("file:///errors.qml:7:3: Cannot assign to non-existent property \"nope\"")
    );
    assert_eq!(
        creation_errors(&engine, unit),
        [
            "Cannot assign to non-existent property \"nope\"",
            "Invalid property assignment: \"constant\" is a read-only property",
            "Invalid property assignment: color expected",
            "Cannot assign primitives to lists",
            "Cannot assign to non-existent property \"onNope\"",
            "Cannot set properties on obj as it is null",
            "Non-existent attached object",
            "Cannot assign object to interface property \"clickable\"",
            "Cannot assign object of type \"Pen\" to property \"obj\"",
            "Cannot assign object to read only list",
            "Cannot assign object to list property \"items\"",
            "Cannot assign object to property",
            "Cannot assign to non-existent default property",
        ]
    );
}

#[test]
fn type_errors() {
    let (engine, _) = setup();
    engine.registry_mut().register_composite_singleton(
        "Theme",
        UnitBuilder::new("file:///Theme.qml").root("QtObject", |_| {}),
    );
    let unit = UnitBuilder::new("file:///types.qml").root("Item", |root| {
        root.child("Foo", |_| {})
            .child("Settings", |_| {})
            .child("Abstract", |_| {})
            .child("Theme", |_| {})
            .child("ComponentAttached", |_| {});
    });
    assert_eq!(
        creation_errors(&engine, unit),
        [
            "Foo is not a type",
            "Unable to create object of singleton type Settings",
            "Abstract is an abstract type",
            "Composite Singleton Type Theme is not creatable",
            "ComponentAttached is an attached object",
        ]
    );

    let unit = UnitBuilder::new("file:///Loop.qml").root("Item", |root| {
        root.child("Loop", |_| {});
    });
    engine.register_composite_type("Loop", unit);
    let component = Component::from_type_name(&engine, "Loop").unwrap();
    assert!(component.create(None).is_none());
    assert_eq!(
        component.errors().iter().map(|d| d.message()).collect::<Vec<_>>(),
        ["Type Loop is instantiated recursively"]
    );
}

#[test]
fn composite_types() {
    let (engine, _) = setup();
    let button = UnitBuilder::new("file:///Button.qml").root("Item", |root| {
        root.id("self")
            .declare_property("label", PropertyType::String)
            .string("label", "default")
            .number("width", 50.);
        root.child("Text", |t| {
            t.id("text").script("text", Expression::lookup("self").member("label"));
        });
    });
    engine.register_composite_type("Button", button);
    let unit = UnitBuilder::new("file:///app.qml").root("Item", |root| {
        root.id("self");
        root.child("Button", |b| {
            b.id("ok").string("label", "OK");
        });
    });
    let root = create(&engine, unit);
    let ok = by_id(&root, "ok");
    assert_eq!(ok.type_name(), "Item");
    assert_eq!(get(&ok, "label"), Value::from("OK"));
    assert_eq!(get(&ok, "width"), Value::Number(50.));
    // the ids of each document resolve in its own context
    assert!(Rc::ptr_eq(&by_id(&root, "self"), &root));
    let text = ok.context().and_then(|c| c.id_object("text")).unwrap();
    assert_eq!(get(&text, "text"), Value::from("OK"));
    let root_context = root.context().unwrap();
    let outer_context = ok.declarative_data().outer_context.clone();
    assert!(outer_context.is_some_and(|c| Rc::ptr_eq(&c, &root_context)));
}

#[test]
fn imported_scripts() {
    let (engine, _) = setup();
    let builder = UnitBuilder::new("file:///scripts.qml").import_script("Scale", Value::Number(3.));
    let unit = builder.root("Item", |root| {
        root.number("width", 4.).script(
            "height",
            Expression::lookup("width").binary(BinaryOp::Mul, Expression::lookup("Scale")),
        );
    });
    let root = create(&engine, unit);
    assert_eq!(get(&root, "height"), Value::Number(12.));
}

#[test]
fn recursion_is_bounded() {
    let (engine, log) = setup();
    let nest = UnitBuilder::new("file:///Nest.qml").root("Loader", |loader| {
        loader.string("objectName", "nest").component("sourceComponent", "Nest", |_| {});
    });
    engine.register_composite_type("Nest", nest);
    let component = Component::from_type_name(&engine, "Nest").unwrap();
    let root = component.create(None).unwrap();
    assert!(component.errors().is_empty());

    let mut depth = 1;
    let mut current = root.clone();
    while let Some(next) = get(&current, "item").as_object() {
        depth += 1;
        current = next;
    }
    assert_eq!(depth, engine.configuration().max_recursion_depth);
    assert_eq!(get(&current, "status"), Value::Number(IncubatorStatus::Error as i32 as f64));

    let recursing = "Loader nest error: Component creation is recursing - aborting";
    let expected = std::iter::once(recursing.to_string())
        .chain(std::iter::repeat_n("Loader nest ready".to_string(), depth - 1))
        .collect::<Vec<_>>();
    assert_eq!(take_events(&log), expected);
    assert_eq!(engine.creation_depth(), 0);
}

fn statuses(incubator: &Incubator) -> Rc<RefCell<Vec<IncubatorStatus>>> {
    let statuses = Rc::new(RefCell::new(Vec::new()));
    let recorder = statuses.clone();
    incubator.set_status_changed(move |status| recorder.borrow_mut().push(status));
    statuses
}

fn tracker_unit() -> Rc<CompilationUnit> {
    UnitBuilder::new("file:///incubated.qml").root("Tracker", |root| {
        root.string("objectName", "t")
            .script("value", Expression::from(20).binary(BinaryOp::Add, 1));
    })
}

#[test]
fn synchronous_incubation() {
    let (engine, log) = setup();
    let component = Component::from_unit(&engine, tracker_unit());
    let incubator = Incubator::new(IncubationMode::Synchronous);
    let seen = statuses(&incubator);
    component.incubate(&incubator, None);
    assert_eq!(*seen.borrow(), [IncubatorStatus::Loading, IncubatorStatus::Ready]);
    let object = incubator.object().unwrap();
    assert_eq!(get(&object, "value"), Value::Number(21.));
    assert!(take_events(&log).contains(&"componentComplete t value=21".to_string()));

    assert_eq!(Incubator::for_engine(&engine).mode(), IncubationMode::AsynchronousIfNested);

    // without controller, asynchronous incubation completes right away
    let incubator = Incubator::new(IncubationMode::Asynchronous);
    component.incubate(&incubator, None);
    assert!(incubator.is_ready());
}

#[test]
fn asynchronous_incubation() {
    let (engine, log) = setup();
    let controller = IncubationController::new(&engine);
    let counts = Rc::new(RefCell::new(Vec::new()));
    let recorder = counts.clone();
    controller.set_count_changed(move |count| recorder.borrow_mut().push(count));

    let component = Component::from_unit(&engine, tracker_unit());
    let incubator = Incubator::new(IncubationMode::Asynchronous);
    incubator.set_initial_properties([("value".into(), Value::Number(5.))]);
    component.incubate(&incubator, None);
    assert!(incubator.is_loading());
    assert!(incubator.object().is_none());
    assert_eq!(controller.incubating_object_count(), 1);
    assert!(take_events(&log).is_empty());

    // at least one step is made even when interrupted right away
    controller.incubate_while(Rc::new(Cell::new(false)), None);
    assert!(incubator.is_loading());
    assert_eq!(take_events(&log), ["classBegin"]);

    controller.incubate_for(Duration::from_secs(10));
    assert!(incubator.is_ready());
    let object = incubator.object().unwrap();
    assert_eq!(get(&object, "value"), Value::Number(5.));
    assert_eq!(take_events(&log), ["componentComplete t value=5", "finalize t"]);
    assert_eq!(controller.incubating_object_count(), 0);
    assert_eq!(*counts.borrow(), [1, 0]);
}

#[test]
fn force_completion_and_clear() {
    let (engine, log) = setup();
    let controller = IncubationController::new(&engine);
    let component = Component::from_unit(&engine, tracker_unit());

    let incubator = Incubator::new(IncubationMode::Asynchronous);
    component.incubate(&incubator, None);
    incubator.force_completion();
    assert!(incubator.is_ready());
    assert!(incubator.object().is_some());
    take_events(&log);

    let incubator = Incubator::new(IncubationMode::Asynchronous);
    let seen = statuses(&incubator);
    component.incubate(&incubator, None);
    controller.incubate_while(Rc::new(Cell::new(false)), None);
    assert!(incubator.is_loading());
    incubator.clear();
    assert_eq!(incubator.status(), IncubatorStatus::Null);
    assert_eq!(*seen.borrow(), [IncubatorStatus::Loading, IncubatorStatus::Null]);
    assert_eq!(controller.incubating_object_count(), 0);
    controller.incubate_for(Duration::from_secs(1));
    assert!(incubator.object().is_none());
    assert_eq!(take_events(&log), ["classBegin"]);

    // a cleared incubator can be reused
    component.incubate(&incubator, None);
    incubator.force_completion();
    assert!(incubator.is_ready());
}

#[test]
fn incubation_errors() {
    let (engine, _) = setup();
    let unit = UnitBuilder::new("file:///bad.qml").root("Item", |root| {
        root.child("Foo", |_| {});
    });
    let component = Component::from_unit(&engine, unit);
    let incubator = Incubator::new(IncubationMode::Synchronous);
    component.incubate(&incubator, None);
    assert!(incubator.is_error());
    assert!(incubator.object().is_none());
    assert_eq!(
        incubator.errors().iter().map(|d| d.message()).collect::<Vec<_>>(),
        ["Foo is not a type"]
    );

    let incubator = Incubator::new(IncubationMode::Synchronous);
    component.incubate(&incubator, Some(&{
        let context = i_qmlrt_runtime::context::Context::new(
            Some(engine.root_context()),
            &engine,
            "file:///gone.qml",
        );
        context.invalidate();
        context
    }));
    assert_eq!(
        incubator.errors().iter().map(|d| d.message()).collect::<Vec<_>>(),
        ["Cannot create a component in an invalid context"]
    );
}

#[test]
fn nested_incubation_completes_inner_first() {
    let (engine, log) = setup();
    let controller = IncubationController::new(&engine);
    let unit = UnitBuilder::new("file:///outer.qml").root("Item", |root| {
        root.string("objectName", "outer");
        root.child("Loader", |loader| {
            loader.id("loader").string("objectName", "loader").component(
                "sourceComponent",
                "Item",
                |inner| {
                    inner.string("objectName", "inner");
                },
            );
        });
    });
    let component = Component::from_unit(&engine, unit);
    let outer = Incubator::new(IncubationMode::Asynchronous);
    let outer_log = log.clone();
    outer.set_status_changed(move |status| outer_log.borrow_mut().push(format!("outer {status}")));
    component.incubate(&outer, None);

    controller.incubate_while(Rc::new(Cell::new(true)), None);
    assert_eq!(take_events(&log), ["outer Loading", "Loader loader ready", "outer Ready"]);

    let root = outer.object().unwrap();
    let loader = by_id(&root, "loader");
    let item = get(&loader, "item").as_object().unwrap();
    assert_eq!(get(&item, "objectName"), Value::from("inner"));
    assert!(item.parent().is_some_and(|p| Rc::ptr_eq(&p, &loader)));
    assert_eq!(controller.incubating_object_count(), 0);
}
