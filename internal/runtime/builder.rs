// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
Programmatic construction of [`CompilationUnit`]s.

This plays the role of the offline document compiler: it lays out the flat object table,
computes the id tables of every naming scope and the object flags derived from the bindings.

```
use i_qmlrt_runtime::builder::UnitBuilder;
use i_qmlrt_runtime::expression::{BinaryOp, Expression};
use i_qmlrt_runtime::property::PropertyType;

let unit = UnitBuilder::new("file:///main.qml").root("Item", |root| {
    root.id("root").declare_property("x", PropertyType::Int).number("x", 5.);
    root.child("Item", |kid| {
        kid.id("kid")
            .declare_property("y", PropertyType::Int)
            .script("y", Expression::lookup("root").member("x").binary(BinaryOp::Mul, 2));
    });
});
assert_eq!(unit.object_count(), 2);
```
*/

use crate::compiled::*;
use crate::diagnostics::SourceLocation;
use crate::expression::Expression;
use crate::property::{AliasTarget, PropertyType};
use crate::types::COMPONENT_TYPE_NAME;
use crate::value::Value;
use smol_str::SmolStr;
use std::rc::Rc;
use typed_index_collections::TiVec;

#[derive(Default)]
struct UnitState {
    objects: TiVec<ObjectIndex, CompiledObject>,
    scripts: TiVec<ScriptIndex, Script>,
    next_line: u32,
}

impl UnitState {
    fn next_location(&mut self) -> SourceLocation {
        self.next_line += 1;
        SourceLocation::new(self.next_line, 1)
    }

    fn push_object(&mut self, type_name: &str) -> ObjectIndex {
        let location = self.next_location();
        let index = self.objects.next_key();
        let mut flags = ObjectFlags::empty();
        if type_name == COMPONENT_TYPE_NAME {
            flags.insert(ObjectFlags::IS_COMPONENT);
        }
        self.objects.push(CompiledObject {
            index,
            type_name: type_name.into(),
            id: None,
            id_index: None,
            flags,
            bindings: Vec::new(),
            properties: Vec::new(),
            signals: Vec::new(),
            functions: Vec::new(),
            location,
        });
        index
    }

    fn push_script(&mut self, expression: Expression, location: SourceLocation) -> ScriptIndex {
        let source = expression.to_string().into();
        self.scripts.push_and_get_key(Script { source, expression, location })
    }
}

pub struct UnitBuilder {
    url: SmolStr,
    state: UnitState,
    imported_scripts: Vec<ImportedScript>,
}

impl UnitBuilder {
    pub fn new(url: &str) -> Self {
        Self { url: url.into(), state: UnitState::default(), imported_scripts: Vec::new() }
    }

    /// Makes `value` reachable from expressions of the document under `name`
    pub fn import_script(mut self, name: &str, value: Value) -> Self {
        self.imported_scripts.push(ImportedScript { name: name.into(), value });
        self
    }

    /// Describes the root object and builds the unit
    pub fn root(
        mut self,
        type_name: &str,
        f: impl FnOnce(&mut ObjectBuilder),
    ) -> Rc<CompilationUnit> {
        debug_assert!(self.state.objects.is_empty());
        let index = self.state.push_object(type_name);
        f(&mut ObjectBuilder { state: &mut self.state, index });
        self.build()
    }

    fn build(self) -> Rc<CompilationUnit> {
        let UnitState { mut objects, scripts, .. } = self.state;
        for object in objects.iter_mut() {
            for binding in &object.bindings {
                if binding.is_deferred() {
                    object.flags.insert(ObjectFlags::HAS_DEFERRED_BINDINGS);
                }
                if binding.is_custom_parser_binding() {
                    object.flags.insert(ObjectFlags::HAS_CUSTOM_PARSER_BINDINGS);
                }
            }
        }

        let mut id_scopes = Vec::new();
        let mut roots = Vec::new();
        if !objects.is_empty() {
            roots.push(ObjectIndex::from(0));
        }
        while let Some(root) = roots.pop() {
            let mut scope = IdScope { root: Some(root), ids: Vec::new() };
            collect_ids(&mut objects, root, &mut scope, &mut roots);
            id_scopes.push(scope);
        }

        let binding_count = objects.iter().map(|o| o.bindings.len()).sum();
        Rc::new(CompilationUnit {
            url: self.url,
            objects,
            scripts,
            imported_scripts: self.imported_scripts,
            id_scopes,
            binding_count,
        })
    }
}

/// Fills the id table of `scope` with the objects reachable from `index`, stopping at inline
/// components which open scopes of their own
fn collect_ids(
    objects: &mut TiVec<ObjectIndex, CompiledObject>,
    index: ObjectIndex,
    scope: &mut IdScope,
    component_roots: &mut Vec<ObjectIndex>,
) {
    let object = &mut objects[index];
    if let Some(id) = &object.id {
        object.id_index = Some(scope.ids.len());
        scope.ids.push((id.clone(), index));
    }
    let is_component = object.is_component();
    let nested: Vec<ObjectIndex> = object
        .bindings
        .iter()
        .filter_map(|b| match b.value {
            BindingValue::Object(i)
            | BindingValue::AttachedProperty(i)
            | BindingValue::GroupProperty(i) => Some(i),
            _ => None,
        })
        .collect();
    for child in nested {
        if is_component {
            component_roots.push(child);
        } else {
            collect_ids(objects, child, scope, component_roots);
        }
    }
}

/// Describes one object of the unit. Binding modifiers such as [`Self::deferred`] apply to the
/// binding added last.
pub struct ObjectBuilder<'a> {
    state: &'a mut UnitState,
    index: ObjectIndex,
}

impl ObjectBuilder<'_> {
    fn compiled(&mut self) -> &mut CompiledObject {
        &mut self.state.objects[self.index]
    }

    pub fn index(&self) -> ObjectIndex {
        self.index
    }

    pub fn id(&mut self, id: &str) -> &mut Self {
        self.compiled().id = Some(id.into());
        self
    }

    fn push_binding(
        &mut self,
        property_name: &str,
        value: BindingValue,
        flags: BindingFlags,
    ) -> &mut Self {
        let location = self.state.next_location();
        let property_name = property_name.into();
        self.compiled().bindings.push(CompiledBinding { property_name, value, flags, location });
        self
    }

    fn declare(
        &mut self,
        name: &str,
        ty: PropertyType,
        alias: Option<AliasTarget>,
        is_default: bool,
    ) -> &mut Self {
        self.compiled().properties.push(PropertyDeclaration {
            name: name.into(),
            ty,
            alias,
            is_default,
            is_readonly: false,
        });
        self
    }

    /// `property <ty> name`
    pub fn declare_property(&mut self, name: &str, ty: PropertyType) -> &mut Self {
        self.declare(name, ty, None, false)
    }

    /// `default property <ty> name`
    pub fn declare_default_property(&mut self, name: &str, ty: PropertyType) -> &mut Self {
        self.declare(name, ty, None, true)
    }

    /// `readonly property <ty> name`
    pub fn declare_readonly_property(&mut self, name: &str, ty: PropertyType) -> &mut Self {
        self.declare(name, ty, None, false);
        if let Some(p) = self.compiled().properties.last_mut() {
            p.is_readonly = true;
        }
        self
    }

    /// `property alias name: object_id.property`, or `property alias name: object_id`
    pub fn declare_alias(
        &mut self,
        name: &str,
        object_id: &str,
        property: Option<&str>,
    ) -> &mut Self {
        let target =
            AliasTarget { object_id: object_id.into(), property: property.map(Into::into) };
        self.declare(name, PropertyType::Var, Some(target), false)
    }

    /// `signal name(parameters)`
    pub fn declare_signal(&mut self, name: &str, parameters: &[(&str, PropertyType)]) -> &mut Self {
        let parameters = parameters.iter().map(|(n, t)| (SmolStr::from(*n), t.clone())).collect();
        self.compiled().signals.push(SignalDeclaration { name: name.into(), parameters });
        self
    }

    /// `function name(parameters) { body }`
    pub fn function(&mut self, name: &str, parameters: &[&str], body: Expression) -> &mut Self {
        let location = self.state.next_location();
        let body = self.state.push_script(body, location);
        let parameters = parameters.iter().map(|p| SmolStr::from(*p)).collect();
        self.compiled().functions.push(FunctionDeclaration { name: name.into(), parameters, body });
        self
    }

    pub fn number(&mut self, property: &str, value: f64) -> &mut Self {
        self.push_binding(property, BindingValue::Number(value), BindingFlags::empty())
    }

    pub fn boolean(&mut self, property: &str, value: bool) -> &mut Self {
        self.push_binding(property, BindingValue::Boolean(value), BindingFlags::empty())
    }

    /// A string literal. Strings are converted to the property type when they are assigned, so
    /// this is also how colors, dates, points, urls and such are written.
    pub fn string(&mut self, property: &str, value: &str) -> &mut Self {
        self.push_binding(property, BindingValue::String(value.into()), BindingFlags::empty())
    }

    /// An enumeration value resolved at compile time
    pub fn enum_value(&mut self, property: &str, value: i32) -> &mut Self {
        let value = BindingValue::Number(value as f64);
        self.push_binding(property, value, BindingFlags::IS_RESOLVED_ENUM)
    }

    /// `property: expression`
    pub fn script(&mut self, property: &str, expression: Expression) -> &mut Self {
        let location = self.state.next_location();
        let script = self.state.push_script(expression, location);
        self.push_binding(property, BindingValue::Script(script), BindingFlags::empty())
    }

    /// `onSignal: expression`
    pub fn handler(&mut self, handler: &str, expression: Expression) -> &mut Self {
        self.script(handler, expression);
        self.flag_last(BindingFlags::IS_SIGNAL_HANDLER_EXPRESSION)
    }

    fn nested(
        &mut self,
        property: &str,
        type_name: &str,
        flags: BindingFlags,
        make_value: fn(ObjectIndex) -> BindingValue,
        f: impl FnOnce(&mut ObjectBuilder),
    ) -> &mut Self {
        let index = self.state.push_object(type_name);
        self.push_binding(property, make_value(index), flags);
        f(&mut ObjectBuilder { state: &mut *self.state, index });
        self
    }

    /// `property: Type { ... }`
    pub fn object(
        &mut self,
        property: &str,
        type_name: &str,
        f: impl FnOnce(&mut ObjectBuilder),
    ) -> &mut Self {
        self.nested(property, type_name, BindingFlags::empty(), BindingValue::Object, f)
    }

    /// A child object, assigned to the default property
    pub fn child(&mut self, type_name: &str, f: impl FnOnce(&mut ObjectBuilder)) -> &mut Self {
        self.object("", type_name, f)
    }

    /// `Type on property { ... }`: a value source or interceptor for `property`
    pub fn on(
        &mut self,
        property: &str,
        type_name: &str,
        f: impl FnOnce(&mut ObjectBuilder),
    ) -> &mut Self {
        self.nested(property, type_name, BindingFlags::IS_ON_ASSIGNMENT, BindingValue::Object, f)
    }

    /// `property: Component { RootType { ... } }`. An empty property name assigns the
    /// component to the default property.
    pub fn component(
        &mut self,
        property: &str,
        root_type: &str,
        f: impl FnOnce(&mut ObjectBuilder),
    ) -> &mut Self {
        self.object(property, COMPONENT_TYPE_NAME, |component| {
            component.child(root_type, f);
        })
    }

    /// `group.facet: ...` bindings, described on the group object
    pub fn group(&mut self, property: &str, f: impl FnOnce(&mut ObjectBuilder)) -> &mut Self {
        self.nested(property, "", BindingFlags::empty(), BindingValue::GroupProperty, f)
    }

    /// `AttachingType.property: ...` bindings, described on the attached object
    pub fn attached(
        &mut self,
        attaching_type: &str,
        f: impl FnOnce(&mut ObjectBuilder),
    ) -> &mut Self {
        self.nested(attaching_type, "", BindingFlags::empty(), BindingValue::AttachedProperty, f)
    }

    fn flag_last(&mut self, flag: BindingFlags) -> &mut Self {
        if let Some(binding) = self.compiled().bindings.last_mut() {
            binding.flags.insert(flag);
        }
        self
    }

    /// The last binding is only applied when the deferred properties are populated
    pub fn deferred(&mut self) -> &mut Self {
        self.flag_last(BindingFlags::IS_DEFERRED_BINDING)
    }

    /// The last binding is consumed by the custom parser of the object's type
    pub fn parsed_by_type(&mut self) -> &mut Self {
        self.flag_last(BindingFlags::IS_CUSTOM_PARSER_BINDING)
    }

    /// Sets the source location of the last binding
    pub fn at(&mut self, line: u32, column: u32) -> &mut Self {
        if let Some(binding) = self.compiled().bindings.last_mut() {
            binding.location = SourceLocation::new(line, column);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_scopes_and_flags() {
        let unit = UnitBuilder::new("file:///scopes.qml").root("Item", |root| {
            root.id("root");
            root.child("Item", |a| {
                a.id("a").number("x", 1.).deferred();
            });
            root.component("delegate", "Item", |d| {
                d.id("inner");
                d.child("Item", |b| {
                    b.id("b");
                });
            });
            root.child("ListModel", |m| {
                m.number("a", 1.).parsed_by_type().number("b", 2.).parsed_by_type().at(42, 7);
            });
        });

        assert_eq!(unit.id_scopes.len(), 2);
        let root_scope = unit.id_scope(unit.root_index()).unwrap();
        let ids = |scope: &crate::compiled::IdScope| {
            scope.ids.iter().map(|(n, _)| n.to_string()).collect::<Vec<_>>()
        };
        assert_eq!(ids(root_scope), ["root", "a"]);

        let component = unit.objects.iter().find(|o| o.is_component()).unwrap();
        let component_root = unit.component_root(component.index).unwrap();
        let inner_scope = unit.id_scope(component_root).unwrap();
        assert_eq!(ids(inner_scope), ["inner", "b"]);
        assert_eq!(unit.object(component_root).id_index, Some(0));

        let a = &unit.objects[ObjectIndex::from(1)];
        assert!(a.has_deferred_bindings());
        let model = unit.objects.iter().find(|o| o.type_name == "ListModel").unwrap();
        assert!(model.has_custom_parser_bindings());
        assert_eq!(model.bindings[1].location, SourceLocation::new(42, 7));
        assert_eq!(unit.binding_count, 8);
    }
}
