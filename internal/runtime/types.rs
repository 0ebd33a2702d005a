// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
Native types, their capabilities, and the type registry.

Every instantiable native type declares at registration time which of the capability
interfaces it implements ([`Capabilities`]). The per-instance implementation is reached
through the object's [`NativeBehavior`].
*/

use crate::compiled::{CompilationUnit, CompiledBinding};
use crate::diagnostics::Diagnostics;
use crate::object::{ObjectRc, ObjectWeak};
use crate::property::{
    MethodData, PropertyCache, PropertyData, PropertyFlags, PropertyType, SignalData,
    SignalParameter,
};
use crate::value::Value;
use once_cell::unsync::OnceCell;
use smol_str::SmolStr;
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

/// Callbacks a [`ParserStatus`] implementation can register from `class_begin`. They run
/// in the finalize phase, after every `component_complete`.
#[derive(Default)]
pub struct FinalizeHooks {
    callbacks: Vec<Box<dyn FnOnce()>>,
}

impl FinalizeHooks {
    pub fn register(&mut self, callback: impl FnOnce() + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn take(&mut self) -> Vec<Box<dyn FnOnce()>> {
        std::mem::take(&mut self.callbacks)
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// `classBegin` / `componentComplete` lifecycle hooks bracketing the construction of an object
pub trait ParserStatus {
    /// Called right after the object is instantiated, before any of its properties is set
    fn class_begin(&self, object: &ObjectRc, hooks: &mut FinalizeHooks);
    /// Called in the finalize phase, after all bindings of the tree are enabled
    fn component_complete(&self, object: &ObjectRc);
}

/// A type-specific parser consuming the bindings flagged as custom parser bindings
pub trait CustomParser {
    fn apply_bindings(
        &self,
        object: &ObjectRc,
        unit: &Rc<CompilationUnit>,
        bindings: &[&CompiledBinding],
    ) -> Result<(), Diagnostics>;
}

/// A property of an object, possibly restricted to one facet of a value type
#[derive(Debug, Clone)]
pub struct PropertyRef {
    pub object: ObjectWeak,
    pub property: usize,
    pub facet: Option<SmolStr>,
}

impl PropertyRef {
    pub fn object(&self) -> Option<ObjectRc> {
        self.object.upgrade().filter(|o| !o.is_destroyed())
    }

    pub fn read(&self) -> Value {
        let Some(object) = self.object() else { return Value::Undefined };
        let value = object.read_property(self.property);
        match &self.facet {
            Some(facet) => crate::property::facet_get(&value, facet).unwrap_or_default(),
            None => value,
        }
    }

    /// Writes without going through interceptors
    pub fn write_direct(&self, value: Value) -> Result<(), crate::object::SetPropertyError> {
        let Some(object) = self.object() else {
            return Err(crate::object::SetPropertyError::ObjectDestroyed);
        };
        match &self.facet {
            Some(facet) => object.write_facet_direct(self.property, facet, value),
            None => object.write_property_direct(self.property, value).map(|_| ()),
        }
    }

    /// Writes through interceptors, leaving bindings in place
    pub fn write(&self, value: Value) -> Result<(), crate::object::SetPropertyError> {
        let Some(object) = self.object() else {
            return Err(crate::object::SetPropertyError::ObjectDestroyed);
        };
        match &self.facet {
            Some(facet) => object.write_facet(self.property, facet, value),
            None => object.write_property(self.property, value),
        }
    }

    pub fn name(&self) -> SmolStr {
        let Some(object) = self.object() else { return SmolStr::default() };
        let name = object
            .property_cache()
            .property(self.property)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        match &self.facet {
            Some(facet) => smol_str::format_smolstr!("{name}.{facet}"),
            None => name,
        }
    }
}

/// An object driving the value of a property over time, like an animation (`Animation on x`)
pub trait PropertyValueSource {
    fn set_target(&self, object: &ObjectRc, target: PropertyRef);
}

/// An object intercepting writes to a property (`Behavior on x`)
pub trait PropertyValueInterceptor {
    fn set_target(&self, object: &ObjectRc, target: PropertyRef);
    /// Receives every value written to the target. Implementations write the value through
    /// with [`PropertyRef::write_direct`] when they see fit.
    fn write(&self, object: &ObjectRc, value: Value);
}

macro_rules! capability_flags {
    ($($flag:ident = $bit:expr,)*) => {
        /// The closed set of capability interfaces a native type can implement
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct Capabilities(u8);

        impl Capabilities {
            $(pub const $flag: Self = Self(1 << $bit);)*

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }
        }
    };
}

capability_flags!(
    PARSER_STATUS = 0,
    CUSTOM_PARSER = 1,
    PROPERTY_VALUE_SOURCE = 2,
    PROPERTY_VALUE_INTERCEPTOR = 3,
);

/// The per-instance native state and behavior of an object.
///
/// The capability accessors only need to be implemented for the capabilities the type
/// declares.
pub trait NativeBehavior: Any {
    fn as_any(&self) -> &dyn Any;

    /// Called once the object exists, before anything else happens to it
    fn initialize(&self, _object: &ObjectRc) {}

    fn parser_status(&self) -> Option<&dyn ParserStatus> {
        None
    }

    fn value_source(&self) -> Option<&dyn PropertyValueSource> {
        None
    }

    fn interceptor(&self) -> Option<&dyn PropertyValueInterceptor> {
        None
    }

    /// Invokes a native method. `None` if there is no such method.
    fn invoke(
        &self,
        _object: &ObjectRc,
        _method: &str,
        _args: &[Value],
    ) -> Option<Result<Value, String>> {
        None
    }
}

/// The behavior of types without native state
#[derive(Default)]
pub struct DefaultBehavior;

impl NativeBehavior for DefaultBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub type BehaviorFactory = Rc<dyn Fn() -> Box<dyn NativeBehavior>>;

pub struct NativeType {
    name: SmolStr,
    properties: Vec<PropertyData>,
    signals: Vec<SignalData>,
    methods: Vec<MethodData>,
    default_property: Option<SmolStr>,
    default_method: Option<SmolStr>,
    capabilities: Capabilities,
    /// Names this type can be cast to: its own, its bases' and its interfaces'
    interfaces: Vec<SmolStr>,
    factory: Option<BehaviorFactory>,
    attached_type: Option<Rc<NativeType>>,
    not_creatable_reason: Option<SmolStr>,
    singleton: bool,
    fully_dynamic: bool,
    custom_parser: Option<Rc<dyn CustomParser>>,
    cache: OnceCell<Rc<PropertyCache>>,
}

impl NativeType {
    pub fn builder(name: &str) -> NativeTypeBuilder {
        NativeTypeBuilder {
            ty: NativeType {
                name: name.into(),
                properties: Vec::new(),
                signals: Vec::new(),
                methods: Vec::new(),
                default_property: None,
                default_method: None,
                capabilities: Capabilities::default(),
                interfaces: vec![name.into()],
                factory: None,
                attached_type: None,
                not_creatable_reason: None,
                singleton: false,
                fully_dynamic: false,
                custom_parser: None,
                cache: OnceCell::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether instances of this type can be used where `name` is expected
    pub fn is_a(&self, name: &str) -> bool {
        self.interfaces.iter().any(|i| i == name)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn has_capability(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn default_method(&self) -> Option<&MethodData> {
        let name = self.default_method.as_ref()?;
        self.methods.iter().find(|m| &m.name == name)
    }

    pub fn attached_type(&self) -> Option<&Rc<NativeType>> {
        self.attached_type.as_ref()
    }

    pub fn not_creatable_reason(&self) -> Option<&str> {
        self.not_creatable_reason.as_deref()
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// Instances get a property cache of their own that can grow while bindings are applied
    pub fn is_fully_dynamic(&self) -> bool {
        self.fully_dynamic
    }

    pub fn custom_parser(&self) -> Option<&Rc<dyn CustomParser>> {
        self.custom_parser.as_ref()
    }

    pub fn create_behavior(&self) -> Box<dyn NativeBehavior> {
        match &self.factory {
            Some(factory) => factory(),
            None => Box::new(DefaultBehavior),
        }
    }

    pub fn property_cache(&self) -> Rc<PropertyCache> {
        self.cache
            .get_or_init(|| {
                let mut cache = PropertyCache::new(self.name.clone());
                for p in &self.properties {
                    cache.add_property(p.clone());
                }
                for s in &self.signals {
                    cache.add_signal(s.clone());
                }
                for m in &self.methods {
                    cache.add_method(m.clone());
                }
                if let Some(default) = &self.default_property {
                    cache.set_default_property(default);
                }
                Rc::new(cache)
            })
            .clone()
    }
}

impl std::fmt::Debug for NativeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeType")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

pub struct NativeTypeBuilder {
    ty: NativeType,
}

impl NativeTypeBuilder {
    /// Inherits the members, interfaces and attached type of `base`
    pub fn inherits(mut self, base: &NativeType) -> Self {
        self.ty.properties.extend(base.properties.iter().cloned());
        self.ty.signals.extend(base.signals.iter().cloned());
        self.ty.methods.extend(base.methods.iter().cloned());
        self.ty.interfaces.extend(base.interfaces.iter().cloned());
        self.ty.default_property =
            self.ty.default_property.or_else(|| base.default_property.clone());
        self.ty.default_method = self.ty.default_method.or_else(|| base.default_method.clone());
        self.ty.capabilities.insert(base.capabilities);
        if self.ty.attached_type.is_none() {
            self.ty.attached_type = base.attached_type.clone();
        }
        if self.ty.factory.is_none() {
            self.ty.factory = base.factory.clone();
        }
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.ty.interfaces.push(interface.into());
        self
    }

    pub fn property(mut self, name: &str, ty: PropertyType) -> Self {
        self.ty.properties.push(PropertyData::new(name, ty));
        self
    }

    pub fn property_with_value(
        mut self,
        name: &str,
        ty: PropertyType,
        value: impl Into<Value>,
    ) -> Self {
        let mut data = PropertyData::new(name, ty);
        data.initial_value = Some(value.into());
        self.ty.properties.push(data);
        self
    }

    pub fn read_only_property(mut self, name: &str, ty: PropertyType) -> Self {
        let mut data = PropertyData::new(name, ty);
        data.flags.remove(PropertyFlags::WRITABLE);
        self.ty.properties.push(data);
        self
    }

    pub fn default_property(mut self, name: &str) -> Self {
        self.ty.default_property = Some(name.into());
        self
    }

    pub fn signal(mut self, name: &str, parameters: &[(&str, PropertyType)]) -> Self {
        self.ty.signals.push(SignalData {
            name: name.into(),
            parameters: parameters
                .iter()
                .map(|(n, t)| SignalParameter { name: (*n).into(), ty: t.clone() })
                .collect(),
        });
        self
    }

    pub fn method(mut self, name: &str, parameters: &[PropertyType]) -> Self {
        self.ty.methods.push(MethodData { name: name.into(), parameters: parameters.to_vec() });
        self
    }

    /// The method called when an object of this type is assigned to a signal
    pub fn default_method(mut self, name: &str) -> Self {
        self.ty.default_method = Some(name.into());
        self
    }

    pub fn attached(mut self, attached_type: Rc<NativeType>) -> Self {
        self.ty.attached_type = Some(attached_type);
        self
    }

    pub fn behavior<B: NativeBehavior>(mut self, factory: impl Fn() -> B + 'static) -> Self {
        self.ty.factory = Some(Rc::new(move || Box::new(factory()) as Box<dyn NativeBehavior>));
        self
    }

    pub fn capability(mut self, capability: Capabilities) -> Self {
        self.ty.capabilities.insert(capability);
        self
    }

    pub fn custom_parser(mut self, parser: impl CustomParser + 'static) -> Self {
        self.ty.custom_parser = Some(Rc::new(parser));
        self.ty.capabilities.insert(Capabilities::CUSTOM_PARSER);
        self
    }

    pub fn uncreatable(mut self, reason: &str) -> Self {
        self.ty.not_creatable_reason = Some(reason.into());
        self
    }

    pub fn singleton(mut self) -> Self {
        self.ty.singleton = true;
        self
    }

    pub fn fully_dynamic(mut self) -> Self {
        self.ty.fully_dynamic = true;
        self
    }

    pub fn build(self) -> Rc<NativeType> {
        Rc::new(self.ty)
    }
}

#[derive(Clone)]
pub enum TypeEntry {
    Native(Rc<NativeType>),
    /// A type defined by another document
    Composite(Rc<CompilationUnit>),
    /// A document type only reachable as a singleton, never instantiated directly
    CompositeSingleton(Rc<CompilationUnit>),
}

pub type StringConverter = Rc<dyn Fn(&str) -> Option<Value>>;

/// Name of the built-in type of inline components and of the `Component` attached object
pub const COMPONENT_TYPE_NAME: &str = "Component";

pub struct TypeRegistry {
    types: HashMap<SmolStr, TypeEntry>,
    string_converters: HashMap<SmolStr, StringConverter>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let mut registry = Self { types: HashMap::new(), string_converters: HashMap::new() };
        registry.register_builtins();
        registry
    }
}

impl TypeRegistry {
    fn register_builtins(&mut self) {
        let qt_object =
            NativeType::builder("QtObject").property("objectName", PropertyType::String).build();
        let component_attached = NativeType::builder("ComponentAttached")
            .signal("completed", &[])
            .signal("destruction", &[])
            .uncreatable("ComponentAttached is an attached object")
            .build();
        let component = NativeType::builder(COMPONENT_TYPE_NAME)
            .inherits(&qt_object)
            .read_only_property("status", PropertyType::Int)
            .read_only_property("url", PropertyType::Url)
            .method("createObject", &[PropertyType::Object(None)])
            .attached(component_attached.clone())
            .build();
        self.register_native(qt_object);
        self.register_native(component);
        self.register_native(component_attached);
    }

    pub fn register_native(&mut self, ty: Rc<NativeType>) {
        self.types.insert(ty.name.clone(), TypeEntry::Native(ty));
    }

    pub fn register_composite(&mut self, name: &str, unit: Rc<CompilationUnit>) {
        self.types.insert(name.into(), TypeEntry::Composite(unit));
    }

    pub fn register_composite_singleton(&mut self, name: &str, unit: Rc<CompilationUnit>) {
        self.types.insert(name.into(), TypeEntry::CompositeSingleton(unit));
    }

    /// Registers a conversion from string literals for properties of the custom type `name`
    pub fn register_string_converter(
        &mut self,
        name: &str,
        converter: impl Fn(&str) -> Option<Value> + 'static,
    ) {
        self.string_converters.insert(name.into(), Rc::new(converter));
    }

    pub fn lookup(&self, name: &str) -> Option<TypeEntry> {
        self.types.get(name).cloned()
    }

    pub fn native_type(&self, name: &str) -> Option<Rc<NativeType>> {
        match self.types.get(name) {
            Some(TypeEntry::Native(ty)) => Some(ty.clone()),
            _ => None,
        }
    }

    pub fn string_converter(&self, name: &str) -> Option<StringConverter> {
        self.string_converters.get(name).cloned()
    }
}

#[test]
fn native_type_inheritance() {
    let base = NativeType::builder("Item")
        .property("x", PropertyType::Real)
        .signal("moved", &[])
        .default_property("x")
        .capability(Capabilities::PARSER_STATUS)
        .build();
    let derived = NativeType::builder("Rectangle")
        .inherits(&base)
        .property("color", PropertyType::Color)
        .build();
    assert!(derived.is_a("Item"));
    assert!(derived.is_a("Rectangle"));
    assert!(!base.is_a("Rectangle"));
    assert!(derived.has_capability(Capabilities::PARSER_STATUS));
    let cache = derived.property_cache();
    assert_eq!(cache.property_index("color"), Some(1));
    assert_eq!(cache.default_property().map(|(i, _)| i), Some(0));
    assert!(Rc::ptr_eq(&cache, &derived.property_cache()));

    let registry = TypeRegistry::default();
    let component = registry.native_type(COMPONENT_TYPE_NAME).unwrap();
    assert!(component.attached_type().unwrap().property_cache().signal("completed").is_some());
    let attached = registry.native_type("ComponentAttached").unwrap();
    assert!(Rc::ptr_eq(&attached, component.attached_type().unwrap()));
    assert_eq!(attached.not_creatable_reason(), Some("ComponentAttached is an attached object"));
}
