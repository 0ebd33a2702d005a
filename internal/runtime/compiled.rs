// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
The in-memory form of a compiled document.

A [`CompilationUnit`] is immutable once built and shared by reference counting between every
creator instantiating it. Objects are stored in a flat table; bindings refer to nested objects
and scripts by index.
*/

use crate::diagnostics::SourceLocation;
use crate::expression::Expression;
use crate::property::{AliasTarget, PropertyType};
use crate::value::Value;
use smol_str::SmolStr;
use typed_index_collections::TiVec;

#[derive(
    Debug,
    Clone,
    Copy,
    derive_more::Into,
    derive_more::From,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord
)]
pub struct ObjectIndex(usize);

#[derive(
    Debug,
    Clone,
    Copy,
    derive_more::Into,
    derive_more::From,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord
)]
pub struct ScriptIndex(usize);

/// A compiled expression together with its source text
#[derive(Debug, Clone)]
pub struct Script {
    pub source: SmolStr,
    pub expression: Expression,
    pub location: SourceLocation,
}

/// The value side of a [`CompiledBinding`]. Exactly one kind of payload is meaningful per
/// binding, selected by the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingValue {
    Number(f64),
    Boolean(bool),
    String(SmolStr),
    Script(ScriptIndex),
    /// A nested object, created and assigned to the property
    Object(ObjectIndex),
    /// `Type.property: ...` bindings, the object holds the bindings on the attached object
    AttachedProperty(ObjectIndex),
    /// `group.property: ...` bindings, the object holds the bindings on the group
    GroupProperty(ObjectIndex),
}

impl BindingValue {
    pub fn is_literal(&self) -> bool {
        matches!(self, BindingValue::Number(_) | BindingValue::Boolean(_) | BindingValue::String(_))
    }

    /// The literal as a value, for literal bindings
    pub fn literal(&self) -> Option<Value> {
        match self {
            BindingValue::Number(n) => Some(Value::Number(*n)),
            BindingValue::Boolean(b) => Some(Value::Bool(*b)),
            BindingValue::String(s) => Some(Value::String(s.clone())),
            _ => None,
        }
    }

    /// Source text of a literal, used for script strings
    pub fn literal_source(&self) -> Option<SmolStr> {
        match self {
            BindingValue::Number(n) => Some(Value::Number(*n).to_display_string()),
            BindingValue::Boolean(b) => Some(if *b { "true".into() } else { "false".into() }),
            BindingValue::String(s) => Some(smol_str::format_smolstr!("\"{s}\"")),
            _ => None,
        }
    }
}

macro_rules! declare_flags {
    ($(#[$attr:meta])* $name:ident { $($(#[$fattr:meta])* $flag:ident = $bit:expr,)* }) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $name(u8);

        impl $name {
            $($(#[$fattr])* pub const $flag: Self = Self(1 << $bit);)*

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

declare_flags!(
    BindingFlags {
        IS_SIGNAL_HANDLER_EXPRESSION = 0,
        /// `Animation on x { }`: the object is a value source or interceptor for the property
        IS_ON_ASSIGNMENT = 1,
        IS_DEFERRED_BINDING = 2,
        IS_CUSTOM_PARSER_BINDING = 3,
        /// The number literal is an already resolved enumeration value
        IS_RESOLVED_ENUM = 4,
    }
);

declare_flags!(
    ObjectFlags {
        /// An inline `Component { }`. Its content is only instantiated on demand.
        IS_COMPONENT = 0,
        HAS_DEFERRED_BINDINGS = 1,
        HAS_CUSTOM_PARSER_BINDINGS = 2,
    }
);

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBinding {
    /// Target property, handler (`onClicked`) or attaching type name. Empty for the default
    /// property.
    pub property_name: SmolStr,
    pub value: BindingValue,
    pub flags: BindingFlags,
    pub location: SourceLocation,
}

impl CompiledBinding {
    pub fn is_signal_handler(&self) -> bool {
        self.flags.contains(BindingFlags::IS_SIGNAL_HANDLER_EXPRESSION)
    }

    pub fn is_on_assignment(&self) -> bool {
        self.flags.contains(BindingFlags::IS_ON_ASSIGNMENT)
    }

    pub fn is_deferred(&self) -> bool {
        self.flags.contains(BindingFlags::IS_DEFERRED_BINDING)
    }

    pub fn is_custom_parser_binding(&self) -> bool {
        self.flags.contains(BindingFlags::IS_CUSTOM_PARSER_BINDING)
    }

    pub fn is_resolved_enum(&self) -> bool {
        self.flags.contains(BindingFlags::IS_RESOLVED_ENUM)
    }
}

/// `property <type> name`, `property alias name: target` or `default property ...`
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDeclaration {
    pub name: SmolStr,
    pub ty: PropertyType,
    pub alias: Option<AliasTarget>,
    pub is_default: bool,
    pub is_readonly: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalDeclaration {
    pub name: SmolStr,
    pub parameters: Vec<(SmolStr, PropertyType)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: SmolStr,
    pub parameters: Vec<SmolStr>,
    pub body: ScriptIndex,
}

#[derive(Debug, Clone)]
pub struct CompiledObject {
    pub index: ObjectIndex,
    /// Type to instantiate. Empty for group and attached property objects.
    pub type_name: SmolStr,
    pub id: Option<SmolStr>,
    /// Slot of `id` in the id table of the enclosing scope
    pub id_index: Option<usize>,
    pub flags: ObjectFlags,
    pub bindings: Vec<CompiledBinding>,
    pub properties: Vec<PropertyDeclaration>,
    pub signals: Vec<SignalDeclaration>,
    pub functions: Vec<FunctionDeclaration>,
    pub location: SourceLocation,
}

impl CompiledObject {
    pub fn is_component(&self) -> bool {
        self.flags.contains(ObjectFlags::IS_COMPONENT)
    }

    pub fn has_deferred_bindings(&self) -> bool {
        self.flags.contains(ObjectFlags::HAS_DEFERRED_BINDINGS)
    }

    pub fn has_custom_parser_bindings(&self) -> bool {
        self.flags.contains(ObjectFlags::HAS_CUSTOM_PARSER_BINDINGS)
    }

    /// Whether instances need their own property cache for the declarations of this object
    pub fn has_declarations(&self) -> bool {
        !self.properties.is_empty() || !self.signals.is_empty()
    }
}

/// The ids declared in one naming scope: the document root, or the root of an inline component
#[derive(Debug, Clone, Default)]
pub struct IdScope {
    pub root: Option<ObjectIndex>,
    pub ids: Vec<(SmolStr, ObjectIndex)>,
}

/// A script imported with `import "file.js" as Name`, materialized as a namespace of constants
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedScript {
    pub name: SmolStr,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub url: SmolStr,
    pub objects: TiVec<ObjectIndex, CompiledObject>,
    pub scripts: TiVec<ScriptIndex, Script>,
    pub imported_scripts: Vec<ImportedScript>,
    pub id_scopes: Vec<IdScope>,
    pub binding_count: usize,
}

impl CompilationUnit {
    pub fn root_index(&self) -> ObjectIndex {
        ObjectIndex(0)
    }

    pub fn object(&self, index: ObjectIndex) -> &CompiledObject {
        &self.objects[index]
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn script(&self, index: ScriptIndex) -> &Script {
        &self.scripts[index]
    }

    /// The root object of the inline component `component`
    pub fn component_root(&self, component: ObjectIndex) -> Option<ObjectIndex> {
        let object = self.objects.get(component)?;
        if !object.is_component() {
            return None;
        }
        object.bindings.iter().find_map(|b| match b.value {
            BindingValue::Object(index) => Some(index),
            _ => None,
        })
    }

    /// The ids of the scope rooted at `root`
    pub fn id_scope(&self, root: ObjectIndex) -> Option<&IdScope> {
        self.id_scopes.iter().find(|s| s.root == Some(root))
    }

    /// Number of objects with parser status a creation of the whole unit may push, an upper
    /// bound used to reserve the bookkeeping stacks
    pub fn parser_status_count_hint(&self) -> usize {
        self.objects.iter().filter(|o| !o.type_name.is_empty()).count()
    }
}
