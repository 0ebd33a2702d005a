// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
Runtime contexts: the naming scopes expressions are evaluated in.

Contexts form a tree parallel to the object tree. A child context keeps its parent alive;
objects keep the context they were created in alive. Contexts never own objects.
*/

use crate::compiled::ImportedScript;
use crate::engine::{Engine, EngineWeak};
use crate::object::{ObjectRc, ObjectWeak};
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

pub type ContextRc = Rc<Context>;
pub type ContextWeak = Weak<Context>;

pub struct Context {
    parent: Option<ContextRc>,
    engine: EngineWeak,
    url: SmolStr,
    /// Declared ids, indexed by their slot in the scope's id table
    ids: RefCell<Vec<(SmolStr, ObjectWeak)>>,
    imported_scripts: RefCell<Vec<ImportedScript>>,
    context_object: RefCell<ObjectWeak>,
    /// Set on the context a creation opens first, until the first object is created in it
    root_object_in_creation: Cell<bool>,
    /// Torn down together with this context
    linked: RefCell<Option<ContextRc>>,
    children: RefCell<Vec<ContextWeak>>,
    objects: RefCell<Vec<ObjectWeak>>,
    valid: Cell<bool>,
}

impl Context {
    pub fn new(parent: Option<&ContextRc>, engine: &Engine, url: impl Into<SmolStr>) -> ContextRc {
        Self::with_engine_weak(parent, engine.downgrade(), url.into())
    }

    pub(crate) fn with_engine_weak(
        parent: Option<&ContextRc>,
        engine: EngineWeak,
        url: SmolStr,
    ) -> ContextRc {
        let context = Rc::new(Self {
            parent: parent.cloned(),
            engine,
            url,
            ids: Default::default(),
            imported_scripts: Default::default(),
            context_object: Default::default(),
            root_object_in_creation: Cell::new(false),
            linked: Default::default(),
            children: Default::default(),
            objects: Default::default(),
            valid: Cell::new(true),
        });
        if let Some(parent) = parent {
            let mut children = parent.children.borrow_mut();
            children.retain(|c| c.strong_count() > 0);
            children.push(Rc::downgrade(&context));
        }
        context
    }

    pub fn parent(&self) -> Option<&ContextRc> {
        self.parent.as_ref()
    }

    pub fn engine(&self) -> Option<Engine> {
        self.engine.upgrade()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Iterates over this context and its ancestors, innermost first
    pub fn ancestry(self: &Rc<Self>) -> impl Iterator<Item = ContextRc> + use<> {
        std::iter::successors(Some(self.clone()), |c| c.parent.clone())
    }

    /// Whether `ancestor` is this context or one of its parents
    pub fn is_descendant_of(self: &Rc<Self>, ancestor: &ContextRc) -> bool {
        self.ancestry().any(|c| Rc::ptr_eq(&c, ancestor))
    }

    /// Reserves the id table of a scope. The objects are filled in as they are created.
    pub fn set_id_names(&self, names: impl IntoIterator<Item = SmolStr>) {
        *self.ids.borrow_mut() = names.into_iter().map(|n| (n, ObjectWeak::new())).collect();
    }

    pub fn set_id_object(&self, slot: usize, object: &ObjectRc) {
        if let Some(entry) = self.ids.borrow_mut().get_mut(slot) {
            entry.1 = Rc::downgrade(object);
        }
    }

    /// The object declared with `id: name` in this context
    pub fn id_object(&self, name: &str) -> Option<ObjectRc> {
        self.ids
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, o)| o.upgrade())
            .filter(|o| !o.is_destroyed())
    }

    /// Whether `name` is declared as an id in this context, created yet or not
    pub fn has_id(&self, name: &str) -> bool {
        self.ids.borrow().iter().any(|(n, _)| n == name)
    }

    pub fn set_imported_scripts(&self, scripts: Vec<ImportedScript>) {
        *self.imported_scripts.borrow_mut() = scripts;
    }

    pub fn imported_script(&self, name: &str) -> Option<crate::value::Value> {
        self.imported_scripts.borrow().iter().find(|s| s.name == name).map(|s| s.value.clone())
    }

    pub fn set_context_object(&self, object: &ObjectRc) {
        *self.context_object.borrow_mut() = Rc::downgrade(object);
    }

    pub fn context_object(&self) -> Option<ObjectRc> {
        self.context_object.borrow().upgrade().filter(|o| !o.is_destroyed())
    }

    pub fn is_root_object_in_creation(&self) -> bool {
        self.root_object_in_creation.get()
    }

    pub fn set_root_object_in_creation(&self, value: bool) {
        self.root_object_in_creation.set(value);
    }

    pub fn add_object(&self, object: &ObjectRc) {
        self.objects.borrow_mut().push(Rc::downgrade(object));
    }

    /// Appends `context` to the chain of contexts linked to this one
    pub fn link_context(&self, context: &ContextRc) {
        if std::ptr::eq(self, Rc::as_ptr(context)) {
            return;
        }
        let mut linked = self.linked.borrow_mut();
        match linked.as_ref() {
            Some(next) => next.link_context(context),
            None => *linked = Some(context.clone()),
        }
    }

    /// The chain of contexts linked to this one
    pub fn linked_contexts(&self) -> Vec<ContextRc> {
        std::iter::successors(self.linked.borrow().clone(), |c| c.linked.borrow().clone()).collect()
    }

    /// The live objects created in this context, in creation order
    pub fn objects(&self) -> Vec<ObjectRc> {
        let objects = self.objects.borrow();
        objects.iter().filter_map(|o| o.upgrade()).filter(|o| !o.is_destroyed()).collect()
    }

    pub fn child_contexts(&self) -> Vec<ContextRc> {
        self.children.borrow().iter().filter_map(|c| c.upgrade()).collect()
    }

    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    /// Marks this context, its children and the contexts linked to it as invalid, once the
    /// objects they belong to are gone
    pub fn invalidate(&self) {
        self.valid.set(false);
        self.ids.borrow_mut().iter_mut().for_each(|(_, o)| *o = ObjectWeak::new());
        *self.context_object.borrow_mut() = ObjectWeak::new();
        for child in self.child_contexts() {
            child.invalidate();
        }
        let linked = self.linked.borrow().clone();
        if let Some(linked) = linked.filter(|c| c.is_valid()) {
            linked.invalidate();
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("url", &self.url)
            .field("ids", &self.ids.borrow().iter().map(|(n, _)| n.clone()).collect::<Vec<_>>())
            .field("valid", &self.valid.get())
            .finish()
    }
}

#[test]
fn linked_contexts_are_invalidated_together() {
    let engine = Engine::new();
    let outer = Context::new(Some(engine.root_context()), &engine, "file:///outer.qml");
    let inner = Context::new(Some(&outer), &engine, "file:///Inner.qml");
    let other = Context::new(Some(engine.root_context()), &engine, "file:///other.qml");
    inner.link_context(&outer);
    inner.link_context(&other);
    inner.link_context(&inner);
    let linked = inner.linked_contexts();
    assert_eq!(linked.len(), 2);
    assert!(Rc::ptr_eq(&linked[0], &outer) && Rc::ptr_eq(&linked[1], &other));

    inner.invalidate();
    assert!(!inner.is_valid() && !outer.is_valid() && !other.is_valid());
    assert!(engine.root_context().is_valid());
}
