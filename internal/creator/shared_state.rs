// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
Bookkeeping shared by a top-level creator and every creator it spawns for composite types.

Everything created during one top-level creation is recorded here, so that the finalize
phase can enable bindings and run completion callbacks across the whole tree, and so that an
aborted creation can destroy everything it built.
*/

use i_qmlrt_runtime::binding::Binding;
use i_qmlrt_runtime::context::ContextRc;
use i_qmlrt_runtime::object::{ObjectRc, ObjectWeak};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub type FinalizeCallback = Box<dyn FnOnce()>;

#[derive(Default)]
pub struct SharedState {
    root_context: RefCell<Option<ContextRc>>,
    /// Whether `root_context` was opened by this creation rather than taken over from an
    /// existing object
    opened_root_context: Cell<bool>,
    root_object: RefCell<ObjectWeak>,
    binding_stack: RefCell<Vec<Rc<Binding>>>,
    parser_status_stack: RefCell<Vec<ObjectWeak>>,
    finalize_callbacks: RefCell<Vec<FinalizeCallback>>,
    component_attached: RefCell<Vec<ObjectWeak>>,
    all_created_objects: RefCell<Vec<ObjectRc>>,
    /// Script wrapper scratch table of the top-level creation. `None` outside of `create()`.
    wrappers: RefCell<Option<Vec<ObjectWeak>>>,
    wrapper_allocations: Cell<usize>,
    /// Bumped by every `clear()`, so that loops running user code notice they were torn down
    clear_count: Cell<u32>,
}

impl SharedState {
    pub fn new(object_count_hint: usize, binding_count_hint: usize) -> Rc<Self> {
        Rc::new(Self {
            binding_stack: RefCell::new(Vec::with_capacity(binding_count_hint)),
            all_created_objects: RefCell::new(Vec::with_capacity(object_count_hint)),
            ..Default::default()
        })
    }

    /// The first context created by this creation
    pub fn root_context(&self) -> Option<ContextRc> {
        self.root_context.borrow().clone()
    }

    /// Records `context`, just opened by the creation, as the root context unless there
    /// already is one. The root context stays flagged until its first object is created in it.
    pub(crate) fn claim_root_context(&self, context: &ContextRc) {
        let mut root = self.root_context.borrow_mut();
        if root.is_some() {
            return;
        }
        *root = Some(context.clone());
        self.opened_root_context.set(true);
        context.set_root_object_in_creation(true);
    }

    /// Records the context of an existing object as the root context, for creations adding
    /// objects to an existing tree. Nothing becomes a root object in creation there.
    pub(crate) fn adopt_root_context(&self, context: &ContextRc) {
        let mut root = self.root_context.borrow_mut();
        if root.is_none() {
            *root = Some(context.clone());
        }
    }

    /// Marks `object` as the root object in creation if it is the first object created in
    /// the root context
    pub(crate) fn mark_root_object(&self, object: &ObjectRc) {
        let Some(root) = self.root_context() else { return };
        if !root.is_root_object_in_creation() {
            return;
        }
        root.set_root_object_in_creation(false);
        object.declarative_data_mut().root_object_in_creation = true;
        *self.root_object.borrow_mut() = Rc::downgrade(object);
    }

    /// The root object of the creation, while it is in creation
    pub fn root_object_in_creation(&self) -> Option<ObjectRc> {
        self.root_object.borrow().upgrade().filter(|o| o.is_root_object_in_creation())
    }

    /// Ends the root object's time in creation, and drops the flag of a root context this
    /// creation opened
    pub(crate) fn release_root_object(&self) {
        if self.opened_root_context.get()
            && let Some(root) = self.root_context()
        {
            root.set_root_object_in_creation(false);
        }
        if let Some(object) = self.root_object.take().upgrade() {
            object.declarative_data_mut().root_object_in_creation = false;
        }
    }

    pub(crate) fn push_binding(&self, binding: Rc<Binding>) {
        self.binding_stack.borrow_mut().push(binding);
    }

    pub(crate) fn pop_binding(&self) -> Option<Rc<Binding>> {
        self.binding_stack.borrow_mut().pop()
    }

    pub fn pending_binding_count(&self) -> usize {
        self.binding_stack.borrow().len()
    }

    pub(crate) fn push_parser_status(&self, object: &ObjectRc) {
        self.parser_status_stack.borrow_mut().push(Rc::downgrade(object));
    }

    pub(crate) fn pop_parser_status(&self) -> Option<ObjectWeak> {
        self.parser_status_stack.borrow_mut().pop()
    }

    pub(crate) fn add_finalize_callbacks(&self, callbacks: Vec<FinalizeCallback>) {
        self.finalize_callbacks.borrow_mut().extend(callbacks);
    }

    pub(crate) fn pop_finalize_callback(&self) -> Option<FinalizeCallback> {
        self.finalize_callbacks.borrow_mut().pop()
    }

    /// Records an attached `Component` object whose `completed` signal fires at the end of
    /// the finalize phase
    pub(crate) fn push_component_attached(&self, attached: &ObjectRc) {
        let mut list = self.component_attached.borrow_mut();
        if !list.iter().any(|a| std::ptr::eq(a.as_ptr(), Rc::as_ptr(attached))) {
            list.push(Rc::downgrade(attached));
        }
    }

    pub(crate) fn pop_component_attached(&self) -> Option<ObjectWeak> {
        self.component_attached.borrow_mut().pop()
    }

    pub(crate) fn push_created_object(&self, object: &ObjectRc) {
        self.all_created_objects.borrow_mut().push(object.clone());
    }

    /// Every object created so far by this creation, in creation order
    pub fn all_created_objects(&self) -> Vec<ObjectRc> {
        self.all_created_objects.borrow().clone()
    }

    /// Gives up the handles on the created objects, once the creation succeeded
    pub(crate) fn release_created_objects(&self) {
        self.all_created_objects.borrow_mut().clear();
    }

    pub(crate) fn allocate_wrappers(&self, count: usize) {
        debug_assert!(self.wrappers.borrow().is_none(), "wrapper table allocated twice");
        *self.wrappers.borrow_mut() = Some(Vec::with_capacity(count));
        self.wrapper_allocations.set(self.wrapper_allocations.get() + 1);
    }

    pub(crate) fn release_wrappers(&self) {
        *self.wrappers.borrow_mut() = None;
    }

    /// Capacity of the wrapper table, `None` when no creation pass is running
    pub fn wrapper_capacity(&self) -> Option<usize> {
        self.wrappers.borrow().as_ref().map(Vec::capacity)
    }

    /// Number of slots claimed in the wrapper table so far
    pub fn claimed_wrappers(&self) -> usize {
        self.wrappers.borrow().as_ref().map_or(0, Vec::len)
    }

    /// How many times a wrapper table was allocated for this creation
    pub fn wrapper_allocations(&self) -> usize {
        self.wrapper_allocations.get()
    }

    /// Claims the next slot of the wrapper table for `object`
    pub(crate) fn claim_wrapper(&self, object: &ObjectRc) -> Option<usize> {
        let mut wrappers = self.wrappers.borrow_mut();
        let wrappers = wrappers.as_mut()?;
        wrappers.push(Rc::downgrade(object));
        Some(wrappers.len() - 1)
    }

    pub fn clear_count(&self) -> u32 {
        self.clear_count.get()
    }

    /// Destroys everything created so far and drops the pending work
    pub(crate) fn clear(&self) {
        self.clear_count.set(self.clear_count.get() + 1);
        let objects = std::mem::take(&mut *self.all_created_objects.borrow_mut());
        for object in objects.iter().rev() {
            object.destroy();
        }
        drop(objects);
        for binding in std::mem::take(&mut *self.binding_stack.borrow_mut()) {
            binding.remove();
        }
        self.parser_status_stack.borrow_mut().clear();
        self.finalize_callbacks.borrow_mut().clear();
        self.component_attached.borrow_mut().clear();
        self.release_wrappers();
        self.release_root_object();
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("bindings", &self.binding_stack.borrow().len())
            .field("parser_status", &self.parser_status_stack.borrow().len())
            .field("created", &self.all_created_objects.borrow().len())
            .finish()
    }
}

#[test]
fn wrapper_table() {
    use i_qmlrt_runtime::object::Object;
    use i_qmlrt_runtime::types::NativeType;
    let ty = NativeType::builder("QtObject").build();
    let (a, b) = (Object::new(&ty), Object::new(&ty));
    let shared = SharedState::new(2, 0);
    assert_eq!(shared.claim_wrapper(&a), None);
    shared.allocate_wrappers(3);
    assert!(shared.wrapper_capacity().is_some_and(|c| c >= 3));
    assert_eq!(shared.claim_wrapper(&a), Some(0));
    assert_eq!(shared.claim_wrapper(&b), Some(1));
    assert_eq!(shared.claimed_wrappers(), 2);
    shared.release_wrappers();
    assert_eq!(shared.wrapper_capacity(), None);
    assert_eq!(shared.claimed_wrappers(), 0);
    assert_eq!(shared.wrapper_allocations(), 1);
}
