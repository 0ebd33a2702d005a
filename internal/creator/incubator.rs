// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
Incremental creation of component instances.

An [`Incubator`] drives an [`ObjectCreator`] through its phases a slice at a time instead of
running it to completion. Asynchronous incubators only make progress when the
[`IncubationController`] of the engine is pumped with [`IncubationController::incubate_for`]
or [`IncubationController::incubate_while`].

An incubation started while an asynchronous incubation of an enclosing context is running
becomes nested into it: the enclosing incubator does not become ready before the nested one.
*/

use crate::component::Component;
use crate::interrupt::InstantiationInterrupt;
use crate::object_creator::{ObjectCreator, Phase};
use crate::shared_state::SharedState;
use i_qmlrt_runtime::compiled::ObjectIndex;
use i_qmlrt_runtime::config::IncubationMode;
use i_qmlrt_runtime::context::ContextRc;
use i_qmlrt_runtime::diagnostics::{Diagnostics, SourceLocation};
use i_qmlrt_runtime::engine::{Engine, EngineWeak};
use i_qmlrt_runtime::object::ObjectRc;
use i_qmlrt_runtime::value::Value;
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
pub enum IncubatorStatus {
    #[default]
    Null,
    Ready,
    Loading,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    /// Creating the objects
    Execute,
    /// Finalizing
    Completing,
    /// Finalized, possibly waiting for nested incubators
    Completed,
}

type StatusCallback = Rc<dyn Fn(IncubatorStatus)>;

struct IncubatorInner {
    mode: IncubationMode,
    is_async: Cell<bool>,
    status: Cell<IncubatorStatus>,
    progress: Cell<Progress>,
    sub_component: Cell<Option<ObjectIndex>>,
    creator: RefCell<Option<ObjectCreator>>,
    shared: RefCell<Option<Rc<SharedState>>>,
    result: RefCell<Option<ObjectRc>>,
    errors: RefCell<Diagnostics>,
    url: RefCell<SmolStr>,
    initial_properties: RefCell<Vec<(SmolStr, Value)>>,
    /// The enclosing incubator, which waits for this one
    waiting_on: RefCell<Weak<IncubatorInner>>,
    /// The nested incubators this one waits for
    waiting_for: RefCell<Vec<Weak<IncubatorInner>>>,
    controller: RefCell<Weak<IncubationController>>,
    status_changed: RefCell<Option<StatusCallback>>,
}

impl Drop for IncubatorInner {
    fn drop(&mut self) {
        if let Some(mut creator) = self.creator.get_mut().take() {
            creator.clear();
        }
    }
}

#[derive(Clone)]
pub struct Incubator(Rc<IncubatorInner>);

impl Default for Incubator {
    fn default() -> Self {
        Self::new(IncubationMode::default())
    }
}

impl Incubator {
    pub fn new(mode: IncubationMode) -> Self {
        Incubator(Rc::new(IncubatorInner {
            mode,
            is_async: Cell::new(false),
            status: Cell::new(IncubatorStatus::Null),
            progress: Cell::new(Progress::Execute),
            sub_component: Cell::new(None),
            creator: Default::default(),
            shared: Default::default(),
            result: Default::default(),
            errors: Default::default(),
            url: Default::default(),
            initial_properties: Default::default(),
            waiting_on: Default::default(),
            waiting_for: Default::default(),
            controller: Default::default(),
            status_changed: Default::default(),
        }))
    }

    /// An incubator in the default mode of `engine`'s configuration
    pub fn for_engine(engine: &Engine) -> Self {
        Self::new(engine.configuration().default_incubation_mode)
    }

    pub fn mode(&self) -> IncubationMode {
        self.0.mode
    }

    pub fn status(&self) -> IncubatorStatus {
        self.0.status.get()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == IncubatorStatus::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.status() == IncubatorStatus::Loading
    }

    pub fn is_error(&self) -> bool {
        self.status() == IncubatorStatus::Error
    }

    pub fn errors(&self) -> Diagnostics {
        self.0.errors.borrow().clone()
    }

    /// The created object, once ready
    pub fn object(&self) -> Option<ObjectRc> {
        if self.status() != IncubatorStatus::Ready {
            return None;
        }
        self.0.result.borrow().clone()
    }

    /// Properties written to the root object once it exists, before its bindings are enabled
    pub fn set_initial_properties(&self, properties: impl IntoIterator<Item = (SmolStr, Value)>) {
        *self.0.initial_properties.borrow_mut() = properties.into_iter().collect();
    }

    /// Called with the new status whenever it changes
    pub fn set_status_changed(&self, callback: impl Fn(IncubatorStatus) + 'static) {
        *self.0.status_changed.borrow_mut() = Some(Rc::new(callback));
    }

    pub fn downgrade(&self) -> IncubatorWeak {
        IncubatorWeak(Rc::downgrade(&self.0))
    }

    fn ptr_eq(&self, other: &Weak<IncubatorInner>) -> bool {
        std::ptr::eq(Rc::as_ptr(&self.0), other.as_ptr())
    }

    fn progress(&self) -> Progress {
        self.0.progress.get()
    }

    /// Still has work to do, as opposed to finished or waiting for nested incubators
    fn is_incubating(&self) -> bool {
        self.is_loading() && self.progress() != Progress::Completed
    }

    fn root_context(&self) -> Option<ContextRc> {
        self.0.shared.borrow().as_ref().and_then(|s| s.root_context())
    }

    fn set_status(&self, status: IncubatorStatus) {
        if self.0.status.replace(status) == status {
            return;
        }
        log::debug!("{}: incubator status {status}", self.0.url.borrow());
        let callback = self.0.status_changed.borrow().clone();
        if let Some(callback) = callback {
            callback(status);
        }
    }

    fn record_error(&self, message: &str) {
        let url = self.0.url.borrow().clone();
        self.0.errors.borrow_mut().push_error(message.into(), &url, SourceLocation::default());
    }

    /// Starts incubating an instance of `component` in `context`, or in the component's
    /// creation context
    pub(crate) fn start(&self, component: &Component, context: Option<&ContextRc>) {
        if self.status() != IncubatorStatus::Null {
            log::warn!("{}: incubator reused before it was cleared", self.0.url.borrow());
            self.clear();
        }
        self.0.errors.borrow_mut().clear();
        *self.0.url.borrow_mut() = component.url();

        let engine = component.engine().clone();
        let context = context.cloned().unwrap_or_else(|| component.default_context());
        let controller = engine.incubation_controller::<IncubationController>();
        let mut enclosing = None;
        let is_async = match self.0.mode {
            IncubationMode::Synchronous => false,
            IncubationMode::Asynchronous => controller.is_some(),
            IncubationMode::AsynchronousIfNested => {
                enclosing = controller.as_ref().and_then(|c| c.find_enclosing(&context));
                enclosing.is_some()
            }
        };
        self.0.is_async.set(is_async);

        let unit = match component.check_creatable(&context, !is_async) {
            Ok(unit) => unit,
            Err(message) => {
                self.record_error(message);
                self.set_status(IncubatorStatus::Error);
                return;
            }
        };
        let creator = ObjectCreator::new(&engine, unit, Some(context));
        *self.0.shared.borrow_mut() = Some(creator.shared().clone());
        *self.0.creator.borrow_mut() = Some(creator);
        self.0.sub_component.set(component.sub_component());
        self.0.progress.set(Progress::Execute);

        if let Some(enclosing) = enclosing {
            enclosing.0.waiting_for.borrow_mut().push(Rc::downgrade(&self.0));
            *self.0.waiting_on.borrow_mut() = Rc::downgrade(&enclosing.0);
        }
        self.set_status(IncubatorStatus::Loading);

        match controller.filter(|_| is_async) {
            Some(controller) => controller.add(self),
            None => {
                let _depth = engine.enter_creation();
                self.incubate(&InstantiationInterrupt::none());
            }
        }
    }

    /// Makes progress until `interrupt` asks to yield
    fn incubate(&self, interrupt: &InstantiationInterrupt) {
        {
            // busy when re-entered from the user code this incubation runs
            let Ok(mut slot) = self.0.creator.try_borrow_mut() else { return };
            let Some(creator) = slot.as_mut() else { return };

            if self.progress() == Progress::Execute {
                let root = creator.create(self.0.sub_component.get(), None, interrupt);
                if !self.is_loading() {
                    *slot = None;
                    return;
                }
                if creator.phase() == Phase::CreatingObjectsPhase2 {
                    return;
                }
                let Some(root) = root else {
                    self.0.errors.borrow_mut().append(&mut creator.take_errors());
                    creator.clear();
                    *slot = None;
                    drop(slot);
                    self.0.result.borrow_mut().take();
                    self.set_status(IncubatorStatus::Error);
                    self.notify_enclosing();
                    return;
                };
                self.apply_initial_properties(&root);
                *self.0.result.borrow_mut() = Some(root);
                self.0.progress.set(Progress::Completing);
                if interrupt.should_interrupt() {
                    return;
                }
            }

            if self.progress() == Progress::Completing {
                let done = creator.finalize(interrupt).is_some();
                if !self.is_loading() {
                    *slot = None;
                    return;
                }
                if !done {
                    return;
                }
                self.0.errors.borrow_mut().append(&mut creator.take_errors());
                *slot = None;
                self.0.progress.set(Progress::Completed);
            }
        }
        self.try_complete();
    }

    fn apply_initial_properties(&self, root: &ObjectRc) {
        let properties = std::mem::take(&mut *self.0.initial_properties.borrow_mut());
        for (name, value) in properties {
            let result = match root.property_index(&name) {
                Some(index) => {
                    root.remove_binding(index);
                    root.write_property(index, value).map_err(|e| e.to_string())
                }
                None => Err(format!("no property \"{name}\"")),
            };
            if let Err(e) = result {
                let url = self.0.url.borrow().clone();
                self.0.errors.borrow_mut().push_warning(
                    format!("Could not set initial property {name}: {e}"),
                    &url,
                    SourceLocation::default(),
                );
            }
        }
    }

    /// Becomes ready once finalized and every nested incubator completed
    fn try_complete(&self) {
        if !self.is_loading() || self.progress() != Progress::Completed {
            return;
        }
        let waiting = {
            let mut waiting_for = self.0.waiting_for.borrow_mut();
            waiting_for.retain(|n| {
                n.upgrade().is_some_and(|n| n.status.get() == IncubatorStatus::Loading)
            });
            !waiting_for.is_empty()
        };
        if waiting {
            return;
        }
        self.0.shared.borrow_mut().take();
        let status = if self.0.errors.borrow().has_errors() {
            IncubatorStatus::Error
        } else {
            IncubatorStatus::Ready
        };
        self.set_status(status);
        self.notify_enclosing();
    }

    fn notify_enclosing(&self) {
        let enclosing = std::mem::take(&mut *self.0.waiting_on.borrow_mut()).upgrade();
        if let Some(enclosing) = enclosing.map(Incubator) {
            enclosing.0.waiting_for.borrow_mut().retain(|n| !self.ptr_eq(n));
            enclosing.try_complete();
        }
    }

    /// Runs the incubation, and the nested ones, to completion
    pub fn force_completion(&self) {
        while self.is_loading() {
            let before = self.progress();
            let nested =
                self.0.waiting_for.borrow().iter().filter_map(Weak::upgrade).collect::<Vec<_>>();
            for nested in nested {
                Incubator(nested).force_completion();
            }
            match self.progress() {
                Progress::Completed => self.try_complete(),
                _ => self.incubate(&InstantiationInterrupt::none()),
            }
            if self.is_loading() && self.progress() == before {
                // re-entered from its own creation, or waiting on something that cannot finish
                break;
            }
        }
    }

    /// Aborts the incubation and resets the incubator to `Null`.
    ///
    /// Objects of an unfinished incubation are destroyed. A ready object is only released
    /// by the incubator.
    pub fn clear(&self) {
        let status = self.status();
        if status == IncubatorStatus::Null {
            return;
        }
        let nested = std::mem::take(&mut *self.0.waiting_for.borrow_mut());
        for nested in nested.iter().filter_map(Weak::upgrade) {
            Incubator(nested).clear();
        }
        if let Some(enclosing) = std::mem::take(&mut *self.0.waiting_on.borrow_mut()).upgrade() {
            enclosing.waiting_for.borrow_mut().retain(|n| !self.ptr_eq(n));
        }

        let creator = match self.0.creator.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                // running user code of this creation: tear it down under its feet, the
                // running step notices and drops the creator
                if let Some(shared) = self.0.shared.borrow().as_ref() {
                    shared.clear();
                }
                None
            }
        };
        if let Some(mut creator) = creator {
            creator.clear();
        }
        self.0.shared.borrow_mut().take();
        self.0.result.borrow_mut().take();
        self.0.errors.borrow_mut().clear();
        self.0.progress.set(Progress::Execute);
        if let Some(controller) = self.0.controller.borrow().upgrade() {
            controller.remove(self);
        }
        self.set_status(IncubatorStatus::Null);
    }
}

impl std::fmt::Debug for Incubator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Incubator")
            .field("mode", &self.0.mode)
            .field("status", &self.status())
            .field("progress", &self.progress())
            .field("async", &self.0.is_async.get())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct IncubatorWeak(Weak<IncubatorInner>);

impl IncubatorWeak {
    pub fn upgrade(&self) -> Option<Incubator> {
        self.0.upgrade().map(Incubator)
    }
}

/// Pumps the asynchronous incubators of an engine.
///
/// The controller does not own the incubators: dropping an incubator aborts its incubation.
pub struct IncubationController {
    engine: EngineWeak,
    incubators: RefCell<Vec<Weak<IncubatorInner>>>,
    running: Cell<bool>,
    last_count: Cell<usize>,
    count_changed: RefCell<Option<Rc<dyn Fn(usize)>>>,
}

impl IncubationController {
    /// Creates the controller and installs it on `engine`
    pub fn new(engine: &Engine) -> Rc<Self> {
        let controller = Rc::new(Self {
            engine: engine.downgrade(),
            incubators: Default::default(),
            running: Cell::new(false),
            last_count: Cell::new(0),
            count_changed: Default::default(),
        });
        engine.set_incubation_controller(Some(controller.clone()));
        controller
    }

    /// Number of incubators with work left
    pub fn incubating_object_count(&self) -> usize {
        self.live_incubators().iter().filter(|i| i.is_incubating()).count()
    }

    /// Called with the new count whenever [`Self::incubating_object_count`] changes
    pub fn set_count_changed(&self, callback: impl Fn(usize) + 'static) {
        *self.count_changed.borrow_mut() = Some(Rc::new(callback));
    }

    fn live_incubators(&self) -> Vec<Incubator> {
        self.incubators.borrow().iter().filter_map(|w| w.upgrade().map(Incubator)).collect()
    }

    fn add(self: &Rc<Self>, incubator: &Incubator) {
        *incubator.0.controller.borrow_mut() = Rc::downgrade(self);
        self.incubators.borrow_mut().push(Rc::downgrade(&incubator.0));
        self.notify_count();
    }

    fn remove(&self, incubator: &Incubator) {
        self.incubators.borrow_mut().retain(|w| !incubator.ptr_eq(w));
        self.notify_count();
    }

    fn notify_count(&self) {
        let count = self.incubating_object_count();
        if self.last_count.replace(count) == count {
            return;
        }
        let callback = self.count_changed.borrow().clone();
        if let Some(callback) = callback {
            callback(count);
        }
    }

    /// The running asynchronous incubation a new incubation in `context` nests into
    fn find_enclosing(&self, context: &ContextRc) -> Option<Incubator> {
        self.live_incubators().into_iter().find(|i| {
            i.is_incubating()
                && i.0.is_async.get()
                && i.root_context().is_some_and(|root| context.is_descendant_of(&root))
        })
    }

    fn check_interval(&self) -> u32 {
        self.engine.upgrade().map_or(1, |e| e.configuration().interrupt_check_interval)
    }

    /// Incubates for about `budget`
    pub fn incubate_for(&self, budget: Duration) {
        let interrupt = InstantiationInterrupt::deadline(Instant::now() + budget)
            .with_check_interval(self.check_interval());
        self.run(&interrupt);
    }

    /// Incubates while `flag` is set, and at most for `budget` if given
    pub fn incubate_while(&self, flag: Rc<Cell<bool>>, budget: Option<Duration>) {
        let deadline = budget.map(|b| Instant::now() + b);
        let interrupt = InstantiationInterrupt::while_flag(flag, deadline)
            .with_check_interval(self.check_interval());
        self.run(&interrupt);
    }

    /// Gives every incubator a step in turn, at least one step in total, until `interrupt`
    /// fires or nothing is left to do
    fn run(&self, interrupt: &InstantiationInterrupt) {
        if self.running.replace(true) {
            return;
        }
        loop {
            let next = {
                let mut incubators = self.incubators.borrow_mut();
                incubators.retain(|w| w.upgrade().is_some_and(|i| Incubator(i).is_incubating()));
                incubators.first().and_then(Weak::upgrade).map(Incubator)
            };
            let Some(incubator) = next else { break };
            incubator.incubate(interrupt);
            {
                let mut incubators = self.incubators.borrow_mut();
                if let Some(position) = incubators.iter().position(|w| incubator.ptr_eq(w)) {
                    let entry = incubators.remove(position);
                    incubators.push(entry);
                }
            }
            if interrupt.should_interrupt() {
                break;
            }
        }
        self.incubators
            .borrow_mut()
            .retain(|w| w.upgrade().is_some_and(|i| Incubator(i).is_incubating()));
        self.running.set(false);
        self.notify_count();
    }
}

impl std::fmt::Debug for IncubationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncubationController")
            .field("incubators", &self.incubators.borrow().len())
            .finish()
    }
}
