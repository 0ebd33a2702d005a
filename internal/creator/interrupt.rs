// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

//! Cooperative interruption of a creation.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
enum InterruptKind {
    #[default]
    None,
    /// Interrupts once the flag is set
    Flag(Rc<Cell<bool>>),
    /// Interrupts once the flag is cleared or the deadline passed
    While { flag: Rc<Cell<bool>>, deadline: Option<Instant> },
    Deadline(Instant),
}

/// Asked at the suspension points of a creation whether it should stop and yield.
///
/// Deadlines are only compared against the clock every few checks.
#[derive(Debug, Clone, Default)]
pub struct InstantiationInterrupt {
    kind: InterruptKind,
    check_interval: u32,
    checks: Cell<u32>,
}

impl InstantiationInterrupt {
    /// Never interrupts
    pub fn none() -> Self {
        Self::default()
    }

    /// Interrupts when `flag` becomes true
    pub fn flag(flag: Rc<Cell<bool>>) -> Self {
        Self { kind: InterruptKind::Flag(flag), ..Default::default() }
    }

    /// Interrupts when `flag` becomes false, or once `deadline` passed
    pub fn while_flag(flag: Rc<Cell<bool>>, deadline: Option<Instant>) -> Self {
        Self { kind: InterruptKind::While { flag, deadline }, ..Default::default() }
    }

    pub fn deadline(deadline: Instant) -> Self {
        Self { kind: InterruptKind::Deadline(deadline), ..Default::default() }
    }

    /// Only compares deadlines against the clock once every `interval` checks
    pub fn with_check_interval(mut self, interval: u32) -> Self {
        self.check_interval = interval;
        self
    }

    /// Whether the creation should yield now
    pub fn should_interrupt(&self) -> bool {
        match &self.kind {
            InterruptKind::None => false,
            InterruptKind::Flag(flag) => flag.get(),
            InterruptKind::While { flag, deadline } => {
                !flag.get() || deadline.is_some_and(|d| self.deadline_passed(d))
            }
            InterruptKind::Deadline(deadline) => self.deadline_passed(*deadline),
        }
    }

    fn deadline_passed(&self, deadline: Instant) -> bool {
        let checks = self.checks.get() + 1;
        if checks < self.check_interval {
            self.checks.set(checks);
            return false;
        }
        self.checks.set(0);
        Instant::now() >= deadline
    }
}

#[test]
fn interrupt_kinds() {
    assert!(!InstantiationInterrupt::none().should_interrupt());

    let flag = Rc::new(Cell::new(false));
    let interrupt = InstantiationInterrupt::flag(flag.clone());
    assert!(!interrupt.should_interrupt());
    flag.set(true);
    assert!(interrupt.should_interrupt());

    let running = Rc::new(Cell::new(true));
    let interrupt = InstantiationInterrupt::while_flag(running.clone(), None);
    assert!(!interrupt.should_interrupt());
    running.set(false);
    assert!(interrupt.should_interrupt());

    // a passed deadline is only noticed every third check
    let interrupt = InstantiationInterrupt::deadline(Instant::now()).with_check_interval(3);
    assert!(!interrupt.should_interrupt());
    assert!(!interrupt.should_interrupt());
    assert!(interrupt.should_interrupt());
    assert!(!interrupt.should_interrupt());
}
