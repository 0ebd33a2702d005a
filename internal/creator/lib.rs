// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

#![doc = include_str!("README.md")]
#![deny(unsafe_code)]

pub mod component;
pub mod eval;
pub mod incubator;
pub mod interrupt;
pub mod object_creator;
pub mod shared_state;
mod value_assign;

#[doc(hidden)]
pub mod testing;

#[cfg(test)]
mod tests;

pub use component::{Component, ComponentBehavior, ComponentStatus};
pub use incubator::{IncubationController, Incubator, IncubatorStatus};
pub use interrupt::InstantiationInterrupt;
pub use object_creator::{ObjectCreator, Phase, execute_deferred};
pub use shared_state::SharedState;
