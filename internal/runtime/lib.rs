// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

#![doc = include_str!("README.md")]
#![deny(unsafe_code)]

pub mod binding;
pub mod builder;
pub mod compiled;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod expression;
pub mod graphics;
pub mod literals;
pub mod object;
pub mod property;
pub mod types;
pub mod value;

pub use compiled::{CompilationUnit, ObjectIndex};
pub use context::{Context, ContextRc};
pub use diagnostics::{Diagnostic, Diagnostics, SourceLocation};
pub use engine::Engine;
pub use object::{Object, ObjectRc, ObjectWeak};
pub use value::Value;
