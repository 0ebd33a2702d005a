// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/// How an incubator makes progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
pub enum IncubationMode {
    /// Only makes progress when the incubation controller is pumped
    Asynchronous,
    /// Asynchronous when started from within an asynchronous incubation, synchronous otherwise
    #[default]
    AsynchronousIfNested,
    /// Runs to completion when started
    Synchronous,
}

/// Limits and defaults of an [`Engine`](crate::engine::Engine)
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfiguration {
    /// How deep `Component::begin_create` calls may nest
    pub max_recursion_depth: usize,
    /// How deep composite types may expand into each other within one creation
    pub max_composite_nesting: usize,
    /// A deadline interrupt only reads the clock every that many checks
    pub interrupt_check_interval: u32,
    pub default_incubation_mode: IncubationMode,
}

impl Default for EngineConfiguration {
    fn default() -> Self {
        Self {
            max_recursion_depth: 10,
            max_composite_nesting: 64,
            interrupt_check_interval: 4,
            default_incubation_mode: IncubationMode::default(),
        }
    }
}

impl EngineConfiguration {
    /// The default configuration, overridden by the `QMLRT_MAX_RECURSION_DEPTH` and
    /// `QMLRT_INTERRUPT_CHECK_INTERVAL` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(depth) = env_number("QMLRT_MAX_RECURSION_DEPTH") {
            config.max_recursion_depth = depth;
        }
        if let Some(interval) = env_number("QMLRT_INTERRUPT_CHECK_INTERVAL") {
            config.interrupt_check_interval = interval;
        }
        config
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring invalid value for {name}: {value:?}");
            None
        }
    }
}

#[test]
fn env_overrides() {
    assert_eq!(env_number::<usize>("QMLRT_SURELY_NOT_SET_ANYWHERE"), None);
    let config = EngineConfiguration::default();
    assert_eq!(config.max_recursion_depth, 10);
    assert_eq!(config.default_incubation_mode, IncubationMode::AsynchronousIfNested);
}
