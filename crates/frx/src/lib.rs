#![forbid(unsafe_code)]

//! FrankenRx public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use frx_core::{array, object};

pub mod prelude {
    pub use frx_core as core;
    pub use frx_core::{
        CollectingSink, Computed, DiagnosticsSink, Effect, EffectOptions, PropKey,
        PropertyAccess, RawObject, Reactive, ReactivityError, Ref, Runtime, RuntimeConfig,
        Severity, Value, WeakRuntime, array, is_observable, is_ref, object, to_raw, unref,
    };
}
