//! Mods compiled into the binary.

pub mod demo;
pub mod native_bridge;

pub use demo::{ChainMod, ChainMod2, ListenerMod, TriggerMod};
pub use native_bridge::NativeEventBridge;

use crate::plugins::ModCatalog;

pub const NATIVE_BRIDGE: &str = "native.bridge";

/// Register every compiled-in factory under its key.
pub fn register_builtins(catalog: &mut ModCatalog) {
    catalog
        .register::<NativeEventBridge>(NATIVE_BRIDGE)
        .register::<TriggerMod>("demo.trigger")
        .register::<ListenerMod>("demo.listener")
        .register::<ChainMod>("demo.chain")
        .register::<ChainMod2>("demo.chain2");
}

/// Catalog with all builtin factories, and the native bridge loaded ahead of
/// discovery under its usual name.
pub fn catalog() -> ModCatalog {
    let mut catalog = ModCatalog::new();
    register_builtins(&mut catalog);
    catalog.seed("NativeEventBridge", NATIVE_BRIDGE);
    catalog
}
