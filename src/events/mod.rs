//! Synchronous trigger/listener bus with causal provenance.
//!
//! Mods declare named triggers, other mods bind listeners to them, and each
//! fire records an [`EventNode`] under the node of the event that caused it,
//! so a cascade of fires can be inspected as a tree after the fact.

pub mod bus;
pub mod event;
pub mod node;

pub use bus::{
    BusError, DispatchError, Listener, ListenerErrorPolicy, ModToken, RegistrationError, Triggers,
};
pub use event::{Event, Payload};
pub use node::{EventNode, NodeSnapshot};
