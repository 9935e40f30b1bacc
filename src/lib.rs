#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unnecessary_wraps,
    dead_code
)]

pub mod app;
pub mod builtin;
pub mod config;
pub mod engine;
pub mod events;
pub mod host;
pub mod lifecycle;
pub mod plugins;
pub mod util;

pub use app::Sweeper;
pub use config::Config;
pub use engine::{Engine, ListenerBinding, PhaseContext};
pub use events::{Event, EventNode, Listener, ListenerErrorPolicy, Triggers};
pub use host::{HostLoop, SimulatedHost};
pub use lifecycle::{run_lifecycle, LifecycleFailure, LifecycleReport, Phase};
pub use plugins::{load_mods, Capability, Mod, ModCatalog, ModRegistry};
