use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::engine::PhaseContext;
use crate::events::{Listener, RegistrationError, Triggers};

/// One operation of the lifecycle surface every mod must expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Init,
    TriggersInit,
    ListenersInit,
    BeforeFinishInit,
    FinishInit,
    Register,
}

impl Capability {
    /// The full required set, in lifecycle order.
    pub const REQUIRED: [Capability; 6] = [
        Capability::Init,
        Capability::TriggersInit,
        Capability::ListenersInit,
        Capability::BeforeFinishInit,
        Capability::FinishInit,
        Capability::Register,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::TriggersInit => "triggers_init",
            Self::ListenersInit => "listeners_init",
            Self::BeforeFinishInit => "before_finish_init",
            Self::FinishInit => "finish_init",
            Self::Register => "register",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    /// Accepts the snake_case names and their camelCase spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "triggers_init" | "triggersInit" => Ok(Self::TriggersInit),
            "listeners_init" | "listenersInit" => Ok(Self::ListenersInit),
            "before_finish_init" | "beforeFinishInit" => Ok(Self::BeforeFinishInit),
            "finish_init" | "finishInit" => Ok(Self::FinishInit),
            "register" => Ok(Self::Register),
            other => Err(format!("`{other}` is not a lifecycle capability")),
        }
    }
}

/// A unit of behaviour driven through the lifecycle and wired to other mods
/// only through triggers and listeners.
///
/// Phases run in order `init`, `triggers_init`, `listeners_init`,
/// `before_finish_init`, `finish_init`; each phase finishes for every mod
/// before the next one starts. Returning an error (or panicking) removes the
/// mod before the next phase. All phase methods default to no-ops.
pub trait Mod {
    /// Called 2nd, right after construction. No guarantees about other mods.
    fn init(&mut self, _ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called 3rd. Declare triggers so other mods can listen to them.
    fn triggers_init(&mut self, _ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called 4th. Listen to other mods' triggers with [`PhaseContext::listen`].
    fn listeners_init(&mut self, _ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called 5th. Everything is wired; firing triggers is safe from here on.
    fn before_finish_init(&mut self, _ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called last. Do not depend on the order mods are called in.
    fn finish_init(&mut self, _ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called by other mods (through the orchestrator) to bind a listener to
    /// one of this mod's triggers.
    ///
    /// Lifecycle operation names are known but are not triggers. Everything
    /// else goes to the mod's trigger table. Override to bridge a foreign
    /// event source.
    fn register(&mut self, trigger: &str, listener: Listener) -> Result<(), RegistrationError> {
        if trigger.parse::<Capability>().is_ok() {
            return Err(RegistrationError::NotATrigger {
                name: trigger.to_string(),
            });
        }
        match self.triggers() {
            Some(triggers) => triggers.register(trigger, listener),
            None => Err(RegistrationError::UnknownTrigger {
                trigger: trigger.to_string(),
            }),
        }
    }

    /// Trigger table exposed to the host and to the default `register`.
    fn triggers(&self) -> Option<&Triggers> {
        None
    }
}
