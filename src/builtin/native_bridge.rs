use std::rc::Rc;

use tracing::{debug, warn};

use crate::engine::PhaseContext;
use crate::events::{Event, Listener, RegistrationError, Triggers};
use crate::host::HostLoop;
use crate::plugins::{Capability, Mod};

/// Turns native host events into bus triggers on demand.
///
/// Any name another mod listens to becomes a trigger the first time it is
/// asked for, and exactly one host binding is made for it. Each native
/// occurrence is fired as a root event to every logical listener.
#[derive(Default)]
pub struct NativeEventBridge {
    host: Option<Rc<dyn HostLoop>>,
    triggers: Triggers,
}

impl NativeEventBridge {
    /// Native event names currently bridged.
    pub fn bridged(&self) -> Vec<String> {
        self.triggers.names()
    }

    fn bind_native(&self, host: &Rc<dyn HostLoop>, native_event: &str) {
        let triggers = self.triggers.clone();
        let name = native_event.to_string();
        host.bind(
            native_event,
            Box::new(move |payload| {
                let event = Event::from_payload(payload.clone()).with("native_event", name.as_str());
                if let Err(err) = triggers.fire(&name, None, event) {
                    warn!(native_event = %name, error = %err, "native event dispatch failed");
                }
            }),
        );
        debug!(native_event, "native event bound");
    }
}

impl Mod for NativeEventBridge {
    fn init(&mut self, ctx: &mut PhaseContext<'_>) -> anyhow::Result<()> {
        self.host = Some(ctx.engine().host());
        self.triggers = ctx.engine().triggers_for(ctx.mod_name());
        Ok(())
    }

    fn register(&mut self, trigger: &str, listener: Listener) -> Result<(), RegistrationError> {
        if trigger.parse::<Capability>().is_ok() {
            return Err(RegistrationError::NotATrigger {
                name: trigger.to_string(),
            });
        }
        let Some(host) = self.host.clone() else {
            return Err(RegistrationError::UnknownTrigger {
                trigger: trigger.to_string(),
            });
        };
        if self.triggers.ensure(trigger) {
            self.bind_native(&host, trigger);
        }
        self.triggers.register(trigger, listener)
    }

    fn triggers(&self) -> Option<&Triggers> {
        Some(&self.triggers)
    }
}
