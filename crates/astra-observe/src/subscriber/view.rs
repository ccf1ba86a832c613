use std::borrow::Borrow;

use astra_core::{EventKind, LifecycleEvent};
use tracing::{debug, error, info, trace, warn};

pub trait View {
    fn component(&self) -> String;
    fn state(&self) -> String;
    fn as_reason(&self) -> &str;
    fn command(&self) -> &'static str;
    fn attempt(&self) -> u32;
    fn kind(&self) -> EventKind;
}

impl<T> View for T
where
    T: Borrow<LifecycleEvent>,
{
    #[inline]
    fn component(&self) -> String {
        self.borrow().component.to_string()
    }
    #[inline]
    fn state(&self) -> String {
        self.borrow().state.to_string()
    }
    #[inline]
    fn as_reason(&self) -> &str {
        self.borrow().reason.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn command(&self) -> &'static str {
        self.borrow().command.map(|c| c.name()).unwrap_or("none")
    }
    #[inline]
    fn attempt(&self) -> u32 {
        self.borrow().attempt.unwrap_or(0)
    }
    #[inline]
    fn kind(&self) -> EventKind {
        self.borrow().kind
    }
}

#[inline]
pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        // requests
        EventKind::TransitionRequested => "lifecycle transition requested",
        EventKind::TransitionRejected => "lifecycle transition rejected in current state",

        // state
        EventKind::StateChanged => "component changed state",
        EventKind::HandlerFailed => "lifecycle handler failed",

        // discovery
        EventKind::Registered => "component registered with discovery",
        EventKind::Unregistered => "component removed from discovery",
        EventKind::RegistrationFailed => "discovery registration failed",

        // health
        EventKind::FailureReported => "component reported a runtime failure",
        EventKind::HeartbeatLost => "component heartbeat lost",

        // restart policy
        EventKind::RestartScheduled => "automatic restart scheduled",
        EventKind::RestartExhausted => "restart policy exhausted (no further restarts)",
    }
}

#[inline]
pub fn log_event<E: View>(e: E) {
    let msg = message_for(e.kind());

    match e.kind() {
        // requests
        EventKind::TransitionRequested => {
            trace!(component = %e.component(), command = e.command(), "{msg}")
        }
        EventKind::TransitionRejected => warn!(
            component = %e.component(),
            command = e.command(),
            state = %e.state(),
            "{msg}"
        ),

        // state
        EventKind::StateChanged => {
            info!(component = %e.component(), state = %e.state(), "{msg}")
        }
        EventKind::HandlerFailed => error!(
            component = %e.component(),
            command = e.command(),
            reason = e.as_reason(),
            "{msg}"
        ),

        // discovery
        EventKind::Registered => debug!(component = %e.component(), "{msg}"),
        EventKind::Unregistered => debug!(component = %e.component(), "{msg}"),
        EventKind::RegistrationFailed => {
            error!(component = %e.component(), reason = e.as_reason(), "{msg}")
        }

        // health
        EventKind::FailureReported => {
            error!(component = %e.component(), reason = e.as_reason(), "{msg}")
        }
        EventKind::HeartbeatLost => {
            warn!(component = %e.component(), reason = e.as_reason(), "{msg}")
        }

        // restart policy
        EventKind::RestartScheduled => info!(
            component = %e.component(),
            attempt = e.attempt(),
            "{msg}"
        ),
        EventKind::RestartExhausted => error!(
            component = %e.component(),
            attempt = e.attempt(),
            reason = e.as_reason(),
            "{msg}"
        ),
    }
}
