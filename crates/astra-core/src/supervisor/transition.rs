use astra_model::{LifecycleCommand, LifecycleState};

use crate::error::LifecycleError;

/// Whether `command` may start from `from`.
///
/// | command    | valid from                                         |
/// |------------|----------------------------------------------------|
/// | initialize | uninitialized                                      |
/// | startup    | initialized                                        |
/// | goOffline  | running                                            |
/// | goOnline   | runningOffline                                     |
/// | shutdown   | uninitialized, initialized, running(Offline), error |
/// | restart    | initialized, running(Offline), error               |
///
/// Terminated accepts nothing; transient states are never observed by a request.
pub(crate) fn check(from: &LifecycleState, command: LifecycleCommand) -> Result<(), LifecycleError> {
    use LifecycleCommand as C;
    use LifecycleState as S;

    let ok = match command {
        C::Initialize => matches!(from, S::Uninitialized),
        C::Startup => matches!(from, S::Initialized),
        C::GoOffline => matches!(from, S::Running),
        C::GoOnline => matches!(from, S::RunningOffline),
        C::Shutdown => matches!(
            from,
            S::Uninitialized | S::Initialized | S::Running | S::RunningOffline | S::Error(_)
        ),
        C::Restart => matches!(
            from,
            S::Initialized | S::Running | S::RunningOffline | S::Error(_)
        ),
    };

    if ok {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition {
            from: from.clone(),
            command,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_COMMANDS: [LifecycleCommand; 6] = [
        LifecycleCommand::Initialize,
        LifecycleCommand::Startup,
        LifecycleCommand::GoOnline,
        LifecycleCommand::GoOffline,
        LifecycleCommand::Shutdown,
        LifecycleCommand::Restart,
    ];

    #[test]
    fn happy_path_is_valid() {
        assert!(check(&LifecycleState::Uninitialized, LifecycleCommand::Initialize).is_ok());
        assert!(check(&LifecycleState::Initialized, LifecycleCommand::Startup).is_ok());
        assert!(check(&LifecycleState::Running, LifecycleCommand::GoOffline).is_ok());
        assert!(check(&LifecycleState::RunningOffline, LifecycleCommand::GoOnline).is_ok());
        assert!(check(&LifecycleState::Running, LifecycleCommand::Shutdown).is_ok());
    }

    #[test]
    fn terminated_accepts_nothing() {
        for command in ALL_COMMANDS {
            assert!(check(&LifecycleState::Terminated, command).is_err());
        }
    }

    #[test]
    fn transient_states_accept_nothing() {
        for state in [LifecycleState::Restarting, LifecycleState::ShuttingDown] {
            for command in ALL_COMMANDS {
                assert!(check(&state, command).is_err());
            }
        }
    }

    #[test]
    fn rejection_names_state_and_command() {
        let err = check(&LifecycleState::Uninitialized, LifecycleCommand::Startup).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: LifecycleState::Uninitialized,
                command: LifecycleCommand::Startup,
            }
        );
    }

    #[test]
    fn error_allows_only_restart_and_shutdown() {
        let error = LifecycleState::Error("x".into());
        for command in ALL_COMMANDS {
            let allowed = matches!(command, LifecycleCommand::Restart | LifecycleCommand::Shutdown);
            assert_eq!(check(&error, command).is_ok(), allowed, "{command}");
        }
    }
}
