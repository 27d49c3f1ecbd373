//! Session outcomes and the exit codes they map to.
//!
//! The dispatch loop never exits the process. It returns a [`SessionOutcome`]
//! and the binary's `main` turns it into the process exit status, so a driver
//! can tell a clean shutdown from a failure by exit code alone.

/// Exit code for a worker that could not set up its connection.
pub const STARTUP_FAILURE_EXIT_CODE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Driver closed the channel. Normal end of a session.
    Closed,
    /// A workload failed. The driver was sent a failure message.
    WorkloadFailed,
    /// Unknown, unroutable or malformed command.
    ProtocolViolation,
    /// Corrupt frame or transport error.
    ChannelFailed,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::WorkloadFailed => 1,
            Self::ProtocolViolation => 3,
            Self::ChannelFailed => 4,
        }
    }

    /// Inverse of [`exit_code`](Self::exit_code), for the driver side.
    pub fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Closed),
            1 => Some(Self::WorkloadFailed),
            3 => Some(Self::ProtocolViolation),
            4 => Some(Self::ChannelFailed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::WorkloadFailed => "workload_failed",
            Self::ProtocolViolation => "protocol_violation",
            Self::ChannelFailed => "channel_failed",
        }
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SessionOutcome; 4] = [
        SessionOutcome::Closed,
        SessionOutcome::WorkloadFailed,
        SessionOutcome::ProtocolViolation,
        SessionOutcome::ChannelFailed,
    ];

    #[test]
    fn only_closed_is_success() {
        let successes: Vec<_> = ALL.iter().filter(|o| o.is_success()).collect();
        assert_eq!(successes, [&SessionOutcome::Closed]);
    }

    #[test]
    fn exit_codes_are_distinct_and_invertible() {
        for outcome in ALL {
            let code = outcome.exit_code();
            assert_ne!(code, STARTUP_FAILURE_EXIT_CODE);
            assert_eq!(SessionOutcome::from_exit_code(code.into()), Some(outcome));
        }
        assert_eq!(SessionOutcome::from_exit_code(STARTUP_FAILURE_EXIT_CODE.into()), None);
        assert_eq!(SessionOutcome::from_exit_code(-1), None);
    }
}
