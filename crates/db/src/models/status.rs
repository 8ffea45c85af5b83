//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Execution lifecycle status.
    ///
    /// Stopped, Completed, and Error are terminal: once an execution
    /// reaches one of them no further job admission occurs.
    ExecutionStatus {
        Pending = 1,
        Running = 2,
        Paused = 3,
        Stopped = 4,
        Completed = 5,
        Error = 6,
    }
}

define_status_enum! {
    /// Per-job execution status.
    JobStatus {
        Queued = 1,
        Running = 2,
        Completed = 3,
        Error = 4,
    }
}

define_status_enum! {
    /// Extraction session (single attempt) status.
    SessionStatus {
        Running = 1,
        Completed = 2,
        Error = 3,
    }
}

impl ExecutionStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Stopped | ExecutionStatus::Completed | ExecutionStatus::Error
        )
    }

    /// Map a raw status id back to the enum, if valid.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(ExecutionStatus::Pending),
            2 => Some(ExecutionStatus::Running),
            3 => Some(ExecutionStatus::Paused),
            4 => Some(ExecutionStatus::Stopped),
            5 => Some(ExecutionStatus::Completed),
            6 => Some(ExecutionStatus::Error),
            _ => None,
        }
    }
}

impl JobStatus {
    /// A job is settled once it has completed or errored.
    pub fn is_settled(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Map a raw status id back to the enum, if valid.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(JobStatus::Queued),
            2 => Some(JobStatus::Running),
            3 => Some(JobStatus::Completed),
            4 => Some(JobStatus::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_status_ids_match_seed_data() {
        assert_eq!(ExecutionStatus::Pending.id(), 1);
        assert_eq!(ExecutionStatus::Running.id(), 2);
        assert_eq!(ExecutionStatus::Paused.id(), 3);
        assert_eq!(ExecutionStatus::Stopped.id(), 4);
        assert_eq!(ExecutionStatus::Completed.id(), 5);
        assert_eq!(ExecutionStatus::Error.id(), 6);
    }

    #[test]
    fn job_status_ids_match_seed_data() {
        assert_eq!(JobStatus::Queued.id(), 1);
        assert_eq!(JobStatus::Running.id(), 2);
        assert_eq!(JobStatus::Completed.id(), 3);
        assert_eq!(JobStatus::Error.id(), 4);
    }

    #[test]
    fn session_status_ids_match_seed_data() {
        assert_eq!(SessionStatus::Running.id(), 1);
        assert_eq!(SessionStatus::Completed.id(), 2);
        assert_eq!(SessionStatus::Error.id(), 3);
    }

    #[test]
    fn terminal_statuses() {
        assert!(ExecutionStatus::Stopped.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Error.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
    }

    #[test]
    fn from_id_round_trip() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Paused,
            ExecutionStatus::Stopped,
            ExecutionStatus::Completed,
            ExecutionStatus::Error,
        ] {
            assert_eq!(ExecutionStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(ExecutionStatus::from_id(0), None);
        assert_eq!(JobStatus::from_id(9), None);
    }
}
