//! Recoverable memory errors
//!
//! Only address-space operations fail recoverably. Heap exhaustion in the
//! arena layer aborts instead of returning an error.

use core::fmt;

pub type Result<T> = core::result::Result<T, VirtSpaceError>;

/// Virtual space errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtSpaceError {
    /// The OS could not reserve the requested address range
    ReservationFailed { size: usize },
    /// Growth would move the commit top past the end of the reservation
    OutOfReservedSpace { requested: usize, available: usize },
    /// The OS refused to commit pages
    CommitFailed { addr: usize, size: usize },
    /// The OS refused to uncommit pages
    UncommitFailed { addr: usize, size: usize },
    /// Shrink request larger than the committed size
    Underflow { requested: usize, committed: usize },
}

impl fmt::Display for VirtSpaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservationFailed { size } => {
                write!(f, "failed to reserve {} bytes of address space", size)
            }
            Self::OutOfReservedSpace { requested, available } => write!(
                f,
                "cannot commit {} bytes: only {} bytes of reservation remain",
                requested, available
            ),
            Self::CommitFailed { addr, size } => {
                write!(f, "failed to commit {} bytes at {:#x}", size, addr)
            }
            Self::UncommitFailed { addr, size } => {
                write!(f, "failed to uncommit {} bytes at {:#x}", size, addr)
            }
            Self::Underflow { requested, committed } => write!(
                f,
                "cannot shrink by {} bytes: only {} bytes committed",
                requested, committed
            ),
        }
    }
}

impl std::error::Error for VirtSpaceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_sizes() {
        let err = VirtSpaceError::Underflow { requested: 9000, committed: 8192 };
        let message = err.to_string();
        assert!(message.contains("9000"));
        assert!(message.contains("8192"));
    }
}
