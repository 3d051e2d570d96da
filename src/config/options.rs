//! Run options for the ring diagnostic.
//!
//! This module provides the `DiagOptions` struct. Every worker receives an identical copy
//! before the first phase starts, built either from command-line arguments
//! (see [`super::cli`]) or through the API. It holds the constants the checks compare
//! against: the starting token, the broadcast value, the point-to-point tag and the width of
//! a host record. It also holds the policy that maps failed checks to an exit status.

use crate::error::{DiagError, Result};

/// Value rank 0 puts on the ring.
pub const DEFAULT_TOKEN: i32 = 42;
/// Value rank 0 broadcasts.
pub const DEFAULT_BROADCAST_VALUE: i32 = 12345;
/// Width of one host record in the gather buffer.
pub const DEFAULT_HOST_LEN: usize = 256;
/// Upper bound on `host_len`.
pub const MAX_HOST_LEN: usize = 4096;

/// How failed checks map onto the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Exit 0 once every phase completes, whatever the checks found.
    #[default]
    Lenient,
    /// Exit [`STRICT_FAILURE_CODE`] when any check failed.
    Strict,
}

/// Exit status used by [`ExitPolicy::Strict`] when a check failed.
pub const STRICT_FAILURE_CODE: u8 = 2;

impl ExitPolicy {
    pub fn exit_code(self, all_passed: bool) -> u8 {
        match self {
            ExitPolicy::Strict if !all_passed => STRICT_FAILURE_CODE,
            _ => 0,
        }
    }
}

/// Diagnostic constants & policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagOptions {
    /// Token value `T0` rank 0 starts the ring with
    pub token_start: i32,

    /// Value rank 0 broadcasts to the group
    pub broadcast_value: i32,

    /// Tag used by the ring's point-to-point messages
    pub tag: i32,

    /// Bytes per host record in the node-tally gather
    pub host_len: usize,

    /// Exit status policy for failed checks
    pub exit_policy: ExitPolicy,
}

impl Default for DiagOptions {
    fn default() -> Self {
        DiagOptions {
            token_start: DEFAULT_TOKEN,
            broadcast_value: DEFAULT_BROADCAST_VALUE,
            tag: 0,
            host_len: DEFAULT_HOST_LEN,
            exit_policy: ExitPolicy::Lenient,
        }
    }
}

impl DiagOptions {
    /// Reject values no backend can honour.
    pub fn validate(&self) -> Result<()> {
        if self.tag < 0 {
            return Err(DiagError::Config(format!(
                "tag {} must be non-negative",
                self.tag
            )));
        }
        if self.host_len == 0 || self.host_len > MAX_HOST_LEN {
            return Err(DiagError::Config(format!(
                "host record length {} must be between 1 and {MAX_HOST_LEN}",
                self.host_len
            )));
        }
        Ok(())
    }
}
