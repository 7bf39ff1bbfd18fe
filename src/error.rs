//! Unified error types for the LACT controller core.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! scan executive's error handling uniform. Variants carry only bounded
//! payloads so they can be passed through the scan path without allocation.

use core::fmt;

/// Maximum length of a tag or setpoint name carried inside an error.
pub const NAME_CAP: usize = 32;

// ---------------------------------------------------------------------------
// Top-level controller error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A tag lookup or write violated the process-image contract.
    Tag(TagError),
    /// A setpoint failed domain validation or does not exist.
    Setpoint(SetpointError),
    /// A field read/write failed at the I/O port boundary.
    Io(IoError),
    /// An operator command could not be accepted.
    Command(CommandError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(e) => write!(f, "tag: {e}"),
            Self::Setpoint(e) => write!(f, "setpoint: {e}"),
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Tag store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// The named tag was never declared. Unknown tags fail loudly; the
    /// store never hands back a default for a name it does not know.
    Unknown(heapless::String<NAME_CAP>),
    /// The written value's variant does not match the tag's declared kind.
    KindMismatch { tag: &'static str },
}

impl TagError {
    pub fn unknown(name: &str) -> Self {
        let mut s = heapless::String::new();
        let _ = s.push_str(&name[..name.len().min(NAME_CAP)]);
        Self::Unknown(s)
    }
}

impl fmt::Display for TagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(name) => write!(f, "unknown tag '{name}'"),
            Self::KindMismatch { tag } => write!(f, "value kind mismatch on '{tag}'"),
        }
    }
}

impl From<TagError> for Error {
    fn from(e: TagError) -> Self {
        Self::Tag(e)
    }
}

// ---------------------------------------------------------------------------
// Setpoint errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetpointError {
    /// No recognized setpoint with this name.
    UnknownField(heapless::String<NAME_CAP>),
    /// The value is outside the field's declared domain. The snapshot is
    /// left unchanged.
    OutOfDomain { field: &'static str },
}

impl SetpointError {
    pub fn unknown(name: &str) -> Self {
        let mut s = heapless::String::new();
        let _ = s.push_str(&name[..name.len().min(NAME_CAP)]);
        Self::UnknownField(s)
    }
}

impl fmt::Display for SetpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownField(name) => write!(f, "unknown setpoint '{name}'"),
            Self::OutOfDomain { field } => write!(f, "'{field}' outside declared domain"),
        }
    }
}

impl From<SetpointError> for Error {
    fn from(e: SetpointError) -> Self {
        Self::Setpoint(e)
    }
}

// ---------------------------------------------------------------------------
// I/O port errors
// ---------------------------------------------------------------------------

/// Failures at the field boundary. The scan thread never terminates on one
/// of these; affected tags are marked quality Bad and the safety checks
/// convert sustained Bad quality into alarms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// Input scan failed (transport error, device offline).
    ReadFailed(&'static str),
    /// Output flush failed.
    WriteFailed(&'static str),
    /// The per-call deadline expired before the transport answered.
    Timeout,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(what) => write!(f, "input read failed: {what}"),
            Self::WriteFailed(what) => write!(f, "output write failed: {what}"),
            Self::Timeout => write!(f, "field transport timeout"),
        }
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// The command is not legal in the current operating state. Raises an
    /// Info alarm; the state is unchanged.
    IllegalInState { cmd: &'static str, state: &'static str },
    /// The bounded command queue is full; the command was not enqueued.
    QueueFull,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalInState { cmd, state } => {
                write!(f, "{cmd} not legal in state {state}")
            }
            Self::QueueFull => write!(f, "command queue full"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Controller-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
