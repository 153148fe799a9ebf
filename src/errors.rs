//! Runtime errors - reported conditions and fatal diagnostics
//!
//! Design: Two tiers.
//! - Reported errors travel back to the caller as `Result<_, RuntimeError>`.
//! - Fatal errors mean a broken internal invariant; `fatal` logs the
//!   diagnostic and panics (release builds abort).

use std::fmt;

use crate::logging::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    // Reported
    NoParentClass { class: String },
    FinalParent { class: String, parent: String },
    ConfigRead { path: String, reason: String },
    ConfigParse { reason: String },

    // Fatal
    BootstrapCycle { parcel: String },
    DoubleBootstrap { class: String },
    ClassNotBootstrapped,
    SlotOutOfRange { class: String, offset: u32 },
    RegistryFull { capacity: usize },
    RegistryRace { class: String },
    DestroyImmortal { class: String },
    AbstractMethod { class: String, method: String },
    MethodNotFound { class: String, method: String },
    IncomparableObjects { left: String, right: String },
    RefillNotEmpty { remaining: usize },
    SortAfterFetch { fetched: usize },
    FeedAfterFetch { fetched: usize },
    FeedAfterFlip,
    AddRunAfterFetch { fetched: usize },
    InvalidRunBuffer { tick: usize, max: usize, cap: usize },
}

impl ErrorKind {
    /// Whether this condition leaves the runtime unable to continue
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NoParentClass { .. }
                | Self::FinalParent { .. }
                | Self::ConfigRead { .. }
                | Self::ConfigParse { .. }
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoParentClass { class } => {
                write!(f, "Class '{}' doesn't descend from Obj", class)
            }
            Self::FinalParent { class, parent } => {
                write!(f, "Can't subclass final class {} (requested '{}')", parent, class)
            }
            Self::ConfigRead { path, reason } => {
                write!(f, "Failed to read config {}: {}", path, reason)
            }
            Self::ConfigParse { reason } => {
                write!(f, "Failed to parse config: {}", reason)
            }
            Self::BootstrapCycle { parcel } => {
                write!(f, "Cycle in class inheritance between parcels detected (parcel '{}')", parcel)
            }
            Self::DoubleBootstrap { class } => {
                write!(f, "Class '{}' was bootstrapped twice", class)
            }
            Self::ClassNotBootstrapped => {
                write!(f, "Class accessed before its parcel was bootstrapped")
            }
            Self::SlotOutOfRange { class, offset } => {
                write!(f, "Method offset {} is outside the vtable of class '{}'", offset, class)
            }
            Self::RegistryFull { capacity } => {
                write!(f, "Class registry exhausted ({} slots)", capacity)
            }
            Self::RegistryRace { class } => {
                write!(f, "Failed to either insert or fetch Class for '{}'", class)
            }
            Self::DestroyImmortal { class } => {
                write!(f, "Insane attempt to destroy immortal object of class '{}'", class)
            }
            Self::AbstractMethod { class, method } => {
                write!(f, "Abstract method '{}' not defined by class '{}'", method, class)
            }
            Self::MethodNotFound { class, method } => {
                write!(f, "Method {} not found in class '{}'", method, class)
            }
            Self::IncomparableObjects { left, right } => {
                write!(f, "Can't compare {} to {}", left, right)
            }
            Self::RefillNotEmpty { remaining } => {
                write!(f, "Can't refill unless empty ({} items remain)", remaining)
            }
            Self::SortAfterFetch { fetched } => {
                write!(f, "Can't sort_buffer() after fetching {} items", fetched)
            }
            Self::FeedAfterFetch { fetched } => {
                write!(f, "Can't feed() after fetching {} items", fetched)
            }
            Self::FeedAfterFlip => {
                write!(f, "Can't feed() after flip()")
            }
            Self::AddRunAfterFetch { fetched } => {
                write!(f, "Can't add_run() after draining began ({} items fetched)", fetched)
            }
            Self::InvalidRunBuffer { tick, max, cap } => {
                write!(f, "Invalid SortExternal buffer access: {} {} {}", tick, max, cap)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub context: Option<String>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, context: None }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn no_parent_class(class: &str) -> Self {
        Self::new(ErrorKind::NoParentClass { class: class.to_string() })
    }

    pub fn final_parent(class: &str, parent: &str) -> Self {
        Self::new(ErrorKind::FinalParent {
            class: class.to_string(),
            parent: parent.to_string(),
        })
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

impl From<ErrorKind> for RuntimeError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Report a broken runtime invariant and stop.
#[cold]
#[track_caller]
pub fn fatal(kind: ErrorKind) -> ! {
    debug_assert!(kind.is_fatal(), "reported error raised as fatal: {}", kind);
    error!(target: "runtime", error = %kind, "fatal runtime error");
    panic!("{}", kind);
}
