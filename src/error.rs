//! Error types for the execution kernel

use fixsim_types::SettingsError;
use thiserror::Error;

use crate::token::Token;

/// Contract failures of a single signal cell
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReceiverError {
    #[error("cannot change an established value from {established} to {attempted}")]
    ValueChanged { established: Token, attempted: Token },

    #[error("cannot put a token into a receiver already known to be absent")]
    KnownAbsent,

    #[error("cannot clear a receiver already known to hold a token")]
    KnownPresent,

    #[error("receiver status is unknown")]
    Unknown,
}

impl ReceiverError {
    /// True for the failures that contradict an established signal
    pub fn is_monotonicity_violation(&self) -> bool {
        !matches!(self, ReceiverError::Unknown)
    }
}

/// Fatal errors raised while building or running an actor network
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("Monotonicity violation in '{actor}': {detail}")]
    Monotonicity { actor: String, detail: String },

    #[error("Causality loop: '{actor}' still has unknown input '{port}' (unresolved actors: {unresolved:?})")]
    CausalityLoop {
        actor: String,
        port: String,
        unresolved: Vec<String>,
    },

    #[error("Network is not schedulable, unbroken cycle through {actors:?}")]
    NotSchedulable { actors: Vec<String> },

    #[error("Step size fell below the time resolution twice at time {time}")]
    StepSizeBelowResolution { time: f64 },

    #[error("Missed breakpoint at time {breakpoint}, current time is {time}")]
    MissedBreakpoint { time: f64, breakpoint: f64 },

    #[error("Schedule modified during traversal (version {expected}, found {found})")]
    ConcurrentModification { expected: u64, found: u64 },

    #[error("'{actor}' requested firing at {requested}, earlier than current time {current}")]
    InvalidFireAt {
        actor: String,
        requested: f64,
        current: f64,
    },

    #[error("Model time {time} passed the stop time {stop}")]
    StopTimeExceeded { time: f64, stop: f64 },

    #[error("'{actor}' has no {direction} port {port}")]
    PortOutOfRange {
        actor: String,
        direction: &'static str,
        port: usize,
    },

    #[error("Input '{port}' of '{actor}' already has a source")]
    PortAlreadyConnected { actor: String, port: String },

    #[error("Actor is not part of this network: {0}")]
    UnknownActor(String),

    #[error("'{actor}' cannot read input '{port}': {source}")]
    UnreadableInput {
        actor: String,
        port: String,
        #[source]
        source: ReceiverError,
    },

    #[error("'{actor}': {message}")]
    Actor { actor: String, message: String },

    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),
}

impl KernelError {
    /// Failure raised by an actor implementation
    pub fn actor(actor: impl Into<String>, message: impl Into<String>) -> Self {
        KernelError::Actor {
            actor: actor.into(),
            message: message.into(),
        }
    }

    /// True for the numerical non-convergence family
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            KernelError::StepSizeBelowResolution { .. } | KernelError::MissedBreakpoint { .. }
        )
    }
}
