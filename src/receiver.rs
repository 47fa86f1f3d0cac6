//! Tri-state signal cells
//!
//! A receiver is either Unknown, Known-Absent or Known-Present with a value.
//! Within one iteration knowledge only grows: once a receiver is known its
//! presence and value are fixed until the engine resets it.

use crate::error::ReceiverError;
use crate::token::Token;

/// Observable status of a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStatus {
    Unknown,
    Absent,
    Present,
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Unknown,
    Absent,
    Present(Token),
}

/// A single signal cell
#[derive(Debug, Clone)]
pub struct Receiver {
    cell: Cell,
    sourceless: bool,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    /// Create a receiver with a source, starting Unknown
    pub fn new() -> Self {
        Self {
            cell: Cell::Unknown,
            sourceless: false,
        }
    }

    /// Create a receiver for a port without sources; it is always Known-Absent
    pub fn sourceless() -> Self {
        Self {
            cell: Cell::Unknown,
            sourceless: true,
        }
    }

    /// Make the receiver present with `token`.
    ///
    /// Returns `true` when this call moved the receiver from Unknown to Known.
    pub fn put(&mut self, token: Token) -> Result<bool, ReceiverError> {
        match &self.cell {
            Cell::Present(established) if *established == token => return Ok(false),
            Cell::Present(established) => {
                return Err(ReceiverError::ValueChanged {
                    established: established.clone(),
                    attempted: token,
                })
            }
            Cell::Absent => return Err(ReceiverError::KnownAbsent),
            Cell::Unknown if self.sourceless => return Err(ReceiverError::KnownAbsent),
            Cell::Unknown => {}
        }
        self.cell = Cell::Present(token);
        Ok(true)
    }

    /// Make the receiver absent.
    ///
    /// Returns `true` when this call moved the receiver from Unknown to Known.
    pub fn clear(&mut self) -> Result<bool, ReceiverError> {
        match self.cell {
            Cell::Unknown if self.sourceless => Ok(false),
            Cell::Unknown => {
                self.cell = Cell::Absent;
                Ok(true)
            }
            Cell::Absent => Ok(false),
            Cell::Present(_) => Err(ReceiverError::KnownPresent),
        }
    }

    /// Return to Unknown. Only the engine calls this, at iteration boundaries.
    pub fn reset(&mut self) {
        self.cell = Cell::Unknown;
    }

    pub fn is_known(&self) -> bool {
        self.sourceless || self.cell != Cell::Unknown
    }

    pub fn status(&self) -> SignalStatus {
        match self.cell {
            Cell::Unknown if self.sourceless => SignalStatus::Absent,
            Cell::Unknown => SignalStatus::Unknown,
            Cell::Absent => SignalStatus::Absent,
            Cell::Present(_) => SignalStatus::Present,
        }
    }

    /// Whether a token is present; an error while the status is unknown
    pub fn has_token(&self) -> Result<bool, ReceiverError> {
        match self.status() {
            SignalStatus::Unknown => Err(ReceiverError::Unknown),
            SignalStatus::Absent => Ok(false),
            SignalStatus::Present => Ok(true),
        }
    }

    /// The present token, `None` when absent; an error while unknown
    pub fn get(&self) -> Result<Option<&Token>, ReceiverError> {
        match &self.cell {
            Cell::Unknown if self.sourceless => Ok(None),
            Cell::Unknown => Err(ReceiverError::Unknown),
            Cell::Absent => Ok(None),
            Cell::Present(token) => Ok(Some(token)),
        }
    }
}

/// Index of a receiver inside a [`ReceiverTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(usize);

/// All receivers of a network, with the count of Unknown to Known
/// transitions since the last reset
#[derive(Debug, Default, Clone)]
pub struct ReceiverTable {
    receivers: Vec<Receiver>,
    known: usize,
}

impl ReceiverTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, receiver: Receiver) -> ReceiverId {
        self.receivers.push(receiver);
        ReceiverId(self.receivers.len() - 1)
    }

    pub fn get(&self, id: ReceiverId) -> &Receiver {
        &self.receivers[id.0]
    }

    pub fn put(&mut self, id: ReceiverId, token: Token) -> Result<(), ReceiverError> {
        if self.receivers[id.0].put(token)? {
            self.known += 1;
        }
        Ok(())
    }

    pub fn clear(&mut self, id: ReceiverId) -> Result<(), ReceiverError> {
        if self.receivers[id.0].clear()? {
            self.known += 1;
        }
        Ok(())
    }

    /// Reset every receiver to Unknown and zero the known count
    pub fn reset_all(&mut self) {
        for receiver in &mut self.receivers {
            receiver.reset();
        }
        self.known = 0;
    }

    /// Transitions to Known since the last [`reset_all`](Self::reset_all)
    pub fn known_count(&self) -> usize {
        self.known
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    pub fn all_known(&self) -> bool {
        self.receivers.iter().all(Receiver::is_known)
    }
}
