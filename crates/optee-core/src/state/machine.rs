//! Transaction state machine.

use std::fmt;

use tracing::{debug, warn};

use crate::events::{TeeEvent, TeeObserver};
use crate::key::TransactionKey;
use crate::protocol::{FrameError, InputFrame, OutputFrame};

/// State of one command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// A frame is with the driver (or about to be).
    Submitted,
    /// The TA asked for an RPC; the caller's handler is answering it.
    RpcPending,
    /// The TA function finished.
    Completed,
    /// Aborted.
    Failed,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Submitted => write!(f, "SUBMITTED"),
            TransactionState::RpcPending => write!(f, "RPC_PENDING"),
            TransactionState::Completed => write!(f, "COMPLETED"),
            TransactionState::Failed => write!(f, "FAILED"),
        }
    }
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Completed | TransactionState::Failed)
    }

    /// Whether `next` may follow this state.
    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Submitted, Completed | RpcPending | Failed) | (RpcPending, Submitted | Failed)
        )
    }
}

/// One command invocation: its key, both frames and its progress.
///
/// Frames are allocated in [`begin`](Self::begin) and released when the
/// transaction is dropped, whichever way the invocation ends.
pub struct Transaction<'o, O: TeeObserver + ?Sized> {
    key: TransactionKey,
    state: TransactionState,
    /// Submissions so far (the command plus every RPC response).
    round_trips: u32,
    output_capacity: usize,
    input: InputFrame,
    output: OutputFrame,
    observer: &'o O,
}

impl<'o, O: TeeObserver + ?Sized> Transaction<'o, O> {
    /// Build both frames for a new command.
    pub fn begin(
        key: TransactionKey,
        command_input: &[u8],
        output_capacity: usize,
        observer: &'o O,
    ) -> Result<Self, FrameError> {
        let input = InputFrame::for_command(key.value(), command_input, output_capacity)?;
        let output = OutputFrame::for_capacity(output_capacity)?;
        debug!(
            key = %key,
            input_frame = input.len(),
            output_frame = output.len(),
            "Frames allocated"
        );
        Ok(Self {
            key,
            state: TransactionState::Submitted,
            round_trips: 0,
            output_capacity,
            input,
            output,
            observer,
        })
    }

    pub fn key(&self) -> TransactionKey {
        self.key
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn round_trips(&self) -> u32 {
        self.round_trips
    }

    pub fn output_capacity(&self) -> usize {
        self.output_capacity
    }

    pub fn input(&self) -> &InputFrame {
        &self.input
    }

    pub fn output(&self) -> &OutputFrame {
        &self.output
    }

    /// Borrow both frames at once: input for writing RPC answers, output
    /// for reading the driver's reply or for the driver to fill.
    pub fn frames_mut(&mut self) -> (&mut InputFrame, &mut OutputFrame) {
        (&mut self.input, &mut self.output)
    }

    pub(crate) fn emit(&self, event: TeeEvent) {
        self.observer.on_event(&event);
    }

    /// Transition to a new state. Illegal transitions are refused.
    pub fn goto_state(&mut self, new_state: TransactionState) -> bool {
        if !self.state.can_transition_to(new_state) {
            warn!(key = %self.key, from = %self.state, to = %new_state, "Refused state transition");
            return false;
        }
        debug!(key = %self.key, from = %self.state, to = %new_state, "State transition");
        self.state = new_state;
        true
    }

    /// Count a submission about to go out.
    pub fn record_submission(&mut self) {
        self.round_trips += 1;
        self.emit(TeeEvent::Submitted {
            key: self.key,
            round_trip: self.round_trips,
            input_type: self
                .input
                .frame_type()
                .unwrap_or(crate::protocol::InputType::Command),
        });
    }

    /// Abort the transaction.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.goto_state(TransactionState::Failed);
        }
    }
}

impl<O: TeeObserver + ?Sized> Drop for Transaction<'_, O> {
    fn drop(&mut self) {
        self.emit(TeeEvent::Released {
            key: self.key,
            round_trips: self.round_trips,
        });
    }
}
