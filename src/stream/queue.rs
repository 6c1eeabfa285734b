//! FIFO frame queues with an explicit single-owner in-flight handshake.
//!
//! # Responsibilities
//! - Strict FIFO ordering per queue; no reordering or coalescing
//! - Inbound three-state lifecycle: Pending → InFlight → Done → released
//! - Outbound two-state lifecycle: Pending → Done on delivery
//! - Loud rejection of contract violations (double poll, un-polled ack)
//!
//! # Design Decisions
//! - Frame state is a tagged variant with checked transition methods rather
//!   than boolean pairs; an illegal transition is an error, never a silent
//!   success
//! - Contract violations are programming errors surfaced to the caller as
//!   `QueueError`; they are not part of normal error flow

use std::collections::VecDeque;

/// Queue contract errors. The first three never occur under correct usage.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("poll while a frame is already in flight")]
    AlreadyInFlight,
    #[error("acknowledged a frame that was never polled")]
    NotInFlight,
    #[error("illegal frame transition from {from:?}")]
    IllegalTransition { from: FrameState },
    #[error("unknown connection {0}")]
    UnknownConnection(u64),
}

/// Lifecycle state of one queued frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Queued, not yet handed out.
    Pending,
    /// Handed to the consumer, awaiting acknowledgment.
    InFlight,
    /// Consumed; eligible for release.
    Done,
}

/// One discrete unit of queued binary payload.
#[derive(Debug)]
pub struct Frame {
    payload: Vec<u8>,
    state: FrameState,
}

impl Frame {
    fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            state: FrameState::Pending,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Pending → InFlight (inbound poll).
    fn launch(&mut self) -> Result<(), QueueError> {
        match self.state {
            FrameState::Pending => {
                self.state = FrameState::InFlight;
                Ok(())
            }
            from => Err(QueueError::IllegalTransition { from }),
        }
    }

    /// InFlight → Done (inbound acknowledge).
    fn complete(&mut self) -> Result<(), QueueError> {
        match self.state {
            FrameState::InFlight => {
                self.state = FrameState::Done;
                Ok(())
            }
            from => Err(QueueError::IllegalTransition { from }),
        }
    }

    /// Pending → Done, yielding the payload (outbound delivery).
    fn deliver(mut self) -> Result<Vec<u8>, QueueError> {
        match self.state {
            FrameState::Pending => {
                self.state = FrameState::Done;
                Ok(std::mem::take(&mut self.payload))
            }
            from => Err(QueueError::IllegalTransition { from }),
        }
    }
}

/// Inbound (peer-to-application) frame queue.
///
/// At most one frame may be in flight at a time; the consumer must
/// acknowledge it before polling again.
#[derive(Debug, Default)]
pub struct InboundQueue {
    frames: VecDeque<Frame>,
    in_flight: bool,
}

impl InboundQueue {
    /// Append a pending frame at the tail.
    pub fn enqueue(&mut self, payload: Vec<u8>) {
        self.frames.push_back(Frame::new(payload));
    }

    /// Pop the head frame and mark it in flight.
    ///
    /// `Ok(None)` when empty; `Err(AlreadyInFlight)` if the previous frame
    /// has not been acknowledged — that second poll is a contract violation.
    pub fn poll(&mut self) -> Result<Option<Frame>, QueueError> {
        if self.in_flight {
            return Err(QueueError::AlreadyInFlight);
        }
        match self.frames.pop_front() {
            None => Ok(None),
            Some(mut frame) => {
                frame.launch()?;
                self.in_flight = true;
                Ok(Some(frame))
            }
        }
    }

    /// Acknowledge the in-flight frame, releasing it.
    pub fn ack(&mut self, mut frame: Frame) -> Result<(), QueueError> {
        if !self.in_flight {
            return Err(QueueError::NotInFlight);
        }
        frame.complete()?;
        self.in_flight = false;
        // Reaching Done releases the frame; it drops here.
        Ok(())
    }

    /// Discard everything, including any in-flight handshake.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.in_flight = false;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Outbound (application-to-peer) frame queue; drained by the delivery loop.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    frames: VecDeque<Frame>,
}

impl OutboundQueue {
    pub fn push(&mut self, payload: Vec<u8>) {
        self.frames.push_back(Frame::new(payload));
    }

    /// Dequeue the head frame and mark it delivered, yielding the payload.
    pub fn pop_for_delivery(&mut self) -> Result<Option<Vec<u8>>, QueueError> {
        match self.frames.pop_front() {
            None => Ok(None),
            Some(frame) => frame.deliver().map(Some),
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_fifo_order() {
        let mut q = InboundQueue::default();
        q.enqueue(b"one".to_vec());
        q.enqueue(b"two".to_vec());

        let f1 = q.poll().unwrap().unwrap();
        assert_eq!(f1.payload(), b"one");
        assert_eq!(f1.state(), FrameState::InFlight);
        q.ack(f1).unwrap();

        let f2 = q.poll().unwrap().unwrap();
        assert_eq!(f2.payload(), b"two");
        q.ack(f2).unwrap();

        assert!(q.poll().unwrap().is_none());
    }

    #[test]
    fn double_poll_is_a_contract_violation() {
        let mut q = InboundQueue::default();
        q.enqueue(b"a".to_vec());
        q.enqueue(b"b".to_vec());

        let _held = q.poll().unwrap().unwrap();
        assert_eq!(q.poll().unwrap_err(), QueueError::AlreadyInFlight);
    }

    #[test]
    fn ack_without_poll_is_rejected() {
        let mut q = InboundQueue::default();
        q.enqueue(b"a".to_vec());
        let frame = q.poll().unwrap().unwrap();
        q.ack(frame).unwrap();

        let mut other = InboundQueue::default();
        other.enqueue(b"b".to_vec());
        let foreign = other.poll().unwrap().unwrap();
        // q has nothing in flight; acknowledging here must fail loudly.
        assert_eq!(q.ack(foreign).unwrap_err(), QueueError::NotInFlight);
    }

    #[test]
    fn poll_after_ack_proceeds() {
        let mut q = InboundQueue::default();
        q.enqueue(b"a".to_vec());
        q.enqueue(b"b".to_vec());
        let f = q.poll().unwrap().unwrap();
        q.ack(f).unwrap();
        assert!(q.poll().unwrap().is_some());
    }

    #[test]
    fn outbound_delivery_is_fifo_and_final() {
        let mut q = OutboundQueue::default();
        q.push(b"x".to_vec());
        q.push(b"y".to_vec());
        assert_eq!(q.pop_for_delivery().unwrap().unwrap(), b"x");
        assert_eq!(q.pop_for_delivery().unwrap().unwrap(), b"y");
        assert!(q.pop_for_delivery().unwrap().is_none());
    }

    #[test]
    fn clear_resets_handshake() {
        let mut q = InboundQueue::default();
        q.enqueue(b"a".to_vec());
        let _f = q.poll().unwrap().unwrap();
        q.clear();
        q.enqueue(b"b".to_vec());
        assert!(q.poll().unwrap().is_some());
    }
}
