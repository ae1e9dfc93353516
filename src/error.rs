//! Error conditions surfaced to the application.
//!
//! Transient per-call outcomes (busy channel, missing response, checksum mismatch)
//! are not errors; they are [`Response`](crate::link::Response) values consumed by the
//! send queue. Only the conditions below ever reach [`BusHandler::on_error`].
//!
//! [`BusHandler::on_error`]: crate::driver::BusHandler::on_error

/// Conditions reported by the send queue and the frame encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum BusError {
    /// Every queue slot is in use. Retry the enqueue later.
    #[error("packet queue is full ({capacity} slots in use)")]
    BufferExhausted {
        /// Number of slots in the queue.
        capacity: usize,
    },
    /// The payload copy could not be stored.
    #[error("could not store a payload of {length} bytes")]
    AllocationFailed {
        /// Length of the payload that was rejected.
        length: usize,
    },
    /// A destination stopped answering after the configured number of attempts.
    #[error("connection to node {destination} lost")]
    ConnectionLost {
        /// Address of the unresponsive node.
        destination: u8,
    },
    /// The payload does not fit a frame.
    #[error("payload of {length} bytes exceeds the {max} byte limit")]
    PayloadTooLong {
        /// Length of the offending payload.
        length: usize,
        /// Largest payload accepted with the current settings.
        max: usize,
    },
}
