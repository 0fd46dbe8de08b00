/// Errors reported synchronously by the TAL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TalError {
    /// The transceiver is not idle.
    Busy,
    /// The transceiver is sleeping.
    TrxAsleep,
    /// Wake up was requested, but the transceiver is already awake.
    TrxAwake,
    InvalidParameter,
    UnsupportedAttribute,
    ReadOnlyAttribute,
    /// A bounded wait for the hardware ran out of time.
    Timeout,
    Failure,
}

/// Errors, that prevent the transceiver from being brought up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// The IRQ line didn't signal the end of the reset in time.
    ResetTimeout,
    /// The transceiver didn't come out of reset in TRXOFF.
    UnexpectedState(u8),
    WrongPartNumber(u8),
    WrongVersion(u8),
    /// No buffer was available for the receiver.
    BufferShortage,
}

/// The outcome of a transmission, reported through
/// [TalHandler::tx_frame_done](crate::TalHandler::tx_frame_done).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxStatus {
    Success,
    /// An ACK was received, which had the frame pending bit set.
    FramePending,
    /// CSMA-CA gave up after `MaxCSMABackoffs` busy channel assessments.
    ChannelAccessFailure,
    NoAck,
    Failure,
}

/// A transmission request, that was refused.
///
/// The frame is handed back, so the buffer isn't lost.
pub struct Rejected<F> {
    pub error: TalError,
    pub frame: F,
}
impl<F> core::fmt::Debug for Rejected<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

pub type TalResult<T> = Result<T, TalError>;
