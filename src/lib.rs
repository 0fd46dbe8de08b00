//! # `at86rf215-tal`
//! This is a transceiver abstraction layer (TAL) for the Microchip AT86RF215 IEEE 802.15.4
//! transceiver. It sits between a MAC layer and the chip and takes care of channel access,
//! acknowledgements, reception, energy detection and power management.
//! The AT86RF215 has a sub-GHz core (RF09) and a 2.4 GHz core (RF24), which are driven
//! independently of each other. The AT86RF215M only has the sub-GHz core, which is selected with
//! the `rf215m` feature.
//!
//! ## Structure
//! The driver doesn't own any hardware. Register access goes through [TrxBus] and everything
//! else, like the reset and IRQ lines, the clock and the timers, goes through [TrxPlatform].
//!
//! ### Interrupts and timers
//! Nothing is processed in interrupt context. The interrupt handler reads the four IRQS
//! registers and passes them to [TalSignals::capture], which merges them into per core shadows.
//! Expired timers are reported with [TalSignals::timer_fired]. The state machine then runs in
//! [Tal::task], which is either called from a main loop or driven by [Tal::run].
//!
//! ### Receive (RX)
//! Every core holds one buffer from the [BufferPool], into which the next received frame is
//! copied. Once a frame is complete, the buffer is moved to the incoming queue of the core and a
//! new buffer is taken from the pool. If the pool is empty, the receiver is parked in TXPREP until
//! a buffer becomes available again. Received frames are handed out one per task pass as a
//! [Frame] through [TalHandler::rx_frame]. Dropping the [Frame] returns its buffer.
//!
//! ### Transmit (TX)
//! [Tal::tx_frame] takes a [Frame] and performs unslotted CSMA-CA. The backoff runs on the TAL
//! timer, the CCA itself is done by the transceiver, which transmits right away if the channel is
//! clear. If an ACK was requested, the transceiver switches to RX on its own and only ACK frames
//! pass the filter, until either the ACK arrived or the ACK wait timer expired. The frame is
//! handed back through [TalHandler::tx_frame_done].
//!
//! ### Filtering
//! The first of the four address filters of the baseband core is used. Frames addressed to the
//! configured PAN ID, short address or extended address are acknowledged automatically, with
//! the frame pending bit set.

#![cfg_attr(not(test), no_std)]
#![allow(unexpected_cfgs)]
pub(crate) mod fmt;

mod error;
mod frame;
mod hal;
mod phy;
mod pib;
mod pool;
pub mod regs;
mod sync;
mod tal;
mod trx;

pub use error::*;
pub use frame::{Frame, FrameControl, FrameInfo, FrameType};
pub use hal::{SubRegister, TimerError, TimerId, TimerToken, TrxBus, TrxPlatform};
pub use phy::*;
pub use pib::{FcsType, Pib, PibAttribute, PibValue};
pub use pool::{
    BufferHandle, BufferPool, Queue, SharedPool, DEFAULT_BUFFER_COUNT, LARGE_BUFFER_SIZE,
    MAX_PHY_PACKET_SIZE,
};
pub use sync::TalSignals;
pub use tal::{
    scale_ed_value, CsmaMode, RxMode, Tal, TalConfig, TalHandler, TalState, TxState,
    MAX_SCAN_DURATION,
};
pub use trx::{TrxId, TrxSelect, NUM_TRX};

#[cfg(not(feature = "critical_section"))]
type DefaultRawMutex = embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(feature = "critical_section")]
type DefaultRawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
