//! Traits for the services the TAL consumes from the board.
//!
//! The transport to the transceiver (usually SPI in block mode), the reset and IRQ GPIOs, a
//! microsecond clock and a timer service are all provided by the user of this crate.
use embassy_time::{Duration, Instant};

use crate::trx::TrxId;

/// A bit field inside an eight bit register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubRegister {
    pub addr: u16,
    pub mask: u8,
    pub shift: u8,
}
impl SubRegister {
    pub const fn new(addr: u16, mask: u8, shift: u8) -> Self {
        Self { addr, mask, shift }
    }
    /// Move the sub register by the given address offset.
    pub const fn offset(self, offset: u16) -> Self {
        Self {
            addr: self.addr + offset,
            ..self
        }
    }
}

/// Register level access to the transceiver.
///
/// All addresses are absolute, the per transceiver offsets are already applied.
pub trait TrxBus {
    /// Read `buf.len()` consecutive bytes starting at `addr`.
    fn read(&mut self, addr: u16, buf: &mut [u8]);
    /// Write `data` to consecutive addresses starting at `addr`.
    fn write(&mut self, addr: u16, data: &[u8]);

    fn read_reg(&mut self, addr: u16) -> u8 {
        let mut value = [0u8];
        self.read(addr, &mut value);
        value[0]
    }
    fn write_reg(&mut self, addr: u16, value: u8) {
        self.write(addr, &[value]);
    }
    /// Read a sub register and shift it down.
    fn read_bits(&mut self, sub_register: SubRegister) -> u8 {
        (self.read_reg(sub_register.addr) & sub_register.mask) >> sub_register.shift
    }
    /// Read-modify-write a sub register.
    fn write_bits(&mut self, sub_register: SubRegister, value: u8) {
        let current = self.read_reg(sub_register.addr);
        let value =
            (current & !sub_register.mask) | ((value << sub_register.shift) & sub_register.mask);
        self.write_reg(sub_register.addr, value);
    }
}

/// The timers used by the TAL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    /// Backoff and ACK wait timer.
    Tal,
    /// Periodic filter tuning.
    Calibration,
}
impl TimerId {
    pub(crate) const COUNT: usize = 2;
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Tal => 0,
            Self::Calibration => 1,
        }
    }
}

/// Opaque argument of a timer.
///
/// The platform hands this back to [TalSignals::timer_fired](crate::TalSignals::timer_fired)
/// once the timer expires. Tokens of stopped or restarted timers are discarded by the TAL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerToken {
    pub timer: TimerId,
    pub trx: TrxId,
    pub(crate) generation: u16,
}

/// The timer service couldn't start a timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerError;

/// Everything besides the register interface, that the TAL needs from the board.
pub trait TrxPlatform {
    /// Drive the reset line of the transceiver.
    fn set_reset(&mut self, asserted: bool);
    /// The current level of the IRQ line, with the configured polarity already applied.
    fn irq_line_active(&mut self) -> bool;
    /// Enable or disable the transceiver interrupt.
    fn set_irq_enabled(&mut self, enabled: bool);
    /// Monotonic microsecond clock.
    fn now(&mut self) -> Instant;
    fn delay_us(&mut self, us: u32);
    /// Start a one-shot timer relative to now.
    ///
    /// A timer, that is already running for the same [TimerId] and [TrxId], is replaced.
    fn start_timer(&mut self, token: TimerToken, duration: Duration) -> Result<(), TimerError>;
    /// Stop a timer. Stopping a timer, that isn't running, is not an error.
    fn stop_timer(&mut self, timer: TimerId, trx: TrxId);
    /// Draw a random number for the CSMA-CA backoff.
    fn random(&mut self) -> u16;
    fn seed_random(&mut self, seed: u16);
}
