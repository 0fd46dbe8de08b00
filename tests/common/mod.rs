#![allow(dead_code)]
use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use at86rf215_tal::{
    regs::*, Frame, SharedPool, SubRegister, Tal, TalConfig, TalHandler, TalSignals, TimerError,
    TimerId, TimerToken, TrxBus, TrxId, TrxPlatform, TxStatus,
};
use embassy_time::{Duration, Instant};

pub const REGISTER_SPACE: usize = 0x4000;
/// Every call to `now` advances the clock by this much.
pub const CLOCK_STEP_US: u64 = 10;

const CMD_REGS: &[u16] = &[0x103, 0x203];
const STATE_REGS: &[u16] = &[0x102, 0x202];

/// A register level model of the transceiver.
pub struct Chip {
    pub regs: Vec<u8>,
    /// Every byte written, in order.
    pub writes: Vec<(u16, u8)>,
    pub irq_line: bool,
    pub irq_enabled: bool,
    pub reset_asserted: bool,
    /// Signal the end of a reset on the IRQ line.
    pub reset_responds: bool,
    /// Wake up when TRXOFF is commanded during sleep.
    pub wakeup_responds: bool,
    /// Ignore state changing commands.
    pub state_stuck: bool,
    pub now_us: u64,
    pub delayed_us: u64,
    pub started_timers: Vec<(TimerToken, Duration)>,
    pub stopped_timers: Vec<(TimerId, TrxId)>,
    pub fail_timers: bool,
    pub random: VecDeque<u16>,
    pub seed: Option<u16>,
}
impl Chip {
    pub fn new() -> Self {
        let mut regs = vec![0u8; REGISTER_SPACE];
        regs[RG_RF_PN as usize] = PART_NUMBER;
        regs[RG_RF_VN as usize] = 3;
        Self {
            regs,
            writes: Vec::new(),
            irq_line: false,
            irq_enabled: false,
            reset_asserted: false,
            reset_responds: true,
            wakeup_responds: true,
            state_stuck: false,
            now_us: 0,
            delayed_us: 0,
            started_timers: Vec::new(),
            stopped_timers: Vec::new(),
            fail_timers: false,
            random: VecDeque::new(),
            seed: None,
        }
    }
    pub fn reg(&self, trx: TrxId, addr: u16) -> u8 {
        self.regs[trx.reg(addr) as usize]
    }
    pub fn set_reg(&mut self, trx: TrxId, addr: u16, value: u8) {
        self.regs[trx.reg(addr) as usize] = value;
    }
    pub fn bits(&self, trx: TrxId, sub_register: SubRegister) -> u8 {
        (self.reg(trx, sub_register.addr) & sub_register.mask) >> sub_register.shift
    }
    pub fn set_bits(&mut self, trx: TrxId, sub_register: SubRegister, value: u8) {
        let addr = trx.reg(sub_register.addr) as usize;
        self.regs[addr] = (self.regs[addr] & !sub_register.mask)
            | ((value << sub_register.shift) & sub_register.mask);
    }
    pub fn state(&self, trx: TrxId) -> RfCmdState {
        RfCmdState::from_bits(self.reg(trx, RG_RF09_STATE))
    }
    /// All commands written to a core, in order.
    pub fn commands(&self, trx: TrxId) -> Vec<u8> {
        let cmd = trx.reg(RG_RF09_CMD);
        self.writes
            .iter()
            .filter(|(addr, _)| *addr == cmd)
            .map(|(_, value)| *value)
            .collect()
    }
    pub fn count_commands(&self, trx: TrxId, command: RfCmdState) -> usize {
        self.commands(trx)
            .into_iter()
            .filter(|value| *value == command.into_bits())
            .count()
    }
    pub fn last_command(&self, trx: TrxId) -> Option<RfCmdState> {
        self.commands(trx).last().copied().map(RfCmdState::from_bits)
    }
    /// Raise interrupts, as the chip would.
    pub fn raise(&mut self, trx: TrxId, rf: RfIrq, bb: BbIrq) {
        self.regs[RG_RF09_IRQS as usize + trx.index()] |= rf.into_bits();
        self.regs[RG_RF09_IRQS as usize + 2 + trx.index()] |= bb.into_bits();
        self.irq_line = true;
    }
    /// Place a received frame in the RX frame buffer.
    pub fn receive(&mut self, trx: TrxId, psdu: &[u8], ed: i8) {
        let len = (psdu.len() as u16).to_le_bytes();
        self.set_reg(trx, RG_BBC0_RXFLL, len[0]);
        self.set_reg(trx, RG_BBC0_RXFLL + 1, len[1]);
        let start = trx.frame_buffer(RG_BBC0_FBRXS) as usize;
        self.regs[start..start + psdu.len()].copy_from_slice(psdu);
        self.set_reg(trx, RG_RF09_EDV, ed as u8);
    }
    /// Contents of the TX frame buffer, as announced by TXFLL.
    pub fn transmitted(&self, trx: TrxId) -> Vec<u8> {
        let len = u16::from_le_bytes([
            self.reg(trx, RG_BBC0_TXFLL),
            self.reg(trx, RG_BBC0_TXFLL + 1),
        ]) as usize;
        let start = trx.frame_buffer(RG_BBC0_FBTXS) as usize;
        self.regs[start..start + len].to_vec()
    }
    pub fn last_timer(&self, timer: TimerId) -> Option<(TimerToken, Duration)> {
        self.started_timers
            .iter()
            .rev()
            .find(|(token, _)| token.timer == timer)
            .copied()
    }
    fn wake_up_all(&mut self) {
        for (index, state) in STATE_REGS.iter().enumerate() {
            if self.regs[*state as usize] == RfCmdState::Sleep.into_bits() {
                self.regs[*state as usize] = RfCmdState::TrxOff.into_bits();
                self.regs[RG_RF09_IRQS as usize + index] |= RfIrq::new().with_wakeup(true).into_bits();
                self.irq_line = true;
            }
        }
    }
    fn hardware_reset(&mut self) {
        for (index, state) in STATE_REGS.iter().enumerate() {
            self.regs[*state as usize] = RfCmdState::TrxOff.into_bits();
            self.regs[RG_RF09_IRQS as usize + index] = RfIrq::new().with_wakeup(true).into_bits();
        }
        self.irq_line = self.reset_responds;
    }
    fn command(&mut self, core: usize, command: u8) {
        if self.state_stuck {
            return;
        }
        let state = STATE_REGS[core] as usize;
        match RfCmdState::from_bits(command) {
            RfCmdState::Nop => {}
            RfCmdState::Reset => {
                self.regs[state] = RfCmdState::TrxOff.into_bits();
                self.regs[RG_RF09_IRQS as usize + core] |= RfIrq::new().with_wakeup(true).into_bits();
                self.irq_line = self.reset_responds;
            }
            RfCmdState::TrxOff if self.regs[state] == RfCmdState::Sleep.into_bits() => {
                if self.wakeup_responds {
                    self.wake_up_all();
                }
            }
            _ => self.regs[state] = command,
        }
    }
}

pub type SharedChip = Rc<RefCell<Chip>>;

pub struct MockBus(pub SharedChip);
impl TrxBus for MockBus {
    fn read(&mut self, addr: u16, buf: &mut [u8]) {
        let mut chip = self.0.borrow_mut();
        for (offset, byte) in buf.iter_mut().enumerate() {
            let addr = addr as usize + offset;
            *byte = chip.regs[addr];
            // The IRQS registers are cleared by reading them.
            if addr < IRQS_LEN {
                chip.regs[addr] = 0;
            }
        }
        if chip.regs[..IRQS_LEN].iter().all(|irqs| *irqs == 0) {
            chip.irq_line = false;
        }
    }
    fn write(&mut self, addr: u16, data: &[u8]) {
        let mut chip = self.0.borrow_mut();
        for (offset, byte) in data.iter().enumerate() {
            let addr = addr + offset as u16;
            chip.writes.push((addr, *byte));
            chip.regs[addr as usize] = *byte;
            if let Some(core) = CMD_REGS.iter().position(|cmd| *cmd == addr) {
                chip.command(core, *byte);
            }
        }
    }
}

pub struct MockPlatform(pub SharedChip);
impl TrxPlatform for MockPlatform {
    fn set_reset(&mut self, asserted: bool) {
        let mut chip = self.0.borrow_mut();
        if chip.reset_asserted && !asserted {
            chip.hardware_reset();
        }
        chip.reset_asserted = asserted;
    }
    fn irq_line_active(&mut self) -> bool {
        self.0.borrow().irq_line
    }
    fn set_irq_enabled(&mut self, enabled: bool) {
        self.0.borrow_mut().irq_enabled = enabled;
    }
    fn now(&mut self) -> Instant {
        let mut chip = self.0.borrow_mut();
        chip.now_us += CLOCK_STEP_US;
        Instant::from_micros(chip.now_us)
    }
    fn delay_us(&mut self, us: u32) {
        let mut chip = self.0.borrow_mut();
        chip.now_us += us as u64;
        chip.delayed_us += us as u64;
    }
    fn start_timer(&mut self, token: TimerToken, duration: Duration) -> Result<(), TimerError> {
        let mut chip = self.0.borrow_mut();
        if chip.fail_timers {
            return Err(TimerError);
        }
        chip.started_timers.push((token, duration));
        Ok(())
    }
    fn stop_timer(&mut self, timer: TimerId, trx: TrxId) {
        self.0.borrow_mut().stopped_timers.push((timer, trx));
    }
    fn random(&mut self) -> u16 {
        self.0.borrow_mut().random.pop_front().unwrap_or(0)
    }
    fn seed_random(&mut self, seed: u16) {
        self.0.borrow_mut().seed = Some(seed);
    }
}

pub fn mock() -> (MockBus, MockPlatform, SharedChip) {
    let chip = Rc::new(RefCell::new(Chip::new()));
    (MockBus(chip.clone()), MockPlatform(chip.clone()), chip)
}

/// Records everything the TAL reports.
pub struct Recorder<'res, const BUFFER_COUNT: usize> {
    pub rx: Vec<Frame<'res, BUFFER_COUNT>>,
    pub tx_done: Vec<(TrxId, TxStatus, Frame<'res, BUFFER_COUNT>)>,
    pub ed: Vec<(TrxId, u8)>,
    pub battery_low: Vec<TrxId>,
}
impl<const BUFFER_COUNT: usize> Default for Recorder<'_, BUFFER_COUNT> {
    fn default() -> Self {
        Self {
            rx: Vec::new(),
            tx_done: Vec::new(),
            ed: Vec::new(),
            battery_low: Vec::new(),
        }
    }
}
impl<const BUFFER_COUNT: usize> Recorder<'_, BUFFER_COUNT> {
    pub fn statuses(&self) -> Vec<TxStatus> {
        self.tx_done.iter().map(|(_, status, _)| *status).collect()
    }
}
impl<'res, const BUFFER_COUNT: usize> TalHandler<'res, BUFFER_COUNT>
    for Recorder<'res, BUFFER_COUNT>
{
    fn rx_frame(&mut self, _trx: TrxId, frame: Frame<'res, BUFFER_COUNT>) {
        self.rx.push(frame);
    }
    fn tx_frame_done(&mut self, trx: TrxId, status: TxStatus, frame: Frame<'res, BUFFER_COUNT>) {
        self.tx_done.push((trx, status, frame));
    }
    fn ed_end(&mut self, trx: TrxId, energy_level: u8) {
        self.ed.push((trx, energy_level));
    }
    fn battery_low(&mut self, trx: TrxId) {
        self.battery_low.push(trx);
    }
}

/// An IEEE 802.15.4 data frame with short addresses.
pub fn data_frame(sequence_number: u8, ack_request: bool, payload: &[u8]) -> Vec<u8> {
    let fcf0 = if ack_request { 0x61 } else { 0x41 };
    let mut mpdu = vec![fcf0, 0x88, sequence_number, 0xcd, 0xab, 0x34, 0x12, 0x78, 0x56];
    mpdu.extend_from_slice(payload);
    mpdu
}
/// An immediate ACK without FCS.
pub fn ack_frame(sequence_number: u8, frame_pending: bool) -> Vec<u8> {
    vec![if frame_pending { 0x12 } else { 0x02 }, 0x00, sequence_number]
}

pub type MockTal<'res, const BUFFER_COUNT: usize> = Tal<'res, MockBus, MockPlatform, BUFFER_COUNT>;

/// Create a TAL on top of a fresh mock and initialize it.
pub fn init_tal<'res, const BUFFER_COUNT: usize>(
    pool: &'res SharedPool<BUFFER_COUNT>,
    signals: &'res TalSignals,
) -> (MockTal<'res, BUFFER_COUNT>, SharedChip) {
    let (bus, platform, chip) = mock();
    let mut tal = Tal::new(bus, platform, pool, signals, TalConfig::default());
    tal.init().expect("initialization failed");
    (tal, chip)
}
/// Capture the interrupts raised on the mock and run one task pass.
pub fn step<'res, const BUFFER_COUNT: usize>(
    tal: &mut MockTal<'res, BUFFER_COUNT>,
    recorder: &mut Recorder<'res, BUFFER_COUNT>,
) {
    tal.service_irq();
    tal.task(recorder);
}
/// Let the most recently started timer of the given kind expire.
pub fn fire(chip: &SharedChip, signals: &TalSignals, timer: TimerId) -> TimerToken {
    let (token, _) = chip
        .borrow()
        .last_timer(timer)
        .expect("timer was never started");
    signals.timer_fired(token);
    token
}
pub fn frame<'res, const BUFFER_COUNT: usize>(
    pool: &'res SharedPool<BUFFER_COUNT>,
    mpdu: &[u8],
) -> Frame<'res, BUFFER_COUNT> {
    let mut frame = Frame::alloc(pool).expect("pool exhausted");
    frame.set_mpdu(mpdu).expect("MPDU too long");
    frame
}
/// Append a four byte FCS, as received over the air.
pub fn with_fcs(mpdu: &[u8]) -> Vec<u8> {
    let mut psdu = mpdu.to_vec();
    psdu.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    psdu
}
pub fn available<const BUFFER_COUNT: usize>(pool: &SharedPool<BUFFER_COUNT>) -> usize {
    pool.lock(|pool| pool.borrow().available())
}
