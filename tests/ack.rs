mod common;

use at86rf215_tal::{
    regs::*, BufferPool, CsmaMode, FrameType, RxMode, TalSignals, TalState, TimerId, TrxId,
    TxState, TxStatus,
};
use common::*;
use embassy_time::Duration;

const TRX: TrxId = TrxId::Rf09;
const SEQUENCE_NUMBER: u8 = 0x17;

fn frame_on_air(chip: &SharedChip) {
    chip.borrow_mut()
        .raise(TRX, RfIrq::new(), BbIrq::new().with_tx_frame_end(true));
}
fn ack_received(chip: &SharedChip, sequence_number: u8, frame_pending: bool) {
    let mut chip = chip.borrow_mut();
    chip.receive(TRX, &with_fcs(&ack_frame(sequence_number, frame_pending)), -45);
    chip.raise(TRX, RfIrq::new(), BbIrq::new().with_rx_frame_end(true));
}

fn transmit_with_ack_request<'res>(
    tal: &mut MockTal<'res, 8>,
    pool: &'res at86rf215_tal::SharedPool<8>,
    perform_retry: bool,
) {
    let mpdu = data_frame(SEQUENCE_NUMBER, true, b"please ack");
    assert!(tal
        .tx_frame(TRX, frame(pool, &mpdu), CsmaMode::NoCsma, perform_retry)
        .is_ok());
}

#[test]
fn acknowledged_transmission() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();

    transmit_with_ack_request(&mut tal, &pool, false);
    assert_eq!(chip.borrow().bits(TRX, SR_BBC0_AMCS_TX2RX), 1);
    frame_on_air(&chip);
    step(&mut tal, &mut recorder);
    assert_eq!(tal.tx_state(TRX), TxState::WaitingForAck);
    assert_eq!(tal.trx_state(TRX), RfCmdState::Rx);
    {
        let chip = chip.borrow();
        assert_eq!(chip.reg(TRX, RG_BBC0_AFFTM), FrameType::ACK_FILTER);
        let (_, duration) = chip.last_timer(TimerId::Tal).unwrap();
        let ack_wait_us = tal.pib(TRX).ack_wait_duration_us;
        assert!(ack_wait_us > 0);
        assert_eq!(duration, Duration::from_micros(ack_wait_us as u64));
    }

    ack_received(&chip, SEQUENCE_NUMBER, false);
    step(&mut tal, &mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::Success]);
    assert_eq!(tal.tal_state(TRX), TalState::Idle);
    assert_eq!(chip.borrow().reg(TRX, RG_BBC0_AFFTM), FrameType::DEFAULT_FILTER);
    assert!(chip.borrow().stopped_timers.contains(&(TimerId::Tal, TRX)));
    // The ACK isn't handed out as a frame.
    tal.task(&mut recorder);
    assert!(recorder.rx.is_empty());
}

#[test]
fn ack_with_frame_pending() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();

    transmit_with_ack_request(&mut tal, &pool, false);
    frame_on_air(&chip);
    step(&mut tal, &mut recorder);
    ack_received(&chip, SEQUENCE_NUMBER, true);
    step(&mut tal, &mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::FramePending]);
}

#[test]
fn ack_for_another_frame_is_ignored() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();

    transmit_with_ack_request(&mut tal, &pool, false);
    frame_on_air(&chip);
    step(&mut tal, &mut recorder);
    ack_received(&chip, SEQUENCE_NUMBER.wrapping_add(1), false);
    step(&mut tal, &mut recorder);
    assert!(recorder.tx_done.is_empty());
    assert_eq!(tal.tx_state(TRX), TxState::WaitingForAck);

    fire(&chip, &signals, TimerId::Tal);
    tal.task(&mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::NoAck]);
}

#[test]
fn missing_ack_without_retries() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();
    tal.rx_enable(TRX, RxMode::On).unwrap();

    transmit_with_ack_request(&mut tal, &pool, false);
    frame_on_air(&chip);
    step(&mut tal, &mut recorder);
    fire(&chip, &signals, TimerId::Tal);
    tal.task(&mut recorder);

    assert_eq!(recorder.statuses(), [TxStatus::NoAck]);
    assert_eq!(chip.borrow().count_commands(TRX, RfCmdState::Tx), 1);
    assert_eq!(chip.borrow().reg(TRX, RG_BBC0_AFFTM), FrameType::DEFAULT_FILTER);
    // The receiver is the default, so it is switched back on.
    assert_eq!(chip.borrow().state(TRX), RfCmdState::Rx);
}

#[test]
fn missing_ack_is_retried() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();

    transmit_with_ack_request(&mut tal, &pool, true);
    // MaxFrameRetries defaults to three.
    for attempt in 1..=4 {
        assert_eq!(chip.borrow().count_commands(TRX, RfCmdState::Tx), attempt);
        frame_on_air(&chip);
        step(&mut tal, &mut recorder);
        fire(&chip, &signals, TimerId::Tal);
        tal.task(&mut recorder);
    }
    assert_eq!(recorder.statuses(), [TxStatus::NoAck]);
    assert_eq!(chip.borrow().count_commands(TRX, RfCmdState::Tx), 4);
    assert_eq!(recorder.tx_done[0].2.sequence_number(), Some(SEQUENCE_NUMBER));
}

#[test]
fn retry_succeeds() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();

    transmit_with_ack_request(&mut tal, &pool, true);
    frame_on_air(&chip);
    step(&mut tal, &mut recorder);
    fire(&chip, &signals, TimerId::Tal);
    tal.task(&mut recorder);
    assert!(recorder.tx_done.is_empty());

    frame_on_air(&chip);
    step(&mut tal, &mut recorder);
    ack_received(&chip, SEQUENCE_NUMBER, false);
    step(&mut tal, &mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::Success]);
    assert_eq!(chip.borrow().count_commands(TRX, RfCmdState::Tx), 2);
}

#[test]
fn ack_wait_timer_failure_aborts_transmission() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();

    transmit_with_ack_request(&mut tal, &pool, true);
    chip.borrow_mut().fail_timers = true;
    frame_on_air(&chip);
    step(&mut tal, &mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::Failure]);
    assert_eq!(chip.borrow().state(TRX), RfCmdState::TrxOff);
}
