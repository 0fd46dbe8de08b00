mod common;

use at86rf215_tal::{
    regs::*, BufferPool, CsmaMode, Frame, PibAttribute, PibValue, RxMode, TalError, TalSignals,
    TalState, TimerId, TrxId, TxState, TxStatus, MAX_PHY_PACKET_SIZE,
};
use common::*;
use embassy_time::Duration;

const TRX: TrxId = TrxId::Rf09;

fn tx_frame_end(chip: &SharedChip, channel_busy: bool) {
    let mut chip = chip.borrow_mut();
    chip.set_bits(TRX, SR_BBC0_AMCS_CCAED, channel_busy as u8);
    chip.raise(TRX, RfIrq::new(), BbIrq::new().with_tx_frame_end(true));
}

#[test]
fn clear_channel_on_first_attempt() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();
    let mpdu = data_frame(1, false, b"payload");

    // A backoff of zero periods goes straight to the CCA.
    assert!(tal
        .tx_frame(TRX, frame(&pool, &mpdu), CsmaMode::Unslotted, false)
        .is_ok());
    assert_eq!(tal.tal_state(TRX), TalState::Tx);
    assert_eq!(tal.tx_state(TRX), TxState::CcaTx);
    {
        let chip = chip.borrow();
        assert!(chip.last_timer(TimerId::Tal).is_none());
        assert_eq!(chip.state(TRX), RfCmdState::Rx);
        assert_eq!(chip.bits(TRX, SR_BBC0_AMCS_CCATX), 1);
        assert_eq!(chip.bits(TRX, SR_BBC0_AMCS_TX2RX), 0);
        assert_eq!(chip.bits(TRX, SR_RF09_EDC_EDM), EdMode::Single.into_bits());
        // The FCS is part of the PHY length.
        assert_eq!(chip.transmitted(TRX).len(), mpdu.len() + 4);
        assert_eq!(chip.transmitted(TRX)[..mpdu.len()], mpdu);
    }

    tx_frame_end(&chip, false);
    step(&mut tal, &mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::Success]);
    let (trx, _, frame) = &recorder.tx_done[0];
    assert_eq!(*trx, TRX);
    assert_eq!(frame.with_mpdu(<[u8]>::to_vec), mpdu);
    assert_eq!(tal.tal_state(TRX), TalState::Idle);
    assert_eq!(tal.tx_state(TRX), TxState::Idle);
    assert_eq!(chip.borrow().bits(TRX, SR_BBC0_AMCS_CCATX), 0);
    assert_eq!(chip.borrow().state(TRX), RfCmdState::TrxOff);
}

#[test]
fn backoff_timer_is_derived_from_the_symbol_duration() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();

    chip.borrow_mut().random.push_back(3);
    assert!(tal
        .tx_frame(TRX, frame(&pool, &data_frame(1, false, &[])), CsmaMode::Unslotted, false)
        .is_ok());
    assert_eq!(tal.tx_state(TRX), TxState::Backoff);
    let (_, duration) = chip.borrow().last_timer(TimerId::Tal).unwrap();
    // Three unit backoff periods of 20 symbols at 20 µs.
    assert_eq!(duration, Duration::from_micros(1200));
    // The receiver is off by default, so the backoff is spent in TXPREP.
    assert_eq!(chip.borrow().state(TRX), RfCmdState::TxPrep);

    fire(&chip, &signals, TimerId::Tal);
    tal.task(&mut recorder);
    assert_eq!(tal.tx_state(TRX), TxState::CcaTx);

    tx_frame_end(&chip, false);
    step(&mut tal, &mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::Success]);
}

#[test]
fn busy_channel_leads_to_channel_access_failure() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();

    assert!(tal
        .tx_frame(TRX, frame(&pool, &data_frame(1, false, &[])), CsmaMode::Unslotted, false)
        .is_ok());
    // MaxCsmaBackoffs is four, so the fifth busy CCA ends the attempt.
    for _ in 0..4 {
        tx_frame_end(&chip, true);
        step(&mut tal, &mut recorder);
        assert!(recorder.tx_done.is_empty());
        assert_eq!(tal.tx_state(TRX), TxState::CcaTx);
    }
    tx_frame_end(&chip, true);
    step(&mut tal, &mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::ChannelAccessFailure]);
    assert_eq!(tal.tal_state(TRX), TalState::Idle);
    assert_eq!(chip.borrow().count_commands(TRX, RfCmdState::Tx), 0);
}

#[test]
fn backoff_exponent_grows_up_to_max_be() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();
    chip.borrow_mut().random.extend([0xffff; 8]);

    assert!(tal
        .tx_frame(TRX, frame(&pool, &data_frame(1, false, &[])), CsmaMode::Unslotted, false)
        .is_ok());
    let mut durations = Vec::new();
    for _ in 0..4 {
        durations.push(chip.borrow().last_timer(TimerId::Tal).unwrap().1);
        fire(&chip, &signals, TimerId::Tal);
        tal.task(&mut recorder);
        tx_frame_end(&chip, true);
        step(&mut tal, &mut recorder);
    }
    let periods: Vec<_> = durations
        .iter()
        .map(|duration| duration.as_micros() / 400)
        .collect();
    // BE starts at MinBe (3) and is capped at MaxBe (5).
    assert_eq!(periods, [7, 15, 31, 31]);
}

#[test]
fn frame_received_during_backoff_defers_the_transmission() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();
    tal.rx_enable(TRX, RxMode::On).unwrap();
    tal.pib_set(TRX, PibAttribute::MaxNumRxFramesDuringBackoff, PibValue::U8(0))
        .unwrap();

    chip.borrow_mut().random.extend([5, 6]);
    assert!(tal
        .tx_frame(TRX, frame(&pool, &data_frame(1, false, &[])), CsmaMode::Unslotted, false)
        .is_ok());
    assert_eq!(tal.tx_state(TRX), TxState::Backoff);
    // The receiver stays on during the backoff.
    assert_eq!(chip.borrow().state(TRX), RfCmdState::Rx);
    let (stale, _) = chip.borrow().last_timer(TimerId::Tal).unwrap();

    {
        let mut chip = chip.borrow_mut();
        chip.receive(TRX, &with_fcs(&data_frame(9, false, b"in")), -70);
        chip.raise(TRX, RfIrq::new(), BbIrq::new().with_rx_frame_end(true));
    }
    step(&mut tal, &mut recorder);
    assert_eq!(tal.queued_frames(TRX), 1);
    assert_eq!(tal.tx_state(TRX), TxState::Backoff);
    let (token, duration) = chip.borrow().last_timer(TimerId::Tal).unwrap();
    assert_ne!(token, stale);
    // NB was incremented and BE grew to four.
    assert_eq!(duration, Duration::from_micros(6 * 400));
    assert_eq!(chip.borrow().state(TRX), RfCmdState::Rx);
    assert_eq!(
        tal.pib_get(TRX, PibAttribute::NumRxFramesDuringBackoff),
        Ok(PibValue::U8(1))
    );

    signals.timer_fired(stale);
    tal.task(&mut recorder);
    assert_eq!(tal.tx_state(TRX), TxState::Backoff);
    assert_eq!(recorder.rx.len(), 1);

    signals.timer_fired(token);
    tal.task(&mut recorder);
    assert_eq!(tal.tx_state(TRX), TxState::CcaTx);
    tx_frame_end(&chip, false);
    step(&mut tal, &mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::Success]);
    // Back to listening afterwards.
    assert_eq!(chip.borrow().state(TRX), RfCmdState::Rx);
}

#[test]
fn cca_is_skipped_while_receiving() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();
    tal.rx_enable(TRX, RxMode::On).unwrap();
    tal.pib_set(TRX, PibAttribute::MaxNumRxFramesDuringBackoff, PibValue::U8(0))
        .unwrap();

    chip.borrow_mut().random.extend([1, 1]);
    assert!(tal
        .tx_frame(TRX, frame(&pool, &data_frame(1, false, &[])), CsmaMode::Unslotted, false)
        .is_ok());
    let (first, _) = chip.borrow().last_timer(TimerId::Tal).unwrap();
    // The AGC is frozen on an incoming frame, which counts as a busy channel.
    chip.borrow_mut().set_bits(TRX, SR_RF09_AGCC_FRZS, 1);
    fire(&chip, &signals, TimerId::Tal);
    tal.task(&mut recorder);
    assert_eq!(tal.tx_state(TRX), TxState::Backoff);
    assert_eq!(chip.borrow().bits(TRX, SR_BBC0_AMCS_CCATX), 0);
    let (second, _) = chip.borrow().last_timer(TimerId::Tal).unwrap();
    assert_ne!(first, second);

    chip.borrow_mut().set_bits(TRX, SR_RF09_AGCC_FRZS, 0);
    fire(&chip, &signals, TimerId::Tal);
    tal.task(&mut recorder);
    assert_eq!(tal.tx_state(TRX), TxState::CcaTx);
    assert_eq!(chip.borrow().bits(TRX, SR_BBC0_AMCS_CCATX), 1);
}

#[test]
fn transmission_without_csma() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();

    assert!(tal
        .tx_frame(TRX, frame(&pool, &data_frame(1, false, &[])), CsmaMode::NoCsma, false)
        .is_ok());
    assert_eq!(tal.tx_state(TRX), TxState::Tx);
    assert_eq!(chip.borrow().last_command(TRX), Some(RfCmdState::Tx));

    chip.borrow_mut()
        .raise(TRX, RfIrq::new(), BbIrq::new().with_tx_frame_end(true));
    step(&mut tal, &mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::Success]);
}

#[test]
fn invalid_transmissions_are_rejected() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, _chip) = init_tal(&pool, &signals);

    let empty = Frame::alloc(&pool).unwrap();
    let rejected = tal
        .tx_frame(TRX, empty, CsmaMode::Unslotted, false)
        .err()
        .unwrap();
    assert_eq!(rejected.error, TalError::InvalidParameter);

    // The FCS pushes the frame over the limit.
    let oversized = frame(&pool, &[0x41; MAX_PHY_PACKET_SIZE - 2]);
    let rejected = tal
        .tx_frame(TRX, oversized, CsmaMode::Unslotted, false)
        .err()
        .unwrap();
    assert_eq!(rejected.error, TalError::InvalidParameter);

    drop(rejected);

    assert!(tal
        .tx_frame(TRX, frame(&pool, &data_frame(1, false, &[])), CsmaMode::NoCsma, false)
        .is_ok());
    let rejected = tal
        .tx_frame(TRX, frame(&pool, &data_frame(2, false, &[])), CsmaMode::NoCsma, false)
        .err()
        .unwrap();
    assert_eq!(rejected.error, TalError::Busy);
    assert_eq!(rejected.frame.sequence_number(), Some(2));
}

#[test]
fn backoff_listens_only_once_the_frame_threshold_is_reached() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();
    tal.rx_enable(TRX, RxMode::On).unwrap();

    // No frame came in yet, so the first backoff is spent in TXPREP.
    chip.borrow_mut().random.push_back(5);
    assert!(tal
        .tx_frame(TRX, frame(&pool, &data_frame(1, false, &[])), CsmaMode::Unslotted, false)
        .is_ok());
    assert_eq!(tal.tx_state(TRX), TxState::Backoff);
    assert_eq!(chip.borrow().state(TRX), RfCmdState::TxPrep);
    fire(&chip, &signals, TimerId::Tal);
    tal.task(&mut recorder);
    tx_frame_end(&chip, false);
    step(&mut tal, &mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::Success]);
    assert_eq!(chip.borrow().state(TRX), RfCmdState::Rx);

    // A threshold of zero keeps listening for the whole backoff.
    tal.pib_set(TRX, PibAttribute::MaxNumRxFramesDuringBackoff, PibValue::U8(0))
        .unwrap();
    chip.borrow_mut().random.push_back(5);
    assert!(tal
        .tx_frame(TRX, frame(&pool, &data_frame(2, false, &[])), CsmaMode::Unslotted, false)
        .is_ok());
    assert_eq!(tal.tx_state(TRX), TxState::Backoff);
    assert_eq!(chip.borrow().state(TRX), RfCmdState::Rx);
}

#[test]
fn zero_min_be_transmits_without_backoff_or_cca() {
    let pool = BufferPool::<8>::shared();
    let signals = TalSignals::new();
    let (mut tal, chip) = init_tal(&pool, &signals);
    let mut recorder = Recorder::default();
    tal.pib_set(TRX, PibAttribute::MinBe, PibValue::U8(0)).unwrap();

    assert!(tal
        .tx_frame(TRX, frame(&pool, &data_frame(3, false, &[])), CsmaMode::Unslotted, true)
        .is_ok());
    assert_eq!(tal.tx_state(TRX), TxState::Tx);
    {
        let chip = chip.borrow();
        assert!(chip.last_timer(TimerId::Tal).is_none());
        assert_eq!(chip.bits(TRX, SR_BBC0_AMCS_CCATX), 0);
        assert_eq!(chip.last_command(TRX), Some(RfCmdState::Tx));
    }

    chip.borrow_mut()
        .raise(TRX, RfIrq::new(), BbIrq::new().with_tx_frame_end(true));
    step(&mut tal, &mut recorder);
    assert_eq!(recorder.statuses(), [TxStatus::Success]);
    assert_eq!(tal.tal_state(TRX), TalState::Idle);
}
