//! Timer invariants under arbitrary command and tick sequences.

use magicblock_core::timer::{TimerEngine, TimerState};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Tick(u64),
    Start,
    Pause,
    Toggle,
    Reset,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u64..120_000).prop_map(Op::Tick),
        1 => Just(Op::Start),
        1 => Just(Op::Pause),
        1 => Just(Op::Toggle),
        1 => Just(Op::Reset),
    ]
}

#[test]
fn coalesced_wake_charges_full_delta() {
    let mut engine = TimerEngine::new(60_000, 0);
    engine.start(0);
    assert!(engine.tick(45_000).is_none());
    assert_eq!(engine.time_left(), 15_000);
}

proptest! {
    #[test]
    fn time_left_stays_within_session(
        session_ms in 1u64..10_000_000,
        ops in prop::collection::vec(op(), 0..80),
    ) {
        let mut engine = TimerEngine::new(session_ms, 0);
        let mut now = 0u64;
        let mut expiries = 0u64;

        for op in ops {
            match op {
                Op::Tick(delta) => {
                    now += delta;
                    if engine.tick(now).is_some() {
                        expiries += 1;
                        prop_assert_eq!(engine.state(), TimerState::Idle);
                        prop_assert_eq!(engine.time_left(), session_ms);
                    }
                }
                Op::Start => {
                    engine.start(now);
                }
                Op::Pause => {
                    if let Some(magicblock_core::Event::SessionExpired { .. }) = engine.pause(now) {
                        expiries += 1;
                    }
                }
                Op::Toggle => {
                    if let Some(magicblock_core::Event::SessionExpired { .. }) = engine.toggle(now) {
                        expiries += 1;
                    }
                }
                Op::Reset => {
                    engine.reset(now);
                    prop_assert_eq!(engine.time_left(), session_ms);
                }
            }
            prop_assert!(engine.time_left() <= engine.session_duration());
            prop_assert_ne!(engine.state(), TimerState::Expired);
            prop_assert_eq!(engine.completed_sessions(), expiries);
        }
    }
}
