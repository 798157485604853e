use core::time::Duration;
use std::thread;

use alarm_core::tracker::{EventTracker, PinLevel, Sensor};

const EDGES: u64 = 20_000;

static TRACKER: EventTracker = EventTracker::new(Duration::ZERO, PinLevel::Low);

// Odd timestamps open the door, even ones close it, so any snapshot that
// pairs a level with another edge's timestamp is detectable.
fn door_edge(tick: u64) -> (PinLevel, Duration) {
    (PinLevel::from_high(tick % 2 == 1), Duration::from_millis(tick))
}

#[test]
fn readers_never_observe_a_torn_door_state() {
    thread::scope(|scope| {
        scope.spawn(|| {
            for tick in 1..=EDGES {
                let (level, at) = door_edge(tick);
                TRACKER.on_pin_change(Sensor::Door, level, at);
            }
        });
        scope.spawn(|| {
            for tick in 1..=EDGES {
                TRACKER.on_pin_change(Sensor::Motion, PinLevel::High, Duration::from_millis(tick));
            }
        });

        let mut last_door = Duration::ZERO;
        let mut last_motion = Duration::ZERO;
        for _ in 0..EDGES {
            let snapshot = TRACKER.snapshot();
            let stamp = snapshot.door.change.last_timestamp;
            let expect_open = stamp.as_millis() % 2 == 1;
            assert_eq!(snapshot.door.is_open, expect_open, "torn read at {stamp:?}");

            assert!(stamp >= last_door, "door time went backwards");
            assert!(snapshot.motion.last_timestamp >= last_motion);
            last_door = stamp;
            last_motion = snapshot.motion.last_timestamp;
        }
    });

    let snapshot = TRACKER.snapshot();
    assert_eq!(snapshot.door.change.last_timestamp, Duration::from_millis(EDGES));
    assert!(!snapshot.door.is_open);
    assert_eq!(snapshot.motion.last_timestamp, Duration::from_millis(EDGES));
}
