//! Sensor edge tracking shared between interrupt and loop context.
//!
//! [`EventTracker`] is written from the edge handlers and read by the service
//! loop. Each sensor's composite state is swapped as a whole inside a
//! critical section, so the loop never pairs a fresh timestamp with a stale
//! door level.

use core::cell::Cell;
use core::time::Duration;

use critical_section::Mutex;

/// Sensors wired to the board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sensor {
    Door,
    Motion,
}

impl Sensor {
    /// Short label used in logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Sensor::Door => "door",
            Sensor::Motion => "motion",
        }
    }
}

/// Logic level sampled on an input pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinLevel {
    Low,
    High,
}

impl PinLevel {
    #[must_use]
    pub const fn from_high(high: bool) -> Self {
        if high { PinLevel::High } else { PinLevel::Low }
    }

    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, PinLevel::High)
    }
}

/// Time of the most recent edge on a sensor, measured from boot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SensorEvent {
    pub last_timestamp: Duration,
}

impl SensorEvent {
    #[must_use]
    pub const fn at(last_timestamp: Duration) -> Self {
        Self { last_timestamp }
    }

    /// Time since the edge, zero if `now` predates it.
    #[must_use]
    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.last_timestamp)
    }

    // Timestamps never move backwards, even if an edge is stamped late.
    fn advanced_to(self, now: Duration) -> Self {
        Self::at(self.last_timestamp.max(now))
    }
}

/// Door contact state at its last transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DoorState {
    pub is_open: bool,
    pub change: SensorEvent,
}

/// Both sensors, captured together.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TrackerSnapshot {
    pub door: DoorState,
    pub motion: SensorEvent,
}

/// Interrupt-safe store for sensor edges.
pub struct EventTracker {
    state: Mutex<Cell<TrackerSnapshot>>,
}

impl EventTracker {
    /// Creates a tracker stamped with `boot`, seeding the door from its
    /// sampled pin level.
    #[must_use]
    pub const fn new(boot: Duration, door_level: PinLevel) -> Self {
        Self {
            state: Mutex::new(Cell::new(TrackerSnapshot {
                door: DoorState {
                    is_open: door_level.is_high(),
                    change: SensorEvent::at(boot),
                },
                motion: SensorEvent::at(boot),
            })),
        }
    }

    /// Records an edge on `sensor`. Safe to call from interrupt context; it
    /// never blocks or allocates.
    pub fn on_pin_change(&self, sensor: Sensor, level: PinLevel, now: Duration) {
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();
            match sensor {
                Sensor::Door => {
                    state.door = DoorState {
                        is_open: level.is_high(),
                        change: state.door.change.advanced_to(now),
                    };
                }
                Sensor::Motion => state.motion = state.motion.advanced_to(now),
            }
            cell.set(state);
        });
    }

    /// Last edge time for a single sensor.
    #[must_use]
    pub fn read(&self, sensor: Sensor) -> SensorEvent {
        let snapshot = self.snapshot();
        match sensor {
            Sensor::Door => snapshot.door.change,
            Sensor::Motion => snapshot.motion,
        }
    }

    /// Door level and change time, read as one unit.
    #[must_use]
    pub fn door(&self) -> DoorState {
        self.snapshot().door
    }

    /// Both sensors under a single critical section.
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        critical_section::with(|cs| self.state.borrow(cs).get())
    }
}
