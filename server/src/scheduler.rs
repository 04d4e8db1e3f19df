//! Per-room phase timer.
//!
//! Each room owns exactly one [`TimerSlot`]. Arming a slot replaces whatever
//! was pending, so a room can never have two live countdowns, and dropping
//! the room drops its timer with it. The event loop polls slots with the
//! current instant instead of spawning sleeping tasks.

use std::time::{Duration, Instant};

pub const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// One second of the active countdown (choosing, drawing or buffer) elapsed
    Countdown,
    /// The pause between rounds elapsed
    NextRound,
    /// The room should be disposed
    Dispose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimer {
    pub kind: TimerKind,
    pub due: Instant,
}

#[derive(Debug, Default)]
pub struct TimerSlot {
    active: Option<PhaseTimer>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the slot, cancelling any pending timer.
    pub fn arm(&mut self, kind: TimerKind, due: Instant) {
        self.active = Some(PhaseTimer { kind, due });
    }

    pub fn cancel(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&PhaseTimer> {
        self.active.as_ref()
    }

    pub fn kind(&self) -> Option<TimerKind> {
        self.active.map(|t| t.kind)
    }

    /// Disarms and returns the pending timer if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<PhaseTimer> {
        match self.active {
            Some(timer) if timer.due <= now => self.active.take(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_slot_is_idle() {
        let mut slot = TimerSlot::new();
        assert!(slot.active().is_none());
        assert!(slot.take_due(Instant::now()).is_none());
    }

    #[test]
    fn test_timer_fires_once_at_deadline() {
        let start = Instant::now();
        let mut slot = TimerSlot::new();
        slot.arm(TimerKind::Countdown, start + TICK);

        assert!(slot.take_due(start).is_none());
        let fired = slot.take_due(start + TICK).unwrap();
        assert_eq!(fired.kind, TimerKind::Countdown);
        assert!(slot.take_due(start + TICK * 2).is_none());
    }

    #[test]
    fn test_arm_replaces_pending_timer() {
        let start = Instant::now();
        let mut slot = TimerSlot::new();
        slot.arm(TimerKind::Countdown, start + TICK);
        slot.arm(TimerKind::Dispose, start + TICK * 30);

        // the replaced countdown never fires
        assert!(slot.take_due(start + TICK).is_none());
        assert_eq!(slot.kind(), Some(TimerKind::Dispose));
        assert_eq!(
            slot.take_due(start + TICK * 30).map(|t| t.kind),
            Some(TimerKind::Dispose)
        );
    }

    #[test]
    fn test_cancel_disarms() {
        let start = Instant::now();
        let mut slot = TimerSlot::new();
        slot.arm(TimerKind::NextRound, start);
        slot.cancel();

        assert!(slot.take_due(start + TICK).is_none());
    }
}
