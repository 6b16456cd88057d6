//! Observation accumulation.
//!
//! Per-camera temporal logic: while a vehicle transits the frame, keep only
//! the single best detected+recognized snapshot of it, and decide — from a
//! noisy frame-by-frame detection signal — when the vehicle has left so the
//! snapshot can be reported exactly once.
//!
//! The logic is an explicit two-state machine. `Idle`: no vehicle tracked.
//! `Tracking`: a best-so-far observation is held together with the instant of
//! the most recent detection. A quiet period longer than the debounce timeout
//! finalizes the transit.

use std::time::{Duration, Instant};

use crate::frame::Frame;

/// Best single snapshot of one vehicle transit.
///
/// `confidence` is the plate detector's score for this snapshot; recognition
/// produces per-character scores only, so detection confidence is what gates
/// best-observation selection.
#[derive(Clone, Debug)]
pub struct Observation {
    pub confidence: f32,
    pub text: String,
    pub plate: Frame,
    pub frame: Frame,
}

/// Accumulator state, exposed for introspection and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    Idle,
    Tracking,
}

enum State {
    Idle,
    Tracking {
        best: Observation,
        last_detection: Instant,
    },
}

/// Per-camera accumulator of the best observation of the current transit.
///
/// At most one observation is held at a time, bounding memory per camera no
/// matter how many candidate detections a transit produces.
pub struct ObservationAccumulator {
    state: State,
    timeout: Duration,
}

impl ObservationAccumulator {
    /// `timeout` is the quiet period after the last detection required before
    /// the transit is considered complete.
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: State::Idle,
            timeout,
        }
    }

    pub fn state(&self) -> TrackState {
        match self.state {
            State::Idle => TrackState::Idle,
            State::Tracking { .. } => TrackState::Tracking,
        }
    }

    /// Record one detection from the current tick.
    ///
    /// Always refreshes the last-detection instant. The held observation is
    /// replaced only when the candidate's confidence is strictly higher (or
    /// nothing is held yet), so within one transit the held confidence is
    /// non-decreasing.
    pub fn record(&mut self, candidate: Observation, now: Instant) {
        match &mut self.state {
            State::Idle => {
                log::debug!(
                    "transit started (confidence {:.2}, text {:?})",
                    candidate.confidence,
                    candidate.text
                );
                self.state = State::Tracking {
                    best: candidate,
                    last_detection: now,
                };
            }
            State::Tracking {
                best,
                last_detection,
            } => {
                *last_detection = now;
                if candidate.confidence > best.confidence {
                    log::debug!(
                        "observation improved: {:.2} -> {:.2} (text {:?})",
                        best.confidence,
                        candidate.confidence,
                        candidate.text
                    );
                    *best = candidate;
                }
            }
        }
    }

    /// Evaluate the finalize condition on a tick with no detections.
    ///
    /// Finalizes when tracking and the quiet period since the last detection
    /// exceeds the timeout. The accumulator resets to `Idle` in every
    /// finalize case; the observation is returned for emission only when its
    /// decoded text is non-empty, otherwise it is discarded silently.
    pub fn tick(&mut self, now: Instant) -> Option<Observation> {
        let expired = match &self.state {
            State::Idle => return None,
            State::Tracking { last_detection, .. } => {
                now.duration_since(*last_detection) > self.timeout
            }
        };
        if !expired {
            return None;
        }
        self.take_finalized()
    }

    /// Stream end: one final finalize evaluation, then reset regardless.
    ///
    /// An observation whose quiet period already elapsed is returned exactly
    /// as `tick` would have returned it; one that was still inside the
    /// debounce window is discarded with the rest of the state, since the
    /// stream cannot confirm the transit completed.
    pub fn flush(&mut self, now: Instant) -> Option<Observation> {
        let finalized = self.tick(now);
        if matches!(self.state, State::Tracking { .. }) {
            log::debug!("stream ended mid-transit; discarding unconfirmed observation");
            self.state = State::Idle;
        }
        finalized
    }

    fn take_finalized(&mut self) -> Option<Observation> {
        let state = std::mem::replace(&mut self.state, State::Idle);
        let State::Tracking { best, .. } = state else {
            return None;
        };
        if best.text.is_empty() {
            log::debug!("transit finalized without decoded text; discarding");
            return None;
        }
        Some(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4).unwrap()
    }

    fn obs(confidence: f32, text: &str) -> Observation {
        Observation {
            confidence,
            text: text.to_string(),
            plate: frame(),
            frame: frame(),
        }
    }

    fn accumulator() -> ObservationAccumulator {
        ObservationAccumulator::new(Duration::from_millis(100))
    }

    #[test]
    fn starts_idle_and_stays_idle_without_detections() {
        let mut acc = accumulator();
        assert_eq!(acc.state(), TrackState::Idle);

        let mut now = Instant::now();
        for _ in 0..10 {
            assert!(acc.tick(now).is_none());
            now += Duration::from_millis(30);
        }
        assert_eq!(acc.state(), TrackState::Idle);
    }

    #[test]
    fn held_confidence_is_monotonic() {
        let mut acc = accumulator();
        let now = Instant::now();

        acc.record(obs(0.80, "AB123"), now);
        acc.record(obs(0.75, "XX999"), now + Duration::from_millis(30));
        acc.record(obs(0.91, "AB128"), now + Duration::from_millis(60));
        acc.record(obs(0.85, "ZZ000"), now + Duration::from_millis(90));

        let finalized = acc
            .tick(now + Duration::from_millis(300))
            .expect("transit finalizes");
        assert_eq!(finalized.confidence, 0.91);
        assert_eq!(finalized.text, "AB128");
    }

    #[test]
    fn equal_confidence_does_not_replace() {
        let mut acc = accumulator();
        let now = Instant::now();
        acc.record(obs(0.80, "FIRST"), now);
        acc.record(obs(0.80, "SECOND"), now + Duration::from_millis(30));

        let finalized = acc
            .tick(now + Duration::from_millis(300))
            .expect("transit finalizes");
        assert_eq!(finalized.text, "FIRST");
    }

    #[test]
    fn does_not_finalize_before_timeout() {
        let mut acc = accumulator();
        let now = Instant::now();
        acc.record(obs(0.80, "AB123"), now);

        assert!(acc.tick(now + Duration::from_millis(50)).is_none());
        assert_eq!(acc.state(), TrackState::Tracking);
    }

    #[test]
    fn single_emission_then_reset_to_idle() {
        let mut acc = accumulator();
        let mut now = Instant::now();

        // N detecting ticks.
        for i in 0..5 {
            acc.record(obs(0.70 + i as f32 * 0.02, "AB123"), now);
            now += Duration::from_millis(30);
        }
        // M quiet ticks past the timeout: exactly one emission.
        now += Duration::from_millis(200);
        let first = acc.tick(now);
        assert!(first.is_some());
        assert_eq!(acc.state(), TrackState::Idle);

        for _ in 0..5 {
            now += Duration::from_millis(30);
            assert!(acc.tick(now).is_none());
        }
    }

    #[test]
    fn detection_refreshes_quiet_period() {
        let mut acc = accumulator();
        let now = Instant::now();
        acc.record(obs(0.80, "AB123"), now);
        // A later detection moves last_detection forward, so the original
        // instant no longer counts toward the quiet period.
        acc.record(obs(0.70, "AB123"), now + Duration::from_millis(90));

        assert!(acc.tick(now + Duration::from_millis(150)).is_none());
        assert!(acc.tick(now + Duration::from_millis(200)).is_some());
    }

    #[test]
    fn empty_text_is_discarded_silently_but_resets() {
        let mut acc = accumulator();
        let now = Instant::now();
        acc.record(obs(0.90, ""), now);

        assert!(acc.tick(now + Duration::from_millis(300)).is_none());
        assert_eq!(acc.state(), TrackState::Idle);
    }

    #[test]
    fn flush_emits_when_timeout_already_elapsed() {
        let mut acc = accumulator();
        let now = Instant::now();
        acc.record(obs(0.88, "AB123"), now);

        let flushed = acc.flush(now + Duration::from_millis(300));
        assert_eq!(flushed.expect("flush emits").text, "AB123");
        assert_eq!(acc.state(), TrackState::Idle);
    }

    #[test]
    fn flush_inside_debounce_window_discards() {
        let mut acc = accumulator();
        let now = Instant::now();
        acc.record(obs(0.88, "AB123"), now);

        assert!(acc.flush(now + Duration::from_millis(20)).is_none());
        assert_eq!(acc.state(), TrackState::Idle);
    }
}
