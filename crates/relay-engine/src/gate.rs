//! Frame admission.

use std::time::Duration;

use tokio::time::Instant;

/// Per-track pacing state.
#[derive(Debug, Clone)]
pub struct StreamState {
    frame_count: u64,
    last_accepted: Option<Instant>,
    target_fps: u32,
}

impl StreamState {
    pub fn new(target_fps: u32) -> Self {
        Self {
            frame_count: 0,
            last_accepted: None,
            target_fps: target_fps.max(1),
        }
    }

    /// Frames admitted so far; also the id of the last admitted frame.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }
}

/// Decides which frames of a stream are processed.
///
/// A frame is admitted when at least one interval (`1 / target_fps`) has
/// passed since the last admitted frame; the first frame is always admitted.
/// Rejected frames are simply dropped, the gate never delays or buffers.
#[derive(Debug, Clone, Copy)]
pub struct FrameGate {
    interval: Duration,
}

impl FrameGate {
    pub fn new(target_fps: u32) -> Self {
        Self {
            interval: Duration::from_nanos(1_000_000_000 / target_fps.max(1) as u64),
        }
    }

    pub fn for_state(state: &StreamState) -> Self {
        Self::new(state.target_fps)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide whether the frame received at `now` is processed, updating
    /// `state` on admission.
    pub fn admit(&self, now: Instant, state: &mut StreamState) -> bool {
        let admitted = match state.last_accepted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };

        if admitted {
            state.last_accepted = Some(now);
            state.frame_count += 1;
        }
        admitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Arrival times of `count` frames at `fps`, starting at `start`.
    fn arrivals(start: Instant, fps: u64, count: u64) -> Vec<Instant> {
        (0..count)
            .map(|k| start + Duration::from_nanos(k * 1_000_000_000 / fps))
            .collect()
    }

    #[test]
    fn test_first_frame_always_admitted() {
        let gate = FrameGate::new(1);
        let mut state = StreamState::new(1);
        assert!(gate.admit(Instant::now(), &mut state));
        assert_eq!(state.frame_count(), 1);
    }

    #[test]
    fn test_half_rate_admits_every_other_frame() {
        let gate = FrameGate::new(15);
        let mut state = StreamState::new(15);

        let admitted: Vec<usize> = arrivals(Instant::now(), 30, 60)
            .into_iter()
            .enumerate()
            .filter(|(_, t)| gate.admit(*t, &mut state))
            .map(|(i, _)| i)
            .collect();

        assert!((29..=31).contains(&admitted.len()), "admitted {}", admitted.len());
        assert_eq!(&admitted[..4], &[0, 2, 4, 6]);
        assert_eq!(state.frame_count(), admitted.len() as u64);
    }

    #[test]
    fn test_rejected_frames_leave_state_untouched() {
        let gate = FrameGate::new(10);
        let mut state = StreamState::new(10);
        let start = Instant::now();

        assert!(gate.admit(start, &mut state));
        assert!(!gate.admit(start + Duration::from_millis(99), &mut state));
        assert_eq!(state.last_accepted(), Some(start));
        assert_eq!(state.frame_count(), 1);

        // No catch-up: the next admission resets the reference point.
        assert!(gate.admit(start + Duration::from_millis(250), &mut state));
        assert!(!gate.admit(start + Duration::from_millis(300), &mut state));
        assert!(gate.admit(start + Duration::from_millis(350), &mut state));
    }

    #[test]
    fn test_out_of_order_timestamps_rejected() {
        let gate = FrameGate::new(10);
        let mut state = StreamState::new(10);
        let start = Instant::now() + Duration::from_secs(1);

        assert!(gate.admit(start, &mut state));
        assert!(!gate.admit(start - Duration::from_millis(500), &mut state));
    }

    #[test]
    fn test_window_bound_with_jitter() {
        let fps = 12u32;
        let gate = FrameGate::new(fps);
        let mut state = StreamState::new(fps);
        let start = Instant::now();

        // Jittery arrivals at roughly 50/s from a fixed LCG.
        let mut seed = 0x2545_f491u64;
        let mut t = Duration::ZERO;
        let mut admitted = Vec::new();
        for _ in 0..2_000 {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            t += Duration::from_micros(5_000 + (seed >> 33) % 30_000);
            if gate.admit(start + t, &mut state) {
                admitted.push(t);
            }
        }

        let window = Duration::from_millis(1_500);
        let bound = (window.as_secs_f64() * fps as f64).ceil() as usize + 1;
        for (i, &from) in admitted.iter().enumerate() {
            let in_window = admitted[i..].iter().take_while(|&&x| x - from < window).count();
            assert!(in_window <= bound, "{in_window} frames in window starting at {from:?}");
        }
    }
}
