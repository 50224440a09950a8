//! Render loop step
//!
//! One call to [`Renderer::tick`] is one frame: read the phase, animate, push
//! the frame through the driver. The firmware calls it from a fixed-period
//! ticker; tests call it directly.

use crate::animation::{Animator, RenderOutcome};
use crate::config;
use crate::led_control::{DriverError, LedDriver};
use crate::state_machine::{DevicePhase, StatusRegister};
use log::error;
use smart_leds::RGB8;

/// Drives `N` LEDs from the shared device phase
pub struct Renderer<'a, D, const N: usize>
where
    D: LedDriver,
{
    driver: D,
    status: &'a StatusRegister,
    animator: Animator,
    frame: [RGB8; N],
    driver_failed: bool,
}

impl<'a, D, const N: usize> Renderer<'a, D, N>
where
    D: LedDriver,
{
    /// Create a renderer using the configured round size and tick period
    pub fn new(driver: D, status: &'a StatusRegister) -> Self {
        Self::with_animator(
            driver,
            status,
            Animator::new(config::LEDS_PER_ROUND, config::RENDER_TICK_MS),
        )
    }

    pub fn with_animator(driver: D, status: &'a StatusRegister, animator: Animator) -> Self {
        Self {
            driver,
            status,
            animator,
            frame: [RGB8::default(); N],
            driver_failed: false,
        }
    }

    /// Render and flush one frame, returning the phase it was rendered for.
    ///
    /// A driver failure forces the `Error` phase; the next ticks keep trying,
    /// so the blink shows as soon as the strip accepts data again.
    pub fn tick(&mut self) -> DevicePhase {
        let phase = self.status.read();
        let outcome = self.animator.render(phase, &mut self.frame);

        match self.flush(outcome) {
            Ok(()) => self.driver_failed = false,
            Err(e) => {
                // Log once per failure streak, the loop runs at 50fps
                if !self.driver_failed {
                    error!("[RENDER] LED driver failure: {:?}", e);
                    self.driver_failed = true;
                }
                self.status.fail();
            }
        }

        phase
    }

    fn flush(&mut self, outcome: RenderOutcome) -> Result<(), DriverError> {
        match outcome {
            RenderOutcome::Frame => {
                for (index, pixel) in self.frame.iter().enumerate() {
                    self.driver.set_pixel(index, pixel.r, pixel.g, pixel.b)?;
                }
                self.driver.refresh(config::REFRESH_TIMEOUT_MS)
            }
            RenderOutcome::Clear => self.driver.clear(config::REFRESH_TIMEOUT_MS),
        }
    }

    /// The most recently rendered frame
    pub fn frame(&self) -> &[RGB8; N] {
        &self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::led_control::mock::MockStrip;
    use DevicePhase::*;

    const LEN: usize = 12;
    const RED: RGB8 = RGB8 { r: 255, g: 0, b: 0 };
    const OFF: RGB8 = RGB8 { r: 0, g: 0, b: 0 };

    fn renderer(status: &StatusRegister) -> Renderer<'_, MockStrip, LEN> {
        Renderer::with_animator(MockStrip::new(LEN), status, Animator::new(LEN, 20))
    }

    #[test]
    fn renders_the_current_phase_every_tick() {
        let status = StatusRegister::new();
        let mut renderer = renderer(&status);

        assert_eq!(renderer.tick(), Starting);
        status.transition(Joining).unwrap();
        assert_eq!(renderer.tick(), Joining);
        status.transition(Idle).unwrap();
        assert_eq!(renderer.tick(), Idle);
        status.transition(OffAir).unwrap();
        assert_eq!(renderer.tick(), OffAir);

        let frames = &renderer.driver.frames;
        assert_eq!(frames.len(), 4);
        assert!(frames[0].iter().all(|p| p.r == 50 && p.g == 50 && p.b == 50));
        assert_eq!(frames[1][0], RGB8::new(255, 0, 0));
        assert!(frames[2].iter().all(|p| *p == OFF));
        assert!(frames[3].iter().all(|p| *p == RGB8::new(204, 204, 0)));
        assert_eq!(renderer.frame()[0], RGB8::new(204, 204, 0));
    }

    #[test]
    fn pulse_returns_to_start_after_one_period() {
        let status = StatusRegister::new();
        let mut renderer = renderer(&status);
        for _ in 0..1258 {
            renderer.tick();
        }
        let frames = &renderer.driver.frames;
        let first = i16::from(frames[0][0].r);
        let last = i16::from(frames[1257][0].r);
        assert!((first - last).abs() <= 1, "{} vs {}", first, last);
        assert_eq!(status.read(), Starting);
    }

    #[test]
    fn refresh_failure_forces_error_and_blink() {
        let status = StatusRegister::new();
        status.transition(Joining).unwrap();
        status.transition(Idle).unwrap();
        status.transition(OffAir).unwrap();
        status.transition(OnAir).unwrap();

        let mut renderer = renderer(&status);
        renderer.driver.fail_refresh = true;
        assert_eq!(renderer.tick(), OnAir);
        assert_eq!(status.read(), Error);

        renderer.driver.fail_refresh = false;
        for _ in 0..100 {
            assert_eq!(renderer.tick(), Error);
        }

        let frames = &renderer.driver.frames;
        assert_eq!(frames.len(), 100);
        for (tick, frame) in frames.iter().enumerate() {
            let expected = if (tick / 25) % 2 == 0 { RED } else { OFF };
            assert!(frame.iter().all(|p| *p == expected), "tick {}", tick);
        }
    }

    #[test]
    fn clear_failure_forces_error() {
        let status = StatusRegister::new();
        status.transition(Joining).unwrap();
        status.transition(Idle).unwrap();

        let mut renderer = renderer(&status);
        renderer.driver.fail_clear = true;
        assert_eq!(renderer.tick(), Idle);
        assert_eq!(status.read(), Error);
        assert!(renderer.driver.frames.is_empty());

        // Error is a full frame, so it reaches the strip through refresh
        assert_eq!(renderer.tick(), Error);
        assert_eq!(renderer.driver.frames.len(), 1);
        assert!(renderer.driver.frames[0].iter().all(|p| *p == RED));
    }

    #[test]
    fn pixel_beyond_the_strip_forces_error() {
        let status = StatusRegister::new();
        // Frame one LED longer than the strip
        let mut renderer: Renderer<'_, MockStrip, { LEN + 1 }> =
            Renderer::with_animator(MockStrip::new(LEN), &status, Animator::new(LEN, 20));

        assert_eq!(renderer.tick(), Starting);
        assert_eq!(status.read(), Error);
        assert!(renderer.driver.frames.is_empty());

        for _ in 0..5 {
            assert_eq!(renderer.tick(), Error);
        }
        assert!(renderer.driver.frames.is_empty());
    }

    #[test]
    fn missing_strip_forces_error_and_keeps_running() {
        let status = StatusRegister::new();
        let mut renderer: Renderer<'_, Option<MockStrip>, LEN> =
            Renderer::with_animator(None, &status, Animator::new(LEN, 20));

        assert_eq!(renderer.tick(), Starting);
        assert_eq!(status.read(), Error);
        for _ in 0..10 {
            assert_eq!(renderer.tick(), Error);
        }
        assert_eq!(renderer.frame()[0], RED);
    }

    #[test]
    fn frame_lags_a_transition_by_at_most_one_tick() {
        let status = StatusRegister::new();
        let mut renderer = renderer(&status);
        renderer.tick();
        status.transition(Joining).unwrap();
        assert_eq!(renderer.tick(), Joining);
    }
}
