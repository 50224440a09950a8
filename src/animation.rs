//! Per-phase strip animations
//!
//! Every phase maps to exactly one animation. Each animation owns its own
//! counters, and the [`Animator`] restarts them whenever the active phase
//! changes, so re-entering a phase always begins with its first frame.

use crate::color::hsv2rgb;
use crate::state_machine::DevicePhase;
use core::f32::consts::PI;
use smart_leds::RGB8;

const OFF: RGB8 = RGB8 { r: 0, g: 0, b: 0 };

/// What the render step must do with the frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Write every pixel of the frame and refresh
    Frame,
    /// Blank the strip
    Clear,
}

/// Breathing white used while booting
#[derive(Debug, Default)]
pub struct WhitePulse {
    phase: u32,
}

impl WhitePulse {
    const MIN_BRIGHTNESS: f32 = 50.0;
    const MAX_BRIGHTNESS: f32 = 200.0;
    const SLOWNESS: f32 = 200.0;

    /// Brightness of the current tick. The lower half of the sine saturates at 0.
    pub fn brightness(&self) -> u8 {
        let level = Self::MIN_BRIGHTNESS
            + (Self::MAX_BRIGHTNESS - Self::MIN_BRIGHTNESS)
                * libm::sinf(self.phase as f32 / Self::SLOWNESS);
        level as u8
    }

    pub fn render(&mut self, frame: &mut [RGB8]) {
        let level = self.brightness();
        frame.fill(RGB8::new(level, level, level));
        self.phase = self.phase.wrapping_add(1);
    }

    pub fn reset(&mut self) {
        self.phase = 0;
    }
}

/// Rotating rainbow used while joining the network
#[derive(Debug, Default)]
pub struct Rainbow {
    offset: u16,
}

impl Rainbow {
    const STEP_DEGREES: u16 = 10;

    pub fn render(&mut self, frame: &mut [RGB8], leds_per_round: usize) {
        for (j, pixel) in frame.iter_mut().enumerate() {
            let hue = (j * 360 / leds_per_round + usize::from(self.offset)) % 360;
            *pixel = hsv2rgb(hue as u16, 100, 100);
        }
        self.offset = (self.offset + Self::STEP_DEGREES) % 360;
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

/// A single color on every pixel
#[derive(Debug)]
pub struct SolidColor {
    color: RGB8,
}

impl SolidColor {
    pub fn new(hue: u16, saturation: u8, value: u8) -> Self {
        Self {
            color: hsv2rgb(hue, saturation, value),
        }
    }

    pub fn render(&self, frame: &mut [RGB8]) {
        frame.fill(self.color);
    }
}

/// Red wave running along the strip while on air
#[derive(Debug, Default)]
pub struct RedChaser {
    phase: u32,
}

impl RedChaser {
    pub fn render(&mut self, frame: &mut [RGB8], leds_per_round: usize) {
        let shift = self.phase as f32 / 10.0;
        for (j, pixel) in frame.iter_mut().enumerate() {
            let angle = 2.0 * PI * j as f32 / leds_per_round as f32 + shift;
            let value = 60.0 + 30.0 * libm::sinf(angle);
            *pixel = hsv2rgb(0, 100, value as u8);
        }
        self.phase = self.phase.wrapping_add(1);
    }

    pub fn reset(&mut self) {
        self.phase = 0;
    }
}

/// Whole strip blinking red, the failure indicator
#[derive(Debug)]
pub struct RedBlink {
    period_ticks: u32,
    counter: u32,
    on: bool,
}

impl RedBlink {
    const COLOR: RGB8 = RGB8 { r: 255, g: 0, b: 0 };

    /// `period_ticks` is the number of ticks each on/off half lasts
    pub fn new(period_ticks: u32) -> Self {
        Self {
            period_ticks: period_ticks.max(1),
            counter: 0,
            on: true,
        }
    }

    pub fn render(&mut self, frame: &mut [RGB8]) {
        frame.fill(if self.on { Self::COLOR } else { OFF });

        self.counter += 1;
        if self.counter >= self.period_ticks {
            self.counter = 0;
            self.on = !self.on;
        }
    }

    pub fn reset(&mut self) {
        self.counter = 0;
        self.on = true;
    }
}

/// Phase-to-animation dispatcher owning every animation's state
#[derive(Debug)]
pub struct Animator {
    leds_per_round: usize,
    active: Option<DevicePhase>,
    pulse: WhitePulse,
    rainbow: Rainbow,
    off_air: SolidColor,
    chaser: RedChaser,
    blink: RedBlink,
}

impl Animator {
    /// Create an animator for a strip with `leds_per_round` LEDs per logical
    /// round, ticked every `tick_ms` milliseconds.
    pub fn new(leds_per_round: usize, tick_ms: u32) -> Self {
        let blink_ticks = crate::config::BLINK_INTERVAL_MS / tick_ms.max(1);

        Self {
            leds_per_round: leds_per_round.max(1),
            active: None,
            pulse: WhitePulse::default(),
            rainbow: Rainbow::default(),
            off_air: SolidColor::new(60, 100, 80),
            chaser: RedChaser::default(),
            blink: RedBlink::new(blink_ticks),
        }
    }

    /// Render one frame for `phase` into `frame`
    pub fn render(&mut self, phase: DevicePhase, frame: &mut [RGB8]) -> RenderOutcome {
        if self.active != Some(phase) {
            self.reset();
            self.active = Some(phase);
        }

        match phase {
            DevicePhase::Starting => self.pulse.render(frame),
            DevicePhase::Joining => self.rainbow.render(frame, self.leds_per_round),
            DevicePhase::Disconnected | DevicePhase::Idle => {
                frame.fill(OFF);
                return RenderOutcome::Clear;
            }
            DevicePhase::OffAir => self.off_air.render(frame),
            DevicePhase::OnAir => self.chaser.render(frame, self.leds_per_round),
            DevicePhase::Error => self.blink.render(frame),
        }

        RenderOutcome::Frame
    }

    /// Restart every animation from its first frame
    pub fn reset(&mut self) {
        self.pulse.reset();
        self.rainbow.reset();
        self.chaser.reset();
        self.blink.reset();
    }
}
