//! Hue/saturation/value to RGB conversion
//!
//! Piecewise-linear mapping on integer percentages, shared by every animation.

use smart_leds::RGB8;

/// Convert a color given as hue in degrees, saturation and value in percent.
///
/// Hue wraps modulo 360, saturation and value are clamped to 100.
pub fn hsv2rgb(hue: u16, saturation: u8, value: u8) -> RGB8 {
    let hue = u32::from(hue % 360);
    let saturation = u32::from(saturation.min(100));
    let value = u32::from(value.min(100));

    let rgb_max = value * 255 / 100;
    let rgb_min = rgb_max * (100 - saturation) / 100;

    let sector = hue / 60;
    let diff = hue % 60;

    // RGB adjustment amount by hue
    let rgb_adj = (rgb_max - rgb_min) * diff / 60;

    let (r, g, b) = match sector {
        0 => (rgb_max, rgb_min + rgb_adj, rgb_min),
        1 => (rgb_max - rgb_adj, rgb_max, rgb_min),
        2 => (rgb_min, rgb_max, rgb_min + rgb_adj),
        3 => (rgb_min, rgb_max - rgb_adj, rgb_max),
        4 => (rgb_min + rgb_adj, rgb_min, rgb_max),
        _ => (rgb_max, rgb_min, rgb_max - rgb_adj),
    };

    // Every channel lies in [rgb_min, rgb_max] <= 255
    RGB8::new(r as u8, g as u8, b as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_and_secondary_hues() {
        assert_eq!(hsv2rgb(0, 100, 100), RGB8::new(255, 0, 0));
        assert_eq!(hsv2rgb(60, 100, 100), RGB8::new(255, 255, 0));
        assert_eq!(hsv2rgb(120, 100, 100), RGB8::new(0, 255, 0));
        assert_eq!(hsv2rgb(180, 100, 100), RGB8::new(0, 255, 255));
        assert_eq!(hsv2rgb(240, 100, 100), RGB8::new(0, 0, 255));
        assert_eq!(hsv2rgb(300, 100, 100), RGB8::new(255, 0, 255));
    }

    #[test]
    fn off_air_yellow() {
        assert_eq!(hsv2rgb(60, 100, 80), RGB8::new(204, 204, 0));
    }

    #[test]
    fn mid_sector_ramps_linearly() {
        // 30 degrees: green halfway up
        assert_eq!(hsv2rgb(30, 100, 100), RGB8::new(255, 127, 0));
        // 330 degrees: blue halfway down
        assert_eq!(hsv2rgb(330, 100, 100), RGB8::new(255, 0, 128));
    }

    #[test]
    fn zero_saturation_is_grey() {
        for hue in (0..360).step_by(7) {
            assert_eq!(hsv2rgb(hue, 0, 50), RGB8::new(127, 127, 127));
        }
    }

    #[test]
    fn zero_value_is_black() {
        assert_eq!(hsv2rgb(200, 100, 0), RGB8::new(0, 0, 0));
    }

    #[test]
    fn hue_is_periodic() {
        for hue in 0..360u16 {
            for (s, v) in [(100, 100), (100, 60), (40, 90), (0, 30)] {
                assert_eq!(hsv2rgb(hue + 360, s, v), hsv2rgb(hue, s, v));
            }
        }
    }

    #[test]
    fn out_of_range_percentages_are_clamped() {
        assert_eq!(hsv2rgb(0, 255, 255), hsv2rgb(0, 100, 100));
    }
}
