use glow::HasContext;

use super::{Scene, SceneBase, ValidationResult};
use crate::canvas::Canvas;

/// Largest per-channel difference accepted when validating, enough for
/// 16-bit surfaces.
const TOLERANCE: i32 = 8;

/// Clears the surface with a colour that cycles every 360 frames.
pub struct SceneClear {
    base: SceneBase,
}

impl SceneClear {
    pub fn new() -> Self {
        Self {
            base: SceneBase::new("clear"),
        }
    }

    pub fn color_for_frame(frame: u32) -> [f32; 3] {
        let phase = (frame % 360) as f32;
        let channel = |offset: f32| 0.5 + 0.5 * (phase - offset).to_radians().cos();
        [channel(0.0), channel(120.0), channel(240.0)]
    }
}

impl Default for SceneClear {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for SceneClear {
    fn base(&self) -> &SceneBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SceneBase {
        &mut self.base
    }

    fn draw(&mut self, canvas: &mut dyn Canvas) {
        let Some(gl) = canvas.gl() else { return };
        let [r, g, b] = Self::color_for_frame(self.base.frames());
        unsafe {
            gl.clear_color(r, g, b, 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
    }

    fn validate(&mut self, canvas: &mut dyn Canvas) -> ValidationResult {
        if canvas.gl().is_none() {
            return ValidationResult::Unknown;
        }

        let expected = Self::color_for_frame(self.base.frames()).map(|c| (c * 255.0).round() as i32);
        let pixel = canvas.read_pixel(canvas.width() / 2, canvas.height() / 2);
        let actual = [pixel.r as i32, pixel.g as i32, pixel.b as i32];

        let ok = expected.iter().zip(actual.iter()).all(|(e, a)| (e - a).abs() <= TOLERANCE);
        if !ok {
            log::debug!("[clear] Expected {:?} at the centre, got {:?}", expected, actual);
            return ValidationResult::Failure;
        }
        ValidationResult::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_first_frame_color() {
        let [r, g, b] = SceneClear::color_for_frame(0);
        assert!(approx(r, 1.0));
        assert!(approx(g, 0.25));
        assert!(approx(b, 0.25));
    }

    #[test]
    fn test_color_cycle_wraps() {
        assert_eq!(SceneClear::color_for_frame(5), SceneClear::color_for_frame(365));
    }

    #[test]
    fn test_default_options() {
        let scene = SceneClear::new();
        assert_eq!(scene.name(), "clear");
        assert!(scene.options().contains_key("duration"));
        assert!(!scene.running());
    }
}
