use gpumark_common::timestamp_us;
use glow::HasContext;

use super::{Scene, SceneBase, SetupStatus, ValidationResult};
use crate::canvas::Canvas;
use crate::matrix::Mat4;
use crate::shader::{create_program, f32_bytes};

const VERTEX_SHADER: &str = r#"
attribute vec3 a_position;
attribute vec3 a_color;
uniform mat4 u_mvp;
varying vec3 v_color;

void main() {
    v_color = a_color;
    gl_Position = u_mvp * vec4(a_position, 1.0);
}
"#;

const FRAGMENT_SHADER: &str = r#"
varying vec3 v_color;

void main() {
    gl_FragColor = vec4(v_color, 1.0);
}
"#;

#[rustfmt::skip]
const VERTICES: [f32; 18] = [
    // position         // color
     0.0,  1.0, 0.0,    1.0, 0.0, 0.0,
    -1.0, -0.8, 0.0,    0.0, 1.0, 0.0,
     1.0, -0.8, 0.0,    0.0, 0.0, 1.0,
];

struct Resources {
    program: glow::Program,
    vbo: glow::Buffer,
    mvp: Option<glow::UniformLocation>,
}

/// A shaded triangle spinning around the view axis.
pub struct SceneTriangle {
    base: SceneBase,
    resources: Option<Resources>,
}

impl SceneTriangle {
    pub fn new() -> Self {
        let mut base = SceneBase::new("triangle");
        base.add_option("speed", "90", "Rotation speed in degrees per second", &[]);
        Self { base, resources: None }
    }

    fn angle(&self) -> f32 {
        let speed = self.base.option_f64("speed").unwrap_or(90.0);
        (self.base.time() * speed % 360.0) as f32
    }
}

impl Default for SceneTriangle {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for SceneTriangle {
    fn base(&self) -> &SceneBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SceneBase {
        &mut self.base
    }

    fn setup(&mut self, canvas: &mut dyn Canvas) -> SetupStatus {
        let Some(gl) = canvas.gl() else {
            return SetupStatus::Unsupported;
        };

        self.base.start();

        let compile_start = timestamp_us();
        let program = match create_program(&gl, VERTEX_SHADER, FRAGMENT_SHADER, &[(0, "a_position"), (1, "a_color")]) {
            Ok(p) => p,
            Err(e) => {
                log::error!("[triangle] {}", e);
                return SetupStatus::Failure;
            }
        };
        self.base
            .add_shader_compilation_time((timestamp_us() - compile_start) as f64 / 1_000_000.0);

        let vbo = unsafe {
            match gl.create_buffer() {
                Ok(vbo) => vbo,
                Err(e) => {
                    log::error!("[triangle] Failed to create vertex buffer: {}", e);
                    gl.delete_program(program);
                    return SetupStatus::Failure;
                }
            }
        };

        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, f32_bytes(&VERTICES), glow::STATIC_DRAW);
        }

        let mvp = unsafe { gl.get_uniform_location(program, "u_mvp") };
        self.resources = Some(Resources { program, vbo, mvp });
        SetupStatus::Success
    }

    fn teardown(&mut self, canvas: &mut dyn Canvas) {
        let Some(res) = self.resources.take() else { return };
        if let Some(gl) = canvas.gl() {
            unsafe {
                gl.use_program(None);
                gl.bind_buffer(glow::ARRAY_BUFFER, None);
                gl.delete_buffer(res.vbo);
                gl.delete_program(res.program);
            }
        }
    }

    fn draw(&mut self, canvas: &mut dyn Canvas) {
        let (Some(gl), Some(res)) = (canvas.gl(), &self.resources) else { return };

        let mvp = *canvas.projection() * Mat4::translate(0.0, 0.0, -3.0) * Mat4::rotate_z(self.angle());

        unsafe {
            gl.use_program(Some(res.program));
            gl.uniform_matrix_4_f32_slice(res.mvp.as_ref(), false, mvp.as_slice());

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(res.vbo));
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, 24, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 3, glow::FLOAT, false, 24, 12);

            gl.draw_arrays(glow::TRIANGLES, 0, 3);

            gl.disable_vertex_attrib_array(0);
            gl.disable_vertex_attrib_array(1);
        }
    }

    fn validate(&mut self, canvas: &mut dyn Canvas) -> ValidationResult {
        if self.resources.is_none() {
            return ValidationResult::Unknown;
        }

        // The centre is always inside the triangle; the canvas clears to black.
        let pixel = canvas.read_pixel(canvas.width() / 2, canvas.height() / 2);
        if pixel.r as u32 + pixel.g as u32 + pixel.b as u32 > 0 {
            ValidationResult::Success
        } else {
            ValidationResult::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_option() {
        let mut scene = SceneTriangle::new();
        assert_eq!(scene.base().option("speed"), Some("90"));
        assert!(scene.base_mut().set_option("speed", "45"));
        assert_eq!(scene.info_string(), "[triangle] speed=45:");
    }
}
