use glow::HasContext;
use gpumark_common::Font;

use crate::canvas::Canvas;
use crate::shader::{create_program, f32_bytes};

const MARGIN: usize = 10;
const TEXT_COLOR: u32 = 0xFFFF_FFFF;

const VERTEX_SHADER: &str = r#"
attribute vec2 a_position;
attribute vec2 a_texcoord;
varying vec2 v_texcoord;

void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
    v_texcoord = a_texcoord;
}
"#;

const FRAGMENT_SHADER: &str = r#"
varying vec2 v_texcoord;
uniform sampler2D u_texture;

void main() {
    gl_FragColor = texture2D(u_texture, v_texcoord);
}
"#;

/// Rasterized text: `width * height` RGBA words, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBitmap {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u32>,
}

impl TextBitmap {
    pub fn render(font: &Font, text: &str) -> Self {
        let width = font.text_width(text).max(1);
        let height = font.char_height();
        let mut pixels = vec![0u32; width * height];
        font.draw_text(&mut pixels, width, 0, 0, text, TEXT_COLOR);
        Self { width, height, pixels }
    }

    fn bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|p| p.to_le_bytes()).collect()
    }
}

/// Quad corners in normalized device coordinates for a `w`x`h` bitmap at
/// the top-left corner of a `canvas_w`x`canvas_h` surface.
pub fn quad_vertices(w: usize, h: usize, canvas_w: i32, canvas_h: i32) -> [f32; 16] {
    let cw = canvas_w.max(1) as f32;
    let ch = canvas_h.max(1) as f32;
    let x0 = -1.0 + 2.0 * MARGIN as f32 / cw;
    let x1 = x0 + 2.0 * w as f32 / cw;
    let y0 = 1.0 - 2.0 * MARGIN as f32 / ch;
    let y1 = y0 - 2.0 * h as f32 / ch;

    #[rustfmt::skip]
    let v = [
        // pos    // tex
        x0, y1,   0.0, 1.0,
        x1, y1,   1.0, 1.0,
        x0, y0,   0.0, 0.0,
        x1, y0,   1.0, 0.0,
    ];
    v
}

struct Resources {
    program: glow::Program,
    vbo: glow::Buffer,
    texture: glow::Texture,
}

/// Draws a short line of text (the FPS counter) over the scene.
pub struct TextRenderer {
    font: Font,
    bitmap: TextBitmap,
    resources: Option<Resources>,
    dirty: bool,
}

impl TextRenderer {
    pub fn new(canvas: &dyn Canvas) -> Self {
        let resources = canvas.gl().and_then(|gl| match Self::create_resources(&gl) {
            Ok(r) => Some(r),
            Err(e) => {
                log::warn!("[text] Text overlay disabled: {}", e);
                None
            }
        });

        Self {
            font: Font::default(),
            bitmap: TextBitmap::render(&Font::default(), ""),
            resources,
            dirty: true,
        }
    }

    fn create_resources(gl: &glow::Context) -> Result<Resources, Box<dyn std::error::Error>> {
        let program = create_program(gl, VERTEX_SHADER, FRAGMENT_SHADER, &[(0, "a_position"), (1, "a_texcoord")])?;
        unsafe {
            let vbo = gl.create_buffer()?;
            let texture = gl.create_texture()?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            Ok(Resources { program, vbo, texture })
        }
    }

    pub fn text(&mut self, text: &str) {
        self.bitmap = TextBitmap::render(&self.font, text);
        self.dirty = true;
    }

    pub fn render(&mut self, canvas: &dyn Canvas) {
        let (Some(gl), Some(res)) = (canvas.gl(), &self.resources) else { return };

        unsafe {
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(res.texture));
            if self.dirty {
                gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    glow::RGBA as i32,
                    self.bitmap.width as i32,
                    self.bitmap.height as i32,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    glow::PixelUnpackData::Slice(Some(&self.bitmap.bytes())),
                );
                self.dirty = false;
            }

            let vertices = quad_vertices(self.bitmap.width, self.bitmap.height, canvas.width(), canvas.height());
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(res.vbo));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, f32_bytes(&vertices), glow::STREAM_DRAW);

            gl.use_program(Some(res.program));
            let sampler = gl.get_uniform_location(res.program, "u_texture");
            gl.uniform_1_i32(sampler.as_ref(), 0);

            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, 16, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, 16, 8);

            gl.disable(glow::DEPTH_TEST);
            gl.enable(glow::BLEND);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);

            gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);

            gl.disable(glow::BLEND);
            gl.enable(glow::DEPTH_TEST);
            gl.disable_vertex_attrib_array(0);
            gl.disable_vertex_attrib_array(1);
        }
    }

    /// Frees the GL objects. Must run while the context that created them is
    /// still current.
    pub fn release(&mut self, canvas: &dyn Canvas) {
        let Some(res) = self.resources.take() else { return };
        if let Some(gl) = canvas.gl() {
            unsafe {
                gl.delete_texture(res.texture);
                gl.delete_buffer(res.vbo);
                gl.delete_program(res.program);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_size_follows_font() {
        let font = Font::new(2);
        let bitmap = TextBitmap::render(&font, "FPS: 60");
        assert_eq!(bitmap.width, font.text_width("FPS: 60"));
        assert_eq!(bitmap.height, 14);
        assert_eq!(bitmap.pixels.len(), bitmap.width * bitmap.height);
        assert!(bitmap.pixels.contains(&TEXT_COLOR));
    }

    #[test]
    fn test_empty_text_has_one_column() {
        let bitmap = TextBitmap::render(&Font::default(), "");
        assert_eq!(bitmap.width, 1);
        assert!(bitmap.pixels.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_quad_sits_in_top_left_corner() {
        let v = quad_vertices(100, 20, 800, 600);
        // x0, y0 of the top-left vertex
        assert!((v[8] - (-1.0 + 20.0 / 800.0)).abs() < 1e-6);
        assert!((v[9] - (1.0 - 20.0 / 600.0)).abs() < 1e-6);
        // right edge is 100 px further
        assert!((v[4] - v[0] - 200.0 / 800.0).abs() < 1e-6);
    }
}
