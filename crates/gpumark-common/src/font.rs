pub const FONT_CHAR_WIDTH: usize = 5;
pub const FONT_CHAR_HEIGHT: usize = 7;

// 5x7 glyphs, one byte per row, bit 4 is the leftmost column.
const GLYPHS: &[(char, [u8; 7])] = &[
    (' ', [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
    ('.', [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C]),
    (':', [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00]),
    ('-', [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00]),
    ('0', [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E]),
    ('1', [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E]),
    ('2', [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F]),
    ('3', [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E]),
    ('4', [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02]),
    ('5', [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E]),
    ('6', [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E]),
    ('7', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08]),
    ('8', [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E]),
    ('9', [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C]),
    ('A', [0x0E, 0x11, 0x11, 0x11, 0x1F, 0x11, 0x11]),
    ('B', [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E]),
    ('C', [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E]),
    ('D', [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C]),
    ('E', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F]),
    ('F', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10]),
    ('G', [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F]),
    ('H', [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11]),
    ('I', [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E]),
    ('J', [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C]),
    ('K', [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11]),
    ('L', [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F]),
    ('M', [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11]),
    ('N', [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11]),
    ('O', [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E]),
    ('P', [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10]),
    ('Q', [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D]),
    ('R', [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11]),
    ('S', [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E]),
    ('T', [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04]),
    ('U', [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E]),
    ('V', [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04]),
    ('W', [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A]),
    ('X', [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11]),
    ('Y', [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04]),
    ('Z', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F]),
];

// Drawn for characters without a glyph.
const UNKNOWN_GLYPH: [u8; 7] = [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F];

pub struct Font {
    pub scale: usize,
}

impl Default for Font {
    fn default() -> Self {
        Self { scale: 2 }
    }
}

impl Font {
    pub fn new(scale: usize) -> Self {
        Self { scale: scale.max(1) }
    }

    pub fn char_width(&self) -> usize {
        FONT_CHAR_WIDTH * self.scale
    }

    pub fn char_height(&self) -> usize {
        FONT_CHAR_HEIGHT * self.scale
    }

    /// Horizontal advance, one scaled pixel of spacing between glyphs.
    pub fn advance(&self) -> usize {
        self.char_width() + self.scale
    }

    pub fn text_width(&self, text: &str) -> usize {
        let count = text.chars().count();
        if count == 0 {
            0
        } else {
            count * self.advance() - self.scale
        }
    }

    fn glyph(ch: char) -> &'static [u8; 7] {
        let ch = ch.to_ascii_uppercase();
        GLYPHS
            .iter()
            .find(|(c, _)| *c == ch)
            .map(|(_, rows)| rows)
            .unwrap_or(&UNKNOWN_GLYPH)
    }

    pub fn draw_char(
        &self,
        pixels: &mut [u32],
        stride: usize,
        x: usize,
        y: usize,
        ch: char,
        color: u32,
    ) {
        let rows = Self::glyph(ch);

        for (cy, row) in rows.iter().enumerate() {
            for cx in 0..FONT_CHAR_WIDTH {
                if row & (0x10 >> cx) == 0 {
                    continue;
                }
                for sy in 0..self.scale {
                    for sx in 0..self.scale {
                        let px = x + cx * self.scale + sx;
                        let py = y + cy * self.scale + sy;
                        if px >= stride {
                            continue;
                        }
                        if let Some(pixel) = pixels.get_mut(py * stride + px) {
                            *pixel = color;
                        }
                    }
                }
            }
        }
    }

    pub fn draw_text(
        &self,
        pixels: &mut [u32],
        stride: usize,
        x: usize,
        y: usize,
        text: &str,
        color: u32,
    ) {
        for (i, ch) in text.chars().enumerate() {
            self.draw_char(pixels, stride, x + i * self.advance(), y, ch, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_width() {
        let font = Font::new(2);
        assert_eq!(font.text_width(""), 0);
        assert_eq!(font.text_width("F"), 10);
        assert_eq!(font.text_width("FPS"), 3 * 12 - 2);
    }

    #[test]
    fn test_draw_char_sets_pixels() {
        let font = Font::new(1);
        let mut pixels = vec![0u32; 5 * 7];
        font.draw_char(&mut pixels, 5, 0, 0, '1', 0xFFFFFFFF);
        // Top row of '1' is a single pixel in the middle column.
        assert_eq!(&pixels[0..5], &[0, 0, 0xFFFFFFFF, 0, 0]);
        // Bottom row is three pixels wide.
        assert_eq!(&pixels[30..35], &[0, 0xFFFFFFFF, 0xFFFFFFFF, 0xFFFFFFFF, 0]);
    }

    #[test]
    fn test_draw_clips_to_buffer() {
        let font = Font::new(3);
        let mut pixels = vec![0u32; 4 * 4];
        font.draw_text(&mut pixels, 4, 2, 2, "FPS: 60", 1);
        assert!(pixels.iter().any(|&p| p == 1));
    }

    #[test]
    fn test_lowercase_uses_uppercase_glyph() {
        assert_eq!(Font::glyph('f'), Font::glyph('F'));
        assert_eq!(Font::glyph('~'), &UNKNOWN_GLYPH);
    }
}
