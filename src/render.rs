//! Minimal software rasterizer over the softbuffer pixel buffer. Just the
//! primitives the viewer needs: filled/stroked circles for hit objects and
//! approach rings, thick lines for slider bodies, and a 5x7 bitmap font for
//! the debug overlay. Pixels are 0x00RRGGBB as softbuffer expects.

pub const COLOR_OBJECT: u32 = 0xffc000;
pub const COLOR_BORDER: u32 = 0xffffff;
pub const COLOR_CURSOR: u32 = 0xff0000;
pub const COLOR_TEXT: u32 = 0xffffff;

pub struct Frame<'a> {
    buf: &'a mut [u32],
    width: i32,
    height: i32,
}

impl<'a> Frame<'a> {
    pub fn new(buf: &'a mut [u32], width: u32, height: u32) -> Self {
        Self {
            buf,
            width: width as i32,
            height: height as i32,
        }
    }

    pub fn clear(&mut self, color: u32) {
        self.buf.fill(color);
    }

    #[inline(always)]
    fn blend_pixel(&mut self, x: i32, y: i32, color: u32, alpha: u8) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height || alpha == 0 {
            return;
        }
        let idx = (y * self.width + x) as usize;
        if alpha == 255 {
            self.buf[idx] = color;
            return;
        }
        let dst = self.buf[idx];
        let a = alpha as u32;
        let inv = 255 - a;
        let r = ((color >> 16 & 0xff) * a + (dst >> 16 & 0xff) * inv) / 255;
        let g = ((color >> 8 & 0xff) * a + (dst >> 8 & 0xff) * inv) / 255;
        let b = ((color & 0xff) * a + (dst & 0xff) * inv) / 255;
        self.buf[idx] = (r << 16) | (g << 8) | b;
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: u32, alpha: u8) {
        let r2 = radius * radius;
        let (x0, x1) = ((cx - radius) as i32, (cx + radius).ceil() as i32);
        let (y0, y1) = ((cy - radius) as i32, (cy + radius).ceil() as i32);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                if dx * dx + dy * dy <= r2 {
                    self.blend_pixel(x, y, color, alpha);
                }
            }
        }
    }

    pub fn stroke_circle(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        thickness: f32,
        color: u32,
        alpha: u8,
    ) {
        let outer = radius + thickness * 0.5;
        let inner = (radius - thickness * 0.5).max(0.0);
        let outer2 = outer * outer;
        let inner2 = inner * inner;
        let (x0, x1) = ((cx - outer) as i32, (cx + outer).ceil() as i32);
        let (y0, y1) = ((cy - outer) as i32, (cy + outer).ceil() as i32);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let d2 = dx * dx + dy * dy;
                if d2 <= outer2 && d2 >= inner2 {
                    self.blend_pixel(x, y, color, alpha);
                }
            }
        }
    }

    /// Thick line as a swept disc; good enough for slider bodies.
    pub fn line(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        width: f32,
        color: u32,
        alpha: u8,
    ) {
        let dx = x1 - x0;
        let dy = y1 - y0;
        let len = (dx * dx + dy * dy).sqrt();
        let steps = (len / (width * 0.25).max(1.0)).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            self.fill_circle(x0 + dx * t, y0 + dy * t, width * 0.5, color, alpha);
        }
    }

    /// Arc from angle 0 (3 o'clock, screen clockwise) spanning
    /// `sweep_turns` of a full revolution; used for spinner progress.
    pub fn arc(&mut self, cx: f32, cy: f32, radius: f32, sweep_turns: f32, width: f32, color: u32) {
        let sweep = sweep_turns.clamp(0.0, 1.0) * std::f32::consts::TAU;
        let steps = ((radius * sweep) as usize).max(1);
        for i in 0..=steps {
            let angle = sweep * i as f32 / steps as f32;
            let x = cx + radius * angle.cos();
            let y = cy + radius * angle.sin();
            self.fill_circle(x, y, width * 0.5, color, 255);
        }
    }

    pub fn text(&mut self, x: i32, y: i32, text: &str, color: u32) {
        let mut pen_x = x;
        for ch in text.chars() {
            let rows = glyph(ch.to_ascii_uppercase());
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..5 {
                    if bits & (0b10000 >> col) != 0 {
                        self.blend_pixel(pen_x + col, y + row as i32, color, 255);
                    }
                }
            }
            pen_x += 6;
        }
    }
}

// 5x7 glyphs, one u8 of row bits per scanline, MSB-first in the low 5 bits.
// Unknown characters render as blanks.
const fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b01110, 0b10001, 0b00001, 0b00110, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        ':' => [0b00000, 0b00100, 0b00000, 0b00000, 0b00000, 0b00100, 0b00000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00100, 0b00000],
        ',' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00100, 0b00100, 0b01000],
        '-' => [0b00000, 0b00000, 0b00000, 0b01110, 0b00000, 0b00000, 0b00000],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        _ => [0; 7],
    }
}
