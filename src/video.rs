use tempo_emu_core::input::{Button, Input};
use tempo_emu_core::ui::{Ui, LCD_HEIGHT, LCD_WIDTH};

/// The classic green-tinted shades for monochrome output. Pixels are packed
/// so the little-endian byte order matches the RGBA render surface.
const DMG_PALETTE: [u32; 4] = [
    rgb(0x75, 0xA3, 0x2C),
    rgb(0x38, 0x7A, 0x21),
    rgb(0x25, 0x51, 0x16),
    rgb(0x12, 0x28, 0x0B),
];

const fn rgb(r: u32, g: u32, b: u32) -> u32 {
    0xFF000000 | b << 16 | g << 8 | r
}

const fn expand_5_to_8(value: u32) -> u32 {
    value << 3 | value >> 2
}

/// Converts a 15-bit xRGB-1555 color to a framebuffer pixel.
fn gbc_to_pixel(color: u16) -> u32 {
    let r = expand_5_to_8(color as u32 & 0x1F);
    let g = expand_5_to_8((color as u32 >> 5) & 0x1F);
    let b = expand_5_to_8((color as u32 >> 10) & 0x1F);
    rgb(r, g, b)
}

/// Desktop sink: accumulates scanlines into an ARGB framebuffer and queues
/// keyboard events for the core's input pump.
pub struct DesktopUi {
    frame: Vec<u32>,
    frame_ready: bool,
    queued: Vec<(Button, bool)>,
}

impl DesktopUi {
    pub fn new() -> Self {
        Self {
            frame: vec![DMG_PALETTE[0]; LCD_WIDTH * LCD_HEIGHT],
            frame_ready: false,
            queued: Vec::new(),
        }
    }

    /// Queues a button event; it reaches the joypad at the next run chunk.
    pub fn queue_button(&mut self, button: Button, pressed: bool) {
        self.queued.push((button, pressed));
    }

    /// True once per completed frame.
    pub fn take_frame(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    pub fn framebuffer(&self) -> &[u32] {
        &self.frame
    }
}

impl Ui for DesktopUi {
    fn draw_line_dmg(&mut self, ly: u8, line: &[u8; LCD_WIDTH]) {
        let row = &mut self.frame[ly as usize * LCD_WIDTH..(ly as usize + 1) * LCD_WIDTH];
        for (out, &shade) in row.iter_mut().zip(line.iter()) {
            *out = DMG_PALETTE[shade as usize & 3];
        }
    }

    fn draw_line_gbc(&mut self, ly: u8, line: &[u16; LCD_WIDTH]) {
        let row = &mut self.frame[ly as usize * LCD_WIDTH..(ly as usize + 1) * LCD_WIDTH];
        for (out, &color) in row.iter_mut().zip(line.iter()) {
            *out = gbc_to_pixel(color);
        }
    }

    fn flip(&mut self) {
        self.frame_ready = true;
    }

    fn refresh_input(&mut self, input: &mut Input) {
        for (button, pressed) in self.queued.drain(..) {
            input.set_button(button, pressed);
        }
    }
}

impl Default for DesktopUi {
    fn default() -> Self {
        Self::new()
    }
}
