use crate::interrupts::{Interrupt, InterruptController};
use crate::scheduler::{Scheduler, SyncToken, NEVER};
use crate::ui::{Ui, LCD_HEIGHT, LCD_WIDTH};

// Scanline layout in cycles:
//   | Mode 2: OAM scan | Mode 3: pixel out | Mode 0: HBlank |
// The line is drawn in one shot at the Mode 3 -> Mode 0 boundary.
const MODE_2_CYCLES: u16 = 80;
const MODE_3_CYCLES: u16 = 172;
const MODE_3_END: u16 = MODE_2_CYCLES + MODE_3_CYCLES;
const MODE_0_CYCLES: u16 = 204;
const HTOTAL: u16 = MODE_3_END + MODE_0_CYCLES;

const VSYNC_START: u8 = 144;
const VSYNC_LINES: u8 = 10;
const VTOTAL: u8 = VSYNC_START + VSYNC_LINES;

const MAX_SPRITES: usize = 40;
const LINE_SPRITES: usize = 10;

const VRAM_BANK_SIZE: usize = 0x2000;

/// White in each output format; also the transparent sprite color.
const DMG_WHITE: u8 = 0;
const GBC_WHITE: u16 = 0x7FFF;

/// One of the eight-entry GBC palette files (background or sprites), with
/// its CPU-visible write index.
pub struct ColorPalettes {
    pub colors: [[u16; 4]; 8],
    write_index: u8,
    auto_increment: bool,
}

impl ColorPalettes {
    fn new() -> Self {
        Self {
            colors: [[GBC_WHITE; 4]; 8],
            write_index: 0,
            auto_increment: false,
        }
    }

    /// BCPS/OCPS read.
    pub fn specification(&self) -> u8 {
        (self.auto_increment as u8) << 7 | self.write_index
    }

    /// BCPS/OCPS write.
    pub fn set_specification(&mut self, value: u8) {
        self.auto_increment = value & 0x80 != 0;
        self.write_index = value & 0x3F;
    }

    fn slot(&self) -> (usize, usize, bool) {
        let index = self.write_index as usize;
        (index >> 3, (index >> 1) & 3, index & 1 != 0)
    }

    /// BCPD/OCPD read: one byte of the indexed 15-bit color.
    pub fn data(&self) -> u8 {
        let (palette, color, high) = self.slot();
        let color = self.colors[palette][color];
        if high {
            (color >> 8) as u8
        } else {
            color as u8
        }
    }

    /// BCPD/OCPD write, honoring auto-increment.
    pub fn set_data(&mut self, value: u8) {
        let (palette, color, high) = self.slot();
        let slot = &mut self.colors[palette][color];
        if high {
            *slot = (*slot & 0x00FF) | (value as u16) << 8;
        } else {
            *slot = (*slot & 0xFF00) | value as u16;
        }

        if self.auto_increment {
            self.write_index = (self.write_index + 1) & 0x3F;
        }
    }
}

/// One OAM entry, decoded. Coordinates are already shifted so that (0, 0) is
/// the top-left visible pixel.
#[derive(Clone, Copy, Default)]
struct Sprite {
    x: i32,
    y: i32,
    tile_index: u8,
    /// Displayed behind opaque background pixels.
    behind_background: bool,
    x_flip: bool,
    y_flip: bool,
    /// DMG: selects OBP1 over OBP0.
    use_palette1: bool,
    /// GBC: tile data comes from VRAM bank 1.
    high_bank: bool,
    /// GBC: sprite palette 0..=7.
    palette: u8,
}

#[derive(Clone, Copy)]
enum PixelColor {
    Dmg(u8),
    Gbc(u16),
}

#[derive(Clone, Copy)]
struct Pixel {
    color: PixelColor,
    opaque: bool,
    /// GBC only: the background pixel beats sprites outright.
    priority: bool,
}

/// The picture unit: LCDC/STAT state, scroll and palette registers, VRAM and
/// OAM, and the scanline state machine.
pub struct Ppu {
    gbc: bool,

    pub scroll_x: u8,
    pub scroll_y: u8,
    pub window_x: u8,
    pub window_y: u8,

    // STAT interrupt source enables.
    lyc_int: bool,
    mode0_int: bool,
    mode1_int: bool,
    mode2_int: bool,

    // LCDC, decoded.
    master_enable: bool,
    background_enable: bool,
    window_enable: bool,
    sprite_enable: bool,
    tall_sprites: bool,
    background_high_tile_map: bool,
    window_high_tile_map: bool,
    /// Background/window tiles come from the sprite tile area (0x8000,
    /// unsigned indices) instead of the signed-indexed 0x9000 area.
    use_sprite_tile_set: bool,

    pub ly: u8,
    pub lyc: u8,

    pub background_palette: u8,
    pub sprite_palette0: u8,
    pub sprite_palette1: u8,
    pub background_palettes: ColorPalettes,
    pub sprite_palettes: ColorPalettes,

    /// Cycle position within the current scanline, 0..HTOTAL.
    line_position: u16,

    pub vram: [[u8; VRAM_BANK_SIZE]; 2],
    pub oam: [u8; MAX_SPRITES * 4],
}

impl Ppu {
    pub fn new(gbc: bool) -> Self {
        Self {
            gbc,
            scroll_x: 0,
            scroll_y: 0,
            window_x: 0,
            window_y: 0,
            lyc_int: false,
            mode0_int: false,
            mode1_int: false,
            mode2_int: false,
            master_enable: true,
            background_enable: false,
            window_enable: false,
            sprite_enable: false,
            tall_sprites: false,
            background_high_tile_map: false,
            window_high_tile_map: false,
            use_sprite_tile_set: false,
            ly: 0,
            lyc: 0,
            background_palette: 0,
            sprite_palette0: 0,
            sprite_palette1: 0,
            background_palettes: ColorPalettes::new(),
            sprite_palettes: ColorPalettes::new(),
            line_position: 0,
            vram: [[0; VRAM_BANK_SIZE]; 2],
            oam: [0; MAX_SPRITES * 4],
        }
    }

    /// Current STAT mode.
    fn mode(&self) -> u8 {
        if self.ly >= VSYNC_START {
            1
        } else if self.line_position < MODE_2_CYCLES {
            2
        } else if self.line_position < MODE_3_END {
            3
        } else {
            0
        }
    }

    /// Catches the PPU up with elapsed cycles, firing interrupt edges and
    /// drawing each scanline at its Mode 3 -> Mode 0 boundary.
    ///
    /// Returns the number of HBlank transitions at which the HDMA engine
    /// should run a burst (nonzero only while `hdma_armed`).
    pub fn sync(
        &mut self,
        sched: &mut Scheduler,
        it: &mut InterruptController,
        hdma_armed: bool,
        ui: &mut dyn Ui,
    ) -> u32 {
        let mut elapsed = sched.resync(SyncToken::Ppu);
        let mut hdma_slots = 0;

        if !self.master_enable {
            sched.schedule(SyncToken::Ppu, NEVER);
            return 0;
        }

        let mut line_remaining = HTOTAL - self.line_position;

        while elapsed > 0 {
            let prev_mode = self.mode();

            if elapsed < line_remaining as i32 {
                self.line_position += elapsed as u16;
                line_remaining -= elapsed as u16;
                elapsed = 0;

                // Crossed into HBlank without finishing the line.
                if prev_mode != 0 && self.mode() == 0 {
                    self.draw_line(ui);
                    if self.mode0_int {
                        it.request(Interrupt::LcdStat);
                    }
                    if hdma_armed {
                        hdma_slots += 1;
                    }
                }
            } else {
                elapsed -= line_remaining as i32;

                // The line ends while we were still in Mode 2/3: its HBlank
                // (and drawing) is still owed.
                if prev_mode == 2 || prev_mode == 3 {
                    self.draw_line(ui);
                    if self.mode0_int {
                        it.request(Interrupt::LcdStat);
                    }
                    if hdma_armed {
                        hdma_slots += 1;
                    }
                }

                self.ly += 1;
                self.line_position = 0;
                line_remaining = HTOTAL;

                if self.ly == VSYNC_START {
                    ui.flip();
                    it.request(Interrupt::VBlank);
                    if self.mode1_int {
                        it.request(Interrupt::LcdStat);
                    }
                }

                if self.ly >= VTOTAL {
                    self.ly = 0;
                }

                if self.lyc_int && self.ly == self.lyc {
                    it.request(Interrupt::LcdStat);
                }

                // Mode 2 opens every visible line.
                if self.mode2_int && self.ly < VSYNC_START {
                    it.request(Interrupt::LcdStat);
                }
            }
        }

        // Wake at the end of the line, or earlier at the Mode 0 boundary when
        // someone needs the HBlank edge.
        let mut next_event = line_remaining as i32;
        if (self.mode0_int || hdma_armed) && self.mode() >= 2 {
            next_event -= MODE_0_CYCLES as i32;
        }
        sched.schedule(SyncToken::Ppu, next_event);

        hdma_slots
    }

    /// STAT read. Callers sync first; a disabled LCD reads as 0.
    pub fn stat(&self) -> u8 {
        if !self.master_enable {
            return 0;
        }

        self.mode()
            | ((self.ly == self.lyc) as u8) << 2
            | (self.mode0_int as u8) << 3
            | (self.mode1_int as u8) << 4
            | (self.mode2_int as u8) << 5
            | (self.lyc_int as u8) << 6
    }

    /// STAT write (interrupt source enables only). Returns true when the
    /// Mode 0 source was just enabled, which moves the next PPU event.
    pub fn set_stat(&mut self, value: u8) -> bool {
        let prev_mode0 = self.mode0_int;

        self.mode0_int = value & 0x08 != 0;
        self.mode1_int = value & 0x10 != 0;
        self.mode2_int = value & 0x20 != 0;
        self.lyc_int = value & 0x40 != 0;

        !prev_mode0 && self.mode0_int
    }

    /// LCDC read.
    pub fn lcdc(&self) -> u8 {
        (self.background_enable as u8)
            | (self.sprite_enable as u8) << 1
            | (self.tall_sprites as u8) << 2
            | (self.background_high_tile_map as u8) << 3
            | (self.use_sprite_tile_set as u8) << 4
            | (self.window_enable as u8) << 5
            | (self.window_high_tile_map as u8) << 6
            | (self.master_enable as u8) << 7
    }

    /// LCDC write. Returns true when the master enable bit changed; the
    /// caller resyncs, and on 1 -> 0 the screen has already been blanked and
    /// the beam reset.
    pub fn set_lcdc(&mut self, value: u8, ui: &mut dyn Ui) -> bool {
        self.background_enable = value & 0x01 != 0;
        self.sprite_enable = value & 0x02 != 0;
        self.tall_sprites = value & 0x04 != 0;
        self.background_high_tile_map = value & 0x08 != 0;
        self.use_sprite_tile_set = value & 0x10 != 0;
        self.window_enable = value & 0x20 != 0;
        self.window_high_tile_map = value & 0x40 != 0;

        let master_enable = value & 0x80 != 0;
        if master_enable == self.master_enable {
            return false;
        }
        self.master_enable = master_enable;

        if !master_enable {
            // The screen goes white immediately and the beam restarts from
            // the top-left corner.
            if self.gbc {
                let line = [GBC_WHITE; LCD_WIDTH];
                for ly in 0..LCD_HEIGHT as u8 {
                    ui.draw_line_gbc(ly, &line);
                }
            } else {
                let line = [DMG_WHITE; LCD_WIDTH];
                for ly in 0..LCD_HEIGHT as u8 {
                    ui.draw_line_dmg(ly, &line);
                }
            }
            self.ly = 0;
            self.line_position = 0;
        }

        true
    }

    /// Reads a 2-bit pixel out of the tile data area.
    fn tile_color(
        &self,
        tile_index: u8,
        x: u8,
        y: u8,
        use_sprite_tile_set: bool,
        high_bank: bool,
    ) -> u8 {
        const TILE_SIZE: usize = 16;

        let tile_address = if use_sprite_tile_set {
            tile_index as usize * TILE_SIZE
        } else {
            (0x1000 + (tile_index as i8 as isize) * TILE_SIZE as isize) as usize
        };

        let bank = &self.vram[high_bank as usize];

        // The leftmost pixel lives in the most significant bit.
        let shift = 7 - x;
        let lsb = bank[tile_address + y as usize * 2] >> shift & 1;
        let msb = bank[tile_address + y as usize * 2 + 1] >> shift & 1;

        msb << 1 | lsb
    }

    /// Runs a 2-bit color through a DMG palette byte.
    fn palette_transform(color: u8, palette: u8) -> u8 {
        palette >> (color * 2) & 3
    }

    /// Fetches one background or window pixel from map coordinates.
    fn background_window_pixel(&self, x: u8, y: u8, high_tile_map: bool) -> Pixel {
        let tile_map_x = x as usize / 8;
        let tile_map_y = y as usize / 8;
        let mut tile_x = (x % 8) as u8;
        let mut tile_y = (y % 8) as u8;

        // Two independent 32x32 maps of tile-set indices.
        let tile_map_address =
            if high_tile_map { 0x1C00 } else { 0x1800 } + tile_map_y * 32 + tile_map_x;
        let tile_index = self.vram[0][tile_map_address];

        if self.gbc {
            // The second VRAM bank holds per-tile attributes.
            let attributes = self.vram[1][tile_map_address];
            let priority = attributes & 0x80 != 0;
            if attributes & 0x20 != 0 {
                tile_x = 7 - tile_x;
            }
            if attributes & 0x40 != 0 {
                tile_y = 7 - tile_y;
            }
            let high_bank = attributes & 0x08 != 0;
            let palette = (attributes & 0x07) as usize;

            let color = self.tile_color(
                tile_index,
                tile_x,
                tile_y,
                self.use_sprite_tile_set,
                high_bank,
            );
            Pixel {
                color: PixelColor::Gbc(self.background_palettes.colors[palette][color as usize]),
                opaque: color != 0,
                priority,
            }
        } else {
            let color = self.tile_color(tile_index, tile_x, tile_y, self.use_sprite_tile_set, false);
            Pixel {
                color: PixelColor::Dmg(Self::palette_transform(color, self.background_palette)),
                opaque: color != 0,
                priority: false,
            }
        }
    }

    fn background_pixel(&self, x: u8, y: u8) -> Pixel {
        let map_x = x.wrapping_add(self.scroll_x);
        let map_y = y.wrapping_add(self.scroll_y);
        self.background_window_pixel(map_x, map_y, self.background_high_tile_map)
    }

    fn window_pixel(&self, x: u8, y: u8) -> Pixel {
        let map_x = x.wrapping_add(7).wrapping_sub(self.window_x);
        let map_y = y.wrapping_sub(self.window_y);
        self.background_window_pixel(map_x, map_y, self.window_high_tile_map)
    }

    fn in_window(&self, x: u8, y: u8) -> bool {
        x as i32 >= self.window_x as i32 - 7 && y >= self.window_y
    }

    fn oam_sprite(&self, index: usize) -> Sprite {
        let entry = &self.oam[index * 4..index * 4 + 4];
        let flags = entry[3];

        Sprite {
            // Offsets let sprites clip past the top and left screen edges.
            y: entry[0] as i32 - 16,
            x: entry[1] as i32 - 8,
            tile_index: entry[2],
            use_palette1: flags & 0x10 != 0,
            x_flip: flags & 0x20 != 0,
            y_flip: flags & 0x40 != 0,
            behind_background: flags & 0x80 != 0,
            high_bank: self.gbc && flags & 0x08 != 0,
            palette: if self.gbc { flags & 0x07 } else { 0 },
        }
    }

    /// Collects, in OAM order, up to ten sprites overlapping line `ly`. On
    /// DMG the list is then stably sorted by X, which is the draw priority;
    /// on GBC the OAM order already is.
    fn line_sprites(&self, ly: u8) -> ([Sprite; LINE_SPRITES], usize) {
        let mut sprites = [Sprite::default(); LINE_SPRITES];
        let mut count = 0;

        if !self.sprite_enable {
            return (sprites, 0);
        }

        let height = if self.tall_sprites { 16 } else { 8 };
        for index in 0..MAX_SPRITES {
            let sprite = self.oam_sprite(index);
            if (ly as i32) < sprite.y || ly as i32 >= sprite.y + height {
                continue;
            }

            sprites[count] = sprite;
            count += 1;
            if count == LINE_SPRITES {
                break;
            }
        }

        if !self.gbc {
            sprites[..count].sort_by_key(|sprite| sprite.x);
        }

        (sprites, count)
    }

    /// Resolves one sprite at screen position (x, y). Returns None when the
    /// sprite pixel is transparent or hidden behind the background.
    fn sprite_pixel(&self, sprite: &Sprite, x: u8, y: u8, background: &Pixel) -> Option<PixelColor> {
        if sprite.behind_background && background.opaque {
            return None;
        }

        let mut sprite_x = (x as i32 - sprite.x) as u8;
        let mut sprite_y = (y as i32 - sprite.y) as u8;

        // Tall sprites pair two consecutive tiles; the index LSB is ignored.
        let (tile_index, flip_height) = if self.tall_sprites {
            (sprite.tile_index & 0xFE, 15)
        } else {
            (sprite.tile_index, 7)
        };

        if sprite.x_flip {
            sprite_x = 7 - sprite_x;
        }
        if sprite.y_flip {
            sprite_y = flip_height - sprite_y;
        }

        let color = self.tile_color(tile_index, sprite_x, sprite_y, true, sprite.high_bank);
        if color == 0 {
            return None;
        }

        if self.gbc {
            Some(PixelColor::Gbc(
                self.sprite_palettes.colors[sprite.palette as usize][color as usize],
            ))
        } else {
            let palette = if sprite.use_palette1 {
                self.sprite_palette1
            } else {
                self.sprite_palette0
            };
            Some(PixelColor::Dmg(Self::palette_transform(color, palette)))
        }
    }

    /// Renders the current scanline and hands it to the sink.
    fn draw_line(&self, ui: &mut dyn Ui) {
        let ly = self.ly;
        let (sprites, sprite_count) = self.line_sprites(ly);
        let sprites = &sprites[..sprite_count];

        let mut dmg_line = [DMG_WHITE; LCD_WIDTH];
        let mut gbc_line = [GBC_WHITE; LCD_WIDTH];

        for x in 0..LCD_WIDTH as u8 {
            let mut pixel = Pixel {
                color: if self.gbc {
                    PixelColor::Gbc(GBC_WHITE)
                } else {
                    PixelColor::Dmg(DMG_WHITE)
                },
                opaque: false,
                priority: false,
            };

            if self.window_enable && self.in_window(x, ly) {
                pixel = self.window_pixel(x, ly);
            } else if self.background_enable {
                pixel = self.background_pixel(x, ly);
            }

            if !pixel.priority || !pixel.opaque {
                for sprite in sprites {
                    if (x as i32) < sprite.x || x as i32 >= sprite.x + 8 {
                        continue;
                    }
                    if let Some(color) = self.sprite_pixel(sprite, x, ly, &pixel) {
                        pixel.color = color;
                        break;
                    }
                }
            }

            match pixel.color {
                PixelColor::Dmg(shade) => dmg_line[x as usize] = shade,
                PixelColor::Gbc(color) => gbc_line[x as usize] = color,
            }
        }

        if self.gbc {
            ui.draw_line_gbc(ly, &gbc_line);
        } else {
            ui.draw_line_dmg(ly, &dmg_line);
        }
    }
}
