// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use arm7tdmi::Interrupt;
use common::{numutil::NumExt, Cycles};
use modular_bitfield::{bitfield, specifiers::*};

use crate::{
    hw::dma::{Dmas, Reason},
    Agb,
};

/// Cycles of the visible part of a scanline.
pub const HDRAW_LENGTH: Cycles = 1006;
/// Cycles of the blanking part of a scanline.
pub const HBLANK_LENGTH: Cycles = 226;
/// Visible scanlines per frame.
pub const VERTICAL_PIXELS: u16 = 160;
/// Total scanlines per frame, blanking included.
pub const VERTICAL_TOTAL: u16 = 228;

#[bitfield]
#[repr(u16)]
#[derive(Default, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DisplayStatus {
    pub in_vblank: bool,
    pub in_hblank: bool,
    pub vcount_match: bool,
    pub vblank_irq_en: bool,
    pub hblank_irq_en: bool,
    pub vcount_irq_en: bool,
    #[skip]
    __: B2,
    pub vcount_setting: B8,
}

/// The time-visible half of the PPU: scanline progression, DISPSTAT flags
/// and the interrupts/DMA triggers hanging off them. Rendering is the video
/// collaborator's concern.
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Ppu {
    pub dispstat: DisplayStatus,
    pub vcount: u16,
    in_hblank: bool,
    next_event: Cycles,
}

impl Ppu {
    /// Advance scanline state and report cycles until the next transition.
    pub fn process_events(gg: &mut Agb, cycles: Cycles) -> Cycles {
        gg.ppu.next_event -= cycles;
        if gg.ppu.next_event <= 0 {
            if !gg.ppu.in_hblank {
                Self::enter_hblank(gg);
            } else {
                Self::enter_scanline(gg);
            }
        }
        gg.ppu.next_event
    }

    fn enter_hblank(gg: &mut Agb) {
        gg.ppu.next_event += HBLANK_LENGTH;
        gg.ppu.in_hblank = true;
        gg.ppu.dispstat.set_in_hblank(true);
        if gg.ppu.dispstat.hblank_irq_en() {
            gg.raise_irq(Interrupt::HBlank);
        }
        if gg.ppu.vcount < VERTICAL_PIXELS {
            Dmas::update_all(gg, Reason::HBlank);
        }
    }

    fn enter_scanline(gg: &mut Agb) {
        gg.ppu.next_event += HDRAW_LENGTH;
        gg.ppu.in_hblank = false;
        gg.ppu.dispstat.set_in_hblank(false);

        let vcount = (gg.ppu.vcount + 1) % VERTICAL_TOTAL;
        gg.ppu.vcount = vcount;
        match vcount {
            VERTICAL_PIXELS => {
                gg.ppu.dispstat.set_in_vblank(true);
                if gg.ppu.dispstat.vblank_irq_en() {
                    gg.raise_irq(Interrupt::VBlank);
                }
                Dmas::update_all(gg, Reason::VBlank);
            }
            // The flag clears one line before wrap-around.
            227 => gg.ppu.dispstat.set_in_vblank(false),
            _ => (),
        }

        let matches = vcount == gg.ppu.dispstat.vcount_setting().u16();
        gg.ppu.dispstat.set_vcount_match(matches);
        if matches && gg.ppu.dispstat.vcount_irq_en() {
            gg.raise_irq(Interrupt::VCounter);
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self {
            dispstat: DisplayStatus::default(),
            vcount: 0,
            in_hblank: false,
            next_event: HDRAW_LENGTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use arm7tdmi::Cpu;

    use super::*;
    use crate::{addr, Agb};

    const SCANLINE: Cycles = HDRAW_LENGTH + HBLANK_LENGTH;

    #[test]
    fn hblank_flag_and_irq() {
        let mut gg = Agb::new();
        gg.io_write16(addr::IME, 1);
        gg.io_write16(addr::IE, 1 << Interrupt::HBlank as u16);
        gg.io_write16(addr::DISPSTAT, 0x0010);

        Cpu::consume_cycles(&mut *gg, HDRAW_LENGTH);
        assert!(gg.ppu.dispstat.in_hblank());
        assert!(gg
            .memory
            .io16(addr::IF)
            .is_bit(Interrupt::HBlank as u16));
        assert!(gg.cpu.irq_line);

        Cpu::consume_cycles(&mut *gg, HBLANK_LENGTH);
        assert!(!gg.ppu.dispstat.in_hblank());
        assert_eq!(gg.ppu.vcount, 1);
    }

    #[test]
    fn vblank_starts_at_line_160() {
        let mut gg = Agb::new();
        gg.io_write16(addr::IME, 1);
        gg.io_write16(addr::IE, 1 << Interrupt::VBlank as u16);
        gg.io_write16(addr::DISPSTAT, 0x0008);

        for _ in 0..VERTICAL_PIXELS {
            Cpu::consume_cycles(&mut *gg, SCANLINE);
        }
        assert_eq!(gg.ppu.vcount, VERTICAL_PIXELS);
        assert!(gg.ppu.dispstat.in_vblank());
        assert!(gg
            .memory
            .io16(addr::IF)
            .is_bit(Interrupt::VBlank as u16));

        // The flag drops on the final line of the frame.
        for _ in 0..67 {
            Cpu::consume_cycles(&mut *gg, SCANLINE);
        }
        assert_eq!(gg.ppu.vcount, 227);
        assert!(!gg.ppu.dispstat.in_vblank());
    }

    #[test]
    fn vcount_match_raises_irq() {
        let mut gg = Agb::new();
        gg.io_write16(addr::IME, 1);
        gg.io_write16(addr::IE, 1 << Interrupt::VCounter as u16);
        gg.io_write16(addr::DISPSTAT, 0x0020 | (3 << 8));

        for _ in 0..3 {
            Cpu::consume_cycles(&mut *gg, SCANLINE);
        }
        assert!(gg.ppu.dispstat.vcount_match());
        assert!(gg
            .memory
            .io16(addr::IF)
            .is_bit(Interrupt::VCounter as u16));
        assert_eq!(gg.io_read16(addr::VCOUNT), 3);
    }
}
