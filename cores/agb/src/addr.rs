// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

// General
pub const IE: u32 = 0x200;
pub const IF: u32 = 0x202;
pub const IME: u32 = 0x208;
pub const POSTFLG: u32 = 0x300;
pub const HALTCNT: u32 = 0x301;

// PPU
pub const DISPSTAT: u32 = 0x4;
pub const VCOUNT: u32 = 0x6;

// Input
pub const KEYINPUT: u32 = 0x130;

// Timers
pub const TM0CNT_L: u32 = 0x100;
pub const TM0CNT_H: u32 = 0x102;
pub const TM3CNT_H: u32 = 0x10E;

// Audio
pub const SOUNDCNT_H: u32 = 0x82;
pub const SOUNDCNT_X: u32 = 0x84;
pub const FIFO_A_L: u32 = 0xA0;
pub const FIFO_A_H: u32 = 0xA2;
pub const FIFO_B_L: u32 = 0xA4;
pub const FIFO_B_H: u32 = 0xA6;

// DMA; each of the 4 channels is a 0xC-byte block.
pub const DMA_BASE: u32 = 0xB0;
pub const DMA_END: u32 = 0xDE;

// Serial
pub const SIOCNT: u32 = 0x128;
pub const RCNT: u32 = 0x134;
