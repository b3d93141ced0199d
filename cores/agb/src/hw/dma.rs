// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use arm7tdmi::Interrupt;
use arrayvec::ArrayVec;
use common::{numutil::NumExt, Cycles, NO_EVENT};
use modular_bitfield::{bitfield, specifiers::*, BitfieldSpecifier};

use crate::Agb;

const SRC_MASK: [u32; 4] = [0x7FF_FFFF, 0xFFF_FFFF, 0xFFF_FFFF, 0xFFF_FFFF];
const DST_MASK: [u32; 4] = [0x7FF_FFFF, 0x7FF_FFFF, 0x7FF_FFFF, 0xFFF_FFFF];

#[bitfield]
#[repr(u16)]
#[derive(Default, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DmaControl {
    #[skip]
    __: B5,
    pub dest_addr: AddrControl,
    pub src_addr: AddrControl,
    pub repeat_en: bool,
    pub is_32bit: bool,
    #[skip]
    __: B1,
    pub timing: Timing,
    pub irq_en: bool,
    pub dma_en: bool,
}

#[derive(BitfieldSpecifier, Debug, Copy, Clone, PartialEq)]
#[bits = 2]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AddrControl {
    Increment = 0,
    Decrement = 1,
    Fixed = 2,
    IncReload = 3,
}

#[derive(BitfieldSpecifier, Debug, Copy, Clone, PartialEq)]
#[bits = 2]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Timing {
    Now = 0,
    VBlank = 1,
    HBlank = 2,
    Special = 3,
}

#[derive(Default, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Dma {
    pub sad: u32,
    pub dad: u32,
    pub count: u16,
    pub ctrl: DmaControl,

    /// Internal source register
    src: u32,
    /// Internal destination register
    dst: u32,
}

/// The 4 DMA channels. Triggers (control writes, PPU blanking, FIFO demand)
/// only mark channels pending; the transfers run in the dispatcher's DMA
/// slot, after video and audio had their turn.
#[derive(Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Dmas {
    pub channels: [Dma; 4],
    #[cfg_attr(feature = "serde", serde(skip, default))]
    pending: ArrayVec<(u16, Reason), 8>,
}

impl Dmas {
    /// Run all pending transfers, highest-priority channel first.
    pub fn run_dmas(gg: &mut Agb, _cycles: Cycles) -> Cycles {
        while !gg.dma.pending.is_empty() {
            let mut batch: ArrayVec<(u16, Reason), 8> = gg.dma.pending.take();
            batch.sort_unstable_by_key(|(idx, _)| *idx);
            for (idx, reason) in batch {
                Self::step_dma(gg, idx.us(), reason);
            }
        }
        NO_EVENT
    }

    /// Mark every channel waiting on the given trigger as pending.
    pub fn update_all(gg: &mut Agb, reason: Reason) {
        for idx in 0..4 {
            let ctrl = gg.dma.channels[idx].ctrl;
            let wanted = match reason {
                Reason::VBlank => Timing::VBlank,
                Reason::HBlank => Timing::HBlank,
                _ => continue,
            };
            if ctrl.dma_en() && ctrl.timing() == wanted {
                gg.dma.pending.try_push((idx.u16(), reason)).ok();
            }
        }
    }

    /// Update a channel after its control register was written.
    pub fn ctrl_write(gg: &mut Agb, idx: usize, value: u16) {
        let channel = &mut gg.dma.channels[idx];
        let old_ctrl = channel.ctrl;
        let new_ctrl = DmaControl::from(value);

        if !old_ctrl.dma_en() && new_ctrl.dma_en() {
            // Reload the internal registers on enable.
            channel.src = channel.sad & SRC_MASK[idx];
            channel.dst = channel.dad & DST_MASK[idx];
        }
        channel.ctrl = new_ctrl;

        if new_ctrl.dma_en() && new_ctrl.timing() == Timing::Now {
            gg.dma.pending.try_push((idx.u16(), Reason::CtrlWrite)).ok();
            gg.cpu.next_event = 0;
        }
    }

    /// A FIFO drained below its refill mark; run the matching special
    /// transfer in this sweep.
    pub fn try_fifo_transfer(gg: &mut Agb, idx: usize) {
        let ctrl = gg.dma.channels[idx].ctrl;
        if ctrl.dma_en() && ctrl.timing() == Timing::Special {
            gg.dma.pending.try_push((idx.u16(), Reason::Fifo)).ok();
        }
    }

    fn step_dma(gg: &mut Agb, idx: usize, reason: Reason) {
        let mut channel = gg.dma.channels[idx];
        let ctrl = channel.ctrl;
        if !ctrl.dma_en() {
            return;
        }

        let is_fifo = reason == Reason::Fifo && (idx == 1 || idx == 2);
        let count = match channel.count {
            _ if is_fifo => 4,
            0 if idx == 3 => 0x1_0000,
            0 => 0x4000,
            count => count.u32(),
        };

        let width: u32 = if is_fifo || ctrl.is_32bit() { 4 } else { 2 };
        let src_step = step(ctrl.src_addr()).wrapping_mul(width);
        let dst_step = if is_fifo {
            0
        } else {
            if ctrl.dest_addr() == AddrControl::IncReload {
                channel.dst = channel.dad & DST_MASK[idx];
            }
            step(ctrl.dest_addr()).wrapping_mul(width)
        };

        for _ in 0..count {
            if width == 4 {
                let value = gg.bus_read32(channel.src);
                gg.bus_write32(channel.dst, value);
            } else {
                let value = gg.bus_read16(channel.src);
                gg.bus_write16(channel.dst, value);
            }
            channel.src = channel.src.wrapping_add(src_step);
            channel.dst = channel.dst.wrapping_add(dst_step);
        }

        if !ctrl.repeat_en() || ctrl.timing() == Timing::Now {
            channel.ctrl.set_dma_en(false);
        }
        gg.dma.channels[idx] = channel;

        if ctrl.irq_en() {
            gg.raise_irq_with_index(Interrupt::Dma0 as u16 + idx.u16());
        }
    }
}

fn step(control: AddrControl) -> u32 {
    match control {
        AddrControl::Increment | AddrControl::IncReload => 1,
        AddrControl::Decrement => 1u32.wrapping_neg(),
        AddrControl::Fixed => 0,
    }
}

/// Reason a transfer attempt was initiated.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Reason {
    /// The control register was written.
    CtrlWrite,
    /// The PPU entered HBlank.
    HBlank,
    /// The PPU entered VBlank.
    VBlank,
    /// A FIFO sound channel is requesting new samples.
    Fifo,
}

#[cfg(test)]
mod tests {
    use arm7tdmi::Cpu;

    use super::*;
    use crate::{addr, Agb};

    // Channel 3 register block.
    const DMA3SAD_L: u32 = 0xD4;
    const DMA3CNT_L: u32 = 0xDC;
    const DMA3CNT_H: u32 = 0xDE;
    // Channel 1 register block.
    const DMA1SAD_L: u32 = 0xBC;
    const DMA1DAD_L: u32 = 0xC0;
    const DMA1DAD_H: u32 = 0xC2;
    const DMA1CNT_H: u32 = 0xC6;

    #[test]
    fn immediate_dma_runs_once_and_raises_its_irq() {
        let mut gg = Agb::new();
        gg.io_write16(addr::IME, 1);
        gg.io_write16(addr::IE, 1 << Interrupt::Dma3 as u16);

        gg.io_write16(DMA3SAD_L, 0x0000);
        gg.io_write16(DMA3CNT_L, 4);
        // Enable + IRQ, immediate timing.
        gg.io_write16(DMA3CNT_H, 0xC000);
        assert_eq!(gg.cpu.next_event, 0);

        Cpu::consume_cycles(&mut *gg, 0);
        assert!(gg.memory.io16(addr::IF).is_bit(Interrupt::Dma3 as u16));
        assert!(!gg.dma.channels[3].ctrl.dma_en());
    }

    #[test]
    fn fifo_dma_refills_the_draining_fifo() {
        let mut gg = Agb::new();
        let mut rom = vec![0; 0xC0];
        rom[0xAC..0xB0].copy_from_slice(b"ZZZE");
        gg.load_rom(rom, None);

        gg.io_write16(addr::SOUNDCNT_X, 0x80);
        // Channel A right on, fed by timer 0.
        gg.io_write16(addr::SOUNDCNT_H, 0x0100);
        for _ in 0..4 {
            gg.io_write16(addr::FIFO_A_L, 0x0201);
        }

        // DMA 1 in special timing, repeating, aimed at FIFO A.
        gg.io_write16(DMA1SAD_L, 0x0000);
        gg.io_write16(DMA1SAD_L + 2, 0x0800);
        gg.io_write16(DMA1DAD_L, 0x00A0);
        gg.io_write16(DMA1DAD_H, 0x0400);
        gg.io_write16(DMA1CNT_H, 0xB600);

        gg.io_write16(addr::TM0CNT_L, 0xFFFF);
        gg.io_write16(addr::TM0CNT_H, 0x80);
        Cpu::consume_cycles(&mut *gg, 1);

        // One byte consumed by the timer, 4 words delivered by the DMA.
        assert_eq!(gg.apu.fifo_len(0), 8 - 1 + 16);
        assert!(gg.dma.channels[1].ctrl.dma_en());
    }

    #[test]
    fn blanking_trigger_only_fires_matching_channels() {
        let mut gg = Agb::new();
        gg.io_write16(addr::IME, 1);
        gg.io_write16(
            addr::IE,
            (1 << Interrupt::Dma0 as u16) | (1 << Interrupt::Dma3 as u16),
        );

        // Channel 0 waits for HBlank, channel 3 for VBlank; both want IRQs.
        gg.io_write16(0xBA, 0xE000);
        gg.io_write16(DMA3CNT_H, 0xD000);

        Cpu::consume_cycles(&mut *gg, crate::ppu::HDRAW_LENGTH);
        let if_ = gg.memory.io16(addr::IF);
        assert!(if_.is_bit(Interrupt::Dma0 as u16));
        assert!(!if_.is_bit(Interrupt::Dma3 as u16));
    }
}
