// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use common::numutil::{NumExt, U16Ext, U32Ext};

use crate::{
    addr::*,
    hw::{dma::Dmas, sio::Sio, timer::Timers},
    log::LogLevel,
    ppu::DisplayStatus,
    Agb,
};

/// Bits of DISPSTAT a game can write; the flag bits are hardware-owned.
const DISPSTAT_MASK: u16 = 0xFF38;

impl Agb {
    /// Read an I/O register. Registers whose value is tracked inside a
    /// subsystem are materialized here; everything else comes from the
    /// register bank.
    pub fn io_read16(&mut self, addr: u32) -> u16 {
        let addr = addr & 0x3FF;
        match addr {
            DISPSTAT => self.ppu.dispstat.into(),
            VCOUNT => self.ppu.vcount,

            KEYINPUT => match &mut self.keys {
                Some(source) => source.keys(),
                None => 0x03FF,
            },

            // The counter of a running timer only exists on demand.
            TM0CNT_L..=TM3CNT_H => {
                let timer = ((addr - TM0CNT_L) >> 2).us();
                if addr & 2 == 0 {
                    Timers::update_register(self, timer);
                    self.memory.io16(addr)
                } else {
                    self.timers.timers[timer].ctrl.into()
                }
            }

            SOUNDCNT_H => u16::from(self.apu.cnt) & 0x770F,
            SOUNDCNT_X => (self.apu.enable as u16) << 7,

            // DMA word counts read zero; only control reads back.
            DMA_BASE..=DMA_END => {
                let channel = ((addr - DMA_BASE) / 0xC).us();
                match (addr - DMA_BASE) % 0xC {
                    0xA => self.dma.channels[channel].ctrl.into(),
                    _ => 0,
                }
            }

            SIOCNT => self.sio.siocnt,
            RCNT => self.sio.rcnt,

            _ => self.memory.io16(addr),
        }
    }

    /// Write an I/O register, fanning out to the owning subsystem.
    pub fn io_write16(&mut self, addr: u32, value: u16) {
        let addr = addr & 0x3FF;
        match addr {
            IE => {
                self.memory.set_io16(IE, value);
                self.write_ie(value);
            }
            // Writing IF acknowledges the written bits.
            IF => {
                let current = self.memory.io16(IF);
                self.memory.set_io16(IF, current & !value);
            }
            IME => {
                self.memory.set_io16(IME, value);
                self.write_ime(value);
            }

            DISPSTAT => {
                let current: u16 = self.ppu.dispstat.into();
                self.ppu.dispstat =
                    DisplayStatus::from((current & !DISPSTAT_MASK) | (value & DISPSTAT_MASK));
            }

            TM0CNT_L..=TM3CNT_H => {
                let timer = ((addr - TM0CNT_L) >> 2).us();
                if addr & 2 == 0 {
                    self.timers.lo_write(timer, value);
                } else {
                    Timers::hi_write(self, timer, value);
                }
            }

            SOUNDCNT_H => {
                if value.is_bit(11) {
                    self.apu.clear_fifo(0);
                }
                if value.is_bit(15) {
                    self.apu.clear_fifo(1);
                }
                self.apu.cnt = value.into();
            }
            SOUNDCNT_X => self.apu.enable = value.is_bit(7),
            FIFO_A_L | FIFO_A_H => self.apu.push_samples::<0>(value),
            FIFO_B_L | FIFO_B_H => self.apu.push_samples::<1>(value),

            DMA_BASE..=DMA_END => {
                let channel = ((addr - DMA_BASE) / 0xC).us();
                match (addr - DMA_BASE) % 0xC {
                    0x0 => {
                        let sad = self.dma.channels[channel].sad;
                        self.dma.channels[channel].sad = sad.set_low(value);
                    }
                    0x2 => {
                        let sad = self.dma.channels[channel].sad;
                        self.dma.channels[channel].sad = sad.set_high(value);
                    }
                    0x4 => {
                        let dad = self.dma.channels[channel].dad;
                        self.dma.channels[channel].dad = dad.set_low(value);
                    }
                    0x6 => {
                        let dad = self.dma.channels[channel].dad;
                        self.dma.channels[channel].dad = dad.set_high(value);
                    }
                    0x8 => self.dma.channels[channel].count = value,
                    _ => Dmas::ctrl_write(self, channel, value),
                }
            }

            SIOCNT => Sio::cnt_write(self, value),
            RCNT => self.sio.rcnt = value,

            POSTFLG => {
                self.memory.set_io16(POSTFLG, value.set_high(0));
                self.haltcnt_write(value.high());
            }

            _ => {
                self.log.log(
                    LogLevel::DEBUG,
                    format!("Write to unhandled I/O register 0x{addr:03X}"),
                );
                self.memory.set_io16(addr, value);
            }
        }
    }

    /// Byte write; only registers with byte-granular behavior are routed,
    /// the rest read-modify-write their halfword.
    pub fn io_write8(&mut self, addr: u32, value: u8) {
        let addr = addr & 0x3FF;
        match addr {
            HALTCNT => self.haltcnt_write(value),
            POSTFLG => {
                let current = self.memory.io16(POSTFLG);
                self.memory.set_io16(POSTFLG, current.set_low(value));
            }
            0xA0..=0xA3 => self.apu.push_sample::<0>(value),
            0xA4..=0xA7 => self.apu.push_sample::<1>(value),
            _ => {
                let current = self.io_read16(addr & !1);
                let new = if addr.is_bit(0) {
                    current.set_high(value)
                } else {
                    current.set_low(value)
                };
                self.io_write16(addr & !1, new);
            }
        }
    }

    fn haltcnt_write(&mut self, value: u8) {
        if value.is_bit(7) {
            self.log.log(LogLevel::STUB, "Stop mode not implemented");
        } else {
            self.halt();
        }
    }
}
