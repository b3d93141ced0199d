// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! CPU-side state of an ARM7TDMI as seen by the systems it drives.
//! The instruction interpreter itself lives elsewhere; this crate only
//! models the cycle budget, the banked registers lifecycle code touches,
//! and the callback interface the interpreter drives systems through.

pub mod interface;
pub mod registers;

use common::Cycles;

use crate::{
    interface::ArmSystem,
    registers::{Mode, ModeReg},
};

/// Represents the CPU of the console - an ARM7TDMI.
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Cpu {
    pub gprs: [u32; 16],
    pub cpsr: u32,
    pub spsr: ModeReg,
    /// Banked copies of SP; the live value is `gprs[13]`.
    pub sp: ModeReg,

    /// Cycles consumed since the last event dispatch.
    pub cycles: Cycles,
    /// Budget of cycles to consume before the next dispatch.
    pub next_event: Cycles,
    /// Set while the CPU sleeps waiting for an interrupt.
    pub halted: bool,
    /// The IRQ line. Asserted by the system, cleared by the interpreter
    /// when it takes the exception.
    pub irq_line: bool,
}

impl Cpu {
    #[inline]
    pub fn pc(&self) -> u32 {
        self.gprs[15]
    }

    #[inline]
    pub fn sp(&self) -> u32 {
        self.gprs[13]
    }

    /// Get the current CPU mode.
    pub fn mode(&self) -> Mode {
        Mode::get(self.cpsr)
    }

    /// Switch the privilege mode, banking SP in and out.
    pub fn set_privilege_mode(&mut self, mode: Mode) {
        let old = self.mode();
        self.sp[old.bank()] = self.gprs[13];
        self.gprs[13] = self.sp[mode.bank()];
        self.cpsr = (self.cpsr & !0x1F) | mode.bits();
    }

    /// Assert the IRQ line. The interpreter takes the exception at its next
    /// boundary, provided CPSR has interrupts enabled.
    #[inline]
    pub fn raise_irq(&mut self) {
        self.irq_line = true;
    }

    /// Account cycles the interpreter consumed. Once the budget set by the
    /// system is exhausted, events are dispatched.
    pub fn consume_cycles<S: ArmSystem>(gg: &mut S, cycles: Cycles) {
        gg.cpu().cycles += cycles;
        if gg.cpur().cycles >= gg.cpur().next_event {
            gg.process_events();
        }
    }

    /// Read CPSR the way the interpreter does, giving the system its
    /// re-assert hook first.
    pub fn read_cpsr<S: ArmSystem>(gg: &mut S) -> u32 {
        gg.read_cpsr();
        gg.cpur().cpsr
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self {
            gprs: [0; 16],
            cpsr: 0xD3,
            spsr: ModeReg::default(),
            sp: ModeReg::default(),
            cycles: 0,
            next_event: 0,
            halted: false,
            irq_line: false,
        }
    }
}

/// Possible interrupts, in IE/IF bit order.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    HBlank,
    VCounter,
    Timer0,
    Timer1,
    Timer2,
    Timer3,
    Serial,
    Dma0,
    Dma1,
    Dma2,
    Dma3,
    Keypad,
    GamePak,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_bits_round_trip() {
        for mode in [
            Mode::User,
            Mode::Fiq,
            Mode::Irq,
            Mode::Supervisor,
            Mode::Abort,
            Mode::Undefined,
            Mode::System,
        ] {
            assert_eq!(Mode::get(mode.bits()), mode);
        }
    }

    #[test]
    fn privilege_mode_banks_sp() {
        let mut cpu = Cpu::default();
        cpu.set_privilege_mode(Mode::Irq);
        cpu.gprs[13] = 0x100;
        cpu.set_privilege_mode(Mode::Supervisor);
        cpu.gprs[13] = 0x200;
        cpu.set_privilege_mode(Mode::System);
        cpu.gprs[13] = 0x300;

        assert_eq!(cpu.mode(), Mode::System);
        assert_eq!(cpu.sp(), 0x300);
        cpu.set_privilege_mode(Mode::Irq);
        assert_eq!(cpu.sp(), 0x100);
        cpu.set_privilege_mode(Mode::Supervisor);
        assert_eq!(cpu.sp(), 0x200);
    }

    #[test]
    fn user_and_system_share_a_bank() {
        let mut cpu = Cpu::default();
        cpu.set_privilege_mode(Mode::System);
        cpu.gprs[13] = 0xCAFE;
        cpu.set_privilege_mode(Mode::User);
        assert_eq!(cpu.sp(), 0xCAFE);
    }
}
