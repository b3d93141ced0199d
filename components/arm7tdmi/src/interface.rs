// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use crate::Cpu;

/// Interface of a system driven by an ARM7TDMI.
/// This is the handler table the machine fills in when it is bound to the
/// CPU; the interpreter calls back through it and never knows the concrete
/// system it is driving.
pub trait ArmSystem: Sized {
    /// Get the CPU.
    fn cpur(&self) -> &Cpu;
    /// Get the CPU, mutably.
    fn cpu(&mut self) -> &mut Cpu;

    /// Distribute the cycles the CPU consumed since the last call to all
    /// peripherals, and set a new budget in `cpu().next_event`.
    /// Called whenever `cpu().cycles >= cpu().next_event`.
    fn process_events(&mut self);
    /// The interpreter is reading CPSR; gives the system a chance to
    /// re-assert a pending interrupt.
    fn read_cpsr(&mut self);

    /// A software interrupt from THUMB state.
    fn swi16(&mut self, comment: u8);
    /// A software interrupt from ARM state.
    fn swi32(&mut self, comment: u32);
    /// The interpreter hit a known-but-unimplemented opcode.
    fn hit_stub(&mut self, opcode: u32);
    /// The interpreter hit an invalid opcode.
    fn hit_illegal(&mut self, opcode: u32);

    /// Power-on/reset: establish banked stack pointers and the boot mode.
    fn reset(&mut self);
    /// The active memory region changed under the given PC; re-resolve any
    /// cached mapping.
    fn set_active_region(&mut self, pc: u32);
}
