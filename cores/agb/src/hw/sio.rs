// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use arm7tdmi::Interrupt;
use common::{numutil::NumExt, Cycles, NO_EVENT};

use crate::{
    log::{self, LogLevel},
    Agb,
};

/// Cycles for one normal-mode transfer at the 256 KHz internal clock.
const TRANSFER_CYCLES: Cycles = 512;

/// Serial I/O. With no link cable attached, a transfer started on the
/// internal clock completes against an open line after the usual delay;
/// everything else is quiet.
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Sio {
    pub rcnt: u16,
    pub siocnt: u16,
    /// Countdown to the end of a running transfer, [NO_EVENT] when idle.
    next_event: Cycles,
}

impl Sio {
    /// Advance a running transfer and report cycles until it completes.
    pub fn process_events(gg: &mut Agb, cycles: Cycles) -> Cycles {
        if gg.sio.next_event == NO_EVENT {
            return NO_EVENT;
        }
        gg.sio.next_event -= cycles;
        if gg.sio.next_event <= 0 {
            gg.sio.next_event = NO_EVENT;
            // Transfer done: clear the start bit, flag the open line.
            gg.sio.siocnt = gg.sio.siocnt.set_bit(7, false);
            if gg.sio.siocnt.is_bit(14) {
                gg.raise_irq(Interrupt::Serial);
            }
            return NO_EVENT;
        }
        gg.sio.next_event
    }

    pub fn cnt_write(gg: &mut Agb, value: u16) {
        gg.sio.siocnt = value;
        if gg.sio.rcnt.is_bit(15) {
            // RCNT has switched the port out of SIOCNT's control.
            log::emit(
                Some(&gg.log),
                LogLevel::STUB,
                "General-purpose serial modes not implemented",
            );
            return;
        }
        // Normal mode, internal clock, start bit: begin shifting.
        if value.is_bit(7) && value.is_bit(0) {
            gg.sio.next_event = gg.cpu.cycles + TRANSFER_CYCLES;
            if gg.sio.next_event < gg.cpu.next_event {
                gg.cpu.next_event = gg.sio.next_event;
            }
        }
    }
}

impl Default for Sio {
    fn default() -> Self {
        Self {
            rcnt: 0x8000,
            siocnt: 0,
            next_event: NO_EVENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use arm7tdmi::Cpu;

    use super::*;
    use crate::addr;

    #[test]
    fn transfer_completes_and_raises_serial_irq() {
        let mut gg = Agb::new();
        gg.io_write16(addr::IME, 1);
        gg.io_write16(addr::IE, 1 << Interrupt::Serial as u16);
        gg.io_write16(addr::RCNT, 0);
        // Start bit + IRQ enable + internal clock.
        gg.io_write16(addr::SIOCNT, (1 << 7) | (1 << 14) | 1);

        Cpu::consume_cycles(&mut *gg, TRANSFER_CYCLES);
        assert!(!gg.sio.siocnt.is_bit(7));
        assert!(gg.memory.io16(addr::IF).is_bit(Interrupt::Serial as u16));
        assert!(gg.cpu.irq_line);
    }

    #[test]
    fn general_purpose_mode_logs_a_stub() {
        let mut gg = Agb::new();
        gg.log.set_level(LogLevel::STUB);
        gg.io_write16(addr::RCNT, 0x8000);
        gg.io_write16(addr::SIOCNT, 1 << 7);

        let events = gg.log.take_events();
        assert!(events.iter().any(|e| e.level == LogLevel::STUB));
    }
}
