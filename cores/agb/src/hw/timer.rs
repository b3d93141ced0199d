// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use arm7tdmi::Interrupt;
use common::{numutil::NumExt, Cycles, NO_EVENT};
use modular_bitfield::{bitfield, specifiers::*};

use crate::{addr::TM0CNT_L, audio::Apu, Agb};

#[bitfield]
#[repr(u16)]
#[derive(Default, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TimerCtrl {
    pub prescaler: B2,
    pub count_up: bool,
    #[skip]
    __: B3,
    pub irq_en: bool,
    pub enable: bool,
    #[skip]
    __: B8,
}

impl TimerCtrl {
    /// Shift selected by the prescaler bits.
    pub fn prescale_bits(self) -> u32 {
        [0, 6, 8, 10][self.prescaler().us()]
    }
}

/// One hardware timer. A running non-cascading timer keeps a countdown to
/// its next overflow; its visible counter register is materialized lazily
/// from `old_reload` and the elapsed cycles.
#[derive(Default, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Timer {
    pub reload: u16,
    pub ctrl: TimerCtrl,
    /// The reload value latched at the last overflow; base of the visible
    /// counter calculation.
    old_reload: u16,
    /// Cycles between overflows at the current reload and prescale.
    overflow_interval: Cycles,
    /// Countdown to the next overflow. [NO_EVENT] while cascading.
    next_event: Cycles,
    /// Time of the most recent overflow; zero or negative.
    last_event: Cycles,
}

impl Timer {
    pub fn next_event(&self) -> Cycles {
        self.next_event
    }
}

/// The four timers of the console.
#[derive(Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Timers {
    pub timers: [Timer; 4],
    /// Mirror of the enable bits, one per timer, for fast sweep skipping.
    pub enabled: u8,
}

impl Timers {
    /// Distribute elapsed cycles to all running timers, handling overflows,
    /// and report cycles until the earliest next overflow.
    pub fn process_events(gg: &mut Agb, cycles: Cycles) -> Cycles {
        let mut next_event = NO_EVENT;
        if gg.timers.enabled == 0 {
            return next_event;
        }

        for idx in 0..4 {
            if !gg.timers.timers[idx].ctrl.enable() {
                continue;
            }
            {
                let timer = &mut gg.timers.timers[idx];
                timer.next_event -= cycles;
                timer.last_event -= cycles;
            }
            if gg.timers.timers[idx].next_event <= 0 {
                Self::overflow(gg, idx);
            }
            next_event = next_event.min(gg.timers.timers[idx].next_event);
        }
        next_event
    }

    fn overflow(gg: &mut Agb, idx: usize) {
        let (reload, slack, do_irq, count_up);
        {
            let timer = &mut gg.timers.timers[idx];
            // Carry the slack so the next overflow stays on the grid.
            timer.last_event = timer.next_event;
            timer.next_event += timer.overflow_interval;
            timer.old_reload = timer.reload;
            reload = timer.reload;
            slack = timer.last_event;
            do_irq = timer.ctrl.irq_en();
            count_up = timer.ctrl.count_up();
        }
        gg.memory.set_io16(counter_addr(idx), reload);

        if do_irq {
            gg.raise_irq_with_index(Interrupt::Timer0 as u16 + idx.u16());
        }

        if idx < 2 && gg.apu.enable {
            let cnt = gg.apu.cnt;
            if (cnt.a_left_en() || cnt.a_right_en()) && cnt.a_timer().us() == idx {
                Apu::sample_fifo::<0>(gg, slack);
            }
            if (cnt.b_left_en() || cnt.b_right_en()) && cnt.b_timer().us() == idx {
                Apu::sample_fifo::<1>(gg, slack);
            }
        }

        if idx < 3 && gg.timers.timers[idx + 1].ctrl.count_up() {
            // The next timer counts our overflows instead of cycles.
            let addr = counter_addr(idx + 1);
            let value = gg.memory.io16(addr).wrapping_add(1);
            gg.memory.set_io16(addr, value);
            if value == 0 {
                gg.timers.timers[idx + 1].next_event = 0;
            }
        }

        if idx > 0 && count_up {
            // Cascade-fired; not cycle-driven until the next upstream wrap.
            gg.timers.timers[idx].next_event = NO_EVENT;
        }
    }

    /// Reload write. Takes effect at the next overflow or enable.
    pub fn lo_write(&mut self, idx: usize, reload: u16) {
        self.timers[idx].reload = reload;
    }

    /// Control write: freeze the visible counter, re-derive the overflow
    /// interval, and (re)schedule according to the enable transition.
    pub fn hi_write(gg: &mut Agb, idx: usize, control: u16) {
        Self::update_register(gg, idx);

        let cpu_cycles = gg.cpu.cycles;
        let timer = &mut gg.timers.timers[idx];
        let old_ctrl = timer.ctrl;
        let old_prescale = old_ctrl.prescale_bits();
        let new_ctrl = TimerCtrl::from(control);
        timer.ctrl = new_ctrl;
        timer.overflow_interval =
            (0x1_0000 - timer.reload as Cycles) << new_ctrl.prescale_bits();

        if !old_ctrl.enable() && new_ctrl.enable() {
            if !new_ctrl.count_up() {
                timer.next_event = cpu_cycles + timer.overflow_interval;
            } else {
                timer.next_event = NO_EVENT;
            }
            let reload = timer.reload;
            timer.old_reload = reload;
            timer.last_event = 0;
            gg.timers.enabled |= 1 << idx;
            gg.memory.set_io16(counter_addr(idx), reload);
        } else if old_ctrl.enable() && !new_ctrl.enable() {
            if !new_ctrl.count_up() {
                let value = timer
                    .old_reload
                    .wrapping_add(((cpu_cycles - timer.last_event) >> old_prescale) as u16);
                gg.memory.set_io16(counter_addr(idx), value);
            }
            gg.timers.enabled &= !(1 << idx);
        } else if new_ctrl.prescale_bits() != old_prescale && !new_ctrl.count_up() {
            // May land in the past; the next sweep then treats it as an
            // immediate overflow.
            timer.next_event = timer.last_event + timer.overflow_interval;
        }

        if gg.timers.timers[idx].next_event < gg.cpu.next_event {
            gg.cpu.next_event = gg.timers.timers[idx].next_event;
        }
    }

    /// Refresh the visible counter register of a running timer.
    pub fn update_register(gg: &mut Agb, idx: usize) {
        let timer = &gg.timers.timers[idx];
        if timer.ctrl.enable() && !timer.ctrl.count_up() {
            let value = timer.old_reload.wrapping_add(
                ((gg.cpu.cycles - timer.last_event) >> timer.ctrl.prescale_bits()) as u16,
            );
            gg.memory.set_io16(counter_addr(idx), value);
        }
    }
}

fn counter_addr(idx: usize) -> u32 {
    TM0CNT_L + (idx.u32() << 2)
}

#[cfg(test)]
mod tests {
    use arm7tdmi::Cpu;

    use super::*;
    use crate::{addr, Agb};

    const TM1CNT_L: u32 = addr::TM0CNT_L + 4;
    const TM1CNT_H: u32 = addr::TM0CNT_H + 4;

    #[test]
    fn timer0_overflow_raises_timer0_irq() {
        let mut gg = Agb::new();
        gg.io_write16(addr::IME, 1);
        gg.io_write16(addr::IE, 1 << Interrupt::Timer0 as u16);
        gg.io_write16(addr::TM0CNT_L, 0xFFFF);
        gg.io_write16(addr::TM0CNT_H, 0xC0);

        Cpu::consume_cycles(&mut *gg, 1);

        assert!(gg.memory.io16(addr::IF).is_bit(Interrupt::Timer0 as u16));
        assert!(gg.cpu.irq_line);
        assert_eq!(gg.memory.io16(addr::TM0CNT_L), 0xFFFF);
        assert_eq!(gg.timers.timers[0].next_event(), 1);
        assert_eq!(gg.cpu.next_event, 1);
    }

    #[test]
    fn counter_read_back_equals_reload_then_elapsed() {
        let mut gg = Agb::new();
        gg.io_write16(addr::TM0CNT_L, 0x8000);
        // Prescaler 01 = 64 cycles per tick.
        gg.io_write16(addr::TM0CNT_H, 0x81);
        assert_eq!(gg.io_read16(addr::TM0CNT_L), 0x8000);

        Cpu::consume_cycles(&mut *gg, 640);
        assert_eq!(gg.io_read16(addr::TM0CNT_L), 0x8000 + 10);
    }

    #[test]
    fn round_trip_overflow_relatches_reload() {
        let mut gg = Agb::new();
        gg.io_write16(addr::IME, 1);
        gg.io_write16(addr::IE, 1 << Interrupt::Timer0 as u16);
        gg.io_write16(addr::TM0CNT_L, 0xF000);
        gg.io_write16(addr::TM0CNT_H, 0xC1);
        assert_eq!(gg.io_read16(addr::TM0CNT_L), 0xF000);

        Cpu::consume_cycles(&mut *gg, (0x1_0000 - 0xF000) << 6);
        assert!(gg.memory.io16(addr::IF).is_bit(Interrupt::Timer0 as u16));
        assert_eq!(gg.io_read16(addr::TM0CNT_L), 0xF000);
    }

    #[test]
    fn overflow_without_irq_enable_stays_silent() {
        let mut gg = Agb::new();
        gg.io_write16(addr::IME, 1);
        gg.io_write16(addr::IE, 1 << Interrupt::Timer0 as u16);
        gg.io_write16(addr::TM0CNT_L, 0xFFFF);
        gg.io_write16(addr::TM0CNT_H, 0x80);

        Cpu::consume_cycles(&mut *gg, 1);
        assert!(!gg.memory.io16(addr::IF).is_bit(Interrupt::Timer0 as u16));
    }

    #[test]
    fn cascade_increments_and_wraps_the_next_timer() {
        let mut gg = Agb::new();
        gg.io_write16(addr::IME, 1);
        gg.io_write16(addr::IE, 1 << Interrupt::Timer1 as u16);
        gg.io_write16(TM1CNT_L, 0x0000);
        // Count-up, IRQ on overflow, enabled.
        gg.io_write16(TM1CNT_H, 0xC4);
        gg.io_write16(addr::TM0CNT_L, 0xFFFE);
        gg.io_write16(addr::TM0CNT_H, 0x80);

        Cpu::consume_cycles(&mut *gg, 2);
        assert_eq!(gg.memory.io16(TM1CNT_L), 1);
        assert!(!gg.memory.io16(addr::IF).is_bit(Interrupt::Timer1 as u16));

        // 0xFFFF further overflows wrap timer 1 through 0 exactly once.
        Cpu::consume_cycles(&mut *gg, 0x1FFFE);
        assert!(gg.memory.io16(addr::IF).is_bit(Interrupt::Timer1 as u16));
        assert_eq!(gg.memory.io16(TM1CNT_L), 0);
        assert_eq!(gg.timers.timers[1].next_event(), NO_EVENT);
    }

    #[test]
    fn overflow_pumps_the_routed_audio_fifo() {
        let mut gg = Agb::new();
        gg.io_write16(addr::SOUNDCNT_X, 0x80);
        // Channel A right on, fed by timer 0.
        gg.io_write16(addr::SOUNDCNT_H, 0x0100);
        for _ in 0..4 {
            gg.io_write16(addr::FIFO_A_L, 0x0201);
        }
        let before = gg.apu.fifo_len(0);

        gg.io_write16(addr::TM0CNT_L, 0xFC00);
        // Prescaler 10 = 256 cycles per tick.
        gg.io_write16(addr::TM0CNT_H, 0x82);
        Cpu::consume_cycles(&mut *gg, 0x400 << 8);

        assert_eq!(gg.apu.fifo_len(0), before - 1);
        assert_eq!(gg.apu.current_sample(0), 1);
        assert!(gg.apu.last_sample_slack[0] <= 0);
    }

    #[test]
    fn enabled_mask_mirrors_control_bits() {
        let mut gg = Agb::new();
        gg.io_write16(addr::TM0CNT_H, 0x80);
        gg.io_write16(addr::TM0CNT_H + 8, 0x80);
        for (idx, timer) in gg.timers.timers.iter().enumerate() {
            assert_eq!(gg.timers.enabled.is_bit(idx as u16), timer.ctrl.enable());
        }

        gg.io_write16(addr::TM0CNT_H, 0x00);
        assert_eq!(gg.timers.enabled, 0b100);
        for (idx, timer) in gg.timers.timers.iter().enumerate() {
            assert_eq!(gg.timers.enabled.is_bit(idx as u16), timer.ctrl.enable());
        }
    }

    #[test]
    fn disabling_materializes_the_final_counter() {
        let mut gg = Agb::new();
        gg.io_write16(addr::TM0CNT_L, 0);
        gg.io_write16(addr::TM0CNT_H, 0x80);
        Cpu::consume_cycles(&mut *gg, 100);

        gg.io_write16(addr::TM0CNT_H, 0x00);
        assert_eq!(gg.memory.io16(addr::TM0CNT_L), 100);
    }

    #[test]
    fn prescale_change_in_the_past_overflows_on_next_sweep() {
        let mut gg = Agb::new();
        gg.io_write16(addr::TM0CNT_L, 0);
        // Prescaler 11 = 1024 cycles per tick.
        gg.io_write16(addr::TM0CNT_H, 0x83);
        Cpu::consume_cycles(&mut *gg, 0x10_0000);

        // Dropping to prescaler 00 places the next overflow in the past.
        gg.io_write16(addr::TM0CNT_H, 0x80);
        assert!(gg.cpu.next_event <= 0);
        Cpu::consume_cycles(&mut *gg, 0);

        assert_eq!(gg.memory.io16(addr::TM0CNT_L), 0);
        assert!(gg.timers.timers[0].next_event() > 0);
    }
}
