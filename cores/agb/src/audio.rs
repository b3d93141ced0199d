// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::VecDeque;

use common::{
    numutil::{NumExt, U16Ext},
    Cycles,
};
use modular_bitfield::{bitfield, specifiers::*};

use crate::{
    addr::FIFO_A_L,
    hw::dma::Dmas,
    Agb,
};

/// Cycles between output samples (2^24 Hz clock, 2^15 Hz output).
pub const SAMPLE_INTERVAL: Cycles = 512;
/// A FIFO DMA refill moves 4 words.
const FIFO_REFILL_BYTES: usize = 16;

#[bitfield]
#[repr(u16)]
#[derive(Default, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SoundControl {
    cgb_vol: B2,
    a_vol: B1,
    b_vol: B1,
    #[skip]
    __: B4,
    pub a_right_en: bool,
    pub a_left_en: bool,
    pub a_timer: B1,
    #[skip]
    a_reset_fifo: bool,
    pub b_right_en: bool,
    pub b_left_en: bool,
    pub b_timer: B1,
    #[skip]
    b_reset_fifo: bool,
}

/// The DMA-audio half of the APU: two direct-sound FIFOs pumped by timer
/// overflows, mixed into an output buffer at a fixed rate. The PSG channels
/// are the audio collaborator's concern.
#[derive(Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Apu {
    pub cnt: SoundControl,
    /// Master enable from SOUNDCNT_X.
    pub enable: bool,

    buffers: [VecDeque<i8>; 2],
    current_samples: [i8; 2],
    /// Slack of the timer overflow that produced the current sample of each
    /// FIFO, kept for sample-phase accounting. Never positive.
    pub last_sample_slack: [Cycles; 2],

    /// Mixed output, interleaved stereo.
    pub buffer: Vec<f32>,
    next_sample: Cycles,
}

impl Apu {
    /// Advance the sample pump and report cycles until the next sample.
    pub fn process_events(gg: &mut Agb, cycles: Cycles) -> Cycles {
        let apu = &mut gg.apu;
        apu.next_sample -= cycles;
        if apu.next_sample <= 0 {
            apu.next_sample += SAMPLE_INTERVAL;
            apu.push_output();
        }
        apu.next_sample
    }

    /// The timer feeding this FIFO overflowed: advance to the next sample
    /// and request more data if the FIFO is running dry. `slack` is the
    /// overflow's sub-cycle offset, ≤ 0.
    pub fn sample_fifo<const CH: usize>(gg: &mut Agb, slack: Cycles) {
        if let Some(next) = gg.apu.buffers[CH].pop_front() {
            gg.apu.current_samples[CH] = next;
        }
        gg.apu.last_sample_slack[CH] = slack;

        if gg.apu.buffers[CH].len() <= FIFO_REFILL_BYTES {
            let dest = 0x0400_0000 | (FIFO_A_L + CH.u32() * 4);
            for dma in 1..=2 {
                if gg.dma.channels[dma].dad == dest {
                    Dmas::try_fifo_transfer(gg, dma);
                }
            }
        }
    }

    pub fn push_samples<const CH: usize>(&mut self, samples: u16) {
        self.buffers[CH].push_back(samples.low() as i8);
        self.buffers[CH].push_back(samples.high() as i8);
    }

    pub fn push_sample<const CH: usize>(&mut self, sample: u8) {
        self.buffers[CH].push_back(sample as i8);
    }

    pub fn clear_fifo(&mut self, channel: usize) {
        self.buffers[channel].clear();
        self.current_samples[channel] = 0;
    }

    pub fn fifo_len(&self, channel: usize) -> usize {
        self.buffers[channel].len()
    }

    pub fn current_sample(&self, channel: usize) -> i8 {
        self.current_samples[channel]
    }

    fn push_output(&mut self) {
        if !self.enable {
            self.buffer.push(0.);
            self.buffer.push(0.);
            return;
        }

        let cnt = self.cnt;
        let a = self.current_samples[0] as i16 * (1 + cnt.a_vol() as i16) * 2;
        let b = self.current_samples[1] as i16 * (1 + cnt.b_vol() as i16) * 2;

        let mut left = 0;
        let mut right = 0;
        if cnt.a_right_en() {
            right += a;
        }
        if cnt.a_left_en() {
            left += a;
        }
        if cnt.b_right_en() {
            right += b;
        }
        if cnt.b_left_en() {
            left += b;
        }

        self.buffer.push(right as f32 / 1024.0);
        self.buffer.push(left as f32 / 1024.0);
    }
}

#[cfg(test)]
mod tests {
    use arm7tdmi::Cpu;

    use super::*;
    use crate::{addr, Agb};

    #[test]
    fn sample_pump_outputs_silence_while_disabled() {
        let mut gg = Agb::new();
        Cpu::consume_cycles(&mut *gg, SAMPLE_INTERVAL * 4);

        assert_eq!(gg.apu.buffer.len(), 8);
        assert!(gg.apu.buffer.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn fifo_reset_bits_clear_the_fifos() {
        let mut gg = Agb::new();
        gg.io_write16(addr::FIFO_A_L, 0x1234);
        gg.io_write16(addr::FIFO_B_L, 0x1234);
        assert_eq!(gg.apu.fifo_len(0), 2);
        assert_eq!(gg.apu.fifo_len(1), 2);

        gg.io_write16(addr::SOUNDCNT_H, (1 << 11) | (1 << 15));
        assert_eq!(gg.apu.fifo_len(0), 0);
        assert_eq!(gg.apu.fifo_len(1), 0);
    }

    #[test]
    fn routed_sample_reaches_the_output_mix() {
        let mut gg = Agb::new();
        gg.io_write16(addr::SOUNDCNT_X, 0x80);
        // Channel A on both sides, fed by timer 0.
        gg.io_write16(addr::SOUNDCNT_H, 0x0300);
        gg.io_write16(addr::FIFO_A_L, 0x7F7F);

        gg.io_write16(addr::TM0CNT_L, 0xFFFF);
        gg.io_write16(addr::TM0CNT_H, 0x80);
        Cpu::consume_cycles(&mut *gg, 1);
        Cpu::consume_cycles(&mut *gg, SAMPLE_INTERVAL);

        assert_eq!(gg.apu.current_sample(0), 0x7F);
        let last = *gg.apu.buffer.last().unwrap();
        assert!(last > 0.0);
    }
}
