// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Core of an AGB (GBA) emulator: the machine that owns the CPU, its
//! peripherals and the shared cycle clock, and interleaves their work.
//! The ARM interpreter, rendering, audio output and host I/O are
//! collaborators driving this core through the interfaces it exposes.

use arm7tdmi::{interface::ArmSystem, registers::Mode, Cpu, Interrupt};
use common::{
    components::debugger::{Debugger, EnterReason},
    numutil::NumExt,
    NO_EVENT,
};

use crate::{
    audio::Apu,
    hw::{
        cartridge::{Cartridge, Patch, SavedataType},
        dma::Dmas,
        gpio::{RotationSource, RumblePack, GPIO_REG_OFFSET},
        sio::Sio,
        timer::Timers,
    },
    log::{LogLevel, Logger},
    memory::{Memory, BIOS_CHECKSUM, DS_BIOS_CHECKSUM, KB, ROM_MAX_SIZE},
    ppu::Ppu,
};

pub mod addr;
pub mod audio;
pub mod hw;
mod io;
pub mod log;
pub mod memory;
pub mod ppu;

/// Clock of the ARM7TDMI, in Hz.
pub const CPU_CLOCK: u32 = 0x100_0000;

const SP_BASE_SYSTEM: u32 = 0x03FF_FF00;
const SP_BASE_IRQ: u32 = 0x03FF_FFA0;
const SP_BASE_SUPERVISOR: u32 = 0x03FF_FFE0;

/// Host-side source of the button state reflected in KEYINPUT.
/// Bits are active-low.
pub trait KeySource {
    fn keys(&mut self) -> u16;
}

/// Console struct representing an AGB. Contains all state and is used for
/// system emulation.
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Agb {
    pub cpu: Cpu,
    pub memory: Memory,
    pub ppu: Ppu,
    pub apu: Apu,
    pub dma: Dmas,
    pub timers: Timers,
    pub cart: Cartridge,
    pub sio: Sio,

    /// Latched request to re-raise the IRQ line on the next sweep.
    spring_irq: bool,
    pub bios_checksum: u32,
    /// Name of the loaded ROM file, if the host gave one.
    pub active_file: Option<String>,

    #[cfg_attr(feature = "serde", serde(skip, default))]
    pub debugger: Option<Debugger>,
    #[cfg_attr(feature = "serde", serde(skip, default))]
    pub log: Logger,
    #[cfg_attr(feature = "serde", serde(skip, default))]
    pub keys: Option<Box<dyn KeySource + Send>>,
    #[cfg_attr(feature = "serde", serde(skip, default))]
    pub rotation: Option<Box<dyn RotationSource + Send>>,
    #[cfg_attr(feature = "serde", serde(skip, default))]
    pub rumble: Option<Box<dyn RumblePack + Send>>,
}

impl ArmSystem for Agb {
    fn cpur(&self) -> &Cpu {
        &self.cpu
    }

    fn cpu(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// One or more dispatcher sweeps: hand the consumed cycles to every
    /// subsystem in a fixed order and set the CPU's next budget to the
    /// earliest predicted event.
    fn process_events(&mut self) {
        loop {
            let cycles = self.cpu.cycles;
            let mut next_event = NO_EVENT;

            if self.spring_irq {
                self.cpu.raise_irq();
                self.spring_irq = false;
            }

            // Timers sample audio FIFOs on overflow, and DMA reacts to both
            // video blanking and FIFO demand, so the order is fixed.
            next_event = next_event.min(Ppu::process_events(self, cycles));
            next_event = next_event.min(Apu::process_events(self, cycles));
            next_event = next_event.min(Timers::process_events(self, cycles));
            next_event = next_event.min(Dmas::run_dmas(self, cycles));
            next_event = next_event.min(Sio::process_events(self, cycles));

            self.cpu.cycles -= cycles;
            self.cpu.next_event = next_event;

            if self.cpu.halted {
                // Nothing to execute; fast-forward the clock to the event.
                self.cpu.cycles = self.cpu.next_event;
            }
            if self.cpu.cycles < self.cpu.next_event {
                break;
            }
        }
    }

    fn read_cpsr(&mut self) {
        self.test_irq();
    }

    fn swi16(&mut self, comment: u8) {
        self.log
            .log(LogLevel::STUB, format!("SWI 0x{comment:02X} (HLE BIOS not linked)"));
    }

    fn swi32(&mut self, comment: u32) {
        self.swi16(comment.bits(16, 8).u8());
    }

    fn hit_stub(&mut self, opcode: u32) {
        let mut level = LogLevel::FATAL;
        if let Some(debugger) = &mut self.debugger {
            level = LogLevel::STUB;
            debugger.enter(EnterReason::IllegalOp);
        }
        self.log.log(level, format!("Stub opcode: {opcode:08x}"));
    }

    fn hit_illegal(&mut self, opcode: u32) {
        self.log
            .log(LogLevel::WARN, format!("Illegal opcode: {opcode:08x}"));
        if let Some(debugger) = &mut self.debugger {
            debugger.enter(EnterReason::IllegalOp);
        }
    }

    fn reset(&mut self) {
        self.cpu.set_privilege_mode(Mode::Irq);
        self.cpu.gprs[13] = SP_BASE_IRQ;
        self.cpu.set_privilege_mode(Mode::Supervisor);
        self.cpu.gprs[13] = SP_BASE_SUPERVISOR;
        self.cpu.set_privilege_mode(Mode::System);
        self.cpu.gprs[13] = SP_BASE_SYSTEM;
    }

    fn set_active_region(&mut self, pc: u32) {
        self.memory.resolve_region(pc);
    }
}

// Interrupt control.
impl Agb {
    /// Latch an interrupt into IF and assert the CPU's IRQ line if it is
    /// enabled. Wakes a halted CPU either way.
    pub fn raise_irq(&mut self, irq: Interrupt) {
        self.raise_irq_with_index(irq as u16);
    }

    pub fn raise_irq_with_index(&mut self, idx: u16) {
        let if_ = self.memory.io16(addr::IF) | (1 << idx);
        self.memory.set_io16(addr::IF, if_);
        self.cpu.halted = false;

        if self.memory.io16(addr::IME) != 0 && self.memory.io16(addr::IE).is_bit(idx) {
            self.cpu.raise_irq();
        }
    }

    /// IE was written; newly-enabled pending interrupts fire immediately.
    fn write_ie(&mut self, value: u16) {
        if value.is_bit(Interrupt::Keypad as u16) {
            self.log
                .log(LogLevel::STUB, "Keypad interrupts not implemented");
        }
        if value.is_bit(Interrupt::GamePak as u16) {
            self.log
                .log(LogLevel::STUB, "Gamepak interrupts not implemented");
        }

        if self.memory.io16(addr::IME) != 0 && value & self.memory.io16(addr::IF) != 0 {
            self.cpu.raise_irq();
        }
    }

    /// IME was written; enabling the master switch fires anything pending.
    fn write_ime(&mut self, value: u16) {
        if value != 0 && self.memory.io16(addr::IE) & self.memory.io16(addr::IF) != 0 {
            self.cpu.raise_irq();
        }
    }

    /// Re-test the IRQ line. Called through the CPSR-read hook; an
    /// enabled-and-pending interrupt is re-raised on the next sweep.
    fn test_irq(&mut self) {
        if self.memory.io16(addr::IME) != 0
            && self.memory.io16(addr::IE) & self.memory.io16(addr::IF) != 0
        {
            self.spring_irq = true;
            self.cpu.next_event = 0;
        }
    }

    /// Put the CPU to sleep until an interrupt is raised.
    pub fn halt(&mut self) {
        self.cpu.next_event = 0;
        self.cpu.halted = true;
    }
}

// Lifecycle.
impl Agb {
    pub fn new() -> Box<Self> {
        Box::<Self>::default()
    }

    /// Attach a ROM image: map it, set up save hardware and GPIO, and apply
    /// the compatibility override for the cartridge, if any.
    pub fn load_rom(&mut self, mut rom: Vec<u8>, file_name: Option<String>) {
        rom.truncate(ROM_MAX_SIZE);
        self.cart.load_rom(rom);
        self.active_file = file_name;

        match self.cart.detect_save() {
            SavedataType::Flash512 => self.cart.save.init_flash(64 * KB),
            SavedataType::Flash1M => self.cart.save.init_flash(128 * KB),
            SavedataType::Eeprom => self.cart.save.init_eeprom(),
            SavedataType::Sram => self.cart.save.init_sram(),
            SavedataType::None => (),
        }
        self.cart.gpio.init(GPIO_REG_OFFSET);
        self.check_overrides(self.cart.game_code_word());
    }

    /// Attach a BIOS image. Unknown checksums are accepted with a warning.
    pub fn load_bios(&mut self, bios: Vec<u8>) {
        self.memory.bios = bios;
        self.memory.full_bios = true;

        let checksum = Memory::checksum(&self.memory.bios);
        self.log
            .log(LogLevel::DEBUG, format!("BIOS Checksum: 0x{checksum:X}"));
        if checksum == BIOS_CHECKSUM {
            self.log.log(LogLevel::INFO, "Official GBA BIOS detected");
        } else if checksum == DS_BIOS_CHECKSUM {
            self.log
                .log(LogLevel::INFO, "Official GBA (DS) BIOS detected");
        } else {
            self.log.log(LogLevel::WARN, "BIOS checksum incorrect");
        }
        self.bios_checksum = checksum;

        if self.cpu.pc() >> 24 == 0 {
            // Currently executing out of the BIOS; remap under the PC.
            let pc = self.cpu.pc();
            self.set_active_region(pc);
        }
    }

    /// Apply a patch to the loaded ROM. On failure the pristine image stays
    /// active and the patched buffer is released.
    pub fn apply_patch(&mut self, patch: &dyn Patch) {
        let patched_size = patch.output_size(self.cart.rom_size());
        if patched_size == 0 {
            return;
        }

        let mut buf = vec![0; patched_size];
        let n = patched_size.min(self.cart.pristine().len());
        buf[..n].copy_from_slice(&self.cart.pristine()[..n]);
        if !patch.apply(&mut buf) {
            return;
        }
        self.cart.install_patched(buf);
    }

    pub fn attach_debugger(&mut self, debugger: Debugger) {
        self.debugger = Some(debugger);
    }

    pub fn detach_debugger(&mut self) {
        self.debugger = None;
    }

    fn check_overrides(&mut self, code: u32) {
        let Some((_, save, gpio)) = hw::cartridge::lookup_override(code) else {
            return;
        };
        match save {
            SavedataType::Flash512 => self.cart.save.init_flash(64 * KB),
            SavedataType::Flash1M => self.cart.save.init_flash(128 * KB),
            SavedataType::Eeprom => self.cart.save.init_eeprom(),
            SavedataType::Sram => self.cart.save.init_sram(),
            SavedataType::None => (),
        }

        use crate::hw::gpio::GpioDevices;
        if gpio.contains(GpioDevices::RTC) {
            self.cart.gpio.init_rtc();
        }
        if gpio.contains(GpioDevices::GYRO) {
            self.cart.gpio.init_gyro();
        }
        if gpio.contains(GpioDevices::RUMBLE) {
            self.cart.gpio.init_rumble();
        }
    }
}

impl Default for Agb {
    fn default() -> Self {
        let mut gg = Self {
            cpu: Cpu::default(),
            memory: Memory::default(),
            ppu: Ppu::default(),
            apu: Apu::default(),
            dma: Dmas::default(),
            timers: Timers::default(),
            cart: Cartridge::default(),
            sio: Sio::default(),

            spring_irq: false,
            bios_checksum: 0,
            active_file: None,

            debugger: None,
            log: Logger::default(),
            keys: None,
            rotation: None,
            rumble: None,
        };
        gg.bios_checksum = Memory::checksum(&gg.memory.bios);
        gg
    }
}
