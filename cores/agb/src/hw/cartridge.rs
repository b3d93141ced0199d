// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use crate::{
    hw::gpio::{Gpio, GpioDevices},
    memory::KB,
};

/// Offset of the 4-character game code in the cartridge header.
const GAME_CODE_OFFSET: usize = 0xAC;
/// Offset of the 12-character title in the cartridge header.
const TITLE_OFFSET: usize = 0xA0;

/// The inserted cartridge: the pristine ROM image, an optional patched view
/// shadowing it, and the save hardware.
#[derive(Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Cartridge {
    #[cfg_attr(feature = "serde", serde(skip, default))]
    pristine: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(skip, default))]
    patched: Option<Vec<u8>>,
    pub save: Savedata,
    pub gpio: Gpio,
}

impl Cartridge {
    /// The active ROM image: the patched view if a patch is installed, the
    /// pristine image otherwise.
    pub fn rom(&self) -> &[u8] {
        self.patched.as_deref().unwrap_or(&self.pristine)
    }

    pub fn rom_size(&self) -> usize {
        self.rom().len()
    }

    pub fn pristine(&self) -> &[u8] {
        &self.pristine
    }

    pub fn is_patched(&self) -> bool {
        self.patched.is_some()
    }

    pub fn load_rom(&mut self, rom: Vec<u8>) {
        self.pristine = rom;
        self.patched = None;
    }

    /// Install a patched view; the pristine image stays mapped underneath.
    pub fn install_patched(&mut self, rom: Vec<u8>) {
        self.patched = Some(rom);
    }

    pub fn title(&self) -> String {
        self.read_string(TITLE_OFFSET, 12)
    }

    pub fn game_code(&self) -> String {
        self.read_string(GAME_CODE_OFFSET, 4)
    }

    /// The game code as the little-endian word the override table is keyed
    /// by.
    pub fn game_code_word(&self) -> u32 {
        let rom = self.rom();
        if rom.len() < GAME_CODE_OFFSET + 4 {
            return 0;
        }
        u32::from_le_bytes([
            rom[GAME_CODE_OFFSET],
            rom[GAME_CODE_OFFSET + 1],
            rom[GAME_CODE_OFFSET + 2],
            rom[GAME_CODE_OFFSET + 3],
        ])
    }

    /// Guess the save type from the library-marker strings the SDK links
    /// into the image. Used when the override table has no entry.
    pub fn detect_save(&self) -> SavedataType {
        let markers: [(SavedataType, &str); 5] = [
            (SavedataType::Flash1M, "FLASH1M_V"),
            (SavedataType::Flash512, "FLASH_V"),
            (SavedataType::Flash512, "FLASH512_V"),
            (SavedataType::Sram, "SRAM_V"),
            (SavedataType::Eeprom, "EEPROM_V"),
        ];
        let rom_str = String::from_utf8_lossy(self.rom());
        for (ty, marker) in markers {
            if rom_str.contains(marker) {
                return ty;
            }
        }
        SavedataType::None
    }

    fn read_string(&self, base: usize, max: usize) -> String {
        let rom = self.rom();
        let mut buf = String::new();
        for idx in 0..max {
            match rom.get(base + idx) {
                Some(0) | None => break,
                Some(&ch) => buf.push(ch as char),
            }
        }
        buf
    }
}

/// Cartridge save hardware.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum SavedataType {
    #[default]
    None,
    Sram,
    Eeprom,
    Flash512,
    Flash1M,
}

/// Save memory backing the cartridge. The backing buffer is sized by the
/// save hardware; parsing save files is the host's concern.
#[derive(Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Savedata {
    pub kind: SavedataType,
    pub ram: Vec<u8>,
    /// Save file bound by the host, if any.
    pub file: Option<PathBuf>,
}

impl Savedata {
    /// Bind a save file; the actual save hardware is initialized once the
    /// cartridge type is known.
    pub fn init(&mut self, file: PathBuf) {
        self.file = Some(file);
    }

    pub fn init_flash(&mut self, size: usize) {
        self.kind = if size > 64 * KB {
            SavedataType::Flash1M
        } else {
            SavedataType::Flash512
        };
        self.resize(size);
    }

    pub fn init_eeprom(&mut self) {
        self.kind = SavedataType::Eeprom;
        self.resize(8 * KB);
    }

    pub fn init_sram(&mut self) {
        self.kind = SavedataType::Sram;
        self.resize(32 * KB);
    }

    fn resize(&mut self, size: usize) {
        self.ram.resize(size, 0xFF);
    }
}

/// A binary patch the host wants applied to the inserted ROM.
pub trait Patch {
    /// Size of the patched image, given the original's. Zero means the
    /// patch does not apply.
    fn output_size(&self, original: usize) -> usize;
    /// Patch the buffer in place. Returns false if the patch failed.
    fn apply(&self, rom: &mut [u8]) -> bool;
}

/// Save type and GPIO hardware for cartridges whose images do not declare
/// them. Keyed by the 4-character game code.
pub const OVERRIDES: &[(&[u8; 4], SavedataType, GpioDevices)] = &[
    // Boktai: The Sun is in Your Hand
    (b"U3IE", SavedataType::Eeprom, GpioDevices::RTC.union(GpioDevices::LIGHT_SENSOR)),
    (b"U3IP", SavedataType::Eeprom, GpioDevices::RTC.union(GpioDevices::LIGHT_SENSOR)),
    // Boktai 2: Solar Boy Django
    (b"U32E", SavedataType::Eeprom, GpioDevices::RTC.union(GpioDevices::LIGHT_SENSOR)),
    (b"U32P", SavedataType::Eeprom, GpioDevices::RTC.union(GpioDevices::LIGHT_SENSOR)),
    // Drill Dozer
    (b"V49J", SavedataType::Sram, GpioDevices::RUMBLE),
    (b"V49E", SavedataType::Sram, GpioDevices::RUMBLE),
    // Pokemon Ruby
    (b"AXVJ", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXVE", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXVP", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXVI", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXVS", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXVD", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXVF", SavedataType::Flash1M, GpioDevices::RTC),
    // Pokemon Sapphire
    (b"AXPJ", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXPE", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXPP", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXPI", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXPS", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXPD", SavedataType::Flash1M, GpioDevices::RTC),
    (b"AXPF", SavedataType::Flash1M, GpioDevices::RTC),
    // Pokemon Emerald
    (b"BPEJ", SavedataType::Flash1M, GpioDevices::RTC),
    (b"BPEE", SavedataType::Flash1M, GpioDevices::RTC),
    (b"BPEP", SavedataType::Flash1M, GpioDevices::RTC),
    (b"BPEI", SavedataType::Flash1M, GpioDevices::RTC),
    (b"BPES", SavedataType::Flash1M, GpioDevices::RTC),
    (b"BPED", SavedataType::Flash1M, GpioDevices::RTC),
    (b"BPEF", SavedataType::Flash1M, GpioDevices::RTC),
    // Pokemon FireRed
    (b"BPRJ", SavedataType::Flash1M, GpioDevices::empty()),
    (b"BPRE", SavedataType::Flash1M, GpioDevices::empty()),
    (b"BPRP", SavedataType::Flash1M, GpioDevices::empty()),
    // Pokemon LeafGreen
    (b"BPGJ", SavedataType::Flash1M, GpioDevices::empty()),
    (b"BPGE", SavedataType::Flash1M, GpioDevices::empty()),
    (b"BPGP", SavedataType::Flash1M, GpioDevices::empty()),
    // RockMan EXE 4.5 - Real Operation
    (b"BR4J", SavedataType::Flash512, GpioDevices::RTC),
    // Super Mario Advance 4
    (b"AX4J", SavedataType::Flash1M, GpioDevices::empty()),
    (b"AX4E", SavedataType::Flash1M, GpioDevices::empty()),
    (b"AX4P", SavedataType::Flash1M, GpioDevices::empty()),
    // Wario Ware Twisted
    (b"RWZJ", SavedataType::Sram, GpioDevices::RUMBLE.union(GpioDevices::GYRO)),
    (b"RWZE", SavedataType::Sram, GpioDevices::RUMBLE.union(GpioDevices::GYRO)),
    (b"RWZP", SavedataType::Sram, GpioDevices::RUMBLE.union(GpioDevices::GYRO)),
];

/// Look up a cartridge's override entry by its game-code word.
pub fn lookup_override(code: u32) -> Option<&'static (&'static [u8; 4], SavedataType, GpioDevices)> {
    OVERRIDES
        .iter()
        .find(|(id, ..)| u32::from_le_bytes(**id) == code)
}
