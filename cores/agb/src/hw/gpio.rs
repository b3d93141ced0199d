// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use bitflags::bitflags;

/// Offset of the GPIO register block in the cartridge header.
pub const GPIO_REG_OFFSET: usize = 0xC4;

bitflags! {
    /// Extra hardware wired to the cartridge GPIO port.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct GpioDevices: u8 {
        const RTC = 1;
        const RUMBLE = 2;
        /// Declared by some cartridges but has no initializer; advisory.
        const LIGHT_SENSOR = 4;
        const GYRO = 8;
    }
}

/// The cartridge GPIO port and the devices behind it.
#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Gpio {
    #[cfg_attr(feature = "serde", serde(skip, default))]
    pub devices: GpioDevices,
    /// Offset of the register block into the mapped ROM.
    pub reg_base: usize,
}

impl Gpio {
    pub fn init(&mut self, reg_base: usize) {
        self.reg_base = reg_base;
        self.devices = GpioDevices::empty();
    }

    pub fn init_rtc(&mut self) {
        self.devices |= GpioDevices::RTC;
    }

    pub fn init_gyro(&mut self) {
        self.devices |= GpioDevices::GYRO;
    }

    pub fn init_rumble(&mut self) {
        self.devices |= GpioDevices::RUMBLE;
    }
}

/// Host-side tilt/gyro input feeding GPIO reads.
pub trait RotationSource {
    fn gyro_z(&mut self) -> u16;
}

/// Host-side rumble output driven by GPIO writes.
pub trait RumblePack {
    fn set_rumble(&mut self, enabled: bool);
}
