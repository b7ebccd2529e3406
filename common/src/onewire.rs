//! Dallas 1-Wire: ROM search and DS18B20 conversions over any bit-level bus.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::error::OneWireError;
use crate::sensor::{TemperatureProbe, DEVICE_DISCONNECTED_C};

const SEARCH_ROM: u8 = 0xF0;
const MATCH_ROM: u8 = 0x55;
const CONVERT_T: u8 = 0x44;
const READ_SCRATCHPAD: u8 = 0xBE;

pub const DS18B20_FAMILY: u8 = 0x28;

/// Worst-case 12-bit conversion time.
const CONVERSION_MS: u32 = 750;

/// Devices a search collects before giving up.
const MAX_DEVICES: usize = 8;

/// Bit-level access to a 1-Wire bus. Bytes go out least significant bit
/// first.
pub trait OneWireBus {
    /// Reset pulse. `true` when at least one device answered with a
    /// presence pulse.
    fn reset(&mut self) -> bool;

    fn write_bit(&mut self, bit: bool);

    fn read_bit(&mut self) -> bool;

    fn write_byte(&mut self, byte: u8) {
        for i in 0..8 {
            self.write_bit(byte >> i & 1 == 1);
        }
    }

    fn read_byte(&mut self) -> u8 {
        (0..8).fold(0, |byte, i| byte | (u8::from(self.read_bit()) << i))
    }
}

/// 64-bit ROM code: family, 48-bit serial, CRC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RomCode(pub [u8; 8]);

impl RomCode {
    pub fn family(&self) -> u8 {
        self.0[0]
    }

    pub fn is_valid(&self) -> bool {
        crc8(&self.0[..7]) == self.0[7]
    }

    fn bit(&self, index: usize) -> bool {
        self.0[index / 8] >> (index % 8) & 1 == 1
    }

    fn set_bit(&mut self, index: usize, value: bool) {
        let mask = 1 << (index % 8);
        if value {
            self.0[index / 8] |= mask;
        } else {
            self.0[index / 8] &= !mask;
        }
    }
}

impl fmt::Display for RomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// Dallas/Maxim CRC-8 (polynomial x^8 + x^5 + x^4 + 1).
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0, |mut crc, &byte| {
        let mut byte = byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
        crc
    })
}

/// Enumerates the devices on the bus, in ROM search order.
pub fn search(bus: &mut impl OneWireBus) -> Vec<RomCode> {
    let mut found = Vec::new();
    let mut rom = RomCode([0; 8]);
    let mut last_discrepancy = 0;

    while found.len() < MAX_DEVICES {
        if !bus.reset() {
            break;
        }
        bus.write_byte(SEARCH_ROM);

        let mut last_zero = 0;
        for position in 1..=64 {
            let id_bit = bus.read_bit();
            let complement = bus.read_bit();
            if id_bit && complement {
                warn!("1-Wire search lost all devices at bit {position}");
                return found;
            }

            let direction = if id_bit != complement {
                id_bit
            } else {
                let direction = if position < last_discrepancy {
                    rom.bit(position - 1)
                } else {
                    position == last_discrepancy
                };
                if !direction {
                    last_zero = position;
                }
                direction
            };
            rom.set_bit(position - 1, direction);
            bus.write_bit(direction);
        }

        if !rom.is_valid() {
            warn!("1-Wire search read ROM {rom} with a bad CRC");
            break;
        }
        found.push(rom);

        last_discrepancy = last_zero;
        if last_discrepancy == 0 {
            break;
        }
    }
    found
}

/// The DS18B20s on the bus, in search order. Other device families are
/// skipped.
pub fn find_ds18b20(bus: &mut impl OneWireBus) -> Vec<RomCode> {
    search(bus)
        .into_iter()
        .filter(|rom| {
            let keep = rom.family() == DS18B20_FAMILY;
            if !keep {
                debug!("Skipping 1-Wire device {rom} (family {:#04x})", rom.family());
            }
            keep
        })
        .collect()
}

fn select(bus: &mut impl OneWireBus, rom: &RomCode) -> Result<(), OneWireError> {
    if !bus.reset() {
        return Err(OneWireError::NoPresence);
    }
    bus.write_byte(MATCH_ROM);
    for byte in rom.0 {
        bus.write_byte(byte);
    }
    Ok(())
}

/// Temperature from a DS18B20 scratchpad, after checking its CRC.
pub fn decode_scratchpad(scratchpad: &[u8; 9]) -> Result<f32, OneWireError> {
    if crc8(&scratchpad[..8]) != scratchpad[8] {
        return Err(OneWireError::Crc);
    }
    let raw = i16::from_le_bytes([scratchpad[0], scratchpad[1]]);
    Ok(f32::from(raw) / 16.0)
}

/// Starts a conversion on one device, waits for it and reads the result.
pub fn read_temperature(
    bus: &mut impl OneWireBus,
    rom: &RomCode,
    delay: &mut impl DelayNs,
) -> Result<f32, OneWireError> {
    select(bus, rom)?;
    bus.write_byte(CONVERT_T);
    delay.delay_ms(CONVERSION_MS);

    select(bus, rom)?;
    bus.write_byte(READ_SCRATCHPAD);
    let mut scratchpad = [0u8; 9];
    for byte in &mut scratchpad {
        *byte = bus.read_byte();
    }
    decode_scratchpad(&scratchpad)
}

/// One DS18B20 on a bus shared with the other probes.
pub struct Ds18b20Probe<B, D> {
    bus: Rc<RefCell<B>>,
    rom: Option<RomCode>,
    delay: D,
}

impl<B: OneWireBus, D: DelayNs> Ds18b20Probe<B, D> {
    /// `rom` is `None` when the search did not find a device for this slot;
    /// the probe then always reads as disconnected.
    pub fn new(bus: Rc<RefCell<B>>, rom: Option<RomCode>, delay: D) -> Self {
        Self { bus, rom, delay }
    }

    pub fn rom(&self) -> Option<RomCode> {
        self.rom
    }
}

impl<B: OneWireBus, D: DelayNs> TemperatureProbe for Ds18b20Probe<B, D> {
    fn read_celsius(&mut self) -> f32 {
        let Some(rom) = self.rom else {
            return DEVICE_DISCONNECTED_C;
        };
        let mut bus = self.bus.borrow_mut();
        match read_temperature(&mut *bus, &rom, &mut self.delay) {
            Ok(celsius) => {
                debug!("{rom}: {celsius:.2}°C");
                celsius
            }
            Err(e) => {
                warn!("DS18B20 {rom}: {e}");
                DEVICE_DISCONNECTED_C
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDelay;

    fn rom(serial: u8) -> RomCode {
        rom_of_family(DS18B20_FAMILY, serial)
    }

    fn rom_of_family(family: u8, serial: u8) -> RomCode {
        let mut bytes = [family, serial, 0x13, 0x00, 0x5A, 0x00, 0x00, 0];
        bytes[7] = crc8(&bytes[..7]);
        RomCode(bytes)
    }

    fn scratchpad(raw: i16) -> [u8; 9] {
        let [lo, hi] = raw.to_le_bytes();
        let mut bytes = [lo, hi, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0];
        bytes[8] = crc8(&bytes[..8]);
        bytes
    }

    #[derive(Clone, Copy, Debug)]
    enum Phase {
        Idle,
        RomCommand,
        Search { bit: usize, step: u8 },
        MatchRom { bit: usize },
        Function,
        Scratchpad { bit: usize },
    }

    /// Simulates devices answering on an open-drain bus.
    struct FakeBus {
        devices: Vec<(RomCode, [u8; 9])>,
        selected: Vec<bool>,
        phase: Phase,
        byte: u8,
        bits: u8,
        conversions: u32,
    }

    impl FakeBus {
        fn new(devices: Vec<(RomCode, [u8; 9])>) -> Self {
            let selected = vec![true; devices.len()];
            Self {
                devices,
                selected,
                phase: Phase::Idle,
                byte: 0,
                bits: 0,
                conversions: 0,
            }
        }

        fn wired_and(&self, f: impl Fn(&RomCode) -> bool) -> bool {
            self.devices
                .iter()
                .zip(&self.selected)
                .filter(|(_, selected)| **selected)
                .all(|((rom, _), _)| f(rom))
        }

        fn keep_matching(&mut self, bit: usize, value: bool) {
            for ((rom, _), selected) in self.devices.iter().zip(self.selected.iter_mut()) {
                if rom.bit(bit) != value {
                    *selected = false;
                }
            }
        }

        fn command(&mut self, byte: u8) {
            self.phase = match (self.phase, byte) {
                (Phase::RomCommand, SEARCH_ROM) => Phase::Search { bit: 0, step: 0 },
                (Phase::RomCommand, MATCH_ROM) => Phase::MatchRom { bit: 0 },
                (Phase::Function, CONVERT_T) => {
                    self.conversions += 1;
                    Phase::Idle
                }
                (Phase::Function, READ_SCRATCHPAD) => Phase::Scratchpad { bit: 0 },
                _ => Phase::Idle,
            };
        }
    }

    impl OneWireBus for FakeBus {
        fn reset(&mut self) -> bool {
            self.phase = Phase::RomCommand;
            self.selected.iter_mut().for_each(|s| *s = true);
            self.byte = 0;
            self.bits = 0;
            !self.devices.is_empty()
        }

        fn write_bit(&mut self, bit: bool) {
            match self.phase {
                Phase::Search { bit: index, step: 2 } => {
                    self.keep_matching(index, bit);
                    self.phase = if index == 63 {
                        Phase::Function
                    } else {
                        Phase::Search { bit: index + 1, step: 0 }
                    };
                }
                Phase::MatchRom { bit: index } => {
                    self.keep_matching(index, bit);
                    self.phase = if index == 63 {
                        Phase::Function
                    } else {
                        Phase::MatchRom { bit: index + 1 }
                    };
                }
                Phase::RomCommand | Phase::Function => {
                    self.byte |= u8::from(bit) << self.bits;
                    self.bits += 1;
                    if self.bits == 8 {
                        let byte = self.byte;
                        self.byte = 0;
                        self.bits = 0;
                        self.command(byte);
                    }
                }
                _ => {}
            }
        }

        fn read_bit(&mut self) -> bool {
            match self.phase {
                Phase::Search { bit, step: 0 } => {
                    self.phase = Phase::Search { bit, step: 1 };
                    self.wired_and(|rom| rom.bit(bit))
                }
                Phase::Search { bit, step: 1 } => {
                    self.phase = Phase::Search { bit, step: 2 };
                    self.wired_and(|rom| !rom.bit(bit))
                }
                Phase::Scratchpad { bit } => {
                    self.phase = Phase::Scratchpad { bit: bit + 1 };
                    let pad = self
                        .devices
                        .iter()
                        .zip(&self.selected)
                        .find(|(_, selected)| **selected)
                        .map(|((_, pad), _)| pad);
                    match pad {
                        Some(pad) if bit < 72 => pad[bit / 8] >> (bit % 8) & 1 == 1,
                        _ => true,
                    }
                }
                _ => true,
            }
        }
    }

    #[test]
    fn crc8_matches_datasheet_example() {
        // ROM from the Maxim application note 27.
        assert_eq!(crc8(&[0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00]), 0xA2);
    }

    #[test]
    fn scratchpad_decodes_signed_sixteenths() {
        assert_eq!(decode_scratchpad(&scratchpad(0x0191)), Ok(25.0625));
        assert_eq!(decode_scratchpad(&scratchpad(-0x0091)), Ok(-9.0625));

        let mut corrupt = scratchpad(0x0191);
        corrupt[0] ^= 0x01;
        assert_eq!(decode_scratchpad(&corrupt), Err(OneWireError::Crc));
    }

    #[test]
    fn search_finds_every_device_once() {
        let roms = [rom(0x10), rom(0x11), rom(0x80)];
        let mut bus = FakeBus::new(roms.iter().map(|r| (*r, scratchpad(0))).collect());

        let mut found = search(&mut bus);
        assert_eq!(found.len(), 3);
        found.sort_by_key(|r| r.0);
        let mut expected = roms.to_vec();
        expected.sort_by_key(|r| r.0);
        assert_eq!(found, expected);
    }

    #[test]
    fn search_on_empty_bus_finds_nothing() {
        let mut bus = FakeBus::new(Vec::new());
        assert!(search(&mut bus).is_empty());
    }

    #[test]
    fn only_ds18b20_family_is_kept() {
        // A DS2401 serial number chip sharing the bus.
        let other = rom_of_family(0x01, 0x20);
        let mut bus = FakeBus::new(vec![
            (rom(0x10), scratchpad(0)),
            (other, scratchpad(0)),
            (rom(0x11), scratchpad(0)),
        ]);

        let found = find_ds18b20(&mut bus);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r.family() == DS18B20_FAMILY));
        assert!(!found.contains(&other));
    }

    #[test]
    fn probe_reads_only_its_own_device() {
        let bus = Rc::new(RefCell::new(FakeBus::new(vec![
            (rom(0x10), scratchpad(0x0195)),
            (rom(0x11), scratchpad(0x02D0)),
        ])));

        let mut first = Ds18b20Probe::new(bus.clone(), Some(rom(0x10)), RecordingDelay::default());
        let mut second = Ds18b20Probe::new(bus.clone(), Some(rom(0x11)), RecordingDelay::default());
        assert_eq!(first.read_celsius(), 25.3125);
        assert_eq!(second.read_celsius(), 45.0);
        assert_eq!(bus.borrow().conversions, 2);
    }

    #[test]
    fn absent_or_silent_device_reads_disconnected() {
        let bus = Rc::new(RefCell::new(FakeBus::new(vec![(rom(0x10), scratchpad(0x0191))])));

        let mut unassigned = Ds18b20Probe::new(bus.clone(), None, RecordingDelay::default());
        assert_eq!(unassigned.rom(), None);
        assert_eq!(unassigned.read_celsius(), DEVICE_DISCONNECTED_C);

        // Nobody answers a ROM that is not on the bus; the bus reads all ones.
        let mut missing = Ds18b20Probe::new(bus, Some(rom(0x42)), RecordingDelay::default());
        assert_eq!(missing.read_celsius(), DEVICE_DISCONNECTED_C);
    }
}
