use bitaxe_logger_common::onewire::OneWireBus;

/// Bit-banged 1-Wire master on one open-drain GPIO with an external pull-up.
pub struct GpioOneWire {
    pin: i32,
}

impl GpioOneWire {
    pub fn new(pin: i32) -> Self {
        use esp_idf_svc::sys::*;

        unsafe {
            gpio_reset_pin(pin);
            gpio_set_direction(pin, gpio_mode_t_GPIO_MODE_INPUT_OUTPUT_OD);
            gpio_set_pull_mode(pin, gpio_pull_mode_t_GPIO_PULLUP_ONLY);
            gpio_set_level(pin, 1);
        }

        Self { pin }
    }

    fn low(&self) {
        unsafe { esp_idf_svc::sys::gpio_set_level(self.pin, 0) };
    }

    fn release(&self) {
        unsafe { esp_idf_svc::sys::gpio_set_level(self.pin, 1) };
    }

    fn sample(&self) -> bool {
        unsafe { esp_idf_svc::sys::gpio_get_level(self.pin) != 0 }
    }

    fn wait_us(us: u32) {
        unsafe { esp_idf_svc::sys::ets_delay_us(us) };
    }
}

// Standard-speed slot timings from the DS18B20 datasheet.
impl OneWireBus for GpioOneWire {
    fn reset(&mut self) -> bool {
        self.low();
        Self::wait_us(480);
        self.release();
        Self::wait_us(70);
        let presence = !self.sample();
        Self::wait_us(410);
        presence
    }

    fn write_bit(&mut self, bit: bool) {
        self.low();
        if bit {
            Self::wait_us(6);
            self.release();
            Self::wait_us(64);
        } else {
            Self::wait_us(60);
            self.release();
            Self::wait_us(10);
        }
    }

    fn read_bit(&mut self) -> bool {
        self.low();
        Self::wait_us(6);
        self.release();
        Self::wait_us(9);
        let bit = self.sample();
        Self::wait_us(55);
        bit
    }
}
