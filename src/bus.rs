//! 8080-style 8-bit parallel bus primitives.
//!
//! - `ParallelBus` is the capability set the register layer is written against
//! - `GpioBus` bit-bangs it over plain embedded-hal pins
//!
//! Line polarity: every control line is active low. "active" below means the
//! line is driven low, "idle" means high.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

/// Direction of the shared data lines.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusDir {
    Write,
    Read,
}

/// Control-line and data-line primitives of a parallel LCD bus.
///
/// None of these can fail at the protocol level. `Error` only carries the
/// HAL pin error, which is `Infallible` on real GPIO.
///
/// Callers own the direction contract: switch to `BusDir::Read` before
/// `read8` and back to `BusDir::Write` before the next `write8`.
pub trait ParallelBus {
    type Error: fmt::Debug;

    fn cs_active(&mut self) -> Result<(), Self::Error>;
    fn cs_idle(&mut self) -> Result<(), Self::Error>;

    fn wr_active(&mut self) -> Result<(), Self::Error>;
    fn wr_idle(&mut self) -> Result<(), Self::Error>;

    fn rd_active(&mut self) -> Result<(), Self::Error>;
    fn rd_idle(&mut self) -> Result<(), Self::Error>;

    fn cd_command(&mut self) -> Result<(), Self::Error>;
    fn cd_data(&mut self) -> Result<(), Self::Error>;

    fn rst_active(&mut self) -> Result<(), Self::Error>;
    fn rst_idle(&mut self) -> Result<(), Self::Error>;

    fn set_dir(&mut self, dir: BusDir) -> Result<(), Self::Error>;

    /// Latch whatever is currently on the data lines.
    fn wr_strobe(&mut self) -> Result<(), Self::Error> {
        self.wr_active()?;
        self.wr_idle()
    }

    /// Drive D0..D7 from `value`, then strobe WR.
    fn write8(&mut self, value: u8) -> Result<(), Self::Error>;

    /// Pulse RD and sample D0..D7.
    fn read8(&mut self) -> Result<u8, Self::Error>;
}

impl<T: ParallelBus + ?Sized> ParallelBus for &mut T {
    type Error = T::Error;

    fn cs_active(&mut self) -> Result<(), Self::Error> { T::cs_active(self) }
    fn cs_idle(&mut self) -> Result<(), Self::Error> { T::cs_idle(self) }
    fn wr_active(&mut self) -> Result<(), Self::Error> { T::wr_active(self) }
    fn wr_idle(&mut self) -> Result<(), Self::Error> { T::wr_idle(self) }
    fn rd_active(&mut self) -> Result<(), Self::Error> { T::rd_active(self) }
    fn rd_idle(&mut self) -> Result<(), Self::Error> { T::rd_idle(self) }
    fn cd_command(&mut self) -> Result<(), Self::Error> { T::cd_command(self) }
    fn cd_data(&mut self) -> Result<(), Self::Error> { T::cd_data(self) }
    fn rst_active(&mut self) -> Result<(), Self::Error> { T::rst_active(self) }
    fn rst_idle(&mut self) -> Result<(), Self::Error> { T::rst_idle(self) }
    fn set_dir(&mut self, dir: BusDir) -> Result<(), Self::Error> { T::set_dir(self, dir) }
    fn wr_strobe(&mut self) -> Result<(), Self::Error> { T::wr_strobe(self) }
    fn write8(&mut self, value: u8) -> Result<(), Self::Error> { T::write8(self, value) }
    fn read8(&mut self) -> Result<u8, Self::Error> { T::read8(self) }
}

/// A data line that can be flipped between push-pull output and input at runtime.
pub trait DataPin: OutputPin + InputPin {
    fn set_output_mode(&mut self);
    fn set_input_mode(&mut self);
}

/// The five control lines, all active low.
pub struct ControlPins<P> {
    pub cs: P,
    pub cd: P,
    pub wr: P,
    pub rd: P,
    pub rst: P,
}

/// Bit-banged parallel bus over GPIO.
///
/// `data[0]` is D0 (LSB) and `data[7]` is D7.
pub struct GpioBus<P, D, DL> {
    ctrl: ControlPins<P>,
    data: [D; 8],
    delay: DL,
    dir: BusDir,
}

impl<P, D, DL> GpioBus<P, D, DL>
where
    P: OutputPin,
    D: DataPin + ErrorType<Error = P::Error>,
    DL: DelayNs,
{
    /// Takes the pins as-is. Call `idle_all` before the first transaction.
    pub fn new(ctrl: ControlPins<P>, mut data: [D; 8], delay: DL) -> Self {
        for pin in data.iter_mut() {
            pin.set_output_mode();
        }
        Self { ctrl, data, delay, dir: BusDir::Write }
    }

    /// Park every control line in its idle state with D/C on data and
    /// reset released.
    pub fn idle_all(&mut self) -> Result<(), P::Error> {
        self.ctrl.cs.set_high()?;
        self.ctrl.wr.set_high()?;
        self.ctrl.rd.set_high()?;
        self.ctrl.cd.set_high()?;
        self.ctrl.rst.set_high()
    }

    pub fn dir(&self) -> BusDir { self.dir }

    pub fn release(self) -> (ControlPins<P>, [D; 8], DL) {
        (self.ctrl, self.data, self.delay)
    }
}

impl<P, D, DL> ParallelBus for GpioBus<P, D, DL>
where
    P: OutputPin,
    D: DataPin + ErrorType<Error = P::Error>,
    DL: DelayNs,
{
    type Error = P::Error;

    #[inline]
    fn cs_active(&mut self) -> Result<(), Self::Error> { self.ctrl.cs.set_low() }
    #[inline]
    fn cs_idle(&mut self) -> Result<(), Self::Error> { self.ctrl.cs.set_high() }
    #[inline]
    fn wr_active(&mut self) -> Result<(), Self::Error> { self.ctrl.wr.set_low() }
    #[inline]
    fn wr_idle(&mut self) -> Result<(), Self::Error> { self.ctrl.wr.set_high() }
    #[inline]
    fn rd_active(&mut self) -> Result<(), Self::Error> { self.ctrl.rd.set_low() }
    #[inline]
    fn rd_idle(&mut self) -> Result<(), Self::Error> { self.ctrl.rd.set_high() }
    #[inline]
    fn cd_command(&mut self) -> Result<(), Self::Error> { self.ctrl.cd.set_low() }
    #[inline]
    fn cd_data(&mut self) -> Result<(), Self::Error> { self.ctrl.cd.set_high() }
    #[inline]
    fn rst_active(&mut self) -> Result<(), Self::Error> { self.ctrl.rst.set_low() }
    #[inline]
    fn rst_idle(&mut self) -> Result<(), Self::Error> { self.ctrl.rst.set_high() }

    fn set_dir(&mut self, dir: BusDir) -> Result<(), Self::Error> {
        for pin in self.data.iter_mut() {
            match dir {
                BusDir::Write => pin.set_output_mode(),
                BusDir::Read => pin.set_input_mode(),
            }
        }
        self.dir = dir;
        Ok(())
    }

    // WR low time is a few ns on HX8357/ILI9341 parts
    fn wr_strobe(&mut self) -> Result<(), Self::Error> {
        self.ctrl.wr.set_low()?;
        self.delay.delay_ns(1);
        self.ctrl.wr.set_high()
    }

    fn write8(&mut self, value: u8) -> Result<(), Self::Error> {
        for (bit, pin) in self.data.iter_mut().enumerate() {
            if value & (1 << bit) != 0 {
                pin.set_high()?;
            } else {
                pin.set_low()?;
            }
        }
        self.wr_strobe()
    }

    fn read8(&mut self) -> Result<u8, Self::Error> {
        self.ctrl.rd.set_low()?;
        let mut value = 0u8;
        for (bit, pin) in self.data.iter_mut().enumerate() {
            if pin.is_high()? {
                value |= 1 << bit;
            }
        }
        self.ctrl.rd.set_high()?;
        Ok(value)
    }
}
