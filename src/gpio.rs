//! GPIO lines and timing for the radio transmitter
//!
//! Lines are claimed through the Linux sysfs GPIO interface. Timing uses
//! [`SpinDelay`], which busy-waits so that pulse widths stay within a few
//! microseconds of nominal.
use std::{
    error,
    fmt,
    fs::{self, File, OpenOptions},
    hint,
    io,
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use embedded_hal::{
    delay::DelayNs,
    digital::{self, ErrorKind, ErrorType, OutputPin},
};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    protocol::{OokTransmitter, Radio},
};

#[cfg(test)]
use crate::protocol::{RadioLog, RadioMock};
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Highest GPIO number on the Raspberry Pi header
pub const MAX_GPIO_PIN: u8 = 27;

pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

// errno returned by export when another process holds the line
const EBUSY: i32 = 16;

// Delays at least this long sleep for all but SPIN_TAIL before spinning
const SLEEP_THRESHOLD: Duration = Duration::from_millis(1);
const SPIN_TAIL: Duration = Duration::from_micros(200);

/// Busy-wait delay on the monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinDelay;

impl SpinDelay {
    pub fn new() -> Self {
        SpinDelay
    }

    fn wait(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        if duration >= SLEEP_THRESHOLD {
            thread::sleep(duration - SPIN_TAIL);
        }
        while Instant::now() < deadline {
            hint::spin_loop();
        }
    }
}

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.wait(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        self.wait(Duration::from_micros(u64::from(us)));
    }
}

/// Claims output lines under a sysfs GPIO root.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Export `pin`, make it an output and drive it low.
    pub fn claim(&self, pin: u8) -> Result<SysfsLine> {
        let config_error = |reason: String| Error::PinConfiguration { pin, reason };
        if pin > MAX_GPIO_PIN {
            return Err(config_error(format!(
                "pin number must be at most {}",
                MAX_GPIO_PIN
            )));
        }

        // an exported line belongs to someone else, even if that is us
        let line_dir = self.root.join(format!("gpio{}", pin));
        if line_dir.is_dir() {
            return Err(config_error(format!(
                "line already exported, unexport {} first",
                line_dir.display()
            )));
        }
        fs::write(self.root.join("export"), pin.to_string()).map_err(|err| {
            if err.raw_os_error() == Some(EBUSY) {
                config_error(String::from("line busy"))
            } else {
                config_error(format!("export failed: {}", err))
            }
        })?;
        wait_for(&line_dir).map_err(|err| config_error(err.to_string()))?;
        debug!(pin, "line exported");

        // "low" sets the direction and the initial level in one write
        fs::write(line_dir.join("direction"), "low")
            .map_err(|err| config_error(format!("could not set direction: {}", err)))?;
        let value = OpenOptions::new()
            .write(true)
            .open(line_dir.join("value"))
            .map_err(|err| config_error(format!("could not open value: {}", err)))?;

        info!(pin, root = %self.root.display(), "claimed GPIO line");
        Ok(SysfsLine {
            root: self.root.clone(),
            pin,
            value,
        })
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new(DEFAULT_GPIO_ROOT)
    }
}

// udev may take a moment to create the line directory after export
fn wait_for(line_dir: &Path) -> io::Result<()> {
    for _ in 0..10 {
        if line_dir.is_dir() {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(10));
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} did not appear", line_dir.display()),
    ))
}

/// A failed write to a line's value file
#[derive(Debug)]
pub struct LineError(io::Error);

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GPIO write failed: {}", self.0)
    }
}

impl error::Error for LineError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.0)
    }
}

impl digital::Error for LineError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// An exported sysfs output line. Unexported on drop.
#[derive(Debug)]
pub struct SysfsLine {
    root: PathBuf,
    pin: u8,
    value: File,
}

impl SysfsLine {
    pub fn pin(&self) -> u8 {
        self.pin
    }

    fn write(&mut self, level: &[u8]) -> std::result::Result<(), LineError> {
        self.value.write_at(level, 0).map(|_| ()).map_err(LineError)
    }
}

impl ErrorType for SysfsLine {
    type Error = LineError;
}

impl OutputPin for SysfsLine {
    fn set_low(&mut self) -> std::result::Result<(), LineError> {
        self.write(b"0")
    }

    fn set_high(&mut self) -> std::result::Result<(), LineError> {
        self.write(b"1")
    }
}

impl Drop for SysfsLine {
    fn drop(&mut self) {
        let _ = self.write(b"0");
        if let Err(err) = fs::write(self.root.join("unexport"), self.pin.to_string()) {
            warn!(pin = self.pin, error = %err, "could not release GPIO line");
        }
    }
}

/// Creates the radio for a pin. Used at adapter construction and when a
/// node is moved to another pin.
pub trait RadioBinder: Send + Sync {
    fn bind(&self, pin: u8) -> Result<Box<dyn Radio>>;
}

/// Binds sysfs lines driven by a [`SpinDelay`].
#[derive(Debug, Clone, Default)]
pub struct SysfsBinder {
    gpio: SysfsGpio,
}

impl SysfsBinder {
    pub fn new(gpio: SysfsGpio) -> Self {
        Self { gpio }
    }
}

impl RadioBinder for SysfsBinder {
    fn bind(&self, pin: u8) -> Result<Box<dyn Radio>> {
        let line = self.gpio.claim(pin)?;
        Ok(Box::new(OokTransmitter::initialize(pin, line, SpinDelay::new())?))
    }
}

#[cfg(test)]
pub struct BinderMock {
    log: RadioLog,
    bound: Mutex<Vec<u8>>,
    fail_pins: Mutex<Vec<u8>>,
}

#[cfg(test)]
impl BinderMock {
    pub fn new() -> BinderMock {
        BinderMock {
            log: Arc::new(Mutex::new(Vec::new())),
            bound: Mutex::new(Vec::new()),
            fail_pins: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_pin(&self, pin: u8) {
        self.fail_pins.lock().unwrap().push(pin);
    }

    pub fn allow_pin(&self, pin: u8) {
        self.fail_pins.lock().unwrap().retain(|p| *p != pin);
    }

    pub fn log(&self) -> RadioLog {
        Arc::clone(&self.log)
    }

    pub fn bound(&self) -> Vec<u8> {
        self.bound.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl RadioBinder for BinderMock {
    fn bind(&self, pin: u8) -> Result<Box<dyn Radio>> {
        if self.fail_pins.lock().unwrap().contains(&pin) {
            return Err(Error::PinConfiguration {
                pin,
                reason: String::from("already claimed"),
            });
        }
        self.bound.lock().unwrap().push(pin);
        Ok(Box::new(RadioMock::with_log(pin, self.log())))
    }
}
