use embedded_hal::{delay::DelayNs, digital::OutputPin};
use tracing::{debug, trace, warn};

use crate::{
    datatypes::{PulseSymbol, PulseTrain},
    error::{Error, Result},
};

#[cfg(test)]
use std::sync::{Arc, Mutex};

// Expand bytes into a pulse train, most significant bit first
pub fn encode_bytes(bytes: &[u8], zero: PulseSymbol, one: PulseSymbol) -> Result<PulseTrain> {
    let mut symbols = Vec::with_capacity(bytes.len() * 8);

    for byte in bytes {
        for bit in (0..8).rev() {
            if byte & (1 << bit) != 0 {
                symbols.push(one);
            } else {
                symbols.push(zero);
            }
        }
    }

    PulseTrain::new(symbols)
}

/// A transmitter bound to one GPIO line.
pub trait Radio: Send {
    fn pin(&self) -> u8;

    /// Send one pulse train. The line is low when this returns.
    fn transmit(&mut self, train: &PulseTrain) -> Result<()>;

    /// Keep the line idle for `micros`
    fn pause_us(&mut self, micros: u32);

    /// One button press: `repeat_count` transmissions with a gap between
    /// each and none after the last.
    fn send(&mut self, train: &PulseTrain, repeat_count: u32, gap_us: u32) -> Result<()> {
        debug!(
            pin = self.pin(),
            symbols = train.len(),
            repeat_count,
            gap_us,
            "sending pulse train"
        );
        for n in 0..repeat_count {
            if n > 0 {
                self.pause_us(gap_us);
            }
            self.transmit(train)?;
        }
        Ok(())
    }
}

/// Bit-bangs pulse trains on an output pin, timed by a precise delay.
pub struct OokTransmitter<P: OutputPin, D> {
    pin: u8,
    line: P,
    delay: D,
}

impl<P, D> OokTransmitter<P, D>
where
    P: OutputPin,
    D: DelayNs,
{
    /// Take ownership of a line and drive it low.
    pub fn initialize(pin: u8, mut line: P, delay: D) -> Result<Self> {
        line.set_low().map_err(|err| Error::PinConfiguration {
            pin,
            reason: format!("could not drive line low: {:?}", err),
        })?;
        Ok(Self { pin, line, delay })
    }

    fn drive(&mut self, train: &PulseTrain) -> Result<()> {
        let pin = self.pin;
        for (symbol, pulse) in train.iter().enumerate() {
            let incomplete = |err: P::Error| {
                warn!(pin, symbol, error = ?err, "line write failed");
                Error::TransmissionIncomplete { pin, symbol }
            };
            if pulse.high_us > 0 {
                self.line.set_high().map_err(incomplete)?;
                self.delay.delay_us(pulse.high_us);
            }
            if pulse.low_us > 0 {
                self.line.set_low().map_err(incomplete)?;
                self.delay.delay_us(pulse.low_us);
            }
        }
        Ok(())
    }
}

impl<P, D> Radio for OokTransmitter<P, D>
where
    P: OutputPin + Send,
    D: DelayNs + Send,
{
    fn pin(&self) -> u8 {
        self.pin
    }

    fn transmit(&mut self, train: &PulseTrain) -> Result<()> {
        trace!(pin = self.pin, air_time_us = train.duration_us(), "transmit");
        let sent = self.drive(train);
        let idle = self.line.set_low();
        sent?;
        idle.map_err(|_| Error::TransmissionIncomplete {
            pin: self.pin,
            symbol: train.len(),
        })
    }

    fn pause_us(&mut self, micros: u32) {
        self.delay.delay_us(micros);
    }
}

impl<P: OutputPin, D> Drop for OokTransmitter<P, D> {
    fn drop(&mut self) {
        let _ = self.line.set_low();
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    Transmit { pin: u8, train: PulseTrain },
    Pause { pin: u8, micros: u32 },
    Released { pin: u8 },
}

#[cfg(test)]
pub type RadioLog = Arc<Mutex<Vec<RadioEvent>>>;

#[cfg(test)]
pub struct RadioMock {
    pin: u8,
    log: RadioLog,
    fail: bool,
}

#[cfg(test)]
impl RadioMock {
    pub fn new(pin: u8) -> RadioMock {
        RadioMock {
            pin,
            log: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    pub fn with_log(pin: u8, log: RadioLog) -> RadioMock {
        RadioMock {
            pin,
            log,
            fail: false,
        }
    }

    pub fn set_fail(&mut self, fail: bool) {
        self.fail = fail;
    }

    pub fn log(&self) -> RadioLog {
        Arc::clone(&self.log)
    }
}

#[cfg(test)]
impl Radio for RadioMock {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn transmit(&mut self, train: &PulseTrain) -> Result<()> {
        if self.fail {
            return Err(Error::TransmissionIncomplete {
                pin: self.pin,
                symbol: 0,
            });
        }
        self.log.lock().unwrap().push(RadioEvent::Transmit {
            pin: self.pin,
            train: train.clone(),
        });
        Ok(())
    }

    fn pause_us(&mut self, micros: u32) {
        self.log.lock().unwrap().push(RadioEvent::Pause {
            pin: self.pin,
            micros,
        });
    }
}

#[cfg(test)]
impl Drop for RadioMock {
    fn drop(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.push(RadioEvent::Released { pin: self.pin });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::digital::{ErrorKind, ErrorType};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Edge {
        High,
        Low,
        Wait(u32),
    }

    #[derive(Clone, Default)]
    struct Scope(Arc<Mutex<Vec<Edge>>>);

    impl Scope {
        fn edges(&self) -> Vec<Edge> {
            self.0.lock().unwrap().clone()
        }

        fn push(&self, edge: Edge) {
            self.0.lock().unwrap().push(edge);
        }
    }

    // Fails every write after `budget` successful ones
    struct ScopeLine {
        scope: Scope,
        budget: Option<usize>,
    }

    impl ErrorType for ScopeLine {
        type Error = ErrorKind;
    }

    impl ScopeLine {
        fn write(&mut self, edge: Edge) -> std::result::Result<(), ErrorKind> {
            if let Some(budget) = self.budget.as_mut() {
                if *budget == 0 {
                    return Err(ErrorKind::Other);
                }
                *budget -= 1;
            }
            self.scope.push(edge);
            Ok(())
        }
    }

    impl OutputPin for ScopeLine {
        fn set_low(&mut self) -> std::result::Result<(), ErrorKind> {
            self.write(Edge::Low)
        }

        fn set_high(&mut self) -> std::result::Result<(), ErrorKind> {
            self.write(Edge::High)
        }
    }

    struct ScopeDelay(Scope);

    impl DelayNs for ScopeDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0.push(Edge::Wait(ns / 1_000));
        }

        fn delay_us(&mut self, us: u32) {
            self.0.push(Edge::Wait(us));
        }
    }

    fn transmitter(budget: Option<usize>) -> (OokTransmitter<ScopeLine, ScopeDelay>, Scope) {
        let scope = Scope::default();
        let line = ScopeLine {
            scope: scope.clone(),
            budget,
        };
        let radio = OokTransmitter::initialize(17, line, ScopeDelay(scope.clone())).unwrap();
        (radio, scope)
    }

    fn train(symbols: &[(u32, u32)]) -> PulseTrain {
        PulseTrain::new(symbols.iter().map(|s| PulseSymbol::from(*s)).collect()).unwrap()
    }

    #[test]
    fn encode_bytes_msb_first() {
        let zero = PulseSymbol::new(0, 335);
        let one = PulseSymbol::new(359, 0);

        let encoded = encode_bytes(&[0x92], zero, one).unwrap();

        // 0x92 = 1001_0010
        assert_eq!(
            encoded.symbols(),
            &[one, zero, zero, one, zero, zero, one, zero]
        );
    }

    #[test]
    fn encode_bytes_is_deterministic() {
        let zero = PulseSymbol::new(200, 600);
        let one = PulseSymbol::new(600, 200);
        let bytes = [0x92, 0x49, 0x24, 0xB6];

        let first = encode_bytes(&bytes, zero, one).unwrap();
        let second = encode_bytes(&bytes, zero, one).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn encode_bytes_rejects_empty_input() {
        let symbol = PulseSymbol::new(1, 1);

        assert!(encode_bytes(&[], symbol, symbol).is_err());
    }

    #[test]
    fn initialize_drives_line_low() {
        let (_radio, scope) = transmitter(None);

        assert_eq!(scope.edges(), vec![Edge::Low]);
    }

    #[test]
    fn initialize_reports_pin_configuration_error() {
        let line = ScopeLine {
            scope: Scope::default(),
            budget: Some(0),
        };

        match OokTransmitter::initialize(4, line, ScopeDelay(Scope::default())) {
            Err(Error::PinConfiguration { pin, .. }) => assert_eq!(pin, 4),
            _ => panic!("expected PinConfiguration"),
        }
    }

    #[test]
    fn transmit_drives_each_symbol_and_ends_low() {
        let (mut radio, scope) = transmitter(None);

        radio.transmit(&train(&[(400, 800), (800, 400)])).unwrap();

        assert_eq!(
            scope.edges(),
            vec![
                Edge::Low,
                Edge::High,
                Edge::Wait(400),
                Edge::Low,
                Edge::Wait(800),
                Edge::High,
                Edge::Wait(800),
                Edge::Low,
                Edge::Wait(400),
                Edge::Low,
            ]
        );
    }

    #[test]
    fn transmit_keeps_consecutive_one_bits_high() {
        let (mut radio, scope) = transmitter(None);
        let encoded =
            encode_bytes(&[0xC0], PulseSymbol::new(0, 335), PulseSymbol::new(359, 0)).unwrap();

        radio.transmit(&encoded).unwrap();

        let edges = scope.edges();
        // initial low, then two high halves with no low edge between them
        assert_eq!(
            &edges[..5],
            &[
                Edge::Low,
                Edge::High,
                Edge::Wait(359),
                Edge::High,
                Edge::Wait(359)
            ]
        );
        assert_eq!(edges.last(), Some(&Edge::Low));
        let waited: u32 = edges
            .iter()
            .map(|e| match e {
                Edge::Wait(us) => *us,
                _ => 0,
            })
            .sum();
        assert_eq!(waited, 2 * 359 + 6 * 335);
    }

    #[test]
    fn transmit_failure_reports_symbol() {
        // initialize, high, low, then the next high fails
        let (mut radio, _scope) = transmitter(Some(3));

        match radio.transmit(&train(&[(100, 100), (100, 100)])) {
            Err(Error::TransmissionIncomplete { pin, symbol }) => {
                assert_eq!(pin, 17);
                assert_eq!(symbol, 1);
            }
            other => panic!("expected TransmissionIncomplete, got {:?}", other),
        }
    }

    #[test]
    fn send_repeats_without_trailing_gap() {
        let (mut radio, scope) = transmitter(None);
        let single = train(&[(100, 200)]);

        radio.send(&single, 3, 14_000).unwrap();

        let edges = scope.edges();
        let gaps = edges.iter().filter(|e| **e == Edge::Wait(14_000)).count();
        let pulses = edges.iter().filter(|e| **e == Edge::Wait(100)).count();
        assert_eq!(gaps, 2);
        assert_eq!(pulses, 3);
        assert_eq!(edges[edges.len() - 2], Edge::Wait(200));
        assert_eq!(edges.last(), Some(&Edge::Low));
    }

    #[test]
    fn send_counts_transmissions_on_mock() {
        let mut radio = RadioMock::new(22);
        let log = radio.log();
        let single = train(&[(100, 200)]);

        radio.send(&single, 10, 14_000).unwrap();

        let log = log.lock().unwrap();
        let transmissions = log
            .iter()
            .filter(|e| matches!(e, RadioEvent::Transmit { .. }))
            .count();
        let gaps = log
            .iter()
            .filter(|e| matches!(e, RadioEvent::Pause { micros: 14_000, .. }))
            .count();
        assert_eq!(transmissions, 10);
        assert_eq!(gaps, 9);
        assert!(matches!(log.last(), Some(RadioEvent::Transmit { .. })));
    }

    #[test]
    fn drop_leaves_line_low() {
        let (mut radio, scope) = transmitter(None);
        radio.line.set_high().unwrap();

        drop(radio);

        assert_eq!(scope.edges().last(), Some(&Edge::Low));
    }
}
