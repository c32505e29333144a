use std::{collections::BTreeMap, sync::Arc};

use crate::{
    error::{Error, Result},
    protocol,
};

/// One unit of transmission: line high for `high_us`, then low for `low_us`.
///
/// A zero-length half leaves the line where it is, so a train of
/// `(359, 0)` symbols is one continuous high period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct PulseSymbol {
    pub high_us: u32,
    pub low_us: u32,
}

impl PulseSymbol {
    pub const fn new(high_us: u32, low_us: u32) -> Self {
        Self { high_us, low_us }
    }

    pub fn duration_us(&self) -> u64 {
        u64::from(self.high_us) + u64::from(self.low_us)
    }
}

impl From<(u32, u32)> for PulseSymbol {
    fn from((high_us, low_us): (u32, u32)) -> Self {
        Self::new(high_us, low_us)
    }
}

impl From<PulseSymbol> for (u32, u32) {
    fn from(symbol: PulseSymbol) -> Self {
        (symbol.high_us, symbol.low_us)
    }
}

/// A complete command waveform. Clones share storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseTrain(Arc<[PulseSymbol]>);

impl PulseTrain {
    pub fn new(symbols: Vec<PulseSymbol>) -> Result<Self> {
        if symbols.is_empty() {
            return Err(Error::InvalidProfile(String::from(
                "a pulse train needs at least one symbol",
            )));
        }
        if let Some(index) = symbols.iter().position(|s| s.duration_us() == 0) {
            return Err(Error::InvalidProfile(format!(
                "symbol {} has no duration",
                index
            )));
        }
        Ok(Self(symbols.into()))
    }

    pub fn symbols(&self) -> &[PulseSymbol] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &PulseSymbol> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Air time of one transmission in microseconds
    pub fn duration_us(&self) -> u64 {
        self.0.iter().map(PulseSymbol::duration_us).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitParams {
    /// Transmissions per button press
    pub repeat_count: u32,
    pub inter_packet_gap_us: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FanMode {
    Summer,
    Winter,
}

impl FanMode {
    pub fn from_flag(flag: u32) -> Self {
        if flag == 0 {
            FanMode::Summer
        } else {
            FanMode::Winter
        }
    }

    pub fn flag(self) -> u8 {
        match self {
            FanMode::Summer => 0,
            FanMode::Winter => 1,
        }
    }
}

impl Default for FanMode {
    fn default() -> Self {
        FanMode::Summer
    }
}

/// Command names per fan mode, indexed by speed. Index 0 is off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedTable {
    pub summer: Vec<String>,
    pub winter: Vec<String>,
}

impl SpeedTable {
    pub fn command(&self, mode: FanMode, speed: u8) -> Option<&str> {
        let commands = match mode {
            FanMode::Summer => &self.summer,
            FanMode::Winter => &self.winter,
        };
        commands.get(usize::from(speed)).map(String::as_str)
    }

    /// Highest non-off speed
    pub fn max_speed(&self) -> u8 {
        (self.summer.len().saturating_sub(1)) as u8
    }

    fn validate(&self, commands: &BTreeMap<String, PulseTrain>) -> Result<()> {
        if self.summer.len() < 2 || self.summer.len() != self.winter.len() {
            return Err(Error::InvalidProfile(String::from(
                "speed tables need an off entry, at least one speed, and equal lengths",
            )));
        }
        if self.summer.len() > usize::from(u8::MAX) {
            return Err(Error::InvalidProfile(String::from("too many speeds")));
        }
        for name in self.summer.iter().chain(self.winter.iter()) {
            if !commands.contains_key(name) {
                return Err(Error::InvalidProfile(format!(
                    "speed command {} is not defined",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Serialized form of a command waveform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WaveformDef {
    Pulses(Vec<PulseSymbol>),
    Encoded {
        bytes: Vec<u8>,
        zero: PulseSymbol,
        one: PulseSymbol,
    },
}

impl WaveformDef {
    pub fn build(&self) -> Result<PulseTrain> {
        match self {
            WaveformDef::Pulses(symbols) => PulseTrain::new(symbols.clone()),
            WaveformDef::Encoded { bytes, zero, one } => {
                protocol::encode_bytes(bytes, *zero, *one)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDef {
    pub parms: TransmitParams,
    pub symbols: BTreeMap<String, WaveformDef>,
    pub speeds: SpeedTable,
}

/// A validated, read-only remote: its command table, resend policy and
/// fan speed layout.
#[derive(Debug, Clone)]
pub struct RemoteProfile {
    name: String,
    commands: BTreeMap<String, PulseTrain>,
    params: TransmitParams,
    speeds: SpeedTable,
}

impl RemoteProfile {
    pub fn new(
        name: &str,
        commands: BTreeMap<String, PulseTrain>,
        params: TransmitParams,
        speeds: SpeedTable,
    ) -> Result<Self> {
        if params.repeat_count == 0 {
            return Err(Error::InvalidProfile(format!(
                "{}: repeat_count must be at least 1",
                name
            )));
        }
        if commands.is_empty() {
            return Err(Error::InvalidProfile(format!("{}: no commands", name)));
        }
        speeds.validate(&commands)?;
        Ok(Self {
            name: name.to_owned(),
            commands,
            params,
            speeds,
        })
    }

    pub fn from_def(name: &str, def: &RemoteDef) -> Result<Self> {
        let mut commands = BTreeMap::new();
        for (command, waveform) in &def.symbols {
            let train = waveform.build().map_err(|err| {
                Error::InvalidProfile(format!("{}/{}: {}", name, command, err))
            })?;
            commands.insert(command.clone(), train);
        }
        Self::new(name, commands, def.parms, def.speeds.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exact-name lookup of a command's pulse train
    pub fn resolve(&self, command: &str) -> Result<&PulseTrain> {
        self.commands
            .get(command)
            .ok_or_else(|| Error::UnknownCommand(command.to_owned()))
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn params(&self) -> TransmitParams {
        self.params
    }

    pub fn speeds(&self) -> &SpeedTable {
        &self.speeds
    }
}
