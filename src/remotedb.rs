//! Built-in remote control database
//!
//! Each remote's byte codes were captured from the physical remote and
//! must be reproduced exactly, or the paired receiver ignores them.
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    datatypes::{PulseSymbol, PulseTrain, RemoteDef, RemoteProfile, SpeedTable, TransmitParams},
    error::{Error, Result},
    protocol::encode_bytes,
};

pub const HARBOR_BREEZE_6_SPEED: &str = "harbor_breeze_6_speed_dc_remote_0";

const HB_ZERO: PulseSymbol = PulseSymbol::new(0, 335);
const HB_ONE: PulseSymbol = PulseSymbol::new(359, 0);
const HB_PREFIX: [u8; 6] = [0x92, 0x49, 0x24, 0x92, 0x49, 0x24];
const HB_SUFFIX: [u8; 2] = [0x2C, 0x80];

// (name, aliases, the two bytes that vary between buttons)
const HB_CODES: &[(&str, &[&str], [u8; 2])] = &[
    ("airup", &[], [0xB6, 0xC9]),
    ("airdn", &[], [0xB6, 0xCB]),
    ("natup", &[], [0x92, 0x59]),
    ("natdn", &[], [0x92, 0x5B]),
    ("airup0", &[], [0xB6, 0xD9]),
    ("airup1", &["up1"], [0x96, 0xD9]),
    ("airup2", &["up2"], [0xB2, 0xD9]),
    ("airup3", &["up3"], [0x92, 0xD9]),
    ("airup4", &["up4"], [0xB6, 0x59]),
    ("airup5", &["up5"], [0x96, 0x59]),
    ("airup6", &["up6"], [0xB2, 0x59]),
    // "off" for both speed tables; airup0 is only reachable by name
    ("airdn0", &["off"], [0xB6, 0xDB]),
    ("airdn1", &["dn1"], [0x96, 0xDB]),
    ("airdn2", &["dn2"], [0xB2, 0xDB]),
    ("airdn3", &["dn3"], [0x92, 0xDB]),
    ("airdn4", &["dn4"], [0xB6, 0x5B]),
    ("airdn5", &["dn5"], [0x96, 0x5B]),
    ("airdn6", &["dn6"], [0xB2, 0x5B]),
];

fn harbor_breeze_code(code: [u8; 2]) -> Result<PulseTrain> {
    let mut bytes = HB_PREFIX.to_vec();
    bytes.extend_from_slice(&code);
    bytes.extend_from_slice(&HB_SUFFIX);
    encode_bytes(&bytes, HB_ZERO, HB_ONE)
}

fn names(prefix: &str) -> Vec<String> {
    let mut names = vec![String::from("off")];
    names.extend((1..=6).map(|speed| format!("{}{}", prefix, speed)));
    names
}

/// Harbor Breeze 6-speed DC ceiling fan remote
pub fn harbor_breeze_6_speed() -> Result<RemoteProfile> {
    let mut commands = BTreeMap::new();
    for (name, aliases, code) in HB_CODES {
        let train = harbor_breeze_code(*code)?;
        for alias in aliases.iter() {
            commands.insert(alias.to_string(), train.clone());
        }
        commands.insert(name.to_string(), train);
    }

    RemoteProfile::new(
        HARBOR_BREEZE_6_SPEED,
        commands,
        TransmitParams {
            repeat_count: 10,
            inter_packet_gap_us: 14_000,
        },
        SpeedTable {
            summer: names("dn"),
            winter: names("up"),
        },
    )
}

/// Remote profiles by name, shared read-only with every adapter.
#[derive(Debug, Clone, Default)]
pub struct RemoteDb {
    profiles: BTreeMap<String, Arc<RemoteProfile>>,
}

impl RemoteDb {
    pub fn builtin() -> Result<Self> {
        let mut db = Self::default();
        db.insert(harbor_breeze_6_speed()?);
        Ok(db)
    }

    /// Built-in remotes plus `defs`; a definition replaces a built-in of the
    /// same name.
    pub fn with_defs(defs: &BTreeMap<String, RemoteDef>) -> Result<Self> {
        let mut db = Self::builtin()?;
        for (name, def) in defs {
            db.insert(RemoteProfile::from_def(name, def)?);
        }
        Ok(db)
    }

    pub fn insert(&mut self, profile: RemoteProfile) {
        self.profiles
            .insert(profile.name().to_owned(), Arc::new(profile));
    }

    pub fn get(&self, name: &str) -> Result<Arc<RemoteProfile>> {
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownRemote(name.to_owned()))
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Arc<RemoteProfile>> {
        self.profiles.values()
    }
}
