//! Node server configuration
use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};

use crate::{
    datatypes::RemoteDef,
    error::Result,
    gpio::DEFAULT_GPIO_ROOT,
    remotedb::HARBOR_BREEZE_6_SPEED,
};

pub const DEFAULT_GPIO_PIN: u8 = 17;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gpio_root: PathBuf,
    /// Seconds between status reports
    pub short_poll_secs: u64,
    /// Remote definitions added to the built-in database
    pub remotes: BTreeMap<String, RemoteDef>,
    pub nodes: Vec<NodeConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gpio_root: PathBuf::from(DEFAULT_GPIO_ROOT),
            short_poll_secs: 10,
            remotes: BTreeMap::new(),
            nodes: vec![NodeConfig::default()],
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub address: String,
    pub name: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_gpio_pin")]
    pub gpio_pin: u8,
    /// Speed restored by the first turn-on. Unset means 3, or the remote's
    /// top speed if it has fewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_on_speed: Option<u8>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: String::from("00"),
            name: String::from("Harbor Breeze 6 Button Remote"),
            remote: default_remote(),
            gpio_pin: DEFAULT_GPIO_PIN,
            default_on_speed: None,
        }
    }
}

fn default_remote() -> String {
    String::from(HARBOR_BREEZE_6_SPEED)
}

fn default_gpio_pin() -> u8 {
    DEFAULT_GPIO_PIN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::tests::SMALL_REMOTE_JSON;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_json("{}").unwrap();

        assert_eq!(config.gpio_root, PathBuf::from("/sys/class/gpio"));
        assert_eq!(config.short_poll_secs, 10);
        assert_eq!(config.nodes, vec![NodeConfig::default()]);
        assert_eq!(config.nodes[0].gpio_pin, 17);
    }

    #[test]
    fn node_fields_default() {
        let config = Config::from_json(
            r#"{"nodes": [{"address": "01", "name": "Bedroom", "gpio_pin": 22}]}"#,
        )
        .unwrap();

        let node = &config.nodes[0];
        assert_eq!(node.remote, HARBOR_BREEZE_6_SPEED);
        assert_eq!(node.gpio_pin, 22);
        assert_eq!(node.default_on_speed, None);
    }

    #[test]
    fn remotes_are_parsed() {
        let json = format!(r#"{{"remotes": {{"small": {}}}, "nodes": []}}"#, SMALL_REMOTE_JSON);

        let config = Config::from_json(&json).unwrap();

        assert!(config.nodes.is_empty());
        assert_eq!(config.remotes["small"].parms.inter_packet_gap_us, 5000);
    }

    #[test]
    fn explicit_default_on_speed() {
        let config = Config::from_json(
            r#"{"nodes": [{"address": "01", "name": "Bedroom", "default_on_speed": 1}]}"#,
        )
        .unwrap();

        assert_eq!(config.nodes[0].default_on_speed, Some(1));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(Config::from_json("{\"nodes\": 3}").is_err());
    }
}
