//! Routes host commands to fan nodes
use std::{fmt, str::FromStr, sync::Arc};

use rayon::prelude::*;
use tracing::{error, info};

use crate::{
    capabilities::Fan,
    config::Config,
    datatypes::FanMode,
    devices::{FanNode, FanState, Remote},
    error::{Error, Result},
    gpio::RadioBinder,
    remotedb::RemoteDb,
};

/// Commands a home controller can issue to a fan node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    On,
    Off,
    FastOn,
    FastOff,
    Brighten,
    Dim,
    Query,
    SetSpeed(u32),
    SetMode(u32),
    SetGpio(u32),
}

impl FromStr for HostCommand {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let invalid = || Error::InvalidHostCommand(line.to_owned());
        let mut words = line.split_whitespace();
        let name = words.next().ok_or_else(invalid)?.to_ascii_uppercase();
        let mut value = || -> Result<u32> {
            words
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(invalid)
        };

        let command = match name.as_str() {
            "DON" => HostCommand::On,
            "DOF" => HostCommand::Off,
            "DFON" => HostCommand::FastOn,
            "DFOF" => HostCommand::FastOff,
            "BRT" => HostCommand::Brighten,
            "DIM" => HostCommand::Dim,
            "QUERY" => HostCommand::Query,
            "SETSPEED" => HostCommand::SetSpeed(value()?),
            "SETMODE" => HostCommand::SetMode(value()?),
            "SETGPIO" => HostCommand::SetGpio(value()?),
            _ => return Err(invalid()),
        };
        Ok(command)
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HostCommand::On => f.write_str("DON"),
            HostCommand::Off => f.write_str("DOF"),
            HostCommand::FastOn => f.write_str("DFON"),
            HostCommand::FastOff => f.write_str("DFOF"),
            HostCommand::Brighten => f.write_str("BRT"),
            HostCommand::Dim => f.write_str("DIM"),
            HostCommand::Query => f.write_str("QUERY"),
            HostCommand::SetSpeed(v) => write!(f, "SETSPEED {}", v),
            HostCommand::SetMode(v) => write!(f, "SETMODE {}", v),
            HostCommand::SetGpio(v) => write!(f, "SETGPIO {}", v),
        }
    }
}

/// Node a host request is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Node(String),
    /// `*`, every node. Only turning off and querying fan out.
    All,
}

/// Parse one host request line, `<address> <COMMAND> [value]` with `*` as
/// the address for every node.
pub fn parse_request(line: &str) -> Result<(Target, HostCommand)> {
    let line = line.trim();
    let split = line
        .find(char::is_whitespace)
        .ok_or_else(|| Error::InvalidHostCommand(line.to_owned()))?;
    let command = line[split..].parse::<HostCommand>()?;
    let target = match &line[..split] {
        "*" => match command {
            HostCommand::Off | HostCommand::FastOff | HostCommand::Query => Target::All,
            other => return Err(Error::InvalidHostCommand(format!("* {}", other))),
        },
        address => Target::Node(address.to_owned()),
    };
    Ok((target, command))
}

/// Status report for one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub address: String,
    pub name: String,
    #[serde(flatten)]
    pub state: FanState,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}\t{}\tspeed={}\tmode={:?}\tpin={}",
            self.address, self.name, self.state.speed, self.state.mode, self.state.pin
        )
    }
}

impl<R> From<&FanNode<R>> for NodeStatus
where
    R: crate::capabilities::RemoteActions,
{
    fn from(node: &FanNode<R>) -> Self {
        NodeStatus {
            address: node.address().to_owned(),
            name: node.name().to_owned(),
            state: node.state(),
        }
    }
}

pub struct Controller {
    nodes: Vec<FanNode>,
}

impl Controller {
    /// Create a node for every configured fan. Nodes whose pin cannot be
    /// claimed are left out; a repeated address or pin is an error.
    pub fn discover(config: &Config, db: &RemoteDb, binder: Arc<dyn RadioBinder>) -> Result<Self> {
        let mut nodes: Vec<FanNode> = Vec::with_capacity(config.nodes.len());

        for (i, node_config) in config.nodes.iter().enumerate() {
            let earlier = &config.nodes[..i];
            if earlier.iter().any(|n| n.address == node_config.address) {
                return Err(Error::Other(format!(
                    "duplicate node address {}",
                    node_config.address
                )));
            }
            if let Some(owner) = earlier.iter().find(|n| n.gpio_pin == node_config.gpio_pin) {
                return Err(Error::PinConfiguration {
                    pin: node_config.gpio_pin,
                    reason: format!(
                        "configured for both node {} and node {}",
                        owner.address, node_config.address
                    ),
                });
            }
            let profile = db.get(&node_config.remote)?;
            let speeds = profile.speeds().clone();
            let remote = match Remote::new(profile, Arc::clone(&binder), node_config.gpio_pin) {
                Ok(remote) => remote,
                Err(err) => {
                    error!(address = %node_config.address, error = %err, "node not registered");
                    continue;
                }
            };
            let mut node = FanNode::new(&node_config.address, &node_config.name, remote, speeds);
            if let Some(speed) = node_config.default_on_speed {
                node = node.with_default_on_speed(speed)?;
            }
            info!(address = %node.address(), name = %node.name(), "adding node");
            nodes.push(node);
        }

        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[FanNode] {
        &self.nodes
    }

    fn node_mut(&mut self, address: &str) -> Result<&mut FanNode> {
        self.nodes
            .iter_mut()
            .find(|n| n.address() == address)
            .ok_or_else(|| Error::UnknownNode(address.to_owned()))
    }

    // Address of the node other than `except` that drives `pin`
    fn pin_owner(&self, pin: u32, except: &str) -> Option<String> {
        self.nodes
            .iter()
            .find(|n| n.address() != except && u32::from(n.state().pin) == pin)
            .map(|n| n.address().to_owned())
    }

    pub fn dispatch(&mut self, address: &str, command: HostCommand) -> Result<NodeStatus> {
        info!(address, %command, "host command");
        let owner = match command {
            HostCommand::SetGpio(pin) => self.pin_owner(pin, address).map(|owner| (pin, owner)),
            _ => None,
        };
        let node = self.node_mut(address)?;
        if let Some((pin, owner)) = owner {
            return Err(Error::PinConfiguration {
                pin: pin as u8,
                reason: format!("in use by node {}", owner),
            });
        }
        match command {
            HostCommand::On => node.turn_on()?,
            HostCommand::Off | HostCommand::FastOff => node.turn_off()?,
            HostCommand::FastOn => node.fast_on()?,
            HostCommand::Brighten => node.increase_speed()?,
            HostCommand::Dim => node.decrease_speed()?,
            HostCommand::Query => {}
            HostCommand::SetSpeed(value) => node.set_speed(value)?,
            HostCommand::SetMode(flag) => node.set_mode(FanMode::from_flag(flag)),
            HostCommand::SetGpio(pin) => node.set_pin(pin)?,
        }
        Ok(NodeStatus::from(&*node))
    }

    /// Status of every node
    pub fn query(&self) -> Vec<NodeStatus> {
        self.nodes.iter().map(NodeStatus::from).collect()
    }

    /// Run a parsed host request and return the status of every node it
    /// touched.
    pub fn execute(&mut self, target: &Target, command: HostCommand) -> Result<Vec<NodeStatus>> {
        let address = match target {
            Target::Node(address) => address,
            Target::All => {
                match command {
                    HostCommand::Off | HostCommand::FastOff => {
                        for (address, result) in self.all_off() {
                            if let Err(err) = result {
                                error!(%address, error = %err, "turn off failed");
                            }
                        }
                    }
                    HostCommand::Query => {}
                    other => return Err(Error::InvalidHostCommand(format!("* {}", other))),
                }
                return Ok(self.query());
            }
        };
        Ok(vec![self.dispatch(address, command)?])
    }

    /// Turn every fan off. No two nodes share a line, so they transmit in
    /// parallel.
    pub fn all_off(&mut self) -> Vec<(String, Result<()>)> {
        self.nodes
            .par_iter_mut()
            .map(|node| (node.address().to_owned(), node.turn_off()))
            .collect()
    }
}
