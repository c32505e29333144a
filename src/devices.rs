use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    capabilities::{Fan, RemoteActions},
    datatypes::{FanMode, PulseTrain, RemoteProfile, SpeedTable},
    error::{Error, Result},
    gpio::{RadioBinder, MAX_GPIO_PIN},
    protocol::Radio,
};

/// Speed restored by the first turn-on of a node
pub const DEFAULT_ON_SPEED: u8 = 3;

/// A remote control profile bound to a radio line.
pub struct Remote {
    profile: Arc<RemoteProfile>,
    binder: Arc<dyn RadioBinder>,
    radio: Option<Box<dyn Radio>>,
    pin: u8,
}

impl Remote {
    pub fn new(profile: Arc<RemoteProfile>, binder: Arc<dyn RadioBinder>, pin: u8) -> Result<Self> {
        let radio = binder.bind(pin)?;
        Ok(Self {
            profile,
            binder,
            radio: Some(radio),
            pin,
        })
    }

    pub fn profile(&self) -> &RemoteProfile {
        &self.profile
    }
}

impl RemoteActions for Remote {
    fn resolve_command(&self, name: &str) -> Result<&PulseTrain> {
        self.profile.resolve(name)
    }

    fn send(&mut self, name: &str) -> Result<()> {
        let train = self.profile.resolve(name)?;
        let params = self.profile.params();
        // lost after a failed rebind, claim the line again before giving up
        if self.radio.is_none() {
            self.radio = Some(self.binder.bind(self.pin)?);
            info!(pin = self.pin, "radio line reclaimed");
        }
        match self.radio.as_mut() {
            Some(radio) => radio.send(train, params.repeat_count, params.inter_packet_gap_us),
            None => Err(Error::PinConfiguration {
                pin: self.pin,
                reason: String::from("no radio line bound"),
            }),
        }
    }

    fn pin(&self) -> u8 {
        self.pin
    }

    fn rebind(&mut self, pin: u8) -> Result<()> {
        if pin > MAX_GPIO_PIN {
            return Err(Error::PinConfiguration {
                pin,
                reason: format!("pin number must be at most {}", MAX_GPIO_PIN),
            });
        }

        let old_pin = self.pin;
        // release first, the new pin may be the same line
        self.radio = None;
        match self.binder.bind(pin) {
            Ok(radio) => {
                info!(old_pin, pin, "radio moved");
                self.radio = Some(radio);
                self.pin = pin;
                Ok(())
            }
            Err(err) => {
                warn!(old_pin, pin, error = %err, "rebind failed, restoring old pin");
                match self.binder.bind(old_pin) {
                    Ok(radio) => {
                        self.radio = Some(radio);
                        Err(err)
                    }
                    Err(restore) => {
                        error!(old_pin, pin, error = %restore, "could not restore old pin");
                        Err(Error::PinConfiguration {
                            pin,
                            reason: format!(
                                "{}; pin {} could not be reclaimed either: {}",
                                err, old_pin, restore
                            ),
                        })
                    }
                }
            }
        }
    }
}

/// Host-facing state of one fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FanState {
    #[serde(rename = "ST")]
    pub speed: u8,
    #[serde(rename = "GV0", serialize_with = "serialize_mode")]
    pub mode: FanMode,
    #[serde(rename = "GV1")]
    pub pin: u8,
}

fn serialize_mode<S>(mode: &FanMode, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u8(mode.flag())
}

/// A ceiling fan driven through a remote.
pub struct FanNode<R = Remote> {
    address: String,
    name: String,
    remote: R,
    speeds: SpeedTable,
    speed: u8,
    mode: FanMode,
    last_on_speed: u8,
}

impl<R: RemoteActions> FanNode<R> {
    pub fn new(address: &str, name: &str, remote: R, speeds: SpeedTable) -> Self {
        let last_on_speed = DEFAULT_ON_SPEED.min(speeds.max_speed());
        Self {
            address: address.to_owned(),
            name: name.to_owned(),
            remote,
            speeds,
            speed: 0,
            mode: FanMode::Summer,
            last_on_speed,
        }
    }

    /// Override the speed restored by the first turn-on
    pub fn with_default_on_speed(mut self, speed: u8) -> Result<Self> {
        let max = self.speeds.max_speed();
        if speed == 0 || speed > max {
            return Err(Error::InvalidSpeed {
                value: u32::from(speed),
                max,
            });
        }
        self.last_on_speed = speed;
        Ok(self)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn state(&self) -> FanState {
        FanState {
            speed: self.speed,
            mode: self.mode,
            pin: self.remote.pin(),
        }
    }

    pub fn set_pin(&mut self, pin: u32) -> Result<()> {
        if pin > u32::from(MAX_GPIO_PIN) {
            return Err(Error::PinConfiguration {
                pin: pin.min(u32::from(u8::MAX)) as u8,
                reason: format!("pin number must be at most {}", MAX_GPIO_PIN),
            });
        }
        self.remote.rebind(pin as u8)
    }
}

impl<R: RemoteActions> Fan for FanNode<R> {
    fn speed(&self) -> u8 {
        self.speed
    }

    fn max_speed(&self) -> u8 {
        self.speeds.max_speed()
    }

    fn mode(&self) -> FanMode {
        self.mode
    }

    fn last_on_speed(&self) -> u8 {
        self.last_on_speed
    }

    fn apply_speed(&mut self, speed: u8) -> Result<()> {
        let command = self.speeds.command(self.mode, speed).ok_or(Error::InvalidSpeed {
            value: u32::from(speed),
            max: self.speeds.max_speed(),
        })?;
        self.remote.send(command)?;
        self.speed = speed;
        if speed > 0 {
            self.last_on_speed = speed;
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: FanMode) {
        self.mode = mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gpio::BinderMock,
        protocol::{RadioEvent, RadioLog},
        remotedb,
    };

    fn fan() -> (FanNode, Arc<BinderMock>, Arc<RemoteProfile>) {
        let binder = Arc::new(BinderMock::new());
        let profile = Arc::new(remotedb::harbor_breeze_6_speed().unwrap());
        let remote = Remote::new(Arc::clone(&profile), binder.clone(), 17).unwrap();
        let node = FanNode::new("00", "Living Room", remote, profile.speeds().clone());
        (node, binder, profile)
    }

    fn transmissions(log: &RadioLog) -> Vec<PulseTrain> {
        log.lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                RadioEvent::Transmit { train, .. } => Some(train.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn turn_on_uses_default_speed() {
        let (mut node, binder, profile) = fan();

        node.turn_on().unwrap();

        assert_eq!(node.speed(), 3);
        let sent = transmissions(&binder.log());
        assert_eq!(sent.len(), 10);
        assert!(sent.iter().all(|t| t == profile.resolve("dn3").unwrap()));
    }

    #[test]
    fn turn_on_after_turn_off_restores_speed() {
        let (mut node, _binder, _profile) = fan();
        node.set_speed(5).unwrap();

        node.turn_off().unwrap();
        assert_eq!(node.speed(), 0);
        node.turn_on().unwrap();

        assert_eq!(node.speed(), 5);
    }

    #[test]
    fn turn_on_then_three_increases() {
        let (mut node, binder, profile) = fan();

        node.turn_on().unwrap();
        for _ in 0..3 {
            node.increase_speed().unwrap();
        }

        assert_eq!(node.speed(), 6);
        let sent = transmissions(&binder.log());
        assert_eq!(sent.len(), 40);
        assert_eq!(&sent[39], profile.resolve("dn6").unwrap());
    }

    #[test]
    fn turn_on_with_default_one_then_three_increases() {
        let (node, binder, profile) = fan();
        let mut node = node.with_default_on_speed(1).unwrap();

        node.turn_on().unwrap();
        for _ in 0..3 {
            node.increase_speed().unwrap();
        }

        assert_eq!(node.speed(), 4);
        let sent = transmissions(&binder.log());
        assert_eq!(sent.len(), 40);
        for (press, speed) in ["dn1", "dn2", "dn3", "dn4"].iter().enumerate() {
            let train = profile.resolve(speed).unwrap();
            assert!(sent[press * 10..(press + 1) * 10].iter().all(|t| t == train));
        }
    }

    #[test]
    fn increase_at_max_retransmits() {
        let (mut node, binder, profile) = fan();
        node.set_speed(6).unwrap();

        node.increase_speed().unwrap();

        assert_eq!(node.speed(), 6);
        let sent = transmissions(&binder.log());
        assert_eq!(sent.len(), 20);
        assert_eq!(&sent[19], profile.resolve("dn6").unwrap());
    }

    #[test]
    fn decrease_at_zero_sends_off() {
        let (mut node, binder, profile) = fan();

        node.decrease_speed().unwrap();

        assert_eq!(node.speed(), 0);
        let sent = transmissions(&binder.log());
        assert_eq!(sent.len(), 10);
        assert!(sent.iter().all(|t| t == profile.resolve("off").unwrap()));
    }

    #[test]
    fn set_speed_out_of_range_is_rejected() {
        let (mut node, binder, _profile) = fan();
        node.set_speed(2).unwrap();

        match node.set_speed(9) {
            Err(Error::InvalidSpeed { value, max }) => {
                assert_eq!(value, 9);
                assert_eq!(max, 6);
            }
            other => panic!("expected InvalidSpeed, got {:?}", other),
        }
        assert_eq!(node.speed(), 2);
        assert_eq!(transmissions(&binder.log()).len(), 10);
    }

    #[test]
    fn set_mode_selects_winter_table_without_sending() {
        let (mut node, binder, profile) = fan();

        node.set_mode(FanMode::Winter);
        assert!(transmissions(&binder.log()).is_empty());
        node.set_speed(2).unwrap();

        let sent = transmissions(&binder.log());
        assert!(sent.iter().all(|t| t == profile.resolve("up2").unwrap()));
        assert_eq!(node.state().mode, FanMode::Winter);
    }

    #[test]
    fn fast_on_sets_speed_three() {
        let (mut node, _binder, _profile) = fan();
        node.set_speed(6).unwrap();

        node.fast_on().unwrap();

        assert_eq!(node.speed(), 3);
    }

    #[test]
    fn failed_send_keeps_state() {
        let binder = Arc::new(BinderMock::new());
        let profile = Arc::new(remotedb::harbor_breeze_6_speed().unwrap());
        let remote = Remote::new(Arc::clone(&profile), binder.clone(), 17).unwrap();
        let mut speeds = profile.speeds().clone();
        speeds.summer[2] = String::from("missing");
        let mut node = FanNode::new("00", "Fan", remote, speeds);

        assert!(matches!(node.set_speed(2), Err(Error::UnknownCommand(_))));
        assert_eq!(node.speed(), 0);
    }

    #[test]
    fn rebind_moves_radio() {
        let (mut node, binder, _profile) = fan();

        node.set_pin(22).unwrap();
        node.turn_on().unwrap();

        assert_eq!(node.state().pin, 22);
        assert_eq!(binder.bound(), vec![17, 22]);
        let log = binder.log();
        let log = log.lock().unwrap();
        assert!(log.contains(&RadioEvent::Released { pin: 17 }));
        assert!(log
            .iter()
            .filter(|e| matches!(e, RadioEvent::Transmit { .. }))
            .all(|e| matches!(e, RadioEvent::Transmit { pin: 22, .. })));
    }

    #[test]
    fn rebind_failure_restores_old_pin() {
        let (mut node, binder, _profile) = fan();
        binder.fail_pin(4);

        assert!(matches!(
            node.set_pin(4),
            Err(Error::PinConfiguration { pin: 4, .. })
        ));
        node.turn_on().unwrap();

        assert_eq!(node.state().pin, 17);
        assert_eq!(binder.bound(), vec![17, 17]);
    }

    #[test]
    fn rebind_failure_without_old_line_reclaims_on_next_send() {
        let (mut node, binder, _profile) = fan();
        binder.fail_pin(4);
        binder.fail_pin(17);

        match node.set_pin(4) {
            Err(Error::PinConfiguration { pin, reason }) => {
                assert_eq!(pin, 4);
                assert!(reason.contains("pin 17"));
            }
            other => panic!("expected PinConfiguration, got {:?}", other),
        }
        assert_eq!(node.state().pin, 17);
        assert!(matches!(
            node.turn_on(),
            Err(Error::PinConfiguration { pin: 17, .. })
        ));
        assert_eq!(node.state().speed, 0);

        binder.allow_pin(17);
        node.turn_on().unwrap();

        assert_eq!(node.state().speed, 3);
        assert_eq!(node.state().pin, 17);
        assert_eq!(binder.bound(), vec![17, 17]);
    }

    #[test]
    fn set_pin_rejects_out_of_range() {
        let (mut node, binder, _profile) = fan();

        assert!(node.set_pin(28).is_err());
        assert_eq!(binder.bound(), vec![17]);
    }

    #[test]
    fn state_serialises_as_drivers() {
        let (mut node, _binder, _profile) = fan();
        node.set_mode(FanMode::Winter);
        node.set_speed(4).unwrap();

        let json = serde_json::to_value(node.state()).unwrap();

        assert_eq!(json, serde_json::json!({"ST": 4, "GV0": 1, "GV1": 17}));
    }

    #[test]
    fn default_on_speed_is_validated() {
        let (node, _binder, _profile) = fan();

        assert!(node.with_default_on_speed(7).is_err());
    }
}
