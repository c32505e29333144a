use std::{env, sync::Arc, thread, time::Duration};

use pdmremote::{
    capabilities::Fan,
    devices::{FanNode, Remote},
    gpio::SysfsBinder,
    remotedb,
};

// Walk a fan on GPIO 17 (or the pin given as the first argument) through
// every summer speed, then switch it off.
fn main() {
    let pin = env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(17);
    let profile = Arc::new(remotedb::harbor_breeze_6_speed().unwrap());
    let remote = Remote::new(Arc::clone(&profile), Arc::new(SysfsBinder::default()), pin).unwrap();
    let mut fan = FanNode::new("00", "Demo fan", remote, profile.speeds().clone());

    for speed in 1..=fan.max_speed() {
        fan.set_speed(u32::from(speed)).unwrap();
        println!("speed {}", fan.speed());
        thread::sleep(Duration::from_secs(3));
    }
    fan.turn_off().unwrap();
}
