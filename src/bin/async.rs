use std::{sync::Arc, time::Duration};

use clap::{App, Arg};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{error, info, Level};

use pdmremote::{
    config::Config,
    controller::{parse_request, Controller, NodeStatus},
    error::Result,
    gpio::{SysfsBinder, SysfsGpio},
    remotedb::RemoteDb,
    tokio::worker::Worker,
};

fn report(statuses: &[NodeStatus]) {
    for status in statuses {
        match serde_json::to_string(status) {
            Ok(line) => println!("{}", line),
            Err(err) => error!(error = %err, "could not encode status"),
        }
    }
}

async fn handle(worker: &Worker, line: &str) -> Result<()> {
    let (target, command) = parse_request(line)?;
    report(&worker.execute(target, command).await?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = App::new("PDM remote node server (async)")
        .arg(Arg::with_name("config")
            .long("config")
            .short("c")
            .takes_value(true)
            .value_name("FILE")
            .help("JSON configuration file.")
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let config = match matches.value_of("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let db = RemoteDb::with_defs(&config.remotes)?;
    let binder = Arc::new(SysfsBinder::new(SysfsGpio::new(&config.gpio_root)));
    let controller = Controller::discover(&config, &db, binder)?;
    let (worker, _handle) = Worker::spawn(controller);

    let mut poll = tokio::time::interval(Duration::from_secs(config.short_poll_secs.max(1)));
    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        tokio::select! {
            _ = poll.tick() => {
                report(&worker.query().await?);
            }
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Err(err) = handle(&worker, &line).await {
                        error!(error = %err, "request failed");
                    }
                }
                None => break,
            },
        }
    }

    info!("stdin closed, stopping");
    Ok(())
}
