extern crate pdmremote;

use std::{
    io::{self, BufRead},
    process,
    sync::Arc,
};

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tracing::{error, Level};

use pdmremote::{
    capabilities::RemoteActions,
    config::{Config, DEFAULT_GPIO_PIN},
    controller::{parse_request, Controller, NodeStatus},
    devices::Remote,
    error::{Error, Result},
    gpio::{SysfsBinder, SysfsGpio},
    remotedb::RemoteDb,
};

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.value_of("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(root) = matches.value_of("gpio-root") {
        config.gpio_root = root.into();
    }
    Ok(config)
}

fn command_list(db: &RemoteDb, json: bool) -> Result<()> {
    for profile in db.profiles() {
        let commands: Vec<&str> = profile.command_names().collect();
        if json {
            let entry = serde_json::json!({
                "remote": profile.name(),
                "parms": profile.params(),
                "speeds": profile.speeds(),
                "commands": commands,
            });
            println!("{}", entry);
        } else {
            let params = profile.params();
            println!(
                "{}\trepeat={}\tgap={}us",
                profile.name(),
                params.repeat_count,
                params.inter_packet_gap_us
            );
            println!("\t{}", commands.join(" "));
        }
    }
    Ok(())
}

fn command_show(db: &RemoteDb, remote: &str, command: &str, json: bool) -> Result<()> {
    let profile = db.get(remote)?;
    let train = profile.resolve(command)?;
    if json {
        println!("{}", serde_json::to_string(train.symbols())?);
    } else {
        println!(
            "{}/{}\t{} symbols\t{}us",
            remote,
            command,
            train.len(),
            train.duration_us()
        );
        for symbol in train.iter() {
            println!("{}\t{}", symbol.high_us, symbol.low_us);
        }
    }
    Ok(())
}

fn command_send(db: &RemoteDb, config: &Config, remote: &str, command: &str, pin: u8) -> Result<()> {
    let binder = Arc::new(SysfsBinder::new(SysfsGpio::new(&config.gpio_root)));
    let mut remote = Remote::new(db.get(remote)?, binder, pin)?;
    remote.send(command)
}

fn print_status(status: &NodeStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(status)?);
    } else {
        println!("{}", status);
    }
    Ok(())
}

fn serve_line(controller: &mut Controller, line: &str, json: bool) -> Result<()> {
    let (target, command) = parse_request(line)?;
    for status in controller.execute(&target, command)? {
        print_status(&status, json)?;
    }
    Ok(())
}

fn command_serve(db: &RemoteDb, config: &Config, json: bool) -> Result<()> {
    let binder = Arc::new(SysfsBinder::new(SysfsGpio::new(&config.gpio_root)));
    let mut controller = Controller::discover(config, db, binder)?;
    for status in controller.query() {
        print_status(&status, json)?;
    }

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Err(err) = serve_line(&mut controller, &line, json) {
            error!(error = %err, "request failed");
            eprintln!("error: {}", err);
        }
    }
    Ok(())
}

fn run(matches: &ArgMatches) -> Result<()> {
    let json = matches.is_present("json");
    let config = load_config(matches)?;
    let db = RemoteDb::with_defs(&config.remotes)?;

    match matches.subcommand() {
        ("list", Some(_)) => command_list(&db, json),
        ("show", Some(sub)) => command_show(
            &db,
            sub.value_of("REMOTE").unwrap_or_default(),
            sub.value_of("COMMAND").unwrap_or_default(),
            json,
        ),
        ("send", Some(sub)) => {
            let pin = match sub.value_of("pin") {
                Some(pin) => pin
                    .parse()
                    .map_err(|_| Error::Other(format!("invalid pin: {}", pin)))?,
                None => DEFAULT_GPIO_PIN,
            };
            command_send(
                &db,
                &config,
                sub.value_of("REMOTE").unwrap_or_default(),
                sub.value_of("COMMAND").unwrap_or_default(),
                pin,
            )
        }
        ("serve", Some(_)) => command_serve(&db, &config, json),
        _ => Ok(()),
    }
}

fn main() {
    let matches = App::new("PDM remote node server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Transmit OOK remote control commands through a radio on a GPIO pin.")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::with_name("json")
            .long("json")
            .takes_value(false)
            .global(true)
            .help("Respond with JSON.")
        )
        .arg(Arg::with_name("config")
            .long("config")
            .short("c")
            .takes_value(true)
            .value_name("FILE")
            .help("JSON configuration file.")
        )
        .arg(Arg::with_name("gpio-root")
            .long("gpio-root")
            .takes_value(true)
            .value_name("DIR")
            .help("sysfs GPIO directory.")
        )
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .global(true)
            .help("Log more; repeat for more detail.")
        )
        .subcommand(SubCommand::with_name("list")
            .about("List known remotes and their commands")
        )
        .subcommand(SubCommand::with_name("show")
            .about("Print the pulse train of a command")
            .arg(Arg::with_name("REMOTE").required(true))
            .arg(Arg::with_name("COMMAND").required(true))
        )
        .subcommand(SubCommand::with_name("send")
            .about("Press a remote button once")
            .arg(Arg::with_name("REMOTE").required(true))
            .arg(Arg::with_name("COMMAND").required(true))
            .arg(Arg::with_name("pin")
                .long("pin")
                .short("p")
                .takes_value(true)
                .help("GPIO pin of the transmitter (default 17).")
            )
        )
        .subcommand(SubCommand::with_name("serve")
            .about("Drive the configured fans from host commands on stdin")
        )
        .get_matches();

    init_logging(matches.occurrences_of("verbose"));

    if let Err(err) = run(&matches) {
        error!(error = %err, "command failed");
        eprintln!("error: {}", err);
        process::exit(1);
    }
}
