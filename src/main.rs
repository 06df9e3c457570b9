use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use log::{error, info};
use std::sync::Arc;

use modbus_rtu_master::cli::{handle_offline_commands, handle_subcommands};
use modbus_rtu_master::config::Config;
use modbus_rtu_master::driver::RtuDriver;
use modbus_rtu_master::output::formatter_for;

fn build_cli() -> Command {
    let address = || {
        Arg::new("address")
            .help("Tag address, e.g. 40001, 2:30005.3 or 000017")
            .required(true)
    };
    let data_type = || {
        Arg::new("type")
            .short('t')
            .long("type")
            .help("int16, uint16, int32, uint32, float, byte, bit or string")
            .default_value("int16")
    };
    let len = || {
        Arg::new("len")
            .long("len")
            .help("Character count for string reads")
            .value_parser(value_parser!(u16))
            .default_value("2")
    };

    Command::new("modbus-rtu")
        .version(modbus_rtu_master::VERSION)
        .about("Modbus RTU master for RS-485 serial lines")
        .arg(Arg::new("config").short('c').long("config").help("TOML configuration file"))
        .arg(Arg::new("port").short('p').long("port").help("Serial port name"))
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("slave")
                .short('s')
                .long("slave")
                .help("Default slave id")
                .value_parser(value_parser!(u8)),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .help("Response timeout in ms (<= 0 means 1000)")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i64)),
        )
        .arg(Arg::new("parity").long("parity").help("none, even or odd"))
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(["console", "json", "csv"])
                .default_value("console"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log every frame"),
        )
        .subcommand(
            Command::new("read")
                .about("Read one tag")
                .arg(address())
                .arg(data_type())
                .arg(len()),
        )
        .subcommand(
            Command::new("write")
                .about("Write one tag")
                .arg(address())
                .arg(Arg::new("value").required(true).allow_hyphen_values(true))
                .arg(data_type()),
        )
        .subcommand(
            Command::new("write-bits")
                .about("Write consecutive coils")
                .arg(address())
                .arg(Arg::new("bits").required(true).help("Comma separated, e.g. 1,0,1")),
        )
        .subcommand(
            Command::new("watch")
                .about("Poll one tag until Ctrl-C")
                .arg(address())
                .arg(data_type())
                .arg(len())
                .arg(
                    Arg::new("interval")
                        .short('i')
                        .long("interval")
                        .help("Seconds between reads")
                        .value_parser(value_parser!(f64))
                        .default_value("1"),
                ),
        )
        .subcommand(Command::new("ports").about("List serial ports"))
        .subcommand(
            Command::new("crc")
                .about("Compute the Modbus CRC of hex bytes")
                .arg(Arg::new("bytes").required(true)),
        )
        .subcommand(
            Command::new("init-config")
                .about("Write the effective configuration to a TOML file")
                .arg(Arg::new("path").required(true)),
        )
}

fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    init_logger(matches.get_flag("verbose"));

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_matches(&matches)?;

    if handle_offline_commands(&matches, &config)? {
        return Ok(());
    }

    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("console");
    let formatter = formatter_for(format).ok_or_else(|| anyhow!("unknown format '{}'", format))?;

    if matches.subcommand().is_none() {
        build_cli().print_help()?;
        return Ok(());
    }

    config.log_summary();
    let driver = Arc::new(RtuDriver::serial(config)?);
    if let Err(e) = driver.connect() {
        error!("❌ Could not open the serial line: {}", e);
        return Err(e.into());
    }

    let result = handle_subcommands(&matches, driver.clone(), formatter.as_ref()).await;
    driver.disconnect();

    if !result? {
        build_cli().print_help()?;
    }
    info!("👋 Done");
    Ok(())
}
