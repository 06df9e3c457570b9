use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::driver::{DataType, RtuDriver, Value};
use crate::modbus::crc::{append_crc, crc16_modbus};
use crate::modbus::transport::available_ports;
use crate::output::ItemFormatter;

/// Commands that never touch the serial line. Returns `true` when one ran.
pub fn handle_offline_commands(matches: &ArgMatches, config: &Config) -> Result<bool> {
    if matches.subcommand_matches("ports").is_some() {
        info!("🔍 Listing serial ports...");
        let ports = available_ports()?;
        if ports.is_empty() {
            println!("❌ No serial ports found");
        }
        for port in ports {
            println!("🔌 {}", port);
        }
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("crc") {
        let text: String = required::<String>(matches, "bytes")?
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let mut frame = hex::decode(&text).context("bytes must be hex, e.g. 010300000001")?;
        let crc = crc16_modbus(&frame);
        append_crc(&mut frame);
        println!("CRC-16/MODBUS: 0x{:04X}", crc);
        println!("Frame: {}", hex::encode_upper(&frame));
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("init-config") {
        let path = required::<String>(matches, "path")?;
        config.save_to_file(path)?;
        println!("✅ Configuration written to {}", path);
        return Ok(true);
    }

    Ok(false)
}

pub async fn handle_subcommands(
    matches: &ArgMatches,
    driver: Arc<RtuDriver>,
    formatter: &dyn ItemFormatter,
) -> Result<bool> {
    if let Some(matches) = matches.subcommand_matches("read") {
        let address = driver.get_address(required::<String>(matches, "address")?);
        let data_type = data_type(matches)?;
        let len = matches.get_one::<u16>("len").copied().unwrap_or(2);

        info!("🔍 Reading {} as {}...", address, data_type);
        let item = driver.read_value(&address, data_type, len);
        print_header(formatter);
        println!("{}", formatter.format_item(&address, &item));
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("write") {
        let address = driver.get_address(required::<String>(matches, "address")?);
        let value = Value::parse(data_type(matches)?, required::<String>(matches, "value")?)?;

        info!("📝 Writing {} to {}...", value, address);
        let result = driver.write_value(&address, &value);
        println!("{}", formatter.format_write(&address, &value, &result));
        result?;
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("write-bits") {
        let address = driver.get_address(required::<String>(matches, "address")?);
        let bits = required::<String>(matches, "bits")?
            .split(',')
            .map(|s| match Value::parse(DataType::Bit, s)? {
                Value::Bit(on) => Ok(on),
                _ => Err(anyhow!("'{}' is not a bit", s)),
            })
            .collect::<Result<Vec<bool>>>()?;

        info!("📝 Writing {} coils from {}...", bits.len(), address);
        driver.write_bits(&address, &bits)?;
        println!("✅ {} <- {:?}", address, bits);
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("watch") {
        let address = driver.get_address(required::<String>(matches, "address")?);
        let data_type = data_type(matches)?;
        let len = matches.get_one::<u16>("len").copied().unwrap_or(2);
        let seconds = matches.get_one::<f64>("interval").copied().unwrap_or(1.0);
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(anyhow!("interval must be positive"));
        }

        info!("📈 Watching {} every {}s, Ctrl-C to stop", address, seconds);
        print_header(formatter);

        let mut ticker = tokio::time::interval(Duration::from_secs_f64(seconds));
        let (mut total, mut good) = (0u64, 0u64);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reader = driver.clone();
                    let item = tokio::task::spawn_blocking(move || {
                        reader.read_value(&address, data_type, len)
                    })
                    .await?;

                    total += 1;
                    if item.is_good() {
                        good += 1;
                    }
                    println!("{}", formatter.format_item(&address, &item));
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("🛑 Stopping watch");
                    break;
                }
            }
        }

        println!("{}", formatter.format_summary(total, good));
        return Ok(true);
    }

    Ok(false)
}

fn print_header(formatter: &dyn ItemFormatter) {
    let header = formatter.format_header();
    if !header.is_empty() {
        println!("{}", header);
    }
}

fn data_type(matches: &ArgMatches) -> Result<DataType> {
    match matches.get_one::<String>("type") {
        Some(name) => Ok(name.parse()?),
        None => Ok(DataType::Int16),
    }
}

fn required<'a, T: Clone + Send + Sync + 'static>(matches: &'a ArgMatches, id: &str) -> Result<&'a T> {
    matches
        .get_one::<T>(id)
        .ok_or_else(|| anyhow!("missing argument <{}>", id))
}
