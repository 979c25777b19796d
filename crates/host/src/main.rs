//! EMS Pilot drives a two-channel electrical muscle stimulation (EMS) device whose controller listens on a serial
//! port for lines such as `1:30,2:0`.
//!
//! Calibration finds, for each channel, the thresholds between first perception and the strongest comfortable
//! contraction, with the wearer adjusting the live intensity from the keyboard. Mapping then turns MIDI note events
//! into stimulation within those thresholds, either held for as long as a key is down or as short pulses on every
//! beat. Whatever way a session ends, both channels are zeroed before the port is closed.

mod configuration;
mod delay;
mod keyboard;
mod midi_input;

use crate::{
    configuration::{CalibrateArgs, Cli, Command, MapArgs, MidiArgs},
    delay::Sleep,
    keyboard::{KeyboardOperator, RawTerminal, say},
    midi_input::MidiTriggers,
};
use anyhow::{Context, Result};
use clap::Parser;
use ems_pilot_lib::{
    Actuator, ArmedLink, DeviceLink,
    calibration::CalibrationEngine,
    configuration::POLL_INTERVAL,
    link::SETTLE_DELAY,
    mapping::{MappingEngine, RuleSet, SourceEvent, TriggerSource},
    midi::TriggerKind,
    store,
};
use log::info;
use serialport::SerialPort;
use std::{io::Write, thread};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        // the terminal may be in raw mode, which needs an explicit carriage return
        .format(|buf, record| writeln!(buf, "[{} {}] {}\r", record.level(), record.target(), record.args()))
        .init();

    match Cli::parse().command {
        Command::Calibrate(args) => calibrate(args),
        Command::Map(args) => map(args),
        Command::Monitor(args) => monitor(args),
        Command::Ports => ports(),
    }
}

/// Opens the device port, lets the controller settle and zeroes both channels.
fn connect(port: &str, baud: u32) -> Result<ArmedLink<Box<dyn SerialPort>>> {
    let link = DeviceLink::connect(port, baud).context("Cannot reach the stimulator")?;
    info!("Waiting {SETTLE_DELAY:?} for the controller to settle");
    thread::sleep(SETTLE_DELAY);
    let mut link = ArmedLink::new(link);
    link.reset().context("Could not zero the stimulator")?;
    Ok(link)
}

fn calibrate(args: CalibrateArgs) -> Result<()> {
    let mut link = connect(&args.device.port, args.device.baud)?;
    let profiles = {
        let mut operator = KeyboardOperator::new().context("Failed to take over the terminal")?;
        CalibrationEngine::new(&mut link, &mut operator, args.variant.into())
            .with_max_attempts(args.max_attempts)
            .calibrate()
            .context("Calibration did not complete")?
    };
    link.release().context("Could not zero the stimulator after calibration")?;
    store::save_profiles(&args.device.profile, &profiles)
        .context("Calibration succeeded but could not be saved")?;
    say(format!("Saved to {}", args.device.profile.display()));
    Ok(())
}

fn map(args: MapArgs) -> Result<()> {
    // every file is checked before the device is touched
    let profiles = store::load_profiles(&args.device.profile)?;
    let config = args.mapping_config();
    let rules = match &args.rules {
        Some(path) => store::load_rules(path)?,
        None => RuleSet::default_for(config.mode),
    };
    if !rules.needs_calibration() {
        info!(
            "No rule uses calibrated intensity; {} is not consulted",
            args.device.profile.display()
        );
    }
    for rule in rules.iter() {
        info!(
            "Note {} -> {}: {:?}",
            rule.note.to_str(),
            rule.channel,
            rule.intensity
        );
    }
    let input = midi_input::open(&args.midi.midi, args.midi.midi_baud)?;

    let mut link = connect(&args.device.port, args.device.baud)?;
    let stats = {
        let _raw = RawTerminal::enable().context("Failed to take over the terminal")?;
        say("Mapping MIDI to stimulation. Esc, q or Ctrl-C stops.");
        let mut source = MidiTriggers::spawn(input)?;
        MappingEngine::new(config, rules, profiles)
            .run(&mut source, &mut link, &mut Sleep)
            .context("Mapping session failed")?
    };
    link.release().context("Could not zero the stimulator after mapping")?;
    info!("{} events handled, {} ignored", stats.handled, stats.ignored);
    Ok(())
}

fn monitor(args: MidiArgs) -> Result<()> {
    let input = midi_input::open(&args.midi, args.midi_baud)?;
    let _raw = RawTerminal::enable().context("Failed to take over the terminal")?;
    say("Listening for MIDI notes. Esc, q or Ctrl-C stops.");
    let mut source = MidiTriggers::spawn(input)?;
    loop {
        match source
            .next_event(POLL_INTERVAL)
            .context("MIDI input failed")?
        {
            SourceEvent::Trigger(event) => match event.kind {
                TriggerKind::Onset { velocity } => say(format!(
                    "Note on  {:>4} ({:>3}) velocity {}",
                    event.source.to_str(),
                    event.source as u8,
                    u8::from(velocity)
                )),
                TriggerKind::Release => say(format!(
                    "Note off {:>4} ({:>3})",
                    event.source.to_str(),
                    event.source as u8
                )),
            },
            SourceEvent::Idle => {}
            SourceEvent::Stop => return Ok(()),
        }
    }
}

fn ports() -> Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port.port_name);
    }
    Ok(())
}
