use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use filament_proto::{routing, wire, Envelope, EnvelopeFlags, Level};
use serde_json::json;
use time::format_description::well_known::Rfc3339;

#[derive(Parser)]
#[command(name = "filament-tools", about = "Inspect and build filament wire frames")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a frame and print its fields as JSON.
    Decode {
        /// Hex-encoded frame.
        #[arg(long, conflicts_with = "path")]
        hex: Option<String>,
        /// Raw frame file.
        #[arg(long)]
        path: Option<PathBuf>,
        /// Leading bytes reserved by the outer framing.
        #[arg(long, default_value_t = 0)]
        reserve: usize,
    },
    /// Build a frame from field values and print it hex-encoded.
    Encode {
        #[arg(long, default_value = "")]
        text: String,
        #[arg(long, default_value = "")]
        payload_text: String,
        #[arg(long, default_value = "")]
        origin: String,
        #[arg(long, default_value = "")]
        engine: String,
        #[arg(long, default_value = "")]
        owner: String,
        #[arg(long, default_value_t = 1)]
        priority: u8,
        /// Raw 16-bit flag value, decimal or 0x-prefixed hex.
        #[arg(long, default_value = "0", value_parser = parse_flags)]
        flags: u16,
        #[arg(long, default_value = "normal", value_parser = parse_level)]
        level: Level,
    },
}

fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::Decode { hex, path, reserve } => decode(hex, path, reserve),
        Command::Encode {
            text,
            payload_text,
            origin,
            engine,
            owner,
            priority,
            flags,
            level,
        } => {
            if text.chars().count() > filament_proto::constants::TEXT_SOFT_LIMIT {
                eprintln!(
                    "warning: text exceeds the {}-char transport soft limit",
                    filament_proto::constants::TEXT_SOFT_LIMIT
                );
            }
            let mut envelope = Envelope::unstamped();
            envelope.text = text;
            envelope.payload_text = payload_text;
            envelope.origin_chain = origin;
            envelope.engine_name = engine;
            envelope.owner = owner;
            envelope.queue_priority = priority;
            envelope.flags = EnvelopeFlags::from_bits(flags);
            envelope.level = level;
            let frame = wire::encode(&envelope, 0)?;
            println!("{}", hex::encode(frame));
            Ok(())
        }
    }
}

fn decode(hex_frame: Option<String>, path: Option<PathBuf>, reserve: usize) -> anyhow::Result<()> {
    let bytes = match (hex_frame, path) {
        (Some(hex_frame), None) => {
            hex::decode(hex_frame.trim()).context("frame is not valid hex")?
        }
        (None, Some(path)) => {
            fs::read(&path).with_context(|| format!("reading {}", path.display()))?
        }
        _ => bail!("pass exactly one of --hex or --path"),
    };

    let envelope = wire::decode(&bytes, reserve)?;
    let chain = &envelope.origin_chain;
    let summary = json!({
        "text": envelope.text,
        "timestamp": envelope.timestamp.format(&Rfc3339)?,
        "level": level_name(envelope.level),
        "flags": format!("0x{:04x}", envelope.flags.bits()),
        "queue_priority": envelope.queue_priority,
        "origin_chain": chain,
        "hop_count": routing::hop_count(chain),
        "originator": routing::originator(chain),
        "engine_name": envelope.engine_name,
        "payload_text": envelope.payload_text,
        "payload_binary_len": envelope.payload_binary.as_ref().map_or(0, Vec::len),
        "serial_id": envelope.serial_id,
        "scope_id_scrambled": envelope.scope_id_scrambled,
        "session_id": envelope.session_id,
        "user_id": envelope.user_id,
        "costing_history": envelope.costing_history,
        "owner": envelope.owner,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::Error => "error",
        Level::Warning => "warning",
        Level::Important => "important",
        Level::Normal => "normal",
        Level::Host => "host",
        Level::Debug => "debug",
        Level::HostDebug => "host-debug",
    }
}

fn parse_flags(value: &str) -> Result<u16, String> {
    let parsed = if let Some(hex_digits) = value.strip_prefix("0x") {
        u16::from_str_radix(hex_digits, 16)
    } else {
        value.parse()
    };
    parsed.map_err(|err| format!("bad flags value '{value}': {err}"))
}

fn parse_level(value: &str) -> Result<Level, String> {
    match value {
        "error" => Ok(Level::Error),
        "warning" => Ok(Level::Warning),
        "important" => Ok(Level::Important),
        "normal" => Ok(Level::Normal),
        "host" => Ok(Level::Host),
        "debug" => Ok(Level::Debug),
        "host-debug" => Ok(Level::HostDebug),
        other => Err(format!("unknown level '{other}'")),
    }
}
