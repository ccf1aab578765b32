//! Frame tool
//!
//! Builds controller frames for a UID without touching ThingsBoard or
//! ChirpStack, and decodes frames captured from a device queue. Useful for
//! checking a payload against a controller without hardware.
//!
//! Usage:
//!   cargo run --bin frame-tool -- encode D7AA1090 light on
//!   cargo run --bin frame-tool -- encode D7AA1090 time-sync "Monday 2024-01-15 14:30:45"
//!   cargo run --bin frame-tool -- encode D7AA1090 schedule 18:00 100 23:30 30
//!   cargo run --bin frame-tool -- decode aAAA16oQkGgBBvAAIAEhZI4W
//!   cargo run --bin frame-tool -- decode --format hex 680000D7AA1090680106F000200121648E16

use clap::{Parser, Subcommand, ValueEnum};

use streetlight_bridge::frame::{
    self, Action, ClockTimestamp, Frame, FrameBuilder, SlotSpec,
};

#[derive(Parser)]
#[command(name = "frame-tool")]
#[command(about = "Encode and decode streetlight controller frames")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the frame for one device UID
    Encode {
        /// Rolling UID as reported by the device (hex, up to 12 digits)
        uid: String,
        #[command(subcommand)]
        action: ActionArg,
    },
    /// Parse and verify a frame given as hex or base64
    Decode {
        frame: String,
        /// How to read FRAME; `auto` keeps whichever reading is a valid frame
        #[arg(long, value_enum, default_value_t = InputFormat::Auto)]
        format: InputFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    Auto,
    Hex,
    Base64,
}

#[derive(Subcommand)]
enum ActionArg {
    Light {
        state: String,
    },
    TimeSync {
        timestamp: Option<String>,
    },
    Schedule {
        slot1_time: String,
        slot1_dim: i64,
        slot2_time: String,
        slot2_dim: i64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Encode { uid, action } => {
            let action = build_action(action)?;
            let uid = frame::normalize_uid(&uid);
            let bytes = FrameBuilder::new(&uid, action.clone())?.build();

            println!("🔦 {}", action);
            println!("   UID:     {}", uid);
            println!("   Size:    {} bytes", bytes.len());
            println!("   Hex:     {}", frame::to_hex(&bytes));
            println!("   Base64:  {}", frame::to_transport_payload(&bytes));
        }
        Command::Decode {
            frame: text,
            format,
        } => {
            let bytes = decode_input(&text, format)?;
            let parsed = Frame::parse(&bytes)?;
            println!("📦 {}", parsed);
            println!("   UID:      {}", parsed.uid_hex());
            println!("   Checksum: 0x{:02X} ✅", parsed.checksum);
            match parsed.action() {
                Ok(action) => println!("   Action:   {}", action),
                Err(e) => println!("   ⚠️  Payload not understood: {}", e),
            }
        }
    }

    Ok(())
}

fn build_action(arg: ActionArg) -> anyhow::Result<Action> {
    let action = match arg {
        ActionArg::Light { state } => Action::turn_light(&state)?,
        ActionArg::TimeSync { timestamp: Some(text) } => Action::time_sync(&text)?,
        ActionArg::TimeSync { timestamp: None } => {
            Action::TimeSync(ClockTimestamp::from_datetime(&chrono::Local::now()))
        }
        ActionArg::Schedule {
            slot1_time,
            slot1_dim,
            slot2_time,
            slot2_dim,
        } => Action::schedule(
            Some(&SlotSpec {
                time: Some(slot1_time),
                dim_level: Some(slot1_dim),
            }),
            Some(&SlotSpec {
                time: Some(slot2_time),
                dim_level: Some(slot2_dim),
            }),
        )?,
    };
    Ok(action)
}

/// Some inputs are valid as both hex and base64 text. In `auto` mode the
/// reading that parses as a frame wins, hex first; if neither does, the
/// base64 reading is returned so `Frame::parse` reports why.
fn decode_input(text: &str, format: InputFormat) -> anyhow::Result<Vec<u8>> {
    let text = text.trim();
    let bytes = match format {
        InputFormat::Hex => frame::from_hex(text)?,
        InputFormat::Base64 => frame::from_transport_payload(text)?,
        InputFormat::Auto => {
            let as_hex = frame::from_hex(text).ok();
            let as_base64 = frame::from_transport_payload(text).ok();
            let valid = [as_hex.as_ref(), as_base64.as_ref()]
                .into_iter()
                .flatten()
                .find(|bytes| Frame::parse(bytes).is_ok())
                .cloned();
            match (valid, as_base64, as_hex) {
                (Some(bytes), _, _) => bytes,
                (None, Some(bytes), _) | (None, None, Some(bytes)) => bytes,
                (None, None, None) => anyhow::bail!("'{}' is neither hex nor base64", text),
            }
        }
    };
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIGHT_ON_HEX: &str = "680000D7AA1090680106F000200121648E16";
    const LIGHT_ON_BASE64: &str = "aAAA16oQkGgBBvAAIAEhZI4W";

    #[test]
    fn test_auto_reads_hex_and_base64() {
        let from_hex = decode_input(LIGHT_ON_HEX, InputFormat::Auto).unwrap();
        let from_base64 = decode_input(LIGHT_ON_BASE64, InputFormat::Auto).unwrap();
        assert_eq!(from_hex, from_base64);
        assert_eq!(frame::to_hex(&from_hex), LIGHT_ON_HEX);
    }

    #[test]
    fn test_hex_alphabet_base64_is_not_forced_to_hex() {
        // 24 hex-alphabet chars: valid hex (12 bytes) and valid base64 (18 bytes)
        let text = "abcdef0123456789abcdef01";
        let hex_bytes = frame::from_hex(text).unwrap();
        let base64_bytes = frame::from_transport_payload(text).unwrap();
        assert_ne!(hex_bytes, base64_bytes);

        assert_eq!(decode_input(text, InputFormat::Base64).unwrap(), base64_bytes);
        assert_eq!(decode_input(text, InputFormat::Hex).unwrap(), hex_bytes);
        // neither reading is a frame, so auto falls back to base64
        assert_eq!(decode_input(text, InputFormat::Auto).unwrap(), base64_bytes);
    }

    #[test]
    fn test_explicit_format_rejects_other_encoding() {
        assert!(decode_input(LIGHT_ON_BASE64, InputFormat::Hex).is_err());
        assert!(decode_input("not valid at all!", InputFormat::Auto).is_err());
    }
}
