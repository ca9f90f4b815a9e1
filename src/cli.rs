// src/cli.rs
use std::fs;
use std::io::{self, BufRead, Read, Write};

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;

use crate::error::AppError;
use crate::types::{Block, CardIdentity, SegmentConfig, TrailerPolicy, UriPrefix};
use crate::{cards, dump, ndef};

// Menu entries in display order: (label, URI identifier code)
const PREFIX_MENU: [(&str, u8); 6] = [
    ("https://", 0x04),
    ("https://www.", 0x02),
    ("http://", 0x03),
    ("tel:", 0x05),
    ("mailto:", 0x06),
    ("http://www.", 0x01),
];

const RULE_WIDTH: usize = 50;

#[derive(Parser, Debug)]
#[command(name = "url2mifare")]
#[command(about = "Encode a URL as an NDEF record on a Mifare Classic 1K card dump", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a URL (prompts for the prefix and URL when none is given)
    Encode(EncodeArgs),

    /// Recover the URL stored in a card dump
    Decode(DecodeArgs),
}

#[derive(Args, Debug)]
pub struct LayoutArgs {
    /// How sector trailer positions are treated
    #[arg(long, value_enum, default_value_t = TrailerPolicy::SkipAndContinue)]
    pub policy: TrailerPolicy,

    /// First block that receives payload
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16))]
    pub start_block: u16,
}

impl Default for LayoutArgs {
    fn default() -> Self {
        LayoutArgs {
            policy: TrailerPolicy::SkipAndContinue,
            start_block: 4,
        }
    }
}

impl LayoutArgs {
    fn segment_config(&self) -> SegmentConfig {
        SegmentConfig {
            start_index: usize::from(self.start_block),
            policy: self.policy,
            ..SegmentConfig::default()
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct EncodeArgs {
    /// URL to encode; its scheme selects the prefix unless --prefix is set
    pub url: Option<String>,

    /// URI identifier code in hex (e.g. 02 or 0x02)
    #[arg(short, long, value_parser = parse_prefix_code)]
    pub prefix: Option<u8>,

    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Flipper)]
    pub format: OutputFormat,

    /// Card UID written to the dump header and block 0 (4 bytes hex)
    #[arg(long, value_parser = parse_uid)]
    pub uid: Option<[u8; 4]>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Card dump to read, or "-" for stdin
    pub input: String,

    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Complete Flipper NFC device file
    #[default]
    Flipper,
    /// Payload block lines only
    Blocks,
    /// JSON listing of the payload blocks
    Json,
}

#[derive(Serialize, Debug)]
struct BlockListing<'a> {
    prefix: u8,
    scheme: &'static str,
    remainder: &'a str,
    tlv: String,
    blocks: &'a [Block],
}

pub fn parse_prefix_code(s: &str) -> Result<u8, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|_| format!("invalid prefix code {:?}", s))
}

pub fn parse_uid(s: &str) -> Result<[u8; 4], String> {
    let digits: String = s.chars().filter(|c| *c != ' ' && *c != ':').collect();
    let bytes = hex::decode(&digits).map_err(|e| format!("invalid UID {:?}: {}", s, e))?;
    <[u8; 4]>::try_from(bytes.as_slice())
        .map_err(|_| format!("UID must be 4 bytes, got {}", bytes.len()))
}

pub fn run(cli: Cli) -> Result<(), AppError> {
    let output = match cli.command {
        Some(Command::Encode(args)) => run_encode(&args)?,
        Some(Command::Decode(args)) => run_decode(&args)?,
        None => run_encode(&EncodeArgs::default())?,
    };
    print!("{}", output);
    Ok(())
}

fn run_encode(args: &EncodeArgs) -> Result<String, AppError> {
    let (url, prefix_code) = match &args.url {
        Some(url) => {
            let code = args
                .prefix
                .unwrap_or_else(|| UriPrefix::strip(url).0.code());
            (url.clone(), code)
        }
        None => {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut output = io::stdout();
            display_banner(&mut output)?;
            let code = match args.prefix {
                Some(code) => code,
                None => prompt_prefix(&mut input, &mut output)?,
            };
            let url = prompt_url(&mut input, &mut output)?;
            (url, code)
        }
    };

    encode_output(&url, prefix_code, args)
}

/// Encodes and renders in the requested format.
pub fn encode_output(url: &str, prefix_code: u8, args: &EncodeArgs) -> Result<String, AppError> {
    if url.trim().is_empty() {
        return Err(AppError::InvalidArgument("URL cannot be empty".into()));
    }
    let config = args.layout.segment_config();
    if args.format == OutputFormat::Flipper && config.policy == TrailerPolicy::PadToBoundary {
        return Err(AppError::InvalidArgument(
            "the pad-count layout does not protect sector trailers; use --format blocks or json"
                .into(),
        ));
    }

    info!("Encoding {:?} with prefix code 0x{:02X}", url, prefix_code);
    let tlv = ndef::encode(url, prefix_code)?;
    let blocks = cards::segment(&tlv, &config)?;

    let rendered = match args.format {
        OutputFormat::Flipper => {
            let identity = CardIdentity {
                uid: args.uid.unwrap_or(CardIdentity::default().uid),
                ..CardIdentity::default()
            };
            dump::render_card_image(&identity, &blocks)?
        }
        OutputFormat::Blocks => format!("{}\n", dump::render_blocks(&blocks)),
        OutputFormat::Json => {
            let (_, remainder) = UriPrefix::strip(url);
            let prefix = UriPrefix::from_code(prefix_code).unwrap_or(UriPrefix::NONE);
            let listing = BlockListing {
                prefix: prefix_code,
                scheme: prefix.scheme(),
                remainder,
                tlv: hex::encode_upper(&tlv),
                blocks: &blocks,
            };
            format!("{}\n", serde_json::to_string_pretty(&listing)?)
        }
    };
    Ok(rendered)
}

fn run_decode(args: &DecodeArgs) -> Result<String, AppError> {
    let text = if args.input == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        text
    } else {
        fs::read_to_string(&args.input)?
    };
    decode_output(&text, &args.layout)
}

/// Recovers the URL from dump text.
pub fn decode_output(text: &str, layout: &LayoutArgs) -> Result<String, AppError> {
    let config = layout.segment_config();
    let blocks = dump::parse_dump(text)?;
    info!("Read {} blocks from dump", blocks.len());

    let record = ndef::decode(&cards::join_blocks(&blocks, &config))?;
    Ok(format!("{}\n", record.to_url()))
}

fn display_banner<W: Write>(output: &mut W) -> io::Result<()> {
    writeln!(output, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(output, "URL to Mifare Classic 1K Block Encoder")?;
    writeln!(output, "{}", "=".repeat(RULE_WIDTH))
}

fn read_trimmed_line<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed before a value was entered",
        ));
    }
    Ok(line.trim().to_string())
}

/// Shows the prefix menu and asks until a valid entry is chosen.
pub fn prompt_prefix<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<u8> {
    writeln!(output, "\nAvailable URL Prefixes:")?;
    for (i, (label, _)) in PREFIX_MENU.iter().enumerate() {
        writeln!(output, "{}. {}", i + 1, label)?;
    }
    writeln!(output, "{}", "-".repeat(RULE_WIDTH))?;

    loop {
        write!(output, "Select URL prefix (from 1 to {}): ", PREFIX_MENU.len())?;
        output.flush()?;
        let choice = read_trimmed_line(input)?;

        let selected = choice
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| PREFIX_MENU.get(i));
        match selected {
            Some(&(_, code)) => return Ok(code),
            None => writeln!(
                output,
                "Invalid choice. Please enter from 1 to {}.",
                PREFIX_MENU.len()
            )?,
        }
    }
}

/// Asks for the URL until a non-empty one is entered.
pub fn prompt_url<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<String> {
    loop {
        write!(output, "\nEnter the URL (without prefix): ")?;
        output.flush()?;
        let url = read_trimmed_line(input)?;
        if !url.is_empty() {
            return Ok(url);
        }
        writeln!(output, "URL cannot be empty. Please try again.")?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_args(argv: &[&str]) -> EncodeArgs {
        let mut full = vec!["url2mifare", "encode"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Some(Command::Encode(args)) => args,
            other => panic!("expected encode, got {:?}", other),
        }
    }

    #[test]
    fn parses_prefix_codes() {
        assert_eq!(parse_prefix_code("02"), Ok(0x02));
        assert_eq!(parse_prefix_code("0x1d"), Ok(0x1D));
        assert_eq!(parse_prefix_code("0X23"), Ok(0x23));
        assert!(parse_prefix_code("zz").is_err());
        assert!(parse_prefix_code("100").is_err());
    }

    #[test]
    fn parses_uid() {
        assert_eq!(parse_uid("1E 0A 23 3F"), Ok([0x1E, 0x0A, 0x23, 0x3F]));
        assert_eq!(parse_uid("04:a1:b2:c3"), Ok([0x04, 0xA1, 0xB2, 0xC3]));
        assert!(parse_uid("0102").is_err());
        assert!(parse_uid("nothex!!").is_err());
    }

    #[test]
    fn cli_defaults() {
        let args = encode_args(&["example.com"]);
        assert_eq!(args.url.as_deref(), Some("example.com"));
        assert_eq!(args.prefix, None);
        assert_eq!(args.layout.policy, TrailerPolicy::SkipAndContinue);
        assert_eq!(args.layout.start_block, 4);
        assert_eq!(args.format, OutputFormat::Flipper);
    }

    #[test]
    fn cli_parses_options() {
        let args = encode_args(&[
            "example.com",
            "--prefix",
            "0x02",
            "--policy",
            "pad-count",
            "--format",
            "json",
            "--uid",
            "AABBCCDD",
        ]);
        assert_eq!(args.prefix, Some(0x02));
        assert_eq!(args.layout.policy, TrailerPolicy::PadToBoundary);
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.uid, Some([0xAA, 0xBB, 0xCC, 0xDD]));
    }

    #[test]
    fn cli_rejects_start_block_past_u16() {
        let argv = [
            "url2mifare",
            "encode",
            "example.com",
            "--start-block",
            "18446744073709551614",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn largest_start_block_lays_out_past_trailer() {
        let args = EncodeArgs {
            format: OutputFormat::Blocks,
            layout: LayoutArgs {
                policy: TrailerPolicy::SkipAndContinue,
                start_block: u16::MAX,
            },
            ..EncodeArgs::default()
        };
        let text = encode_output("example.com", 0x02, &args).unwrap();
        assert!(text.starts_with("Block 65536: 03 10 D1"));
        assert!(text.contains("\nBlock 65537: 6F 6D FE"));
    }

    #[test]
    fn cli_without_subcommand_is_interactive() {
        assert!(Cli::try_parse_from(["url2mifare"]).unwrap().command.is_none());
    }

    #[test]
    fn blocks_output_for_example() {
        let args = EncodeArgs {
            format: OutputFormat::Blocks,
            ..EncodeArgs::default()
        };
        assert_eq!(
            encode_output("example.com", 0x02, &args).unwrap(),
            "Block 4: 03 10 D1 01 0C 55 02 65 78 61 6D 70 6C 65 2E 63\n\
             Block 5: 6F 6D FE 00 00 00 00 00 00 00 00 00 00 00 00 00\n"
        );
    }

    #[test]
    fn flipper_output_uses_custom_uid() {
        let args = EncodeArgs {
            uid: Some([0x01, 0x02, 0x03, 0x04]),
            ..EncodeArgs::default()
        };
        let text = encode_output("https://example.com", 0x04, &args).unwrap();
        assert!(text.contains("UID: 01 02 03 04\n"));
        assert!(text.contains("Block 0: 01 02 03 04 04 08 04 00"));
    }

    #[test]
    fn json_output_lists_blocks() {
        let args = EncodeArgs {
            format: OutputFormat::Json,
            ..EncodeArgs::default()
        };
        let text = encode_output("https://www.example.com", 0x02, &args).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["prefix"], 2);
        assert_eq!(value["scheme"], "https://www.");
        assert_eq!(value["remainder"], "example.com");
        assert_eq!(value["blocks"][0]["index"], 4);
        assert_eq!(value["blocks"][1]["data"], "6F6DFE00000000000000000000000000");
    }

    #[test]
    fn pad_count_is_refused_for_flipper_output() {
        let args = EncodeArgs {
            layout: LayoutArgs {
                policy: TrailerPolicy::PadToBoundary,
                start_block: 4,
            },
            ..EncodeArgs::default()
        };
        assert!(matches!(
            encode_output("example.com", 0x02, &args),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn encode_errors_surface() {
        let args = EncodeArgs::default();
        assert!(matches!(
            encode_output("example.com", 0x99, &args),
            Err(AppError::Encode(_))
        ));
        assert!(matches!(
            encode_output("   ", 0x00, &args),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn decode_round_trips_flipper_dump() {
        let dump = encode_output("mailto:someone@example.org", 0x06, &EncodeArgs::default()).unwrap();
        let url = decode_output(&dump, &LayoutArgs::default()).unwrap();
        assert_eq!(url, "mailto:someone@example.org\n");
    }

    #[test]
    fn decode_round_trips_pad_count_blocks() {
        let layout = LayoutArgs {
            policy: TrailerPolicy::PadToBoundary,
            start_block: 4,
        };
        let args = EncodeArgs {
            format: OutputFormat::Blocks,
            layout,
            ..EncodeArgs::default()
        };
        let url = "http://www.example.net/a/path/that/needs/more/than/three/blocks/of/data";
        let dump = encode_output(url, 0x01, &args).unwrap();
        let decoded = decode_output(
            &dump,
            &LayoutArgs {
                policy: TrailerPolicy::PadToBoundary,
                start_block: 4,
            },
        )
        .unwrap();
        assert_eq!(decoded.trim_end(), url);
    }

    #[test]
    fn prompt_prefix_retries_until_valid() {
        let mut input = Cursor::new("9\nabc\n2\n");
        let mut output = Vec::new();
        assert_eq!(prompt_prefix(&mut input, &mut output).unwrap(), 0x02);
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("6. http://www."));
        assert_eq!(shown.matches("Invalid choice").count(), 2);
    }

    #[test]
    fn prompt_prefix_maps_menu_to_codes() {
        for (choice, code) in [("1", 0x04), ("3", 0x03), ("4", 0x05), ("5", 0x06), ("6", 0x01)] {
            let mut input = Cursor::new(format!("{}\n", choice));
            assert_eq!(prompt_prefix(&mut input, &mut Vec::new()).unwrap(), code);
        }
    }

    #[test]
    fn prompt_url_skips_blank_lines() {
        let mut input = Cursor::new("\n   \n example.com \n");
        let mut output = Vec::new();
        assert_eq!(prompt_url(&mut input, &mut output).unwrap(), "example.com");
    }

    #[test]
    fn prompt_fails_on_closed_input() {
        let mut input = Cursor::new("");
        let err = prompt_url(&mut input, &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
