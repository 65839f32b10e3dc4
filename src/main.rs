use clap::{Parser, Subcommand};
use cfgcrypt::family::{self, FirmwareFamily};
use cfgcrypt::pipeline::{CfgCodec, EncodeOptions};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cfgcrypt", about = "Router configuration blob unpacker / repacker")]
struct Cli {
    /// Firmware family description (JSON); defaults to the built-in Nokia family
    #[arg(short, long, global = true)]
    family: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt and decompress a .cfg blob into its XML document
    Unpack {
        input: PathBuf,
        /// Output file (default: config-DDMMYYYY-HHMMSS.xml)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Repack an XML document into a .cfg blob
    Pack {
        /// -pb / -pl (big / little endian), add `e` to encrypt: -pbe / -ple
        #[arg(allow_hyphen_values = true)]
        mode: String,
        input: PathBuf,
        /// Firmware format magic printed by `unpack`, e.g. 0x3c5a0f21
        magic: String,
        #[arg(short, long, default_value = "config.cfg")]
        output: PathBuf,
    },
    /// Show detection results and header fields without unpacking
    Info {
        input: PathBuf,
    },
    /// Print a built-in family as JSON, as a template for new families
    Family {
        #[arg(default_value = "nokia-xs240x")]
        name: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let family = match &cli.family {
        Some(path) => FirmwareFamily::load(path)?,
        None       => FirmwareFamily::default(),
    };

    match cli.command {

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output } => {
            let raw = std::fs::read(&input)?;
            let result = CfgCodec::new(family).decode(&raw)?;

            let output = output.unwrap_or_else(default_output_name);
            std::fs::write(&output, &result.document)?;

            println!("  encrypted    {}", result.was_encrypted);
            println!("  endianness   {}", result.endianness);
            println!("  fw_magic     {:#x}", result.format_magic);
            println!("  stream       {}", result.candidate);
            println!("Unpacked as: {}", output.display());
            println!();
            println!("# Repack command:");
            println!("{} pack {} {} {:#x}", program_name(), result.repack_flag(), output.display(), result.format_magic);
        }

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { mode, input, magic, output } => {
            let format_magic = parse_magic(&magic)?;
            let opts = EncodeOptions::from_flag(&mode, format_magic)
                .ok_or_else(|| format!("Unknown pack mode '{mode}', expected -pb, -pl, -pbe or -ple"))?;
            let document = std::fs::read(&input)?;
            let blob = CfgCodec::new(family).encode(&document, &opts)?;
            std::fs::write(&output, blob)?;
            println!("Packed: {}", output.display());
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raw = std::fs::read(&input)?;
            let codec = CfgCodec::new(family);
            let inspection = codec.inspect(&raw)?;

            println!("── cfg blob ─────────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Family         {}", codec.family().name);
            println!("  Encrypted      {}", inspection.was_encrypted);
            println!("  Endianness     {}", inspection.endianness);
            println!("  fw_magic       {:#x}", inspection.header.format_magic);
            println!("  Payload        {} B", inspection.header.payload_length);
            println!("  CRC32          {:#010x} (ok)", inspection.header.checksum);
        }

        // ── Family ───────────────────────────────────────────────────────────
        Commands::Family { name } => {
            let family = family::builtin(&name).ok_or_else(|| format!("Unknown family '{name}'"))?;
            println!("{}", family.to_json()?);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn default_output_name() -> PathBuf {
    PathBuf::from(format!("config-{}.xml", chrono::Local::now().format("%d%m%Y-%H%M%S")))
}

fn parse_magic(s: &str) -> Result<u32, std::num::ParseIntError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u32::from_str_radix(digits, 16)
}

fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .and_then(|p| Path::new(p).file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "cfgcrypt".to_string())
}
