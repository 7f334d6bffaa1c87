//! Command-line arguments for the `qrsmith` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use qrsmith::{ExportFormat, ExportSize};

#[derive(Debug, Parser)]
#[command(
    name = "qrsmith",
    version,
    author,
    about = "Encode, validate and export styled QR codes",
    after_help = "EXAMPLES:\n\
        \x20 qrsmith encode wifi.json\n\
        \x20 qrsmith validate - < contact.json\n\
        \x20 qrsmith export event.json --format svg --size 2048 --logo logo.png --logo-margin 3\n\
        \x20 qrsmith banks",
    arg_required_else_help = true,
    subcommand_required = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (TOML, JSON or YAML).
    #[arg(short = 'c', long = "config", global = true, value_name = "FILE", env = "QRSMITH_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate field data and print the encoded payload.
    Encode(InputArgs),
    /// Print the validation result of field data as JSON.
    Validate(InputArgs),
    /// Render field data to an image file.
    Export(ExportArgs),
    /// List the Taiwan bank directory used by TWQR payloads.
    Banks(BanksArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Field data JSON, or `-` for stdin.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long, value_enum, default_value = "png")]
    pub format: FormatArg,

    /// Edge of the exported image in pixels.
    #[arg(long, default_value = "1024", value_parser = parse_export_size)]
    pub size: ExportSize,

    /// Style options JSON.
    #[arg(long, value_name = "FILE")]
    pub style: Option<PathBuf>,

    /// Logo image placed in the centre.
    #[arg(long, value_name = "FILE")]
    pub logo: Option<PathBuf>,

    /// Logo size in percent of the code [default: logo.default_size_percent].
    #[arg(long, value_parser = clap::value_parser!(u32).range(35..=70))]
    pub logo_size: Option<u32>,

    /// Border around the logo; 0 disables it.
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=8))]
    pub logo_margin: u32,

    /// Output file or directory. Defaults to a dated name in the current directory.
    #[arg(short = 'o', long = "out", value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct BanksArgs {
    /// Print as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Png,
    Jpeg,
    Webp,
    Svg,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Png => ExportFormat::Png,
            FormatArg::Jpeg => ExportFormat::Jpeg,
            FormatArg::Webp => ExportFormat::Webp,
            FormatArg::Svg => ExportFormat::Svg,
        }
    }
}

fn parse_export_size(raw: &str) -> Result<ExportSize, String> {
    let pixels: u32 = raw.parse().map_err(|_| format!("{raw:?} is not a number"))?;
    ExportSize::try_from(pixels)
}
