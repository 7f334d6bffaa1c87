//! # qrsmith CLI
//!
//! Thin front end over the `qrsmith` library.
//!
//! ## Exit codes
//!
//! | Code | Meaning                   |
//! |------|---------------------------|
//! |  0   | Success                   |
//! |  1   | Internal / system error   |
//! |  2   | Invalid input or options  |
//! |  4   | Configuration error       |

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use qrsmith::{
    banks, build_payload, validate, ErrorCategory, ExportJob, ExportPipeline, FieldData, ImageRef, LogoSpec,
    QrConfig, QrContext, QrError, QrRequest, StyleOptions,
};

use crate::cli::{BanksArgs, Cli, Commands, ExportArgs, InputArgs};
use crate::logging::init_logging;

mod cli;
mod logging;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet) {
        eprintln!("{e}");
        return ExitCode::from(1);
    }
    debug!(verbose = cli.global.verbose, quiet = cli.global.quiet, "CLI started");

    let config = match QrConfig::load(cli.global.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("failed to load configuration: {e}");
            eprintln!("error: {e}");
            return ExitCode::from(4);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: cannot start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => handle_error(e),
    }
}

async fn run(cli: Cli, config: QrConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Encode(args) => encode(args, &config),
        Commands::Validate(args) => validate_input(args),
        Commands::Export(args) => export(args, config).await,
        Commands::Banks(args) => list_banks(args),
    }
}

fn encode(args: InputArgs, config: &QrConfig) -> anyhow::Result<()> {
    let data = read_input(&args.input)?;
    let payload = build_payload(&data, &config.calendar)?;
    println!("{payload}");
    Ok(())
}

fn validate_input(args: InputArgs) -> anyhow::Result<()> {
    let data = read_input(&args.input)?;
    let result = validate(&data);
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.is_valid() {
        Ok(())
    } else {
        Err(QrError::Validation(result).into())
    }
}

async fn export(args: ExportArgs, config: QrConfig) -> anyhow::Result<()> {
    let data = read_input(&args.input.input)?;
    let payload = build_payload(&data, &config.calendar)?;

    let style = match &args.style {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("cannot read style file {}", path.display()))?;
            serde_json::from_str::<StyleOptions>(&raw)
                .with_context(|| format!("invalid style file {}", path.display()))?
        }
        None => StyleOptions::default(),
    };

    let mut request = QrRequest::new(payload).with_style(style);
    if let Some(logo) = &args.logo {
        request = request.with_logo(
            LogoSpec::new(ImageRef::Path(logo.clone()))
                .with_size_percent(args.logo_size.unwrap_or(config.logo.default_size_percent))
                .with_margin(args.logo_margin),
        );
    }

    // an explicit file name wins over the dated default
    let explicit_file = args
        .out
        .as_deref()
        .filter(|path| !path.is_dir())
        .and_then(Path::file_stem)
        .map(|stem| stem.to_string_lossy().into_owned());
    let job = ExportJob {
        format: args.format.into(),
        size: args.size,
        filename: explicit_file,
    };

    let pipeline = ExportPipeline::new(QrContext::new(config));
    let artifact = pipeline.download(&request, &job).await?;

    let path = output_path(args.out.as_deref(), &artifact.filename);
    tokio::fs::write(&path, &artifact.bytes)
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    info!(path = %path.display(), bytes = artifact.bytes.len(), mime = artifact.mime, "export written");
    println!("{}", path.display());
    Ok(())
}

fn list_banks(args: BanksArgs) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(banks::TAIWAN_BANKS)?);
        return Ok(());
    }
    for bank in banks::TAIWAN_BANKS {
        println!("{}\t{}", banks::format_bank_option(bank), bank.name);
    }
    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<FieldData> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("cannot read field data from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?
    };
    serde_json::from_str(&raw).map_err(|e| QrError::InvalidOptions(format!("invalid field data: {e}")).into())
}

/// Directory targets receive the artifact's own name; anything else is used as is.
fn output_path(out: Option<&Path>, filename: &str) -> PathBuf {
    match out {
        Some(dir) if dir.is_dir() => dir.join(filename),
        Some(file) => file.with_file_name(filename),
        None => PathBuf::from(filename),
    }
}

fn handle_error(err: anyhow::Error) -> ExitCode {
    let code = match err.downcast_ref::<QrError>().map(QrError::category) {
        Some(ErrorCategory::Input) => 2,
        Some(ErrorCategory::Configuration) => 4,
        _ => 1,
    };
    tracing::error!("{err:#}");
    eprintln!("error: {err:#}");
    ExitCode::from(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn export_defaults() {
        let cli = Cli::try_parse_from(["qrsmith", "export", "wifi.json"]).unwrap();
        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.size.pixels(), 1024);
        assert_eq!(args.logo_size, None);
        assert_eq!(args.logo_margin, 0);
    }

    #[test]
    fn export_rejects_unknown_size_and_margin() {
        assert!(Cli::try_parse_from(["qrsmith", "export", "a.json", "--size", "300"]).is_err());
        assert!(Cli::try_parse_from(["qrsmith", "export", "a.json", "--logo-margin", "9"]).is_err());
    }

    #[test]
    fn output_path_handling() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(output_path(Some(dir.path()), "qr-url-2024-01-01.png"), dir.path().join("qr-url-2024-01-01.png"));
        assert_eq!(output_path(Some(Path::new("out/code.png")), "code.svg"), PathBuf::from("out/code.svg"));
        assert_eq!(output_path(None, "a.png"), PathBuf::from("a.png"));
    }

    #[test]
    fn input_errors_map_to_exit_code_two() {
        let err: anyhow::Error = QrError::InvalidOptions("bad".into()).into();
        assert_eq!(handle_error(err), ExitCode::from(2));
    }
}
