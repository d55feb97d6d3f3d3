// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{value_parser, Arg, ArgAction, ArgMatches, Command},
    hwpack::{builder::HwpackBuilder, config::Config, error::HwpackError},
    log::{info, LevelFilter},
    std::path::PathBuf,
    thiserror::Error,
};

const BUILD_ABOUT: &str = "\
Build a hardware pack.

A hardware pack is built for every architecture listed in the recipe. Each
is written to the output directory as

   hwpack_<name>_<version>_<arch>[_<support>].tar.gz

along with a `.manifest.txt` file listing the included packages.

Recipes ending in `.yaml` or `.yml` are read as format 3.0 YAML documents.
Other recipes are read as format 1.0 or 2.0 INI files.

Local .deb files given after the version are preferred over packages of the
same name from the recipe's sources, regardless of version.

If the SOURCE_DATE_EPOCH environment variable is set, its value is used as
the modification time of every file in the hardware pack. Otherwise the
current time is used.
";

const CONVERT_ABOUT: &str = "\
Convert a hardware pack recipe to format 3.0.

The recipe is validated and written as a YAML document. Format 2.0
`u_boot_*` and `x_loader_*` options become the `u_boot` and `x_loader`
bootloaders.

Without an output path, the document is printed to stdout.
";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Hwpack(#[from] HwpackError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid SOURCE_DATE_EPOCH: {0}")]
    SourceDateEpoch(String),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

impl CliError {
    /// Process exit status for this error.
    ///
    /// Usage errors exit with 2. Everything else, including missing or
    /// invalid recipes, exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Clap(err) => err.exit_code(),
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

fn command() -> Command {
    Command::new("hwpack")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Build Linaro-style hardware packs")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count)
                .help("Increase logging verbosity. Can be specified multiple times."),
        )
        .subcommand(
            Command::new("build")
                .about("Build a hardware pack from a recipe")
                .long_about(BUILD_ABOUT)
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory to write output files to (default: current directory)"),
                )
                .arg(
                    Arg::new("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path of the hardware pack recipe"),
                )
                .arg(
                    Arg::new("version")
                        .required(true)
                        .help("Version of the hardware pack"),
                )
                .arg(
                    Arg::new("local-debs")
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(PathBuf))
                        .help("Local .deb files to prefer over packages from sources"),
                ),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert a recipe to format 3.0")
                .long_about(CONVERT_ABOUT)
                .arg(
                    Arg::new("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path of the hardware pack recipe"),
                )
                .arg(
                    Arg::new("output")
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to write the converted recipe to"),
                ),
        )
}

fn init_logging(matches: &ArgMatches) {
    let log_level = match matches.get_count("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    // The HTTP stack is chatty at default level.
    if log_level == LevelFilter::Info {
        builder.filter_module("rustls", LevelFilter::Error);
    }

    builder.init();
}

/// Resolve the modification time from a `SOURCE_DATE_EPOCH` value.
fn source_date_epoch(value: Option<&str>) -> Result<Option<u64>> {
    match value {
        Some(s) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| CliError::SourceDateEpoch(s.to_string())),
        None => Ok(None),
    }
}

pub fn run_cli() -> Result<()> {
    let matches = command().try_get_matches()?;

    init_logging(&matches);

    dispatch(&matches)
}

fn dispatch(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("build", args)) => command_build(args),
        Some(("convert", args)) => command_convert(args),
        Some((command, _)) => Err(CliError::InvalidSubCommand(command.to_string())),
        None => Ok(()),
    }
}

fn command_build(args: &ArgMatches) -> Result<()> {
    let config_path = args
        .get_one::<PathBuf>("config")
        .expect("config argument is required");
    let version = args
        .get_one::<String>("version")
        .expect("version argument is required");
    let local_debs = args
        .get_many::<PathBuf>("local-debs")
        .map(|values| values.cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    let mut builder = HwpackBuilder::from_config_path(config_path, version, local_debs)?;

    if let Some(output_dir) = args.get_one::<PathBuf>("output-dir") {
        builder.set_output_dir(output_dir);
    }

    if let Some(mtime) =
        source_date_epoch(std::env::var("SOURCE_DATE_EPOCH").ok().as_deref())?
    {
        info!("using modification time {} from SOURCE_DATE_EPOCH", mtime);
        builder.set_mtime(mtime);
    }

    for output in builder.build()? {
        println!("{}", output.hwpack.display());
        println!("{}", output.manifest.display());
    }

    Ok(())
}

fn command_convert(args: &ArgMatches) -> Result<()> {
    let config_path = args
        .get_one::<PathBuf>("config")
        .expect("config argument is required");

    let yaml = Config::from_path(config_path)?.to_yaml()?;

    match args.get_one::<PathBuf>("output") {
        Some(path) => {
            std::fs::write(path, yaml)?;
            info!("wrote {}", path.display());
        }
        None => print!("{}", yaml),
    }

    Ok(())
}
