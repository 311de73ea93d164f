use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::error;
use tracing_subscriber::EnvFilter;

use vignette::{MappingFormat, RunOptions, expand_args};

const VERSION_NOTICE: [&str; 5] = [
    "Vignette 0.1.0",
    "Copyright (c) 2019 Jamie Mansfield <https://www.jamiemansfield.me/>",
    "Vignette is made available under the terms of the Mozilla Public License 2.0, giving",
    "you the freedom to use, copy, and distribute Vignette to others, in addition to",
    "the right to distribute modified versions.",
];

/// Remaps an obfuscated jar with a mapping file.
#[derive(Debug, Parser)]
#[command(name = "vignette", disable_version_flag = true)]
struct Cli {
    /// Shows the version
    #[arg(long)]
    version: bool,
    /// The jar to remap
    #[arg(short = 'i', long = "jar-in")]
    jar_in: Option<PathBuf>,
    /// The output jar
    #[arg(short = 'o', long = "jar-out")]
    jar_out: Option<PathBuf>,
    /// The mapping format
    #[arg(short = 'f', long = "mapping-format", value_enum, default_value_t = MappingFormat::Srg)]
    mapping_format: MappingFormat,
    /// The mappings to remap with
    #[arg(short = 'm', long)]
    mappings: Option<PathBuf>,
    /// Number of threads to use when remapping
    #[arg(short = 't', long, value_parser = clap::value_parser!(usize))]
    threads: Option<usize>,
    /// Library to add to the classpath for constructing inheritance
    #[arg(short = 'l', long = "library", short_alias = 'e')]
    libraries: Vec<PathBuf>,
    /// Generate a metadata file naming abstract method arguments for ForgeFlower
    #[arg(long)]
    fernflower_meta: bool,
    /// Deduce parameter names from parameter types
    #[arg(long, alias = "dp")]
    deduce_param_names: bool,
    /// Dictionary used when deducing parameter names, applied in order
    #[arg(short = 'd', long = "dictionary")]
    dictionaries: Vec<PathBuf>,
    /// Generate stable jars that change less for the same inputs
    #[arg(long)]
    stable: bool,
}

impl Cli {
    /// `None` unless input, output and mappings are all present.
    fn run_options(self) -> Option<RunOptions> {
        let mut options = RunOptions::new(self.jar_in?, self.jar_out?, self.mappings?);
        options.mapping_format = self.mapping_format;
        options.threads = self.threads;
        options.libraries = self.libraries;
        options.fernflower_meta = self.fernflower_meta;
        options.deduce_param_names = self.deduce_param_names;
        options.dictionaries = self.dictionaries;
        options.stable = self.stable;
        Some(options)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Help on stderr, for runs missing a required option.
fn usage() -> ExitCode {
    eprint!("{}", Cli::command().render_help());
    ExitCode::FAILURE
}

fn execute() -> Result<ExitCode> {
    let args = expand_args(std::env::args())?;
    let cli = Cli::try_parse_from(args).unwrap_or_else(|err| err.exit());
    if cli.version {
        for line in VERSION_NOTICE {
            println!("{line}");
        }
        return Ok(ExitCode::SUCCESS);
    }
    let Some(options) = cli.run_options() else {
        return Ok(usage());
    };
    vignette::run(&options)
        .with_context(|| format!("failed to remap {}", options.input.display()))?;
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    init_tracing();
    match execute() {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, usage};
    use clap::Parser;
    use std::process::ExitCode;

    #[test]
    fn runs_need_input_output_and_mappings() {
        let cli = Cli::try_parse_from(["vignette", "-i", "in.jar", "-o", "out.jar"]).expect("parse");
        assert!(cli.run_options().is_none());

        let cli = Cli::try_parse_from(["vignette", "-i", "in.jar", "-o", "out.jar", "-m", "a.srg"])
            .expect("parse");
        assert!(cli.run_options().is_some());
    }

    #[test]
    fn missing_options_fail() {
        assert_eq!(usage(), ExitCode::FAILURE);
    }
}
