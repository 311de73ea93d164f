//! Argument files and the options of one remapping run.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{VignetteError, VignetteResult};
use crate::mappings_io::MappingFormat;

const CFG_FLAG: &str = "--cfg";

/// Everything the pipeline needs, independent of how it was parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mapping_format: MappingFormat,
    pub mappings: PathBuf,
    /// `None` uses the global worker pool.
    pub threads: Option<usize>,
    pub libraries: Vec<PathBuf>,
    pub fernflower_meta: bool,
    pub deduce_param_names: bool,
    /// Applied in order.
    pub dictionaries: Vec<PathBuf>,
    pub stable: bool,
}

impl RunOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, mappings: impl Into<PathBuf>) -> Self {
        RunOptions {
            input: input.into(),
            output: output.into(),
            mapping_format: MappingFormat::default(),
            mappings: mappings.into(),
            threads: None,
            libraries: Vec::new(),
            fernflower_meta: false,
            deduce_param_names: false,
            dictionaries: Vec::new(),
            stable: false,
        }
    }
}

fn read_config(path: &Path) -> VignetteResult<Vec<String>> {
    if !path.is_file() {
        return Err(VignetteError::Config(format!(
            "error: missing config '{}'",
            path.display()
        )));
    }
    let lines: Vec<String> = fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    debug!(path = %path.display(), arguments = lines.len(), "expanded argument file");
    Ok(lines)
}

/// Replaces every `--cfg <file>` or `--cfg=<file>` with the lines of that file.
///
/// Each line becomes exactly one argument. Expanded lines are not expanded again.
pub fn expand_args<I>(args: I) -> VignetteResult<Vec<String>>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut expanded = Vec::new();
    while let Some(arg) = args.next() {
        let path = if arg == CFG_FLAG {
            args.next().ok_or_else(|| {
                VignetteError::Config("Must specify a file when using --cfg argument.".to_owned())
            })?
        } else if let Some(path) = arg.strip_prefix("--cfg=") {
            path.to_owned()
        } else {
            expanded.push(arg);
            continue;
        };
        expanded.extend(read_config(Path::new(&path))?);
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::expand_args;
    use crate::error::VignetteError;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn expands_argument_files_in_place() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let cfg = dir.path().join("run.cfg");
        fs::write(&cfg, "--jar-in\nin file.jar\n\n--stable\n")?;
        let path = cfg.display().to_string();

        let separate = expand_args(strings(&["vignette", "--cfg", &path, "--threads", "2"]))?;
        assert_eq!(
            separate,
            strings(&["vignette", "--jar-in", "in file.jar", "--stable", "--threads", "2"])
        );
        let joined = expand_args(strings(&["vignette", &format!("--cfg={path}")]))?;
        assert_eq!(joined, strings(&["vignette", "--jar-in", "in file.jar", "--stable"]));
        Ok(())
    }

    #[test]
    fn reports_missing_files_and_values() {
        let err = expand_args(strings(&["vignette", "--cfg"]));
        assert!(matches!(
            err,
            Err(VignetteError::Config(message)) if message == "Must specify a file when using --cfg argument."
        ));
        let err = expand_args(strings(&["--cfg=/nonexistent/vignette.cfg"]));
        assert!(matches!(
            err,
            Err(VignetteError::Config(message)) if message == "error: missing config '/nonexistent/vignette.cfg'"
        ));
    }
}
