use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::config::LaunchConfiguration;
use crate::error::{LauncherError, LauncherResult};

/// Short command line flags understood by the engine entry point.
pub mod flags {
    pub const DATA_FOLDER: &str = "-df";
    pub const RESULTS_FOLDER: &str = "-rf";
    pub const REQUEST_BODIES_FOLDER: &str = "-bdf";
    pub const SIMULATIONS_FOLDER: &str = "-sf";
    pub const SIMULATION: &str = "-s";
    pub const NO_REPORTS: &str = "-nr";
    pub const REPORTS_ONLY: &str = "-ro";
    pub const OUTPUT_DIRECTORY_BASE_NAME: &str = "--on";
}

/// Build the engine argument vector for a run of `simulation_class`.
///
/// Folder values are canonical paths. The vector is a pure function of the
/// configuration and the filesystem state of its folders.
pub fn assemble_args(
    config: &LaunchConfiguration,
    simulation_class: &str,
) -> LauncherResult<Vec<String>> {
    let mut args = vec![
        flags::DATA_FOLDER.to_string(),
        canonical_string(&config.data_folder)?,
        flags::RESULTS_FOLDER.to_string(),
        canonical_string(&config.results_folder)?,
        flags::REQUEST_BODIES_FOLDER.to_string(),
        canonical_string(&config.request_bodies_folder)?,
        flags::SIMULATIONS_FOLDER.to_string(),
        canonical_string(&config.simulations_folder)?,
        flags::SIMULATION.to_string(),
        simulation_class.to_string(),
    ];

    if config.no_reports {
        args.push(flags::NO_REPORTS.to_string());
    }

    if let Some(run) = &config.reports_only {
        args.push(flags::REPORTS_ONLY.to_string());
        args.push(run.clone());
    }

    if let Some(name) = &config.output_directory_base_name {
        args.push(flags::OUTPUT_DIRECTORY_BASE_NAME.to_string());
        args.push(name.clone());
    }

    Ok(args)
}

fn canonical_string(path: &Path) -> LauncherResult<String> {
    path_string(canonical_path(path)?)
}

/// Convert a path to a `String` without lossy replacement of non UTF-8 bytes.
pub(crate) fn path_string(path: impl Into<PathBuf>) -> LauncherResult<String> {
    path.into().into_os_string().into_string().map_err(|raw| {
        LauncherError::path(
            raw,
            io::Error::new(io::ErrorKind::InvalidData, "path is not valid UTF-8"),
        )
    })
}

/// Absolute path with symlinks resolved.
///
/// The path does not need to exist: the longest existing ancestor is
/// canonicalized and the remaining components are appended lexically.
pub fn canonical_path(path: &Path) -> LauncherResult<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|err| LauncherError::path(path, err))?
            .join(path)
    };

    let components: Vec<Component<'_>> = absolute.components().collect();
    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        match fs::canonicalize(&prefix) {
            Ok(resolved) => return Ok(append_lexically(resolved, &components[split..])),
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(LauncherError::path(path, err)),
        }
    }

    Err(LauncherError::path(
        path,
        io::Error::new(io::ErrorKind::NotFound, "no existing ancestor"),
    ))
}

fn append_lexically(mut base: PathBuf, tail: &[Component<'_>]) -> PathBuf {
    for component in tail {
        match component {
            Component::ParentDir => {
                base.pop();
            }
            Component::CurDir => {}
            other => base.push(other.as_os_str()),
        }
    }
    base
}
