use std::io;
use std::path::{Path, MAIN_SEPARATOR};

use tracing::{debug, error};
use walkdir::WalkDir;

use crate::config::LaunchConfiguration;
use crate::error::{LauncherError, LauncherResult};

/// Extension of simulation source files picked up by the scan.
pub const SIMULATION_EXTENSION: &str = "scala";

/// Derive a dotted class name from a simulation path relative to the simulations folder.
///
/// Only the final extension segment is stripped, and only when the dot is not
/// the first character of the file name. Every path separator becomes `.`.
pub fn class_name_of(relative_path: &str) -> String {
    let trimmed = relative_path.trim();
    let name_start = trimmed
        .rfind(|c: char| c == '/' || c == MAIN_SEPARATOR)
        .map_or(0, |idx| idx + 1);
    let stripped = match trimmed[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &trimmed[..name_start + dot],
        _ => trimmed,
    };

    stripped
        .chars()
        .map(|c| if c == '/' || c == MAIN_SEPARATOR { '.' } else { c })
        .collect()
}

/// Scan `root` recursively for simulation sources and return their class names, sorted by path.
///
/// Symlinked files and directories are followed. Names are derived from the
/// link path under `root`, not from the link target.
pub fn resolve_simulations(root: &Path) -> LauncherResult<Vec<String>> {
    debug!(folder = %root.display(), "effective simulations folder");
    if !root.is_dir() {
        return Err(LauncherError::path(
            root,
            io::Error::new(io::ErrorKind::NotFound, "simulations folder does not exist"),
        ));
    }

    let mut classes = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            LauncherError::path(path, err.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().map_or(true, |ext| ext != SIMULATION_EXTENSION) {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        classes.push(class_name_of(&relative.to_string_lossy()));
    }

    debug!(?classes, "resolved simulation classes");
    Ok(classes)
}

/// Pick the simulation to run: the configured class, or the single class found on disk.
pub fn select_simulation(config: &LaunchConfiguration) -> LauncherResult<String> {
    if let Some(class) = &config.simulation_class {
        return Ok(class.clone());
    }

    let folder = &config.simulations_folder;
    let mut candidates = resolve_simulations(folder)?;
    match candidates.len() {
        0 => {
            error!(folder = %folder.display(), "no simulations to run");
            Err(LauncherError::NoSimulationsFound {
                folder: folder.clone(),
            })
        }
        1 => Ok(candidates.remove(0)),
        count => {
            error!(count, ?candidates, "more than 1 simulation to run, need to specify one");
            Err(LauncherError::AmbiguousSimulations {
                folder: folder.clone(),
                candidates,
            })
        }
    }
}
