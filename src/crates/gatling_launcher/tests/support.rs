#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use gatling_launcher::LaunchConfiguration;

pub fn fake_java_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_fake_java") {
        return PathBuf::from(path);
    }

    // Fallback to the workspace target directory.
    let mut path = std::env::current_exe().expect("current exe");
    path.pop(); // deps
    path.pop(); // debug or release
    path.push("fake_java");
    if cfg!(windows) {
        path.set_extension("exe");
    }
    path
}

/// Lay out a project under `root` with the given simulation sources.
pub fn project_with_simulations(root: &Path, simulations: &[&str]) -> LaunchConfiguration {
    let config = LaunchConfiguration::for_base_dir(root);
    fs::create_dir_all(&config.simulations_folder).expect("simulations folder");
    for simulation in simulations {
        let path = config.simulations_folder.join(simulation);
        fs::create_dir_all(path.parent().expect("parent")).expect("package folder");
        fs::write(&path, "class LoadTest extends Simulation {}").expect("simulation source");
    }
    config
}

pub fn read_record(path: &Path) -> serde_json::Value {
    let text = fs::read_to_string(path).expect("fake java should record its invocation");
    serde_json::from_str(&text).expect("record should be valid json")
}

pub fn strings(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .expect("array")
        .iter()
        .map(|item| item.as_str().expect("string").to_string())
        .collect()
}
