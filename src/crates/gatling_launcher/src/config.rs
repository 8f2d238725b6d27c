use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{LauncherError, LauncherResult};

/// Run-level configuration supplied by the build layer.
///
/// Folder defaults follow the conventional project layout relative to a base
/// directory (see [`LaunchConfiguration::for_base_dir`]).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchConfiguration {
    /// Folder holding the engine configuration; also prepended to the classpath.
    pub config_folder: PathBuf,
    /// Folder scanned for simulation sources.
    pub simulations_folder: PathBuf,
    /// Folder where feeders are stored.
    pub data_folder: PathBuf,
    /// Folder where request bodies are stored.
    pub request_bodies_folder: PathBuf,
    /// Folder where results are written; created before launch.
    pub results_folder: PathBuf,
    /// Simulation to run. Takes precedence over folder scanning.
    pub simulation_class: Option<String>,
    /// Only generate reports for the run stored under this name.
    pub reports_only: Option<String>,
    /// Forced name of the directory generated for the results of the run.
    pub output_directory_base_name: Option<String>,
    /// Run the simulation without generating reports.
    pub no_reports: bool,
    /// JVM options for the forked engine. `None` selects the default tuning set.
    pub jvm_args: Option<Vec<String>>,
    /// System properties forwarded as `-D` options when propagation is on.
    pub system_properties: BTreeMap<String, String>,
    /// Fork the engine into a separate JVM.
    pub fork: bool,
    /// Propagate this process's environment and system properties to the fork.
    pub propagate_system_properties: bool,
    /// Abort the build on any unsuccessful outcome.
    pub fail_on_error: bool,
    /// Always pass engine arguments through an args file.
    pub force_args_file: bool,
    /// Disable the run entirely.
    pub skip: bool,
}

impl LaunchConfiguration {
    /// Create a config whose folders follow the standard layout under `base_dir`.
    pub fn for_base_dir(base_dir: impl AsRef<Path>) -> Self {
        let base = base_dir.as_ref();
        let resources = base.join("src").join("test").join("resources");
        Self {
            config_folder: resources.clone(),
            simulations_folder: base.join("src").join("test").join("scala"),
            data_folder: resources.join("data"),
            request_bodies_folder: resources.join("request-bodies"),
            results_folder: base.join("target").join("gatling").join("results"),
            simulation_class: None,
            reports_only: None,
            output_directory_base_name: None,
            no_reports: false,
            jvm_args: None,
            system_properties: BTreeMap::new(),
            fork: true,
            propagate_system_properties: true,
            fail_on_error: true,
            force_args_file: false,
            skip: false,
        }
    }

    /// Load a JSON config file. Missing keys fall back to the layout under the current directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> LauncherResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| LauncherError::Config(format!("read {}: {err}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Parse a JSON config document.
    pub fn from_json_str(text: &str) -> LauncherResult<Self> {
        serde_json::from_str(text).map_err(|err| LauncherError::Config(err.to_string()))
    }

    /// Set the engine configuration folder.
    pub fn with_config_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_folder = dir.into();
        self
    }

    /// Set the folder scanned for simulation sources.
    pub fn with_simulations_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.simulations_folder = dir.into();
        self
    }

    /// Set the folder holding feeder files.
    pub fn with_data_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_folder = dir.into();
        self
    }

    /// Set the folder holding request bodies.
    pub fn with_request_bodies_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.request_bodies_folder = dir.into();
        self
    }

    /// Set the folder where run results are written.
    pub fn with_results_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_folder = dir.into();
        self
    }

    /// Pin the simulation class, bypassing folder scanning.
    pub fn with_simulation_class(mut self, class: impl Into<String>) -> Self {
        self.simulation_class = Some(class.into());
        self
    }

    /// Only generate reports for an existing run.
    pub fn with_reports_only(mut self, run: impl Into<String>) -> Self {
        self.reports_only = Some(run.into());
        self
    }

    /// Force the name of the results directory for this run.
    pub fn with_output_directory_base_name(mut self, name: impl Into<String>) -> Self {
        self.output_directory_base_name = Some(name.into());
        self
    }

    /// Skip report generation after the run.
    pub fn with_no_reports(mut self, flag: bool) -> Self {
        self.no_reports = flag;
        self
    }

    /// Replace the default JVM tuning set. Repeated calls accumulate.
    pub fn with_jvm_arg(mut self, arg: impl Into<String>) -> Self {
        self.jvm_args.get_or_insert_with(Vec::new).push(arg.into());
        self
    }

    /// Add a system property forwarded to the forked JVM.
    pub fn with_system_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.system_properties.insert(key.into(), value.into());
        self
    }

    /// Run the engine in a separate JVM instead of in process.
    pub fn with_fork(mut self, flag: bool) -> Self {
        self.fork = flag;
        self
    }

    /// Forward this process's environment and system properties to the fork.
    pub fn with_propagate_system_properties(mut self, flag: bool) -> Self {
        self.propagate_system_properties = flag;
        self
    }

    /// Abort the build when the run does not succeed.
    pub fn with_fail_on_error(mut self, flag: bool) -> Self {
        self.fail_on_error = flag;
        self
    }

    /// Always pass engine arguments through an args file.
    pub fn with_force_args_file(mut self, flag: bool) -> Self {
        self.force_args_file = flag;
        self
    }

    /// Disable the run entirely.
    pub fn with_skip(mut self, flag: bool) -> Self {
        self.skip = flag;
        self
    }
}

impl Default for LaunchConfiguration {
    fn default() -> Self {
        Self::for_base_dir(".")
    }
}

/// Settings for a recorder session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecorderConfig {
    /// Local port of the recording proxy. `0` leaves the recorder default.
    pub local_port: u16,
    /// Outgoing proxy host.
    pub proxy_host: Option<String>,
    /// Outgoing proxy port for HTTP. `0` leaves the recorder default.
    pub proxy_port: u16,
    /// Outgoing proxy port for HTTPS. `0` leaves the recorder default.
    pub proxy_ssl_port: u16,
    /// Folder where generated simulations are stored.
    pub output_folder: PathBuf,
    /// Folder where recorded request bodies are stored.
    pub request_bodies_folder: PathBuf,
    pub class_name: Option<String>,
    pub package: Option<String>,
    pub encoding: Option<String>,
    pub follow_redirect: bool,
    /// Recorder settings file.
    pub config_file: PathBuf,
}

impl RecorderConfig {
    /// Create a recorder config whose folders follow the standard layout under `base_dir`.
    pub fn for_base_dir(base_dir: impl AsRef<Path>) -> Self {
        let base = base_dir.as_ref();
        Self {
            local_port: 0,
            proxy_host: None,
            proxy_port: 0,
            proxy_ssl_port: 0,
            output_folder: base.join("src").join("test").join("scala"),
            request_bodies_folder: base
                .join("src")
                .join("test")
                .join("resources")
                .join("request-bodies"),
            class_name: None,
            package: None,
            encoding: None,
            follow_redirect: false,
            config_file: base.join("recorder.conf"),
        }
    }

    /// Set the local port of the recording proxy.
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Route outgoing traffic through a proxy.
    pub fn with_proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy_host = Some(host.into());
        self.proxy_port = port;
        self
    }

    /// Set the outgoing proxy port for HTTPS.
    pub fn with_proxy_ssl_port(mut self, port: u16) -> Self {
        self.proxy_ssl_port = port;
        self
    }

    /// Set the folder where generated simulations are stored.
    pub fn with_output_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_folder = dir.into();
        self
    }

    /// Set the folder where recorded request bodies are stored.
    pub fn with_request_bodies_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.request_bodies_folder = dir.into();
        self
    }

    /// Name the generated simulation class.
    pub fn with_class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = Some(name.into());
        self
    }

    /// Set the package of the generated simulation class.
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Set the encoding used for generated files.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Follow redirects while recording.
    pub fn with_follow_redirect(mut self, flag: bool) -> Self {
        self.follow_redirect = flag;
        self
    }

    /// Use a recorder settings file.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = path.into();
        self
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self::for_base_dir(".")
    }
}
