//! gatling-launch
//!
//! Runs a Gatling simulation or the recorder for a project laid out the
//! conventional way.
//!
//! Usage: `gatling-launch execute [--base-dir DIR] [--sc CLASS] [--classpath-file FILE] ...`
//!        `gatling-launch record [--base-dir DIR] [--local-port PORT] ...`

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use gatling_launcher::recorder::{run_recorder, ForkedRecorder};
use gatling_launcher::{
    launcher_for, ClasspathBuilder, ClasspathFile, EntryPoints, ForkedLauncher, GatlingRunner,
    JavaToolchain, LaunchConfiguration, LauncherError, LauncherResult, RecorderConfig, RunVerdict,
    StaticClasspath, TestClasspath,
};

#[derive(Parser, Debug)]
#[command(name = "gatling-launch")]
#[command(about = "Launch Gatling simulations or the Gatling recorder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a simulation and map its outcome to an exit code
    Execute(ExecuteArgs),
    /// Open the recorder and wait until it is closed
    Record(RecordArgs),
}

#[derive(Args, Debug)]
struct RuntimeArgs {
    /// Java installation used for forked runs (defaults to JAVA_HOME, then PATH)
    #[arg(long)]
    java_home: Option<PathBuf>,

    /// Explicit Java executable; wins over --java-home
    #[arg(long)]
    java: Option<PathBuf>,

    /// File listing the test classpath, one entry per line
    #[arg(long)]
    classpath_file: Option<PathBuf>,

    /// Test classpath entry; may be repeated and is appended after --classpath-file
    #[arg(long = "classpath-entry")]
    classpath_entries: Vec<String>,

    /// Location added to the classpath for this launcher (defaults to this executable)
    #[arg(long)]
    launcher_location: Option<PathBuf>,

    /// Location of the args-file helper archive
    #[arg(long)]
    helper_location: Option<PathBuf>,
}

impl RuntimeArgs {
    fn toolchain(&self) -> JavaToolchain {
        let mut toolchain = JavaToolchain::default_runtime();
        if let Some(home) = &self.java_home {
            toolchain = toolchain.with_home(home);
        }
        if let Some(java) = &self.java {
            toolchain = toolchain.with_executable(java);
        }
        toolchain
    }

    fn classpath_builder(&self) -> LauncherResult<ClasspathBuilder> {
        let defaults = ClasspathBuilder::from_current_exe()?;
        Ok(ClasspathBuilder::new(
            self.launcher_location
                .clone()
                .unwrap_or_else(|| defaults.launcher_location().to_path_buf()),
            self.helper_location
                .clone()
                .unwrap_or_else(|| defaults.helper_location().to_path_buf()),
        ))
    }

    fn classpath_source(&self) -> CliClasspath {
        CliClasspath {
            file: self.classpath_file.clone().map(ClasspathFile::new),
            entries: StaticClasspath::new(self.classpath_entries.clone()),
        }
    }
}

/// Test classpath read from `--classpath-file` followed by `--classpath-entry` values.
struct CliClasspath {
    file: Option<ClasspathFile>,
    entries: StaticClasspath,
}

impl TestClasspath for CliClasspath {
    fn test_classpath(&self) -> LauncherResult<Vec<String>> {
        let mut entries = match &self.file {
            Some(file) => file.test_classpath()?,
            None => Vec::new(),
        };
        entries.extend(self.entries.test_classpath()?);
        Ok(entries)
    }
}

#[derive(Args, Debug)]
struct ExecuteArgs {
    /// Project root used for the default folder layout
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// JSON file providing the base configuration (replaces the --base-dir layout)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulation class to run; disables folder scanning
    #[arg(long, visible_alias = "sc")]
    simulation_class: Option<String>,

    /// Folder scanned for simulations
    #[arg(long, visible_alias = "sf")]
    simulations_folder: Option<PathBuf>,

    /// Engine configuration folder
    #[arg(long, visible_alias = "cd")]
    config_folder: Option<PathBuf>,

    /// Folder where feeders are stored
    #[arg(long, visible_alias = "df")]
    data_folder: Option<PathBuf>,

    /// Folder where request bodies are stored
    #[arg(long, visible_alias = "bf")]
    request_bodies_folder: Option<PathBuf>,

    /// Folder where results are stored
    #[arg(long, visible_alias = "rf")]
    results_folder: Option<PathBuf>,

    /// Only generate reports for the run stored in this folder
    #[arg(long, visible_alias = "ro")]
    reports_only: Option<String>,

    /// Force the name of the directory generated for the results
    #[arg(long = "output-name", visible_alias = "on")]
    output_directory_base_name: Option<String>,

    /// Run the simulation without generating reports
    #[arg(long, visible_alias = "nr")]
    no_reports: bool,

    /// JVM option for the forked engine; replaces the default tuning set
    #[arg(long = "jvm-arg", allow_hyphen_values = true)]
    jvm_args: Vec<String>,

    /// System property forwarded to the forked engine as KEY=VALUE
    #[arg(long = "system-property", value_parser = parse_key_val)]
    system_properties: Vec<(String, String)>,

    /// Run the engine in this process instead of a forked JVM
    #[arg(long)]
    no_fork: bool,

    /// Do not propagate the environment and system properties to the forked JVM
    #[arg(long)]
    no_propagate: bool,

    /// Report failures as warnings and exit successfully
    #[arg(long)]
    no_fail_on_error: bool,

    /// Always pass engine arguments through an args file
    #[arg(long)]
    force_args_file: bool,

    /// Do nothing
    #[arg(long)]
    skip: bool,

    #[command(flatten)]
    runtime: RuntimeArgs,
}

impl ExecuteArgs {
    fn launch_configuration(&self) -> LauncherResult<LaunchConfiguration> {
        let mut config = match &self.config {
            Some(path) => LaunchConfiguration::from_json_file(path)?,
            None => LaunchConfiguration::for_base_dir(&self.base_dir),
        };

        if let Some(class) = &self.simulation_class {
            config = config.with_simulation_class(class);
        }
        if let Some(dir) = &self.simulations_folder {
            config = config.with_simulations_folder(dir);
        }
        if let Some(dir) = &self.config_folder {
            config = config.with_config_folder(dir);
        }
        if let Some(dir) = &self.data_folder {
            config = config.with_data_folder(dir);
        }
        if let Some(dir) = &self.request_bodies_folder {
            config = config.with_request_bodies_folder(dir);
        }
        if let Some(dir) = &self.results_folder {
            config = config.with_results_folder(dir);
        }
        if let Some(run) = &self.reports_only {
            config = config.with_reports_only(run);
        }
        if let Some(name) = &self.output_directory_base_name {
            config = config.with_output_directory_base_name(name);
        }
        if !self.jvm_args.is_empty() {
            config.jvm_args = Some(self.jvm_args.clone());
        }
        for (key, value) in &self.system_properties {
            config = config.with_system_property(key, value);
        }
        if self.no_reports {
            config = config.with_no_reports(true);
        }
        if self.no_fork {
            config = config.with_fork(false);
        }
        if self.no_propagate {
            config = config.with_propagate_system_properties(false);
        }
        if self.no_fail_on_error {
            config = config.with_fail_on_error(false);
        }
        if self.force_args_file {
            config = config.with_force_args_file(true);
        }
        if self.skip {
            config = config.with_skip(true);
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// Project root used for the default folder layout
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Local port used by the recording proxy
    #[arg(long, default_value_t = 0)]
    local_port: u16,

    /// Outgoing proxy host
    #[arg(long)]
    proxy_host: Option<String>,

    /// Outgoing proxy port for HTTP
    #[arg(long, default_value_t = 0)]
    proxy_port: u16,

    /// Outgoing proxy port for HTTPS
    #[arg(long, default_value_t = 0)]
    proxy_ssl_port: u16,

    /// Folder where generated simulations are stored
    #[arg(long)]
    output_folder: Option<PathBuf>,

    /// Folder where request bodies are stored
    #[arg(long)]
    request_bodies_folder: Option<PathBuf>,

    /// Name of the generated simulation class
    #[arg(long)]
    class_name: Option<String>,

    /// Package of the generated simulation class
    #[arg(long)]
    package: Option<String>,

    /// Encoding used by the recorder
    #[arg(long)]
    encoding: Option<String>,

    /// Follow redirects while recording
    #[arg(long)]
    follow_redirect: bool,

    /// Recorder settings file
    #[arg(long)]
    recorder_config_file: Option<PathBuf>,

    #[command(flatten)]
    runtime: RuntimeArgs,
}

impl RecordArgs {
    fn recorder_configuration(&self) -> RecorderConfig {
        let mut config = RecorderConfig::for_base_dir(&self.base_dir)
            .with_local_port(self.local_port)
            .with_proxy_ssl_port(self.proxy_ssl_port)
            .with_follow_redirect(self.follow_redirect);
        config.proxy_host = self.proxy_host.clone();
        config.proxy_port = self.proxy_port;
        if let Some(dir) = &self.output_folder {
            config = config.with_output_folder(dir);
        }
        if let Some(dir) = &self.request_bodies_folder {
            config = config.with_request_bodies_folder(dir);
        }
        if let Some(name) = &self.class_name {
            config = config.with_class_name(name);
        }
        if let Some(package) = &self.package {
            config = config.with_package(package);
        }
        if let Some(encoding) = &self.encoding {
            config = config.with_encoding(encoding);
        }
        if let Some(path) = &self.recorder_config_file {
            config = config.with_config_file(path);
        }
        config
    }
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty property name in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() -> ExitCode {
    gatling_launcher::init_logging();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Execute(args) => execute(args),
        Command::Record(args) => record(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if err.is_assertion_failure() {
                error!("gatling failed: simulation assertions did not hold");
            } else {
                error!(error = %err, "gatling failed");
            }
            ExitCode::FAILURE
        }
    }
}

fn execute(args: &ExecuteArgs) -> LauncherResult<()> {
    let config = args.launch_configuration()?;
    let source = args.runtime.classpath_source();
    let builder = args.runtime.classpath_builder()?;
    let launcher = launcher_for(&config, args.runtime.toolchain(), EntryPoints::new());

    let runner = GatlingRunner::new(config, &source, builder, launcher);
    match runner.execute()? {
        RunVerdict::Skipped => info!("run skipped"),
        RunVerdict::Succeeded => info!("simulation succeeded"),
        RunVerdict::Tolerated(err) => info!(error = %err, "build continues despite failure"),
    }
    Ok(())
}

fn record(args: &RecordArgs) -> LauncherResult<()> {
    let config = args.recorder_configuration();
    let builder = args.runtime.classpath_builder()?;
    let classpath = builder.build(
        &args.runtime.classpath_source(),
        &args.base_dir.join("src").join("test").join("resources"),
    )?;

    let recorder = ForkedRecorder::new(ForkedLauncher::new(args.runtime.toolchain()), classpath);
    run_recorder(&config, &recorder)?;

    match recorder.take_report() {
        Some(Ok(report)) if report.status == 0 => Ok(()),
        Some(Ok(report)) => Err(LauncherError::SimulationFailed {
            status: report.status,
            cause: report.cause,
        }),
        Some(Err(err)) => Err(err),
        None => Ok(()),
    }
}
