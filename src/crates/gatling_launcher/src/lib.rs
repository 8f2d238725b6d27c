//! Utilities for launching Gatling simulations from a build, either in a forked
//! JVM or in process, and turning the engine's exit status into a build verdict.
//!
//! Typical usage:
//! ```no_run
//! use gatling_launcher::{
//!     launcher_for, ClasspathBuilder, EntryPoints, GatlingRunner, JavaToolchain,
//!     LaunchConfiguration, RunVerdict, StaticClasspath,
//! };
//!
//! let config = LaunchConfiguration::for_base_dir("/path/to/project").with_fail_on_error(false);
//! let classpath = StaticClasspath::new(["/path/to/gatling-app.jar"]);
//! let launcher = launcher_for(&config, JavaToolchain::default_runtime(), EntryPoints::new());
//! let builder = ClasspathBuilder::from_current_exe().expect("launcher location");
//!
//! let runner = GatlingRunner::new(config, &classpath, builder, launcher);
//! match runner.execute().expect("build should not abort") {
//!     RunVerdict::Tolerated(err) => println!("tolerated: {err}"),
//!     verdict => println!("{verdict:?}"),
//! }
//! ```

mod args;
mod classpath;
mod config;
mod error;
mod launcher;
mod outcome;
pub mod recorder;
mod runner;
mod simulation;

pub use args::{assemble_args, canonical_path, flags};
pub use classpath::{
    Classpath, ClasspathBuilder, ClasspathFile, StaticClasspath, TestClasspath,
    CLASSPATH_SEPARATOR, HELPER_ARCHIVE,
};
pub use config::{LaunchConfiguration, RecorderConfig};
pub use error::{LauncherError, LauncherResult};
pub use launcher::{
    EntryPoint, EntryPoints, ForkedLauncher, InProcessLauncher, Invocation, JavaToolchain,
    Launcher, ARGS_FILE_MAIN_CLASS, DEFAULT_JVM_ARGS, GATLING_MAIN_CLASS,
    MAX_INLINE_COMMAND_LEN, RECORDER_MAIN_CLASS,
};
pub use outcome::{ExitReport, LaunchOutcome, ASSERTIONS_FAILED_STATUS};
pub use runner::{launcher_for, GatlingRunner, RunVerdict};
pub use simulation::{class_name_of, resolve_simulations, select_simulation, SIMULATION_EXTENSION};

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gatling_launcher=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
