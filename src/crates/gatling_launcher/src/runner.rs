use std::fs;

use tracing::{info, warn};

use crate::args::assemble_args;
use crate::classpath::{ClasspathBuilder, TestClasspath};
use crate::config::LaunchConfiguration;
use crate::error::{LauncherError, LauncherResult};
use crate::launcher::{
    EntryPoints, ForkedLauncher, InProcessLauncher, Invocation, JavaToolchain, Launcher,
    GATLING_MAIN_CLASS,
};
use crate::outcome::LaunchOutcome;
use crate::simulation::select_simulation;

/// What the host build should make of a run.
#[derive(Debug)]
pub enum RunVerdict {
    /// The run was disabled by configuration.
    Skipped,
    Succeeded,
    /// The run did not succeed, but fail-on-error is off.
    Tolerated(LauncherError),
}

/// Pick the launcher matching the configured execution mode.
pub fn launcher_for(
    config: &LaunchConfiguration,
    toolchain: JavaToolchain,
    entry_points: EntryPoints,
) -> Box<dyn Launcher> {
    if config.fork {
        Box::new(ForkedLauncher::from_config(config, toolchain))
    } else {
        Box::new(InProcessLauncher::new(entry_points))
    }
}

/// Resolves, assembles and launches one simulation run.
pub struct GatlingRunner<'a, L> {
    config: LaunchConfiguration,
    classpath_source: &'a dyn TestClasspath,
    classpath_builder: ClasspathBuilder,
    launcher: L,
}

impl<'a, L: Launcher> GatlingRunner<'a, L> {
    pub fn new(
        config: LaunchConfiguration,
        classpath_source: &'a dyn TestClasspath,
        classpath_builder: ClasspathBuilder,
        launcher: L,
    ) -> Self {
        Self {
            config,
            classpath_source,
            classpath_builder,
            launcher,
        }
    }

    pub fn config(&self) -> &LaunchConfiguration {
        &self.config
    }

    /// Run the simulation and classify its exit status.
    ///
    /// Nothing is launched when simulation resolution, path resolution or
    /// classpath resolution fails.
    pub fn run(&self) -> LauncherResult<LaunchOutcome> {
        fs::create_dir_all(&self.config.results_folder)
            .map_err(|err| LauncherError::path(&self.config.results_folder, err))?;

        let simulation = select_simulation(&self.config)?;
        let args = assemble_args(&self.config, &simulation)?;
        let classpath = self
            .classpath_builder
            .build(self.classpath_source, &self.config.config_folder)?;

        info!(%simulation, fork = self.config.fork, "running simulation");
        let report = self
            .launcher
            .launch(&Invocation::new(classpath, GATLING_MAIN_CLASS, args))?;
        let outcome = LaunchOutcome::translate(report);
        info!(%outcome, "simulation finished");
        Ok(outcome)
    }

    /// Run and apply the fail-on-error policy.
    pub fn execute(&self) -> LauncherResult<RunVerdict> {
        if self.config.skip {
            info!("skipping gatling run");
            return Ok(RunVerdict::Skipped);
        }

        let result = self.run().and_then(|outcome| match outcome {
            LaunchOutcome::Success => Ok(()),
            LaunchOutcome::AssertionsFailed => Err(LauncherError::AssertionsFailed),
            LaunchOutcome::Failure { status, cause } => {
                Err(LauncherError::SimulationFailed { status, cause })
            }
        });

        match result {
            Ok(()) => Ok(RunVerdict::Succeeded),
            Err(err) if self.config.fail_on_error => Err(err),
            Err(err) => {
                if err.is_assertion_failure() {
                    warn!("simulation assertions failed, but fail_on_error is off so the build continues");
                } else {
                    warn!(error = %err, "there were errors while running the simulation, but fail_on_error is off so the build continues");
                }
                Ok(RunVerdict::Tolerated(err))
            }
        }
    }
}
