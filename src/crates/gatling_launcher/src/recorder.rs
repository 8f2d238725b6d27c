//! Recorder sessions.
//!
//! The recorder is a UI that outlives the call that opens it. [`run_recorder`]
//! opens a [`RecorderWindow`] and blocks on a [`CompletionSignal`] until the
//! window reports that it closed.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tracing::{debug, info, warn};

use crate::classpath::Classpath;
use crate::config::RecorderConfig;
use crate::error::{LauncherError, LauncherResult};
use crate::launcher::{Invocation, Launcher, RECORDER_MAIN_CLASS};
use crate::outcome::ExitReport;

/// Command line flags understood by the recorder entry point.
pub mod flags {
    pub const LOCAL_PORT: &str = "-lp";
    pub const PROXY_HOST: &str = "-ph";
    pub const PROXY_PORT: &str = "-pp";
    pub const PROXY_SSL_PORT: &str = "-pps";
    pub const OUTPUT_FOLDER: &str = "-of";
    pub const REQUEST_BODIES_FOLDER: &str = "-bdf";
    pub const CLASS_NAME: &str = "-cn";
    pub const PACKAGE: &str = "-pkg";
    pub const ENCODING: &str = "-enc";
    pub const FOLLOW_REDIRECT: &str = "-fr";
    pub const CONFIG_FILE: &str = "-cf";
}

/// Build the recorder argument vector. Zero ports and unset options are left out.
pub fn recorder_args(config: &RecorderConfig) -> Vec<String> {
    let mut args = Vec::new();
    let mut push = |flag: &str, value: String| {
        args.push(flag.to_string());
        args.push(value);
    };

    if config.local_port != 0 {
        push(flags::LOCAL_PORT, config.local_port.to_string());
    }
    if let Some(host) = &config.proxy_host {
        push(flags::PROXY_HOST, host.clone());
    }
    if config.proxy_port != 0 {
        push(flags::PROXY_PORT, config.proxy_port.to_string());
    }
    if config.proxy_ssl_port != 0 {
        push(flags::PROXY_SSL_PORT, config.proxy_ssl_port.to_string());
    }
    push(flags::OUTPUT_FOLDER, config.output_folder.display().to_string());
    push(
        flags::REQUEST_BODIES_FOLDER,
        config.request_bodies_folder.display().to_string(),
    );
    if let Some(name) = &config.class_name {
        push(flags::CLASS_NAME, name.clone());
    }
    if let Some(package) = &config.package {
        push(flags::PACKAGE, package.clone());
    }
    if let Some(encoding) = &config.encoding {
        push(flags::ENCODING, encoding.clone());
    }
    if config.follow_redirect {
        push(flags::FOLLOW_REDIRECT, "true".to_string());
    }
    push(flags::CONFIG_FILE, config.config_file.display().to_string());

    args
}

/// Fired by a recorder UI when its last window closes.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    tx: mpsc::Sender<()>,
}

impl CloseHandle {
    pub fn close(&self) {
        let _ = self.tx.send(());
    }
}

/// Blocks until the matching [`CloseHandle`] fires or every handle is dropped.
#[derive(Debug)]
pub struct CompletionSignal {
    rx: mpsc::Receiver<()>,
}

impl CompletionSignal {
    pub fn wait(self) {
        // A disconnected channel means no handle can fire any more.
        let _ = self.rx.recv();
    }
}

pub fn completion_channel() -> (CloseHandle, CompletionSignal) {
    let (tx, rx) = mpsc::channel();
    (CloseHandle { tx }, CompletionSignal { rx })
}

/// A recorder UI that can be opened with command line arguments.
pub trait RecorderWindow {
    /// Open the UI and return once it is showing. `on_close` must fire (or be dropped) when it closes.
    fn open(&self, args: &[String], on_close: CloseHandle) -> LauncherResult<()>;
}

/// Open the recorder and block until it closes.
pub fn run_recorder(config: &RecorderConfig, window: &dyn RecorderWindow) -> LauncherResult<()> {
    let args = recorder_args(config);
    debug!(?args, "recorder arguments");

    let (on_close, signal) = completion_channel();
    window.open(&args, on_close)?;
    info!("recorder started, waiting for it to close");
    signal.wait();
    info!("recorder closed");
    Ok(())
}

/// Recorder UI hosted by a launched recorder process; closing the process closes the window.
pub struct ForkedRecorder<L> {
    launcher: Arc<L>,
    classpath: Classpath,
    report: Arc<Mutex<Option<LauncherResult<ExitReport>>>>,
}

impl<L> ForkedRecorder<L>
where
    L: Launcher + Send + Sync + 'static,
{
    pub fn new(launcher: L, classpath: Classpath) -> Self {
        Self {
            launcher: Arc::new(launcher),
            classpath,
            report: Arc::new(Mutex::new(None)),
        }
    }

    /// Result of the most recent recorder run, once it has closed.
    pub fn take_report(&self) -> Option<LauncherResult<ExitReport>> {
        self.report.lock().ok().and_then(|mut guard| guard.take())
    }
}

impl<L> RecorderWindow for ForkedRecorder<L>
where
    L: Launcher + Send + Sync + 'static,
{
    fn open(&self, args: &[String], on_close: CloseHandle) -> LauncherResult<()> {
        let invocation = Invocation::new(self.classpath.clone(), RECORDER_MAIN_CLASS, args.to_vec());
        let launcher = self.launcher.clone();
        let report = self.report.clone();

        thread::Builder::new()
            .name("gatling-recorder".to_string())
            .spawn(move || {
                let result = launcher.launch(&invocation);
                if let Err(err) = &result {
                    warn!(error = %err, "recorder failed to run");
                }
                if let Ok(mut guard) = report.lock() {
                    *guard = Some(result);
                }
                on_close.close();
            })
            .map_err(|err| LauncherError::launch(format!("start recorder thread: {err}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn defaults_only_pass_folders_and_config_file() {
        let args = recorder_args(&RecorderConfig::for_base_dir("/p"));
        assert_eq!(
            args,
            vec![
                "-of".to_string(),
                PathBuf::from("/p/src/test/scala").display().to_string(),
                "-bdf".to_string(),
                PathBuf::from("/p/src/test/resources/request-bodies")
                    .display()
                    .to_string(),
                "-cf".to_string(),
                PathBuf::from("/p/recorder.conf").display().to_string(),
            ]
        );
    }

    #[test]
    fn ssl_port_is_forwarded_as_ssl_port() {
        let config = RecorderConfig::default()
            .with_local_port(8000)
            .with_proxy("proxy.internal", 3128)
            .with_proxy_ssl_port(3129)
            .with_class_name("RecordedSimulation")
            .with_package("recorded")
            .with_encoding("utf-8")
            .with_follow_redirect(true);
        let args = recorder_args(&config);
        let joined = args.join(" ");
        assert!(joined.starts_with("-lp 8000 -ph proxy.internal -pp 3128 -pps 3129 "));
        assert!(joined.contains("-cn RecordedSimulation -pkg recorded -enc utf-8 -fr true"));
    }

    struct ClosesLater;

    impl RecorderWindow for ClosesLater {
        fn open(&self, _args: &[String], on_close: CloseHandle) -> LauncherResult<()> {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                on_close.close();
            });
            Ok(())
        }
    }

    struct DropsHandle;

    impl RecorderWindow for DropsHandle {
        fn open(&self, _args: &[String], _on_close: CloseHandle) -> LauncherResult<()> {
            Ok(())
        }
    }

    struct FailsToOpen;

    impl RecorderWindow for FailsToOpen {
        fn open(&self, _args: &[String], _on_close: CloseHandle) -> LauncherResult<()> {
            Err(LauncherError::launch("no display"))
        }
    }

    #[test]
    fn run_returns_after_close_signal() {
        run_recorder(&RecorderConfig::default(), &ClosesLater).unwrap();
    }

    #[test]
    fn dropped_handle_releases_the_wait() {
        run_recorder(&RecorderConfig::default(), &DropsHandle).unwrap();
    }

    #[test]
    fn open_failures_propagate() {
        let err = run_recorder(&RecorderConfig::default(), &FailsToOpen).unwrap_err();
        assert!(matches!(err, LauncherError::Launch(_)));
    }

    struct ExitsWith(i32);

    impl Launcher for ExitsWith {
        fn launch(&self, invocation: &Invocation) -> LauncherResult<ExitReport> {
            assert_eq!(invocation.entry_point, RECORDER_MAIN_CLASS);
            Ok(ExitReport::new(self.0))
        }
    }

    #[test]
    fn forked_recorder_closes_when_process_exits() {
        let recorder = ForkedRecorder::new(ExitsWith(0), Classpath::default());
        run_recorder(&RecorderConfig::default(), &recorder).unwrap();
        let report = recorder.take_report().expect("report recorded").unwrap();
        assert_eq!(report.status, 0);
    }
}
