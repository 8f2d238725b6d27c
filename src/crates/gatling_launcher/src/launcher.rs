use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{mpsc, Arc};
use std::thread;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::classpath::Classpath;
use crate::config::LaunchConfiguration;
use crate::error::{LauncherError, LauncherResult};
use crate::outcome::ExitReport;

/// Entry point of the load-test engine.
pub const GATLING_MAIN_CLASS: &str = "io.gatling.app.Gatling";

/// Entry point of the recorder.
pub const RECORDER_MAIN_CLASS: &str = "io.gatling.recorder.GatlingRecorder";

/// Helper entry point that reads `<main class> <args file>` and forwards the file's lines as arguments.
pub const ARGS_FILE_MAIN_CLASS: &str = "scala_maven_executions.MainWithArgsInFile";

/// JVM tuning options used when the configuration does not override them.
///
/// These target legacy (Java 8 era) runtimes. `-XX:+UseParNewGC` and
/// `-XX:ThreadPriorityPolicy=42` stop Java 10 and later from starting, so set
/// `jvm_args` when running on a modern JVM.
pub const DEFAULT_JVM_ARGS: &[&str] = &[
    "-server",
    "-XX:+UseThreadPriorities",
    "-XX:ThreadPriorityPolicy=42",
    "-Xms512M",
    "-Xmx512M",
    "-Xmn100M",
    "-XX:+HeapDumpOnOutOfMemoryError",
    "-XX:+AggressiveOpts",
    "-XX:+OptimizeStringConcat",
    "-XX:+UseFastAccessorMethods",
    "-XX:+UseParNewGC",
    "-XX:+UseConcMarkSweepGC",
    "-XX:+CMSParallelRemarkEnabled",
];

/// Longest command line passed inline before switching to an args file.
pub const MAX_INLINE_COMMAND_LEN: usize = if cfg!(windows) { 8_000 } else { 120_000 };

/// Number of trailing stderr lines kept as the failure cause.
const CAUSE_LINES: usize = 20;

/// Everything needed to start one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub classpath: Classpath,
    pub entry_point: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(classpath: Classpath, entry_point: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            classpath,
            entry_point: entry_point.into(),
            args,
        }
    }
}

/// Runs an invocation to completion and reports its raw exit status.
pub trait Launcher {
    fn launch(&self, invocation: &Invocation) -> LauncherResult<ExitReport>;
}

impl<L: Launcher + ?Sized> Launcher for Box<L> {
    fn launch(&self, invocation: &Invocation) -> LauncherResult<ExitReport> {
        (**self).launch(invocation)
    }
}

/// Selects the Java runtime used for forked runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JavaToolchain {
    home: Option<PathBuf>,
    executable: Option<PathBuf>,
}

impl JavaToolchain {
    /// Use `JAVA_HOME` if set, otherwise `java` from `PATH`.
    pub fn default_runtime() -> Self {
        Self::default()
    }

    /// Use the runtime installed under `home`.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Use an explicit runtime executable.
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Resolve the runtime executable: explicit path, then `home/bin/java`,
    /// then `$JAVA_HOME/bin/java`, then `java` looked up on `PATH`.
    pub fn java_executable(&self) -> PathBuf {
        if let Some(path) = &self.executable {
            return path.clone();
        }
        let home = self
            .home
            .clone()
            .or_else(|| std::env::var_os("JAVA_HOME").map(PathBuf::from));
        match home {
            Some(home) => home.join("bin").join(java_binary_name()),
            None => PathBuf::from(java_binary_name()),
        }
    }
}

fn java_binary_name() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// Origin stream of forwarded child output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Bytes read from one of the child's streams, forwarded as soon as they arrive.
#[derive(Debug, Clone)]
struct OutputChunk {
    stream: OutputStream,
    bytes: Vec<u8>,
}

/// Runs the engine in a separate JVM and waits for it to exit.
#[derive(Debug, Clone)]
pub struct ForkedLauncher {
    toolchain: JavaToolchain,
    jvm_args: Vec<String>,
    system_properties: BTreeMap<String, String>,
    propagate_environment: bool,
    force_args_file: bool,
    env: BTreeMap<String, String>,
    working_directory: Option<PathBuf>,
}

impl ForkedLauncher {
    pub fn new(toolchain: JavaToolchain) -> Self {
        Self {
            toolchain,
            jvm_args: DEFAULT_JVM_ARGS.iter().map(|arg| arg.to_string()).collect(),
            system_properties: BTreeMap::new(),
            propagate_environment: true,
            force_args_file: false,
            env: BTreeMap::new(),
            working_directory: None,
        }
    }

    /// Launcher set up from the JVM options and propagation flags of a run configuration.
    pub fn from_config(config: &LaunchConfiguration, toolchain: JavaToolchain) -> Self {
        let mut launcher = Self::new(toolchain)
            .with_propagate_environment(config.propagate_system_properties)
            .with_force_args_file(config.force_args_file);
        if let Some(args) = &config.jvm_args {
            launcher = launcher.with_jvm_args(args.clone());
        }
        for (key, value) in &config.system_properties {
            launcher = launcher.with_system_property(key.clone(), value.clone());
        }
        launcher
    }

    /// Replace the JVM options.
    pub fn with_jvm_args(mut self, args: Vec<String>) -> Self {
        self.jvm_args = args;
        self
    }

    pub fn with_system_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.system_properties.insert(key.into(), value.into());
        self
    }

    /// Inherit this process's environment and forward system properties.
    pub fn with_propagate_environment(mut self, flag: bool) -> Self {
        self.propagate_environment = flag;
        self
    }

    pub fn with_force_args_file(mut self, flag: bool) -> Self {
        self.force_args_file = flag;
        self
    }

    /// Add an environment variable for the child, applied after propagation.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn toolchain(&self) -> &JavaToolchain {
        &self.toolchain
    }

    /// JVM options, forwarded system properties and the classpath, in command line order.
    pub fn jvm_options(&self, classpath: &Classpath) -> Vec<String> {
        let mut options = self.jvm_args.clone();
        if self.propagate_environment {
            options.extend(
                self.system_properties
                    .iter()
                    .map(|(key, value)| format!("-D{key}={value}")),
            );
        }
        options.push("-cp".to_string());
        options.push(classpath.to_string());
        options
    }

    /// Arguments following the runtime executable. `args_file` switches to the helper entry point.
    pub fn command_args(&self, invocation: &Invocation, args_file: Option<&Path>) -> Vec<String> {
        let mut args = self.jvm_options(&invocation.classpath);
        match args_file {
            Some(file) => {
                args.push(ARGS_FILE_MAIN_CLASS.to_string());
                args.push(invocation.entry_point.clone());
                args.push(file.display().to_string());
            }
            None => {
                args.push(invocation.entry_point.clone());
                args.extend(invocation.args.iter().cloned());
            }
        }
        args
    }

    fn needs_args_file(&self, invocation: &Invocation) -> bool {
        if self.force_args_file {
            return true;
        }
        let executable = self.toolchain.java_executable();
        let inline_len = executable.as_os_str().len()
            + self
                .command_args(invocation, None)
                .iter()
                .map(|arg| arg.len() + 1)
                .sum::<usize>();
        inline_len > MAX_INLINE_COMMAND_LEN
    }
}

impl Launcher for ForkedLauncher {
    fn launch(&self, invocation: &Invocation) -> LauncherResult<ExitReport> {
        let args_file = if self.needs_args_file(invocation) {
            Some(write_args_file(&invocation.args)?)
        } else {
            None
        };
        let args = self.command_args(invocation, args_file.as_ref().map(NamedTempFile::path));

        let executable = self.toolchain.java_executable();
        debug!(executable = %executable.display(), ?args, "forking engine");
        info!(entry_point = %invocation.entry_point, "launching forked JVM");

        let mut cmd = Command::new(&executable);
        cmd.args(&args);
        if !self.propagate_environment {
            cmd.env_clear();
            if let Some(path) = std::env::var_os("PATH") {
                cmd.env("PATH", path);
            }
        }
        cmd.envs(&self.env);
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|err| {
            LauncherError::launch(format!("{}: {err}", executable.display()))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LauncherError::launch("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LauncherError::launch("failed to capture stderr"))?;

        let (output_tx, output_rx) = mpsc::channel();
        let readers = [
            spawn_output_reader(stdout, OutputStream::Stdout, output_tx.clone()),
            spawn_output_reader(stderr, OutputStream::Stderr, output_tx),
        ];

        let stderr_tail = forward_output(output_rx);
        for reader in readers {
            let _ = reader.join();
        }

        let status = child.wait()?;
        drop(args_file);

        let mut report = ExitReport::new(exit_code(status));
        if report.status != 0 && !stderr_tail.is_empty() {
            report = report.with_cause(Vec::from(stderr_tail).join("\n"));
        }
        debug!(status = report.status, "forked JVM exited");
        Ok(report)
    }
}

fn write_args_file(args: &[String]) -> LauncherResult<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("gatling-args-")
        .suffix(".txt")
        .tempfile()
        .map_err(|err| LauncherError::launch(format!("create args file: {err}")))?;
    for arg in args {
        writeln!(file, "{arg}")
            .map_err(|err| LauncherError::launch(format!("write args file: {err}")))?;
    }
    file.flush()
        .map_err(|err| LauncherError::launch(format!("write args file: {err}")))?;
    debug!(path = %file.path().display(), count = args.len(), "engine arguments passed through file");
    Ok(file)
}

fn spawn_output_reader<R: io::Read + Send + 'static>(
    mut reader: R,
    stream: OutputStream,
    tx: mpsc::Sender<OutputChunk>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            let read = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            };
            let chunk = OutputChunk {
                stream,
                bytes: buf[..read].to_vec(),
            };
            if tx.send(chunk).is_err() {
                break;
            }
        }
    })
}

/// Last complete stderr lines of the child, bounded to [`CAUSE_LINES`].
#[derive(Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    partial: Vec<u8>,
}

impl StderrTail {
    fn extend(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.partial);
                self.push_line(&line);
            } else {
                self.partial.push(byte);
            }
        }
    }

    fn push_line(&mut self, raw: &[u8]) {
        if self.lines.len() == CAUSE_LINES {
            self.lines.pop_front();
        }
        let line = String::from_utf8_lossy(raw);
        self.lines.push_back(line.trim_end_matches('\r').to_string());
    }

    fn finish(mut self) -> VecDeque<String> {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.push_line(&line);
        }
        self.lines
    }
}

/// Copy child output to this process's streams until both readers hang up.
///
/// Output is written and flushed chunk by chunk, so partial lines such as
/// progress indicators show up without waiting for a newline. Returns the
/// stderr tail.
fn forward_output(output_rx: mpsc::Receiver<OutputChunk>) -> VecDeque<String> {
    let mut tail = StderrTail::default();
    while let Ok(chunk) = output_rx.recv() {
        match chunk.stream {
            OutputStream::Stdout => {
                let mut out = io::stdout().lock();
                let _ = out.write_all(&chunk.bytes).and_then(|()| out.flush());
            }
            OutputStream::Stderr => {
                let mut err = io::stderr().lock();
                let _ = err.write_all(&chunk.bytes).and_then(|()| err.flush());
                tail.extend(&chunk.bytes);
            }
        }
    }
    tail.finish()
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Engine main function callable within the current process.
pub type EntryPoint = Arc<dyn Fn(&[String]) -> i32 + Send + Sync>;

/// Registry of entry points available to the in-process launcher, keyed by class name.
#[derive(Clone, Default)]
pub struct EntryPoints {
    table: BTreeMap<String, EntryPoint>,
}

impl EntryPoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: impl Into<String>, entry: F) -> Self
    where
        F: Fn(&[String]) -> i32 + Send + Sync + 'static,
    {
        self.table.insert(name.into(), Arc::new(entry));
        self
    }

    pub fn get(&self, name: &str) -> Option<&EntryPoint> {
        self.table.get(name)
    }
}

impl fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.table.keys()).finish()
    }
}

/// Calls the engine entry point directly on the current thread.
#[derive(Debug, Clone, Default)]
pub struct InProcessLauncher {
    entry_points: EntryPoints,
}

impl InProcessLauncher {
    pub fn new(entry_points: EntryPoints) -> Self {
        Self { entry_points }
    }
}

impl Launcher for InProcessLauncher {
    fn launch(&self, invocation: &Invocation) -> LauncherResult<ExitReport> {
        let entry = self.entry_points.get(&invocation.entry_point).ok_or_else(|| {
            LauncherError::launch(format!(
                "entry point {} is not available in process",
                invocation.entry_point
            ))
        })?;

        debug!(classpath = %invocation.classpath, args = ?invocation.args, "invoking engine in process");
        info!(entry_point = %invocation.entry_point, "launching engine in process");

        let status = panic::catch_unwind(AssertUnwindSafe(|| entry(&invocation.args)))
            .map_err(|_| {
                LauncherError::launch(format!("entry point {} panicked", invocation.entry_point))
            })?;
        Ok(ExitReport::new(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn invocation(args: &[&str]) -> Invocation {
        let classpath: Classpath = vec!["/a.jar".to_string(), "/conf".to_string()]
            .into_iter()
            .collect();
        Invocation::new(
            classpath,
            GATLING_MAIN_CLASS,
            args.iter().map(|arg| arg.to_string()).collect(),
        )
    }

    #[test]
    fn default_jvm_args_precede_classpath_and_entry_point() {
        let launcher = ForkedLauncher::new(JavaToolchain::default_runtime());
        let args = launcher.command_args(&invocation(&["-s", "a.B"]), None);

        assert_eq!(&args[..DEFAULT_JVM_ARGS.len()], DEFAULT_JVM_ARGS);
        let rest = &args[DEFAULT_JVM_ARGS.len()..];
        assert_eq!(rest[0], "-cp");
        assert_eq!(rest[1], invocation(&[]).classpath.to_string());
        assert_eq!(&rest[2..], &[GATLING_MAIN_CLASS, "-s", "a.B"]);
    }

    #[test]
    fn configured_jvm_args_replace_defaults_and_forward_properties() {
        let config = LaunchConfiguration::default()
            .with_jvm_arg("-Xmx2G")
            .with_system_property("gatling.users", "10");
        let launcher = ForkedLauncher::from_config(&config, JavaToolchain::default_runtime());
        let args = launcher.command_args(&invocation(&[]), None);
        assert_eq!(&args[..2], &["-Xmx2G", "-Dgatling.users=10"]);
    }

    #[test]
    fn properties_are_not_forwarded_without_propagation() {
        let config = LaunchConfiguration::default()
            .with_jvm_arg("-Xmx2G")
            .with_system_property("gatling.users", "10")
            .with_propagate_system_properties(false);
        let launcher = ForkedLauncher::from_config(&config, JavaToolchain::default_runtime());
        let args = launcher.command_args(&invocation(&[]), None);
        assert_eq!(args[1], "-cp");
    }

    #[test]
    fn args_file_switches_entry_point() {
        let launcher = ForkedLauncher::new(JavaToolchain::default_runtime()).with_jvm_args(vec![]);
        let args = launcher.command_args(&invocation(&["-s", "a.B"]), Some(Path::new("/tmp/args.txt")));
        assert_eq!(
            &args[2..],
            &[ARGS_FILE_MAIN_CLASS, GATLING_MAIN_CLASS, "/tmp/args.txt"]
        );
    }

    #[test]
    fn long_command_lines_use_args_file() {
        let launcher = ForkedLauncher::new(JavaToolchain::default_runtime());
        let long = "x".repeat(MAX_INLINE_COMMAND_LEN);
        assert!(launcher.needs_args_file(&invocation(&[long.as_str()])));
        assert!(!launcher.needs_args_file(&invocation(&["-s", "a.B"])));
        assert!(launcher
            .with_force_args_file(true)
            .needs_args_file(&invocation(&["-s", "a.B"])));
    }

    #[test]
    fn toolchain_prefers_explicit_executable_then_home() {
        let home = JavaToolchain::default_runtime().with_home("/opt/jdk");
        assert_eq!(
            home.java_executable(),
            Path::new("/opt/jdk").join("bin").join(java_binary_name())
        );
        let explicit = home.with_executable("/usr/local/bin/java17");
        assert_eq!(explicit.java_executable(), PathBuf::from("/usr/local/bin/java17"));
    }

    #[test]
    fn toolchain_falls_back_to_java_home_then_path() {
        let saved = std::env::var_os("JAVA_HOME");

        std::env::set_var("JAVA_HOME", "/usr/lib/jvm/java-8");
        let from_env = JavaToolchain::default_runtime().java_executable();
        let home_wins = JavaToolchain::default_runtime()
            .with_home("/opt/jdk")
            .java_executable();

        std::env::remove_var("JAVA_HOME");
        let from_path = JavaToolchain::default_runtime().java_executable();

        if let Some(value) = saved {
            std::env::set_var("JAVA_HOME", value);
        }

        assert_eq!(
            from_env,
            Path::new("/usr/lib/jvm/java-8").join("bin").join(java_binary_name())
        );
        assert_eq!(home_wins, Path::new("/opt/jdk").join("bin").join(java_binary_name()));
        assert_eq!(from_path, PathBuf::from(java_binary_name()));
    }

    #[test]
    fn missing_runtime_is_a_launch_error() {
        let launcher = ForkedLauncher::new(
            JavaToolchain::default_runtime().with_executable("/nonexistent/bin/java"),
        );
        let err = launcher.launch(&invocation(&[])).unwrap_err();
        assert!(matches!(err, LauncherError::Launch(_)));
    }

    #[test]
    fn in_process_passes_args_and_returns_status() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let launcher = InProcessLauncher::new(EntryPoints::new().register(
            GATLING_MAIN_CLASS,
            move |args: &[String]| {
                captured.lock().unwrap().extend(args.iter().cloned());
                2
            },
        ));

        let report = launcher.launch(&invocation(&["-s", "a.B"])).unwrap();
        assert_eq!(report, ExitReport::new(2));
        assert_eq!(*seen.lock().unwrap(), vec!["-s", "a.B"]);
    }

    #[test]
    fn in_process_unknown_entry_point_is_a_launch_error() {
        let err = InProcessLauncher::default()
            .launch(&invocation(&[]))
            .unwrap_err();
        assert!(matches!(err, LauncherError::Launch(_)));
    }

    #[test]
    fn in_process_panic_is_a_launch_error() {
        let launcher = InProcessLauncher::new(
            EntryPoints::new().register(GATLING_MAIN_CLASS, |_: &[String]| panic!("boom")),
        );
        let err = launcher.launch(&invocation(&[])).unwrap_err();
        assert!(matches!(err, LauncherError::Launch(_)));
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let (tx, rx) = mpsc::channel();
        for idx in 0..(CAUSE_LINES + 5) {
            tx.send(OutputChunk {
                stream: OutputStream::Stderr,
                bytes: format!("line {idx}\n").into_bytes(),
            })
            .unwrap();
        }
        drop(tx);
        let tail = forward_output(rx);
        assert_eq!(tail.len(), CAUSE_LINES);
        assert_eq!(tail.front().map(String::as_str), Some("line 5"));
    }

    #[test]
    fn stderr_tail_joins_split_chunks_and_keeps_unterminated_line() {
        let (tx, rx) = mpsc::channel();
        for bytes in [&b"Exception in "[..], b"thread main\r\n\tat Sim", b".run"] {
            tx.send(OutputChunk {
                stream: OutputStream::Stderr,
                bytes: bytes.to_vec(),
            })
            .unwrap();
        }
        tx.send(OutputChunk {
            stream: OutputStream::Stdout,
            bytes: b"progress 50%".to_vec(),
        })
        .unwrap();
        drop(tx);

        let tail = forward_output(rx);
        assert_eq!(tail, ["Exception in thread main", "\tat Sim.run"]);
    }

    #[cfg(unix)]
    #[test]
    fn partial_output_is_forwarded_before_the_child_exits() {
        use std::time::Duration;

        let mut child = Command::new("sh")
            .args(["-c", "printf 'progress'; exec sleep 5"])
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let (tx, rx) = mpsc::channel();
        let reader = spawn_output_reader(stdout, OutputStream::Stdout, tx);

        let chunk = rx.recv_timeout(Duration::from_secs(3));
        child.kill().unwrap();
        child.wait().unwrap();
        reader.join().unwrap();

        let chunk = chunk.expect("unterminated output should arrive while the child runs");
        assert_eq!(chunk.bytes, b"progress");
    }
}
