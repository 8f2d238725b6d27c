//! Stand-in for the `java` executable used by the forked-launch tests.
//!
//! Parses `[options] -cp <classpath> <main> <args...>` (or the args-file helper
//! form), optionally records the parsed invocation as JSON to the file named by
//! `FAKE_JAVA_RECORD`, and exits with a status derived from the simulation name:
//! names containing `Assertion` exit 2, names containing `Crash` exit 1,
//! anything else exits 0. `FAKE_JAVA_EXIT` overrides the status.

use std::fs;
use std::process::ExitCode;

use serde::Serialize;

const ARGS_FILE_MAIN_CLASS: &str = "scala_maven_executions.MainWithArgsInFile";

#[derive(Debug, Default, Serialize)]
struct RecordedInvocation {
    jvm_options: Vec<String>,
    classpath: String,
    main_class: String,
    args_file: Option<String>,
    args: Vec<String>,
    env_home: Option<String>,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let mut invocation = RecordedInvocation {
        env_home: std::env::var("HOME").ok(),
        ..RecordedInvocation::default()
    };

    while let Some(arg) = argv.next() {
        if arg == "-cp" {
            invocation.classpath = argv.next().ok_or("missing classpath value")?;
            break;
        }
        invocation.jvm_options.push(arg);
    }

    invocation.main_class = argv.next().ok_or("missing main class")?;
    if invocation.main_class == ARGS_FILE_MAIN_CLASS {
        invocation.main_class = argv.next().ok_or("missing wrapped main class")?;
        let file = argv.next().ok_or("missing args file")?;
        invocation.args = fs::read_to_string(&file)?
            .lines()
            .map(str::to_string)
            .collect();
        invocation.args_file = Some(file);
    } else {
        invocation.args = argv.collect();
    }

    if let Ok(path) = std::env::var("FAKE_JAVA_RECORD") {
        fs::write(path, serde_json::to_vec_pretty(&invocation)?)?;
    }

    let simulation = invocation
        .args
        .iter()
        .position(|arg| arg == "-s")
        .and_then(|idx| invocation.args.get(idx + 1))
        .cloned()
        .unwrap_or_default();
    println!("Simulation {simulation} started...");

    let status = match std::env::var("FAKE_JAVA_EXIT") {
        Ok(code) => code.parse::<u8>()?,
        Err(_) if simulation.contains("Assertion") => {
            println!("Global: count of failed requests is 0.0 : false");
            2
        }
        Err(_) if simulation.contains("Crash") => {
            eprintln!("Exception in thread \"main\" java.lang.IllegalStateException: {simulation} crashed");
            1
        }
        Err(_) => 0,
    };
    println!("Simulation {simulation} completed.");
    Ok(ExitCode::from(status))
}
