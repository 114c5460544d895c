use std::env;
use std::io::{self, Write as _};
use std::process::ExitCode;

use quark::Context;

const VERSION_MAJOR: u32 = 0;
const VERSION_MINOR: u32 = 1;
const VERSION_PATCH: u32 = 0;
const REPOSITORY: &str = "https://github.com/quark-lang/quark";

const USAGE: &str = "Usage: quark [file] [options]\n\
\n\
Options:\n\
  -c \"<source>\"   run the given source string and exit\n\
  -help            print this usage message and exit\n\
  -version         print the version and exit\n\
\n\
With no file and no -c, quark starts an interactive REPL.\n\
A file argument must have the .qk extension.\n";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "-help") {
        print!("{USAGE}");
        return ExitCode::SUCCESS;
    }
    if args.iter().any(|a| a == "-version") {
        println!("Quark v{VERSION_MAJOR}.{VERSION_MINOR}.{VERSION_PATCH}");
        println!("repository: {REPOSITORY}");
        return ExitCode::SUCCESS;
    }
    if let Some(pos) = args.iter().position(|a| a == "-c") {
        let Some(source) = args.get(pos + 1) else {
            eprintln!("-c requires a source string argument");
            return ExitCode::from(255);
        };
        return run_source(source);
    }
    if let Some(path) = args.first() {
        return run_file(path);
    }

    run_repl()
}

fn run_file(path: &str) -> ExitCode {
    let ext = file_extension(path);
    if ext != ".qk" {
        eprintln!("invalid ext name: {ext}, except: .qk");
        return ExitCode::from(255);
    }

    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{path}: {err}");
            return ExitCode::from(255);
        }
    };

    let mut ctx = Context::new();
    match ctx.run_source(path, &source) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(255)
        }
    }
}

/// Extension including the leading dot (e.g. `.qk`), or `""` if the file
/// name has none - matches the Go standard library's `filepath.Ext`, the
/// behavior `examples/original_source/cli/main.go` relies on.
fn file_extension(path: &str) -> &str {
    let filename = path.rsplit('/').next().unwrap_or(path);
    match filename.rfind('.') {
        Some(idx) => &filename[idx..],
        None => "",
    }
}

fn run_source(source: &str) -> ExitCode {
    let mut ctx = Context::new();
    match ctx.run_source("<command-line>", source) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(255)
        }
    }
}

/// Reads one line at a time from stdin against a persistent `Context`, so
/// globals and the module cache from earlier lines stay visible to later
/// ones — the same `Context` backs the whole session.
fn run_repl() -> ExitCode {
    let mut ctx = Context::new();
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!(">> ");
        if io::stdout().flush().is_err() {
            return ExitCode::SUCCESS;
        }

        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => return ExitCode::SUCCESS,
            Ok(_) => {}
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case(".exit") {
            return ExitCode::SUCCESS;
        }

        match ctx.run_source("<repl>", trimmed) {
            Ok(value) if !matches!(value, quark::Value::Null) => {
                println!("{}", value.display_string());
            }
            Ok(_) => {}
            Err(err) => eprintln!("{err}"),
        }
    }
}
