use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::Parser;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use rszisk::zisk::interpreted::interpreter::{Interpreter, InterpreterConfig};
use rszisk::zisk::interpreted::prompt::run_prompt;
use rszisk::zisk::interpreted::runfile::{load, RunOptions};

// Deep Zisk recursion needs far more native stack than the main thread gets.
const STACK_SIZE: usize = 512 * 1024 * 1024;

/// Intérprete del lenguaje Zisk
#[derive(Parser, Debug)]
#[command(name = "rszisk", version, long_about = None)]
struct Args {
    /// Archivo a ejecutar; sin él se abre el intérprete interactivo
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// No aplicar el optimizador antes de ejecutar
    #[arg(long)]
    no_optimize: bool,

    /// No escribir el archivo .py transpilado junto al fuente
    #[arg(long)]
    no_emit: bool,

    /// Profundidad máxima de llamadas anidadas
    #[arg(long, default_value_t = InterpreterConfig::default().max_call_depth)]
    max_call_depth: usize,

    /// Más detalle en los registros (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_ansi(false)
        .compact()
        .with_filter(filter);
    Registry::default().with(layer).init();
}

fn run(args: Args) -> ExitCode {
    let mut config = InterpreterConfig {
        max_call_depth: args.max_call_depth,
        max_stack_bytes: STACK_SIZE / 2,
        ..InterpreterConfig::default()
    };
    let optimize = !args.no_optimize;
    match args.file {
        Some(file) => {
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                config.module_root = parent.to_owned();
            }
            let options = RunOptions { optimize, emit: !args.no_emit };
            match load(&mut Interpreter::with_config(config), &file, options) {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("{}", e);
                    ExitCode::FAILURE
                }
            }
        }
        None => match run_prompt(Interpreter::with_config(config), optimize) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "interactive session failed");
                ExitCode::FAILURE
            }
        },
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    let engine = thread::Builder::new().stack_size(STACK_SIZE).spawn(move || run(args));
    match engine.map(|handle| handle.join()) {
        Ok(Ok(code)) => code,
        Ok(Err(_)) => {
            error!("interpreter thread panicked");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "could not start the interpreter thread");
            ExitCode::FAILURE
        }
    }
}
