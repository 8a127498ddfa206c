use std::io::Read;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use masp::{Engine, EngineConfig, Error, ParseError, Value, DEFAULT_MAX_DEPTH};
use tracing_subscriber::EnvFilter;
use unicode_width::UnicodeWidthStr;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::parse();

    let input = match read_input(&opt) {
        Ok(input) => input,
        Err(err) => {
            eprintln!("error: failed to read input: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut engine = Engine::with_config(EngineConfig {
        max_depth: opt.max_depth,
    });

    let program = match engine.parse(&input) {
        Ok(program) => program,
        Err(err) => {
            report(&input, &err);
            return ExitCode::FAILURE;
        }
    };
    if opt.parse_only {
        println!("{}", program);
        return ExitCode::SUCCESS;
    }

    let result = engine.eval(&program);
    // Release the parsed tree so `--gc` can reclaim it.
    drop(program);
    let code = match result {
        Ok(Value::Nil) => ExitCode::SUCCESS,
        Ok(value) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        Err(err) => {
            report(&input, &err);
            ExitCode::FAILURE
        }
    };

    if opt.gc {
        let reclaimed = engine.gc();
        eprintln!("gc: reclaimed {} slots", reclaimed);
    }
    if opt.stats {
        eprintln!(
            "memory: {} bytes reserved, {} bytes live",
            engine.reserved_size_bytes(),
            engine.live_size_bytes()
        );
    }
    code
}

fn read_input(opt: &Opt) -> std::io::Result<String> {
    if let Some(e) = &opt.eval {
        Ok(e.clone())
    } else if let Some(f) = &opt.file {
        std::fs::read_to_string(f)
    } else {
        let mut s = String::new();
        std::io::stdin().lock().read_to_string(&mut s)?;
        Ok(s)
    }
}

fn report(src: &str, err: &Error) {
    eprintln!("error: {}", err);
    if let Error::Parse(err) = err {
        print_caret(src, err);
    }
}

/// Print the offending line with a caret under the error position.
fn print_caret(src: &str, err: &ParseError) {
    let offset = err.offset.min(src.len());
    let line_start = src[..offset].rfind('\n').map_or(0, |i| i + 1);
    let line_end = src[offset..].find('\n').map_or(src.len(), |i| offset + i);
    let line = src[line_start..line_end].trim_end_matches('\r');
    let width = src[line_start..offset].width();

    let gutter = err.line.to_string();
    eprintln!("{} | {}", gutter, line);
    eprintln!("{} | {}^", " ".repeat(gutter.len()), " ".repeat(width));
}

#[derive(clap::Parser)]
#[clap(about, version, author)]
struct Opt {
    /// Only parse the input. Outputs the read program.
    #[clap(long)]
    parse_only: bool,

    /// Evaluate the given string as a masp program.
    #[clap(short, long)]
    eval: Option<String>,

    /// Evaluate the given file as a masp program.
    #[clap(short, long)]
    file: Option<String>,

    /// Collect garbage after evaluating.
    #[clap(long)]
    gc: bool,

    /// Print memory usage of the pools when done.
    #[clap(long)]
    stats: bool,

    /// Deepest nesting of evaluated forms. 0 disables the limit.
    #[clap(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}
