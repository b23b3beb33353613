use arenascheme::Error;
use arenascheme::evaluator::Interpreter;
use arenascheme::scheme::parse_program;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Once;
use std::thread;

const DEFAULT_STACK_MB: usize = 256;

static TRACING_INIT: Once = Once::new();

/// Install a stderr subscriber when `RUST_LOG` is set, e.g. `RUST_LOG=arenascheme=trace`
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr).with_target(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

#[derive(Debug, Default)]
struct DriverConfig {
    files: Vec<PathBuf>,
    parse_only: bool,
    stack_bytes: usize,
}

impl DriverConfig {
    fn from_env() -> Result<Self, String> {
        let mut config = DriverConfig::default();
        for arg in env::args().skip(1) {
            match arg.as_str() {
                "--parse" => config.parse_only = true,
                "-h" | "--help" => {
                    print_usage();
                    process::exit(0);
                }
                flag if flag.starts_with("--") => return Err(format!("unknown option: {flag}")),
                path => config.files.push(PathBuf::from(path)),
            }
        }

        let stack_mb = match env::var("ARENASCHEME_STACK_MB") {
            Ok(text) => text
                .trim()
                .parse::<usize>()
                .map_err(|e| format!("invalid ARENASCHEME_STACK_MB: {e}"))?,
            Err(env::VarError::NotPresent) => DEFAULT_STACK_MB,
            Err(e) => return Err(format!("invalid ARENASCHEME_STACK_MB: {e}")),
        };
        config.stack_bytes = stack_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| format!("invalid ARENASCHEME_STACK_MB: {stack_mb}"))?;
        Ok(config)
    }
}

fn print_usage() {
    println!("Usage: arenascheme [--parse] [FILE]...");
    println!();
    println!("Evaluates each FILE in order, or standard input when none is given.");
    println!("Standard input from a terminal starts an interactive session.");
    println!();
    println!("  --parse    print the parsed forms instead of evaluating them");
    println!();
    println!("Environment:");
    println!("  ARENASCHEME_STACK_MB   evaluator stack size in MiB (default {DEFAULT_STACK_MB})");
    println!("  RUST_LOG               tracing filter for diagnostics on stderr");
}

fn main() {
    init_tracing();

    let config = match DriverConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    // Evaluation recurses on the host stack, so give it a thread of its own
    let result = thread::Builder::new()
        .name("arenascheme-eval".to_string())
        .stack_size(config.stack_bytes)
        .spawn(move || run(&config))
        .map_err(|e| format!("failed to start evaluator thread: {e}"))
        .and_then(|handle| {
            handle
                .join()
                .map_err(|_| "evaluator thread panicked".to_string())
        });

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(config: &DriverConfig) {
    let mut interp = Interpreter::new();

    if config.parse_only {
        let sources = match read_sources(config) {
            Ok(sources) => sources,
            Err(e) => fail(&mut interp, &e),
        };
        for source in &sources {
            if let Err(e) = print_parsed(&mut interp, source) {
                fail(&mut interp, &e);
            }
        }
        return;
    }

    if !config.files.is_empty() {
        let global = interp.global_frame();
        for path in &config.files {
            if let Err(e) = interp.load(path, global) {
                fail(&mut interp, &e);
            }
        }
        return;
    }

    if io::stdin().is_terminal() {
        run_repl(&mut interp);
    } else {
        let mut source = String::new();
        if let Err(e) = io::stdin().read_to_string(&mut source) {
            fail(&mut interp, &Error::Io(e.to_string()));
        }
        let global = interp.global_frame();
        if let Err(e) = interp.interpret(&source, global) {
            fail(&mut interp, &e);
        }
    }
}

/// Report `error` and end the run through the arena abort path
fn fail(interp: &mut Interpreter, error: &Error) -> ! {
    println!("{error}");
    interp.abort(1)
}

fn read_sources(config: &DriverConfig) -> Result<Vec<String>, Error> {
    if config.files.is_empty() {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .map_err(|e| Error::Io(e.to_string()))?;
        return Ok(vec![source]);
    }
    config
        .files
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .map_err(|_| Error::Load("The given file could not be opened".into()))
        })
        .collect()
}

fn print_parsed(interp: &mut Interpreter, source: &str) -> Result<(), Error> {
    for form in interp.read(source)? {
        println!("{}", interp.display(form));
    }
    Ok(())
}

/// Count parentheses left open in `source`, skipping strings and comments
fn open_parens(source: &str) -> usize {
    let mut depth = 0usize;
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    depth
}

/// `> ` followed by three spaces per parenthesis still open in `pending`
fn continuation_prompt(pending: &str) -> String {
    format!("> {}", "   ".repeat(open_parens(pending)))
}

fn run_repl(interp: &mut Interpreter) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => fail(interp, &Error::Io(e.to_string())),
    };
    let global = interp.global_frame();
    let mut pending = String::new();

    loop {
        let prompt = continuation_prompt(&pending);

        match rl.readline(&prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    match line.trim() {
                        "" => continue,
                        ":quit" => break,
                        _ => {}
                    }
                }
                pending.push_str(&line);
                pending.push('\n');

                // Keep reading until the accumulated input forms complete data
                if let Err(Error::Parse(e)) = parse_program(&pending) {
                    if e.is_incomplete() {
                        continue;
                    }
                }

                let _ = rl.add_history_entry(pending.trim_end());
                if let Err(e) = interp.interpret(&pending, global) {
                    println!("{e}");
                }
                pending.clear();
            }
            Err(ReadlineError::Interrupted) => {
                pending.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("error: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_parens() {
        let test_cases = vec![
            ("", 0),
            ("(define x", 1),
            ("(let ((x 1)", 2),
            ("(f \"(\" ", 1),
            ("(f ; (((\n", 1),
            ("(a (b) c)", 0),
            ("))", 0),
            ("(f \"a\\\"(\"", 1),
        ];

        for (input, expected) in test_cases {
            assert_eq!(open_parens(input), expected, "open parens in {input:?}");
        }
    }

    #[test]
    fn test_continuation_prompt() {
        let test_cases = vec![
            ("", "> "),
            ("(define x\n", ">    "),
            ("(let ((x 1)\n", ">       "),
            ("(a (b) c)\n", "> "),
        ];

        for (pending, expected) in test_cases {
            assert_eq!(continuation_prompt(pending), expected, "prompt for {pending:?}");
        }
    }
}
