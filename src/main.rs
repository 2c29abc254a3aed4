use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::info;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use snafu::ResultExt;

use pasvm::error::IoSnafu;
use pasvm::tokenizer::{self, token_text};
use pasvm::vm::render;
use pasvm::{CodegenOptions, CompileResult, IndexedRead, LexDiagnostic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Stage {
  /// Print the token stream
  Lex,
  /// Print the syntax tree
  Parse,
  /// Stop after semantic analysis
  Check,
  /// Write the instruction listing
  Vm,
}

#[derive(Parser)]
#[command(version, about)]
struct Cli {
  /// Source program to compile
  input: PathBuf,

  /// Place the listing into <FILE> instead of INPUT.vm
  #[arg(short, long, value_name = "FILE")]
  output: Option<PathBuf>,

  /// Last stage to run
  #[arg(short, long, value_enum, default_value_t = Stage::Vm)]
  stage: Stage,

  /// Lower `readln(a[i])` the historical way
  #[arg(long)]
  legacy_indexed_read: bool,

  /// Increase log verbosity (-vvv for trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let level = match cli.verbose {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Info,
    2 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  };
  let config = ConfigBuilder::new().set_time_level(LevelFilter::Off).build();
  if TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto).is_err() {
    eprintln!("Warning: logger already initialized");
  }

  match run(&cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("Error: {err}");
      ExitCode::FAILURE
    }
  }
}

fn run(cli: &Cli) -> CompileResult<()> {
  let source = fs::read_to_string(&cli.input).context(IoSnafu { path: &cli.input })?;

  match cli.stage {
    Stage::Lex => {
      let lexed = tokenizer::tokenize(&source);
      lexed.diagnostics.iter().for_each(report);
      for token in &lexed.tokens {
        println!(
          "{:>4}  {:<10} {}",
          token.line,
          format!("{:?}", token.kind),
          token_text(token, &source)
        );
      }
    }
    Stage::Parse => {
      let program = pasvm::parse_reporting(&source, report)?;
      println!("{program:#?}");
    }
    Stage::Check => {
      pasvm::check_reporting(&source, report)?;
      println!("{}: ok", cli.input.display());
    }
    Stage::Vm => {
      let options = CodegenOptions {
        indexed_read: if cli.legacy_indexed_read {
          IndexedRead::AsRead
        } else {
          IndexedRead::Corrected
        },
      };
      let instructions = pasvm::compile_reporting(&source, &options, report)?;

      let output = output_path(&cli.input, cli.output.as_deref());
      fs::write(&output, render(&instructions)).context(IoSnafu { path: &output })?;
      info!(
        "wrote {} instructions to {}",
        instructions.len(),
        output.display()
      );
      println!("Wrote output to {}", output.display());
    }
  }
  Ok(())
}

fn report(diagnostic: &LexDiagnostic) {
  eprintln!("{diagnostic}");
}

fn output_path(input: &Path, output: Option<&Path>) -> PathBuf {
  match output {
    Some(path) => path.to_path_buf(),
    None => input.with_extension("vm"),
  }
}
