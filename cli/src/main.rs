use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use chartwise::{EntityOptions, Grammar, Parser, ParserKind, Registry};
use clap::Parser as _;
use tracing_subscriber::EnvFilter;

type Err = Box<dyn Error + 'static>;

/// Reads a grammar file, then parses each line of stdin against it
#[derive(Debug, clap::Parser)]
#[command(name = "chartwise", version)]
struct Args {
  /// Grammar file
  grammar: PathBuf,

  /// Parsing strategy: topDown, bottomUp or bottomUpApprox
  #[arg(short, long, default_value = "topDown")]
  parser: String,

  /// Also report entities that don't span the whole line
  #[arg(long)]
  partial: bool,

  /// Print results as JSON
  #[arg(short, long)]
  json: bool,

  /// Print the parse chart
  #[arg(short, long)]
  chart: bool,

  /// Entity list as NAME=FILE, one entity per line
  #[arg(short, long = "entity", value_name = "NAME=FILE")]
  entities: Vec<String>,

  /// Match entities case-insensitively
  #[arg(short = 'i', long)]
  ignore_case: bool,
}

fn registry(args: &Args) -> Result<Registry, Err> {
  let mut registry = Registry::new();
  for entity in args.entities.iter() {
    let (name, path) = entity
      .split_once('=')
      .ok_or_else(|| format!("entity `{}` is not NAME=FILE", entity))?;
    let list = fs::read_to_string(path)?;
    registry.register_entity(
      name,
      list.lines().map(str::trim).filter(|l| !l.is_empty()),
      EntityOptions {
        case_insensitive: args.ignore_case,
        ..Default::default()
      },
    )?;
  }
  Ok(registry)
}

fn parse(parser: &mut Parser<'_>, input: &str, args: &Args) -> Result<(), Err> {
  parser.parse(input)?;

  if args.chart {
    println!("chart:\n{}", parser.chart());
  }

  let results = parser.results(!args.partial)?;
  if args.json {
    println!("{}", serde_json::to_string_pretty(&results)?);
    return Ok(());
  }

  println!(
    "Parsed {} result{}",
    results.len(),
    if results.len() == 1 { "" } else { "s" }
  );
  for r in results {
    println!("{}", r.txt);
    println!("  => {} (weight {}, {}..{})", r.data, r.weight, r.start, r.end);
  }
  println!("{}", parser.timings());
  Ok(())
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let args = Args::parse();
  let kind: ParserKind = args.parser.parse()?;
  let registry = registry(&args)?;
  let grammar = Grammar::load(&fs::read_to_string(&args.grammar)?, &registry)?;
  let mut parser = Parser::new(&grammar, kind);

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    input.clear();
    if io::stdin().read_line(&mut input)? == 0 {
      // ctrl+d
      return Ok(());
    }
    let line = input.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
      continue;
    }
    if let Err(e) = parse(&mut parser, line, &args) {
      eprintln!("error: {}", e);
    }
  }
}
