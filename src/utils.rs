use thiserror::Error;

/// Everything that can go wrong while building a grammar, parsing, or
/// reading results. None of these are retried internally.
#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown parser type `{0}` (expected topDown, bottomUp or bottomUpApprox)")]
  UnknownParserType(String),

  #[error("unregistered entity `{0}`")]
  UnregisteredEntity(String),

  #[error("unregistered approx terminal `{0}`")]
  UnregisteredApprox(String),

  #[error("unknown semantic action `{0}`")]
  UnknownAction(String),

  #[error("approx terminal misuse: {0}")]
  ApproxTerminalMisuse(String),

  #[error("input not set (parse() was not called)")]
  InputNotSet,

  #[error("malformed rule: {0}")]
  MalformedRule(String),

  #[error("cannot merge history of `{from}` into different edge `{into}`")]
  HistoryMismatch { from: String, into: String },

  #[error("invalid pattern: {0}")]
  InvalidPattern(#[from] regex::Error),

  #[error("invalid terminal pattern: {0}")]
  InvalidTerminal(#[from] regex_automata::meta::BuildError),

  #[error("grammar syntax: {0}")]
  GrammarSyntax(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: regex::Regex = regex::Regex::new($pattern).unwrap();
    }
  };
}

/// Byte length of the whitespace run starting at `idx`, 0 if there is none
pub fn whitespace_run(input: &str, idx: usize) -> usize {
  regex_static!(WHITESPACE, r"^\s+");
  input
    .get(idx..)
    .and_then(|rest| WHITESPACE.find(rest))
    .map_or(0, |m| m.end())
}

/// "" or "s", for log and cli messages
pub fn plural(n: usize) -> &'static str {
  if n == 1 { "" } else { "s" }
}

#[test]
fn test_whitespace_run() {
  assert_eq!(whitespace_run("term   XYZ", 4), 3);
  assert_eq!(whitespace_run("term\n\tXYZ", 4), 2);
  assert_eq!(whitespace_run("termXYZ", 4), 0);
  assert_eq!(whitespace_run("term", 4), 0);
  assert_eq!(whitespace_run("term", 10), 0);
}
