#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod utils;

pub mod chart;
pub mod earley;
pub mod forest;
pub mod grammar;
pub mod node;
pub mod parse_grammar;
pub mod registry;
pub mod rules;
pub mod symbol;

pub use crate::chart::{Chart, Edge, EdgeId, Pos};
pub use crate::earley::{Lexer, Parser, ParserKind, ParserOptions, Timings, default_lexer};
pub use crate::forest::Forest;
pub use crate::grammar::Grammar;
pub use crate::node::{NodeResult, NodeResultArgs, Value};
pub use crate::registry::{EntityOptions, Registry};
pub use crate::rules::{Reduction, Rule, Semantic, SemanticContext};
pub use crate::symbol::{ApproxTerminal, Boundary, RegexTerminal, Symbol};
pub use crate::utils::{Error, Result};

/// Builds a parser of `kind` over `grammar`, parses `input` and returns the
/// full-span results
pub fn parse(grammar: &Grammar, kind: ParserKind, input: &str) -> Result<Vec<NodeResult>> {
  let mut parser = Parser::new(grammar, kind);
  parser.parse(input)?;
  parser.results(true)
}

#[test]
fn test_parse_text_grammar() {
  let g: Grammar = r#"
    S -> GREETING WORLD "!" {% concat %} entity: true
    GREETING -> "hello" || "hi"
    WORLD -> /wor+ld/
  "#
  .parse()
  .unwrap();

  for kind in [ParserKind::TopDown, ParserKind::BottomUp, ParserKind::BottomUpApprox] {
    let results = parse(&g, kind, "hi worrrld !").unwrap();
    assert_eq!(results.len(), 1, "{}", kind);
    assert_eq!(results[0].data, Value::from("hiworrrld!"));
  }
  assert!(parse(&g, ParserKind::TopDown, "hi there").unwrap().is_empty());
}
