use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::chart::{Chart, EdgeId, Pos};
use crate::forest::Forest;
use crate::grammar::Grammar;
use crate::node::NodeResult;
use crate::symbol::{Match, Symbol};
use crate::utils::{Error, Result, plural, whitespace_run};

/// Which way the chart is seeded and grown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
  /// predict from the entity rules at offset 0
  TopDown,
  /// seed from every terminal occurrence and complete upwards
  BottomUp,
  /// bottom-up, plus predictions and a second pass filling approx gaps
  BottomUpApprox,
}

impl ParserKind {
  fn is_bottom_up(self) -> bool {
    self != Self::TopDown
  }

  fn predicts_by_lhs(self) -> bool {
    self != Self::BottomUp
  }
}

impl FromStr for ParserKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "topDown" => Ok(Self::TopDown),
      "bottomUp" => Ok(Self::BottomUp),
      "bottomUpApprox" => Ok(Self::BottomUpApprox),
      other => Err(Error::UnknownParserType(other.to_string())),
    }
  }
}

impl fmt::Display for ParserKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::TopDown => "topDown",
      Self::BottomUp => "bottomUp",
      Self::BottomUpApprox => "bottomUpApprox",
    };
    write!(f, "{}", name)
  }
}

/// Matches a symbol at an offset, returning the matched text and the
/// offset the next symbol should start at
pub type Lexer = Rc<dyn Fn(&Symbol, &str, usize) -> Option<Match>>;

/// Matches exactly, then skips one run of whitespace
pub fn default_lexer(symbol: &Symbol, input: &str, start: usize) -> Option<Match> {
  let (text, end) = symbol.match_at(input, start)?;
  Some((text, end + whitespace_run(input, end)))
}

#[derive(Clone)]
pub struct ParserOptions {
  pub lexer: Lexer,
}

impl Default for ParserOptions {
  fn default() -> Self {
    Self {
      lexer: Rc::new(default_lexer),
    }
  }
}

impl fmt::Debug for ParserOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ParserOptions").finish_non_exhaustive()
  }
}

/// Wall time of the last parse and results call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timings {
  pub init: Duration,
  pub chart: Duration,
  pub results: Duration,
}

impl fmt::Display for Timings {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let ms = |d: Duration| d.as_secs_f64() * 1000.0;
    write!(
      f,
      "computed in {:.3}ms (init: {:.3}ms | chart: {:.3}ms | results: {:.3}ms)",
      ms(self.init + self.chart + self.results),
      ms(self.init),
      ms(self.chart),
      ms(self.results)
    )
  }
}

/// A chart parser over one grammar. Each `parse` starts a fresh chart.
pub struct Parser<'g> {
  grammar: &'g Grammar,
  kind: ParserKind,
  lexer: Lexer,
  chart: Chart,
  input: Option<String>,
  timings: Cell<Timings>,
}

impl<'g> Parser<'g> {
  pub fn new(grammar: &'g Grammar, kind: ParserKind) -> Self {
    Self::with_options(grammar, kind, ParserOptions::default())
  }

  pub fn with_options(grammar: &'g Grammar, kind: ParserKind, options: ParserOptions) -> Self {
    Self {
      grammar,
      kind,
      lexer: options.lexer,
      chart: Chart::new(),
      input: None,
      timings: Cell::new(Timings::default()),
    }
  }

  pub fn kind(&self) -> ParserKind {
    self.kind
  }

  pub fn grammar(&self) -> &'g Grammar {
    self.grammar
  }

  pub fn chart(&self) -> &Chart {
    &self.chart
  }

  pub fn input(&self) -> Option<&str> {
    self.input.as_deref()
  }

  pub fn timings(&self) -> Timings {
    self.timings.get()
  }

  /// Fills the chart for `input`
  pub fn parse(&mut self, input: &str) -> Result<()> {
    let started = Instant::now();
    self.chart = Chart::new();
    self.input = Some(input.to_string());

    match self.kind {
      ParserKind::TopDown => self.init_top_down()?,
      ParserKind::BottomUp | ParserKind::BottomUpApprox => self.init_bottom_up(input)?,
    }
    self.chart.parser_initialized();
    let inited = Instant::now();
    debug!("initial agenda: {} edge{}", self.chart.len(), plural(self.chart.len()));

    self.parse_all(input)?;

    let done = Instant::now();
    self.timings.set(Timings {
      init: inited - started,
      chart: done - inited,
      results: Duration::ZERO,
    });
    info!(
      "finished {} chart: {} edge{} in {:?}",
      self.kind,
      self.chart.len(),
      plural(self.chart.len()),
      done - inited
    );
    Ok(())
  }

  fn init_top_down(&mut self) -> Result<()> {
    for rule in self.grammar.entity_rules() {
      self.chart.add_initial(rule, Pos::At(0))?;
    }
    Ok(())
  }

  /// Seeds every occurrence of every rule's leading terminal that the lexer
  /// accepts, and every epsilon rule as a floating derivation
  fn init_bottom_up(&mut self, input: &str) -> Result<()> {
    for rule in self.grammar.terminal_start_rules() {
      let Some(first) = rule.first() else {
        continue;
      };
      for m in first.match_all(input) {
        let Some((text, end)) = (self.lexer)(first, input, m.start) else {
          trace!("lexer rejected {} at {}", first, m.start);
          continue;
        };
        self.chart.add_initial_processed(rule, m.start, end, text)?;
      }
    }
    for rule in self.grammar.epsilon_rules() {
      self.chart.add_initial(rule, Pos::Any)?;
    }
    Ok(())
  }

  /// Drains the agenda, then the approx edges, until neither produces
  /// anything new
  fn parse_all(&mut self, input: &str) -> Result<()> {
    loop {
      info!("processing agenda with {} edge{}", self.chart.agenda_size(), plural(self.chart.agenda_size()));
      while let Some(id) = self.chart.next() {
        self.next(id, input)?;
      }
      if !self.chart.has_next_round() {
        return Ok(());
      }
      let round = self.chart.take_next_round();
      if self.kind == ParserKind::BottomUpApprox {
        info!("approx pass over {} edge{}", round.len(), plural(round.len()));
        for id in round {
          self.approx_scanner(id, input)?;
        }
      }
    }
  }

  fn next(&mut self, id: EdgeId, input: &str) -> Result<()> {
    let edge = self.chart.edge(id);
    trace!("processing {} {}", id, edge);
    if edge.is_reduced() {
      self.completer(id)
    } else if edge.is_shift() {
      self.scanner(id, input)
    } else {
      self.predictor(id)
    }
  }

  /// Advances every edge waiting on the completed edge's lhs. Bottom-up,
  /// also predicts the rules that start with it.
  pub fn completer(&mut self, id: EdgeId) -> Result<()> {
    let edge = self.chart.edge(id);
    let (lhs, start) = (edge.lhs().to_string(), edge.start);

    if self.kind.is_bottom_up() {
      for rule in self.grammar.rules_by_first_nonterminal(&lhs) {
        self.chart.add_predicted(rule, start)?;
      }
    }

    let waiting = if start.is_any() {
      self.chart.all_waiting(&lhs).to_vec()
    } else {
      let mut waiting = self.chart.waiting(&lhs, start).to_vec();
      waiting.extend_from_slice(self.chart.waiting(&lhs, Pos::Any));
      waiting
    };
    for open in waiting {
      self.chart.add_from_open_closed(open, id)?;
    }
    Ok(())
  }

  /// Predicts the nonterminal after the dot and advances over any completed
  /// edges for it
  pub fn predictor(&mut self, id: EdgeId) -> Result<()> {
    let edge = self.chart.edge(id);
    let end = edge.end;
    let Some(wanted) = edge.next_symbol().and_then(Symbol::as_nonterminal) else {
      return Ok(());
    };
    let wanted = wanted.to_string();

    if self.kind.predicts_by_lhs() {
      for rule in self.grammar.rules_by_lhs(&wanted) {
        self.chart.add_predicted(rule, end)?;
      }
    }
    if self.kind.is_bottom_up() {
      for rule in self.grammar.epsilon_rules_by_lhs(&wanted) {
        self.chart.add_predicted(rule, end)?;
      }
    }

    let reduced = if end.is_any() {
      self.chart.reduced(&wanted, Pos::Any).to_vec()
    } else {
      let mut reduced = self.chart.reduced(&wanted, end).to_vec();
      reduced.extend_from_slice(self.chart.floating_reduced(&wanted));
      reduced
    };
    for closed in reduced {
      self.chart.add_from_open_closed(id, closed)?;
    }
    Ok(())
  }

  /// Matches the terminal after the dot through the lexer. A floating edge
  /// is anchored at every occurrence of the terminal.
  pub fn scanner(&mut self, id: EdgeId, input: &str) -> Result<()> {
    let edge = self.chart.edge(id);
    let (rule, dot, end) = (edge.rule.clone(), edge.dot, edge.end);
    let Some(symbol) = rule.rhs.get(dot) else {
      return Ok(());
    };

    match end {
      Pos::At(pos) => {
        if let Some((text, end)) = (self.lexer)(symbol, input, pos) {
          self.chart.add_scanned(id, Pos::At(end), text, None)?;
        }
      }
      Pos::Any => {
        for m in symbol.match_all(input) {
          if let Some((text, end)) = (self.lexer)(symbol, input, m.start) {
            self.chart.add_scanned(id, Pos::At(end), text, Some(Pos::At(m.start)))?;
          }
        }
      }
    }
    Ok(())
  }

  /// Fills the gap between an edge waiting on an approx terminal and the
  /// completed edges for the nonterminal after it
  pub fn approx_scanner(&mut self, id: EdgeId, input: &str) -> Result<()> {
    let edge = self.chart.edge(id);
    let (rule, dot, from) = (edge.rule.clone(), edge.dot, edge.end);

    let Some(approx) = rule.rhs.get(dot).and_then(Symbol::as_approx) else {
      return Err(Error::ApproxTerminalMisuse(format!(
        "{} is not waiting on an approx terminal",
        edge
      )));
    };
    let Some(following) = rule.rhs.get(dot + 1).and_then(Symbol::as_nonterminal) else {
      return Err(Error::ApproxTerminalMisuse(format!(
        "{} must be followed by a nonterminal in {}",
        approx.name, rule
      )));
    };
    let Some(from) = from.at() else {
      debug!("skipping floating approx edge {}", id);
      return Ok(());
    };

    let mut starts = self
      .chart
      .reduced(following, Pos::Any)
      .iter()
      .filter_map(|&c| self.chart.edge(c).start.at())
      .filter(|&s| s > from && s - from <= approx.max_gap)
      .collect::<Vec<_>>();
    starts.sort_unstable();
    starts.dedup();
    if approx.only_firsts {
      starts.truncate(1);
    }

    for start in starts {
      if let Some((text, end)) = approx.match_span(input, from, start) {
        self.chart.add_scanned(id, Pos::At(end), text, None)?;
      }
    }
    Ok(())
  }

  /// Semantic results of the outermost entity edges. With `full`, only
  /// edges spanning the whole input and carrying the top priority (or none)
  /// are expanded.
  pub fn results(&self, full: bool) -> Result<Vec<NodeResult>> {
    let started = Instant::now();
    let input = self.input.as_deref().ok_or(Error::InputNotSet)?;

    let mut edges = self.chart.parent_entities();
    info!("{} parent entity edge{}", edges.len(), plural(edges.len()));
    if full {
      let priority = |id: &EdgeId| self.chart.edge(*id).rule.priority;
      edges.retain(|&id| {
        let edge = self.chart.edge(id);
        edge.start == Pos::At(0) && edge.end == Pos::At(input.len())
      });
      edges.sort_by(|a, b| priority(b).cmp(&priority(a)));
      let max = edges.first().and_then(priority);
      edges.retain(|id| priority(id).is_none() || priority(id) == max);
      info!("{} full edge{}", edges.len(), plural(edges.len()));
    }

    let mut forest = Forest::new(&self.chart);
    let results = edges
      .iter()
      .flat_map(|&id| forest.results(id))
      .map(|nr| NodeResult::clone(&nr))
      .collect::<Vec<_>>();

    let mut timings = self.timings.get();
    timings.results = started.elapsed();
    self.timings.set(timings);
    info!(
      "parser completed with {} result{} ({} edge{}), {}",
      results.len(),
      plural(results.len()),
      self.chart.len(),
      plural(self.chart.len()),
      timings
    );
    debug!(
      "results: {}",
      results.iter().map(|r| r.txt.as_str()).collect::<Vec<_>>().join(", ")
    );
    Ok(results)
  }
}

impl fmt::Debug for Parser<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Parser")
      .field("kind", &self.kind)
      .field("input", &self.input)
      .field("edges", &self.chart.len())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::node::Value;
  use crate::rules::Rule;
  use crate::symbol::ApproxTerminal;

  fn nt(name: &str) -> Symbol {
    Symbol::nonterminal(name)
  }

  fn lit(text: &str) -> Symbol {
    Symbol::literal(text)
  }

  #[test]
  fn test_parser_kind() {
    assert_eq!("topDown".parse::<ParserKind>().unwrap(), ParserKind::TopDown);
    assert_eq!("bottomUpApprox".parse::<ParserKind>().unwrap(), ParserKind::BottomUpApprox);
    assert!(matches!("sideways".parse::<ParserKind>(), Err(Error::UnknownParserType(_))));
    assert_eq!(ParserKind::BottomUp.to_string(), "bottomUp");
  }

  #[test]
  fn test_default_lexer_skips_whitespace() {
    let s = lit("term");
    assert_eq!(default_lexer(&s, "xx term   XYZ", 3), Some((vec!["term".to_string()], 10)));
    assert_eq!(default_lexer(&s, "xx term", 3), Some((vec!["term".to_string()], 7)));
    assert_eq!(default_lexer(&s, "xx term", 2), None);
  }

  #[test]
  fn test_results_before_parse() {
    let g = Grammar::new(vec![Rule::of("S", vec![lit("a")]).entity()]);
    let parser = Parser::new(&g, ParserKind::TopDown);
    assert!(matches!(parser.results(true), Err(Error::InputNotSet)));
  }

  #[test]
  fn test_scanner_and_completer() {
    let g = Grammar::new(vec![
      Rule::of("S", vec![nt("A"), lit("term")]).entity(),
      Rule::of("A", vec![lit("a")]),
    ]);
    let mut parser = Parser::new(&g, ParserKind::TopDown);
    parser.parse("a term   ").unwrap();
    let edges = parser
      .chart()
      .edges()
      .map(|(_, e)| e.to_string())
      .collect::<Vec<_>>();
    assert!(edges.contains(&"0..2: A → \"a\" ・".to_string()));
    assert!(edges.contains(&"0..9: S → A \"term\" ・".to_string()));
    let results = parser.results(true).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].txt, "S(A(\"a\"), \"term\")");
  }

  #[test]
  fn test_reparse_resets_chart() {
    let g = Grammar::new(vec![Rule::of("S", vec![lit("a")]).entity()]);
    let mut parser = Parser::new(&g, ParserKind::BottomUp);
    parser.parse("a").unwrap();
    assert_eq!(parser.results(true).unwrap().len(), 1);
    parser.parse("b").unwrap();
    assert!(parser.results(true).unwrap().is_empty());
    assert_eq!(parser.input(), Some("b"));
  }

  #[test]
  fn test_epsilon_start_bottom_up() {
    let g = Grammar::new(vec![
      Rule::of("S", vec![nt("A"), nt("B")]).entity(),
      Rule::of("A", vec![]),
      Rule::of("B", vec![lit("x")]),
    ]);
    for kind in [ParserKind::TopDown, ParserKind::BottomUp, ParserKind::BottomUpApprox] {
      let mut parser = Parser::new(&g, kind);
      parser.parse("x").unwrap();
      let results = parser.results(true).unwrap();
      assert_eq!(results.len(), 1, "{}", kind);
      assert_eq!(results[0].start, Pos::At(0));
      assert_eq!(results[0].end, Pos::At(1));
      assert_eq!(results[0].data, Value::List(vec![Value::Null, Value::from("x")]));
    }
  }

  fn approx_grammar(only_firsts: bool) -> Grammar {
    let gap = Symbol::Approx(ApproxTerminal::new("gap", 10, only_firsts, |_, _, _| true));
    let number = Symbol::regex(r"\d+").unwrap();
    Grammar::new(vec![
      Rule::of("S", vec![lit("id"), gap, nt("N")]).entity(),
      Rule::of("N", vec![number]),
    ])
  }

  fn gaps(parser: &Parser<'_>) -> Vec<String> {
    parser
      .chart()
      .edges()
      .filter(|(_, e)| e.lhs() == "S" && e.dot == 2)
      .flat_map(|(_, e)| e.history.iter().filter_map(|h| h.term_match.clone()))
      .flatten()
      .collect()
  }

  #[test]
  fn test_approx_scanner_only_firsts() {
    let g = approx_grammar(true);
    let mut parser = Parser::new(&g, ParserKind::BottomUpApprox);
    parser.parse("id xx 67 89").unwrap();
    assert_eq!(gaps(&parser), vec!["xx ".to_string()]);
    assert!(parser.results(true).unwrap().is_empty());
    assert_eq!(parser.results(false).unwrap().len(), 1);
  }

  #[test]
  fn test_approx_scanner_all_candidates() {
    let g = approx_grammar(false);
    let mut parser = Parser::new(&g, ParserKind::BottomUpApprox);
    parser.parse("id xx 67 89").unwrap();
    let mut found = gaps(&parser);
    found.sort();
    assert_eq!(found, vec!["xx ", "xx 6", "xx 67 ", "xx 67 8"]);
    let mut results = parser
      .results(true)
      .unwrap()
      .into_iter()
      .map(|r| r.txt)
      .collect::<Vec<_>>();
    results.sort();
    assert_eq!(
      results,
      vec![
        "S(\"id\", \"xx 67 \", N(\"89\"))",
        "S(\"id\", \"xx 67 8\", N(\"9\"))",
      ]
    );
  }

  #[test]
  fn test_approx_needs_following_nonterminal() {
    let gap = Symbol::Approx(ApproxTerminal::new("gap", 10, false, |_, _, _| true));
    let g = Grammar::new(vec![Rule::of("S", vec![lit("id"), gap]).entity()]);
    let mut parser = Parser::new(&g, ParserKind::BottomUpApprox);
    assert!(matches!(parser.parse("id xx"), Err(Error::ApproxTerminalMisuse(_))));
  }

  #[test]
  fn test_custom_lexer() {
    let g = Grammar::new(vec![Rule::of("S", vec![lit("a"), lit("b")]).entity()]);
    let options = ParserOptions {
      lexer: Rc::new(|symbol: &Symbol, input: &str, start: usize| {
        let (text, end) = symbol.match_at(input, start)?;
        let dashes = input[end..].chars().take_while(|&c| c == '-').count();
        Some((text, end + dashes))
      }),
    };
    let mut parser = Parser::with_options(&g, ParserKind::TopDown, options);
    parser.parse("a--b").unwrap();
    assert_eq!(parser.results(true).unwrap().len(), 1);
    parser.parse("a b").unwrap();
    assert!(parser.results(true).unwrap().is_empty());
  }

  #[test]
  fn test_lexer_rejection_applies_to_seeds() {
    let g = Grammar::new(vec![
      Rule::of("S", vec![lit("a"), nt("B")]).entity(),
      Rule::of("B", vec![lit("b")]),
    ]);
    let options = ParserOptions {
      lexer: Rc::new(|symbol: &Symbol, input: &str, start: usize| {
        if symbol.name() == "b" {
          return None;
        }
        default_lexer(symbol, input, start)
      }),
    };
    for kind in [ParserKind::TopDown, ParserKind::BottomUp, ParserKind::BottomUpApprox] {
      let mut parser = Parser::with_options(&g, kind, options.clone());
      parser.parse("a b").unwrap();
      assert!(parser.results(true).unwrap().is_empty(), "{}", kind);
      assert!(
        !parser.chart().edges().any(|(_, e)| e.lhs() == "B" && e.dot > 0),
        "{}",
        kind
      );
    }
  }
}
