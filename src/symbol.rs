use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use regex::Regex;
use regex_automata::util::syntax;
use regex_automata::{Anchored, Input, meta};

use crate::utils::Result;

/// Text matched by a terminal, plus the offset the match ends at.
/// Terminals report their matched text as a list so that a lexer hook can
/// split one match into several pieces.
pub type Match = (Vec<String>, usize);

/// One occurrence found by `Symbol::match_all`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalMatch {
  pub text: String,
  pub start: usize,
  pub end: usize,
}

/// Word boundary policy for regex and entity terminals.
///
/// An occurrence is accepted only if the characters right before and right
/// after it are outside the policy's word class. `None` accepts everything.
#[derive(Debug, Clone, Default)]
pub enum Boundary {
  #[default]
  None,
  Alpha,
  Alnum,
  /// single-character classes for the left and right neighbours
  Custom { before: Regex, after: Regex },
}

impl Boundary {
  pub fn custom(before: &str, after: &str) -> Result<Self> {
    Ok(Self::Custom {
      before: Regex::new(&format!("^(?:{})$", before))?,
      after: Regex::new(&format!("^(?:{})$", after))?,
    })
  }

  fn class_matches(re: &Regex, c: char) -> bool {
    let mut buf = [0; 4];
    re.is_match(c.encode_utf8(&mut buf))
  }

  /// the class as it was written, without the full-match wrapper
  fn class_source(re: &Regex) -> &str {
    let s = re.as_str();
    s.strip_prefix("^(?:")
      .and_then(|s| s.strip_suffix(")$"))
      .unwrap_or(s)
  }

  fn is_word_before(&self, c: char) -> bool {
    match self {
      Self::None => false,
      Self::Alpha => c.is_alphabetic(),
      Self::Alnum => c.is_alphanumeric(),
      Self::Custom { before, .. } => Self::class_matches(before, c),
    }
  }

  fn is_word_after(&self, c: char) -> bool {
    match self {
      Self::Custom { after, .. } => Self::class_matches(after, c),
      _ => self.is_word_before(c),
    }
  }

  /// Does `input[start..end]` sit on word boundaries?
  pub fn accepts(&self, input: &str, start: usize, end: usize) -> bool {
    if matches!(self, Self::None) {
      return true;
    }
    let before_ok = input[..start]
      .chars()
      .next_back()
      .is_none_or(|c| !self.is_word_before(c));
    let after_ok = input[end..]
      .chars()
      .next()
      .is_none_or(|c| !self.is_word_after(c));
    before_ok && after_ok
  }
}

impl fmt::Display for Boundary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::None => Ok(()),
      Self::Alpha => write!(f, "alpha"),
      Self::Alnum => write!(f, "alnum"),
      Self::Custom { before, after } => write!(
        f,
        "custom({},{})",
        Self::class_source(before),
        Self::class_source(after)
      ),
    }
  }
}

/// A terminal matching a regular expression at the offset it is asked to
/// match from. The regex always sees the whole input, so look-behind
/// assertions like `\b` use the text before that offset.
#[derive(Debug, Clone)]
pub struct RegexTerminal {
  pattern: String,
  case_insensitive: bool,
  regex: meta::Regex,
  boundary: Boundary,
}

impl RegexTerminal {
  pub fn new(pattern: &str) -> Result<Self> {
    Self::with_options(pattern, false, Boundary::None)
  }

  pub fn with_options(pattern: &str, case_insensitive: bool, boundary: Boundary) -> Result<Self> {
    let regex = meta::Regex::builder()
      .syntax(syntax::Config::new().case_insensitive(case_insensitive))
      .build(pattern)?;
    Ok(Self {
      pattern: pattern.to_string(),
      case_insensitive,
      regex,
      boundary,
    })
  }

  pub fn pattern(&self) -> &str {
    &self.pattern
  }

  pub fn is_case_insensitive(&self) -> bool {
    self.case_insensitive
  }

  pub fn boundary(&self) -> &Boundary {
    &self.boundary
  }

  pub fn match_at(&self, input: &str, start: usize) -> Option<Match> {
    if !input.is_char_boundary(start) {
      return None;
    }
    let m = self
      .regex
      .search(&Input::new(input).range(start..).anchored(Anchored::Yes))?;
    if !self.boundary.accepts(input, m.start(), m.end()) {
      return None;
    }
    Some((vec![input[m.range()].to_string()], m.end()))
  }

  /// Every boundary-respecting, non-empty occurrence in `input`, at most one
  /// per start offset. Occurrences may overlap, and each one is the match
  /// `match_at` would give at its start.
  pub fn match_all(&self, input: &str) -> Vec<TerminalMatch> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while cursor < input.len() {
      let Some(m) = self.regex.search(&Input::new(input).range(cursor..)) else {
        break;
      };
      if !m.is_empty() && self.boundary.accepts(input, m.start(), m.end()) {
        found.push(TerminalMatch {
          text: input[m.range()].to_string(),
          start: m.start(),
          end: m.end(),
        });
      }
      cursor = m.start() + input[m.start()..].chars().next().map_or(1, char::len_utf8);
    }
    found
  }
}

impl fmt::Display for RegexTerminal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "/{}/", self.pattern)?;
    if self.case_insensitive {
      write!(f, "i")?;
    }
    if !matches!(self.boundary, Boundary::None) {
      if self.case_insensitive {
        write!(f, ",")?;
      }
      write!(f, "{}", self.boundary)?;
    }
    Ok(())
  }
}

/// A regex terminal compiled from a registered entity list
#[derive(Debug, Clone)]
pub struct EntityTerminal {
  pub name: String,
  pub terminal: RegexTerminal,
}

pub type ApproxPredicate = Rc<dyn Fn(&str, usize, usize) -> bool>;

/// A terminal that fills the gap between the end of the previous match and
/// the start of a following nonterminal. It can never match on its own.
#[derive(Clone)]
pub struct ApproxTerminal {
  pub name: String,
  pub max_gap: usize,
  pub only_firsts: bool,
  predicate: ApproxPredicate,
}

impl ApproxTerminal {
  pub fn new<F>(name: &str, max_gap: usize, only_firsts: bool, predicate: F) -> Self
  where
    F: Fn(&str, usize, usize) -> bool + 'static,
  {
    Self {
      name: name.to_string(),
      max_gap,
      only_firsts,
      predicate: Rc::new(predicate),
    }
  }

  /// Runs the predicate over exactly `input[start..end]`
  pub fn match_span(&self, input: &str, start: usize, end: usize) -> Option<Match> {
    let text = input.get(start..end)?;
    (self.predicate)(input, start, end).then(|| (vec![text.to_string()], end))
  }
}

impl fmt::Debug for ApproxTerminal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ApproxTerminal")
      .field("name", &self.name)
      .field("max_gap", &self.max_gap)
      .field("only_firsts", &self.only_firsts)
      .finish_non_exhaustive()
  }
}

#[derive(Debug, Clone)]
pub enum Symbol {
  NonTerminal(String),
  Literal(String),
  Regex(RegexTerminal),
  Entity(EntityTerminal),
  Approx(ApproxTerminal),
}

impl Symbol {
  pub fn nonterminal(name: impl Into<String>) -> Self {
    Self::NonTerminal(name.into())
  }

  pub fn literal(text: impl Into<String>) -> Self {
    Self::Literal(text.into())
  }

  pub fn regex(pattern: &str) -> Result<Self> {
    Ok(Self::Regex(RegexTerminal::new(pattern)?))
  }

  /// The name part of the identity: nonterminal name, literal text, regex
  /// pattern, or registered entity/approx name
  pub fn name(&self) -> &str {
    match self {
      Self::NonTerminal(s) | Self::Literal(s) => s,
      Self::Regex(r) => r.pattern(),
      Self::Entity(e) => &e.name,
      Self::Approx(a) => &a.name,
    }
  }

  pub fn is_nonterminal(&self) -> bool {
    matches!(self, Self::NonTerminal(_))
  }

  pub fn is_approx(&self) -> bool {
    matches!(self, Self::Approx(_))
  }

  /// True for terminals that can be found by scanning the input on their own
  pub fn is_scannable(&self) -> bool {
    matches!(self, Self::Literal(_) | Self::Regex(_) | Self::Entity(_))
  }

  pub fn as_nonterminal(&self) -> Option<&str> {
    match self {
      Self::NonTerminal(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_approx(&self) -> Option<&ApproxTerminal> {
    match self {
      Self::Approx(a) => Some(a),
      _ => None,
    }
  }

  /// Tries to match the symbol at exactly `start`. Nonterminals and approx
  /// terminals never match here.
  pub fn match_at(&self, input: &str, start: usize) -> Option<Match> {
    match self {
      Self::Literal(lit) => {
        let end = start + lit.len();
        (input.get(start..end) == Some(lit.as_str())).then(|| (vec![lit.clone()], end))
      }
      Self::Regex(r) => r.match_at(input, start),
      Self::Entity(e) => e.terminal.match_at(input, start),
      Self::NonTerminal(_) | Self::Approx(_) => None,
    }
  }

  /// Every occurrence of a scannable terminal in `input`, used to seed the
  /// bottom-up strategies. Literal occurrences may overlap.
  pub fn match_all(&self, input: &str) -> Vec<TerminalMatch> {
    match self {
      Self::Literal(lit) if !lit.is_empty() => {
        let mut found = Vec::new();
        let mut from = 0;
        while let Some(idx) = input.get(from..).and_then(|rest| rest.find(lit.as_str())) {
          let start = from + idx;
          found.push(TerminalMatch {
            text: lit.clone(),
            start,
            end: start + lit.len(),
          });
          from = start + input[start..].chars().next().map_or(1, char::len_utf8);
        }
        found
      }
      Self::Regex(r) => r.match_all(input),
      Self::Entity(e) => e.terminal.match_all(input),
      _ => Vec::new(),
    }
  }

  /// What two symbols must share to be the same symbol. Regexes also
  /// compare their case and boundary settings.
  fn identity(&self) -> Cow<'_, str> {
    match self {
      Self::Regex(r) => Cow::Owned(r.to_string()),
      _ => Cow::Borrowed(self.name()),
    }
  }

  fn discriminant(&self) -> u8 {
    match self {
      Self::NonTerminal(_) => 0,
      Self::Literal(_) => 1,
      Self::Regex(_) => 2,
      Self::Entity(_) => 3,
      Self::Approx(_) => 4,
    }
  }
}

impl PartialEq for Symbol {
  fn eq(&self, other: &Self) -> bool {
    self.discriminant() == other.discriminant() && self.identity() == other.identity()
  }
}

impl Eq for Symbol {}

impl Hash for Symbol {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.discriminant().hash(state);
    self.identity().hash(state);
  }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NonTerminal(s) => write!(f, "{}", s),
      Self::Literal(s) => write!(f, "\"{}\"", s),
      Self::Regex(r) => write!(f, "{}", r),
      Self::Entity(e) => write!(f, "EntityTerminal({})", e.name),
      Self::Approx(a) => write!(f, "ApproxTerminal({})", a.name),
    }
  }
}
