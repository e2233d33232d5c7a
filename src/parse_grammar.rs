/// Simple recursive-descent parsing of grammar files
use std::str::FromStr;

use regex::{Captures, Regex};
use tracing::info;

use crate::grammar::Grammar;
use crate::registry::Registry;
use crate::rules::{Rule, Semantic};
use crate::symbol::Symbol;
use crate::utils::{Error, Result, plural};

impl FromStr for Grammar {
  type Err = Error;

  /// Parses a grammar using the default registry, so only built-in actions
  /// are available and entity/approx terminals will fail.
  fn from_str(s: &str) -> Result<Self> {
    Self::load(s, &Registry::default())
  }
}

impl Grammar {
  /// Parses a grammar, resolving entities, approx terminals and actions
  /// through `registry`. Errors if the grammar doesn't parse or is empty.
  pub fn load(src: &str, registry: &Registry) -> Result<Self> {
    let mut grammar = Self::default();
    if grammar.extend_from_str(src, registry)? == 0 {
      return Err(syntax("empty ruleset".to_string()));
    }
    Ok(grammar)
  }

  /// Parses more rules into this grammar, returning how many were new
  pub fn extend_from_str(&mut self, src: &str, registry: &Registry) -> Result<usize> {
    let (rules, rest) = parse_rules(src, registry)?;
    debug_assert!(rest.is_empty());
    let total = rules.len();
    let added = rules.into_iter().filter(|r| self.add_rule(r.clone())).count();
    info!("loaded {} rule{} ({} new)", total, plural(total), added);
    Ok(added)
  }
}

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str)>;

fn syntax(msg: String) -> Error {
  Error::GrammarSyntax(msg)
}

/// Prefixes syntax errors with where they happened; registry lookups
/// failing pass through unchanged
fn context(prefix: &str, err: Error) -> Error {
  match err {
    Error::GrammarSyntax(msg) => syntax(format!("{}: {}", prefix, msg)),
    other => other,
  }
}

/// The start of `s`, for error messages
fn near(s: &str) -> String {
  let snippet = s.chars().take(24).collect::<String>();
  if snippet.len() < s.len() {
    format!("{:?}...", snippet)
  } else {
    format!("{:?}", snippet)
  }
}

/// Try to consume a regex, returning None if it doesn't match
fn optional_captures<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<Captures<'a>>> {
  match re.captures(s) {
    Some(caps) if caps.get(0).is_some_and(|m| m.start() == 0) => {
      let end = caps.get(0).map_or(0, |m| m.end());
      (Some(caps), &s[end..])
    }
    _ => (None, s),
  }
}

fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  match re.find(s) {
    Some(m) if m.start() == 0 => (Some(m.as_str()), &s[m.end()..]),
    _ => (None, s),
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(syntax(format!("couldn't match {} at {}", re, near(s))))
  }
}

/// Tries to skip whitespace and # comments
fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE_OR_COMMENT, r"^(?:\s|#[^\n]*)+");
  optional_re(&WHITESPACE_OR_COMMENT, s).1
}

fn parse_name(s: &str) -> ParseResult<'_, &str> {
  regex_static!(NAME, r"^[A-Za-z_][A-Za-z0-9_]*");
  needed_re(&NAME, s).map_err(|e| context("name", e))
}

fn is_rule_start(s: &str) -> bool {
  regex_static!(RULE_START, r"^[A-Za-z_][A-Za-z0-9_]*\s*->");
  RULE_START.is_match(s)
}

/// Undoes `\x` escapes in a literal
fn unescape(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut chars = s.chars();
  while let Some(c) = chars.next() {
    if c == '\\' {
      if let Some(next) = chars.next() {
        out.push(next);
      }
    } else {
      out.push(c);
    }
  }
  out
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
  s.split(',').map(str::trim).filter(|c| !c.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
enum RuleOption {
  Entity(bool),
  Weight(f64),
  Priority(i64),
  Precedence(Vec<(String, i64)>),
  LeftAssoc(Vec<String>),
  RightAssoc(Vec<String>),
  NonAssoc(Vec<String>),
}

impl RuleOption {
  fn apply(self, rule: Rule) -> Rule {
    match self {
      Self::Entity(entity) => Rule { entity, ..rule },
      Self::Weight(w) => rule.weight(w),
      Self::Priority(p) => rule.priority(p),
      Self::Precedence(classes) => classes
        .into_iter()
        .fold(rule, |rule, (class, value)| rule.precedence(&class, value)),
      Self::LeftAssoc(classes) => classes.iter().fold(rule, |rule, c| rule.left_assoc(c)),
      Self::RightAssoc(classes) => classes.iter().fold(rule, |rule, c| rule.right_assoc(c)),
      Self::NonAssoc(classes) => classes.iter().fold(rule, |rule, c| rule.non_assoc(c)),
    }
  }
}

/// `key: value`, with the value's shape depending on the key
fn parse_option<'a>(key: &str, s: &'a str) -> ParseResult<'a, RuleOption> {
  regex_static!(BOOL, r"^(?:true|false)\b");
  regex_static!(FLOAT, r"^-?\d+(?:\.\d+)?");
  regex_static!(INT, r"^-?\d+");
  regex_static!(CLASSES, r"^[A-Za-z0-9_]+(?:\s*,\s*[A-Za-z0-9_]+)*");
  regex_static!(
    PRECEDENCES,
    r"^[A-Za-z0-9_]+\s*:\s*-?\d+(?:\s*,\s*[A-Za-z0-9_]+\s*:\s*-?\d+)*"
  );

  let err = |e: Error| context(&format!("option {}", key), e);
  match key {
    "entity" => {
      let (v, s) = needed_re(&BOOL, s).map_err(err)?;
      Ok((RuleOption::Entity(v == "true"), s))
    }
    "weight" => {
      let (v, s) = needed_re(&FLOAT, s).map_err(err)?;
      let w = v.parse().map_err(|_| syntax(format!("bad weight {}", v)))?;
      Ok((RuleOption::Weight(w), s))
    }
    "priority" => {
      let (v, s) = needed_re(&INT, s).map_err(err)?;
      let p = v.parse().map_err(|_| syntax(format!("bad priority {}", v)))?;
      Ok((RuleOption::Priority(p), s))
    }
    "opPrecedence" => {
      let (v, s) = needed_re(&PRECEDENCES, s).map_err(err)?;
      let mut classes = Vec::new();
      for pair in split_list(v) {
        let (class, value) = pair
          .split_once(':')
          .ok_or_else(|| syntax(format!("bad precedence {}", pair)))?;
        let value = value
          .trim()
          .parse()
          .map_err(|_| syntax(format!("bad precedence {}", pair)))?;
        classes.push((class.trim().to_string(), value));
      }
      Ok((RuleOption::Precedence(classes), s))
    }
    _ => {
      let (v, s) = needed_re(&CLASSES, s).map_err(err)?;
      let classes = split_list(v).map(String::from).collect();
      let opt = match key {
        "left_assoc" => RuleOption::LeftAssoc(classes),
        "right_assoc" => RuleOption::RightAssoc(classes),
        _ => RuleOption::NonAssoc(classes),
      };
      Ok((opt, s))
    }
  }
}

/// One piece of a rule alternative
enum Item {
  Symbol(Symbol),
  Action(Semantic),
  Option(RuleOption),
}

fn parse_item<'a>(s: &'a str, registry: &Registry) -> ParseResult<'a, Item> {
  regex_static!(OPTION, r"^(entity|weight|priority|opPrecedence|left_assoc|right_assoc|non_assoc)\s*:\s*");
  regex_static!(ACTION, r"^\{%\s*([A-Za-z0-9_\-.:]+)\s*%\}");
  regex_static!(LITERAL, r#"^"((?:\\.|[^"\\])*)""#);
  regex_static!(REGEX, r"^/((?:\\.|[^/\\])*)/");
  regex_static!(SPECIAL, r"^(EntityTerminal|ApproxTerminal)\(\s*([A-Za-z0-9_\-]+)\s*\)");

  if let (Some(caps), s) = optional_captures(&OPTION, s) {
    let (opt, s) = parse_option(&caps[1], s)?;
    return Ok((Item::Option(opt), s));
  }
  if let (Some(caps), s) = optional_captures(&ACTION, s) {
    return Ok((Item::Action(registry.action(&caps[1])?), s));
  }
  if let (Some(caps), s) = optional_captures(&LITERAL, s) {
    return Ok((Item::Symbol(Symbol::literal(unescape(&caps[1]))), s));
  }
  if let (Some(caps), s) = optional_captures(&REGEX, s) {
    let pattern = caps[1].replace(r"\/", "/");
    return Ok((Item::Symbol(Symbol::regex(&pattern)?), s));
  }
  if let (Some(caps), s) = optional_captures(&SPECIAL, s) {
    let symbol = if &caps[1] == "EntityTerminal" {
      registry.entity(&caps[2])?
    } else {
      registry.approx(&caps[2])?
    };
    return Ok((Item::Symbol(symbol), s));
  }
  let (name, s) = parse_name(s).map_err(|e| context("symbol", e))?;
  Ok((Item::Symbol(Symbol::nonterminal(name)), s))
}

/// One alternative: symbols, an optional action and options, in any order,
/// up to `||`, the next rule, or the end of input
fn parse_alternative<'a>(lhs: &str, s: &'a str, registry: &Registry) -> ParseResult<'a, Rule> {
  let mut rhs = Vec::new();
  let mut semantic = None;
  let mut options = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.is_empty() || rem.starts_with("||") || is_rule_start(rem) {
      break;
    }
    let (item, s) = parse_item(rem, registry).map_err(|e| context(&format!("rule {}", lhs), e))?;
    match item {
      Item::Symbol(symbol) => rhs.push(symbol),
      Item::Action(action) => {
        if semantic.replace(action).is_some() {
          return Err(syntax(format!("rule {}: more than one action", lhs)));
        }
      }
      Item::Option(opt) => options.push(opt),
    }
    rem = s;
  }

  let mut rule = Rule::of(lhs, rhs);
  if let Some(semantic) = semantic {
    rule = rule.semantic(semantic);
  }
  let rule = options.into_iter().fold(rule, |rule, opt| opt.apply(rule));
  Ok((rule, rem))
}

/// LHS -> alternative || alternative ...
fn parse_rule<'a>(s: &'a str, registry: &Registry) -> ParseResult<'a, Vec<Rule>> {
  #![allow(clippy::trivial_regex)]
  regex_static!(ARROW, "^->");
  regex_static!(ALT, r"^\|\|");

  let (lhs, s) = parse_name(s).map_err(|e| context("rule symbol", e))?;
  let s = skip_whitespace(s);
  let (_, s) = needed_re(&ARROW, s).map_err(|e| context("rule arrow", e))?;

  let mut rules = Vec::new();
  let mut rem = s;
  loop {
    let (rule, s) = parse_alternative(lhs, rem, registry)?;
    rules.push(rule);
    if let (Some(_), s) = optional_re(&ALT, s) {
      rem = s;
    } else {
      return Ok((rules, s));
    }
  }
}

fn parse_rules<'a>(s: &'a str, registry: &Registry) -> ParseResult<'a, Vec<Rule>> {
  let mut rules = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.is_empty() {
      return Ok((rules, rem));
    }
    let (group, s) = parse_rule(rem, registry)?;
    rules.extend(group);
    rem = s;
  }
}
