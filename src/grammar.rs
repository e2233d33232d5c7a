use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::rules::Rule;
use crate::symbol::Symbol;

/// A rule set with lookups by lhs and by first rhs symbol. Rules are
/// deduplicated by their display identity.
#[derive(Debug, Default)]
pub struct Grammar {
  rules: Vec<Rc<Rule>>,
  identities: HashSet<String>,
  by_lhs: HashMap<String, Vec<Rc<Rule>>>,
  by_first_rhs: HashMap<Option<Symbol>, Vec<Rc<Rule>>>,
}

impl Grammar {
  pub fn new(rules: Vec<Rule>) -> Self {
    let mut grammar = Self::default();
    for rule in rules {
      grammar.add_rule(rule);
    }
    grammar
  }

  /// Adds a rule, returning false if an identical one was already present
  pub fn add_rule(&mut self, rule: Rule) -> bool {
    let identity = rule.to_string();
    if !self.identities.insert(identity) {
      debug!("skipping duplicate rule {}", rule);
      return false;
    }

    let rule = Rc::new(rule);
    self
      .by_lhs
      .entry(rule.lhs.clone())
      .or_default()
      .push(rule.clone());
    self
      .by_first_rhs
      .entry(rule.first().cloned())
      .or_default()
      .push(rule.clone());
    self.rules.push(rule);
    true
  }

  pub fn rules(&self) -> &[Rc<Rule>] {
    &self.rules
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  pub fn rules_by_lhs(&self, lhs: &str) -> &[Rc<Rule>] {
    self.by_lhs.get(lhs).map_or(&[], Vec::as_slice)
  }

  /// Rules whose rhs starts with `symbol`, or the epsilon rules for `None`
  pub fn rules_by_first_rhs(&self, symbol: Option<&Symbol>) -> &[Rc<Rule>] {
    self
      .by_first_rhs
      .get(&symbol.cloned())
      .map_or(&[], Vec::as_slice)
  }

  /// Rules starting with the nonterminal `name`
  pub fn rules_by_first_nonterminal(&self, name: &str) -> &[Rc<Rule>] {
    self.rules_by_first_rhs(Some(&Symbol::nonterminal(name)))
  }

  pub fn epsilon_rules_by_lhs<'a>(&'a self, lhs: &str) -> impl Iterator<Item = &'a Rc<Rule>> + 'a {
    self.rules_by_lhs(lhs).iter().filter(|r| r.is_empty())
  }

  pub fn epsilon_rules(&self) -> &[Rc<Rule>] {
    self.rules_by_first_rhs(None)
  }

  pub fn entity_rules(&self) -> impl Iterator<Item = &Rc<Rule>> {
    self.rules.iter().filter(|r| r.entity)
  }

  /// Rules that can be seeded by scanning the whole input
  pub fn terminal_start_rules(&self) -> impl Iterator<Item = &Rc<Rule>> {
    self.rules.iter().filter(|r| r.starts_with_terminal())
  }
}

impl fmt::Display for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for rule in self.rules.iter() {
      writeln!(f, "{}", rule)?;
    }
    Ok(())
  }
}
