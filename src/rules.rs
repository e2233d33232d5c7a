use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::chart::Pos;
use crate::node::{NodeResult, Value};
use crate::symbol::Symbol;
use crate::utils::{Error, Result};

/// What a semantic action sees besides the children's data
#[derive(Debug)]
pub struct SemanticContext<'a> {
  pub lhs: &'a str,
  pub start: Pos,
  pub end: Pos,
  pub children: &'a [Rc<NodeResult>],
}

/// The output of a semantic action. `Node` overrides the default weight and
/// txt when they are set.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduction {
  Value(Value),
  Node {
    data: Value,
    weight: Option<f64>,
    txt: Option<String>,
  },
}

impl From<Value> for Reduction {
  fn from(v: Value) -> Self {
    Self::Value(v)
  }
}

pub type SemanticFn = dyn Fn(&SemanticContext<'_>, &[Value]) -> Reduction;

static ANONYMOUS: AtomicUsize = AtomicUsize::new(0);

/// A rule's semantic action. The name is part of the rule's identity, so
/// unnamed actions get a fresh one.
#[derive(Clone)]
pub struct Semantic {
  name: String,
  func: Rc<SemanticFn>,
}

impl Semantic {
  pub fn new<F>(f: F) -> Self
  where
    F: Fn(&SemanticContext<'_>, &[Value]) -> Value + 'static,
  {
    let func: Rc<SemanticFn> =
      Rc::new(move |ctx: &SemanticContext<'_>, args: &[Value]| Reduction::Value(f(ctx, args)));
    Self {
      name: Self::fresh_name(),
      func,
    }
  }

  pub fn with_node<F>(f: F) -> Self
  where
    F: Fn(&SemanticContext<'_>, &[Value]) -> Reduction + 'static,
  {
    Self {
      name: Self::fresh_name(),
      func: Rc::new(f),
    }
  }

  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn call(&self, ctx: &SemanticContext<'_>, args: &[Value]) -> Reduction {
    (self.func)(ctx, args)
  }

  fn fresh_name() -> String {
    format!("fn#{}", ANONYMOUS.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Debug for Semantic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Semantic({})", self.name)
  }
}

/// Operator disambiguation classes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorTags {
  pub precedence: BTreeMap<String, i64>,
  pub left_assoc: BTreeSet<String>,
  pub right_assoc: BTreeSet<String>,
  pub non_assoc: BTreeSet<String>,
}

/// Why `open` may not absorb `closed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Veto {
  Precedence(String),
  LeftAssoc(String),
  RightAssoc(String),
  NonAssoc(String),
}

impl fmt::Display for Veto {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Precedence(c) => write!(f, "precedence of {}", c),
      Self::LeftAssoc(c) => write!(f, "left association of {}", c),
      Self::RightAssoc(c) => write!(f, "right association of {}", c),
      Self::NonAssoc(c) => write!(f, "non association of {}", c),
    }
  }
}

fn shared(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Option<String> {
  a.intersection(b).next().cloned()
}

impl OperatorTags {
  pub fn is_empty(&self) -> bool {
    self.precedence.is_empty()
      && self.left_assoc.is_empty()
      && self.right_assoc.is_empty()
      && self.non_assoc.is_empty()
  }

  /// Checks whether an open edge with these tags, its dot at `dot` of a
  /// `rhs_len` long rhs, may take a completed edge tagged `closed` as its
  /// next child.
  pub fn veto(&self, closed: &OperatorTags, dot: usize, rhs_len: usize) -> Option<Veto> {
    for (class, open_prec) in self.precedence.iter() {
      if let Some(closed_prec) = closed.precedence.get(class) {
        if open_prec > closed_prec {
          return Some(Veto::Precedence(class.clone()));
        }
      }
    }
    if dot != 0 {
      if let Some(class) = shared(&self.left_assoc, &closed.left_assoc) {
        return Some(Veto::LeftAssoc(class));
      }
    }
    if dot + 1 < rhs_len {
      if let Some(class) = shared(&self.right_assoc, &closed.right_assoc) {
        return Some(Veto::RightAssoc(class));
      }
    }
    shared(&self.non_assoc, &closed.non_assoc).map(Veto::NonAssoc)
  }
}

#[derive(Debug, Clone)]
pub struct Rule {
  pub lhs: String,
  pub rhs: Vec<Symbol>,
  pub semantic: Option<Semantic>,
  pub weight: f64,
  pub priority: Option<i64>,
  pub entity: bool,
  pub tags: OperatorTags,
}

impl Rule {
  pub fn new(lhs: Symbol, rhs: Vec<Symbol>) -> Result<Self> {
    match lhs {
      Symbol::NonTerminal(name) => Ok(Self::of(&name, rhs)),
      other => Err(Error::MalformedRule(format!(
        "lhs must be a nonterminal, got {}",
        other
      ))),
    }
  }

  /// Shorthand for a rule whose lhs is the nonterminal `lhs`
  pub fn of(lhs: &str, rhs: Vec<Symbol>) -> Self {
    Self {
      lhs: lhs.to_string(),
      rhs,
      semantic: None,
      weight: 1.0,
      priority: None,
      entity: false,
      tags: OperatorTags::default(),
    }
  }

  pub fn semantic(mut self, semantic: Semantic) -> Self {
    self.semantic = Some(semantic);
    self
  }

  /// Attaches an anonymous action returning a plain value
  pub fn action<F>(self, f: F) -> Self
  where
    F: Fn(&SemanticContext<'_>, &[Value]) -> Value + 'static,
  {
    self.semantic(Semantic::new(f))
  }

  pub fn weight(mut self, weight: f64) -> Self {
    self.weight = weight;
    self
  }

  pub fn priority(mut self, priority: i64) -> Self {
    self.priority = Some(priority);
    self
  }

  pub fn entity(mut self) -> Self {
    self.entity = true;
    self
  }

  pub fn precedence(mut self, class: &str, value: i64) -> Self {
    self.tags.precedence.insert(class.to_string(), value);
    self
  }

  pub fn left_assoc(mut self, class: &str) -> Self {
    self.tags.left_assoc.insert(class.to_string());
    self
  }

  pub fn right_assoc(mut self, class: &str) -> Self {
    self.tags.right_assoc.insert(class.to_string());
    self
  }

  pub fn non_assoc(mut self, class: &str) -> Self {
    self.tags.non_assoc.insert(class.to_string());
    self
  }

  pub fn len(&self) -> usize {
    self.rhs.len()
  }

  /// Epsilon rules have an empty rhs
  pub fn is_empty(&self) -> bool {
    self.rhs.is_empty()
  }

  pub fn first(&self) -> Option<&Symbol> {
    self.rhs.first()
  }

  pub fn starts_with_terminal(&self) -> bool {
    self.first().is_some_and(Symbol::is_scannable)
  }

  fn write_options(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut opts = Vec::new();
    if self.entity {
      opts.push("entity: true".to_string());
    }
    if self.weight != 1.0 {
      opts.push(format!("weight: {}", self.weight));
    }
    if let Some(p) = self.priority {
      opts.push(format!("priority: {}", p));
    }
    if !self.tags.precedence.is_empty() {
      let classes = self
        .tags
        .precedence
        .iter()
        .map(|(c, v)| format!("{}:{}", c, v))
        .collect::<Vec<_>>();
      opts.push(format!("opPrecedence: {}", classes.join(",")));
    }
    for (key, set) in [
      ("left_assoc", &self.tags.left_assoc),
      ("right_assoc", &self.tags.right_assoc),
      ("non_assoc", &self.tags.non_assoc),
    ] {
      if !set.is_empty() {
        opts.push(format!("{}: {}", key, set.iter().cloned().collect::<Vec<_>>().join(",")));
      }
    }
    if !opts.is_empty() {
      write!(f, " [{}]", opts.join(", "))?;
    }
    Ok(())
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ->", self.lhs)?;
    for s in self.rhs.iter() {
      write!(f, " {}", s)?;
    }
    if let Some(semantic) = &self.semantic {
      write!(f, " {{% {} %}}", semantic.name())?;
    }
    self.write_options(f)
  }
}
