use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::chart::Pos;
use crate::rules::{Reduction, Semantic, SemanticContext};

/// Data produced by semantic actions. Terminal leaves carry their matched
/// text as `Text`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
  Null,
  Bool(bool),
  Number(f64),
  Text(String),
  List(Vec<Value>),
}

impl Value {
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Number(n) => Some(*n),
      Self::Text(s) => s.trim().parse().ok(),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Self::Null)
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => Ok(()),
      Self::Bool(b) => write!(f, "{}", b),
      Self::Number(n) => write!(f, "{}", n),
      Self::Text(s) => write!(f, "{}", s),
      Self::List(items) => {
        for (idx, item) in items.iter().enumerate() {
          if idx > 0 {
            write!(f, ",")?;
          }
          write!(f, "{}", item)?;
        }
        Ok(())
      }
    }
  }
}

impl From<f64> for Value {
  fn from(n: f64) -> Self {
    Self::Number(n)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Self::Bool(b)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Self::Text(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Self::Text(s)
  }
}

impl From<Vec<Value>> for Value {
  fn from(v: Vec<Value>) -> Self {
    Self::List(v)
  }
}

/// One materialized interpretation of a span
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeResult {
  pub data: Value,
  pub weight: f64,
  pub txt: String,
  pub start: Pos,
  pub end: Pos,
}

impl NodeResult {
  pub fn new(data: Value, weight: f64, txt: String, start: Pos, end: Pos) -> Self {
    Self {
      data,
      weight,
      txt,
      start,
      end,
    }
  }

  /// A terminal leaf: its data is the matched text
  pub fn leaf(text: &str, start: Pos, end: Pos) -> Self {
    Self::new(Value::from(text), 1.0, format!("\"{}\"", text), start, end)
  }
}

impl fmt::Display for NodeResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "NodeResult[{}-{}]({}, {}, {})",
      self.start, self.end, self.data, self.weight, self.txt
    )
  }
}

/// The results for the rhs symbols left of the dot, in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeResultArgs(Vec<Rc<NodeResult>>);

impl NodeResultArgs {
  pub fn new(args: Vec<Rc<NodeResult>>) -> Self {
    Self(args)
  }

  pub fn args(&self) -> &[Rc<NodeResult>] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Extends these args by each of `next` in turn, one new args list per
  /// element
  pub fn multiply(&self, next: &[Rc<NodeResult>]) -> Vec<NodeResultArgs> {
    next
      .iter()
      .map(|nr| {
        let mut args = Vec::with_capacity(self.0.len() + 1);
        args.extend(self.0.iter().cloned());
        args.push(nr.clone());
        Self(args)
      })
      .collect()
  }

  /// Reduces the args through a rule's semantic action.
  ///
  /// Weight defaults to the product of the child weights times `weight`,
  /// txt to `lhs(child.txt, ...)`. An action that returns
  /// `Reduction::Node` may override either.
  pub fn apply(
    &self,
    semantic: Option<&Semantic>,
    weight: f64,
    lhs: &str,
    start: Pos,
    end: Pos,
  ) -> NodeResult {
    let default_weight = self.0.iter().map(|nr| nr.weight).product::<f64>() * weight;
    let default_txt = format!(
      "{}({})",
      lhs,
      self.0.iter().map(|nr| nr.txt.as_str()).collect::<Vec<_>>().join(", ")
    );
    let data = self.0.iter().map(|nr| nr.data.clone()).collect::<Vec<_>>();

    let reduction = match semantic {
      Some(semantic) => {
        let ctx = SemanticContext {
          lhs,
          start,
          end,
          children: &self.0,
        };
        semantic.call(&ctx, &data)
      }
      None => Reduction::Value(Self::passthrough(data)),
    };

    match reduction {
      Reduction::Value(data) => NodeResult::new(data, default_weight, default_txt, start, end),
      Reduction::Node { data, weight, txt } => NodeResult::new(
        data,
        weight.unwrap_or(default_weight),
        txt.unwrap_or(default_txt),
        start,
        end,
      ),
    }
  }

  /// What a rule without an action produces
  fn passthrough(mut data: Vec<Value>) -> Value {
    match data.len() {
      0 => Value::Null,
      1 => data.remove(0),
      _ => Value::List(data),
    }
  }
}

impl fmt::Display for NodeResultArgs {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "NodeResultArgs(")?;
    for (idx, nr) in self.0.iter().enumerate() {
      if idx > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}", nr)?;
    }
    write!(f, ")")
  }
}
