use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::rules::Rule;
use crate::symbol::Symbol;
use crate::utils::{Error, Result};

/// A position in the input. `Any` marks floating epsilon derivations seeded
/// by the bottom-up strategies, which may attach anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Pos {
  Any,
  At(usize),
}

impl Pos {
  pub fn is_any(self) -> bool {
    self == Self::Any
  }

  pub fn at(self) -> Option<usize> {
    match self {
      Self::At(n) => Some(n),
      Self::Any => None,
    }
  }
}

impl fmt::Display for Pos {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Any => write!(f, "*"),
      Self::At(n) => write!(f, "{}", n),
    }
  }
}

/// Handle of an edge in the chart's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(usize);

impl EdgeId {
  pub fn index(self) -> usize {
    self.0
  }
}

impl fmt::Display for EdgeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// One way an edge was derived: its dot-1 predecessor plus either the
/// completed edge or the terminal text that moved the dot
#[derive(Debug, Clone, PartialEq)]
pub struct History {
  pub open: Option<EdgeId>,
  pub closed: Option<EdgeId>,
  pub term_match: Option<Vec<String>>,
}

impl History {
  fn same_derivation(&self, other: &History) -> bool {
    self.open == other.open && self.closed == other.closed
  }
}

/// Identity of an edge: the rule (by pointer, rules are deduplicated by the
/// grammar), the dot and the span. History is not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EdgeKey {
  rule: usize,
  dot: usize,
  start: Pos,
  end: Pos,
}

#[derive(Debug, Clone)]
pub struct Edge {
  pub rule: Rc<Rule>,
  pub dot: usize,
  pub start: Pos,
  pub end: Pos,
  pub history: Vec<History>,
}

impl Edge {
  pub fn new(rule: Rc<Rule>, dot: usize, start: Pos, end: Pos) -> Self {
    Self {
      rule,
      dot,
      start,
      end,
      history: Vec::new(),
    }
  }

  fn with_history(mut self, history: History) -> Self {
    self.history.push(history);
    self
  }

  fn key(&self) -> EdgeKey {
    EdgeKey {
      rule: Rc::as_ptr(&self.rule) as usize,
      dot: self.dot,
      start: self.start,
      end: self.end,
    }
  }

  pub fn lhs(&self) -> &str {
    &self.rule.lhs
  }

  pub fn next_symbol(&self) -> Option<&Symbol> {
    self.rule.rhs.get(self.dot)
  }

  /// The symbol after the next one, which an approx terminal needs
  pub fn following_symbol(&self) -> Option<&Symbol> {
    self.rule.rhs.get(self.dot + 1)
  }

  pub fn is_reduced(&self) -> bool {
    self.dot >= self.rule.len()
  }

  pub fn is_predicted(&self) -> bool {
    self.dot == 0
  }

  /// The next symbol is a terminal
  pub fn is_shift(&self) -> bool {
    self.next_symbol().is_some_and(|s| !s.is_nonterminal())
  }

  pub fn is_approx(&self) -> bool {
    self.next_symbol().is_some_and(Symbol::is_approx)
  }

  pub fn is_floating(&self) -> bool {
    self.start.is_any()
  }
}

impl fmt::Display for Edge {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}: {} →", self.start, self.end, self.rule.lhs)?;
    for (idx, s) in self.rule.rhs.iter().enumerate() {
      if idx == self.dot {
        write!(f, " ・")?;
      }
      write!(f, " {}", s)?;
    }
    if self.is_reduced() {
      write!(f, " ・")?;
    }
    Ok(())
  }
}

/// The edge store. `order` is the chart (before `cursor`) followed by the
/// agenda; edges waiting on an approx terminal sit in `next_round` until the
/// approx pass.
#[derive(Debug, Default)]
pub struct Chart {
  edges: Vec<Edge>,
  keys: HashMap<EdgeKey, EdgeId>,
  order: Vec<EdgeId>,
  cursor: usize,
  staged: Vec<EdgeId>,
  next_round: Vec<EdgeId>,
  /// reduced edges by (lhs, start); every reduced edge is also under (lhs, Any)
  reduced: HashMap<(String, Pos), Vec<EdgeId>>,
  floating_reduced: HashMap<String, Vec<EdgeId>>,
  /// open edges by (next nonterminal, end)
  waiting: HashMap<(String, Pos), Vec<EdgeId>>,
  all_waiting: HashMap<String, Vec<EdgeId>>,
}

enum Storage {
  Agenda,
  Staged,
}

impl Chart {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn edge(&self, id: EdgeId) -> &Edge {
    &self.edges[id.0]
  }

  /// Number of distinct edges
  pub fn len(&self) -> usize {
    self.edges.len()
  }

  pub fn is_empty(&self) -> bool {
    self.edges.is_empty()
  }

  /// Edges in chart order, followed by any still deferred to the approx pass
  pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
    self
      .order
      .iter()
      .chain(self.next_round.iter())
      .map(|&id| (id, self.edge(id)))
  }

  pub fn find(&self, edge: &Edge) -> Option<EdgeId> {
    self.keys.get(&edge.key()).copied()
  }

  fn add(&mut self, edge: Edge, storage: Storage) -> Result<EdgeId> {
    if let Some(existing) = self.find(&edge) {
      self.merge_history(existing, edge)?;
      return Ok(existing);
    }

    let id = EdgeId(self.edges.len());
    debug!("adding {} {}", id, edge);
    self.keys.insert(edge.key(), id);

    if edge.is_approx() {
      self.next_round.push(id);
    } else {
      match storage {
        Storage::Agenda => self.order.push(id),
        Storage::Staged => self.staged.push(id),
      }
    }

    if let Some(name) = edge.next_symbol().and_then(Symbol::as_nonterminal) {
      self
        .waiting
        .entry((name.to_string(), edge.end))
        .or_default()
        .push(id);
      self.all_waiting.entry(name.to_string()).or_default().push(id);
    }

    if edge.is_reduced() {
      let lhs = edge.lhs().to_string();
      if edge.is_floating() {
        self.floating_reduced.entry(lhs.clone()).or_default().push(id);
      } else {
        self.reduced.entry((lhs.clone(), edge.start)).or_default().push(id);
      }
      self.reduced.entry((lhs, Pos::Any)).or_default().push(id);
    }

    self.edges.push(edge);
    Ok(id)
  }

  /// Copies the derivations of `from` that `into` doesn't have yet
  pub fn merge_history(&mut self, into: EdgeId, from: Edge) -> Result<()> {
    let target = &mut self.edges[into.0];
    if target.key() != from.key() {
      return Err(Error::HistoryMismatch {
        from: from.to_string(),
        into: target.to_string(),
      });
    }
    for h in from.history {
      if !target.history.iter().any(|t| t.same_derivation(&h)) {
        debug!("merging history into {} {}", into, target);
        target.history.push(h);
      }
    }
    Ok(())
  }

  /// Advances `open` over the completed `closed`, unless an operator
  /// precedence or associativity class forbids it. Returns None when
  /// vetoed.
  pub fn add_from_open_closed(&mut self, open: EdgeId, closed: EdgeId) -> Result<Option<EdgeId>> {
    let (o, c) = (self.edge(open), self.edge(closed));
    if let Some(veto) = o.rule.tags.veto(&c.rule.tags, o.dot, o.rule.len()) {
      debug!("veto by {}: {} over {}", veto, o, c);
      return Ok(None);
    }

    let start = if o.start.is_any() { c.start } else { o.start };
    let end = if c.end.is_any() { o.end } else { c.end };
    let edge = Edge::new(o.rule.clone(), o.dot + 1, start, end).with_history(History {
      open: Some(open),
      closed: Some(closed),
      term_match: None,
    });
    self.add(edge, Storage::Agenda).map(Some)
  }

  pub fn add_predicted(&mut self, rule: &Rc<Rule>, pos: Pos) -> Result<EdgeId> {
    self.add(Edge::new(rule.clone(), 0, pos, pos), Storage::Agenda)
  }

  /// Advances `edge` over a terminal ending at `end`. `start` anchors a
  /// floating edge.
  pub fn add_scanned(
    &mut self,
    edge: EdgeId,
    end: Pos,
    term_match: Vec<String>,
    start: Option<Pos>,
  ) -> Result<EdgeId> {
    let open = self.edge(edge);
    let scanned = Edge::new(
      open.rule.clone(),
      open.dot + 1,
      start.unwrap_or(open.start),
      end,
    )
    .with_history(History {
      open: Some(edge),
      closed: None,
      term_match: Some(term_match),
    });
    self.add(scanned, Storage::Agenda)
  }

  pub fn add_initial(&mut self, rule: &Rc<Rule>, pos: Pos) -> Result<EdgeId> {
    self.add_predicted(rule, pos)
  }

  /// Seeds a rule whose first terminal was already found at `start..end`:
  /// the dot-0 edge goes straight to the chart, the shifted one to the
  /// agenda
  pub fn add_initial_processed(
    &mut self,
    rule: &Rc<Rule>,
    start: usize,
    end: usize,
    term_match: Vec<String>,
  ) -> Result<EdgeId> {
    let open = self.add(
      Edge::new(rule.clone(), 0, Pos::At(start), Pos::At(start)),
      Storage::Staged,
    )?;
    self.add_scanned(open, Pos::At(end), term_match, None)
  }

  /// Moves the staged initial edges into the processed part of the chart
  pub fn parser_initialized(&mut self) {
    let staged = std::mem::take(&mut self.staged);
    self.cursor += staged.len();
    self.order.splice(0..0, staged);
  }

  /// Takes the next agenda edge
  pub fn next(&mut self) -> Option<EdgeId> {
    let id = self.order.get(self.cursor).copied()?;
    self.cursor += 1;
    Some(id)
  }

  pub fn is_agenda_empty(&self) -> bool {
    self.cursor >= self.order.len()
  }

  pub fn agenda_size(&self) -> usize {
    self.order.len() - self.cursor
  }

  pub fn has_next_round(&self) -> bool {
    !self.next_round.is_empty()
  }

  /// Removes the edges deferred for the approx pass; they join the chart
  /// order
  pub fn take_next_round(&mut self) -> Vec<EdgeId> {
    let round = std::mem::take(&mut self.next_round);
    self.order.splice(self.cursor..self.cursor, round.iter().copied());
    self.cursor += round.len();
    round
  }

  /// Reduced edges with this lhs starting at `pos`; `Pos::Any` gives all of
  /// them
  pub fn reduced(&self, lhs: &str, pos: Pos) -> &[EdgeId] {
    self
      .reduced
      .get(&(lhs.to_string(), pos))
      .map_or(&[], Vec::as_slice)
  }

  pub fn floating_reduced(&self, lhs: &str) -> &[EdgeId] {
    self.floating_reduced.get(lhs).map_or(&[], Vec::as_slice)
  }

  /// Open edges whose next symbol is the nonterminal `symbol`, ending at
  /// `pos`
  pub fn waiting(&self, symbol: &str, pos: Pos) -> &[EdgeId] {
    self
      .waiting
      .get(&(symbol.to_string(), pos))
      .map_or(&[], Vec::as_slice)
  }

  pub fn all_waiting(&self, symbol: &str) -> &[EdgeId] {
    self.all_waiting.get(symbol).map_or(&[], Vec::as_slice)
  }

  /// Reduced, anchored entity edges that are not part of another entity
  /// edge's derivation
  pub fn parent_entities(&self) -> Vec<EdgeId> {
    let entities = self
      .edges()
      .filter(|(_, e)| e.rule.entity && e.is_reduced() && !e.is_floating())
      .map(|(id, _)| id)
      .collect::<Vec<_>>();

    let mut marked = vec![false; self.edges.len()];
    let mut stack = Vec::new();
    for &id in entities.iter() {
      stack.extend(self.children(id));
      while let Some(child) = stack.pop() {
        if !marked[child.0] {
          marked[child.0] = true;
          stack.extend(self.children(child));
        }
      }
    }

    let parents = entities
      .into_iter()
      .filter(|id| !marked[id.0])
      .collect::<Vec<_>>();
    debug!("{} parent entities", parents.len());
    parents
  }

  fn children(&self, id: EdgeId) -> impl Iterator<Item = EdgeId> + '_ {
    self
      .edge(id)
      .history
      .iter()
      .flat_map(|h| h.open.into_iter().chain(h.closed))
  }

  fn closed_priority(&self, h: &History) -> Option<i64> {
    h.closed.and_then(|c| self.edge(c).rule.priority)
  }

  /// The derivations of an edge that take part in its results: those whose
  /// closed rule has the highest priority (or none), minus floating
  /// derivations that duplicate an anchored one
  pub fn filtered_history(&self, id: EdgeId) -> Vec<&History> {
    let mut sorted = self.edge(id).history.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| self.closed_priority(b).cmp(&self.closed_priority(a)));
    let max = sorted.first().and_then(|h| self.closed_priority(h));
    let by_priority = sorted
      .into_iter()
      .filter(|h| {
        let p = self.closed_priority(h);
        p.is_none() || p == max
      })
      .collect::<Vec<_>>();

    let anchored = |e: Option<EdgeId>| e.is_some_and(|e| !self.edge(e).is_floating());
    let floating = |e: Option<EdgeId>| e.is_some_and(|e| self.edge(e).is_floating());
    let same_rule = |a: Option<EdgeId>, b: Option<EdgeId>| match (a, b) {
      (Some(a), Some(b)) => Rc::ptr_eq(&self.edge(a).rule, &self.edge(b).rule),
      _ => false,
    };

    by_priority
      .iter()
      .filter(|item| {
        if floating(item.open) {
          !by_priority.iter().any(|h| {
            anchored(h.open) && same_rule(h.open, item.open) && h.closed == item.closed
          })
        } else if floating(item.closed) {
          !by_priority.iter().any(|h| {
            anchored(h.closed) && same_rule(h.closed, item.closed) && h.open == item.open
          })
        } else {
          true
        }
      })
      .copied()
      .collect()
  }
}

impl fmt::Display for Chart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (idx, (id, edge)) in self.edges().enumerate() {
      let marker = if idx < self.cursor { ' ' } else { '>' };
      writeln!(f, "{}{:>6} {}", marker, id.to_string(), edge)?;
    }
    Ok(())
  }
}
