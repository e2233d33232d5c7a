use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::chart::{Chart, Edge, EdgeId, History, Pos};
use crate::node::{NodeResult, NodeResultArgs};

/// What an edge expands to. Reduced edges produce finished results, open
/// edges the partial argument lists for the symbols left of the dot.
#[derive(Debug, Clone)]
pub enum Expansion {
  Results(Rc<Vec<Rc<NodeResult>>>),
  Args(Rc<Vec<NodeResultArgs>>),
}

impl Expansion {
  fn empty(edge: &Edge) -> Self {
    if edge.is_reduced() {
      Self::Results(Rc::default())
    } else {
      Self::Args(Rc::default())
    }
  }
}

/// Unpacks the derivations stored in a chart into semantic results. Each
/// edge is expanded once and shared by every parent that refers to it.
#[derive(Debug)]
pub struct Forest<'c> {
  chart: &'c Chart,
  memo: HashMap<EdgeId, Expansion>,
  /// edges being expanded, with their depth
  in_progress: HashMap<EdgeId, usize>,
}

impl<'c> Forest<'c> {
  pub fn new(chart: &'c Chart) -> Self {
    Self {
      chart,
      memo: HashMap::new(),
      in_progress: HashMap::new(),
    }
  }

  /// Results of a reduced edge. Open edges have none.
  pub fn results(&mut self, id: EdgeId) -> Vec<Rc<NodeResult>> {
    match self.expand(id) {
      Expansion::Results(results) => results.as_ref().clone(),
      Expansion::Args(_) => Vec::new(),
    }
  }

  /// Expands `id` without recursing, so arbitrarily deep derivations don't
  /// grow the call stack. Each frame on `stack` is an edge whose histories
  /// are being combined, and `value` carries a finished expansion back down
  /// to the frame that asked for it.
  pub fn expand(&mut self, id: EdgeId) -> Expansion {
    let chart = self.chart;
    let mut stack = Vec::new();
    let mut value = self.visit(id, 0, &mut stack);
    while let Some(frame) = stack.last_mut() {
      if let Some((expansion, cut)) = value.take() {
        frame.receive(expansion, cut);
      }
      match frame.next_dependency(chart) {
        Some(dependency) => {
          let depth = frame.depth + 1;
          value = self.visit(dependency, depth, &mut stack);
        }
        None => {
          if let Some(frame) = stack.pop() {
            value = Some(self.finish(frame));
          }
        }
      }
    }
    match value {
      Some((expansion, _)) => expansion,
      None => Expansion::empty(chart.edge(id)),
    }
  }

  /// Either a finished expansion of `id` and the smallest depth of an
  /// in-progress edge that was cut off while computing it, or `None` after
  /// pushing a frame that will compute it.
  ///
  /// A result computed while an ancestor was cut off is incomplete, so it
  /// is handed to its parent but never memoized.
  fn visit(&mut self, id: EdgeId, depth: usize, stack: &mut Vec<Frame<'c>>) -> Option<(Expansion, usize)> {
    if let Some(expansion) = self.memo.get(&id) {
      return Some((expansion.clone(), usize::MAX));
    }
    let chart = self.chart;
    let edge = chart.edge(id);

    if let Some(&cut) = self.in_progress.get(&id) {
      trace!("cycle through {} {}", id, edge);
      return Some((Expansion::empty(edge), cut));
    }

    if edge.is_predicted() {
      let expansion = if edge.is_reduced() {
        Expansion::Results(Rc::new(vec![Rc::new(apply(edge, &NodeResultArgs::default()))]))
      } else {
        Expansion::Args(Rc::new(vec![NodeResultArgs::default()]))
      };
      self.memo.insert(id, expansion.clone());
      return Some((expansion, usize::MAX));
    }

    self.in_progress.insert(id, depth);
    stack.push(Frame {
      id,
      edge,
      depth,
      histories: chart.filtered_history(id),
      next: 0,
      opens: None,
      args: Vec::new(),
      min_cut: usize::MAX,
    });
    None
  }

  fn finish(&mut self, frame: Frame<'c>) -> (Expansion, usize) {
    self.in_progress.remove(&frame.id);
    let edge = frame.edge;
    let expansion = if edge.is_reduced() {
      let results = frame.args.iter().map(|a| Rc::new(apply(edge, a))).collect::<Vec<_>>();
      Expansion::Results(Rc::new(results))
    } else {
      Expansion::Args(Rc::new(frame.args))
    };

    if frame.min_cut >= frame.depth {
      self.memo.insert(frame.id, expansion.clone());
      (expansion, usize::MAX)
    } else {
      (expansion, frame.min_cut)
    }
  }
}

fn apply(edge: &Edge, args: &NodeResultArgs) -> NodeResult {
  args.apply(
    edge.rule.semantic.as_ref(),
    edge.rule.weight,
    edge.lhs(),
    edge.start,
    edge.end,
  )
}

/// An edge whose derivations are being combined, one history at a time.
/// For each history the open side is expanded first, then the closed side.
#[derive(Debug)]
struct Frame<'c> {
  id: EdgeId,
  edge: &'c Edge,
  depth: usize,
  histories: Vec<&'c History>,
  /// index of the history being combined
  next: usize,
  /// expansion of the current history's open edge, once known
  opens: Option<Rc<Vec<NodeResultArgs>>>,
  args: Vec<NodeResultArgs>,
  min_cut: usize,
}

impl<'c> Frame<'c> {
  /// The edge whose expansion the current history still needs. Histories
  /// with nothing left to expand are combined on the way.
  fn next_dependency(&mut self, chart: &'c Chart) -> Option<EdgeId> {
    while let Some(&history) = self.histories.get(self.next) {
      let Some(open) = history.open else {
        self.next += 1;
        continue;
      };
      let Some(opens) = self.opens.clone() else {
        return Some(open);
      };
      match (&history.term_match, history.closed) {
        (Some(texts), _) => {
          let start = match chart.edge(open).end {
            Pos::At(pos) => Pos::At(pos),
            Pos::Any => self.edge.start,
          };
          let leaves = texts
            .iter()
            .map(|text| Rc::new(NodeResult::leaf(text, start, self.edge.end)))
            .collect::<Vec<_>>();
          self.combine(&opens, &leaves);
        }
        (None, Some(closed)) => return Some(closed),
        (None, None) => self.combine(&opens, &[]),
      }
    }
    None
  }

  /// Takes the expansion asked for by `next_dependency`
  fn receive(&mut self, expansion: Expansion, cut: usize) {
    self.min_cut = self.min_cut.min(cut);
    match self.opens.clone() {
      None => {
        self.opens = Some(match expansion {
          Expansion::Args(args) => args,
          Expansion::Results(_) => Rc::default(),
        });
      }
      Some(opens) => {
        let closed = match expansion {
          Expansion::Results(results) => results,
          Expansion::Args(_) => Rc::default(),
        };
        self.combine(&opens, &closed);
      }
    }
  }

  fn combine(&mut self, opens: &[NodeResultArgs], closed: &[Rc<NodeResult>]) {
    self.args.extend(opens.iter().flat_map(|a| a.multiply(closed)));
    self.opens = None;
    self.next += 1;
  }
}
