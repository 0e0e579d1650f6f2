//! Continuity chains: codes linked by predecessor/successor references
//! anywhere in a registry's history.
//!
//! Codes are interned into dense ids and grouped with a union-find over a
//! parent arena. Links may arrive in any order; two groups built separately
//! merge as soon as a link between them shows up.

use std::{cmp::Ordering, collections::HashMap};

use crate::{certification::ContinuityEntry, period::Window};

type CodeId = u32;

/// Accumulates codes, their windows, and the links between them.
#[derive(Debug, Default)]
pub struct ContinuityBuilder {
  ids:     HashMap<String, CodeId>,
  codes:   Vec<String>,
  windows: Vec<Option<Window>>,
  parent:  Vec<CodeId>,
  rank:    Vec<u8>,
}

impl ContinuityBuilder {
  pub fn new() -> Self { Self::default() }

  fn intern(&mut self, code: &str) -> CodeId {
    if let Some(&id) = self.ids.get(code) {
      return id;
    }
    let id = self.codes.len() as CodeId;
    self.ids.insert(code.to_owned(), id);
    self.codes.push(code.to_owned());
    self.windows.push(None);
    self.parent.push(id);
    self.rank.push(0);
    id
  }

  /// Register a code with its own validity window.
  pub fn add_code(&mut self, code: &str, window: Window) {
    let id = self.intern(code);
    self.windows[id as usize] = Some(window);
  }

  /// Record that `a` and `b` belong to the same lineage.
  pub fn link(&mut self, a: &str, b: &str) {
    let a = self.intern(a);
    let b = self.intern(b);
    self.union(a, b);
  }

  fn find(&mut self, mut id: CodeId) -> CodeId {
    while self.parent[id as usize] != id {
      let grandparent = self.parent[self.parent[id as usize] as usize];
      self.parent[id as usize] = grandparent;
      id = grandparent;
    }
    id
  }

  fn union(&mut self, a: CodeId, b: CodeId) {
    let (ra, rb) = (self.find(a), self.find(b));
    if ra == rb {
      return;
    }
    let (low, high) = match self.rank[ra as usize].cmp(&self.rank[rb as usize]) {
      Ordering::Less => (ra, rb),
      Ordering::Greater => (rb, ra),
      Ordering::Equal => {
        self.rank[ra as usize] += 1;
        (rb, ra)
      }
    };
    self.parent[low as usize] = high;
  }

  /// Freeze the groups into a lookup index with each group's members already
  /// in chain order.
  pub fn finish(mut self) -> ContinuityIndex {
    let mut groups: HashMap<CodeId, Vec<CodeId>> = HashMap::new();
    for id in 0..self.codes.len() as CodeId {
      let root = self.find(id);
      groups.entry(root).or_default().push(id);
    }

    let mut members = Vec::with_capacity(groups.len());
    let mut group_of = vec![0usize; self.codes.len()];
    for (_, mut group) in groups {
      group.sort_by(|&a, &b| {
        let start_a = self.windows[a as usize].and_then(|w| w.start);
        let start_b = self.windows[b as usize].and_then(|w| w.start);
        chain_order(start_a, start_b)
          .then_with(|| self.codes[a as usize].cmp(&self.codes[b as usize]))
      });
      for &id in &group {
        group_of[id as usize] = members.len();
      }
      members.push(group);
    }

    ContinuityIndex {
      ids: self.ids,
      codes: self.codes,
      windows: self.windows,
      group_of,
      members,
    }
  }
}

/// Known dates ascending, unknown dates last.
fn chain_order(
  a: Option<chrono::DateTime<chrono::Utc>>,
  b: Option<chrono::DateTime<chrono::Utc>>,
) -> Ordering {
  match (a, b) {
    (Some(a), Some(b)) => a.cmp(&b),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
}

/// Read-only view of the continuity groups of one registry.
#[derive(Debug)]
pub struct ContinuityIndex {
  ids:      HashMap<String, CodeId>,
  codes:    Vec<String>,
  windows:  Vec<Option<Window>>,
  group_of: Vec<usize>,
  members:  Vec<Vec<CodeId>>,
}

impl ContinuityIndex {
  /// The ordered chain `code` belongs to, with `current` set on `code`.
  ///
  /// A code the index has never seen forms a chain of its own.
  pub fn chain(&self, code: &str) -> Vec<ContinuityEntry> {
    let Some(&id) = self.ids.get(code) else {
      return vec![ContinuityEntry {
        code:    code.to_owned(),
        start:   None,
        end:     None,
        current: true,
      }];
    };
    self.members[self.group_of[id as usize]]
      .iter()
      .map(|&member| {
        let window = self.windows[member as usize].unwrap_or_default();
        ContinuityEntry {
          code:    self.codes[member as usize].clone(),
          start:   window.start,
          end:     window.end,
          current: member == id,
        }
      })
      .collect()
  }

  pub fn len(&self) -> usize { self.codes.len() }

  pub fn is_empty(&self) -> bool { self.codes.is_empty() }
}
