//! Interval tree of time-valid cost intervals.
//!
//! Balanced BST keyed by interval start, augmented with the subtree-max
//! end so that point and range queries run in `O(log n + k)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cost contribution valid over `[start, end]`.
///
/// The identifier is stable across re-receipts of the same phenomenon;
/// aggregation dedupes by it so overlapping observations never double-count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostInterval {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl CostInterval {
    pub fn new(id: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>, cost: f64) -> Self {
        Self {
            id: id.into(),
            start,
            end,
            cost,
            weight: None,
        }
    }

    /// Interval with a generated identifier, for phenomena without a
    /// stable upstream id. Deduplication only helps when re-receipts reuse
    /// the id, so prefer `new` whenever the source provides one.
    pub fn with_generated_id(start: DateTime<Utc>, end: DateTime<Utc>, cost: f64) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), start, end, cost)
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Weighted cost when a weight is present, raw cost otherwise.
    pub fn effective_cost(&self) -> f64 {
        match self.weight {
            Some(w) => self.cost * w,
            None => self.cost,
        }
    }

    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= end && self.end >= start
    }
}

#[derive(Debug, Clone)]
struct Node {
    interval: CostInterval,
    max_end: DateTime<Utc>,
    height: i32,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn new(interval: CostInterval) -> Box<Self> {
        let max_end = interval.end;
        Box::new(Self {
            interval,
            max_end,
            height: 1,
            left: None,
            right: None,
        })
    }
}

fn height(node: &Option<Box<Node>>) -> i32 {
    node.as_ref().map_or(0, |n| n.height)
}

fn max_end(node: &Option<Box<Node>>) -> Option<DateTime<Utc>> {
    node.as_ref().map(|n| n.max_end)
}

fn update(node: &mut Box<Node>) {
    node.height = 1 + height(&node.left).max(height(&node.right));
    node.max_end = node.interval.end;
    if let Some(m) = max_end(&node.left) {
        node.max_end = node.max_end.max(m);
    }
    if let Some(m) = max_end(&node.right) {
        node.max_end = node.max_end.max(m);
    }
}

fn rotate_right(mut node: Box<Node>) -> Box<Node> {
    let mut left = node.left.take().expect("left child");
    node.left = left.right.take();
    update(&mut node);
    left.right = Some(node);
    update(&mut left);
    left
}

fn rotate_left(mut node: Box<Node>) -> Box<Node> {
    let mut right = node.right.take().expect("right child");
    node.right = right.left.take();
    update(&mut node);
    right.left = Some(node);
    update(&mut right);
    right
}

fn balance(mut node: Box<Node>) -> Box<Node> {
    update(&mut node);
    let factor = height(&node.left) - height(&node.right);
    if factor > 1 {
        if height(&node.left.as_ref().unwrap().left) < height(&node.left.as_ref().unwrap().right) {
            node.left = Some(rotate_left(node.left.take().unwrap()));
        }
        node = rotate_right(node);
    } else if factor < -1 {
        if height(&node.right.as_ref().unwrap().right)
            < height(&node.right.as_ref().unwrap().left)
        {
            node.right = Some(rotate_right(node.right.take().unwrap()));
        }
        node = rotate_left(node);
    }
    node
}

fn insert(node: Option<Box<Node>>, interval: CostInterval) -> Box<Node> {
    match node {
        None => Node::new(interval),
        Some(mut n) => {
            if (interval.start, &interval.id) < (n.interval.start, &n.interval.id) {
                n.left = Some(insert(n.left.take(), interval));
            } else {
                n.right = Some(insert(n.right.take(), interval));
            }
            balance(n)
        }
    }
}

fn take_min(mut node: Box<Node>) -> (Box<Node>, Option<Box<Node>>) {
    if node.left.is_none() {
        let right = node.right.take();
        return (node, right);
    }
    let (min, rest) = take_min(node.left.take().unwrap());
    node.left = rest;
    (min, Some(balance(node)))
}

fn remove(node: Option<Box<Node>>, target: &CostInterval, removed: &mut bool) -> Option<Box<Node>> {
    let mut n = node?;
    if !*removed
        && n.interval.id == target.id
        && n.interval.start == target.start
        && n.interval.end == target.end
    {
        *removed = true;
        return match (n.left.take(), n.right.take()) {
            (None, r) => r,
            (l, None) => l,
            (l, Some(r)) => {
                let (mut successor, rest) = take_min(r);
                successor.left = l;
                successor.right = rest;
                Some(balance(successor))
            }
        };
    }
    if (target.start, &target.id) < (n.interval.start, &n.interval.id) {
        n.left = remove(n.left.take(), target, removed);
    } else {
        // equal keys may sit on either side after rotations; check both
        n.right = remove(n.right.take(), target, removed);
        if !*removed {
            n.left = remove(n.left.take(), target, removed);
        }
    }
    Some(balance(n))
}

fn search<'a>(
    node: &'a Option<Box<Node>>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    out: &mut Vec<&'a CostInterval>,
) {
    let Some(n) = node else {
        return;
    };
    if n.max_end < start {
        return;
    }
    search(&n.left, start, end, out);
    if n.interval.overlaps(start, end) {
        out.push(&n.interval);
    }
    if n.interval.start <= end {
        search(&n.right, start, end, out);
    }
}

fn visit<'a>(node: &'a Option<Box<Node>>, out: &mut Vec<&'a CostInterval>) {
    if let Some(n) = node {
        visit(&n.left, out);
        out.push(&n.interval);
        visit(&n.right, out);
    }
}

/// Interval tree of cost intervals.
#[derive(Debug, Clone, Default)]
pub struct IntervalTree {
    root: Option<Box<Node>>,
    len: usize,
}

impl IntervalTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn add(&mut self, interval: CostInterval) {
        self.root = Some(insert(self.root.take(), interval));
        self.len += 1;
    }

    /// Remove an interval matching on id, start and end.
    pub fn remove(&mut self, interval: &CostInterval) -> bool {
        let mut removed = false;
        self.root = remove(self.root.take(), interval, &mut removed);
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Remove every interval carrying the given id.
    pub fn remove_by_id(&mut self, id: &str) -> usize {
        let matching: Vec<CostInterval> = self
            .iter()
            .filter(|i| i.id == id)
            .cloned()
            .collect();
        let mut count = 0;
        for interval in &matching {
            if self.remove(interval) {
                count += 1;
            }
        }
        count
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    /// Intervals containing the instant `t`.
    pub fn search_point(&self, t: DateTime<Utc>) -> Vec<&CostInterval> {
        self.search_range(t, t)
    }

    /// Intervals intersecting `[start, end]`.
    pub fn search_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&CostInterval> {
        let mut out = Vec::new();
        search(&self.root, start, end, &mut out);
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &CostInterval> {
        let mut out = Vec::with_capacity(self.len);
        visit(&self.root, &mut out);
        out.into_iter()
    }

    /// Aggregate cost over `[start, end]`: overlapping intervals are
    /// collected, deduplicated by id (first encounter wins) and summed.
    pub fn accumulate_cost(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        let mut seen = std::collections::HashSet::new();
        let mut cost = 0.0;
        for interval in self.search_range(start, end) {
            if seen.insert(interval.id.as_str()) {
                cost += interval.effective_cost();
            }
        }
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap()
    }

    fn tree_with(intervals: &[(&str, u32, u32, f64)]) -> IntervalTree {
        let mut tree = IntervalTree::new();
        for (id, s, e, c) in intervals {
            tree.add(CostInterval::new(*id, at(*s), at(*e), *c));
        }
        tree
    }

    #[test]
    fn point_query_finds_containing_intervals() {
        let tree = tree_with(&[("a", 1, 4, 10.0), ("b", 3, 6, 20.0), ("c", 8, 9, 5.0)]);
        let hits = tree.search_point(at(3));
        let ids: Vec<&str> = hits.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a") && ids.contains(&"b"));
    }

    #[test]
    fn range_query_finds_intersecting_intervals() {
        let tree = tree_with(&[("a", 1, 2, 1.0), ("b", 5, 6, 1.0), ("c", 9, 10, 1.0)]);
        let hits = tree.search_range(at(2), at(5));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn accumulate_dedupes_shared_ids() {
        // two observations of the same phenomenon must count once
        let duplicated = tree_with(&[("wx-1", 1, 5, 100.0), ("wx-1", 2, 6, 100.0)]);
        let single = tree_with(&[("wx-1", 1, 5, 100.0)]);
        assert_eq!(
            duplicated.accumulate_cost(at(2), at(4)),
            single.accumulate_cost(at(2), at(4))
        );
    }

    #[test]
    fn weighted_cost_applies() {
        let mut tree = IntervalTree::new();
        tree.add(CostInterval::new("w", at(0), at(10), 40.0).with_weight(0.5));
        assert_eq!(tree.accumulate_cost(at(1), at(2)), 20.0);
    }

    #[test]
    fn remove_keeps_queries_consistent() {
        let mut tree = tree_with(&[("a", 1, 4, 1.0), ("b", 2, 3, 2.0), ("c", 5, 7, 3.0)]);
        assert!(tree.remove(&CostInterval::new("b", at(2), at(3), 2.0)));
        assert_eq!(tree.len(), 2);
        assert!(tree.search_point(at(2)).iter().all(|i| i.id != "b"));
        assert_eq!(tree.remove_by_id("a"), 1);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn stays_balanced_under_ordered_inserts() {
        let mut tree = IntervalTree::new();
        for i in 0..128u32 {
            tree.add(CostInterval::new(format!("i{i}"), at(i % 12), at(i % 12 + 10), 1.0));
        }
        assert_eq!(tree.len(), 128);
        assert_eq!(tree.search_range(at(0), at(23)).len(), 128);
    }
}
