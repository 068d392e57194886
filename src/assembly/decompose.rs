//! Decomposition of sequences into literal runs and tandem repeats.
//!
//! A sequence is scanned left to right.  As soon as the last `u` bases
//! (1 <= u <= 6) have repeated five times, the repeat is extended as far as
//! the pattern continues and emitted as a [`RepeatNode`] holding whole units
//! only.  Everything in between becomes [`LiteralNode`]s.  A post-pass
//! coalesces longer satellites that the scan split into alternating node
//! pairs.  Concatenating all nodes always yields the input sequence.

use std::sync::OnceLock;

use super::sequence::Sequence;

/// Shortest repeat unit found by the scan.
pub const MIN_UNIT_LEN: usize = 1;
/// Longest repeat unit found by the scan.
pub const MAX_UNIT_LEN: usize = 6;
/// Number of consecutive copies needed for a repeat.
pub const MIN_REPEAT_COUNT: usize = 5;

/// A run of bases without tandem structure.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralNode {
    /// Offset in the decomposed sequence.
    pub start: usize,
    pub seq: Sequence,
}

/// Whole copies of a repeat unit.
#[derive(Debug, Clone)]
pub struct RepeatNode {
    start: usize,
    unit_len: usize,
    seq: Sequence,
    support_depth: usize,
    quality: OnceLock<f64>,
}

impl PartialEq for RepeatNode {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.unit_len == other.unit_len
            && self.seq == other.seq
            && self.support_depth == other.support_depth
    }
}

impl RepeatNode {
    /// Construct from the repeat bases; `seq` must hold whole units.
    pub fn new(seq: Sequence, start: usize, unit_len: usize, support_depth: usize) -> Self {
        debug_assert!(unit_len > 0 && seq.len() % unit_len == 0);
        Self {
            start,
            unit_len,
            seq,
            support_depth,
            quality: OnceLock::new(),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.start + self.seq.len()
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn unit_len(&self) -> usize {
        self.unit_len
    }

    pub fn unit(&self) -> &[u8] {
        &self.seq.bases()[..self.unit_len]
    }

    pub fn count(&self) -> usize {
        self.seq.len() / self.unit_len
    }

    pub fn seq(&self) -> &Sequence {
        &self.seq
    }

    pub fn support_depth(&self) -> usize {
        self.support_depth
    }

    /// Mean base quality times support depth, computed on first access.
    pub fn quality(&self) -> f64 {
        *self
            .quality
            .get_or_init(|| self.seq.mean_quality() * self.support_depth as f64)
    }

    /// Consume `consumed` bases of the repeat and return nodes for the rest.
    ///
    /// The remainder is re-phased to the rotation of the unit at the cut.
    /// Bases of `following` that continue the pattern are folded back into
    /// the repeat as long as they complete whole units.  A remainder of
    /// fewer than [`MIN_REPEAT_COUNT`] units becomes a literal.  The output
    /// covers exactly the remaining repeat bases followed by `following`.
    pub fn shift(&self, consumed: usize, following: Option<&LiteralNode>) -> Vec<Node> {
        let consumed = consumed.min(self.len());
        let rotation = consumed % self.unit_len;
        let rotated = self.unit()[rotation..]
            .iter()
            .chain(self.unit()[..rotation].iter())
            .copied()
            .collect::<Vec<_>>();

        let mut rest = self.seq.slice(consumed, self.len());
        if let Some(following) = following {
            rest.extend_from(&following.seq);
        }
        let mut matched = self.len() - consumed;
        while matched < rest.len() && rest.bases()[matched] == rotated[matched % self.unit_len] {
            matched += 1;
        }
        let repeat_len = match matched / self.unit_len {
            count if count >= MIN_REPEAT_COUNT => count * self.unit_len,
            _ => 0,
        };

        let mut result = Vec::new();
        if repeat_len > 0 {
            result.push(Node::Repeat(RepeatNode::new(
                rest.slice(0, repeat_len),
                self.start + consumed,
                self.unit_len,
                self.support_depth,
            )));
        }
        if repeat_len < rest.len() {
            result.push(Node::Literal(LiteralNode {
                start: self.start + consumed + repeat_len,
                seq: rest.slice(repeat_len, rest.len()),
            }));
        }
        result
    }
}

/// One unit of a decomposed sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(LiteralNode),
    Repeat(RepeatNode),
}

impl Node {
    pub fn seq(&self) -> &Sequence {
        match self {
            Node::Literal(literal) => &literal.seq,
            Node::Repeat(repeat) => repeat.seq(),
        }
    }

    pub fn start(&self) -> usize {
        match self {
            Node::Literal(literal) => literal.start,
            Node::Repeat(repeat) => repeat.start(),
        }
    }

    pub fn len(&self) -> usize {
        self.seq().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq().is_empty()
    }

    pub fn end(&self) -> usize {
        self.start() + self.len()
    }

    pub fn as_repeat(&self) -> Option<&RepeatNode> {
        match self {
            Node::Repeat(repeat) => Some(repeat),
            Node::Literal(_) => None,
        }
    }
}

/// A sequence split into nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    nodes: Vec<Node>,
    len: usize,
}

impl Decomposition {
    /// Decompose `seq`, each repeat counting as supported once.
    pub fn new(seq: &Sequence) -> Self {
        Self {
            nodes: decompose(seq, &[]),
            len: seq.len(),
        }
    }

    /// Decompose `seq` with the support depth of each repeat taken from the
    /// read spans (`start..end` within `seq`) fully covering it.
    pub fn with_support(seq: &Sequence, spans: &[(usize, usize)]) -> Self {
        Self {
            nodes: decompose(seq, spans),
            len: seq.len(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Concatenation of all nodes.
    pub fn to_sequence(&self) -> Sequence {
        let mut result = Sequence::default();
        for node in &self.nodes {
            result.extend_from(node.seq());
        }
        result
    }
}

fn decompose(seq: &Sequence, spans: &[(usize, usize)]) -> Vec<Node> {
    let bases = seq.bases();
    let n = bases.len();
    let mut nodes = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;
    while i < n {
        if let Some(unit_len) = find_repeat_ending_at(bases, literal_start, i + 1) {
            let repeat_start = i + 1 - unit_len * MIN_REPEAT_COUNT;
            let mut j = i + 1;
            while j < n && bases[j] == bases[j - unit_len] {
                j += 1;
            }
            let repeat_end = repeat_start + ((j - repeat_start) / unit_len) * unit_len;
            if repeat_start > literal_start {
                nodes.push(literal(seq, literal_start, repeat_start));
            }
            nodes.push(Node::Repeat(RepeatNode::new(
                seq.slice(repeat_start, repeat_end),
                repeat_start,
                unit_len,
                1,
            )));
            // partial unit and the breaking base seed the next literal
            literal_start = repeat_end;
            i = j;
        } else {
            i += 1;
        }
    }
    if literal_start < n {
        nodes.push(literal(seq, literal_start, n));
    }

    let nodes = coalesce_satellites(nodes);
    if spans.is_empty() {
        nodes
    } else {
        nodes
            .into_iter()
            .map(|node| match node {
                Node::Repeat(repeat) => {
                    let depth = spans
                        .iter()
                        .filter(|(start, end)| *start <= repeat.start() && repeat.end() <= *end)
                        .count();
                    Node::Repeat(RepeatNode::new(
                        repeat.seq,
                        repeat.start,
                        repeat.unit_len,
                        depth,
                    ))
                }
                literal => literal,
            })
            .collect()
    }
}

fn literal(seq: &Sequence, start: usize, end: usize) -> Node {
    Node::Literal(LiteralNode {
        start,
        seq: seq.slice(start, end),
    })
}

/// Smallest unit length whose five copies end at `end` without reaching
/// before `literal_start`.
fn find_repeat_ending_at(bases: &[u8], literal_start: usize, end: usize) -> Option<usize> {
    (MIN_UNIT_LEN..=MAX_UNIT_LEN).find(|&unit_len| {
        let span = unit_len * MIN_REPEAT_COUNT;
        end >= literal_start + span
            && (end - span + unit_len..end).all(|k| bases[k] == bases[k - unit_len])
    })
}

/// Coalesce runs of node blocks (an even number of nodes, more than
/// `MAX_UNIT_LEN` bases) repeating at least `MIN_REPEAT_COUNT` times.
fn coalesce_satellites(mut nodes: Vec<Node>) -> Vec<Node> {
    while let Some((start, period, reps)) = find_satellite(&nodes) {
        let end = start + period * reps;
        let mut seq = Sequence::default();
        for node in &nodes[start..end] {
            seq.extend_from(node.seq());
        }
        let unit_len = nodes[start..start + period]
            .iter()
            .map(|node| node.len())
            .sum();
        let merged = RepeatNode::new(seq, nodes[start].start(), unit_len, 1);
        nodes.splice(start..end, std::iter::once(Node::Repeat(merged)));
    }
    nodes
}

fn find_satellite(nodes: &[Node]) -> Option<(usize, usize, usize)> {
    for start in 0..nodes.len() {
        let mut period = 2;
        while start + period * MIN_REPEAT_COUNT <= nodes.len() {
            let block = &nodes[start..start + period];
            let unit_len: usize = block.iter().map(|node| node.len()).sum();
            if unit_len > MAX_UNIT_LEN {
                let unit = block_bases(block);
                let mut reps = 1;
                while start + (reps + 1) * period <= nodes.len()
                    && block_bases(&nodes[start + reps * period..start + (reps + 1) * period])
                        == unit
                {
                    reps += 1;
                }
                if reps >= MIN_REPEAT_COUNT {
                    return Some((start, period, reps));
                }
            }
            period += 2;
        }
    }
    None
}

fn block_bases(block: &[Node]) -> Vec<u8> {
    block
        .iter()
        .flat_map(|node| node.seq().bases().iter().copied())
        .collect()
}
