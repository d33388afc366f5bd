use crate::core::models::shape::ConfShape;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("Flat index {index} is out of range for a vector of {len} floats")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Flat vector has {actual} values but the configuration expects {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// The hierarchical entry a flat scalar belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Ligand(usize),
    Residue(usize),
}

impl Owner {
    pub fn kind(&self) -> &'static str {
        match self {
            Owner::Ligand(_) => "ligand",
            Owner::Residue(_) => "residue",
        }
    }

    pub fn entry(&self) -> usize {
        match *self {
            Owner::Ligand(i) | Owner::Residue(i) => i,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.entry())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Position,
    Orientation,
    Torsion,
}

impl Component {
    pub fn name(&self) -> &'static str {
        match self {
            Component::Position => "position",
            Component::Orientation => "orientation",
            Component::Torsion => "torsion",
        }
    }
}

/// A resolved flat index: where the scalar lives and which node it perturbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatSlot {
    pub index: usize,
    pub owner: Owner,
    pub component: Component,
    /// Offset inside the component (0..3 for position, 0..4 or 0..3 for
    /// orientation, torsion number for torsions).
    pub offset: usize,
    pub node: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    start: usize,
    width: usize,
    owner: Owner,
    component: Component,
    first_node: usize,
}

impl Segment {
    fn end(&self) -> usize {
        self.start + self.width
    }

    fn slot(&self, offset: usize) -> FlatSlot {
        let node = match self.component {
            Component::Torsion => self.first_node + offset,
            Component::Position | Component::Orientation => self.first_node,
        };
        FlatSlot {
            index: self.start + offset,
            owner: self.owner,
            component: self.component,
            offset,
            node,
        }
    }
}

/// Tagged range table over the canonical flat ordering.
///
/// For each ligand: 3 position scalars, the orientation scalars, then its
/// torsions; then each residue's torsions. A ligand's rigid body is one node
/// followed by one node per torsion; a residue contributes one node per torsion.
/// Empty ranges are not stored, so every index maps to exactly one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatLayout {
    segments: Vec<Segment>,
    len: usize,
    num_nodes: usize,
}

fn push_segment(
    segments: &mut Vec<Segment>,
    start: &mut usize,
    width: usize,
    owner: Owner,
    component: Component,
    first_node: usize,
) {
    if width > 0 {
        segments.push(Segment {
            start: *start,
            width,
            owner,
            component,
            first_node,
        });
        *start += width;
    }
}

impl FlatLayout {
    pub fn new(shape: &ConfShape, orientation_width: usize) -> Self {
        let mut segments = Vec::new();
        let mut start = 0;
        let mut node = 0;

        for (i, &torsions) in shape.ligand_torsions.iter().enumerate() {
            let owner = Owner::Ligand(i);
            push_segment(&mut segments, &mut start, 3, owner, Component::Position, node);
            push_segment(
                &mut segments,
                &mut start,
                orientation_width,
                owner,
                Component::Orientation,
                node,
            );
            push_segment(
                &mut segments,
                &mut start,
                torsions,
                owner,
                Component::Torsion,
                node + 1,
            );
            node += 1 + torsions;
        }

        for (i, &torsions) in shape.residue_torsions.iter().enumerate() {
            push_segment(
                &mut segments,
                &mut start,
                torsions,
                Owner::Residue(i),
                Component::Torsion,
                node,
            );
            node += torsions;
        }

        Self {
            segments,
            len: start,
            num_nodes: node,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn locate(&self, index: usize) -> Result<FlatSlot, ProjectionError> {
        if index >= self.len {
            return Err(ProjectionError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        let pos = self.segments.partition_point(|s| s.end() <= index);
        let segment = &self.segments[pos];
        Ok(segment.slot(index - segment.start))
    }

    /// All slots in flat order.
    pub fn slots(&self) -> impl Iterator<Item = FlatSlot> + '_ {
        self.segments
            .iter()
            .flat_map(|segment| (0..segment.width).map(move |offset| segment.slot(offset)))
    }
}
