use super::rigid::{RigidBlock, RigidChange};
use super::shape::ConfShape;
use crate::core::projection::{Component, FlatSlot, FlatVector, Owner};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LigandChange {
    pub rigid: RigidChange,
    pub torsions: Vec<f64>,
}

impl LigandChange {
    pub fn new(rigid: RigidChange, torsions: Vec<f64>) -> Self {
        Self { rigid, torsions }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResidueChange {
    pub torsions: Vec<f64>,
}

impl ResidueChange {
    pub fn new(torsions: Vec<f64>) -> Self {
        Self { torsions }
    }
}

/// Differential (or gradient) counterpart of a [`Conf`](super::conf::Conf).
///
/// Rigid blocks carry a 3-component rotation vector instead of a quaternion,
/// so each ligand spans `6 + torsions` flat scalars.
#[derive(Debug, Clone, Default)]
pub struct Change {
    pub ligands: Vec<LigandChange>,
    pub residues: Vec<ResidueChange>,
}

impl Change {
    pub fn new(ligands: Vec<LigandChange>, residues: Vec<ResidueChange>) -> Self {
        Self { ligands, residues }
    }

    pub fn zeroed(shape: &ConfShape) -> Self {
        Self {
            ligands: shape
                .ligand_torsions
                .iter()
                .map(|&n| LigandChange::new(RigidChange::default(), vec![0.0; n]))
                .collect(),
            residues: shape
                .residue_torsions
                .iter()
                .map(|&n| ResidueChange::new(vec![0.0; n]))
                .collect(),
        }
    }

    pub fn set_to_zero(&mut self) {
        for ligand in &mut self.ligands {
            ligand.rigid = RigidChange::default();
            ligand.torsions.iter_mut().for_each(|t| *t = 0.0);
        }
        for residue in &mut self.residues {
            residue.torsions.iter_mut().for_each(|t| *t = 0.0);
        }
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }
}

impl FlatVector for Change {
    const ORIENTATION_WIDTH: usize = RigidChange::ORIENTATION_WIDTH;

    fn shape(&self) -> ConfShape {
        ConfShape::new(
            self.ligands.iter().map(|l| l.torsions.len()).collect(),
            self.residues.iter().map(|r| r.torsions.len()).collect(),
        )
    }

    fn slot_value(&self, slot: &FlatSlot) -> f64 {
        match slot.owner {
            Owner::Ligand(i) => {
                let ligand = &self.ligands[i];
                match slot.component {
                    Component::Position => ligand.rigid.component(slot.offset),
                    Component::Orientation => ligand.rigid.component(3 + slot.offset),
                    Component::Torsion => ligand.torsions[slot.offset],
                }
            }
            Owner::Residue(i) => self.residues[i].torsions[slot.offset],
        }
    }

    fn slot_value_mut(&mut self, slot: &FlatSlot) -> &mut f64 {
        match slot.owner {
            Owner::Ligand(i) => {
                let ligand = &mut self.ligands[i];
                match slot.component {
                    Component::Position => ligand.rigid.component_mut(slot.offset),
                    Component::Orientation => ligand.rigid.component_mut(3 + slot.offset),
                    Component::Torsion => &mut ligand.torsions[slot.offset],
                }
            }
            Owner::Residue(i) => &mut self.residues[i].torsions[slot.offset],
        }
    }
}

impl PartialEq for Change {
    fn eq(&self, other: &Self) -> bool {
        self.flat_eq(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::ProjectionError;
    use nalgebra::Vector3;

    fn sample_change() -> Change {
        Change::new(
            vec![
                LigandChange::new(
                    RigidChange::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(4.0, 5.0, 6.0)),
                    vec![7.0, 8.0],
                ),
                LigandChange::new(
                    RigidChange::new(Vector3::new(9.0, 10.0, 11.0), Vector3::new(12.0, 13.0, 14.0)),
                    vec![],
                ),
            ],
            vec![ResidueChange::new(vec![15.0]), ResidueChange::new(vec![16.0, 17.0])],
        )
    }

    #[test]
    fn num_floats_uses_three_orientation_components() {
        assert_eq!(sample_change().num_floats(), (6 + 2) + 6 + 1 + 2);
    }

    #[test]
    fn flat_projection_enumerates_values_in_canonical_order() {
        let flat = sample_change().to_flat();
        let expected: Vec<f64> = (1..=17).map(f64::from).collect();
        assert_eq!(flat, expected);
    }

    #[test]
    fn node_indices_follow_rigid_then_torsion_numbering() {
        let change = sample_change();
        let layout = change.layout();
        let nodes: Vec<usize> = (0..layout.len())
            .map(|i| change.get_with_node_idx_in(&layout, i).unwrap().1)
            .collect();
        assert_eq!(
            nodes,
            vec![
                0, 0, 0, 0, 0, 0, 1, 2, // ligand 0
                3, 3, 3, 3, 3, 3, // ligand 1, no torsions
                4, // residue 0
                5, 6, // residue 1
            ]
        );
    }

    #[test]
    fn get_mut_then_get_observes_write() {
        let mut change = sample_change();
        *change.get_mut(4).unwrap() = -1.0;
        assert_eq!(change.get(4), Ok(-1.0));
        assert_eq!(change.ligands[0].rigid.orientation.y, -1.0);
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut change = sample_change();
        assert!(matches!(
            change.get_mut(17),
            Err(ProjectionError::IndexOutOfRange { index: 17, len: 17 })
        ));
    }

    #[test]
    fn zeroed_change_matches_shape_and_has_zero_norm() {
        let shape = sample_change().shape();
        let zero = Change::zeroed(&shape);
        assert_eq!(zero.shape(), shape);
        assert_eq!(zero.norm(), 0.0);
    }

    #[test]
    fn set_to_zero_clears_every_scalar() {
        let mut change = sample_change();
        change.set_to_zero();
        assert!(change.to_flat().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn dot_product_is_sum_over_flat_vector() {
        let change = sample_change();
        let expected: f64 = (1..=17).map(|v| f64::from(v * v)).sum();
        assert_eq!(change.dot(&change), expected);
    }

    #[test]
    fn single_scalar_mutation_breaks_equality() {
        let a = sample_change();
        let mut b = a.clone();
        assert_eq!(a, b);
        *b.get_mut(16).unwrap() = 0.0;
        assert_ne!(a, b);
    }

    #[test]
    fn round_trip_through_flat_vector() {
        let original = sample_change();
        let mut copy = Change::zeroed(&original.shape());
        copy.copy_from_flat(&original.to_flat()).unwrap();
        assert_eq!(copy, original);
    }
}
