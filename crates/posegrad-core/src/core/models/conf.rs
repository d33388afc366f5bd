use super::change::Change;
use super::rigid::{RigidBlock, RigidConf};
use super::shape::ConfShape;
use crate::core::projection::{Component, FlatSlot, FlatVector, Owner};
use crate::core::utils::geometry::{normalize_angle, random_angle};
use nalgebra::Vector3;
use rand::Rng;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LigandConf {
    pub rigid: RigidConf,
    pub torsions: Vec<f64>,
}

impl LigandConf {
    pub fn new(rigid: RigidConf, torsions: Vec<f64>) -> Self {
        Self { rigid, torsions }
    }
}

/// A flexible side chain: torsions only, no rigid-body freedom.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResidueConf {
    pub torsions: Vec<f64>,
}

impl ResidueConf {
    pub fn new(torsions: Vec<f64>) -> Self {
        Self { torsions }
    }
}

/// Full pose state of every ligand and flexible residue.
///
/// Equality is element-wise over the flat projection (see [`FlatVector`]).
#[derive(Debug, Clone, Default)]
pub struct Conf {
    pub ligands: Vec<LigandConf>,
    pub residues: Vec<ResidueConf>,
}

impl Conf {
    pub fn new(ligands: Vec<LigandConf>, residues: Vec<ResidueConf>) -> Self {
        Self { ligands, residues }
    }

    /// Origin positions, identity orientations, zero torsions.
    pub fn from_shape(shape: &ConfShape) -> Self {
        Self {
            ligands: shape
                .ligand_torsions
                .iter()
                .map(|&n| LigandConf::new(RigidConf::default(), vec![0.0; n]))
                .collect(),
            residues: shape
                .residue_torsions
                .iter()
                .map(|&n| ResidueConf::new(vec![0.0; n]))
                .collect(),
        }
    }

    /// Steps the configuration along `change` scaled by `factor`.
    ///
    /// Orientations are rotated by the scaled rotation vector and renormalised;
    /// torsions are wrapped into `(-π, π]`.
    ///
    /// # Panics
    ///
    /// Panics if `change` does not have this configuration's shape.
    pub fn increment(&mut self, change: &Change, factor: f64) {
        assert_eq!(
            self.shape(),
            change.shape(),
            "conformation and change have different shapes"
        );
        for (ligand, delta) in self.ligands.iter_mut().zip(&change.ligands) {
            ligand.rigid.increment(&delta.rigid, factor);
            increment_torsions(&mut ligand.torsions, &delta.torsions, factor);
        }
        for (residue, delta) in self.residues.iter_mut().zip(&change.residues) {
            increment_torsions(&mut residue.torsions, &delta.torsions, factor);
        }
    }

    /// Uniformly resamples positions inside the box spanned by the corners,
    /// orientations over SO(3) and every torsion over `(-π, π]`.
    pub fn randomize<R: Rng + ?Sized>(
        &mut self,
        corner1: &Vector3<f64>,
        corner2: &Vector3<f64>,
        rng: &mut R,
    ) {
        for ligand in &mut self.ligands {
            ligand.rigid.randomize(corner1, corner2, rng);
            ligand.torsions.iter_mut().for_each(|t| *t = random_angle(rng));
        }
        for residue in &mut self.residues {
            residue.torsions.iter_mut().for_each(|t| *t = random_angle(rng));
        }
    }

    pub fn renormalize_orientations(&mut self) {
        for ligand in &mut self.ligands {
            ligand.rigid.renormalize();
        }
    }
}

fn increment_torsions(torsions: &mut [f64], deltas: &[f64], factor: f64) {
    for (t, d) in torsions.iter_mut().zip(deltas) {
        *t = normalize_angle(*t + normalize_angle(factor * d));
    }
}

impl FlatVector for Conf {
    const ORIENTATION_WIDTH: usize = RigidConf::ORIENTATION_WIDTH;

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

impl PartialEq for Conf {
    fn eq(&self, other: &Self) -> bool {
        self.flat_eq(other)
    }
}
