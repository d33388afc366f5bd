/// Torsion counts of every flexible entry in a configuration, in order.
///
/// Two configurations (or a configuration and a change) are compatible exactly
/// when their shapes are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConfShape {
    pub ligand_torsions: Vec<usize>,
    pub residue_torsions: Vec<usize>,
}

impl ConfShape {
    pub fn new(ligand_torsions: Vec<usize>, residue_torsions: Vec<usize>) -> Self {
        Self {
            ligand_torsions,
            residue_torsions,
        }
    }

    pub fn num_ligands(&self) -> usize {
        self.ligand_torsions.len()
    }

    pub fn num_residues(&self) -> usize {
        self.residue_torsions.len()
    }

    /// Flat length for a rigid block of `rigid_width` scalars (7 for a conf, 6 for a change).
    pub fn num_floats(&self, rigid_width: usize) -> usize {
        let ligands: usize = self
            .ligand_torsions
            .iter()
            .map(|&torsions| rigid_width + torsions)
            .sum();
        let residues: usize = self.residue_torsions.iter().sum();
        ligands + residues
    }

    /// One node per rigid body plus one per torsion.
    pub fn num_nodes(&self) -> usize {
        let ligands: usize = self.ligand_torsions.iter().map(|&t| 1 + t).sum();
        let residues: usize = self.residue_torsions.iter().sum();
        ligands + residues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_floats_sums_rigid_blocks_and_torsions() {
        let shape = ConfShape::new(vec![2, 0], vec![3, 1]);
        assert_eq!(shape.num_floats(7), (7 + 2) + 7 + 3 + 1);
        assert_eq!(shape.num_floats(6), (6 + 2) + 6 + 3 + 1);
    }

    #[test]
    fn num_nodes_counts_one_node_per_rigid_body_and_torsion() {
        let shape = ConfShape::new(vec![2, 0], vec![3, 1]);
        assert_eq!(shape.num_nodes(), 3 + 1 + 3 + 1);
    }

    #[test]
    fn empty_shape_has_no_floats_or_nodes() {
        let shape = ConfShape::default();
        assert_eq!(shape.num_floats(7), 0);
        assert_eq!(shape.num_nodes(), 0);
        assert_eq!(shape.num_ligands(), 0);
        assert_eq!(shape.num_residues(), 0);
    }
}
