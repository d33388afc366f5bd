use super::vector::FlatVector;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct FlatRow {
    index: usize,
    node: usize,
    owner: &'static str,
    entry: usize,
    component: &'static str,
    offset: usize,
    value: f64,
}

/// Writes one CSV row per flat scalar: index, node, owning entry, component and value.
pub fn write_flat_table<V, W>(vector: &V, writer: W) -> Result<(), csv::Error>
where
    V: FlatVector,
    W: Write,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    for slot in vector.layout().slots() {
        csv_writer.serialize(FlatRow {
            index: slot.index,
            node: slot.node,
            owner: slot.owner.kind(),
            entry: slot.owner.entry(),
            component: slot.component.name(),
            offset: slot.offset,
            value: vector.slot_value(&slot),
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::conf::{Conf, LigandConf, ResidueConf};
    use crate::core::models::rigid::RigidConf;

    #[test]
    fn table_has_header_and_one_row_per_scalar() {
        let conf = Conf::new(
            vec![LigandConf::new(RigidConf::default(), vec![0.5])],
            vec![ResidueConf::new(vec![-0.5])],
        );
        let mut buffer = Vec::new();
        write_flat_table(&conf, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "index,node,owner,entry,component,offset,value");
        assert_eq!(lines.len(), 1 + conf.num_floats());
        assert_eq!(lines[1], "0,0,ligand,0,position,0,0.0");
        assert_eq!(lines[4], "3,0,ligand,0,orientation,0,1.0");
        assert_eq!(lines[8], "7,1,ligand,0,torsion,0,0.5");
        assert_eq!(lines[9], "8,2,residue,0,torsion,0,-0.5");
    }
}
