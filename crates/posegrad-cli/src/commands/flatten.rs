use crate::cli::FlattenArgs;
use crate::error::{CliError, Result};
use posegrad::core::models::change::Change;
use posegrad::core::models::conf::Conf;
use posegrad::core::models::shape::ConfShape;
use posegrad::core::projection::{FlatVector, write_flat_table};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// One ligand entry. `orientation` is `[w, i, j, k]` for a pose and a
/// rotation vector `[x, y, z]` for a change.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct FileLigand {
    position: [f64; 3],
    orientation: Vec<f64>,
    #[serde(default)]
    torsions: Vec<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct FileResidue {
    #[serde(default)]
    torsions: Vec<f64>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
struct FileConformation {
    #[serde(default)]
    ligands: Vec<FileLigand>,
    #[serde(default)]
    residues: Vec<FileResidue>,
}

impl FileConformation {
    fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading conformation from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn shape(&self) -> ConfShape {
        ConfShape::new(
            self.ligands.iter().map(|l| l.torsions.len()).collect(),
            self.residues.iter().map(|r| r.torsions.len()).collect(),
        )
    }

    /// Values in flat order, checking each orientation has `orientation_width` entries.
    fn flat_values(&self, orientation_width: usize) -> Result<Vec<f64>> {
        let mut values = Vec::new();
        for (i, ligand) in self.ligands.iter().enumerate() {
            if ligand.orientation.len() != orientation_width {
                return Err(CliError::Argument(format!(
                    "ligand {} has {} orientation components, expected {}",
                    i,
                    ligand.orientation.len(),
                    orientation_width
                )));
            }
            values.extend_from_slice(&ligand.position);
            values.extend_from_slice(&ligand.orientation);
            values.extend_from_slice(&ligand.torsions);
        }
        for residue in &self.residues {
            values.extend_from_slice(&residue.torsions);
        }
        Ok(values)
    }

    fn to_conf(&self) -> Result<Conf> {
        let mut conf = Conf::from_shape(&self.shape());
        conf.copy_from_flat(&self.flat_values(Conf::ORIENTATION_WIDTH)?)?;
        Ok(conf)
    }

    fn to_change(&self) -> Result<Change> {
        let mut change = Change::zeroed(&self.shape());
        change.copy_from_flat(&self.flat_values(Change::ORIENTATION_WIDTH)?)?;
        Ok(change)
    }
}

pub fn run(args: FlattenArgs) -> Result<()> {
    let file = FileConformation::from_file(&args.input)?;
    if args.change {
        write_projection(&file.to_change()?, args.output.as_deref())
    } else {
        write_projection(&file.to_conf()?, args.output.as_deref())
    }
}

fn write_projection<V: FlatVector>(vector: &V, output: Option<&Path>) -> Result<()> {
    let layout = vector.layout();
    info!(
        num_floats = layout.len(),
        num_nodes = layout.num_nodes(),
        "Projected conformation onto flat vector."
    );
    eprintln!(
        "{} float(s) across {} node(s)",
        layout.len(),
        layout.num_nodes()
    );

    match output {
        Some(path) => {
            let writer = BufWriter::new(File::create(path)?);
            write_table(vector, writer)?;
            println!("✓ Flat table written to: {}", path.display());
        }
        None => write_table(vector, io::stdout().lock())?,
    }
    Ok(())
}

fn write_table<V: FlatVector, W: Write>(vector: &V, writer: W) -> Result<()> {
    write_flat_table(vector, writer).map_err(|e| CliError::Other(e.into()))
}
