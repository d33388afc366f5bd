use super::config::SnapshotFormat;
use super::error::CheckpointError;
use super::tensor::{ShapeError, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const BINARY_MAGIC: &[u8; 8] = b"PGSOLVER";
const BINARY_VERSION: u32 = 1;

/// Shape and values of one persisted tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorRecord {
    pub fn from_tensor(tensor: &Tensor) -> Self {
        Self {
            shape: tensor.shape().to_vec(),
            data: tensor.data().to_vec(),
        }
    }

    pub fn into_tensor(self) -> Result<Tensor, ShapeError> {
        Tensor::from_data(self.shape, self.data)
    }

    /// Reads a standalone record, as used for target and initial grids.
    pub fn load_toml(path: &Path) -> Result<Self, CheckpointError> {
        let text = fs::read_to_string(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    pub fn save_toml(&self, path: &Path) -> Result<(), CheckpointError> {
        let text = toml::to_string(self)?;
        fs::write(path, text).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything needed to resume an input optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    pub iter: usize,
    pub learned_net: String,
    pub current_step: usize,
    pub history: Vec<TensorRecord>,
    pub input: TensorRecord,
}

/// On-disk layout of the structured format: scalars first, then the history
/// group keyed by position, then the input grid.
#[derive(Serialize, Deserialize)]
struct StructuredState {
    iter: usize,
    learned_net: String,
    current_step: usize,
    history: BTreeMap<String, TensorRecord>,
    inputblob: TensorRecord,
}

impl SolverState {
    pub fn save(&self, path: &Path, format: SnapshotFormat) -> Result<(), CheckpointError> {
        match format {
            SnapshotFormat::Binary => self.save_binary(path),
            SnapshotFormat::Structured => self.save_structured(path),
        }
    }

    /// Loads a state file, choosing the decoder from its extension.
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        match SnapshotFormat::from_state_path(path) {
            Some(SnapshotFormat::Binary) => Self::load_binary(path),
            Some(SnapshotFormat::Structured) => Self::load_structured(path),
            None => Err(CheckpointError::UnknownFormat(path.to_path_buf())),
        }
    }

    fn save_structured(&self, path: &Path) -> Result<(), CheckpointError> {
        let structured = StructuredState {
            iter: self.iter,
            learned_net: self.learned_net.clone(),
            current_step: self.current_step,
            history: self
                .history
                .iter()
                .enumerate()
                .map(|(i, record)| (i.to_string(), record.clone()))
                .collect(),
            inputblob: self.input.clone(),
        };
        let text = toml::to_string(&structured)?;
        fs::write(path, text).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn load_structured(path: &Path) -> Result<Self, CheckpointError> {
        let text = fs::read_to_string(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let structured: StructuredState = toml::from_str(&text)?;

        let mut history = structured
            .history
            .into_iter()
            .map(|(key, record)| {
                key.parse::<usize>()
                    .map(|index| (index, record))
                    .map_err(|_| CheckpointError::Format {
                        path: path.to_path_buf(),
                        message: format!("history entry '{}' is not an index", key),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        history.sort_by_key(|(index, _)| *index);

        Ok(Self {
            iter: structured.iter,
            learned_net: structured.learned_net,
            current_step: structured.current_step,
            history: history.into_iter().map(|(_, record)| record).collect(),
            input: structured.inputblob,
        })
    }

    fn save_binary(&self, path: &Path) -> Result<(), CheckpointError> {
        let io_err = |source: std::io::Error| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = fs::File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        self.encode_binary(&mut writer).map_err(io_err)?;
        writer.flush().map_err(io_err)
    }

    fn encode_binary<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(BINARY_MAGIC)?;
        writer.write_all(&BINARY_VERSION.to_le_bytes())?;
        writer.write_all(&(self.iter as u64).to_le_bytes())?;
        writer.write_all(&(self.current_step as u64).to_le_bytes())?;
        let name = self.learned_net.as_bytes();
        writer.write_all(&(name.len() as u64).to_le_bytes())?;
        writer.write_all(name)?;
        writer.write_all(&(self.history.len() as u64).to_le_bytes())?;
        for record in &self.history {
            write_record(writer, record)?;
        }
        write_record(writer, &self.input)
    }

    fn load_binary(path: &Path) -> Result<Self, CheckpointError> {
        let file = fs::File::open(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let remaining = file
            .metadata()
            .map_err(|source| CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        let mut decoder = BinaryDecoder {
            reader: BufReader::new(file),
            path,
            remaining,
        };

        let mut magic = [0u8; 8];
        decoder.read_exact(&mut magic)?;
        if &magic != BINARY_MAGIC {
            return Err(decoder.malformed("not a solver state file"));
        }
        let version = decoder.read_u32()?;
        if version != BINARY_VERSION {
            return Err(decoder.malformed(&format!("unsupported version {}", version)));
        }

        let iter = decoder.read_len()?;
        let current_step = decoder.read_len()?;
        let name_len = decoder.read_len()?;
        decoder.ensure_available(name_len, 1)?;
        let mut name = vec![0u8; name_len];
        decoder.read_exact(&mut name)?;
        let learned_net = String::from_utf8(name)
            .map_err(|_| decoder.malformed("model file name is not valid UTF-8"))?;

        let history_len = decoder.read_len()?;
        // ndim and element count are the smallest possible record.
        decoder.ensure_available(history_len, 16)?;
        let history = (0..history_len)
            .map(|_| decoder.read_record())
            .collect::<Result<Vec<_>, _>>()?;
        let input = decoder.read_record()?;

        Ok(Self {
            iter,
            learned_net,
            current_step,
            history,
            input,
        })
    }
}

fn write_record<W: Write>(writer: &mut W, record: &TensorRecord) -> std::io::Result<()> {
    writer.write_all(&(record.shape.len() as u64).to_le_bytes())?;
    for &dim in &record.shape {
        writer.write_all(&(dim as u64).to_le_bytes())?;
    }
    writer.write_all(&(record.data.len() as u64).to_le_bytes())?;
    for value in &record.data {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

struct BinaryDecoder<'p, R> {
    reader: R,
    path: &'p Path,
    /// Bytes left in the file; bounds every length read before allocating.
    remaining: u64,
}

impl<R: Read> BinaryDecoder<'_, R> {
    fn malformed(&self, message: &str) -> CheckpointError {
        CheckpointError::Format {
            path: self.path.to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Fails unless `count` items of `item_size` bytes fit in the rest of the file.
    fn ensure_available(&self, count: usize, item_size: usize) -> Result<usize, CheckpointError> {
        let bytes = count
            .checked_mul(item_size)
            .ok_or_else(|| self.malformed("length overflows"))?;
        if bytes as u64 > self.remaining {
            return Err(self.malformed(&format!(
                "length of {} bytes exceeds the {} bytes left in the file",
                bytes, self.remaining
            )));
        }
        Ok(bytes)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), CheckpointError> {
        self.remaining = self.remaining.saturating_sub(buf.len() as u64);
        self.reader.read_exact(buf).map_err(|source| {
            if source.kind() == std::io::ErrorKind::UnexpectedEof {
                self.malformed("unexpected end of file")
            } else {
                CheckpointError::Io {
                    path: self.path.to_path_buf(),
                    source,
                }
            }
        })
    }

    fn read_u32(&mut self) -> Result<u32, CheckpointError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_len(&mut self) -> Result<usize, CheckpointError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        usize::try_from(u64::from_le_bytes(buf))
            .map_err(|_| self.malformed("length does not fit in memory"))
    }

    fn read_record(&mut self) -> Result<TensorRecord, CheckpointError> {
        let ndim = self.read_len()?;
        self.ensure_available(ndim, 8)?;
        let shape = (0..ndim)
            .map(|_| self.read_len())
            .collect::<Result<Vec<_>, _>>()?;
        let count = self.read_len()?;
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| self.malformed("tensor shape overflows"))?;
        if expected != count {
            return Err(self.malformed("tensor element count does not match its shape"));
        }
        let byte_len = self.ensure_available(count, 4)?;
        let mut bytes = vec![0u8; byte_len];
        self.read_exact(&mut bytes)?;
        let data = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(TensorRecord { shape, data })
    }
}
