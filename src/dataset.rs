//! Append-only in-memory store of `(input, output)` byte blobs, with an
//! optional decoder and a binary spill-to-file format for streaming
//! corpora larger than memory.

use std::fs::OpenOptions;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::errors::{NnError, NnResult};
use crate::weight::Weight;

/// Decodes one raw entry into the fixed-point input/output vectors a
/// network expects.
pub type Decoder = fn(&DatasetEntry, input_size: usize, output_size: usize) -> (Vec<Weight>, Vec<Weight>);

/// One raw `(input, output)` byte pair, owned exclusively by its `Dataset`.
#[derive(Clone, Debug)]
pub struct DatasetEntry {
    pub in_data: Vec<u8>,
    pub out_data: Vec<u8>,
}

/// Append-only in-memory entry store plus optional decoder and spill path.
pub struct Dataset {
    input_size: usize,
    output_size: usize,
    entries: Vec<DatasetEntry>,
    decode: Option<Decoder>,
}

impl Dataset {
    /// Sets the shape the dataset's decoded samples must match. No
    /// allocation happens here.
    pub fn new(input_size: usize, output_size: usize) -> Dataset {
        Dataset {
            input_size,
            output_size,
            entries: Vec::new(),
            decode: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn entries(&self) -> &[DatasetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn decoder(&self) -> Option<Decoder> {
        self.decode
    }

    /// Installs a decoder. Irreversible for the lifetime of the dataset's
    /// current entries — callers must not rely on unsetting it later.
    pub fn set_decoder(&mut self, decode: Decoder) {
        self.decode = Some(decode);
    }

    /// Appends one entry, copying `in_data`/`out_data` into freshly owned
    /// allocations. When no decoder is installed, blob lengths must be
    /// exactly `input_size * size_of::<Weight>()` and `output_size *
    /// size_of::<Weight>()` — the raw-`Weight`-array convention.
    pub fn add_entry(&mut self, in_data: &[u8], out_data: &[u8]) -> NnResult<()> {
        if self.decode.is_none() {
            let expected_in = self.input_size * std::mem::size_of::<Weight>();
            let expected_out = self.output_size * std::mem::size_of::<Weight>();
            if in_data.len() != expected_in || out_data.len() != expected_out {
                return Err(NnError::InvalidArgument(format!(
                    "entry blob sizes ({}, {}) don't match the undecoded raw-Weight convention ({expected_in}, {expected_out})",
                    in_data.len(),
                    out_data.len()
                )));
            }
        }
        self.entries.push(DatasetEntry {
            in_data: in_data.to_vec(),
            out_data: out_data.to_vec(),
        });
        Ok(())
    }

    /// Appends every current entry to `path` using the spill format in the
    /// crate's file-format notes, then frees each entry's blobs and resets
    /// the entry count to zero — regardless of whether the write fully
    /// succeeded, matching the "entries are freed either way" contract.
    pub fn push_entries(&mut self, path: impl AsRef<Path>) -> NnResult<()> {
        let result = (|| -> NnResult<()> {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let mut writer = BufWriter::new(file);
            for entry in &self.entries {
                writer.write_all(&(entry.in_data.len() as u64).to_le_bytes())?;
                writer.write_all(&(entry.out_data.len() as u64).to_le_bytes())?;
                writer.write_all(&entry.in_data)?;
                writer.write_all(&entry.out_data)?;
            }
            writer.flush()?;
            Ok(())
        })();

        self.entries.clear();
        result
    }
}

/// Reads one spill-file record: `(in_bytes: u64, out_bytes: u64, in_blob,
/// out_blob)`. Returns `Ok(None)` on a clean EOF (zero bytes read before
/// the length prefix); a length prefix read but the blob bytes missing is
/// reported as [`NnError::CorruptSpill`].
pub fn read_spill_record(reader: &mut impl Read) -> NnResult<Option<DatasetEntry>> {
    let mut len_buf = [0u8; 8];
    let n = read_or_eof(reader, &mut len_buf)?;
    if n == 0 {
        return Ok(None);
    }
    if n != len_buf.len() {
        return Err(NnError::CorruptSpill(
            "spill file truncated inside the input-length header".into(),
        ));
    }
    let in_bytes = u64::from_le_bytes(len_buf) as usize;

    reader.read_exact(&mut len_buf).map_err(|_| {
        NnError::CorruptSpill("spill file truncated inside the output-length header".into())
    })?;
    let out_bytes = u64::from_le_bytes(len_buf) as usize;

    let mut in_data = vec![0u8; in_bytes];
    reader
        .read_exact(&mut in_data)
        .map_err(|_| NnError::CorruptSpill("spill file truncated inside the input blob".into()))?;
    let mut out_data = vec![0u8; out_bytes];
    reader
        .read_exact(&mut out_data)
        .map_err(|_| NnError::CorruptSpill("spill file truncated inside the output blob".into()))?;

    Ok(Some(DatasetEntry { in_data, out_data }))
}

fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> NnResult<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
