use std::io::{self, Write};

use cozy_chess::Board;

use crate::encoding::{
    material_phase, perspective_features, FEATURE_SENTINEL, MAX_ACTIVE_FEATURES, NUM_FEATURES,
};
use crate::error::DecodeError;
use crate::format::Format;

const INDEX_LIST_BYTES: usize = MAX_ACTIVE_FEATURES * 2;

/// A decoded dataset record. Fields the format doesn't carry are empty or `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionRecord {
    pub side_indices: Vec<u16>,
    pub other_indices: Vec<u16>,
    pub score_cp: Option<i16>,
    /// 0 = loss, 1 = draw, 2 = win for the side to move.
    pub outcome: u8,
    pub phase: Option<u8>,
}

/// Number of whole records in a buffer. A trailing partial record is dropped.
pub fn record_count(byte_len: usize, format: Format) -> usize {
    byte_len / format.record_size()
}

/// Decodes record `index` of `buf`.
pub fn decode_record(
    buf: &[u8],
    index: usize,
    format: Format,
) -> Result<PositionRecord, DecodeError> {
    let size = format.record_size();
    let start = index * size;
    let bytes = buf
        .get(start..start + size)
        .ok_or(DecodeError::Truncated {
            index,
            needed: start + size,
            available: buf.len(),
        })?;

    let layout = format.layout();
    let mut reader = FieldReader::new(bytes);

    let side_indices = read_index_list(reader.take(INDEX_LIST_BYTES))?;
    let other_indices = match layout.perspectives {
        2 => read_index_list(reader.take(INDEX_LIST_BYTES))?,
        _ => Vec::new(),
    };

    let score_cp = layout.has_score.then(|| reader.i16());

    let (outcome, phase) = if layout.has_phase {
        let outcome = reader.u8();
        (outcome as u16, Some(reader.u8()))
    } else {
        (reader.u16(), None)
    };

    if outcome > 2 {
        return Err(DecodeError::InvalidOutcome(outcome));
    }

    Ok(PositionRecord {
        side_indices,
        other_indices,
        score_cp,
        outcome: outcome as u8,
        phase,
    })
}

/// Reads one sentinel-terminated list of feature indices.
/// Every slot after the terminator must also be the terminator.
fn read_index_list(bytes: &[u8]) -> Result<Vec<u16>, DecodeError> {
    let mut indices = Vec::with_capacity(MAX_ACTIVE_FEATURES);
    let mut terminated = false;

    for (slot, chunk) in bytes.chunks_exact(2).enumerate() {
        let value = u16::from_le_bytes([chunk[0], chunk[1]]);

        if terminated {
            if value != FEATURE_SENTINEL {
                return Err(DecodeError::TrailingIndex { slot, value });
            }
            continue;
        }

        if value == FEATURE_SENTINEL {
            terminated = true;
        } else if value as usize >= NUM_FEATURES {
            return Err(DecodeError::IndexOutOfRange { slot, value });
        } else if indices.contains(&value) {
            return Err(DecodeError::DuplicateIndex { value });
        } else {
            indices.push(value);
        }
    }

    Ok(indices)
}

// Sequential little-endian reads over a slice already checked to be record sized.
struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> &'a [u8] {
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        slice
    }

    fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn u16(&mut self) -> u16 {
        let b = self.take(2);
        u16::from_le_bytes([b[0], b[1]])
    }

    fn i16(&mut self) -> i16 {
        let b = self.take(2);
        i16::from_le_bytes([b[0], b[1]])
    }
}

impl PositionRecord {
    /// Builds a record from a position, for tools that write datasets.
    ///
    /// The side to move's features come first and the phase byte is the
    /// material count, so the record decodes to the same sample whichever
    /// format it is written in. Pair with [`PositionRecord::encode`]:
    ///
    /// ```
    /// use cozy_chess::Board;
    /// use nnue_trainer::record::{decode_record, PositionRecord};
    /// use nnue_trainer::Format;
    ///
    /// let record = PositionRecord::from_board(&Board::default(), 1, Some(20));
    /// let mut data = Vec::new();
    /// record.encode(Format::B, &mut data)?;
    ///
    /// assert_eq!(decode_record(&data, 0, Format::B)?, record);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_board(board: &Board, outcome: u8, score_cp: Option<i16>) -> Self {
        let stm = board.side_to_move();
        Self {
            side_indices: perspective_features(board, stm),
            other_indices: perspective_features(board, !stm),
            score_cp,
            outcome,
            phase: Some(material_phase(board)),
        }
    }

    /// Writes the record in `format`'s layout. Fields the format has no room for are dropped,
    /// missing ones are written as zero.
    pub fn encode<W: Write>(&self, format: Format, out: &mut W) -> io::Result<()> {
        let layout = format.layout();

        write_index_list(out, &self.side_indices)?;
        if layout.perspectives == 2 {
            write_index_list(out, &self.other_indices)?;
        }

        if layout.has_score {
            out.write_all(&self.score_cp.unwrap_or(0).to_le_bytes())?;
        }

        if layout.has_phase {
            out.write_all(&[self.outcome, self.phase.unwrap_or(0)])?;
        } else {
            out.write_all(&(self.outcome as u16).to_le_bytes())?;
        }

        Ok(())
    }

    pub fn to_bytes(&self, format: Format) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(format.record_size());
        self.encode(format, &mut bytes)?;
        Ok(bytes)
    }
}

fn write_index_list<W: Write>(out: &mut W, indices: &[u16]) -> io::Result<()> {
    if indices.len() > MAX_ACTIVE_FEATURES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "{} features don't fit in {} slots",
                indices.len(),
                MAX_ACTIVE_FEATURES
            ),
        ));
    }

    for &index in indices {
        out.write_all(&index.to_le_bytes())?;
    }
    for _ in indices.len()..MAX_ACTIVE_FEATURES {
        out.write_all(&FEATURE_SENTINEL.to_le_bytes())?;
    }
    Ok(())
}
