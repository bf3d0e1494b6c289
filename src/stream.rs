//! Byte streams between pipeline stages.
//!
//! GUL item stream:
//!
//! ```text
//! stream_type i32 = 0x01000001 | sample_size i32
//! per item:  event_id i32 | item_id i32
//!            (-1, mean) (-2, std dev) (-3, tiv) (-4, chance of loss) (-5, max loss)
//!            (1, loss) … (N, loss)
//!            (0, 0.0)
//! ```
//!
//! Damage-CDF stream:
//!
//! ```text
//! stream_type i32 = 0x00000001
//! per CDF:   event_id i32 | areaperil_id u32 | vulnerability_id i32 | bin_count i32
//!            bin_count × (prob_to, bin_mean)
//! ```

use std::io::{ErrorKind, Read, Write};

use crate::error::{ConfigError, IntegrityError, Result};
use crate::records::{
    CDF_STREAM_TYPE, DamageCdfHeader, GUL_ITEM_STREAM_TYPE, ProbMean, Record, SampleHeader,
    SampleRecord, decode_all, decode_one,
};
use crate::types::{DamageKey, EventId, ItemId, LossFloat, sidx};

/// Read one record. `Ok(None)` on a clean end of stream before its first
/// byte; a partial record is a truncation error.
fn read_record<R: Read, T: Record>(inner: &mut R, buf: &mut Vec<u8>, context: &'static str) -> Result<Option<T>> {
    buf.resize(T::SIZE, 0);
    let mut filled = 0;
    while filled < T::SIZE {
        match inner.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(IntegrityError::TruncatedStream { context }.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    decode_one::<T>(buf).map(Some)
}

fn require_record<R: Read, T: Record>(inner: &mut R, buf: &mut Vec<u8>, context: &'static str) -> Result<T> {
    read_record(inner, buf, context)?.ok_or_else(|| IntegrityError::TruncatedStream { context }.into())
}

fn read_i32<R: Read>(inner: &mut R, context: &'static str) -> Result<i32> {
    let mut bytes = [0u8; 4];
    inner.read_exact(&mut bytes).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => IntegrityError::TruncatedStream { context }.into(),
        _ => crate::error::Error::from(e),
    })?;
    Ok(i32::from_le_bytes(bytes))
}

// ── GUL item stream ──────────────────────────────────────────────────────────

/// All records of one item within one event.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemBlock {
    pub event_id: EventId,
    pub item_id: ItemId,
    pub mean: LossFloat,
    pub std_dev: LossFloat,
    pub tiv: LossFloat,
    pub chance_of_loss: LossFloat,
    pub max_loss: LossFloat,
    /// `samples[k]` carries sidx `k + 1`.
    pub samples: Vec<LossFloat>,
}

impl ItemBlock {
    fn summary(&self, s: i32) -> LossFloat {
        match s {
            sidx::MEAN => self.mean,
            sidx::STD_DEV => self.std_dev,
            sidx::TIV => self.tiv,
            sidx::CHANCE_OF_LOSS => self.chance_of_loss,
            _ => self.max_loss,
        }
    }

    fn set_summary(&mut self, s: i32, value: LossFloat) {
        match s {
            sidx::MEAN => self.mean = value,
            sidx::STD_DEV => self.std_dev = value,
            sidx::TIV => self.tiv = value,
            sidx::CHANCE_OF_LOSS => self.chance_of_loss = value,
            _ => self.max_loss = value,
        }
    }

    fn empty(header: SampleHeader, sample_size: usize) -> Self {
        ItemBlock {
            event_id: EventId(header.event_id),
            item_id: ItemId(header.item_id),
            mean: 0.0,
            std_dev: 0.0,
            tiv: 0.0,
            chance_of_loss: 0.0,
            max_loss: 0.0,
            samples: vec![0.0; sample_size],
        }
    }
}

pub struct GulStreamWriter<W: Write> {
    inner: W,
    sample_size: usize,
    buf: Vec<u8>,
}

impl<W: Write> GulStreamWriter<W> {
    /// Writes the stream header immediately.
    pub fn new(mut inner: W, sample_size: usize) -> Result<Self> {
        crate::random::validate_sample_size(sample_size)?;
        inner.write_all(&GUL_ITEM_STREAM_TYPE.to_le_bytes())?;
        inner.write_all(&(sample_size as i32).to_le_bytes())?;
        Ok(GulStreamWriter { inner, sample_size, buf: Vec::new() })
    }

    pub fn write_block(&mut self, block: &ItemBlock) -> Result<()> {
        if block.samples.len() != self.sample_size {
            return Err(ConfigError::LengthMismatch {
                expected: self.sample_size,
                actual: block.samples.len(),
            }
            .into());
        }
        self.buf.clear();
        SampleHeader { event_id: block.event_id.0, item_id: block.item_id.0 }.encode(&mut self.buf);
        for s in sidx::SUMMARY_ORDER {
            SampleRecord { sidx: s, loss: block.summary(s) }.encode(&mut self.buf);
        }
        for (k, &loss) in block.samples.iter().enumerate() {
            SampleRecord { sidx: k as i32 + 1, loss }.encode(&mut self.buf);
        }
        SampleRecord { sidx: sidx::TERMINATOR, loss: 0.0 }.encode(&mut self.buf);
        self.inner.write_all(&self.buf)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

pub struct GulStreamReader<R: Read> {
    inner: R,
    sample_size: usize,
    buf: Vec<u8>,
}

impl<R: Read> GulStreamReader<R> {
    /// Reads and checks the stream header.
    pub fn new(mut inner: R) -> Result<Self> {
        let stream_type = read_i32(&mut inner, "GUL stream header")?;
        if stream_type != GUL_ITEM_STREAM_TYPE {
            return Err(IntegrityError::UnexpectedStreamType {
                expected: GUL_ITEM_STREAM_TYPE,
                actual: stream_type,
            }
            .into());
        }
        let declared = read_i32(&mut inner, "GUL stream header")?;
        let sample_size = match usize::try_from(declared) {
            Ok(n) if n > 0 => n,
            _ => return Err(IntegrityError::InvalidStreamSampleSize(declared).into()),
        };
        Ok(GulStreamReader { inner, sample_size, buf: Vec::new() })
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn next_block(&mut self) -> Result<Option<ItemBlock>> {
        let Some(header) = read_record::<_, SampleHeader>(&mut self.inner, &mut self.buf, "item header")? else {
            return Ok(None);
        };
        let mut block = ItemBlock::empty(header, self.sample_size);
        // Slot `s + NUM_IDX` for summaries (-5..=-1), `s + NUM_IDX - 1` for samples (1..=N).
        let mut seen = vec![false; sidx::NUM_IDX + self.sample_size];
        loop {
            let rec: SampleRecord = require_record(&mut self.inner, &mut self.buf, "item samples")?;
            let slot = match rec.sidx {
                sidx::TERMINATOR => break,
                s if s < 0 && s >= sidx::MAX_LOSS => {
                    block.set_summary(s, rec.loss);
                    (s + sidx::NUM_IDX as i32) as usize
                }
                s if s > 0 && s as usize <= self.sample_size => {
                    block.samples[s as usize - 1] = rec.loss;
                    s as usize + sidx::NUM_IDX - 1
                }
                s => {
                    return Err(IntegrityError::SidxOutOfRange {
                        sidx: s,
                        sample_size: self.sample_size as i32,
                    }
                    .into());
                }
            };
            if std::mem::replace(&mut seen[slot], true) {
                return Err(IntegrityError::DuplicateSidx {
                    event_id: header.event_id,
                    item_id: block.item_id,
                    sidx: rec.sidx,
                }
                .into());
            }
        }
        let missing = seen.iter().filter(|&&s| !s).count();
        if missing > 0 {
            return Err(IntegrityError::IncompleteBlock { event_id: header.event_id, item_id: block.item_id, missing }
                .into());
        }
        Ok(Some(block))
    }
}

impl<R: Read> Iterator for GulStreamReader<R> {
    type Item = Result<ItemBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}

// ── Damage-CDF stream ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CdfRecord {
    pub event_id: EventId,
    pub key: DamageKey,
    pub bins: Vec<ProbMean>,
}

pub struct CdfStreamWriter<W: Write> {
    inner: W,
    buf: Vec<u8>,
}

impl<W: Write> CdfStreamWriter<W> {
    pub fn new(mut inner: W) -> Result<Self> {
        inner.write_all(&CDF_STREAM_TYPE.to_le_bytes())?;
        Ok(CdfStreamWriter { inner, buf: Vec::new() })
    }

    pub fn write(&mut self, rec: &CdfRecord) -> Result<()> {
        self.buf.clear();
        DamageCdfHeader {
            event_id: rec.event_id.0,
            areaperil_id: rec.key.areaperil_id.0,
            vulnerability_id: rec.key.vulnerability_id.0,
            bin_count: rec.bins.len() as i32,
        }
        .encode(&mut self.buf);
        for b in &rec.bins {
            b.encode(&mut self.buf);
        }
        self.inner.write_all(&self.buf)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

pub struct CdfStreamReader<R: Read> {
    inner: R,
    buf: Vec<u8>,
    peeked: Option<CdfRecord>,
}

impl<R: Read> CdfStreamReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let stream_type = read_i32(&mut inner, "damage CDF stream header")?;
        if stream_type != CDF_STREAM_TYPE {
            return Err(IntegrityError::UnexpectedStreamType { expected: CDF_STREAM_TYPE, actual: stream_type }.into());
        }
        Ok(CdfStreamReader { inner, buf: Vec::new(), peeked: None })
    }

    pub fn next_record(&mut self) -> Result<Option<CdfRecord>> {
        if let Some(rec) = self.peeked.take() {
            return Ok(Some(rec));
        }
        let Some(header) = read_record::<_, DamageCdfHeader>(&mut self.inner, &mut self.buf, "damage CDF header")?
        else {
            return Ok(None);
        };
        let key = DamageKey::new(header.areaperil_id, header.vulnerability_id);
        let count = usize::try_from(header.bin_count)
            .map_err(|_| IntegrityError::NegativeBinCount { key, count: header.bin_count })?;

        // bin_count is untrusted; buffer only the bytes present.
        let want = count * ProbMean::SIZE;
        self.buf.clear();
        (&mut self.inner).take(want as u64).read_to_end(&mut self.buf)?;
        if self.buf.len() != want {
            return Err(IntegrityError::TruncatedStream { context: "damage CDF bins" }.into());
        }
        let bins = decode_all::<ProbMean>(&self.buf)?;

        Ok(Some(CdfRecord { event_id: EventId(header.event_id), key, bins }))
    }

    /// All consecutive records sharing the next event id.
    pub fn next_event(&mut self) -> Result<Option<(EventId, Vec<CdfRecord>)>> {
        let Some(first) = self.next_record()? else {
            return Ok(None);
        };
        let event_id = first.event_id;
        let mut records = vec![first];
        while let Some(rec) = self.next_record()? {
            if rec.event_id != event_id {
                self.peeked = Some(rec);
                break;
            }
            records.push(rec);
        }
        Ok(Some((event_id, records)))
    }
}
