//! Reference window extraction and single-base substitution

use crate::{parse_base, Sequence, SnvError, SnvResult, Window};

/// Anything that can hand out bases for a half-open 0-based range.
///
/// Implementations may return fewer bases than requested near the end of a
/// contig; the extractor tolerates that.
pub trait SequenceAccessor {
    fn fetch(&self, start: usize, end: usize) -> SnvResult<Sequence>;

    /// Name used in log messages
    fn describe(&self) -> String {
        "sequence".to_string()
    }
}

impl SequenceAccessor for Sequence {
    fn fetch(&self, start: usize, end: usize) -> SnvResult<Sequence> {
        Ok(self.slice(start, end))
    }
}

/// Cuts fixed-size windows centred on a variant, clipped at sequence edges
#[derive(Debug, Clone, Copy)]
pub struct WindowExtractor {
    window_size: usize,
    half: usize,
}

impl WindowExtractor {
    pub fn new(window_size: usize) -> SnvResult<Self> {
        validate_window_size(window_size)?;
        Ok(Self {
            window_size,
            half: window_size / 2,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Extract the window around a 1-based `position`.
    ///
    /// `length_bound` caps the right edge (the sequence length when known,
    /// `usize::MAX` for a remote source that clips by itself).
    pub fn extract<A>(
        &self,
        position: u64,
        length_bound: usize,
        accessor: &A,
    ) -> SnvResult<Window>
    where
        A: SequenceAccessor + ?Sized,
    {
        if position == 0 {
            return Err(SnvError::InvalidPosition(position));
        }
        let p = usize::try_from(position - 1).map_err(|_| SnvError::InvalidPosition(position))?;

        let start = p.saturating_sub(self.half);
        let end = length_bound.min(p.saturating_add(self.half));

        let bases = if start < end {
            accessor.fetch(start, end)?
        } else {
            Sequence::default()
        };

        if start < end && bases.len() != end - start {
            let mismatch = SnvError::SequenceLengthMismatch {
                chrom: accessor.describe(),
                start,
                end,
                expected: end - start,
                actual: bases.len(),
            };
            log::warn!("{}", mismatch);
        }

        // min(half, p), not p - start
        let variant_offset = self.half.min(p);
        if variant_offset >= bases.len() {
            return Err(SnvError::WindowOutOfBounds {
                offset: variant_offset,
                start,
                end: start + bases.len(),
            });
        }

        Ok(Window {
            bases,
            start_offset: start,
            variant_offset,
        })
    }
}

pub fn validate_window_size(window_size: usize) -> SnvResult<()> {
    if window_size == 0 || window_size % 2 != 0 {
        return Err(SnvError::InvalidConfig(format!(
            "window size must be even and positive (got {})",
            window_size
        )));
    }
    Ok(())
}

/// Build the mutated window by substituting `alt_allele` at the variant offset.
///
/// The replaced base is not compared against any expected reference allele.
pub fn build_variant_sequence(window: &Window, alt_allele: &str) -> SnvResult<Sequence> {
    let base = parse_base(alt_allele)?;
    if window.variant_offset >= window.bases.len() {
        return Err(SnvError::WindowOutOfBounds {
            offset: window.variant_offset,
            start: window.start_offset,
            end: window.end_offset(),
        });
    }
    Ok(window.bases.with_substitution(window.variant_offset, base))
}
