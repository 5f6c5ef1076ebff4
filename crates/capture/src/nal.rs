//! Annex-B elementary stream splitting
//!
//! Splits a byte stream on start codes and groups parameter-set / SEI NAL
//! units with the picture NAL unit that follows them, so each resulting
//! chunk can be published as one frame. Pictures coded as several slices
//! come out as one chunk per slice.

use std::ops::Range;

use bytes::Bytes;

/// Bitstream codec, decides how NAL unit headers are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    H264,
    #[default]
    H265,
}

impl Codec {
    /// Parse a codec name as used in source params
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "h264" | "avc" => Some(Self::H264),
            "h265" | "hevc" => Some(Self::H265),
            _ => None,
        }
    }

    /// Whether a NAL unit header byte belongs to a coded picture
    fn is_vcl(self, header: u8) -> bool {
        match self {
            Self::H264 => matches!(header & 0x1f, 1..=5),
            Self::H265 => ((header >> 1) & 0x3f) < 32,
        }
    }
}

/// Split an Annex-B stream into access-unit sized chunks.
///
/// Bytes before the first start code are discarded. Trailing non-picture
/// NAL units without a following picture form a final chunk of their own.
pub fn split_access_units(data: &Bytes, codec: Codec) -> Vec<Bytes> {
    let units = nal_unit_ranges(data);
    let mut chunks = Vec::new();
    let mut pending_start: Option<usize> = None;

    for unit in &units {
        let start = *pending_start.get_or_insert(unit.start);
        let is_picture = header_byte(&data[unit.clone()])
            .map(|h| codec.is_vcl(h))
            .unwrap_or(false);

        if is_picture {
            chunks.push(data.slice(start..unit.end));
            pending_start = None;
        }
    }

    if let (Some(start), Some(last)) = (pending_start, units.last()) {
        chunks.push(data.slice(start..last.end));
    }

    chunks
}

/// Byte ranges of every NAL unit, each including its start code
fn nal_unit_ranges(data: &[u8]) -> Vec<Range<usize>> {
    let starts = start_code_positions(data);
    starts
        .iter()
        .enumerate()
        .map(|(idx, &start)| {
            let end = starts.get(idx + 1).copied().unwrap_or(data.len());
            start..end
        })
        .collect()
}

fn start_code_positions(data: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            // absorb the leading zero of a 4-byte start code
            let start = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
            positions.push(start);
            i += 3;
        } else {
            i += 1;
        }
    }
    positions
}

/// First byte after the start code
fn header_byte(unit: &[u8]) -> Option<u8> {
    let one = unit.iter().position(|&b| b == 1)?;
    unit.get(one + 1).copied()
}
