use std::{
    convert::TryFrom,
    io::{Read, Write},
};

use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use voxtree_core::nalgebra::Point3;
use voxtree_core::math::OctreeKey;

use super::{error::map_read_error, point_coding::MAX_STEPS, CompressionError, StaticRangeCoder};

/// Identifier at the start of every frame
pub const FRAME_IDENTIFIER: &[u8; 13] = b"<VOXTREE-PCC>";
/// Version of the frame layout
pub const FRAME_VERSION: u8 = 1;

const FLAG_COLOR: u8 = 1;
const FLAG_VOXEL_GRID: u8 = 1 << 1;

/// Size in bytes of the part of the header that every frame has
const COMMON_HEADER_LEN: usize = 13 + 1 + 4 + 1 + 1 + 8 + 8;
/// Size in bytes of the geometry that only I-frames carry
const GEOMETRY_LEN: usize = 8 + 8 + 1 + 1 + 3 * 8;

/// An I-frame can be decoded on its own. A P-frame only encodes the voxels that changed relative to the previous
/// frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    IFrame = 0,
    PFrame = 1,
}

impl TryFrom<u8> for FrameType {
    type Error = CompressionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameType::IFrame),
            1 => Ok(FrameType::PFrame),
            other => Err(CompressionError::InvalidHeader(format!(
                "Unknown frame type {}",
                other
            ))),
        }
    }
}

/// The octree geometry and coder parameters that every I-frame carries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub octree_resolution: f64,
    pub point_resolution: f64,
    pub color_bit_depth: u8,
    pub depth: u8,
    /// Lower corner of the octree cube
    pub cube_min: Point3<f64>,
}

/// Header of a single compressed frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHeader {
    pub frame_id: u32,
    pub frame_type: FrameType,
    pub has_color: bool,
    /// Only voxel centers are encoded
    pub voxel_grid: bool,
    /// Number of points in the decoded frame. In voxel-grid mode, this equals `voxel_count`
    pub point_count: u64,
    /// Number of occupied voxels
    pub voxel_count: u64,
    /// Present in I-frames, absent in P-frames
    pub geometry: Option<FrameGeometry>,
}

/// The byte streams of a frame, in the order in which they are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// One byte per octree branch
    Occupancy,
    /// One byte per voxel of a P-frame: 0 if the voxel is unchanged from the previous frame, 1 otherwise
    LeafFlags,
    /// Number of points per coded voxel, as LEB128
    PointCounts,
    /// Quantized point positions relative to their voxel
    Residuals,
    /// Average color and per-point color differences of each coded voxel
    Colors,
}

impl StreamKind {
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Occupancy => "occupancy stream",
            StreamKind::LeafFlags => "leaf flag stream",
            StreamKind::PointCounts => "point count stream",
            StreamKind::Residuals => "residual stream",
            StreamKind::Colors => "color stream",
        }
    }
}

/// Size of a single stream within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub kind: StreamKind,
    /// Number of bytes before entropy coding
    pub symbol_count: u64,
    /// Number of entropy coded bytes
    pub coded_length: u64,
}

impl StreamInfo {
    /// Number of bytes this stream takes up in the frame, including its length fields
    pub fn total_bytes(&self) -> u64 {
        16 + self.coded_length
    }
}

impl FrameHeader {
    pub fn is_i_frame(&self) -> bool {
        self.frame_type == FrameType::IFrame
    }

    /// The streams that follow this header, in order
    pub fn streams(&self) -> Vec<StreamKind> {
        let mut streams = vec![StreamKind::Occupancy];
        if !self.is_i_frame() {
            streams.push(StreamKind::LeafFlags);
        }
        if !self.voxel_grid {
            streams.push(StreamKind::PointCounts);
            streams.push(StreamKind::Residuals);
        }
        if self.has_color {
            streams.push(StreamKind::Colors);
        }
        streams
    }

    /// Size of this header in bytes
    pub fn encoded_len(&self) -> usize {
        if self.geometry.is_some() {
            COMMON_HEADER_LEN + GEOMETRY_LEN
        } else {
            COMMON_HEADER_LEN
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(FRAME_IDENTIFIER)?;
        writer.write_u8(FRAME_VERSION)?;
        writer.write_u32::<LittleEndian>(self.frame_id)?;
        writer.write_u8(self.frame_type as u8)?;
        let mut flags = 0;
        if self.has_color {
            flags |= FLAG_COLOR;
        }
        if self.voxel_grid {
            flags |= FLAG_VOXEL_GRID;
        }
        writer.write_u8(flags)?;
        writer.write_u64::<LittleEndian>(self.point_count)?;
        writer.write_u64::<LittleEndian>(self.voxel_count)?;
        if let Some(geometry) = &self.geometry {
            writer.write_f64::<LittleEndian>(geometry.octree_resolution)?;
            writer.write_f64::<LittleEndian>(geometry.point_resolution)?;
            writer.write_u8(geometry.color_bit_depth)?;
            writer.write_u8(geometry.depth)?;
            for axis in 0..3 {
                writer.write_f64::<LittleEndian>(geometry.cube_min[axis])?;
            }
        }
        Ok(())
    }

    /// Reads and validates a header
    ///
    /// # Errors
    ///
    /// [CompressionError::Truncated] if `reader` ends within the header, [CompressionError::InvalidHeader] if any of
    /// its fields has an invalid value
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let what = "frame header";
        let invalid = |msg: String| -> anyhow::Error { CompressionError::InvalidHeader(msg).into() };

        let mut identifier = [0_u8; 13];
        reader
            .read_exact(&mut identifier)
            .map_err(|e| map_read_error(e, what))?;
        if &identifier != FRAME_IDENTIFIER {
            return Err(invalid(format!(
                "Expected identifier {:?} but found {:?}",
                String::from_utf8_lossy(FRAME_IDENTIFIER),
                String::from_utf8_lossy(&identifier)
            )));
        }
        let version = reader.read_u8().map_err(|e| map_read_error(e, what))?;
        if version != FRAME_VERSION {
            return Err(invalid(format!("Unsupported version {}", version)));
        }
        let frame_id = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| map_read_error(e, what))?;
        let frame_type = FrameType::try_from(reader.read_u8().map_err(|e| map_read_error(e, what))?)?;
        let flags = reader.read_u8().map_err(|e| map_read_error(e, what))?;
        if flags & !(FLAG_COLOR | FLAG_VOXEL_GRID) != 0 {
            return Err(invalid(format!("Unknown flags {:#010b}", flags)));
        }
        let point_count = reader
            .read_u64::<LittleEndian>()
            .map_err(|e| map_read_error(e, what))?;
        let voxel_count = reader
            .read_u64::<LittleEndian>()
            .map_err(|e| map_read_error(e, what))?;
        let voxel_grid = flags & FLAG_VOXEL_GRID != 0;
        if voxel_grid && point_count != voxel_count {
            return Err(invalid(format!(
                "Voxel-grid frame has {} points in {} voxels",
                point_count, voxel_count
            )));
        }
        if point_count < voxel_count {
            return Err(invalid(format!(
                "Frame has fewer points ({}) than voxels ({})",
                point_count, voxel_count
            )));
        }

        let geometry = match frame_type {
            FrameType::PFrame => None,
            FrameType::IFrame => Some(read_geometry(reader)?),
        };

        Ok(Self {
            frame_id,
            frame_type,
            has_color: flags & FLAG_COLOR != 0,
            voxel_grid,
            point_count,
            voxel_count,
            geometry,
        })
    }
}

fn read_geometry<R: Read>(reader: &mut R) -> Result<FrameGeometry> {
    let what = "frame geometry";
    let invalid = |msg: String| -> anyhow::Error { CompressionError::InvalidHeader(msg).into() };

    let octree_resolution = reader
        .read_f64::<LittleEndian>()
        .map_err(|e| map_read_error(e, what))?;
    let point_resolution = reader
        .read_f64::<LittleEndian>()
        .map_err(|e| map_read_error(e, what))?;
    let color_bit_depth = reader.read_u8().map_err(|e| map_read_error(e, what))?;
    let depth = reader.read_u8().map_err(|e| map_read_error(e, what))?;
    let mut cube_min = Point3::origin();
    for axis in 0..3 {
        cube_min[axis] = reader
            .read_f64::<LittleEndian>()
            .map_err(|e| map_read_error(e, what))?;
    }

    if !(octree_resolution.is_finite() && octree_resolution > 0.0) {
        return Err(invalid(format!("Invalid octree resolution {}", octree_resolution)));
    }
    if !(point_resolution.is_finite() && point_resolution > 0.0 && point_resolution <= octree_resolution) {
        return Err(invalid(format!("Invalid point resolution {}", point_resolution)));
    }
    if (octree_resolution / point_resolution).ceil() > MAX_STEPS as f64 {
        return Err(invalid(format!(
            "Point resolution {} is too fine for octree resolution {}",
            point_resolution, octree_resolution
        )));
    }
    if color_bit_depth == 0 || color_bit_depth > 8 {
        return Err(invalid(format!("Invalid color bit depth {}", color_bit_depth)));
    }
    if depth == 0 || depth > OctreeKey::MAX_DEPTH {
        return Err(invalid(format!("Invalid octree depth {}", depth)));
    }
    if !cube_min.iter().all(|c| c.is_finite()) {
        return Err(invalid(format!("Invalid octree minimum {}", cube_min)));
    }
    Ok(FrameGeometry {
        octree_resolution,
        point_resolution,
        color_bit_depth,
        depth,
        cube_min,
    })
}

/// Entropy codes `symbols` and writes them as a stream: symbol count, coded length, coded bytes
pub(crate) fn write_stream<W: Write>(
    writer: &mut W,
    kind: StreamKind,
    symbols: &[u8],
    coder: &StaticRangeCoder,
) -> Result<StreamInfo> {
    let coded = coder.encode(symbols)?;
    writer.write_u64::<LittleEndian>(symbols.len() as u64)?;
    writer.write_u64::<LittleEndian>(coded.len() as u64)?;
    writer.write_all(&coded)?;
    Ok(StreamInfo {
        kind,
        symbol_count: symbols.len() as u64,
        coded_length: coded.len() as u64,
    })
}

/// Reads the length fields of a stream and the coded bytes that follow them
fn read_stream_bytes<R: Read>(
    reader: &mut R,
    kind: StreamKind,
    max_symbols: u64,
) -> Result<(StreamInfo, Vec<u8>)> {
    let what = kind.name();
    let symbol_count = reader
        .read_u64::<LittleEndian>()
        .map_err(|e| map_read_error(e, what))?;
    let coded_length = reader
        .read_u64::<LittleEndian>()
        .map_err(|e| map_read_error(e, what))?;
    if symbol_count > max_symbols {
        return Err(CompressionError::CorruptStream(format!(
            "The {} holds {} bytes, but at most {} are possible for this frame",
            what, symbol_count, max_symbols
        ))
        .into());
    }
    let mut coded = vec![];
    reader.take(coded_length).read_to_end(&mut coded)?;
    if (coded.len() as u64) < coded_length {
        return Err(CompressionError::Truncated(what).into());
    }
    Ok((
        StreamInfo {
            kind,
            symbol_count,
            coded_length,
        },
        coded,
    ))
}

/// Reads a stream written by [write_stream] and decodes its symbols. `max_symbols` is the largest symbol count that
/// is plausible for the stream. Larger counts are rejected before anything is decoded
pub(crate) fn read_stream<R: Read>(
    reader: &mut R,
    kind: StreamKind,
    max_symbols: u64,
    coder: &StaticRangeCoder,
) -> Result<(StreamInfo, Vec<u8>)> {
    let (info, coded) = read_stream_bytes(reader, kind, max_symbols)?;
    let symbols = coder.decode(&coded, info.symbol_count as usize)?;
    Ok((info, symbols))
}

/// Reads past the streams of a frame whose header was just read, without decoding them
pub fn skip_streams<R: Read>(reader: &mut R, header: &FrameHeader) -> Result<Vec<StreamInfo>> {
    header
        .streams()
        .into_iter()
        .map(|kind| read_stream_bytes(reader, kind, u64::MAX).map(|(info, _)| info))
        .collect()
}

/// Appends `value` to `out` as unsigned LEB128
pub(crate) fn write_leb128(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Reads an unsigned LEB128 value starting at `*position` and advances `*position` past it
pub(crate) fn read_leb128(data: &[u8], position: &mut usize) -> Result<u32> {
    let mut value = 0_u32;
    for shift in (0..35).step_by(7) {
        let byte = match data.get(*position) {
            Some(byte) => *byte,
            None => {
                return Err(CompressionError::CorruptStream("Point count stream ended early".into()).into())
            }
        };
        *position += 1;
        let bits = (byte & 0x7f) as u32;
        if shift == 28 && bits > 0x0f {
            break;
        }
        value |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(CompressionError::CorruptStream("Point count does not fit into 32 bits".into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn i_frame_header() -> FrameHeader {
        FrameHeader {
            frame_id: 7,
            frame_type: FrameType::IFrame,
            has_color: true,
            voxel_grid: false,
            point_count: 1200,
            voxel_count: 300,
            geometry: Some(FrameGeometry {
                octree_resolution: 0.01,
                point_resolution: 0.001,
                color_bit_depth: 6,
                depth: 9,
                cube_min: Point3::new(-1.0, 0.5, 2.25),
            }),
        }
    }

    #[test]
    fn test_header_round_trip() {
        let header = i_frame_header();
        let mut bytes = vec![];
        header.write_to(&mut bytes).unwrap();
        assert_eq!(header.encoded_len(), bytes.len());
        assert_eq!(&FRAME_IDENTIFIER[..], &bytes[..13]);
        let read = FrameHeader::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(header, read);

        let p_frame = FrameHeader {
            frame_type: FrameType::PFrame,
            geometry: None,
            ..header
        };
        let mut bytes = vec![];
        p_frame.write_to(&mut bytes).unwrap();
        assert_eq!(36, bytes.len());
        assert_eq!(p_frame, FrameHeader::read_from(&mut Cursor::new(bytes)).unwrap());
    }

    #[test]
    fn test_stream_layout() {
        let header = i_frame_header();
        assert_eq!(
            vec![
                StreamKind::Occupancy,
                StreamKind::PointCounts,
                StreamKind::Residuals,
                StreamKind::Colors
            ],
            header.streams()
        );
        let p_frame = FrameHeader {
            frame_type: FrameType::PFrame,
            voxel_grid: true,
            has_color: false,
            point_count: 300,
            geometry: None,
            ..header
        };
        assert_eq!(
            vec![StreamKind::Occupancy, StreamKind::LeafFlags],
            p_frame.streams()
        );
    }

    #[test]
    fn test_invalid_headers() {
        let mut valid = vec![];
        i_frame_header().write_to(&mut valid).unwrap();

        let corruptions: Vec<(usize, u8)> = vec![(0, b'#'), (13, 2), (18, 5), (19, 0xf0), (52, 0), (53, 40)];
        for (offset, value) in corruptions {
            let mut bytes = valid.clone();
            bytes[offset] = value;
            let err = FrameHeader::read_from(&mut Cursor::new(bytes)).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<CompressionError>(),
                    Some(CompressionError::InvalidHeader(_))
                ),
                "corruption at offset {} was not detected",
                offset
            );
        }
    }

    #[test]
    fn test_truncated_header() {
        let mut bytes = vec![];
        i_frame_header().write_to(&mut bytes).unwrap();
        for len in [0, 5, 20, 40, 77].iter() {
            let err = FrameHeader::read_from(&mut Cursor::new(&bytes[..*len])).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<CompressionError>(),
                Some(CompressionError::Truncated(_))
            ));
        }
    }

    #[test]
    fn test_streams() {
        let coder = StaticRangeCoder::new();
        let symbols = b"0001112223334444".to_vec();
        let mut bytes = vec![];
        let written = write_stream(&mut bytes, StreamKind::Residuals, &symbols, &coder).unwrap();
        assert_eq!(written.total_bytes(), bytes.len() as u64);

        let (info, read) = read_stream(&mut Cursor::new(&bytes), StreamKind::Residuals, 100, &coder).unwrap();
        assert_eq!(written, info);
        assert_eq!(symbols, read);

        let err = read_stream(&mut Cursor::new(&bytes), StreamKind::Residuals, 10, &coder).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CompressionError>(),
            Some(CompressionError::CorruptStream(_))
        ));

        let err = read_stream(
            &mut Cursor::new(&bytes[..bytes.len() - 1]),
            StreamKind::Residuals,
            100,
            &coder,
        )
        .unwrap_err();
        assert_eq!(
            Some(&CompressionError::Truncated("residual stream")),
            err.downcast_ref::<CompressionError>()
        );
    }

    #[test]
    fn test_leb128() {
        let values = [0, 1, 127, 128, 300, 16_384, u32::MAX];
        let mut bytes = vec![];
        for value in values.iter() {
            write_leb128(&mut bytes, *value);
        }
        assert_eq!(&[0, 1, 0x7f, 0x80, 0x01], &bytes[..5]);
        let mut position = 0;
        for value in values.iter() {
            assert_eq!(*value, read_leb128(&bytes, &mut position).unwrap());
        }
        assert_eq!(bytes.len(), position);
        assert!(read_leb128(&[0x80], &mut 0).is_err());
        assert!(read_leb128(&[0xff, 0xff, 0xff, 0xff, 0x7f], &mut 0).is_err());
    }
}
