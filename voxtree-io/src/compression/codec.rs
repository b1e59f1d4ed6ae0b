use std::io::{Read, Write};

use anyhow::{ensure, Context, Result};
use log::{debug, info};
use voxtree_core::nalgebra::Point3;
use static_assertions::assert_impl_all;
use voxtree_core::{
    containers::{PointCloud, VecPointCloud},
    math::AABB,
    octree::{CompressionResidual, DoubleBufferedOctree, LeafContainer, OctreeGeometry},
    OctreeError,
};

use super::{
    frame::{read_leb128, read_stream, write_leb128, write_stream},
    ColorCoder, CompressionConfig, CompressionError, FrameGeometry, FrameHeader, FrameType, PointCoder,
    StaticRangeCoder, StreamInfo, StreamKind,
};

/// Where a [PointCloudCompression] is within its frame sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    /// Ready for the next frame
    Idle,
    EncodingFrame,
    DecodingFrame,
    /// The last frame failed. The encoder writes an I-frame next, and the decoder rejects P-frames until it has
    /// decoded an I-frame
    NeedsIFrame,
}

/// Sizes and counts of a single encoded or decoded frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameStatistics {
    pub frame_id: u32,
    pub is_i_frame: bool,
    /// Number of points in the frame. In voxel-grid mode, this is the number of voxels
    pub point_count: u64,
    pub voxel_count: u64,
    /// Voxels of a P-frame whose content was taken from the previous frame
    pub carried_over_voxels: u64,
    pub header_bytes: u64,
    pub streams: Vec<StreamInfo>,
}

impl FrameStatistics {
    /// Bytes that the given stream takes up in the frame, or 0 if the frame has no such stream
    pub fn stream_bytes(&self, kind: StreamKind) -> u64 {
        self.streams
            .iter()
            .filter(|stream| stream.kind == kind)
            .map(|stream| stream.total_bytes())
            .sum()
    }

    /// Size of the whole frame in bytes
    pub fn total_bytes(&self) -> u64 {
        self.header_bytes
            + self
                .streams
                .iter()
                .map(|stream| stream.total_bytes())
                .sum::<u64>()
    }

    /// Average number of bytes per point, or 0 for an empty frame
    pub fn bytes_per_point(&self) -> f64 {
        if self.point_count == 0 {
            0.0
        } else {
            self.total_bytes() as f64 / self.point_count as f64
        }
    }

    /// Logs these statistics at info level
    pub fn log(&self) {
        info!(
            "Frame {} ({}): {} points in {} voxels ({} carried over), {} bytes, {:.3} bytes per point",
            self.frame_id,
            if self.is_i_frame { "I-frame" } else { "P-frame" },
            self.point_count,
            self.voxel_count,
            self.carried_over_voxels,
            self.total_bytes(),
            self.bytes_per_point()
        );
        for stream in &self.streams {
            info!(
                "    {}: {} bytes coded to {}",
                stream.kind.name(),
                stream.symbol_count,
                stream.coded_length
            );
        }
    }
}

/// Octree based compression for sequences of point clouds
///
/// Each frame is stored as the occupancy of an octree with voxels of size
/// [octree_resolution](CompressionConfig::octree_resolution), plus the number of points in every voxel, their
/// quantized positions relative to the voxel and their colors. All of this is entropy coded with a
/// [StaticRangeCoder]. I-frames can be decoded on their own. P-frames encode the octree relative to the
/// previous frame and only store voxels whose content changed
///
/// One instance handles one stream, either for encoding or for decoding. Frames must be passed in stream order
///
/// ```
/// # use voxtree_core::containers::{PointCloud, VecPointCloud};
/// # use voxtree_io::compression::{CompressionConfig, CompressionProfile, PointCloudCompression};
/// # use voxtree_core::nalgebra::Vector3;
/// let cloud: VecPointCloud = (0..100)
///     .map(|i| Vector3::new(i as f64 * 0.01, 0.5, 0.25))
///     .collect();
/// let config = CompressionConfig::from_profile(CompressionProfile::HighResOnlineWithoutColor);
///
/// let mut encoder = PointCloudCompression::new(config.clone()).unwrap();
/// let mut stream = vec![];
/// encoder.encode_point_cloud(&cloud, &mut stream).unwrap();
///
/// let mut decoder = PointCloudCompression::new(config).unwrap();
/// let mut decoded = VecPointCloud::new();
/// decoder.decode_point_cloud(&mut stream.as_slice(), &mut decoded).unwrap();
/// assert_eq!(cloud.len(), decoded.len());
/// ```
pub struct PointCloudCompression {
    config: CompressionConfig,
    voxel_grid: bool,
    point_coder: PointCoder,
    color_coder: ColorCoder,
    entropy_coder: StaticRangeCoder,
    octree: DoubleBufferedOctree<CompressionResidual>,
    /// Geometry of the last I-frame, shared by the P-frames that follow it
    geometry: Option<OctreeGeometry>,
    /// Whether the frame in the previous buffer has colors
    has_color: bool,
    frame_id: u32,
    frames_since_i_frame: u32,
    state: CodecState,
    output: Option<VecPointCloud>,
}

assert_impl_all!(PointCloudCompression: Send);

fn corrupt(msg: impl Into<String>) -> anyhow::Error {
    CompressionError::CorruptStream(msg.into()).into()
}

impl PointCloudCompression {
    /// Creates a codec with the given parameters
    ///
    /// # Errors
    ///
    /// [CompressionError::InvalidConfig] if `config` does not pass [CompressionConfig::validate]
    pub fn new(config: CompressionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            voxel_grid: config.uses_voxel_grid(),
            point_coder: PointCoder::new(config.point_resolution, config.octree_resolution),
            color_coder: ColorCoder::new(config.color_bit_depth),
            entropy_coder: StaticRangeCoder::new(),
            octree: DoubleBufferedOctree::new(1),
            geometry: None,
            has_color: false,
            frame_id: 0,
            frames_since_i_frame: 0,
            state: CodecState::Idle,
            output: None,
            config,
        })
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// ID of the next frame. While encoding, this is the ID that the next frame gets. While decoding, this is the
    /// ID that the next P-frame must have
    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    pub fn state(&self) -> CodecState {
        self.state
    }

    /// Sets the cloud that [decode_to_output](PointCloudCompression::decode_to_output) decodes into
    pub fn set_output_cloud(&mut self, cloud: VecPointCloud) {
        self.output = Some(cloud);
    }

    pub fn output_cloud(&self) -> Option<&VecPointCloud> {
        self.output.as_ref()
    }

    pub fn take_output_cloud(&mut self) -> Option<VecPointCloud> {
        self.output.take()
    }

    /// Encodes `cloud` as the next frame and writes it to `writer`. Points with non-finite coordinates are skipped
    ///
    /// The frame is an I-frame if it is the first frame, if the I-frame rate is reached, if the previous frame
    /// failed, if a point lies outside of the octree of the last I-frame or if the presence of colors changed.
    /// Otherwise it is a P-frame
    ///
    /// # Errors
    ///
    /// If writing fails or if the cloud is too large for an octree with the configured resolution. After an
    /// error, the next frame is an I-frame
    pub fn encode_point_cloud<C: PointCloud, W: Write>(
        &mut self,
        cloud: &C,
        writer: &mut W,
    ) -> Result<FrameStatistics> {
        let force_i_frame = self.state == CodecState::NeedsIFrame;
        self.state = CodecState::EncodingFrame;
        match self.encode_frame(cloud, writer, force_i_frame) {
            Ok(statistics) => {
                self.state = CodecState::Idle;
                if self.config.show_statistics {
                    statistics.log();
                }
                Ok(statistics)
            }
            Err(e) => {
                self.state = CodecState::NeedsIFrame;
                Err(e)
            }
        }
    }

    fn needs_i_frame<C: PointCloud>(&self, cloud: &C, has_color: bool, force: bool) -> bool {
        let geometry = match &self.geometry {
            Some(geometry) if !force => geometry,
            _ => return true,
        };
        if self.frames_since_i_frame + 1 >= self.config.i_frame_rate || has_color != self.has_color {
            return true;
        }
        (0..cloud.len()).any(|index| {
            let position = cloud.position(index);
            position.iter().all(|c| c.is_finite()) && !geometry.contains(&position)
        })
    }

    fn geometry_for_cloud<C: PointCloud>(&self, cloud: &C) -> Result<OctreeGeometry> {
        let bounds = AABB::from_positions(
            (0..cloud.len())
                .map(|index| cloud.position(index))
                .filter(|position| position.iter().all(|c| c.is_finite())),
        );
        match bounds {
            Some(bounds) => OctreeGeometry::from_bounds_and_resolution(&bounds, self.config.octree_resolution),
            None => OctreeGeometry::new(Point3::origin(), self.config.octree_resolution, 1),
        }
    }

    fn encode_frame<C: PointCloud, W: Write>(
        &mut self,
        cloud: &C,
        writer: &mut W,
        force_i_frame: bool,
    ) -> Result<FrameStatistics> {
        ensure!(
            cloud.len() <= u32::MAX as usize,
            "A frame can hold at most {} points",
            u32::MAX
        );
        let has_color = self.config.do_color_encoding && cloud.has_colors();
        let is_i_frame = self.needs_i_frame(cloud, has_color, force_i_frame);
        let geometry = if is_i_frame {
            let geometry = self.geometry_for_cloud(cloud)?;
            self.octree.clear();
            self.octree.set_depth(geometry.depth());
            geometry
        } else {
            self.octree.switch_buffers();
            self.geometry.ok_or(CompressionError::MissingReferenceFrame {
                frame_id: self.frame_id,
            })?
        };

        let octree = self.octree.current_mut();
        let mut skipped_points = 0_usize;
        for index in 0..cloud.len() {
            let position = cloud.position(index);
            if !position.iter().all(|c| c.is_finite()) {
                skipped_points += 1;
                continue;
            }
            let key = geometry.key_for_point(&position)?;
            octree.insert(&key).accumulate(index as u32, &position);
        }
        if skipped_points > 0 {
            debug!("Skipped {} points with non-finite coordinates", skipped_points);
        }

        let voxel_grid = self.voxel_grid;
        let point_coder = self.point_coder;
        let color_coder = self.color_coder;
        octree.for_each_leaf_mut(|key, leaf| {
            let voxel_min = geometry.voxel_min(key);
            let (coded_point_count, residuals) = if voxel_grid {
                (1, vec![])
            } else {
                let mut residuals = Vec::with_capacity(leaf.point_count() * point_coder.bytes_per_point());
                for index in leaf.point_indices() {
                    point_coder.encode_point(&cloud.position(*index as usize), &voxel_min, &mut residuals);
                }
                (leaf.point_count() as u32, residuals)
            };
            let mut colors = vec![];
            if has_color {
                let point_colors = leaf
                    .point_indices()
                    .iter()
                    .filter_map(|index| cloud.color(*index as usize))
                    .collect::<Vec<_>>();
                color_coder.encode_voxel(&point_colors, !voxel_grid, &mut colors);
            }
            leaf.set_payload(coded_point_count, residuals, colors);
        });

        let mut occupancy = vec![];
        let mut leaf_flags = vec![];
        let mut point_counts = vec![];
        let mut residuals = vec![];
        let mut colors = vec![];
        let mut carried_over_voxels = 0_u64;
        self.octree
            .serialize_tree_delta(&mut occupancy, |_, leaf, previous| {
                if !is_i_frame {
                    let unchanged = previous.map_or(false, |previous| previous.payload_eq(leaf));
                    leaf_flags.push(if unchanged { 0 } else { 1 });
                    if unchanged {
                        carried_over_voxels += 1;
                        return;
                    }
                }
                if !voxel_grid {
                    write_leb128(&mut point_counts, leaf.coded_point_count());
                    residuals.extend_from_slice(leaf.residuals());
                }
                colors.extend_from_slice(leaf.colors());
            });

        let current = self.octree.current();
        let header = FrameHeader {
            frame_id: self.frame_id,
            frame_type: if is_i_frame {
                FrameType::IFrame
            } else {
                FrameType::PFrame
            },
            has_color,
            voxel_grid,
            point_count: current
                .leaves()
                .map(|(_, leaf)| leaf.coded_point_count() as u64)
                .sum(),
            voxel_count: current.leaf_count() as u64,
            geometry: if is_i_frame {
                Some(FrameGeometry {
                    octree_resolution: geometry.resolution(),
                    point_resolution: point_coder.point_resolution(),
                    color_bit_depth: color_coder.bit_depth(),
                    depth: geometry.depth(),
                    cube_min: *geometry.min(),
                })
            } else {
                None
            },
        };
        debug!(
            "Encoding {:?} {} with {} points in {} voxels",
            header.frame_type, header.frame_id, header.point_count, header.voxel_count
        );
        header.write_to(writer)?;

        let mut streams = vec![];
        for kind in header.streams() {
            let symbols = match kind {
                StreamKind::Occupancy => &occupancy,
                StreamKind::LeafFlags => &leaf_flags,
                StreamKind::PointCounts => &point_counts,
                StreamKind::Residuals => &residuals,
                StreamKind::Colors => &colors,
            };
            streams.push(write_stream(writer, kind, symbols, &self.entropy_coder)?);
        }

        self.geometry = Some(geometry);
        self.has_color = has_color;
        self.frame_id = self.frame_id.wrapping_add(1);
        self.frames_since_i_frame = if is_i_frame {
            0
        } else {
            self.frames_since_i_frame + 1
        };

        Ok(FrameStatistics {
            frame_id: header.frame_id,
            is_i_frame,
            point_count: header.point_count,
            voxel_count: header.voxel_count,
            carried_over_voxels,
            header_bytes: header.encoded_len() as u64,
            streams,
        })
    }

    /// Reads the next frame from `reader` and writes its points to `cloud`, replacing its previous content
    ///
    /// # Errors
    ///
    /// - [CompressionError::InvalidHeader] if the frame header is invalid
    /// - [CompressionError::MissingReferenceFrame] for a P-frame that does not follow the previously decoded frame
    /// - [CompressionError::Truncated] if `reader` ends within the frame
    /// - [CompressionError::CorruptStream] if the frame content is inconsistent
    ///
    /// After an error, only an I-frame can be decoded next
    pub fn decode_point_cloud<R: Read>(
        &mut self,
        reader: &mut R,
        cloud: &mut VecPointCloud,
    ) -> Result<FrameStatistics> {
        let needs_i_frame = self.state == CodecState::NeedsIFrame;
        self.state = CodecState::DecodingFrame;
        match self.decode_frame(reader, cloud, needs_i_frame) {
            Ok(statistics) => {
                self.state = CodecState::Idle;
                if self.config.show_statistics {
                    statistics.log();
                }
                Ok(statistics)
            }
            Err(e) => {
                self.state = CodecState::NeedsIFrame;
                Err(e)
            }
        }
    }

    /// Like [decode_point_cloud](PointCloudCompression::decode_point_cloud), but decodes into the output cloud of
    /// this codec. Creates the output cloud if none is set
    pub fn decode_to_output<R: Read>(&mut self, reader: &mut R) -> Result<FrameStatistics> {
        let mut cloud = self.output.take().unwrap_or_default();
        let result = self.decode_point_cloud(reader, &mut cloud);
        self.output = Some(cloud);
        result
    }

    fn decode_frame<R: Read>(
        &mut self,
        reader: &mut R,
        cloud: &mut VecPointCloud,
        needs_i_frame: bool,
    ) -> Result<FrameStatistics> {
        let header = FrameHeader::read_from(reader)?;
        let is_i_frame = header.is_i_frame();
        debug!(
            "Decoding {:?} {} with {} points in {} voxels",
            header.frame_type, header.frame_id, header.point_count, header.voxel_count
        );

        let geometry = match &header.geometry {
            Some(frame_geometry) => {
                let geometry = OctreeGeometry::new(
                    frame_geometry.cube_min,
                    frame_geometry.octree_resolution,
                    frame_geometry.depth,
                )
                .context(CompressionError::InvalidHeader("Invalid octree geometry".into()))?;
                self.point_coder =
                    PointCoder::new(frame_geometry.point_resolution, frame_geometry.octree_resolution);
                self.color_coder = ColorCoder::new(frame_geometry.color_bit_depth);
                self.voxel_grid = header.voxel_grid;
                self.octree.clear();
                self.octree.set_depth(geometry.depth());
                geometry
            }
            None => {
                let geometry = match self.geometry {
                    Some(geometry) if !needs_i_frame && header.frame_id == self.frame_id => geometry,
                    _ => {
                        return Err(CompressionError::MissingReferenceFrame {
                            frame_id: header.frame_id,
                        }
                        .into())
                    }
                };
                if header.voxel_grid != self.voxel_grid || header.has_color != self.has_color {
                    return Err(corrupt(
                        "P-frame has different color or voxel-grid settings than its reference frame",
                    ));
                }
                self.octree.switch_buffers();
                geometry
            }
        };

        let voxel_grid = header.voxel_grid;
        let has_color = header.has_color;
        let point_coder = self.point_coder;
        let bytes_per_point = point_coder.bytes_per_point();
        let voxel_count = header.voxel_count;
        let point_count = header.point_count;

        let mut streams = vec![];
        let mut occupancy = vec![];
        let mut leaf_flags = vec![];
        let mut point_counts = vec![];
        let mut residuals = vec![];
        let mut colors = vec![];
        for kind in header.streams() {
            let (target, max_symbols) = match kind {
                StreamKind::Occupancy => (
                    &mut occupancy,
                    voxel_count.saturating_mul(geometry.depth() as u64),
                ),
                StreamKind::LeafFlags => (&mut leaf_flags, voxel_count),
                StreamKind::PointCounts => (&mut point_counts, voxel_count.saturating_mul(5)),
                StreamKind::Residuals => (
                    &mut residuals,
                    point_count.saturating_mul(bytes_per_point as u64),
                ),
                StreamKind::Colors => (
                    &mut colors,
                    voxel_count.saturating_add(point_count).saturating_mul(3),
                ),
            };
            let (info, symbols) = read_stream(reader, kind, max_symbols, &self.entropy_coder)?;
            *target = symbols;
            streams.push(info);
        }

        let mut flags = leaf_flags.iter();
        let mut point_count_position = 0_usize;
        let mut residual_position = 0_usize;
        let mut color_position = 0_usize;
        let mut carried_over_voxels = 0_u64;
        self.octree
            .deserialize_tree_delta(&occupancy, |_, leaf, previous| {
                if !is_i_frame {
                    match flags.next().copied() {
                        Some(0) => {
                            let previous = previous.ok_or_else(|| {
                                corrupt("Unchanged voxel does not exist in the reference frame")
                            })?;
                            leaf.copy_payload_from(previous);
                            carried_over_voxels += 1;
                            return Ok(());
                        }
                        Some(1) => {}
                        Some(flag) => return Err(corrupt(format!("Invalid leaf flag {}", flag))),
                        None => return Err(corrupt("Leaf flag stream ended early")),
                    }
                }
                let coded_point_count = if voxel_grid {
                    1
                } else {
                    read_leb128(&point_counts, &mut point_count_position)?
                };
                if coded_point_count == 0 {
                    return Err(corrupt("Voxel without points"));
                }

                let residual_len = if voxel_grid {
                    0
                } else {
                    coded_point_count as usize * bytes_per_point
                };
                let leaf_residuals = residuals
                    .get(residual_position..residual_position + residual_len)
                    .ok_or_else(|| corrupt("Residual stream ended early"))?
                    .to_vec();
                residual_position += residual_len;

                let color_len = if has_color {
                    ColorCoder::coded_len(coded_point_count as usize, !voxel_grid)
                } else {
                    0
                };
                let leaf_colors = colors
                    .get(color_position..color_position + color_len)
                    .ok_or_else(|| corrupt("Color stream ended early"))?
                    .to_vec();
                color_position += color_len;

                leaf.set_payload(coded_point_count, leaf_residuals, leaf_colors);
                Ok(())
            })
            .map_err(|e| {
                if e.downcast_ref::<OctreeError>().is_some() {
                    e.context(CompressionError::CorruptStream("Invalid octree structure".into()))
                } else {
                    e
                }
            })?;

        if flags.len() > 0
            || point_count_position != point_counts.len()
            || residual_position != residuals.len()
            || color_position != colors.len()
        {
            return Err(corrupt("Frame contains more data than its voxels use"));
        }
        let current = self.octree.current();
        if current.leaf_count() as u64 != voxel_count {
            return Err(corrupt(format!(
                "Frame header announces {} voxels, but the octree has {}",
                voxel_count,
                current.leaf_count()
            )));
        }

        cloud.reset(has_color);
        cloud.reserve(point_count.min(1 << 24) as usize);
        for (key, leaf) in current.leaves() {
            let count = leaf.coded_point_count() as usize;
            let point_colors = if has_color {
                Some(
                    self.color_coder
                        .decode_voxel(leaf.colors(), count, !voxel_grid)
                        .map_err(|e| corrupt(e.to_string()))?,
                )
            } else {
                None
            };
            let positions = if voxel_grid {
                vec![geometry.voxel_center(&key).coords]
            } else {
                let voxel_min = geometry.voxel_min(&key);
                if leaf.residuals().len() != count * bytes_per_point {
                    return Err(corrupt("Voxel has the wrong number of residual bytes"));
                }
                leaf.residuals()
                    .chunks_exact(bytes_per_point)
                    .map(|bytes| point_coder.decode_point(bytes, &voxel_min))
                    .collect::<Result<Vec<_>>>()?
            };
            match &point_colors {
                Some(point_colors) => {
                    for (position, color) in positions.into_iter().zip(point_colors.iter()) {
                        cloud.push_colored(position, *color);
                    }
                }
                None => {
                    for position in positions {
                        cloud.push(position);
                    }
                }
            }
        }
        if cloud.len() as u64 != point_count {
            return Err(corrupt(format!(
                "Frame header announces {} points, but {} were decoded",
                point_count,
                cloud.len()
            )));
        }

        self.geometry = Some(geometry);
        self.has_color = has_color;
        self.frame_id = header.frame_id.wrapping_add(1);
        self.frames_since_i_frame = if is_i_frame {
            0
        } else {
            self.frames_since_i_frame + 1
        };

        Ok(FrameStatistics {
            frame_id: header.frame_id,
            is_i_frame,
            point_count,
            voxel_count,
            carried_over_voxels,
            header_bytes: header.encoded_len() as u64,
            streams,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionProfile;
    use voxtree_core::nalgebra::Vector3;

    fn grid_cloud(offset: f64) -> VecPointCloud {
        let mut cloud = VecPointCloud::new_with_colors();
        for x in 0..10 {
            for y in 0..10 {
                let position = Vector3::new(x as f64 * 0.1 + offset, y as f64 * 0.1 + 0.05, 0.5);
                cloud.push_colored(position, Vector3::new(x * 20, y * 20, 200));
            }
        }
        cloud
    }

    fn manual_config() -> CompressionConfig {
        CompressionConfig {
            octree_resolution: 0.05,
            point_resolution: 0.001,
            i_frame_rate: 10,
            color_bit_depth: 8,
            ..CompressionConfig::from_profile(CompressionProfile::Manual)
        }
    }

    #[test]
    fn test_frame_types_follow_i_frame_rate() {
        let config = CompressionConfig {
            i_frame_rate: 3,
            ..manual_config()
        };
        let mut encoder = PointCloudCompression::new(config).unwrap();
        let cloud = grid_cloud(0.025);
        let is_i_frame = (0..7)
            .map(|_| {
                let mut bytes = vec![];
                encoder.encode_point_cloud(&cloud, &mut bytes).unwrap().is_i_frame
            })
            .collect::<Vec<_>>();
        assert_eq!(vec![true, false, false, true, false, false, true], is_i_frame);
        assert_eq!(7, encoder.frame_id());
    }

    #[test]
    fn test_static_p_frame_carries_over_everything() {
        let mut encoder = PointCloudCompression::new(manual_config()).unwrap();
        let mut decoder = PointCloudCompression::new(manual_config()).unwrap();
        let cloud = grid_cloud(0.025);

        let mut stream = vec![];
        let first = encoder.encode_point_cloud(&cloud, &mut stream).unwrap();
        let second = encoder.encode_point_cloud(&cloud, &mut stream).unwrap();
        assert!(first.is_i_frame);
        assert!(!second.is_i_frame);
        assert_eq!(second.voxel_count, second.carried_over_voxels);
        assert!(second.total_bytes() < first.total_bytes());
        assert_eq!(16, second.stream_bytes(StreamKind::Residuals));

        let mut reader = stream.as_slice();
        let mut first_decoded = VecPointCloud::new();
        let mut second_decoded = VecPointCloud::new();
        decoder.decode_point_cloud(&mut reader, &mut first_decoded).unwrap();
        let statistics = decoder.decode_point_cloud(&mut reader, &mut second_decoded).unwrap();
        assert!(reader.is_empty());
        assert_eq!(second.carried_over_voxels, statistics.carried_over_voxels);
        assert_eq!(first_decoded, second_decoded);
        assert_eq!(cloud.len(), second_decoded.len());
    }

    #[test]
    fn test_point_outside_of_octree_forces_i_frame() {
        let mut encoder = PointCloudCompression::new(manual_config()).unwrap();
        let mut bytes = vec![];
        encoder.encode_point_cloud(&grid_cloud(0.025), &mut bytes).unwrap();
        let mut moved = grid_cloud(0.025);
        moved.push_colored(Vector3::new(25.0, 0.0, 0.0), Vector3::new(1, 2, 3));
        assert!(encoder.encode_point_cloud(&moved, &mut bytes).unwrap().is_i_frame);
    }

    #[test]
    fn test_colors_are_decoded() {
        let mut encoder = PointCloudCompression::new(manual_config()).unwrap();
        let mut decoder = PointCloudCompression::new(manual_config()).unwrap();
        let cloud = grid_cloud(0.025);
        let mut stream = vec![];
        encoder.encode_point_cloud(&cloud, &mut stream).unwrap();
        decoder.decode_to_output(&mut stream.as_slice()).unwrap();

        let decoded = decoder.take_output_cloud().unwrap();
        assert!(decoded.has_colors());
        let mut expected = cloud.colors().unwrap().to_vec();
        let mut found = decoded.colors().unwrap().to_vec();
        expected.sort_by_key(|c| (c.x, c.y, c.z));
        found.sort_by_key(|c| (c.x, c.y, c.z));
        assert_eq!(expected, found);
        assert!(decoder.output_cloud().is_none());

        // A previously set output cloud is replaced by the decoded frame
        let mut stale = grid_cloud(0.01);
        stale.push_colored(Vector3::new(0.3, 0.3, 0.3), Vector3::new(1, 2, 3));
        decoder.set_output_cloud(stale);
        let mut i_frame = vec![];
        PointCloudCompression::new(manual_config())
            .unwrap()
            .encode_point_cloud(&cloud, &mut i_frame)
            .unwrap();
        decoder.decode_to_output(&mut i_frame.as_slice()).unwrap();
        assert_eq!(&decoded, decoder.output_cloud().unwrap());
    }

    #[test]
    fn test_failed_decode_requires_i_frame() {
        let mut encoder = PointCloudCompression::new(manual_config()).unwrap();
        let mut decoder = PointCloudCompression::new(manual_config()).unwrap();
        let cloud = grid_cloud(0.025);
        let mut i_frame = vec![];
        let mut p_frame = vec![];
        encoder.encode_point_cloud(&cloud, &mut i_frame).unwrap();
        encoder.encode_point_cloud(&cloud, &mut p_frame).unwrap();

        let mut decoded = VecPointCloud::new();
        decoder
            .decode_point_cloud(&mut i_frame.as_slice(), &mut decoded)
            .unwrap();
        assert!(decoder
            .decode_point_cloud(&mut &p_frame[..p_frame.len() - 2], &mut decoded)
            .is_err());
        assert_eq!(CodecState::NeedsIFrame, decoder.state());

        let err = decoder
            .decode_point_cloud(&mut p_frame.as_slice(), &mut decoded)
            .unwrap_err();
        assert_eq!(
            Some(&CompressionError::MissingReferenceFrame { frame_id: 1 }),
            err.downcast_ref::<CompressionError>()
        );
        decoder
            .decode_point_cloud(&mut i_frame.as_slice(), &mut decoded)
            .unwrap();
        assert_eq!(CodecState::Idle, decoder.state());
    }
}
