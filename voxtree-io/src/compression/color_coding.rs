use anyhow::{ensure, Result};
use voxtree_core::nalgebra::Vector3;

/// Codes the colors of a voxel as the quantized average color followed by the difference of each point's quantized
/// color to that average. Quantization keeps the `bit_depth` most significant bits of every channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorCoder {
    bit_depth: u8,
}

impl ColorCoder {
    /// Creates a coder that keeps `bit_depth` bits per channel. `bit_depth` must be in `[1;8]`
    pub fn new(bit_depth: u8) -> Self {
        Self {
            bit_depth: bit_depth.max(1).min(8),
        }
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    fn shift(&self) -> u8 {
        8 - self.bit_depth
    }

    pub fn quantize(&self, channel: u8) -> u8 {
        channel >> self.shift()
    }

    /// Maps a quantized channel back to 8 bits, placing it in the middle of its quantization step
    pub fn dequantize(&self, quantized: u8) -> u8 {
        let shift = self.shift();
        let half_step = ((1_u16 << shift) >> 1) as u8;
        ((quantized as u16) << shift) as u8 | half_step
    }

    /// Number of bytes that [encode_voxel](ColorCoder::encode_voxel) writes for `point_count` points
    pub fn coded_len(point_count: usize, with_differences: bool) -> usize {
        if point_count == 0 {
            0
        } else if with_differences {
            3 + 3 * point_count
        } else {
            3
        }
    }

    /// Appends the coded colors of one voxel to `out`. Without differences, only the average color is written
    pub fn encode_voxel(&self, colors: &[Vector3<u8>], with_differences: bool, out: &mut Vec<u8>) {
        if colors.is_empty() {
            return;
        }
        let count = colors.len() as u64;
        let mut average = [0_u8; 3];
        for channel in 0..3 {
            let sum = colors.iter().map(|color| color[channel] as u64).sum::<u64>();
            average[channel] = self.quantize(((sum + count / 2) / count) as u8);
        }
        out.extend_from_slice(&average);
        if with_differences {
            for color in colors {
                for channel in 0..3 {
                    out.push(self.quantize(color[channel]).wrapping_sub(average[channel]));
                }
            }
        }
    }

    /// Reconstructs the colors of a voxel with `point_count` points from the first
    /// [coded_len](ColorCoder::coded_len) bytes of `bytes`. Without differences, every point gets the average color
    pub fn decode_voxel(
        &self,
        bytes: &[u8],
        point_count: usize,
        with_differences: bool,
    ) -> Result<Vec<Vector3<u8>>> {
        let expected_len = Self::coded_len(point_count, with_differences);
        ensure!(
            bytes.len() >= expected_len,
            "Expected {} bytes of color data but got {}",
            expected_len,
            bytes.len()
        );
        if point_count == 0 {
            return Ok(vec![]);
        }
        let average = [bytes[0], bytes[1], bytes[2]];
        if !with_differences {
            let color = Vector3::new(
                self.dequantize(average[0]),
                self.dequantize(average[1]),
                self.dequantize(average[2]),
            );
            return Ok(vec![color; point_count]);
        }
        Ok(bytes[3..expected_len]
            .chunks_exact(3)
            .map(|diff| {
                Vector3::new(
                    self.dequantize(average[0].wrapping_add(diff[0])),
                    self.dequantize(average[1].wrapping_add(diff[1])),
                    self.dequantize(average[2].wrapping_add(diff[2])),
                )
            })
            .collect())
    }
}
