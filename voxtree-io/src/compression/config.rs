use std::{fmt::Display, str::FromStr};

use anyhow::{bail, Result};

use super::CompressionError;

/// Predefined parameter bundles for [CompressionConfig]. "Online" profiles send I-frames more often, so that a
/// receiver can join a running stream quickly. "Offline" profiles favour compression ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompressionProfile {
    LowResOnlineWithoutColor,
    LowResOnlineWithColor,
    MedResOnlineWithoutColor,
    MedResOnlineWithColor,
    HighResOnlineWithoutColor,
    HighResOnlineWithColor,
    LowResOfflineWithoutColor,
    LowResOfflineWithColor,
    MedResOfflineWithoutColor,
    MedResOfflineWithColor,
    HighResOfflineWithoutColor,
    HighResOfflineWithColor,
    /// Parameters are set by hand
    Manual,
}

impl CompressionProfile {
    /// All profiles except [Manual](CompressionProfile::Manual)
    pub const PREDEFINED: [CompressionProfile; 12] = [
        CompressionProfile::LowResOnlineWithoutColor,
        CompressionProfile::LowResOnlineWithColor,
        CompressionProfile::MedResOnlineWithoutColor,
        CompressionProfile::MedResOnlineWithColor,
        CompressionProfile::HighResOnlineWithoutColor,
        CompressionProfile::HighResOnlineWithColor,
        CompressionProfile::LowResOfflineWithoutColor,
        CompressionProfile::LowResOfflineWithColor,
        CompressionProfile::MedResOfflineWithoutColor,
        CompressionProfile::MedResOfflineWithColor,
        CompressionProfile::HighResOfflineWithoutColor,
        CompressionProfile::HighResOfflineWithColor,
    ];

    /// Name of this profile as used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            CompressionProfile::LowResOnlineWithoutColor => "low-res-online",
            CompressionProfile::LowResOnlineWithColor => "low-res-online-color",
            CompressionProfile::MedResOnlineWithoutColor => "med-res-online",
            CompressionProfile::MedResOnlineWithColor => "med-res-online-color",
            CompressionProfile::HighResOnlineWithoutColor => "high-res-online",
            CompressionProfile::HighResOnlineWithColor => "high-res-online-color",
            CompressionProfile::LowResOfflineWithoutColor => "low-res-offline",
            CompressionProfile::LowResOfflineWithColor => "low-res-offline-color",
            CompressionProfile::MedResOfflineWithoutColor => "med-res-offline",
            CompressionProfile::MedResOfflineWithColor => "med-res-offline-color",
            CompressionProfile::HighResOfflineWithoutColor => "high-res-offline",
            CompressionProfile::HighResOfflineWithColor => "high-res-offline-color",
            CompressionProfile::Manual => "manual",
        }
    }
}

impl Display for CompressionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CompressionProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == CompressionProfile::Manual.name() {
            return Ok(CompressionProfile::Manual);
        }
        match CompressionProfile::PREDEFINED
            .iter()
            .find(|profile| profile.name() == s)
        {
            Some(profile) => Ok(*profile),
            None => bail!("Unknown compression profile '{}'", s),
        }
    }
}

/// Parameters of [PointCloudCompression](super::PointCloudCompression)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompressionConfig {
    /// The profile these parameters came from
    pub profile: CompressionProfile,
    /// Side length of the octree voxels
    pub octree_resolution: f64,
    /// Precision of the point positions within a voxel. Must not exceed `octree_resolution`; if both are equal,
    /// voxel-grid downsampling is switched on
    pub point_resolution: f64,
    /// Encode only one point (the voxel center) per occupied voxel
    pub do_voxel_grid_downsampling: bool,
    /// Every `i_frame_rate`-th frame is an I-frame. A value of 1 encodes every frame on its own
    pub i_frame_rate: u32,
    /// Encode colors if the input cloud has them
    pub do_color_encoding: bool,
    /// Number of bits per color channel that are kept, in `[1;8]`
    pub color_bit_depth: u8,
    /// Log statistics for every frame at info level
    pub show_statistics: bool,
}

impl CompressionConfig {
    /// Parameters of the given profile. `Manual` gives a starting point for hand-tuned parameters
    ///
    /// ```
    /// # use voxtree_io::compression::{CompressionConfig, CompressionProfile};
    /// let config = CompressionConfig::from_profile(CompressionProfile::HighResOnlineWithColor);
    /// assert_eq!(0.01, config.octree_resolution);
    /// assert_eq!(7, config.color_bit_depth);
    /// ```
    pub fn from_profile(profile: CompressionProfile) -> Self {
        use CompressionProfile::*;
        // (point resolution, octree resolution, voxel grid, I-frame rate, color bit depth)
        let (point_resolution, octree_resolution, do_voxel_grid_downsampling, i_frame_rate, color_bit_depth) =
            match profile {
                LowResOnlineWithoutColor | LowResOnlineWithColor => (0.01, 0.01, true, 50, 4),
                MedResOnlineWithoutColor | MedResOnlineWithColor => (0.005, 0.01, false, 40, 5),
                HighResOnlineWithoutColor | HighResOnlineWithColor => (0.0001, 0.01, false, 30, 7),
                LowResOfflineWithoutColor | LowResOfflineWithColor => (0.01, 0.01, true, 100, 4),
                MedResOfflineWithoutColor | MedResOfflineWithColor => (0.005, 0.005, true, 100, 5),
                HighResOfflineWithoutColor | HighResOfflineWithColor => {
                    (0.0001, 0.0001, true, 100, 8)
                }
                Manual => (0.001, 0.01, false, 30, 6),
            };
        let do_color_encoding = matches!(
            profile,
            LowResOnlineWithColor
                | MedResOnlineWithColor
                | HighResOnlineWithColor
                | LowResOfflineWithColor
                | MedResOfflineWithColor
                | HighResOfflineWithColor
                | Manual
        );
        Self {
            profile,
            octree_resolution,
            point_resolution,
            do_voxel_grid_downsampling,
            i_frame_rate,
            do_color_encoding,
            color_bit_depth,
            show_statistics: false,
        }
    }

    /// Returns true if only voxel centers are encoded. This is the case if it was requested, or if the point
    /// resolution equals the octree resolution, in which case there is nothing to encode within a voxel
    pub fn uses_voxel_grid(&self) -> bool {
        self.do_voxel_grid_downsampling || self.point_resolution == self.octree_resolution
    }

    /// Checks that all parameters are in range
    ///
    /// # Errors
    ///
    /// [CompressionError::InvalidConfig] naming the first parameter that is out of range
    pub fn validate(&self) -> Result<(), CompressionError> {
        let invalid = |msg: String| Err(CompressionError::InvalidConfig(msg));
        if !self.octree_resolution.is_finite() || self.octree_resolution <= 0.0 {
            return invalid(format!(
                "Octree resolution must be positive, but was {}",
                self.octree_resolution
            ));
        }
        if !self.point_resolution.is_finite() || self.point_resolution <= 0.0 {
            return invalid(format!(
                "Point resolution must be positive, but was {}",
                self.point_resolution
            ));
        }
        if self.point_resolution > self.octree_resolution {
            return invalid(format!(
                "Point resolution ({}) must not be larger than the octree resolution ({})",
                self.point_resolution, self.octree_resolution
            ));
        }
        let steps = (self.octree_resolution / self.point_resolution).ceil();
        if steps > super::point_coding::MAX_STEPS as f64 {
            return invalid(format!(
                "Point resolution {} is too fine for octree resolution {}, at most {} steps per voxel are supported",
                self.point_resolution,
                self.octree_resolution,
                super::point_coding::MAX_STEPS
            ));
        }
        if self.i_frame_rate == 0 {
            return invalid("I-frame rate must be at least 1".into());
        }
        if self.color_bit_depth == 0 || self.color_bit_depth > 8 {
            return invalid(format!(
                "Color bit depth must be in [1;8], but was {}",
                self.color_bit_depth
            ));
        }
        Ok(())
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self::from_profile(CompressionProfile::MedResOnlineWithColor)
    }
}
