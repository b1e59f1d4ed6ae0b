use anyhow::{bail, Result};

/// Meaning of a single column of an ASCII point file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AsciiField {
    Skip,
    CoordinateX,
    CoordinateY,
    CoordinateZ,
    ColorR,
    ColorG,
    ColorB,
}

impl std::fmt::Display for AsciiField {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl AsciiField {
    pub(crate) fn literal(&self) -> char {
        match self {
            AsciiField::Skip => 's',
            AsciiField::CoordinateX => 'x',
            AsciiField::CoordinateY => 'y',
            AsciiField::CoordinateZ => 'z',
            AsciiField::ColorR => 'R',
            AsciiField::ColorG => 'G',
            AsciiField::ColorB => 'B',
        }
    }

    /// Parses a format string like `"xyzRGB"` into the fields of a line. Every coordinate has to appear exactly
    /// once, and the color channels either all or not at all
    pub(crate) fn parse_layout(format: &str) -> Result<Vec<AsciiField>> {
        let mut layout = Vec::with_capacity(format.len());
        for character in format.chars() {
            let field = match character {
                's' => AsciiField::Skip,
                'x' => AsciiField::CoordinateX,
                'y' => AsciiField::CoordinateY,
                'z' => AsciiField::CoordinateZ,
                'R' => AsciiField::ColorR,
                'G' => AsciiField::ColorG,
                'B' => AsciiField::ColorB,
                _ => bail!(
                    "Can't interpret format literal '{}' in format string '{}'",
                    character,
                    format
                ),
            };
            if field != AsciiField::Skip && layout.contains(&field) {
                bail!(
                    "Format literal '{}' appears more than once in format string '{}'",
                    character,
                    format
                );
            }
            layout.push(field);
        }
        for coordinate in [
            AsciiField::CoordinateX,
            AsciiField::CoordinateY,
            AsciiField::CoordinateZ,
        ]
        .iter()
        {
            if !layout.contains(coordinate) {
                bail!(
                    "Format string '{}' is missing the format literal '{}'",
                    format,
                    coordinate.literal()
                );
            }
        }
        let color_channels = layout
            .iter()
            .filter(|field| {
                matches!(
                    field,
                    AsciiField::ColorR | AsciiField::ColorG | AsciiField::ColorB
                )
            })
            .count();
        if color_channels != 0 && color_channels != 3 {
            bail!(
                "Format string '{}' must contain either all of 'R', 'G' and 'B' or none of them",
                format
            );
        }
        Ok(layout)
    }

    pub(crate) fn layout_has_colors(layout: &[AsciiField]) -> bool {
        layout.contains(&AsciiField::ColorR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layout() {
        assert_eq!(
            vec![
                AsciiField::CoordinateX,
                AsciiField::CoordinateY,
                AsciiField::Skip,
                AsciiField::CoordinateZ,
                AsciiField::ColorR,
                AsciiField::ColorG,
                AsciiField::ColorB
            ],
            AsciiField::parse_layout("xyszRGB").unwrap()
        );
        assert!(!AsciiField::layout_has_colors(
            &AsciiField::parse_layout("zyx").unwrap()
        ));
    }

    #[test]
    fn test_invalid_layouts() {
        for format in ["xyzi", "xy", "xyzx", "xyzRG", ""].iter() {
            assert!(AsciiField::parse_layout(format).is_err(), "{}", format);
        }
    }
}
