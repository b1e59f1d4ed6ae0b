use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    str::FromStr,
};

use anyhow::{bail, Context, Result};
use itertools::{EitherOrBoth::*, Itertools};
use voxtree_core::nalgebra::Vector3;
use voxtree_core::containers::{PointCloud, VecPointCloud};

use super::AsciiField;

/// Reads points from text, one point per line. Empty lines and lines starting with `#` are ignored
///
/// ```
/// # use voxtree_io::ascii::AsciiReader;
/// # use voxtree_core::containers::PointCloud;
/// let text = "0.5, 1.0, 2.0, 255, 0, 0\n# comment\n1.5, 2.0, 3.0, 0, 255, 0\n";
/// let mut reader = AsciiReader::from_read(text.as_bytes(), "xyzRGB", ", ").unwrap();
/// let cloud = reader.read_all().unwrap();
/// assert_eq!(2, cloud.len());
/// assert!(cloud.has_colors());
/// ```
pub struct AsciiReader<R: BufRead> {
    reader: R,
    delimiter: String,
    layout: Vec<AsciiField>,
    line: String,
    line_number: usize,
}

impl<R: BufRead> AsciiReader<R> {
    /// Creates a reader for lines with the given format (see the [module documentation](crate::ascii)) whose values
    /// are separated by `delimiter`. A delimiter that consists only of whitespace matches any run of whitespace
    pub fn from_read(read: R, format: &str, delimiter: &str) -> Result<Self> {
        if delimiter.is_empty() {
            bail!("Delimiter must not be empty");
        }
        Ok(Self {
            reader: read,
            delimiter: delimiter.to_string(),
            layout: AsciiField::parse_layout(format)?,
            line: String::new(),
            line_number: 0,
        })
    }

    /// Returns true if the format includes colors
    pub fn has_colors(&self) -> bool {
        AsciiField::layout_has_colors(&self.layout)
    }

    /// Reads up to `count` points. Fewer points are returned at the end of the input
    pub fn read(&mut self, count: usize) -> Result<VecPointCloud> {
        let mut cloud = VecPointCloud::with_capacity(count.min(1 << 20), self.has_colors());
        while cloud.len() < count {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                break;
            }
            self.line_number += 1;
            let line = self.line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (position, color) = parse_line(line, &self.delimiter, &self.layout)
                .with_context(|| format!("Invalid point in line {}", self.line_number))?;
            match color {
                Some(color) => cloud.push_colored(position, color),
                None => cloud.push(position),
            }
        }
        Ok(cloud)
    }

    /// Reads all remaining points
    pub fn read_all(&mut self) -> Result<VecPointCloud> {
        self.read(usize::MAX)
    }
}

impl AsciiReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, format: &str, delimiter: &str) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Could not open {}", path.as_ref().display()))?;
        Self::from_read(BufReader::new(file), format, delimiter)
    }
}

fn parse_value<T: FromStr>(value: &str, field: AsciiField) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse::<T>().with_context(|| {
        format!(
            "Could not parse '{}' as {} for format literal '{}'",
            value,
            field,
            field.literal()
        )
    })
}

fn parse_line(
    line: &str,
    delimiter: &str,
    layout: &[AsciiField],
) -> Result<(Vector3<f64>, Option<Vector3<u8>>)> {
    let values: Box<dyn Iterator<Item = &str>> = if delimiter.trim().is_empty() {
        Box::new(line.split_whitespace())
    } else {
        Box::new(line.split(delimiter))
    };
    let mut position = Vector3::zeros();
    let mut color = Vector3::zeros();
    for pair in values.zip_longest(layout) {
        match pair {
            Both(value, field) => match field {
                AsciiField::Skip => {}
                AsciiField::CoordinateX => position.x = parse_value(value, *field)?,
                AsciiField::CoordinateY => position.y = parse_value(value, *field)?,
                AsciiField::CoordinateZ => position.z = parse_value(value, *field)?,
                AsciiField::ColorR => color.x = parse_value(value, *field)?,
                AsciiField::ColorG => color.y = parse_value(value, *field)?,
                AsciiField::ColorB => color.z = parse_value(value, *field)?,
            },
            Left(_) => bail!("Line has more values than the format string has literals"),
            Right(field) => bail!(
                "Line has no value for format literal '{}'",
                field.literal()
            ),
        }
    }
    let color = if AsciiField::layout_has_colors(layout) {
        Some(color)
    } else {
        None
    };
    Ok((position, color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxtree_core::containers::PointCloud;

    #[test]
    fn test_read_with_skipped_columns() {
        let text = "1 2 0.5 3\n\n4\t5 0.25 6\n";
        let mut reader = AsciiReader::from_read(text.as_bytes(), "xysz", " ").unwrap();
        let cloud = reader.read_all().unwrap();
        assert!(!cloud.has_colors());
        assert_eq!(
            &[Vector3::new(1.0, 2.0, 3.0), Vector3::new(4.0, 5.0, 6.0)],
            cloud.positions()
        );
    }

    #[test]
    fn test_read_in_chunks() {
        let text = (0..10)
            .map(|i| format!("{};{};{};{};{};{}\n", i, i, i, i, 2 * i, 3 * i))
            .collect::<String>();
        let mut reader = AsciiReader::from_read(text.as_bytes(), "zyxBGR", ";").unwrap();
        let first = reader.read(4).unwrap();
        let second = reader.read(100).unwrap();
        assert_eq!(4, first.len());
        assert_eq!(6, second.len());
        assert_eq!(Some(Vector3::new(12, 8, 4)), second.color(0));
        assert!(reader.read(1).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_lines() {
        for text in ["1, 2", "1, 2, 3, 4", "1, a, 3", "1, 2, 3e"].iter() {
            let mut reader = AsciiReader::from_read(text.as_bytes(), "xyz", ", ").unwrap();
            let err = reader.read_all().unwrap_err();
            assert!(err.to_string().contains("line 1"), "{}", text);
        }
        let mut reader = AsciiReader::from_read("1,2,3,256,0,0".as_bytes(), "xyzRGB", ",").unwrap();
        assert!(reader.read_all().is_err());
    }
}
