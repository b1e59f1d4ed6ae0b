use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{bail, Context, Result};
use voxtree_core::nalgebra::Vector3;
use voxtree_core::containers::PointCloud;

use super::AsciiField;

/// Writes points as text, one point per line. Values are separated by `", "` and written with 5 decimal places
/// unless configured otherwise
///
/// ```
/// # use voxtree_io::ascii::AsciiWriter;
/// # use voxtree_core::containers::VecPointCloud;
/// # use voxtree_core::nalgebra::Vector3;
/// let cloud = VecPointCloud::from_positions(vec![Vector3::new(1.0, 0.25, -3.125)]);
/// let mut out = vec![];
/// let mut writer = AsciiWriter::from_write(&mut out, "xyz").unwrap();
/// writer.write(&cloud).unwrap();
/// drop(writer);
/// assert_eq!("1.0, 0.25, -3.125\n", String::from_utf8(out).unwrap());
/// ```
pub struct AsciiWriter<W: Write> {
    writer: W,
    delimiter: String,
    precision: usize,
    layout: Vec<AsciiField>,
}

impl<W: Write> AsciiWriter<W> {
    /// Creates a writer with the given format (see the [module documentation](crate::ascii)). Columns with the
    /// format literal `s` are left empty
    pub fn from_write(write: W, format: &str) -> Result<Self> {
        Ok(Self {
            writer: write,
            delimiter: String::from(", "),
            precision: 5,
            layout: AsciiField::parse_layout(format)?,
        })
    }

    pub fn set_delimiter(&mut self, delimiter: &str) {
        self.delimiter = String::from(delimiter);
    }

    /// Sets the number of decimal places for coordinates. Trailing zeros are omitted
    pub fn set_precision(&mut self, precision: usize) {
        self.precision = precision;
    }

    /// Writes all points of `cloud`
    ///
    /// # Errors
    ///
    /// If the format includes colors but `cloud` has none, or if writing fails
    pub fn write<C: PointCloud>(&mut self, cloud: &C) -> Result<()> {
        if AsciiField::layout_has_colors(&self.layout) && !cloud.has_colors() {
            bail!("Format requires colors, but the point cloud has none");
        }
        for index in 0..cloud.len() {
            let position = cloud.position(index);
            let color = cloud.color(index).unwrap_or_else(Vector3::zeros);
            for (column, field) in self.layout.iter().enumerate() {
                match field {
                    AsciiField::Skip => {}
                    AsciiField::CoordinateX => write_coordinate(&mut self.writer, position.x, self.precision)?,
                    AsciiField::CoordinateY => write_coordinate(&mut self.writer, position.y, self.precision)?,
                    AsciiField::CoordinateZ => write_coordinate(&mut self.writer, position.z, self.precision)?,
                    AsciiField::ColorR => write!(self.writer, "{}", color.x)?,
                    AsciiField::ColorG => write!(self.writer, "{}", color.y)?,
                    AsciiField::ColorB => write!(self.writer, "{}", color.z)?,
                }
                if column != self.layout.len() - 1 {
                    self.writer.write_all(self.delimiter.as_bytes())?;
                }
            }
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl AsciiWriter<BufWriter<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, format: &str) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Could not create {}", path.as_ref().display()))?;
        Self::from_write(BufWriter::new(file), format)
    }
}

fn write_coordinate<W: Write>(writer: &mut W, value: f64, precision: usize) -> Result<()> {
    let formatted = format!("{:.1$}", value, precision);
    writer.write_all(trim_unnecessary_trailing_zeros(&formatted).as_bytes())?;
    Ok(())
}

fn trim_unnecessary_trailing_zeros(value: &str) -> &str {
    if !value.contains('.') {
        return value;
    }
    let mut end = value.len();
    while value[..end].ends_with('0') && !value[..end].ends_with(".0") {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ascii::AsciiReader;
    use voxtree_core::containers::VecPointCloud;

    #[test]
    fn test_trim_trailing_zeros() {
        assert_eq!("1.0", trim_unnecessary_trailing_zeros("1.00000"));
        assert_eq!("0.125", trim_unnecessary_trailing_zeros("0.12500"));
        assert_eq!("100", trim_unnecessary_trailing_zeros("100"));
    }

    #[test]
    fn test_write_then_read() {
        let cloud = VecPointCloud::from_positions_and_colors(
            vec![Vector3::new(0.5, -1.25, 1000.0), Vector3::new(3.0, 2.0, 1.0)],
            vec![Vector3::new(1, 2, 3), Vector3::new(255, 128, 0)],
        );
        let mut text = vec![];
        {
            let mut writer = AsciiWriter::from_write(&mut text, "xyzsRGB").unwrap();
            writer.set_delimiter(" ");
            writer.write(&cloud).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(
            "0.5 -1.25 1000.0  1 2 3\n3.0 2.0 1.0  255 128 0\n",
            String::from_utf8(text.clone()).unwrap()
        );

        let mut reader = AsciiReader::from_read(text.as_slice(), "xyzRGB", " ").unwrap();
        assert_eq!(cloud, reader.read_all().unwrap());
    }

    #[test]
    fn test_precision() {
        let cloud = VecPointCloud::from_positions(vec![Vector3::new(0.123456, 1.0, 2.0)]);
        let mut text = vec![];
        {
            let mut writer = AsciiWriter::from_write(&mut text, "xyz").unwrap();
            writer.set_precision(2);
            writer.write(&cloud).unwrap();
        }
        assert_eq!("0.12, 1.0, 2.0\n", String::from_utf8(text).unwrap());
    }

    #[test]
    fn test_colors_required() {
        let cloud = VecPointCloud::from_positions(vec![Vector3::zeros()]);
        let mut writer = AsciiWriter::from_write(vec![], "xyzRGB").unwrap();
        assert!(writer.write(&cloud).is_err());
    }
}
