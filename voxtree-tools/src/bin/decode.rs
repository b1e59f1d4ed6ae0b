#![warn(clippy::all)]

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
    time::Instant,
};

use anyhow::{bail, Context, Result};
use clap::{value_t, App, Arg};
use log::info;
use voxtree_core::containers::PointCloud;
use voxtree_io::{
    ascii::AsciiWriter,
    compression::{CompressionConfig, PointCloudCompression},
};

struct Args {
    pub input_file: PathBuf,
    pub output_dir: PathBuf,
    pub format: String,
    pub delimiter: String,
    pub precision: usize,
    pub show_statistics: bool,
}

fn get_args() -> Result<Args> {
    let matches = App::new("pcc-decode")
        .version("0.1")
        .about("Decodes a voxtree point cloud stream into one ASCII point cloud file per frame")
        .arg(Arg::with_name("INPUT").short("i").takes_value(true).value_name("INPUT").help("Input stream file").required(true))
        .arg(Arg::with_name("OUTPUT").short("o").takes_value(true).value_name("OUTPUT").help("Output directory").required(true))
        .arg(Arg::with_name("FORMAT").short("f").long("format").takes_value(true).value_name("FORMAT").help("Columns of the output files: x, y, z for coordinates, R, G, B for colors, s for an empty column").default_value("xyz"))
        .arg(Arg::with_name("DELIMITER").short("d").long("delimiter").takes_value(true).value_name("DELIMITER").help("Separator between the columns of the output files").default_value(" "))
        .arg(Arg::with_name("PRECISION").long("precision").takes_value(true).value_name("PRECISION").help("Decimal places of the coordinates").default_value("5"))
        .arg(Arg::with_name("STATS").short("s").long("stats").help("Log statistics for every frame"))
        .get_matches();

    let output_dir: PathBuf = matches.value_of("OUTPUT").unwrap().into();
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir)?;
    }

    Ok(Args {
        input_file: matches.value_of("INPUT").unwrap().into(),
        output_dir,
        format: matches.value_of("FORMAT").unwrap().to_string(),
        delimiter: matches.value_of("DELIMITER").unwrap().to_string(),
        precision: value_t!(matches, "PRECISION", usize)?,
        show_statistics: matches.is_present("STATS"),
    })
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let args = get_args()?;
    let mut reader = BufReader::new(
        File::open(&args.input_file)
            .with_context(|| format!("Could not open {}", args.input_file.display()))?,
    );

    // Coder parameters are read from the stream, the configuration only controls logging
    let config = CompressionConfig {
        show_statistics: args.show_statistics,
        ..Default::default()
    };
    let mut decoder = PointCloudCompression::new(config)?;

    let t_start = Instant::now();
    let mut frames = 0;
    let mut total_points = 0;
    while !reader.fill_buf()?.is_empty() {
        let statistics = decoder
            .decode_to_output(&mut reader)
            .with_context(|| format!("Could not decode frame {}", frames))?;
        let cloud = match decoder.output_cloud() {
            Some(cloud) => cloud,
            None => bail!("Decoder has no output cloud"),
        };

        let output_file = args
            .output_dir
            .join(format!("frame_{:05}.txt", statistics.frame_id));
        let mut writer = AsciiWriter::from_path(&output_file, &args.format)?;
        writer.set_delimiter(&args.delimiter);
        writer.set_precision(args.precision);
        writer
            .write(cloud)
            .with_context(|| format!("Could not write {}", output_file.display()))?;
        writer.flush()?;

        frames += 1;
        total_points += cloud.len();
    }

    info!(
        "Decoded {} frames with {} points in {:.2}s",
        frames,
        total_points,
        t_start.elapsed().as_secs_f64()
    );
    Ok(())
}
