#![warn(clippy::all)]

use std::{
    fs::{read_dir, File},
    io::BufWriter,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{anyhow, Context, Result};
use clap::{value_t, App, Arg};
use log::{info, warn};
use voxtree_algorithms::bounds::calculate_bounds;
use voxtree_core::containers::PointCloud;
use voxtree_io::{
    ascii::AsciiReader,
    compression::{CompressionConfig, CompressionProfile, PointCloudCompression},
};

const ASCII_EXTENSIONS: [&str; 4] = ["txt", "xyz", "asc", "csv"];

struct Args {
    pub input_files: Vec<PathBuf>,
    pub output_file: PathBuf,
    pub format: String,
    pub delimiter: String,
    pub config: CompressionConfig,
}

fn get_all_input_files<P: AsRef<Path>>(input_path: P) -> Result<Vec<PathBuf>> {
    let path = input_path.as_ref();
    if !path.exists() {
        return Err(anyhow!("Input path {} does not exist!", path.display()));
    }

    if path.is_file() {
        return Ok(vec![path.into()]);
    }

    if path.is_dir() {
        let mut files = read_dir(path)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, _>>()?;
        files.retain(|file| is_ascii_file(file));
        // Frames are encoded in the order of their file names
        files.sort();
        return Ok(files);
    }

    Err(anyhow!(
        "Input path {} is neither file nor directory!",
        path.display()
    ))
}

fn is_ascii_file(file: &Path) -> bool {
    let is_valid = file
        .extension()
        .map(|ex| ASCII_EXTENSIONS.iter().any(|valid| ex == *valid))
        .unwrap_or(false);
    if !is_valid {
        warn!("Skipping {}, which is no ASCII point cloud file", file.display());
    }
    is_valid
}

fn get_args() -> Result<Args> {
    let matches = App::new("pcc-encode")
        .version("0.1")
        .about("Compresses a sequence of ASCII point cloud files into a single voxtree point cloud stream")
        .arg(Arg::with_name("INPUT").short("i").takes_value(true).value_name("INPUT").help("Input file or directory. Directories are scanned (non-recursively) for ASCII point cloud files, which are encoded as frames in the order of their names").required(true))
        .arg(Arg::with_name("OUTPUT").short("o").takes_value(true).value_name("OUTPUT").help("Output stream file").required(true))
        .arg(Arg::with_name("FORMAT").short("f").long("format").takes_value(true).value_name("FORMAT").help("Columns of the input files: x, y, z for coordinates, R, G, B for colors, s to skip a column").default_value("xyz"))
        .arg(Arg::with_name("DELIMITER").short("d").long("delimiter").takes_value(true).value_name("DELIMITER").help("Separator between the columns of the input files. Whitespace matches any run of whitespace").default_value(" "))
        .arg(Arg::with_name("PROFILE").short("p").long("profile").takes_value(true).value_name("PROFILE").help("Compression profile, e.g. med-res-online-color. See --list-profiles").default_value("med-res-online-color"))
        .arg(Arg::with_name("LIST_PROFILES").long("list-profiles").help("Prints the available compression profiles and exits"))
        .arg(Arg::with_name("OCTREE_RESOLUTION").long("octree-resolution").takes_value(true).value_name("RESOLUTION").help("Overrides the voxel size of the profile"))
        .arg(Arg::with_name("POINT_RESOLUTION").long("point-resolution").takes_value(true).value_name("RESOLUTION").help("Overrides the point precision of the profile"))
        .arg(Arg::with_name("I_FRAME_RATE").long("i-frame-rate").takes_value(true).value_name("RATE").help("Overrides the I-frame rate of the profile"))
        .arg(Arg::with_name("COLOR_BITS").long("color-bits").takes_value(true).value_name("BITS").help("Overrides the bits per color channel of the profile"))
        .arg(Arg::with_name("VOXEL_GRID").long("voxel-grid").help("Encode only the voxel centers"))
        .arg(Arg::with_name("STATS").short("s").long("stats").help("Log statistics for every frame"))
        .get_matches();

    if matches.is_present("LIST_PROFILES") {
        for profile in CompressionProfile::PREDEFINED.iter() {
            let config = CompressionConfig::from_profile(*profile);
            println!(
                "{:<24} octree resolution {:<8} point resolution {:<8} I-frame rate {:<4} color bits {}{}",
                profile.name(),
                config.octree_resolution,
                config.point_resolution,
                config.i_frame_rate,
                config.color_bit_depth,
                if config.do_voxel_grid_downsampling { " (voxel grid)" } else { "" }
            );
        }
        std::process::exit(0);
    }

    let input_files = get_all_input_files(matches.value_of("INPUT").unwrap())?;
    let output_file: PathBuf = matches.value_of("OUTPUT").unwrap().into();

    let profile = value_t!(matches, "PROFILE", CompressionProfile)?;
    let mut config = CompressionConfig::from_profile(profile);
    if matches.is_present("OCTREE_RESOLUTION") {
        config.octree_resolution = value_t!(matches, "OCTREE_RESOLUTION", f64)?;
        config.profile = CompressionProfile::Manual;
    }
    if matches.is_present("POINT_RESOLUTION") {
        config.point_resolution = value_t!(matches, "POINT_RESOLUTION", f64)?;
        config.profile = CompressionProfile::Manual;
    }
    if matches.is_present("I_FRAME_RATE") {
        config.i_frame_rate = value_t!(matches, "I_FRAME_RATE", u32)?;
        config.profile = CompressionProfile::Manual;
    }
    if matches.is_present("COLOR_BITS") {
        config.color_bit_depth = value_t!(matches, "COLOR_BITS", u8)?;
        config.profile = CompressionProfile::Manual;
    }
    if matches.is_present("VOXEL_GRID") {
        config.do_voxel_grid_downsampling = true;
        config.profile = CompressionProfile::Manual;
    }
    config.show_statistics = matches.is_present("STATS");
    config.validate()?;

    Ok(Args {
        input_files,
        output_file,
        format: matches.value_of("FORMAT").unwrap().to_string(),
        delimiter: matches.value_of("DELIMITER").unwrap().to_string(),
        config,
    })
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let args = get_args()?;
    if args.input_files.is_empty() {
        warn!("No input files found, nothing to encode");
        return Ok(());
    }
    info!(
        "Encoding {} frames with profile {}",
        args.input_files.len(),
        args.config.profile
    );

    let t_start = Instant::now();
    let mut encoder = PointCloudCompression::new(args.config.clone())?;
    let mut writer = BufWriter::new(
        File::create(&args.output_file)
            .with_context(|| format!("Could not create {}", args.output_file.display()))?,
    );

    let mut total_points = 0;
    let mut total_bytes = 0;
    for file in args.input_files.iter() {
        let cloud = AsciiReader::from_path(file, &args.format, &args.delimiter)?
            .read_all()
            .with_context(|| format!("Could not read {}", file.display()))?;
        if let Some(bounds) = calculate_bounds(&cloud) {
            info!(
                "{}: {} points within {} - {}",
                file.display(),
                cloud.len(),
                bounds.min(),
                bounds.max()
            );
        }
        let statistics = encoder
            .encode_point_cloud(&cloud, &mut writer)
            .with_context(|| format!("Could not encode {}", file.display()))?;
        total_points += cloud.len() as u64;
        total_bytes += statistics.total_bytes();
    }

    info!(
        "Encoded {} points into {} bytes ({:.3} bytes per point) in {:.2}s",
        total_points,
        total_bytes,
        if total_points > 0 {
            total_bytes as f64 / total_points as f64
        } else {
            0.0
        },
        t_start.elapsed().as_secs_f64()
    );
    Ok(())
}
