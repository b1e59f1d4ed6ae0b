#![warn(clippy::all)]

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{App, Arg};
use voxtree_io::compression::{skip_streams, FrameHeader};

struct Args {
    pub input_file: PathBuf,
    pub detailed: bool,
}

fn get_args() -> Result<Args> {
    let matches = App::new("pcc-info")
        .version("0.1")
        .about("Prints information about the frames of a voxtree point cloud stream")
        .arg(
            Arg::with_name("INPUT")
                .short("i")
                .takes_value(true)
                .value_name("INPUT")
                .help("Input stream file")
                .required(true),
        )
        .arg(
            Arg::with_name("DETAILED")
                .short("d")
                .long("detailed")
                .help("Print the size of every stream within each frame"),
        )
        .get_matches();

    Ok(Args {
        input_file: PathBuf::from(matches.value_of("INPUT").unwrap()),
        detailed: matches.is_present("DETAILED"),
    })
}

fn print_header(header: &FrameHeader, frame_bytes: u64) {
    println!(
        "Frame {:>6}  {}  {:>10} points  {:>10} voxels  {:>10} bytes{}{}",
        header.frame_id,
        if header.is_i_frame() { "I" } else { "P" },
        header.point_count,
        header.voxel_count,
        frame_bytes,
        if header.has_color { "  color" } else { "" },
        if header.voxel_grid { "  voxel grid" } else { "" },
    );
    if let Some(geometry) = &header.geometry {
        println!(
            "\toctree resolution {}, point resolution {}, color bits {}, depth {}, minimum {}",
            geometry.octree_resolution,
            geometry.point_resolution,
            geometry.color_bit_depth,
            geometry.depth,
            geometry.cube_min
        );
    }
}

fn main() -> Result<()> {
    let args = get_args()?;
    let mut reader = BufReader::new(
        File::open(&args.input_file)
            .with_context(|| format!("Could not open {}", args.input_file.display()))?,
    );
    println!("voxtree stream report for {}", args.input_file.display());

    let mut frames = 0_u64;
    let mut i_frames = 0_u64;
    let mut total_points = 0_u64;
    let mut total_bytes = 0_u64;
    while !reader.fill_buf()?.is_empty() {
        let header = FrameHeader::read_from(&mut reader)
            .with_context(|| format!("Could not read header of frame {}", frames))?;
        let streams = skip_streams(&mut reader, &header)
            .with_context(|| format!("Could not read streams of frame {}", frames))?;
        let frame_bytes =
            header.encoded_len() as u64 + streams.iter().map(|s| s.total_bytes()).sum::<u64>();
        print_header(&header, frame_bytes);
        if args.detailed {
            for stream in streams.iter() {
                println!(
                    "\t{:<20} {:>10} bytes coded to {:>10}",
                    stream.kind.name(),
                    stream.symbol_count,
                    stream.coded_length
                );
            }
        }

        frames += 1;
        if header.is_i_frame() {
            i_frames += 1;
        }
        total_points += header.point_count;
        total_bytes += frame_bytes;
    }

    println!(
        "{} frames ({} I-frames), {} points, {} bytes",
        frames, i_frames, total_points, total_bytes
    );
    if total_points > 0 {
        println!(
            "{:.3} bytes per point",
            total_bytes as f64 / total_points as f64
        );
    }
    Ok(())
}
