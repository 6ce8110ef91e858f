use std::{path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use clap::{App, Arg};
use log::info;
use pnts_io::{
    tiles3d::{BatchAttributeDescriptor, BatchAttributeValues, PntsDecoder, PointCloudData},
    DecoderOptions, PntsReadPositionsMode,
};

struct Args {
    pub input_file: PathBuf,
    pub detailed: bool,
    pub config_file: Option<PathBuf>,
    pub absolute: bool,
}

fn get_args() -> Result<Args> {
    let matches = App::new("pnts info")
        .version("0.1")
        .about("Prints information about the given .pnts tile")
        .arg(
            Arg::with_name("INPUT")
                .short("i")
                .takes_value(true)
                .value_name("INPUT")
                .help("Input .pnts file")
                .required(true),
        )
        .arg(
            Arg::with_name("DETAILED")
                .short("d")
                .long("detailed")
                .help("Output a detailed analysis of the tile, showing min and max values of the point data"),
        )
        .arg(
            Arg::with_name("CONFIG")
                .short("c")
                .long("config")
                .takes_value(true)
                .value_name("CONFIG")
                .help("JSON file with decoder options (max_buffer_size, max_point_count, read_positions_mode)"),
        )
        .arg(
            Arg::with_name("ABSOLUTE")
                .long("absolute")
                .help("Add RTC_CENTER to all positions"),
        )
        .get_matches();

    let input_file = PathBuf::from(
        matches
            .value_of("INPUT")
            .context("Missing input file argument")?,
    );
    let detailed = matches.is_present("DETAILED");
    let config_file = matches.value_of("CONFIG").map(PathBuf::from);
    let absolute = matches.is_present("ABSOLUTE");

    Ok(Args {
        input_file,
        detailed,
        config_file,
        absolute,
    })
}

fn load_options(args: &Args) -> Result<DecoderOptions> {
    let mut options = match &args.config_file {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read config file {}", path.display()))?;
            serde_json::from_str::<DecoderOptions>(&json)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => DecoderOptions::default(),
    };
    if args.absolute {
        options = options.with_read_positions_mode(PntsReadPositionsMode::Absolute);
    }
    Ok(options)
}

fn print_batch_table(descriptors: &[BatchAttributeDescriptor], data: &PointCloudData) {
    if descriptors.is_empty() && data.attributes.is_empty() {
        return;
    }
    println!("Batch table");
    for (idx, values) in data.attributes.iter().enumerate() {
        let name = descriptors
            .get(idx)
            .map(|d| d.name())
            .unwrap_or("<unnamed>");
        match (descriptors.get(idx), values) {
            (
                Some(BatchAttributeDescriptor::Reference {
                    component_type,
                    component_count,
                    ..
                }),
                BatchAttributeValues::Binary { .. },
            ) => println!(
                "\t{:<24}{} x {:?}, {} values",
                name,
                component_count,
                component_type,
                values.len()
            ),
            (_, BatchAttributeValues::Binary { stride, .. }) => {
                println!("\t{:<24}{} bytes, {} values", name, stride, values.len())
            }
            (_, BatchAttributeValues::Literal(literals)) => {
                println!("\t{:<24}JSON array, {} values", name, literals.len())
            }
        }
    }
}

fn minmax<const N: usize, T: Copy + PartialOrd>(values: &[T]) -> Option<([T; N], [T; N])> {
    let mut chunks = values.chunks_exact(N);
    let first: [T; N] = chunks.next()?.try_into().ok()?;
    let (mut min, mut max) = (first, first);
    for chunk in chunks {
        for (idx, &value) in chunk.iter().enumerate() {
            if value < min[idx] {
                min[idx] = value;
            }
            if value > max[idx] {
                max[idx] = value;
            }
        }
    }
    Some((min, max))
}

fn analyze_points(data: &PointCloudData) {
    let t_start = Instant::now();
    println!("Analyzing minimum and maximum values of the point data...");

    if let Some((min, max)) = minmax::<3, _>(&data.positions) {
        println!("\tX:                      {}  {}", min[0], max[0]);
        println!("\tY:                      {}  {}", min[1], max[1]);
        println!("\tZ:                      {}  {}", min[2], max[2]);
    }
    if let Some((min, max)) = minmax::<3, _>(&data.normals) {
        println!("\tNormal X:               {}  {}", min[0], max[0]);
        println!("\tNormal Y:               {}  {}", min[1], max[1]);
        println!("\tNormal Z:               {}  {}", min[2], max[2]);
    }
    if data.color_components >= 3 {
        let rgb = data
            .colors
            .chunks_exact(data.color_components)
            .flat_map(|c| c[..3].iter().copied())
            .collect::<Vec<_>>();
        if let Some((min, max)) = minmax::<3, _>(&rgb) {
            println!("\tColor R:                {}  {}", min[0], max[0]);
            println!("\tColor G:                {}  {}", min[1], max[1]);
            println!("\tColor B:                {}  {}", min[2], max[2]);
        }
    }
    if !data.batch_ids.is_empty() {
        let batch_ids = (0..data.len())
            .filter_map(|idx| data.batch_id(idx))
            .collect::<Vec<_>>();
        if let Some((min, max)) = minmax::<1, _>(&batch_ids) {
            println!("\tBatch ID:               {}  {}", min[0], max[0]);
        }
    }

    println!("Took {:.2}s", t_start.elapsed().as_secs_f64());
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let args = get_args()?;
    let options = load_options(&args)?;
    info!("Decoding {} with {:?}", args.input_file.display(), options);

    let mut decoder = PntsDecoder::new().with_options(options);
    let data = decoder
        .load_file(&args.input_file)
        .with_context(|| format!("Could not decode {}", args.input_file.display()))?;

    println!("pnts info report for {}", args.input_file.display());
    if let Some(header) = decoder.last_header() {
        println!("Header");
        println!("\tVersion:                {}", header.version);
        println!("\tByte length:            {}", header.byte_length);
        println!(
            "\tFeature table:          {} bytes JSON, {} bytes binary",
            header.feature_table_json_byte_length, header.feature_table_binary_byte_length
        );
        println!(
            "\tBatch table:            {} bytes JSON, {} bytes binary",
            header.batch_table_json_byte_length, header.batch_table_binary_byte_length
        );
        if !header.is_consistent() {
            println!(
                "\tWarning: sections sum up to {} bytes",
                header.declared_content_length()
            );
        }
    }

    if let Some(feature_table) = decoder.feature_table() {
        println!("Feature table");
        if let Some(rtc_center) = feature_table.rtc_center {
            println!(
                "\tRTC_CENTER:             {} {} {}",
                rtc_center.x, rtc_center.y, rtc_center.z
            );
        }
        if let Some(batch_length) = feature_table.batch_length {
            println!("\tBATCH_LENGTH:           {}", batch_length);
        }
        if let Some(rgba) = feature_table.constant_rgba {
            println!(
                "\tCONSTANT_RGBA:          {} {} {} {}",
                rgba.x, rgba.y, rgba.z, rgba.w
            );
        }
        for extension in feature_table.extensions.keys() {
            println!("\tExtension:              {}", extension);
        }
    }

    println!("Points");
    println!("\tCount:                  {}", data.point_count);
    println!("\tPositions:              {}", !data.positions.is_empty());
    println!("\tColors:                 {}", data.color_components > 0);
    println!("\tNormals:                {}", !data.normals.is_empty());
    println!("\tBatch IDs:              {}", !data.batch_ids.is_empty());
    if let Some(position) = data.position(0) {
        println!(
            "\tFirst position:         {} {} {}",
            position.x, position.y, position.z
        );
    }
    if let Some(color) = data.color(0) {
        println!("\tFirst color:            {:?}", color);
    }

    print_batch_table(decoder.batch_descriptors(), &data);

    if args.detailed {
        analyze_points(&data);
    }

    Ok(())
}
