//! cbcl_inspect prints the header of one or more CBCL files, and optionally the
//! first few base calls stored in each tile block

use clap::{value_t, App, Arg};
use std::path::{Path, PathBuf};

use common::cbcl_decoder::extract_tile;
use common::cbcl_header_decoder::CBCLHeader;
use common::logging::init_logger;
use common::{call_to_byte, decode_packed, Result};

fn print_header(header: &CBCLHeader) {
    println!("{}", header.cbcl_path.display());
    println!("  version: {}", header.version);
    println!("  header size: {}", header.header_size);
    println!("  bits per basecall: {}", header.bits_per_basecall);
    println!("  bits per qscore: {}", header.bits_per_qscore);
    println!("  quality bins: {}", header.bins.len());
    for (from, to) in &header.bins {
        println!("    {} -> {}", from, to);
    }
    println!("  non-PF clusters excluded: {}", header.non_pf_clusters_excluded);
    println!("  tiles: {}", header.tiles.len());
    println!("    tile\tclusters\tuncompressed\tcompressed\toffset");
    for block in header.blocks() {
        println!(
            "    {}\t{}\t{}\t{}\t{}",
            block.tile,
            block.cluster_count,
            block.uncompressed_size,
            block.compressed_size,
            block.offset
        );
    }
}

/// The first `n` calls of every block, in block order. Positions are only
/// cluster indices when non-passing clusters are kept.
fn print_preview(header: &CBCLHeader, n: usize) -> Result<()> {
    if header.non_pf_clusters_excluded {
        println!("  preview skipped: non-PF clusters are excluded from this file");
        return Ok(());
    }

    for block in header.blocks() {
        let data = extract_tile(header, &block)?;
        let calls: String = (0..n.min(block.cluster_count))
            .map(|i| {
                let call = data.get(i / 2).and_then(|&b| decode_packed(b, i));
                call_to_byte(call) as char
            })
            .collect();
        println!("    {}\t{}", block.tile, calls);
    }

    Ok(())
}

fn inspect(cbcl_path: &Path, preview: usize) -> Result<()> {
    let header = CBCLHeader::from_path(cbcl_path)?;
    print_header(&header);
    if preview > 0 {
        print_preview(&header, preview)?;
    }
    Ok(())
}

fn main() {
    let matches = App::new("cbcl_inspect")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("cbcl")
                .help("CBCL files to inspect")
                .multiple(true)
                .required(true),
        )
        .arg(
            Arg::with_name("preview")
                .long("preview")
                .help("print the first N base calls of each tile")
                .default_value("0")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .long("verbose")
                .short("v")
                .help("log progress to stderr"),
        )
        .get_matches();

    init_logger(matches.is_present("verbose"));

    let preview = value_t!(matches, "preview", usize).unwrap_or_else(|e| e.exit());

    for cbcl in matches.values_of("cbcl").unwrap() {
        let cbcl_path = PathBuf::from(cbcl);
        if let Err(e) = inspect(&cbcl_path, preview) {
            panic!("Error reading CBCL file: {}", e);
        }
    }
}
