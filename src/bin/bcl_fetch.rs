//! bcl_fetch pulls the sequences of a few clusters straight out of a run folder,
//! one tile per worker thread, without converting the run to FASTQ first.

use std::{
    io::{self, BufWriter, Write},
    path::PathBuf,
    str::FromStr,
};

use clap::{value_t, App, Arg, ArgMatches};
use log::info;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use common::logging::init_logger;
use common::{ClusterResult, Lane, Run};

/// One output line: tile, cluster, and what was read for it
type Row = (u32, usize, ClusterResult);

/// Parses a comma-separated argument, exiting with a clap error on a bad entry
fn list_of<T: FromStr>(matches: &ArgMatches, name: &str) -> Vec<T> {
    let raw = matches.value_of(name).unwrap_or_default();

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().unwrap_or_else(|_| {
                clap::Error::with_description(
                    &format!("'{}' is not a valid entry for --{}", s, name),
                    clap::ErrorKind::InvalidValue,
                )
                .exit()
            })
        })
        .collect()
}

fn write_rows(lane: Lane, rows: &[Row]) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    writeln!(out, "lane\ttile\tcluster\tsequence\taccept")?;
    for (tile, cluster, result) in rows {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            lane, tile, cluster, result.sequence, result.accept
        )?;
    }

    out.flush()
}

/// Parses command line arguments and fetches the requested clusters
fn main() {
    let matches = App::new("bcl_fetch")
        .version(clap::crate_version!())
        .arg(Arg::with_name("run-path")
            .long("run-path")
            .help("specify path to the sequencing run folder")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("lane")
            .long("lane")
            .help("lane to read, as a number (1) or a directory name (L001)")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("tiles")
            .long("tiles")
            .help("comma-separated tile numbers, e.g. 1101,1102")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("clusters")
            .long("clusters")
            .help("comma-separated cluster indices to fetch from every tile")
            .takes_value(true)
            .allow_hyphen_values(true)
            .required(true))
        .arg(Arg::with_name("start")
            .long("start")
            .help("first cycle to read, counting from 0")
            .default_value("0")
            .takes_value(true))
        .arg(Arg::with_name("end")
            .long("end")
            .help("cycle to stop before (default: every remaining cycle)")
            .takes_value(true))
        .arg(Arg::with_name("threads")
            .long("threads")
            .help("number of threads used to read tiles")
            .default_value("4")
            .takes_value(true))
        .arg(Arg::with_name("verbose")
            .long("verbose")
            .short("v")
            .help("log progress to stderr"))
        .get_matches();

    init_logger(matches.is_present("verbose"));

    let run_path = PathBuf::from(matches.value_of("run-path").unwrap());
    let lane = value_t!(matches, "lane", Lane).unwrap_or_else(|e| e.exit());
    let mut tiles: Vec<u32> = list_of(&matches, "tiles");
    tiles.sort_unstable();
    tiles.dedup();
    let clusters: Vec<i64> = list_of(&matches, "clusters");

    let start = value_t!(matches, "start", usize).unwrap_or_else(|e| e.exit());
    let end = if matches.is_present("end") {
        Some(value_t!(matches, "end", usize).unwrap_or_else(|e| e.exit()))
    } else {
        None
    };

    let threads = value_t!(matches, "threads", usize).unwrap_or_else(|e| e.exit());
    ThreadPoolBuilder::new().num_threads(threads).build_global()
        .unwrap_or_else(|e| panic!("Error configuring global threadpool: {}", e));

    let run = match Run::open(run_path) {
        Ok(run) => run,
        Err(e) => panic!("Error reading run: {}", e),
    };

    info!("fetching {} clusters from {} tiles", clusters.len(), tiles.len());

    let per_tile: common::Result<Vec<Vec<Row>>> = tiles
        .par_iter()
        .map(|&tile| -> common::Result<Vec<Row>> {
            let session = run.tile(lane, tile)?;
            let end = end.unwrap_or_else(|| session.cycle_count());

            let results = session.get_sequences(clusters.iter().copied(), start..end)?;
            info!("finished tile {}", tile);

            Ok(results
                .into_iter()
                .map(|(cluster, result)| (tile, cluster, result))
                .collect())
        })
        .collect();

    let mut rows: Vec<Row> = match per_tile {
        Ok(rows) => rows.into_iter().flatten().collect(),
        Err(e) => panic!("Error reading tile: {}", e),
    };
    rows.sort_by_key(|&(tile, cluster, _)| (tile, cluster));

    write_rows(lane, &rows).unwrap_or_else(|e| panic!("Error writing output: {}", e));
}
