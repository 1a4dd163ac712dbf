//! `sqvoe` CLI: a diagnostic and operational surface over the library, not
//! the host process doing the intercepting. A real embedder links `sqvoe`
//! as a library and wires `engine::OsFileApi` to its own hooking mechanism;
//! this binary only lets an operator inspect archives and dry-run an
//! acquisition offline.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use sqvoe::config::EngineConfig;
use sqvoe::sqpack::creator::AdditionsReport;
use sqvoe::sqpack::reader::SqpackReader;
use sqvoe::stream::RandomAccessStream;
use sqvoe::views::SqpackViews;

#[derive(Parser)]
#[command(name = "sqvoe", version, about = "Virtual SqPack overlay engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and print the header/segment layout of an on-disk triplet.
    Inspect {
        index_path: PathBuf,
        index2_path: PathBuf,
        #[arg(short, long = "data", num_args = 0.., required = false)]
        data_paths: Vec<PathBuf>,
    },
    /// Build the merged view described by an `EngineConfig` JSON file and
    /// write the resulting triplet to disk, regardless of whether any
    /// overlay contributed.
    Freeze {
        config: PathBuf,
        #[arg(short, long)]
        out_dir: PathBuf,
    },
    /// Dry-run `acquire_views`: builds the same merged view as `freeze`,
    /// but reports whether the triplet would be blacklisted (no overlay
    /// contribution) instead of always writing output.
    Acquire {
        config: PathBuf,
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Print the entries a TTMP mod pack's `TTMPL.mpl` would contribute.
    TtmpInfo {
        mpl_path: PathBuf,
        mpd_path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    match Cli::parse().command {
        Commands::Inspect {
            index_path,
            index2_path,
            data_paths,
        } => inspect(&index_path, &index2_path, &data_paths)?,
        Commands::Freeze { config, out_dir } => freeze(&config, &out_dir)?,
        Commands::Acquire { config, out_dir } => acquire(&config, out_dir.as_deref())?,
        Commands::TtmpInfo { mpl_path, mpd_path } => ttmp_info(&mpl_path, &mpd_path)?,
    }

    Ok(())
}

fn inspect(
    index_path: &Path,
    index2_path: &Path,
    data_paths: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let reader = SqpackReader::open(index_path, index2_path, data_paths)?;

    println!("── SqPack triplet ───────────────────────────────────────");
    println!("  index:    {}", index_path.display());
    println!("  index2:   {}", index2_path.display());
    println!("  data spans: {}", reader.span_count());
    println!("  two-hash entries:  {}", reader.two_hash_entries.len());
    println!("  one-hash entries:  {}", reader.one_hash_entries.len());
    println!("  unknown3 bytes:    {}", reader.unknown3_bytes.len());
    println!("  index sub-header:  {:?}", reader.index_sub_header);
    println!("  index2 sub-header: {:?}", reader.index2_sub_header);

    for i in 0..reader.span_count() as u32 {
        if let Some(header) = reader.data_span_header(i) {
            println!("  span[{i}]: data_size={} span_index={}", header.data_size, header.span_index);
        }
    }

    Ok(())
}

fn freeze(config_path: &Path, out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load_from_file(config_path)?;
    let (views, report) = config.build_with_report()?;
    print_report(&report);
    write_views(&views, out_dir, &config.base_archive.label)?;
    println!("Wrote merged triplet to {}", out_dir.display());
    Ok(())
}

fn acquire(config_path: &Path, out_dir: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load_from_file(config_path)?;
    let (views, report) = config.build_if_contributing_with_report()?;
    print_report(&report);
    match views {
        Some(views) => {
            println!("Triplet would be intercepted.");
            if let Some(out_dir) = out_dir {
                write_views(&views, out_dir, &config.base_archive.label)?;
                println!("Wrote merged triplet to {}", out_dir.display());
            }
        }
        None => println!("No overlay contributed — triplet would be blacklisted."),
    }
    Ok(())
}

fn ttmp_info(mpl_path: &Path, mpd_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    use sqvoe::overlay::ttmp::TtmpSource;

    let source = TtmpSource::open_from_extracted("cli-inspect", mpl_path.to_path_buf(), mpd_path.to_path_buf())?;
    println!("── TTMP mod pack ────────────────────────────────────────");
    println!("  {}", mpl_path.display());
    for entry in source.entries() {
        println!("  {:<40} offset={:<10} size={}", entry.full_path, entry.mod_offset, entry.mod_size);
    }
    println!("  {} entries total", source.entries().len());
    Ok(())
}

fn print_report(report: &AdditionsReport) {
    println!(
        "overlay report: +{} added, {} replaced, {} skipped",
        report.added, report.replaced, report.skipped
    );
}

fn write_views(views: &SqpackViews, out_dir: &Path, label: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    let name = label.rsplit('/').next().unwrap_or(label);

    write_stream(&views.index, &out_dir.join(format!("{name}.win32.index")))?;
    write_stream(&views.index2, &out_dir.join(format!("{name}.win32.index2")))?;
    for (i, span) in views.data_spans.iter().enumerate() {
        write_stream(span, &out_dir.join(format!("{name}.win32.dat{i}")))?;
    }
    Ok(())
}

fn write_stream(stream: &std::sync::Arc<dyn RandomAccessStream>, path: &Path) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    let mut offset = 0u64;
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let n = stream.read_partial(offset, &mut buf)?;
        if n == 0 {
            break;
        }
        std::io::Write::write_all(&mut file, &buf[..n])?;
        offset += n as u64;
    }
    Ok(())
}
