use std::fs::File;
use std::path::{Path, PathBuf};

use clap::Parser;
use premaster::{DiscImage, DiscOptions, Location, PathRef, Record, RockRidgeVersion};
use tracing::debug;


#[derive(Parser)]
enum ProgMode {
    /// Print the volume metadata of an image.
    Info(InfoArgs),
    /// List every file in an image.
    List(InputFileOnlyArgs),
    /// Extract one file from an image.
    Extract(ExtractArgs),
    /// Build an image from a directory tree.
    Build(BuildArgs),
}

#[derive(Parser)]
struct InfoArgs {
    pub input_file: PathBuf,
    /// Emit machine-readable JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
struct InputFileOnlyArgs {
    pub input_file: PathBuf,
}

#[derive(Parser)]
struct ExtractArgs {
    pub input_file: PathBuf,
    /// Absolute ISO9660 path inside the image, e.g. /BOOT.;1
    pub iso_path: String,
    pub output_file: PathBuf,
}

#[derive(Parser)]
struct BuildArgs {
    pub input_dir: PathBuf,
    pub output_file: PathBuf,
    /// Record a Rock Ridge 1.09 overlay with the original names.
    #[arg(long)]
    pub rock_ridge: bool,
    #[arg(long, default_value = "")]
    pub volume_id: String,
}

fn walk(image: &mut DiscImage<'_>, path: &str, out: &mut Vec<(String, Record)>) {
    let children = image
        .list_children(PathRef::Iso(path))
        .expect("failed to list directory");
    for child in children {
        let full = image.full_path(&child);
        let is_dir = child.is_dir;
        out.push((full.clone(), child));
        if is_dir {
            walk(image, &full, out);
        }
    }
}

/// Mangles a host file name into an interchange-level-1 identifier.
fn level1_name(name: &str, directory: bool) -> String {
    let clean = |s: &str, cap: usize| -> String {
        s.chars()
            .map(|c| {
                let c = c.to_ascii_uppercase();
                if c.is_ascii_uppercase() || c.is_ascii_digit() { c } else { '_' }
            })
            .take(cap)
            .collect()
    };
    if directory {
        clean(name, 8)
    } else {
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) => (stem, ext),
            None => (name, ""),
        };
        format!("{}.{};1", clean(stem, 8), clean(ext, 3))
    }
}

fn add_tree(image: &mut DiscImage<'_>, dir: &Path, iso_prefix: &str, rock_ridge: bool) {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .expect("failed to read input directory")
        .map(|e| e.expect("failed to read directory entry"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type().expect("failed to stat directory entry");
        let iso_name = level1_name(&name, file_type.is_dir());
        let iso_path = format!("{}/{}", iso_prefix, iso_name);
        let mut location = Location::iso(&iso_path);
        if rock_ridge {
            location = location.with_rr(&name);
        }

        if file_type.is_dir() {
            debug!(path = %iso_path, "adding directory");
            image
                .add_directory(&location, false)
                .expect("failed to add directory");
            add_tree(image, &entry.path(), &iso_path, rock_ridge);
        } else if file_type.is_file() {
            debug!(path = %iso_path, "adding file");
            let content = std::fs::read(entry.path()).expect("failed to read input file");
            image
                .add_file(content, &location, None)
                .expect("failed to add file");
        } else {
            eprintln!("skipping {} (not a regular file or directory)", name);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mode = ProgMode::parse();
    match mode {
        ProgMode::Info(args) => {
            let input_file = File::open(&args.input_file)
                .expect("failed to open input file");
            let mut image = DiscImage::open(input_file)
                .expect("failed to open image");
            let mut files = Vec::new();
            walk(&mut image, "/", &mut files);
            if args.json {
                let records: Vec<&Record> = files.iter().map(|(_, r)| r).collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&records)
                        .expect("failed to serialise records"),
                );
            } else {
                println!("{:#?}", image);
                println!("{} entries", files.len());
            }
        },
        ProgMode::List(args) => {
            let input_file = File::open(&args.input_file)
                .expect("failed to open input file");
            let mut image = DiscImage::open(input_file)
                .expect("failed to open image");
            let mut files = Vec::new();
            walk(&mut image, "/", &mut files);
            for (path, record) in files {
                let kind = if record.is_dir { "d" } else { "-" };
                println!("{} {:>10}  {}", kind, record.length, path);
            }
        },
        ProgMode::Extract(args) => {
            let input_file = File::open(&args.input_file)
                .expect("failed to open input file");
            let mut image = DiscImage::open(input_file)
                .expect("failed to open image");
            let content = image
                .get_file(PathRef::Iso(&args.iso_path))
                .expect("failed to read file from image");
            std::fs::write(&args.output_file, content)
                .expect("failed to write output file");
        },
        ProgMode::Build(args) => {
            let mut image = DiscImage::new(DiscOptions {
                rock_ridge: args.rock_ridge.then_some(RockRidgeVersion::V1_09),
                volume_identifier: args.volume_id.clone(),
                ..DiscOptions::default()
            })
            .expect("failed to create image");
            add_tree(&mut image, &args.input_dir, "", args.rock_ridge);
            let mut output_file = File::create(&args.output_file)
                .expect("failed to create output file");
            image.write(&mut output_file)
                .expect("failed to write image");
        },
    }
}
