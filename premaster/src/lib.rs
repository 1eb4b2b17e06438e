//! Reading, authoring and rewriting optical-disc filesystem images.
//!
//! `premaster` edits ECMA-119 (ISO 9660) images in process, projecting one
//! logical file tree into up to four coexisting on-disc namespaces: the
//! primary ISO9660 tree, the Joliet supplementary tree, the Rock Ridge
//! overlay, and the UDF 2.60 bridge tree. El Torito boot catalogs and the
//! isohybrid MBR prelude are maintained alongside. The library operates on
//! a single backing byte stream; it does not mount anything, drive
//! hardware, or shell out.
//!
//! # Authoring
//!
//! ```
//! use premaster::{DiscImage, DiscOptions, Location};
//!
//! let mut image = DiscImage::new(DiscOptions::default())?;
//! image.add_file(b"foo\n".to_vec(), &Location::iso("/FOO.;1"), None)?;
//! let mut bytes = Vec::new();
//! image.write(&mut bytes)?;
//! assert_eq!(bytes.len(), 51_200);
//! # Ok::<(), premaster::Error>(())
//! ```
//!
//! # Reading
//!
//! ```no_run
//! use premaster::{DiscImage, PathRef};
//!
//! let file = std::fs::File::open("image.iso")?;
//! let mut image = DiscImage::open(file)?;
//! let content = image.get_file(PathRef::Iso("/FOO.;1"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Every mutation validates its preconditions before touching any state;
//! a returned error means the image is exactly as it was. Writing is
//! deterministic: the same tree always produces the same bytes.

pub mod datetime;
pub mod dirrec;
pub mod eltorito;
mod endian;
mod error;
pub mod ident;
mod image;
pub mod isohybrid;
mod parser;
mod plan;
pub mod ptable;
pub mod susp;
mod tree;
pub mod udf;
pub mod vd;
mod writer;

pub use eltorito::{BootMedia, PlatformId};
pub use endian::EndianPair;
pub use error::{Error, Result};
pub use image::{
    DiscImage, DiscOptions, ElToritoOptions, Emulation, LinkSource, Location,
    PathRef, ReadSeek, Record, UdfRevision,
};
pub use susp::RockRidgeVersion;
pub use vd::BLOCK_SIZE;
