//! One error type for everything that can go wrong while decoding or
//! rewriting a descriptor. Every variant is fatal; nothing is retried.

use std::fmt::{self, Display};
use std::io;

use crate::ifd::Density;
use crate::region::RegionKind;

#[derive(Debug)]
pub enum IfdError {
    /// No descriptor signature anywhere in the image.
    SignatureMissing,
    /// The read clock frequency field holds neither of the two known codes.
    UnknownVersion(u8),
    /// Region index outside what the detected dialect (or the writer) supports.
    InvalidRegion(usize),
    /// Injection target is disabled in the descriptor.
    RegionDisabled(RegionKind),
    /// Injection payload does not fit the region.
    PayloadTooLarge {
        region: RegionKind,
        region_size: u32,
        payload_size: usize,
    },
    /// Density code not representable in the detected dialect.
    UnsupportedDensity(Density),
    /// Two enabled regions intersect in the requested layout.
    Overlap(RegionKind, RegionKind),
    /// A descriptor field points outside the image.
    OutOfBounds { offset: usize, len: usize, image: usize },
    /// Malformed BASE:LIMIT pair in a layout file.
    LayoutParse(String),
    Io(io::Error),
}

impl Display for IfdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureMissing => {
                write!(f, "no flash descriptor found in this image")
            }
            Self::UnknownVersion(freq) => {
                write!(f, "unknown descriptor version: read clock code {freq}")
            }
            Self::InvalidRegion(index) => write!(f, "invalid region type {index}"),
            Self::RegionDisabled(region) => {
                write!(f, "region {region} is disabled in target")
            }
            Self::PayloadTooLarge {
                region,
                region_size,
                payload_size,
            } => {
                write!(
                    f,
                    "region {region} is {region_size} (0x{region_size:x}) bytes, \
                     file is {payload_size} (0x{payload_size:x}) bytes"
                )
            }
            Self::UnsupportedDensity(density) => {
                write!(f, "density {density} not supported by this descriptor version")
            }
            Self::Overlap(a, b) => write!(f, "regions {a} and {b} would overlap"),
            Self::OutOfBounds { offset, len, image } => {
                write!(
                    f,
                    "descriptor points outside the image: \
                     0x{offset:x}+0x{len:x} exceeds 0x{image:x}"
                )
            }
            Self::LayoutParse(line) => {
                write!(f, "could not parse layout file: {line:?}")
            }
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for IfdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for IfdError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
