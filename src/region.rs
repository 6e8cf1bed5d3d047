//! Flash regions and the FLREG codec.
//!
//! Each region slot is one 32-bit FLREG word holding 4KiB-page numbers:
//! base in the low half, limit in the high half. The page fields are 12 bits
//! wide in v1 and 15 bits in v2. A slot whose decoded limit lies below its
//! base is disabled.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use strum::{Display as StrDisplay, FromRepr};

use crate::error::IfdError;
use crate::ifd::{Descriptor, IfdVersion};
use crate::image::Image;

/// The nine region slots a descriptor can carry. v1 knows only the first
/// five.
#[derive(
    StrDisplay, FromRepr, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
)]
#[repr(usize)]
pub enum RegionKind {
    #[strum(to_string = "Flash Descriptor")]
    Descriptor = 0,
    #[strum(to_string = "BIOS")]
    Bios = 1,
    #[strum(to_string = "Intel ME")]
    Me = 2,
    #[strum(to_string = "GbE")]
    Gbe = 3,
    #[strum(to_string = "Platform Data")]
    Platform = 4,
    #[strum(to_string = "Reserved")]
    Res1 = 5,
    #[strum(to_string = "Reserved")]
    Res2 = 6,
    #[strum(to_string = "Reserved")]
    Res3 = 7,
    #[strum(to_string = "EC")]
    Ec = 8,
}

impl RegionKind {
    /// Terse name, as used in flashrom layout files.
    pub fn terse(self) -> &'static str {
        match self {
            Self::Descriptor => "fd",
            Self::Bios => "bios",
            Self::Me => "me",
            Self::Gbe => "gbe",
            Self::Platform => "pd",
            Self::Res1 => "res1",
            Self::Res2 => "res2",
            Self::Res3 => "res3",
            Self::Ec => "ec",
        }
    }

    /// File name used when extracting this region.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Descriptor => "flashregion_0_flashdescriptor.bin",
            Self::Bios => "flashregion_1_bios.bin",
            Self::Me => "flashregion_2_intel_me.bin",
            Self::Gbe => "flashregion_3_gbe.bin",
            Self::Platform => "flashregion_4_platform_data.bin",
            Self::Res1 => "flashregion_5_reserved.bin",
            Self::Res2 => "flashregion_6_reserved.bin",
            Self::Res3 => "flashregion_7_reserved.bin",
            Self::Ec => "flashregion_8_ec.bin",
        }
    }

    /// Match a layout-file name, pretty or terse, case-insensitively,
    /// against the slots the dialect knows.
    pub fn from_name(name: &str, max_regions: usize) -> Option<Self> {
        (0..max_regions).filter_map(Self::from_repr).find(|kind| {
            name.eq_ignore_ascii_case(&kind.to_string())
                || name.eq_ignore_ascii_case(kind.terse())
        })
    }

    /// Region names accepted by the inject mode.
    pub fn from_arg_name(name: &str) -> Option<Self> {
        for (arg, kind) in [
            ("Descriptor", Self::Descriptor),
            ("BIOS", Self::Bios),
            ("ME", Self::Me),
            ("GbE", Self::Gbe),
            ("Platform", Self::Platform),
            ("EC", Self::Ec),
        ] {
            if name.eq_ignore_ascii_case(arg) {
                return Some(kind);
            }
        }
        None
    }
}

/// A region extent in bytes. Both bounds are inclusive.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub base: u32,
    pub limit: u32,
}

impl Region {
    pub fn new(base: u32, limit: u32) -> Self {
        Self { base, limit }
    }

    /// Zero when the limit lies below the base, which marks the region
    /// disabled everywhere downstream.
    pub fn size(self) -> u32 {
        if self.limit < self.base {
            0
        } else {
            self.limit - self.base + 1
        }
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unused = if self.size() < 1 { "(unused)" } else { "" };
        write!(f, "{:08x} - {:08x} {}", self.base, self.limit, unused)
    }
}

/// True iff both regions are enabled and their inclusive extents intersect.
/// Symmetric in its arguments.
pub fn regions_collide(r1: Region, r2: Region) -> bool {
    if r1.size() == 0 || r2.size() == 0 {
        return false;
    }
    r1.base <= r2.limit && r2.base <= r1.limit
}

/// Typed view over the FRBA register block of one image.
#[derive(Clone, Copy, Debug)]
pub struct RegionTable {
    frba: usize,
    version: IfdVersion,
}

impl RegionTable {
    pub fn new(desc: &Descriptor) -> Self {
        Self {
            frba: desc.frba(),
            version: desc.version,
        }
    }

    pub fn word(&self, image: &Image, index: usize) -> Result<u32, IfdError> {
        if index >= self.version.max_regions() {
            return Err(IfdError::InvalidRegion(index));
        }
        image.read_u32(self.frba + 4 * index)
    }

    pub fn get(&self, image: &Image, index: usize) -> Result<Region, IfdError> {
        let word = self.word(image, index)?;
        let mask = self.version.region_mask();
        let base = (word & mask) << 12;
        let limit = ((word & (mask << 16)) >> 4) | 0xfff;
        Ok(Region { base, limit })
    }

    /// Encode a region back into its FLREG word. Only slots 0-4 have a
    /// writer; the reserved upper slots are left alone on purpose.
    pub fn set(&self, image: &mut Image, index: usize, region: Region) -> Result<(), IfdError> {
        if index > 4 {
            return Err(IfdError::InvalidRegion(index));
        }
        let word = ((region.limit >> 12) & 0x7fff) << 16 | ((region.base >> 12) & 0x7fff);
        image.write_u32(self.frba + 4 * index, word)
    }
}
