//! Intel Flash Descriptor (IFD) format model and locator.
//!
//! For reference, see the SPI chapter of the 600 series chipset PCH datasheet
//! volume 1,
//! <https://edc.intel.com/content/www/us/en/design/ipla/software-development-platforms/client/platforms/alder-lake-mobile-p/intel-600-series-chipset-family-on-package-platform-controller-hub-pch-datash/serial-peripheral-interface-spi/>
//! and <https://opensecuritytraining.info/IntroBIOS_files/Day2_02_Advanced%20x86%20-%20BIOS%20and%20SMM%20Internals%20-%20Flash%20Descriptor.pdf>.
//!
//! The descriptor has no version field. Two dialects are distinguished by the
//! hardwired read clock frequency: v1 parts read at 20MHz (code 0), v2 parts
//! at 30MHz (code 4). The dialects differ in region count (5 vs 9), FLREG
//! field width (12 vs 15 bits), FLMSTR bit positions and component density
//! width (3 vs 4 bits); everything version-dependent funnels through
//! [`IfdVersion`].
//!
//! | Section                      | Base  | Contents                        |
//! | ---------------------------- | ----- | ------------------------------- |
//! | Signature + Descriptor Map   |       | Offsets of the other sections   |
//! | Components                   | FCBA  | Flash parts, clocks, densities  |
//! | Regions                      | FRBA  | Flash partitions as offsets     |
//! | Masters                      | FMBA  | Access control for regions      |
//! | PCH Soft Straps              | FPSBA | Platform specific control bits  |
//! | Processor Straps             | FMSBA | Opaque                          |
//! | ME VSCC Table                | VTBA  | Per-chip JEDEC id + vendor bits |
//! | OEM Section                  | 0xf00 | Opaque, 64 bytes                |

// We retain the all-uppercase acronyms in the struct definitions.
// Lowercase helpers are provided through implementations.
#![allow(non_snake_case)]

use bitfield_struct::bitfield;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use zerocopy::FromBytes;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes};

use crate::error::IfdError;
use crate::image::Image;

// NOTE: This is the LE representation.
pub const SIGNATURE: u32 = 0x0ff0_a55a;

// FLUMAP1 sits at a fixed distance from the signature, far behind the
// descriptor map (image offset 0xefc for the conventional 0x10 placement).
const FLUMAP1_OFFSET: usize = 0xeec;

/// Byte offset of the OEM blob, relative to the image, not the descriptor.
pub const OEM_OFFSET: usize = 0xf00;
pub const OEM_SIZE: usize = 64;

#[bitfield(u32)]
#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize)]
pub struct FLMAP0 {
    FCBA: u8,
    #[bits(2)]
    NC: u8,
    #[bits(6)]
    _0: u8,
    FRBA: u8,
    #[bits(3)]
    NR: u8,
    #[bits(5)]
    _1: u8,
}

impl FLMAP0 {
    pub fn fcba(self) -> usize {
        (self.FCBA() as usize) << 4
    }

    pub fn frba(self) -> usize {
        (self.FRBA() as usize) << 4
    }

    /// Component count is stored off by one.
    pub fn nc(self) -> usize {
        self.NC() as usize + 1
    }

    pub fn nr(self) -> usize {
        self.NR() as usize
    }
}

#[bitfield(u32)]
#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize)]
pub struct FLMAP1 {
    FMBA: u8,
    #[bits(3)]
    NM: u8,
    #[bits(5)]
    _0: u8,
    FPSBA: u8,
    ISL: u8,
}

impl FLMAP1 {
    pub fn fmba(self) -> usize {
        (self.FMBA() as usize) << 4
    }

    pub fn fpsba(self) -> usize {
        (self.FPSBA() as usize) << 4
    }

    pub fn nm(self) -> usize {
        self.NM() as usize
    }

    pub fn isl(self) -> usize {
        self.ISL() as usize
    }
}

#[bitfield(u32)]
#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize)]
pub struct FLMAP2 {
    FMSBA: u8,
    PSL: u16,
    _0: u8,
}

impl FLMAP2 {
    pub fn fmsba(self) -> usize {
        (self.FMSBA() as usize) << 4
    }

    pub fn psl(self) -> usize {
        self.PSL() as usize
    }
}

/// Descriptor upper map: locates the ME VSCC table.
#[bitfield(u32)]
#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize)]
pub struct FLUMAP1 {
    VTBA: u8,
    VTL: u8,
    _0: u16,
}

impl FLUMAP1 {
    pub fn vtba(self) -> usize {
        (self.VTBA() as usize) << 4
    }

    /// Table length in half-entries (one per u32).
    pub fn vtl(self) -> usize {
        self.VTL() as usize
    }
}

/// Flash descriptor base: signature plus the descriptor map words.
#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize, Clone, Copy, Debug)]
#[repr(C)]
pub struct Fdbar {
    pub flvalsig: u32,
    pub flmap0: FLMAP0,
    pub flmap1: FLMAP1,
    pub flmap2: FLMAP2,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IfdVersion {
    V1,
    V2,
}

impl IfdVersion {
    pub fn max_regions(self) -> usize {
        match self {
            Self::V1 => 5,
            Self::V2 => 9,
        }
    }

    /// Width mask of the FLREG base/limit page fields.
    pub fn region_mask(self) -> u32 {
        match self {
            Self::V1 => 0xfff,
            Self::V2 => 0x7fff,
        }
    }

    /// Bit position of the per-region read grants in an FLMSTR word.
    pub fn master_read_shift(self) -> u32 {
        match self {
            Self::V1 => 16,
            Self::V2 => 8,
        }
    }

    /// Bit position of the per-region write grants in an FLMSTR word.
    pub fn master_write_shift(self) -> u32 {
        match self {
            Self::V1 => 24,
            Self::V2 => 20,
        }
    }
}

/// SPI clock frequency codes used by the FLCOMP frequency fields.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SpiFrequency {
    M20 = 0,
    M33 = 1,
    M48 = 2,
    /// Reads as 50MHz on v1 parts and 30MHz on v2 parts.
    M50_30 = 4,
    M17 = 6,
}

impl SpiFrequency {
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::M20),
            1 => Some(Self::M33),
            2 => Some(Self::M48),
            4 => Some(Self::M50_30),
            6 => Some(Self::M17),
            _ => None,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Map a requested frequency in MHz to its code.
    pub const fn from_mhz(mhz: u32) -> Option<Self> {
        match mhz {
            17 => Some(Self::M17),
            20 => Some(Self::M20),
            30 | 50 => Some(Self::M50_30),
            33 => Some(Self::M33),
            48 => Some(Self::M48),
            _ => None,
        }
    }

    pub fn name(self, version: IfdVersion) -> &'static str {
        match self {
            Self::M20 => "20MHz",
            Self::M33 => "33MHz",
            Self::M48 => "48MHz",
            Self::M50_30 => match version {
                IfdVersion::V1 => "50MHz",
                IfdVersion::V2 => "30MHz",
            },
            Self::M17 => "17MHz",
        }
    }
}

/// Flash component density codes. v1 stores three bits per component and
/// cannot express the upper codes; v2 stores four.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Density {
    K512 = 0,
    M1 = 1,
    M2 = 2,
    M4 = 3,
    M8 = 4,
    M16 = 5,
    M32 = 6,
    M64 = 7,
    Unused = 0xf,
}

impl Density {
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::K512),
            1 => Some(Self::M1),
            2 => Some(Self::M2),
            3 => Some(Self::M4),
            4 => Some(Self::M8),
            5 => Some(Self::M16),
            6 => Some(Self::M32),
            7 => Some(Self::M64),
            0xf => Some(Self::Unused),
            _ => None,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Map a chip size as given on the command line (512 in KByte, the rest
    /// in MByte, 0 for unused) to its code.
    pub const fn from_size(size: u32) -> Option<Self> {
        match size {
            512 => Some(Self::K512),
            1 => Some(Self::M1),
            2 => Some(Self::M2),
            4 => Some(Self::M4),
            8 => Some(Self::M8),
            16 => Some(Self::M16),
            32 => Some(Self::M32),
            64 => Some(Self::M64),
            0 => Some(Self::Unused),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::K512 => "512KB",
            Self::M1 => "1MB",
            Self::M2 => "2MB",
            Self::M4 => "4MB",
            Self::M8 => "8MB",
            Self::M16 => "16MB",
            Self::M32 => "32MB",
            Self::M64 => "64MB",
            Self::Unused => "UNUSED",
        }
    }
}

impl Display for Density {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which of the two flash components a density edit applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChipSelect {
    Both,
    First,
    Second,
}

impl ChipSelect {
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Both),
            1 => Some(Self::First),
            2 => Some(Self::Second),
            _ => None,
        }
    }
}

/// FLCOMP, the flash component configuration word.
///
/// The frequency fields sit at the same positions in both dialects; only the
/// density fields change width, so those accessors take the version.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Flcomp(pub u32);

impl Flcomp {
    pub fn dual_output_fast_read(self) -> bool {
        self.0 & (1 << 30) != 0
    }

    pub fn clear_dual_output_fast_read(&mut self) {
        self.0 &= !(1 << 30);
    }

    pub fn fast_read(self) -> bool {
        self.0 & (1 << 20) != 0
    }

    pub fn read_id_status_freq(self) -> u8 {
        ((self.0 >> 27) & 7) as u8
    }

    pub fn write_erase_freq(self) -> u8 {
        ((self.0 >> 24) & 7) as u8
    }

    pub fn fast_read_freq(self) -> u8 {
        ((self.0 >> 21) & 7) as u8
    }

    /// Hardwired; this field is what version detection keys off.
    pub fn read_freq(self) -> u8 {
        ((self.0 >> 17) & 7) as u8
    }

    /// Set the three writable frequency fields (read id/status, write/erase,
    /// fast read) to the same code, clearing bits 21-29 first.
    pub fn set_all_frequencies(&mut self, freq: SpiFrequency) {
        self.0 &= !0x3fe0_0000;
        let code = freq.code() as u32;
        self.0 |= code << 27 | code << 24 | code << 21;
    }

    pub fn component1_density(self, version: IfdVersion) -> u8 {
        match version {
            IfdVersion::V1 => (self.0 & 0x7) as u8,
            IfdVersion::V2 => (self.0 & 0xf) as u8,
        }
    }

    pub fn component2_density(self, version: IfdVersion) -> u8 {
        match version {
            IfdVersion::V1 => ((self.0 >> 3) & 0x7) as u8,
            IfdVersion::V2 => ((self.0 >> 4) & 0xf) as u8,
        }
    }

    /// Rewrite the density field(s) of the selected component(s), leaving
    /// every other bit alone.
    ///
    /// Only the v1 encoding is written. The upper v1 codes do not fit in
    /// three bits, and the v2 encoding has never been needed, so both fail
    /// with [`IfdError::UnsupportedDensity`].
    pub fn set_density(
        &mut self,
        version: IfdVersion,
        chip: ChipSelect,
        density: Density,
    ) -> Result<(), IfdError> {
        match version {
            IfdVersion::V1 => {
                if matches!(density, Density::M32 | Density::M64 | Density::Unused) {
                    return Err(IfdError::UnsupportedDensity(density));
                }
            }
            IfdVersion::V2 => return Err(IfdError::UnsupportedDensity(density)),
        }

        match chip {
            ChipSelect::First => self.0 &= !0x7,
            ChipSelect::Second => self.0 &= !(0x7 << 3),
            ChipSelect::Both => self.0 &= !0x3f,
        }

        let code = density.code() as u32;
        if matches!(chip, ChipSelect::First | ChipSelect::Both) {
            self.0 |= code;
        }
        if matches!(chip, ChipSelect::Second | ChipSelect::Both) {
            self.0 |= code << 3;
        }
        Ok(())
    }
}

/// Where the descriptor sits in an image and which dialect it speaks.
///
/// Parsed once per invocation; everything downstream takes this by reference
/// together with the image it came from.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct Descriptor {
    /// Byte offset of the signature.
    pub offset: usize,
    pub version: IfdVersion,
    pub fdbar: Fdbar,
}

/// Scan for the descriptor signature at 4-byte stride.
pub fn find_descriptor(image: &Image) -> Result<usize, IfdError> {
    let data = image.as_bytes();
    if data.len() >= 4 {
        for offset in (0..=data.len() - 4).step_by(4) {
            let word = u32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]);
            if word == SIGNATURE {
                return Ok(offset);
            }
        }
    }
    Err(IfdError::SignatureMissing)
}

impl Descriptor {
    pub fn parse(image: &Image) -> Result<Self, IfdError> {
        let offset = find_descriptor(image)?;
        let (fdbar, _) =
            Fdbar::read_from_prefix(&image.as_bytes()[offset..]).map_err(|_| {
                IfdError::OutOfBounds {
                    offset,
                    len: size_of::<Fdbar>(),
                    image: image.len(),
                }
            })?;

        let flcomp = Flcomp(image.read_u32(fdbar.flmap0.fcba())?);
        let version = match flcomp.read_freq() {
            0 => IfdVersion::V1,
            4 => IfdVersion::V2,
            code => return Err(IfdError::UnknownVersion(code)),
        };

        Ok(Self {
            offset,
            version,
            fdbar,
        })
    }

    pub fn max_regions(&self) -> usize {
        self.version.max_regions()
    }

    pub fn fcba(&self) -> usize {
        self.fdbar.flmap0.fcba()
    }

    pub fn frba(&self) -> usize {
        self.fdbar.flmap0.frba()
    }

    pub fn fmba(&self) -> usize {
        self.fdbar.flmap1.fmba()
    }

    pub fn fpsba(&self) -> usize {
        self.fdbar.flmap1.fpsba()
    }

    pub fn fmsba(&self) -> usize {
        self.fdbar.flmap2.fmsba()
    }

    pub fn flcomp(&self, image: &Image) -> Result<Flcomp, IfdError> {
        Ok(Flcomp(image.read_u32(self.fcba())?))
    }

    pub fn write_flcomp(&self, image: &mut Image, flcomp: Flcomp) -> Result<(), IfdError> {
        image.write_u32(self.fcba(), flcomp.0)
    }

    pub fn flumap1(&self, image: &Image) -> Result<FLUMAP1, IfdError> {
        Ok(FLUMAP1::from_bits(
            image.read_u32(self.offset + FLUMAP1_OFFSET)?,
        ))
    }
}
