//! The bit-level edit operations. Each one mutates the image buffer in
//! place; writing the result out is the caller's business.

use log::warn;

use crate::error::IfdError;
use crate::ifd::{ChipSelect, Density, Descriptor, IfdVersion, SpiFrequency};
use crate::image::Image;
use crate::master::MasterTable;
use crate::region::{RegionKind, RegionTable};
use crate::EMPTY;

/// Set the read id/status, write/erase and fast read clocks to `freq`.
pub fn set_spi_frequency(
    image: &mut Image,
    desc: &Descriptor,
    freq: SpiFrequency,
) -> Result<(), IfdError> {
    let mut flcomp = desc.flcomp(image)?;
    flcomp.set_all_frequencies(freq);
    desc.write_flcomp(image, flcomp)
}

/// Configure the part for a Dediprog EM100 emulator: no dual output fast
/// read, and the slowest clock the dialect knows.
pub fn set_em100_mode(image: &mut Image, desc: &Descriptor) -> Result<(), IfdError> {
    let freq = match desc.version {
        IfdVersion::V1 => SpiFrequency::M20,
        IfdVersion::V2 => SpiFrequency::M17,
    };
    let mut flcomp = desc.flcomp(image)?;
    flcomp.clear_dual_output_fast_read();
    desc.write_flcomp(image, flcomp)?;
    set_spi_frequency(image, desc, freq)
}

pub fn set_chip_density(
    image: &mut Image,
    desc: &Descriptor,
    chip: ChipSelect,
    density: Density,
) -> Result<(), IfdError> {
    let mut flcomp = desc.flcomp(image)?;
    flcomp.set_density(desc.version, chip, density)?;
    desc.write_flcomp(image, flcomp)
}

pub fn lock_descriptor(image: &mut Image, desc: &Descriptor) -> Result<(), IfdError> {
    MasterTable::new(desc).lock(image)
}

pub fn unlock_descriptor(image: &mut Image, desc: &Descriptor) -> Result<(), IfdError> {
    MasterTable::new(desc).unlock(image)
}

/// Overwrite a region's contents with `payload`.
///
/// The BIOS region is filled from the top so the payload ends at the reset
/// vector; a short payload gets 0xFF padding below it. Every other region is
/// written at its base and keeps its trailing bytes.
pub fn inject_region(
    image: &mut Image,
    desc: &Descriptor,
    kind: RegionKind,
    payload: &[u8],
) -> Result<(), IfdError> {
    let region = RegionTable::new(desc).get(image, kind as usize)?;
    if region.size() <= 0xfff {
        return Err(IfdError::RegionDisabled(kind));
    }
    if payload.len() > region.size() as usize {
        return Err(IfdError::PayloadTooLarge {
            region: kind,
            region_size: region.size(),
            payload_size: payload.len(),
        });
    }

    let mut offset = 0;
    if kind == RegionKind::Bios && payload.len() < region.size() as usize {
        warn!(
            "region {kind} is 0x{:x} bytes, file is 0x{:x} bytes, padding before injecting",
            region.size(),
            payload.len()
        );
        offset = region.size() as usize - payload.len();
        image.fill(region.base as usize, offset, EMPTY)?;
    }

    image
        .slice_mut(region.base as usize + offset, payload.len())?
        .copy_from_slice(payload);
    Ok(())
}
