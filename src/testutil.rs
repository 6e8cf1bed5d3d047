//! Synthetic descriptor images for the tests.

use crate::ifd::{IfdVersion, SIGNATURE};
use crate::image::Image;
use crate::EMPTY;

pub fn put32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// An 8 MiB image with the descriptor at the conventional offset 0x10 and
/// every section populated.
///
/// Regions: fd 0x000000-0x000fff, bios 0x200000-0x3fffff,
/// me 0x001000-0x100fff; gbe, pd and the v2-only slots disabled.
/// Sections: FCBA 0x30, FRBA 0x40, FMBA 0x60, FPSBA 0x100, FMSBA 0x200,
/// VSCC table at 0xe00 with two entries. Masters start out unlocked.
pub fn test_image(version: IfdVersion) -> Image {
    let mut data = vec![EMPTY; 0x80_0000];

    put32(&mut data, 0x10, SIGNATURE);
    // FLMAP0: NR=4, FRBA=0x40, NC=2, FCBA=0x30
    put32(&mut data, 0x14, 4 << 24 | 0x04 << 16 | 1 << 8 | 0x03);
    // FLMAP1: ISL=18, FPSBA=0x100, NM=3, FMBA=0x60
    put32(&mut data, 0x18, 18 << 24 | 0x10 << 16 | 3 << 8 | 0x06);
    // FLMAP2: PSL=4, FMSBA=0x200
    put32(&mut data, 0x1c, 4 << 8 | 0x20);
    // FLUMAP1: VTL=4 half-entries, VTBA=0xe00
    put32(&mut data, 0xefc, 4 << 8 | 0xe0);

    // FLCOMP: the read clock encodes the dialect. Dual output on, read
    // id/status 33MHz, fast read supported at 33MHz, write/erase 20MHz,
    // densities 8MB/8MB in the v1 encoding.
    let read_clock: u32 = match version {
        IfdVersion::V1 => 0,
        IfdVersion::V2 => 4,
    };
    let flcomp = 1 << 30 | 1 << 27 | 1 << 21 | 1 << 20 | read_clock << 17 | 4 << 3 | 4;
    put32(&mut data, 0x30, flcomp);
    // FLILL: no invalid instructions. FLPB: boundary at zero.
    put32(&mut data, 0x34, 0);
    put32(&mut data, 0x38, 0);

    let disabled: u32 = match version {
        IfdVersion::V1 => 0x0000_0fff,
        IfdVersion::V2 => 0x0000_7fff,
    };
    put32(&mut data, 0x40, 0x0000_0000); // fd
    put32(&mut data, 0x44, 0x03ff_0200); // bios
    put32(&mut data, 0x48, 0x0100_0001); // me
    put32(&mut data, 0x4c, disabled); // gbe
    put32(&mut data, 0x50, disabled); // pd
    if version == IfdVersion::V2 {
        for slot in 5..9 {
            put32(&mut data, 0x40 + 4 * slot, disabled);
        }
    }

    match version {
        IfdVersion::V1 => {
            put32(&mut data, 0x60, 0xffff_0000);
            put32(&mut data, 0x64, 0xffff_0000);
            put32(&mut data, 0x68, 0x0808_0118);
        }
        IfdVersion::V2 => {
            put32(&mut data, 0x60, 0xffff_ff00);
            put32(&mut data, 0x64, 0xffff_ff00);
            put32(&mut data, 0x68, 0xffff_ff00);
            // The EC master is FLMSTR5.
            put32(&mut data, 0x70, 0xffff_ff00);
        }
    }

    for i in 0..18 {
        put32(&mut data, 0x100 + 4 * i, 0x5a00_0000 | i as u32);
    }
    for i in 0..4 {
        put32(&mut data, 0x200 + 4 * i, 0xa500_0000 | i as u32);
    }

    // A pair of plausible W25Q64-style VSCC entries.
    put32(&mut data, 0xe00, 0x0018_40ef);
    put32(&mut data, 0xe04, 0x2005_2005);
    put32(&mut data, 0xe08, 0x0019_40ef);
    put32(&mut data, 0xe0c, 0x2005_2005);

    Image::new(data)
}
