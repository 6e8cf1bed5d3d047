//! The ME VSCC table: JEDEC ids plus vendor-specific component capabilities,
//! consulted by the Management Engine to drive the flash part.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use zerocopy::Ref;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes};

use crate::error::IfdError;
use crate::ifd::Descriptor;
use crate::image::Image;

pub const MAX_ENTRIES: usize = 8;

#[derive(Immutable, IntoBytes, FromBytes, Serialize, Deserialize, Clone, Copy, Debug)]
#[repr(C)]
pub struct VsccEntry {
    pub jid: u32,
    pub vscc: u32,
}

/// Read the table at VTBA. VTL counts half-entries; the table is bounded to
/// eight entries no matter what VTL claims.
pub fn read_table(image: &Image, desc: &Descriptor) -> Result<Vec<VsccEntry>, IfdError> {
    let flumap1 = desc.flumap1(image)?;
    let count = (flumap1.vtl() / 2).min(MAX_ENTRIES);
    let bytes = image.slice(flumap1.vtba(), count * size_of::<VsccEntry>())?;
    let entries = Ref::<_, [VsccEntry]>::from_bytes(bytes).map_err(|_| {
        IfdError::OutOfBounds {
            offset: flumap1.vtba(),
            len: count * size_of::<VsccEntry>(),
            image: image.len(),
        }
    })?;
    Ok(entries.to_vec())
}

/// JEDEC id word: vendor in the low byte, two device id bytes above it.
#[derive(Clone, Copy, Debug)]
pub struct Jid(pub u32);

impl Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.0;
        writeln!(f, "    SPI Component Device ID 1:          0x{:02x}", (w >> 16) & 0xff)?;
        writeln!(f, "    SPI Component Device ID 0:          0x{:02x}", (w >> 8) & 0xff)?;
        writeln!(f, "    SPI Component Vendor ID:            0x{:02x}", w & 0xff)
    }
}

fn erase_size(code: u32) -> &'static str {
    match code & 0x3 {
        0 => "256 Byte",
        1 => "4KB",
        2 => "8KB",
        _ => "64KB",
    }
}

/// Vendor-specific capability word, split into a lower and an upper half
/// with the same field layout.
#[derive(Clone, Copy, Debug)]
pub struct Vscc(pub u32);

impl Display for Vscc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.0;
        writeln!(f, "    Lower Erase Opcode:                 0x{:02x}", w >> 24)?;
        let op = if w & (1 << 20) != 0 { 0x06 } else { 0x50 };
        writeln!(f, "    Lower Write Enable on Write Status: 0x{op:02x}")?;
        let req = if w & (1 << 19) != 0 { "Yes" } else { "No" };
        writeln!(f, "    Lower Write Status Required:        {req}")?;
        let gran = if w & (1 << 18) != 0 { 64 } else { 1 };
        writeln!(f, "    Lower Write Granularity:            {gran} bytes")?;
        writeln!(f, "    Lower Block / Sector Erase Size:    {}", erase_size(w >> 16))?;

        writeln!(f, "    Upper Erase Opcode:                 0x{:02x}", (w >> 8) & 0xff)?;
        let op = if w & (1 << 4) != 0 { 0x06 } else { 0x50 };
        writeln!(f, "    Upper Write Enable on Write Status: 0x{op:02x}")?;
        let req = if w & (1 << 3) != 0 { "Yes" } else { "No" };
        writeln!(f, "    Upper Write Status Required:        {req}")?;
        let gran = if w & (1 << 2) != 0 { 64 } else { 1 };
        writeln!(f, "    Upper Write Granularity:            {gran} bytes")?;
        writeln!(f, "    Upper Block / Sector Erase Size:    {}", erase_size(w))
    }
}
