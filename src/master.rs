//! Master access words (FLMSTR) and the lock/unlock matrices.
//!
//! Each bus master (host CPU/BIOS, ME, GbE, and on v2 the EC) owns one
//! 32-bit word granting it read and write access per region. The grant bit
//! positions moved between dialects: v1 keeps reads at bit 16 and writes at
//! bit 24 with a requester id in the low half; v2 keeps reads at bit 8 and
//! writes at bit 20 with the low byte reserved.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::error::IfdError;
use crate::ifd::{Descriptor, IfdVersion};
use crate::image::Image;

/// GbE requester id hardwired by v1 descriptors.
const GBE_REQUESTER_ID: u32 = 0x118;

/// One FLMSTR word with enough context to decode it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct MasterAccess {
    pub word: u32,
    pub version: IfdVersion,
}

impl MasterAccess {
    fn read_granted(&self, region_bit: u32) -> bool {
        self.word & (1 << (self.version.master_read_shift() + region_bit)) != 0
    }

    fn write_granted(&self, region_bit: u32) -> bool {
        self.word & (1 << (self.version.master_write_shift() + region_bit)) != 0
    }
}

fn grant(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}

impl Display for MasterAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version == IfdVersion::V2 {
            let c = grant(self.write_granted(8));
            writeln!(f, "  EC Region Write Access:            {c}")?;
        }
        let c = grant(self.write_granted(4));
        writeln!(f, "  Platform Data Region Write Access: {c}")?;
        let c = grant(self.write_granted(3));
        writeln!(f, "  GbE Region Write Access:           {c}")?;
        let c = grant(self.write_granted(2));
        writeln!(f, "  Intel ME Region Write Access:      {c}")?;
        let c = grant(self.write_granted(1));
        writeln!(f, "  Host CPU/BIOS Region Write Access: {c}")?;
        let c = grant(self.write_granted(0));
        writeln!(f, "  Flash Descriptor Write Access:     {c}")?;

        if self.version == IfdVersion::V2 {
            let c = grant(self.read_granted(8));
            writeln!(f, "  EC Region Read Access:             {c}")?;
        }
        let c = grant(self.read_granted(4));
        writeln!(f, "  Platform Data Region Read Access:  {c}")?;
        let c = grant(self.read_granted(3));
        writeln!(f, "  GbE Region Read Access:            {c}")?;
        let c = grant(self.read_granted(2));
        writeln!(f, "  Intel ME Region Read Access:       {c}")?;
        let c = grant(self.read_granted(1));
        writeln!(f, "  Host CPU/BIOS Region Read Access:  {c}")?;
        let c = grant(self.read_granted(0));
        writeln!(f, "  Flash Descriptor Read Access:      {c}")?;

        // The requester id only exists on v1.
        if self.version == IfdVersion::V1 {
            writeln!(f, "  Requester ID:                      0x{:04x}", self.word & 0xffff)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Typed view over the FMBA register block of one image.
#[derive(Clone, Copy, Debug)]
pub struct MasterTable {
    fmba: usize,
    version: IfdVersion,
}

impl MasterTable {
    pub fn new(desc: &Descriptor) -> Self {
        Self {
            fmba: desc.fmba(),
            version: desc.version,
        }
    }

    /// Word offset of FLMSTRn. The EC master is FLMSTR5; FLMSTR4 exists on
    /// silicon but nothing here touches it.
    fn offset(&self, n: usize) -> usize {
        self.fmba + 4 * (n - 1)
    }

    pub fn flmstr(&self, image: &Image, n: usize) -> Result<MasterAccess, IfdError> {
        Ok(MasterAccess {
            word: image.read_u32(self.offset(n))?,
            version: self.version,
        })
    }

    /// Reset FLMSTR1-3 to the conservative matrix:
    /// CPU/BIOS reads descriptor+BIOS+GbE and writes BIOS+GbE, ME reads
    /// descriptor+ME+GbE and writes ME+GbE, GbE reads and writes only GbE.
    pub fn lock(&self, image: &mut Image) -> Result<(), IfdError> {
        let rd = self.version.master_read_shift();
        let wr = self.version.master_write_shift();

        let (mut m1, mut m2, mut m3) = match self.version {
            IfdVersion::V2 => {
                // The low byte is master-reserved, keep it.
                (
                    image.read_u32(self.offset(1))? & 0xff,
                    image.read_u32(self.offset(2))? & 0xff,
                    image.read_u32(self.offset(3))? & 0xff,
                )
            }
            IfdVersion::V1 => (0, 0, GBE_REQUESTER_ID),
        };

        m1 |= 0xb << rd | 0xa << wr;
        m2 |= 0xd << rd | 0xc << wr;
        m3 |= 0x8 << rd | 0x8 << wr;

        image.write_u32(self.offset(1), m1)?;
        image.write_u32(self.offset(2), m2)?;
        image.write_u32(self.offset(3), m3)
    }

    /// Grant every master access to every region.
    pub fn unlock(&self, image: &mut Image) -> Result<(), IfdError> {
        match self.version {
            IfdVersion::V2 => {
                // Access bits for each region are read 19:8, write 31:20.
                for n in 1..=3 {
                    let word = image.read_u32(self.offset(n))?;
                    image.write_u32(self.offset(n), 0xffff_ff00 | (word & 0xff))?;
                }
                Ok(())
            }
            IfdVersion::V1 => {
                image.write_u32(self.offset(1), 0xffff_0000)?;
                image.write_u32(self.offset(2), 0xffff_0000)?;
                image.write_u32(self.offset(3), 0x0808_0000 | GBE_REQUESTER_ID)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifd::Descriptor;
    use crate::testutil::test_image;

    fn masters(image: &Image, desc: &Descriptor) -> (u32, u32, u32) {
        let table = MasterTable::new(desc);
        (
            table.flmstr(image, 1).unwrap().word,
            table.flmstr(image, 2).unwrap().word,
            table.flmstr(image, 3).unwrap().word,
        )
    }

    #[test]
    fn v1_unlock_then_lock_yields_the_canonical_matrix() {
        let mut image = test_image(IfdVersion::V1);
        let desc = Descriptor::parse(&image).unwrap();
        let table = MasterTable::new(&desc);

        table.unlock(&mut image).unwrap();
        assert_eq!(
            masters(&image, &desc),
            (0xffff_0000, 0xffff_0000, 0x0808_0118)
        );

        table.lock(&mut image).unwrap();
        assert_eq!(
            masters(&image, &desc),
            (0x0a0b_0000, 0x0c0d_0000, 0x0808_0118)
        );
    }

    #[test]
    fn v2_unlock_then_lock_yields_the_canonical_matrix() {
        let mut image = test_image(IfdVersion::V2);
        let desc = Descriptor::parse(&image).unwrap();
        let table = MasterTable::new(&desc);

        // Seed the reserved low bytes to prove they survive both edits.
        let fmba = desc.fmba();
        for (n, low) in [(0, 0x21), (1, 0x42), (2, 0x63)] {
            let word = image.read_u32(fmba + 4 * n).unwrap();
            image.write_u32(fmba + 4 * n, (word & !0xff) | low).unwrap();
        }

        table.unlock(&mut image).unwrap();
        assert_eq!(
            masters(&image, &desc),
            (0xffff_ff21, 0xffff_ff42, 0xffff_ff63)
        );

        table.lock(&mut image).unwrap();
        assert_eq!(
            masters(&image, &desc),
            (0x00a0_0b21, 0x00c0_0d42, 0x0080_0863)
        );
    }

    #[test]
    fn v2_access_decode_reads_the_high_grants() {
        let access = MasterAccess {
            word: 0x00a0_0b00,
            version: IfdVersion::V2,
        };
        assert!(access.read_granted(0));
        assert!(access.read_granted(1));
        assert!(!access.read_granted(2));
        assert!(access.read_granted(3));
        assert!(!access.write_granted(0));
        assert!(access.write_granted(1));
        assert!(access.write_granted(3));
        assert!(!access.write_granted(8));
    }

    #[test]
    fn decode_lists_the_ec_row_only_on_v2() {
        let v1 = MasterAccess {
            word: 0x0a0b_0000,
            version: IfdVersion::V1,
        }
        .to_string();
        assert!(!v1.contains("EC Region"));
        assert!(v1.contains("Requester ID"));

        let v2 = MasterAccess {
            word: 0x00a0_0b00,
            version: IfdVersion::V2,
        }
        .to_string();
        assert!(v2.contains("EC Region Write Access"));
        assert!(!v2.contains("Requester ID"));
    }
}
