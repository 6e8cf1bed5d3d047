//! Human-readable descriptor report and flashrom layout rendering.
//!
//! The report is gathered into a [`Report`] first, so every bounds problem
//! surfaces before a single line is printed; rendering itself cannot fail.

use std::fmt::{self, Display};

use crate::error::IfdError;
use crate::ifd::{
    Density, Descriptor, Fdbar, Flcomp, IfdVersion, SpiFrequency, FLUMAP1, OEM_OFFSET, OEM_SIZE,
};
use crate::image::Image;
use crate::master::{MasterAccess, MasterTable};
use crate::region::{Region, RegionKind, RegionTable};
use crate::vscc::{self, Jid, Vscc, VsccEntry};

const PCH_STRAP_COUNT: usize = 18;
const PROC_STRAP_COUNT: usize = 4;

fn freq_name(code: u8, version: IfdVersion) -> String {
    match SpiFrequency::from_code(code) {
        Some(freq) => freq.name(version).into(),
        None => format!("unknown<{code:x}>MHz"),
    }
}

fn density_name(code: u8) -> String {
    match Density::from_code(code) {
        Some(density) => density.name().into(),
        None => format!("unknown<{code:x}>MB"),
    }
}

/// One decoded region line of the report, shared with the extract mode.
pub fn region_line(index: usize, region: Region) -> String {
    let name = RegionKind::from_repr(index)
        .map(|kind| kind.to_string())
        .unwrap_or_default();
    format!("  Flash Region {index} ({name}): {region}")
}

/// Everything the full dump prints, decoded from one image.
#[derive(Clone, Debug)]
pub struct Report {
    version: IfdVersion,
    fdbar: Fdbar,
    flumap1: FLUMAP1,
    vscc: Vec<VsccEntry>,
    oem: Vec<u8>,
    region_words: Vec<u32>,
    regions: Vec<Region>,
    flcomp: Flcomp,
    flill: u32,
    flpb: u32,
    pch_straps: Vec<u32>,
    masters: Vec<(usize, &'static str, u32)>,
    proc_straps: Vec<u32>,
}

impl Report {
    pub fn parse(image: &Image, desc: &Descriptor) -> Result<Self, IfdError> {
        let table = RegionTable::new(desc);
        let mut region_words = Vec::new();
        let mut regions = Vec::new();
        for index in 0..desc.max_regions() {
            region_words.push(table.word(image, index)?);
            regions.push(table.get(image, index)?);
        }

        let flcomp = desc.flcomp(image)?;
        let flill = image.read_u32(desc.fcba() + 4)?;
        let flpb = image.read_u32(desc.fcba() + 8)?;

        let mut pch_straps = Vec::new();
        for i in 0..PCH_STRAP_COUNT {
            pch_straps.push(image.read_u32(desc.fpsba() + 4 * i)?);
        }
        let mut proc_straps = Vec::new();
        for i in 0..PROC_STRAP_COUNT {
            proc_straps.push(image.read_u32(desc.fmsba() + 4 * i)?);
        }

        let master_table = MasterTable::new(desc);
        let mut masters = vec![
            (1, "Host CPU/BIOS", master_table.flmstr(image, 1)?.word),
            (2, "Intel ME", master_table.flmstr(image, 2)?.word),
            (3, "GbE", master_table.flmstr(image, 3)?.word),
        ];
        if desc.version == IfdVersion::V2 {
            masters.push((5, "EC", master_table.flmstr(image, 5)?.word));
        }

        Ok(Self {
            version: desc.version,
            fdbar: desc.fdbar,
            flumap1: desc.flumap1(image)?,
            vscc: vscc::read_table(image, desc)?,
            oem: image.slice(OEM_OFFSET, OEM_SIZE)?.to_vec(),
            region_words,
            regions,
            flcomp,
            flill,
            flpb,
            pch_straps,
            masters,
            proc_straps,
        })
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m0 = self.fdbar.flmap0;
        writeln!(f, "FLMAP0:    0x{:08x}", m0.into_bits())?;
        writeln!(f, "  NR:      {}", m0.nr())?;
        writeln!(f, "  FRBA:    0x{:x}", m0.frba())?;
        writeln!(f, "  NC:      {}", m0.nc())?;
        writeln!(f, "  FCBA:    0x{:x}", m0.fcba())?;

        let m1 = self.fdbar.flmap1;
        writeln!(f, "FLMAP1:    0x{:08x}", m1.into_bits())?;
        writeln!(f, "  ISL:     0x{:02x}", m1.isl())?;
        writeln!(f, "  FPSBA:   0x{:x}", m1.fpsba())?;
        writeln!(f, "  NM:      {}", m1.nm())?;
        writeln!(f, "  FMBA:    0x{:x}", m1.fmba())?;

        let m2 = self.fdbar.flmap2;
        writeln!(f, "FLMAP2:    0x{:08x}", m2.into_bits())?;
        writeln!(f, "  PSL:     0x{:04x}", m2.psl())?;
        writeln!(f, "  FMSBA:   0x{:x}", m2.fmsba())?;

        writeln!(f, "FLUMAP1:   0x{:08x}", self.flumap1.into_bits())?;
        writeln!(
            f,
            "  Intel ME VSCC Table Length (VTL):        {}",
            self.flumap1.vtl()
        )?;
        writeln!(
            f,
            "  Intel ME VSCC Table Base Address (VTBA): 0x{:06x}",
            self.flumap1.vtba()
        )?;
        writeln!(f)?;

        writeln!(f, "ME VSCC table:")?;
        for (i, entry) in self.vscc.iter().enumerate() {
            writeln!(f, "  JID{i}:  0x{:08x}", entry.jid)?;
            write!(f, "{}", Jid(entry.jid))?;
            writeln!(f, "  VSCC{i}: 0x{:08x}", entry.vscc)?;
            write!(f, "{}", Vscc(entry.vscc))?;
        }
        writeln!(f)?;

        writeln!(f, "OEM Section:")?;
        for (i, row) in self.oem.chunks(16).enumerate() {
            write!(f, "{:02x}:", i << 4)?;
            for byte in row {
                write!(f, " {byte:02x}")?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;

        writeln!(f, "Found Region Section")?;
        for (i, region) in self.regions.iter().enumerate() {
            writeln!(f, "FLREG{i}:    0x{:08x}", self.region_words[i])?;
            writeln!(f, "{}", region_line(i, *region))?;
        }
        writeln!(f)?;

        writeln!(f, "Found Component Section")?;
        writeln!(f, "FLCOMP     0x{:08x}", self.flcomp.0)?;
        let supported = |on: bool| if on { "" } else { "not " };
        writeln!(
            f,
            "  Dual Output Fast Read Support:       {}supported",
            supported(self.flcomp.dual_output_fast_read())
        )?;
        writeln!(
            f,
            "  Read ID/Read Status Clock Frequency: {}",
            freq_name(self.flcomp.read_id_status_freq(), self.version)
        )?;
        writeln!(
            f,
            "  Write/Erase Clock Frequency:         {}",
            freq_name(self.flcomp.write_erase_freq(), self.version)
        )?;
        writeln!(
            f,
            "  Fast Read Clock Frequency:           {}",
            freq_name(self.flcomp.fast_read_freq(), self.version)
        )?;
        writeln!(
            f,
            "  Fast Read Support:                   {}supported",
            supported(self.flcomp.fast_read())
        )?;
        writeln!(
            f,
            "  Read Clock Frequency:                {}",
            freq_name(self.flcomp.read_freq(), self.version)
        )?;
        writeln!(
            f,
            "  Component 2 Density:                 {}",
            density_name(self.flcomp.component2_density(self.version))
        )?;
        writeln!(
            f,
            "  Component 1 Density:                 {}",
            density_name(self.flcomp.component1_density(self.version))
        )?;
        writeln!(f, "FLILL      0x{:08x}", self.flill)?;
        for i in (0..4).rev() {
            writeln!(
                f,
                "  Invalid Instruction {i}: 0x{:02x}",
                (self.flill >> (8 * i)) & 0xff
            )?;
        }
        writeln!(f, "FLPB       0x{:08x}", self.flpb)?;
        writeln!(
            f,
            "  Flash Partition Boundary Address: 0x{:06x}",
            (self.flpb & 0xfff) << 12
        )?;
        writeln!(f)?;

        writeln!(f, "Found PCH Strap Section")?;
        for (i, strap) in self.pch_straps.iter().enumerate() {
            writeln!(f, "{:<11}0x{strap:08x}", format!("PCHSTRP{i}:"))?;
        }
        writeln!(f)?;

        writeln!(f, "Found Master Section")?;
        for (n, label, word) in &self.masters {
            writeln!(f, "FLMSTR{n}:   0x{word:08x} ({label})")?;
            let access = MasterAccess {
                word: *word,
                version: self.version,
            };
            write!(f, "{access}")?;
        }

        writeln!(f, "Found Processor Strap Section")?;
        for strap in &self.proc_straps {
            writeln!(f, "????:      0x{strap:08x}")?;
        }
        Ok(())
    }
}

/// Render the flashrom layout file: one line per region slot, enabled or
/// not, terse names, zero-padded lower-case hex.
pub fn layout_lines(image: &Image, desc: &Descriptor) -> Result<String, IfdError> {
    let table = RegionTable::new(desc);
    let mut out = String::new();
    for (index, kind) in (0..desc.max_regions()).filter_map(|i| Some((i, RegionKind::from_repr(i)?))) {
        let region = table.get(image, index)?;
        out.push_str(&format!(
            "{:08x}:{:08x} {}\n",
            region.base,
            region.limit,
            kind.terse()
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_image;

    #[test]
    fn v1_report_decodes_the_clocks() {
        let image = test_image(IfdVersion::V1);
        let desc = Descriptor::parse(&image).unwrap();
        let report = Report::parse(&image, &desc).unwrap().to_string();
        assert!(report.contains("  Read Clock Frequency:                20MHz"));
        assert!(report.contains("  Read ID/Read Status Clock Frequency: 33MHz"));
        assert!(report.contains("  Write/Erase Clock Frequency:         20MHz"));
        assert!(report.contains("  Component 1 Density:                 8MB"));
        assert!(report.contains("  Flash Region 1 (BIOS): 00200000 - 003fffff"));
    }

    #[test]
    fn v1_report_stops_at_flreg4_and_hides_the_ec_master() {
        let image = test_image(IfdVersion::V1);
        let desc = Descriptor::parse(&image).unwrap();
        let report = Report::parse(&image, &desc).unwrap().to_string();
        assert!(report.contains("FLREG4:"));
        assert!(!report.contains("FLREG5:"));
        assert!(!report.contains("EC Region"));
        assert!(report.contains("Requester ID:"));
    }

    #[test]
    fn v2_report_carries_all_nine_regions_and_the_ec_master() {
        let image = test_image(IfdVersion::V2);
        let desc = Descriptor::parse(&image).unwrap();
        let report = Report::parse(&image, &desc).unwrap().to_string();
        assert!(report.contains("  Read Clock Frequency:                30MHz"));
        assert!(report.contains("FLREG8:"));
        assert!(report.contains("FLMSTR5:   0xffffff00 (EC)"));
        assert!(report.contains("EC Region Write Access"));
        assert!(!report.contains("Requester ID:"));
    }

    #[test]
    fn report_includes_straps_vscc_and_oem() {
        let image = test_image(IfdVersion::V1);
        let desc = Descriptor::parse(&image).unwrap();
        let report = Report::parse(&image, &desc).unwrap().to_string();
        assert!(report.contains("PCHSTRP0:  0x5a000000"));
        assert!(report.contains("PCHSTRP17: 0x5a000011"));
        assert!(report.contains("????:      0xa5000000"));
        assert!(report.contains("  JID0:  0x001840ef"));
        assert!(report.contains("OEM Section:"));
        assert!(report.contains("00: ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff"));
    }

    #[test]
    fn layout_lists_every_slot_with_terse_names() {
        let image = test_image(IfdVersion::V1);
        let desc = Descriptor::parse(&image).unwrap();
        let layout = layout_lines(&image, &desc).unwrap();
        assert_eq!(
            layout,
            "00000000:00000fff fd\n\
             00200000:003fffff bios\n\
             00001000:00100fff me\n\
             00fff000:00000fff gbe\n\
             00fff000:00000fff pd\n"
        );
    }

    #[test]
    fn v2_layout_has_nine_lines() {
        let image = test_image(IfdVersion::V2);
        let desc = Descriptor::parse(&image).unwrap();
        let layout = layout_lines(&image, &desc).unwrap();
        assert_eq!(layout.lines().count(), 9);
        assert!(layout.ends_with("07fff000:00000fff ec\n"));
    }
}
