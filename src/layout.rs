//! Flashrom-style layout files and the region relayout engine.
//!
//! A layout file holds one `BASE:LIMIT NAME` line per region, hex addresses,
//! names in either their pretty or terse form. Relayout rebuilds the image
//! around the new extents: payloads move with their region, the image is
//! refilled with 0xFF elsewhere, and the total size snaps to the next power
//! of two above the highest limit.

use log::{info, warn};

use crate::error::IfdError;
use crate::ifd::Descriptor;
use crate::image::Image;
use crate::region::{regions_collide, Region, RegionKind, RegionTable};

/// Parse layout lines against the slots the dialect knows.
///
/// Lines that do not split into exactly two tokens, and lines naming no
/// known region, are skipped. A recognized line with a malformed BASE:LIMIT
/// pair is fatal.
pub fn parse_layout(
    text: &str,
    max_regions: usize,
) -> Result<Vec<(RegionKind, Region)>, IfdError> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let mut tokens = line.split_whitespace();
        let (Some(range), Some(name)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        if tokens.next().is_some() {
            continue;
        }
        let Some(kind) = RegionKind::from_name(name, max_regions) else {
            continue;
        };
        let parse = |field: &str| {
            u32::from_str_radix(field, 16).map_err(|_| IfdError::LayoutParse(line.to_string()))
        };
        let (base, limit) = range
            .split_once(':')
            .ok_or_else(|| IfdError::LayoutParse(line.to_string()))?;
        entries.push((kind, Region::new(parse(base)?, parse(limit)?)));
    }
    Ok(entries)
}

/// Least power of two strictly greater than `x`; zero for zero.
pub fn next_pow2(x: usize) -> usize {
    if x == 0 {
        return 0;
    }
    let mut y = 1;
    while y <= x {
        y <<= 1;
    }
    y
}

fn kinds(max_regions: usize) -> impl Iterator<Item = (usize, RegionKind)> {
    (0..max_regions).filter_map(|i| Some((i, RegionKind::from_repr(i)?)))
}

/// Rebuild the image around the extents in `layout`.
///
/// Per-region size policies: a grown region keeps its payload at the high
/// end, a shrunk region keeps the tail of its old payload, equal sizes copy
/// straight. The relocated descriptor's FLREG words are rewritten from slot
/// 1 up; slot 0 stays whatever the copied descriptor says. The FLREG writer
/// stops at slot 4, so a v2 relayout fails when it reaches slot 5.
pub fn new_layout(
    image: &Image,
    desc: &Descriptor,
    layout: &str,
) -> Result<Image, IfdError> {
    let table = RegionTable::new(desc);
    let max = desc.max_regions();
    let current: Vec<Region> = (0..max)
        .map(|i| table.get(image, i))
        .collect::<Result<_, _>>()?;

    let mut wanted = current.clone();
    for (kind, region) in parse_layout(layout, max)? {
        wanted[kind as usize] = region;
    }

    let mut extent = 0;
    for (i, kind) in kinds(max) {
        if wanted[i].size() == 0 {
            continue;
        }
        if wanted[i].size() < current[i].size() {
            warn!("region {kind} is shrinking and will be truncated to fit");
            warn!("this may result in an unusable image");
        }
        for (j, other) in kinds(max).skip(i + 1) {
            if regions_collide(wanted[i], wanted[j]) {
                return Err(IfdError::Overlap(kind, other));
            }
        }
        extent = extent.max(wanted[i].limit as usize);
    }

    let extent = next_pow2(extent.saturating_sub(1));
    if extent != image.len() {
        info!(
            "the image changes in size, from {} to {extent} bytes",
            image.len()
        );
    }

    let mut out = Image::erased(extent);
    for (i, kind) in kinds(max) {
        let (cur, new) = (current[i], wanted[i]);
        if new.size() == 0 {
            continue;
        }
        let mut copy_size = new.size() as usize;
        let mut offset_cur = 0;
        let mut offset_new = 0;
        if new.size() > cur.size() {
            // Keep the payload at the high end of the grown region.
            copy_size = cur.size() as usize;
            offset_new = (new.size() - cur.size()) as usize;
        } else if new.size() < cur.size() {
            // Keep the tail of the old payload.
            offset_cur = (cur.size() - new.size()) as usize;
        }
        if copy_size == 0 {
            continue;
        }
        info!(
            "copy region {i} ({kind}), {copy_size} bytes, \
             {:08x}+{offset_cur:08x} to {:08x}+{offset_new:08x}",
            cur.base, new.base
        );
        let src = image.slice(cur.base as usize + offset_cur, copy_size)?;
        out.slice_mut(new.base as usize + offset_new, copy_size)?
            .copy_from_slice(src);
    }

    // The descriptor travelled with region 0; locate it again in the new
    // image and rewrite the region words from slot 1 up.
    let new_desc = Descriptor::parse(&out)?;
    let new_table = RegionTable::new(&new_desc);
    for i in 1..max {
        new_table.set(&mut out, i, wanted[i])?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::layout_lines;
    use crate::ifd::IfdVersion;
    use crate::testutil::test_image;
    use crate::EMPTY;

    #[test]
    fn next_pow2_is_a_strict_upper_bound() {
        assert_eq!(next_pow2(0), 0);
        assert_eq!(next_pow2(1), 2);
        assert_eq!(next_pow2(0x3f_fffe), 0x40_0000);
        assert_eq!(next_pow2(0x40_0000), 0x80_0000);
        assert_eq!(next_pow2(0xff_ffff), 0x100_0000);
    }

    #[test]
    fn parse_skips_what_it_does_not_know() {
        let text = "\
00000000:00000fff fd
# a comment line
00001000:00002fff unknown_name
00003000:00003fff me extra_token
00200000:003fffff BIOS
";
        let entries = parse_layout(text, 5).unwrap();
        assert_eq!(
            entries,
            vec![
                (RegionKind::Descriptor, Region::new(0, 0xfff)),
                (RegionKind::Bios, Region::new(0x20_0000, 0x3f_ffff)),
            ]
        );
    }

    #[test]
    fn malformed_ranges_are_fatal() {
        assert!(matches!(
            parse_layout("00000000-00000fff fd\n", 5),
            Err(IfdError::LayoutParse(_))
        ));
        assert!(matches!(
            parse_layout("000000zz:00000fff fd\n", 5),
            Err(IfdError::LayoutParse(_))
        ));
    }

    #[test]
    fn unchanged_layout_reproduces_the_image() {
        let image = test_image(IfdVersion::V1);
        let desc = Descriptor::parse(&image).unwrap();
        let layout = layout_lines(&image, &desc).unwrap();

        let out = new_layout(&image, &desc, &layout).unwrap();

        // The highest enabled limit is the BIOS region at 0x3fffff, so the
        // image snaps down to 4 MiB; everything above was erased flash.
        assert_eq!(out.len(), 0x40_0000);
        assert_eq!(out.as_bytes(), &image.as_bytes()[..0x40_0000]);
        assert!(image.as_bytes()[0x40_0000..].iter().all(|&b| b == EMPTY));
    }

    #[test]
    fn growing_a_region_top_aligns_its_payload() {
        let mut image = test_image(IfdVersion::V1);
        // BIOS at 0x400000-0x7fffff, payload pattern to track the move.
        image.write_u32(0x44, 0x07ff_0400).unwrap();
        let pattern: Vec<u8> = (0..0x40_0000u32).map(|i| i as u8).collect();
        image
            .slice_mut(0x40_0000, 0x40_0000)
            .unwrap()
            .copy_from_slice(&pattern);

        let desc = Descriptor::parse(&image).unwrap();
        let layout = "\
00000000:00000fff fd
00800000:00ffffff bios
00001000:00100fff me
";
        let out = new_layout(&image, &desc, layout).unwrap();

        assert_eq!(out.len(), 0x100_0000);
        assert_eq!(out.slice(0xc0_0000, 0x40_0000).unwrap(), &pattern[..]);
        // Below the moved payload the grown region is erased flash.
        assert!(out
            .slice(0x80_0000, 0x40_0000)
            .unwrap()
            .iter()
            .all(|&b| b == EMPTY));

        // Slot 1 was rewritten, slot 0 kept the copied descriptor's word.
        let new_desc = Descriptor::parse(&out).unwrap();
        let new_table = RegionTable::new(&new_desc);
        assert_eq!(
            new_table.get(&out, 1).unwrap(),
            Region::new(0x80_0000, 0xff_ffff)
        );
        assert_eq!(new_table.word(&out, 0).unwrap(), 0x0000_0000);
    }

    #[test]
    fn shrinking_keeps_the_tail() {
        let mut image = test_image(IfdVersion::V1);
        let desc = Descriptor::parse(&image).unwrap();
        // Tag the last 16 bytes of the ME region.
        image
            .slice_mut(0x10_0ff0, 16)
            .unwrap()
            .copy_from_slice(b"tail of the blob");

        let layout = "\
00001000:00080fff me
";
        let out = new_layout(&image, &desc, layout).unwrap();

        let moved = out.slice(0x8_0ff0, 16).unwrap();
        assert_eq!(moved, b"tail of the blob");
    }

    #[test]
    fn overlap_is_fatal() {
        let image = test_image(IfdVersion::V1);
        let desc = Descriptor::parse(&image).unwrap();
        let layout = "\
00100000:00200000 bios
00180000:00280000 me
";
        assert!(matches!(
            new_layout(&image, &desc, layout),
            Err(IfdError::Overlap(RegionKind::Bios, RegionKind::Me))
        ));
    }

    #[test]
    fn v2_relayout_stops_at_the_writer_limit() {
        let image = test_image(IfdVersion::V2);
        let desc = Descriptor::parse(&image).unwrap();
        let layout = layout_lines(&image, &desc).unwrap();
        assert!(matches!(
            new_layout(&image, &desc, &layout),
            Err(IfdError::InvalidRegion(5))
        ));
    }

    #[test]
    fn a_region_materializing_from_nothing_is_erased() {
        let image = test_image(IfdVersion::V1);
        let desc = Descriptor::parse(&image).unwrap();
        let layout = "\
00110000:0011ffff pd
";
        let out = new_layout(&image, &desc, layout).unwrap();
        assert!(out
            .slice(0x11_0000, 0x1_0000)
            .unwrap()
            .iter()
            .all(|&b| b == EMPTY));
        let new_desc = Descriptor::parse(&out).unwrap();
        let table = RegionTable::new(&new_desc);
        assert_eq!(
            table.get(&out, 4).unwrap(),
            Region::new(0x11_0000, 0x11_ffff)
        );
    }

    #[test]
    fn layout_dump_round_trips_through_the_parser() {
        let image = test_image(IfdVersion::V1);
        let desc = Descriptor::parse(&image).unwrap();
        let rendered = layout_lines(&image, &desc).unwrap();
        let parsed = parse_layout(&rendered, 5).unwrap();
        let table = RegionTable::new(&desc);
        assert_eq!(parsed.len(), 5);
        for (kind, region) in parsed {
            assert_eq!(region, table.get(&image, kind as usize).unwrap());
        }
    }
}
