use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgGroup, Parser};
use log::{error, info};

use ifdtool::dump::{self, Report};
use ifdtool::error::IfdError;
use ifdtool::ifd::{ChipSelect, Density, Descriptor, SpiFrequency};
use ifdtool::image::Image;
use ifdtool::layout::new_layout;
use ifdtool::ops;
use ifdtool::region::{RegionKind, RegionTable};

#[derive(Clone)]
struct InjectSpec {
    kind: RegionKind,
    path: PathBuf,
}

fn parse_inject(arg: &str) -> Result<InjectSpec, String> {
    let (name, path) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected <region>:<file>, got {arg:?}"))?;
    let kind = RegionKind::from_arg_name(name)
        .ok_or_else(|| format!("no such region type: {name:?}"))?;
    Ok(InjectSpec {
        kind,
        path: PathBuf::from(path),
    })
}

fn parse_spifreq(arg: &str) -> Result<SpiFrequency, String> {
    arg.parse()
        .ok()
        .and_then(SpiFrequency::from_mhz)
        .ok_or_else(|| format!("invalid SPI frequency: {arg}"))
}

fn parse_density(arg: &str) -> Result<Density, String> {
    arg.parse()
        .ok()
        .and_then(Density::from_size)
        .ok_or_else(|| format!("unknown density: {arg}"))
}

fn parse_chip(arg: &str) -> Result<ChipSelect, String> {
    arg.parse()
        .ok()
        .and_then(ChipSelect::from_index)
        .ok_or_else(|| format!("invalid chip selection: {arg}"))
}

/// Dump and edit Intel Firmware Descriptors in SPI flash images
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("mode").required(true).args([
        "dump", "layout", "extract", "inject", "newlayout",
        "spifreq", "density", "em100", "lock", "unlock",
    ]),
))]
struct Cli {
    /// Dump the firmware descriptor
    #[arg(short, long)]
    dump: bool,

    /// Dump regions into a flashrom layout file
    #[arg(short = 'f', long, value_name = "FILE")]
    layout: Option<PathBuf>,

    /// Extract all regions to flashregion_<n>_<name>.bin files
    #[arg(short = 'x', long)]
    extract: bool,

    /// Inject a file into a region (Descriptor, BIOS, ME, GbE, Platform, EC)
    #[arg(short, long, value_name = "REGION:FILE", value_parser = parse_inject)]
    inject: Option<InjectSpec>,

    /// Update regions using a flashrom layout file
    #[arg(short, long, value_name = "FILE")]
    newlayout: Option<PathBuf>,

    /// Set the SPI frequency in MHz (17, 20, 30, 33, 48 or 50)
    #[arg(short, long, value_name = "MHZ", value_parser = parse_spifreq)]
    spifreq: Option<SpiFrequency>,

    /// Set chip density (512 in KByte, 1-64 in MByte, 0 for unused)
    #[arg(short = 'D', long, value_name = "SIZE", value_parser = parse_density)]
    density: Option<Density>,

    /// Select the SPI chip to operate on: 0 both (default), 1 or 2
    #[arg(short = 'C', long, default_value = "0", value_parser = parse_chip)]
    chip: ChipSelect,

    /// Set the EM100 frequency and disable dual output fast read
    #[arg(short, long)]
    em100: bool,

    /// Lock the descriptor and ME region
    #[arg(short, long)]
    lock: bool,

    /// Unlock the descriptor and ME region
    #[arg(short, long)]
    unlock: bool,

    /// Image file to operate on
    file: PathBuf,
}

fn main() {
    // Default to log level "info". Otherwise, you get no "regular" logs.
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(env).init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        error!("{e}");
        std::process::exit(1);
    }
}

/// Write the modified image next to its source, leaving the source alone.
fn write_image(input: &Path, image: &Image) -> Result<(), IfdError> {
    let mut name = OsString::from(input.as_os_str());
    name.push(".new");
    info!("Writing new image to {}", name.to_string_lossy());
    fs::write(name, image.as_bytes())?;
    Ok(())
}

fn extract_regions(image: &Image, desc: &Descriptor) -> Result<(), IfdError> {
    let table = RegionTable::new(desc);
    for index in 0..desc.max_regions() {
        let region = table.get(image, index)?;
        println!("{}", dump::region_line(index, region));
        let Some(kind) = RegionKind::from_repr(index) else {
            continue;
        };
        if region.size() > 0 {
            let payload = image.slice(region.base as usize, region.size() as usize)?;
            fs::write(kind.file_name(), payload)?;
            info!("Wrote {}", kind.file_name());
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), IfdError> {
    let data = fs::read(&cli.file)?;
    info!("File {} is {} bytes", cli.file.display(), data.len());

    let mut image = Image::new(data);
    let desc = Descriptor::parse(&image)?;

    if cli.dump {
        print!("{}", Report::parse(&image, &desc)?);
        return Ok(());
    }

    if let Some(path) = &cli.layout {
        fs::write(path, dump::layout_lines(&image, &desc)?)?;
        info!("Wrote layout to {}", path.display());
        return Ok(());
    }

    if cli.extract {
        return extract_regions(&image, &desc);
    }

    if let Some(spec) = &cli.inject {
        let payload = fs::read(&spec.path)?;
        info!("File {} is {} bytes", spec.path.display(), payload.len());
        ops::inject_region(&mut image, &desc, spec.kind, &payload)?;
        info!(
            "Adding {} as the {} section of {}",
            spec.path.display(),
            spec.kind,
            cli.file.display()
        );
        return write_image(&cli.file, &image);
    }

    if let Some(path) = &cli.newlayout {
        let layout = fs::read_to_string(path)?;
        let out = new_layout(&image, &desc, &layout)?;
        return write_image(&cli.file, &out);
    }

    if let Some(freq) = cli.spifreq {
        ops::set_spi_frequency(&mut image, &desc, freq)?;
        return write_image(&cli.file, &image);
    }

    if let Some(density) = cli.density {
        info!("Setting chip density to {density}");
        ops::set_chip_density(&mut image, &desc, cli.chip, density)?;
        return write_image(&cli.file, &image);
    }

    if cli.em100 {
        ops::set_em100_mode(&mut image, &desc)?;
        return write_image(&cli.file, &image);
    }

    if cli.lock {
        ops::lock_descriptor(&mut image, &desc)?;
        return write_image(&cli.file, &image);
    }

    if cli.unlock {
        ops::unlock_descriptor(&mut image, &desc)?;
        return write_image(&cli.file, &image);
    }

    Ok(())
}
