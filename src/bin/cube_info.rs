//! Print a summary of the cubes and image extensions in a file.
//!
//! Usage: `cube-info <file> [--config <config.json>] [--export <path>]`
//!
//! With `--export`, the cube is collapsed to a spectrum using the configured
//! method and written to `<path>.<export_extension>`.

use std::path::PathBuf;
use std::process::ExitCode;

use cube_tools::io::export;
use cube_tools::{Config, CubeData, Dataset, NdContainer, ReaderRegistry, read_cube_file};

struct Args {
    file: PathBuf,
    config: Option<PathBuf>,
    export: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut file = None;
    let mut config = None;
    let mut export = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().ok_or("--config needs a path")?)),
            "--export" => export = Some(PathBuf::from(args.next().ok_or("--export needs a path")?)),
            other if file.is_none() => file = Some(PathBuf::from(other)),
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }

    Ok(Args {
        file: file.ok_or("usage: cube-info <file> [--config <json>] [--export <path>]")?,
        config,
        export,
    })
}

fn describe_cube(cube: &CubeData) -> cube_tools::Result<()> {
    let nd = cube.nddata();
    println!("cube {:?}", nd.shape());
    println!(
        "  unit: {}",
        nd.unit().map(|u| u.symbol()).unwrap_or("(none)")
    );
    println!(
        "  uncertainty: {}, mask: {}, coordinates: {}",
        nd.uncertainty().is_some(),
        nd.mask().is_some(),
        nd.wcs().is_some()
    );

    let spectrum = cube.get_spectrum(0, 0)?;
    let dispersion = spectrum.dispersion();
    if let (Some(first), Some(last)) = (dispersion.value().first(), dispersion.value().last()) {
        println!(
            "  dispersion: {} .. {} {}",
            first,
            last,
            dispersion.unit().map(|u| u.symbol()).unwrap_or("")
        );
    }
    Ok(())
}

fn run(args: Args) -> cube_tools::Result<()> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_from_default_path().unwrap_or_default(),
    };

    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let registry = ReaderRegistry::new();
    let datasets = read_cube_file(&registry, &args.file)?;
    if datasets.is_empty() {
        println!("{}: nothing readable", args.file.display());
    }

    for dataset in &datasets {
        match dataset {
            Dataset::Cube(cube) => describe_cube(cube)?,
            Dataset::Images(group) => {
                let names: Vec<&str> = group.components.iter().map(|(n, _)| n.as_str()).collect();
                println!("{}: {}", group.label, names.join(", "));
            }
        }
    }

    if let Some(target) = &args.export {
        let cube = datasets
            .iter()
            .find_map(|d| match d {
                Dataset::Cube(cube) => Some(cube),
                Dataset::Images(_) => None,
            })
            .ok_or_else(|| cube_tools::CubeError::missing("cube", "export"))?;
        let (spectrum, _) = cube.collapse_to_spectrum(config.default_collapse_method, None)?;
        let written = export::export(spectrum.nddata(), target, &config.export_extension)?;
        println!("wrote {}", written.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
