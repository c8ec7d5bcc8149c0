//! Pixcore CLI
//!
//! This is a demonstration CLI for the pixcore library.

use anyhow::{anyhow, bail, Context, Result};
use pixcore::codec::format_for_path;
use pixcore::prelude::*;
use std::path::Path;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("pixcore");

    if args.len() < 2 {
        print_usage(program);
        return;
    }

    let result = match args[1].as_str() {
        "list" => {
            list_kernels();
            Ok(())
        }
        "info" => kernel_info(&args[2..]),
        "apply" => apply_kernel(&args[2..]),
        "histogram" => histogram(&args[2..]),
        "stats" => stats(&args[2..]),
        "compare" => compare(&args[2..]),
        "help" | "--help" | "-h" => {
            print_usage(program);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage(program);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {:#}", err);
        if let Some(fix) = err.downcast_ref::<ProcessError>().and_then(|e| e.suggested_fix()) {
            eprintln!("Hint: {}", fix);
        }
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("pixcore v{}", pixcore::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  list                              List all available kernels");
    println!("  info <kernel> [--json]            Show detailed info about a kernel");
    println!("  apply <kernel> <out> [inputs...] [options]  Run a kernel and save the result");
    println!("  histogram <image> [plane] [--cumulative]   Print the non-empty histogram bins");
    println!("  stats <image> [--json]            Per-plane statistics");
    println!("  compare <a> <b>                   RMS error and SNR of two images");
    println!("  help                              Show this help message");
    println!();
    println!("Apply options:");
    println!("  --params <a,b,...>   Kernel parameters");
    println!("  --size <WxH>         Output size for render kernels without inputs");
    println!("  --color <space>      Output color space (gray, rgb)");
    println!("  --config <file>      Dispatcher options (TOML)");
}

fn list_kernels() {
    let registry = KernelRegistry::with_builtins();

    println!("Available kernels ({} total):", registry.len());
    println!();

    for signature in registry.signatures() {
        println!("  {}", signature);
        for id in registry.kernels_by_signature(*signature) {
            if let Some(metadata) = registry.get_metadata(id) {
                println!("      {} - {}", metadata.id, metadata.description);
            }
        }
        println!();
    }
}

fn kernel_info(args: &[String]) -> Result<()> {
    let id = args.first().ok_or_else(|| anyhow!("please specify a kernel id"))?;
    let registry = KernelRegistry::with_builtins();
    let entry = registry
        .get_entry(id)
        .ok_or_else(|| anyhow!("kernel not found: {} (use 'list' to see available kernels)", id))?;

    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string_pretty(&entry.metadata)?);
        return Ok(());
    }

    let metadata = &entry.metadata;
    println!("Kernel: {}", metadata.name);
    println!("ID: {}", metadata.id);
    println!("Signature: {}", entry.signature());
    if !entry.signature().is_render() {
        println!(
            "Sources: {}..={}",
            metadata.sources.start(),
            metadata.sources.end()
        );
    }
    println!();
    println!("Description:");
    println!("  {}", metadata.description);

    if !metadata.params.is_empty() {
        println!();
        println!("Parameters:");
        for param in &metadata.params {
            println!("  {} - {}", param.name, param.description);
        }
    }
    Ok(())
}

fn apply_kernel(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        bail!("usage: apply <kernel> <out> [inputs...] [--params a,b] [--size WxH] [--color gray|rgb] [--config file]");
    }
    let id = &args[0];
    let output = Path::new(&args[1]);

    let mut inputs = Vec::new();
    let mut params = Vec::new();
    let mut size: Option<(usize, usize)> = None;
    let mut color: Option<ColorSpace> = None;
    let mut options = DispatchOptions::default();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--params" if i + 1 < args.len() => {
                params = parse_params(&args[i + 1])?;
                i += 2;
            }
            "--size" if i + 1 < args.len() => {
                size = Some(parse_size(&args[i + 1])?);
                i += 2;
            }
            "--color" if i + 1 < args.len() => {
                color = Some(parse_color(&args[i + 1])?);
                i += 2;
            }
            "--config" if i + 1 < args.len() => {
                options = DispatchOptions::from_toml_file(&args[i + 1])
                    .with_context(|| format!("reading {}", args[i + 1]))?;
                i += 2;
            }
            flag if flag.starts_with("--") => bail!("unknown or incomplete option {}", flag),
            path => {
                inputs.push(load(Path::new(path))?);
                i += 1;
            }
        }
    }

    let mut dst = match (inputs.first(), size) {
        (Some(first), _) => {
            let color_space = color.unwrap_or(first.color_space());
            if color_space == first.color_space() {
                first.create_based()
            } else {
                ImageDescriptor::create(first.width(), first.height(), color_space, first.data_type())?
            }
        }
        (None, Some((width, height))) => {
            ImageDescriptor::create(width, height, color.unwrap_or(ColorSpace::Gray), DataType::Byte)?
        }
        (None, None) => bail!("render kernels need --size when no input is given"),
    };

    let registry = KernelRegistry::with_builtins();
    let dispatcher = Dispatcher::with_options(options);
    let sources: Vec<&ImageDescriptor> = inputs.iter().collect();
    let completed = registry
        .apply(&dispatcher, id, &sources, &mut dst, &params)
        .with_context(|| format!("applying kernel '{}'", id))?;
    if !completed {
        println!("Kernel '{}' stopped early; saving partial result", id);
    }

    save(&dst, output)?;
    println!("Saved {}", output.display());
    Ok(())
}

fn histogram(args: &[String]) -> Result<()> {
    let path = args.first().ok_or_else(|| anyhow!("please specify an image"))?;
    let plane = match args.get(1) {
        Some(p) if !p.starts_with("--") => p.parse().context("plane must be a number")?,
        _ => 0,
    };
    let cumulative = args.iter().any(|a| a == "--cumulative");

    let image = load(Path::new(path))?;
    let histogram = calc_histogram(&image, plane, cumulative)?;
    let offset = if image.data_type() == DataType::Short { 32768 } else { 0 };
    for (bin, count) in histogram.iter().enumerate().filter(|(_, count)| **count > 0) {
        println!("{:>6} {}", bin as i64 - offset, count);
    }
    Ok(())
}

fn stats(args: &[String]) -> Result<()> {
    let path = args.first().ok_or_else(|| anyhow!("please specify an image"))?;
    let image = load(Path::new(path))?;
    let stats = calc_image_statistics(&image)?;

    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!(
        "{}x{} {} {}{}",
        image.width(),
        image.height(),
        image.color_space(),
        image.data_type(),
        if image.has_alpha() { " + alpha" } else { "" }
    );
    for (plane, s) in stats.iter().enumerate() {
        println!(
            "plane {}: min {} max {} mean {:.3} stddev {:.3}",
            plane, s.min, s.max, s.mean, s.stddev
        );
    }
    if let Ok(colors) = count_colors(&image) {
        println!("colors: {}", colors);
    }
    Ok(())
}

fn compare(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        bail!("usage: compare <a> <b>");
    }
    let a = load(Path::new(&args[0]))?;
    let b = load(Path::new(&args[1]))?;

    println!("rms error: {:.4}", calc_rms_error(&a, &b)?);
    println!("snr: {:.2} dB", calc_snr(&a, &b)?);
    Ok(())
}

fn load(path: &Path) -> Result<ImageDescriptor> {
    ImageIoCodec::new()
        .load(path)
        .with_context(|| format!("loading {}", path.display()))
}

fn save(image: &ImageDescriptor, path: &Path) -> Result<()> {
    let format = format_for_path(path)?;
    ImageIoCodec::new()
        .save(image, path, format)
        .with_context(|| format!("saving {}", path.display()))
}

fn parse_params(text: &str) -> Result<Vec<f32>> {
    text.split(',')
        .map(|p| {
            p.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid parameter '{}'", p))
        })
        .collect()
}

fn parse_size(text: &str) -> Result<(usize, usize)> {
    let (w, h) = text
        .split_once('x')
        .ok_or_else(|| anyhow!("size must look like 640x480"))?;
    Ok((w.parse()?, h.parse()?))
}

fn parse_color(text: &str) -> Result<ColorSpace> {
    match text.to_ascii_lowercase().as_str() {
        "gray" => Ok(ColorSpace::Gray),
        "rgb" => Ok(ColorSpace::Rgb),
        "binary" => Ok(ColorSpace::Binary),
        other => bail!("unsupported output color space '{}'", other),
    }
}
