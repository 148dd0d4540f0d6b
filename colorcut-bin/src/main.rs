//! Reduce the colors of an image to a small palette using median cut or k-means clustering.

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    clippy::missing_docs_in_private_items,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::unreadable_literal
)]

mod cli;

#[allow(clippy::wildcard_imports)]
use cli::*;

use std::{
    fmt::{self, Display},
    path::Path,
    process::ExitCode,
    time::Instant,
};

use clap::Parser;
use colorcut::{
    BitmapSource, Color, ColorQuantizer, KMeansOptions, KMeansPalette, MedianCut, PaletteEngine,
    QuantizeOptions, Quantizer, RasterPath, SerpentinePath,
};
use colored::Colorize;
use image::{DynamicImage, GenericImageView};
use palette::{FromColor, Okhsl, Oklab, Srgb};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Record the running time of an expression and log the elapsed time
macro_rules! time {
    ($name: literal, $func_call: expr) => {{
        let start = Instant::now();
        let result = $func_call;
        info!("{} took {}ms", $name, start.elapsed().as_millis());
        result
    }};
}

/// Error cases for generating a palette from an image file
#[derive(Debug)]
enum CliError {
    /// Failed to read or decode the image file
    ImageLoad(image::ImageError),
    /// Failed to scan the image or compute its palette
    Palette(colorcut::Error),
    /// Failed to build the scan thread pool
    #[cfg(feature = "threads")]
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CliError::ImageLoad(e) => write!(f, "Failed to load the image file: {e}"),
            CliError::Palette(e) => write!(f, "Failed to generate the palette: {e}"),
            #[cfg(feature = "threads")]
            CliError::ThreadPool(e) => write!(f, "Failed to create the thread pool: {e}"),
        }
    }
}

impl From<colorcut::Error> for CliError {
    fn from(e: colorcut::Error) -> Self {
        CliError::Palette(e)
    }
}

fn main() -> ExitCode {
    let options = Options::parse();

    init_logging(options.verbose);

    let result = run_generate_and_print_palette(&options);

    // Returning Result<_> uses Debug printing instead of Display
    if let Err(e) = result {
        eprintln!("{e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Log to stderr, at the level given by RUST_LOG if set
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds a thread pool with one thread per scan task and then runs `generate_and_print_palette`
#[cfg(feature = "threads")]
fn run_generate_and_print_palette(options: &Options) -> Result<(), CliError> {
    let threads = if options.no_parallel {
        1
    } else {
        usize::from(options.tasks)
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(CliError::ThreadPool)?;

    pool.install(|| generate_and_print_palette(options))
}

/// Runs `generate_and_print_palette` on a single thread
#[cfg(not(feature = "threads"))]
fn run_generate_and_print_palette(options: &Options) -> Result<(), CliError> {
    generate_and_print_palette(options)
}

/// Load an image, generate its palette, and print the result using the given options
fn generate_and_print_palette(options: &Options) -> Result<(), CliError> {
    // Input
    let img = time!("Image loading", load_image(&options.image))?;
    let img = generate_thumbnail(img, options.max_pixels);

    // Processing
    let palette = {
        let start = Instant::now();
        let result = match img {
            DynamicImage::ImageRgba8(img) => generate_palette(&img, options),
            DynamicImage::ImageRgb16(img) => generate_palette(&img, options),
            DynamicImage::ImageRgba16(img) => generate_palette(&img, options),
            img => generate_palette(&img.into_rgb8(), options),
        };
        info!(
            "Palette generation took {}ms in total",
            start.elapsed().as_millis()
        );
        result?
    };

    // Output
    let colors = sorted_colors(&palette, options);
    print_palette(&colors, options);

    Ok(())
}

/// Load the image at the given path
fn load_image(path: &Path) -> Result<DynamicImage, CliError> {
    image::open(path).map_err(CliError::ImageLoad)
}

/// Create a thumbnail with at most `max_pixels` pixels if the image has more than `max_pixels` pixels
fn generate_thumbnail(image: DynamicImage, max_pixels: u32) -> DynamicImage {
    // The number of pixels should be < u64::MAX, since image dimensions are (u32, u32)
    let (width, height) = image.dimensions();
    let pixels = u64::from(width) * u64::from(height);
    if pixels <= u64::from(max_pixels) {
        info!("Skipping image thumbnail since pixels was below max pixels");

        image
    } else {
        // (u64 as f64) only gives innaccurate results for very large u64
        // I.e, only when pixels is in the order of quintillions
        #[allow(clippy::cast_precision_loss)]
        let scale = (f64::from(max_pixels) / pixels as f64).sqrt();

        // multiplying by a positive factor < 1
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (thumb_width, thumb_height) = (
            (f64::from(width) * scale) as u32,
            (f64::from(height) * scale) as u32,
        );

        info!("Creating a thumbnail with dimensions {thumb_width}x{thumb_height}");

        time!(
            "Image thumbnail",
            image.thumbnail(thumb_width, thumb_height)
        )
    }
}

/// The scan options selected by --no-parallel and --tasks
fn quantize_options(options: &Options) -> QuantizeOptions {
    QuantizeOptions::default()
        .with_parallel(!options.no_parallel)
        .with_task_count(usize::from(options.tasks))
}

/// Generate a palette for the given image with the algorithm chosen in `options`
fn generate_palette<S: BitmapSource + Sync>(source: S, options: &Options) -> Result<Vec<Color>, CliError> {
    match options.method {
        Method::MedianCut => quantize(Quantizer::new(source, MedianCut), options),
        Method::KMeans => {
            let kmeans = KMeansOptions {
                normalization: options.normalization_method(),
                seed_method: options.init.into(),
                trials: options.trials,
                seed: options.seed,
            };
            quantize(Quantizer::new(source, KMeansPalette::new(kmeans)), options)
        }
    }
}

/// Scan the image and then reduce its colors, timing each step
fn quantize<S, E>(quantizer: Quantizer<S, E>, options: &Options) -> Result<Vec<Color>, CliError>
where
    S: BitmapSource + Sync,
    E: PaletteEngine,
{
    let quantizer = quantizer.with_options(quantize_options(options));
    let quantizer = match options.scan {
        ScanOrder::Raster => quantizer.with_path_provider(RasterPath),
        ScanOrder::Serpentine => quantizer.with_path_provider(SerpentinePath),
    };

    time!("Scanning", quantizer.scan())?;
    info!(
        "Reduced image to {} unique colors",
        quantizer.unique_colors().len()
    );

    let palette = time!(
        "Palette reduction",
        quantizer.palette(usize::from(options.colors))
    )?;

    Ok(palette)
}

/// The [`Okhsl`] representation of a color, used for sorting
fn okhsl(color: Color) -> Okhsl {
    let srgb = Srgb::<u8>::from(color).into_format::<f32>();
    Okhsl::from_color(Oklab::from_color(srgb.into_linear()))
}

/// Sort the palette colors by the given metric.
fn sorted_colors(palette: &[Color], options: &Options) -> Vec<Srgb<u8>> {
    let mut colors = palette
        .iter()
        .map(|&color| (okhsl(color), Srgb::<u8>::from(color)))
        .collect::<Vec<_>>();

    match options.sort {
        SortOutput::H => {
            colors.sort_by(|(x, _), (y, _)| f32::total_cmp(&x.hue.into(), &y.hue.into()));
        }
        SortOutput::S => {
            colors.sort_by(|(x, _), (y, _)| f32::total_cmp(&x.saturation, &y.saturation));
        }
        SortOutput::L => {
            colors.sort_by(|(x, _), (y, _)| f32::total_cmp(&x.lightness, &y.lightness));
        }
        SortOutput::None => (),
    }

    if options.reverse {
        colors.reverse();
    }

    colors.into_iter().map(|(_, color)| color).collect()
}

/// Print the given colors based off the provided options
fn print_palette(colors: &[Srgb<u8>], options: &Options) {
    match options.output {
        FormatOutput::Hex => color_format_print(colors, options, " ", |color| format!("{color:X}")),

        FormatOutput::Rgb => color_format_print(colors, options, " ", |color| {
            format!("({},{},{})", color.red, color.green, color.blue)
        }),

        FormatOutput::Swatch => print_colors(colors, "", |color| {
            "   "
                .on_truecolor(color.red, color.green, color.blue)
                .to_string()
        }),
    }
}

/// Print a line of colors using the given format
fn print_colors(colors: &[Srgb<u8>], delimiter: &str, format: impl Fn(Srgb<u8>) -> String) {
    println!("{}", format_colors(colors, delimiter, format));
}

/// Join the formatted colors with `delimiter`
fn format_colors(colors: &[Srgb<u8>], delimiter: &str, format: impl Fn(Srgb<u8>) -> String) -> String {
    colors
        .iter()
        .map(|&color| format(color))
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Format, colorize, and then print the text for all colors
fn color_format_print(
    colors: &[Srgb<u8>],
    options: &Options,
    delimiter: &str,
    format: impl Fn(Srgb<u8>) -> String,
) {
    match options.colorize {
        Some(ColorizeOutput::Fg) => print_colors(colors, delimiter, |color| {
            format(color)
                .truecolor(color.red, color.green, color.blue)
                .to_string()
        }),

        Some(ColorizeOutput::Bg) => print_colors(colors, delimiter, |color| {
            format(color)
                .on_truecolor(color.red, color.green, color.blue)
                .to_string()
        }),

        None => print_colors(colors, delimiter, format),
    }
}
