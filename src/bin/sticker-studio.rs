use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use sticker_studio::{
    collect_images, export_files, Color, ExportOptions, ExportResult, MaskFileSegmenter,
    MaskLocation, Preferences, PreferencesStore,
};

#[derive(Parser)]
#[command(
    name = "sticker-studio",
    about = "Turn segmented photo subjects into stickers with reveal rings and outlines",
    version,
    after_help = "Masks are read from <stem>_mask.png next to each image unless --mask is given.\n\
                  Settings not given on the command line come from the last saved session."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image file or directory
    input: PathBuf,

    /// Output directory (default: saved output dir, else the input's folder)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Mask file, or directory holding <stem>_mask.png files
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Subject threshold (0.0-1.0)
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Background-reveal ring width in pixels (0 disables)
    #[arg(long)]
    reveal: Option<u32>,

    /// Solid outline width in pixels (0 disables)
    #[arg(long)]
    outline: Option<u32>,

    /// Solid outline color (#rrggbb)
    #[arg(long)]
    outline_color: Option<Color>,

    /// Decorative stroke width around the reveal ring (0 disables)
    #[arg(long)]
    decor: Option<u32>,

    /// Decorative stroke color (#rrggbb)
    #[arg(long)]
    decor_color: Option<Color>,

    /// Keep the original background, faded to --blend-alpha
    #[arg(long)]
    keep_background: bool,

    /// Background opacity when keeping it (0.0-1.0)
    #[arg(long)]
    blend_alpha: Option<f32>,

    /// Pad the canvas so outer rings are never clipped
    #[arg(long)]
    expand: bool,

    /// Write only <stem>_final.png
    #[arg(long)]
    final_only: bool,

    /// Start from a saved preset
    #[arg(long)]
    preset: Option<String>,

    /// Save the resulting settings as the last session
    #[arg(long)]
    save_prefs: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if !cli.input.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input.display());
        process::exit(1);
    }

    let store = match PreferencesStore::default_location() {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "preferences disabled");
            None
        }
    };
    let mut prefs = store
        .as_ref()
        .map(PreferencesStore::load_session)
        .unwrap_or_default();

    if let Some(name) = &cli.preset {
        let presets = store
            .as_ref()
            .map(PreferencesStore::load_presets)
            .unwrap_or_default();
        let Some(preset) = presets.get(name) else {
            eprintln!("Error: Unknown preset: {name}");
            process::exit(1);
        };
        prefs.apply_preset(name, preset);
    }

    apply_overrides(&cli, &mut prefs);
    if let Err(e) = prefs.validate() {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    if cli.save_prefs {
        if let Some(store) = &store {
            if let Err(e) = store.save_session(&prefs) {
                eprintln!("Warning: could not save preferences: {e}");
            }
        }
    }

    let location = match &cli.mask {
        Some(m) if m.is_dir() => MaskLocation::Dir(m.clone()),
        Some(m) => MaskLocation::File(m.clone()),
        None => MaskLocation::Beside,
    };
    let segmenter = MaskFileSegmenter::new(location);

    let inputs = if cli.input.is_dir() {
        if cli.output.is_none() && prefs.output_dir.is_none() {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: sticker-studio <input_dir> -o <output_dir>");
            process::exit(1);
        }
        match collect_images(&cli.input) {
            Ok(files) => segmenter.without_masks(files),
            Err(e) => {
                eprintln!("Error: Failed to read directory: {e}");
                process::exit(1);
            }
        }
    } else {
        vec![cli.input.clone()]
    };

    let output_dir = cli
        .output
        .clone()
        .or_else(|| prefs.output_dir.clone())
        .unwrap_or_else(|| default_output_dir(&cli.input));
    let opts = ExportOptions {
        output_dir,
        final_only: prefs.save_only_final,
        preview: prefs.preview_mode,
        threshold: prefs.threshold,
    };

    if !cli.quiet {
        eprintln!(
            "Threshold {:.2}, reveal {}px, outline {}px {}, decor {}px",
            prefs.threshold,
            prefs.style.reveal_width,
            prefs.style.outline_width,
            prefs.style.outline_color,
            prefs.style.decor_width,
        );
        eprintln!();
    }

    let results = export_files(&inputs, &segmenter, &prefs.style, &opts);

    let mut success_count = 0u32;
    let mut fail_count = 0u32;
    for r in &results {
        print_result(r, &cli);
        if r.success() {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sticker_studio={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn apply_overrides(cli: &Cli, prefs: &mut Preferences) {
    let style = &mut prefs.style;
    if let Some(t) = cli.threshold {
        prefs.threshold = t;
    }
    if let Some(w) = cli.reveal {
        style.reveal_width = w;
    }
    if let Some(w) = cli.outline {
        style.outline_width = w;
    }
    if let Some(c) = cli.outline_color {
        style.outline_color = c;
    }
    if let Some(w) = cli.decor {
        style.decor_width = w;
    }
    if let Some(c) = cli.decor_color {
        style.decor_color = c;
    }
    if cli.keep_background {
        style.keep_background = true;
    }
    if let Some(a) = cli.blend_alpha {
        style.blend_alpha = a;
    }
    if cli.expand {
        style.expand_canvas = true;
    }
    if cli.final_only {
        prefs.save_only_final = true;
    }
    if let Some(o) = &cli.output {
        prefs.output_dir = Some(o.clone());
    }
}

fn default_output_dir(input: &Path) -> PathBuf {
    if input.is_dir() {
        input.to_path_buf()
    } else {
        input.parent().unwrap_or(Path::new(".")).to_path_buf()
    }
}

fn print_result(result: &ExportResult, cli: &Cli) {
    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    match &result.error {
        None => {
            if !cli.quiet {
                eprintln!("[OK] {filename} ({} subject px)", result.subject_pixels);
            }
            if cli.verbose {
                for out in &result.outputs {
                    eprintln!("  -> {}", out.display());
                }
            }
        }
        Some(e) => eprintln!("[FAIL] {filename}: {e}"),
    }
}
