//! sumi - a terminal for e-paper displays

use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::process;

use log::{info, warn};
use sumi_core::RectangleMerger;
use sumi_term::app::App;
use sumi_term::backend::EpaperEmulation;
use sumi_term::config::{BackendKind, CliArgs, Config};
use sumi_term::display::{DisplayBackend, MemoryDisplay};
use sumi_term::event::{EventSource, KbdStdin};
use sumi_term::glyph::TtfGlyphProvider;
use sumi_term::renderer::MatrixRenderer;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const HELP_TEXT: &str = r#"sumi - a terminal for e-paper displays

USAGE:
    sumi [OPTIONS]

OPTIONS:
    -c, --config <PATH>       Path to config file (default: ~/.config/sumi/config.toml)
    -b, --backend <BACKEND>   Display backend: auto, fbdev, emulation
    -f, --font <PATH>         Path to a monospace TrueType font
    -s, --font-size <SIZE>    Font size in points (default: 12)
    -o, --orientation <N>     Display rotation in 90-degree steps (0-3)
    -h, --help                Print help information
    -V, --version             Print version information

ENVIRONMENT VARIABLES:
    SUMI_BACKEND              Override the display backend
    SUMI_FONT                 Override the font path
    SUMI_FONT_SIZE            Override the font size
    SUMI_ORIENTATION          Override the orientation
"#;

/// Parse command line arguments
fn parse_args() -> Result<CliArgs, String> {
    let args: Vec<String> = env::args().collect();
    let mut cli_args = CliArgs::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                println!("{}", HELP_TEXT);
                process::exit(0);
            }
            "-V" | "--version" => {
                println!("sumi {}", VERSION);
                process::exit(0);
            }
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    return Err("--config requires a path argument".to_string());
                }
                cli_args.config_path = Some(PathBuf::from(&args[i]));
            }
            "-b" | "--backend" => {
                i += 1;
                if i >= args.len() {
                    return Err("--backend requires a backend name".to_string());
                }
                cli_args.backend = Some(BackendKind::parse(&args[i]).ok_or_else(|| {
                    format!(
                        "Unknown backend: {}. Valid backends: auto, fbdev, emulation",
                        args[i]
                    )
                })?);
            }
            "-f" | "--font" => {
                i += 1;
                if i >= args.len() {
                    return Err("--font requires a path argument".to_string());
                }
                cli_args.font_path = Some(PathBuf::from(&args[i]));
            }
            "-s" | "--font-size" => {
                i += 1;
                if i >= args.len() {
                    return Err("--font-size requires a numeric argument".to_string());
                }
                cli_args.font_size = Some(
                    args[i]
                        .parse()
                        .map_err(|_| format!("Invalid font size: {}", args[i]))?,
                );
            }
            "-o" | "--orientation" => {
                i += 1;
                if i >= args.len() {
                    return Err("--orientation requires a numeric argument".to_string());
                }
                cli_args.orientation = Some(
                    args[i]
                        .parse()
                        .map_err(|_| format!("Invalid orientation: {}", args[i]))?,
                );
            }
            arg => {
                return Err(format!("Unknown option: {}. Use --help for usage.", arg));
            }
        }
        i += 1;
    }

    Ok(cli_args)
}

/// Open the configured display backend, falling back to the emulation
fn open_backend(config: &Config) -> Box<dyn DisplayBackend> {
    #[cfg(target_os = "linux")]
    {
        use sumi_term::backend::FbDevDisplay;

        if matches!(config.general.backend, BackendKind::Fbdev | BackendKind::Auto) {
            match FbDevDisplay::open(&config.general.fbdev) {
                Ok(display) => return Box::new(display),
                Err(e) => {
                    if config.general.backend == BackendKind::Fbdev {
                        eprintln!("FATAL: couldn't open framebuffer: {}", e);
                        process::exit(1);
                    }
                    warn!("couldn't open framebuffer, using emulation: {}", e);
                }
            }
        }
    }
    Box::new(EpaperEmulation::new(800, 600))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting sumi v{}", VERSION);

    let cli_args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let config = match Config::load_with_args(&cli_args) {
        Ok(config) => config,
        Err(e) => {
            // A config file named on the command line must load; only the
            // default location may fall back to built-in settings.
            if cli_args.config_path.is_some() {
                eprintln!("FATAL: configuration error: {}", e);
                process::exit(1);
            }
            eprintln!("Configuration error: {}", e);
            warn!("Using default configuration due to error: {}", e);
            Config::default()
        }
    };

    let glyphs = TtfGlyphProvider::from_file(&config.font.path)?;
    let backend = open_backend(&config);
    let mut display = MemoryDisplay::new(backend);

    let (num, den) = config.merge_ratio_fraction();
    let renderer = MatrixRenderer::new(
        config.render_options(),
        RectangleMerger::with_ratio(num, den),
        &mut display,
        config.font.pixel_size(),
        config.render.orientation,
    );

    let mut app = App::new(renderer, display, glyphs);
    app.write_text(format!("sumi {}\r\n", VERSION).as_bytes());

    let mut keyboard = KbdStdin::new();
    let mut sources: Vec<&mut dyn EventSource> = vec![&mut keyboard];
    app.run(&mut sources);

    info!("sumi exited");
    Ok(())
}
