use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use thumbkit::config::{ConfigError, EditorConfig};
use thumbkit::persist::{SavedObject, SavedScene};
use thumbkit::render;
use thumbkit::scene::Scene;
use thumbkit::skia::{FontBook, FontError, PixmapSurface};
use thumbkit::surface::{ExportFormat, SurfaceError};
use thumbkit::text::{Direction, TextStyle};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid scene record: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Font(#[from] FontError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("unknown export format `{0}` (expected png or jpeg)")]
    UnknownFormat(String),
    #[error("text is empty")]
    EmptyText,
}

#[derive(Parser, Debug)]
#[command(name = "thumbkit", about = "Render and edit saved thumbnail scenes")]
struct Cli {
    /// Surface width in pixels (defaults to THUMBKIT_WIDTH or 1280).
    #[arg(long, global = true)]
    width: Option<u32>,

    /// Surface height in pixels (defaults to THUMBKIT_HEIGHT or 720).
    #[arg(long, global = true)]
    height: Option<u32>,

    /// Font face to load, as FAMILY=PATH. Repeatable.
    #[arg(long = "font-file", global = true, value_parser = parse_font_arg)]
    fonts: Vec<(String, PathBuf)>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a saved scene to an image file.
    Render {
        #[arg(long, env = "THUMBKIT_STATE")]
        state: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "png")]
        format: String,
    },
    /// Print the background and one line per object.
    Inspect {
        #[arg(long, env = "THUMBKIT_STATE")]
        state: PathBuf,
    },
    /// Append a text object and save the record.
    AddText {
        #[arg(long, env = "THUMBKIT_STATE")]
        state: PathBuf,
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "Arial")]
        font: String,
        #[arg(long, default_value_t = 48.0)]
        size: f64,
        #[arg(long, default_value = "#000000")]
        color: String,
        #[arg(long)]
        rtl: bool,
        #[arg(long)]
        shadow: bool,
    },
}

fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();
    let mut config = EditorConfig::from_env()?;
    config.width = cli.width.unwrap_or(config.width);
    config.height = cli.height.unwrap_or(config.height);
    let mut fonts = FontBook::new();
    for (family, path) in &cli.fonts {
        fonts.register_file(family, path)?;
    }

    match cli.command {
        Command::Render { state, out, format } => run_render(&config, fonts, &state, &out, &format),
        Command::Inspect { state } => run_inspect(&state),
        Command::AddText { state, text, font, size, color, rtl, shadow } => {
            let mut style = TextStyle::new(font, size, color);
            style.shadow = shadow;
            if rtl {
                style.direction = Direction::Rtl;
            }
            run_add_text(&config, fonts, &state, &text, style)
        }
    }
}

fn run_render(config: &EditorConfig, fonts: FontBook, state: &Path, out: &Path, format: &str) -> Result<(), CliError> {
    let format = ExportFormat::from_name(format).ok_or_else(|| CliError::UnknownFormat(format.to_owned()))?;
    let loaded = read_state(state)?.rebuild();
    if loaded.skipped_images > 0 {
        tracing::warn!(skipped = loaded.skipped_images, "image objects have no stored pixels and are not drawn");
    }
    let mut scene = Scene::new();
    loaded.apply(&mut scene);

    let mut surface = PixmapSurface::with_fonts(config.width, config.height, fonts)?;
    render::draw(&mut surface, &scene, None)?;
    let bytes = surface.encode(format)?;
    fs::write(out, &bytes).map_err(|source| io_err(out, source))?;
    tracing::info!(out = %out.display(), bytes = bytes.len(), objects = scene.len(), "rendered");
    Ok(())
}

fn run_inspect(state: &Path) -> Result<(), CliError> {
    let saved = read_state(state)?;
    println!("background: {}", saved.background_color);
    for (i, obj) in saved.objects.iter().enumerate() {
        println!("{i:>3} {}", describe(obj));
    }
    Ok(())
}

fn run_add_text(
    config: &EditorConfig,
    fonts: FontBook,
    state: &Path,
    text: &str,
    style: TextStyle,
) -> Result<(), CliError> {
    let mut saved = match fs::read_to_string(state) {
        Ok(raw) => serde_json::from_str::<SavedScene>(&raw)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => SavedScene::capture(&Scene::new()),
        Err(source) => return Err(io_err(state, source)),
    };

    // Measure with the same surface `render` would use.
    let mut surface = PixmapSurface::with_fonts(config.width, config.height, fonts)?;
    let mut scratch = Scene::new();
    scratch.add_text(text, style, &mut surface).ok_or(CliError::EmptyText)?;
    saved.objects.extend(SavedScene::capture(&scratch).objects);

    let raw = serde_json::to_string_pretty(&saved)?;
    fs::write(state, raw).map_err(|source| io_err(state, source))?;
    println!("{} objects", saved.objects.len());
    Ok(())
}

fn read_state(path: &Path) -> Result<SavedScene, CliError> {
    let raw = fs::read_to_string(path).map_err(|source| io_err(path, source))?;
    Ok(serde_json::from_str(&raw)?)
}

fn io_err(path: &Path, source: io::Error) -> CliError {
    CliError::Io { path: path.display().to_string(), source }
}

fn parse_font_arg(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((family, path)) if !family.trim().is_empty() && !path.is_empty() => {
            Ok((family.trim().to_owned(), PathBuf::from(path)))
        }
        _ => Err(format!("expected FAMILY=PATH, got `{raw}`")),
    }
}

fn describe(obj: &SavedObject) -> String {
    let geometry = format!("at ({:.0}, {:.0}) {:.0}x{:.0}", obj.x, obj.y, obj.width, obj.height);
    let mut line = if obj.is_text() {
        let text = obj.text.as_deref().unwrap_or_default().replace('\n', "\\n");
        format!("text  {geometry} {text:?}")
    } else {
        format!("image {geometry} (pixels not stored)")
    };
    if obj.rotation != 0.0 {
        line.push_str(&format!(" rot={:.0}", obj.rotation));
    }
    if obj.flip_x || obj.flip_y {
        line.push_str(&format!(" flip={}{}", if obj.flip_x { "x" } else { "" }, if obj.flip_y { "y" } else { "" }));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_arg_splits_on_first_equals() {
        let (family, path) = parse_font_arg("Open Sans=/fonts/a=b.ttf").unwrap();
        assert_eq!(family, "Open Sans");
        assert_eq!(path, PathBuf::from("/fonts/a=b.ttf"));
        assert!(parse_font_arg("no-path").is_err());
        assert!(parse_font_arg("=x.ttf").is_err());
    }

    #[test]
    fn describe_text_and_image() {
        let text = SavedObject {
            kind: Some("text".into()),
            x: 50.0,
            y: 60.0,
            width: 100.0,
            height: 58.0,
            rotation: 90.0,
            text: Some("a\nb".into()),
            ..SavedObject::default()
        };
        assert_eq!(describe(&text), r#"text  at (50, 60) 100x58 "a\\nb" rot=90"#);

        let image = SavedObject { flip_y: true, ..SavedObject::default() };
        assert_eq!(describe(&image), "image at (0, 0) 0x0 (pixels not stored) flip=y");
    }
}
