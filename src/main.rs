use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use regex::Regex;
use simplelog::{Config, LevelFilter, WriteLogger};

use marginalia::commentary::{
    InferenceClient, InferenceRequest, ScriptedClient, StreamAccumulator, pump,
};
use marginalia::panic_handler;
use marginalia::pdf::{Page, ScreenPoint, Viewport};
use marginalia::settings;
use marginalia::{Command, Effect, Viewer};

static POINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(-?\d+)\s*,\s*(-?\d+)\s*$").expect("point pattern is valid")
});

#[derive(Parser)]
#[command(name = "marginalia", about = "Select regions of a document and format commentary")]
#[command(version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log file location
    #[arg(long, global = true, default_value = "marginalia.log")]
    log_file: PathBuf,

    /// Settings file to use instead of the per-user config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rasterize every page of a document to PNG files
    Pages(PagesArgs),
    /// Replay a drag selection and write the captured region
    Select(SelectArgs),
    /// Stream text through the formatter and print the result as JSON
    Format(FormatArgs),
}

#[derive(Args)]
struct PagesArgs {
    document: PathBuf,

    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

#[derive(Args)]
struct SelectArgs {
    document: PathBuf,

    /// Drag start, as X,Y in surface pixels
    #[arg(long, value_parser = parse_point)]
    from: ScreenPoint,

    /// Drag end, as X,Y in surface pixels
    #[arg(long, value_parser = parse_point)]
    to: ScreenPoint,

    /// Scroll offset before the drag starts
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    scroll: i64,

    /// Scroll delta applied while the drag is in progress
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    drag_scroll: i64,

    #[arg(long, default_value = "region.png")]
    out: PathBuf,

    /// Question to ask about the region
    #[arg(long, requires = "answer")]
    question: Option<String>,

    /// Text file replayed as the streamed answer
    #[arg(long, requires = "question")]
    answer: Option<PathBuf>,
}

#[derive(Args)]
struct FormatArgs {
    /// Input file; stdin when omitted
    file: Option<PathBuf>,
}

fn parse_point(s: &str) -> Result<ScreenPoint, String> {
    let caps = POINT_RE
        .captures(s)
        .ok_or_else(|| format!("expected X,Y but got {s:?}"))?;
    let coord = |i: usize| caps[i].parse::<i32>().map_err(|e| e.to_string());
    Ok(ScreenPoint::new(coord(1)?, coord(2)?))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    WriteLogger::init(
        level,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("cannot create log file {:?}", cli.log_file))?,
    )?;

    panic_handler::initialize_panic_handler();
    info!("Starting marginalia");

    match &cli.config {
        Some(path) => settings::load_settings_from_path(path),
        None => settings::load_settings(),
    }

    let res = match &cli.command {
        Commands::Pages(args) => run_pages(args),
        Commands::Select(args) => run_select(args),
        Commands::Format(args) => run_format(args),
    };

    if let Err(err) = &res {
        log::error!("Command failed: {err:?}");
    }
    info!("Shutting down marginalia");
    res
}

fn run_pages(args: &PagesArgs) -> Result<()> {
    let pages = rasterize(&args.document, settings::get_viewport())?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("cannot create {:?}", args.out_dir))?;
    for page in &pages {
        let path = args.out_dir.join(format!("page-{:03}.png", page.index()));
        page.bitmap()
            .save(&path)
            .with_context(|| format!("cannot write {path:?}"))?;
    }

    println!("{} pages written to {}", pages.len(), args.out_dir.display());
    Ok(())
}

fn run_select(args: &SelectArgs) -> Result<()> {
    let settings = settings::get_settings();
    let mut viewer = Viewer::from_settings(&settings);
    let pages = rasterize(&args.document, viewer.viewport())?;

    viewer.apply(Command::PagesLoaded(pages));
    viewer.apply(Command::Scroll(args.scroll));
    viewer.apply(Command::PointerDown {
        at: args.from,
        surface_origin: ScreenPoint::new(0, 0),
    });
    viewer.apply(Command::Scroll(args.drag_scroll));
    viewer.apply(Command::PointerMove(args.to));

    let region = viewer
        .apply(Command::PointerUp)
        .into_iter()
        .find_map(|effect| match effect {
            Effect::CommentaryOpened(region) => Some(region),
            _ => None,
        });
    let Some(region) = region else {
        println!("Selection cancelled");
        return Ok(());
    };

    let png = region.to_png().context("cannot encode region")?;
    fs::write(&args.out, png).with_context(|| format!("cannot write {:?}", args.out))?;
    println!(
        "Page {}: {}x{} region written to {}",
        region.page_number,
        region.width(),
        region.height(),
        args.out.display()
    );

    if let (Some(question), Some(answer)) = (&args.question, &args.answer) {
        let Some(request) = InferenceRequest::build(&settings::get_system_prompt(), question, region)
        else {
            warn!("Blank question, nothing submitted");
            return Ok(());
        };
        let client = ScriptedClient::from_text(&read_text(Some(answer.as_path()))?);
        let events = client.stream(&request)?;
        let mut accumulator = StreamAccumulator::new();
        let output = pump(&events, &mut accumulator)?;
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}

fn run_format(args: &FormatArgs) -> Result<()> {
    let text = read_text(args.file.as_deref())?;
    let events = ScriptedClient::from_text(&text).replay();

    let mut accumulator = StreamAccumulator::new();
    let output = pump(&events, &mut accumulator)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_text(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("cannot read {path:?}"))
        }
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

#[cfg(feature = "pdf")]
fn rasterize(path: &Path, viewport: Viewport) -> Result<Vec<Page>> {
    use marginalia::pdf::{PageRasterizer, RasterService};
    use std::sync::Arc;

    let bytes: Arc<[u8]> = fs::read(path)
        .with_context(|| format!("cannot read {path:?}"))?
        .into();

    let mut service = RasterService::new(PageRasterizer::mupdf());
    service.load(bytes, viewport);
    let pages = service
        .wait()
        .with_context(|| format!("cannot rasterize {path:?}"))?;
    info!("Rasterized {} pages from {path:?}", pages.len());
    Ok(pages)
}

#[cfg(not(feature = "pdf"))]
fn rasterize(path: &Path, _viewport: Viewport) -> Result<Vec<Page>> {
    anyhow::bail!("cannot open {path:?}: built without the `pdf` feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points() {
        assert_eq!(parse_point("10,20").unwrap(), ScreenPoint::new(10, 20));
        assert_eq!(parse_point(" -5 , 7 ").unwrap(), ScreenPoint::new(-5, 7));
        assert!(parse_point("10;20").is_err());
        assert!(parse_point("99999999999,1").is_err());
    }
}
