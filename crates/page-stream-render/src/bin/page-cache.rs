use std::env;
use std::path::Path;
use std::process::ExitCode;

use page_stream::{DocumentEventSource, MarkdownSource, PlainTextSource, XhtmlSource};
use page_stream_render::{
    BuildReport, FixedMetricsRenderer, FsStorage, NeverCancel, PageCache, PageCacheError,
    PageStore, RenderConfig,
};

#[derive(Clone, Debug)]
enum Command {
    Build {
        doc: String,
        cache: String,
        budget: u16,
        width: u16,
        height: u16,
    },
    Extend {
        doc: String,
        cache: String,
        pages: u16,
        width: u16,
        height: u16,
    },
    Info {
        cache: String,
        json: bool,
    },
    Page {
        cache: String,
        index: usize,
    },
}

fn main() -> ExitCode {
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            eprintln!("{}", help_text());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    match parse_args(args)? {
        Command::Build {
            doc,
            cache,
            budget,
            width,
            height,
        } => {
            let config = RenderConfig::for_viewport(width, height);
            let mut source = open_source(&doc)?;
            let mut page_cache = PageCache::new(FsStorage::new(cache));
            let report = page_cache
                .create(
                    source.as_mut(),
                    &FixedMetricsRenderer::default(),
                    config,
                    budget,
                    &NeverCancel,
                )
                .map_err(|e| e.to_string())?;
            print_report("build", &report);
        }
        Command::Extend {
            doc,
            cache,
            pages,
            width,
            height,
        } => {
            let config = RenderConfig::for_viewport(width, height);
            let mut page_cache = PageCache::new(FsStorage::new(cache));
            if !page_cache.load(&config).map_err(|e| e.to_string())? {
                return Err("no cache built with this configuration".to_string());
            }
            let mut source = open_source(&doc)?;
            match page_cache.extend(
                source.as_mut(),
                &FixedMetricsRenderer::default(),
                config,
                pages,
                &NeverCancel,
            ) {
                Ok(report) => print_report("extend", &report),
                Err(PageCacheError::Aborted { pages_retained }) => {
                    println!("extend: aborted, pages_retained={}", pages_retained);
                }
                Err(err) => return Err(err.to_string()),
            }
        }
        Command::Info { cache, json } => {
            let store = PageStore::new(FsStorage::new(cache));
            let info = store.load_raw().map_err(|e| e.to_string())?;
            if json {
                let out = serde_json::to_string_pretty(&info).map_err(|e| e.to_string())?;
                println!("{}", out);
            } else {
                println!(
                    "version={} pages={} partial={} lut_offset={}",
                    info.version, info.page_count, info.is_partial, info.lut_offset
                );
            }
        }
        Command::Page { cache, index } => {
            let store = PageStore::new(FsStorage::new(cache));
            let page = store.fetch_page(index).map_err(|e| e.to_string())?;
            for placed in &page.lines {
                println!("{:>4} | {}", placed.y, placed.line.text());
            }
        }
    }
    Ok(())
}

fn print_report(verb: &str, report: &BuildReport) {
    println!(
        "{}: pages={} added={} partial={} state={:?} stop={:?}",
        verb, report.page_count, report.pages_added, report.is_partial, report.state, report.stop
    );
}

fn open_source(path: &str) -> Result<Box<dyn DocumentEventSource>, String> {
    let ext = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let source: Box<dyn DocumentEventSource> = match ext.as_str() {
        "md" | "markdown" => Box::new(MarkdownSource::open(path).map_err(|e| e.to_string())?),
        "xhtml" | "html" | "htm" => {
            Box::new(XhtmlSource::open(path).map_err(|e| e.to_string())?)
        }
        _ => Box::new(PlainTextSource::open(path).map_err(|e| e.to_string())?),
    };
    Ok(source)
}

fn parse_args(args: Vec<String>) -> Result<Command, String> {
    let Some(command) = args.get(1) else {
        return Err("missing command".to_string());
    };
    if command == "--help" || command == "-h" {
        return Err("help requested".to_string());
    }
    let positional = |idx: usize, name: &str| -> Result<String, String> {
        args.get(idx)
            .filter(|v| !v.starts_with("--"))
            .cloned()
            .ok_or_else(|| format!("{} requires <{}>", command, name))
    };

    match command.as_str() {
        "build" | "extend" => {
            let doc = positional(2, "doc")?;
            let cache = positional(3, "cache")?;
            let defaults = RenderConfig::default();
            let mut count = 0u16;
            let mut width = defaults.viewport_width;
            let mut height = defaults.viewport_height;
            let count_flag = if command == "build" {
                "--budget"
            } else {
                "--pages"
            };
            let mut i = 4usize;
            while i < args.len() {
                let flag = args[i].as_str();
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| format!("{} requires a value", flag))?;
                let parsed = value
                    .parse::<u16>()
                    .map_err(|_| format!("invalid {} value '{}'", flag, value))?;
                match flag {
                    "--width" => width = parsed,
                    "--height" => height = parsed,
                    f if f == count_flag => count = parsed,
                    other => return Err(format!("unknown option '{}'", other)),
                }
                i += 2;
            }
            Ok(if command == "build" {
                Command::Build {
                    doc,
                    cache,
                    budget: count,
                    width,
                    height,
                }
            } else {
                Command::Extend {
                    doc,
                    cache,
                    pages: count,
                    width,
                    height,
                }
            })
        }
        "info" => {
            let cache = positional(2, "cache")?;
            let json = match args.get(3).map(String::as_str) {
                None => false,
                Some("--json") => true,
                Some(other) => return Err(format!("unknown option '{}'", other)),
            };
            Ok(Command::Info { cache, json })
        }
        "page" => {
            let cache = positional(2, "cache")?;
            let raw = positional(3, "index")?;
            let index = raw
                .parse::<usize>()
                .map_err(|_| format!("invalid page index '{}'", raw))?;
            Ok(Command::Page { cache, index })
        }
        other => Err(format!("unknown command '{}'", other)),
    }
}

fn help_text() -> &'static str {
    r#"page-cache - build and inspect paginated page caches

USAGE:
  page-cache build <doc> <cache> [--budget N] [--width W] [--height H]
  page-cache extend <doc> <cache> [--pages N] [--width W] [--height H]
  page-cache info <cache> [--json]
  page-cache page <cache> <index>

Documents ending in .md/.markdown are read as Markdown, .xhtml/.html/.htm as
XHTML, anything else as plain text. A budget or page count of 0 means no limit.
"#
}
