//! DHAT heap profiler for page-stream.
//!
//! Profiles allocation patterns across the pagination pipeline:
//! parse -> paginate -> build -> fetch.
//!
//! Usage:
//!   cargo run -p page-stream-heap-profile --release -- [OPTIONS] [DOCUMENTS...]
//!
//! Outputs a dhat-<phase>.json file in the output directory (default: target/memory).
//! Open in https://nnethercote.github.io/dh_view/dh_view.html

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use page_stream::{DocumentEventSource, MarkdownSource, PlainTextSource, XhtmlSource};
use page_stream_render::{
    FixedMetricsRenderer, FsStorage, NeverCancel, Page, PageCache, PageComposer, RenderConfig,
    TextAccumulator,
};

const DISPLAY_WIDTH: u16 = 480;
const DISPLAY_HEIGHT: u16 = 800;
const SYNTHETIC_CHAPTERS: usize = 400;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Parse,
    Paginate,
    Build,
    Fetch,
}

impl Phase {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "parse" => Some(Self::Parse),
            "paginate" => Some(Self::Paginate),
            "build" => Some(Self::Build),
            "fetch" => Some(Self::Fetch),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Paginate => "paginate",
            Self::Build => "build",
            Self::Fetch => "fetch",
        }
    }
}

fn synthetic_markdown() -> String {
    let mut out = String::with_capacity(SYNTHETIC_CHAPTERS * 1200);
    for chapter in 0..SYNTHETIC_CHAPTERS {
        out.push_str(&format!("## Chapter {}\n\n", chapter + 1));
        for _ in 0..4 {
            out.push_str(
                "It was a *bright* cold day in April, and the clocks were striking \
                 **thirteen**. The hallway smelt of boiled cabbage and old rag mats.\n\n",
            );
        }
        out.push_str("- first item\n- second item\n\n");
    }
    out
}

fn open_source(path: Option<&Path>) -> Box<dyn DocumentEventSource> {
    let Some(path) = path else {
        return Box::new(MarkdownSource::new(synthetic_markdown()));
    };
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let opened: std::io::Result<Box<dyn DocumentEventSource>> = match ext.as_str() {
        "md" | "markdown" => {
            MarkdownSource::open(path).map(|s| Box::new(s) as Box<dyn DocumentEventSource>)
        }
        "xhtml" | "html" | "htm" => {
            XhtmlSource::open(path).map(|s| Box::new(s) as Box<dyn DocumentEventSource>)
        }
        _ => PlainTextSource::open(path).map(|s| Box::new(s) as Box<dyn DocumentEventSource>),
    };
    opened.unwrap_or_else(|e| panic!("open {}: {}", path.display(), e))
}

fn profile_document(path: Option<&Path>, phase: Phase, scratch: &Path) {
    let label = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "synthetic".to_string());
    let mut source = open_source(path);
    let renderer = FixedMetricsRenderer::default();
    let config = RenderConfig::for_viewport(DISPLAY_WIDTH, DISPLAY_HEIGHT);

    match phase {
        Phase::Parse => {
            let mut events = 0usize;
            source
                .parse(&mut |_| {
                    events += 1;
                    ControlFlow::Continue(())
                })
                .unwrap_or_else(|e| panic!("parse {}: {}", label, e));
            eprintln!("  {}: {} events", label, events);
        }
        Phase::Paginate => {
            let mut composer = PageComposer::new(&renderer, config);
            let mut accumulator = TextAccumulator::new();
            let mut pages = 0usize;
            let mut on_page = |_page: Page| pages += 1;
            source
                .parse(&mut |event| {
                    accumulator.on_event(event, &mut composer, &mut on_page);
                    ControlFlow::Continue(())
                })
                .unwrap_or_else(|e| panic!("parse {}: {}", label, e));
            accumulator.finish(&mut composer, &mut on_page);
            eprintln!("  {}: {} pages", label, pages);
        }
        Phase::Build | Phase::Fetch => {
            let cache_path = scratch.join(format!("{}.cache", std::process::id()));
            let mut cache = PageCache::new(FsStorage::new(&cache_path));
            let report = cache
                .create(source.as_mut(), &renderer, config, 0, &NeverCancel)
                .unwrap_or_else(|e| panic!("build {}: {}", label, e));
            eprintln!("  {}: {} pages cached", label, report.page_count);
            if matches!(phase, Phase::Fetch) {
                let count = report.page_count as usize;
                for step in 0..count.min(64) {
                    let index = (step * 7919) % count;
                    let _page = cache
                        .page(index)
                        .unwrap_or_else(|e| panic!("fetch {} page {}: {}", label, index, e));
                }
            }
            let _ = cache.clear();
        }
    }
}

fn usage() {
    eprintln!("Usage: heap-profile [OPTIONS] [DOCUMENTS...]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --phase <parse|paginate|build|fetch>  Pipeline phase to profile (default: build)");
    eprintln!("  --out-dir <DIR>                       Output directory for dhat JSON (default: target/memory)");
    eprintln!();
    eprintln!("If no documents are given, profiles a synthetic Markdown book.");
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut phase = Phase::Build;
    let mut out_dir = PathBuf::from("target/memory");
    let mut files: Vec<PathBuf> = Vec::with_capacity(8);
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--phase" => {
                i += 1;
                phase = args
                    .get(i)
                    .and_then(|v| Phase::from_str(v))
                    .unwrap_or_else(|| {
                        eprintln!("Unknown phase: {}", args.get(i).map_or("", String::as_str));
                        usage();
                        std::process::exit(1);
                    });
            }
            "--out-dir" => {
                i += 1;
                let Some(dir) = args.get(i) else {
                    usage();
                    std::process::exit(1);
                };
                out_dir = PathBuf::from(dir);
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            other => files.push(PathBuf::from(other)),
        }
        i += 1;
    }

    std::fs::create_dir_all(&out_dir).unwrap_or_else(|e| {
        eprintln!("Failed to create output dir {}: {}", out_dir.display(), e);
        std::process::exit(1);
    });

    let phase_name = phase.name();
    let json_path = out_dir.join(format!("dhat-{phase_name}.json"));
    eprintln!(
        "heap-profile: phase={}, documents={}, out={}",
        phase_name,
        files.len().max(1),
        out_dir.display()
    );

    let _profiler = dhat::Profiler::builder()
        .file_name(json_path.clone())
        .build();

    if files.is_empty() {
        profile_document(None, phase, &out_dir);
    } else {
        for file in &files {
            profile_document(Some(file), phase, &out_dir);
        }
    }

    // _profiler drops here, writes JSON
    eprintln!(
        "Done. Open {} in https://nnethercote.github.io/dh_view/dh_view.html",
        json_path.display()
    );
}
