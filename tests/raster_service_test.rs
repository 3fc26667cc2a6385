use std::sync::Arc;

use marginalia::pdf::{PageRasterizer, RasterOutcome, RasterService, Viewport};
use marginalia::test_utils::test_helpers::FixtureLoader;

fn bytes() -> Arc<[u8]> {
    Arc::from(&b"%PDF-fixture"[..])
}

#[test]
fn reload_with_new_viewport_drops_earlier_pass() {
    let loader = FixtureLoader::uniform(4, (300.0, 400.0));
    let mut service = RasterService::new(PageRasterizer::new(Arc::new(loader)));

    let large = Viewport::new(600, 800).unwrap();
    let small = Viewport::new(300, 400).unwrap();
    let first = service.load(bytes(), large);
    let second = service.load(bytes(), small);
    assert!(second > first);

    let pages = service.wait().unwrap();
    assert_eq!(pages.len(), 4);
    assert!(pages.iter().all(|p| p.bitmap().dimensions() == (300, 400)));
    assert!(service.poll().is_none());
}

#[test]
fn invalidated_pass_is_never_delivered() {
    let loader = FixtureLoader::uniform(2, (300.0, 400.0));
    let mut service = RasterService::new(PageRasterizer::new(Arc::new(loader)));

    service.load(bytes(), Viewport::new(300, 400).unwrap());
    service.invalidate();

    assert!(!service.is_loading());
    assert!(service.wait().is_err());
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(service.poll().is_none());
}

#[test]
fn failing_page_discards_whole_document() {
    let loader = FixtureLoader::uniform(3, (300.0, 400.0)).failing_on(1);
    let mut service = RasterService::new(PageRasterizer::new(Arc::new(loader)));

    service.load(bytes(), Viewport::new(300, 400).unwrap());
    assert!(service.wait().is_err());
}

#[test]
fn pages_are_numbered_from_one() {
    let loader = FixtureLoader::uniform(3, (300.0, 400.0));
    let mut service = RasterService::new(PageRasterizer::new(Arc::new(loader)));
    service.load(bytes(), Viewport::new(300, 400).unwrap());

    let outcome = loop {
        if let Some(outcome) = service.poll() {
            break outcome;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    };
    let RasterOutcome::Loaded { pages, .. } = outcome else {
        panic!("expected pages");
    };
    let indices: Vec<_> = pages.iter().map(|p| p.index()).collect();
    assert_eq!(indices, vec![1, 2, 3]);
}
