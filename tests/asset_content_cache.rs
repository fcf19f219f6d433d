use std::convert::Infallible;
use std::sync::Arc;

use trellis::cache::{
    AssetContentCache, AssetFile, ChangeQueue, ETAG, EventKind, HeadersCache, InMemoryHeadersCache,
    InvalidationConsumer, OutputCache, RecordedOutput, ResourceHash,
};

struct Fixture {
    headers: Arc<InMemoryHeadersCache>,
    output: Arc<OutputCache>,
    assets: Arc<AssetContentCache>,
}

impl Fixture {
    fn new() -> Self {
        let headers = Arc::new(InMemoryHeadersCache::new());
        let output = Arc::new(OutputCache::new());
        let assets = Arc::new(AssetContentCache::new(
            Arc::clone(&headers) as Arc<dyn HeadersCache>,
            Arc::clone(&output),
        ));
        Self {
            headers,
            output,
            assets,
        }
    }

    fn link(&self, hash: &str, files: &[&str]) {
        let files: Vec<AssetFile> = files.iter().copied().map(AssetFile::from).collect();
        self.assets
            .link_files_to_resource(&ResourceHash::from(hash), &files);
    }

    fn cache(&self, hash: &str, body: &'static str) -> Arc<RecordedOutput> {
        let hash = ResourceHash::from(hash);
        let output = self
            .output
            .retrieve(&hash, || {
                let mut recorded = RecordedOutput::ok("text/plain", body);
                recorded.append_header(ETAG, format!("\"{body}\""));
                Ok::<_, Infallible>(recorded)
            })
            .unwrap();
        self.headers.store(hash, output.headers.clone());
        output
    }
}

#[test]
fn link_files_then_clear_cache_for_one_file() {
    let fixture = Fixture::new();
    fixture.link("12345", &["1", "2", "3"]);
    fixture.link("23456", &["2", "3", "4"]);
    fixture.cache("12345", "first");
    let original = fixture.cache("23456", "second");

    assert_eq!(fixture.assets.changed(&AssetFile::from("1")), 1);

    let recomputed = fixture
        .output
        .retrieve(&ResourceHash::from("12345"), || {
            Ok::<_, Infallible>(RecordedOutput::ok("text/plain", "recomputed"))
        })
        .unwrap();
    assert_eq!(&recomputed.body[..], b"recomputed");

    let kept = fixture.output.get(&ResourceHash::from("23456")).unwrap();
    assert!(Arc::ptr_eq(&kept, &original));
    assert!(fixture.headers.etag(&ResourceHash::from("12345")).is_none());
    assert_eq!(
        fixture.headers.etag(&ResourceHash::from("23456")).as_deref(),
        Some("\"second\"")
    );
}

#[test]
fn shared_file_change_ejects_every_linked_resource() {
    let fixture = Fixture::new();
    fixture.link("12345", &["1", "2", "3"]);
    fixture.link("23456", &["2", "3", "4"]);
    fixture.cache("12345", "first");
    fixture.cache("23456", "second");

    assert_eq!(fixture.assets.changed(&AssetFile::from("2")), 2);

    assert!(fixture.output.is_empty());
    assert!(fixture.headers.is_empty());
}

#[test]
fn flush_all_clears_outputs_and_headers_repeatedly() {
    let fixture = Fixture::new();
    fixture.link("12345", &["1"]);
    fixture.cache("12345", "first");

    fixture.assets.flush_all();
    fixture.assets.flush_all();

    assert!(fixture.output.is_empty());
    assert!(fixture.headers.is_empty());
    assert_eq!(fixture.assets.linked_files(), vec![AssetFile::from("1")]);
}

#[test]
fn queued_changes_are_applied_by_the_consumer() {
    let fixture = Fixture::new();
    fixture.link("12345", &["1", "2"]);
    fixture.link("23456", &["3"]);
    fixture.cache("12345", "first");
    fixture.cache("23456", "second");

    let queue = Arc::new(ChangeQueue::new());
    let consumer = InvalidationConsumer::new(Arc::clone(&fixture.assets), Arc::clone(&queue), 1);
    queue.publish(EventKind::Changed(AssetFile::from("1")));
    queue.publish(EventKind::Changed(AssetFile::from("2")));

    consumer.consume_all();

    assert!(queue.is_empty());
    assert!(fixture.output.get(&ResourceHash::from("12345")).is_none());
    assert!(fixture.output.get(&ResourceHash::from("23456")).is_some());
}
