//! Page-level scenarios: locate tags, parse them, resolve them, splice them.

use std::sync::Arc;
use std::time::Duration;

use esi_sdk::prelude::*;

const PAGE: &str = r#"<html><body>
<header><esi:include src="http://fragments.local/header" timeout="500ms"/></header>
<div class="cart"><esi:include src='http://cart.local/{{ param "id" }}' key='cart_{{ header "X-Store" }}' ttl="10m" forwardheaders="Cookie,X-Store"/></div>
<footer><esi:include src="http://fragments.local/footer" returnheaders="all"/></footer>
</body></html>"#;

/// Stand-in for the external scanner: offsets of every `<esi:include .../>`.
fn locate_tags(html: &str) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(start) = html[from..].find("<esi:include") {
        let start = from + start;
        let end = start + html[start..].find("/>").expect("tag is closed") + 2;
        found.push((start, end));
        from = end;
    }
    found
}

fn collection(html: &str, sink: Arc<MemorySink>) -> EntityCollection {
    let mut page = EntityCollection::new().with_sink(sink);
    for (start, end) in locate_tags(html) {
        page.push(Entity::new(&html[start..end], start, end));
    }
    page
}

fn splice(html: &str, mut tags: Vec<Tag>) -> String {
    tags.sort_by_key(|t| t.start);
    let mut out = String::new();
    let mut pos = 0;
    for tag in tags {
        out.push_str(&html[pos..tag.start]);
        out.push_str(&String::from_utf8_lossy(&tag.data));
        pos = tag.end;
    }
    out.push_str(&html[pos..]);
    out
}

fn fetcher() -> MemoryFetcher {
    MemoryFetcher::new()
        .with_fragment("http://fragments.local/header", "<nav>menu</nav>")
        .with_fragment("cart_de", r#"<p class="page01CartLoaded">2 items</p>"#)
        .with_fragment("http://fragments.local/footer", "<small>imprint</small>")
}

#[test]
fn test_page_parses_in_order() {
    let sink = Arc::new(MemorySink::new());
    let mut page = collection(PAGE, sink);
    page.parse_raw().unwrap();

    assert_eq!(page.len(), 3);
    let cart = page.get(1).unwrap();
    assert_eq!(cart.ttl, Duration::from_secs(600));
    assert_eq!(cart.forward_headers.names, vec!["Cookie", "X-Store"]);
    assert!(cart.resources.get(0).unwrap().url.as_ref().unwrap().is_template());
    assert!(page.get(2).unwrap().return_headers.all);
    assert_eq!(page.get(0).unwrap().timeout, Duration::from_millis(500));
}

#[tokio::test]
async fn test_resolve_and_splice() -> anyhow::Result<()> {
    let sink = Arc::new(MemorySink::new());
    let mut page = collection(PAGE, sink.clone());
    page.parse_raw()?;

    let req = RequestContext::get("/checkout")
        .with_param("id", "42")
        .with_header("X-Store", "de");
    let resolver = ParallelResolver::from_config(Arc::new(fetcher()), &EsiConfig::default(), sink);
    let tags = resolver.resolve(&page, &req).await?;
    assert_eq!(tags.len(), 3);

    let html = splice(PAGE, tags);
    assert!(!html.contains("<esi:"));
    assert!(html.contains("<nav>menu</nav>"));
    assert_eq!(html.matches(r#" class="page01CartLoaded""#).count(), 1);
    assert!(html.contains("<small>imprint</small>"));
    Ok(())
}

#[tokio::test]
async fn test_missing_fragment_fails_whole_page() {
    let sink = Arc::new(MemorySink::new());
    let mut page = collection(PAGE, sink.clone());
    page.parse_raw().unwrap();

    // Without X-Store the cart key renders as "cart_" and nothing matches.
    let req = RequestContext::get("/checkout").with_param("id", "42");
    let resolver = ParallelResolver::new(Arc::new(fetcher()));
    let err = resolver.resolve(&page, &req).await.unwrap_err();

    assert_eq!(err.index(), Some(1));
    assert!(matches!(
        err,
        ResolveError::Fetch {
            source: FetchError::NotFound(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_request_deadline_cancels_batch() {
    let sink = Arc::new(MemorySink::new());
    let mut page = collection(PAGE, sink);
    page.parse_raw().unwrap();

    let req = RequestContext::get("/checkout")
        .with_header("X-Store", "de")
        .with_deadline(tokio::time::Instant::now() + Duration::from_millis(20));
    let slow = fetcher().with_latency(Duration::from_millis(200));
    let err = ParallelResolver::new(Arc::new(slow))
        .resolve(&page, &req)
        .await
        .unwrap_err();

    assert!(err.is_cancellation());
}

#[test]
fn test_bad_tag_on_page_reports_position() {
    let html = r#"<esi:include src="http://a"/><esi:include src="http://b" timeout="soon"/>"#;
    let sink = Arc::new(MemorySink::new());
    let mut page = collection(html, sink.clone());

    let err = page.parse_raw().unwrap_err();
    assert_eq!(err.index(), Some(1));
    assert!(matches!(err.root(), ParseError::Duration { attribute: "timeout", .. }));
    assert!(err.to_string().contains("\"soon\""));
    assert!(sink.contains("esi tag parse failed"));
}

#[test]
fn test_config_drives_timeouts() {
    let config = EsiConfig::from_toml_str(
        r#"
        default_timeout = "1s"
        max_timeout = "300ms"
        "#,
    )
    .unwrap();
    let policy = TimeoutPolicy::from_config(&config);

    assert_eq!(policy.resolve(Duration::ZERO), Duration::from_millis(300));
    assert_eq!(policy.resolve(Duration::from_millis(100)), Duration::from_millis(100));
}
