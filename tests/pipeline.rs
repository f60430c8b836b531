//! End-to-end harvest runs against mocked feeds and image hosts.
//!
//! Each test gets its own in-memory SQLite database and an in-memory object
//! store, so assertions can look at exactly what a run wrote and uploaded.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use pretty_assertions::assert_eq;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rss_harvest::feed::{feed_client, FeedSources};
use rss_harvest::imaging::{image_client, WebpTranscoder};
use rss_harvest::storage::{Database, NewItem, SiteInfo};
use rss_harvest::upload::{ObjectStore, UploadError};
use rss_harvest::{Pipeline, RunSummary};

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryStore {
    fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<String, UploadError> {
        self.objects.lock().unwrap().push((key.to_string(), data));
        Ok(format!("https://cdn.example.net/{key}"))
    }
}

async fn test_db() -> Database {
    Database::connect("sqlite::memory:").await.unwrap()
}

fn pipeline(db: &Database, store: &Arc<MemoryStore>) -> Pipeline {
    let transcoder = WebpTranscoder::new(image_client(Duration::from_secs(5)).unwrap());
    let store: Arc<dyn ObjectStore> = store.clone();
    Pipeline::new(
        db.clone(),
        feed_client(Duration::from_secs(4)).unwrap(),
        transcoder,
        store,
    )
}

fn sample_png() -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 9, Rgb([240, 180, 20])))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// RSS 2.0 document; each item is `(link, optional image URL)`.
fn rss(title: &str, site: &str, items: &[(&str, Option<String>)]) -> String {
    let items: String = items
        .iter()
        .map(|(link, image)| {
            let body = match image {
                Some(src) => format!(r#"<p>Lead</p><img src="{src}" alt="">"#),
                None => "<p>No pictures here</p>".to_string(),
            };
            format!(
                r#"<item>
  <title>Post {link}</title>
  <link>{link}</link>
  <pubDate>Tue, 02 Jan 2024 03:04:05 GMT</pubDate>
  <category>news</category>
  <category>tech</category>
  <description><![CDATA[{body}]]></description>
</item>
"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
  <title>{title}</title>
  <link>{site}</link>
  <description>test feed</description>
  {items}
</channel>
</rss>"#
    )
}

async fn mount_feed(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

async fn mount_png(server: &MockServer, route: &str) {
    Mock::given(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(sample_png()),
        )
        .mount(server)
        .await;
}

fn existing_item(link: &str) -> NewItem {
    NewItem {
        title: "Already stored".to_string(),
        link: link.to_string(),
        published: None,
        description: String::new(),
        image_url: None,
        tags: String::new(),
    }
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_three_items_one_already_stored() {
    let server = MockServer::start().await;
    let img = |name: &str| Some(format!("{}/img/{name}", server.uri()));
    mount_feed(
        &server,
        "/feed.xml",
        rss(
            "Example News",
            "https://news.example.com/",
            &[
                ("https://news.example.com/a", img("a.png")),
                ("https://news.example.com/b", img("b.png")),
                ("https://news.example.com/c", img("c.png")),
            ],
        ),
    )
    .await;
    for name in ["a.png", "b.png", "c.png"] {
        mount_png(&server, &format!("/img/{name}")).await;
    }

    let db = test_db().await;
    let site = SiteInfo {
        name: "Example News".to_string(),
        url: "https://news.example.com/".to_string(),
    };
    db.save_site_and_items(&site, &[existing_item("https://news.example.com/b")])
        .await
        .unwrap();

    let store = Arc::new(MemoryStore::default());
    let summary = pipeline(&db, &store)
        .run(FeedSources::new([format!("{}/feed.xml", server.uri())]))
        .await;

    assert_eq!(
        summary,
        RunSummary {
            feeds_total: 1,
            feeds_failed: 0,
            items_seen: 3,
            items_skipped_existing: 1,
            images_uploaded: 2,
            image_failures: 0,
            items_inserted: 2,
        }
    );

    let keys = store.keys();
    assert_eq!(keys.len(), 2);
    for key in &keys {
        assert!(key.starts_with("photo/") && key.ends_with(".webp"), "{key}");
    }
    for (_, data) in store.objects.lock().unwrap().iter() {
        assert_eq!(&data[8..12], b"WEBP");
    }

    assert_eq!(db.count_sites().await.unwrap(), 1);
    assert_eq!(db.count_items().await.unwrap(), 3);

    let site_row = db
        .find_site_by_url("https://news.example.com/")
        .await
        .unwrap()
        .unwrap();
    let items = db.get_items_for_site(site_row.id).await.unwrap();
    let a = items
        .iter()
        .find(|i| i.link == "https://news.example.com/a")
        .unwrap();
    assert_eq!(a.tags, "news, tech");
    assert_eq!(a.published_at, 1704164645);
    assert!(a
        .image_url
        .as_deref()
        .is_some_and(|u| u.starts_with("https://cdn.example.net/photo/")));

    // The pre-existing row is untouched
    let b = items
        .iter()
        .find(|i| i.link == "https://news.example.com/b")
        .unwrap();
    assert_eq!(b.title, "Already stored");
    assert_eq!(b.image_url, None);
}

#[tokio::test]
async fn test_second_run_inserts_nothing() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "/feed.xml",
        rss(
            "Example",
            "https://example.org/",
            &[
                ("https://example.org/1", Some(format!("{}/1.png", server.uri()))),
                ("https://example.org/2", None),
            ],
        ),
    )
    .await;
    mount_png(&server, "/1.png").await;

    let db = test_db().await;
    let store = Arc::new(MemoryStore::default());
    let sources = FeedSources::new([format!("{}/feed.xml", server.uri())]);

    let first = pipeline(&db, &store).run(sources.clone()).await;
    assert_eq!(first.items_inserted, 2);
    assert_eq!(first.images_uploaded, 1);

    let second = pipeline(&db, &store).run(sources).await;
    assert_eq!(second.items_inserted, 0);
    assert_eq!(second.items_skipped_existing, 2);
    assert_eq!(second.images_uploaded, 0);

    assert_eq!(store.keys().len(), 1);
    assert_eq!(db.count_items().await.unwrap(), 2);
    assert_eq!(db.count_sites().await.unwrap(), 1);
}

#[tokio::test]
async fn test_two_feeds_create_two_sites() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "/one.xml",
        rss(
            "One",
            "https://one.example/",
            &[("https://one.example/p1", None), ("https://one.example/p2", None)],
        ),
    )
    .await;
    mount_feed(
        &server,
        "/two.xml",
        rss("Two", "https://two.example/", &[("https://two.example/p1", None)]),
    )
    .await;

    let db = test_db().await;
    let store = Arc::new(MemoryStore::default());
    let summary = pipeline(&db, &store)
        .run(FeedSources::new([
            format!("{}/one.xml", server.uri()),
            format!("{}/two.xml", server.uri()),
        ]))
        .await;
    assert_eq!(summary.items_inserted, 3);
    assert_eq!(db.count_sites().await.unwrap(), 2);

    let one = db
        .find_site_by_url("https://one.example/")
        .await
        .unwrap()
        .unwrap();
    let two = db
        .find_site_by_url("https://two.example/")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(one.name, "One");

    let mut one_links: Vec<String> = db
        .get_items_for_site(one.id)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.link)
        .collect();
    one_links.sort();
    assert_eq!(one_links, vec!["https://one.example/p1", "https://one.example/p2"]);

    let two_items = db.get_items_for_site(two.id).await.unwrap();
    assert_eq!(two_items.len(), 1);
    assert_eq!(two_items[0].link, "https://two.example/p1");
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_gif_item_not_saved_or_uploaded() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "/feed.xml",
        rss(
            "Gifs",
            "https://gifs.example/",
            &[
                ("https://gifs.example/anim", Some(format!("{}/anim.gif", server.uri()))),
                ("https://gifs.example/text", None),
            ],
        ),
    )
    .await;
    Mock::given(method("HEAD"))
        .and(path("/anim.gif"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/gif"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/anim.gif"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let db = test_db().await;
    let store = Arc::new(MemoryStore::default());
    let summary = pipeline(&db, &store)
        .run(FeedSources::new([format!("{}/feed.xml", server.uri())]))
        .await;

    assert_eq!(summary.image_failures, 1);
    assert_eq!(summary.items_inserted, 1);
    assert!(store.keys().is_empty());
    assert!(!db.link_exists("https://gifs.example/anim").await.unwrap());
    assert!(db.link_exists("https://gifs.example/text").await.unwrap());
}

#[tokio::test]
async fn test_missing_image_skips_upload() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "/feed.xml",
        rss(
            "Broken",
            "https://broken.example/",
            &[("https://broken.example/p", Some(format!("{}/gone.png", server.uri())))],
        ),
    )
    .await;
    Mock::given(method("HEAD"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&server)
        .await;

    let db = test_db().await;
    let store = Arc::new(MemoryStore::default());
    let summary = pipeline(&db, &store)
        .run(FeedSources::new([format!("{}/feed.xml", server.uri())]))
        .await;

    assert_eq!(summary.image_failures, 1);
    assert_eq!(summary.items_inserted, 0);
    assert!(store.keys().is_empty());
    // Nothing to save, so the site is not created either
    assert_eq!(db.count_sites().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_feed_does_not_stop_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/garbage.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("definitely not a feed"))
        .mount(&server)
        .await;
    mount_feed(
        &server,
        "/ok.xml",
        rss("Fine", "https://fine.example/", &[("https://fine.example/1", None)]),
    )
    .await;

    let db = test_db().await;
    let store = Arc::new(MemoryStore::default());
    let summary = pipeline(&db, &store)
        .with_max_concurrent(1)
        .run(FeedSources::new([
            format!("{}/down.xml", server.uri()),
            format!("{}/garbage.xml", server.uri()),
            format!("{}/ok.xml", server.uri()),
        ]))
        .await;

    assert_eq!(summary.feeds_total, 3);
    assert_eq!(summary.feeds_failed, 2);
    assert_eq!(summary.items_inserted, 1);
    assert!(db.link_exists("https://fine.example/1").await.unwrap());
}
