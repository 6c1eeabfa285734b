//! End-to-end tests of the resolution / cache-negotiation / rewrite
//! pipeline over a live server.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

mod common;

#[tokio::test]
async fn root_serves_index_with_substitution() {
    let server = common::start_server("root").await;
    let client = common::client();

    let res = client
        .get(common::url(&server, "/"))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "text/html"
    );
    assert_eq!(res.headers().get("server").unwrap(), "webfront");
    let body = res.text().await.unwrap();
    assert_eq!(body, "<p>rate=42x</p>");

    // "/" and "index.html" must behave identically.
    let named = client
        .get(common::url(&server, "/index.html"))
        .send()
        .await
        .unwrap();
    assert_eq!(named.text().await.unwrap(), body);
}

#[tokio::test]
async fn static_asset_revalidates_to_304() {
    let server = common::start_server("revalidate").await;
    let client = common::client();

    let first = client
        .get(common::url(&server, "/plain.html"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    let etag = first.headers().get("etag").unwrap().to_owned();
    let last_modified = first.headers().get("last-modified").unwrap().to_owned();

    let second = client
        .get(common::url(&server, "/plain.html"))
        .header("If-None-Match", &etag)
        .header("If-Modified-Since", &last_modified)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 304);
    assert!(second.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn script_asset_is_stamped_and_never_cached() {
    let server = common::start_server("script").await;
    let client = common::client();

    let res = client
        .get(common::url(&server, "/main.js"))
        .header("If-Modified-Since", "Thu, 01 Jan 2037 00:00:00 GMT")
        .send()
        .await
        .unwrap();
    // Even a far-future validator never produces 304 for scripts.
    assert_eq!(res.status(), 200);
    assert!(res.headers().get("etag").is_none());
    assert!(res.headers().get("last-modified").is_none());

    let body = res.text().await.unwrap();
    assert!(body.starts_with("console.log('boot');\n"));
    assert!(body.contains("webfront_check_js_version.push"));
    assert!(body.contains("VERSION_MAJ:1"));
    assert!(body.contains("VERSION_MIN:2"));
    assert!(body.contains("file:'app/main.js'"));
}

#[tokio::test]
async fn dynamic_response_is_plain_text_with_cors() {
    let server = common::start_server("dynamic").await;
    let client = common::client();

    let res = client
        .get(common::url(&server, "/status?full=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers().get("content-type").unwrap(), "text/plain");
    assert_eq!(
        res.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    assert!(res.headers().get("etag").is_none());
    assert!(res.headers().get("last-modified").is_none());
    assert_eq!(res.text().await.unwrap(), "users=3 q=<full=1>\n");
}

#[tokio::test]
async fn extension_assets_resolve_from_external_root_only() {
    let server = common::start_server("extension").await;
    let client = common::client();

    let res = client
        .get(common::url(&server, "/extensions/foo/bar.js"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body = res.text().await.unwrap();
    assert!(body.starts_with("registerExtension('foo');\n"));

    // The same file is not reachable through any other root.
    let res = client
        .get(common::url(&server, "/foo/bar.js"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn config_suffix_is_refused() {
    let server = common::start_server("forbidden").await;
    common::write_file(&server.docroot, "app/secrets.json", b"{\"key\":1}");
    let client = common::client();

    let res = client
        .get(common::url(&server, "/secrets.json"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
}

#[tokio::test]
async fn traversal_attempt_is_refused() {
    let server = common::start_server("traversal").await;

    // reqwest normalizes dot segments client-side, so speak HTTP directly.
    let mut stream = tokio::net::TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /../../etc/passwd HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let head = String::from_utf8_lossy(&response);
    assert!(
        head.starts_with("HTTP/1.1 403"),
        "expected 403, got: {}",
        head.lines().next().unwrap_or("")
    );
}

#[tokio::test]
async fn unknown_path_is_404() {
    let server = common::start_server("missing").await;
    let client = common::client();

    let res = client
        .get(common::url(&server, "/no/such/page"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn repeated_fetch_is_byte_identical() {
    let server = common::start_server("idempotent").await;
    let client = common::client();

    let a = client
        .get(common::url(&server, "/index.html"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let b = client
        .get(common::url(&server, "/index.html"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(a, b);
}
