//! Shared fixture: a full server (pipeline + delivery loop) on an
//! ephemeral port with a temporary docroot.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;

use webfront::cache::negotiator::Negotiator;
use webfront::config::schema::{InterfaceConfig, VersionConfig, WebConfig};
use webfront::content::resolver::{DynamicResponder, Resolver};
use webfront::content::sources::BlobStore;
use webfront::http::HttpServer;
use webfront::params::Params;
use webfront::stream::delivery::DeliveryLoop;
use webfront::stream::registry::ConnectionRegistry;

pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<ConnectionRegistry>,
    pub docroot: PathBuf,
    pub ext_root: PathBuf,
    shutdown: watch::Sender<bool>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        fs::remove_dir_all(&self.docroot).ok();
        fs::remove_dir_all(&self.ext_root).ok();
    }
}

struct StatusResponder;

impl DynamicResponder for StatusResponder {
    fn respond(&self, path: &str, query: &str) -> Option<Vec<u8>> {
        (path == "status").then(|| format!("users=3 q=<{}>\n", query).into_bytes())
    }
}

pub fn write_file(dir: &Path, rel: &str, body: &[u8]) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

/// Start a server for interface "app" with standard fixtures in place.
pub async fn start_server(tag: &str) -> TestServer {
    let docroot = std::env::temp_dir().join(format!("webfront-it-{}-{}", tag, std::process::id()));
    let ext_root =
        std::env::temp_dir().join(format!("webfront-it-ext-{}-{}", tag, std::process::id()));
    fs::create_dir_all(&docroot).unwrap();
    fs::create_dir_all(&ext_root).unwrap();

    write_file(&docroot, "app/index.html", b"<p>rate=%[SAMPLE]x</p>");
    write_file(&docroot, "app/plain.html", b"<p>no markers here</p>");
    write_file(&docroot, "app/main.js", b"console.log('boot');\n");
    write_file(
        &ext_root,
        "extensions/foo/bar.js",
        b"registerExtension('foo');\n",
    );

    let mut config = WebConfig::default();
    config.interfaces.push(InterfaceConfig {
        name: "app".into(),
        port: 0,
    });
    config.owner_info = "integration".into();
    config
        .index_params
        .insert("SAMPLE".to_string(), "42".to_string());

    let params = Params::empty();
    params.rebuild(&config);

    let resolver = Arc::new(Resolver::new(
        Arc::new(BlobStore::new(1_700_000_000)),
        Arc::new(BlobStore::new(1_700_000_000)),
        &docroot,
        &ext_root,
        config.content.forbidden_suffixes.clone(),
        Arc::new(StatusResponder),
    ));
    let negotiator = Arc::new(Negotiator::new(
        resolver,
        params,
        VersionConfig { major: 1, minor: 2 },
    ));
    let registry = Arc::new(ConnectionRegistry::new());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = HttpServer::new(
        InterfaceConfig {
            name: "app".into(),
            port: addr.port(),
        },
        negotiator,
        registry.clone(),
    );
    tokio::spawn(server.run(listener, shutdown_rx.clone()));

    let delivery = DeliveryLoop::new(registry.clone(), "app", Duration::from_millis(5));
    tokio::spawn(delivery.run(shutdown_rx.clone()));

    // Give the listener a moment to come up.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        registry,
        docroot,
        ext_root,
        shutdown: shutdown_tx,
    }
}

/// Application-side echo: poll inbound frames, acknowledge them, push the
/// same payload outbound so the delivery loop returns it to the peer.
pub fn spawn_echo_consumer(registry: Arc<ConnectionRegistry>) {
    tokio::spawn(async move {
        loop {
            for conn in registry.connections() {
                while let Ok(Some(frame)) = conn.poll_inbound() {
                    let payload = frame.payload().to_vec();
                    conn.ack_inbound(frame).unwrap();
                    conn.push_outbound(payload);
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    });
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub fn url(server: &TestServer, path: &str) -> String {
    format!("http://{}{}", server.addr, path)
}
