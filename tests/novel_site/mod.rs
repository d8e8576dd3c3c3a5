use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Route {
    Html(String),
    Image(Vec<u8>),
    Status(u16),
}

/// In-process chapter site. Unknown paths answer 404.
pub struct NovelSite {
    pub base_url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl NovelSite {
    pub fn spawn(routes: HashMap<String, Route>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start novel site server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let hits = Arc::new(Mutex::new(HashMap::<String, usize>::new()));
        let server_hits = Arc::clone(&hits);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().split('?').next().unwrap_or("").to_owned();
                *server_hits
                    .lock()
                    .expect("hits lock")
                    .entry(path.clone())
                    .or_default() += 1;

                let response = match routes.get(&path) {
                    Some(Route::Html(html)) => tiny_http::Response::from_string(html.clone())
                        .with_header(content_type("text/html; charset=utf-8")),
                    Some(Route::Image(bytes)) => tiny_http::Response::from_data(bytes.clone())
                        .with_header(content_type("image/png")),
                    Some(Route::Status(status)) => {
                        tiny_http::Response::from_string("error").with_status_code(*status)
                    }
                    None => tiny_http::Response::from_string("not found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            hits,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[allow(dead_code)]
    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .expect("hits lock")
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for NovelSite {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn content_type(value: &str) -> tiny_http::Header {
    tiny_http::Header::from_bytes(&b"Content-Type"[..], value.as_bytes()).expect("build header")
}

#[allow(dead_code)]
pub fn chapter_path(novel: &str, index: u32) -> String {
    format!("/{novel}/chapter-{index}")
}

#[allow(dead_code)]
pub fn chapter_page(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><title>{title} | Novel Site</title></head>
  <body>
    <header><span class="chapter-title">{title}</span></header>
    <div id="chapter-container">
{body}
    </div>
    <footer><p>Comments are closed.</p></footer>
  </body>
</html>
"#
    )
}

/// Chapter 1 of the reference scenario: one leading note, three narrative
/// paragraphs, one footnote, one sponsor line.
#[allow(dead_code)]
pub fn awakening_page() -> String {
    chapter_page(
        "Chapter 1: Awakening",
        r#"      <p>T/N: enjoy!</p>
      <p>The morning came <em>slowly</em>.</p>
      <p>He drew the blade<sup>1</sup> and <strong>waited</strong>.</p>
      <script>window.ads = [];</script>
      <div class="vm-placement"><p>Advertisement</p></div>
      <p>It shone.</p>
      <p>1. The protagonist's sword, named after: legend</p>
      <p>Please support us on patreon</p>"#,
    )
}
