//! Integration tests for Trellis

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn trellis() -> Command {
        cargo_bin_cmd!("trellis")
    }

    /// A project with a few pages and an isolated cache directory
    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir_all(root.join("pages/blog")).unwrap();
        fs::create_dir_all(root.join("components")).unwrap();
        fs::write(
            root.join("trellis.toml"),
            "[cache]\ndir = \"compiler-cache\"\n",
        )
        .unwrap();
        fs::write(
            root.join("pages/index.tmpl"),
            "---\nset name world\n---\n<h1>Hello {{ locals.name }}</h1>",
        )
        .unwrap();
        fs::write(
            root.join("pages/blog/[slug].tmpl"),
            r#"{% component "components/card.tmpl" title=params.slug %}body{% endcomponent %}"#,
        )
        .unwrap();
        fs::write(
            root.join("pages/old.tmpl"),
            "---\nreroute /\n---\n",
        )
        .unwrap();
        fs::write(
            root.join("components/card.tmpl"),
            "<article><h2>{{ title }}</h2>{% slot %}</article>",
        )
        .unwrap();

        temp
    }

    /// Run against `dir` with an empty global config
    fn in_project(dir: &Path) -> Command {
        let mut cmd = trellis();
        cmd.current_dir(dir)
            .env("TRELLIS_CONFIG", dir.join("global-config.toml"))
            .env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn help_displays() {
        trellis()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("streaming server-side templates"));
    }

    #[test]
    fn version_displays() {
        trellis()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("trellis"));
    }

    #[test]
    fn config_path_honors_flag() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");

        trellis()
            .args(["--no-local", "config", "path", "--config"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show_merges_local_file() {
        let temp = project();
        in_project(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("compiler-cache"))
            .stdout(predicate::str::contains("max_reroute_depth = 5"));
    }

    #[test]
    fn routes_lists_pages() {
        let temp = project();
        in_project(temp.path())
            .args(["routes", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("/blog/[slug]"))
            .stdout(predicate::str::contains("/old"));
    }

    #[test]
    fn render_static_page() {
        let temp = project();
        in_project(temp.path())
            .args(["render", "/"])
            .assert()
            .success()
            .stdout(predicate::str::diff("<h1>Hello world</h1>"));
    }

    #[test]
    fn render_follows_reroute() {
        let temp = project();
        in_project(temp.path())
            .args(["render", "/old"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Hello world"));
    }

    #[test]
    fn render_component_with_params() {
        let temp = project();
        in_project(temp.path())
            .args(["render", "/blog/first-post", "-i"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("HTTP/1.1 200 OK"))
            .stdout(predicate::str::contains(
                "<article><h2>first-post</h2>body</article>",
            ));
    }

    #[test]
    fn render_unknown_path_fails_with_hint() {
        let temp = project();
        in_project(temp.path())
            .args(["render", "/missing"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No route matched /missing"))
            .stderr(predicate::str::contains("trellis routes"));
    }

    #[test]
    fn render_reroute_loop_is_bounded() {
        let temp = project();
        fs::write(temp.path().join("pages/loop.tmpl"), "---\nreroute /loop\n---\n").unwrap();

        in_project(temp.path())
            .args(["render", "/loop"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Exceeded max reroute depth of 5"));
    }

    #[test]
    fn build_then_list_and_clear_cache() {
        let temp = project();
        let root = temp.path();

        in_project(root)
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("4 templates compiled"));

        in_project(root)
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("pages/index.tmpl"))
            .stdout(predicate::str::contains("components/card.tmpl"));

        in_project(root)
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("4 reused from cache"));

        in_project(root)
            .args(["cache", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 4 artifact(s)"));
    }

    #[test]
    fn build_reports_compile_errors() {
        let temp = project();
        fs::write(temp.path().join("pages/broken.tmpl"), "{% if x %}never closed").unwrap();

        in_project(temp.path())
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("1 of 5 templates failed"));
    }

    #[test]
    fn cache_path_uses_local_override() {
        let temp = project();
        in_project(temp.path())
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("compiler-cache"));
    }

    #[test]
    fn completions_generate() {
        trellis()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("trellis"));
    }
}

mod server_tests {
    use futures_util::{SinkExt, StreamExt};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::Message;
    use trellis::app::{App, MemorySource};
    use trellis::dispatch::Dispatcher;
    use trellis::transport::Server;

    struct Running {
        addr: SocketAddr,
        _shutdown: oneshot::Sender<()>,
    }

    async fn start(templates: &[(&str, &str)]) -> Running {
        let source = MemorySource::new();
        for (name, body) in templates {
            source.insert(*name, *body);
        }
        let app = App::builder(Arc::new(source)).build().await.unwrap();
        let dispatcher = Dispatcher::new(app, 5).unwrap();
        let server = Server::bind("127.0.0.1:0", dispatcher).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.serve(async {
            let _ = rx.await;
        }));

        Running {
            addr,
            _shutdown: tx,
        }
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        String::from_utf8(raw).unwrap()
    }

    #[tokio::test]
    async fn serves_streamed_page_with_cookies() {
        let running = start(&[(
            "pages/index.tmpl",
            "---\ncookie theme=dark\nheader X-Powered-By: trellis\n---\n<p>hello</p>",
        )])
        .await;

        let response = get(running.addr, "/").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("set-cookie: theme=dark"));
        assert!(response.contains("x-powered-by: trellis"));
        assert!(response.contains("<p>hello</p>"));
    }

    #[tokio::test]
    async fn unmatched_route_is_plain_404() {
        let running = start(&[("pages/index.tmpl", "home")]).await;

        let response = get(running.addr, "/nowhere").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
        assert!(response.ends_with("Not found"));
    }

    #[tokio::test]
    async fn failure_before_first_chunk_is_500() {
        let running = start(&[(
            "pages/index.tmpl",
            r#"{% component "components/gone.tmpl" %}{% endcomponent %}"#,
        )])
        .await;

        let response = get(running.addr, "/").await;
        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error"));
        assert!(response.contains("Server error"));
        assert!(!response.contains("gone.tmpl"));
    }

    #[tokio::test]
    async fn failure_mid_stream_appends_message() {
        let running = start(&[(
            "pages/index.tmpl",
            r#"<p>start</p>{% component "components/gone.tmpl" %}{% endcomponent %}"#,
        )])
        .await;

        let response = get(running.addr, "/").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("<p>start</p>"));
        assert!(response.contains("Internal server error"));
    }

    #[tokio::test]
    async fn websocket_upgrade_echoes() {
        let running = start(&[("pages/ws.tmpl", "---\nupgrade websocket\n---\n")]).await;

        let url = format!("ws://{}/ws", running.addr);
        let (mut socket, response) = tokio_tungstenite::connect_async(url).await.unwrap();
        assert_eq!(response.status().as_u16(), 101);
        assert!(response.headers().get("x-upgraded-websocket").is_none());

        socket.send(Message::text("ping")).await.unwrap();
        let reply = socket.next().await.unwrap().unwrap();
        assert_eq!(reply.to_text().unwrap(), "ping");

        socket.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn plain_get_to_upgrade_page_is_400() {
        let running = start(&[("pages/ws.tmpl", "---\nupgrade websocket\n---\n")]).await;

        let response = get(running.addr, "/ws").await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
    }
}
