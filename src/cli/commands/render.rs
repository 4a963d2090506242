//! Render command - render one path to stdout

use crate::app::{App, Body, Request, Response};
use crate::cli::args::RenderArgs;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{TrellisError, TrellisResult};
use futures_util::StreamExt;
use tokio::io::{AsyncWriteExt, Stdout};

/// Execute the render command
pub async fn execute(args: RenderArgs, config: &Config) -> TrellisResult<()> {
    let app = App::from_config(config, false).await?;
    let dispatcher = Dispatcher::new(app.clone(), config.server.max_reroute_depth)?;

    let response = dispatcher.handle(Request::get(&args.path)?).await?;

    let mut stdout = tokio::io::stdout();
    if args.include_headers {
        write(&mut stdout, head(&response).as_bytes()).await?;
    }

    match response.body {
        Body::Empty => {}
        Body::Full(bytes) => write(&mut stdout, &bytes).await?,
        Body::Stream(mut chunks) => {
            while let Some(chunk) = chunks.next().await {
                write(&mut stdout, &chunk?).await?;
            }
        }
    }
    stdout
        .flush()
        .await
        .map_err(|e| TrellisError::io("flushing stdout", e))?;

    app.cache().flush().await;
    Ok(())
}

/// Status line and headers, HTTP/1.1 style
fn head(response: &Response) -> String {
    let mut head = format!("HTTP/1.1 {}\n", response.status);
    for (name, value) in &response.headers {
        head.push_str(&format!(
            "{}: {}\n",
            name,
            value.to_str().unwrap_or("<binary>")
        ));
    }
    for cookie in response.cookies() {
        head.push_str(&format!("set-cookie: {}\n", cookie));
    }
    head.push('\n');
    head
}

async fn write(stdout: &mut Stdout, bytes: &[u8]) -> TrellisResult<()> {
    stdout
        .write_all(bytes)
        .await
        .map_err(|e| TrellisError::io("writing to stdout", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;

    #[test]
    fn head_lists_headers_and_cookies() {
        let mut response = Response::text("hi");
        response.status = StatusCode::NOT_FOUND;
        response.append_cookie("seen=1");

        let head = head(&response);
        assert!(head.starts_with("HTTP/1.1 404 Not Found\n"));
        assert!(head.contains("content-type: text/plain; charset=utf-8\n"));
        assert!(head.ends_with("set-cookie: seen=1\n\n"));
    }
}
