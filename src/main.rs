use anyhow::{bail, Context, Result};
use ordercrunch::handler::{self, LoadRequest, QueryRequest, TransformRequest};
use ordercrunch::source::DefaultBlobStore;
use serde::Serialize;
use std::{env, fs, io::Read, time::Instant};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// The wrapper's response envelope: a success value or a single descriptive
/// error, plus wall time. The core never sees this type.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ok: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    elapsed_ms: u128,
}

fn main() -> Result<()> {
    // ─── init logging ────────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    // ─── read the request ────────────────────────────────────────────
    let mut args = env::args().skip(1);
    let op = args
        .next()
        .context("usage: ordercrunch <transform|load|query> [request.json]")?;
    let payload = match args.next() {
        Some(path) => {
            fs::read_to_string(&path).with_context(|| format!("reading request `{path}`"))?
        }
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    // ─── dispatch ────────────────────────────────────────────────────
    let blobs = DefaultBlobStore::default();
    let start = Instant::now();
    info!(%op, "request received");

    let rendered = match op.as_str() {
        "transform" => {
            let req: TransformRequest =
                serde_json::from_str(&payload).context("decoding transform request")?;
            render(handler::handle_transform(&req, &blobs), start)
        }
        "load" => {
            let req: LoadRequest =
                serde_json::from_str(&payload).context("decoding load request")?;
            render(handler::handle_load(&req, &blobs), start)
        }
        "query" => {
            let req: QueryRequest =
                serde_json::from_str(&payload).context("decoding query request")?;
            render(handler::handle_query(&req, &blobs), start)
        }
        other => bail!("unknown operation `{other}`; expected transform, load, or query"),
    };

    println!("{rendered}");
    Ok(())
}

fn render<T: Serialize>(result: ordercrunch::Result<T>, start: Instant) -> String {
    let elapsed_ms = start.elapsed().as_millis();
    let envelope = match result {
        Ok(value) => Envelope { ok: Some(value), error: None, elapsed_ms },
        Err(err) => {
            error!(%err, "request failed");
            Envelope { ok: None, error: Some(err.to_string()), elapsed_ms }
        }
    };
    serde_json::to_string_pretty(&envelope)
        .unwrap_or_else(|e| format!(r#"{{"error":"rendering response: {e}"}}"#))
}
