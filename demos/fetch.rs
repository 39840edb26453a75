use std::time::Duration;

use tracing_subscriber::EnvFilter;
use upstream_http::{CallContext, UpstreamClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("upstream_http=debug")),
        )
        .with_target(false)
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8081/hello".to_owned());

    let client = UpstreamClient::from_env().map_err(anyhow::Error::msg)?;
    let ctx = CallContext::new().with_timeout(Duration::from_secs(60));

    let shutdown = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    match client.get(&ctx, &url, &[("Accept", "application/json")]).await {
        Ok(body) => println!("{}", String::from_utf8_lossy(&body)),
        Err(err) => match err.status() {
            Some(404) => println!("{url} has no such resource"),
            Some(status) => anyhow::bail!(
                "upstream answered {status}: {}",
                err.body().unwrap_or_default()
            ),
            None => return Err(err.into()),
        },
    }

    Ok(())
}
