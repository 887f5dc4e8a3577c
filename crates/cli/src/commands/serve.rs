use anyhow::{anyhow, bail, Result};
use kvmigrate::proxy::server;
use std::net::{IpAddr, SocketAddr};

use super::Context;

/// Host the remote invocation endpoint over the local engine
pub async fn run(ctx: &Context, host: &str, port: u16) -> Result<()> {
    if ctx.config.is_proxy() {
        bail!("serve runs against local storage; remove the proxy endpoint from this profile");
    }

    let ip: IpAddr = host
        .parse()
        .map_err(|e| anyhow!("Invalid host '{}': {}", host, e))?;
    let addr = SocketAddr::new(ip, port);

    println!("Serving migrations for profile {} on http://{}", ctx.profile(), addr);
    server::serve(ctx.engine.clone(), addr).await?;
    Ok(())
}
