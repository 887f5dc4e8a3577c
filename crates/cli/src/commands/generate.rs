use anyhow::Result;
use kvmigrate::Bump;

use super::Context;

/// Write a stub unit for the next version
pub async fn run(ctx: &Context, bump: &str, description: Option<&str>) -> Result<()> {
    let bump: Bump = bump.parse()?;
    let generated = kvmigrate::generate(ctx.engine.as_ref(), &ctx.config, bump, description).await?;
    println!("Created migration {}", generated.path.display());
    Ok(())
}
