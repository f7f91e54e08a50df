//! Upload command handler.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::AppContext;

pub async fn run(ctx: &AppContext, file: &Path) -> Result<()> {
    let transport = ctx.transport()?;
    let receipt = transport
        .upload(file, &ctx.session)
        .await
        .with_context(|| format!("upload {}", file.display()))?;

    println!("Uploaded {} (session {})", file.display(), ctx.session);
    if let Some(message) = receipt.message {
        println!("{message}");
    }
    Ok(())
}
