//! Precache command implementation

use std::path::Path;

use bunkatsu_runtime::{HttpFetcher, PrecacheManifest, RuntimeCache};
use miette::{IntoDiagnostic, Result};
use tracing::info;
use url::Url;

use crate::cli::{Cli, OutputFormat};
use crate::output::output_precache;
use crate::utils::network_runtime;

pub fn run_precache(
    cli: &Cli,
    manifest_path: &Path,
    verify: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let config = super::load_config(cli, Path::new("."))?;
    let manifest = super::inspect::read_manifest(manifest_path)?;
    let list = PrecacheManifest::from_build_manifest(&manifest, &config.precache).into_diagnostic()?;

    if let Some(origin) = verify {
        let origin = Url::parse(origin).into_diagnostic()?;
        let cache = RuntimeCache::builder(HttpFetcher::new().into_diagnostic()?)
            .routes(&config.runtime_caching)
            .origin(origin.clone())
            .build()
            .into_diagnostic()?;

        let runtime = network_runtime()?;
        let report = runtime
            .block_on(cache.install(&list))
            .into_diagnostic()?;
        info!("Verified {} assets against {}", report.installed, origin);
    }

    output_precache(&list, format)
}
