//! Init command implementation

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use bunkatsu_core::Config;
use bunkatsu_core::config::CONFIG_FILES;
use miette::{IntoDiagnostic, Result};
use tracing::info;

pub fn run_init(force: bool) -> Result<()> {
    let path = Path::new(CONFIG_FILES[0]);
    let contents = format!(
        "// bunkatsu configuration. Comments are allowed.\n{}\n",
        serde_json::to_string_pretty(&Config::default_config()).into_diagnostic()?
    );

    if force {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).into_diagnostic(),
        }
    }

    let mut file = match create_new(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(miette::miette!(
                "{} already exists. Use --force to overwrite.",
                path.display()
            ));
        }
        Err(e) => return Err(e).into_diagnostic(),
    };
    file.write_all(contents.as_bytes()).into_diagnostic()?;

    info!("Created {}", path.display());
    Ok(())
}

/// Creates `path`, refusing to follow a symlink planted in its place.
fn create_new(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NOFOLLOW);
    }

    options.open(path)
}
