use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const ENV_PREFIX: &str = "TETHER_";

fn rust_sources(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(next) = pending.pop() {
        for entry in fs::read_dir(&next)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                found.push(path);
            }
        }
    }
    Ok(found)
}

/// Every `TETHER_*` identifier in `source`. Bare or underscore-terminated
/// fragments (`TETHER_`, `TETHER_FOO_`) are format prefixes, not variables.
fn env_keys(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
        .filter(|token| token.len() > ENV_PREFIX.len())
        .filter(|token| token.starts_with(ENV_PREFIX) && !token.ends_with('_'))
}

fn write_env_allowlist(out_dir: &Path) -> std::io::Result<()> {
    let mut keys = BTreeSet::new();
    for file in rust_sources(Path::new("src"))? {
        if let Ok(content) = fs::read_to_string(&file) {
            keys.extend(env_keys(&content).map(str::to_string));
        }
    }

    let mut f = fs::File::create(out_dir.join("tether_env_allowlist.rs"))?;
    writeln!(f, "pub const GENERATED_TETHER_ENV_ALLOWLIST: &[&str] = &[")?;
    for key in &keys {
        writeln!(f, "    {key:?},")?;
    }
    writeln!(f, "];")
}

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    write_env_allowlist(&out_dir).expect("failed to generate TETHER env allowlist");

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock before unix epoch");
    println!(
        "cargo:rustc-env=BUILD_UUID={:x}-{:x}",
        now.as_secs(),
        now.subsec_nanos()
    );
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
}
