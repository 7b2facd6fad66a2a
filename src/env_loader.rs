use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(
    tether_home: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    let base = tether_home.or(home_dir)?;
    Some(base.join("tether/.env"))
}

/// Load `.env` from the working directory, falling back to
/// `<TETHER_HOME or HOME>/tether/.env`. Variables already set win.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("TETHER_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn fallback_prefers_tether_home() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/srv/tether-home")),
            Some(PathBuf::from("/home/sam")),
        );
        assert_eq!(got, Some(PathBuf::from("/srv/tether-home/tether/.env")));
    }

    #[test]
    fn fallback_uses_home_when_tether_home_unset() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/sam")));
        assert_eq!(got, Some(PathBuf::from("/home/sam/tether/.env")));
    }

    #[test]
    fn no_base_means_no_fallback() {
        assert_eq!(fallback_dotenv_path(None, None), None);
    }
}
