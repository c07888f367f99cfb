//! Locating a Chromium-based executable on the host.

use std::path::PathBuf;

use tracing::debug;

/// Overrides detection when set to an existing file.
pub const CHROME_ENV: &str = "CHROME";

/// Executable names looked up on `PATH`, most common first.
const EXECUTABLES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "microsoft-edge",
    "microsoft-edge-stable",
    "brave-browser",
];

#[cfg(target_os = "macos")]
const BUNDLE_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

#[cfg(target_os = "windows")]
const BUNDLE_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const BUNDLE_PATHS: &[&str] = &[];

/// Find a browser executable.
///
/// Order: the configured path, `$CHROME`, platform install locations, then
/// [`EXECUTABLES`] on `PATH`. Install locations come before `PATH` because
/// `PATH` often holds stale wrapper scripts.
pub fn locate_browser(configured: Option<&str>) -> Option<PathBuf> {
    let explicit = configured
        .map(PathBuf::from)
        .into_iter()
        .chain(std::env::var_os(CHROME_ENV).map(PathBuf::from))
        .chain(BUNDLE_PATHS.iter().map(PathBuf::from));
    for candidate in explicit {
        if candidate.is_file() {
            debug!(path = %candidate.display(), "browser found");
            return Some(candidate);
        }
    }

    EXECUTABLES.iter().find_map(|name| which::which(name).ok())
}

/// What to tell a user who has no browser installed.
pub fn install_hint() -> String {
    let steps = if cfg!(target_os = "macos") {
        "  brew install --cask chromium"
    } else if cfg!(target_os = "windows") {
        "  winget install Google.Chrome"
    } else {
        "  Debian/Ubuntu: sudo apt install chromium\n  \
         Fedora:        sudo dnf install chromium\n  \
         Arch:          sudo pacman -S chromium"
    };
    format!(
        "No Chromium-based browser found. Install one:\n\n{steps}\n\n\
         or point cartograph at an existing binary:\n  \
         [browser]\n  \
         chrome_path = \"/path/to/chromium\"\n\n\
         or set the {CHROME_ENV} environment variable."
    )
}
