//! The user agent the PKCE flow drives.
//!
//! The flow needs three things from a browser: send the user somewhere,
//! read the address it came back on, and rewrite that address so the
//! authorization code does not linger in it.

use parking_lot::Mutex;
use url::Url;

/// Errors raised by a [`Browser`].
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    /// The system browser could not be launched.
    #[error("failed to open browser: {0}")]
    Launch(#[from] std::io::Error),
}

/// Navigation seam of the PKCE flow.
pub trait Browser: Send + Sync {
    /// Navigates to `url` (authorize or logout endpoint).
    ///
    /// # Errors
    ///
    /// [`BrowserError`] if navigation cannot start.
    fn redirect(&self, url: &Url) -> Result<(), BrowserError>;

    /// The address the browser is currently showing, if known.
    fn current_url(&self) -> Option<Url>;

    /// Replaces the visible address without navigating.
    fn replace_url(&self, url: &Url);
}

/// Opens URLs in the system browser.
///
/// The system browser's address bar is out of reach, so the "current"
/// address is whatever the loopback callback received, and replacing it
/// only affects what this process sees afterwards.
#[derive(Debug, Default)]
pub struct SystemBrowser {
    current: Mutex<Option<Url>>,
}

impl SystemBrowser {
    /// Creates a browser handle with no current address.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the address the provider redirected to.
    pub fn set_current_url(&self, url: Url) {
        *self.current.lock() = Some(url);
    }
}

impl Browser for SystemBrowser {
    fn redirect(&self, url: &Url) -> Result<(), BrowserError> {
        tracing::info!(host = url.host_str().unwrap_or_default(), "opening browser");
        webbrowser::open(url.as_str())?;
        Ok(())
    }

    fn current_url(&self) -> Option<Url> {
        self.current.lock().clone()
    }

    fn replace_url(&self, url: &Url) {
        *self.current.lock() = Some(url.clone());
    }
}

/// Browser double that records navigation.
///
/// # Examples
///
/// ```
/// use pkce_tasks::client::browser::{Browser, MemoryBrowser};
/// use url::Url;
///
/// let browser = MemoryBrowser::at("http://localhost:5173/?code=abc");
/// browser.replace_url(&Url::parse("http://localhost:5173/").unwrap());
/// assert_eq!(browser.current_url().unwrap().as_str(), "http://localhost:5173/");
/// ```
#[derive(Debug, Default)]
pub struct MemoryBrowser {
    current: Mutex<Option<Url>>,
    redirects: Mutex<Vec<Url>>,
}

impl MemoryBrowser {
    /// A browser with no current address.
    pub fn new() -> Self {
        Self::default()
    }

    /// A browser showing `url`. An unparsable `url` leaves no address.
    pub fn at(url: &str) -> Self {
        Self {
            current: Mutex::new(Url::parse(url).ok()),
            redirects: Mutex::new(Vec::new()),
        }
    }

    /// Every URL passed to [`Browser::redirect`], oldest first.
    pub fn redirects(&self) -> Vec<Url> {
        self.redirects.lock().clone()
    }

    /// The most recent redirect target.
    pub fn last_redirect(&self) -> Option<Url> {
        self.redirects.lock().last().cloned()
    }

    /// Simulates the provider sending the browser to `url`.
    pub fn land_on(&self, url: &str) {
        *self.current.lock() = Url::parse(url).ok();
    }
}

impl Browser for MemoryBrowser {
    fn redirect(&self, url: &Url) -> Result<(), BrowserError> {
        self.redirects.lock().push(url.clone());
        Ok(())
    }

    fn current_url(&self) -> Option<Url> {
        self.current.lock().clone()
    }

    fn replace_url(&self, url: &Url) {
        *self.current.lock() = Some(url.clone());
    }
}
