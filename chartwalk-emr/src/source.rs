//! Authentication and page retrieval against a chart snapshot directory.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chartwalk_core::{ChartError, PageLocator};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::Document;

/// Operator login for the chart backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opaque proof of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Where the authenticated chart's pages live.
    pub resource_root: PathBuf,
    pub issued_at: DateTime<Utc>,
    pub valid_for: Duration,
}

impl AuthContext {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.issued_at + self.valid_for
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

pub trait Session {
    fn authenticate(&mut self, credentials: &Credentials) -> Result<AuthContext, ChartError>;
}

/// Retrieves one parsed page. `Ok(None)` means the page does not exist.
pub trait DocumentFetcher {
    fn fetch(&mut self, locator: &PageLocator) -> Result<Option<Document>, ChartError>;
}

impl<F: DocumentFetcher + ?Sized> DocumentFetcher for &mut F {
    fn fetch(&mut self, locator: &PageLocator) -> Result<Option<Document>, ChartError> {
        (**self).fetch(locator)
    }
}

/// File listing operator passwords, kept at the snapshot root.
pub const OPERATORS_FILE: &str = "operators.json";

/// Session over a directory of chart snapshots, one sub-directory per chart.
///
/// When the root carries an `operators.json` map of user to password the
/// credentials are checked against it; otherwise any non-empty login passes.
#[derive(Debug, Clone)]
pub struct DirectorySession {
    root: PathBuf,
    chart: String,
    valid_for: Duration,
}

impl DirectorySession {
    pub fn new(root: impl Into<PathBuf>, chart: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            chart: chart.into(),
            valid_for: Duration::minutes(30),
        }
    }

    pub fn with_validity(mut self, valid_for: Duration) -> Self {
        self.valid_for = valid_for;
        self
    }

    fn check_operator(&self, credentials: &Credentials) -> Result<(), ChartError> {
        let path = self.root.join(OPERATORS_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(ChartError::Io(err)),
        };
        let operators: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|err| ChartError::Parse(format!("{}: {err}", path.display())))?;
        match operators.get(&credentials.user) {
            Some(password) if *password == credentials.password => Ok(()),
            _ => Err(ChartError::AuthFailure(format!(
                "operator {} rejected",
                credentials.user
            ))),
        }
    }
}

impl Session for DirectorySession {
    fn authenticate(&mut self, credentials: &Credentials) -> Result<AuthContext, ChartError> {
        if credentials.user.is_empty() || credentials.password.is_empty() {
            return Err(ChartError::AuthFailure("missing user or password".into()));
        }
        self.check_operator(credentials)?;

        let resource_root = self.root.join(&self.chart);
        if !resource_root.is_dir() {
            return Err(ChartError::AuthFailure(format!(
                "chart {} not found under {}",
                self.chart,
                self.root.display()
            )));
        }

        info!(user = %credentials.user, chart = %self.chart, "session opened");
        Ok(AuthContext {
            resource_root,
            issued_at: Utc::now(),
            valid_for: self.valid_for,
        })
    }
}

/// Reads pages stored as `{sheet}/{encounter}/{page}.json` under the context root.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    context: AuthContext,
}

impl DirectoryFetcher {
    pub fn new(context: AuthContext) -> Self {
        Self { context }
    }

    pub fn page_path(&self, locator: &PageLocator) -> PathBuf {
        page_path(&self.context.resource_root, locator)
    }
}

/// Snapshot path of `locator` below a chart directory.
pub fn page_path(chart_root: &Path, locator: &PageLocator) -> PathBuf {
    chart_root
        .join(locator.sheet.slug())
        .join(&locator.encounter)
        .join(format!("{}.json", locator.page))
}

impl DocumentFetcher for DirectoryFetcher {
    fn fetch(&mut self, locator: &PageLocator) -> Result<Option<Document>, ChartError> {
        if self.context.is_expired() {
            return Err(ChartError::SessionExpired);
        }

        let path = self.page_path(locator);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(%locator, "no such page");
                return Ok(None);
            }
            Err(err) => {
                return Err(ChartError::FetchFailure {
                    locator: locator.to_string(),
                    reason: err.to_string(),
                })
            }
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| ChartError::FetchFailure {
                locator: locator.to_string(),
                reason: format!("malformed page: {err}"),
            })
    }
}

/// Fetcher that logs in again once when the session lapses mid-walk.
pub struct ReauthFetcher<S, F, B> {
    session: S,
    credentials: Credentials,
    build: B,
    inner: F,
}

impl<S, F, B> ReauthFetcher<S, F, B>
where
    S: Session,
    F: DocumentFetcher,
    B: Fn(AuthContext) -> F,
{
    /// Authenticate and build the first inner fetcher.
    pub fn connect(mut session: S, credentials: Credentials, build: B) -> Result<Self, ChartError> {
        let context = session.authenticate(&credentials)?;
        let inner = build(context);
        Ok(Self {
            session,
            credentials,
            build,
            inner,
        })
    }
}

impl<S, F, B> DocumentFetcher for ReauthFetcher<S, F, B>
where
    S: Session,
    F: DocumentFetcher,
    B: Fn(AuthContext) -> F,
{
    fn fetch(&mut self, locator: &PageLocator) -> Result<Option<Document>, ChartError> {
        match self.inner.fetch(locator) {
            Err(ChartError::SessionExpired) => {
                warn!(%locator, "session expired, logging in again");
                let context = self.session.authenticate(&self.credentials)?;
                self.inner = (self.build)(context);
                self.inner.fetch(locator)
            }
            other => other,
        }
    }
}

/// Open a chart snapshot directory with automatic re-login.
pub fn open_directory(
    root: impl Into<PathBuf>,
    chart: &str,
    credentials: Credentials,
    valid_for: Duration,
) -> Result<impl DocumentFetcher, ChartError> {
    let session = DirectorySession::new(root, chart).with_validity(valid_for);
    ReauthFetcher::connect(session, credentials, DirectoryFetcher::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartwalk_core::Sheet;

    fn write_page(root: &Path, chart: &str, locator: &PageLocator, body: &str) {
        let path = page_path(&root.join(chart), locator);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn context_expires_after_validity() {
        let issued_at = Utc::now();
        let context = AuthContext {
            resource_root: PathBuf::from("/charts/1"),
            issued_at,
            valid_for: Duration::minutes(5),
        };
        assert!(!context.is_expired_at(issued_at + Duration::minutes(4)));
        assert!(context.is_expired_at(issued_at + Duration::minutes(5)));
    }

    #[test]
    fn rejects_unknown_chart_and_bad_password() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("19314023")).unwrap();
        fs::write(dir.path().join(OPERATORS_FILE), r#"{"nurse01": "secret"}"#).unwrap();

        let good = Credentials::new("nurse01", "secret");
        let mut missing = DirectorySession::new(dir.path(), "00000000");
        assert!(matches!(
            missing.authenticate(&good),
            Err(ChartError::AuthFailure(_))
        ));

        let mut session = DirectorySession::new(dir.path(), "19314023");
        assert!(matches!(
            session.authenticate(&Credentials::new("nurse01", "wrong")),
            Err(ChartError::AuthFailure(_))
        ));
        assert!(session.authenticate(&good).is_ok());
    }

    #[test]
    fn fetch_maps_missing_and_malformed_pages() {
        let dir = tempfile::tempdir().unwrap();
        let first = PageLocator::first(Sheet::Tpr, "I20190014727");
        write_page(dir.path(), "19314023", &first, r#"{"header": "TPR"}"#);
        let broken = first.advance(12);
        write_page(dir.path(), "19314023", &broken, "{not json");

        let mut session = DirectorySession::new(dir.path(), "19314023");
        let context = session.authenticate(&Credentials::new("u", "p")).unwrap();
        let mut fetcher = DirectoryFetcher::new(context);

        let page = fetcher.fetch(&first).unwrap().unwrap();
        assert_eq!(page.header.as_deref(), Some("TPR"));
        assert!(matches!(
            fetcher.fetch(&broken),
            Err(ChartError::FetchFailure { .. })
        ));
        assert!(fetcher.fetch(&broken.advance(12)).unwrap().is_none());
    }

    #[test]
    fn expired_session_is_renewed_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = PageLocator::first(Sheet::Handover, "I1");
        write_page(dir.path(), "7", &first, "{}");

        let session = DirectorySession::new(dir.path(), "7").with_validity(Duration::zero());
        let mut fetcher =
            ReauthFetcher::connect(session, Credentials::new("u", "p"), DirectoryFetcher::new)
                .unwrap();
        // A zero-length session lapses immediately, so the retry also fails.
        assert!(matches!(
            fetcher.fetch(&first),
            Err(ChartError::SessionExpired)
        ));

        let session = DirectorySession::new(dir.path(), "7");
        let mut fetcher =
            ReauthFetcher::connect(session, Credentials::new("u", "p"), DirectoryFetcher::new)
                .unwrap();
        assert!(fetcher.fetch(&first).unwrap().is_some());
    }

    #[test]
    fn lapsed_session_retries_the_same_page() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct CountingSession(Rc<Cell<u32>>);
        impl Session for CountingSession {
            fn authenticate(&mut self, _: &Credentials) -> Result<AuthContext, ChartError> {
                self.0.set(self.0.get() + 1);
                Ok(AuthContext {
                    resource_root: PathBuf::new(),
                    issued_at: Utc::now(),
                    valid_for: Duration::minutes(1),
                })
            }
        }

        // Serves exactly one page per login.
        struct OneShot(bool);
        impl DocumentFetcher for OneShot {
            fn fetch(&mut self, _: &PageLocator) -> Result<Option<Document>, ChartError> {
                if std::mem::replace(&mut self.0, true) {
                    Err(ChartError::SessionExpired)
                } else {
                    Ok(Some(Document::default()))
                }
            }
        }

        let logins = Rc::new(Cell::new(0));
        let mut fetcher = ReauthFetcher::connect(
            CountingSession(Rc::clone(&logins)),
            Credentials::new("u", "p"),
            |_| OneShot(false),
        )
        .unwrap();
        let locator = PageLocator::first(Sheet::Tpr, "I1");
        assert!(fetcher.fetch(&locator).unwrap().is_some());
        assert!(fetcher.fetch(&locator).unwrap().is_some());
        assert_eq!(logins.get(), 2);
    }

    #[test]
    fn debug_output_hides_password() {
        let rendered = format!("{:?}", Credentials::new("nurse01", "hunter2"));
        assert!(rendered.contains("nurse01"));
        assert!(!rendered.contains("hunter2"));
    }
}
