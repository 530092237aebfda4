//! Command execution for the Kazana CLI.
//!
//! `App` owns the configuration, the API client and the local document
//! cache, and reacts to session events raised by the gatekeeper.

use std::path::Path;

use anyhow::{bail, Context, Result};
use kazana_core::models::{Category, Document, DocumentFilter};
use kazana_core::utils::truncate_string;
use kazana_core::{ApiClient, ApiError, CacheManager, Config, SessionEvent, SessionState};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

/// Display width of the file column in `list`
const FILE_COLUMN_WIDTH: usize = 40;

const ENV_USERNAME: &str = "KAZANA_USERNAME";
const ENV_PASSWORD: &str = "KAZANA_PASSWORD";

pub struct App {
    config: Config,
    api: ApiClient,
    cache: CacheManager,
    events: broadcast::Receiver<SessionEvent>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let store = config.open_token_store()?;
        let api = ApiClient::new(&config.api_base_url(), store, config.expiry_leeway())
            .context("Failed to create API client")?;
        let cache = CacheManager::new(config.cache_dir()?)?;
        debug!(base_url = api.base_url(), "App initialized");
        Ok(Self::from_parts(config, api, cache))
    }

    fn from_parts(config: Config, api: ApiClient, cache: CacheManager) -> Self {
        let events = api.subscribe();
        Self {
            config,
            api,
            cache,
            events,
        }
    }

    pub async fn run(&mut self, command: crate::cli::Command) -> Result<()> {
        use crate::cli::Command;

        let result = match command {
            Command::Login { username } => self.login(username).await,
            Command::Signup { username, email } => self.signup(&username, &email).await,
            Command::Logout => self.logout(),
            Command::Status => self.status(),
            Command::List { filter, offline } => self.list(&filter, offline).await,
            Command::Show { id, offline } => self.show(id, offline).await,
            Command::Upload { path, category } => self.upload(&path, category).await,
            Command::SetCategory { id, category } => self.set_category(id, category).await,
            Command::Delete { id } => self.delete(id).await,
            Command::Help => {
                println!("{}", crate::cli::USAGE);
                Ok(())
            }
        };

        self.handle_session_events();
        result.map_err(|e| self.explain(e))
    }

    /// The CLI's equivalent of redirecting to the login page
    fn handle_session_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(SessionEvent::LoginRequired { reason }) => {
                    warn!(reason = %reason, "Login required");
                    self.discard_cache();
                    eprintln!("Your session has expired. Run `kazana login` to sign in again.");
                }
                Ok(event) => debug!(?event, "Session event"),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Missed session events");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    /// Turn auth failures into an actionable message
    fn explain(&self, error: anyhow::Error) -> anyhow::Error {
        let (unauthorized, requires_login) = match error.downcast_ref::<ApiError>() {
            Some(e) => (matches!(e, ApiError::Unauthorized), e.requires_login()),
            None => (false, false),
        };

        if unauthorized {
            // The server no longer accepts our token; drop it so the next
            // run starts from a clean login
            if let Err(e) = self.api.logout() {
                warn!(error = %e, "Failed to clear rejected session");
            }
            self.discard_cache();
            error.context("The server rejected your session. Run `kazana login` again")
        } else if requires_login {
            error.context("Not logged in")
        } else {
            error
        }
    }

    /// Cached documents belong to the session that fetched them
    fn discard_cache(&self) {
        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "Failed to clear document cache");
        }
    }

    fn require_session(&self) -> Result<()> {
        if self.api.session_state()? == SessionState::Absent {
            bail!("Not logged in. Run `kazana login` first");
        }
        Ok(())
    }

    // ===== Session =====

    async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username
            .or_else(|| std::env::var(ENV_USERNAME).ok())
            .or_else(|| self.config.last_username.clone())
        {
            Some(name) => name,
            None => prompt_line("Username: ")?,
        };
        let password = match std::env::var(ENV_PASSWORD) {
            Ok(password) if !password.is_empty() => password,
            _ => rpassword::prompt_password(format!("Password for {}: ", username))
                .context("Failed to read password")?,
        };

        match self.api.login(&username, &password).await {
            Ok(()) => {}
            Err(ApiError::Unauthorized) => bail!("Invalid username or password."),
            Err(e) => return Err(e).context("Login failed"),
        }

        self.config.last_username = Some(username.clone());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        println!("Logged in as {}.", username);
        Ok(())
    }

    async fn signup(&self, username: &str, email: &str) -> Result<()> {
        let password = rpassword::prompt_password("Choose a password: ")
            .context("Failed to read password")?;
        let confirm = rpassword::prompt_password("Confirm password: ")
            .context("Failed to read password")?;
        if password != confirm {
            bail!("Passwords do not match");
        }

        match self.api.signup(username, email, &password).await {
            Ok(()) => {
                println!("Account created. Run `kazana login {}` to sign in.", username);
                Ok(())
            }
            Err(ApiError::Rejected(message)) => bail!("Signup failed: {}", message),
            Err(e) => Err(e).context("Signup failed. Try again"),
        }
    }

    fn logout(&self) -> Result<()> {
        self.api.logout()?;
        self.cache.clear()?;
        println!("Logged out.");
        Ok(())
    }

    fn status(&self) -> Result<()> {
        println!("API:      {}", self.api.base_url());
        let state = match self.api.session_state()? {
            SessionState::Absent => "not logged in",
            SessionState::Valid => "logged in",
            SessionState::Expired => "logged in (token will be refreshed on next request)",
        };
        match self.config.last_username {
            Some(ref user) if state != "not logged in" => println!("Session:  {} as {}", state, user),
            _ => println!("Session:  {}", state),
        }
        match self.cache.load_documents()? {
            Some(cached) => println!(
                "Cache:    {} documents, updated {}{}",
                cached.data.len(),
                cached.age_display(),
                if cached.is_stale() { " (stale)" } else { "" }
            ),
            None => println!("Cache:    empty"),
        }
        Ok(())
    }

    // ===== Documents =====

    async fn list(&self, filter: &DocumentFilter, offline: bool) -> Result<()> {
        let documents = self.documents(offline).await?;
        print_documents(&filter.apply(&documents));
        Ok(())
    }

    async fn show(&self, id: i64, offline: bool) -> Result<()> {
        let documents = self.documents(offline).await?;
        let Some(document) = documents.iter().find(|d| d.id == id) else {
            bail!("No document with id {}", id);
        };
        print_document(document);
        Ok(())
    }

    /// Fetch the document list, falling back to the cache when offline
    async fn documents(&self, offline: bool) -> Result<Vec<Document>> {
        if offline {
            return self.cached_documents();
        }
        self.require_session()?;

        match self.api.list_documents().await {
            Ok(documents) => {
                if let Err(e) = self.cache.save_documents(&documents) {
                    warn!(error = %e, "Failed to cache documents");
                }
                Ok(documents)
            }
            Err(ApiError::NetworkError(e)) => {
                warn!(error = %e, "Network unavailable, showing cached documents");
                eprintln!("Could not reach the server; showing cached documents.");
                self.cached_documents()
            }
            Err(e) => Err(e).context("Failed to fetch documents"),
        }
    }

    fn cached_documents(&self) -> Result<Vec<Document>> {
        let Some(cached) = self.cache.load_documents()? else {
            bail!("No cached documents. Run `kazana list` while online first");
        };
        println!("(cached {})", cached.age_display());
        Ok(cached.data)
    }

    async fn upload(&self, path: &Path, category: Option<Category>) -> Result<()> {
        self.require_session()?;
        if !path.is_file() {
            bail!("{} is not a file", path.display());
        }

        let document = self
            .api
            .upload_document(path, category)
            .await
            .context("Upload failed. Please try again")?;
        println!(
            "Upload successful! Category: {} ({} confidence, id {})",
            document.category,
            document.confidence_display(),
            document.id
        );

        // The cached list is now incomplete
        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "Failed to invalidate document cache");
        }
        Ok(())
    }

    async fn set_category(&self, id: i64, category: Category) -> Result<()> {
        self.require_session()?;
        self.api
            .update_category(id, category)
            .await
            .with_context(|| format!("Failed to update category of document {}", id))?;
        if let Err(e) = self.cache.update_document_category(id, category) {
            warn!(error = %e, "Failed to update cached document");
        }
        println!("Document {} is now filed under {}.", id, category);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.require_session()?;
        self.api
            .delete_document(id)
            .await
            .with_context(|| format!("Failed to delete document {}", id))?;
        if let Err(e) = self.cache.remove_document(id) {
            warn!(error = %e, "Failed to update cached documents");
        }
        println!("Deleted document {}.", id);
        Ok(())
    }
}

fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::Write;

    eprint!("{}", prompt);
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read input")?;
    let line = line.trim().to_string();
    if line.is_empty() {
        bail!("A username is required");
    }
    Ok(line)
}

fn print_document(doc: &Document) {
    println!("ID:          {}", doc.id);
    println!("File:        {}", doc.file_name());
    println!("Category:    {}", doc.category);
    println!("Confidence:  {}", doc.confidence_display());
    println!("Uploaded:    {}", doc.uploaded_display());
    println!("Link:        {}", doc.file);
}

fn print_documents(documents: &[&Document]) {
    if documents.is_empty() {
        println!("No documents found.");
        return;
    }

    println!(
        "{:>6}  {:<width$}  {:<12}  {:>10}  {}",
        "ID",
        "FILE",
        "CATEGORY",
        "CONFIDENCE",
        "UPLOADED",
        width = FILE_COLUMN_WIDTH
    );
    for doc in documents {
        println!(
            "{:>6}  {:<width$}  {:<12}  {:>10}  {}",
            doc.id,
            truncate_string(doc.file_name(), FILE_COLUMN_WIDTH),
            doc.category.to_string(),
            doc.confidence_display(),
            doc.uploaded_display(),
            width = FILE_COLUMN_WIDTH
        );
    }
    println!("{} document(s)", documents.len());
}
