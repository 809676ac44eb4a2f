use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, LocalIdentity, TokenStore};
use crate::config::{BackendKind, Config};
use crate::error::{AppError, Result};
use crate::models::{
    format_date, format_file_size, AccessGrant, ChatRole, DocumentRecord, UploadFile,
};
use crate::services::{DirectorySink, DocumentService, SessionGate, SignupService};
use crate::shell::{DocumentShell, ListView, Phase, PreviewOutcome, Surface};

#[derive(Parser)]
#[command(name = "minder")]
#[command(about = "Upload, list, preview and delete private PDF documents")]
pub struct Cli {
    /// Print records as JSON
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session token
    Login {
        #[arg(long, requires = "email", conflicts_with = "token")]
        user_id: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Access token issued by the hosted identity provider
        #[arg(long)]
        token: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// List your documents, newest first
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Document count, storage used and recent uploads
    Stats,
    /// Upload a PDF
    Upload {
        file: PathBuf,
        /// Declared content type; guessed from the extension when omitted
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Delete a document and its stored file
    Delete { id: String },
    /// Open a PDF preview (renewed while held) or download anything else
    Preview {
        id: String,
        #[arg(long, default_value_t = 0)]
        hold_secs: u64,
    },
    /// Ask about a document
    Chat {
        id: String,
        #[arg(required = true)]
        message: Vec<String>,
    },
    /// Join the early-access waitlist
    Waitlist {
        email: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Subscribe to the newsletter
    Subscribe { email: String },
}

/// Run one command and return the process exit code
pub async fn execute(cli: Cli, config: &Config, backend: Backend) -> u8 {
    let json = cli.json;
    match cli.command {
        Commands::Login {
            user_id,
            email,
            token,
        } => finish(login(config, &backend, user_id, email, token).await),
        Commands::Logout => {
            let mut shell = new_shell(config, &backend);
            let result = shell.sign_out().await;
            if result.is_ok() {
                if let Phase::Redirected { to } = shell.phase() {
                    println!("Signed out. Sign in again at {}", to);
                }
                return 0;
            }
            rendered(&mut shell, result)
        }
        Commands::List { search } => {
            let mut shell = new_shell(config, &backend);
            let result = list(&mut shell, search, json).await;
            rendered(&mut shell, result)
        }
        Commands::Stats => finish(stats(config, &backend, json).await),
        Commands::Upload { file, content_type } => {
            let mut shell = new_shell(config, &backend);
            let result = upload(&mut shell, file, content_type).await;
            rendered(&mut shell, result)
        }
        Commands::Delete { id } => {
            let mut shell = new_shell(config, &backend);
            let result = delete(&mut shell, &id).await;
            rendered(&mut shell, result)
        }
        Commands::Preview { id, hold_secs } => {
            let mut shell = new_shell(config, &backend);
            let result = preview(&mut shell, &id, hold_secs).await;
            let code = rendered(&mut shell, result);
            shell.close_surface().await;
            code
        }
        Commands::Chat { id, message } => {
            let mut shell = new_shell(config, &backend);
            let result = chat(&mut shell, &id, &message.join(" ")).await;
            let code = rendered(&mut shell, result);
            shell.close_surface().await;
            code
        }
        Commands::Waitlist { email, phone } => finish(
            SignupService::new(backend.signups.clone())
                .join_waitlist(&email, phone.as_deref())
                .await
                .map(|text| println!("{}", text)),
        ),
        Commands::Subscribe { email } => finish(
            SignupService::new(backend.signups.clone())
                .subscribe(&email)
                .await
                .map(|text| println!("{}", text)),
        ),
    }
}

async fn list(shell: &mut DocumentShell, search: Option<String>, json: bool) -> Result<()> {
    shell.load().await?;
    if let Some(search) = search {
        shell.set_search(search);
    }
    if !json {
        if let Some(session) = shell.session() {
            println!("{} ({} documents)", session.email, shell.documents().len());
        }
    }
    match shell.view() {
        ListView::Items(docs) if json => print_json(&docs)?,
        ListView::Items(docs) => docs.into_iter().for_each(print_document),
        ListView::Empty { searching: true } => println!("No documents match your search"),
        ListView::Empty { searching: false } => println!("No documents yet"),
        ListView::Loading => {}
    }
    Ok(())
}

async fn stats(config: &Config, backend: &Backend, json: bool) -> Result<()> {
    let session = SessionGate::new(backend.auth.clone(), config.session.login_url.clone())
        .require_session()
        .await?;
    let stats = DocumentService::new(backend.documents.clone(), backend.storage.clone())
        .stats(&session.user_id)
        .await?;
    if json {
        return print_json(&stats);
    }
    println!("Total documents: {}", stats.total_documents);
    println!("Storage used:    {:.2} GB", stats.storage_used_gb());
    println!("Recent activity:");
    stats.recent.iter().for_each(print_document);
    Ok(())
}

async fn upload(
    shell: &mut DocumentShell,
    file: PathBuf,
    content_type: Option<String>,
) -> Result<()> {
    let data = tokio::fs::read(&file).await?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::Validation(format!("Not a file: {}", file.display())))?;
    let content_type = content_type.unwrap_or_else(|| {
        mime_guess::from_path(&file)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });

    shell.load().await?;
    shell.select_file(UploadFile::new(name, content_type, Bytes::from(data)))?;
    if let Some(selected) = shell.selected_file() {
        println!(
            "Uploading {} ({})",
            selected.name,
            format_file_size(selected.data.len() as i64)
        );
    }
    let record = shell.submit_upload().await?;
    println!("Uploaded {} ({})", record.name, record.id);
    Ok(())
}

async fn delete(shell: &mut DocumentShell, id: &str) -> Result<()> {
    shell.load().await?;
    shell.delete(id).await?;
    println!("Deleted {}", id);
    Ok(())
}

async fn chat(shell: &mut DocumentShell, id: &str, message: &str) -> Result<()> {
    shell.load().await?;
    shell.open_chat(id).await?;
    if let Some(chat) = shell.chat_mut() {
        print_grant(&chat.preview());
        chat.send(message).await?;
        for msg in chat.messages() {
            let who = match msg.role {
                ChatRole::User => "you",
                ChatRole::Assistant => "minder",
            };
            println!("{}: {}", who, msg.content);
        }
    }
    Ok(())
}

async fn login(
    config: &Config,
    backend: &Backend,
    user_id: Option<String>,
    email: Option<String>,
    token: Option<String>,
) -> Result<()> {
    let tokens = TokenStore::new(&config.session.token_path);

    match (user_id, token) {
        (_, Some(token)) => {
            tokens.save(token.trim()).await?;
            match backend.auth.get_session().await? {
                Some(session) => println!("Signed in as {}", session.email),
                None => {
                    tokens.clear().await?;
                    return Err(AppError::Validation("Token was rejected".to_string()));
                }
            }
        }
        (Some(user_id), None) if config.backend.kind == BackendKind::Local => {
            let identity = LocalIdentity::new(
                tokens,
                config.session.jwt_secret.clone(),
                config.session.token_ttl_hours,
            );
            let session = identity
                .issue_token(&user_id, email.as_deref().unwrap_or_default())
                .await?;
            println!("Signed in as {} ({})", session.email, session.user_id);
        }
        (Some(_), None) => {
            return Err(AppError::Validation(
                "The hosted backend signs in with --token".to_string(),
            ))
        }
        (None, None) => {
            return Err(AppError::Validation(
                "Pass --user-id and --email, or --token".to_string(),
            ))
        }
    }
    Ok(())
}

async fn preview(shell: &mut DocumentShell, id: &str, hold_secs: u64) -> Result<()> {
    shell.load().await?;

    match shell.open_preview(id).await? {
        PreviewOutcome::Downloaded(path) => {
            println!("Saved to {}", path.display());
            return Ok(());
        }
        PreviewOutcome::Viewer(grant) => print_grant(&grant),
    }

    let hold = tokio::time::sleep(Duration::from_secs(hold_secs));
    tokio::pin!(hold);
    while shell.is_renewing() {
        tokio::select! {
            _ = &mut hold => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, closing preview");
                break;
            }
            renewed = shell.next_grant() => match renewed {
                Ok(grant) => print_grant(&grant),
                Err(e) => {
                    tracing::warn!("Preview stopped renewing: {}", e);
                    break;
                }
            },
        }
    }
    Ok(())
}

fn new_shell(config: &Config, backend: &Backend) -> DocumentShell {
    let sink = Arc::new(DirectorySink::new(&config.preview.download_dir));
    DocumentShell::new(backend, config, sink)
}

fn print_document(doc: &DocumentRecord) {
    println!(
        "{}  {:<40}  {:>10}  {}",
        doc.id,
        doc.display_name(),
        format_file_size(doc.size_bytes),
        format_date(&doc.created_at)
    );
}

fn print_grant(grant: &AccessGrant) {
    if let Some(url) = grant.url() {
        match grant.expires_at() {
            Some(at) => println!("{}  (expires {})", url, at.format("%H:%M:%S")),
            None => println!("{}", url),
        }
    } else if let Some(data) = grant.bytes() {
        println!(
            "{} loaded into memory ({})",
            grant.target_path,
            format_file_size(data.len() as i64)
        );
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Internal(format!("Failed to encode output: {}", e)))?;
    println!("{}", out);
    Ok(())
}

fn finish(result: Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => report(&e),
    }
}

/// Show a shell command's failure from the state the shell kept for it
fn rendered(shell: &mut DocumentShell, result: Result<()>) -> u8 {
    let Err(err) = result else {
        return 0;
    };
    if let Phase::Redirected { to } = shell.phase() {
        eprintln!("Not signed in. Sign in at {} or run `minder login`.", to);
        return 2;
    }
    if let Surface::Unavailable { message, .. } = shell.surface() {
        eprintln!("Preview unavailable: {}", message);
        return 1;
    }
    match shell.take_error() {
        Some(message) => {
            eprintln!("{}", message);
            1
        }
        None => report(&err),
    }
}

/// Log and print an error that never reached the shell; returns the exit code
fn report(err: &AppError) -> u8 {
    err.log();
    match err {
        AppError::AuthRequired { redirect_to } => {
            eprintln!("Not signed in. Sign in at {} or run `minder login`.", redirect_to);
            2
        }
        other => {
            eprintln!("{}", other.user_message().unwrap_or_else(|| other.to_string()));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_collects_message_words() {
        let cli = Cli::parse_from(["minder", "chat", "doc-1", "what", "is", "this"]);
        match cli.command {
            Commands::Chat { id, message } => {
                assert_eq!(id, "doc-1");
                assert_eq!(message.join(" "), "what is this");
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn login_user_id_conflicts_with_token() {
        let res = Cli::try_parse_from([
            "minder", "login", "--user-id", "u1", "--email", "a@b.co", "--token", "t",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn preview_hold_defaults_to_zero() {
        let cli = Cli::parse_from(["minder", "--json", "preview", "doc-1"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Preview { hold_secs: 0, .. }));
    }

    mod rendering {
        use super::super::*;
        use crate::backend::memory::MemoryBackend;
        use crate::models::PDF_MIME_TYPE;
        use std::sync::atomic::Ordering;

        fn shell(mem: &Arc<MemoryBackend>, dir: &tempfile::TempDir) -> DocumentShell {
            let sink = Arc::new(DirectorySink::new(dir.path()));
            DocumentShell::new(&mem.backend(), &Config::default(), sink)
        }

        #[tokio::test]
        async fn missing_session_exits_with_redirect_code() {
            let mem = MemoryBackend::new();
            let dir = tempfile::tempdir().unwrap();
            let mut shell = shell(&mem, &dir);

            let result = list(&mut shell, None, false).await;
            assert_eq!(rendered(&mut shell, result), 2);
        }

        #[tokio::test]
        async fn list_failure_is_taken_from_the_shell() {
            let mem = MemoryBackend::signed_in("alice");
            mem.fail_list.store(true, Ordering::SeqCst);
            let dir = tempfile::tempdir().unwrap();
            let mut shell = shell(&mem, &dir);

            let result = list(&mut shell, None, false).await;
            assert_eq!(rendered(&mut shell, result), 1);
            assert_eq!(shell.error(), None);
        }

        #[tokio::test(start_paused = true)]
        async fn unavailable_preview_is_rendered_before_close() {
            let mem = MemoryBackend::signed_in("alice");
            let doc = mem.seed("alice", "a.pdf", PDF_MIME_TYPE);
            mem.fail_sign.store(true, Ordering::SeqCst);
            let dir = tempfile::tempdir().unwrap();
            let mut shell = shell(&mem, &dir);

            let result = preview(&mut shell, &doc.id, 0).await;
            assert!(matches!(shell.surface(), Surface::Unavailable { .. }));
            assert_eq!(rendered(&mut shell, result), 1);
        }

        #[tokio::test]
        async fn logout_goes_through_the_shell() {
            let mem = MemoryBackend::signed_in("alice");
            let dir = tempfile::tempdir().unwrap();
            let mut shell = shell(&mem, &dir);

            shell.sign_out().await.unwrap();
            assert!(matches!(shell.phase(), Phase::Redirected { .. }));
            assert_eq!(rendered(&mut shell, Ok(())), 0);
        }
    }
}
