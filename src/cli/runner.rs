//! CLI execution runner.
//!
//! Dispatches one parsed command against the hub stack and prints the result.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::json;

use crate::auth::{CachedTokenLookup, CredentialProvider, ExplicitToken};
use crate::collections::ItemRef;
use crate::hub::{RepoId, RepoKey, TreeKey, Visibility};
use crate::registry::ListOptions;

use super::args::{
    CollectionCommand, Command, FavoriteCommand, FileCommand, RepoCommand, RepoTarget,
};
use super::bootstrap::CliContext;
use super::output::{file_line, print_json, repo_line, run_event_loop};

/// Execute the command in `ctx.args` and wait for completion.
pub async fn execute(ctx: &mut CliContext) -> Result<()> {
    if let Some(event_rx) = ctx.event_rx.take() {
        let json_mode = ctx.args.json;
        ctx.event_task = Some(tokio::spawn(async move {
            if let Err(e) = run_event_loop(event_rx, json_mode).await {
                tracing::warn!("Output handler error: {}", e);
            }
        }));
    }

    match ctx.args.command.clone() {
        Command::Login { token } => login(ctx, token).await,
        Command::Logout => logout(ctx).await,
        Command::Whoami => whoami(ctx).await,
        Command::Repos { action } => repos(ctx, action).await,
        Command::Branches { target } => branches(ctx, &target).await,
        Command::Files { action } => files(ctx, action).await,
        Command::Collections { action } => collections(ctx, action).await,
        Command::Favorites { action } => favorites(ctx, action),
    }
}

async fn login(ctx: &CliContext, token: Option<String>) -> Result<()> {
    let provider: Box<dyn CredentialProvider> = match &token {
        Some(token) => Box::new(ExplicitToken::new(token.clone())),
        None => Box::new(CachedTokenLookup::new()),
    };
    let credential = ctx.state.auth.login(provider.as_ref()).await?;

    // Only a token typed on the command line is new to us; the others
    // already live somewhere the next run will find them.
    if let Some(token) = token {
        ctx.settings_manager
            .set_value("hub.token", json!(token))
            .await
            .context("Failed to store token")?;
    }

    if ctx.args.json {
        print_json(credential.identity())
    } else {
        println!("Logged in as {}", credential.username());
        Ok(())
    }
}

async fn logout(ctx: &CliContext) -> Result<()> {
    ctx.state.auth.logout();
    if ctx.settings_manager.get().await.hub.token.is_some() {
        ctx.settings_manager
            .set_value("hub.token", serde_json::Value::Null)
            .await
            .context("Failed to clear stored token")?;
    }
    if !ctx.args.json {
        println!("Logged out");
    }
    Ok(())
}

async fn whoami(ctx: &CliContext) -> Result<()> {
    let identity = ctx.state.auth.whoami().await?;
    if ctx.args.json {
        return print_json(&identity);
    }
    println!("{}", identity.username);
    if !identity.fullname.is_empty() {
        println!("name:  {}", identity.fullname);
    }
    if !identity.orgs.is_empty() {
        println!("orgs:  {}", identity.orgs.join(", "));
    }
    Ok(())
}

async fn repos(ctx: &CliContext, action: RepoCommand) -> Result<()> {
    let registry = &ctx.state.registry;
    match action {
        RepoCommand::List {
            kind,
            owner,
            search,
            limit,
            favorites,
        } => {
            let owner = registry.owner_or_current(owner.as_deref())?;
            let options = ListOptions {
                search,
                limit,
                ..ListOptions::default()
            };
            let mut repos = registry.list(kind, &owner, &options).await?;
            ctx.state.local.set_favorites_only(favorites);
            if favorites {
                repos = ctx.state.local.filter_favorites(repos);
            }

            if ctx.args.json {
                return print_json(&repos);
            }
            if repos.is_empty() {
                println!("No {} repositories for {}", kind, owner);
            }
            for repo in &repos {
                println!("{}", repo_line(repo));
            }
        }
        RepoCommand::Info { target } => {
            let key = resolve_target(ctx, &target)?;
            let repo = registry.info(key.kind, &key.id).await?;
            if ctx.args.json {
                return print_json(&repo);
            }
            println!("{}", repo_line(&repo));
            if let Some(sha) = &repo.sha {
                println!("sha:   {}", sha);
            }
            if !repo.tags.is_empty() {
                println!("tags:  {}", repo.tags.join(", "));
            }
        }
        RepoCommand::Create {
            name,
            kind,
            private,
        } => {
            let repo = registry
                .create(kind, &name, Visibility::from_private(private))
                .await?;
            ctx.state.local.set_last_repo_id(repo.id.as_str());
            if ctx.args.json {
                return print_json(&repo);
            }
            println!("Created {} {}", kind, repo.id);
        }
        RepoCommand::Delete { target, yes } => {
            let key = resolve_target(ctx, &target)?;
            confirm(yes, &format!("delete {} {}", key.kind, key.id))?;
            registry.delete(key.kind, &key.id).await?;
            if !ctx.args.json {
                println!("Deleted {} {}", key.kind, key.id);
            }
        }
        RepoCommand::Visibility { target, visibility } => {
            let key = resolve_target(ctx, &target)?;
            let repo = registry.set_visibility(key.kind, &key.id, visibility).await?;
            if ctx.args.json {
                return print_json(&repo);
            }
            println!("{} is {}", repo.id, repo.visibility);
        }
    }
    Ok(())
}

async fn branches(ctx: &CliContext, target: &RepoTarget) -> Result<()> {
    let key = resolve_target(ctx, target)?;
    let refs = ctx.state.branches.list_refs(&key).await?;
    if ctx.args.json {
        return print_json(&json!({ "branches": refs.branches, "tags": refs.tags }));
    }
    for branch in &refs.branches {
        let marker = if branch.is_default { "*" } else { " " };
        println!("{} {:<32} {}", marker, branch.name, branch.head_commit_id);
    }
    for tag in &refs.tags {
        println!("  {} (tag)", tag);
    }
    Ok(())
}

async fn files(ctx: &CliContext, action: FileCommand) -> Result<()> {
    match action {
        FileCommand::List { target, branch } => {
            let key = tree_key(ctx, &target, branch).await?;
            let entries = ctx.state.trees.fetch(&key).await?;
            if ctx.args.json {
                return print_json(entries.as_slice());
            }
            for entry in entries.iter() {
                println!("{}", file_line(entry));
            }
        }
        FileCommand::Cat {
            target,
            path,
            branch,
        } => {
            let key = tree_key(ctx, &target, branch).await?;
            let text = ctx.state.trees.read_for_edit(&key, &path).await?;
            if ctx.args.json {
                return print_json(&json!({ "path": path, "content": text }));
            }
            print!("{}", text);
        }
        FileCommand::Download {
            target,
            path,
            branch,
            output,
        } => {
            let key = tree_key(ctx, &target, branch).await?;
            let destination = match output {
                Some(output) => output,
                None => PathBuf::from(file_name(&path)?),
            };
            let written = ctx.state.trees.download_to(&key, &path, &destination).await?;
            if ctx.args.json {
                return print_json(&json!({
                    "path": path,
                    "destination": destination,
                    "bytes": written,
                }));
            }
            println!("Downloaded {} ({} bytes) to {}", path, written, destination.display());
        }
        FileCommand::Commit {
            target,
            message,
            description,
            branch,
            add,
            delete,
            folder,
            path_in_repo,
            yes,
        } => {
            if !delete.is_empty() {
                confirm(yes, &format!("delete {} file(s)", delete.len()))?;
            }
            let key = tree_key(ctx, &target, branch).await?;
            let existing = ctx.state.trees.fetch(&key).await?;
            let exists = |path: &str| existing.iter().any(|e| e.path == path);

            let mut builder = ctx.state.commit_builder(key.repo.clone());
            for spec in &add {
                let (repo_path, local) = parse_add(spec)?;
                if exists(&repo_path) {
                    builder.update(&repo_path, local)?;
                } else {
                    builder.add(&repo_path, local)?;
                }
            }
            if let Some(dir) = &folder {
                let staged =
                    builder.stage_folder(dir, &path_in_repo, ctx.state.ignore_patterns())?;
                ctx.state.local.set_last_upload_dir(dir);
                tracing::debug!("Staged {} file(s) from {}", staged, dir.display());
            }
            for path in &delete {
                builder.delete(path)?;
            }

            let cancel = builder.cancel_token();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
            let result = builder
                .submit_with_description(&message, description.as_deref(), &key.branch)
                .await;
            interrupt.abort();
            let commit = result?;

            if ctx.args.json {
                return print_json(&json!({
                    "repo": commit.repo.id,
                    "branch": commit.branch,
                    "commit_id": commit.commit_id,
                    "commit_url": commit.commit_url,
                    "operations": commit
                        .operations
                        .iter()
                        .map(|op| json!({ "op": op.verb(), "path": op.path() }))
                        .collect::<Vec<_>>(),
                }));
            }
            for op in &commit.operations {
                println!("{:<7} {}", op.verb(), op.path());
            }
            println!("Committed {} to {}", commit.commit_id, key);
        }
    }
    Ok(())
}

async fn collections(ctx: &CliContext, action: CollectionCommand) -> Result<()> {
    let store = &ctx.state.collections;
    match action {
        CollectionCommand::List { owner } => {
            let owner = ctx.state.registry.owner_or_current(owner.as_deref())?;
            let collections = store.list(&owner).await?;
            if ctx.args.json {
                return print_json(&collections);
            }
            for collection in &collections {
                println!(
                    "{:<40} {:>3} item(s)  {}",
                    collection.slug,
                    collection.items.len(),
                    collection.title
                );
            }
        }
        CollectionCommand::Show { slug } => {
            let collection = store.get(&slug).await?;
            if ctx.args.json {
                return print_json(&collection);
            }
            println!("{} ({})", collection.title, collection.visibility);
            println!("{}", collection.url);
            if !collection.description.is_empty() {
                println!("{}", collection.description);
            }
            for item in &collection.items {
                match &item.note {
                    Some(note) => println!("  {}  - {}", item.item, note),
                    None => println!("  {}", item.item),
                }
            }
        }
        CollectionCommand::Create {
            title,
            namespace,
            description,
            private,
        } => {
            let visibility = Visibility::from_private(private);
            let collection = store
                .create_in(
                    namespace.as_deref(),
                    &title,
                    description.as_deref().unwrap_or(""),
                    visibility,
                )
                .await?;
            if ctx.args.json {
                return print_json(&collection);
            }
            println!("Created collection {}", collection.slug);
        }
        CollectionCommand::Add { slug, item, note } => {
            let item: ItemRef = item.parse()?;
            let collection = store.add_item(&slug, &item, note.as_deref()).await?;
            if ctx.args.json {
                return print_json(&collection);
            }
            println!("Added {} to {}", item, collection.slug);
        }
        CollectionCommand::Remove { slug, item } => {
            let item: ItemRef = item.parse()?;
            store.remove_item(&slug, &item).await?;
            if !ctx.args.json {
                println!("Removed {} from {}", item, slug);
            }
        }
        CollectionCommand::Delete { slug, yes } => {
            confirm(yes, &format!("delete collection {}", slug))?;
            store.delete(&slug).await?;
            if !ctx.args.json {
                println!("Deleted collection {}", slug);
            }
        }
    }
    Ok(())
}

fn favorites(ctx: &CliContext, action: FavoriteCommand) -> Result<()> {
    let local = &ctx.state.local;
    match action {
        FavoriteCommand::Toggle { target } => {
            let key = resolve_target(ctx, &target)?;
            let starred = local.toggle_favorite(&key);
            if ctx.args.json {
                return print_json(&json!({ "repo": key.to_token(), "favorite": starred }));
            }
            let verb = if starred { "Starred" } else { "Unstarred" };
            println!("{} {}", verb, key);
        }
        FavoriteCommand::List => {
            let favorites: Vec<String> = local.favorites().iter().map(RepoKey::to_token).collect();
            if ctx.args.json {
                return print_json(&favorites);
            }
            for favorite in &favorites {
                println!("{}", favorite);
            }
        }
    }
    Ok(())
}

/// Parse the target and remember it as the last selected repo.
fn resolve_target(ctx: &CliContext, target: &RepoTarget) -> Result<RepoKey> {
    let key = RepoKey::new(target.kind, RepoId::parse(&target.repo)?);
    ctx.state.local.set_last_repo_kind(key.kind);
    ctx.state.local.set_last_repo_id(key.id.as_str());
    Ok(key)
}

/// The named branch, or the repo's default branch.
async fn tree_key(ctx: &CliContext, target: &RepoTarget, branch: Option<String>) -> Result<TreeKey> {
    let repo = resolve_target(ctx, target)?;
    let branch = match branch {
        Some(branch) => branch,
        None => ctx.state.branches.resolve_default(&repo).await?.name,
    };
    Ok(TreeKey::new(repo, branch))
}

/// `REPO_PATH=LOCAL`, or a bare local path kept under its file name.
fn parse_add(spec: &str) -> Result<(String, PathBuf)> {
    match spec.split_once('=') {
        Some((repo_path, local)) => Ok((repo_path.to_string(), PathBuf::from(local))),
        None => Ok((file_name(spec)?, PathBuf::from(spec))),
    }
}

fn file_name(path: &str) -> Result<String> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("'{}' has no file name", path))
}

fn confirm(yes: bool, action: &str) -> Result<()> {
    if !yes {
        bail!("Refusing to {} without --yes", action);
    }
    Ok(())
}
