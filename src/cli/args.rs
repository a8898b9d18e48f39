//! CLI argument parsing using clap.
//!
//! Defines the command-line interface for hubdesk-cli.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::hub::{RepoKind, Visibility};

/// hubdesk CLI - manage hosted repositories, files and collections
#[derive(Parser, Debug, Clone)]
#[command(name = "hubdesk-cli")]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Output results as JSON (for scripting/parsing)
    #[arg(long, global = true)]
    pub json: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Override the hub endpoint from settings
    #[arg(long, global = true, env = "HUBDESK_ENDPOINT")]
    pub endpoint: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Validate a token and remember it
    Login {
        /// Token to use; defaults to HF_TOKEN or the cached token file
        #[arg(long)]
        token: Option<String>,
    },

    /// Forget the stored token
    Logout,

    /// Show who the current token belongs to
    Whoami,

    /// List, inspect, create and delete repositories
    Repos {
        #[command(subcommand)]
        action: RepoCommand,
    },

    /// List the branches of a repository
    Branches {
        #[command(flatten)]
        target: RepoTarget,
    },

    /// Browse, read and commit files
    Files {
        #[command(subcommand)]
        action: FileCommand,
    },

    /// Manage curated collections
    Collections {
        #[command(subcommand)]
        action: CollectionCommand,
    },

    /// Local favorites
    Favorites {
        #[command(subcommand)]
        action: FavoriteCommand,
    },
}

/// A repository on the command line: `--type dataset alice/data`.
#[derive(ClapArgs, Debug, Clone)]
pub struct RepoTarget {
    /// Repository id (namespace/name)
    pub repo: String,

    /// Repository type: model, dataset or space
    #[arg(short = 't', long = "type", default_value = "model")]
    pub kind: RepoKind,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RepoCommand {
    /// List repositories of one owner
    List {
        /// Repository type: model, dataset or space
        #[arg(short = 't', long = "type", default_value = "model")]
        kind: RepoKind,

        /// Owner to list (default: the logged-in user)
        #[arg(long)]
        owner: Option<String>,

        /// Only names containing this text
        #[arg(long)]
        search: Option<String>,

        /// Stop after this many repos (default: all of them)
        #[arg(long)]
        limit: Option<usize>,

        /// Only favorites
        #[arg(long)]
        favorites: bool,
    },

    /// Show one repository
    Info {
        #[command(flatten)]
        target: RepoTarget,
    },

    /// Create a repository; a bare name goes under the logged-in user
    Create {
        name: String,

        #[arg(short = 't', long = "type", default_value = "model")]
        kind: RepoKind,

        #[arg(long)]
        private: bool,
    },

    /// Delete a repository (irreversible)
    Delete {
        #[command(flatten)]
        target: RepoTarget,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Make a repository public or private
    Visibility {
        #[command(flatten)]
        target: RepoTarget,

        visibility: Visibility,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum FileCommand {
    /// List files on a branch
    List {
        #[command(flatten)]
        target: RepoTarget,

        /// Branch (default: the repository's default branch)
        #[arg(short = 'b', long)]
        branch: Option<String>,
    },

    /// Print a text file, refusing files too large to edit inline
    Cat {
        #[command(flatten)]
        target: RepoTarget,

        path: String,

        #[arg(short = 'b', long)]
        branch: Option<String>,
    },

    /// Download a file of any size
    Download {
        #[command(flatten)]
        target: RepoTarget,

        path: String,

        #[arg(short = 'b', long)]
        branch: Option<String>,

        /// Destination (default: the file name in the current directory)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Stage changes and submit them as one commit
    Commit {
        #[command(flatten)]
        target: RepoTarget,

        /// Commit summary
        #[arg(short = 'm', long)]
        message: String,

        /// Extended commit description
        #[arg(long)]
        description: Option<String>,

        #[arg(short = 'b', long)]
        branch: Option<String>,

        /// Add or replace a file: LOCAL or REPO_PATH=LOCAL
        #[arg(long = "add", value_name = "FILE")]
        add: Vec<String>,

        /// Delete a file in the repository
        #[arg(long = "delete", value_name = "REPO_PATH")]
        delete: Vec<String>,

        /// Stage every file of a local directory
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Where `--folder` lands in the repository
        #[arg(long, default_value = "")]
        path_in_repo: String,

        /// Confirm deletions
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CollectionCommand {
    /// List collections of one owner
    List {
        /// Owner to list (default: the logged-in user)
        #[arg(long)]
        owner: Option<String>,
    },

    /// Show one collection and its items
    Show { slug: String },

    Create {
        title: String,

        /// Namespace (default: the logged-in user)
        #[arg(long)]
        namespace: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        private: bool,
    },

    /// Add an item: KIND:ID, e.g. dataset:alice/data or paper:2301.00001
    Add {
        slug: String,

        item: String,

        #[arg(long)]
        note: Option<String>,
    },

    Remove { slug: String, item: String },

    /// Delete a collection (irreversible)
    Delete {
        slug: String,

        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum FavoriteCommand {
    /// Star or unstar a repository
    Toggle {
        #[command(flatten)]
        target: RepoTarget,
    },

    List,
}

impl Command {
    /// Commands that manage the credential themselves.
    pub fn handles_login(&self) -> bool {
        matches!(self, Command::Login { .. } | Command::Logout)
    }

    /// Commands that never touch the network.
    pub fn is_offline(&self) -> bool {
        matches!(self, Command::Favorites { .. })
    }
}
