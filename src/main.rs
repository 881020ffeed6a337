use anyhow::Result;
use clap::{Parser, Subcommand};
use spaces_client::models::{Acl, Config, ListOptions, SortOrder, UploadOptions};
use spaces_client::ObjectStorageClient;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "spaces-client")]
#[command(about = "Manage files in a DigitalOcean Spaces bucket")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the origin URL of a key.
    Url { key: String },
    /// Print the CDN URL of a key.
    CdnUrl { key: String },
    /// Print a presigned download URL.
    Presign {
        key: String,
        /// Lifetime of the URL in seconds.
        #[arg(long, default_value_t = 900)]
        expires: u64,
    },
    /// Report whether a key is publicly readable.
    IsPublic { key: String },
    /// Upload a local file.
    Upload {
        local: PathBuf,
        key: String,
        /// ACL to apply: `public`, `private`, or any canned ACL name.
        #[arg(long, default_value = "private")]
        permission: String,
        /// Retry failed uploads with exponential backoff.
        #[arg(long)]
        retry: bool,
        /// Purge the key from the CDN cache afterwards.
        #[arg(long)]
        purge: bool,
        #[arg(long)]
        cache_control: Option<String>,
    },
    /// List files under a prefix as JSON.
    List {
        #[arg(default_value = "")]
        prefix: String,
        /// `ASC` or `DESC`.
        #[arg(long, default_value = "ASC")]
        sort: String,
        /// Print keys instead of CDN URLs.
        #[arg(long)]
        path_only: bool,
    },
    /// Delete one or more keys.
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Delete every object under a prefix.
    DeleteFolder { prefix: String },
    /// Copy a key, keeping its public/private state.
    Copy { source: String, destination: String },
    /// Download a key to a local path.
    Download {
        key: String,
        local: PathBuf,
        /// Fail instead of creating missing parent directories.
        #[arg(long)]
        no_create_dirs: bool,
    },
    /// Purge keys from the CDN cache.
    Purge {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

async fn execute(client: &ObjectStorageClient, command: Command) -> spaces_client::Result<()> {
    match command {
        Command::Url { key } => println!("{}", client.public_url(&key)),
        Command::CdnUrl { key } => println!("{}", client.cdn_url(&key)),
        Command::Presign { key, expires } => {
            let url = client
                .presigned_url_expiring(&key, Duration::from_secs(expires))
                .await?;
            println!("{}", url);
        }
        Command::IsPublic { key } => println!("{}", client.is_public(&key).await?),
        Command::Upload {
            local,
            key,
            permission,
            retry,
            purge,
            cache_control,
        } => {
            let mut options = UploadOptions::default()
                .with_exponential_backoff(retry)
                .with_purge_cache(purge);
            options.object.cache_control = cache_control;

            let url = client
                .upload(&local, &key, Acl::from(permission.as_str()), options)
                .await?;
            println!("{}", url);
        }
        Command::List {
            prefix,
            sort,
            path_only,
        } => {
            let options = ListOptions::default()
                .with_sort(SortOrder::from(sort.as_str()))
                .with_path_only(path_only);
            let files = client.list_files(&prefix, options).await?;
            println!("{}", serde_json::to_string_pretty(&files)?);
        }
        Command::Delete { keys } => client.delete_paths(keys.as_slice()).await?,
        Command::DeleteFolder { prefix } => client.delete_folder(&prefix).await?,
        Command::Copy {
            source,
            destination,
        } => client.copy_file(&source, &destination).await?,
        Command::Download {
            key,
            local,
            no_create_dirs,
        } => {
            let path = client.download_file(&key, &local, !no_create_dirs).await?;
            println!("{}", path.display());
        }
        Command::Purge { keys } => client.purge_cache(&keys).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spaces_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    let config = Config::from_env()?;
    let client = match ObjectStorageClient::new(config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize client: {}", e);
            std::process::exit(1);
        }
    };

    match execute(&client, args.command).await {
        Ok(()) => {
            info!("Done");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CliArgs, Command};
    use clap::Parser;

    #[test]
    fn test_parse_upload_flags() {
        let args = CliArgs::try_parse_from([
            "spaces-client",
            "upload",
            "./cat.jpg",
            "images/cat.jpg",
            "--permission",
            "public",
            "--retry",
            "--purge",
        ])
        .unwrap();

        match args.command {
            Command::Upload {
                key,
                permission,
                retry,
                purge,
                cache_control,
                ..
            } => {
                assert_eq!(key, "images/cat.jpg");
                assert_eq!(permission, "public");
                assert!(retry);
                assert!(purge);
                assert!(cache_control.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_defaults() {
        let args = CliArgs::try_parse_from(["spaces-client", "list"]).unwrap();

        match args.command {
            Command::List {
                prefix,
                sort,
                path_only,
            } => {
                assert_eq!(prefix, "");
                assert_eq!(sort, "ASC");
                assert!(!path_only);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_delete_requires_keys() {
        assert!(CliArgs::try_parse_from(["spaces-client", "delete"]).is_err());
    }
}
