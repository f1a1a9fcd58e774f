use clap::{Parser, Subcommand};

/// s3lite - Minimal S3 client for bucket and object lifecycle
#[derive(Parser, Debug)]
#[command(name = "s3lite")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (falls back to environment variables)
    #[arg(long, global = true, env = "S3LITE_CONFIG")]
    pub config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true, env = "S3LITE_PROFILE")]
    pub profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Disable TLS certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a bucket; succeeds if it already exists
    Mb {
        /// Bucket path (s3://bucket)
        #[arg(value_name = "BUCKET")]
        bucket: String,
    },

    /// Remove a bucket
    Rb {
        /// Bucket path (s3://bucket)
        #[arg(value_name = "BUCKET")]
        bucket: String,
    },

    /// Upload a file, or a directory with --recursive
    Put {
        /// Local file or directory
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Destination (s3://bucket/key, or s3://bucket/prefix/)
        #[arg(value_name = "DEST")]
        dest: String,

        /// Content type for single-file uploads
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,

        /// Upload a directory tree
        #[arg(short, long)]
        recursive: bool,
    },

    /// Download an object
    Get {
        /// Object path (s3://bucket/key)
        #[arg(value_name = "PATH")]
        path: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Remove an object
    Rm {
        /// Object path (s3://bucket/key)
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Show object info
    Stat {
        /// Object path (s3://bucket/key)
        #[arg(value_name = "PATH")]
        path: String,
    },
}

/// Parse S3 path into bucket and key components
///
/// Accepts both `s3/bucket/key` and URI-style `s3://bucket/key`.
pub fn parse_s3_path(path: &str) -> anyhow::Result<(String, Option<String>)> {
    let path = path.trim();

    let stripped = if let Some(p) = path.strip_prefix("s3://") {
        p
    } else if let Some(p) = path.strip_prefix("s3/") {
        p
    } else {
        anyhow::bail!("Invalid S3 path format. Expected: s3://bucket/key");
    };

    let (bucket, key) = match stripped.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (stripped, ""),
    };

    if bucket.is_empty() {
        anyhow::bail!("Bucket name cannot be empty");
    }

    let key = (!key.is_empty()).then(|| key.to_string());
    Ok((bucket.to_string(), key))
}
