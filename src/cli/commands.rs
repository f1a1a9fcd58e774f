use crate::cli::args::parse_s3_path;
use crate::s3::S3Client;
use crate::transport::Transport;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Make bucket command
pub fn cmd_mb<T: Transport>(client: &mut S3Client<T>, bucket: &str, out: &mut impl Write) -> Result<()> {
    let (bucket_name, _) = parse_s3_path(bucket)?;

    client.create_bucket(Some(&bucket_name))?;

    writeln!(out, "Bucket created: s3://{}", bucket_name)?;
    Ok(())
}

/// Remove bucket command
pub fn cmd_rb<T: Transport>(client: &mut S3Client<T>, bucket: &str, out: &mut impl Write) -> Result<()> {
    let (bucket_name, _) = parse_s3_path(bucket)?;

    if client.delete_bucket(Some(&bucket_name))? {
        writeln!(out, "Bucket deleted: s3://{}", bucket_name)?;
    } else {
        writeln!(out, "Bucket does not exist: s3://{}", bucket_name)?;
    }
    Ok(())
}

/// Upload command
///
/// A destination without a key, or ending in `/`, takes the file name of
/// the source. Directories need `recursive` and upload under the key as a
/// prefix.
pub fn cmd_put<T: Transport>(
    client: &mut S3Client<T>,
    source: &str,
    dest: &str,
    content_type: &str,
    recursive: bool,
    out: &mut impl Write,
) -> Result<()> {
    let (bucket, key) = parse_s3_path(dest)?;
    let local_path = Path::new(source);

    if local_path.is_dir() {
        if !recursive {
            anyhow::bail!("{} is a directory (use --recursive)", source);
        }

        let keys = client.put_directory(local_path, key.as_deref(), Some(&bucket))?;
        for key in &keys {
            writeln!(out, "s3://{}/{}", bucket, key)?;
        }
        writeln!(out, "Uploaded {} files", keys.len())?;
        return Ok(());
    }

    let key = destination_key(local_path, key.as_deref())?;
    client.put_file(local_path, &key, content_type, Some(&bucket))?;

    writeln!(out, "{} -> s3://{}/{}", local_path.display(), bucket, key)?;
    Ok(())
}

/// Download command; writes to `output` or, when none is given, to `out`
pub fn cmd_get<T: Transport>(
    client: &mut S3Client<T>,
    path: &str,
    output: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let (bucket, key) = parse_s3_path(path)?;
    let key = key.ok_or_else(|| anyhow::anyhow!("Object key is required for get command"))?;

    let content = client.get_object_content(&key, Some(&bucket))?;

    match output {
        Some(file) => {
            std::fs::write(file, &content).with_context(|| format!("Failed to write {}", file))?;
            writeln!(out, "s3://{}/{} -> {} ({})", bucket, key, file, format_bytes(content.len() as u64))?;
        }
        None => out.write_all(&content)?,
    }
    Ok(())
}

/// Remove object command
pub fn cmd_rm<T: Transport>(client: &mut S3Client<T>, path: &str, out: &mut impl Write) -> Result<()> {
    let (bucket, key) = parse_s3_path(path)?;
    let key = key.ok_or_else(|| anyhow::anyhow!("Object key is required for rm command"))?;

    if client.delete_object(&key, Some(&bucket))? {
        writeln!(out, "Deleted: s3://{}/{}", bucket, key)?;
    } else {
        writeln!(out, "Not found: s3://{}/{}", bucket, key)?;
    }
    Ok(())
}

/// Object info command
pub fn cmd_stat<T: Transport>(client: &mut S3Client<T>, path: &str, out: &mut impl Write) -> Result<()> {
    let (bucket, key) = parse_s3_path(path)?;
    let key = key.ok_or_else(|| anyhow::anyhow!("Object key is required for stat command"))?;

    if !client.object_exists(&key, Some(&bucket))? {
        anyhow::bail!("Object not found: s3://{}/{}", bucket, key);
    }
    let object = client.get_object(&key, Some(&bucket))?;
    let size = object.content_length.unwrap_or(object.body.len() as u64);

    writeln!(out, "Object: s3://{}/{}", bucket, key)?;
    writeln!(out, "Size: {} ({})", format_bytes(size), size)?;
    writeln!(out, "Content-Type: {}", object.content_type.as_deref().unwrap_or("Unknown"))?;
    writeln!(out, "Last Modified: {}", object.last_modified.as_deref().unwrap_or("Unknown"))?;
    if let Some(ref etag) = object.etag {
        writeln!(out, "ETag: {}", etag)?;
    }
    Ok(())
}

fn destination_key(source: &Path, key: Option<&str>) -> Result<String> {
    let file_name = || {
        source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Cannot derive object key from {}", source.display()))
    };

    match key {
        Some(key) if !key.ends_with('/') => Ok(key.to_string()),
        Some(prefix) => Ok(format!("{}{}", prefix, file_name()?)),
        None => Ok(file_name()?.to_string()),
    }
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
