//! Basic usage example for s3lite
//!
//! Creates a bucket, uploads and reads back an object, then cleans up
//! everything it created through the client's registry.
//!
//! Run against a local MinIO with:
//! ```
//! cargo run --example basic_usage
//! ```

use s3lite::s3::{S3Client, S3Error};

fn main() -> Result<(), S3Error> {
    let mut client = S3Client::new(
        "minioadmin",
        "minioadmin",
        "http://localhost:9000",
        "us-east-1",
    )?
    .with_bucket("s3lite-example");

    println!("s3lite - Basic Usage Example");
    println!("============================\n");

    println!("1. Creating bucket...");
    client.create_bucket(None)?;
    // Creating it again is a no-op
    client.create_bucket(None)?;
    println!("   Bucket exists: {}\n", client.bucket_exists(None)?);

    println!("2. Uploading object...");
    client.put_object("Hello, s3lite!", "test/example.txt", "text/plain", None)?;

    println!("3. Downloading object...");
    let object = client.get_object("test/example.txt", None)?;
    println!("   Downloaded {} bytes", object.body.len());
    println!("   Content: {}", String::from_utf8_lossy(&object.body));
    if let Some(etag) = &object.etag {
        println!("   ETag: {}", etag);
    }
    println!();

    println!("4. Cleaning up...");
    let created = client.objects().clone();
    for (bucket, keys) in &created {
        for key in keys {
            client.delete_object(key, Some(bucket))?;
            println!("   Deleted s3://{}/{}", bucket, key);
        }
        client.delete_bucket(Some(bucket))?;
        println!("   Deleted s3://{}", bucket);
    }

    // Deleting twice reports absence instead of failing
    assert!(!client.delete_bucket(None)?);

    println!("\nAll operations completed successfully!");
    Ok(())
}
