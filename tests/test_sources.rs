mod common;

use std::sync::Arc;

use boardscan::models::{ImageId, ImageKey, SourceDescriptor};
use boardscan::UnavailableKind;
use common::*;

#[tokio::test]
async fn test_server_listing_is_sorted_and_filtered() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_images(dir.path(), &["b.png", "a.JPG", "nested/c.jpeg", "z.gif"]);
    std::fs::write(dir.path().join("notes.txt"), "not an image")?;
    std::fs::write(dir.path().join("data.tiff"), "unsupported")?;

    let source = ServerSource::new(dir.path());
    let batch = source.list_images().await?;
    let names: Vec<&str> = batch.iter().map(|id| id.filename.as_str()).collect();

    let nested = std::path::Path::new("nested").join("c.jpeg");
    assert_eq!(names, vec!["a.JPG", "b.png", nested.to_str().unwrap(), "z.gif"]);
    Ok(())
}

#[tokio::test]
async fn test_server_missing_directory_is_unavailable() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let source = ServerSource::new(dir.path().join("does-not-exist"));

    let err = source.list_images().await.unwrap_err();
    assert_eq!(err.kind(), UnavailableKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn test_server_fetch_returns_file_bytes() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_images(dir.path(), &["only.png"]);
    let source = ServerSource::new(dir.path());

    let batch = source.list_images().await?;
    let bytes = source.fetch_bytes(&batch[0]).await?;
    assert_eq!(bytes, std::fs::read(dir.path().join("only.png"))?);
    Ok(())
}

#[tokio::test]
async fn test_server_fetch_refuses_escaping_paths() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let source = ServerSource::new(dir.path().join("images"));

    let err = source
        .fetch_bytes(&ImageId::server("../secret.png"))
        .await
        .unwrap_err();
    assert_eq!(err.reason, FetchReason::Missing);
    Ok(())
}

#[tokio::test]
async fn test_server_fetch_of_deleted_file_is_missing() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_images(dir.path(), &["gone.png"]);
    let source = ServerSource::new(dir.path());
    let batch = source.list_images().await?;

    std::fs::remove_file(dir.path().join("gone.png"))?;
    let err = source.fetch_bytes(&batch[0]).await.unwrap_err();
    assert_eq!(err.reason, FetchReason::Missing);
    assert!(err.identifier.contains("gone.png"));
    Ok(())
}

#[tokio::test]
async fn test_local_keeps_upload_order_and_skips_unsupported() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_images(dir.path(), &["u1", "u2", "u3"]);

    let source = LocalSource::new(vec![
        UploadedFile::new(dir.path().join("u1"), "zebra.png"),
        UploadedFile::new(dir.path().join("u2"), "readme.md"),
        UploadedFile::new(dir.path().join("u3"), "apple.BMP"),
    ]);

    let batch = source.list_images().await?;
    let names: Vec<&str> = batch.iter().map(|id| id.filename.as_str()).collect();
    assert_eq!(names, vec!["zebra.png", "apple.BMP"]);

    let bytes = source.fetch_bytes(&batch[1]).await?;
    assert!(!bytes.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_source_rejects_foreign_identifier() -> anyhow::Result<()> {
    let source = LocalSource::new(Vec::new());
    let err = source
        .fetch_bytes(&ImageId::drive("abc", "x.png"))
        .await
        .unwrap_err();
    assert_eq!(err.reason, FetchReason::Missing);
    Ok(())
}

#[tokio::test]
async fn test_drive_lists_only_images_in_order() -> anyhow::Result<()> {
    let mut client = FakeDriveClient::default()
        .with_file("f1", "first.jpg", "image/jpeg", vec![1])
        .with_file("f2", "sheet", "application/vnd.google-apps.spreadsheet", vec![2])
        .with_file("f3", "second.png", "image/png", vec![3]);
    client.folder_name = Some("Field plots".to_string());

    let source = DriveSource::from_link(
        Arc::new(client),
        "https://drive.google.com/drive/folders/ABC123?usp=sharing",
    )?;
    let batch = source.list_images().await?;

    let keys: Vec<&ImageKey> = batch.iter().map(|id| &id.key).collect();
    assert_eq!(
        keys,
        vec![
            &ImageKey::Drive { file_id: "f1".to_string() },
            &ImageKey::Drive { file_id: "f3".to_string() },
        ]
    );
    assert_eq!(
        source.descriptor(),
        SourceDescriptor::Drive {
            folder_id: "ABC123".to_string(),
            folder_name: Some("Field plots".to_string()),
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_drive_skips_image_types_the_pipeline_cannot_decode() -> anyhow::Result<()> {
    let client = FakeDriveClient::default()
        .with_file("heic", "phone.heic", "image/heic", vec![])
        .with_file("svg", "logo.svg", "image/svg+xml", vec![])
        .with_file("tiff", "scan.tiff", "image/tiff", vec![])
        .with_file("bmp", "plot.bmp", "image/bmp", vec![])
        .with_file("gif", "plot.gif", "image/gif", vec![]);
    let source = DriveSource::new(Arc::new(client), "ABC123");

    let batch = source.list_images().await?;
    let names: Vec<&str> = batch.iter().map(|id| id.filename.as_str()).collect();
    assert_eq!(names, vec!["plot.bmp", "plot.gif"]);
    Ok(())
}

#[tokio::test]
async fn test_drive_listing_errors_map_to_unavailable_kinds() -> anyhow::Result<()> {
    let cases = [
        (DriveError::NotFound("gone".into()), UnavailableKind::NotFound),
        (DriveError::AccessDenied("private".into()), UnavailableKind::AccessDenied),
        (DriveError::Unauthorized("expired".into()), UnavailableKind::AccessDenied),
        (DriveError::Timeout, UnavailableKind::Unreachable),
        (DriveError::InvalidResponse("html".into()), UnavailableKind::Invalid),
    ];

    for (error, expected) in cases {
        let client = FakeDriveClient::default().failing_list(error);
        let source = DriveSource::new(Arc::new(client), "ABC123");
        let err = source.list_images().await.unwrap_err();
        assert_eq!(err.kind(), expected);
    }
    Ok(())
}

async fn fetch_reason(source: &DriveSource, file_id: &str) -> FetchReason {
    let id = ImageId::drive(file_id, format!("{file_id}.png"));
    source.fetch_bytes(&id).await.unwrap_err().reason
}

#[tokio::test]
async fn test_drive_fetch_errors_map_to_reasons() -> anyhow::Result<()> {
    let client = FakeDriveClient::default()
        .with_file("slow", "slow.png", "image/png", vec![])
        .with_file("locked", "locked.png", "image/png", vec![])
        .with_file("busy", "busy.png", "image/png", vec![])
        .failing_download("slow", DriveError::Timeout)
        .failing_download("locked", DriveError::AccessDenied("no".into()))
        .failing_download(
            "busy",
            DriveError::Status {
                status: 503,
                message: "backend".into(),
            },
        );
    let source = DriveSource::new(Arc::new(client), "ABC123");

    assert_eq!(fetch_reason(&source, "slow").await, FetchReason::TransientNetwork);
    assert_eq!(fetch_reason(&source, "locked").await, FetchReason::PermissionDenied);
    assert_eq!(fetch_reason(&source, "busy").await, FetchReason::TransientNetwork);
    assert_eq!(fetch_reason(&source, "unknown").await, FetchReason::Missing);
    assert!(FetchReason::TransientNetwork.is_retryable());
    Ok(())
}

#[tokio::test]
async fn test_drive_cache_avoids_second_download() -> anyhow::Result<()> {
    let client = Arc::new(FakeDriveClient::default().with_file("f1", "a.png", "image/png", vec![7, 8, 9]));
    let source = DriveSource::new(client.clone(), "ABC123").with_download_cache()?;
    let id = ImageId::drive("f1", "a.png");

    assert_eq!(source.fetch_bytes(&id).await?, vec![7, 8, 9]);
    assert_eq!(source.fetch_bytes(&id).await?, vec![7, 8, 9]);
    assert_eq!(client.download_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_drive_without_cache_downloads_each_time() -> anyhow::Result<()> {
    let client = Arc::new(FakeDriveClient::default().with_file("f1", "a.png", "image/png", vec![1]));
    let source = DriveSource::new(client.clone(), "ABC123");
    let id = ImageId::drive("f1", "a.png");

    source.fetch_bytes(&id).await?;
    source.fetch_bytes(&id).await?;
    assert_eq!(client.download_count(), 2);
    Ok(())
}

#[test]
fn test_drive_link_parsing() {
    use boardscan::source::{parse_folder_ref, LinkError};

    assert_eq!(
        parse_folder_ref("https://drive.google.com/drive/folders/ABC123").unwrap(),
        "ABC123"
    );
    assert_eq!(parse_folder_ref("ABC123").unwrap(), "ABC123");
    assert_eq!(
        parse_folder_ref("not-a-link"),
        Err(LinkError::NoFolderId("not-a-link".to_string()))
    );
}
