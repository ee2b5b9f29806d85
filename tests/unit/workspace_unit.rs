use super::*;
use tempfile::tempdir;

#[tokio::test]
async fn initialize_creates_nested_root() -> Result<(), AppError> {
    let temp = tempdir().expect("tempdir");
    let root = temp.path().join("scratch").join("downloads");
    let workspace = Workspace::initialize(&root).await?;

    assert!(root.is_dir());
    assert_eq!(workspace.root_dir(), root.as_path());

    fs::remove_dir_all(&root).await?;
    workspace.prepare().await?;
    assert!(root.is_dir());

    Ok(())
}

#[tokio::test]
async fn job_dir_is_removed_with_its_contents() -> Result<(), AppError> {
    let temp = tempdir().expect("tempdir");
    let workspace = Workspace::initialize(temp.path()).await?;
    let id = Uuid::new_v4();

    let job_dir = workspace.job_dir(id);
    assert_eq!(job_dir, temp.path().join("downloads").join(id.to_string()));

    fs::create_dir_all(&job_dir).await?;
    fs::write(job_dir.join("Clip.f299.mp4"), b"partial").await?;
    fs::write(job_dir.join("Clip.pt.vtt"), b"WEBVTT").await?;

    assert!(remove_dir(&job_dir).await?);
    assert!(!job_dir.exists());
    assert!(!remove_dir(&job_dir).await?);

    Ok(())
}

#[tokio::test]
async fn capacity_check_fails_when_threshold_unreachable() -> Result<(), AppError> {
    let temp = tempdir().expect("tempdir");
    let workspace = Workspace::initialize(temp.path()).await?;

    let impossible = CapacityConfig {
        minimum_free_bytes: u64::MAX,
        minimum_free_ratio: 0.0,
    };
    let err = workspace.ensure_capacity(&impossible).await.unwrap_err();
    assert!(matches!(err, AppError::ExternalTool(_)));

    workspace.ensure_capacity(&CapacityConfig::disabled()).await?;

    Ok(())
}
