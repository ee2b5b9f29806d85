use super::*;

fn new_job(url: &str) -> NewJob {
    NewJob {
        source_url: url.to_string(),
        category_id: "cat-1".to_string(),
    }
}

#[test]
fn status_projection_collapses_active_stages() {
    assert_eq!(JobStatus::Downloading.persisted(), PersistedStatus::Processing);
    assert_eq!(JobStatus::Uploading.persisted(), PersistedStatus::Processing);
    assert_eq!(PersistedStatus::Processing.widen(), JobStatus::Downloading);

    for status in [JobStatus::Waiting, JobStatus::Completed, JobStatus::Error] {
        assert_eq!(status.persisted().widen(), status);
        let parsed = PersistedStatus::parse(status.persisted().as_str()).unwrap();
        assert_eq!(parsed, status.persisted());
    }

    assert!(PersistedStatus::parse("downloading").is_err());
}

#[tokio::test]
async fn local_job_store_lifecycle() -> Result<(), AppError> {
    let store = LocalJobStore::new();

    let created = store.create_job(new_job("https://video/x")).await?;
    assert_eq!(created.status, JobStatus::Waiting);
    assert_eq!(store.count_waiting().await?, 1);

    let claimed = store.claim_next_waiting().await?.expect("waiting job");
    assert_eq!(claimed.id, created.id);
    assert_eq!(claimed.status, JobStatus::Downloading);
    assert!(store.claim_next_waiting().await?.is_none());

    store
        .update_status(created.id, JobStatus::Uploading, None)
        .await?;
    let asset = CompletedAsset {
        video_id: Uuid::new_v4(),
        title: "Aula 1".into(),
        storage_url: "https://cdn/videos/aula.mp4".into(),
        thumbnail_url: None,
    };
    store.complete(created.id, &asset).await?;

    let done = store.get(&created.id).await?.expect("job missing after complete");
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.storage_url.as_deref(), Some("https://cdn/videos/aula.mp4"));
    assert_eq!(done.video_id, Some(asset.video_id));

    Ok(())
}

#[tokio::test]
async fn claims_follow_insertion_order() -> Result<(), AppError> {
    let store = LocalJobStore::new();
    let first = store.create_job(new_job("https://video/1")).await?;
    let second = store.create_job(new_job("https://video/2")).await?;
    let third = store.create_job(new_job("https://video/3")).await?;

    let order: Vec<Uuid> = vec![
        store.claim_next_waiting().await?.unwrap().id,
        store.claim_next_waiting().await?.unwrap().id,
        store.claim_next_waiting().await?.unwrap().id,
    ];
    assert_eq!(order, vec![first.id, second.id, third.id]);

    let listed: Vec<Uuid> = store
        .list(JobFilter::Active)
        .await?
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(listed, order);

    Ok(())
}

#[tokio::test]
async fn delete_refuses_active_jobs() -> Result<(), AppError> {
    let store = LocalJobStore::new();
    let job = store.create_job(new_job("https://video/x")).await?;
    store.claim_next_waiting().await?;

    let err = store.delete_idle(&job.id).await.unwrap_err();
    assert!(matches!(err, AppError::JobBusy(_)));
    assert!(store.get(&job.id).await?.is_some());

    store
        .update_status(job.id, JobStatus::Error, Some("boom".into()))
        .await?;
    store.delete_idle(&job.id).await?;
    assert!(store.get(&job.id).await?.is_none());

    let missing = store.delete_idle(&job.id).await.unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));

    Ok(())
}

#[tokio::test]
async fn only_stale_active_jobs_are_failed() -> Result<(), AppError> {
    let store = LocalJobStore::new();
    let job = store.create_job(new_job("https://video/x")).await?;
    store.create_job(new_job("https://video/y")).await?;
    store.claim_next_waiting().await?;

    let an_hour_ago = Utc::now() - chrono::Duration::hours(1);
    assert_eq!(store.count_active_since(an_hour_ago).await?, 1);
    assert_eq!(
        store
            .count_active_since(Utc::now() + chrono::Duration::hours(1))
            .await?,
        0
    );

    assert_eq!(store.fail_stale("interrupted", an_hour_ago).await?, 0);
    assert_eq!(store.get(&job.id).await?.unwrap().status, JobStatus::Downloading);

    let later = Utc::now() + chrono::Duration::seconds(1);
    assert_eq!(store.fail_stale("interrupted", later).await?, 1);
    let failed = store.get(&job.id).await?.unwrap();
    assert_eq!(failed.status, JobStatus::Error);
    assert_eq!(failed.error_message.as_deref(), Some("interrupted"));
    assert_eq!(store.list(JobFilter::Errored).await?.len(), 1);
    assert_eq!(store.count_waiting().await?, 1);

    Ok(())
}
