//! End-to-end session flows against a real filesystem tree.

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use showcase_media::{probe_video, DownloadConfig, HttpFetcher, SlideshowConfig, SlideshowEngine};
use showcase_models::session::progress;
use showcase_models::{SessionRecord, SessionStatus, SlideshowOptions, SourceKind, TransitionEffect};
use showcase_queue::ProcessSessionJob;
use showcase_store::SessionStore;
use showcase_worker::{
    IngestOutcome, LifecycleSweeper, RenderJobOutcome, SessionPipeline, SlideshowStage, SubmissionService,
};

use common::{env, jpeg_bytes, zip_bytes, Env};

fn pipeline(env: &Env) -> SessionPipeline {
    SessionPipeline::new(
        env.layout.clone(),
        env.store.clone(),
        env.dispatcher.clone(),
        Arc::new(HttpFetcher::new(DownloadConfig::default()).unwrap()),
    )
}

fn submission(env: &Env) -> SubmissionService {
    SubmissionService::new(env.layout.clone(), env.store.clone(), env.dispatcher.clone())
}

fn stage(env: &Env) -> SlideshowStage {
    SlideshowStage::new(
        env.layout.clone(),
        env.store.clone(),
        SlideshowEngine::new(SlideshowConfig::default()),
    )
}

fn no_cancel() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_three_images_produce_nine_second_slideshow() {
    let env = env().await;
    let archive = zip_bytes(&[
        ("one.jpg", &jpeg_bytes([200, 0, 0])),
        ("two.jpg", &jpeg_bytes([0, 200, 0])),
        ("three.jpg", &jpeg_bytes([0, 0, 200])),
    ]);

    let record = submission(&env)
        .submit_upload(&archive, "photos.zip", None)
        .await
        .unwrap();
    let ingest = env.dispatcher.take_ingests().pop().unwrap();
    let outcome = pipeline(&env).process_session(&ingest, no_cancel()).await.unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::Ready {
            images: 3,
            videos: 0,
            audio_files: 0,
            slideshow_scheduled: true,
        }
    );

    let render = env.dispatcher.take_renders().pop().unwrap();
    let rendered = stage(&env).render_slideshow(&render, no_cancel()).await.unwrap();
    assert!(matches!(rendered, RenderJobOutcome::Rendered { images: 3, .. }));

    let stored = env.store.get_record(&record).await;
    let manifest = stored.manifest.as_ref().unwrap();
    assert_eq!(manifest.images.len(), 3);
    assert_eq!(manifest.videos.len(), 0);
    assert_eq!(manifest.audio_files.len(), 0);
    assert_eq!(manifest.slideshow_video.as_deref(), Some("slideshow.mp4"));
    assert!(stored.slideshow_ready());
    assert_eq!(stored.status, SessionStatus::Ready);
    assert_eq!(stored.progress, Some(progress::COMPLETE));

    let info = probe_video(env.layout.slideshow_path(&record.id)).await.unwrap();
    let duration = info.format_duration.unwrap();
    assert!((duration - 9.0).abs() < 0.5, "duration was {}", duration);

    assert_eq!(
        env.store.statuses(),
        vec![
            (SessionStatus::Queued, Some(progress::QUEUED)),
            (SessionStatus::Processing, Some(progress::EXTRACTING)),
            (SessionStatus::Processing, Some(progress::PROBING)),
            (SessionStatus::Ready, Some(progress::MANIFEST_READY)),
            (SessionStatus::GeneratingSlideshow, Some(progress::MANIFEST_READY)),
            (SessionStatus::Ready, Some(progress::COMPLETE)),
        ]
    );
}

#[tokio::test]
async fn test_path_escape_fails_session_and_writes_nothing_outside() {
    let env = env().await;
    let archive = zip_bytes(&[
        ("ok.jpg", &jpeg_bytes([1, 2, 3])),
        ("../../etc/passwd", b"root:x:0:0"),
    ]);

    let record = submission(&env)
        .submit_upload(&archive, "evil.zip", None)
        .await
        .unwrap();
    let ingest = env.dispatcher.take_ingests().pop().unwrap();
    let outcome = pipeline(&env).process_session(&ingest, no_cancel()).await.unwrap();

    assert!(matches!(outcome, IngestOutcome::Failed(ref f) if f.is_fatal() && f.kind() == "path_escape"));
    let stored = env.store.get_record(&record).await;
    assert_eq!(stored.status, SessionStatus::Failed);
    assert!(stored.error.as_deref().unwrap().contains("path_escape"));
    assert!(!env.layout.session_dir(&record.id).exists());
    assert!(!env.root.path().join("etc").exists());
    assert!(!env.layout.root().join("etc").exists());
    assert!(env.dispatcher.take_renders().is_empty());
}

#[tokio::test]
async fn test_zero_images_go_straight_to_complete() {
    let env = env().await;
    let archive = zip_bytes(&[("readme.txt", b"hello"), ("notes.md", b"# notes")]);

    let record = submission(&env)
        .submit_upload(&archive, "docs.zip", None)
        .await
        .unwrap();
    let ingest = env.dispatcher.take_ingests().pop().unwrap();
    pipeline(&env).process_session(&ingest, no_cancel()).await.unwrap();

    let stored = env.store.get_record(&record).await;
    assert_eq!(stored.status, SessionStatus::Ready);
    assert_eq!(stored.progress, Some(progress::COMPLETE));
    assert!(env.dispatcher.take_renders().is_empty());
    assert!(!env
        .store
        .statuses()
        .iter()
        .any(|(status, _)| *status == SessionStatus::GeneratingSlideshow));
    assert!(env.layout.manifest_path(&record.id).exists());
}

#[tokio::test]
async fn test_remote_archive_is_downloaded_then_extracted() {
    let server = MockServer::start().await;
    let archive = zip_bytes(&[("pic.jpg", &jpeg_bytes([9, 9, 9]))]);
    Mock::given(method("GET"))
        .and(path("/bundle.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let env = env().await;
    let url = format!("{}/bundle.zip", server.uri());
    let now = Utc::now();
    let record = SessionRecord::new(
        showcase_models::SessionId::new(),
        SourceKind::RemoteUrl,
        now,
        now + Duration::days(1),
        now + Duration::days(1),
    )
    .with_source_url(&url);
    env.store.put(&record).await.unwrap();

    let job = ProcessSessionJob::new(record.id.clone(), SourceKind::RemoteUrl).with_source_url(&url);
    let outcome = pipeline(&env).process_session(&job, no_cancel()).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Ready { images: 1, .. }));

    let statuses: Vec<SessionStatus> = env.store.statuses().into_iter().map(|(s, _)| s).collect();
    assert_eq!(statuses[1], SessionStatus::Downloading);
    assert!(env.layout.session_dir(&record.id).join("pic.jpg").exists());
    assert!(!env.layout.archive_path(&record.id).exists());
}

#[tokio::test]
async fn test_redelivered_ingest_starts_clean() {
    let env = env().await;
    let archive = zip_bytes(&[("a.jpg", &jpeg_bytes([5, 5, 5]))]);
    let record = submission(&env)
        .submit_upload(&archive, "a.zip", None)
        .await
        .unwrap();
    let ingest = env.dispatcher.take_ingests().pop().unwrap();

    // Leftovers from an interrupted first attempt.
    let dir = env.layout.session_dir(&record.id);
    std::fs::write(dir.join("stale.jpg"), jpeg_bytes([0, 0, 0])).unwrap();

    let outcome = pipeline(&env).process_session(&ingest, no_cancel()).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Ready { images: 1, .. }));
    assert!(!dir.join("stale.jpg").exists());

    // A second delivery before any render ran only schedules the render again.
    let again = pipeline(&env).process_session(&ingest, no_cancel()).await.unwrap();
    assert!(matches!(again, IngestOutcome::Ready { images: 1, slideshow_scheduled: true, .. }));
    assert!(dir.join("a.jpg").exists());
    assert_eq!(env.dispatcher.take_renders().len(), 2);

    // Once the session has failed, redelivery is a no-op.
    let mut stored = env.store.get_record(&record).await;
    stored.fail("stopped").unwrap();
    env.store.put(&stored).await.unwrap();
    let last = pipeline(&env).process_session(&ingest, no_cancel()).await.unwrap();
    assert_eq!(last, IngestOutcome::Skipped);
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_slideshow_rerender_with_options() {
    let env = env().await;
    let archive = zip_bytes(&[("a.jpg", &jpeg_bytes([50, 50, 50])), ("b.jpg", &jpeg_bytes([90, 90, 90]))]);
    let record = submission(&env)
        .submit_upload(&archive, "two.zip", None)
        .await
        .unwrap();
    let ingest = env.dispatcher.take_ingests().pop().unwrap();
    pipeline(&env).process_session(&ingest, no_cancel()).await.unwrap();
    env.dispatcher.take_renders();

    let options = SlideshowOptions::default()
        .with_duration(1.0)
        .with_transition(TransitionEffect::None)
        .with_resolution(320, 240);
    submission(&env)
        .request_slideshow(&record.id, options.clone())
        .await
        .unwrap();
    let render = env.dispatcher.take_renders().pop().unwrap();
    assert_eq!(render.options, options);

    stage(&env).render_slideshow(&render, no_cancel()).await.unwrap();
    let info = probe_video(env.layout.slideshow_path(&record.id)).await.unwrap();
    assert_eq!((info.width, info.height), (320, 240));
    assert!((info.format_duration.unwrap() - 2.0).abs() < 0.5);

    let stored = env.store.get_record(&record).await;
    assert_eq!(stored.slideshow_options, Some(options));
}

#[tokio::test]
async fn test_sweeper_expiries_are_independent() {
    let env = env().await;
    let now = Utc::now();

    let media_gone = SessionRecord::new(
        showcase_models::SessionId::new(),
        SourceKind::Upload,
        now - Duration::days(31),
        now - Duration::days(1),
        now + Duration::days(30),
    );
    let record_gone = SessionRecord::new(
        showcase_models::SessionId::new(),
        SourceKind::Upload,
        now - Duration::days(31),
        now + Duration::days(30),
        now - Duration::days(1),
    );
    for record in [&media_gone, &record_gone] {
        env.store.put(record).await.unwrap();
        std::fs::create_dir_all(env.layout.session_dir(&record.id)).unwrap();
    }

    let sweeper = LifecycleSweeper::new(env.layout.clone(), env.store.clone());
    let report = sweeper.sweep(now).await.unwrap();
    assert_eq!(report.media_removed, vec![media_gone.id.clone()]);
    assert_eq!(report.records_removed, vec![record_gone.id.clone()]);

    assert!(env.store.get(&media_gone.id).await.unwrap().is_some());
    assert!(!env.layout.session_dir(&media_gone.id).exists());
    assert!(env.store.get(&record_gone.id).await.unwrap().is_none());
    assert!(env.layout.session_dir(&record_gone.id).exists());

    let listed = submission(&env).list_sessions(now).await.unwrap();
    assert!(listed.iter().all(|s| s.id != media_gone.id));
}
