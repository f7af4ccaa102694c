mod common;

use common::harness;
use core_events::{EventHooks, HistoryNavigation, SurfaceEvent};
use core_session::SaveOutcome;
use core_surface::TextSurface;
use std::sync::atomic::{AtomicUsize, Ordering};

#[tokio::test]
async fn second_save_while_saving_does_not_write() {
    let h = harness("doc.txt", "a", false);
    h.session.load().await.unwrap();
    h.session.with_surface(|s| s.append("b"));
    h.session.on_text_changed("ab").await;
    let release = h.storage.hold_writes();

    let (first, second) = tokio::join!(h.session.save(), async {
        h.storage.write_entered.notified().await;
        let second = h.session.save().await;
        release.notify_one();
        second
    });

    assert_eq!(first.unwrap(), SaveOutcome::Saved);
    assert_eq!(second.unwrap(), SaveOutcome::Skipped);
    assert_eq!(h.storage.writes(), 1);
    assert!(!h.session.is_dirty());
}

#[tokio::test]
async fn load_while_saving_is_skipped() {
    let h = harness("doc.txt", "a", false);
    h.session.load().await.unwrap();
    let release = h.storage.hold_writes();

    let (_, load) = tokio::join!(h.session.save(), async {
        h.storage.write_entered.notified().await;
        let load = h.session.load().await;
        release.notify_one();
        load
    });

    assert_eq!(load.unwrap(), core_session::LoadOutcome::Skipped);
}

#[tokio::test]
async fn close_waits_for_in_flight_save() {
    let h = harness("doc.txt", "a", false);
    h.session.load().await.unwrap();
    h.session.with_surface(|s| s.append("b"));
    h.session.on_text_changed("ab").await;
    let release = h.storage.hold_writes();

    let (saved, closed) = tokio::join!(h.session.save(), async {
        h.storage.write_entered.notified().await;
        let closing = h.session.close();
        release.notify_one();
        closing.await
    });

    assert_eq!(saved.unwrap(), SaveOutcome::Saved);
    closed.unwrap();
    // The in-flight save left the session clean, so close had nothing to write.
    assert_eq!(h.storage.writes(), 1);
    assert!(h.session.is_closed());
}

#[tokio::test]
async fn edit_during_save_stays_dirty() {
    let h = harness("doc.txt", "a", false);
    h.session.load().await.unwrap();
    h.session.with_surface(|s| s.append("b"));
    h.session.on_text_changed("ab").await;
    let release = h.storage.hold_writes();

    let (saved, ()) = tokio::join!(h.session.save(), async {
        h.storage.write_entered.notified().await;
        h.session.with_surface(|s| s.append("c"));
        release.notify_one();
    });

    assert_eq!(saved.unwrap(), SaveOutcome::Saved);
    assert_eq!(h.storage.bytes(&h.path).unwrap(), b"ab");
    assert!(h.session.is_dirty());
    assert_eq!(h.session.baseline().as_deref(), Some("ab"));
}

#[derive(Default)]
struct CountingHooks {
    pre: AtomicUsize,
    post: AtomicUsize,
}

impl EventHooks for CountingHooks {
    fn pre_handle(&self, _event: &SurfaceEvent) {
        self.pre.fetch_add(1, Ordering::SeqCst);
    }

    fn post_handle(&self, _event: &SurfaceEvent) {
        self.post.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn event_pump_drives_tracker_until_close() {
    let h = harness("doc.txt", "a", false);
    h.session.load().await.unwrap();
    let hooks = CountingHooks::default();
    let mut dirty = h.session.subscribe_dirty();

    let ((), closed) = tokio::join!(h.session.run_events(h.events, &hooks), async {
        h.session.with_surface(|s| s.append("b"));
        dirty.wait_for(|d| *d).await.unwrap();
        h.session.close().await
    });

    closed.unwrap();
    assert_eq!(h.storage.bytes(&h.path).unwrap(), b"ab");
    assert_eq!(hooks.pre.load(Ordering::SeqCst), 1);
    assert_eq!(hooks.post.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn save_request_from_surface_saves() {
    let h = harness("doc.txt", "a", false);
    h.session.load().await.unwrap();
    let hooks = core_events::NoopEventHooks;
    let mut dirty = h.session.subscribe_dirty();

    let ((), ()) = tokio::join!(h.session.run_events(h.events, &hooks), async {
        h.session.with_surface(|s| s.append("b"));
        dirty.wait_for(|d| *d).await.unwrap();
        assert!(h.session.with_surface(|s| s.request_save()));
        dirty.wait_for(|d| !*d).await.unwrap();
        h.session.close().await.unwrap();
    });

    assert_eq!(h.storage.writes(), 1);
    assert_eq!(h.storage.bytes(&h.path).unwrap(), b"ab");
}

#[tokio::test]
async fn invalidate_save_state_marks_dirty() {
    let h = harness("doc.txt", "a", false);
    h.session.load().await.unwrap();
    let (notifier, rx) = core_events::channel();
    let hooks = core_events::NoopEventHooks;
    let mut dirty = h.session.subscribe_dirty();

    let ((), ()) = tokio::join!(h.session.run_events(rx, &hooks), async {
        assert!(notifier.notify(SurfaceEvent::InvalidateSaveState));
        dirty.wait_for(|d| *d).await.unwrap();
        assert!(!h.session.prepare_close());
        assert!(notifier.notify(SurfaceEvent::SaveRequested));
        dirty.wait_for(|d| !*d).await.unwrap();
        drop(notifier);
    });

    assert_eq!(h.storage.writes(), 1);
    assert!(!h.session.is_closed());
}

#[tokio::test]
async fn undo_after_save_returns_to_pre_save_text() {
    let h = harness("doc.txt", "a", false);
    h.session.load().await.unwrap();
    let hooks = core_events::NoopEventHooks;
    let mut dirty = h.session.subscribe_dirty();

    let ((), ()) = tokio::join!(h.session.run_events(h.events, &hooks), async {
        h.session.with_surface(|s| s.append("b"));
        dirty.wait_for(|d| *d).await.unwrap();
        h.session.save().await.unwrap();
        assert!(!h.session.is_dirty());

        assert!(h.session.with_surface(|s| s.undo()));
        dirty.wait_for(|d| *d).await.unwrap();
        assert_eq!(h.session.with_surface(|s| s.text()), "a");
        assert_eq!(h.session.baseline().as_deref(), Some("ab"));

        assert!(h.session.with_surface(|s| s.redo()));
        dirty.wait_for(|d| !*d).await.unwrap();
        assert_eq!(h.session.with_surface(|s| s.text()), "ab");
        h.session.close().await.unwrap();
    });

    assert_eq!(h.storage.bytes(&h.path).unwrap(), b"ab");
    assert_eq!(h.session.saves_completed(), 2);
}

#[tokio::test]
async fn baseline_navigation_ignores_snapshot_payload() {
    let h = harness("doc.txt", "kept\n", false);
    h.session.load().await.unwrap();
    h.session.with_surface(|s| s.replace_all("edited"));
    h.session.on_text_changed("edited").await;
    assert!(h.session.is_dirty());

    let (notifier, rx) = core_events::channel();
    let hooks = core_events::NoopEventHooks;
    let mut dirty = h.session.subscribe_dirty();

    let ((), ()) = tokio::join!(h.session.run_events(rx, &hooks), async {
        assert!(notifier.notify(SurfaceEvent::HistoryNavigated(HistoryNavigation {
            is_baseline_entry: true,
            snapshot_text: "lossy".to_string(),
            snapshot_caret: 3,
        })));
        assert!(notifier.notify(SurfaceEvent::TextChanged("lossy".to_string())));
        dirty.wait_for(|d| !*d).await.unwrap();
        drop(notifier);
    });

    assert!(!h.session.is_dirty());
    assert_eq!(h.session.with_surface(|s| s.text()), "kept\n");
    assert_eq!(h.storage.bytes(&h.path).unwrap(), b"kept\n");
}
