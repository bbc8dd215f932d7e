//! Engine behaviour against the SQLite-backed store.

use chrono::Local;
use serde_json::json;
use sitebudget_lib::{
    clock::SystemClock,
    db::Database,
    ledger::UsageLedger,
    session::{BrowserEvent, SessionController},
    stdio_bridge::{StdioBrowser, TabRegistry},
    storage::Storage,
    AppState,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::test]
async fn values_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kv.sqlite3");

    {
        let db = Database::new(path.clone()).unwrap();
        db.set("answer", json!({"value": 42})).await.unwrap();
        db.set("gone", json!(true)).await.unwrap();
        db.remove("gone").await.unwrap();
        assert_eq!(db.get("missing").await.unwrap(), None);
    }

    let db = Database::new(path).unwrap();
    assert_eq!(db.get("answer").await.unwrap(), Some(json!({"value": 42})));
    assert_eq!(db.get("gone").await.unwrap(), None);
}

#[tokio::test]
async fn site_order_survives_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = UsageLedger::new(Database::new(dir.path().join("sites.sqlite3")).unwrap());

    ledger.add_site("https://zulip.com/x", "", 60).await.unwrap();
    ledger.add_site("https://arxiv.org", "", 60).await.unwrap();
    ledger.add_site("https://mastodon.social", "", 60).await.unwrap();

    let ids: Vec<String> = ledger
        .list_sites()
        .await
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(
        ids,
        vec![
            "https://zulip.com",
            "https://arxiv.org",
            "https://mastodon.social"
        ]
    );
}

#[tokio::test]
async fn blocked_site_redirect_reaches_the_browser() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("engine.sqlite3")).unwrap();
    let ledger = UsageLedger::new(db.clone());

    let site_id = ledger
        .add_site("https://news.example.com", "read a book", 60)
        .await
        .unwrap();
    let now_ms = Local::now().timestamp_millis();
    ledger
        .update_site(&site_id, |record| {
            record.blocked = true;
            record.accumulated_seconds = 60;
            record.last_session_epoch_ms = Some(now_ms);
        })
        .await
        .unwrap();

    let (writer, reader) = tokio::io::duplex(1024);
    let browser = StdioBrowser::new(TabRegistry::new(), "sitebudget://blocked", writer);
    let mut controller = SessionController::new(db, browser, SystemClock);

    controller
        .handle_event(BrowserEvent::BeforeNavigate {
            tab_id: 11,
            url: "https://news.example.com/front".into(),
            frame_id: 0,
        })
        .await
        .unwrap();

    let mut lines = BufReader::new(reader).lines();
    let line = lines.next_line().await.unwrap().unwrap();
    let action: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(
        action,
        json!({"action": "redirect", "tabId": 11, "url": "sitebudget://blocked"})
    );

    let notice = ledger.take_blocked_notice().await.unwrap().unwrap();
    assert_eq!(notice.url, "https://news.example.com/front");
    assert_eq!(notice.message, "read a book");

    let record = ledger.get_site(&site_id).await.unwrap().unwrap();
    assert_eq!(record.total_visits, 1);
    assert_eq!(record.total_visits_when_blocked, 1);
}

#[tokio::test]
async fn closing_a_timed_tab_clears_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("engine.sqlite3")).unwrap();
    let ledger = UsageLedger::new(db.clone());
    let site_id = ledger.add_site("https://video.example", "", 3600).await.unwrap();

    let browser = StdioBrowser::new(TabRegistry::new(), "sitebudget://blocked", tokio::io::sink());
    let mut controller = SessionController::new(db, browser, SystemClock);

    controller
        .handle_event(BrowserEvent::NavigationCompleted {
            tab_id: 2,
            url: "https://video.example/watch".into(),
            frame_id: 0,
        })
        .await
        .unwrap();
    assert!(ledger.get_site(&site_id).await.unwrap().unwrap().session_start().is_some());

    controller
        .handle_event(BrowserEvent::TabRemoved { tab_id: 2 })
        .await
        .unwrap();

    let record = ledger.get_site(&site_id).await.unwrap().unwrap();
    assert_eq!(record.session_start(), None);
    assert_eq!(record.total_visits, 1);
    assert!(controller.timers().is_empty());
}

#[tokio::test]
async fn app_state_creates_its_data_directory() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("nested").join("home");

    let state = AppState::open(data_dir.clone()).unwrap();
    assert!(state.db.path().starts_with(&data_dir));
    assert_eq!(
        state.engine_settings().blocked_page_url,
        "sitebudget://blocked"
    );
}
